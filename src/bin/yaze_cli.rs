//! Small command-line front end over `yaze_core`. Mirrors the teacher's
//! `export_rom` in shape (`clap` derive args, `anyhow::Result` in `main`,
//! `env_logger` initialized first thing) but targets the new engine: load a
//! ROM and/or project, report version/area/entity counts, optionally run
//! the save pipeline, and export a built area as a PNG.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use log::info;

use yaze_core::manifest::HackManifest;
use yaze_core::project::Project;
use yaze_core::rom::Rom;
use yaze_core::overworld::Overworld;

/// Falls back to the platform config directory (via `directories`) when the
/// user doesn't pass `--project`, matching the "optional config dir" the
/// expanded spec's ambient-configuration section calls for.
fn default_project_path() -> Option<PathBuf> {
    ProjectDirs::from("dev", "yaze", "yaze_cli").map(|dirs| dirs.config_dir().join("default.yazeproj"))
}

#[derive(Parser, Debug)]
#[command(name = "yaze_cli", about = "Inspect and save YAZE overworld ROMs")]
struct Args {
    /// Path to the ROM file.
    #[arg(long)]
    rom: PathBuf,

    /// Optional project file; defaults to an unnamed project when absent.
    #[arg(long)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the ROM, print version/area/entity summary, and exit.
    Inspect,
    /// Load the ROM and project, then write the project's enabled phases
    /// back to the ROM in place.
    Save {
        /// Where to write the saved ROM. Defaults to overwriting `--rom`.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Build one area's bitmap and write it out as an 8-bit indexed PNG.
    ExportPng {
        area_id: u8,
        #[arg(long)]
        out: PathBuf,
    },
}

fn write_area_png(bitmap: &yaze_core::overworld::AreaBitmap, out: &PathBuf) -> Result<()> {
    let dim = (bitmap.indices.len() as f64).sqrt() as u32;
    let file = File::create(out).with_context(|| format!("creating {}", out.display()))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), dim, dim);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().context("writing PNG header")?;

    let mut rgb = Vec::with_capacity(bitmap.indices.len() * 3);
    for &idx in &bitmap.indices {
        let [r, g, b] = bitmap.palette[idx as usize].to_rgb8();
        rgb.extend_from_slice(&[r, g, b]);
    }
    writer.write_image_data(&rgb).context("writing PNG pixel data")?;
    Ok(())
}

fn load_project(path: Option<&PathBuf>) -> Result<Project> {
    match path.cloned().or_else(default_project_path) {
        Some(p) if p.exists() => Project::load(&p).with_context(|| format!("loading project {}", p.display())),
        _ => Ok(Project::new("unnamed")),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let rom = Rom::load(&args.rom).with_context(|| format!("loading ROM {}", args.rom.display()))?;
    info!("loaded ROM: {} bytes, header={}", rom.len(), rom.has_header());

    let mut overworld = Overworld::load(rom).context("building overworld from ROM")?;
    info!(
        "version={} areas={} entrances={} exits={} items={}",
        overworld.version().name(),
        overworld.areas().len(),
        overworld.entities().live_entrance_count(),
        overworld.entities().live_exit_count(),
        overworld.entities().live_item_count(),
    );

    match args.command {
        Command::Inspect => {
            println!("version: {}", overworld.version().name());
            println!("areas: {}", overworld.areas().len());
            println!("entrances: {}", overworld.entities().live_entrance_count());
            println!("exits: {}", overworld.entities().live_exit_count());
            println!("items: {}", overworld.entities().live_item_count());
        }
        Command::Save { out } => {
            let project = load_project(args.project.as_ref())?;
            let mut manifest = HackManifest::new(project.write_policy);
            yaze_core::save::save(&mut overworld, &project, &mut manifest)
                .context("running save pipeline")?;
            let out_path = out.unwrap_or(args.rom);
            overworld.rom_mut().save_to(&out_path).with_context(|| format!("writing {}", out_path.display()))?;
            info!("saved ROM to {}", out_path.display());
        }
        Command::ExportPng { area_id, out } => {
            overworld.ensure_map_built(area_id).context("building area bitmap")?;
            let bitmap = overworld.area_bitmap(area_id).expect("just built");
            write_area_png(bitmap, &out)?;
            info!("wrote area {area_id:#x} to {}", out.display());
        }
    }

    Ok(())
}
