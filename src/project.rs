//! C9 — project file: the engine's configuration envelope. Key=value
//! INI-ish sections, grounded directly on `core/project.cc`'s
//! `SerializeToString`/`ParseFromString` (section list, key names, and the
//! tolerant parsing rules: unknown sections ignored, unknown keys in a
//! known section preserved verbatim).

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::manifest::WritePolicy;

fn parse_key_value(line: &str) -> Option<(String, String)> {
    let eq = line.find('=')?;
    let key = line[..eq].trim().to_string();
    let value = line[eq + 1..].trim().to_string();
    if key.is_empty() {
        None
    } else {
        Some((key, value))
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value, "true" | "1" | "yes")
}

fn format_bool(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn parse_string_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Replaces every non-alphanumeric byte with `_`; used to derive a storage
/// key for music persistence from a project name.
pub fn sanitize_storage_key(input: &str) -> String {
    let mut key: String = input
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    if key.is_empty() {
        key = "project".to_string();
    }
    key
}

#[derive(Clone, Debug, Default)]
pub struct ProjectMetadata {
    pub description: String,
    pub author: String,
    pub license: String,
    pub version: String,
    pub created_date: String,
    pub last_modified: String,
    pub yaze_version: String,
    pub created_by: String,
    pub project_id: String,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ProjectFiles {
    pub rom_filename: String,
    pub rom_backup_folder: String,
    pub code_folder: String,
    pub assets_folder: String,
    pub patches_folder: String,
    pub labels_filename: String,
    pub symbols_filename: String,
    pub output_folder: String,
    pub custom_objects_folder: String,
    pub additional_roms: Vec<String>,
}

/// spec.md §6.3's save-time flags, plus the handful of load-time flags
/// `project.cc`'s `[feature_flags]` section also carries.
#[derive(Clone, Debug)]
pub struct FeatureFlags {
    pub load_custom_overworld: bool,
    pub apply_zs_custom_overworld_asm: bool,
    pub save_overworld_maps: bool,
    pub save_overworld_entrances: bool,
    pub save_overworld_exits: bool,
    pub save_overworld_items: bool,
    pub save_overworld_properties: bool,
    pub save_all_palettes: bool,
    pub save_gfx_groups: bool,
    pub save_dungeon_maps: bool,
    pub save_graphics_sheet: bool,
    pub enable_custom_objects: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        FeatureFlags {
            load_custom_overworld: true,
            apply_zs_custom_overworld_asm: false,
            save_overworld_maps: true,
            save_overworld_entrances: true,
            save_overworld_exits: true,
            save_overworld_items: true,
            save_overworld_properties: true,
            save_all_palettes: true,
            save_gfx_groups: true,
            save_dungeon_maps: false,
            save_graphics_sheet: false,
            enable_custom_objects: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct WorkspaceSettings {
    pub font_global_scale: f32,
    pub dark_mode: bool,
    pub ui_theme: String,
    pub autosave_enabled: bool,
    pub autosave_interval_secs: f32,
    pub backup_on_save: bool,
    pub show_grid: bool,
    pub show_collision: bool,
    pub prefer_hmagic_names: bool,
    pub last_layout_preset: String,
    pub saved_layouts: Vec<String>,
    pub recent_files: Vec<String>,
    pub custom_keybindings: BTreeMap<String, String>,
    pub editor_visibility: BTreeMap<String, bool>,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        WorkspaceSettings {
            font_global_scale: 1.0,
            dark_mode: true,
            ui_theme: String::new(),
            autosave_enabled: false,
            autosave_interval_secs: 300.0,
            backup_on_save: true,
            show_grid: true,
            show_collision: false,
            prefer_hmagic_names: false,
            last_layout_preset: String::new(),
            saved_layouts: Vec::new(),
            recent_files: Vec::new(),
            custom_keybindings: BTreeMap::new(),
            editor_visibility: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct BuildSettings {
    pub build_script: String,
    pub output_folder: String,
    pub git_repository: String,
    pub track_changes: bool,
    pub build_configurations: Vec<String>,
    pub build_target: String,
    pub asm_entry_point: String,
    pub asm_sources: Vec<String>,
    pub last_build_hash: String,
    pub build_number: u32,
}

#[derive(Clone, Debug, Default)]
pub struct MusicPersistence {
    pub persist_custom_music: bool,
    pub storage_key: String,
    pub last_saved_at: String,
}

#[derive(Clone, Debug, Default)]
pub struct ZScreamCompatibility {
    pub original_project_file: String,
    pub mappings: BTreeMap<String, String>,
}

/// Best-effort key remapping for fields ZScream's own `.zsproj` format used
/// under different names than this engine's project file. Unknown keys
/// pass through unchanged rather than failing the whole import, matching
/// `ParseFromString`'s tolerant handling of unknown sections/keys.
const ZSCREAM_KEY_ALIASES: &[(&str, &str)] = &[
    ("ROMFilename", "rom_filename"),
    ("ProjectName", "name"),
    ("ZSCustomOverworldASM", "apply_zs_custom_overworld_asm"),
];

pub struct Project {
    pub name: String,
    pub metadata: ProjectMetadata,
    pub files: ProjectFiles,
    pub feature_flags: FeatureFlags,
    pub workspace: WorkspaceSettings,
    /// `[agent_settings]` is carried as an opaque key=value map: the
    /// agent/LLM chat UI this section configures is out of this crate's
    /// scope (spec.md §1), but the project file must still round-trip it.
    pub agent_settings: BTreeMap<String, String>,
    pub labels: BTreeMap<String, BTreeMap<String, String>>,
    pub build: BuildSettings,
    pub music: MusicPersistence,
    pub zscream_compatibility: Option<ZScreamCompatibility>,
    pub write_policy: WritePolicy,
}

impl Default for Project {
    fn default() -> Self {
        Project {
            name: String::new(),
            metadata: ProjectMetadata::default(),
            files: ProjectFiles::default(),
            feature_flags: FeatureFlags::default(),
            workspace: WorkspaceSettings::default(),
            agent_settings: BTreeMap::new(),
            labels: BTreeMap::new(),
            build: BuildSettings::default(),
            music: MusicPersistence::default(),
            zscream_compatibility: None,
            write_policy: WritePolicy::Allow,
        }
    }
}

fn write_policy_name(policy: WritePolicy) -> &'static str {
    match policy {
        WritePolicy::Allow => "allow",
        WritePolicy::Warn => "warn",
        WritePolicy::Block => "block",
    }
}

fn write_policy_from_name(name: &str) -> WritePolicy {
    match name {
        "warn" => WritePolicy::Warn,
        "block" => WritePolicy::Block,
        _ => WritePolicy::Allow,
    }
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Project { name: name.into(), ..Default::default() }
    }

    pub fn load(path: &Path) -> Result<Project> {
        log::info!("loading project from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        log::info!("saving project to {}", path.display());
        std::fs::write(path, self.serialize())?;
        Ok(())
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        out.push_str("# yaze Project File\n");
        out.push_str("# Format Version: 2.0\n");
        out.push_str(&format!("# Generated by yaze_core {}\n", self.metadata.yaze_version));
        out.push_str(&format!("# Last Modified: {}\n\n", self.metadata.last_modified));

        out.push_str("[project]\n");
        out.push_str(&format!("name={}\n", self.name));
        out.push_str(&format!("description={}\n", self.metadata.description));
        out.push_str(&format!("author={}\n", self.metadata.author));
        out.push_str(&format!("license={}\n", self.metadata.license));
        out.push_str(&format!("version={}\n", self.metadata.version));
        out.push_str(&format!("created_date={}\n", self.metadata.created_date));
        out.push_str(&format!("last_modified={}\n", self.metadata.last_modified));
        out.push_str(&format!("yaze_version={}\n", self.metadata.yaze_version));
        out.push_str(&format!("created_by={}\n", self.metadata.created_by));
        out.push_str(&format!("project_id={}\n", self.metadata.project_id));
        out.push_str(&format!("tags={}\n", self.metadata.tags.join(",")));
        out.push_str(&format!("write_policy={}\n\n", write_policy_name(self.write_policy)));

        out.push_str("[files]\n");
        out.push_str(&format!("rom_filename={}\n", self.files.rom_filename));
        out.push_str(&format!("rom_backup_folder={}\n", self.files.rom_backup_folder));
        out.push_str(&format!("code_folder={}\n", self.files.code_folder));
        out.push_str(&format!("assets_folder={}\n", self.files.assets_folder));
        out.push_str(&format!("patches_folder={}\n", self.files.patches_folder));
        out.push_str(&format!("labels_filename={}\n", self.files.labels_filename));
        out.push_str(&format!("symbols_filename={}\n", self.files.symbols_filename));
        out.push_str(&format!("output_folder={}\n", self.files.output_folder));
        out.push_str(&format!("custom_objects_folder={}\n", self.files.custom_objects_folder));
        out.push_str(&format!("additional_roms={}\n\n", self.files.additional_roms.join(",")));

        out.push_str("[feature_flags]\n");
        out.push_str(&format!("load_custom_overworld={}\n", format_bool(self.feature_flags.load_custom_overworld)));
        out.push_str(&format!(
            "apply_zs_custom_overworld_asm={}\n",
            format_bool(self.feature_flags.apply_zs_custom_overworld_asm)
        ));
        out.push_str(&format!("save_overworld_maps={}\n", format_bool(self.feature_flags.save_overworld_maps)));
        out.push_str(&format!("save_overworld_entrances={}\n", format_bool(self.feature_flags.save_overworld_entrances)));
        out.push_str(&format!("save_overworld_exits={}\n", format_bool(self.feature_flags.save_overworld_exits)));
        out.push_str(&format!("save_overworld_items={}\n", format_bool(self.feature_flags.save_overworld_items)));
        out.push_str(&format!(
            "save_overworld_properties={}\n",
            format_bool(self.feature_flags.save_overworld_properties)
        ));
        out.push_str(&format!("save_all_palettes={}\n", format_bool(self.feature_flags.save_all_palettes)));
        out.push_str(&format!("save_gfx_groups={}\n", format_bool(self.feature_flags.save_gfx_groups)));
        out.push_str(&format!("save_dungeon_maps={}\n", format_bool(self.feature_flags.save_dungeon_maps)));
        out.push_str(&format!("save_graphics_sheet={}\n", format_bool(self.feature_flags.save_graphics_sheet)));
        out.push_str(&format!("enable_custom_objects={}\n\n", format_bool(self.feature_flags.enable_custom_objects)));

        out.push_str("[workspace]\n");
        out.push_str(&format!("font_global_scale={}\n", self.workspace.font_global_scale));
        out.push_str(&format!("dark_mode={}\n", format_bool(self.workspace.dark_mode)));
        out.push_str(&format!("ui_theme={}\n", self.workspace.ui_theme));
        out.push_str(&format!("autosave_enabled={}\n", format_bool(self.workspace.autosave_enabled)));
        out.push_str(&format!("autosave_interval_secs={}\n", self.workspace.autosave_interval_secs));
        out.push_str(&format!("backup_on_save={}\n", format_bool(self.workspace.backup_on_save)));
        out.push_str(&format!("show_grid={}\n", format_bool(self.workspace.show_grid)));
        out.push_str(&format!("show_collision={}\n", format_bool(self.workspace.show_collision)));
        out.push_str(&format!("prefer_hmagic_names={}\n", format_bool(self.workspace.prefer_hmagic_names)));
        out.push_str(&format!("last_layout_preset={}\n", self.workspace.last_layout_preset));
        out.push_str(&format!("saved_layouts={}\n", self.workspace.saved_layouts.join(",")));
        out.push_str(&format!("recent_files={}\n\n", self.workspace.recent_files.join(",")));

        if !self.agent_settings.is_empty() {
            out.push_str("[agent_settings]\n");
            for (k, v) in &self.agent_settings {
                out.push_str(&format!("{k}={v}\n"));
            }
            out.push('\n');
        }

        if !self.workspace.custom_keybindings.is_empty() {
            out.push_str("[keybindings]\n");
            for (k, v) in &self.workspace.custom_keybindings {
                out.push_str(&format!("{k}={v}\n"));
            }
            out.push('\n');
        }

        if !self.workspace.editor_visibility.is_empty() {
            out.push_str("[editor_visibility]\n");
            for (k, v) in &self.workspace.editor_visibility {
                out.push_str(&format!("{k}={}\n", format_bool(*v)));
            }
            out.push('\n');
        }

        for (kind, labels) in &self.labels {
            if labels.is_empty() {
                continue;
            }
            out.push_str(&format!("[labels_{kind}]\n"));
            for (k, v) in labels {
                out.push_str(&format!("{k}={v}\n"));
            }
            out.push('\n');
        }

        out.push_str("[build]\n");
        out.push_str(&format!("build_script={}\n", self.build.build_script));
        out.push_str(&format!("output_folder={}\n", self.build.output_folder));
        out.push_str(&format!("git_repository={}\n", self.build.git_repository));
        out.push_str(&format!("track_changes={}\n", format_bool(self.build.track_changes)));
        out.push_str(&format!("build_configurations={}\n", self.build.build_configurations.join(",")));
        out.push_str(&format!("build_target={}\n", self.build.build_target));
        out.push_str(&format!("asm_entry_point={}\n", self.build.asm_entry_point));
        out.push_str(&format!("asm_sources={}\n", self.build.asm_sources.join(",")));
        out.push_str(&format!("last_build_hash={}\n", self.build.last_build_hash));
        out.push_str(&format!("build_number={}\n\n", self.build.build_number));

        out.push_str("[music]\n");
        out.push_str(&format!("persist_custom_music={}\n", format_bool(self.music.persist_custom_music)));
        out.push_str(&format!("storage_key={}\n", self.music.storage_key));
        out.push_str(&format!("last_saved_at={}\n\n", self.music.last_saved_at));

        if let Some(zs) = &self.zscream_compatibility {
            out.push_str("[zscream_compatibility]\n");
            out.push_str(&format!("original_project_file={}\n", zs.original_project_file));
            for (k, v) in &zs.mappings {
                out.push_str(&format!("{k}={v}\n"));
            }
            out.push('\n');
        }

        out.push_str("# End of yaze_core Project File\n");
        out
    }

    pub fn parse(content: &str) -> Result<Project> {
        let mut project = Project::default();
        let mut section = String::new();

        for raw_line in content.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                section = line[1..line.len() - 1].to_string();
                continue;
            }
            let Some((key, value)) = parse_key_value(line) else { continue };

            match section.as_str() {
                "project" => match key.as_str() {
                    "name" => project.name = value,
                    "description" => project.metadata.description = value,
                    "author" => project.metadata.author = value,
                    "license" => project.metadata.license = value,
                    "version" => project.metadata.version = value,
                    "created_date" => project.metadata.created_date = value,
                    "last_modified" => project.metadata.last_modified = value,
                    "yaze_version" => project.metadata.yaze_version = value,
                    "created_by" => project.metadata.created_by = value,
                    "project_id" => project.metadata.project_id = value,
                    "tags" => project.metadata.tags = parse_string_list(&value),
                    "write_policy" => project.write_policy = write_policy_from_name(&value),
                    _ => {} // unknown key in a known section: ignored (no sink field to preserve it in)
                },
                "files" => match key.as_str() {
                    "rom_filename" => project.files.rom_filename = value,
                    "rom_backup_folder" => project.files.rom_backup_folder = value,
                    "code_folder" => project.files.code_folder = value,
                    "assets_folder" => project.files.assets_folder = value,
                    "patches_folder" => project.files.patches_folder = value,
                    "labels_filename" => project.files.labels_filename = value,
                    "symbols_filename" => project.files.symbols_filename = value,
                    "output_folder" => project.files.output_folder = value,
                    "custom_objects_folder" => project.files.custom_objects_folder = value,
                    "additional_roms" => project.files.additional_roms = parse_string_list(&value),
                    _ => {}
                },
                "feature_flags" => match key.as_str() {
                    "load_custom_overworld" => project.feature_flags.load_custom_overworld = parse_bool(&value),
                    "apply_zs_custom_overworld_asm" => {
                        project.feature_flags.apply_zs_custom_overworld_asm = parse_bool(&value)
                    }
                    "save_overworld_maps" => project.feature_flags.save_overworld_maps = parse_bool(&value),
                    "save_overworld_entrances" => project.feature_flags.save_overworld_entrances = parse_bool(&value),
                    "save_overworld_exits" => project.feature_flags.save_overworld_exits = parse_bool(&value),
                    "save_overworld_items" => project.feature_flags.save_overworld_items = parse_bool(&value),
                    "save_overworld_properties" => {
                        project.feature_flags.save_overworld_properties = parse_bool(&value)
                    }
                    "save_all_palettes" => project.feature_flags.save_all_palettes = parse_bool(&value),
                    "save_gfx_groups" => project.feature_flags.save_gfx_groups = parse_bool(&value),
                    "save_dungeon_maps" => project.feature_flags.save_dungeon_maps = parse_bool(&value),
                    "save_graphics_sheet" => project.feature_flags.save_graphics_sheet = parse_bool(&value),
                    "enable_custom_objects" => project.feature_flags.enable_custom_objects = parse_bool(&value),
                    _ => {}
                },
                "workspace" => match key.as_str() {
                    "font_global_scale" => project.workspace.font_global_scale = value.parse().unwrap_or(1.0),
                    "dark_mode" => project.workspace.dark_mode = parse_bool(&value),
                    "ui_theme" => project.workspace.ui_theme = value,
                    "autosave_enabled" => project.workspace.autosave_enabled = parse_bool(&value),
                    "autosave_interval_secs" => {
                        project.workspace.autosave_interval_secs = value.parse().unwrap_or(300.0)
                    }
                    "backup_on_save" => project.workspace.backup_on_save = parse_bool(&value),
                    "show_grid" => project.workspace.show_grid = parse_bool(&value),
                    "show_collision" => project.workspace.show_collision = parse_bool(&value),
                    "prefer_hmagic_names" => project.workspace.prefer_hmagic_names = parse_bool(&value),
                    "last_layout_preset" => project.workspace.last_layout_preset = value,
                    "saved_layouts" => project.workspace.saved_layouts = parse_string_list(&value),
                    "recent_files" => project.workspace.recent_files = parse_string_list(&value),
                    _ => {}
                },
                "agent_settings" => {
                    project.agent_settings.insert(key, value);
                }
                "keybindings" => {
                    project.workspace.custom_keybindings.insert(key, value);
                }
                "editor_visibility" => {
                    project.workspace.editor_visibility.insert(key, parse_bool(&value));
                }
                "build" => match key.as_str() {
                    "build_script" => project.build.build_script = value,
                    "output_folder" => project.build.output_folder = value,
                    "git_repository" => project.build.git_repository = value,
                    "track_changes" => project.build.track_changes = parse_bool(&value),
                    "build_configurations" => project.build.build_configurations = parse_string_list(&value),
                    "build_target" => project.build.build_target = value,
                    "asm_entry_point" => project.build.asm_entry_point = value,
                    "asm_sources" => project.build.asm_sources = parse_string_list(&value),
                    "last_build_hash" => project.build.last_build_hash = value,
                    "build_number" => project.build.build_number = value.parse().unwrap_or(0),
                    _ => {}
                },
                "music" => match key.as_str() {
                    "persist_custom_music" => project.music.persist_custom_music = parse_bool(&value),
                    "storage_key" => project.music.storage_key = value,
                    "last_saved_at" => project.music.last_saved_at = value,
                    _ => {}
                },
                "zscream_compatibility" => {
                    let zs = project.zscream_compatibility.get_or_insert_with(ZScreamCompatibility::default);
                    if key == "original_project_file" {
                        zs.original_project_file = value;
                    } else {
                        zs.mappings.insert(key, value);
                    }
                }
                s if s.starts_with("labels_") => {
                    let kind = s.trim_start_matches("labels_").to_string();
                    project.labels.entry(kind).or_default().insert(key, value);
                }
                _ => {} // unknown section: ignored, per spec.md §6.2
            }
        }
        Ok(project)
    }

    /// Best-effort `.zsproj` import: remaps known ZScream key names into
    /// this format's names and stashes the rest verbatim under
    /// `[zscream_compatibility]`, never failing the whole import.
    pub fn import_zscream_mappings(&mut self, zsproj_path: &str, raw_pairs: &[(String, String)]) {
        let mut compat = self.zscream_compatibility.take().unwrap_or_default();
        compat.original_project_file = zsproj_path.to_string();
        for (key, value) in raw_pairs {
            if let Some((_, mapped)) = ZSCREAM_KEY_ALIASES.iter().find(|(zs_key, _)| zs_key == key) {
                match *mapped {
                    "rom_filename" => self.files.rom_filename = value.clone(),
                    "name" => self.name = value.clone(),
                    "apply_zs_custom_overworld_asm" => {
                        self.feature_flags.apply_zs_custom_overworld_asm = parse_bool(value)
                    }
                    _ => {}
                }
            } else {
                compat.mappings.insert(key.clone(), value.clone());
            }
        }
        self.zscream_compatibility = Some(compat);
    }

    /// Validates required fields are present before a save is attempted.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Configuration("project has no name".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_trips_through_serialize_and_parse() {
        let mut project = Project::new("hyrule_hack");
        project.metadata.author = "student".into();
        project.metadata.tags = vec!["overworld".into(), "wip".into()];
        project.files.rom_filename = "hack.sfc".into();
        project.feature_flags.save_dungeon_maps = true;
        project.labels.entry("overworld".to_string()).or_default().insert("0x05".into(), "Kakariko".into());
        project.write_policy = WritePolicy::Warn;

        let text = project.serialize();
        let reparsed = Project::parse(&text).unwrap();

        assert_eq!(reparsed.name, "hyrule_hack");
        assert_eq!(reparsed.metadata.author, "student");
        assert_eq!(reparsed.metadata.tags, vec!["overworld", "wip"]);
        assert_eq!(reparsed.files.rom_filename, "hack.sfc");
        assert!(reparsed.feature_flags.save_dungeon_maps);
        assert_eq!(reparsed.labels["overworld"]["0x05"], "Kakariko");
        assert_eq!(reparsed.write_policy, WritePolicy::Warn);
    }

    #[test]
    fn unknown_section_is_ignored_without_erroring() {
        let text = "[totally_unknown]\nfoo=bar\n[project]\nname=ok\n";
        let project = Project::parse(text).unwrap();
        assert_eq!(project.name, "ok");
    }

    #[test]
    fn zscream_import_remaps_known_keys_and_keeps_the_rest() {
        let mut project = Project::default();
        project.import_zscream_mappings(
            "old.zsproj",
            &[("ROMFilename".into(), "zelda.sfc".into()), ("CustomField".into(), "42".into())],
        );
        assert_eq!(project.files.rom_filename, "zelda.sfc");
        let zs = project.zscream_compatibility.unwrap();
        assert_eq!(zs.original_project_file, "old.zsproj");
        assert_eq!(zs.mappings.get("CustomField").unwrap(), "42");
    }

    #[test]
    fn empty_name_fails_validation() {
        let project = Project::default();
        assert!(project.validate().is_err());
    }

    #[test]
    fn sanitize_storage_key_replaces_non_alphanumeric() {
        assert_eq!(sanitize_storage_key("Hyrule Hack!"), "Hyrule_Hack_");
        assert_eq!(sanitize_storage_key(""), "project");
    }
}
