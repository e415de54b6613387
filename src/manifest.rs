//! C10 — hack manifest: declares which ROM address ranges belong to other
//! patches, and the write policy to apply when a save would touch one.
//!
//! No file in the retrieval pack implements this directly; the closest
//! precedents are `project.cc`'s `patches_folder` field and its
//! `[zscream_compatibility]` section (both acknowledge "this ROM carries
//! someone else's patch" without modeling address ownership). This module
//! is the honest extrapolation spec.md §3.3/§6/§7 asks for — logged as a
//! weak-precedent entry in DESIGN.md rather than claimed as a strong match.

use std::path::Path;

use json_pretty_compact::PrettyCompactFormatter;
use serde::Serialize;
use serde_json::Serializer;

use crate::error::{Error, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WritePolicy {
    Allow,
    Warn,
    Block,
}

/// One contiguous SNES address range owned by a third-party module/patch.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Module {
    pub name: String,
    pub start: u32, // inclusive, SNES logical address
    pub end: u32,   // inclusive
}

impl Module {
    pub fn contains(&self, snes_addr: u32) -> bool {
        snes_addr >= self.start && snes_addr <= self.end
    }

    fn overlaps(&self, start: u32, end: u32) -> bool {
        self.start <= end && start <= self.end
    }
}

/// One detected write that lands inside a registered module's range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conflict {
    pub module_name: String,
    pub write_start: u32,
    pub write_end: u32,
}

#[derive(Default)]
pub struct HackManifest {
    modules: Vec<Module>,
    policy: WritePolicy,
}

impl Default for WritePolicy {
    fn default() -> Self {
        WritePolicy::Allow
    }
}

impl HackManifest {
    pub fn new(policy: WritePolicy) -> Self {
        HackManifest { modules: Vec::new(), policy }
    }

    pub fn policy(&self) -> WritePolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: WritePolicy) {
        self.policy = policy;
    }

    pub fn register(&mut self, module: Module) {
        self.modules.push(module);
    }

    /// Scans `patches_folder` (the project's `[files] patches_folder`, see
    /// `project::ProjectFiles`) for `*.module.json` descriptor files and
    /// registers each one, same directory-glob-then-load shape as the
    /// teacher's `persist.rs::load_palettes` (`glob::glob` over a
    /// `*.json` pattern, one `serde_json` parse per match). A descriptor
    /// that fails to parse is skipped rather than aborting the whole scan,
    /// so one malformed file doesn't block loading the rest of a hack's
    /// patches.
    pub fn load_modules_from_folder(&mut self, patches_folder: &Path) -> Result<usize> {
        let pattern = format!("{}/*.module.json", patches_folder.display());
        let mut loaded = 0;
        for entry in glob::glob(&pattern)? {
            let path = entry?;
            let text = match std::fs::read_to_string(&path) {
                Ok(t) => t,
                Err(e) => {
                    log::warn!("skipping unreadable patch module {}: {e}", path.display());
                    continue;
                }
            };
            match serde_json::from_str::<Module>(&text) {
                Ok(module) => {
                    self.register(module);
                    loaded += 1;
                }
                Err(e) => log::warn!("skipping malformed patch module {}: {e}", path.display()),
            }
        }
        Ok(loaded)
    }

    /// Writes every registered module back out as one `*.module.json` file
    /// per module, same pretty-compact formatter the teacher's
    /// `persist.rs::save_json` uses for its palette/state side files. This
    /// is the write-side counterpart to [`Self::load_modules_from_folder`],
    /// so a hack's patch registry round-trips through a patches folder.
    pub fn save_modules_to(&self, patches_folder: &Path) -> Result<()> {
        std::fs::create_dir_all(patches_folder)?;
        for module in &self.modules {
            let formatter = PrettyCompactFormatter::new();
            let mut bytes = Vec::new();
            let mut ser = Serializer::with_formatter(&mut bytes, formatter);
            module.serialize(&mut ser)?;
            let path = patches_folder.join(format!("{}.module.json", module.name));
            std::fs::write(path, &bytes)?;
        }
        Ok(())
    }

    pub fn is_address_owned(&self, snes_addr: u32) -> Option<&Module> {
        self.modules.iter().find(|m| m.contains(snes_addr))
    }

    /// Checks a set of projected SNES write ranges against every registered
    /// module. Under `Allow`, always returns Ok. Under `Warn`, returns Ok
    /// but the caller is expected to have logged (done by C8, not here, to
    /// keep this module free of side effects). Under `Block`, returns
    /// `Conflict` naming every overlapping module before any byte is
    /// written (spec.md B4).
    pub fn analyze_write_ranges(&self, ranges: &[(u32, u32)]) -> Result<()> {
        if self.policy == WritePolicy::Allow {
            return Ok(());
        }
        let mut conflicts = Vec::new();
        for &(start, end) in ranges {
            for module in &self.modules {
                if module.overlaps(start, end) {
                    conflicts.push(Conflict {
                        module_name: module.name.clone(),
                        write_start: start,
                        write_end: end,
                    });
                }
            }
        }
        if conflicts.is_empty() {
            return Ok(());
        }
        match self.policy {
            WritePolicy::Block => Err(Error::Conflict(conflicts)),
            WritePolicy::Warn => {
                for c in &conflicts {
                    log::warn!(
                        "write [{:#08X}..{:#08X}] overlaps hack-manifest module '{}'",
                        c.write_start,
                        c.write_end,
                        c.module_name
                    );
                }
                Ok(())
            }
            WritePolicy::Allow => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_modules_from_folder_registers_valid_descriptors_and_skips_bad_ones() {
        let dir = std::env::temp_dir().join(format!("yaze_core_manifest_test_{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("patch_a.module.json"),
            r#"{"name":"patch_a","start":57344,"end":57599}"#,
        )
        .unwrap();
        std::fs::write(dir.join("broken.module.json"), "not json").unwrap();
        std::fs::write(dir.join("unrelated.txt"), "ignored").unwrap();

        let mut manifest = HackManifest::new(WritePolicy::Block);
        let loaded = manifest.load_modules_from_folder(&dir).unwrap();
        assert_eq!(loaded, 1);
        assert_eq!(manifest.is_address_owned(57400).unwrap().name, "patch_a");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn save_modules_to_then_load_modules_from_folder_round_trips() {
        let dir = std::env::temp_dir().join(format!("yaze_core_manifest_roundtrip_{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut manifest = HackManifest::new(WritePolicy::Warn);
        manifest.register(Module { name: "patch_a".into(), start: 0xE0000, end: 0xE00FF });
        manifest.register(Module { name: "patch_b".into(), start: 0xF0000, end: 0xF0FFF });
        manifest.save_modules_to(&dir).unwrap();

        let mut reloaded = HackManifest::new(WritePolicy::Warn);
        let loaded = reloaded.load_modules_from_folder(&dir).unwrap();
        assert_eq!(loaded, 2);
        assert_eq!(reloaded.is_address_owned(0xE0050).unwrap().name, "patch_a");
        assert_eq!(reloaded.is_address_owned(0xF0500).unwrap().name, "patch_b");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn allow_policy_never_conflicts() {
        let mut manifest = HackManifest::new(WritePolicy::Allow);
        manifest.register(Module { name: "patch".into(), start: 0x0E0000, end: 0x0E00FF });
        assert!(manifest.analyze_write_ranges(&[(0x0E0000, 0x0E0010)]).is_ok());
    }

    #[test]
    fn block_policy_reports_overlapping_modules() {
        let mut manifest = HackManifest::new(WritePolicy::Block);
        manifest.register(Module { name: "test_patch".into(), start: 0x0E0000, end: 0x0E00FF });
        let err = manifest.analyze_write_ranges(&[(0x0E0050, 0x0E0060)]);
        match err {
            Err(Error::Conflict(conflicts)) => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].module_name, "test_patch");
            }
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn non_overlapping_write_is_fine_under_block() {
        let mut manifest = HackManifest::new(WritePolicy::Block);
        manifest.register(Module { name: "test_patch".into(), start: 0x0E0000, end: 0x0E00FF });
        assert!(manifest.analyze_write_ranges(&[(0x0F0000, 0x0F0010)]).is_ok());
    }

    #[test]
    fn is_address_owned_finds_the_right_module() {
        let mut manifest = HackManifest::new(WritePolicy::Warn);
        manifest.register(Module { name: "a".into(), start: 0, end: 0xFF });
        manifest.register(Module { name: "b".into(), start: 0x1000, end: 0x1FFF });
        assert_eq!(manifest.is_address_owned(0x1500).unwrap().name, "b");
        assert!(manifest.is_address_owned(0x500).is_none());
    }
}
