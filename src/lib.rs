//! ROM data engine for a 16-bit overworld editor.
//!
//! Each module below corresponds to one `[MODULE]` of the specification
//! this crate implements; see `DESIGN.md` for the full grounding ledger.

pub mod area;
pub mod arena;
pub mod entities;
pub mod error;
pub mod gfx;
pub mod manifest;
pub mod overworld;
pub mod palette;
pub mod project;
pub mod rom;
pub mod save;
pub mod tiles;
pub mod version;

pub use area::{Area, AreaSize, AreaTable, Mosaic};
pub use arena::{GraphicsArena, ListenerId, TextureCommand, TextureOp};
pub use entities::{Entrance, EntityHandle, EntityStore, Exit, Item, Sprite};
pub use error::{Error, Result};
pub use manifest::{Conflict, HackManifest, Module as HackModule, WritePolicy};
pub use overworld::{AreaBitmap, Overworld};
pub use palette::{ColorRgb, PaletteEngine, PaletteRow};
pub use project::Project;
pub use rom::Rom;
pub use version::Version;
