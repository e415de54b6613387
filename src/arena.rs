//! C11 — graphics arena. Spec.md's one deliberately process-wide component:
//! a texture-upload command queue plus a palette/sheet change broadcaster.
//! Grounded on the same listener-registration shape `palette.rs`'s
//! `PaletteEngine::register_listener` already uses (integer handles for
//! deterministic deregistration, spec.md §9 "Global state"), generalized
//! to the two notification kinds C11's contract names (`NotifyPaletteChanged`,
//! `NotifySheetModified`) plus the texture command queue `QueueTextureCommand`
//! asks for.
//!
//! This crate models "process-wide" as a single long-lived owned value
//! (constructed once by whatever process embeds the engine and passed
//! around) rather than a `static` — nothing here needs `unsafe` to get the
//! single-owner semantics the spec describes, and every other component in
//! this crate avoids global mutable state on principle.

use std::collections::VecDeque;

use hashbrown::HashMap;

pub type ListenerId = u64;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TextureOp {
    Create,
    Update,
    Destroy,
}

/// One enqueued texture-upload instruction. `area_id` identifies the
/// bitmap; the GUI-side consumer (out of this crate's scope) drains these
/// FIFO per bitmap in its frame loop, per spec.md §5 "Ordering guarantees".
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TextureCommand {
    pub op: TextureOp,
    pub area_id: u8,
}

/// Process-wide owner of the texture-upload queue and the palette/sheet
/// change broadcasters. Holds no graphics data itself — sheets, atlases,
/// and area bitmaps live in `overworld::Overworld`; this is purely the
/// command queue and notification bus between it and a renderer.
#[derive(Default)]
pub struct GraphicsArena {
    commands: VecDeque<TextureCommand>,
    palette_listeners: HashMap<ListenerId, Box<dyn FnMut(&str, usize) + Send>>,
    sheet_listeners: HashMap<ListenerId, Box<dyn FnMut(usize) + Send>>,
    next_listener_id: ListenerId,
    shut_down: bool,
}

impl GraphicsArena {
    pub fn new() -> Self {
        GraphicsArena::default()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Enqueues a texture command. A no-op after `shutdown()` — the arena
    /// should not be re-armed once the renderer has torn down.
    pub fn queue_texture_command(&mut self, op: TextureOp, area_id: u8) {
        if self.shut_down {
            return;
        }
        self.commands.push_back(TextureCommand { op, area_id });
    }

    /// Drains the full queue in FIFO order; the caller (a renderer's frame
    /// loop, out of this crate's scope) is expected to call this once per
    /// frame.
    pub fn drain_texture_commands(&mut self) -> Vec<TextureCommand> {
        self.commands.drain(..).collect()
    }

    pub fn pending_texture_command_count(&self) -> usize {
        self.commands.len()
    }

    /// Registers a callback invoked by `notify_palette_changed`. Returns a
    /// handle for `deregister_palette_listener`, per spec.md §9's
    /// "deterministic deregistration" requirement.
    pub fn register_palette_listener<F>(&mut self, f: F) -> ListenerId
    where
        F: FnMut(&str, usize) + Send + 'static,
    {
        let id = self.next_listener_id;
        self.next_listener_id += 1;
        self.palette_listeners.insert(id, Box::new(f));
        id
    }

    pub fn deregister_palette_listener(&mut self, id: ListenerId) {
        self.palette_listeners.remove(&id);
    }

    /// C3 calls this after its color buffer has already been updated
    /// (spec.md §5 "Ordering guarantees"), so every listener that re-reads
    /// the group on notification sees the new data.
    pub fn notify_palette_changed(&mut self, group: &str, row_idx: usize) {
        for listener in self.palette_listeners.values_mut() {
            listener(group, row_idx);
        }
    }

    pub fn register_sheet_listener<F>(&mut self, f: F) -> ListenerId
    where
        F: FnMut(usize) + Send + 'static,
    {
        let id = self.next_listener_id;
        self.next_listener_id += 1;
        self.sheet_listeners.insert(id, Box::new(f));
        id
    }

    pub fn deregister_sheet_listener(&mut self, id: ListenerId) {
        self.sheet_listeners.remove(&id);
    }

    /// Same pattern as `notify_palette_changed`, for tile8 edits that
    /// originate in the pixel editor (out of this crate's scope).
    pub fn notify_sheet_modified(&mut self, sheet_id: usize) {
        for listener in self.sheet_listeners.values_mut() {
            listener(sheet_id);
        }
    }

    /// Must run before the renderer tears down (spec.md §4.11). Drops
    /// every listener and clears the queue; further `queue_texture_command`
    /// calls become no-ops.
    pub fn shutdown(&mut self) {
        self.commands.clear();
        self.palette_listeners.clear();
        self.sheet_listeners.clear();
        self.shut_down = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn texture_commands_drain_fifo() {
        let mut arena = GraphicsArena::new();
        arena.queue_texture_command(TextureOp::Create, 1);
        arena.queue_texture_command(TextureOp::Update, 1);
        arena.queue_texture_command(TextureOp::Destroy, 2);
        let drained = arena.drain_texture_commands();
        assert_eq!(
            drained,
            vec![
                TextureCommand { op: TextureOp::Create, area_id: 1 },
                TextureCommand { op: TextureOp::Update, area_id: 1 },
                TextureCommand { op: TextureOp::Destroy, area_id: 2 },
            ]
        );
        assert!(arena.drain_texture_commands().is_empty());
    }

    #[test]
    fn palette_listener_fires_on_notify_and_can_be_deregistered() {
        let mut arena = GraphicsArena::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let id = arena.register_palette_listener(move |_g, _r| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        arena.notify_palette_changed("ow_main", 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        arena.deregister_palette_listener(id);
        arena.notify_palette_changed("ow_main", 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sheet_modified_reaches_registered_listeners() {
        let mut arena = GraphicsArena::new();
        let seen = Arc::new(AtomicUsize::new(99));
        let seen2 = seen.clone();
        arena.register_sheet_listener(move |sheet_id| {
            seen2.store(sheet_id, Ordering::SeqCst);
        });
        arena.notify_sheet_modified(42);
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn shutdown_clears_state_and_ignores_further_commands() {
        let mut arena = GraphicsArena::new();
        arena.register_palette_listener(|_, _| {});
        arena.queue_texture_command(TextureOp::Create, 0);
        arena.shutdown();
        assert!(arena.is_shut_down());
        assert_eq!(arena.pending_texture_command_count(), 0);
        arena.queue_texture_command(TextureOp::Create, 0);
        assert_eq!(arena.pending_texture_command_count(), 0);
    }
}
