use glam::Vec2;
use std::sync::atomic::{AtomicU32, Ordering};

bitflags::bitflags! {
    /// Debug overlays that can be toggled at runtime.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DebugFlags: u32 {
        /// Oriented label boxes and the broad-phase grid.
        const LABELS = 1 << 0;
    }
}

/// Debug flags shared between the UI and the render thread.
#[derive(Debug, Default)]
pub struct DebugSettings {
    bits: AtomicU32,
}

impl DebugSettings {
    pub fn new(flags: DebugFlags) -> Self {
        Self {
            bits: AtomicU32::new(flags.bits()),
        }
    }

    pub fn flags(&self) -> DebugFlags {
        DebugFlags::from_bits_truncate(self.bits.load(Ordering::Relaxed))
    }

    pub fn contains(&self, flag: DebugFlags) -> bool {
        self.flags().contains(flag)
    }

    pub fn set(&self, flag: DebugFlags, enabled: bool) {
        if enabled {
            self.bits.fetch_or(flag.bits(), Ordering::Relaxed);
        } else {
            self.bits.fetch_and(!flag.bits(), Ordering::Relaxed);
        }
    }

    pub fn toggle(&self, flag: DebugFlags) {
        self.bits.fetch_xor(flag.bits(), Ordering::Relaxed);
    }
}

/// Immediate-mode sink for debug geometry, in screen pixels.
pub trait DebugCanvas {
    /// Closed outline through `points`.
    fn draw_poly(&mut self, points: &[Vec2], resolution: Vec2);
    fn draw_rect(&mut self, min: Vec2, max: Vec2, resolution: Vec2);
}
