use serde::Serialize;
use uuid::Uuid;

use crate::backend::SurfaceConfig;
use crate::ledger::LedgerStats;

/// What one [`crate::engine::BoardEngine::tick`] submitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameStats {
    pub draw_calls: usize,
    /// Instances drawn across every store, the substrate counting as one.
    pub instances: usize,
    /// Instance buffers rewritten this frame.
    pub uploads: usize,
}

impl FrameStats {
    pub fn accumulate(&mut self, other: &FrameStats) {
        self.draw_calls += other.draw_calls;
        self.instances += other.instances;
        self.uploads += other.uploads;
    }
}

/// Diagnostic snapshot of an engine session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStats {
    pub session: Uuid,
    pub pads: usize,
    pub traces: usize,
    pub trace_segments: usize,
    pub holes: usize,
    pub ledger: LedgerStats,
    pub live_allocations: usize,
    pub surface: Option<SurfaceConfig>,
    pub frames: u64,
    pub disposed: bool,
}
