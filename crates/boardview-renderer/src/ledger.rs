//! Bulk teardown bookkeeping.
//!
//! The ledger records resource identity only. Stores own their allocations;
//! the ledger is how the engine releases all of them exactly once when a
//! board is reloaded or the engine goes away.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::backend::{GraphicsBackend, ResourceHandle};
use crate::render_store::RenderStore;

/// Tracked handle counts per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub geometries: usize,
    pub materials: usize,
    pub meshes: usize,
    pub textures: usize,
    pub buffers: usize,
}

impl LedgerStats {
    pub fn total(&self) -> usize {
        self.geometries + self.materials + self.meshes + self.textures + self.buffers
    }
}

/// Outcome of one [`ResourceLedger::dispose_all`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DisposalReport {
    pub released: usize,
    /// Handles the backend refused to destroy. They are dropped from the
    /// ledger regardless, so they are never retried.
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct ResourceLedger {
    // Ordered by handle variant: meshes go before the programs, geometries
    // and buffers they reference.
    tracked: BTreeSet<ResourceHandle>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a handle. Returns false if it was already tracked.
    pub fn track(&mut self, handle: ResourceHandle) -> bool {
        self.tracked.insert(handle)
    }

    /// Record every handle a store owns. Idempotent; returns how many were new.
    pub fn track_store(&mut self, store: &RenderStore) -> usize {
        let added = store
            .resource_handles()
            .into_iter()
            .filter(|h| self.track(*h))
            .count();
        if added > 0 {
            log::debug!("Ledger now tracks {} handles (+{} from {} store)", self.len(), added, store.kind());
        }
        added
    }

    pub fn contains(&self, handle: &ResourceHandle) -> bool {
        self.tracked.contains(handle)
    }

    /// Destroy every tracked handle once and empty the ledger. A failing
    /// destroy is logged and does not stop the rest.
    pub fn dispose_all(&mut self, backend: &mut dyn GraphicsBackend) -> DisposalReport {
        let mut report = DisposalReport::default();
        if self.tracked.is_empty() {
            return report;
        }
        for handle in std::mem::take(&mut self.tracked) {
            match backend.destroy(handle) {
                Ok(()) => report.released += 1,
                Err(e) => {
                    log::warn!("Failed to release {:?}: {}", handle, e);
                    report.failed += 1;
                }
            }
        }
        log::info!(
            "Released {} GPU resources ({} failed)",
            report.released,
            report.failed
        );
        report
    }

    pub fn stats(&self) -> LedgerStats {
        let mut stats = LedgerStats::default();
        for handle in &self.tracked {
            match handle {
                ResourceHandle::Geometry(_) => stats.geometries += 1,
                ResourceHandle::Program(_) => stats.materials += 1,
                ResourceHandle::Mesh(_) => stats.meshes += 1,
                ResourceHandle::Texture(_) => stats.textures += 1,
                ResourceHandle::Buffer(_) => stats.buffers += 1,
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appearance::{AppearanceFactory, AppearancePalette};
    use crate::headless::HeadlessBackend;
    use crate::render_store::HandleKind;

    fn stores(backend: &mut HeadlessBackend) -> Vec<RenderStore> {
        let factory = AppearanceFactory::new(AppearancePalette::default());
        HandleKind::ALL
            .iter()
            .map(|kind| RenderStore::create(backend, &factory, *kind, 8).unwrap())
            .collect()
    }

    #[test]
    fn test_track_store_is_idempotent() {
        let mut backend = HeadlessBackend::new();
        let stores = stores(&mut backend);
        let mut ledger = ResourceLedger::new();
        let first = ledger.track_store(&stores[0]);
        assert_eq!(first, 6);
        assert_eq!(ledger.track_store(&stores[0]), 0);
        assert_eq!(ledger.len(), 6);
    }

    #[test]
    fn test_dispose_all_releases_everything_once() {
        let mut backend = HeadlessBackend::new();
        let stores = stores(&mut backend);
        let mut ledger = ResourceLedger::new();
        for store in &stores {
            ledger.track_store(store);
        }
        let stats = ledger.stats();
        assert_eq!(stats.meshes, 8);
        assert_eq!(stats.geometries, 8);
        assert_eq!(stats.materials, 4);
        assert_eq!(stats.buffers, 3);
        assert_eq!(stats.textures, 1);
        assert_eq!(stats.total(), backend.live().total());

        let report = ledger.dispose_all(&mut backend);
        assert_eq!(report.released, stats.total());
        assert_eq!(report.failed, 0);
        assert_eq!(backend.live().total(), 0);
        assert!(ledger.is_empty());

        for handle in stores.iter().flat_map(|s| s.resource_handles()) {
            assert_eq!(backend.destroy_count(handle), 1);
        }
    }

    #[test]
    fn test_dispose_twice_is_noop() {
        let mut backend = HeadlessBackend::new();
        let stores = stores(&mut backend);
        let mut ledger = ResourceLedger::new();
        ledger.track_store(&stores[1]);
        ledger.dispose_all(&mut backend);
        let second = ledger.dispose_all(&mut backend);
        assert_eq!(second, DisposalReport::default());
        assert_eq!(ledger.stats(), LedgerStats::default());
    }

    #[test]
    fn test_dispose_continues_past_failures() {
        let mut backend = HeadlessBackend::new();
        let stores = stores(&mut backend);
        let mut ledger = ResourceLedger::new();
        ledger.track_store(&stores[0]);
        let stray = stores[0].resource_handles()[2];
        backend.destroy(stray).unwrap();

        let report = ledger.dispose_all(&mut backend);
        assert_eq!(report.failed, 1);
        assert_eq!(report.released, 5);
        assert!(ledger.is_empty());
    }
}
