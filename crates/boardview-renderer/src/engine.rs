//! Composition root: one board, its render stores, the ledger that tears
//! them down, and the pointer pipeline from pick to highlight.

use glam::Vec2;
use uuid::Uuid;

use boardview_core::{Board, EntityKind, Hole, Layer, Pad, PadShape, Point, Size, Slot, Trace};
use boardview_io::{export_board, import_board, validate_document, BoardDocument, ImportReport};

use crate::appearance::AppearanceFactory;
use crate::backend::{GraphicsBackend, SurfaceConfig};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::interaction::{HighlightSink, InteractionState, InteractionStateMachine, Target};
use crate::ledger::{LedgerStats, ResourceLedger};
use crate::picking::{Hit, HitTestEngine};
use crate::render_data::{EngineStats, FrameStats};
use crate::render_store::{HandleKind, RenderHandle, RenderStore};
use crate::viewpoint::Viewpoint;

/// The render stores of one session, addressable by kind.
#[derive(Debug, Default)]
struct StoreSet {
    stores: Vec<RenderStore>,
}

impl StoreSet {
    fn create(
        backend: &mut dyn GraphicsBackend,
        factory: &AppearanceFactory,
        config: &EngineConfig,
        ledger: &mut ResourceLedger,
    ) -> Result<Self, EngineError> {
        let mut set = StoreSet::default();
        for kind in HandleKind::ALL {
            let capacity = kind
                .entity_kind()
                .map_or(1, |k| config.board.capacities.for_kind(k));
            let store = RenderStore::create(backend, factory, kind, capacity)?;
            ledger.track_store(&store);
            set.stores.push(store);
        }
        Ok(set)
    }

    fn get_mut(&mut self, kind: HandleKind) -> Option<&mut RenderStore> {
        self.stores.iter_mut().find(|s| s.kind() == kind)
    }

    fn handles(&self) -> Vec<RenderHandle> {
        self.stores.iter().map(|s| s.handle()).collect()
    }
}

impl HighlightSink for StoreSet {
    fn set_hovered(&mut self, kind: EntityKind, slot: Option<Slot>) {
        if let Some(program) = self
            .get_mut(HandleKind::from_entity(kind))
            .and_then(|s| s.appearance_mut())
        {
            program.set_hovered(slot);
        }
    }

    fn set_selected(&mut self, kind: EntityKind, slot: Option<Slot>) {
        if let Some(program) = self
            .get_mut(HandleKind::from_entity(kind))
            .and_then(|s| s.appearance_mut())
        {
            program.set_selected(slot);
        }
    }
}

#[derive(Debug)]
pub struct BoardEngine<B: GraphicsBackend> {
    session: Uuid,
    config: EngineConfig,
    backend: B,
    surface: Option<SurfaceConfig>,
    factory: AppearanceFactory,
    board: Board,
    stores: StoreSet,
    ledger: ResourceLedger,
    picker: HitTestEngine,
    interaction: InteractionStateMachine,
    interactable: Vec<RenderHandle>,
    viewpoint: Viewpoint,
    clock: f32,
    frames: u64,
    frame_scheduled: bool,
    disposed: bool,
}

impl<B: GraphicsBackend> BoardEngine<B> {
    /// Bring up the surface, the board and one render store per kind.
    ///
    /// The configured surface is tried first and the fallback once; if both
    /// are refused the engine does not start.
    pub fn new(mut backend: B, config: EngineConfig) -> Result<Self, EngineError> {
        let surface = configure_surface(&mut backend, &config)?;
        let board = Board::new(config.dimensions, &config.board)?;
        let factory = AppearanceFactory::new(config.palette);
        let mut ledger = ResourceLedger::new();
        let stores = StoreSet::create(&mut backend, &factory, &config, &mut ledger)?;

        let mut viewpoint = Viewpoint::default();
        viewpoint.fit_board(&board.dimensions());

        let engine = Self {
            session: Uuid::new_v4(),
            interactable: stores.handles(),
            picker: HitTestEngine::new(config.hit_tolerance),
            config,
            backend,
            surface: Some(surface),
            factory,
            board,
            stores,
            ledger,
            interaction: InteractionStateMachine::new(),
            viewpoint,
            clock: 0.0,
            frames: 0,
            frame_scheduled: true,
            disposed: false,
        };
        log::info!(
            "Board engine {} started ({}x MSAA, {} tracked resources)",
            engine.session,
            surface.msaa_samples,
            engine.ledger.len()
        );
        Ok(engine)
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn surface(&self) -> Option<&SurfaceConfig> {
        self.surface.as_ref()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn is_frame_scheduled(&self) -> bool {
        self.frame_scheduled
    }

    // ── Authoring ────────────────────────────────────────────────────

    /// Add a pad. An empty id is replaced with a generated one.
    pub fn add_pad(&mut self, mut pad: Pad) -> bool {
        if self.disposed {
            return false;
        }
        if pad.id.is_empty() {
            pad.id = generated_id("pad");
        }
        self.board.add_pad(pad)
    }

    /// Add a trace; returns the number of segments committed.
    pub fn add_trace(&mut self, mut trace: Trace) -> usize {
        if self.disposed {
            return 0;
        }
        if trace.id.is_empty() {
            trace.id = generated_id("trace");
        }
        self.board.add_trace(trace)
    }

    pub fn add_hole(&mut self, mut hole: Hole) -> bool {
        if self.disposed {
            return false;
        }
        if hole.id.is_empty() {
            hole.id = generated_id("hole");
        }
        self.board.add_hole(hole)
    }

    pub fn remove(&mut self, kind: EntityKind, id: &str) -> bool {
        let removed = self.board.remove(kind, id);
        if removed {
            self.reconcile();
        }
        removed
    }

    pub fn clear(&mut self) {
        self.board.clear();
        self.reconcile();
    }

    /// Move an entity so its anchor (pad or hole centre, first trace
    /// waypoint) lands on `anchor`. Slots are kept.
    pub fn move_entity(&mut self, kind: EntityKind, id: &str, anchor: Point) -> bool {
        if self.disposed {
            return false;
        }
        let moved = self.board.move_entity(kind, id, anchor);
        self.after_edit(moved)
    }

    pub fn update_pad_size(&mut self, id: &str, size: Size) -> bool {
        if self.disposed {
            return false;
        }
        let resized = self.board.update_pad_size(id, size);
        self.after_edit(resized)
    }

    pub fn update_hole_diameter(&mut self, id: &str, diameter: f64) -> bool {
        if self.disposed {
            return false;
        }
        let resized = self.board.update_hole_diameter(id, diameter);
        self.after_edit(resized)
    }

    pub fn update_trace_width(&mut self, id: &str, width: f64) -> bool {
        if self.disposed {
            return false;
        }
        let resized = self.board.update_trace_width(id, width);
        self.after_edit(resized)
    }

    fn after_edit(&mut self, changed: bool) -> bool {
        if changed {
            self.reconcile();
        }
        changed
    }

    /// Change the substrate thickness; every instance is re-placed.
    pub fn set_thickness(&mut self, thickness: f64) -> Result<(), EngineError> {
        self.board.set_thickness(thickness)?;
        self.reconcile();
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn pads_by_layer(&self, layer: Layer) -> Vec<&Pad> {
        self.board.pads_on_layer(layer)
    }

    pub fn pads_by_shape(&self, shape: PadShape) -> Vec<&Pad> {
        self.board.pads_of_shape(shape)
    }

    pub fn traces_by_layer(&self, layer: Layer) -> Vec<&Trace> {
        self.board.traces_on_layer(layer)
    }

    pub fn holes(&self) -> &[Hole] {
        self.board.holes().all()
    }

    pub fn pad_area(&self, id: &str) -> f64 {
        self.board.pad_area(id)
    }

    pub fn hole_area(&self, id: &str) -> f64 {
        self.board.hole_area(id)
    }

    pub fn trace_area(&self, id: &str) -> f64 {
        self.board.trace_area(id)
    }

    pub fn trace_length(&self, id: &str) -> f64 {
        self.board.trace_length(id)
    }

    // ── Interaction ──────────────────────────────────────────────────

    pub fn selected(&self) -> Option<&Target> {
        self.interaction.selected()
    }

    pub fn hover_info(&self) -> Option<&Target> {
        self.interaction.hovered()
    }

    pub fn interaction_state(&self) -> InteractionState {
        self.interaction.state()
    }

    /// Handles of every store this session draws.
    pub fn render_handles(&self) -> Vec<RenderHandle> {
        self.stores.handles()
    }

    /// Restrict which stores pointer input can hit.
    pub fn set_interactable_objects(&mut self, handles: Vec<RenderHandle>) {
        self.interactable = handles;
    }

    pub fn viewpoint(&self) -> &Viewpoint {
        &self.viewpoint
    }

    pub fn set_viewpoint(&mut self, viewpoint: Viewpoint) {
        self.viewpoint = viewpoint;
    }

    /// Pick without changing interaction state.
    pub fn pick(&mut self, pointer: Vec2) -> Option<Hit> {
        let ray = self.viewpoint.ray(pointer);
        self.picker.pick(&ray, &self.board, &self.interactable)
    }

    /// Pointer moved. Drives an active drag, otherwise updates hover.
    /// Returns whether anything changed.
    pub fn pointer_move(&mut self, pointer: Vec2) -> bool {
        if self.disposed {
            return false;
        }
        let ray = self.viewpoint.ray(pointer);
        if self.interaction.is_dragging() {
            return self.interaction.on_drag(&ray, &mut self.board);
        }
        let hit = self.picker.pick(&ray, &self.board, &self.interactable);
        self.interaction
            .on_pointer_move(hit.as_ref(), &self.board, &mut self.stores)
    }

    /// Pointer pressed: select what is under it, or clear the selection.
    pub fn pointer_down(&mut self, pointer: Vec2) -> Option<&Target> {
        if self.disposed {
            return None;
        }
        let ray = self.viewpoint.ray(pointer);
        let hit = self.picker.pick(&ray, &self.board, &self.interactable);
        self.interaction
            .on_click(&ray, hit.as_ref(), &self.board, &mut self.stores);
        self.interaction.selected()
    }

    pub fn pointer_up(&mut self) {
        self.interaction.on_release();
    }

    fn reconcile(&mut self) {
        self.interaction.reconcile(&self.board, &mut self.stores);
    }

    // ── Frame ────────────────────────────────────────────────────────

    /// Advance the clock, upload dirty instance buffers and submit one draw
    /// per non-empty store. Backend failures are logged, never raised.
    pub fn tick(&mut self, dt: f32) -> FrameStats {
        let mut stats = FrameStats::default();
        if self.disposed || !self.frame_scheduled {
            return stats;
        }
        self.clock += dt.max(0.0);
        self.frames += 1;

        for store in &mut self.stores.stores {
            if let Some(program) = store.appearance_mut() {
                program.set_time(self.clock);
            }
            match store.upload(&mut self.backend, &mut self.board) {
                Ok(true) => stats.uploads += 1,
                Ok(false) => {}
                Err(e) => log::warn!("Upload of {} instances failed: {}", store.kind(), e),
            }
            if let Err(e) = store.flush_appearance(&mut self.backend) {
                log::warn!("Uniform write for {} failed: {}", store.kind(), e);
            }
            let count = store.instance_count(&self.board);
            match store.draw(&mut self.backend, count) {
                Ok(calls) => {
                    stats.draw_calls += calls;
                    if calls > 0 {
                        stats.instances += count as usize;
                    }
                }
                Err(e) => log::warn!("Draw of {} failed: {}", store.kind(), e),
            }
        }
        stats
    }

    // ── Snapshot ─────────────────────────────────────────────────────

    pub fn export_board(&self) -> BoardDocument {
        export_board(&self.board)
    }

    /// Replace the board with a document's contents.
    ///
    /// The document is validated before anything changes. On success every
    /// GPU resource of the previous board is released and a fresh set of
    /// stores is created, so repeated imports do not accumulate allocations.
    pub fn import_board(&mut self, doc: &BoardDocument) -> Result<ImportReport, EngineError> {
        if self.disposed {
            return Err(EngineError::Disposed);
        }
        validate_document(doc)?;

        self.interaction.reset(&mut self.stores);
        self.ledger.dispose_all(&mut self.backend);
        self.stores = StoreSet::default();
        self.stores = StoreSet::create(&mut self.backend, &self.factory, &self.config, &mut self.ledger)?;
        self.remap_interactable();

        let report = import_board(&mut self.board, doc)?;
        self.picker.invalidate();
        self.viewpoint.fit_board(&self.board.dimensions());
        log::info!(
            "Imported board: {} pads, {} traces ({} segments), {} holes, {} dropped",
            report.pads,
            report.traces,
            report.trace_segments,
            report.holes,
            report.dropped
        );
        Ok(report)
    }

    /// Point the interactable set at the freshly created stores, keeping the
    /// same kinds the caller had selected.
    fn remap_interactable(&mut self) {
        let kinds: Vec<HandleKind> = self.interactable.iter().map(|h| h.kind).collect();
        self.interactable = self
            .stores
            .handles()
            .into_iter()
            .filter(|h| kinds.contains(&h.kind))
            .collect();
    }

    // ── Diagnostics & teardown ───────────────────────────────────────

    pub fn ledger_stats(&self) -> LedgerStats {
        self.ledger.stats()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            session: self.session,
            pads: self.board.entity_count(EntityKind::Pad),
            traces: self.board.entity_count(EntityKind::Trace),
            trace_segments: self.board.instance_count(EntityKind::Trace),
            holes: self.board.entity_count(EntityKind::Hole),
            ledger: self.ledger.stats(),
            live_allocations: self.backend.live_allocations(),
            surface: self.surface,
            frames: self.frames,
            disposed: self.disposed,
        }
    }

    /// Stop scheduling frames and release every GPU resource. Safe to call
    /// any number of times.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.frame_scheduled = false;
        self.interaction.reset(&mut self.stores);
        let report = self.ledger.dispose_all(&mut self.backend);
        self.stores = StoreSet::default();
        self.interactable.clear();
        self.disposed = true;
        log::info!(
            "Board engine {} disposed ({} resources released)",
            self.session,
            report.released
        );
    }
}

impl<B: GraphicsBackend> Drop for BoardEngine<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn configure_surface<B: GraphicsBackend>(backend: &mut B, config: &EngineConfig) -> Result<SurfaceConfig, EngineError> {
    let full = match backend.configure_surface(&config.surface) {
        Ok(()) => return Ok(config.surface),
        Err(e) => e,
    };
    log::warn!("Surface configuration refused ({}); retrying with reduced features", full);
    match backend.configure_surface(&config.fallback_surface) {
        Ok(()) => Ok(config.fallback_surface),
        Err(reduced) => Err(EngineError::Initialization { full, reduced }),
    }
}

fn generated_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}
