use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{EntityKind, Hole, Pad, PadShape, Placeable, Placement, PlacementContext, Trace};
use crate::error::BoardError;
use crate::geometry::{BBox, Point, Size};
use crate::layer::{Layer, LayerOffsetCalculator, LayerOffsets, DEFAULT_CLEARANCE};
use crate::store::{InstanceRaw, InstancedEntityStore, Slot};
use crate::trace::TraceStore;

/// Outline and substrate thickness of the board, in board length units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoardDimensions {
    pub width: f64,
    pub height: f64,
    pub thickness: f64,
}

impl Default for BoardDimensions {
    fn default() -> Self {
        Self {
            width: 100.0,
            height: 80.0,
            thickness: 1.6,
        }
    }
}

/// Instance capacity of each store. Each store owns its own slot range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreCapacities {
    pub pads: usize,
    pub trace_segments: usize,
    pub holes: usize,
}

impl Default for StoreCapacities {
    fn default() -> Self {
        Self {
            pads: 10_000,
            trace_segments: 20_000,
            holes: 5_000,
        }
    }
}

impl StoreCapacities {
    pub fn for_kind(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Pad => self.pads,
            EntityKind::Trace => self.trace_segments,
            EntityKind::Hole => self.holes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardSettings {
    pub clearance: f64,
    pub copper_thickness: f64,
    pub capacities: StoreCapacities,
}

impl Default for BoardSettings {
    fn default() -> Self {
        Self {
            clearance: DEFAULT_CLEARANCE,
            copper_thickness: 0.035,
            capacities: StoreCapacities::default(),
        }
    }
}

/// The live board: dimensions plus the three instanced stores.
///
/// This is the authoring surface. Every mutation goes through here so that
/// entity records and instance transforms never drift apart.
#[derive(Debug, Clone)]
pub struct Board {
    pub id: Uuid,
    dimensions: BoardDimensions,
    calculator: LayerOffsetCalculator,
    copper_thickness: f64,
    pads: InstancedEntityStore<Pad>,
    traces: TraceStore,
    holes: InstancedEntityStore<Hole>,
}

impl Board {
    pub fn new(dimensions: BoardDimensions, settings: &BoardSettings) -> Result<Self, BoardError> {
        check_outline(&dimensions)?;
        let calculator = LayerOffsetCalculator::new(settings.clearance)?;
        let context = PlacementContext {
            offsets: calculator.offsets(dimensions.thickness)?,
            copper_thickness: settings.copper_thickness,
        };
        let caps = settings.capacities;
        Ok(Self {
            id: Uuid::new_v4(),
            dimensions,
            calculator,
            copper_thickness: settings.copper_thickness,
            pads: InstancedEntityStore::new(caps.pads, context),
            traces: TraceStore::new(caps.trace_segments, context),
            holes: InstancedEntityStore::new(caps.holes, context),
        })
    }

    pub fn dimensions(&self) -> BoardDimensions {
        self.dimensions
    }

    /// Current copper elevations. Re-query after any thickness change.
    pub fn offsets(&self) -> LayerOffsets {
        self.pads.context().offsets
    }

    pub fn copper_thickness(&self) -> f64 {
        self.copper_thickness
    }

    /// Change the substrate thickness and re-place every instance.
    pub fn set_thickness(&mut self, thickness: f64) -> Result<(), BoardError> {
        self.set_dimensions(BoardDimensions {
            thickness,
            ..self.dimensions
        })
    }

    pub fn set_dimensions(&mut self, dimensions: BoardDimensions) -> Result<(), BoardError> {
        check_outline(&dimensions)?;
        let offsets = self.calculator.offsets(dimensions.thickness)?;
        let thickness_changed = dimensions.thickness != self.dimensions.thickness;
        self.dimensions = dimensions;
        if thickness_changed {
            let context = PlacementContext {
                offsets,
                copper_thickness: self.copper_thickness,
            };
            self.pads.set_context(context);
            self.traces.set_context(context);
            self.holes.set_context(context);
            log::info!(
                "Board thickness now {}; copper at {} / {}",
                dimensions.thickness,
                offsets.top,
                offsets.bottom
            );
        }
        Ok(())
    }

    // ── Authoring ────────────────────────────────────────────────────

    pub fn add_pad(&mut self, pad: Pad) -> bool {
        self.pads.add(pad)
    }

    /// Returns the number of segments committed; zero when nothing was stored.
    pub fn add_trace(&mut self, trace: Trace) -> usize {
        self.traces.add(trace)
    }

    pub fn add_hole(&mut self, hole: Hole) -> bool {
        self.holes.add(hole)
    }

    pub fn remove(&mut self, kind: EntityKind, id: &str) -> bool {
        match kind {
            EntityKind::Pad => self.pads.remove(id),
            EntityKind::Trace => self.traces.remove(id),
            EntityKind::Hole => self.holes.remove(id),
        }
    }

    pub fn clear(&mut self) {
        self.pads.clear();
        self.traces.clear();
        self.holes.clear();
    }

    pub fn update_pad_position(&mut self, id: &str, position: Point) -> bool {
        self.pads.update_position(id, position)
    }

    pub fn update_pad_size(&mut self, id: &str, size: Size) -> bool {
        self.pads.update_size(id, size)
    }

    pub fn update_hole_position(&mut self, id: &str, position: Point) -> bool {
        self.holes.update_position(id, position)
    }

    pub fn update_hole_diameter(&mut self, id: &str, diameter: f64) -> bool {
        self.holes.update_size(id, Size::new(diameter, diameter))
    }

    pub fn update_trace_position(&mut self, id: &str, anchor: Point) -> bool {
        self.traces.update_position(id, anchor)
    }

    pub fn update_trace_width(&mut self, id: &str, width: f64) -> bool {
        self.traces.update_width(id, width)
    }

    /// Reference point used when dragging: pad/hole centre, or a trace's
    /// first waypoint.
    pub fn anchor_of(&self, kind: EntityKind, id: &str) -> Option<Point> {
        match kind {
            EntityKind::Pad => self.pads.by_id(id).map(|p| p.position()),
            EntityKind::Trace => self.traces.by_id(id).map(|t| t.points[0]),
            EntityKind::Hole => self.holes.by_id(id).map(|h| h.position()),
        }
    }

    /// Move an entity so its anchor lands on `anchor`.
    pub fn move_entity(&mut self, kind: EntityKind, id: &str, anchor: Point) -> bool {
        match kind {
            EntityKind::Pad => self.update_pad_position(id, anchor),
            EntityKind::Trace => self.update_trace_position(id, anchor),
            EntityKind::Hole => self.update_hole_position(id, anchor),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn pads(&self) -> &InstancedEntityStore<Pad> {
        &self.pads
    }

    pub fn traces(&self) -> &TraceStore {
        &self.traces
    }

    pub fn holes(&self) -> &InstancedEntityStore<Hole> {
        &self.holes
    }

    pub fn pads_on_layer(&self, layer: Layer) -> Vec<&Pad> {
        self.pads.by_layer(layer)
    }

    pub fn pads_of_shape(&self, shape: PadShape) -> Vec<&Pad> {
        self.pads.all().iter().filter(|p| p.shape == shape).collect()
    }

    pub fn traces_on_layer(&self, layer: Layer) -> Vec<&Trace> {
        self.traces.by_layer(layer)
    }

    pub fn entity_count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Pad => self.pads.len(),
            EntityKind::Trace => self.traces.len(),
            EntityKind::Hole => self.holes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pads.is_empty() && self.traces.is_empty() && self.holes.is_empty()
    }

    /// Copper area of a pad; zero for unknown ids.
    pub fn pad_area(&self, id: &str) -> f64 {
        self.pads.by_id(id).map(|p| p.area()).unwrap_or(0.0)
    }

    /// Drilled area of a hole; zero for unknown ids.
    pub fn hole_area(&self, id: &str) -> f64 {
        self.holes.by_id(id).map(|h| h.area()).unwrap_or(0.0)
    }

    pub fn trace_area(&self, id: &str) -> f64 {
        self.traces.area(id)
    }

    pub fn trace_length(&self, id: &str) -> f64 {
        self.traces.length(id)
    }

    // ── Instance-level access ────────────────────────────────────────

    /// Store-level id of the instance in `slot` (a segment id for traces).
    pub fn instance_id_at(&self, kind: EntityKind, slot: Slot) -> Option<&str> {
        match kind {
            EntityKind::Pad => self.pads.entity_at(slot).map(|e| e.id()),
            EntityKind::Trace => self.traces.segments().entity_at(slot).map(|e| e.id()),
            EntityKind::Hole => self.holes.entity_at(slot).map(|e| e.id()),
        }
    }

    /// Authored entity owning the instance in `slot`.
    pub fn entity_id_at(&self, kind: EntityKind, slot: Slot) -> Option<&str> {
        match kind {
            EntityKind::Trace => self.traces.id_for_instance(slot),
            _ => self.instance_id_at(kind, slot),
        }
    }

    pub fn slot_of_instance(&self, kind: EntityKind, instance_id: &str) -> Option<Slot> {
        match kind {
            EntityKind::Pad => self.pads.slot_of(instance_id),
            EntityKind::Trace => self.traces.segments().slot_of(instance_id),
            EntityKind::Hole => self.holes.slot_of(instance_id),
        }
    }

    pub fn placement_at(&self, kind: EntityKind, slot: Slot) -> Option<&Placement> {
        match kind {
            EntityKind::Pad => self.pads.placement_at(slot),
            EntityKind::Trace => self.traces.segments().placement_at(slot),
            EntityKind::Hole => self.holes.placement_at(slot),
        }
    }

    pub fn footprints(&self, kind: EntityKind) -> Vec<(Slot, BBox)> {
        match kind {
            EntityKind::Pad => self.pads.footprints().collect(),
            EntityKind::Trace => self.traces.segments().footprints().collect(),
            EntityKind::Hole => self.holes.footprints().collect(),
        }
    }

    pub fn instance_count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Pad => self.pads.len(),
            EntityKind::Trace => self.traces.segments().len(),
            EntityKind::Hole => self.holes.len(),
        }
    }

    pub fn instances(&self, kind: EntityKind) -> &[InstanceRaw] {
        match kind {
            EntityKind::Pad => self.pads.instances(),
            EntityKind::Trace => self.traces.segments().instances(),
            EntityKind::Hole => self.holes.instances(),
        }
    }

    pub fn is_dirty(&self, kind: EntityKind) -> bool {
        match kind {
            EntityKind::Pad => self.pads.is_dirty(),
            EntityKind::Trace => self.traces.segments().is_dirty(),
            EntityKind::Hole => self.holes.is_dirty(),
        }
    }

    pub fn mark_clean(&mut self, kind: EntityKind) {
        match kind {
            EntityKind::Pad => self.pads.mark_clean(),
            EntityKind::Trace => self.traces.segments_mut().mark_clean(),
            EntityKind::Hole => self.holes.mark_clean(),
        }
    }

    pub fn revision(&self, kind: EntityKind) -> u64 {
        match kind {
            EntityKind::Pad => self.pads.revision(),
            EntityKind::Trace => self.traces.segments().revision(),
            EntityKind::Hole => self.holes.revision(),
        }
    }
}

fn check_outline(dimensions: &BoardDimensions) -> Result<(), BoardError> {
    let ok = |v: f64| v.is_finite() && v > 0.0;
    if !ok(dimensions.width) || !ok(dimensions.height) {
        return Err(BoardError::InvalidDimensions {
            width: dimensions.width,
            height: dimensions.height,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board() -> Board {
        Board::new(BoardDimensions::default(), &BoardSettings::default()).unwrap()
    }

    #[test]
    fn test_board_create() {
        let b = board();
        assert!(b.is_empty());
        assert!((b.offsets().top - 0.81).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_dimensions_rejected() {
        let dims = BoardDimensions {
            width: 0.0,
            ..BoardDimensions::default()
        };
        assert!(Board::new(dims, &BoardSettings::default()).is_err());

        let settings = BoardSettings {
            clearance: 0.0,
            ..BoardSettings::default()
        };
        assert!(Board::new(BoardDimensions::default(), &settings).is_err());
    }

    #[test]
    fn test_areas() {
        let mut b = board();
        b.add_pad(Pad::rectangle("p", Point::new(0.0, 0.0), Size::new(2.0, 2.0), Layer::Top));
        b.add_hole(Hole::new("h", Point::new(5.0, 5.0), 2.0));
        assert!((b.pad_area("p") - 4.0).abs() < 1e-10);
        assert!((b.hole_area("h") - std::f64::consts::PI).abs() < 1e-4);
        assert_eq!(b.pad_area("nope"), 0.0);
    }

    #[test]
    fn test_thickness_change_replaces_copper() {
        let mut b = board();
        b.add_pad(Pad::rectangle("p", Point::new(0.0, 0.0), Size::new(1.0, 1.0), Layer::Bottom));
        b.mark_clean(EntityKind::Pad);
        b.set_thickness(3.0).unwrap();
        assert!(b.is_dirty(EntityKind::Pad));
        let y = b.placement_at(EntityKind::Pad, 0).unwrap().center.y;
        assert!((y as f64 + 1.51).abs() < 1e-6);
    }

    #[test]
    fn test_bad_thickness_leaves_board_unchanged() {
        let mut b = board();
        assert!(b.set_thickness(-1.0).is_err());
        assert_eq!(b.dimensions().thickness, 1.6);
    }

    #[test]
    fn test_trace_segment_maps_to_parent() {
        let mut b = board();
        let t = Trace::new(
            "net1",
            vec![Point::new(0.0, 0.0), Point::new(4.0, 0.0), Point::new(4.0, 4.0)],
            0.25,
            Layer::Top,
        );
        assert_eq!(b.add_trace(t), 2);
        assert_eq!(b.entity_id_at(EntityKind::Trace, 1), Some("net1"));
        assert_eq!(b.instance_id_at(EntityKind::Trace, 1), Some("net1#1"));
        assert_eq!(b.entity_count(EntityKind::Trace), 1);
        assert_eq!(b.instance_count(EntityKind::Trace), 2);
    }

    #[test]
    fn test_move_entity_per_kind() {
        let mut b = board();
        b.add_hole(Hole::new("h", Point::new(0.0, 0.0), 1.0));
        b.add_trace(Trace::new(
            "t",
            vec![Point::new(1.0, 1.0), Point::new(2.0, 1.0)],
            0.2,
            Layer::Top,
        ));
        assert!(b.move_entity(EntityKind::Hole, "h", Point::new(3.0, 3.0)));
        assert!(b.move_entity(EntityKind::Trace, "t", Point::new(0.0, 0.0)));
        assert_eq!(b.anchor_of(EntityKind::Hole, "h"), Some(Point::new(3.0, 3.0)));
        assert_eq!(b.traces().by_id("t").unwrap().points[1], Point::new(1.0, 0.0));
        assert!(!b.move_entity(EntityKind::Pad, "missing", Point::new(0.0, 0.0)));
    }

    #[test]
    fn test_size_updates_keep_slots() {
        let mut b = board();
        b.add_pad(Pad::rectangle("p0", Point::new(0.0, 0.0), Size::new(1.0, 1.0), Layer::Top));
        b.add_pad(Pad::rectangle("p1", Point::new(2.0, 0.0), Size::new(1.0, 1.0), Layer::Top));
        b.add_hole(Hole::new("h0", Point::new(5.0, 5.0), 1.0));
        b.add_hole(Hole::new("h1", Point::new(7.0, 5.0), 1.0));

        assert!(b.update_pad_size("p0", Size::new(4.0, 2.0)));
        assert_eq!(b.slot_of_instance(EntityKind::Pad, "p0"), Some(0));
        assert_eq!(b.slot_of_instance(EntityKind::Pad, "p1"), Some(1));
        let model = b.pads().instances()[0].model;
        assert!((model[0][0] - 4.0).abs() < 1e-6);
        assert!((model[2][2] - 2.0).abs() < 1e-6);
        assert!((b.pad_area("p0") - 8.0).abs() < 1e-10);

        assert!(b.update_hole_diameter("h1", 3.0));
        assert_eq!(b.slot_of_instance(EntityKind::Hole, "h1"), Some(1));
        let placement = b.placement_at(EntityKind::Hole, 1).unwrap();
        assert!((placement.extents.x - 3.0).abs() < 1e-6);
        assert!((placement.extents.z - 3.0).abs() < 1e-6);
        let model = b.holes().instances()[1].model;
        assert!((model[0][0] - 3.0).abs() < 1e-6);
        assert!((b.hole_area("h1") - std::f64::consts::PI * 2.25).abs() < 1e-10);

        assert!(!b.update_hole_diameter("h0", -1.0));
        assert!(!b.update_pad_size("p1", Size::new(f64::NAN, 1.0)));
        assert_eq!(b.holes().by_id("h0").unwrap().diameter, 1.0);
    }

    #[test]
    fn test_degenerate_entities_rejected() {
        let mut b = board();
        assert!(!b.add_pad(Pad::rectangle("nan", Point::new(f64::NAN, 0.0), Size::new(1.0, 1.0), Layer::Top)));
        assert!(!b.add_pad(Pad::rectangle("neg", Point::new(0.0, 0.0), Size::new(-2.0, 0.0), Layer::Top)));
        assert!(!b.add_hole(Hole::new("h", Point::new(0.0, 0.0), f64::INFINITY)));
        assert!(b.is_empty());
    }
}
