//! Hover, selection and drag.
//!
//! Hover and selection are independent: one instance may be hovered while
//! another is selected. Both remember the entity and instance ids as well as
//! the slot, so they can be re-resolved after a store renumbers.

use glam::Vec3;
use serde::Serialize;

use boardview_core::{Board, EntityId, EntityKind, Point, Slot};

use crate::picking::Hit;
use crate::viewpoint::Ray;

/// Receives highlight changes. A store that cannot show highlights simply
/// ignores the call.
pub trait HighlightSink {
    fn set_hovered(&mut self, kind: EntityKind, slot: Option<Slot>);
    fn set_selected(&mut self, kind: EntityKind, slot: Option<Slot>);
}

/// One interactable instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub kind: EntityKind,
    pub slot: Slot,
    /// Authored entity: the pad or hole id, or the parent trace id.
    pub entity_id: EntityId,
    /// Store-level id; differs from `entity_id` for trace segments.
    pub instance_id: String,
}

impl Target {
    /// Resolve a hit into a target. Hits on non-instanced meshes (the
    /// substrate) are not targets.
    pub fn from_hit(hit: &Hit, board: &Board) -> Option<Self> {
        let kind = hit.handle.kind.entity_kind()?;
        Some(Self {
            kind,
            slot: hit.slot,
            entity_id: board.entity_id_at(kind, hit.slot)?.to_string(),
            instance_id: board.instance_id_at(kind, hit.slot)?.to_string(),
        })
    }

    fn same_instance(&self, other: &Target) -> bool {
        self.kind == other.kind && self.instance_id == other.instance_id
    }
}

/// Translate gesture attached to the current selection.
#[derive(Debug, Clone, PartialEq)]
pub struct DragAffordance {
    pub kind: EntityKind,
    pub entity_id: EntityId,
    /// Height of the horizontal plane pointer rays are projected onto.
    pub plane_y: f32,
    /// Entity anchor minus the grab point, on the board plane.
    pub grab_offset: (f64, f64),
    /// Set by pointer down, cleared by pointer up.
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InteractionState {
    Idle,
    Hovering,
    Selected,
    SelectedHovering,
}

#[derive(Debug, Default)]
pub struct InteractionStateMachine {
    hovered: Option<Target>,
    selected: Option<Target>,
    drag: Option<DragAffordance>,
}

impl InteractionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> InteractionState {
        match (self.selected.is_some(), self.hovered.is_some()) {
            (false, false) => InteractionState::Idle,
            (false, true) => InteractionState::Hovering,
            (true, false) => InteractionState::Selected,
            (true, true) => InteractionState::SelectedHovering,
        }
    }

    pub fn hovered(&self) -> Option<&Target> {
        self.hovered.as_ref()
    }

    pub fn selected(&self) -> Option<&Target> {
        self.selected.as_ref()
    }

    pub fn drag(&self) -> Option<&DragAffordance> {
        self.drag.as_ref()
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.as_ref().is_some_and(|d| d.active)
    }

    /// Update hover from a pointer-move pick. Returns whether hover changed.
    pub fn on_pointer_move(&mut self, hit: Option<&Hit>, board: &Board, sink: &mut dyn HighlightSink) -> bool {
        let next = hit.and_then(|h| Target::from_hit(h, board));
        match (&self.hovered, &next) {
            (None, None) => return false,
            (Some(current), Some(next)) if current.same_instance(next) && current.slot == next.slot => {
                return false
            }
            _ => {}
        }
        if let Some(previous) = self.hovered.take() {
            sink.set_hovered(previous.kind, None);
        }
        if let Some(target) = &next {
            sink.set_hovered(target.kind, Some(target.slot));
            log::debug!("Hovering {} '{}' (slot {})", target.kind, target.instance_id, target.slot);
        }
        self.hovered = next;
        true
    }

    /// Select what was clicked, or clear the selection on a miss. A hit
    /// attaches an active drag affordance.
    pub fn on_click(&mut self, ray: &Ray, hit: Option<&Hit>, board: &Board, sink: &mut dyn HighlightSink) {
        let next = hit.and_then(|h| Target::from_hit(h, board));
        if let Some(previous) = self.selected.take() {
            sink.set_selected(previous.kind, None);
        }
        self.drag = None;

        let Some(target) = next else {
            return;
        };
        sink.set_selected(target.kind, Some(target.slot));
        self.drag = board
            .placement_at(target.kind, target.slot)
            .and_then(|placement| {
                let plane_y = placement.center.y;
                let grab = plane_point(ray, plane_y)?;
                let anchor = board.anchor_of(target.kind, &target.entity_id)?;
                Some(DragAffordance {
                    kind: target.kind,
                    entity_id: target.entity_id.clone(),
                    plane_y,
                    grab_offset: (anchor.x - grab.x, anchor.z - grab.z),
                    active: true,
                })
            });
        log::debug!("Selected {} '{}'", target.kind, target.entity_id);
        self.selected = Some(target);
    }

    /// Apply a drag sample. The entity is moved through the board so its
    /// record and instance transform change together. Returns whether
    /// anything moved.
    pub fn on_drag(&mut self, ray: &Ray, board: &mut Board) -> bool {
        let Some(drag) = self.drag.as_ref().filter(|d| d.active) else {
            return false;
        };
        let Some(point) = plane_point(ray, drag.plane_y) else {
            return false;
        };
        let anchor = point.translate(drag.grab_offset.0, drag.grab_offset.1);
        if !anchor.is_finite() {
            return false;
        }
        board.move_entity(drag.kind, &drag.entity_id, anchor)
    }

    /// End the gesture. The selection stays.
    pub fn on_release(&mut self) {
        if let Some(drag) = self.drag.as_mut() {
            drag.active = false;
        }
    }

    /// Re-resolve hover and selection after the board's stores changed
    /// shape. Targets whose instance is gone are cleared, and a drag on a
    /// vanished entity is cancelled.
    pub fn reconcile(&mut self, board: &Board, sink: &mut dyn HighlightSink) {
        if let Some(target) = self.hovered.take() {
            self.hovered = refresh(target, board, sink, Highlight::Hover);
        }
        if let Some(target) = self.selected.take() {
            self.selected = refresh(target, board, sink, Highlight::Select);
        }
        let drag_alive = match (&self.drag, &self.selected) {
            (Some(drag), Some(selected)) => {
                drag.kind == selected.kind
                    && drag.entity_id == selected.entity_id
                    && board.anchor_of(drag.kind, &drag.entity_id).is_some()
            }
            _ => false,
        };
        if !drag_alive {
            if self.drag.take().is_some() {
                log::debug!("Drag cancelled: target no longer exists");
            }
            return;
        }
        // Elevation follows thickness changes.
        if let (Some(drag), Some(selected)) = (self.drag.as_mut(), &self.selected) {
            if let Some(placement) = board.placement_at(selected.kind, selected.slot) {
                drag.plane_y = placement.center.y;
            }
        }
    }

    /// Forget everything and clear all highlight flags.
    pub fn reset(&mut self, sink: &mut dyn HighlightSink) {
        if let Some(target) = self.hovered.take() {
            sink.set_hovered(target.kind, None);
        }
        if let Some(target) = self.selected.take() {
            sink.set_selected(target.kind, None);
        }
        self.drag = None;
    }
}

#[derive(Clone, Copy)]
enum Highlight {
    Hover,
    Select,
}

impl Highlight {
    fn apply(self, sink: &mut dyn HighlightSink, kind: EntityKind, slot: Option<Slot>) {
        match self {
            Highlight::Hover => sink.set_hovered(kind, slot),
            Highlight::Select => sink.set_selected(kind, slot),
        }
    }
}

fn refresh(target: Target, board: &Board, sink: &mut dyn HighlightSink, flag: Highlight) -> Option<Target> {
    match board.slot_of_instance(target.kind, &target.instance_id) {
        Some(slot) => {
            if slot != target.slot {
                flag.apply(sink, target.kind, Some(slot));
            }
            Some(Target { slot, ..target })
        }
        None => {
            flag.apply(sink, target.kind, None);
            None
        }
    }
}

fn plane_point(ray: &Ray, y: f32) -> Option<Point> {
    let t = ray.intersect_plane_y(y)?;
    let p: Vec3 = ray.at(t);
    Some(Point::new(p.x as f64, p.z as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::backend::MeshId;
    use crate::picking::HitTestEngine;
    use crate::render_store::{HandleKind, RenderHandle};
    use boardview_core::{BoardDimensions, BoardSettings, Layer, Pad, Size, Trace};

    #[derive(Default)]
    struct Flags {
        hovered: HashMap<EntityKind, Option<Slot>>,
        selected: HashMap<EntityKind, Option<Slot>>,
    }

    impl HighlightSink for Flags {
        fn set_hovered(&mut self, kind: EntityKind, slot: Option<Slot>) {
            self.hovered.insert(kind, slot);
        }

        fn set_selected(&mut self, kind: EntityKind, slot: Option<Slot>) {
            self.selected.insert(kind, slot);
        }
    }

    impl Flags {
        fn hovered_count(&self) -> usize {
            self.hovered.values().filter(|s| s.is_some()).count()
        }
    }

    fn handles() -> Vec<RenderHandle> {
        vec![
            RenderHandle { kind: HandleKind::Pad, mesh: MeshId(1) },
            RenderHandle { kind: HandleKind::Trace, mesh: MeshId(2) },
            RenderHandle { kind: HandleKind::Substrate, mesh: MeshId(3) },
        ]
    }

    fn board() -> Board {
        let mut board = Board::new(BoardDimensions::default(), &BoardSettings::default()).unwrap();
        board.add_pad(Pad::rectangle("a", Point::new(0.0, 0.0), Size::new(2.0, 2.0), Layer::Top));
        board.add_pad(Pad::rectangle("b", Point::new(10.0, 0.0), Size::new(2.0, 2.0), Layer::Top));
        board.add_trace(Trace::new(
            "t",
            vec![Point::new(-20.0, 10.0), Point::new(-10.0, 10.0)],
            1.0,
            Layer::Top,
        ));
        board
    }

    fn down_at(x: f32, z: f32) -> Ray {
        Ray::new(Vec3::new(x, 50.0, z), Vec3::NEG_Y)
    }

    fn pick(board: &Board, ray: &Ray) -> Option<Hit> {
        HitTestEngine::default().pick(ray, board, &handles())
    }

    #[test]
    fn test_hover_moves_between_instances() {
        let board = board();
        let mut sm = InteractionStateMachine::new();
        let mut flags = Flags::default();

        let hit = pick(&board, &down_at(0.0, 0.0));
        assert!(sm.on_pointer_move(hit.as_ref(), &board, &mut flags));
        assert_eq!(sm.state(), InteractionState::Hovering);
        assert_eq!(flags.hovered[&EntityKind::Pad], Some(0));

        let hit = pick(&board, &down_at(0.5, 0.5));
        assert!(!sm.on_pointer_move(hit.as_ref(), &board, &mut flags));

        let hit = pick(&board, &down_at(-15.0, 10.0));
        assert!(sm.on_pointer_move(hit.as_ref(), &board, &mut flags));
        assert_eq!(flags.hovered[&EntityKind::Pad], None);
        assert_eq!(flags.hovered[&EntityKind::Trace], Some(0));
        assert_eq!(flags.hovered_count(), 1);
        assert_eq!(sm.hovered().unwrap().entity_id, "t");
        assert_eq!(sm.hovered().unwrap().instance_id, "t#0");
    }

    #[test]
    fn test_substrate_clears_hover() {
        let board = board();
        let mut sm = InteractionStateMachine::new();
        let mut flags = Flags::default();
        let hit = pick(&board, &down_at(10.0, 0.0));
        sm.on_pointer_move(hit.as_ref(), &board, &mut flags);

        let hit = pick(&board, &down_at(30.0, 30.0));
        assert_eq!(hit.unwrap().handle.kind, HandleKind::Substrate);
        assert!(sm.on_pointer_move(hit.as_ref(), &board, &mut flags));
        assert!(sm.hovered().is_none());
        assert_eq!(flags.hovered_count(), 0);
    }

    #[test]
    fn test_hover_and_selection_are_independent() {
        let board = board();
        let mut sm = InteractionStateMachine::new();
        let mut flags = Flags::default();

        let ray = down_at(0.0, 0.0);
        sm.on_click(&ray, pick(&board, &ray).as_ref(), &board, &mut flags);
        let hit = pick(&board, &down_at(10.0, 0.0));
        sm.on_pointer_move(hit.as_ref(), &board, &mut flags);

        assert_eq!(sm.state(), InteractionState::SelectedHovering);
        assert_eq!(sm.selected().unwrap().entity_id, "a");
        assert_eq!(sm.hovered().unwrap().entity_id, "b");
        assert_eq!(flags.selected[&EntityKind::Pad], Some(0));
        assert_eq!(flags.hovered[&EntityKind::Pad], Some(1));
    }

    #[test]
    fn test_click_miss_clears_selection() {
        let board = board();
        let mut sm = InteractionStateMachine::new();
        let mut flags = Flags::default();
        let ray = down_at(0.0, 0.0);
        sm.on_click(&ray, pick(&board, &ray).as_ref(), &board, &mut flags);
        assert!(sm.drag().is_some());

        sm.on_click(&ray, None, &board, &mut flags);
        assert!(sm.selected().is_none());
        assert!(sm.drag().is_none());
        assert_eq!(flags.selected[&EntityKind::Pad], None);
    }

    #[test]
    fn test_drag_moves_record_and_instance() {
        let mut board = board();
        let mut sm = InteractionStateMachine::new();
        let mut flags = Flags::default();

        // Grab the pad 0.5 right of its centre.
        let ray = down_at(0.5, 0.0);
        sm.on_click(&ray, pick(&board, &ray).as_ref(), &board, &mut flags);
        assert!(sm.is_dragging());

        assert!(sm.on_drag(&down_at(5.5, 3.0), &mut board));
        let pad = board.pads().by_id("a").unwrap();
        assert!((pad.position.x - 5.0).abs() < 1e-4);
        assert!((pad.position.z - 3.0).abs() < 1e-4);
        let placement = board.placement_at(EntityKind::Pad, 0).unwrap();
        assert!((placement.center.x - 5.0).abs() < 1e-4);
        assert_eq!(placement.extents.x, 2.0);

        sm.on_release();
        assert!(!sm.is_dragging());
        assert!(!sm.on_drag(&down_at(0.0, 0.0), &mut board));
        assert_eq!(sm.selected().unwrap().entity_id, "a");
    }

    #[test]
    fn test_drag_segment_moves_whole_trace() {
        let mut board = board();
        let mut sm = InteractionStateMachine::new();
        let mut flags = Flags::default();
        let ray = down_at(-15.0, 10.0);
        sm.on_click(&ray, pick(&board, &ray).as_ref(), &board, &mut flags);
        sm.on_drag(&down_at(-15.0, 20.0), &mut board);

        let trace = board.traces().by_id("t").unwrap();
        assert!((trace.points[0].z - 20.0).abs() < 1e-4);
        assert!((trace.points[1].z - 20.0).abs() < 1e-4);
        assert!((board.trace_length("t") - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_reconcile_after_removal() {
        let mut board = board();
        let mut sm = InteractionStateMachine::new();
        let mut flags = Flags::default();

        let ray = down_at(10.0, 0.0);
        sm.on_click(&ray, pick(&board, &ray).as_ref(), &board, &mut flags);
        sm.on_pointer_move(pick(&board, &ray).as_ref(), &board, &mut flags);
        assert_eq!(sm.selected().unwrap().slot, 1);

        // Removing "a" renumbers "b" into slot 0.
        board.remove(EntityKind::Pad, "a");
        sm.reconcile(&board, &mut flags);
        assert_eq!(sm.selected().unwrap().slot, 0);
        assert_eq!(sm.hovered().unwrap().slot, 0);
        assert_eq!(flags.selected[&EntityKind::Pad], Some(0));
        assert!(sm.drag().is_some());

        board.remove(EntityKind::Pad, "b");
        sm.reconcile(&board, &mut flags);
        assert_eq!(sm.state(), InteractionState::Idle);
        assert!(sm.drag().is_none());
        assert_eq!(flags.selected[&EntityKind::Pad], None);
    }
}
