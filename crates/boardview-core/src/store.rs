use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};

use crate::entity::{EntityKind, Placeable, Placement, PlacementContext};
use crate::geometry::{BBox, Point, Size};
use crate::layer::Layer;

/// Instance slot: index into a store's instance buffer.
pub type Slot = u32;

/// One row of an instance buffer: a column-major model matrix, as uploaded
/// to the GPU.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceRaw {
    pub model: [[f32; 4]; 4],
}

impl InstanceRaw {
    pub fn from_placement(placement: &Placement) -> Self {
        Self {
            model: placement.transform().to_cols_array_2d(),
        }
    }
}

/// A fixed-capacity store mapping entity ids to dense instance slots.
///
/// Slot `i` always holds `entities[i]`; removal rebuilds every slot and the
/// whole instance buffer so that live slots stay exactly `0..len`. Adds are
/// O(1), removals O(n).
#[derive(Debug, Clone)]
pub struct InstancedEntityStore<E: Placeable> {
    capacity: usize,
    context: PlacementContext,
    entities: Vec<E>,
    slots: HashMap<String, Slot>,
    placements: Vec<Placement>,
    instances: Vec<InstanceRaw>,
    dirty: bool,
    revision: u64,
}

impl<E: Placeable> InstancedEntityStore<E> {
    pub fn new(capacity: usize, context: PlacementContext) -> Self {
        Self {
            capacity,
            context,
            entities: Vec::with_capacity(capacity.min(1024)),
            slots: HashMap::new(),
            placements: Vec::new(),
            instances: Vec::new(),
            dirty: false,
            revision: 0,
        }
    }

    pub fn kind(&self) -> EntityKind {
        E::KIND
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entities.len() >= self.capacity
    }

    pub fn context(&self) -> &PlacementContext {
        &self.context
    }

    // ── Authoring ────────────────────────────────────────────────────

    /// Append an entity in the next free slot. Returns false, without
    /// touching the store, when capacity is exhausted, the id is taken or
    /// the geometry is degenerate.
    pub fn add(&mut self, entity: E) -> bool {
        if !entity.is_well_formed() {
            log::warn!("{} '{}' has degenerate geometry, rejecting", E::KIND, entity.id());
            return false;
        }
        if self.is_full() {
            log::warn!(
                "{} store full ({} instances), rejecting '{}'",
                E::KIND,
                self.capacity,
                entity.id()
            );
            return false;
        }
        if self.slots.contains_key(entity.id()) {
            log::warn!("{} '{}' already exists", E::KIND, entity.id());
            return false;
        }

        let slot = self.entities.len() as Slot;
        let placement = entity.placement(&self.context);
        self.slots.insert(entity.id().to_string(), slot);
        self.instances.push(InstanceRaw::from_placement(&placement));
        self.placements.push(placement);
        self.entities.push(entity);
        self.touch();
        true
    }

    /// Add entities in order until one is rejected for capacity. Returns how
    /// many were added; those stay in the store.
    pub fn add_many<I>(&mut self, entities: I) -> usize
    where
        I: IntoIterator<Item = E>,
    {
        let mut added = 0;
        for entity in entities {
            if self.is_full() {
                log::warn!("{} store reached capacity after {} of a batch", E::KIND, added);
                break;
            }
            if self.add(entity) {
                added += 1;
            }
        }
        added
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let Some(slot) = self.slots.get(id).copied() else {
            return false;
        };
        self.entities.remove(slot as usize);
        log::debug!("Removed {} '{}' from slot {}", E::KIND, id, slot);
        self.rebuild();
        true
    }

    /// Remove every entity matching `predicate` with a single rebuild.
    /// Returns the number removed.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&E) -> bool,
    {
        let before = self.entities.len();
        self.entities.retain(|e| !predicate(e));
        let removed = before - self.entities.len();
        if removed > 0 {
            self.rebuild();
        }
        removed
    }

    /// Drop all entities. GPU-side buffers belong to whoever uploads this
    /// store and are not released here.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.slots.clear();
        self.placements.clear();
        self.instances.clear();
        self.touch();
    }

    pub fn update_position(&mut self, id: &str, position: Point) -> bool {
        if !position.is_finite() {
            return false;
        }
        self.update_with(id, |e| {
            e.set_position(position);
            true
        })
    }

    pub fn update_size(&mut self, id: &str, size: Size) -> bool {
        self.update_with(id, |e| e.resize(size))
    }

    /// Mutate one entity in place and recompute its transform in the same
    /// slot. The closure returns false to signal the edit was refused.
    pub fn update_with<F>(&mut self, id: &str, edit: F) -> bool
    where
        F: FnOnce(&mut E) -> bool,
    {
        let Some(slot) = self.slots.get(id).copied() else {
            return false;
        };
        let idx = slot as usize;
        if !edit(&mut self.entities[idx]) {
            return false;
        }
        self.write_slot(idx);
        self.touch();
        true
    }

    /// Swap in a new placement context (e.g. after a thickness change) and
    /// recompute every transform. Slots are unchanged.
    pub fn set_context(&mut self, context: PlacementContext) {
        self.context = context;
        for idx in 0..self.entities.len() {
            self.write_slot(idx);
        }
        self.touch();
    }

    fn write_slot(&mut self, idx: usize) {
        let placement = self.entities[idx].placement(&self.context);
        self.instances[idx] = InstanceRaw::from_placement(&placement);
        self.placements[idx] = placement;
    }

    /// Reassign every entity a fresh dense slot and rewrite the whole
    /// instance buffer.
    fn rebuild(&mut self) {
        self.slots.clear();
        self.placements.clear();
        self.instances.clear();
        for (idx, entity) in self.entities.iter().enumerate() {
            let placement = entity.placement(&self.context);
            self.slots.insert(entity.id().to_string(), idx as Slot);
            self.instances.push(InstanceRaw::from_placement(&placement));
            self.placements.push(placement);
        }
        self.touch();
    }

    fn touch(&mut self) {
        self.dirty = true;
        self.revision = self.revision.wrapping_add(1);
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn by_id(&self, id: &str) -> Option<&E> {
        self.slots.get(id).map(|&slot| &self.entities[slot as usize])
    }

    pub fn all(&self) -> &[E] {
        &self.entities
    }

    pub fn by_layer(&self, layer: Layer) -> Vec<&E> {
        self.entities
            .iter()
            .filter(|e| e.layer() == Some(layer))
            .collect()
    }

    pub fn slot_of(&self, id: &str) -> Option<Slot> {
        self.slots.get(id).copied()
    }

    pub fn entity_at(&self, slot: Slot) -> Option<&E> {
        self.entities.get(slot as usize)
    }

    pub fn placement_at(&self, slot: Slot) -> Option<&Placement> {
        self.placements.get(slot as usize)
    }

    /// `(slot, footprint)` for every live instance.
    pub fn footprints(&self) -> impl Iterator<Item = (Slot, BBox)> + '_ {
        self.placements
            .iter()
            .enumerate()
            .map(|(idx, p)| (idx as Slot, p.footprint_bbox()))
    }

    // ── Instance buffer ──────────────────────────────────────────────

    pub fn instances(&self) -> &[InstanceRaw] {
        &self.instances
    }

    pub fn instance_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.instances)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Bumped on every change to slots or transforms.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Hole, Pad};
    use crate::layer::LayerOffsetCalculator;
    use proptest::prelude::*;

    fn ctx() -> PlacementContext {
        PlacementContext {
            offsets: LayerOffsetCalculator::default().offsets(1.6).unwrap(),
            copper_thickness: 0.035,
        }
    }

    fn pad(id: &str, x: f64) -> Pad {
        Pad::rectangle(id, Point::new(x, 0.0), Size::new(1.0, 1.0), Layer::Top)
    }

    fn assert_dense(store: &InstancedEntityStore<Pad>) {
        for (idx, entity) in store.all().iter().enumerate() {
            assert_eq!(store.slot_of(entity.id()), Some(idx as Slot));
        }
        assert_eq!(store.instances().len(), store.len());
    }

    #[test]
    fn test_capacity_exhaustion_is_reported() {
        let mut store = InstancedEntityStore::new(3, ctx());
        for i in 0..3 {
            assert!(store.add(pad(&format!("p{i}"), i as f64)));
        }
        assert!(!store.add(pad("p3", 3.0)));
        assert_eq!(store.len(), 3);
        assert!(store.by_id("p3").is_none());
    }

    #[test]
    fn test_add_many_stops_at_capacity() {
        let mut store = InstancedEntityStore::new(2, ctx());
        let added = store.add_many((0..5).map(|i| pad(&format!("p{i}"), i as f64)));
        assert_eq!(added, 2);
        assert_eq!(store.len(), 2);
        assert!(store.by_id("p0").is_some());
        assert!(store.by_id("p1").is_some());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut store = InstancedEntityStore::new(4, ctx());
        assert!(store.add(pad("a", 0.0)));
        assert!(!store.add(pad("a", 5.0)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_renumbers_slots() {
        let mut store = InstancedEntityStore::new(8, ctx());
        for i in 0..4 {
            store.add(pad(&format!("p{i}"), i as f64));
        }
        store.mark_clean();
        assert!(store.remove("p1"));
        assert!(store.is_dirty());
        assert_eq!(store.slot_of("p0"), Some(0));
        assert_eq!(store.slot_of("p2"), Some(1));
        assert_eq!(store.slot_of("p3"), Some(2));
        // Instance buffer row 1 now carries p2's transform.
        assert!((store.instances()[1].model[3][0] - 2.0).abs() < 1e-6);
        assert_dense(&store);
    }

    #[test]
    fn test_remove_unknown_is_false() {
        let mut store: InstancedEntityStore<Pad> = InstancedEntityStore::new(2, ctx());
        assert!(!store.remove("ghost"));
        assert!(!store.update_position("ghost", Point::new(1.0, 1.0)));
        assert!(!store.update_size("ghost", Size::new(1.0, 1.0)));
    }

    #[test]
    fn test_update_position_keeps_slot() {
        let mut store = InstancedEntityStore::new(4, ctx());
        store.add(pad("a", 0.0));
        store.add(pad("b", 1.0));
        assert!(store.update_position("a", Point::new(7.0, -2.0)));
        assert_eq!(store.slot_of("a"), Some(0));
        let model = store.instances()[0].model;
        assert!((model[3][0] - 7.0).abs() < 1e-6);
        assert!((model[3][2] + 2.0).abs() < 1e-6);
        assert_eq!(store.by_id("a").unwrap().position, Point::new(7.0, -2.0));
    }

    #[test]
    fn test_degenerate_geometry_rejected() {
        let mut store = InstancedEntityStore::new(4, ctx());
        let nan = Pad::rectangle("nan", Point::new(f64::NAN, 0.0), Size::new(1.0, 1.0), Layer::Top);
        let negative = Pad::rectangle("neg", Point::new(0.0, 0.0), Size::new(-2.0, 0.0), Layer::Top);
        assert!(!store.add(nan));
        assert!(!store.add(negative));
        assert!(store.is_empty());
        assert!(!store.is_dirty());

        store.add(pad("a", 0.0));
        assert!(!store.update_position("a", Point::new(f64::INFINITY, 0.0)));
        assert!(!store.update_size("a", Size::new(f64::NAN, 1.0)));
        assert!(store.footprints().all(|(_, bb)| bb.min.is_finite() && bb.max.is_finite()));
    }

    #[test]
    fn test_update_size_keeps_slot() {
        let mut store = InstancedEntityStore::new(4, ctx());
        store.add(pad("a", 0.0));
        store.add(pad("b", 5.0));
        store.mark_clean();
        let before = store.revision();
        assert!(store.update_size("b", Size::new(3.0, 0.5)));
        assert!(store.is_dirty());
        assert!(store.revision() > before);
        assert_eq!(store.slot_of("a"), Some(0));
        assert_eq!(store.slot_of("b"), Some(1));
        assert_eq!(store.by_id("b").unwrap().size, Size::new(3.0, 0.5));
        let model = store.instances()[1].model;
        assert!((model[0][0] - 3.0).abs() < 1e-6);
        assert!((model[2][2] - 0.5).abs() < 1e-6);
        assert!((model[3][0] - 5.0).abs() < 1e-6);
        // Slot 0 is untouched.
        assert!((store.instances()[0].model[0][0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_clear_resets_count() {
        let mut store = InstancedEntityStore::new(4, ctx());
        store.add(pad("a", 0.0));
        store.mark_clean();
        store.clear();
        assert!(store.is_empty());
        assert!(store.is_dirty());
        assert!(store.add(pad("a", 0.0)));
    }

    #[test]
    fn test_set_context_moves_copper() {
        let mut store = InstancedEntityStore::new(4, ctx());
        store.add(pad("a", 0.0));
        let thin = PlacementContext {
            offsets: LayerOffsetCalculator::default().offsets(0.8).unwrap(),
            copper_thickness: 0.035,
        };
        store.set_context(thin);
        assert!((store.placement_at(0).unwrap().center.y - 0.41).abs() < 1e-6);
    }

    #[test]
    fn test_by_layer() {
        let mut store = InstancedEntityStore::new(4, ctx());
        store.add(pad("a", 0.0));
        store.add(Pad::rectangle("b", Point::new(0.0, 0.0), Size::new(1.0, 1.0), Layer::Bottom));
        assert_eq!(store.by_layer(Layer::Top).len(), 1);
        assert_eq!(store.by_layer(Layer::Bottom)[0].id, "b");

        let mut holes = InstancedEntityStore::new(4, ctx());
        holes.add(Hole::new("h", Point::new(0.0, 0.0), 1.0));
        assert!(holes.by_layer(Layer::Top).is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(u8),
        Remove(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..32).prop_map(Op::Add),
            (0u8..32).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn prop_capacity_never_exceeded(capacity in 1usize..16, extra in 1usize..8) {
            let mut store = InstancedEntityStore::new(capacity, ctx());
            for i in 0..capacity {
                let added = store.add(pad(&format!("p{i}"), 0.0));
                prop_assert!(added);
            }
            for i in 0..extra {
                let added = store.add(pad(&format!("x{i}"), 0.0));
                prop_assert!(!added);
            }
            prop_assert_eq!(store.len(), capacity);
        }

        #[test]
        fn prop_slots_stay_dense(ops in proptest::collection::vec(op(), 0..64)) {
            let mut store = InstancedEntityStore::new(16, ctx());
            for op in ops {
                match op {
                    Op::Add(n) => { store.add(pad(&format!("p{n}"), n as f64)); }
                    Op::Remove(n) => { store.remove(&format!("p{n}")); }
                }
                let mut slots: Vec<Slot> = store
                    .all()
                    .iter()
                    .filter_map(|e| store.slot_of(e.id()))
                    .collect();
                slots.sort_unstable();
                let expected: Vec<Slot> = (0..store.len() as Slot).collect();
                prop_assert_eq!(slots, expected);
                prop_assert_eq!(store.instances().len(), store.len());
            }
        }
    }
}
