use rstar::{RTree, RTreeObject, AABB};

use crate::geometry::BBox;
use crate::store::Slot;

/// An entry in the R-tree spatial index, referencing an instance by slot.
#[derive(Debug, Clone)]
pub struct SpatialEntry {
    pub slot: Slot,
    /// Board-plane footprint of the instance.
    pub bbox: BBox,
}

impl RTreeObject for SpatialEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bbox.min.x, self.bbox.min.z],
            [self.bbox.max.x, self.bbox.max.z],
        )
    }
}

/// Footprint index over one store's instances, used as the broad phase of
/// hit testing.
pub struct SpatialIndex {
    tree: RTree<SpatialEntry>,
}

impl SpatialIndex {
    /// Build the index from a list of footprints.
    pub fn build(entries: Vec<SpatialEntry>) -> Self {
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn from_footprints<I>(footprints: I) -> Self
    where
        I: IntoIterator<Item = (Slot, BBox)>,
    {
        Self::build(
            footprints
                .into_iter()
                .map(|(slot, bbox)| SpatialEntry { slot, bbox })
                .collect(),
        )
    }

    /// Find all entries whose footprint intersects `region`.
    pub fn query_region(&self, region: &BBox) -> Vec<&SpatialEntry> {
        let envelope = AABB::from_corners(
            [region.min.x, region.min.z],
            [region.max.x, region.max.z],
        );
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SpatialEntry> {
        self.tree.iter()
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}
