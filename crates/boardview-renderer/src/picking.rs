//! Ray picking against instanced stores.
//!
//! Broad phase: the ray's shadow on the board plane, between the lowest and
//! highest copper, is queried against an R-tree of instance footprints.
//! Narrow phase: the ray is taken into each candidate's local frame and
//! tested against its box or cylinder.

use std::collections::HashMap;

use glam::{Quat, Vec3};
use uuid::Uuid;

use boardview_core::spatial::SpatialIndex;
use boardview_core::{BBox, Board, EntityKind, Footprint, Placement, Point, Slot};

use crate::render_store::RenderHandle;
use crate::viewpoint::Ray;

/// Default width of the band added around thin geometry, in board units.
pub const DEFAULT_HIT_TOLERANCE: f64 = 0.5;

/// The nearest struck instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub handle: RenderHandle,
    /// Instance slot; always 0 for non-instanced meshes.
    pub slot: Slot,
    pub point: Vec3,
    /// Distance from the ray origin.
    pub distance: f32,
}

struct CachedIndex {
    board: Uuid,
    revision: u64,
    index: SpatialIndex,
}

pub struct HitTestEngine {
    tolerance: f64,
    indices: HashMap<EntityKind, CachedIndex>,
}

impl HitTestEngine {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance: tolerance.max(0.0),
            indices: HashMap::new(),
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Drop cached footprint indices; they are rebuilt on the next pick.
    pub fn invalidate(&mut self) {
        self.indices.clear();
    }

    /// Nearest hit among `interactable`, or `None`. Ties keep the handle
    /// listed first.
    pub fn pick(&mut self, ray: &Ray, board: &Board, interactable: &[RenderHandle]) -> Option<Hit> {
        if ray.direction == Vec3::ZERO || !ray.origin.is_finite() || !ray.direction.is_finite() {
            return None;
        }
        let mut best: Option<Hit> = None;
        for handle in interactable {
            let candidate = match handle.kind.entity_kind() {
                Some(kind) => self.pick_store(ray, board, kind, *handle),
                None => pick_substrate(ray, board, *handle),
            };
            if let Some(hit) = candidate {
                if best.map_or(true, |b| hit.distance < b.distance) {
                    best = Some(hit);
                }
            }
        }
        best
    }

    fn pick_store(&mut self, ray: &Ray, board: &Board, kind: EntityKind, handle: RenderHandle) -> Option<Hit> {
        if board.instance_count(kind) == 0 {
            return None;
        }
        let band = if kind == EntityKind::Trace {
            self.tolerance as f32 / 2.0
        } else {
            0.0
        };
        let region = ray_shadow(ray, board).map(|r| r.inflate(self.tolerance));
        let index = self.index_for(board, kind);
        let candidates: Vec<Slot> = match region {
            Some(region) => index.query_region(&region).into_iter().map(|e| e.slot).collect(),
            None => index.iter().map(|e| e.slot).collect(),
        };

        let mut best: Option<(Slot, f32)> = None;
        for slot in candidates {
            let Some(placement) = board.placement_at(kind, slot) else {
                continue;
            };
            if let Some(t) = intersect_placement(ray, placement, band) {
                let closer = match best {
                    Some((best_slot, best_t)) => t < best_t || (t == best_t && slot < best_slot),
                    None => true,
                };
                if closer {
                    best = Some((slot, t));
                }
            }
        }
        best.map(|(slot, t)| Hit {
            handle,
            slot,
            point: ray.at(t),
            distance: t,
        })
    }

    fn index_for(&mut self, board: &Board, kind: EntityKind) -> &SpatialIndex {
        let revision = board.revision(kind);
        let stale = self
            .indices
            .get(&kind)
            .map_or(true, |c| c.board != board.id || c.revision != revision);
        if stale {
            let index = SpatialIndex::from_footprints(board.footprints(kind));
            log::debug!("Rebuilt {} hit index ({} footprints)", kind, index.len());
            self.indices.insert(
                kind,
                CachedIndex {
                    board: board.id,
                    revision,
                    index,
                },
            );
        }
        &self.indices[&kind].index
    }
}

impl Default for HitTestEngine {
    fn default() -> Self {
        Self::new(DEFAULT_HIT_TOLERANCE)
    }
}

impl std::fmt::Debug for HitTestEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HitTestEngine")
            .field("tolerance", &self.tolerance)
            .field("cached", &self.indices.len())
            .finish()
    }
}

/// Board-plane box covering where the ray passes through the copper slab.
/// `None` when the ray runs parallel to the board.
fn ray_shadow(ray: &Ray, board: &Board) -> Option<BBox> {
    let offsets = board.offsets();
    let reach = board.copper_thickness() + offsets.clearance;
    let upper = (offsets.top + reach) as f32;
    let lower = (offsets.bottom - reach) as f32;
    if ray.direction.y.abs() < 1e-6 {
        return None;
    }
    let span = |y: f32| {
        let t = ((y - ray.origin.y) / ray.direction.y).max(0.0);
        let p = ray.at(t);
        Point::new(p.x as f64, p.z as f64)
    };
    BBox::from_points(&[span(upper), span(lower)])
}

fn pick_substrate(ray: &Ray, board: &Board, handle: RenderHandle) -> Option<Hit> {
    let dims = board.dimensions();
    let half = Vec3::new(
        dims.width as f32 / 2.0,
        dims.thickness as f32 / 2.0,
        dims.height as f32 / 2.0,
    );
    intersect_box(ray.origin, ray.direction, half).map(|t| Hit {
        handle,
        slot: 0,
        point: ray.at(t),
        distance: t,
    })
}

/// Ray parameter of the first hit on an instance, with `band` added to the
/// half-width and half-height of boxes.
pub fn intersect_placement(ray: &Ray, placement: &Placement, band: f32) -> Option<f32> {
    let to_local = Quat::from_rotation_y(-placement.yaw);
    let origin = to_local * (ray.origin - placement.center);
    let direction = to_local * ray.direction;
    let half = placement.extents / 2.0;
    match placement.footprint {
        Footprint::Box => intersect_box(origin, direction, half + Vec3::new(0.0, band, band)),
        Footprint::Cylinder => intersect_cylinder(origin, direction, half.x, half.y),
    }
}

/// Slab test against an origin-centred box.
fn intersect_box(origin: Vec3, direction: Vec3, half: Vec3) -> Option<f32> {
    let mut t_min = f32::NEG_INFINITY;
    let mut t_max = f32::INFINITY;
    for axis in 0..3 {
        let (o, d, h) = (origin[axis], direction[axis], half[axis]);
        if d.abs() < 1e-9 {
            if o.abs() > h {
                return None;
            }
            continue;
        }
        let a = (-h - o) / d;
        let b = (h - o) / d;
        t_min = t_min.max(a.min(b));
        t_max = t_max.min(a.max(b));
        if t_min > t_max {
            return None;
        }
    }
    if t_max < 0.0 {
        return None;
    }
    Some(t_min.max(0.0))
}

/// Capped cylinder along +y centred on the origin.
fn intersect_cylinder(origin: Vec3, direction: Vec3, radius: f32, half_height: f32) -> Option<f32> {
    let mut nearest: Option<f32> = None;
    let mut consider = |t: f32| {
        if t >= 0.0 && nearest.map_or(true, |n| t < n) {
            nearest = Some(t);
        }
    };

    let inside_radius = |p: Vec3| p.x * p.x + p.z * p.z <= radius * radius;

    // Side wall.
    let a = direction.x * direction.x + direction.z * direction.z;
    if a > 1e-12 {
        let b = 2.0 * (origin.x * direction.x + origin.z * direction.z);
        let c = origin.x * origin.x + origin.z * origin.z - radius * radius;
        let disc = b * b - 4.0 * a * c;
        if disc >= 0.0 {
            let root = disc.sqrt();
            for t in [(-b - root) / (2.0 * a), (-b + root) / (2.0 * a)] {
                let y = origin.y + direction.y * t;
                if y.abs() <= half_height {
                    consider(t);
                }
            }
        }
    }

    // Caps.
    if direction.y.abs() > 1e-9 {
        for cap in [half_height, -half_height] {
            let t = (cap - origin.y) / direction.y;
            if inside_radius(origin + direction * t) {
                consider(t);
            }
        }
    }

    // Ray starting inside the solid.
    if origin.y.abs() <= half_height && inside_radius(origin) {
        consider(0.0);
    }
    nearest
}
