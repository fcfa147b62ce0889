use std::f64::consts::PI;
use std::fmt;

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::geometry::{BBox, Point, Size};
use crate::layer::{Layer, LayerOffsets};

/// Stable entity identifier, unique within its kind.
pub type EntityId = String;

/// The three kinds of instanced board entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Pad,
    Trace,
    Hole,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Pad, EntityKind::Trace, EntityKind::Hole];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Pad => "pad",
            EntityKind::Trace => "trace",
            EntityKind::Hole => "hole",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base shape an instance scales: a unit box or a unit cylinder (diameter 1,
/// height 1, axis along the board normal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Footprint {
    Box,
    Cylinder,
}

/// Everything needed to position one instance: where its centre is, how it
/// is turned about the board normal, and how far the base shape is stretched
/// on each axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub center: Vec3,
    /// Rotation about +y, radians.
    pub yaw: f32,
    pub extents: Vec3,
    pub footprint: Footprint,
}

impl Placement {
    pub fn transform(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            self.extents,
            Quat::from_rotation_y(self.yaw),
            self.center,
        )
    }

    /// Board-plane bounding box of the rotated footprint.
    pub fn footprint_bbox(&self) -> BBox {
        BBox::around_rotated(
            Point::new(self.center.x as f64, self.center.z as f64),
            self.extents.x as f64 / 2.0,
            self.extents.z as f64 / 2.0,
            self.yaw as f64,
        )
    }
}

/// Inputs shared by every placement computation in a store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementContext {
    pub offsets: LayerOffsets,
    pub copper_thickness: f64,
}

/// An entity that can live in an [`crate::store::InstancedEntityStore`].
///
/// `placement` is the per-kind transform math; everything else about the
/// store (slots, capacity, rebuilds) is shared.
pub trait Placeable: Clone + fmt::Debug {
    const KIND: EntityKind;

    fn id(&self) -> &str;

    /// Copper side, or `None` for entities that pierce the board.
    fn layer(&self) -> Option<Layer>;

    fn position(&self) -> Point;

    fn set_position(&mut self, position: Point);

    /// Apply a new footprint size. Returns false when the size is not usable
    /// for this kind (non-positive or non-finite dimensions).
    fn resize(&mut self, size: Size) -> bool;

    fn placement(&self, ctx: &PlacementContext) -> Placement;

    /// Finite position and strictly positive, finite extents. Anything else
    /// would put a degenerate transform in the instance buffer.
    fn is_well_formed(&self) -> bool;
}

fn valid_extent(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PadShape {
    Rectangle,
    Circle,
}

/// A surface-mount copper pad.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pad {
    pub id: EntityId,
    pub shape: PadShape,
    pub position: Point,
    /// For circles, `size.width` is the diameter; `size.height` is carried
    /// through untouched.
    pub size: Size,
    /// Radians about the board normal.
    pub rotation: f64,
    pub layer: Layer,
}

impl Pad {
    pub fn rectangle(id: &str, position: Point, size: Size, layer: Layer) -> Self {
        Self {
            id: id.to_string(),
            shape: PadShape::Rectangle,
            position,
            size,
            rotation: 0.0,
            layer,
        }
    }

    pub fn circle(id: &str, position: Point, diameter: f64, layer: Layer) -> Self {
        Self {
            id: id.to_string(),
            shape: PadShape::Circle,
            position,
            size: Size::new(diameter, diameter),
            rotation: 0.0,
            layer,
        }
    }

    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn area(&self) -> f64 {
        match self.shape {
            PadShape::Rectangle => self.size.area(),
            PadShape::Circle => PI * (self.size.width / 2.0).powi(2),
        }
    }
}

impl Placeable for Pad {
    const KIND: EntityKind = EntityKind::Pad;

    fn id(&self) -> &str {
        &self.id
    }

    fn layer(&self) -> Option<Layer> {
        Some(self.layer)
    }

    fn position(&self) -> Point {
        self.position
    }

    fn set_position(&mut self, position: Point) {
        self.position = position;
    }

    fn resize(&mut self, size: Size) -> bool {
        if !valid_extent(size.width) || !valid_extent(size.height) {
            return false;
        }
        self.size = size;
        true
    }

    fn is_well_formed(&self) -> bool {
        let extents = match self.shape {
            PadShape::Rectangle => valid_extent(self.size.width) && valid_extent(self.size.height),
            PadShape::Circle => valid_extent(self.size.width),
        };
        extents && self.position.is_finite() && self.rotation.is_finite()
    }

    fn placement(&self, ctx: &PlacementContext) -> Placement {
        let copper = ctx.copper_thickness as f32;
        let (extents, footprint) = match self.shape {
            PadShape::Rectangle => (
                Vec3::new(self.size.width as f32, copper, self.size.height as f32),
                Footprint::Box,
            ),
            PadShape::Circle => (
                Vec3::new(self.size.width as f32, copper, self.size.width as f32),
                Footprint::Cylinder,
            ),
        };
        Placement {
            center: Vec3::new(
                self.position.x as f32,
                ctx.offsets.elevation(self.layer) as f32,
                self.position.z as f32,
            ),
            yaw: self.rotation as f32,
            extents,
            footprint,
        }
    }
}

/// A plated drill hole through the whole board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hole {
    pub id: EntityId,
    pub position: Point,
    pub diameter: f64,
}

impl Hole {
    pub fn new(id: &str, position: Point, diameter: f64) -> Self {
        Self {
            id: id.to_string(),
            position,
            diameter,
        }
    }

    pub fn area(&self) -> f64 {
        PI * (self.diameter / 2.0).powi(2)
    }
}

impl Placeable for Hole {
    const KIND: EntityKind = EntityKind::Hole;

    fn id(&self) -> &str {
        &self.id
    }

    fn layer(&self) -> Option<Layer> {
        None
    }

    fn position(&self) -> Point {
        self.position
    }

    fn set_position(&mut self, position: Point) {
        self.position = position;
    }

    fn resize(&mut self, size: Size) -> bool {
        if !valid_extent(size.width) {
            return false;
        }
        self.diameter = size.width;
        true
    }

    fn is_well_formed(&self) -> bool {
        valid_extent(self.diameter) && self.position.is_finite()
    }

    fn placement(&self, ctx: &PlacementContext) -> Placement {
        let d = self.diameter as f32;
        Placement {
            center: Vec3::new(self.position.x as f32, 0.0, self.position.z as f32),
            yaw: 0.0,
            extents: Vec3::new(d, ctx.offsets.hole_depth() as f32, d),
            footprint: Footprint::Cylinder,
        }
    }
}

/// An authored copper trace: an ordered polyline with a constant width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub id: EntityId,
    pub points: Vec<Point>,
    pub width: f64,
    pub layer: Layer,
}

impl Trace {
    pub fn new(id: &str, points: Vec<Point>, width: f64, layer: Layer) -> Self {
        Self {
            id: id.to_string(),
            points,
            width,
            layer,
        }
    }

    /// Positive finite width and finite waypoints.
    pub fn is_well_formed(&self) -> bool {
        valid_extent(self.width) && self.points.iter().all(Point::is_finite)
    }

    pub fn translate(&mut self, dx: f64, dz: f64) {
        for p in &mut self.points {
            *p = p.translate(dx, dz);
        }
    }
}

/// One straight run of a trace; the unit that is actually instanced.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceSegment {
    /// `<trace id>#<index>`, unique within the segment store.
    pub id: EntityId,
    pub trace_id: EntityId,
    pub index: usize,
    pub start: Point,
    pub end: Point,
    pub width: f64,
    /// Radians, `atan2(dz, dx)` on the board plane.
    pub angle: f64,
    pub length: f64,
    pub layer: Layer,
}

impl TraceSegment {
    pub fn between(trace_id: &str, index: usize, start: Point, end: Point, width: f64, layer: Layer) -> Self {
        let dx = end.x - start.x;
        let dz = end.z - start.z;
        Self {
            id: format!("{trace_id}#{index}"),
            trace_id: trace_id.to_string(),
            index,
            start,
            end,
            width,
            angle: dz.atan2(dx),
            length: start.distance_to(&end),
            layer,
        }
    }

    pub fn midpoint(&self) -> Point {
        self.start.midpoint(&self.end)
    }

    pub fn area(&self) -> f64 {
        self.length * self.width
    }
}

impl Placeable for TraceSegment {
    const KIND: EntityKind = EntityKind::Trace;

    fn id(&self) -> &str {
        &self.id
    }

    fn layer(&self) -> Option<Layer> {
        Some(self.layer)
    }

    fn position(&self) -> Point {
        self.midpoint()
    }

    fn set_position(&mut self, position: Point) {
        let mid = self.midpoint();
        let (dx, dz) = (position.x - mid.x, position.z - mid.z);
        self.start = self.start.translate(dx, dz);
        self.end = self.end.translate(dx, dz);
    }

    fn resize(&mut self, size: Size) -> bool {
        if !valid_extent(size.width) {
            return false;
        }
        self.width = size.width;
        true
    }

    fn is_well_formed(&self) -> bool {
        valid_extent(self.width) && self.start.is_finite() && self.end.is_finite()
    }

    fn placement(&self, ctx: &PlacementContext) -> Placement {
        let mid = self.midpoint();
        Placement {
            center: Vec3::new(
                mid.x as f32,
                ctx.offsets.elevation(self.layer) as f32,
                mid.z as f32,
            ),
            // The unit box's +x axis has to land on (dx, 0, dz); a positive
            // rotation about +y sends +x towards -z, hence the negation.
            yaw: -self.angle as f32,
            extents: Vec3::new(
                self.length as f32,
                ctx.copper_thickness as f32,
                self.width as f32,
            ),
            footprint: Footprint::Box,
        }
    }
}
