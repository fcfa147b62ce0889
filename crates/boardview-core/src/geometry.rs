use serde::{Deserialize, Serialize};

/// A 2D point on the board plane. `x` runs along the board width, `z` along
/// its height; elevation is implied by the layer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, z: f64) -> Self {
        Self { x, z }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.z - other.z).powi(2)).sqrt()
    }

    pub fn translate(&self, dx: f64, dz: f64) -> Self {
        Self {
            x: self.x + dx,
            z: self.z + dz,
        }
    }

    pub fn midpoint(&self, other: &Point) -> Self {
        Self {
            x: (self.x + other.x) / 2.0,
            z: (self.z + other.z) / 2.0,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.z.is_finite()
    }
}

/// Footprint dimensions of a pad: `width` along local x, `height` along local z.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// An axis-aligned bounding box on the board plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min: Point,
    pub max: Point,
}

impl BBox {
    pub fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    pub fn from_points(points: &[Point]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_x = f64::MAX;
        let mut min_z = f64::MAX;
        let mut max_x = f64::MIN;
        let mut max_z = f64::MIN;
        for p in points {
            min_x = min_x.min(p.x);
            min_z = min_z.min(p.z);
            max_x = max_x.max(p.x);
            max_z = max_z.max(p.z);
        }
        Some(Self {
            min: Point::new(min_x, min_z),
            max: Point::new(max_x, max_z),
        })
    }

    /// Box of the given half extents centred on `center`, rotated by `yaw`
    /// radians about the board normal.
    pub fn around_rotated(center: Point, half_x: f64, half_z: f64, yaw: f64) -> Self {
        let (sin, cos) = yaw.sin_cos();
        let reach_x = (half_x * cos).abs() + (half_z * sin).abs();
        let reach_z = (half_x * sin).abs() + (half_z * cos).abs();
        Self {
            min: Point::new(center.x - reach_x, center.z - reach_z),
            max: Point::new(center.x + reach_x, center.z + reach_z),
        }
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.z - self.min.z
    }

    pub fn center(&self) -> Point {
        self.min.midpoint(&self.max)
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn inflate(&self, margin: f64) -> Self {
        Self {
            min: self.min.translate(-margin, -margin),
            max: self.max.translate(margin, margin),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-10);
    }

    #[test]
    fn test_bbox_intersection() {
        let a = BBox::new(Point::new(0.0, 0.0), Point::new(10.0, 10.0));
        let b = BBox::new(Point::new(5.0, 5.0), Point::new(15.0, 15.0));
        let c = BBox::new(Point::new(20.0, 20.0), Point::new(30.0, 30.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_rotated_bbox_quarter_turn() {
        let bb = BBox::around_rotated(Point::new(1.0, 1.0), 2.0, 0.5, std::f64::consts::FRAC_PI_2);
        assert!((bb.width() - 1.0).abs() < 1e-10);
        assert!((bb.height() - 4.0).abs() < 1e-10);
        assert!((bb.center().x - 1.0).abs() < 1e-10);
    }
}
