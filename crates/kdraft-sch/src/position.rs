use serde::{Deserialize, Serialize};

/// Standard schematic grid pitch in millimetres (100 mil).
pub const GRID_MM: f64 = 2.54;

/// Snap a coordinate to the nearest grid point for deterministic placement.
pub fn snap_to_grid(value: f64) -> f64 {
    (value / GRID_MM).round() * GRID_MM
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorAxis {
    X,
    Y,
}

/// Placement of a symbol on a sheet: anchor coordinate in mm, rotation in
/// degrees (counter-clockwise) and an optional mirror axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror: Option<MirrorAxis>,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Position {
            x,
            y,
            rotation: 0.0,
            mirror: None,
        }
    }

    /// Snapped copy of this placement.
    pub fn snapped(&self) -> Self {
        Position {
            x: snap_to_grid(self.x),
            y: snap_to_grid(self.y),
            rotation: self.rotation,
            mirror: self.mirror,
        }
    }

    pub fn anchor(&self) -> Point {
        Point {
            x: self.x,
            y: self.y,
        }
    }

    /// Map a symbol-relative offset to an absolute sheet coordinate.
    ///
    /// Mirror is applied before rotation, matching how symbol transforms
    /// compose in the schematic editor. Right-angle rotations go through an
    /// exact integer path so pin coordinates stay on grid.
    pub fn place(&self, offset: Point) -> Point {
        let (mut dx, mut dy) = (offset.x, offset.y);

        match self.mirror {
            Some(MirrorAxis::X) => dy = -dy,
            Some(MirrorAxis::Y) => dx = -dx,
            None => {}
        }

        let rot = self.rotation.rem_euclid(360.0);
        let (rx, ry) = if rot == 0.0 {
            (dx, dy)
        } else if rot == 90.0 {
            (-dy, dx)
        } else if rot == 180.0 {
            (-dx, -dy)
        } else if rot == 270.0 {
            (dy, -dx)
        } else {
            let rad = rot.to_radians();
            let (sin, cos) = rad.sin_cos();
            (dx * cos - dy * sin, dx * sin + dy * cos)
        };

        Point {
            x: self.x + rx,
            y: self.y + ry,
        }
    }
}

/// Absolute sheet coordinate in mm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    pub fn snapped(&self) -> Self {
        Point {
            x: snap_to_grid(self.x),
            y: snap_to_grid(self.y),
        }
    }

    /// Integer key for coordinate identity.
    pub fn grid_key(&self) -> GridPoint {
        GridPoint::from_mm(self.x, self.y)
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

/// A coordinate quantised to hundredths of a millimetre.
///
/// Net computation and wire-endpoint comparison key points through this type
/// so that float noise from placement arithmetic cannot split a net.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPoint(pub i64, pub i64);

impl GridPoint {
    pub fn from_mm(x: f64, y: f64) -> Self {
        GridPoint((x * 100.0).round() as i64, (y * 100.0).round() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snap_rounds_to_nearest_grid_point() {
        assert_eq!(snap_to_grid(0.0), 0.0);
        assert_eq!(snap_to_grid(2.6), 2.54);
        assert_eq!(snap_to_grid(3.9), 5.08);
        assert_eq!(snap_to_grid(-1.3), -2.54);
    }

    #[test]
    fn place_applies_right_angle_rotation_exactly() {
        let pos = Position {
            x: 10.0,
            y: 10.0,
            rotation: 90.0,
            mirror: None,
        };
        let p = pos.place(Point::new(2.54, 0.0));
        assert_eq!(p.grid_key(), GridPoint::from_mm(10.0, 12.54));

        let pos180 = Position {
            rotation: 180.0,
            ..pos.clone()
        };
        let p = pos180.place(Point::new(2.54, 0.0));
        assert_eq!(p.grid_key(), GridPoint::from_mm(7.46, 10.0));
    }

    #[test]
    fn place_applies_mirror_before_rotation() {
        let pos = Position {
            x: 0.0,
            y: 0.0,
            rotation: 90.0,
            mirror: Some(MirrorAxis::Y),
        };
        // (1, 0) -> mirror Y -> (-1, 0) -> rot 90 -> (0, -1)
        let p = pos.place(Point::new(1.0, 0.0));
        assert_eq!(p.grid_key(), GridPoint::from_mm(0.0, -1.0));
    }

    #[test]
    fn grid_key_absorbs_float_noise() {
        let a = Point::new(2.54, 5.08);
        let b = Point::new(2.5400000001, 5.0799999999);
        assert_eq!(a.grid_key(), b.grid_key());
    }
}
