use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in a tiling scheme's coordinate space.
///
/// Depending on the caller this is either geographic degrees or native
/// projected metres; the type does not track which.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Rectangle {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    pub fn center(&self) -> DVec2 {
        DVec2::new(
            (self.west + self.east) * 0.5,
            (self.south + self.north) * 0.5,
        )
    }

    /// Inclusive containment test.
    pub fn contains(&self, point: DVec2) -> bool {
        point.x >= self.west
            && point.x <= self.east
            && point.y >= self.south
            && point.y <= self.north
    }

    /// True when the two rectangles share a region of nonzero area.
    pub fn intersects(&self, other: &Rectangle) -> bool {
        self.west < other.east
            && other.west < self.east
            && self.south < other.north
            && other.south < self.north
    }
}

/// Axis-aligned bounding box in native coordinates, `z` up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Extrude a native rectangle between two heights.
    pub fn from_rectangle(rect: &Rectangle, min_height: f64, max_height: f64) -> Self {
        Self {
            min: DVec3::new(rect.west, rect.south, min_height),
            max: DVec3::new(rect.east, rect.north, max_height),
        }
    }

    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Euclidean distance from `point` to the closest point of the box.
    /// Zero when the point is inside.
    pub fn distance_to(&self, point: DVec3) -> f64 {
        let closest = point.clamp(self.min, self.max);
        (point - closest).length()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingSphere {
    pub center: DVec3,
    pub radius: f64,
}

impl BoundingSphere {
    pub fn new(center: DVec3, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Smallest sphere enclosing the box.
    pub fn from_aabb(aabb: &Aabb) -> Self {
        Self {
            center: aabb.center(),
            radius: (aabb.max - aabb.min).length() * 0.5,
        }
    }
}

/// Result of testing a volume against a culling volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intersection {
    Inside,
    Outside,
    Intersecting,
}

/// Plane `normal · p + distance = 0`; the positive half-space is "inside".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: DVec3,
    pub distance: f64,
}

impl Plane {
    /// Plane through `point` with the given (not necessarily unit) normal.
    pub fn from_point_normal(point: DVec3, normal: DVec3) -> Self {
        let normal = normal.normalize();
        Self {
            normal,
            distance: -normal.dot(point),
        }
    }

    pub fn signed_distance(&self, point: DVec3) -> f64 {
        self.normal.dot(point) + self.distance
    }
}

/// Convex set of inward-facing planes, typically the six sides of a view frustum.
#[derive(Debug, Clone, PartialEq)]
pub struct CullingVolume {
    pub planes: Vec<Plane>,
}

impl CullingVolume {
    pub fn new(planes: Vec<Plane>) -> Self {
        Self { planes }
    }

    /// A volume with no planes; everything is inside.
    pub fn everything() -> Self {
        Self { planes: Vec::new() }
    }

    /// Build the six frustum planes of a perspective camera.
    ///
    /// `fovy` is the vertical field of view in radians; `aspect` is width / height.
    pub fn from_perspective(
        position: DVec3,
        direction: DVec3,
        up: DVec3,
        fovy: f64,
        aspect: f64,
        near: f64,
        far: f64,
    ) -> Self {
        let direction = direction.normalize();
        let right = direction.cross(up).normalize();
        let up = right.cross(direction).normalize();
        let tan_y = (fovy * 0.5).tan();
        let tan_x = tan_y * aspect;

        let planes = vec![
            Plane::from_point_normal(position + direction * near, direction),
            Plane::from_point_normal(position + direction * far, -direction),
            Plane::from_point_normal(position, right + direction * tan_x),
            Plane::from_point_normal(position, -right + direction * tan_x),
            Plane::from_point_normal(position, up + direction * tan_y),
            Plane::from_point_normal(position, -up + direction * tan_y),
        ];
        Self { planes }
    }

    pub fn visibility(&self, sphere: &BoundingSphere) -> Intersection {
        let mut intersecting = false;
        for plane in &self.planes {
            let d = plane.signed_distance(sphere.center);
            if d < -sphere.radius {
                return Intersection::Outside;
            }
            if d < sphere.radius {
                intersecting = true;
            }
        }
        if intersecting {
            Intersection::Intersecting
        } else {
            Intersection::Inside
        }
    }
}
