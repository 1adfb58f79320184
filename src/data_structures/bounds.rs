use cgmath::{Matrix4, Point3, Transform as _, Vector3};

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    pub fn from_point(p: Point3<f32>) -> Self {
        Self { min: p, max: p }
    }

    /// Smallest box containing all `points`, `None` when there are none.
    pub fn from_points(points: impl IntoIterator<Item = Point3<f32>>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = Self::from_point(points.next()?);
        Some(points.fold(first, |b, p| b.grow(p)))
    }

    pub fn grow(self, p: Point3<f32>) -> Self {
        Self {
            min: Point3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z)),
            max: Point3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z)),
        }
    }

    pub fn union(self, other: Aabb) -> Self {
        self.grow(other.min).grow(other.max)
    }

    pub fn center(&self) -> Point3<f32> {
        Point3::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
            (self.min.z + self.max.z) * 0.5,
        )
    }

    pub fn size(&self) -> Vector3<f32> {
        self.max - self.min
    }

    pub fn max_extent(&self) -> f32 {
        let size = self.size();
        size.x.max(size.y).max(size.z)
    }

    /// A box with no usable extent cannot be scaled to a size.
    pub fn is_degenerate(&self) -> bool {
        let extent = self.max_extent();
        !extent.is_finite() || extent <= f32::EPSILON
    }

    /// Box around the eight transformed corners.
    pub fn transformed(&self, matrix: &Matrix4<f32>) -> Self {
        let corners = [
            Point3::new(self.min.x, self.min.y, self.min.z),
            Point3::new(self.max.x, self.min.y, self.min.z),
            Point3::new(self.min.x, self.max.y, self.min.z),
            Point3::new(self.max.x, self.max.y, self.min.z),
            Point3::new(self.min.x, self.min.y, self.max.z),
            Point3::new(self.max.x, self.min.y, self.max.z),
            Point3::new(self.min.x, self.max.y, self.max.z),
            Point3::new(self.max.x, self.max.y, self.max.z),
        ];
        let first = Self::from_point(matrix.transform_point(corners[0]));
        corners[1..]
            .iter()
            .fold(first, |b, &c| b.grow(matrix.transform_point(c)))
    }
}
