use glam::{Mat4, Vec3};

use crate::error::ArchiveError;
use crate::persistence::{ArchiveReader, ArchiveWriter};
use crate::transform::Transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColliderShape {
    /// World-axis-aligned box enclosing the transformed extents.
    #[default]
    Aabb,
    /// Box that rotates with its owner.
    Box,
}

impl ColliderShape {
    pub fn tag(self) -> &'static str {
        match self {
            Self::Aabb => "aabb",
            Self::Box => "box",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "aabb" => Some(Self::Aabb),
            "box" => Some(Self::Box),
            _ => None,
        }
    }
}

/// World-space shape of a collider for one pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColliderGeometry {
    pub shape: ColliderShape,
    pub matrix: Mat4,
    pub local_min: Vec3,
    pub local_max: Vec3,
    /// Corners tested by the separating-axis test.
    pub corners: [Vec3; 8],
    /// Unit axes the separating-axis test projects onto.
    pub axes: [Vec3; 3],
    pub half_extents: Vec3,
    pub world_min: Vec3,
    pub world_max: Vec3,
    pub center: Vec3,
}

impl Default for ColliderGeometry {
    fn default() -> Self {
        Self::compute(
            ColliderShape::Aabb,
            Mat4::IDENTITY,
            Vec3::splat(-0.5),
            Vec3::splat(0.5),
        )
    }
}

impl ColliderGeometry {
    pub fn compute(shape: ColliderShape, matrix: Mat4, local_min: Vec3, local_max: Vec3) -> Self {
        let transformed = box_corners(local_min, local_max).map(|corner| matrix.transform_point3(corner));
        let mut world_min = Vec3::splat(f32::MAX);
        let mut world_max = Vec3::splat(f32::MIN);
        for corner in transformed {
            world_min = world_min.min(corner);
            world_max = world_max.max(corner);
        }
        let center = (world_min + world_max) * 0.5;

        let (corners, axes, half_extents) = match shape {
            ColliderShape::Aabb => (
                box_corners(world_min, world_max),
                [Vec3::X, Vec3::Y, Vec3::Z],
                (world_max - world_min) * 0.5,
            ),
            ColliderShape::Box => {
                let columns = [
                    matrix.x_axis.truncate(),
                    matrix.y_axis.truncate(),
                    matrix.z_axis.truncate(),
                ];
                let local_half = (local_max - local_min) * 0.5;
                (
                    transformed,
                    columns.map(|column| column.normalize_or_zero()),
                    Vec3::new(
                        columns[0].length() * local_half.x,
                        columns[1].length() * local_half.y,
                        columns[2].length() * local_half.z,
                    ),
                )
            }
        };

        Self {
            shape,
            matrix,
            local_min,
            local_max,
            corners,
            axes,
            half_extents,
            world_min,
            world_max,
            center,
        }
    }

    /// Unrotated box around `center`.
    pub fn from_center_half_extents(shape: ColliderShape, center: Vec3, half_extents: Vec3) -> Self {
        Self::compute(shape, Mat4::from_translation(center), -half_extents, half_extents)
    }

    /// True if `point` lies strictly inside the collider's local bound. A collider flattened
    /// to zero volume contains nothing.
    pub fn contains_point(&self, point: Vec3) -> bool {
        if self.matrix.determinant().abs() <= f32::EPSILON {
            return false;
        }
        let local = self.matrix.inverse().transform_point3(point);
        local.cmpgt(self.local_min).all() && local.cmplt(self.local_max).all()
    }

    /// Strict overlap test: touching faces do not intersect.
    pub fn intersects(&self, other: &ColliderGeometry) -> bool {
        if self.shape == ColliderShape::Aabb && other.shape == ColliderShape::Aabb {
            return self.world_min.cmplt(other.world_max).all()
                && other.world_min.cmplt(self.world_max).all();
        }
        self.axes
            .iter()
            .chain(other.axes.iter())
            .filter(|axis| axis.length_squared() > f32::EPSILON)
            .all(|axis| {
                let (a_min, a_max) = project(&self.corners, *axis);
                let (b_min, b_max) = project(&other.corners, *axis);
                a_max > b_min && b_max > a_min
            })
    }
}

fn project(corners: &[Vec3; 8], axis: Vec3) -> (f32, f32) {
    corners.iter().fold((f32::MAX, f32::MIN), |(min, max), corner| {
        let distance = corner.dot(axis);
        (min.min(distance), max.max(distance))
    })
}

fn box_corners(min: Vec3, max: Vec3) -> [Vec3; 8] {
    [
        Vec3::new(min.x, min.y, min.z),
        Vec3::new(max.x, min.y, min.z),
        Vec3::new(min.x, max.y, min.z),
        Vec3::new(max.x, max.y, min.z),
        Vec3::new(min.x, min.y, max.z),
        Vec3::new(max.x, min.y, max.z),
        Vec3::new(min.x, max.y, max.z),
        Vec3::new(max.x, max.y, max.z),
    ]
}

/// Box collider owned by a rigid body, positioned by a local offset transform.
#[derive(Debug, Clone, PartialEq)]
pub struct Collider {
    pub shape: ColliderShape,
    pub offset: Transform,
    pub min: Vec3,
    pub max: Vec3,
    pub enabled: bool,
    implicit: bool,
    geometry: ColliderGeometry,
}

impl Collider {
    pub fn new(shape: ColliderShape, min: Vec3, max: Vec3) -> Self {
        let mut collider = Self {
            shape,
            offset: Transform::default(),
            min,
            max,
            enabled: true,
            implicit: false,
            geometry: ColliderGeometry::default(),
        };
        collider.update_geometry(&Transform::default());
        collider
    }

    pub fn unit_cube(shape: ColliderShape) -> Self {
        Self::new(shape, Vec3::splat(-0.5), Vec3::splat(0.5))
    }

    pub(crate) fn implicit(shape: ColliderShape, min: Vec3, max: Vec3) -> Self {
        Self {
            implicit: true,
            ..Self::new(shape, min, max)
        }
    }

    pub fn with_offset(mut self, offset: Transform) -> Self {
        self.offset = offset;
        self
    }

    /// The bounding box every rigid body owns, built from its mesh bound at attach time.
    pub fn is_implicit(&self) -> bool {
        self.implicit
    }

    /// World geometry as of the last [`Collider::update_geometry`].
    pub fn geometry(&self) -> &ColliderGeometry {
        &self.geometry
    }

    pub fn update_geometry(&mut self, owner: &Transform) {
        let matrix = owner.compose() * self.offset.compose();
        self.geometry = ColliderGeometry::compute(self.shape, matrix, self.min, self.max);
    }

    pub(crate) fn save(&self, writer: &mut dyn ArchiveWriter) {
        writer.write_str("shape", self.shape.tag());
        writer.write_vec3("min", self.min);
        writer.write_vec3("max", self.max);
        writer.write_bool("enabled", self.enabled);
        writer.begin_block("offset");
        self.offset.save(writer);
        writer.end_block();
    }

    pub(crate) fn load(reader: &mut dyn ArchiveReader) -> Result<Self, ArchiveError> {
        let shape = read_shape(reader)?;
        let mut collider = Self::new(shape, reader.read_vec3("min")?, reader.read_vec3("max")?);
        collider.enabled = reader.read_bool("enabled")?;
        reader.begin_block("offset")?;
        collider.offset = Transform::load(reader)?;
        reader.end_block()?;
        Ok(collider)
    }
}

pub(crate) fn read_shape(reader: &mut dyn ArchiveReader) -> Result<ColliderShape, ArchiveError> {
    let tag = reader.read_str("shape")?;
    ColliderShape::from_tag(&tag).ok_or_else(|| ArchiveError::InvalidValue {
        key: "shape".into(),
        message: format!("unknown collider shape {tag:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aabb(center: Vec3) -> ColliderGeometry {
        ColliderGeometry::from_center_half_extents(ColliderShape::Aabb, center, Vec3::ONE)
    }

    #[test]
    fn overlapping_boxes_intersect() {
        let a = aabb(Vec3::ZERO);
        let b = aabb(Vec3::new(1.5, 0.0, 0.0));
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
    }

    #[test]
    fn separated_boxes_do_not_intersect() {
        let a = aabb(Vec3::ZERO);
        let b = aabb(Vec3::new(3.0, 0.0, 0.0));
        assert!(!a.intersects(&b));
        assert!(!b.intersects(&a));
    }

    #[test]
    fn zero_scale_collider_contains_no_point() {
        let flat = ColliderGeometry::compute(
            ColliderShape::Aabb,
            Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0)),
            -Vec3::ONE,
            Vec3::ONE,
        );
        assert!(!flat.contains_point(Vec3::ZERO));
        assert!(!flat.contains_point(Vec3::new(0.5, 0.0, 0.5)));
        assert!(aabb(Vec3::ZERO).contains_point(Vec3::new(0.5, 0.5, 0.5)));
    }

    #[test]
    fn touching_faces_are_not_an_overlap() {
        let a = aabb(Vec3::ZERO);
        let b = aabb(Vec3::new(2.0, 0.0, 0.0));
        assert!(!a.intersects(&b));
    }

    #[test]
    fn rotated_box_uses_separating_axes() {
        // A unit box turned 45 degrees reaches ~0.707 along X.
        let mut owner = Transform::new().with_euler(Vec3::new(0.0, 0.0, 45.0));
        owner.position = Vec3::ZERO;
        let mut rotated = Collider::unit_cube(ColliderShape::Box);
        rotated.update_geometry(&owner);

        let near = ColliderGeometry::from_center_half_extents(
            ColliderShape::Aabb,
            Vec3::new(1.1, 0.0, 0.0),
            Vec3::splat(0.5),
        );
        let far = ColliderGeometry::from_center_half_extents(
            ColliderShape::Aabb,
            Vec3::new(1.3, 0.0, 0.0),
            Vec3::splat(0.5),
        );
        assert!(rotated.geometry().intersects(&near));
        assert!(!rotated.geometry().intersects(&far));
    }

    #[test]
    fn offset_moves_collider_relative_to_owner() {
        let owner = Transform::from_position(Vec3::new(10.0, 0.0, 0.0));
        let mut collider = Collider::unit_cube(ColliderShape::Aabb)
            .with_offset(Transform::from_position(Vec3::new(0.0, 2.0, 0.0)));
        collider.update_geometry(&owner);
        assert_eq!(collider.geometry().center, Vec3::new(10.0, 2.0, 0.0));
        assert!(collider.geometry().contains_point(Vec3::new(10.2, 2.2, 0.0)));
        assert!(!collider.geometry().contains_point(Vec3::new(10.0, 0.0, 0.0)));
    }
}
