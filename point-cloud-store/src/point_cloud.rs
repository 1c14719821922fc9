/// The point cloud aggregate: vertex stream, user data stream and schema.
use crate::aabb::Aabb;
use crate::buffer::ByteBuffer;
use crate::error::PointCloudError;
use crate::kdtree::{self, KdTreeIndex, PointIndex};
use crate::progress::{Completion, ProgressSink};
use crate::scalar::{FieldValue, Scalar, ScalarType};
use crate::shader::Shader;
use bytemuck::{Pod, Zeroable};
use constants::format::{PLACEHOLDER_COLOUR, POISON_PATTERN, VERTEX_SIZE};
use glam::Vec3;
use std::fmt;

/// Position and colour of one point, exactly as rendered and stored on disk.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub coordinate: [f32; 3],
    pub color: [u8; 3],
    pub padding: u8,
}

static_assertions::assert_eq_size!(Vertex, [u8; VERTEX_SIZE]);

impl Vertex {
    pub fn new(coordinate: Vec3, color: [u8; 3]) -> Self {
        Self {
            coordinate: coordinate.to_array(),
            color,
            padding: 0,
        }
    }

    /// Stand-in for a point whose position has not been written yet.
    pub fn placeholder() -> Self {
        Self::new(Vec3::NAN, PLACEHOLDER_COLOUR)
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.coordinate)
    }

    /// False while every coordinate is NaN (placeholder or poison fill).
    pub fn is_positioned(&self) -> bool {
        !self.coordinate.iter().all(|c| c.is_nan())
    }
}

/// Name, kind and byte offset of one user data field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub scalar_type: ScalarType,
    pub offset: usize,
}

/// Layout of the per-point user data record.
///
/// Fields are packed in declaration order: offsets ascend without gaps and
/// their widths add up to the stride.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserDataSchema {
    fields: Vec<FieldDescriptor>,
    stride: usize,
}

impl UserDataSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pack `(name, type)` pairs in order.
    pub fn from_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, ScalarType)>,
        S: Into<String>,
    {
        let mut stride = 0;
        let fields = fields
            .into_iter()
            .map(|(name, scalar_type)| {
                let offset = stride;
                stride += scalar_type.size_of();
                FieldDescriptor {
                    name: name.into(),
                    scalar_type,
                    offset,
                }
            })
            .collect();
        Self { fields, stride }
    }

    /// Adopt an externally described layout after checking it.
    pub fn from_parts(stride: usize, fields: Vec<FieldDescriptor>) -> Result<Self, PointCloudError> {
        let schema = Self { fields, stride };
        schema.verify()?;
        Ok(schema)
    }

    /// Check that offsets ascend without overlap, widths add up to the
    /// stride and no name is empty.
    pub fn verify(&self) -> Result<(), PointCloudError> {
        let mut expected_offset = 0;
        for (i, field) in self.fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(PointCloudError::InvalidSchema(format!("field #{} has no name", i)));
            }
            if field.offset != expected_offset {
                return Err(PointCloudError::InvalidSchema(format!(
                    "field '{}' at offset {}, expected {}",
                    field.name, field.offset, expected_offset
                )));
            }
            expected_offset += field.scalar_type.size_of();
        }
        if expected_offset != self.stride {
            return Err(PointCloudError::InvalidSchema(format!(
                "fields add up to {} bytes but the stride is {}",
                expected_offset, self.stride
            )));
        }
        Ok(())
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Bytes of all field names concatenated.
    pub fn total_name_length(&self) -> usize {
        self.fields.iter().map(|f| f.name.len()).sum()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// All user data values of one point, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct UserData {
    pub names: Vec<String>,
    pub values: Vec<FieldValue>,
}

impl fmt::Display for UserData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "/==== UserData ====\\")?;
        for (name, value) in self.names.iter().zip(&self.values) {
            writeln!(f, "| {}: {}", name, value)?;
        }
        writeln!(f, "\\==================/")
    }
}

/// Field `set_label` writes to.
pub const LABEL_FIELD_INDEX: usize = 6;

/// Columnar point set.
///
/// Holds a fixed 16 byte [`Vertex`] per point for rendering and picking, a
/// user data record per point laid out by a [`UserDataSchema`], the
/// bounding box, shader metadata and an optional kd-tree index.
#[derive(Debug, Default)]
pub struct PointCloud {
    num_points: usize,
    is_valid: bool,
    coordinate_color: ByteBuffer,
    user_data: ByteBuffer,
    schema: UserDataSchema,
    pub aabb: Aabb,
    pub shader: Shader,
    kdtree_index: KdTreeIndex,
}

impl PointCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a cloud of `num_points` poisoned points with `schema`.
    pub fn with_schema(schema: UserDataSchema, num_points: usize) -> Self {
        let mut cloud = Self::new();
        cloud.set_user_data_format(schema);
        cloud.resize(num_points);
        cloud
    }

    /// Adopt streams filled by a reader. Their lengths must match
    /// `num_points` and the schema stride.
    pub(crate) fn from_streams(
        schema: UserDataSchema,
        num_points: usize,
        coordinate_color: ByteBuffer,
        user_data: ByteBuffer,
    ) -> Self {
        debug_assert_eq!(coordinate_color.len(), num_points * VERTEX_SIZE);
        debug_assert_eq!(user_data.len(), num_points * schema.stride());
        Self {
            num_points,
            is_valid: true,
            coordinate_color,
            user_data,
            schema,
            ..Self::default()
        }
    }

    pub fn num_points(&self) -> usize {
        self.num_points
    }

    /// True once the streams have been allocated by [`PointCloud::resize`].
    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn schema(&self) -> &UserDataSchema {
        &self.schema
    }

    pub fn user_data_stride(&self) -> usize {
        self.schema.stride()
    }

    /// Replace the user data layout. The user data stream is reallocated and
    /// poisoned for the current point count.
    pub fn set_user_data_format(&mut self, schema: UserDataSchema) {
        self.schema = schema;
        self.user_data.resize(self.num_points * self.schema.stride());
        self.user_data.fill(POISON_PATTERN);
    }

    /// Allocate both streams for `num_points` points and poison them, so
    /// unwritten positions read as NaN. Drops any index.
    pub fn resize(&mut self, num_points: usize) {
        self.num_points = num_points;
        self.is_valid = true;

        self.coordinate_color.resize(num_points * VERTEX_SIZE);
        self.user_data.resize(num_points * self.schema.stride());

        self.coordinate_color.fill(POISON_PATTERN);
        self.user_data.fill(POISON_PATTERN);

        self.kdtree_index.clear();
    }

    /// Release both streams, the schema and the index.
    pub fn clear(&mut self) {
        self.coordinate_color.clear();
        self.user_data.clear();
        self.kdtree_index.clear();

        self.num_points = 0;
        self.aabb = Aabb::invalid();
        self.schema = UserDataSchema::new();
    }

    pub fn vertices(&self) -> &[Vertex] {
        bytemuck::cast_slice(self.coordinate_color.as_bytes())
    }

    pub fn vertices_mut(&mut self) -> &mut [Vertex] {
        bytemuck::cast_slice_mut(self.coordinate_color.as_bytes_mut())
    }

    pub fn vertex_at(&self, point_index: usize) -> Vertex {
        self.vertices()[point_index]
    }

    pub fn set_vertex(&mut self, point_index: usize, vertex: Vertex) {
        self.vertices_mut()[point_index] = vertex;
    }

    /// Interleaved position + colour stream, ready for GPU upload.
    pub fn vertex_bytes(&self) -> &[u8] {
        self.coordinate_color.as_bytes()
    }

    pub fn user_data_bytes(&self) -> &[u8] {
        self.user_data.as_bytes()
    }

    /// Raw user data record of one point.
    pub fn point_data(&self, point_index: usize) -> &[u8] {
        let stride = self.schema.stride();
        &self.user_data.as_bytes()[point_index * stride..(point_index + 1) * stride]
    }

    /// Raw user data record of one point, for writers that encode fields
    /// through [`ScalarType`] themselves.
    pub fn point_data_mut(&mut self, point_index: usize) -> &mut [u8] {
        let stride = self.schema.stride();
        &mut self.user_data.as_bytes_mut()[point_index * stride..(point_index + 1) * stride]
    }

    /// Read field `field` of a point converted to `T`. Panics when either
    /// index is out of range.
    pub fn read_field<T: Scalar>(&self, point_index: usize, field: usize) -> T {
        let descriptor = &self.schema.fields()[field];
        descriptor
            .scalar_type
            .read_as(&self.point_data(point_index)[descriptor.offset..])
    }

    /// Write field `field` of a point, converting from `T`. Panics when
    /// either index is out of range.
    pub fn write_field<T: Scalar>(&mut self, point_index: usize, field: usize, value: T) {
        let descriptor = self.schema.fields()[field].clone();
        descriptor
            .scalar_type
            .write_from(&mut self.point_data_mut(point_index)[descriptor.offset..], value);
    }

    /// Every user data value of a point widened for display.
    pub fn fields_of_point(&self, point_index: usize) -> Result<UserData, PointCloudError> {
        if point_index >= self.num_points {
            return Err(PointCloudError::PointOutOfRange {
                index: point_index,
                len: self.num_points,
            });
        }

        let data = self.point_data(point_index);
        let (names, values) = self
            .schema
            .fields()
            .iter()
            .map(|field| {
                let value = field.scalar_type.read(&data[field.offset..]).widen();
                (field.name.clone(), value)
            })
            .unzip();

        Ok(UserData { names, values })
    }

    /// Write an annotation label into the 7th user data field, scaled by 255.
    /// Does nothing for [`PointIndex::INVALID`].
    pub fn set_label(&mut self, point_index: PointIndex, label: u32) -> Result<(), PointCloudError> {
        let Some(index) = point_index.get() else {
            return Ok(());
        };
        if index >= self.num_points {
            return Err(PointCloudError::PointOutOfRange {
                index,
                len: self.num_points,
            });
        }
        if self.schema.len() <= LABEL_FIELD_INDEX {
            return Err(PointCloudError::MissingLabelField {
                expected: LABEL_FIELD_INDEX,
                len: self.schema.len(),
            });
        }

        log::debug!("Labelling point {} as {}", index, label);
        self.write_field(index, LABEL_FIELD_INDEX, u64::from(label) * 255);
        Ok(())
    }

    /// Recompute the bounding box from every positioned point.
    pub fn recompute_aabb(&mut self) {
        self.aabb = Aabb::from_points(
            self.vertices()
                .iter()
                .map(Vertex::position)
                .filter(|p| p.is_finite()),
        );
    }

    pub fn kdtree_index(&self) -> &KdTreeIndex {
        &self.kdtree_index
    }

    /// Points exist and no index has been built or loaded yet.
    pub fn can_build_index(&self) -> bool {
        self.num_points > 0 && !self.kdtree_index.is_initialized()
    }

    pub fn has_index(&self) -> bool {
        self.num_points > 0 && self.kdtree_index.is_initialized()
    }

    /// Build the kd-tree over the current positions inside `self.aabb`.
    /// Panics if an index already exists; check [`PointCloud::can_build_index`].
    pub fn build_index(&mut self, progress: &mut dyn ProgressSink) -> Completion {
        let vertices: &[Vertex] = bytemuck::cast_slice(self.coordinate_color.as_bytes());
        self.kdtree_index.build(self.aabb, vertices, progress)
    }

    /// Drop the index, e.g. after moving points.
    pub fn clear_index(&mut self) {
        self.kdtree_index.clear();
    }

    /// Closest point to `query` within `max_distance`. Uses the index when
    /// present and scans every point otherwise.
    pub fn nearest_point(&self, query: Vec3, max_distance: f32) -> PointIndex {
        if self.has_index() {
            self.kdtree_index
                .nearest_point(self.vertices(), query, max_distance)
        } else {
            kdtree::nearest_point_exhaustive(self.vertices(), query, max_distance)
        }
    }

    /// Point closest to the ray `origin + t * direction` (`t >= 0`) within
    /// `max_distance` of it. Used for picking.
    pub fn nearest_to_ray(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> PointIndex {
        if self.has_index() {
            self.kdtree_index
                .nearest_to_ray(self.vertices(), origin, direction, max_distance)
        } else {
            kdtree::nearest_to_ray_exhaustive(self.vertices(), origin, direction, max_distance)
        }
    }

    /// Indices of all points inside `region`, ascending.
    pub fn points_in_aabb(&self, region: &Aabb) -> Vec<usize> {
        if self.has_index() {
            self.kdtree_index.points_in_aabb(self.vertices(), region)
        } else {
            self.vertices()
                .iter()
                .enumerate()
                .filter(|(_, v)| region.contains(v.position(), 0.0))
                .map(|(i, _)| i)
                .collect()
        }
    }

    /// Pre-size the index for streaming a persisted permutation into it.
    pub(crate) fn index_loading_buffer(&mut self) -> &mut [u8] {
        self.kdtree_index
            .alloc_for_loading(self.num_points, self.aabb)
    }

    pub(crate) fn finish_index_loading(&mut self) {
        let vertices: &[Vertex] = bytemuck::cast_slice(self.coordinate_color.as_bytes());
        self.kdtree_index.finish_loading(vertices);
    }
}
