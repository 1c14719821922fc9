/// LAS/LAZ import into a point cloud.
use crate::buffer::ByteBuffer;
use crate::error::PointCloudError;
use crate::point_cloud::{FieldDescriptor, PointCloud, UserDataSchema, Vertex};
use crate::progress::{Completion, ProgressSink};
use crate::scalar::{Scalar, ScalarType};
use constants::coordinate_system::{Z_UP_TO_Y_UP, apply_frame};
use constants::format::VERTEX_SIZE;
use glam::Vec3;
use las::Reader;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Points between progress reports.
pub const PROGRESS_INTERVAL: usize = 50_000;

/// Points reserved up front; beyond this the streams grow as points arrive,
/// so a header overstating its count cannot force a huge allocation.
pub const PREALLOCATION_LIMIT: usize = 1 << 20;

/// Extra bytes holding a little-endian `f32` object number.
const OBJECT_NUMBER_BYTES: usize = 4;

pub const LAS_FIELDS: [(&str, ScalarType); 8] = [
    ("x", ScalarType::Float64),
    ("y", ScalarType::Float64),
    ("z", ScalarType::Float64),
    ("intensity", ScalarType::UInt16),
    ("return_number", ScalarType::UInt8),
    ("classification", ScalarType::UInt8),
    ("label", ScalarType::UInt8),
    ("point_source_id", ScalarType::UInt16),
];

/// How survey coordinates become render positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LasImportOptions {
    /// Rotate Z-up survey data into the Y-up render frame.
    pub apply_coordinate_transform: bool,
    /// Shift positions so the bounding box minimum is the origin. Keeps
    /// large survey coordinates within `f32` precision.
    pub recenter: bool,
}

impl Default for LasImportOptions {
    fn default() -> Self {
        Self {
            apply_coordinate_transform: true,
            recenter: true,
        }
    }
}

/// Result of a LAS import.
#[derive(Debug)]
pub struct LasCloud {
    pub cloud: PointCloud,
    /// Subtracted from every (transformed) position; zero without recentering.
    pub origin: [f64; 3],
    /// At least one point carried RGB.
    pub has_colour: bool,
}

/// Create LAS file reader for point cloud access.
/// Handles both .las and .laz compressed formats.
pub fn create_reader(path: &Path) -> Result<Reader, PointCloudError> {
    let file = File::open(path)?;
    Ok(Reader::new(BufReader::new(file))?)
}

/// User data layout of an imported file. `object_number` is appended when
/// the point format carries enough extra bytes.
pub fn las_schema(extra_bytes: u16) -> UserDataSchema {
    let mut fields: Vec<(&str, ScalarType)> = LAS_FIELDS.to_vec();
    fields.push(("gps_time", ScalarType::Float64));
    if usize::from(extra_bytes) >= OBJECT_NUMBER_BYTES {
        fields.push(("object_number", ScalarType::Float32));
    }
    UserDataSchema::from_fields(fields)
}

/// Read every point of a LAS/LAZ file.
///
/// Survey coordinates are kept at full precision in the `x`, `y`, `z` user
/// data fields; the vertex stream gets the transformed, recentered `f32`
/// position and 8 bit colour (white when the file has none). `label` starts
/// at 0 and `gps_time` is NaN for formats without it.
pub fn import_las(
    path: &Path,
    options: &LasImportOptions,
    progress: &mut dyn ProgressSink,
) -> Result<Completion<LasCloud>, PointCloudError> {
    let mut reader = create_reader(path)?;
    let header = reader.header().clone();

    let declared = header.number_of_points();
    if declared == 0 {
        return Err(PointCloudError::NoPoints);
    }
    let num_points = usize::try_from(declared).map_err(|_| PointCloudError::PointCountMismatch {
        declared,
        found: usize::MAX as u64,
    })?;

    let frame = |p: [f64; 3]| {
        if options.apply_coordinate_transform {
            apply_frame(&Z_UP_TO_Y_UP, p)
        } else {
            p
        }
    };
    let origin = if options.recenter {
        let bounds = header.bounds();
        transformed_min(
            [bounds.min.x, bounds.min.y, bounds.min.z],
            [bounds.max.x, bounds.max.y, bounds.max.z],
            &frame,
        )
    } else {
        [0.0; 3]
    };

    let extra_bytes = header.point_format().extra_bytes;
    let schema = las_schema(extra_bytes);
    let gps_time_field = LAS_FIELDS.len();
    let object_number_field = schema.field_index("object_number");

    log::info!(
        "Importing {} points from {} (format {}, {} extra bytes)",
        num_points,
        path.display(),
        header.point_format().to_u8().unwrap_or(u8::MAX),
        extra_bytes
    );

    let fields = schema.fields();
    let stride = schema.stride();
    let reserved = num_points.min(PREALLOCATION_LIMIT);
    let mut vertices = ByteBuffer::new();
    vertices.reserve(reserved * VERTEX_SIZE);
    let mut user_data = ByteBuffer::new();
    user_data.reserve(reserved * stride);

    let mut has_colour = false;
    let mut found = 0usize;

    for point in reader.points() {
        let point = point?;
        if found == num_points {
            return Err(PointCloudError::PointCountMismatch {
                declared,
                found: found as u64 + 1,
            });
        }
        let position = frame([point.x, point.y, point.z]);
        let position = Vec3::new(
            (position[0] - origin[0]) as f32,
            (position[1] - origin[1]) as f32,
            (position[2] - origin[2]) as f32,
        );
        let colour = match point.color {
            Some(c) => {
                has_colour = true;
                [(c.red >> 8) as u8, (c.green >> 8) as u8, (c.blue >> 8) as u8]
            }
            None => [255; 3],
        };
        vertices
            .grow(VERTEX_SIZE)
            .copy_from_slice(bytemuck::bytes_of(&Vertex::new(position, colour)));

        let record = user_data.grow(stride);
        put(record, &fields[0], point.x);
        put(record, &fields[1], point.y);
        put(record, &fields[2], point.z);
        put(record, &fields[3], point.intensity);
        put(record, &fields[4], point.return_number);
        put(record, &fields[5], u8::from(point.classification));
        put(record, &fields[6], 0u8);
        put(record, &fields[7], point.point_source_id);
        put(record, &fields[gps_time_field], point.gps_time.unwrap_or(f64::NAN));
        if let Some(field) = object_number_field {
            let object_number = point
                .extra_bytes
                .get(..OBJECT_NUMBER_BYTES)
                .map_or(0.0, |b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]));
            put(record, &fields[field], object_number);
        }

        found += 1;
        if found % PROGRESS_INTERVAL == 0 && !progress.report(found as u64, declared) {
            log::info!("LAS import cancelled after {} points", found);
            return Ok(Completion::Cancelled);
        }
    }

    if found != num_points {
        return Err(PointCloudError::PointCountMismatch {
            declared,
            found: found as u64,
        });
    }
    if !progress.report(declared, declared) {
        return Ok(Completion::Cancelled);
    }

    let mut cloud = PointCloud::from_streams(schema, num_points, vertices, user_data);
    cloud.recompute_aabb();
    log::info!("Imported {} points, bounds {}", num_points, cloud.aabb);

    Ok(Completion::Finished(LasCloud {
        cloud,
        origin,
        has_colour,
    }))
}

fn put<T: Scalar>(record: &mut [u8], field: &FieldDescriptor, value: T) {
    field.scalar_type.write_from(&mut record[field.offset..], value);
}

/// Component-wise minimum of the eight transformed box corners.
fn transformed_min(min: [f64; 3], max: [f64; 3], frame: &impl Fn([f64; 3]) -> [f64; 3]) -> [f64; 3] {
    let corners = [min, max];
    (0..8)
        .map(|i| frame([corners[(i >> 2) & 1][0], corners[(i >> 1) & 1][1], corners[i & 1][2]]))
        .fold([f64::INFINITY; 3], |acc, p| {
            [acc[0].min(p[0]), acc[1].min(p[1]), acc[2].min(p[2])]
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point_cloud::LABEL_FIELD_INDEX;
    use crate::progress::NoProgress;
    use las::{Builder, Color, Point, Writer, point::Format};

    fn write_las(path: &Path, points: &[(f64, f64, f64)]) {
        let mut builder = Builder::from((1, 2));
        builder.point_format = Format::new(3).unwrap();
        let header = builder.into_header().unwrap();
        let mut writer = Writer::from_path(path, header).unwrap();
        for (i, &(x, y, z)) in points.iter().enumerate() {
            let point = Point {
                x,
                y,
                z,
                intensity: 100 + i as u16,
                return_number: 1,
                gps_time: Some(i as f64),
                color: Some(Color::new(0xff00, 0x8000, 0)),
                ..Default::default()
            };
            writer.write_point(point).unwrap();
        }
        writer.close().unwrap();
    }

    #[test]
    fn schema_has_label_as_seventh_field() {
        let schema = las_schema(0);
        assert_eq!(schema.fields()[LABEL_FIELD_INDEX].name, "label");
        assert_eq!(schema.field_index("gps_time"), Some(8));
        assert_eq!(schema.field_index("object_number"), None);
        assert_eq!(las_schema(4).field_index("object_number"), Some(9));
    }

    #[test]
    fn transformed_min_of_rotated_box() {
        let frame = |p: [f64; 3]| apply_frame(&Z_UP_TO_Y_UP, p);
        let min = transformed_min([0.0, 10.0, 100.0], [1.0, 20.0, 200.0], &frame);
        assert_eq!(min, [0.0, 100.0, -20.0]);
    }

    #[test]
    fn imports_points_and_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud.las");
        write_las(&path, &[(10.0, 20.0, 1.0), (12.0, 21.0, 3.0), (11.0, 25.0, 2.0)]);

        let import = import_las(&path, &LasImportOptions::default(), &mut NoProgress)
            .unwrap()
            .finished()
            .unwrap();
        let cloud = &import.cloud;
        assert_eq!(cloud.num_points(), 3);
        assert!(import.has_colour);
        let expected_origin = [10.0, 1.0, -25.0];
        for (axis, expected) in expected_origin.iter().enumerate() {
            assert!((import.origin[axis] - expected).abs() < 1e-9);
        }

        // Z-up (12, 21, 3) -> Y-up (12, 3, -21), minus origin.
        let position = cloud.vertex_at(1).position();
        assert!((position - Vec3::new(2.0, 2.0, 4.0)).length() < 1e-3);
        assert_eq!(cloud.vertex_at(1).color, [0xff, 0x80, 0]);

        assert!((cloud.read_field::<f64>(1, 0) - 12.0).abs() < 1e-9);
        assert_eq!(cloud.read_field::<u16>(2, 3), 102);
        assert_eq!(cloud.read_field::<u8>(0, LABEL_FIELD_INDEX), 0);
        assert_eq!(cloud.read_field::<f64>(2, 8), 2.0);
        assert!(cloud.aabb.min_point.abs_diff_eq(Vec3::ZERO, 1e-3));
    }

    #[test]
    fn keeps_survey_frame_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud.las");
        write_las(&path, &[(1.0, 2.0, 3.0), (4.0, 5.0, 6.0)]);

        let options = LasImportOptions {
            apply_coordinate_transform: false,
            recenter: false,
        };
        let import = import_las(&path, &options, &mut NoProgress).unwrap().finished().unwrap();
        assert_eq!(import.origin, [0.0; 3]);
        assert!((import.cloud.vertex_at(1).position() - Vec3::new(4.0, 5.0, 6.0)).length() < 1e-3);
    }

    #[test]
    fn final_report_can_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud.las");
        write_las(&path, &[(1.0, 2.0, 3.0)]);

        let mut sink = |_done: u64, _total: u64| false;
        assert!(import_las(&path, &LasImportOptions::default(), &mut sink).unwrap().is_cancelled());
    }

    #[test]
    fn overstated_point_count_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud.las");
        write_las(&path, &[(1.0, 2.0, 3.0), (4.0, 5.0, 6.0), (7.0, 8.0, 9.0)]);

        // Legacy point count of a 1.2 header.
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[107..111].copy_from_slice(&u32::MAX.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        assert!(import_las(&path, &LasImportOptions::default(), &mut NoProgress).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = import_las(&dir.path().join("absent.laz"), &LasImportOptions::default(), &mut NoProgress);
        assert!(matches!(result, Err(PointCloudError::Io(_))));
    }
}
