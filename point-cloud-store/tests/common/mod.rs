#![allow(dead_code)]

use glam::Vec3;
use point_cloud_store::{PointCloud, ScalarType, UserDataSchema, Vertex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// One field of every scalar type.
pub fn full_schema() -> UserDataSchema {
    UserDataSchema::from_fields([
        ("i8", ScalarType::Int8),
        ("i16", ScalarType::Int16),
        ("i32", ScalarType::Int32),
        ("u8", ScalarType::UInt8),
        ("u16", ScalarType::UInt16),
        ("u32", ScalarType::UInt32),
        ("f32", ScalarType::Float32),
        ("f64", ScalarType::Float64),
    ])
}

/// Random cloud with every field written and bounds recomputed.
pub fn random_cloud(points: usize, seed: u64) -> PointCloud {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut cloud = PointCloud::with_schema(full_schema(), points);

    for i in 0..points {
        let position = Vec3::new(
            rng.gen_range(-100.0..100.0),
            rng.gen_range(-5.0..5.0),
            rng.gen_range(0.0..300.0),
        );
        let colour = [rng.gen_range(0..=255), rng.gen_range(0..=255), rng.gen_range(0..=255)];
        cloud.set_vertex(i, Vertex::new(position, colour));

        cloud.write_field(i, 0, rng.gen_range(-128i64..128));
        cloud.write_field(i, 1, rng.gen_range(-30_000i64..30_000));
        cloud.write_field(i, 2, rng.gen_range(-1_000_000i64..1_000_000));
        cloud.write_field(i, 3, rng.gen_range(0u64..256));
        cloud.write_field(i, 4, rng.gen_range(0u64..65_536));
        cloud.write_field(i, 5, rng.gen_range(0u64..4_000_000_000));
        cloud.write_field(i, 6, rng.gen_range(-1.0f64..1.0));
        cloud.write_field(i, 7, rng.gen_range(-1.0e9f64..1.0e9));
    }
    cloud.recompute_aabb();
    cloud
}

/// Five points at known places.
pub fn five_points() -> PointCloud {
    let positions = [
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.0, 2.0, 0.0),
        Vec3::new(0.0, 0.0, 3.0),
        Vec3::new(-4.0, -4.0, -4.0),
    ];
    let schema = UserDataSchema::from_fields([("id", ScalarType::UInt32)]);
    let mut cloud = PointCloud::with_schema(schema, positions.len());
    for (i, position) in positions.into_iter().enumerate() {
        cloud.set_vertex(i, Vertex::new(position, [255; 3]));
        cloud.write_field(i, 0, i as u32);
    }
    cloud.recompute_aabb();
    cloud
}
