mod common;

use common::{five_points, random_cloud};
use point_cloud_store::{
    ExportOptions, FieldValue, IndexState, NoProgress, PointCloud, export_pcvd, import_pcvd, read_pcvd_file,
    write_pcvd_file,
};

fn reimport(cloud: &PointCloud, options: &ExportOptions) -> PointCloud {
    let mut bytes = Vec::new();
    let _ = export_pcvd(&mut bytes, cloud, options, &mut NoProgress).unwrap();
    import_pcvd(&bytes[..], &mut NoProgress).unwrap().finished().unwrap()
}

fn assert_same_points(a: &PointCloud, b: &PointCloud) {
    assert_eq!(a.num_points(), b.num_points());
    assert_eq!(a.schema(), b.schema());
    assert_eq!(a.aabb, b.aabb);
    assert_eq!(a.vertices(), b.vertices());
    for i in 0..a.num_points() {
        assert_eq!(a.fields_of_point(i).unwrap(), b.fields_of_point(i).unwrap());
    }
}

#[test]
fn file_round_trip_preserves_everything() {
    let mut cloud = random_cloud(2_000, 1);
    let _ = cloud.build_index(&mut NoProgress);
    cloud.shader.coordinate_expression = "vec3(x, z, -y)".into();
    cloud.shader.color_expression = "vec3(f32)".into();
    cloud.shader.node_data = "{\"nodes\": []}".into();
    cloud.shader.used_properties.extend(["f32".to_string(), "i16".to_string()]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cloud.pcvd");
    let _ = write_pcvd_file(&path, &cloud, &ExportOptions::default(), &mut NoProgress).unwrap();

    let loaded = read_pcvd_file(&path, &mut NoProgress).unwrap().finished().unwrap();
    assert_same_points(&cloud, &loaded);
    assert_eq!(loaded.user_data_bytes(), cloud.user_data_bytes());
    assert_eq!(loaded.shader, cloud.shader);

    assert_eq!(loaded.kdtree_index().state(), IndexState::Loaded);
    assert_eq!(loaded.kdtree_index().point_indices(), cloud.kdtree_index().point_indices());
    assert_eq!(loaded.kdtree_index().nodes(), cloud.kdtree_index().nodes());
}

#[test]
fn optional_sections_can_be_skipped() {
    let mut cloud = random_cloud(100, 2);
    let _ = cloud.build_index(&mut NoProgress);
    cloud.shader.color_expression = "vec3(1.0)".into();

    let options = ExportOptions {
        write_vertices: true,
        write_index: false,
        write_shader: false,
    };
    let loaded = reimport(&cloud, &options);
    assert_same_points(&cloud, &loaded);
    assert!(!loaded.has_index());
    assert!(loaded.can_build_index());
    assert!(loaded.shader.is_empty());
}

#[test]
fn integer_fields_are_exact() {
    let cloud = five_points();
    let loaded = reimport(&cloud, &ExportOptions::default());
    for i in 0..5 {
        assert_eq!(loaded.fields_of_point(i).unwrap().values, vec![FieldValue::Unsigned(i as u64)]);
    }
}

#[test]
fn imported_schema_is_self_consistent() {
    let loaded = reimport(&random_cloud(10, 3), &ExportOptions::default());
    let schema = loaded.schema();
    assert!(schema.verify().is_ok());
    let widths: usize = schema.fields().iter().map(|f| f.scalar_type.size_of()).sum();
    assert_eq!(widths, schema.stride());
    assert_eq!(schema.total_name_length(), schema.names().map(str::len).sum::<usize>());
    assert_eq!(loaded.user_data_bytes().len(), loaded.num_points() * schema.stride());
}

#[test]
fn progress_covers_every_byte() {
    let mut cloud = random_cloud(300, 4);
    let _ = cloud.build_index(&mut NoProgress);
    let mut bytes = Vec::new();
    let _ = export_pcvd(&mut bytes, &cloud, &ExportOptions::default(), &mut NoProgress).unwrap();

    let mut last = (0, 0);
    let mut sink = |done: u64, total: u64| {
        assert!(done >= last.0 && done <= total);
        last = (done, total);
        true
    };
    let _ = import_pcvd(&bytes[..], &mut sink).unwrap();
    assert_eq!(last, (bytes.len() as u64, bytes.len() as u64));
}
