/// Conversion manifest written next to each converted file.
use anyhow::Result;
use constants::class::class_name;
use point_cloud_store::{Aabb, PointCloud};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClassEntry {
    pub class_name: String,
    pub point_count: u64,
}

/// Points per ASPRS classification code.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ClassificationInfo {
    pub class_types: BTreeMap<u8, ClassEntry>,
}

impl ClassificationInfo {
    pub fn insert_or_update(&mut self, class_id: u8) {
        self.class_types
            .entry(class_id)
            .or_insert_with(|| ClassEntry {
                class_name: class_name(class_id).to_string(),
                point_count: 0,
            })
            .point_count += 1;
    }

    /// Histogram of the `classification` field, empty if the cloud has none.
    pub fn from_cloud(cloud: &PointCloud) -> Self {
        let mut classes = Self::default();
        if let Some(field) = cloud.schema().field_index("classification") {
            for i in 0..cloud.num_points() {
                classes.insert_or_update(cloud.read_field::<u8>(i, field));
            }
        }
        classes
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FieldEntry {
    pub name: String,
    pub scalar_type: String,
    pub offset: usize,
}

/// Description of one converted point cloud.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CloudManifest {
    pub source: PathBuf,
    pub output: PathBuf,
    pub point_count: usize,
    /// Bounds of the render positions.
    pub bounds: Aabb,
    /// Offset subtracted from survey coordinates while recentering.
    pub origin: [f64; 3],
    pub has_colour: bool,
    pub stride: usize,
    pub fields: Vec<FieldEntry>,
    pub classes: ClassificationInfo,
    pub has_index: bool,
    pub has_shader: bool,
}

impl CloudManifest {
    pub fn describe(source: &Path, output: &Path, cloud: &PointCloud, origin: [f64; 3], has_colour: bool) -> Self {
        Self {
            source: source.to_path_buf(),
            output: output.to_path_buf(),
            point_count: cloud.num_points(),
            bounds: cloud.aabb,
            origin,
            has_colour,
            stride: cloud.schema().stride(),
            fields: cloud
                .schema()
                .fields()
                .iter()
                .map(|f| FieldEntry {
                    name: f.name.clone(),
                    scalar_type: f.scalar_type.name().to_string(),
                    offset: f.offset,
                })
                .collect(),
            classes: ClassificationInfo::from_cloud(cloud),
            has_index: cloud.has_index(),
            has_shader: !cloud.shader.is_empty(),
        }
    }

    /// Write as pretty JSON to `path` and print a summary.
    pub fn write(&self, path: &Path) -> Result<()> {
        let manifest_json = serde_json::to_string_pretty(self)?;
        fs::write(path, manifest_json)?;

        println!("Generated manifest: {}", path.display());
        self.print_summary();
        Ok(())
    }

    fn print_summary(&self) {
        println!("Manifest Summary:");
        println!("  Points: {}", self.point_count);
        println!(
            "  Bounds: ({:.2}, {:.2}, {:.2}) to ({:.2}, {:.2}, {:.2})",
            self.bounds.min_point.x,
            self.bounds.min_point.y,
            self.bounds.min_point.z,
            self.bounds.max_point.x,
            self.bounds.max_point.y,
            self.bounds.max_point.z
        );
        for (id, class) in &self.classes.class_types {
            println!("  Class {:>3} {:<26} {}", id, class.class_name, class.point_count);
        }
    }
}

/// `<output>.manifest.json`
pub fn manifest_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".manifest.json");
    PathBuf::from(name)
}
