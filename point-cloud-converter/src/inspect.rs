/// Commands operating on existing PCVD files.
use crate::progress::BarProgress;
use anyhow::{Context, Result, bail};
use glam::Vec3;
use point_cloud_store::format::Header;
use point_cloud_store::{
    Completion, ExportOptions, NoProgress, PointCloud, PointIndex, Shader, read_pcvd_file, write_pcvd_file,
};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub fn load(path: &Path) -> Result<PointCloud> {
    let mut progress = BarProgress::new("bytes", "Reading");
    match read_pcvd_file(path, &mut progress).with_context(|| format!("reading {}", path.display()))? {
        Completion::Finished(cloud) => {
            progress.finish("Loaded");
            Ok(cloud)
        }
        Completion::Cancelled => bail!("reading {} cancelled", path.display()),
    }
}

fn save(path: &Path, cloud: &PointCloud) -> Result<()> {
    let mut progress = BarProgress::new("bytes", "Writing");
    let written = write_pcvd_file(path, cloud, &ExportOptions::default(), &mut progress)
        .with_context(|| format!("writing {}", path.display()))?;
    if written.is_cancelled() {
        bail!("writing {} cancelled", path.display());
    }
    progress.finish("Written");
    Ok(())
}

/// Print the header and schema without loading the points.
pub fn info(path: &Path) -> Result<()> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let header = Header::read(&mut BufReader::new(file)).with_context(|| format!("reading {}", path.display()))?;
    let sizes = header.section_sizes()?;

    println!("{}", path.display());
    println!(
        "  version {} (readable from version {})",
        header.file_version, header.compatibility_version
    );
    println!("  points: {}", header.number_points);
    println!("  bounds: {}", header.aabb);
    println!(
        "  sections: vertices {}, kd-tree {}, shader {}",
        header.has_vertices(),
        header.has_kdtree(),
        header.has_shader()
    );
    println!("  size: {} bytes", sizes.total());

    let cloud = load(path)?;
    println!("  fields ({} bytes per point):", cloud.schema().stride());
    for field in cloud.schema().fields() {
        println!("    {:>4}  {:<24} {}", field.offset, field.name, field.scalar_type);
    }
    if !cloud.shader.is_empty() {
        println!("  shader properties: {}", cloud.shader.ordered_properties().join(", "));
    }
    Ok(())
}

/// Print position, colour and user data of one point.
pub fn point(path: &Path, index: usize) -> Result<()> {
    let cloud = load(path)?;
    let user_data = cloud.fields_of_point(index)?;
    let vertex = cloud.vertex_at(index);

    println!("point {}: position {} colour {:?}", index, vertex.position(), vertex.color);
    print!("{}", user_data);
    Ok(())
}

/// Nearest point to a location, or to a picking ray when `direction` is
/// given. Builds a temporary index if the file has none.
pub fn nearest(path: &Path, location: Vec3, direction: Option<Vec3>, max_distance: f32) -> Result<()> {
    let mut cloud = load(path)?;
    if cloud.can_build_index() {
        log::info!("{} has no index, building one in memory", path.display());
        let _ = cloud.build_index(&mut NoProgress);
    }

    let found = match direction {
        Some(direction) => cloud.nearest_to_ray(location, direction, max_distance),
        None => cloud.nearest_point(location, max_distance),
    };
    report_hit(&cloud, found)
}

fn report_hit(cloud: &PointCloud, found: PointIndex) -> Result<()> {
    let Some(index) = found.get() else {
        println!("no point within range");
        return Ok(());
    };
    println!("point {} at {}", index, cloud.vertex_at(index).position());
    print!("{}", cloud.fields_of_point(index)?);
    Ok(())
}

/// Build a kd-tree and write the file back (or to `output`).
pub fn index(path: &Path, output: Option<&Path>, rebuild: bool) -> Result<()> {
    let mut cloud = load(path)?;
    if cloud.has_index() {
        if !rebuild {
            println!("{} already has an index", path.display());
            return Ok(());
        }
        cloud.clear_index();
    }

    let mut progress = BarProgress::new("points", "Building kd-tree");
    if cloud.build_index(&mut progress).is_cancelled() {
        bail!("index construction cancelled");
    }
    progress.finish("Index built");

    let index = cloud.kdtree_index();
    println!(
        "Index: {} nodes, {} leaves, depth {}",
        index.nodes().len(),
        index.leaves().count(),
        index.depth()
    );
    save(output.unwrap_or(path), &cloud)
}

/// Embed a shader preset into the file, or export the embedded one.
pub fn shader(path: &Path, import: Option<&Path>, export: Option<&Path>) -> Result<()> {
    match (import, export) {
        (Some(preset), None) => {
            let mut cloud = load(path)?;
            cloud.shader = Shader::import_from_file(preset)
                .with_context(|| format!("loading shader preset {}", preset.display()))?;
            save(path, &cloud)?;
            println!("Embedded {} into {}", preset.display(), path.display());
        }
        (None, Some(preset)) => {
            let cloud = load(path)?;
            if cloud.shader.is_empty() {
                bail!("{} carries no shader", path.display());
            }
            cloud
                .shader
                .export_to_file(preset)
                .with_context(|| format!("writing shader preset {}", preset.display()))?;
            println!("Exported shader to {}", preset.display());
        }
        _ => bail!("pass exactly one of --import or --export"),
    }
    Ok(())
}
