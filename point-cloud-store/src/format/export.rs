use super::header::{FieldDescription, Header, ShaderDescription};
use super::{CHUNK_SIZE, ExportOptions, Result};
use crate::error::FormatError;
use crate::point_cloud::PointCloud;
use crate::progress::{ChunkTracker, Completion, ProgressSink};
use constants::format::{FLAG_KDTREE, FLAG_SHADER, FLAG_VERTEX, HEADER_SIZE};
use std::io::Write;

/// Export a point cloud as PCVD.
///
/// Writes file version 1. The compatibility version is 1 when a shader block
/// is written and 0 otherwise, so older readers still open shader-less files.
/// Progress is reported in bytes; returning `false` from the sink stops
/// after the current chunk, leaving a partial stream behind (see
/// [`super::write_pcvd_file`] for a file writer that cleans up).
pub fn export_pcvd<W: Write>(
    mut writer: W,
    cloud: &PointCloud,
    options: &ExportOptions,
    progress: &mut dyn ProgressSink,
) -> Result<Completion> {
    let schema = cloud.schema();
    check_exportable(cloud)?;

    let write_vertices = options.write_vertices;
    let write_index = options.write_index && cloud.has_index();
    let write_shader = options.write_shader && !cloud.shader.is_empty();

    let shader_texts = [
        cloud.shader.used_properties_text(),
        cloud.shader.coordinate_expression.clone(),
        cloud.shader.color_expression.clone(),
        cloud.shader.node_data.clone(),
    ];
    let shader_description = if write_shader {
        let length = |text: &String| {
            u32::try_from(text.len()).map_err(|_| FormatError::Unexportable("shader text too long".into()))
        };
        ShaderDescription {
            used_properties_length: length(&shader_texts[0])?,
            coordinate_expression_length: length(&shader_texts[1])?,
            color_expression_length: length(&shader_texts[2])?,
            node_data_length: length(&shader_texts[3])?,
        }
    } else {
        ShaderDescription::default()
    };

    let mut flags = 0;
    if write_vertices {
        flags |= FLAG_VERTEX;
    }
    if write_index {
        flags |= FLAG_KDTREE;
    }
    if write_shader {
        flags |= FLAG_SHADER;
    }

    let mut header = Header::for_writing(flags, write_shader);
    header.number_points = cloud.num_points() as u64;
    header.number_fields = schema.len() as u16;
    header.point_data_stride = schema.stride() as u16;
    header.field_names_total_size = schema.total_name_length() as u32;
    header.shader_data_size = u32::try_from(shader_description.total())
        .map_err(|_| FormatError::Unexportable("shader texts too long".into()))?;
    header.aabb = cloud.aabb;

    let sizes = header.section_sizes()?;
    let mut tracker = ChunkTracker::new(sizes.total(), progress);
    log::debug!("Exporting {} points, {} bytes", cloud.num_points(), sizes.total());

    writer.write_all(&header.encode())?;
    if !tracker.advance(HEADER_SIZE as u64) {
        return Ok(Completion::Cancelled);
    }

    for field in schema.fields() {
        let description = FieldDescription {
            name_length: field.name.len() as u16,
            scalar_type: field.scalar_type.code(),
            reserved: 0,
        };
        writer.write_all(&description.encode())?;
    }
    if !tracker.advance(sizes.field_descriptions) {
        return Ok(Completion::Cancelled);
    }

    for name in schema.names() {
        writer.write_all(name.as_bytes())?;
    }
    if !tracker.advance(sizes.field_names) {
        return Ok(Completion::Cancelled);
    }

    if write_vertices && !write_chunked(&mut writer, cloud.vertex_bytes(), &mut tracker)? {
        return Ok(Completion::Cancelled);
    }
    if !write_chunked(&mut writer, cloud.user_data_bytes(), &mut tracker)? {
        return Ok(Completion::Cancelled);
    }
    if write_index {
        let entries: &[u8] = bytemuck::cast_slice(cloud.kdtree_index().point_indices());
        if !write_chunked(&mut writer, entries, &mut tracker)? {
            return Ok(Completion::Cancelled);
        }
    }

    if write_shader {
        writer.write_all(&shader_description.encode())?;
        for text in &shader_texts {
            writer.write_all(text.as_bytes())?;
        }
        if !tracker.advance(sizes.shader_description + sizes.shader_text) {
            return Ok(Completion::Cancelled);
        }
    }

    writer.flush()?;
    debug_assert_eq!(tracker.done(), sizes.total());
    Ok(Completion::Finished(()))
}

/// Reject clouds the header cannot describe.
fn check_exportable(cloud: &PointCloud) -> Result<()> {
    let schema = cloud.schema();
    let unexportable = |reason: String| Err(FormatError::Unexportable(reason));

    if cloud.num_points() == 0 {
        return unexportable("point cloud is empty".into());
    }
    if schema.is_empty() {
        return unexportable("point cloud has no user data fields".into());
    }
    if let Err(err) = schema.verify() {
        return unexportable(err.to_string());
    }
    if schema.len() > usize::from(u16::MAX) {
        return unexportable(format!("{} fields, at most {} fit", schema.len(), u16::MAX));
    }
    if schema.stride() > usize::from(u16::MAX) {
        return unexportable(format!("stride {} exceeds {}", schema.stride(), u16::MAX));
    }
    if let Some(field) = schema.fields().iter().find(|f| f.name.len() > usize::from(u16::MAX)) {
        let prefix: String = field.name.chars().take(16).collect();
        return unexportable(format!("field name '{}...' is too long", prefix));
    }
    if u32::try_from(schema.total_name_length()).is_err() {
        return unexportable("field names too long".into());
    }
    if !cloud.aabb.min_point.is_finite() || !cloud.aabb.max_point.is_finite() {
        return unexportable(format!("bounding box {} is not finite", cloud.aabb));
    }
    if cloud.aabb.min_point.cmpgt(cloud.aabb.max_point).any() {
        return unexportable(format!("bounding box {} is inverted", cloud.aabb));
    }
    Ok(())
}

fn write_chunked<W: Write>(writer: &mut W, bytes: &[u8], tracker: &mut ChunkTracker<'_>) -> Result<bool> {
    for chunk in bytes.chunks(CHUNK_SIZE) {
        writer.write_all(chunk)?;
        if !tracker.advance(chunk.len() as u64) {
            return Ok(false);
        }
    }
    Ok(true)
}
