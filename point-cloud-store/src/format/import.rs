use super::header::{FieldDescription, Header, ShaderDescription};
use super::{CHUNK_SIZE, Result, Section};
use crate::buffer::ByteBuffer;
use crate::error::FormatError;
use crate::point_cloud::{PointCloud, UserDataSchema, Vertex};
use crate::progress::{ChunkTracker, Completion, ProgressSink};
use crate::scalar::ScalarType;
use crate::shader::Shader;
use constants::format::{FIELD_DESCRIPTION_SIZE, HEADER_SIZE, SHADER_DESCRIPTION_SIZE, VERTEX_SIZE};
use std::io::Read;

/// Import a PCVD stream.
///
/// Progress is reported in bytes against the size of every section the
/// header declares. Returning `false` from the sink stops the import and
/// drops the partially read cloud. Any error also drops it: a cloud is only
/// returned once every section has been read and validated.
pub fn import_pcvd<R: Read>(mut reader: R, progress: &mut dyn ProgressSink) -> Result<Completion<PointCloud>> {
    let header = Header::read(&mut reader)?;
    import_after_header(&mut reader, header, progress)
}

pub(crate) fn import_after_header<R: Read>(
    reader: &mut R,
    header: Header,
    progress: &mut dyn ProgressSink,
) -> Result<Completion<PointCloud>> {
    let sizes = header.section_sizes()?;
    let mut tracker = ChunkTracker::new(sizes.total(), progress);
    if !tracker.advance(HEADER_SIZE as u64) {
        return Ok(Completion::Cancelled);
    }

    let num_points = usize::try_from(header.number_points)
        .map_err(|_| FormatError::CorruptHeader("point count does not fit in memory"))?;

    // Schema
    let descriptions = read_field_descriptions(reader, &header)?;
    if !tracker.advance(sizes.field_descriptions) {
        return Ok(Completion::Cancelled);
    }
    let names = read_field_names(reader, &header, &descriptions)?;
    if !tracker.advance(sizes.field_names) {
        return Ok(Completion::Cancelled);
    }

    let schema = UserDataSchema::from_fields(
        names
            .into_iter()
            .zip(&descriptions)
            .filter_map(|(name, description)| Some((name, ScalarType::from_code(description.scalar_type)?))),
    );
    debug_assert_eq!(schema.len(), descriptions.len());

    // Point data. Buffers grow as bytes arrive, so a header lying about the
    // point count fails with Truncated instead of a huge allocation.
    let vertices = if header.has_vertices() {
        match read_growing(reader, sizes.vertices, Section::Vertices, &mut tracker)? {
            Some(vertices) => Some(vertices),
            None => return Ok(Completion::Cancelled),
        }
    } else {
        None
    };
    let Some(user_data) = read_growing(reader, sizes.user_data, Section::UserData, &mut tracker)? else {
        return Ok(Completion::Cancelled);
    };

    // The user data section is complete, so `num_points` is backed by data.
    let has_vertices = vertices.is_some();
    let vertices = vertices.unwrap_or_else(|| {
        let mut placeholders = ByteBuffer::new();
        placeholders.resize(num_points * VERTEX_SIZE);
        placeholders
    });
    let mut cloud = PointCloud::from_streams(schema, num_points, vertices, user_data);
    cloud.aabb = header.aabb;
    if !has_vertices {
        cloud.vertices_mut().fill(Vertex::placeholder());
    }

    if header.has_kdtree() {
        let buffer = cloud.index_loading_buffer();
        if !read_chunked(reader, buffer, Section::KdTree, &mut tracker)? {
            return Ok(Completion::Cancelled);
        }
        check_index_entries(cloud.kdtree_index().point_indices(), header.number_points)?;
        if has_vertices {
            cloud.finish_index_loading();
        } else {
            log::warn!("Dropping stored kd-tree: the file has no positions to index");
            cloud.clear_index();
        }
    }

    if header.has_shader() {
        cloud.shader = read_shader(reader, &header)?;
        if !tracker.advance(SHADER_DESCRIPTION_SIZE as u64 + u64::from(header.shader_data_size)) {
            return Ok(Completion::Cancelled);
        }
    }

    log::info!(
        "Imported {} points, {} fields (stride {}), index: {}, shader: {}",
        cloud.num_points(),
        cloud.schema().len(),
        cloud.schema().stride(),
        header.has_kdtree(),
        header.has_shader()
    );
    Ok(Completion::Finished(cloud))
}

fn read_field_descriptions<R: Read>(reader: &mut R, header: &Header) -> Result<Vec<FieldDescription>> {
    let mut bytes = vec![0u8; usize::from(header.number_fields) * FIELD_DESCRIPTION_SIZE];
    reader
        .read_exact(&mut bytes)
        .map_err(|err| FormatError::from_read(err, Section::FieldDescriptions))?;

    let descriptions: Vec<FieldDescription> = bytes
        .chunks_exact(FIELD_DESCRIPTION_SIZE)
        .map(FieldDescription::decode)
        .collect();

    let mut stride = 0u64;
    let mut names_size = 0u64;
    for (index, description) in descriptions.iter().enumerate() {
        let Some(scalar_type) = ScalarType::from_code(description.scalar_type) else {
            return Err(FormatError::CorruptField {
                index,
                reason: "unknown scalar type",
            });
        };
        if description.reserved != 0 {
            return Err(FormatError::CorruptField {
                index,
                reason: "reserved byte is not zero",
            });
        }
        if description.name_length == 0 {
            return Err(FormatError::CorruptField {
                index,
                reason: "empty name",
            });
        }
        stride += scalar_type.size_of() as u64;
        names_size += u64::from(description.name_length);
    }

    if stride != u64::from(header.point_data_stride) {
        return Err(FormatError::StrideMismatch {
            declared: u64::from(header.point_data_stride),
            computed: stride,
        });
    }
    if names_size != u64::from(header.field_names_total_size) {
        return Err(FormatError::NameLengthMismatch {
            declared: u64::from(header.field_names_total_size),
            computed: names_size,
        });
    }
    Ok(descriptions)
}

fn read_field_names<R: Read>(
    reader: &mut R,
    header: &Header,
    descriptions: &[FieldDescription],
) -> Result<Vec<String>> {
    let packed = read_text(reader, header.field_names_total_size, Section::FieldNames)?;

    let mut names = Vec::with_capacity(descriptions.len());
    let mut offset = 0;
    for (index, description) in descriptions.iter().enumerate() {
        let end = offset + usize::from(description.name_length);
        let name = std::str::from_utf8(&packed[offset..end]).map_err(|_| FormatError::CorruptField {
            index,
            reason: "name is not valid UTF-8",
        })?;
        names.push(name.to_string());
        offset = end;
    }
    Ok(names)
}

fn read_shader<R: Read>(reader: &mut R, header: &Header) -> Result<Shader> {
    let mut bytes = [0u8; SHADER_DESCRIPTION_SIZE];
    reader
        .read_exact(&mut bytes)
        .map_err(|err| FormatError::from_read(err, Section::ShaderDescription))?;
    let description = ShaderDescription::decode(&bytes);
    if description.total() != u64::from(header.shader_data_size) {
        return Err(FormatError::CorruptShader("text lengths do not add up to the declared shader size"));
    }

    let mut texts = Vec::with_capacity(4);
    for len in description.lengths() {
        let bytes = read_text(reader, len, Section::ShaderText)?;
        let text = String::from_utf8(bytes).map_err(|_| FormatError::CorruptShader("text is not valid UTF-8"))?;
        texts.push(text);
    }
    let [used_properties, coordinate_expression, color_expression, node_data]: [String; 4] = texts
        .try_into()
        .map_err(|_| FormatError::CorruptShader("missing text"))?;

    Ok(Shader {
        used_properties: Shader::parse_used_properties(&used_properties),
        coordinate_expression,
        color_expression,
        node_data,
    })
}

/// Read exactly `len` bytes of a text section. The buffer only grows as
/// data arrives, so a lying length cannot force a huge allocation.
fn read_text<R: Read>(reader: &mut R, len: u32, section: Section) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    reader
        .by_ref()
        .take(u64::from(len))
        .read_to_end(&mut bytes)?;
    if bytes.len() != len as usize {
        return Err(FormatError::Truncated { section });
    }
    Ok(bytes)
}

/// Read a `len` byte section chunk by chunk into a buffer that grows with
/// the data, reporting after each chunk. `None` on cancellation.
fn read_growing<R: Read>(
    reader: &mut R,
    len: u64,
    section: Section,
    tracker: &mut ChunkTracker<'_>,
) -> Result<Option<ByteBuffer>> {
    let mut remaining =
        usize::try_from(len).map_err(|_| FormatError::CorruptHeader("section does not fit in memory"))?;
    let mut buffer = ByteBuffer::new();
    while remaining > 0 {
        let chunk_len = remaining.min(CHUNK_SIZE);
        reader
            .read_exact(buffer.grow(chunk_len))
            .map_err(|err| FormatError::from_read(err, section))?;
        remaining -= chunk_len;
        if !tracker.advance(chunk_len as u64) {
            return Ok(None);
        }
    }
    Ok(Some(buffer))
}

/// Fill `buffer` chunk by chunk, reporting after each. Returns `false` on
/// cancellation.
fn read_chunked<R: Read>(
    reader: &mut R,
    buffer: &mut [u8],
    section: Section,
    tracker: &mut ChunkTracker<'_>,
) -> Result<bool> {
    for chunk in buffer.chunks_mut(CHUNK_SIZE) {
        reader
            .read_exact(chunk)
            .map_err(|err| FormatError::from_read(err, section))?;
        if !tracker.advance(chunk.len() as u64) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn check_index_entries(entries: &[u64], count: u64) -> Result<()> {
    match entries.iter().position(|&entry| entry >= count) {
        Some(position) => Err(FormatError::IndexOutOfRange {
            position,
            value: entries[position],
            count,
        }),
        None => Ok(()),
    }
}
