use super::{Result, Section};
use crate::aabb::{Aabb, read_vec3};
use crate::error::FormatError;
use constants::format::{
    FIELD_DESCRIPTION_SIZE, FILE_VERSION, FLAG_KDTREE, FLAG_SHADER, FLAG_VERTEX, FLAGS_MASK_V0,
    FLAGS_MASK_V1, HEADER_SIZE, KDTREE_ENTRY_SIZE, MAGIC_NUMBER, MAX_SUPPORTED_COMPATIBILITY_VERSION,
    SHADER_DESCRIPTION_SIZE, VERTEX_SIZE,
};
use glam::Vec3;
use std::io::{ErrorKind, Read};

/// Fixed 64 byte file header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Header {
    pub compatibility_version: u8,
    pub file_version: u8,
    pub flags: u16,
    pub number_points: u64,
    pub number_fields: u16,
    pub point_data_stride: u16,
    pub field_names_total_size: u32,
    pub shader_data_size: u32,
    pub reserved: u32,
    pub aabb: Aabb,
}

impl Header {
    pub fn has_kdtree(&self) -> bool {
        self.flags & FLAG_KDTREE != 0
    }

    pub fn has_vertices(&self) -> bool {
        self.flags & FLAG_VERTEX != 0
    }

    pub fn has_shader(&self) -> bool {
        self.flags & FLAG_SHADER != 0
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&MAGIC_NUMBER.to_le_bytes());
        bytes[4] = self.compatibility_version;
        bytes[5] = self.file_version;
        bytes[6..8].copy_from_slice(&self.flags.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.number_points.to_le_bytes());
        bytes[16..18].copy_from_slice(&self.number_fields.to_le_bytes());
        bytes[18..20].copy_from_slice(&self.point_data_stride.to_le_bytes());
        bytes[20..24].copy_from_slice(&self.field_names_total_size.to_le_bytes());
        bytes[24..28].copy_from_slice(&self.shader_data_size.to_le_bytes());
        bytes[28..32].copy_from_slice(&self.reserved.to_le_bytes());
        write_vec3(&mut bytes[32..44], self.aabb.min_point);
        write_vec3(&mut bytes[48..60], self.aabb.max_point);
        bytes
    }

    /// Decode without validating. The magic number is not part of the
    /// result; see [`Header::read`].
    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> Self {
        Self {
            compatibility_version: bytes[4],
            file_version: bytes[5],
            flags: u16::from_le_bytes([bytes[6], bytes[7]]),
            number_points: u64::from_le_bytes(le(&bytes[8..16])),
            number_fields: u16::from_le_bytes([bytes[16], bytes[17]]),
            point_data_stride: u16::from_le_bytes([bytes[18], bytes[19]]),
            field_names_total_size: u32::from_le_bytes(le(&bytes[20..24])),
            shader_data_size: u32::from_le_bytes(le(&bytes[24..28])),
            reserved: u32::from_le_bytes(le(&bytes[28..32])),
            aabb: Aabb::new(read_vec3(&bytes[32..44]), read_vec3(&bytes[48..60])),
        }
    }

    /// Read and validate a header.
    ///
    /// Checks run in a fixed order so the first problem in a file is the one
    /// reported: empty file, magic number, short header, then the fields.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut bytes = [0u8; HEADER_SIZE];
        let filled = read_up_to(reader, &mut bytes)?;

        if filled == 0 {
            return Err(FormatError::EmptyFile);
        }
        if filled < 4 {
            return Err(FormatError::Truncated {
                section: Section::Header,
            });
        }
        let magic = u32::from_le_bytes(le(&bytes[0..4]));
        if magic != MAGIC_NUMBER {
            return Err(FormatError::WrongMagic { found: magic });
        }
        if filled < HEADER_SIZE {
            return Err(FormatError::Truncated {
                section: Section::Header,
            });
        }

        let header = Self::decode(&bytes);
        header.validate()?;
        Ok(header)
    }

    pub fn validate(&self) -> Result<()> {
        if self.compatibility_version > MAX_SUPPORTED_COMPATIBILITY_VERSION {
            return Err(FormatError::UnsupportedVersion {
                found: self.compatibility_version,
                supported: MAX_SUPPORTED_COMPATIBILITY_VERSION,
            });
        }
        if self.number_points == 0 {
            return Err(FormatError::NoPoints);
        }
        if self.number_fields == 0 {
            return Err(FormatError::NoFields);
        }
        if self.point_data_stride == 0 {
            return Err(FormatError::CorruptHeader("point data stride is zero"));
        }
        if self.field_names_total_size == 0 {
            return Err(FormatError::CorruptHeader("field names size is zero"));
        }

        let allowed_flags = if self.file_version < 1 {
            FLAGS_MASK_V0
        } else {
            FLAGS_MASK_V1
        };
        if self.flags & !allowed_flags != 0 {
            return Err(FormatError::CorruptHeader("unknown flags for this file version"));
        }
        if self.file_version < 1 && self.shader_data_size != 0 {
            return Err(FormatError::CorruptHeader("shader data size set in a version 0 file"));
        }
        if self.reserved != 0 {
            return Err(FormatError::CorruptHeader("reserved field is not zero"));
        }
        if !self.aabb.min_point.is_finite() || !self.aabb.max_point.is_finite() {
            return Err(FormatError::CorruptHeader("bounding box is not finite"));
        }
        if self.aabb.min_point.cmpgt(self.aabb.max_point).any() {
            return Err(FormatError::CorruptHeader("bounding box minimum exceeds its maximum"));
        }
        Ok(())
    }

    /// Byte size of every section this header declares.
    pub fn section_sizes(&self) -> Result<SectionSizes> {
        let overflow = || FormatError::CorruptHeader("declared sections overflow");
        let points = self.number_points;
        let per_point = |width: usize| points.checked_mul(width as u64).ok_or_else(overflow);

        Ok(SectionSizes {
            field_descriptions: u64::from(self.number_fields) * FIELD_DESCRIPTION_SIZE as u64,
            field_names: u64::from(self.field_names_total_size),
            vertices: if self.has_vertices() { per_point(VERTEX_SIZE)? } else { 0 },
            user_data: per_point(usize::from(self.point_data_stride))?,
            kdtree: if self.has_kdtree() { per_point(KDTREE_ENTRY_SIZE)? } else { 0 },
            shader_description: if self.has_shader() { SHADER_DESCRIPTION_SIZE as u64 } else { 0 },
            shader_text: if self.has_shader() { u64::from(self.shader_data_size) } else { 0 },
        }
        .checked()
        .ok_or_else(overflow)?)
    }

    /// Header for a file written by this crate.
    pub(crate) fn for_writing(flags: u16, with_shader: bool) -> Self {
        Self {
            compatibility_version: u8::from(with_shader),
            file_version: FILE_VERSION,
            flags,
            number_points: 0,
            number_fields: 0,
            point_data_stride: 0,
            field_names_total_size: 0,
            shader_data_size: 0,
            reserved: 0,
            aabb: Aabb::invalid(),
        }
    }
}

/// Byte sizes of the sections following the header. Absent sections are 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSizes {
    pub field_descriptions: u64,
    pub field_names: u64,
    pub vertices: u64,
    pub user_data: u64,
    pub kdtree: u64,
    pub shader_description: u64,
    pub shader_text: u64,
}

impl SectionSizes {
    fn in_order(&self) -> [(Section, u64); 8] {
        [
            (Section::Header, HEADER_SIZE as u64),
            (Section::FieldDescriptions, self.field_descriptions),
            (Section::FieldNames, self.field_names),
            (Section::Vertices, self.vertices),
            (Section::UserData, self.user_data),
            (Section::KdTree, self.kdtree),
            (Section::ShaderDescription, self.shader_description),
            (Section::ShaderText, self.shader_text),
        ]
    }

    fn checked(self) -> Option<Self> {
        self.in_order()
            .iter()
            .try_fold(0u64, |sum, &(_, size)| sum.checked_add(size))
            .map(|_| self)
    }

    /// Whole file size, which is also the progress total of import and export.
    pub fn total(&self) -> u64 {
        self.in_order().iter().map(|&(_, size)| size).sum()
    }

    /// Section that byte `offset` falls in; the last section for offsets
    /// past the end.
    pub fn section_containing(&self, offset: u64) -> Section {
        let mut end = 0;
        for (section, size) in self.in_order() {
            end += size;
            if offset < end {
                return section;
            }
        }
        Section::ShaderText
    }
}

/// On-disk description of one user data field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescription {
    pub name_length: u16,
    pub scalar_type: u8,
    pub reserved: u8,
}

impl FieldDescription {
    pub fn encode(&self) -> [u8; FIELD_DESCRIPTION_SIZE] {
        let [a, b] = self.name_length.to_le_bytes();
        [a, b, self.scalar_type, self.reserved]
    }

    pub fn decode(bytes: &[u8]) -> Self {
        Self {
            name_length: u16::from_le_bytes([bytes[0], bytes[1]]),
            scalar_type: bytes[2],
            reserved: bytes[3],
        }
    }
}

/// Lengths of the four shader texts, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShaderDescription {
    pub used_properties_length: u32,
    pub coordinate_expression_length: u32,
    pub color_expression_length: u32,
    pub node_data_length: u32,
}

impl ShaderDescription {
    pub fn lengths(&self) -> [u32; 4] {
        [
            self.used_properties_length,
            self.coordinate_expression_length,
            self.color_expression_length,
            self.node_data_length,
        ]
    }

    pub fn total(&self) -> u64 {
        self.lengths().iter().map(|&len| u64::from(len)).sum()
    }

    pub fn encode(&self) -> [u8; SHADER_DESCRIPTION_SIZE] {
        let mut bytes = [0u8; SHADER_DESCRIPTION_SIZE];
        for (chunk, len) in bytes.chunks_exact_mut(4).zip(self.lengths()) {
            chunk.copy_from_slice(&len.to_le_bytes());
        }
        bytes
    }

    pub fn decode(bytes: &[u8; SHADER_DESCRIPTION_SIZE]) -> Self {
        let len = |i: usize| u32::from_le_bytes(le(&bytes[i * 4..i * 4 + 4]));
        Self {
            used_properties_length: len(0),
            coordinate_expression_length: len(1),
            color_expression_length: len(2),
            node_data_length: len(3),
        }
    }
}

fn le<const N: usize>(src: &[u8]) -> [u8; N] {
    let mut bytes = [0u8; N];
    bytes.copy_from_slice(&src[..N]);
    bytes
}

fn write_vec3(dst: &mut [u8], v: Vec3) {
    for (chunk, component) in dst.chunks_exact_mut(4).zip(v.to_array()) {
        chunk.copy_from_slice(&component.to_le_bytes());
    }
}

/// Fill as much of `buf` as the reader provides; short only at end of input.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_header() -> Header {
        Header {
            compatibility_version: 0,
            file_version: 1,
            flags: FLAG_VERTEX | FLAG_KDTREE,
            number_points: 10,
            number_fields: 2,
            point_data_stride: 6,
            field_names_total_size: 9,
            shader_data_size: 0,
            reserved: 0,
            aabb: Aabb::new(Vec3::splat(-1.0), Vec3::new(2.0, 3.0, 4.0)),
        }
    }

    fn read(bytes: &[u8]) -> Result<Header> {
        Header::read(&mut &bytes[..])
    }

    #[test]
    fn encodes_documented_offsets() {
        let bytes = valid_header().encode();
        assert_eq!(&bytes[0..4], b"PCVD");
        assert_eq!(bytes[5], 1);
        assert_eq!(u64::from_le_bytes(le(&bytes[8..16])), 10);
        assert_eq!(u16::from_le_bytes([bytes[18], bytes[19]]), 6);
        assert_eq!(f32::from_le_bytes(le(&bytes[48..52])), 2.0);
        assert_eq!(&bytes[44..48], &[0; 4]);
        assert_eq!(read(&bytes).unwrap(), valid_header());
    }

    #[test]
    fn check_order() {
        assert!(matches!(read(&[]), Err(FormatError::EmptyFile)));
        assert!(matches!(read(b"PC"), Err(FormatError::Truncated { section: Section::Header })));
        assert!(matches!(read(b"ABCDEFGH"), Err(FormatError::WrongMagic { .. })));
        assert!(matches!(read(b"PCVD\0\x01"), Err(FormatError::Truncated { section: Section::Header })));
    }

    fn rejected(corrupt: impl Fn(&mut Header)) -> FormatError {
        let mut header = valid_header();
        corrupt(&mut header);
        let err = read(&header.encode()).unwrap_err();
        assert!(err.is_malformed() || err.is_unsupported_version(), "{}", err);
        err
    }

    #[test]
    fn rejects_bad_fields() {
        assert!(rejected(|h| h.compatibility_version = 2).is_unsupported_version());
        assert!(matches!(rejected(|h| h.number_points = 0), FormatError::NoPoints));
        assert!(matches!(rejected(|h| h.number_fields = 0), FormatError::NoFields));
        assert!(matches!(rejected(|h| h.point_data_stride = 0), FormatError::CorruptHeader(_)));
        assert!(matches!(rejected(|h| h.field_names_total_size = 0), FormatError::CorruptHeader(_)));
        assert!(matches!(rejected(|h| h.flags = 0b1000), FormatError::CorruptHeader(_)));
        assert!(matches!(rejected(|h| h.reserved = 1), FormatError::CorruptHeader(_)));
        assert!(matches!(rejected(|h| h.aabb.max_point.y = f32::NAN), FormatError::CorruptHeader(_)));
        assert!(matches!(
            rejected(|h| h.aabb.min_point.x = f32::NEG_INFINITY),
            FormatError::CorruptHeader(_)
        ));
        assert!(matches!(rejected(|h| h.aabb.min_point.z = 5.0), FormatError::CorruptHeader(_)));
    }

    #[test]
    fn version_gates_shader_fields() {
        let mut header = valid_header();
        header.file_version = 0;
        header.flags = FLAG_SHADER;
        assert!(read(&header.encode()).is_err());

        header.flags = FLAG_VERTEX;
        header.shader_data_size = 4;
        assert!(read(&header.encode()).is_err());

        header.file_version = 1;
        header.flags = FLAG_VERTEX | FLAG_SHADER;
        assert!(read(&header.encode()).is_ok());
    }

    #[test]
    fn section_sizes_and_lookup() {
        let sizes = valid_header().section_sizes().unwrap();
        assert_eq!(sizes.vertices, 160);
        assert_eq!(sizes.user_data, 60);
        assert_eq!(sizes.kdtree, 80);
        assert_eq!(sizes.total(), 64 + 8 + 9 + 160 + 60 + 80);

        assert_eq!(sizes.section_containing(0), Section::Header);
        assert_eq!(sizes.section_containing(64), Section::FieldDescriptions);
        assert_eq!(sizes.section_containing(64 + 8 + 9 + 160), Section::UserData);
        assert_eq!(sizes.section_containing(sizes.total() - 1), Section::KdTree);
    }

    #[test]
    fn huge_point_count_overflows() {
        let mut header = valid_header();
        header.number_points = u64::MAX / 4;
        assert!(header.section_sizes().is_err());
    }

    #[test]
    fn shader_description_layout() {
        let description = ShaderDescription {
            used_properties_length: 1,
            coordinate_expression_length: 2,
            color_expression_length: 3,
            node_data_length: 4,
        };
        let bytes = description.encode();
        assert_eq!(&bytes[8..12], &3u32.to_le_bytes());
        assert_eq!(ShaderDescription::decode(&bytes), description);
        assert_eq!(description.total(), 10);
    }
}
