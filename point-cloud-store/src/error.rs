/// Error types of the point cloud store.
use crate::format::Section;
use thiserror::Error;

/// Failure reading or writing a PCVD file.
///
/// Everything except [`FormatError::Io`] and [`FormatError::Unexportable`]
/// means the input is malformed; [`FormatError::UnsupportedVersion`] means
/// the file may be fine but this reader is too old.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Can't load empty file")]
    EmptyFile,
    #[error("Incomplete file! ({section} section is truncated)")]
    Truncated { section: Section },
    #[error("Wrong file format (magic number {found:#010x})")]
    WrongMagic { found: u32 },
    #[error("Incompatible file format version {found} (this reader supports up to {supported})")]
    UnsupportedVersion { found: u8, supported: u8 },
    #[error("Need at least one point")]
    NoPoints,
    #[error("Need at least one field")]
    NoFields,
    #[error("Corrupt header ({0})")]
    CorruptHeader(&'static str),
    #[error("Corrupt property #{index} ({reason})")]
    CorruptField { index: usize, reason: &'static str },
    #[error("Corrupt header (point data stride mismatch: declared {declared}, fields add up to {computed})")]
    StrideMismatch { declared: u64, computed: u64 },
    #[error("Corrupt header (field names length mismatch: declared {declared}, fields add up to {computed})")]
    NameLengthMismatch { declared: u64, computed: u64 },
    #[error("Corrupt shader block ({0})")]
    CorruptShader(&'static str),
    #[error("Corrupt spatial index (entry {position} refers to point {value} of {count})")]
    IndexOutOfRange { position: usize, value: u64, count: u64 },
    #[error("Can't export point cloud: {0}")]
    Unexportable(String),
}

impl FormatError {
    /// Map a failed `read_exact` onto the truncated-file class.
    pub(crate) fn from_read(err: std::io::Error, section: Section) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            FormatError::Truncated { section }
        } else {
            FormatError::Io(err)
        }
    }

    pub fn is_unsupported_version(&self) -> bool {
        matches!(self, FormatError::UnsupportedVersion { .. })
    }

    pub fn is_malformed(&self) -> bool {
        !matches!(
            self,
            FormatError::Io(_) | FormatError::Unexportable(_) | FormatError::UnsupportedVersion { .. }
        )
    }
}

/// Failure manipulating a point cloud or importing one from LAS/LAZ.
#[derive(Debug, Error)]
pub enum PointCloudError {
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
    #[error("Point {index} out of range (cloud has {len} points)")]
    PointOutOfRange { index: usize, len: usize },
    #[error("Field #{index} out of range (schema has {len} fields)")]
    FieldOutOfRange { index: usize, len: usize },
    #[error("Label field #{expected} missing (schema has {len} fields)")]
    MissingLabelField { expected: usize, len: usize },
    #[error("LAS file declares no points")]
    NoPoints,
    #[error("LAS file declares {declared} points but holds {found}")]
    PointCountMismatch { declared: u64, found: u64 },
    #[error("LAS error: {0}")]
    Las(#[from] las::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Shader preset error: {0}")]
    Json(#[from] serde_json::Error),
}
