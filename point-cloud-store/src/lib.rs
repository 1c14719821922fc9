//! Columnar in-memory point cloud store with a versioned binary file format
//! (PCVD) and an implicit kd-tree over point positions.
//!
//! The engine is single-threaded and synchronous. Long-running operations
//! (import, export, index construction) report progress through a
//! [`ProgressSink`] whose return value can cancel them at chunk boundaries.

pub mod aabb;
pub mod buffer;
pub mod error;
pub mod format;
pub mod kdtree;
pub mod las_import;
pub mod point_cloud;
pub mod progress;
pub mod scalar;
pub mod shader;

pub use aabb::Aabb;
pub use buffer::ByteBuffer;
pub use error::{FormatError, PointCloudError};
pub use format::{ExportOptions, Section, export_pcvd, import_pcvd, read_pcvd_file, write_pcvd_file};
pub use kdtree::{IndexState, KdNode, KdTreeIndex, PointIndex};
pub use las_import::{LasCloud, LasImportOptions, import_las};
pub use point_cloud::{FieldDescriptor, PointCloud, UserData, UserDataSchema, Vertex};
pub use progress::{Completion, NoProgress, ProgressSink};
pub use scalar::{FieldValue, Scalar, ScalarType, ScalarValue};
pub use shader::Shader;

// Vertex and index streams are copied between memory and disk without
// byte swapping.
static_assertions::const_assert!(cfg!(target_endian = "little"));
