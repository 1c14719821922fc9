//! Durable constants of the PCVD binary point cloud format.
//!
//! Everything in here is written to disk. Changing a value breaks every
//! file written before the change.

/// `"PCVD"` read as a little-endian `u32`.
pub const MAGIC_NUMBER: u32 = u32::from_le_bytes(*b"PCVD");

/// Newest file version this reader understands and the version it writes.
pub const FILE_VERSION: u8 = 1;

/// Files declaring a higher downwards compatibility version are rejected.
pub const MAX_SUPPORTED_COMPATIBILITY_VERSION: u8 = 1;

/// Spatial index permutation follows the user data block.
pub const FLAG_KDTREE: u16 = 0b001;
/// Vertex records (position + colour) precede the user data block.
pub const FLAG_VERTEX: u16 = 0b010;
/// Shader metadata block closes the file.
pub const FLAG_SHADER: u16 = 0b100;

/// Flags a version 0 file may set.
pub const FLAGS_MASK_V0: u16 = FLAG_KDTREE | FLAG_VERTEX;
/// Flags a version 1 (or newer) file may set.
pub const FLAGS_MASK_V1: u16 = FLAG_KDTREE | FLAG_VERTEX | FLAG_SHADER;

pub const HEADER_SIZE: usize = 64;
pub const FIELD_DESCRIPTION_SIZE: usize = 4;
pub const SHADER_DESCRIPTION_SIZE: usize = 16;
pub const VERTEX_SIZE: usize = 16;
pub const KDTREE_ENTRY_SIZE: usize = 8;

/// Ranges at or below this many points become kd-tree leaves. Part of the
/// format: loaded permutations are only meaningful for the leaf size they
/// were built with.
pub const KDTREE_LEAF_SIZE: usize = 16;

/// Pattern written over freshly allocated point buffers. Reads back as a
/// NaN position and white colour.
pub const POISON_PATTERN: u32 = 0xffff_ffff;

/// Colour of points whose position was never written.
pub const PLACEHOLDER_COLOUR: [u8; 3] = [255, 0, 255];

/// Default half extent of the box substituted for an invalid bounding box.
pub const FALLBACK_AABB_EXTENT: f32 = 1.0;
