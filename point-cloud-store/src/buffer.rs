/// Raw byte storage for the point streams.
use std::fmt;

/// Exclusively owned, resizable byte store.
///
/// Backed by 32-bit words so that record views over it (`bytemuck` casts to
/// `Vertex` or `u64`) are always aligned. Not `Clone`: a point stream can be
/// hundreds of megabytes and is only ever moved.
#[derive(Default)]
pub struct ByteBuffer {
    words: Vec<u32>,
    len: usize,
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Resize to exactly `len` bytes. Previous contents are discarded; the
    /// new contents are unspecified until written or filled.
    pub fn resize(&mut self, len: usize) {
        self.words.clear();
        self.words.resize(len.div_ceil(4), 0);
        self.len = len;
    }

    /// Append `additional` bytes and hand them out for filling; their
    /// contents are unspecified until written.
    /// Capacity grows geometrically, so streaming in chunks stays linear.
    pub fn grow(&mut self, additional: usize) -> &mut [u8] {
        let start = self.len;
        self.len += additional;
        self.words.resize(self.len.div_ceil(4), 0);
        &mut bytemuck::cast_slice_mut(&mut self.words)[start..self.len]
    }

    /// Reserve room for `additional` more bytes without changing the length.
    pub fn reserve(&mut self, additional: usize) {
        let words = (self.len + additional).div_ceil(4);
        self.words.reserve(words.saturating_sub(self.words.len()));
    }

    /// Write `pattern` repeatedly over the whole buffer.
    pub fn fill(&mut self, pattern: u32) {
        self.words.fill(pattern);
    }

    /// Release the storage.
    pub fn clear(&mut self) {
        self.words = Vec::new();
        self.len = 0;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.words)[..self.len]
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut(&mut self.words)[..self.len]
    }
}

impl fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteBuffer").field("len", &self.len).finish()
    }
}
