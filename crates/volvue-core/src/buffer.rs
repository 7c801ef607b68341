//! Dynamic pixel buffer with resize hysteresis
//!
//! One contiguous byte allocation backs the live typed view. Shrinking
//! reuses the allocation until the live portion would drop under a quarter
//! of capacity; past that the buffer reallocates to the exact size so a
//! large transient region cannot pin memory forever.

use crate::{BufferContent, Result, VolvueError};

/// Fraction of capacity below which a shrink reallocates
const REUSE_FLOOR: f64 = 0.25;

#[derive(Debug, Clone)]
pub struct VolumeBuffer {
    data: Vec<u8>,
    content: BufferContent,
    dims: [u64; 3],
    live_elements: usize,
}

impl VolumeBuffer {
    pub fn new(content: BufferContent) -> Self {
        Self {
            data: Vec::new(),
            content,
            dims: [0, 0, 0],
            live_elements: 0,
        }
    }

    /// What one voxel holds. Normalized multi-component buffers are uint8
    /// regardless of the source array type.
    pub fn content(&self) -> BufferContent {
        self.content
    }

    /// Current spatial dims `[z, y, x]`
    pub fn dims(&self) -> [u64; 3] {
        self.dims
    }

    /// Elements in the live view: `prod(dims) * components`
    pub fn live_elements(&self) -> usize {
        self.live_elements
    }

    /// Allocation size in elements
    pub fn capacity_elements(&self) -> usize {
        self.data.len() / self.content.element_type().size_of()
    }

    fn live_bytes(&self) -> usize {
        self.live_elements * self.content.element_type().size_of()
    }

    /// Resize the live view to `dims_zyx`, reusing the allocation when the
    /// requirement fits within `[REUSE_FLOOR * capacity, capacity]`
    pub fn resize(&mut self, dims_zyx: [u64; 3]) -> Result<()> {
        let voxels = dims_zyx[0]
            .checked_mul(dims_zyx[1])
            .and_then(|v| v.checked_mul(dims_zyx[2]))
            .and_then(|v| v.checked_mul(self.content.components() as u64))
            .ok_or_else(|| {
                VolvueError::InvalidArgument(format!("buffer dims overflow: {dims_zyx:?}"))
            })?;
        let required = usize::try_from(voxels).map_err(|_| {
            VolvueError::InvalidArgument(format!("buffer dims exceed address space: {dims_zyx:?}"))
        })?;
        let required_bytes = required * self.content.element_type().size_of();

        let capacity = self.data.len();
        let reuse = required_bytes <= capacity
            && (required_bytes as f64) >= REUSE_FLOOR * (capacity as f64);
        if !reuse && required_bytes != capacity {
            tracing::debug!(
                required_bytes,
                capacity,
                "reallocating volume buffer"
            );
            self.data = vec![0u8; required_bytes];
        }
        self.dims = dims_zyx;
        self.live_elements = required;
        Ok(())
    }

    /// Zero the live view; the spare capacity is left untouched
    pub fn clear(&mut self) {
        let live = self.live_bytes();
        self.data[..live].fill(0);
    }

    /// Live view bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.live_bytes()]
    }

    /// Live view bytes, writable
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        let live = self.live_bytes();
        &mut self.data[..live]
    }

    /// Copy the live view out (time-frame snapshots)
    pub fn snapshot(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    /// Replace the live view from a snapshot of identical shape
    pub fn restore(&mut self, dims_zyx: [u64; 3], bytes: &[u8]) -> Result<()> {
        self.resize(dims_zyx)?;
        if bytes.len() != self.live_bytes() {
            return Err(VolvueError::InternalInvariant(format!(
                "snapshot size {} != live view {}",
                bytes.len(),
                self.live_bytes()
            )));
        }
        self.as_bytes_mut().copy_from_slice(bytes);
        Ok(())
    }
}

/// Comprehensive test suite with Arrange-Act-Assert pattern
#[cfg(test)]
mod tests {
    include!("buffer_test.rs");
}
