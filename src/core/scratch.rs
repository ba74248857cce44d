//! Per-worker scratch memory for neighbor gathering.
//!
//! Each worker owns exactly one `ThreadLocals` for its whole lifetime. The buffers
//! are allocated once with a fixed capacity and never grow: neighbors beyond the
//! capacity are dropped (and trip a debug assertion), so memory per worker is
//! bounded no matter how dense the particle cloud gets.

use nalgebra::Vector3;

/// Default number of neighbors kept per sample.
pub const DEFAULT_NEIGHBOR_CAPACITY: usize = 8192;

/// A `Vec` that refuses to grow past the capacity it was created with.
#[derive(Clone, Debug)]
pub struct BoundedBuffer {
    items: Vec<Vector3<f32>>,
    capacity: usize,
}

impl BoundedBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an item. Returns false (and drops the item) when full.
    #[inline]
    pub fn push(&mut self, item: Vector3<f32>) -> bool {
        debug_assert!(
            self.items.len() < self.capacity,
            "neighbor buffer overflow (capacity {})",
            self.capacity
        );
        if self.items.len() < self.capacity {
            self.items.push(item);
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_slice(&self) -> &[Vector3<f32>] {
        &self.items
    }
}

/// Scratch state for one worker.
#[derive(Clone, Debug)]
pub struct ThreadLocals {
    /// Absolute positions of the extended neighborhood
    pub neighbors_ext: BoundedBuffer,

    /// Offsets (neighbor - sample) of neighbors inside the tight kernel support
    pub neighbors: BoundedBuffer,
}

impl ThreadLocals {
    pub fn new(capacity: usize) -> Self {
        Self {
            neighbors_ext: BoundedBuffer::with_capacity(capacity),
            neighbors: BoundedBuffer::with_capacity(capacity),
        }
    }

    pub fn clear(&mut self) {
        self.neighbors_ext.clear();
        self.neighbors.clear();
    }
}

impl Default for ThreadLocals {
    fn default() -> Self {
        Self::new(DEFAULT_NEIGHBOR_CAPACITY)
    }
}
