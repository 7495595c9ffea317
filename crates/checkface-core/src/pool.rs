//! Pooled input tensors for the recognition model.
//!
//! Every inference needs a `1×3×H×W` float buffer. Buffers are taken from a
//! free list and returned when the [`TensorLease`] drops, so steady-state
//! extraction does not allocate. When more than one lease is outstanding the
//! pool hands out a fresh buffer instead of blocking.

use ndarray::Array4;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

/// Shape of every buffer in a pool: (batch, channels, height, width).
pub type TensorShape = (usize, usize, usize, usize);

#[derive(Debug)]
struct PoolInner {
    shape: TensorShape,
    free: Mutex<Vec<Array4<f32>>>,
}

/// Free-list pool of fixed-shape tensors. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TensorPool {
    inner: Arc<PoolInner>,
}

impl TensorPool {
    pub fn new(shape: TensorShape) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                shape,
                free: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn shape(&self) -> TensorShape {
        self.inner.shape
    }

    /// Take a buffer from the free list, or allocate one. Contents of a
    /// reused buffer are whatever the previous lease left behind.
    pub fn acquire(&self) -> TensorLease {
        let reused = self
            .inner
            .free
            .lock()
            .ok()
            .and_then(|mut free| free.pop());

        let buffer = reused.unwrap_or_else(|| {
            tracing::debug!(shape = ?self.inner.shape, "allocating pooled tensor");
            Array4::<f32>::zeros(self.inner.shape)
        });

        TensorLease {
            buffer,
            pool: Arc::clone(&self.inner),
        }
    }

    /// Number of idle buffers.
    pub fn available(&self) -> usize {
        self.inner.free.lock().map(|f| f.len()).unwrap_or(0)
    }
}

/// Exclusive use of one pooled buffer; returned to the pool on drop.
#[derive(Debug)]
pub struct TensorLease {
    buffer: Array4<f32>,
    pool: Arc<PoolInner>,
}

impl Deref for TensorLease {
    type Target = Array4<f32>;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl DerefMut for TensorLease {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl Drop for TensorLease {
    fn drop(&mut self) {
        // An empty array does not allocate.
        let buffer = std::mem::replace(&mut self.buffer, Array4::zeros((0, 0, 0, 0)));
        if let Ok(mut free) = self.pool.free.lock() {
            free.push(buffer);
        }
    }
}
