//! Bounded pool of reusable request objects.
//!
//! The pool is an arena with an admission bound: it is created full, at
//! the context's `max_targets` size, and [`RequestPool::acquire`] waits
//! when every object is out on loan. Returned objects are reset to a
//! clean state before they are handed out again.

use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Objects that can be returned to a pool after use.
pub trait Recycle {
    /// Reset to a clean state for the next borrower.
    fn recycle(&mut self);
}

/// Bounded free-list of pre-allocated objects.
pub struct RequestPool<T> {
    inner: Arc<PoolInner<T>>,
}

struct PoolInner<T> {
    free: Mutex<Vec<T>>,
    available: Semaphore,
}

impl<T> Clone for RequestPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Recycle> RequestPool<T> {
    /// Create a pool holding `size` objects built by `init`.
    pub fn new(size: usize, init: impl FnMut() -> T) -> Self {
        let mut init = init;
        let free: Vec<T> = (0..size).map(|_| init()).collect();
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(free),
                available: Semaphore::new(size),
            }),
        }
    }

    /// Take an object from the pool, waiting while all are on loan.
    pub async fn acquire(&self) -> Lease<T> {
        let permit = self
            .inner
            .available
            .acquire()
            .await
            .expect("pool semaphore closed");
        permit.forget();
        let obj = self
            .inner
            .free
            .lock()
            .expect("pool mutex poisoned")
            .pop()
            .expect("pool semaphore out of sync with free list");
        Lease {
            obj: Some(obj),
            pool: self.inner.clone(),
        }
    }

    /// Number of objects currently available.
    pub fn available(&self) -> usize {
        self.inner.available.available_permits()
    }
}

/// A pooled object on loan; returns to the pool when dropped.
pub struct Lease<T: Recycle> {
    obj: Option<T>,
    pool: Arc<PoolInner<T>>,
}

impl<T: Recycle> std::ops::Deref for Lease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.obj.as_ref().expect("lease already returned")
    }
}

impl<T: Recycle> std::ops::DerefMut for Lease<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.obj.as_mut().expect("lease already returned")
    }
}

impl<T: Recycle> Drop for Lease<T> {
    fn drop(&mut self) {
        if let Some(mut obj) = self.obj.take() {
            obj.recycle();
            if let Ok(mut free) = self.pool.free.lock() {
                free.push(obj);
                self.pool.available.add_permits(1);
            }
        }
    }
}
