//! Bounded object pools with blocking checkout.
//!
//! A [`BoundedPool`] owns a fixed set of items created up front. Items are
//! checked out with [`BoundedPool::acquire`], which blocks while the pool is
//! empty, and are returned automatically when the [`Pooled`] guard drops, so
//! an item is never lost on an early return or error path.
//!
//! Pools are the pipeline's only backpressure mechanism: when the consumer
//! holds every arena, or every block slot is in flight, producers wait here.
//! [`BoundedPool::close`] wakes all waiters and makes further checkouts fail,
//! which is how a pipeline shuts down after a fatal error.
//!
//! # Example
//!
//! ```
//! use parbam_lib::pool::BoundedPool;
//!
//! let pool = BoundedPool::with_items(2, || Vec::<u8>::with_capacity(16));
//! let mut buf = pool.acquire().unwrap();
//! buf.extend_from_slice(b"abc");
//! assert_eq!(pool.available(), 1);
//! drop(buf);
//! assert_eq!(pool.available(), 2);
//! ```

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

struct PoolState<T> {
    items: Vec<T>,
    closed: bool,
}

struct PoolInner<T> {
    state: Mutex<PoolState<T>>,
    available: Condvar,
    capacity: usize,
}

impl<T> PoolInner<T> {
    fn release(&self, item: T) {
        let mut state = self.state.lock();
        state.items.push(item);
        drop(state);
        self.available.notify_one();
    }
}

/// A fixed-size pool of reusable items shared between threads.
///
/// Cloning the pool is cheap and yields another handle to the same items.
pub struct BoundedPool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for BoundedPool<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T> fmt::Debug for BoundedPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedPool")
            .field("capacity", &self.inner.capacity)
            .field("available", &self.available())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<T> BoundedPool<T> {
    /// Create a pool holding `items`.
    #[must_use]
    pub fn new(items: Vec<T>) -> Self {
        let capacity = items.len();
        Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState { items, closed: false }),
                available: Condvar::new(),
                capacity,
            }),
        }
    }

    /// Create a pool of `count` items built by `make`.
    #[must_use]
    pub fn with_items(count: usize, make: impl FnMut() -> T) -> Self {
        Self::new(std::iter::repeat_with(make).take(count).collect())
    }

    /// Check out an item, blocking until one is free.
    ///
    /// Returns `None` once the pool has been closed.
    #[must_use]
    pub fn acquire(&self) -> Option<Pooled<T>> {
        let mut state = self.inner.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(item) = state.items.pop() {
                return Some(Pooled { item: Some(item), pool: Arc::clone(&self.inner) });
            }
            self.inner.available.wait(&mut state);
        }
    }

    /// Check out an item if one is free, without blocking.
    #[must_use]
    pub fn try_acquire(&self) -> Option<Pooled<T>> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return None;
        }
        state.items.pop().map(|item| Pooled { item: Some(item), pool: Arc::clone(&self.inner) })
    }

    /// Close the pool, waking every waiter. Subsequent checkouts return `None`.
    ///
    /// Items checked out before closing are still returned when dropped.
    pub fn close(&self) {
        self.inner.state.lock().closed = true;
        self.inner.available.notify_all();
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Number of items currently in the pool.
    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.state.lock().items.len()
    }

    /// Total number of items owned by the pool.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

/// A checked-out pool item, returned to its pool on drop.
pub struct Pooled<T> {
    // Only `None` during drop
    item: Option<T>,
    pool: Arc<PoolInner<T>>,
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.item.as_ref().expect("pooled item is present until drop")
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().expect("pooled item is present until drop")
    }
}

impl<T: fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&self.item).finish()
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.release(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_acquire_and_release() {
        let pool = BoundedPool::with_items(2, || 0u32);
        assert_eq!(pool.capacity(), 2);

        let mut a = pool.acquire().unwrap();
        *a = 7;
        let b = pool.try_acquire().unwrap();
        assert!(pool.try_acquire().is_none());

        drop(a);
        assert_eq!(pool.available(), 1);
        let again = pool.acquire().unwrap();
        assert_eq!(*again, 7);
        drop(b);
        drop(again);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_release_on_error_path() {
        let pool = BoundedPool::with_items(1, String::new);
        let attempt = || -> Result<(), String> {
            let _item = pool.acquire().ok_or("closed")?;
            Err("failed while holding item".to_string())
        };
        assert!(attempt().is_err());
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_acquire_blocks_until_release() {
        let pool = BoundedPool::with_items(1, || ());
        let held = pool.acquire().unwrap();
        let acquired = Arc::new(AtomicBool::new(false));

        let handle = {
            let pool = pool.clone();
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let _item = pool.acquire().unwrap();
                acquired.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst));
        drop(held);
        handle.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_close_wakes_waiters() {
        let pool = BoundedPool::with_items(1, || ());
        let held = pool.acquire().unwrap();

        let handle = {
            let pool = pool.clone();
            thread::spawn(move || pool.acquire().is_none())
        };

        thread::sleep(Duration::from_millis(20));
        pool.close();
        assert!(handle.join().unwrap());
        assert!(pool.is_closed());
        assert!(pool.try_acquire().is_none());

        // Items held across close still come home
        drop(held);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_many_threads_share_pool() {
        let pool = BoundedPool::with_items(3, || 0u64);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        let mut item = pool.acquire().unwrap();
                        *item += 1;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut total = 0;
        let mut held = Vec::new();
        while let Some(item) = pool.try_acquire() {
            total += *item;
            held.push(item);
        }
        assert_eq!(held.len(), 3);
        assert_eq!(total, 8 * 200);
    }
}
