/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

//! The accumulator is the only structure mutated by more than one task at
//! a time. Samplers append under its lock; the dispatcher swaps the open
//! batch out atomically. Batches come from an explicit pool and are owned
//! by exactly one task between `acquire`/`swap` and `release`.

use std::sync::{Arc, Mutex};
use std::vec::Drain;

use pulse_types::Metric;

pub struct Batch {
    items: Vec<Metric>,
}

impl Batch {
    fn new() -> Self {
        Batch { items: Vec::new() }
    }

    /// Drop the contents, keep the backing capacity for reuse.
    pub fn reset(&mut self) {
        self.items.clear();
    }

    pub fn items(&self) -> &[Metric] {
        &self.items
    }

    pub fn drain(&mut self) -> Drain<'_, Metric> {
        self.items.drain(..)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.items.capacity()
    }
}

/// Free list of reset batches. `release` is the only way back in, so a
/// pooled batch is always empty and never aliased.
#[derive(Default)]
pub struct BatchPool {
    free: Mutex<Vec<Batch>>,
}

impl BatchPool {
    pub fn new() -> Self {
        BatchPool::default()
    }

    pub fn acquire(&self) -> Batch {
        self.free.lock().unwrap().pop().unwrap_or_else(Batch::new)
    }

    pub fn release(&self, mut batch: Batch) {
        batch.reset();
        self.free.lock().unwrap().push(batch);
    }
}

pub struct Accumulator {
    open: Mutex<Batch>,
    pool: Arc<BatchPool>,
}

impl Accumulator {
    pub fn new(pool: Arc<BatchPool>) -> Self {
        let open = pool.acquire();
        Accumulator {
            open: Mutex::new(open),
            pool,
        }
    }

    pub fn append<I>(&self, metrics: I)
    where
        I: IntoIterator<Item = Metric>,
    {
        let mut open = self.open.lock().unwrap();
        open.items.extend(metrics);
    }

    /// Atomically close the open batch and start a fresh one from the
    /// pool. The returned batch is exclusively owned by the caller.
    pub fn swap(&self) -> Batch {
        let mut fresh = self.pool.acquire();
        let mut open = self.open.lock().unwrap();
        std::mem::swap(&mut *open, &mut fresh);
        fresh
    }

    pub fn len(&self) -> usize {
        self.open.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_takes_everything_appended_before() {
        let pool = Arc::new(BatchPool::new());
        let acc = Accumulator::new(pool.clone());

        acc.append(vec![Metric::counter("a", 1), Metric::gauge("b", 2.0)]);
        assert_eq!(acc.len(), 2);

        let closed = acc.swap();
        assert_eq!(closed.len(), 2);
        assert_eq!(acc.len(), 0);

        acc.append(vec![Metric::counter("c", 3)]);
        assert_eq!(closed.len(), 2);
        pool.release(closed);
    }

    #[test]
    fn concurrent_appends_are_not_lost() {
        let pool = Arc::new(BatchPool::new());
        let acc = Arc::new(Accumulator::new(pool));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let acc = acc.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        acc.append(vec![Metric::counter(format!("m{t}_{i}"), 1)]);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(acc.len(), 800);
    }

    #[test]
    fn pool_reuse_keeps_capacity() {
        let pool = BatchPool::new();
        let mut batch = pool.acquire();
        batch.items.extend((0..64).map(|i| Metric::counter(format!("m{i}"), 1)));
        let cap = batch.capacity();
        assert!(cap >= 64);

        pool.release(batch);
        let again = pool.acquire();
        assert_eq!(again.len(), 0);
        assert_eq!(again.capacity(), cap);
    }
}
