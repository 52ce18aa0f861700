use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Process-wide registry of named live-object categories.
///
/// Instrumented subsystems register a category once and keep the returned
/// [`CategoryCounter`] handle; every tracked object holds an RAII guard that
/// keeps its category's live count accurate. Counting is lock-free; the
/// registry mutex only guards registration order.
#[derive(Clone, Default)]
pub struct AllocationLedger {
    categories: Arc<Mutex<Vec<CategoryCounter>>>,
}

/// Ordered view of the ledger at one instant.
pub struct LedgerSnapshot {
    /// `(category, live count)` in first-registration order; zero-count
    /// categories are omitted, so keys come and go between snapshots.
    pub categories: Vec<(String, u64)>,
    pub live_total: u64,
}

impl AllocationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a category (or returns the existing handle for its name).
    pub fn register(&self, name: &str) -> CategoryCounter {
        let mut categories = self
            .categories
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = categories.iter().find(|c| c.name.as_ref() == name) {
            return existing.clone();
        }
        let counter = CategoryCounter {
            name: Arc::from(name),
            live: Arc::new(AtomicU64::new(0)),
        };
        categories.push(counter.clone());
        counter
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let categories = self
            .categories
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut ordered = Vec::new();
        let mut live_total = 0u64;
        for category in categories.iter() {
            let count = category.live.load(Ordering::Relaxed);
            live_total += count;
            if count > 0 {
                ordered.push((category.name.to_string(), count));
            }
        }
        LedgerSnapshot {
            categories: ordered,
            live_total,
        }
    }
}

/// Cheap cloneable handle to one category's live count.
#[derive(Clone)]
pub struct CategoryCounter {
    name: Arc<str>,
    live: Arc<AtomicU64>,
}

impl CategoryCounter {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn live(&self) -> u64 {
        self.live.load(Ordering::Relaxed)
    }

    /// Marks one object of this category live until the guard drops.
    pub fn track(&self) -> TrackedObject {
        self.live.fetch_add(1, Ordering::Relaxed);
        TrackedObject {
            live: Arc::clone(&self.live),
        }
    }
}

/// RAII guard pairing one increment with exactly one decrement.
pub struct TrackedObject {
    live: Arc<AtomicU64>,
}

impl Drop for TrackedObject {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::Relaxed);
    }
}
