use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use fulfil_core::{DomainError, DomainResult};
use fulfil_invoicing::InvoiceSequence;

/// Per-period counters.
///
/// The map lock is only held to find or create a period's counter; the
/// increment itself is a single `fetch_add`.
#[derive(Debug, Default)]
pub struct InMemoryInvoiceSequence {
    counters: RwLock<HashMap<String, Arc<AtomicU64>>>,
}

impl InMemoryInvoiceSequence {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, period: &str) -> DomainResult<Arc<AtomicU64>> {
        {
            let map = self
                .counters
                .read()
                .map_err(|_| DomainError::invariant("invoice sequence lock poisoned"))?;
            if let Some(c) = map.get(period) {
                return Ok(Arc::clone(c));
            }
        }

        let mut map = self
            .counters
            .write()
            .map_err(|_| DomainError::invariant("invoice sequence lock poisoned"))?;
        Ok(Arc::clone(map.entry(period.to_string()).or_default()))
    }
}

impl InvoiceSequence for InMemoryInvoiceSequence {
    fn next(&self, period: &str) -> DomainResult<u64> {
        let counter = self.counter(period)?;
        Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn periods_count_independently() {
        let seq = InMemoryInvoiceSequence::new();
        assert_eq!(seq.next("2026-03").unwrap(), 1);
        assert_eq!(seq.next("2026-03").unwrap(), 2);
        assert_eq!(seq.next("2026-04").unwrap(), 1);
    }

    #[test]
    fn concurrent_callers_never_share_a_value() {
        let seq = Arc::new(InMemoryInvoiceSequence::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let seq = Arc::clone(&seq);
                thread::spawn(move || {
                    (0..50)
                        .map(|_| seq.next("2026-03").unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for v in h.join().unwrap() {
                assert!(seen.insert(v), "duplicate sequence value {v}");
            }
        }
        assert_eq!(seen.len(), 400);
        assert_eq!(seen.iter().max(), Some(&400));
    }
}
