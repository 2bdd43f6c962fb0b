//! Inbound message deduplication.
//!
//! WhatsApp redelivers a webhook until it gets a 2xx, so the same message id
//! can arrive more than once. `seen()` is an atomic check-and-mark.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

/// Remembers processed message ids.
pub struct MessageDeduplicator {
    seen: Mutex<HashMap<String, Instant>>,
    /// Ids older than this are forgotten. `None` keeps ids forever.
    retention: Option<Duration>,
}

impl MessageDeduplicator {
    /// Keep every id for the process lifetime.
    pub fn unbounded() -> Self {
        Self::with_retention(None)
    }

    pub fn with_retention(retention: Option<Duration>) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            retention,
        }
    }

    /// Returns `true` if `message_id` was already seen; otherwise marks it and returns `false`.
    pub fn seen(&self, message_id: &str) -> bool {
        self.seen_at(message_id, Instant::now())
    }

    fn seen_at(&self, message_id: &str, now: Instant) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(retention) = self.retention {
            let before = seen.len();
            seen.retain(|_, at| now.saturating_duration_since(*at) < retention);
            let pruned = before - seen.len();
            if pruned > 0 {
                debug!(pruned, "Pruned expired message ids");
            }
        }

        if seen.contains_key(message_id) {
            return true;
        }
        seen.insert(message_id.to_string(), now);
        false
    }

    /// Number of ids currently remembered.
    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MessageDeduplicator {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn first_false_then_true() {
        let dedup = MessageDeduplicator::unbounded();
        assert!(!dedup.seen("wamid.1"));
        assert!(dedup.seen("wamid.1"));
        assert!(dedup.seen("wamid.1"));
        assert!(!dedup.seen("wamid.2"));
        assert_eq!(dedup.len(), 2);
    }

    #[test]
    fn retention_forgets_old_ids() {
        let dedup = MessageDeduplicator::with_retention(Some(Duration::from_secs(60)));
        let start = Instant::now();
        assert!(!dedup.seen_at("a", start));
        assert!(dedup.seen_at("a", start + Duration::from_secs(59)));
        assert!(!dedup.seen_at("a", start + Duration::from_secs(61)));
    }

    #[test]
    fn unbounded_never_forgets() {
        let dedup = MessageDeduplicator::unbounded();
        let start = Instant::now();
        assert!(!dedup.seen_at("a", start));
        assert!(dedup.seen_at("a", start + Duration::from_secs(60 * 60 * 24 * 365)));
    }

    #[test]
    fn concurrent_checks_admit_exactly_one() {
        let dedup = Arc::new(MessageDeduplicator::unbounded());
        let admitted = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..16)
            .map(|_| {
                let dedup = Arc::clone(&dedup);
                let admitted = Arc::clone(&admitted);
                std::thread::spawn(move || {
                    if !dedup.seen("wamid.same") {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(admitted.load(Ordering::SeqCst), 1);
    }
}
