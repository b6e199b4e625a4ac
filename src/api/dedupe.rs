use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Remembers recent add requests so a double-submitted form does not store
/// the same memory twice.
///
/// Keyed by a hash of the trimmed content and the sorted tag list. Entries
/// older than `window` are evicted on every check.
#[derive(Debug)]
pub struct RecentRequests {
    seen: Mutex<HashMap<u64, Instant>>,
    window: Duration,
}

impl RecentRequests {
    pub fn new(window: Duration) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            window,
        }
    }

    pub fn fingerprint(content: &str, tags: &[String]) -> u64 {
        let mut sorted: Vec<&str> = tags.iter().map(|t| t.trim()).collect();
        sorted.sort_unstable();
        let mut hasher = DefaultHasher::new();
        content.trim().hash(&mut hasher);
        sorted.hash(&mut hasher);
        hasher.finish()
    }

    /// Record the request and return `true`, or `false` if an identical
    /// request was seen within the window.
    pub fn check_and_record(&self, content: &str, tags: &[String]) -> bool {
        self.check_at(Self::fingerprint(content, tags), Instant::now())
    }

    /// Forget a request, e.g. after the add it guarded failed.
    pub fn forget(&self, content: &str, tags: &[String]) {
        let key = Self::fingerprint(content, tags);
        let mut seen = self.seen.lock().unwrap_or_else(|p| p.into_inner());
        seen.remove(&key);
    }

    fn check_at(&self, key: u64, now: Instant) -> bool {
        if self.window.is_zero() {
            return true;
        }
        let mut seen = self.seen.lock().unwrap_or_else(|p| p.into_inner());
        seen.retain(|_, at| now.duration_since(*at) < self.window);

        if seen.contains_key(&key) {
            return false;
        }
        seen.insert(key, now);
        true
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
