//! Rotating API key pool for one provider.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Ordered credentials plus a rotating cursor.
///
/// The cursor only advances on quota/auth failures, so a healthy key keeps
/// serving every request. The cursor position survives across synthesize
/// calls: once a key's quota is burned, later calls start on the next one.
#[derive(Debug, Default)]
pub struct ApiKeyPool {
    keys: Vec<String>,
    cursor: AtomicUsize,
}

impl ApiKeyPool {
    #[must_use]
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys,
            cursor: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The key under the cursor, if any.
    #[must_use]
    pub fn current(&self) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }
        let idx = self.cursor.load(Ordering::Relaxed) % self.keys.len();
        Some(&self.keys[idx])
    }

    /// Rotate to the next key, wrapping. Returns the new cursor position.
    pub fn advance(&self) -> usize {
        if self.keys.is_empty() {
            return 0;
        }
        let next = (self.cursor.load(Ordering::Relaxed) + 1) % self.keys.len();
        self.cursor.store(next, Ordering::Relaxed);
        next
    }

    /// Current cursor position (for logs and tests).
    #[must_use]
    pub fn cursor(&self) -> usize {
        if self.keys.is_empty() {
            0
        } else {
            self.cursor.load(Ordering::Relaxed) % self.keys.len()
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn pool(n: usize) -> ApiKeyPool {
        ApiKeyPool::new((0..n).map(|i| format!("key-{i}")).collect())
    }

    #[test]
    fn empty_pool_has_no_current_key() {
        let p = ApiKeyPool::new(Vec::new());
        assert!(p.is_empty());
        assert!(p.current().is_none());
        assert_eq!(p.advance(), 0);
    }

    #[test]
    fn advance_wraps() {
        let p = pool(3);
        assert_eq!(p.current().unwrap(), "key-0");
        assert_eq!(p.advance(), 1);
        assert_eq!(p.advance(), 2);
        assert_eq!(p.advance(), 0);
        assert_eq!(p.current().unwrap(), "key-0");
    }

    #[test]
    fn cursor_persists_between_reads() {
        let p = pool(2);
        p.advance();
        assert_eq!(p.cursor(), 1);
        assert_eq!(p.current().unwrap(), "key-1");
        assert_eq!(p.current().unwrap(), "key-1");
    }
}
