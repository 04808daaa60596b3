//! In-process store
//!
//! Keeps keys in an ordered set and pages through them the way Redis `SCAN`
//! does: `COUNT` bounds the number of keys *examined* per call, `MATCH` is
//! applied afterwards, so pages can come back empty while the cursor is
//! still non-zero. Cursors remember the last examined key, so deleting keys
//! between calls never causes the remaining ones to be skipped.

use super::{CacheStore, StoreConnection};
use crate::error::{CacheAdminError, Result};
use crate::models::ScanPage;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Open SCAN cursors kept per store; the oldest are dropped beyond this
pub const MAX_OPEN_CURSORS: usize = 1024;

#[derive(Debug, Default)]
struct MemoryState {
    keys: BTreeSet<String>,
    cursors: BTreeMap<u64, String>,
    next_cursor_id: u64,
    unreachable: bool,
    scan_delay: Option<Duration>,
    scans_before_failure: Option<usize>,
    scan_calls: usize,
    delete_calls: usize,
}

/// Shared in-memory store; clones see the same keys
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let store = Self::new();
        store.insert_all(keys);
        store
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // Every critical section leaves the state consistent, so poisoning is ignored.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, key: impl Into<String>) {
        self.lock().keys.insert(key.into());
    }

    pub fn insert_all<I, K>(&self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut state = self.lock();
        state.keys.extend(keys.into_iter().map(Into::into));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.lock().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().keys.is_empty()
    }

    /// Snapshot of all keys in order
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys.iter().cloned().collect()
    }

    /// Make `connect` fail as if the server were down
    pub fn set_reachable(&self, reachable: bool) {
        self.lock().unreachable = !reachable;
    }

    /// Delay every SCAN call, to exercise timeouts
    pub fn set_scan_delay(&self, delay: Option<Duration>) {
        self.lock().scan_delay = delay;
    }

    /// Let `n` more SCAN calls succeed, then fail every following one
    pub fn fail_scans_after(&self, n: usize) {
        self.lock().scans_before_failure = Some(n);
    }

    pub fn scan_calls(&self) -> usize {
        self.lock().scan_calls
    }

    pub fn delete_calls(&self) -> usize {
        self.lock().delete_calls
    }

    /// Cursors handed out by SCAN and not yet resumed
    pub fn open_cursors(&self) -> usize {
        self.lock().cursors.len()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    type Connection = MemoryConnection;

    async fn connect(&self) -> Result<MemoryConnection> {
        if self.lock().unreachable {
            return Err(CacheAdminError::ConnectionError(
                "memory store is unreachable".to_string(),
            ));
        }
        Ok(MemoryConnection {
            store: self.clone(),
        })
    }
}

/// Connection handle onto a [`MemoryStore`]
#[derive(Debug)]
pub struct MemoryConnection {
    store: MemoryStore,
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn scan(&mut self, pattern: &str, cursor: u64, count: usize) -> Result<ScanPage> {
        let delay = self.store.lock().scan_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.store.lock();
        state.scan_calls += 1;

        if let Some(remaining) = state.scans_before_failure {
            if remaining == 0 {
                return Err(CacheAdminError::StoreError(
                    "simulated scan failure".to_string(),
                ));
            }
            state.scans_before_failure = Some(remaining - 1);
        }

        let start = if cursor == 0 {
            Bound::Unbounded
        } else {
            match state.cursors.remove(&cursor) {
                Some(last) => Bound::Excluded(last),
                None => {
                    return Err(CacheAdminError::StoreError(format!(
                        "invalid cursor {}",
                        cursor
                    )))
                }
            }
        };

        let count = count.max(1);
        let examined: Vec<String> = state
            .keys
            .range::<String, _>((start, Bound::Unbounded))
            .take(count)
            .cloned()
            .collect();

        let keys = examined
            .iter()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();

        let next_cursor = match examined.last() {
            Some(last) if examined.len() == count => {
                let more = state
                    .keys
                    .range::<String, _>((Bound::Excluded(last.clone()), Bound::Unbounded))
                    .next()
                    .is_some();
                if more {
                    state.next_cursor_id += 1;
                    let id = state.next_cursor_id;
                    state.cursors.insert(id, last.clone());
                    while state.cursors.len() > MAX_OPEN_CURSORS {
                        state.cursors.pop_first();
                    }
                    id
                } else {
                    0
                }
            }
            _ => 0,
        };

        Ok(ScanPage { keys, next_cursor })
    }

    async fn delete(&mut self, keys: &[String]) -> Result<u64> {
        let mut state = self.store.lock();
        state.delete_calls += 1;
        let removed = keys.iter().filter(|key| state.keys.remove(*key)).count();
        Ok(removed as u64)
    }
}

/// Redis glob matching: `*`, `?`, `[abc]`, `[^a-z]` and `\` escapes
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    match_from(&pattern, &text)
}

fn match_from(pattern: &[char], text: &[char]) -> bool {
    let (mut p, mut t) = (0, 0);
    while p < pattern.len() {
        match pattern[p] {
            '*' => {
                while p + 1 < pattern.len() && pattern[p + 1] == '*' {
                    p += 1;
                }
                if p + 1 == pattern.len() {
                    return true;
                }
                return (t..=text.len()).any(|start| match_from(&pattern[p + 1..], &text[start..]));
            }
            '?' => {
                if t >= text.len() {
                    return false;
                }
                t += 1;
                p += 1;
            }
            '[' => {
                if t >= text.len() {
                    return false;
                }
                let (matched, next) = match_class(pattern, p + 1, text[t]);
                if !matched {
                    return false;
                }
                t += 1;
                p = next;
            }
            c => {
                let (literal, next) = if c == '\\' && p + 1 < pattern.len() {
                    (pattern[p + 1], p + 2)
                } else {
                    (c, p + 1)
                };
                if t >= text.len() || text[t] != literal {
                    return false;
                }
                t += 1;
                p = next;
            }
        }
    }
    t == text.len()
}

/// Match `c` against the class starting at `p` (just after `[`).
/// Returns whether it matched and the index after the closing `]`.
fn match_class(pattern: &[char], mut p: usize, c: char) -> (bool, usize) {
    let negate = p < pattern.len() && pattern[p] == '^';
    if negate {
        p += 1;
    }

    let mut matched = false;
    while p < pattern.len() && pattern[p] != ']' {
        if pattern[p] == '\\' && p + 1 < pattern.len() {
            matched |= pattern[p + 1] == c;
            p += 2;
        } else if p + 2 < pattern.len() && pattern[p + 1] == '-' && pattern[p + 2] != ']' {
            let (lo, hi) = if pattern[p] <= pattern[p + 2] {
                (pattern[p], pattern[p + 2])
            } else {
                (pattern[p + 2], pattern[p])
            };
            matched |= lo <= c && c <= hi;
            p += 3;
        } else {
            matched |= pattern[p] == c;
            p += 1;
        }
    }

    // Skip the closing bracket if present
    let next = if p < pattern.len() { p + 1 } else { p };
    (matched != negate, next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("nginx-cache:*", "nginx-cache:httpGETa.comDesktop"));
        assert!(!glob_match("nginx-cache:*", "other:httpGETa.com"));
        assert!(glob_match("*example.com/a*", "p:httpsGETexample.com/aMobile"));
        assert!(glob_match("h?llo", "hello"));
        assert!(!glob_match("h?llo", "hllo"));
        assert!(glob_match("h[ae]llo", "hallo"));
        assert!(!glob_match("h[^e]llo", "hello"));
        assert!(glob_match("h[a-c]llo", "hbllo"));
        assert!(glob_match("a\\*b", "a*b"));
        assert!(!glob_match("a\\*b", "axb"));
        assert!(glob_match("q=\\[x\\]", "q=[x]"));
        assert!(glob_match("**", ""));
        assert!(glob_match("a*b*c", "aXbYc"));
        assert!(!glob_match("a*b*c", "aXbY"));
    }

    #[tokio::test]
    async fn test_scan_pages_until_cursor_zero() {
        let store = MemoryStore::with_keys((0..25).map(|i| format!("k:{:02}", i)));
        let mut conn = store.connect().await.unwrap();

        let mut cursor = 0;
        let mut seen = Vec::new();
        loop {
            let page = conn.scan("k:*", cursor, 10).await.unwrap();
            assert!(page.keys.len() <= 10);
            let last = page.is_last();
            seen.extend(page.keys);
            if last {
                break;
            }
            cursor = page.next_cursor;
        }
        assert_eq!(seen.len(), 25);
        assert_eq!(store.scan_calls(), 3);
    }

    #[tokio::test]
    async fn test_scan_count_limits_examined_keys() {
        let store = MemoryStore::with_keys(["a:1", "b:1", "b:2", "a:2"]);
        let mut conn = store.connect().await.unwrap();

        // Ordered: a:1 a:2 b:1 b:2 -> first page examines a:1 a:2 only
        let page = conn.scan("b:*", 0, 2).await.unwrap();
        assert!(page.keys.is_empty());
        assert_ne!(page.next_cursor, 0);

        let page = conn.scan("b:*", page.next_cursor, 2).await.unwrap();
        assert_eq!(page.keys, vec!["b:1", "b:2"]);
        assert_eq!(page.next_cursor, 0);
    }

    #[tokio::test]
    async fn test_delete_between_scans_does_not_skip() {
        let store = MemoryStore::with_keys((0..6).map(|i| format!("k{}", i)));
        let mut conn = store.connect().await.unwrap();

        let mut cursor = 0;
        let mut deleted = 0;
        loop {
            let page = conn.scan("*", cursor, 2).await.unwrap();
            deleted += conn.delete(&page.keys).await.unwrap();
            if page.is_last() {
                break;
            }
            cursor = page.next_cursor;
        }
        assert_eq!(deleted, 6);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_scans_do_not_accumulate_cursors() {
        let store = MemoryStore::with_keys((0..10).map(|i| format!("k{}", i)));
        let mut conn = store.connect().await.unwrap();

        for _ in 0..MAX_OPEN_CURSORS + 50 {
            let page = conn.scan("*", 0, 2).await.unwrap();
            assert_ne!(page.next_cursor, 0);
        }
        assert_eq!(store.open_cursors(), MAX_OPEN_CURSORS);

        // The newest cursor is still resumable
        let page = conn.scan("*", 0, 2).await.unwrap();
        let resumed = conn.scan("*", page.next_cursor, 2).await.unwrap();
        assert_eq!(resumed.keys, vec!["k2", "k3"]);
    }

    #[tokio::test]
    async fn test_finished_scan_leaves_no_cursor() {
        let store = MemoryStore::with_keys((0..5).map(|i| format!("k{}", i)));
        let mut conn = store.connect().await.unwrap();

        let mut cursor = 0;
        loop {
            let page = conn.scan("*", cursor, 2).await.unwrap();
            if page.is_last() {
                break;
            }
            cursor = page.next_cursor;
        }
        assert_eq!(store.open_cursors(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_store() {
        let store = MemoryStore::new();
        store.set_reachable(false);
        assert!(matches!(
            store.connect().await,
            Err(CacheAdminError::ConnectionError(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_cursor() {
        let store = MemoryStore::with_keys(["a"]);
        let mut conn = store.connect().await.unwrap();
        assert!(conn.scan("*", 42, 10).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_counts_existing_only() {
        let store = MemoryStore::with_keys(["a", "b"]);
        let mut conn = store.connect().await.unwrap();
        let n = conn
            .delete(&["a".to_string(), "zzz".to_string()])
            .await
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(store.delete_calls(), 1);
        assert_eq!(store.keys(), vec!["b"]);
    }
}
