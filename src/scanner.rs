//! Cursor-based key scanning
//!
//! A [`KeyScan`] walks the store once with `SCAN MATCH`, one page per call.
//! It is lazy and not restartable: after the store returns cursor 0, after a
//! failed or timed-out call, or once the deadline passes, every further call
//! yields `None`. Starting over means creating a new scan.

use crate::error::{CacheAdminError, Result};
use crate::key_codec::KeyCodec;
use crate::models::DecodedEntry;
use crate::store::StoreConnection;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Factory for scans sharing one codec and timeout policy
#[derive(Debug, Clone)]
pub struct KeyScanner {
    codec: KeyCodec,
    scan_timeout: Option<Duration>,
}

impl KeyScanner {
    pub fn new(codec: KeyCodec) -> Self {
        KeyScanner {
            codec,
            scan_timeout: None,
        }
    }

    /// Bound each individual store round trip
    pub fn with_scan_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.scan_timeout = timeout;
        self
    }

    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    /// Start a new pass over keys matching `pattern`
    pub fn scan<'a, C>(
        &'a self,
        conn: &'a mut C,
        pattern: impl Into<String>,
        batch_size: usize,
    ) -> KeyScan<'a, C>
    where
        C: StoreConnection + ?Sized,
    {
        KeyScan {
            scanner: self,
            conn,
            pattern: pattern.into(),
            batch_size,
            cursor: 0,
            bounds: CallBounds {
                per_call: self.scan_timeout,
                deadline: None,
            },
            finished: false,
            error: None,
        }
    }

    /// Delete `keys` outside of any scan, under the per-call timeout and an
    /// optional overall budget
    pub async fn delete<C>(
        &self,
        conn: &mut C,
        keys: &[String],
        deadline: Option<Duration>,
    ) -> Result<u64>
    where
        C: StoreConnection + ?Sized,
    {
        if keys.is_empty() {
            return Ok(0);
        }
        let bounds = CallBounds {
            per_call: self.scan_timeout,
            deadline: deadline.map(|d| (Instant::now() + d, d.as_millis() as u64)),
        };
        bounds.run(conn.delete(keys)).await
    }

    /// Scan `pattern` and decode every key of the strict grammar, stopping
    /// as soon as `max_urls` distinct URLs have been produced.
    ///
    /// Keys outside the grammar (for example ones without a device suffix)
    /// are skipped. Store failures end the scan early; entries gathered so
    /// far are returned.
    pub async fn scan_matching<C>(
        &self,
        conn: &mut C,
        pattern: &str,
        batch_size: usize,
        max_urls: usize,
        deadline: Option<Duration>,
    ) -> Vec<DecodedEntry>
    where
        C: StoreConnection + ?Sized,
    {
        let mut entries = Vec::new();
        if max_urls == 0 {
            return entries;
        }

        let mut urls: HashSet<String> = HashSet::new();
        let mut scan = self.scan(conn, pattern, batch_size).with_deadline(deadline);

        while let Some(batch) = scan.next_entries().await {
            for entry in batch {
                urls.insert(entry.url.clone());
                entries.push(entry);
                if urls.len() >= max_urls {
                    debug!("Reached {} distinct URLs, stopping scan", max_urls);
                    return entries;
                }
            }
        }

        entries
    }
}

/// One in-progress pass over the store
pub struct KeyScan<'a, C: ?Sized> {
    scanner: &'a KeyScanner,
    conn: &'a mut C,
    pattern: String,
    batch_size: usize,
    cursor: u64,
    bounds: CallBounds,
    finished: bool,
    error: Option<CacheAdminError>,
}

impl<'a, C> KeyScan<'a, C>
where
    C: StoreConnection + ?Sized,
{
    /// Stop the scan once `budget` has elapsed from now
    pub fn with_deadline(mut self, budget: Option<Duration>) -> Self {
        if let Some(budget) = budget {
            self.bounds.deadline = Some((Instant::now() + budget, budget.as_millis() as u64));
        }
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// True once the store reported completion or the scan was cut short
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Why the scan stopped early, if it did
    pub fn error(&self) -> Option<&CacheAdminError> {
        self.error.as_ref()
    }

    /// Whether the store walked every key without interruption
    pub fn completed(&self) -> bool {
        self.finished && self.error.is_none()
    }

    /// Next page of raw keys matching the pattern, unfiltered.
    ///
    /// Pages may be empty while the scan is still running.
    pub async fn next_keys(&mut self) -> Option<Vec<String>> {
        if self.finished {
            return None;
        }

        let result = self
            .bounds
            .run(self.conn.scan(&self.pattern, self.cursor, self.batch_size))
            .await;

        match result {
            Ok(page) => {
                debug!(
                    "SCAN {} cursor={} returned {} keys, next cursor {}",
                    self.pattern,
                    self.cursor,
                    page.keys.len(),
                    page.next_cursor
                );
                self.cursor = page.next_cursor;
                self.finished = page.is_last();
                Some(page.keys)
            }
            Err(e) => {
                warn!("SCAN {} failed, stopping: {}", self.pattern, e);
                self.finish_with(e);
                None
            }
        }
    }

    /// Next page of keys that satisfy the strict grammar, decoded
    pub async fn next_entries(&mut self) -> Option<Vec<DecodedEntry>> {
        let keys = self.next_keys().await?;
        let codec = self.scanner.codec();
        Some(
            keys.iter()
                .filter(|key| codec.matches_strict(key))
                .map(|key| codec.decode(key))
                .collect(),
        )
    }

    /// Delete keys over the scan's connection, under the same time bounds.
    ///
    /// A failed delete finishes the scan.
    pub async fn delete(&mut self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let result = self.bounds.run(self.conn.delete(keys)).await;
        if let Err(e) = &result {
            warn!("DEL of {} keys failed, stopping: {}", keys.len(), e);
            self.finish_with(e.clone());
        }
        result
    }

    fn finish_with(&mut self, error: CacheAdminError) {
        self.finished = true;
        self.error = Some(error);
    }
}

/// Time limits applied to every store round trip of one scan
#[derive(Debug, Clone, Copy, Default)]
struct CallBounds {
    per_call: Option<Duration>,
    /// Absolute deadline and the budget it was created from, in ms
    deadline: Option<(Instant, u64)>,
}

impl CallBounds {
    async fn run<T, F>(self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let mut limit = self.per_call;
        let mut deadline_ms = None;

        if let Some((deadline, budget_ms)) = self.deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(CacheAdminError::DeadlineExceeded(budget_ms));
            }
            if limit.map_or(true, |l| remaining < l) {
                limit = Some(remaining);
                deadline_ms = Some(budget_ms);
            }
        }

        let Some(limit) = limit else {
            return call.await;
        };

        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(match deadline_ms {
                Some(ms) => CacheAdminError::DeadlineExceeded(ms),
                None => CacheAdminError::Timeout(limit.as_millis() as u64),
            }),
        }
    }
}
