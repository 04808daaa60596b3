//! Grouping decoded entries by URL

use crate::models::{DecodedEntry, UrlGroup};
use std::collections::HashMap;
use std::ops::ControlFlow;

/// Folds decoded entries into per-URL groups, capped at `limit` URLs.
///
/// Groups keep first-seen order. Once the limit-th distinct URL has been
/// created, [`UrlAggregator::push`] breaks and ignores everything after,
/// including further keys for URLs already collected.
#[derive(Debug)]
pub struct UrlAggregator {
    limit: usize,
    groups: Vec<UrlGroup>,
    index: HashMap<String, usize>,
}

impl UrlAggregator {
    pub fn new(limit: usize) -> Self {
        UrlAggregator {
            limit,
            groups: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn push(&mut self, entry: DecodedEntry) -> ControlFlow<()> {
        if self.is_full() {
            return ControlFlow::Break(());
        }

        match self.index.get(&entry.url) {
            Some(&i) => self.groups[i].absorb(entry),
            None => {
                self.index.insert(entry.url.clone(), self.groups.len());
                let mut group = UrlGroup::new(entry.url.clone());
                group.absorb(entry);
                self.groups.push(group);
            }
        }

        if self.is_full() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    pub fn is_full(&self) -> bool {
        self.groups.len() >= self.limit
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn finish(self) -> Vec<UrlGroup> {
        self.groups
    }
}

/// Group `entries` by URL, keeping at most `limit` URLs
pub fn build_url_listing<I>(entries: I, limit: usize) -> Vec<UrlGroup>
where
    I: IntoIterator<Item = DecodedEntry>,
{
    let mut aggregator = UrlAggregator::new(limit);
    for entry in entries {
        if aggregator.push(entry).is_break() {
            break;
        }
    }
    aggregator.finish()
}
