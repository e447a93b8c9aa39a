//! Lazily materialized, replayable record collections.
//!
//! A [`Foundset`] wraps a one-pass source of items (decoded records of a
//! find/list result, or the related records of one portal). Items are pulled
//! from the source only when iteration or indexing reaches them and are kept
//! in a cache, so the collection can be iterated any number of times without
//! re-decoding. Cache, completion flag and source cursor live together in one
//! mutex-guarded state shared by every handle and iterator of the collection;
//! the source is therefore never advanced by two consumers at once.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::record::Record;

type Source<T> = Box<dyn Iterator<Item = T> + Send>;

struct FoundsetState<T> {
    source: Option<Source<T>>,
    cache: Vec<T>,
    complete: bool,
}

impl<T> FoundsetState<T> {
    /// Pulls one item from the source into the cache. Returns false once drained.
    fn pull(&mut self) -> bool {
        if self.complete {
            return false;
        }
        match self.source.as_mut().and_then(Iterator::next) {
            Some(item) => {
                self.cache.push(item);
                true
            }
            None => {
                self.complete = true;
                self.source = None;
                tracing::trace!(records = self.cache.len(), "foundset source drained");
                false
            }
        }
    }

    fn fill_to(&mut self, len: usize) {
        while self.cache.len() < len && self.pull() {}
    }
}

/// A cached view over a one-pass sequence of records.
///
/// Cloning a `Foundset` yields another handle to the same collection.
pub struct Foundset<T = Record> {
    state: Arc<Mutex<FoundsetState<T>>>,
    info: Arc<Map<String, Value>>,
}

impl<T> Foundset<T> {
    pub fn new<I>(source: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self::with_info(source, Map::new())
    }

    /// Builds a foundset carrying the `dataInfo` block the server sent for this result.
    pub fn with_info<I>(source: I, info: Map<String, Value>) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self {
            state: Arc::new(Mutex::new(FoundsetState {
                source: Some(Box::new(source.into_iter())),
                cache: Vec::new(),
                complete: false,
            })),
            info: Arc::new(info),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FoundsetState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Result metadata (found count, table, ...); empty when the server sent none.
    pub fn info(&self) -> &Map<String, Value> {
        &self.info
    }

    /// True once the source has been fully consumed, by any access pattern.
    pub fn is_complete(&self) -> bool {
        self.lock().complete
    }

    /// Number of items realized so far.
    pub fn cached_len(&self) -> usize {
        self.lock().cache.len()
    }

    pub fn iter(&self) -> Iter<T> {
        Iter {
            state: Arc::clone(&self.state),
            position: 0,
        }
    }
}

impl<T: Clone> Foundset<T> {
    /// Returns the item at `index`, consuming the source only as far as needed.
    pub fn get(&self, index: usize) -> Result<T> {
        let mut state = self.lock();
        state.fill_to(index.saturating_add(1));
        state
            .cache
            .get(index)
            .cloned()
            .ok_or(Error::IndexOutOfRange {
                index,
                len: state.cache.len(),
            })
    }

    pub fn first(&self) -> Option<T> {
        self.get(0).ok()
    }

    /// Drains the source and returns every item.
    pub fn to_vec(&self) -> Vec<T> {
        let mut state = self.lock();
        state.fill_to(usize::MAX);
        state.cache.clone()
    }
}

impl<T> Clone for Foundset<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            info: Arc::clone(&self.info),
        }
    }
}

impl<T> PartialEq for Foundset<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl<T> fmt::Debug for Foundset<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Foundset")
            .field("consumed_records", &state.cache.len())
            .field("is_complete", &state.complete)
            .field("info", &self.info)
            .finish()
    }
}

impl<T> fmt::Display for Foundset<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        write!(
            f,
            "<Foundset consumed_records={} is_complete={}>",
            state.cache.len(),
            state.complete
        )
    }
}

/// Iterator over a [`Foundset`]: replays the cache, then continues from the source.
pub struct Iter<T> {
    state: Arc<Mutex<FoundsetState<T>>>,
    position: usize,
}

impl<T: Clone> Iterator for Iter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.fill_to(self.position + 1);
        let item = state.cache.get(self.position).cloned()?;
        self.position += 1;
        Some(item)
    }
}

impl<'a, T: Clone> IntoIterator for &'a Foundset<T> {
    type Item = T;
    type IntoIter = Iter<T>;

    fn into_iter(self) -> Iter<T> {
        self.iter()
    }
}
