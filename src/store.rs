//! In-memory registry of single-file results and batch jobs.
//!
//! Entries are kept so the download endpoints can serve exactly the text that
//! was displayed. Each map holds at most `capacity` entries; the oldest result
//! is evicted first, and only finished batches are ever evicted.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::error::{OcrError, OcrResult};
use crate::ocr::single::OcrOutput;
use crate::poller::BatchHandle;

pub const DEFAULT_CAPACITY: usize = 200;

/// Insertion-ordered map that forgets its oldest evictable entries.
struct Bounded<V> {
    entries: HashMap<Uuid, V>,
    order: VecDeque<Uuid>,
}

impl<V: Clone> Bounded<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, id: &Uuid) -> Option<V> {
        self.entries.get(id).cloned()
    }

    fn insert(&mut self, id: Uuid, value: V, capacity: usize, evictable: impl Fn(&V) -> bool) {
        self.entries.insert(id, value);
        self.order.push_back(id);

        let mut kept = VecDeque::with_capacity(self.order.len());
        while self.entries.len() > capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if oldest != id && self.entries.get(&oldest).is_some_and(&evictable) {
                self.entries.remove(&oldest);
                debug!("ResultStore: evicted {}", oldest);
            } else {
                kept.push_back(oldest);
            }
        }
        kept.append(&mut self.order);
        self.order = kept;
    }
}

#[derive(Clone)]
pub struct ResultStore {
    capacity: usize,
    results: Arc<RwLock<Bounded<Arc<OcrOutput>>>>,
    batches: Arc<RwLock<Bounded<BatchHandle>>>,
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ResultStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            results: Arc::new(RwLock::new(Bounded::new())),
            batches: Arc::new(RwLock::new(Bounded::new())),
        }
    }

    pub fn insert_result(&self, output: OcrOutput) -> Arc<OcrOutput> {
        let output = Arc::new(output);
        self.results
            .write()
            .unwrap()
            .insert(output.id, output.clone(), self.capacity, |_| true);
        debug!("ResultStore: stored result {} ({} chars)", output.id, output.text.len());
        output
    }

    pub fn result(&self, id: Uuid) -> OcrResult<Arc<OcrOutput>> {
        self.results
            .read()
            .unwrap()
            .get(&id)
            .ok_or(OcrError::NotFound {
                kind: "result",
                id: id.to_string(),
            })
    }

    /// Register a batch handle under a fresh local id.
    pub fn insert_batch(&self, handle: BatchHandle) -> Uuid {
        let id = Uuid::new_v4();
        self.batches
            .write()
            .unwrap()
            .insert(id, handle, self.capacity, |h| h.progress().phase.is_finished());
        id
    }

    pub fn batch(&self, id: Uuid) -> OcrResult<BatchHandle> {
        self.batches
            .read()
            .unwrap()
            .get(&id)
            .ok_or(OcrError::NotFound {
                kind: "batch",
                id: id.to_string(),
            })
    }
}
