// ABOUTME: Bounded LRU memo of computed view stacks, keyed by tape id.
// ABOUTME: Resumes from a cached parent tape when a tape only appends steps to it.

use std::num::NonZeroUsize;
use std::sync::Arc;

use indexmap::IndexMap;
use ulid::Ulid;

use crate::stack::{ReplayError, TapeViewStack};
use crate::step::Step;
use crate::tape::Tape;

pub const DEFAULT_CAPACITY: usize = 64;

/// Counters describing how the cache has been used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Misses served by replaying only the steps appended to a cached parent.
    pub resumed: u64,
    pub evictions: u64,
}

struct CacheEntry {
    steps: Arc<[Step]>,
    stack: Arc<TapeViewStack>,
}

impl CacheEntry {
    fn holds(&self, tape: &Tape) -> bool {
        Arc::ptr_eq(&self.steps, &tape.shared_steps()) || self.steps[..] == tape.steps()[..]
    }
}

/// Memoizes [`TapeViewStack::compute`] per tape.
///
/// Tapes never change after construction and every edit mints a new id.
/// Ids can still be reused by deserializing the same document twice, so a hit
/// only counts when the cached steps match the tape's. Entries are kept in
/// recency order; the least recently used one is evicted once `capacity` is
/// reached.
pub struct ViewStackCache {
    capacity: NonZeroUsize,
    entries: IndexMap<Ulid, CacheEntry>,
    stats: CacheStats,
}

impl Default for ViewStackCache {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    }
}

impl ViewStackCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            entries: IndexMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// Return the stack for `tape`, computing and caching it on a miss.
    pub fn compute(&mut self, tape: &Tape) -> Result<Arc<TapeViewStack>, ReplayError> {
        let id = tape.id();
        if let Some(entry) = self.entries.shift_remove(&id) {
            if entry.holds(tape) {
                self.stats.hits += 1;
                tracing::debug!(tape_id = %id, "view stack cache hit");
                let stack = Arc::clone(&entry.stack);
                self.entries.insert(id, entry);
                return Ok(stack);
            }
            tracing::warn!(tape_id = %id, "cached stack was computed for different steps, recomputing");
        }

        self.stats.misses += 1;
        let stack = match self.resume_from_parent(tape)? {
            Some(stack) => stack,
            None => {
                tracing::debug!(tape_id = %id, steps = tape.len(), "view stack cache miss");
                TapeViewStack::compute(tape)?
            }
        };

        let stack = Arc::new(stack);
        self.insert(id, tape.shared_steps(), Arc::clone(&stack));
        Ok(stack)
    }

    fn resume_from_parent(&mut self, tape: &Tape) -> Result<Option<TapeViewStack>, ReplayError> {
        let Some(parent_id) = tape.parent_id() else {
            return Ok(None);
        };
        let Some(position) = self.entries.get_index_of(&parent_id) else {
            return Ok(None);
        };
        // a parent being extended counts as a use
        let last = self.entries.len() - 1;
        self.entries.move_index(position, last);
        let parent = &self.entries[last];

        let prefix = parent.steps.len();
        if prefix > tape.len() || tape.steps()[..prefix] != parent.steps[..] {
            tracing::debug!(
                tape_id = %tape.id(),
                parent_id = %parent_id,
                "parent tape is not a prefix, replaying in full"
            );
            return Ok(None);
        }

        let mut stack = TapeViewStack::clone(&parent.stack);
        stack.apply_steps(&tape.steps()[prefix..], prefix)?;
        self.stats.resumed += 1;
        tracing::debug!(
            tape_id = %tape.id(),
            parent_id = %parent_id,
            replayed = tape.len() - prefix,
            "resumed view stack from parent tape"
        );
        Ok(Some(stack))
    }

    fn insert(&mut self, id: Ulid, steps: Arc<[Step]>, stack: Arc<TapeViewStack>) {
        while self.entries.len() >= self.capacity.get() {
            match self.entries.shift_remove_index(0) {
                Some((evicted, _)) => {
                    self.stats.evictions += 1;
                    tracing::debug!(tape_id = %evicted, "evicted view stack");
                }
                None => break,
            }
        }
        self.entries.insert(id, CacheEntry { steps, stack });
    }

    /// Drop the entry for `id`. Returns whether one was present.
    pub fn invalidate(&mut self, id: Ulid) -> bool {
        self.entries.shift_remove(&id).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn contains(&self, id: Ulid) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
