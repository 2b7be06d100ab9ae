//! Authentication vector cache
//!
//! Vectors returned by the HSS beyond what a caller needed are kept per
//! subscriber and handed out on later requests. Each subscriber's bundle
//! sits in a map and in a binary min-heap ordered by last use; every entry
//! records its heap position so touched entries can be repositioned and
//! arbitrary entries removed in O(log n). A background task periodically
//! drops bundles not used within the TTL.
//!
//! A bundle with no vectors left is never stored.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::types::AuthenticationAnswer;

/// Default interval between garbage collection passes
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default lifetime of an untouched bundle
pub const DEFAULT_TTL: Duration = Duration::from_secs(3 * 60 * 60);

struct CacheEntry {
    answer: AuthenticationAnswer,
    last_used: Instant,
    heap_index: usize,
}

/// Subscriber bundles indexed by id and by last use
#[derive(Default)]
struct CacheIndex {
    entries: HashMap<String, CacheEntry>,
    heap: Vec<String>,
}

impl CacheIndex {
    fn last_used(&self, heap_index: usize) -> Instant {
        self.entries[&self.heap[heap_index]].last_used
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        if let Some(e) = self.entries.get_mut(&self.heap[a]) {
            e.heap_index = a;
        }
        if let Some(e) = self.entries.get_mut(&self.heap[b]) {
            e.heap_index = b;
        }
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.last_used(i) >= self.last_used(parent) {
                break;
            }
            self.swap(i, parent);
            i = parent;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * i + 1;
            let right = left + 1;
            let mut smallest = i;
            if left < len && self.last_used(left) < self.last_used(smallest) {
                smallest = left;
            }
            if right < len && self.last_used(right) < self.last_used(smallest) {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            self.swap(i, smallest);
            i = smallest;
        }
    }

    fn fix(&mut self, i: usize) {
        self.sift_up(i);
        self.sift_down(i);
    }

    fn insert(&mut self, answer: AuthenticationAnswer, now: Instant) {
        let key = answer.user_name.clone();
        self.remove(&key);

        let heap_index = self.heap.len();
        self.heap.push(key.clone());
        self.entries.insert(
            key,
            CacheEntry {
                answer,
                last_used: now,
                heap_index,
            },
        );
        self.sift_up(heap_index);
    }

    fn remove(&mut self, key: &str) -> Option<AuthenticationAnswer> {
        let i = self.entries.get(key)?.heap_index;
        let last = self.heap.len() - 1;
        if i != last {
            self.swap(i, last);
        }
        self.heap.pop();
        let entry = self.entries.remove(key)?;
        if i < self.heap.len() {
            self.fix(i);
        }
        Some(entry.answer)
    }

    fn touch(&mut self, key: &str, now: Instant) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.last_used = now;
            let i = entry.heap_index;
            self.fix(i);
        }
    }

    /// Pop every bundle last used before `deadline`
    fn evict_older_than(&mut self, deadline: Instant) -> usize {
        let mut evicted = 0;
        while let Some(oldest) = self.heap.first() {
            if self.entries[oldest].last_used >= deadline {
                break;
            }
            let key = oldest.clone();
            self.remove(&key);
            evicted += 1;
        }
        evicted
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.heap.clear();
    }
}

/// Process-wide authentication vector cache
pub struct VectorCache {
    index: Mutex<CacheIndex>,
    gc_interval: Duration,
    ttl: Duration,
    gc_task: Mutex<Option<JoinHandle<()>>>,
}

impl VectorCache {
    /// Cache without background collection
    ///
    /// A zero `gc_interval` or `ttl` falls back to its default; a TTL below
    /// the collection interval is raised to it.
    pub fn new(gc_interval: Duration, ttl: Duration) -> Self {
        let gc_interval = if gc_interval.is_zero() { DEFAULT_GC_INTERVAL } else { gc_interval };
        let ttl = if ttl.is_zero() { DEFAULT_TTL } else { ttl };
        let ttl = ttl.max(gc_interval);

        Self {
            index: Mutex::new(CacheIndex::default()),
            gc_interval,
            ttl,
            gc_task: Mutex::new(None),
        }
    }

    /// Cache with a garbage collection task on the current runtime
    ///
    /// The task stops once the returned cache is dropped.
    pub fn start(gc_interval: Duration, ttl: Duration) -> Arc<Self> {
        let cache = Arc::new(Self::new(gc_interval, ttl));
        let weak = Arc::downgrade(&cache);
        let handle = tokio::spawn(run_gc(weak, cache.gc_interval));
        *lock(&cache.gc_task) = Some(handle);
        log::info!(
            "Vector cache started (gc interval {:?}, ttl {:?})",
            cache.gc_interval,
            cache.ttl
        );
        cache
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn gc_interval(&self) -> Duration {
        self.gc_interval
    }

    /// Take up to `needed` cached vectors for `user_name`
    ///
    /// When the bundle holds no more than `needed` vectors it is returned
    /// whole and removed; otherwise the first `needed` are split off and the
    /// rest stay cached.
    pub fn get(&self, user_name: &str, needed: usize) -> Option<AuthenticationAnswer> {
        let mut index = lock(&self.index);
        let entry = index.entries.get_mut(user_name)?;

        if entry.answer.sip_auth_vectors.len() <= needed {
            return index.remove(user_name);
        }

        let rest = entry.answer.sip_auth_vectors.split_off(needed);
        let taken = std::mem::replace(&mut entry.answer.sip_auth_vectors, rest);
        let mut answer = entry.answer.clone();
        answer.sip_auth_vectors = taken;

        index.touch(user_name, Instant::now());
        Some(answer)
    }

    /// Return the first `needed` vectors of `answer` and cache the rest
    ///
    /// Any bundle already cached for the subscriber is replaced. Nothing is
    /// cached when there is no remainder or the answer names no subscriber.
    pub fn put(&self, mut answer: AuthenticationAnswer, needed: usize) -> AuthenticationAnswer {
        if answer.user_name.is_empty() || answer.sip_auth_vectors.len() <= needed {
            return answer;
        }

        let rest = answer.sip_auth_vectors.split_off(needed);
        let mut cached = answer.clone();
        cached.sip_auth_vectors = rest;
        lock(&self.index).insert(cached, Instant::now());

        answer
    }

    /// Evict the bundle for `user_name`
    pub fn remove(&self, user_name: &str) -> Option<AuthenticationAnswer> {
        lock(&self.index).remove(user_name)
    }

    /// Evict everything
    pub fn clear_all(&self) {
        lock(&self.index).clear();
    }

    /// Number of cached subscribers
    pub fn len(&self) -> usize {
        lock(&self.index).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run one garbage collection pass
    pub fn collect_garbage(&self) -> usize {
        let now = Instant::now();
        match now.checked_sub(self.ttl) {
            Some(deadline) => lock(&self.index).evict_older_than(deadline),
            None => 0,
        }
    }

    /// Stop the garbage collection task
    pub fn shutdown(&self) {
        if let Some(handle) = lock(&self.gc_task).take() {
            handle.abort();
        }
    }
}

impl Drop for VectorCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_gc(cache: Weak<VectorCache>, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;
        let Some(cache) = cache.upgrade() else { break };
        let evicted = cache.collect_garbage();
        if evicted > 0 {
            log::debug!("Vector cache evicted {} expired bundles", evicted);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
