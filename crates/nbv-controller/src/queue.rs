use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use nbv_core::JobKey;

/// Keyed work queue: a key is queued at most once, and a key being processed is not handed to
/// a second worker. Re-adds during processing are parked until `done`.
#[derive(Default)]
pub struct WorkQueue {
    state: Mutex<State>,
    ready: Condvar,
}

#[derive(Default)]
struct State {
    queue: VecDeque<JobKey>,
    dirty: HashSet<JobKey>,
    processing: HashSet<JobKey>,
    delayed: BTreeMap<JobKey, Instant>,
    shutting_down: bool,
}

impl State {
    fn enqueue(&mut self, key: JobKey) -> bool {
        if !self.dirty.insert(key.clone()) {
            return false;
        }
        if !self.processing.contains(&key) {
            self.queue.push_back(key);
        }
        true
    }

    /// Moves due delayed keys into the queue; returns the wait until the next one.
    fn promote(&mut self, now: Instant) -> Option<Duration> {
        let due: Vec<JobKey> = self.delayed.iter().filter(|(_, at)| **at <= now).map(|(k, _)| k.clone()).collect();
        for key in due {
            self.delayed.remove(&key);
            self.enqueue(key);
        }
        self.delayed.values().min().map(|at| at.saturating_duration_since(now))
    }
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, key: JobKey) {
        let mut state = self.lock();
        if state.shutting_down {
            return;
        }
        state.delayed.remove(&key);
        if state.enqueue(key) {
            self.ready.notify_one();
        }
    }

    /// Queues the key after `delay`. An earlier pending deadline for the same key wins.
    pub fn add_after(&self, key: JobKey, delay: Duration) {
        if delay.is_zero() {
            return self.add(key);
        }
        let mut state = self.lock();
        if state.shutting_down || state.dirty.contains(&key) {
            return;
        }
        let at = Instant::now() + delay;
        let entry = state.delayed.entry(key).or_insert(at);
        if at < *entry {
            *entry = at;
        }
        self.ready.notify_all();
    }

    /// Blocks until a key is ready. `None` once the queue is shut down.
    pub fn get(&self) -> Option<JobKey> {
        let mut state = self.lock();
        loop {
            if state.shutting_down {
                return None;
            }
            let next_due = state.promote(Instant::now());
            if let Some(key) = state.queue.pop_front() {
                state.dirty.remove(&key);
                state.processing.insert(key.clone());
                return Some(key);
            }
            state = match next_due {
                Some(wait) => self.ready.wait_timeout(state, wait).map(|(s, _)| s).unwrap_or_else(|e| e.into_inner().0),
                None => self.ready.wait(state).unwrap_or_else(|e| e.into_inner()),
            };
        }
    }

    /// Non-blocking `get`, for driving the queue step by step.
    pub fn try_get(&self) -> Option<JobKey> {
        let mut state = self.lock();
        state.promote(Instant::now());
        let key = state.queue.pop_front()?;
        state.dirty.remove(&key);
        state.processing.insert(key.clone());
        Some(key)
    }

    /// Marks processing finished; a key re-added meanwhile goes back on the queue.
    pub fn done(&self, key: &JobKey) {
        let mut state = self.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) {
            state.queue.push_back(key.clone());
            self.ready.notify_one();
        }
    }

    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.ready.notify_all();
    }

    /// Keys ready now (delayed keys excluded).
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn delayed(&self) -> usize {
        self.lock().delayed.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
