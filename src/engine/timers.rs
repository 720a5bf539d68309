// src/engine/timers.rs

/// Revocable handle for one deferred event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

/// Handles of one phase (intro, beeps). Cancelling the set revokes every
/// event in it that has not been dispatched yet.
#[derive(Debug, Default)]
pub struct TimerSet {
    handles: Vec<TimerHandle>,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: TimerHandle) {
        self.handles.push(handle);
    }

    pub fn contains(&self, handle: TimerHandle) -> bool {
        self.handles.contains(&handle)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

struct Entry<E> {
    handle: TimerHandle,
    due: f64,
    event: E,
}

/// Deferred events keyed to audio-clock time.
///
/// Nothing fires on its own: the owner calls [`TimerQueue::drain_due`] from its
/// tick and gets the due events back in time order.
pub struct TimerQueue<E> {
    next: u64,
    entries: Vec<Entry<E>>,
}

impl<E> Default for TimerQueue<E> {
    fn default() -> Self {
        Self {
            next: 0,
            entries: Vec::new(),
        }
    }
}

impl<E> TimerQueue<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due: f64, event: E) -> TimerHandle {
        self.next += 1;
        let handle = TimerHandle(self.next);
        self.entries.push(Entry { handle, due, event });
        handle
    }

    /// Schedules `event` and records the handle in `set`.
    pub fn schedule_in(&mut self, set: &mut TimerSet, due: f64, event: E) -> TimerHandle {
        let handle = self.schedule(due, event);
        set.insert(handle);
        handle
    }

    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.handle != handle);
        self.entries.len() != before
    }

    /// Revokes every pending event of `set` in one step and empties the set.
    /// Returns how many were still pending.
    pub fn cancel_set(&mut self, set: &mut TimerSet) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !set.handles.contains(&e.handle));
        set.handles.clear();
        before - self.entries.len()
    }

    /// Removes and returns every event due at or before `horizon`, earliest first.
    /// Events due at the same instant keep their scheduling order.
    pub fn drain_due(&mut self, horizon: f64) -> Vec<(f64, E)> {
        let mut due = Vec::new();
        let mut i = 0;
        while i < self.entries.len() {
            if self.entries[i].due <= horizon {
                due.push(self.entries.swap_remove(i));
            } else {
                i += 1;
            }
        }
        due.sort_by(|a, b| a.due.total_cmp(&b.due).then(a.handle.cmp(&b.handle)));
        due.into_iter().map(|e| (e.due, e.event)).collect()
    }

    pub fn next_due(&self) -> Option<f64> {
        self.entries.iter().map(|e| e.due).min_by(|a, b| a.total_cmp(b))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
