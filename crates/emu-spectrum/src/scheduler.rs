//! Event scheduler: a due-time-ordered queue of callbacks dispatched
//! between CPU instruction boundaries.
//!
//! Event kinds are registered once at startup and referenced afterwards by
//! the opaque `EventKind` handle `register` returns — this mirrors the
//! contract described for the CPU's own microcode tables (populate once,
//! read-only thereafter).

use std::collections::VecDeque;

/// Opaque handle to a registered event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKind(usize);

struct Entry {
    due_tstate: i64,
    kind: EventKind,
    /// Monotonic insertion sequence, used to break due-time ties FIFO.
    seq: u64,
}

/// Single-threaded cooperative event scheduler driving the frame/interrupt/
/// peripheral dispatch loop.
pub struct Scheduler {
    handlers: Vec<&'static str>,
    queue: VecDeque<Entry>,
    next_seq: u64,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            queue: VecDeque::new(),
            next_seq: 0,
        }
    }

    /// Register a new event kind, identified only by a label for diagnostics.
    /// Call once per kind at startup.
    pub fn register(&mut self, label: &'static str) -> EventKind {
        self.handlers.push(label);
        EventKind(self.handlers.len() - 1)
    }

    /// Enqueue `kind` to fire at `due_tstate`. Scheduling into the past is
    /// legal — it fires at the next `force_events` call.
    ///
    /// # Panics
    ///
    /// Panics if `kind` was not returned by `register` on this scheduler.
    pub fn add(&mut self, due_tstate: i64, kind: EventKind) {
        assert!(
            kind.0 < self.handlers.len(),
            "scheduling unknown event kind {:?} — registering an unknown kind is a fatal bug",
            kind
        );
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push_back(Entry {
            due_tstate,
            kind,
            seq,
        });
    }

    /// Rebase every queued entry's `due_tstate` by subtracting
    /// `frame_length`, clamping negatives to zero. Called atomically with
    /// the CPU's own `tstates` rebase at a frame boundary.
    pub fn frame(&mut self, frame_length: i64) {
        for entry in &mut self.queue {
            entry.due_tstate = (entry.due_tstate - frame_length).max(0);
        }
    }

    /// Dispatch every entry whose `due_tstate <= current_tstate`, in
    /// due-time order (ties broken FIFO), removing them from the queue.
    /// Returns the fired event kinds in dispatch order so the caller can
    /// invoke the matching callback — the scheduler itself holds no
    /// callback state beyond the label.
    pub fn force_events(&mut self, current_tstate: i64) -> Vec<EventKind> {
        let mut due: Vec<Entry> = Vec::new();
        let mut remaining = VecDeque::with_capacity(self.queue.len());
        for entry in self.queue.drain(..) {
            if entry.due_tstate <= current_tstate {
                due.push(entry);
            } else {
                remaining.push_back(entry);
            }
        }
        self.queue = remaining;
        due.sort_by(|a, b| a.due_tstate.cmp(&b.due_tstate).then(a.seq.cmp(&b.seq)));
        due.into_iter().map(|e| e.kind).collect()
    }

    /// Label a registered event kind was given, for diagnostics.
    #[must_use]
    pub fn label(&self, kind: EventKind) -> &'static str {
        self.handlers[kind.0]
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_due_time_order() {
        let mut sched = Scheduler::new();
        let a = sched.register("a");
        let b = sched.register("b");
        sched.add(100, a);
        sched.add(50, b);

        let fired = sched.force_events(1000);
        assert_eq!(fired, vec![b, a]);
    }

    #[test]
    fn equal_due_times_fire_fifo() {
        let mut sched = Scheduler::new();
        let a = sched.register("a");
        let b = sched.register("b");
        sched.add(10, a);
        sched.add(10, b);

        let fired = sched.force_events(10);
        assert_eq!(fired, vec![a, b]);
    }

    #[test]
    fn only_due_entries_fire() {
        let mut sched = Scheduler::new();
        let a = sched.register("a");
        sched.add(500, a);

        assert!(sched.force_events(100).is_empty());
        assert_eq!(sched.force_events(500), vec![a]);
        assert!(sched.is_empty());
    }

    #[test]
    fn scheduling_into_the_past_fires_immediately() {
        let mut sched = Scheduler::new();
        let a = sched.register("a");
        sched.add(-50, a);

        assert_eq!(sched.force_events(0), vec![a]);
    }

    #[test]
    fn frame_rebase_subtracts_and_clamps_to_zero() {
        let mut sched = Scheduler::new();
        let a = sched.register("a");
        let b = sched.register("b");
        sched.add(69_888, a);
        sched.add(100, b);

        sched.frame(69_888);

        assert_eq!(sched.force_events(0), vec![b, a]);
    }

    #[test]
    #[should_panic(expected = "unknown event kind")]
    fn scheduling_unknown_kind_panics() {
        let mut sched = Scheduler::new();
        let other = {
            let mut other_sched = Scheduler::new();
            other_sched.register("ghost")
        };
        sched.add(10, other);
    }
}
