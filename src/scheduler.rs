//! Time-ordered event queue driving a run.
//!
//! Events pop in ascending time; equal times pop in the order they were
//! scheduled. Scheduling before the current time is refused with
//! [`SimError::ScheduledInPast`] instead of being clamped.
//!
//! Termination: once a handler calls [`Scheduler::request_termination`] at
//! time `t`, events at exactly `t` still run, including ones scheduled at
//! `t` by those handlers. The first event later than `t` ends the run and
//! stays in the queue.

use crate::error::SimError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use tracing::trace;

/// Insertion sequence number, also the FIFO tie-breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone)]
pub struct Event<K, P> {
    pub id: EventId,
    pub time: f64,
    pub kind: K,
    pub payload: P,
}

impl<K, P> PartialEq for Event<K, P> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<K, P> Eq for Event<K, P> {}

impl<K, P> PartialOrd for Event<K, P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K, P> Ord for Event<K, P> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest time, then lowest id)
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Terminated,
    QueueEmpty,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminated => write!(f, "terminated"),
            Self::QueueEmpty => write!(f, "queue empty"),
        }
    }
}

pub struct Scheduler<K, P> {
    queue: BinaryHeap<Event<K, P>>,
    current_time: f64,
    next_id: u64,
    stop_at: Option<f64>,
    stopped: Option<StopReason>,
    dispatched: u64,
}

impl<K: fmt::Debug, P> Scheduler<K, P> {
    pub fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
            current_time: 0.0,
            next_id: 0,
            stop_at: None,
            stopped: None,
            dispatched: 0,
        }
    }

    pub fn now(&self) -> f64 {
        self.current_time
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// True once termination was requested.
    pub fn is_terminated(&self) -> bool {
        self.stop_at.is_some()
    }

    /// Why the loop stopped, once it has.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stopped
    }

    /// Time of the earliest pending event.
    pub fn peek_time(&self) -> Option<f64> {
        self.queue.peek().map(|e| e.time)
    }

    pub fn schedule(&mut self, time: f64, kind: K, payload: P) -> Result<EventId, SimError> {
        if !time.is_finite() {
            return Err(SimError::NonFiniteTime {
                kind: format!("{:?}", kind),
                time,
            });
        }
        if time < self.current_time {
            return Err(SimError::ScheduledInPast {
                kind: format!("{:?}", kind),
                time,
                now: self.current_time,
            });
        }

        let id = EventId(self.next_id);
        self.next_id += 1;
        trace!("schedule {:?} #{} at t={}", kind, id.0, time);
        self.queue.push(Event {
            id,
            time,
            kind,
            payload,
        });
        Ok(id)
    }

    /// Stop after the events due at the current instant have run.
    /// Later requests keep the first stopping time.
    pub fn request_termination(&mut self) {
        if self.stop_at.is_none() {
            self.stop_at = Some(self.current_time);
        }
    }

    /// Pop the next due event and advance the clock to it. Returns `None`
    /// when the queue is empty or the termination point has passed.
    pub fn pop_next(&mut self) -> Option<Event<K, P>> {
        if self.stopped.is_some() {
            return None;
        }

        match self.peek_time() {
            None => {
                self.stopped = Some(if self.is_terminated() {
                    StopReason::Terminated
                } else {
                    StopReason::QueueEmpty
                });
                return None;
            }
            Some(t) if self.stop_at.is_some_and(|limit| t > limit) => {
                self.stopped = Some(StopReason::Terminated);
                return None;
            }
            Some(_) => {}
        }

        let event = self.queue.pop()?;
        debug_assert!(event.time >= self.current_time);
        self.current_time = event.time;
        self.dispatched += 1;
        Some(event)
    }

    /// Drive the loop with `dispatch` until it stops. The first handler
    /// error ends the run and is returned.
    pub fn run<F>(&mut self, mut dispatch: F) -> Result<StopReason, SimError>
    where
        F: FnMut(&mut Self, Event<K, P>) -> Result<(), SimError>,
    {
        while let Some(event) = self.pop_next() {
            dispatch(self, event)?;
        }
        Ok(self.stopped.unwrap_or(StopReason::QueueEmpty))
    }
}

impl<K: fmt::Debug, P> Default for Scheduler<K, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, P> fmt::Debug for Scheduler<K, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("current_time", &self.current_time)
            .field("pending", &self.queue.len())
            .field("dispatched", &self.dispatched)
            .field("stop_at", &self.stop_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Kind {
        Tick,
        Other,
    }

    #[test]
    fn test_time_order_with_fifo_ties() {
        let mut s: Scheduler<Kind, u32> = Scheduler::new();
        s.schedule(2.0, Kind::Tick, 0).unwrap();
        s.schedule(1.0, Kind::Tick, 1).unwrap();
        s.schedule(2.0, Kind::Other, 2).unwrap();
        s.schedule(1.0, Kind::Other, 3).unwrap();
        s.schedule(0.5, Kind::Tick, 4).unwrap();

        let mut order = Vec::new();
        let reason = s
            .run(|sched, ev| {
                order.push((sched.now(), ev.payload));
                Ok(())
            })
            .unwrap();

        assert_eq!(reason, StopReason::QueueEmpty);
        assert_eq!(order, vec![(0.5, 4), (1.0, 1), (1.0, 3), (2.0, 0), (2.0, 2)]);
        assert_eq!(s.dispatched(), 5);
    }

    #[test]
    fn test_schedule_in_past_is_an_error() {
        let mut s: Scheduler<Kind, ()> = Scheduler::new();
        s.schedule(3.0, Kind::Tick, ()).unwrap();
        let err = s
            .run(|sched, _| sched.schedule(1.0, Kind::Other, ()).map(|_| ()))
            .unwrap_err();
        assert_eq!(
            err,
            SimError::ScheduledInPast {
                kind: "Other".into(),
                time: 1.0,
                now: 3.0
            }
        );
    }

    #[test]
    fn test_non_finite_time_rejected() {
        let mut s: Scheduler<Kind, ()> = Scheduler::new();
        assert!(matches!(
            s.schedule(f64::NAN, Kind::Tick, ()),
            Err(SimError::NonFiniteTime { .. })
        ));
        assert!(s.schedule(f64::INFINITY, Kind::Tick, ()).is_err());
    }

    #[test]
    fn test_scheduling_at_current_instant_allowed() {
        let mut s: Scheduler<Kind, u32> = Scheduler::new();
        s.schedule(1.0, Kind::Tick, 0).unwrap();
        let mut seen = Vec::new();
        s.run(|sched, ev| {
            seen.push(ev.payload);
            if ev.payload == 0 {
                sched.schedule(sched.now(), Kind::Tick, 1)?;
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![0, 1]);
    }

    #[test]
    fn test_termination_finishes_same_instant() {
        let mut s: Scheduler<Kind, u32> = Scheduler::new();
        s.schedule(1.0, Kind::Tick, 0).unwrap();
        s.schedule(1.0, Kind::Tick, 1).unwrap();
        s.schedule(1.5, Kind::Tick, 2).unwrap();

        let mut seen = Vec::new();
        let reason = s
            .run(|sched, ev| {
                seen.push(ev.payload);
                if ev.payload == 0 {
                    sched.request_termination();
                    sched.schedule(1.0, Kind::Other, 9)?;
                }
                Ok(())
            })
            .unwrap();

        assert_eq!(reason, StopReason::Terminated);
        assert_eq!(seen, vec![0, 1, 9]);
        assert_eq!(s.now(), 1.0);
        assert_eq!(s.pending(), 1);
        assert_eq!(s.peek_time(), Some(1.5));
        assert!(s.pop_next().is_none());
    }

    #[test]
    fn test_handler_error_stops_run() {
        let mut s: Scheduler<Kind, u32> = Scheduler::new();
        for i in 0..5 {
            s.schedule(i as f64, Kind::Tick, i).unwrap();
        }
        let mut seen = 0;
        let result = s.run(|_, ev| {
            seen += 1;
            if ev.payload == 2 {
                Err(SimError::NonFiniteTime {
                    kind: "Tick".into(),
                    time: f64::NAN,
                })
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
        assert_eq!(seen, 3);
        assert_eq!(s.now(), 2.0);
    }
}
