use crate::channel::{self, ChannelSpec};
use crate::error::SimError;
use crate::metrics::RunStats;
use crate::rng::RandomStream;
use crate::scheduler::{Event, EventId, Scheduler};
use crate::timing::WakeTimer;
use std::fmt;
use tracing::debug;

/// Everything a handler may touch besides its own algorithm state: the
/// clock and queue, the run's random stream, the channel and the counters.
pub struct SimContext<K, P> {
    scheduler: Scheduler<K, P>,
    rng: RandomStream,
    channel: ChannelSpec,
    stats: RunStats,
    horizon: f64,
}

impl<K: fmt::Debug, P> SimContext<K, P> {
    pub fn new(seed: u64, channel: ChannelSpec, horizon: f64) -> Self {
        Self {
            scheduler: Scheduler::new(),
            rng: RandomStream::new(seed),
            channel,
            stats: RunStats::new(),
            horizon,
        }
    }

    pub fn now(&self) -> f64 {
        self.scheduler.now()
    }

    pub fn horizon(&self) -> f64 {
        self.horizon
    }

    /// True once simulated time has gone beyond the horizon.
    pub fn past_horizon(&self) -> bool {
        self.now() > self.horizon
    }

    pub fn rng(&mut self) -> &mut RandomStream {
        &mut self.rng
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn scheduler(&self) -> &Scheduler<K, P> {
        &self.scheduler
    }

    pub fn channel(&self) -> &ChannelSpec {
        &self.channel
    }

    pub fn schedule(&mut self, time: f64, kind: K, payload: P) -> Result<EventId, SimError> {
        self.scheduler.schedule(time, kind, payload)
    }

    /// Arm `timer` and schedule its wake-up. Returns the firing time.
    pub fn wake(&mut self, timer: &mut WakeTimer, kind: K, payload: P) -> Result<f64, SimError> {
        let at = timer.arm(self.now(), &mut self.rng);
        self.scheduler.schedule(at, kind, payload)?;
        Ok(at)
    }

    /// Send one message through the channel. Returns whether it will
    /// arrive; a lost message is simply not scheduled.
    pub fn signal(&mut self, kind: K, payload: P) -> Result<bool, SimError> {
        match channel::maybe_deliver(self.now(), &self.channel, &mut self.rng) {
            Some(at) => {
                self.scheduler.schedule(at, kind, payload)?;
                self.stats.signal_delivered();
                Ok(true)
            }
            None => {
                debug!("t={:.4} lost {:?}", self.now(), kind);
                self.stats.signal_dropped();
                Ok(false)
            }
        }
    }

    /// Send one message per recipient, each with its own loss and delay
    /// draws, in recipient order. Returns how many will arrive.
    pub fn broadcast<R: Copy>(
        &mut self,
        kind: K,
        recipients: &[R],
        mut payload: impl FnMut(R) -> P,
    ) -> Result<usize, SimError>
    where
        K: Copy,
    {
        let now = self.now();
        let mut delivered = 0;
        for (recipient, at) in channel::broadcast(now, &self.channel, recipients, &mut self.rng) {
            match at {
                Some(at) => {
                    self.scheduler.schedule(at, kind, payload(recipient))?;
                    self.stats.signal_delivered();
                    delivered += 1;
                }
                None => {
                    debug!("t={:.4} lost {:?}", now, kind);
                    self.stats.signal_dropped();
                }
            }
        }
        Ok(delivered)
    }

    pub fn record_update(&mut self) {
        self.stats.update_applied();
    }

    pub fn request_termination(&mut self) {
        if !self.scheduler.is_terminated() {
            debug!("termination requested at t={}", self.now());
        }
        self.scheduler.request_termination();
    }

    pub(crate) fn next_event(&mut self) -> Option<Event<K, P>> {
        self.scheduler.pop_next()
    }
}
