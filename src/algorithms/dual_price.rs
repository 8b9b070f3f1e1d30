//! Dual (price-based) congestion control.
//!
//! Each link raises its price while the traffic it last heard about exceeds
//! capacity and lowers it otherwise, never below zero. Each source picks the
//! rate maximizing `w * ln(x) - q * x` for the path price `q` it last heard,
//! i.e. `x = w / q`, clipped to its rate bounds.
//!
//! Params: `initial_price` (default 1.0).

use super::{numeric_fault, Algorithm};
use crate::error::{ConfigError, SimError};
use crate::gradient::{Bounds, GradientStepSpec, ScalarState};
use crate::network::{DemandId, LinkId, Network};
use crate::scheduler::Event;
use crate::simulation::{SimConfig, SimContext};
use crate::timing::WakeTimer;
use crate::trace::{NamedTrace, Trace};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DualEvent {
    SourceWake,
    LinkWake,
    PriceArrival,
    RateArrival,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DualMessage {
    Agent(usize),
    Price { link: LinkId, source: DemandId, price: f64 },
    Rate { source: DemandId, link: LinkId, rate: f64 },
}

#[derive(Debug, Clone)]
struct Source {
    weight: f64,
    bounds: Bounds,
    route: Vec<LinkId>,
    /// Last price heard from each link on `route`.
    known_prices: Vec<f64>,
    rate: f64,
    timer: WakeTimer,
    trace: Trace,
}

#[derive(Debug, Clone)]
struct PricedLink {
    capacity: f64,
    users: Vec<DemandId>,
    /// Last rate heard from each of `users`.
    known_rates: Vec<f64>,
    price: ScalarState,
    timer: WakeTimer,
    trace: Trace,
}

#[derive(Debug, Clone)]
pub struct DualPrice {
    sources: Vec<Source>,
    links: Vec<PricedLink>,
    step: GradientStepSpec,
}

impl DualPrice {
    pub fn new(config: &SimConfig, network: &Network) -> Result<Self, ConfigError> {
        network.validate()?;
        let initial_price = config.param("initial_price", 1.0);
        if initial_price < 0.0 {
            return Err(ConfigError::invalid("params.initial_price", initial_price, ">= 0"));
        }

        let sources = network
            .demands
            .iter()
            .map(|d| -> Result<Source, ConfigError> {
                let route = d.primary_route().to_vec();
                Ok(Source {
                    weight: d.weight,
                    bounds: Bounds::new(d.min_rate, d.max_rate)?,
                    known_prices: vec![initial_price; route.len()],
                    route,
                    rate: d.min_rate,
                    timer: WakeTimer::new(config.timing),
                    trace: Trace::new(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let links = (0..network.link_count())
            .map(|l| {
                let users = network.primary_users(l);
                PricedLink {
                    capacity: network.capacity(l),
                    known_rates: users.iter().map(|&s| sources[s].rate).collect(),
                    users,
                    price: ScalarState::new(initial_price),
                    timer: WakeTimer::new(config.timing),
                    trace: Trace::new(),
                }
            })
            .collect();

        Ok(Self {
            sources,
            links,
            step: config.step,
        })
    }

    pub fn price(&self, link: LinkId) -> f64 {
        self.links[link].price.value
    }

    pub fn rate(&self, source: DemandId) -> f64 {
        self.sources[source].rate
    }

    pub fn known_prices(&self, source: DemandId) -> &[f64] {
        &self.sources[source].known_prices
    }

    pub fn known_rates(&self, link: LinkId) -> &[f64] {
        &self.links[link].known_rates
    }

    pub fn source_trace(&self, source: DemandId) -> &Trace {
        &self.sources[source].trace
    }

    pub fn link_trace(&self, link: LinkId) -> &Trace {
        &self.links[link].trace
    }

    fn source_wake(
        &mut self,
        s: DemandId,
        ctx: &mut SimContext<DualEvent, DualMessage>,
    ) -> Result<(), SimError> {
        if ctx.past_horizon() {
            ctx.request_termination();
            return Ok(());
        }

        let now = ctx.now();
        let source = &mut self.sources[s];
        let path_price: f64 = source.known_prices.iter().sum();
        let rate = if path_price > 0.0 {
            source.bounds.clip(source.weight / path_price)
        } else {
            source.bounds.hi
        };
        source.rate = rate;
        source.trace.append(now, rate);

        for &link in &source.route {
            ctx.signal(DualEvent::RateArrival, DualMessage::Rate { source: s, link, rate })?;
        }
        ctx.wake(&mut source.timer, DualEvent::SourceWake, DualMessage::Agent(s))?;
        Ok(())
    }

    fn link_wake(
        &mut self,
        l: LinkId,
        ctx: &mut SimContext<DualEvent, DualMessage>,
    ) -> Result<(), SimError> {
        if ctx.past_horizon() {
            ctx.request_termination();
            return Ok(());
        }

        let now = ctx.now();
        let link = &mut self.links[l];
        let carried: f64 = link.known_rates.iter().sum();
        let price = link
            .price
            .advance(carried - link.capacity, &self.step, Bounds::NON_NEGATIVE, ctx.rng())
            .map_err(numeric_fault(format!("link {}", l), DualEvent::LinkWake, now))?;
        ctx.record_update();
        link.trace.append(now, price);

        for &source in &link.users {
            ctx.signal(DualEvent::PriceArrival, DualMessage::Price { link: l, source, price })?;
        }
        ctx.wake(&mut link.timer, DualEvent::LinkWake, DualMessage::Agent(l))?;
        Ok(())
    }
}

impl Algorithm for DualPrice {
    type Kind = DualEvent;
    type Payload = DualMessage;

    fn name(&self) -> &str {
        "dual-price"
    }

    fn initialize(&mut self, ctx: &mut SimContext<DualEvent, DualMessage>) -> Result<(), SimError> {
        for (s, source) in self.sources.iter_mut().enumerate() {
            ctx.wake(&mut source.timer, DualEvent::SourceWake, DualMessage::Agent(s))?;
        }
        for (l, link) in self.links.iter_mut().enumerate() {
            ctx.wake(&mut link.timer, DualEvent::LinkWake, DualMessage::Agent(l))?;
        }
        Ok(())
    }

    fn handle(
        &mut self,
        event: Event<DualEvent, DualMessage>,
        ctx: &mut SimContext<DualEvent, DualMessage>,
    ) -> Result<(), SimError> {
        match (event.kind, event.payload) {
            (DualEvent::SourceWake, DualMessage::Agent(s)) => self.source_wake(s, ctx),
            (DualEvent::LinkWake, DualMessage::Agent(l)) => self.link_wake(l, ctx),
            (DualEvent::PriceArrival, DualMessage::Price { link, source, price }) => {
                let src = &mut self.sources[source];
                if let Some(pos) = src.route.iter().position(|&x| x == link) {
                    src.known_prices[pos] = price;
                }
                Ok(())
            }
            (DualEvent::RateArrival, DualMessage::Rate { source, link, rate }) => {
                let dst = &mut self.links[link];
                if let Some(pos) = dst.users.iter().position(|&x| x == source) {
                    dst.known_rates[pos] = rate;
                }
                Ok(())
            }
            (kind, payload) => {
                warn!("dual-price: ignoring {:?} with payload {:?}", kind, payload);
                Ok(())
            }
        }
    }

    fn traces(&self) -> Vec<NamedTrace> {
        let sources = self
            .sources
            .iter()
            .enumerate()
            .map(|(s, src)| NamedTrace::new(format!("source{}.rate", s), src.trace.clone()));
        let links = self
            .links
            .iter()
            .enumerate()
            .map(|(l, link)| NamedTrace::new(format!("link{}.price", l), link.trace.clone()));
        sources.chain(links).collect()
    }

    fn objective(&self) -> f64 {
        self.sources.iter().map(|s| s.weight * s.rate.ln()).sum()
    }
}
