//! Primal congestion control: sources climb their own utility minus the
//! penalty links charge for overload; links only report the penalty.
//!
//! Params: `penalty` (kappa, default 1.0).

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
pub enum PrimalEvent {
    SourceWake,
    LinkWake,
    PenaltyArrival,
    RateArrival,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PrimalMessage {
    Agent(usize),
    Penalty { link: LinkId, source: DemandId, penalty: f64 },
    Rate { source: DemandId, link: LinkId, rate: f64 },
}

#[derive(Debug, Clone)]
struct Source {
    weight: f64,
    bounds: Bounds,
    route: Vec<LinkId>,
    known_penalties: Vec<f64>,
    rate: ScalarState,
    timer: WakeTimer,
    trace: Trace,
}

#[derive(Debug, Clone)]
struct PenaltyLink {
    capacity: f64,
    users: Vec<DemandId>,
    known_rates: Vec<f64>,
    penalty: f64,
    timer: WakeTimer,
    trace: Trace,
}

#[derive(Debug, Clone)]
pub struct PrimalRate {
    sources: Vec<Source>,
    links: Vec<PenaltyLink>,
    kappa: f64,
    step: GradientStepSpec,
}

impl PrimalRate {
    pub fn new(config: &SimConfig, network: &Network) -> Result<Self, ConfigError> {
        network.validate()?;
        let kappa = config.param("penalty", 1.0);
        if !(kappa > 0.0) {
            return Err(ConfigError::invalid("params.penalty", kappa, "> 0"));
        }

        let mut sources = Vec::with_capacity(network.demand_count());
        for demand in &network.demands {
            let route = demand.primary_route().to_vec();
            sources.push(Source {
                weight: demand.weight,
                bounds: Bounds::new(demand.min_rate, demand.max_rate)?,
                known_penalties: vec![0.0; route.len()],
                route,
                rate: ScalarState::new(demand.min_rate),
                timer: WakeTimer::new(config.timing),
                trace: Trace::new(),
            });
        }

        let links = (0..network.link_count())
            .map(|l| {
                let users = network.primary_users(l);
                PenaltyLink {
                    capacity: network.capacity(l),
                    known_rates: users.iter().map(|&s| sources[s].rate.value).collect(),
                    users,
                    penalty: 0.0,
                    timer: WakeTimer::new(config.timing),
                    trace: Trace::new(),
                }
            })
            .collect();

        Ok(Self {
            sources,
            links,
            kappa,
            step: config.step,
        })
    }

    pub fn rate(&self, source: DemandId) -> f64 {
        self.sources[source].rate.value
    }

    pub fn penalty(&self, link: LinkId) -> f64 {
        self.links[link].penalty
    }

    fn source_wake(
        &mut self,
        s: DemandId,
        ctx: &mut SimContext<PrimalEvent, PrimalMessage>,
    ) -> Result<(), SimError> {
        if ctx.past_horizon() {
            ctx.request_termination();
            return Ok(());
        }

        let now = ctx.now();
        let source = &mut self.sources[s];
        let path_penalty: f64 = source.known_penalties.iter().sum();
        let gradient = source.weight / source.rate.value - path_penalty;
        let rate = source
            .rate
            .advance(gradient, &self.step, source.bounds, ctx.rng())
            .map_err(numeric_fault(format!("source {}", s), PrimalEvent::SourceWake, now))?;
        ctx.record_update();
        source.trace.append(now, rate);

        for &link in &source.route {
            ctx.signal(PrimalEvent::RateArrival, PrimalMessage::Rate { source: s, link, rate })?;
        }
        ctx.wake(&mut source.timer, PrimalEvent::SourceWake, PrimalMessage::Agent(s))?;
        Ok(())
    }

    fn link_wake(
        &mut self,
        l: LinkId,
        ctx: &mut SimContext<PrimalEvent, PrimalMessage>,
    ) -> Result<(), SimError> {
        if ctx.past_horizon() {
            ctx.request_termination();
            return Ok(());
        }

        let now = ctx.now();
        let link = &mut self.links[l];
        let load: f64 = link.known_rates.iter().sum();
        let penalty = self.kappa * (load - link.capacity).max(0.0);
        link.penalty = penalty;
        link.trace.append(now, penalty);

        ctx.broadcast(PrimalEvent::PenaltyArrival, &link.users, |source| PrimalMessage::Penalty {
            link: l,
            source,
            penalty,
        })?;
        ctx.wake(&mut link.timer, PrimalEvent::LinkWake, PrimalMessage::Agent(l))?;
        Ok(())
    }
}

impl Algorithm for PrimalRate {
    type Kind = PrimalEvent;
    type Payload = PrimalMessage;

    fn name(&self) -> &str {
        "primal-rate"
    }

    fn initialize(
        &mut self,
        ctx: &mut SimContext<PrimalEvent, PrimalMessage>,
    ) -> Result<(), SimError> {
        for (s, source) in self.sources.iter_mut().enumerate() {
            ctx.wake(&mut source.timer, PrimalEvent::SourceWake, PrimalMessage::Agent(s))?;
        }
        for (l, link) in self.links.iter_mut().enumerate() {
            ctx.wake(&mut link.timer, PrimalEvent::LinkWake, PrimalMessage::Agent(l))?;
        }
        Ok(())
    }

    fn handle(
        &mut self,
        event: Event<PrimalEvent, PrimalMessage>,
        ctx: &mut SimContext<PrimalEvent, PrimalMessage>,
    ) -> Result<(), SimError> {
        match (event.kind, event.payload) {
            (PrimalEvent::SourceWake, PrimalMessage::Agent(s)) => self.source_wake(s, ctx),
            (PrimalEvent::LinkWake, PrimalMessage::Agent(l)) => self.link_wake(l, ctx),
            (PrimalEvent::PenaltyArrival, PrimalMessage::Penalty { link, source, penalty }) => {
                let src = &mut self.sources[source];
                if let Some(pos) = src.route.iter().position(|&x| x == link) {
                    src.known_penalties[pos] = penalty;
                }
                Ok(())
            }
            (PrimalEvent::RateArrival, PrimalMessage::Rate { source, link, rate }) => {
                let dst = &mut self.links[link];
                if let Some(pos) = dst.users.iter().position(|&x| x == source) {
                    dst.known_rates[pos] = rate;
                }
                Ok(())
            }
            (kind, payload) => {
                warn!("primal-rate: ignoring {:?} with payload {:?}", kind, payload);
                Ok(())
            }
        }
    }

    fn traces(&self) -> Vec<NamedTrace> {
        let mut traces = Vec::with_capacity(self.sources.len() + self.links.len());
        for (s, src) in self.sources.iter().enumerate() {
            traces.push(NamedTrace::new(format!("source{}.rate", s), src.trace.clone()));
        }
        for (l, link) in self.links.iter().enumerate() {
            traces.push(NamedTrace::new(format!("link{}.penalty", l), link.trace.clone()));
        }
        traces
    }

    fn objective(&self) -> f64 {
        self.sources.iter().map(|s| s.weight * s.rate.value.ln()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::Simulation;
    use crate::timing::TimingSpec;

    fn run(network: &Network, config: SimConfig) -> Simulation<PrimalRate> {
        let algo = PrimalRate::new(&config, network).unwrap();
        let mut sim = Simulation::new(config, algo).unwrap();
        sim.run().unwrap();
        sim
    }

    #[test]
    fn test_settles_at_penalized_optimum() {
        let config = SimConfig::default()
            .with_timing(TimingSpec::synchronous(1.0))
            .with_step(GradientStepSpec::new(0.05).unwrap())
            .with_max_intervals(400.0);
        let sim = run(&Network::single_link(10.0, 2), config);

        // 1/x = 2x - 10 at the fixed point.
        let expected = (10.0 + 108f64.sqrt()) / 4.0;
        let a = sim.algorithm();
        assert!((a.rate(0) - expected).abs() < 0.01, "rate {}", a.rate(0));
        assert!((a.penalty(0) - 1.0 / expected).abs() < 0.01);
    }

    #[test]
    fn test_rates_stay_in_bounds() {
        let mut network = Network::single_link(1.0, 3);
        for d in &mut network.demands {
            d.min_rate = 0.1;
            d.max_rate = 0.4;
        }
        let config = SimConfig::default()
            .with_step(GradientStepSpec::new(0.5).unwrap())
            .with_max_intervals(60.0);
        let sim = run(&network, config);

        for trace in sim.algorithm().traces().iter().filter(|t| t.series.ends_with(".rate")) {
            for (_, sample) in trace.trace.export() {
                let v = sample.as_scalar().unwrap();
                assert!((0.1..=0.4).contains(&v));
            }
        }
        assert!(sim.context().stats().updates > 0);
    }

    #[test]
    fn test_penalty_must_be_positive() {
        let config = SimConfig::default().with_param("penalty", 0.0);
        let err = PrimalRate::new(&config, &Network::single_link(10.0, 2)).unwrap_err();
        assert!(err.to_string().contains("params.penalty"));
    }
}
