//! Multipath routing: each demand splits a fixed volume across its candidate
//! routes and shifts traffic toward the routes that look cheapest under the
//! link prices it last heard. Links price overload the same way as in
//! [`dual_price`](super::dual_price).
//!
//! The split lives on `{ y >= 0, sum(y) == volume }`. A positive
//! `regularization` pulls the split toward an even spread, which damps the
//! oscillation between routes that a plain split shows.
//!
//! Params: `regularization` (default 0.05), `initial_price` (default 0.0).

use super::{numeric_fault, Algorithm};
use crate::error::{ConfigError, SimError};
use crate::gradient::{Bounds, GradientStepSpec, ScalarState, VectorState};
use crate::network::{self, DemandId, LinkId, Network};
use crate::project::Projection;
use crate::scheduler::Event;
use crate::simulation::{SimConfig, SimContext};
use crate::timing::WakeTimer;
use crate::trace::{NamedTrace, Trace};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitEvent {
    DemandWake,
    LinkWake,
    PriceArrival,
    LoadArrival,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SplitMessage {
    Agent(usize),
    Price { link: LinkId, demand: DemandId, price: f64 },
    Load { demand: DemandId, link: LinkId, load: f64 },
}

#[derive(Debug, Clone)]
struct SplitDemand {
    routes: Vec<Vec<LinkId>>,
    /// Every link any route touches; `known_prices` is indexed alike.
    links: Vec<LinkId>,
    known_prices: Vec<f64>,
    split: VectorState,
    region: Projection,
    timer: WakeTimer,
    trace: Trace,
}

impl SplitDemand {
    fn route_price(&self, route: &[LinkId]) -> f64 {
        route
            .iter()
            .filter_map(|l| self.links.iter().position(|x| x == l))
            .map(|i| self.known_prices[i])
            .sum()
    }

    /// Traffic this demand puts on `link` under its current split.
    fn load_on(&self, link: LinkId) -> f64 {
        self.routes
            .iter()
            .zip(&self.split.value)
            .filter(|(route, _)| route.contains(&link))
            .map(|(_, &y)| y)
            .sum()
    }
}

#[derive(Debug, Clone)]
struct SplitLink {
    capacity: f64,
    users: Vec<DemandId>,
    known_loads: Vec<f64>,
    price: ScalarState,
    timer: WakeTimer,
    trace: Trace,
}

#[derive(Debug, Clone)]
pub struct RouteSplit {
    network: Network,
    demands: Vec<SplitDemand>,
    links: Vec<SplitLink>,
    step: GradientStepSpec,
}

impl RouteSplit {
    pub fn new(config: &SimConfig, network: &Network) -> Result<Self, ConfigError> {
        network.validate()?;
        let regularization = config.param("regularization", 0.05);
        let initial_price = config.param("initial_price", 0.0);
        if initial_price < 0.0 {
            return Err(ConfigError::invalid("params.initial_price", initial_price, ">= 0"));
        }

        let mut demands = Vec::with_capacity(network.demand_count());
        for (d, demand) in network.demands.iter().enumerate() {
            let k = demand.routes.len().max(1);
            let region = Projection::simplex(demand.volume, regularization)?;
            region.validate(k)?;
            let links = network.links_of(d);
            demands.push(SplitDemand {
                routes: demand.routes.clone(),
                known_prices: vec![initial_price; links.len()],
                links,
                split: VectorState::new(vec![demand.volume / k as f64; k]),
                region,
                timer: WakeTimer::new(config.timing),
                trace: Trace::new(),
            });
        }

        let mut links = Vec::with_capacity(network.link_count());
        for l in 0..network.link_count() {
            let mut users: Vec<DemandId> =
                network.routes_through(l).into_iter().map(|(d, _)| d).collect();
            users.dedup();
            links.push(SplitLink {
                capacity: network.capacity(l),
                known_loads: users.iter().map(|&d| demands[d].load_on(l)).collect(),
                users,
                price: ScalarState::new(initial_price),
                timer: WakeTimer::new(config.timing),
                trace: Trace::new(),
            });
        }

        Ok(Self {
            network: network.clone(),
            demands,
            links,
            step: config.step,
        })
    }

    pub fn split(&self, demand: DemandId) -> &[f64] {
        &self.demands[demand].split.value
    }

    pub fn price(&self, link: LinkId) -> f64 {
        self.links[link].price.value
    }

    /// Traffic on `link` under the current splits.
    pub fn carried(&self, link: LinkId) -> f64 {
        let splits: Vec<Vec<f64>> = self.demands.iter().map(|d| d.split.value.clone()).collect();
        network::carried_traffic(&self.network, link, &splits)
    }

    fn demand_wake(
        &mut self,
        d: DemandId,
        ctx: &mut SimContext<SplitEvent, SplitMessage>,
    ) -> Result<(), SimError> {
        if ctx.past_horizon() {
            ctx.request_termination();
            return Ok(());
        }

        let now = ctx.now();
        let demand = &mut self.demands[d];
        let gradient: Vec<f64> = demand.routes.iter().map(|r| -demand.route_price(r)).collect();
        let split = demand
            .split
            .advance(&gradient, &self.step, &demand.region, ctx.rng())
            .map_err(numeric_fault(format!("demand {}", d), SplitEvent::DemandWake, now))?
            .to_vec();
        ctx.record_update();
        debug!("t={:.4} demand {} split {:?}", now, d, split);
        demand.trace.append(now, split);

        for &link in &demand.links {
            let load = demand.load_on(link);
            ctx.signal(SplitEvent::LoadArrival, SplitMessage::Load { demand: d, link, load })?;
        }
        ctx.wake(&mut demand.timer, SplitEvent::DemandWake, SplitMessage::Agent(d))?;
        Ok(())
    }

    fn link_wake(
        &mut self,
        l: LinkId,
        ctx: &mut SimContext<SplitEvent, SplitMessage>,
    ) -> Result<(), SimError> {
        if ctx.past_horizon() {
            ctx.request_termination();
            return Ok(());
        }

        let now = ctx.now();
        let link = &mut self.links[l];
        let load: f64 = link.known_loads.iter().sum();
        let price = link
            .price
            .advance(load - link.capacity, &self.step, Bounds::NON_NEGATIVE, ctx.rng())
            .map_err(numeric_fault(format!("link {}", l), SplitEvent::LinkWake, now))?;
        ctx.record_update();
        link.trace.append(now, price);

        ctx.broadcast(SplitEvent::PriceArrival, &link.users, |demand| SplitMessage::Price {
            link: l,
            demand,
            price,
        })?;
        ctx.wake(&mut link.timer, SplitEvent::LinkWake, SplitMessage::Agent(l))?;
        Ok(())
    }
}

impl Algorithm for RouteSplit {
    type Kind = SplitEvent;
    type Payload = SplitMessage;

    fn name(&self) -> &str {
        "route-split"
    }

    fn initialize(
        &mut self,
        ctx: &mut SimContext<SplitEvent, SplitMessage>,
    ) -> Result<(), SimError> {
        for (d, demand) in self.demands.iter_mut().enumerate() {
            ctx.wake(&mut demand.timer, SplitEvent::DemandWake, SplitMessage::Agent(d))?;
        }
        for (l, link) in self.links.iter_mut().enumerate() {
            ctx.wake(&mut link.timer, SplitEvent::LinkWake, SplitMessage::Agent(l))?;
        }
        Ok(())
    }

    fn handle(
        &mut self,
        event: Event<SplitEvent, SplitMessage>,
        ctx: &mut SimContext<SplitEvent, SplitMessage>,
    ) -> Result<(), SimError> {
        match (event.kind, event.payload) {
            (SplitEvent::DemandWake, SplitMessage::Agent(d)) => self.demand_wake(d, ctx),
            (SplitEvent::LinkWake, SplitMessage::Agent(l)) => self.link_wake(l, ctx),
            (SplitEvent::PriceArrival, SplitMessage::Price { link, demand, price }) => {
                let dst = &mut self.demands[demand];
                if let Some(pos) = dst.links.iter().position(|&x| x == link) {
                    dst.known_prices[pos] = price;
                }
                Ok(())
            }
            (SplitEvent::LoadArrival, SplitMessage::Load { demand, link, load }) => {
                let dst = &mut self.links[link];
                if let Some(pos) = dst.users.iter().position(|&x| x == demand) {
                    dst.known_loads[pos] = load;
                }
                Ok(())
            }
            (kind, payload) => {
                warn!("route-split: ignoring {:?} with payload {:?}", kind, payload);
                Ok(())
            }
        }
    }

    fn traces(&self) -> Vec<NamedTrace> {
        let demands = self
            .demands
            .iter()
            .enumerate()
            .map(|(d, demand)| NamedTrace::new(format!("demand{}.split", d), demand.trace.clone()));
        let links = self
            .links
            .iter()
            .enumerate()
            .map(|(l, link)| NamedTrace::new(format!("link{}.price", l), link.trace.clone()));
        demands.chain(links).collect()
    }

    /// Minus the total overload across links.
    fn objective(&self) -> f64 {
        -(0..self.links.len())
            .map(|l| (self.carried(l) - self.links[l].capacity).max(0.0))
            .sum::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::Simulation;
    use crate::timing::TimingSpec;

    fn sync_config(intervals: f64) -> SimConfig {
        SimConfig::default()
            .with_timing(TimingSpec::synchronous(1.0))
            .with_step(GradientStepSpec::new(0.05).unwrap())
            .with_max_intervals(intervals)
    }

    #[test]
    fn test_initial_split_is_even() {
        let network = Network::parallel((2.0, 1.0), 3);
        let algo = RouteSplit::new(&sync_config(10.0), &network).unwrap();
        assert_eq!(algo.split(0), &[0.5, 0.5]);
        assert_eq!(algo.carried(0), 1.5);
        assert_eq!(algo.carried(1), 1.5);
        assert_eq!(algo.objective(), -0.5);
    }

    #[test]
    fn test_moves_volume_off_the_overloaded_route() {
        let network = Network::parallel((2.0, 1.0), 3);
        let config = sync_config(400.0);
        let algo = RouteSplit::new(&config, &network).unwrap();
        let mut sim = Simulation::new(config, algo).unwrap();
        sim.run().unwrap();

        let a = sim.algorithm();
        assert!((a.carried(0) - 2.0).abs() < 0.01, "link0 carries {}", a.carried(0));
        assert!((a.carried(1) - 1.0).abs() < 0.01);
        assert!(a.objective() > -0.01);
        assert!(a.price(1) > a.price(0));
    }

    #[test]
    fn test_every_split_keeps_the_volume() {
        let mut network = Network::parallel((3.0, 3.0), 2);
        network.demands[1].volume = 2.5;
        let config = sync_config(50.0).with_param("regularization", 0.0);
        let algo = RouteSplit::new(&config, &network).unwrap();
        let mut sim = Simulation::new(config, algo).unwrap();
        sim.run().unwrap();

        let traces = sim.algorithm().traces();
        let demand1 = traces.iter().find(|t| t.series == "demand1.split").unwrap();
        assert!(!demand1.trace.is_empty());
        for (_, sample) in demand1.trace.export() {
            let total: f64 = sample.values().iter().sum();
            assert!((total - 2.5).abs() < 1e-9);
            assert!(sample.values().iter().all(|&y| y >= 0.0));
        }
    }

    #[test]
    fn test_negative_regularization_rejected() {
        let config = sync_config(10.0).with_param("regularization", -0.1);
        assert!(RouteSplit::new(&config, &Network::parallel((1.0, 1.0), 1)).is_err());
    }
}
