//! Backpressure scheduling.
//!
//! Every demand has an ingress queue fed by Poisson arrivals and drained at
//! the smallest rate the links of its primary route last granted it. Queue
//! snapshots go to those links, which move capacity toward the users with
//! the largest backlog. Allocations stay on
//! `{ sum(a) <= capacity, a_i >= min_rate_i }`.
//!
//! Each ingress draws its arrivals from its own fork of the run seed.

use super::{numeric_fault, Algorithm};
use crate::error::{ConfigError, SimError};
use crate::gradient::{GradientStepSpec, VectorState};
use crate::network::{DemandId, LinkId, Network};
use crate::project::Projection;
use crate::rng::RandomStream;
use crate::scheduler::Event;
use crate::simulation::{SimConfig, SimContext};
use crate::timing::WakeTimer;
use crate::trace::{NamedTrace, Trace};
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BpEvent {
    IngressWake,
    LinkWake,
    BacklogArrival,
    AllocationArrival,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BpMessage {
    Agent(usize),
    Backlog { demand: DemandId, link: LinkId, backlog: f64 },
    Allocation { link: LinkId, demand: DemandId, rate: f64 },
}

#[derive(Debug, Clone)]
struct Ingress {
    arrival_rate: f64,
    arrivals: RandomStream,
    route: Vec<LinkId>,
    known_allocations: Vec<f64>,
    queue: f64,
    last_wake: f64,
    timer: WakeTimer,
    trace: Trace,
}

#[derive(Debug, Clone)]
struct LinkScheduler {
    users: Vec<DemandId>,
    known_backlogs: Vec<f64>,
    allocation: VectorState,
    region: Projection,
    timer: WakeTimer,
    trace: Trace,
}

#[derive(Debug, Clone)]
pub struct Backpressure {
    ingress: Vec<Ingress>,
    links: Vec<LinkScheduler>,
    step: GradientStepSpec,
}

impl Backpressure {
    pub fn new(config: &SimConfig, network: &Network) -> Result<Self, ConfigError> {
        network.validate()?;
        let master = RandomStream::new(config.seed);
        let ingress = network
            .demands
            .iter()
            .enumerate()
            .map(|(i, d)| Ingress {
                arrival_rate: d.arrival_rate,
                arrivals: master.fork(i as u64),
                route: d.primary_route().to_vec(),
                known_allocations: vec![d.min_rate; d.primary_route().len()],
                queue: 0.0,
                last_wake: 0.0,
                timer: WakeTimer::new(config.timing),
                trace: Trace::new(),
            })
            .collect();

        let mut links = Vec::with_capacity(network.link_count());
        for l in 0..network.link_count() {
            let users = network.primary_users(l);
            let floor: Vec<f64> = users.iter().map(|&d| network.demand(d).min_rate).collect();
            let region = Projection::capacity(network.capacity(l), floor.clone())?;
            links.push(LinkScheduler {
                known_backlogs: vec![0.0; users.len()],
                users,
                allocation: VectorState::new(floor),
                region,
                timer: WakeTimer::new(config.timing),
                trace: Trace::new(),
            });
        }

        Ok(Self {
            ingress,
            links,
            step: config.step,
        })
    }

    pub fn queue(&self, demand: DemandId) -> f64 {
        self.ingress[demand].queue
    }

    pub fn allocation(&self, link: LinkId) -> &[f64] {
        &self.links[link].allocation.value
    }

    fn ingress_wake(
        &mut self,
        d: DemandId,
        ctx: &mut SimContext<BpEvent, BpMessage>,
    ) -> Result<(), SimError> {
        if ctx.past_horizon() {
            ctx.request_termination();
            return Ok(());
        }

        let now = ctx.now();
        let ingress = &mut self.ingress[d];
        let dt = now - ingress.last_wake;
        ingress.last_wake = now;

        let arrivals = ingress.arrivals.poisson(ingress.arrival_rate * dt);
        let service = ingress
            .known_allocations
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
        let served = if service.is_finite() { service * dt } else { 0.0 };
        ingress.queue = (ingress.queue + arrivals - served).max(0.0);
        trace!("t={:.4} ingress {} +{} -{:.3} -> {:.3}", now, d, arrivals, served, ingress.queue);
        ingress.trace.append(now, ingress.queue);

        let backlog = ingress.queue;
        for &link in &ingress.route {
            ctx.signal(BpEvent::BacklogArrival, BpMessage::Backlog { demand: d, link, backlog })?;
        }
        ctx.wake(&mut ingress.timer, BpEvent::IngressWake, BpMessage::Agent(d))?;
        Ok(())
    }

    fn link_wake(
        &mut self,
        l: LinkId,
        ctx: &mut SimContext<BpEvent, BpMessage>,
    ) -> Result<(), SimError> {
        if ctx.past_horizon() {
            ctx.request_termination();
            return Ok(());
        }

        let now = ctx.now();
        let link = &mut self.links[l];
        let granted: Vec<(DemandId, f64)> = link
            .allocation
            .advance(&link.known_backlogs, &self.step, &link.region, ctx.rng())
            .map_err(numeric_fault(format!("link {}", l), BpEvent::LinkWake, now))?
            .iter()
            .zip(&link.users)
            .map(|(&rate, &demand)| (demand, rate))
            .collect();
        ctx.record_update();
        link.trace.append(now, link.allocation.value.clone());

        ctx.broadcast(BpEvent::AllocationArrival, &granted, |(demand, rate)| BpMessage::Allocation {
            link: l,
            demand,
            rate,
        })?;
        ctx.wake(&mut link.timer, BpEvent::LinkWake, BpMessage::Agent(l))?;
        Ok(())
    }
}

impl Algorithm for Backpressure {
    type Kind = BpEvent;
    type Payload = BpMessage;

    fn name(&self) -> &str {
        "backpressure"
    }

    fn initialize(&mut self, ctx: &mut SimContext<BpEvent, BpMessage>) -> Result<(), SimError> {
        for (d, ingress) in self.ingress.iter_mut().enumerate() {
            ctx.wake(&mut ingress.timer, BpEvent::IngressWake, BpMessage::Agent(d))?;
        }
        for (l, link) in self.links.iter_mut().enumerate() {
            ctx.wake(&mut link.timer, BpEvent::LinkWake, BpMessage::Agent(l))?;
        }
        Ok(())
    }

    fn handle(
        &mut self,
        event: Event<BpEvent, BpMessage>,
        ctx: &mut SimContext<BpEvent, BpMessage>,
    ) -> Result<(), SimError> {
        match (event.kind, event.payload) {
            (BpEvent::IngressWake, BpMessage::Agent(d)) => self.ingress_wake(d, ctx),
            (BpEvent::LinkWake, BpMessage::Agent(l)) => self.link_wake(l, ctx),
            (BpEvent::BacklogArrival, BpMessage::Backlog { demand, link, backlog }) => {
                let dst = &mut self.links[link];
                if let Some(pos) = dst.users.iter().position(|&x| x == demand) {
                    dst.known_backlogs[pos] = backlog;
                }
                Ok(())
            }
            (BpEvent::AllocationArrival, BpMessage::Allocation { link, demand, rate }) => {
                let dst = &mut self.ingress[demand];
                if let Some(pos) = dst.route.iter().position(|&x| x == link) {
                    dst.known_allocations[pos] = rate;
                }
                Ok(())
            }
            (kind, payload) => {
                warn!("backpressure: ignoring {:?} with payload {:?}", kind, payload);
                Ok(())
            }
        }
    }

    fn traces(&self) -> Vec<NamedTrace> {
        let mut traces = Vec::new();
        for (d, ingress) in self.ingress.iter().enumerate() {
            traces.push(NamedTrace::new(format!("demand{}.queue", d), ingress.trace.clone()));
        }
        for (l, link) in self.links.iter().enumerate() {
            if !link.users.is_empty() {
                traces.push(NamedTrace::new(format!("link{}.allocation", l), link.trace.clone()));
            }
        }
        traces
    }

    fn objective(&self) -> f64 {
        -self.ingress.iter().map(|i| i.queue).sum::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::Simulation;

    #[test]
    fn test_infeasible_floor_rejected() {
        let mut network = Network::single_link(1.0, 2);
        for d in &mut network.demands {
            d.min_rate = 0.6;
        }
        let err = Backpressure::new(&SimConfig::default(), &network).unwrap_err();
        assert!(matches!(err, ConfigError::InfeasibleRegion(_)));
    }

    #[test]
    fn test_queues_drain_once_capacity_is_granted() {
        let network = Network::single_link(10.0, 2);
        let config = SimConfig::default().with_seed(11).with_max_intervals(200.0);
        let algo = Backpressure::new(&config, &network).unwrap();
        let mut sim = Simulation::new(config, algo).unwrap();
        sim.run().unwrap();

        let a = sim.algorithm();
        let granted = a.allocation(0);
        assert_eq!(granted.len(), 2);
        assert!(granted.iter().sum::<f64>() <= 10.0 + 1e-9);
        assert!(granted.iter().all(|&r| r >= 0.01 - 1e-12));
        assert!(granted.iter().all(|&r| r > 1.0), "allocations {:?}", granted);
        assert!(a.queue(0) < 8.0 && a.queue(1) < 8.0);
    }

    #[test]
    fn test_allocation_trace_respects_capacity() {
        let network = Network::single_link(3.0, 3);
        let config = SimConfig::default().with_max_intervals(80.0);
        let algo = Backpressure::new(&config, &network).unwrap();
        let mut sim = Simulation::new(config, algo).unwrap();
        sim.run().unwrap();

        let traces = sim.algorithm().traces();
        let alloc = traces.iter().find(|t| t.series == "link0.allocation").unwrap();
        for (_, sample) in alloc.trace.export() {
            assert!(sample.values().iter().sum::<f64>() <= 3.0 + 1e-9);
        }
    }
}
