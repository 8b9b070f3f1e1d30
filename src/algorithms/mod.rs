pub mod backpressure;
pub mod dual_price;
pub mod primal_rate;
pub mod route_split;

use crate::error::{ConfigError, SimError};
use crate::network::Network;
use crate::scheduler::Event;
use crate::simulation::{Experiment, SimConfig, SimContext, Simulation};
use crate::trace::NamedTrace;
use std::collections::HashMap;
use std::fmt;

/// A distributed algorithm plugged into the engine.
///
/// `initialize` schedules each agent's first wake-up. `handle` gets every
/// event in dispatch order and typically reads stale remote state, computes
/// a gradient, steps, signals peers, re-arms its timer and appends a trace
/// sample. Handlers request termination themselves once past the horizon.
pub trait Algorithm {
    type Kind: Copy + fmt::Debug + 'static;
    type Payload: fmt::Debug + 'static;

    fn name(&self) -> &str;

    fn initialize(
        &mut self,
        ctx: &mut SimContext<Self::Kind, Self::Payload>,
    ) -> Result<(), SimError>;

    fn handle(
        &mut self,
        event: Event<Self::Kind, Self::Payload>,
        ctx: &mut SimContext<Self::Kind, Self::Payload>,
    ) -> Result<(), SimError>;

    fn traces(&self) -> Vec<NamedTrace>;

    /// Figure of merit for comparing runs; higher is better.
    fn objective(&self) -> f64;
}

type Factory = Box<
    dyn Fn(&SimConfig, &Network) -> Result<Box<dyn Experiment>, ConfigError> + Send + Sync,
>;

pub struct AlgorithmRegistry {
    algorithms: HashMap<String, Factory>,
}

impl AlgorithmRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            algorithms: HashMap::new(),
        };
        registry.register_builtin();
        registry
    }

    fn register_builtin(&mut self) {
        self.register("dual-price", dual_price::DualPrice::new);
        self.register("dual", dual_price::DualPrice::new);
        self.register("primal-rate", primal_rate::PrimalRate::new);
        self.register("primal", primal_rate::PrimalRate::new);
        self.register("route-split", route_split::RouteSplit::new);
        self.register("multipath", route_split::RouteSplit::new);
        self.register("backpressure", backpressure::Backpressure::new);
        self.register("bp", backpressure::Backpressure::new);
    }

    pub fn register<A, F>(&mut self, name: &str, build: F)
    where
        A: Algorithm + 'static,
        F: Fn(&SimConfig, &Network) -> Result<A, ConfigError> + Send + Sync + 'static,
    {
        let factory: Factory = Box::new(move |config, network| {
            let algorithm = build(config, network)?;
            let sim = Simulation::new(config.clone(), algorithm)?;
            Ok(Box::new(sim) as Box<dyn Experiment>)
        });
        self.algorithms.insert(name.to_lowercase(), factory);
    }

    /// Build the experiment named by `config.algorithm`.
    pub fn create(
        &self,
        config: &SimConfig,
        network: &Network,
    ) -> Result<Box<dyn Experiment>, ConfigError> {
        let factory = self
            .algorithms
            .get(&config.algorithm.to_lowercase())
            .ok_or_else(|| ConfigError::UnknownAlgorithm(config.algorithm.clone()))?;
        factory(config, network)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.algorithms.contains_key(&name.to_lowercase())
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.algorithms.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn global() -> &'static AlgorithmRegistry {
        use std::sync::OnceLock;
        static REGISTRY: OnceLock<AlgorithmRegistry> = OnceLock::new();
        REGISTRY.get_or_init(AlgorithmRegistry::new)
    }
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrap a numeric failure with the agent and event it happened in.
pub(crate) fn numeric_fault(
    agent: impl fmt::Display,
    event: impl fmt::Debug,
    time: f64,
) -> impl FnOnce(crate::error::NumericError) -> SimError {
    let agent = agent.to_string();
    let event = format!("{:?}", event);
    move |source| SimError::numerical(agent, event, time, source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names() {
        let registry = AlgorithmRegistry::global();
        for name in ["dual-price", "primal-rate", "route-split", "backpressure", "BP"] {
            assert!(registry.contains(name), "{} missing", name);
        }
        assert_eq!(registry.list().len(), 8);
    }

    #[test]
    fn test_unknown_algorithm() {
        let config = SimConfig::default().with_algorithm("gossip");
        let err = AlgorithmRegistry::global()
            .create(&config, &Network::default())
            .err()
            .unwrap();
        assert_eq!(err, ConfigError::UnknownAlgorithm("gossip".into()));
    }

    #[test]
    fn test_create_validates_config_first() {
        let mut config = SimConfig::default();
        config.timing.mean_interval = -1.0;
        let err = AlgorithmRegistry::global()
            .create(&config, &Network::single_link(10.0, 2))
            .err()
            .unwrap();
        assert!(err.to_string().contains("timing.mean_interval"));
    }

    #[test]
    fn test_every_builtin_rejects_a_broken_network() {
        let mut network = Network::parallel((6.0, 4.0), 2);
        network.demands[0].routes.push(vec![0, 7]);
        for name in ["dual-price", "primal-rate", "route-split", "backpressure"] {
            let config = SimConfig::default().with_algorithm(name);
            let err = AlgorithmRegistry::global().create(&config, &network).err().unwrap();
            assert!(matches!(err, ConfigError::InvalidNetwork(_)), "{}: {}", name, err);
        }
    }

    #[test]
    fn test_every_builtin_runs() {
        for name in ["dual-price", "primal-rate", "route-split", "backpressure"] {
            let config = SimConfig::default()
                .with_name(name)
                .with_algorithm(name)
                .with_max_intervals(20.0);
            let mut exp = AlgorithmRegistry::global()
                .create(&config, &Network::parallel((6.0, 4.0), 3))
                .unwrap();
            let reason = exp.run().unwrap();
            assert_eq!(reason, crate::scheduler::StopReason::Terminated, "{}", name);
            let report = exp.report();
            assert!(report.summary.end_time > 20.0);
            assert!(report.summary.objective.is_finite());
            assert!(!report.traces.is_empty());
        }
    }
}
