//! Links, demands and candidate routes. Loaded once, read by the algorithms
//! while they compute gradients; never changed during a run.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub type LinkId = usize;
pub type DemandId = usize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub capacity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Demand {
    /// Utility weight `w` in `w * ln(x)`.
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Fixed volume split across routes (route-split).
    #[serde(default = "default_volume")]
    pub volume: f64,
    #[serde(default = "default_min_rate")]
    pub min_rate: f64,
    #[serde(default = "default_max_rate")]
    pub max_rate: f64,
    /// Mean arrivals per unit time into the ingress queue (backpressure).
    #[serde(default = "default_volume")]
    pub arrival_rate: f64,
    /// Candidate routes, each an ordered list of links. The first is the
    /// primary route for single-path algorithms.
    pub routes: Vec<Vec<LinkId>>,
}

fn default_weight() -> f64 {
    1.0
}

fn default_volume() -> f64 {
    1.0
}

fn default_min_rate() -> f64 {
    0.01
}

fn default_max_rate() -> f64 {
    100.0
}

impl Demand {
    pub fn new(routes: Vec<Vec<LinkId>>) -> Self {
        Self {
            weight: default_weight(),
            volume: default_volume(),
            min_rate: default_min_rate(),
            max_rate: default_max_rate(),
            arrival_rate: default_volume(),
            routes,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = volume;
        self.arrival_rate = volume;
        self
    }

    pub fn with_rate_bounds(mut self, min_rate: f64, max_rate: f64) -> Self {
        self.min_rate = min_rate;
        self.max_rate = max_rate;
        self
    }

    pub fn primary_route(&self) -> &[LinkId] {
        self.routes.first().map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub links: Vec<Link>,
    pub demands: Vec<Demand>,
}

impl Default for Network {
    fn default() -> Self {
        Self::single_link(10.0, 2)
    }
}

impl Network {
    /// `sources` demands sharing one link.
    pub fn single_link(capacity: f64, sources: usize) -> Self {
        Self {
            links: vec![Link { capacity }],
            demands: (0..sources).map(|_| Demand::new(vec![vec![0]])).collect(),
        }
    }

    /// `hops` links in a row: one long demand across all of them plus one
    /// single-hop demand per link.
    pub fn line(hops: usize, capacity: f64) -> Self {
        let links = (0..hops).map(|_| Link { capacity }).collect();
        let mut demands = vec![Demand::new(vec![(0..hops).collect()])];
        demands.extend((0..hops).map(|l| Demand::new(vec![vec![l]])));
        Self { links, demands }
    }

    /// Two parallel links shared by `demands` demands, each with both links
    /// as candidate routes.
    pub fn parallel(capacities: (f64, f64), demands: usize) -> Self {
        Self {
            links: vec![
                Link {
                    capacity: capacities.0,
                },
                Link {
                    capacity: capacities.1,
                },
            ],
            demands: (0..demands)
                .map(|_| Demand::new(vec![vec![0], vec![1]]))
                .collect(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let network: Network = serde_json::from_str(&content)?;
        network.validate()?;
        Ok(network)
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn demand_count(&self) -> usize {
        self.demands.len()
    }

    pub fn capacity(&self, link: LinkId) -> f64 {
        self.links[link].capacity
    }

    pub fn demand(&self, demand: DemandId) -> &Demand {
        &self.demands[demand]
    }

    /// `(demand, route)` pairs whose route crosses `link`, in demand order.
    pub fn routes_through(&self, link: LinkId) -> Vec<(DemandId, usize)> {
        self.demands
            .iter()
            .enumerate()
            .flat_map(|(d, demand)| {
                demand
                    .routes
                    .iter()
                    .enumerate()
                    .filter(move |(_, route)| route.contains(&link))
                    .map(move |(r, _)| (d, r))
            })
            .collect()
    }

    /// Demands whose primary route crosses `link`.
    pub fn primary_users(&self, link: LinkId) -> Vec<DemandId> {
        self.demands
            .iter()
            .enumerate()
            .filter(|(_, d)| d.primary_route().contains(&link))
            .map(|(i, _)| i)
            .collect()
    }

    /// Links touched by any route of `demand`, ascending, without repeats.
    pub fn links_of(&self, demand: DemandId) -> Vec<LinkId> {
        let mut links: Vec<LinkId> =
            self.demands[demand].routes.iter().flatten().copied().collect();
        links.sort_unstable();
        links.dedup();
        links
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.links.is_empty() {
            return Err(ConfigError::InvalidNetwork("no links".into()));
        }
        for (l, link) in self.links.iter().enumerate() {
            if !(link.capacity > 0.0 && link.capacity.is_finite()) {
                return Err(ConfigError::invalid(
                    format!("links[{}].capacity", l),
                    link.capacity,
                    "finite and > 0",
                ));
            }
        }
        for (d, demand) in self.demands.iter().enumerate() {
            if demand.routes.is_empty() {
                return Err(ConfigError::InvalidNetwork(format!("demand {} has no routes", d)));
            }
            for route in &demand.routes {
                if route.is_empty() {
                    return Err(ConfigError::InvalidNetwork(format!(
                        "demand {} has an empty route",
                        d
                    )));
                }
                if let Some(bad) = route.iter().find(|&&l| l >= self.links.len()) {
                    return Err(ConfigError::InvalidNetwork(format!(
                        "demand {} routes over unknown link {}",
                        d, bad
                    )));
                }
            }
            if !(demand.weight > 0.0 && demand.weight.is_finite()) {
                return Err(ConfigError::invalid(
                    format!("demands[{}].weight", d),
                    demand.weight,
                    "finite and > 0",
                ));
            }
            if !(demand.volume >= 0.0 && demand.volume.is_finite()) {
                return Err(ConfigError::invalid(
                    format!("demands[{}].volume", d),
                    demand.volume,
                    "finite and >= 0",
                ));
            }
            if !(demand.arrival_rate >= 0.0 && demand.arrival_rate.is_finite()) {
                return Err(ConfigError::invalid(
                    format!("demands[{}].arrival_rate", d),
                    demand.arrival_rate,
                    "finite and >= 0",
                ));
            }
            let rates_ok = demand.min_rate > 0.0
                && demand.min_rate <= demand.max_rate
                && demand.max_rate.is_finite();
            if !rates_ok {
                return Err(ConfigError::invalid(
                    format!("demands[{}].min_rate", d),
                    demand.min_rate,
                    "> 0 and <= max_rate",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::carried_traffic;

    #[test]
    fn test_line_topology() {
        let net = Network::line(3, 5.0);
        assert_eq!(net.link_count(), 3);
        assert_eq!(net.demand_count(), 4);
        assert_eq!(net.primary_users(1), vec![0, 2]);
        assert_eq!(net.links_of(0), vec![0, 1, 2]);
        assert!(net.validate().is_ok());
    }

    #[test]
    fn test_routes_through_and_carried_traffic() {
        let net = Network::parallel((4.0, 6.0), 2);
        assert_eq!(net.routes_through(1), vec![(0, 1), (1, 1)]);
        let rates = vec![vec![1.0, 2.0], vec![0.5, 0.25]];
        assert_eq!(carried_traffic(&net, 0, &rates), 1.5);
        assert_eq!(carried_traffic(&net, 1, &rates), 2.25);
    }

    #[test]
    fn test_validation_errors() {
        let mut net = Network::single_link(0.0, 1);
        assert!(net.validate().is_err());

        net.links[0].capacity = 1.0;
        net.demands[0].routes = vec![vec![3]];
        assert!(matches!(net.validate(), Err(ConfigError::InvalidNetwork(_))));

        net.demands[0].routes = vec![];
        assert!(net.validate().is_err());

        let mut net = Network::single_link(1.0, 1);
        net.demands[0] = net.demands[0].clone().with_rate_bounds(2.0, 1.0);
        assert!(net.validate().is_err());
    }

    #[test]
    fn test_json_defaults() {
        let json = r#"{ "links": [{ "capacity": 8.0 }], "demands": [{ "routes": [[0]] }] }"#;
        let net: Network = serde_json::from_str(json).unwrap();
        assert_eq!(net.demand(0).weight, 1.0);
        assert_eq!(net.demand(0).max_rate, 100.0);
        assert!(net.validate().is_ok());
    }
}
