pub mod topology;

pub use topology::{Demand, DemandId, Link, LinkId, Network};

/// Carried traffic on `link` given per-demand, per-route rates.
pub fn carried_traffic(network: &Network, link: LinkId, route_rates: &[Vec<f64>]) -> f64 {
    network
        .routes_through(link)
        .iter()
        .map(|&(d, r)| route_rates.get(d).and_then(|rates| rates.get(r)).copied().unwrap_or(0.0))
        .sum()
}
