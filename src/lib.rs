pub mod algorithms;
pub mod channel;
pub mod error;
pub mod gradient;
pub mod metrics;
pub mod network;
pub mod project;
pub mod rng;
pub mod scheduler;
pub mod simulation;
pub mod timing;
pub mod trace;

pub use algorithms::{Algorithm, AlgorithmRegistry};
pub use error::{ConfigError, NumericError, SimError};
pub use network::Network;
pub use simulation::{Experiment, SimConfig, Simulation};

pub mod prelude {
    pub use crate::algorithms::{Algorithm, AlgorithmRegistry};
    pub use crate::channel::ChannelSpec;
    pub use crate::error::{ConfigError, NumericError, SimError};
    pub use crate::gradient::{Bounds, GradientStepSpec, ScalarState, VectorState};
    pub use crate::metrics::{RunReport, RunSummary};
    pub use crate::network::Network;
    pub use crate::project::Projection;
    pub use crate::rng::{RandomStream, UnitSource};
    pub use crate::scheduler::{Event, Scheduler, StopReason};
    pub use crate::simulation::{Experiment, SimConfig, SimContext, Simulation};
    pub use crate::timing::{TimingSpec, WakeTimer};
    pub use crate::trace::{NamedTrace, Trace};
}
