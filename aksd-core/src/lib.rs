//! aksd-core - deploys a packaged service onto an AKS cluster
//!
//! The engine behind `aksd`:
//! - Cluster context bootstrap (credentials -> kubeconfig merge -> namespace)
//! - Generic resource polling with match + ready predicates
//! - Deployment rollout verification
//! - Endpoint resolution for services and ingresses
//! - The deploy orchestrator that sequences all of the above
//!
//! Everything that talks to the outside world (kubectl, az, docker, the
//! environment file) sits behind a trait so the engine can be driven by
//! test doubles.

pub mod bootstrap;
pub mod config;
pub mod container;
pub mod credentials;
pub mod deploy;
pub mod endpoints;
pub mod environment;
pub mod error;
pub mod exec;
pub mod kubeconfig;
pub mod kubectl;
pub mod poller;
pub mod progress;
pub mod rollout;
pub mod target;

#[cfg(test)]
pub(crate) mod testing;

pub use bootstrap::{
    BootstrapConfig, BootstrapOutcome, BootstrapState, ClusterContextBootstrapper, LifecycleEvent,
};
pub use config::{AksOptions, ServiceConfig};
pub use container::ServicePackage;
pub use deploy::{AksTarget, DeployResult};
pub use endpoints::{Endpoint, EndpointResolver};
pub use error::{Error, Result};
pub use poller::PollOptions;
pub use progress::{ProgressReporter, ServiceProgress};
pub use target::TargetResource;
