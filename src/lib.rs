//! Remix deployment-test helpers
//!
//! Utilities used by the scripts that deploy the Remix example apps and run
//! their Cypress suites: manifest editing, dependency injection, running the
//! test runner, waiting for DNS, and naming deployments.

pub mod config;
pub mod cypress;
pub mod error;
pub mod manifest;
pub mod naming;
pub mod poller;

pub use config::{ConfigIssues, DeployTestConfig, PollConfig};
pub use cypress::{
    add_cypress, add_cypress_from, run_cypress, spawn_options, CypressRunner, E2eMode,
    ProcessLauncher, SpawnOptions, StdioMode, SystemLauncher,
};
pub use error::{Error, Result};
pub use manifest::{
    read_package_json, read_root_package_json, update_package_config, Manifest,
};
pub use naming::{app_name, AppNamer, Revision};
pub use poller::{check_up, AvailabilityPoller, DnsResolver, HostResolver, PollHandle};
