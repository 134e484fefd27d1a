//! Execution and judging engine.
//!
//! Data flow for one submission:
//! [`Judge`] → per test case [`Supervisor`] → [`ResourceMonitor`] (concurrent)
//! → result builder → back to the judge, which keeps running maxima and
//! short-circuits on the first failing case.

pub mod judge;
pub mod languages;
pub mod monitor;
pub mod result;
pub mod supervisor;

pub use judge::Judge;
pub use languages::{LanguageRegistry, LaunchSpec};
pub use monitor::{MonitorHandle, MonitorReport, MonitorState, ResourceMonitor};
pub use supervisor::{Executor, Supervisor, SupervisorSettings};
