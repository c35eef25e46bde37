//! Autopilot Engine - Async cycle runtime
//!
//! The engine crate owns everything that crosses a process boundary:
//! the language-model oracle, executor dispatch over HTTP, and the
//! phase orchestrator that drives one department through a full cycle.
//! All domain logic stays in `autopilot-core`; all persistence stays in
//! `autopilot-store` behind the port traits.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod act;
pub mod cycle;
pub mod genesis;
pub mod intel;
pub mod learn;
pub mod lifecycle;
pub mod oracle;
pub mod recall;
pub mod sense;
pub mod think;

pub use act::{ActReport, ExecutorInvoker, HttpInvoker, InvocationContext, InvocationOutcome};
pub use cycle::{CycleOutcome, CycleReport, Engine};
pub use oracle::{Oracle, OracleClient, OracleRequest};
pub use recall::RecalledMemory;
pub use think::ThinkInput;
