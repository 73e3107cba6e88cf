//! Stream Orchestrator and the pieces around it: the per-persona state
//! machine, the feedback parser, the result assembler and export.

pub mod assembler;
pub mod export;
pub mod handlers;
pub mod parser;
pub mod registry;
pub mod run;
pub mod state_machine;

pub use registry::RunRegistry;
pub use run::{Orchestrator, OrchestratorConfig, RetryError, RunEvent, SettlementOutcome};
