#![warn(clippy::all)]

/// zkident: Zero-Knowledge Identification Protocol Orchestrator
///
/// Runs permutation-based zero-knowledge identification sessions across a
/// family of parameter sets, one isolated protocol instance per set. A
/// cooperative scheduler advances every instance round by round until its
/// impersonation probability drops to 2^-30, collecting transfer and hash
/// telemetry along the way.
///
/// # Architecture
///
/// The library is organized into several key modules:
/// - [`provider`]: keyed-hash and randomness provider with readiness gating
/// - [`reference_engine`]: the protocol engine and its parameter-set module
/// - [`instance`]: per-set round state machine and convergence latch
/// - [`scheduler`]: cooperative tick loop over all instances
/// - [`telemetry`]: snapshot collection, summary tables, CSV/JSON export

// Host integration
pub mod error;
pub mod host;
pub mod provider;

// Protocol engine
pub mod engine;
pub mod reference_engine;

// Orchestration
pub mod factory;
pub mod instance;
pub mod scheduler;

// Measurement and export
pub mod telemetry;

#[cfg(test)]
pub(crate) mod test_double;

// Re-export main types for the public API
pub use error::{EngineError, OrchestratorError};
pub use factory::InstanceFactory;
pub use instance::{Instance, RoundOutcome, RoundState, SECURITY_THRESHOLD};
pub use provider::{CryptoProvider, HmacSha256Provider};
pub use scheduler::{RoundScheduler, SchedulerState, TICK_PERIOD};
pub use telemetry::{TelemetryCollector, TelemetryCounters, TelemetrySnapshot};
