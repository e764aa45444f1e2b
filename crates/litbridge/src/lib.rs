//! litbridge: drive a local Lit SDK worker process over loopback JSON/HTTP.

mod health;
mod log_buffer;

pub mod bridge;
pub mod client;
pub mod readiness;
pub mod supervisor;

pub const LITBRIDGE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub use bridge::{BridgeError, JsonObject, RequestBridge};
pub use client::{ClientConfig, ClientError, LitClient};
pub use health::WorkerState;
pub use log_buffer::{DEFAULT_LOG_CAPACITY, LogBuffer};
pub use readiness::{ReadinessProbe, ReadinessTimeout};
pub use supervisor::{SupervisorConfig, SupervisorError, WorkerArtifact, WorkerSupervisor};
