//! fleetrun-exec: Execution adapters
//!
//! Defines the [`Transport`] contract every connectivity mechanism implements,
//! the local reference transport, and the [`Runner`] that turns raw adapter
//! output (or adapter faults) into normalized results.

pub mod error;
pub mod local;
pub mod result;
pub mod runner;
pub mod shell;
pub mod staging;
pub mod traits;

pub use error::ExecError;
pub use local::{LocalOptions, LocalTransport, ProcessHandle};
pub use result::{CommandRequest, InputMethod, RawOutput, ScriptRequest, TaskRequest};
pub use runner::Runner;
pub use shell::{Invocation, ShellKind};
pub use traits::{Capabilities, Transport};
