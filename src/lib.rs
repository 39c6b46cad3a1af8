//! Runs user-supplied scripts through an external interpreter and reports the
//! combined output and exit status, releasing the script file and the process
//! on every path.

pub mod config;
pub mod connector;
pub mod execution;

pub use connector::{
    shell::ShellConnector, validate_and_execute, Connector, ConnectorError, InputParameters,
    OutputParameters, ValidationError,
};
pub use execution::{
    ExecutionError, ExecutionRequest, ExecutionResult, ExecutorSettings, ScriptExecutor,
};
