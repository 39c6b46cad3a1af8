//! Connector lifecycle as seen by a hosting workflow engine.
//!
//! The host hands over named input parameters, asks the connector to validate
//! them, executes it only if validation passed, then reads named outputs.

use std::{collections::BTreeMap, future::Future};

use serde_json::Value;

use crate::execution::ExecutionError;

pub mod eval;
pub mod shell;
pub mod validation;

pub use validation::ValidationError;

pub type InputParameters = BTreeMap<String, Value>;
pub type OutputParameters = BTreeMap<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("script evaluation failed")]
    Evaluation(#[source] eval::EvalError),
}

pub trait Connector {
    fn set_input_parameters(&mut self, params: InputParameters);

    /// Checks the inputs without side effects.
    fn validate_input_parameters(&self) -> Result<(), ValidationError>;

    fn execute(&mut self) -> impl Future<Output = Result<(), ConnectorError>> + Send;

    fn output_parameters(&self) -> &OutputParameters;
}

/// Host-side lifecycle: set inputs, validate, then execute.
pub async fn validate_and_execute<C: Connector>(
    connector: &mut C,
    params: InputParameters,
) -> Result<(), ConnectorError> {
    connector.set_input_parameters(params);
    connector.validate_input_parameters()?;
    connector.execute().await
}
