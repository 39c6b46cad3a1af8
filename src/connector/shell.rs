//! Shell connector: runs the `script` input through `interpreter parameter`.

use std::sync::Arc;

use serde_json::Value;

use super::{
    validation::{string_param, validate_shell_parameters, INTERPRETER, PARAMETER, SCRIPT},
    Connector, ConnectorError, InputParameters, OutputParameters, ValidationError,
};
use crate::execution::{ExecutionRequest, ScriptExecutor};

pub const RESULT: &str = "result";
pub const EXIT_STATUS: &str = "exitStatus";

#[derive(Debug)]
pub struct ShellConnector {
    executor: Arc<ScriptExecutor>,
    inputs: InputParameters,
    outputs: OutputParameters,
}

impl ShellConnector {
    pub fn new(executor: Arc<ScriptExecutor>) -> Self {
        Self {
            executor,
            inputs: InputParameters::new(),
            outputs: OutputParameters::new(),
        }
    }

    /// Captured combined output, once executed.
    pub fn result(&self) -> Option<&str> {
        self.outputs.get(RESULT).and_then(Value::as_str)
    }

    pub fn exit_status(&self) -> Option<i64> {
        self.outputs.get(EXIT_STATUS).and_then(Value::as_i64)
    }

    fn request(&self) -> Result<ExecutionRequest, ValidationError> {
        validate_shell_parameters(&self.inputs)?;
        let field = |name: &str| string_param(&self.inputs, name).unwrap_or_default().to_string();
        Ok(ExecutionRequest {
            interpreter: field(INTERPRETER),
            parameter: field(PARAMETER),
            script: field(SCRIPT),
        })
    }
}

impl Connector for ShellConnector {
    fn set_input_parameters(&mut self, params: InputParameters) {
        self.inputs = params;
    }

    fn validate_input_parameters(&self) -> Result<(), ValidationError> {
        validate_shell_parameters(&self.inputs)
    }

    async fn execute(&mut self) -> Result<(), ConnectorError> {
        let request = self.request()?;
        tracing::info!(
            interpreter = %request.interpreter,
            parameter = %request.parameter,
            "executing shell connector"
        );
        tracing::debug!(script = %request.script, "script body");

        let result = self.executor.execute(&request).await?;
        self.outputs
            .insert(RESULT.to_string(), Value::String(result.output));
        self.outputs
            .insert(EXIT_STATUS.to_string(), Value::from(result.exit_status));
        Ok(())
    }

    fn output_parameters(&self) -> &OutputParameters {
        &self.outputs
    }
}
