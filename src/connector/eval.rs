//! Connector for in-process script evaluators.
//!
//! The evaluator itself (a scripting engine embedded in the host) sits behind
//! [`Evaluator`]; this module only turns host inputs into a binding table and
//! maps results and failures back.

use serde_json::Value;

use super::{
    validation::{string_param, SCRIPT},
    Connector, ConnectorError, InputParameters, OutputParameters, ValidationError,
};

pub const VARIABLES: &str = "variables";
pub const RESULT: &str = "result";
/// Binding name replaced by the host's API accessor instead of the supplied value.
pub const API_ACCESSOR: &str = "apiAccessor";

pub type EvalError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum Binding<A> {
    Value(Value),
    Accessor(A),
}

/// Ordered name/value table handed to an evaluator.
///
/// The first binding for a name wins; later duplicates are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableBindings<A> {
    entries: Vec<(String, Binding<A>)>,
}

impl<A> Default for VariableBindings<A> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<A: Clone> VariableBindings<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when `name` was already bound.
    pub fn bind(&mut self, name: impl Into<String>, binding: Binding<A>) -> bool {
        let name = name.into();
        if self.get(&name).is_some() {
            tracing::debug!(%name, "duplicate variable ignored");
            return false;
        }
        self.entries.push((name, binding));
        true
    }

    pub fn get(&self, name: &str) -> Option<&Binding<A>> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, b)| b)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Binding<A>)> {
        self.entries.iter().map(|(n, b)| (n.as_str(), b))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds the table from host rows shaped `[[name, value], ...]`.
    ///
    /// Rows that are not two-element arrays and rows with a null name are skipped.
    /// Non-string names are bound under their JSON text.
    pub fn from_rows(rows: Option<&Value>, accessor: &A) -> Self {
        let mut bindings = Self::new();
        let Some(rows) = rows.and_then(Value::as_array) else {
            return bindings;
        };
        for row in rows {
            let pair = row
                .as_array()
                .and_then(|r| <&[Value; 2]>::try_from(r.as_slice()).ok());
            let Some([name, value]) = pair else {
                continue;
            };
            let name = match name {
                Value::Null => continue,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let binding = if name == API_ACCESSOR {
                Binding::Accessor(accessor.clone())
            } else {
                Binding::Value(value.clone())
            };
            bindings.bind(name, binding);
        }
        bindings
    }
}

/// Compiles and evaluates a text script against a binding table.
pub trait Evaluator {
    type Accessor: Clone + Send + Sync;

    fn evaluate(
        &self,
        script: &str,
        bindings: &VariableBindings<Self::Accessor>,
    ) -> Result<Value, EvalError>;
}

#[derive(Debug)]
pub struct ScriptConnector<E: Evaluator> {
    evaluator: E,
    accessor: E::Accessor,
    inputs: InputParameters,
    outputs: OutputParameters,
}

impl<E: Evaluator> ScriptConnector<E> {
    pub fn new(evaluator: E, accessor: E::Accessor) -> Self {
        Self {
            evaluator,
            accessor,
            inputs: InputParameters::new(),
            outputs: OutputParameters::new(),
        }
    }

    pub fn result(&self) -> Option<&Value> {
        self.outputs.get(RESULT)
    }
}

impl<E> Connector for ScriptConnector<E>
where
    E: Evaluator + Send,
{
    fn set_input_parameters(&mut self, params: InputParameters) {
        self.inputs = params;
    }

    fn validate_input_parameters(&self) -> Result<(), ValidationError> {
        match string_param(&self.inputs, SCRIPT) {
            Some(_) => Ok(()),
            None => Err(ValidationError::new("The script is null")),
        }
    }

    async fn execute(&mut self) -> Result<(), ConnectorError> {
        let script = string_param(&self.inputs, SCRIPT)
            .ok_or_else(|| ValidationError::new("The script is null"))?;
        let bindings = VariableBindings::from_rows(self.inputs.get(VARIABLES), &self.accessor);
        tracing::debug!(variables = bindings.len(), "evaluating script");

        let result = self
            .evaluator
            .evaluate(script, &bindings)
            .map_err(ConnectorError::Evaluation)?;
        self.outputs.insert(RESULT.to_string(), result);
        Ok(())
    }

    fn output_parameters(&self) -> &OutputParameters {
        &self.outputs
    }
}
