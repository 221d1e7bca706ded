//! Tool-related types.

use std::sync::Arc;

use protocol::{CorrelationId, Outcome, ParameterSchema, ServerFrame, ToolListing};
use serde_json::{Map, Value};

use super::{ToolError, ToolHandler};

/// A registered tool: name, description, declared parameters and handler.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub schema: ParameterSchema,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: ParameterSchema,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            handler,
        }
    }

    pub fn listing(&self) -> ToolListing {
        ToolListing {
            name: self.name.clone(),
            description: self.description.clone(),
            parameter_schema: self.schema.clone(),
        }
    }
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// A call to a tool as received from a transport.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub tool_name: String,
    pub raw_parameters: Value,
    /// Present on the duplex channel only.
    pub correlation_id: Option<CorrelationId>,
}

impl InvocationRequest {
    pub fn new(tool_name: impl Into<String>, raw_parameters: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            raw_parameters,
            correlation_id: None,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<CorrelationId>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// Outcome of a dispatched call. Exactly one of payload or failure.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationResult {
    Success { payload: Value },
    Failure(ToolError),
}

impl InvocationResult {
    pub fn success(payload: Value) -> Self {
        Self::Success { payload }
    }

    pub fn failure(error: ToolError) -> Self {
        Self::Failure(error)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, InvocationResult::Success { .. })
    }

    pub fn error(&self) -> Option<&ToolError> {
        match self {
            InvocationResult::Failure(error) => Some(error),
            InvocationResult::Success { .. } => None,
        }
    }

    pub fn into_outcome(self) -> Outcome {
        match self {
            InvocationResult::Success { payload } => Outcome::Success { payload },
            InvocationResult::Failure(error) => Outcome::Error {
                error: error.to_body(),
            },
        }
    }

    /// Result frame tagged with the caller's correlation id.
    pub fn into_frame(self, correlation_id: CorrelationId) -> ServerFrame {
        ServerFrame::Result {
            correlation_id,
            outcome: self.into_outcome(),
        }
    }
}

/// Validated parameters handed to a handler.
///
/// Only declared parameters are present, each already checked against its
/// declared type, so the typed getters only return `None` for parameters
/// the caller left out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Map<String, Value>);

impl Params {
    pub fn new(values: Map<String, Value>) -> Self {
        Self(values)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn object(&self, name: &str) -> Option<&Map<String, Value>> {
        self.get(name).and_then(Value::as_object)
    }

    pub fn array(&self, name: &str) -> Option<&Vec<Value>> {
        self.get(name).and_then(Value::as_array)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}
