//! Capability metadata and routable descriptors.

use super::{CapabilityDomainError, InvocationError, ProviderId, QualifiedName};
use crate::capability::ports::CapabilityInvoker;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Metadata for one capability as advertised by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDefinition {
    name: String,
    description: String,
    input_schema: Value,
}

impl CapabilityDefinition {
    /// Creates a capability definition.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityDomainError::EmptyCapabilityName`] when the name is
    /// empty after trimming.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Result<Self, CapabilityDomainError> {
        let normalized_name = name.into().trim().to_owned();
        if normalized_name.is_empty() {
            return Err(CapabilityDomainError::EmptyCapabilityName);
        }

        Ok(Self {
            name: normalized_name,
            description: description.into().trim().to_owned(),
            input_schema,
        })
    }

    /// Returns the capability name, unique within its provider.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the capability description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the input schema.
    #[must_use]
    pub const fn input_schema(&self) -> &Value {
        &self.input_schema
    }
}

/// Result of a successful capability invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityOutput {
    text: String,
    content: Value,
}

impl CapabilityOutput {
    /// Creates an output from its rendered text and raw content.
    #[must_use]
    pub fn new(text: impl Into<String>, content: Value) -> Self {
        Self {
            text: text.into(),
            content,
        }
    }

    /// Returns the text rendering of the output.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the raw content blocks reported by the provider.
    #[must_use]
    pub const fn content(&self) -> &Value {
        &self.content
    }
}

/// Entry of the capability listing shown to the reasoning layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityListing {
    /// Provider-qualified capability name.
    pub qualified_name: QualifiedName,
    /// Capability description.
    pub description: String,
    /// Structural description of accepted arguments.
    pub input_schema: Value,
}

/// Published, read-only descriptor of one invocable capability.
///
/// A descriptor is produced by a transport binding when it opens and holds
/// only the route needed to reach that binding. Once the owning binding is
/// closed, [`CapabilityDescriptor::invoke`] fails with `connection_closed`.
#[derive(Clone)]
pub struct CapabilityDescriptor {
    qualified_name: QualifiedName,
    definition: CapabilityDefinition,
    invoker: Arc<dyn CapabilityInvoker>,
}

impl CapabilityDescriptor {
    /// Binds a definition to the provider that advertised it.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityDomainError`] when the qualified name cannot be
    /// formed.
    pub fn new(
        provider_id: ProviderId,
        definition: CapabilityDefinition,
        invoker: Arc<dyn CapabilityInvoker>,
    ) -> Result<Self, CapabilityDomainError> {
        let qualified_name = QualifiedName::new(provider_id, definition.name())?;
        Ok(Self {
            qualified_name,
            definition,
            invoker,
        })
    }

    /// Returns the provider-qualified name.
    #[must_use]
    pub const fn qualified_name(&self) -> &QualifiedName {
        &self.qualified_name
    }

    /// Returns the owning provider id.
    #[must_use]
    pub const fn provider_id(&self) -> &ProviderId {
        self.qualified_name.provider_id()
    }

    /// Returns the capability name as advertised by the provider.
    #[must_use]
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    /// Returns the capability description.
    #[must_use]
    pub fn description(&self) -> &str {
        self.definition.description()
    }

    /// Returns the input schema.
    #[must_use]
    pub const fn input_schema(&self) -> &Value {
        self.definition.input_schema()
    }

    /// Returns the listing entry for this capability.
    #[must_use]
    pub fn listing(&self) -> CapabilityListing {
        CapabilityListing {
            qualified_name: self.qualified_name.clone(),
            description: self.definition.description().to_owned(),
            input_schema: self.definition.input_schema().clone(),
        }
    }

    /// Invokes the capability on its owning provider.
    ///
    /// # Errors
    ///
    /// Returns `invalid_arguments` without touching the transport when the
    /// arguments are not an object or miss a required key, and otherwise
    /// whatever the owning binding reports.
    pub async fn invoke(&self, arguments: Value) -> Result<CapabilityOutput, InvocationError> {
        let checked = self.check_arguments(arguments)?;
        self.invoker.invoke(self.name(), checked).await
    }

    /// Invokes the capability, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `timed_out` when the deadline expires, otherwise the same
    /// errors as [`CapabilityDescriptor::invoke`].
    pub async fn invoke_with_timeout(
        &self,
        arguments: Value,
        timeout: Duration,
    ) -> Result<CapabilityOutput, InvocationError> {
        tokio::time::timeout(timeout, self.invoke(arguments))
            .await
            .map_err(|_| {
                InvocationError::timed_out(format!(
                    "{} did not answer within {}ms",
                    self.qualified_name,
                    timeout.as_millis()
                ))
            })?
    }

    fn check_arguments(&self, arguments: Value) -> Result<Value, InvocationError> {
        let object = match arguments {
            Value::Null => Map::new(),
            Value::Object(object) => object,
            other => {
                return Err(InvocationError::invalid_arguments(format!(
                    "arguments for {} must be a JSON object, got {}",
                    self.qualified_name,
                    json_type_name(&other)
                )));
            }
        };

        let required = self
            .input_schema()
            .get("required")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let missing: Vec<&str> = required
            .iter()
            .filter_map(Value::as_str)
            .filter(|key| !object.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            return Err(InvocationError::invalid_arguments(format!(
                "arguments for {} are missing required keys: {}",
                self.qualified_name,
                missing.join(", ")
            )));
        }

        Ok(Value::Object(object))
    }
}

impl fmt::Debug for CapabilityDescriptor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CapabilityDescriptor")
            .field("qualified_name", &self.qualified_name)
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::domain::InvocationFailure;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingInvoker {
        calls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl CapabilityInvoker for RecordingInvoker {
        async fn invoke(
            &self,
            capability: &str,
            arguments: Value,
        ) -> Result<CapabilityOutput, InvocationError> {
            self.calls
                .lock()
                .expect("calls lock")
                .push((capability.to_owned(), arguments.clone()));
            Ok(CapabilityOutput::new(arguments.to_string(), Value::Null))
        }
    }

    fn descriptor(invoker: Arc<RecordingInvoker>) -> CapabilityDescriptor {
        let definition = CapabilityDefinition::new(
            "read_file",
            "Reads a file",
            json!({"type": "object", "required": ["path"]}),
        )
        .expect("valid definition");
        CapabilityDescriptor::new(
            ProviderId::new("files").expect("valid id"),
            definition,
            invoker,
        )
        .expect("valid descriptor")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invoke_forwards_unqualified_name_and_arguments() {
        let invoker = Arc::new(RecordingInvoker::default());
        let descriptor = descriptor(invoker.clone());

        let output = descriptor
            .invoke(json!({"path": "/tmp/a"}))
            .await
            .expect("invocation should succeed");

        assert_eq!(output.text(), r#"{"path":"/tmp/a"}"#);
        let calls = invoker.calls.lock().expect("calls lock");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls.first().map(|call| call.0.as_str()), Some("read_file"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_required_key_is_rejected_before_dispatch() {
        let invoker = Arc::new(RecordingInvoker::default());
        let descriptor = descriptor(invoker.clone());

        let error = descriptor
            .invoke(json!({}))
            .await
            .expect_err("missing key should be rejected");

        assert_eq!(error.reason(), InvocationFailure::InvalidArguments);
        assert!(invoker.calls.lock().expect("calls lock").is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn non_object_arguments_are_rejected() {
        let descriptor = descriptor(Arc::new(RecordingInvoker::default()));

        let error = descriptor
            .invoke(json!(["/tmp/a"]))
            .await
            .expect_err("array arguments should be rejected");

        assert_eq!(error.reason(), InvocationFailure::InvalidArguments);
        assert!(error.detail().contains("array"));
    }

    #[test]
    fn qualified_name_uses_provider_prefix() {
        let descriptor = descriptor(Arc::new(RecordingInvoker::default()));
        assert_eq!(descriptor.qualified_name().to_string(), "files:read_file");
        assert_eq!(descriptor.listing().description, "Reads a file");
    }
}
