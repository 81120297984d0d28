//! Unit tests for the capability context services.


use crate::capability::{
    domain::{
        CapabilityDefinition, CapabilityDescriptor, CapabilityOutput, InvocationError, ProviderId,
        ProviderTarget,
    },
    ports::CapabilityInvoker,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

/// Invoker that answers every call with the capability name.
struct NameInvoker;

#[async_trait]
impl CapabilityInvoker for NameInvoker {
    async fn invoke(
        &self,
        capability: &str,
        _arguments: Value,
    ) -> Result<CapabilityOutput, InvocationError> {
        Ok(CapabilityOutput::new(capability, Value::Null))
    }
}

fn provider(value: &str) -> ProviderId {
    ProviderId::new(value).expect("valid provider id")
}

fn definition(name: &str) -> CapabilityDefinition {
    CapabilityDefinition::new(name, format!("{name} capability"), json!({"type": "object"}))
        .expect("valid definition")
}

fn definitions(names: &[&str]) -> Vec<CapabilityDefinition> {
    names.iter().map(|name| definition(name)).collect()
}

fn descriptors(provider_id: &ProviderId, names: &[&str]) -> Vec<CapabilityDescriptor> {
    let invoker: Arc<dyn CapabilityInvoker> = Arc::new(NameInvoker);
    names
        .iter()
        .map(|name| {
            CapabilityDescriptor::new(provider_id.clone(), definition(name), invoker.clone())
                .expect("valid descriptor")
        })
        .collect()
}

fn piped_target(command: &str) -> ProviderTarget {
    ProviderTarget::piped(command, Vec::new()).expect("valid piped target")
}

fn names_of(snapshot: &crate::capability::services::CapabilitySnapshot) -> Vec<String> {
    snapshot
        .qualified_names()
        .iter()
        .map(ToString::to_string)
        .collect()
}
