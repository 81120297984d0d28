//! Unit tests for the orchestrator services.


use crate::capability::{
    adapters::InMemoryConnector,
    domain::{CapabilityDefinition, ProviderId, ProviderTarget},
    services::{CapabilityRegistry, ConnectionSettings, ProviderConnectionManager},
};
use crate::orchestrator::domain::{Decision, ProviderEntry, RequestedCall};
use mockable::DefaultClock;
use serde_json::{Value, json};
use std::sync::Arc;

type MemoryManager = ProviderConnectionManager<InMemoryConnector, DefaultClock>;

fn manager_over(connector: &InMemoryConnector) -> Arc<MemoryManager> {
    Arc::new(ProviderConnectionManager::new(
        Arc::new(connector.clone()),
        Arc::new(DefaultClock),
        Arc::new(CapabilityRegistry::new()),
        ConnectionSettings::default(),
    ))
}

fn provider(value: &str) -> ProviderId {
    ProviderId::new(value).expect("valid provider id")
}

fn target(command: &str) -> ProviderTarget {
    ProviderTarget::piped(command, Vec::new()).expect("valid piped target")
}

fn serve(connector: &InMemoryConnector, command: &str, names: &[&str]) {
    let definitions = names
        .iter()
        .map(|name| {
            CapabilityDefinition::new(*name, format!("{name} capability"), json!({"type": "object"}))
                .expect("valid definition")
        })
        .collect();
    connector.serve(&target(command), definitions);
}

fn entry(index: usize, id: &str, command: &str) -> ProviderEntry {
    ProviderEntry::new(index, Some(provider(id)), target(command))
}

fn invoke(name: &str, arguments: Value) -> Decision {
    Decision::Invoke {
        thought: format!("calling {name}"),
        calls: vec![RequestedCall::new(format!("call-{name}"), name, arguments)],
    }
}

fn finish(answer: &str) -> Decision {
    Decision::Finish {
        answer: answer.to_owned(),
    }
}
