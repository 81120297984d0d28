//! Then steps for provider connection BDD scenarios.

use super::world::{ConnectionWorld, run_async, split_list};
use rstest_bdd_macros::then;
use serde_json::json;
use switchboard::capability::domain::NotFoundError;

#[then(r#"the registry lists "{names}""#)]
fn registry_lists(world: &ConnectionWorld, names: String) -> Result<(), eyre::Report> {
    let listed: Vec<String> = world
        .manager
        .registry()
        .snapshot()
        .qualified_names()
        .iter()
        .map(ToString::to_string)
        .collect();
    let expected = split_list(&names);
    if listed != expected {
        return Err(eyre::eyre!("expected {expected:?}, registry lists {listed:?}"));
    }
    Ok(())
}

#[then("the registry is empty")]
fn registry_is_empty(world: &ConnectionWorld) -> Result<(), eyre::Report> {
    let snapshot = world.manager.registry().snapshot();
    if !snapshot.is_empty() {
        return Err(eyre::eyre!(
            "expected an empty registry, found {} entries",
            snapshot.len()
        ));
    }
    Ok(())
}

#[then("{count:usize} connections are live")]
fn connections_are_live(world: &ConnectionWorld, count: usize) -> Result<(), eyre::Report> {
    let records = world.manager.connections();
    if records.len() != count {
        return Err(eyre::eyre!(
            "expected {count} connections, found {}",
            records.len()
        ));
    }
    if world.connector.live_count() != count {
        return Err(eyre::eyre!(
            "expected {count} open bindings, found {}",
            world.connector.live_count()
        ));
    }
    Ok(())
}

#[then(r#"the connection fails with "{reason}""#)]
fn connection_fails_with(world: &ConnectionWorld, reason: String) -> Result<(), eyre::Report> {
    let result = world
        .last_connect
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing connection result in scenario world"))?;
    match result {
        Err(err) if err.reason().as_str() == reason => Ok(()),
        other => Err(eyre::eyre!("expected {reason} failure, got {other:?}")),
    }
}

#[then(r#"calling "{name}" answers "{text}""#)]
fn calling_answers(world: &ConnectionWorld, name: String, text: String) -> Result<(), eyre::Report> {
    let descriptor = world
        .manager
        .registry()
        .resolve(&name)
        .map_err(|err| eyre::eyre!("resolve failed: {err}"))?;
    let output = run_async(descriptor.invoke(json!({})))
        .map_err(|err| eyre::eyre!("call failed: {err}"))?;
    if output.text() != text {
        return Err(eyre::eyre!("expected '{text}', got '{}'", output.text()));
    }
    Ok(())
}

#[then(r#"resolution is ambiguous between "{names}""#)]
fn resolution_is_ambiguous(world: &ConnectionWorld, names: String) -> Result<(), eyre::Report> {
    let result = world
        .last_resolve
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing resolution result in scenario world"))?;
    let Err(NotFoundError::Ambiguous { candidates, .. }) = result else {
        return Err(eyre::eyre!("expected an ambiguous resolution"));
    };
    let listed: Vec<String> = candidates.iter().map(ToString::to_string).collect();
    let expected = split_list(&names);
    if listed != expected {
        return Err(eyre::eyre!("expected candidates {expected:?}, got {listed:?}"));
    }
    Ok(())
}

#[then(r#"the teardown closed "{ids}""#)]
fn teardown_closed(world: &ConnectionWorld, ids: String) -> Result<(), eyre::Report> {
    let report = world
        .last_teardown
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing teardown report in scenario world"))?;
    let mut closed: Vec<&str> = report.closed.iter().map(|id| id.as_str()).collect();
    closed.sort_unstable();
    let expected = split_list(&ids);
    if closed != expected || !report.is_clean() {
        return Err(eyre::eyre!("unexpected teardown report {report:?}"));
    }
    Ok(())
}
