//! When steps for provider connection BDD scenarios.

use super::world::{ConnectionWorld, run_async, target};
use rstest_bdd_macros::when;
use switchboard::capability::domain::ProviderId;

#[when(r#"provider "{id}" is connected to "{command}""#)]
fn connect_provider(
    world: &mut ConnectionWorld,
    id: String,
    command: String,
) -> Result<(), eyre::Report> {
    let provider_id = ProviderId::new(id)?;
    world.last_connect = Some(run_async(
        world.manager.connect(Some(provider_id), target(&command)?),
    ));
    Ok(())
}

#[when(r#"provider "{id}" is disconnected"#)]
fn disconnect_provider(world: &mut ConnectionWorld, id: String) -> Result<(), eyre::Report> {
    let provider_id = ProviderId::new(id)?;
    run_async(world.manager.disconnect(&provider_id))
        .map_err(|err| eyre::eyre!("disconnect failed: {err}"))?;
    Ok(())
}

#[when(r#""{name}" is resolved"#)]
fn resolve_name(world: &mut ConnectionWorld, name: String) {
    world.last_resolve = Some(world.manager.registry().resolve(&name));
}

#[when("all providers are disconnected")]
fn disconnect_everything(world: &mut ConnectionWorld) {
    world.last_teardown = Some(run_async(world.manager.disconnect_all()));
}
