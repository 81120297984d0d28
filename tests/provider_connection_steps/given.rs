//! Given steps for provider connection BDD scenarios.

use super::world::{ConnectionWorld, definitions, run_async, target};
use eyre::WrapErr;
use rstest_bdd_macros::given;
use switchboard::capability::domain::{ConnectionFailure, ProviderId};

#[given(r#"a provider "{command}" offering "{names}""#)]
fn a_provider_offering(
    world: &mut ConnectionWorld,
    command: String,
    names: String,
) -> Result<(), eyre::Report> {
    world
        .connector
        .serve(&target(&command)?, definitions(&names)?);
    Ok(())
}

#[given(r#"an unreachable provider "{command}""#)]
fn an_unreachable_provider(world: &mut ConnectionWorld, command: String) -> Result<(), eyre::Report> {
    world
        .connector
        .fail(&target(&command)?, ConnectionFailure::UnreachableTarget);
    Ok(())
}

#[given(r#"provider "{id}" is already connected to "{command}""#)]
fn provider_already_connected(
    world: &mut ConnectionWorld,
    id: String,
    command: String,
) -> Result<(), eyre::Report> {
    let provider_id = ProviderId::new(id)?;
    run_async(world.manager.connect(Some(provider_id), target(&command)?))
        .wrap_err("connect provider for scenario")?;
    Ok(())
}
