//! Integration tests for piped providers, driven against the `echo_provider`
//! binary.

mod support {
    pub mod log_capture;
    pub mod provider_locator;
}

use eyre::{Result, ensure, eyre};
use mockable::DefaultClock;
use rstest::rstest;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use support::provider_locator::echo_provider_path;
use switchboard::capability::{
    adapters::{PipedConnector, TransportSettings},
    domain::{ConnectionFailure, InvocationFailure, ProviderId, ProviderTarget, TransportKind},
    services::{CapabilityRegistry, ConnectionSettings, ProviderConnectionManager},
};

type PipedManager = ProviderConnectionManager<PipedConnector, DefaultClock>;

fn manager(transport: TransportSettings, connection: ConnectionSettings) -> PipedManager {
    ProviderConnectionManager::new(
        Arc::new(PipedConnector::new(transport)),
        Arc::new(DefaultClock),
        Arc::new(CapabilityRegistry::new()),
        connection,
    )
}

fn default_manager() -> PipedManager {
    manager(TransportSettings::default(), ConnectionSettings::default())
}

fn echo_target(args: &[&str]) -> Result<ProviderTarget> {
    let path = echo_provider_path()?;
    Ok(ProviderTarget::piped(
        path.as_str(),
        args.iter().map(|arg| (*arg).to_owned()),
    )?)
}

fn provider(value: &str) -> Result<ProviderId> {
    Ok(ProviderId::new(value)?)
}

#[cfg(unix)]
fn process_ids(manager: &PipedManager) -> Result<Vec<u32>> {
    manager
        .connections()
        .iter()
        .map(|record| {
            record
                .process_id()
                .ok_or_else(|| eyre!("{} has no pid", record.provider_id()))
        })
        .collect()
}

/// Reports whether no process with `pid` exists any more, zombies included.
#[cfg(unix)]
fn process_is_gone(pid: u32) -> Result<bool> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    Ok(kill(Pid::from_raw(i32::try_from(pid)?), None) == Err(Errno::ESRCH))
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn connect_discovers_every_page_of_capabilities() -> Result<()> {
    let manager = default_manager();
    let id = manager
        .connect(
            Some(provider("echo")?),
            echo_target(&["echo", "sleep", "fail"])?,
        )
        .await?;

    let names: Vec<String> = manager
        .registry()
        .snapshot()
        .qualified_names()
        .iter()
        .map(ToString::to_string)
        .collect();
    ensure!(
        names == ["echo:echo", "echo:sleep", "echo:fail"],
        "unexpected capabilities {names:?}"
    );

    let records = manager.connections();
    let record = records.first().ok_or_else(|| eyre!("missing record"))?;
    ensure!(record.kind() == TransportKind::Piped);
    ensure!(record.capability_count() == 3);
    ensure!(record.process_id().is_some(), "piped record carries a pid");

    manager.disconnect(&id).await?;
    ensure!(manager.registry().is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn calls_are_routed_to_the_child_process() -> Result<()> {
    let manager = default_manager();
    manager
        .connect(Some(provider("echo")?), echo_target(&["echo", "fail"])?)
        .await?;

    let echoed = manager
        .registry()
        .resolve("echo")?
        .invoke(json!({"x": 1}))
        .await?;
    ensure!(
        echoed.text() == r#"echo {"x":1}"#,
        "got {}",
        echoed.text()
    );

    let failure = manager
        .registry()
        .resolve("echo:fail")?
        .invoke(json!({}))
        .await
        .err()
        .ok_or_else(|| eyre!("fail tool should fail"))?;
    ensure!(failure.reason() == InvocationFailure::RemoteFault);
    ensure!(failure.detail() == "fail requested");

    manager.disconnect_all().await;
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn missing_executables_fail_to_spawn() -> Result<()> {
    let manager = default_manager();
    let error = manager
        .connect(
            Some(provider("ghost")?),
            ProviderTarget::piped("/nonexistent/switchboard-provider", Vec::new())?,
        )
        .await
        .err()
        .ok_or_else(|| eyre!("spawn should fail"))?;

    ensure!(error.reason() == ConnectionFailure::SpawnFailed);
    ensure!(manager.connections().is_empty());
    ensure!(manager.registry().is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn silent_providers_time_out_during_the_handshake() -> Result<()> {
    let manager = manager(
        TransportSettings {
            handshake_timeout: Duration::from_millis(300),
            ..TransportSettings::default()
        },
        ConnectionSettings::default(),
    );
    let id = provider("mute")?;

    let error = manager
        .connect(Some(id.clone()), echo_target(&["--silent"])?)
        .await
        .err()
        .ok_or_else(|| eyre!("silent provider should time out"))?;

    ensure!(error.reason() == ConnectionFailure::HandshakeTimeout);
    ensure!(!manager.is_connected(&id));

    // The id is free again once the failed attempt is cleaned up.
    manager.connect(Some(id), echo_target(&[])?).await?;
    manager.disconnect_all().await;
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn disconnect_fails_calls_in_flight() -> Result<()> {
    let manager = Arc::new(default_manager());
    let id = manager
        .connect(Some(provider("slow")?), echo_target(&["sleep"])?)
        .await?;
    let descriptor = manager.registry().resolve("slow:sleep")?;

    let call = tokio::spawn(async move { descriptor.invoke(json!({"ms": 10_000})).await });
    tokio::time::sleep(Duration::from_millis(200)).await;
    manager.disconnect(&id).await?;

    let outcome = tokio::time::timeout(Duration::from_secs(5), call).await??;
    let error = outcome
        .err()
        .ok_or_else(|| eyre!("call should fail once the provider is gone"))?;
    ensure!(error.reason() == InvocationFailure::ConnectionClosed);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn slow_calls_hit_the_transport_deadline() -> Result<()> {
    let manager = manager(
        TransportSettings {
            call_timeout: Duration::from_millis(200),
            ..TransportSettings::default()
        },
        ConnectionSettings::default(),
    );
    manager
        .connect(Some(provider("slow")?), echo_target(&["sleep"])?)
        .await?;

    let error = manager
        .registry()
        .resolve("sleep")?
        .invoke(json!({"ms": 5_000}))
        .await
        .err()
        .ok_or_else(|| eyre!("call should time out"))?;

    ensure!(error.reason() == InvocationFailure::TimedOut);
    manager.disconnect_all().await;
    Ok(())
}

#[cfg(unix)]
#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stubborn_providers_are_killed_after_the_grace_period() -> Result<()> {
    let manager = manager(
        TransportSettings {
            close_grace: Duration::from_millis(300),
            ..TransportSettings::default()
        },
        ConnectionSettings::default(),
    );
    let id = manager
        .connect(Some(provider("stubborn")?), echo_target(&["--ignore-term"])?)
        .await?;

    let started = Instant::now();
    manager.disconnect(&id).await?;

    ensure!(started.elapsed() >= Duration::from_millis(300));
    ensure!(!manager.is_connected(&id));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn derived_ids_are_stable_for_the_same_command_line() -> Result<()> {
    let manager = default_manager();
    let target = echo_target(&["echo"])?;
    let expected = ProviderId::derive_from(&target);

    let id = manager.connect(None, target.clone()).await?;
    ensure!(id == expected);

    let duplicate = manager
        .connect(None, target)
        .await
        .err()
        .ok_or_else(|| eyre!("same target twice should be a duplicate"))?;
    ensure!(duplicate.reason() == ConnectionFailure::DuplicateProvider);

    let report = manager.disconnect_all().await;
    ensure!(report.is_clean(), "teardown report {report:?}");
    ensure!(report.closed == [id]);
    Ok(())
}

#[cfg(unix)]
#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn teardown_leaves_no_provider_process_behind() -> Result<()> {
    let manager = manager(
        TransportSettings {
            close_grace: Duration::from_millis(300),
            ..TransportSettings::default()
        },
        ConnectionSettings::default(),
    );
    manager
        .connect(Some(provider("polite")?), echo_target(&["alpha"])?)
        .await?;
    manager
        .connect(Some(provider("stubborn")?), echo_target(&["--ignore-term", "beta"])?)
        .await?;
    let pids = process_ids(&manager)?;
    ensure!(pids.len() == 2);

    let report = manager.disconnect_all().await;

    ensure!(report.is_clean(), "teardown report {report:?}");
    ensure!(report.closed.len() == 2);
    ensure!(manager.registry().snapshot().is_empty());
    for pid in pids {
        ensure!(process_is_gone(pid)?, "provider process {pid} survived teardown");
    }
    Ok(())
}

#[cfg(unix)]
#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn close_deadlines_shorter_than_the_grace_period_still_reap() -> Result<()> {
    use switchboard::config::TimeoutConfig;

    let timeouts = TimeoutConfig {
        close_grace_ms: 3_000,
        close_ms: 300,
        ..TimeoutConfig::default()
    };
    let manager = manager(timeouts.transport_settings(), timeouts.connection_settings());
    manager
        .connect(Some(provider("stubborn")?), echo_target(&["--ignore-term"])?)
        .await?;
    let pids = process_ids(&manager)?;

    let report = manager.disconnect_all().await;

    ensure!(report.is_clean(), "teardown report {report:?}");
    for pid in pids {
        ensure!(process_is_gone(pid)?, "provider process {pid} outlived its close");
    }
    Ok(())
}

#[cfg(unix)]
#[rstest]
#[tokio::test]
async fn providers_that_die_are_reported_until_disconnected() -> Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;
    use support::log_capture::CapturedLogs;

    let (logs, _logging) = CapturedLogs::install();
    let manager = default_manager();
    let doomed = manager
        .connect(Some(provider("doomed")?), echo_target(&["echo"])?)
        .await?;
    let steady = manager
        .connect(Some(provider("steady")?), echo_target(&["other"])?)
        .await?;
    let record = manager
        .connections()
        .into_iter()
        .find(|record| record.provider_id() == &doomed)
        .ok_or_else(|| eyre!("missing record"))?;
    let pid = record.process_id().ok_or_else(|| eyre!("missing pid"))?;

    kill(Pid::from_raw(i32::try_from(pid)?), Signal::SIGKILL)?;
    let warnings = logs.wait_for("provider_id=doomed", 40).await;

    ensure!(
        warnings.iter().any(|line| line.contains("went away")),
        "got {warnings:?}"
    );
    ensure!(manager.is_connected(&doomed), "the provider stays listed");
    let error = manager
        .registry()
        .resolve("doomed:echo")?
        .invoke(json!({}))
        .await
        .err()
        .ok_or_else(|| eyre!("dead provider should refuse calls"))?;
    ensure!(error.reason() == InvocationFailure::ConnectionClosed);

    manager.disconnect(&doomed).await?;
    manager.disconnect(&steady).await?;
    ensure!(manager.registry().is_empty());
    ensure!(
        logs.lines_with("provider_id=steady").is_empty(),
        "orderly disconnects stay quiet"
    );
    Ok(())
}
