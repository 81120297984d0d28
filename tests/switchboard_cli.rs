//! Behavioural tests for the `switchboard` operator binary.

mod support {
    pub mod provider_locator;
}

use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use camino::{Utf8Path, Utf8PathBuf};
use eyre::{Result, ensure, eyre};
use serde_json::{Value, json};
use std::io::Write;
use std::process::{Command, Output, Stdio};
use support::provider_locator::echo_provider_path;

fn switchboard_path() -> Result<Utf8PathBuf> {
    option_env!("CARGO_BIN_EXE_switchboard")
        .map(Utf8PathBuf::from)
        .ok_or_else(|| eyre!("CARGO_BIN_EXE_switchboard is not set; build the switchboard binary"))
}

/// Configuration file removed again when dropped.
struct TempConfig {
    path: Utf8PathBuf,
}

impl TempConfig {
    fn write(document: &Value) -> Result<Self> {
        let directory = Utf8PathBuf::try_from(std::env::temp_dir())?;
        let file_name = format!("switchboard_cli_{}.json", uuid::Uuid::new_v4());
        let dir = Dir::open_ambient_dir(&directory, ambient_authority())?;
        dir.write(&file_name, document.to_string())?;
        Ok(Self {
            path: directory.join(file_name),
        })
    }

    fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Drop for TempConfig {
    fn drop(&mut self) {
        if let (Some(parent), Some(name)) = (self.path.parent(), self.path.file_name()) {
            if let Ok(dir) = Dir::open_ambient_dir(parent, ambient_authority()) {
                let _removed = dir.remove_file(name);
            }
        }
    }
}

fn echo_config() -> Result<TempConfig> {
    let echo = echo_provider_path()?;
    TempConfig::write(&json!({
        "providers": [
            { "provider_id": "local", "kind": "piped", "command": echo.as_str(),
              "args": ["echo", "fail"] }
        ],
        "timeouts": { "handshake_ms": 5000, "teardown_ms": 5000 }
    }))
}

fn switchboard(config: Option<&TempConfig>, args: &[&str], stdin: &str) -> Result<Output> {
    let mut command = Command::new(switchboard_path()?);
    command
        .env_remove("SWITCHBOARD_CONFIG")
        .env("RUST_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(file) = config {
        command.arg("--config").arg(file.path());
    }
    let mut child = command.args(args).spawn()?;
    child
        .stdin
        .take()
        .ok_or_else(|| eyre!("stdin was not captured"))?
        .write_all(stdin.as_bytes())?;
    Ok(child.wait_with_output()?)
}

fn json_lines(output: &Output) -> Result<Vec<Value>> {
    String::from_utf8(output.stdout.clone())?
        .lines()
        .map(|line| serde_json::from_str(line).map_err(|err| eyre!("bad line {line}: {err}")))
        .collect()
}

#[test]
fn list_shows_configured_providers() -> Result<()> {
    let config = echo_config()?;
    let output = switchboard(Some(&config), &["list"], "")?;
    ensure!(output.status.success(), "list failed: {output:?}");

    let lines = json_lines(&output)?;
    let line = lines.first().ok_or_else(|| eyre!("no output"))?;
    ensure!(line["status"] == "ok");
    ensure!(line["action"] == "list");
    let names: Vec<&str> = line["data"]["capabilities"]
        .as_array()
        .ok_or_else(|| eyre!("missing capabilities"))?
        .iter()
        .filter_map(|listing| listing["qualified_name"].as_str())
        .collect();
    ensure!(names == ["local:echo", "local:fail"], "got {names:?}");
    Ok(())
}

#[test]
fn call_prints_the_provider_answer() -> Result<()> {
    let config = echo_config()?;
    let output = switchboard(Some(&config), &["call", "local:echo", r#"{"a":1}"#], "")?;
    ensure!(output.status.success(), "call failed: {output:?}");

    let lines = json_lines(&output)?;
    let line = lines.first().ok_or_else(|| eyre!("no output"))?;
    ensure!(line["data"]["text"] == r#"echo {"a":1}"#, "got {line}");
    ensure!(line["provider_id"] == "local");
    Ok(())
}

#[test]
fn failed_calls_exit_with_failure() -> Result<()> {
    let config = echo_config()?;
    let output = switchboard(Some(&config), &["call", "missing"], "")?;
    ensure!(!output.status.success());

    let lines = json_lines(&output)?;
    let line = lines.first().ok_or_else(|| eyre!("no output"))?;
    ensure!(line["status"] == "failed");
    ensure!(line["reason"] == "not_found");
    Ok(())
}

#[test]
fn malformed_call_arguments_are_rejected() -> Result<()> {
    let output = switchboard(None, &["call", "echo", "{not json"], "")?;
    ensure!(!output.status.success());
    let stderr = String::from_utf8(output.stderr)?;
    ensure!(stderr.contains("not valid JSON"), "stderr: {stderr}");
    Ok(())
}

#[test]
fn console_answers_one_line_per_command() -> Result<()> {
    let config = echo_config()?;
    let script = "list\ncall echo {\"b\":2}\n\nfrobnicate\ncall fail\nquit\nlist\n";
    let output = switchboard(Some(&config), &["console"], script)?;
    ensure!(output.status.success(), "console failed: {output:?}");

    let lines = json_lines(&output)?;
    let summary: Vec<(String, String)> = lines
        .iter()
        .map(|line| {
            (
                line["action"].as_str().unwrap_or_default().to_owned(),
                line["status"].as_str().unwrap_or_default().to_owned(),
            )
        })
        .collect();
    let expected = [
        ("list", "ok"),
        ("call", "ok"),
        ("parse", "failed"),
        ("call", "failed"),
        ("quit", "ok"),
    ]
    .map(|(action, status)| (action.to_owned(), status.to_owned()));
    ensure!(summary == expected, "got {summary:?}");
    ensure!(
        lines.get(3).is_some_and(|line| line["reason"] == "remote_fault"),
        "got {lines:?}"
    );
    Ok(())
}

#[test]
fn console_can_connect_providers_at_runtime() -> Result<()> {
    let echo = echo_provider_path()?;
    let script = format!("connect extra piped {echo} greet\ncall extra:greet\ndisconnect-all\n");
    let output = switchboard(None, &["console"], &script)?;
    ensure!(output.status.success(), "console failed: {output:?}");

    let lines = json_lines(&output)?;
    let connected = lines.first().ok_or_else(|| eyre!("no connect line"))?;
    ensure!(connected["status"] == "ok", "got {connected}");
    ensure!(connected["data"]["capabilities"] == json!(["extra:greet"]));
    let called = lines.get(1).ok_or_else(|| eyre!("no call line"))?;
    ensure!(called["data"]["text"] == "greet {}", "got {called}");
    let torn_down = lines.get(2).ok_or_else(|| eyre!("no teardown line"))?;
    ensure!(torn_down["data"]["closed"] == json!(["extra"]));
    Ok(())
}
