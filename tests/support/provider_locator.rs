//! Echo provider binary discovery helpers for integration tests.

use camino::Utf8PathBuf;
use std::env;
use std::ffi::OsStr;

/// Returns the platform-appropriate executable name for `echo_provider`.
const fn echo_provider_binary_name() -> &'static str {
    if cfg!(windows) {
        "echo_provider.exe"
    } else {
        "echo_provider"
    }
}

/// Locates the `echo_provider` binary for integration tests.
pub fn locate_echo_provider() -> Option<Utf8PathBuf> {
    option_env!("CARGO_BIN_EXE_echo_provider")
        .map(Utf8PathBuf::from)
        .filter(|path| path.is_file())
        .or_else(locate_from_env)
        .or_else(locate_near_target)
}

/// Locates the binary or fails with a hint about building it.
pub fn echo_provider_path() -> eyre::Result<Utf8PathBuf> {
    locate_echo_provider()
        .ok_or_else(|| eyre::eyre!("echo_provider binary not found; build it with the tests"))
}

fn locate_from_env() -> Option<Utf8PathBuf> {
    let provider_path = env::var_os("SWITCHBOARD_ECHO_PROVIDER")?;
    let provider_path_utf8 = utf8_path_from_os(provider_path.as_os_str())?;
    provider_path_utf8.is_file().then_some(provider_path_utf8)
}

fn locate_near_target() -> Option<Utf8PathBuf> {
    let exe_path = env::current_exe().ok()?;
    let exe_path_utf8 = utf8_path_from_os(exe_path.as_os_str())?;
    let deps_dir = exe_path_utf8.parent()?;
    let target_dir = deps_dir.parent()?;
    let provider_path = target_dir.join(echo_provider_binary_name());
    provider_path.is_file().then_some(provider_path)
}

fn utf8_path_from_os(value: &OsStr) -> Option<Utf8PathBuf> {
    Some(Utf8PathBuf::from(value.to_os_string().into_string().ok()?))
}
