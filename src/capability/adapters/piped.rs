//! Child-process transport speaking newline-delimited JSON-RPC over stdio.

use super::TransportSettings;
use super::rpc::{self, FrameSender, OutboundFrame, PendingCalls, RpcSession};
use crate::capability::{
    domain::{
        ConnectionError, ConnectionFailure, PipedTarget, ProviderId, ProviderTarget,
        TransportKind,
    },
    ports::{
        OpenedBinding, TransportBinding, TransportCloseError, TransportCloseResult,
        TransportConnector,
    },
};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::task::AbortOnDropHandle;

/// Longest accepted line on the provider's stdout.
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Opens piped provider bindings.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipedConnector {
    settings: TransportSettings,
}

impl PipedConnector {
    /// Creates a connector using the given deadlines.
    #[must_use]
    pub const fn new(settings: TransportSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl TransportConnector for PipedConnector {
    async fn open(
        &self,
        provider_id: &ProviderId,
        target: &ProviderTarget,
    ) -> Result<OpenedBinding, ConnectionError> {
        let ProviderTarget::Piped(piped) = target else {
            return Err(ConnectionError::new(
                provider_id.clone(),
                ConnectionFailure::UnreachableTarget,
                format!("piped transport cannot reach {}", target.describe()),
            ));
        };

        let mut binding = PipedBinding::spawn(provider_id, piped, &self.settings)?;
        match rpc::discover(provider_id, &binding.session, self.settings.handshake_timeout).await
        {
            Ok(descriptors) => {
                tracing::info!(
                    %provider_id,
                    pid = ?binding.process_id,
                    capabilities = descriptors.len(),
                    "piped provider ready"
                );
                Ok(OpenedBinding {
                    binding: Box::new(binding),
                    descriptors,
                })
            }
            Err(err) => {
                if let Err(close_err) = binding.close().await {
                    tracing::warn!(%provider_id, error = %close_err, "cleanup after failed handshake");
                }
                Err(err)
            }
        }
    }
}

/// Live binding to a provider child process.
///
/// Dropping the binding kills the child; [`TransportBinding::close`] asks it
/// to exit first and reaps it either way.
pub struct PipedBinding {
    provider_id: ProviderId,
    session: Arc<RpcSession>,
    child: Option<Child>,
    process_id: Option<u32>,
    close_grace: Duration,
    writer: Option<AbortOnDropHandle<()>>,
    reader: Option<AbortOnDropHandle<()>>,
    stderr: Option<AbortOnDropHandle<()>>,
}

impl PipedBinding {
    fn spawn(
        provider_id: &ProviderId,
        target: &PipedTarget,
        settings: &TransportSettings,
    ) -> Result<Self, ConnectionError> {
        let spawn_error = |detail: String| {
            ConnectionError::new(provider_id.clone(), ConnectionFailure::SpawnFailed, detail)
        };

        let mut command = Command::new(target.command());
        command
            .args(target.args())
            .envs(target.env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(directory) = target.working_directory() {
            command.current_dir(directory);
        }

        let mut child = command.spawn().map_err(|err| {
            spawn_error(format!("failed to start '{}': {err}", target.command_line()))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error("child stdin was not captured".to_owned()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error("child stdout was not captured".to_owned()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| spawn_error("child stderr was not captured".to_owned()))?;
        let process_id = child.id();
        tracing::debug!(
            %provider_id,
            pid = ?process_id,
            command = %target.command_line(),
            "spawned provider"
        );

        let (outbound, queued) = mpsc::unbounded_channel();
        let pending = Arc::new(PendingCalls::default());
        let session = Arc::new(RpcSession::new(
            provider_id.clone(),
            outbound.clone(),
            pending.clone(),
            settings.call_timeout,
        ));

        let writer = tokio::spawn(write_frames(
            provider_id.clone(),
            stdin,
            queued,
            pending.clone(),
        ));
        let reader = tokio::spawn(read_frames(
            provider_id.clone(),
            stdout,
            outbound,
            pending,
        ));
        let stderr = tokio::spawn(forward_stderr(provider_id.clone(), stderr));

        Ok(Self {
            provider_id: provider_id.clone(),
            session,
            child: Some(child),
            process_id,
            close_grace: settings.close_grace,
            writer: Some(AbortOnDropHandle::new(writer)),
            reader: Some(AbortOnDropHandle::new(reader)),
            stderr: Some(AbortOnDropHandle::new(stderr)),
        })
    }

    async fn stop_child(&self, mut child: Child) -> TransportCloseResult {
        if let Ok(Some(status)) = child.try_wait() {
            tracing::debug!(provider_id = %self.provider_id, %status, "provider already exited");
            return Ok(());
        }

        request_termination(&self.provider_id, &child);
        match tokio::time::timeout(self.close_grace, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(provider_id = %self.provider_id, %status, "provider exited");
                Ok(())
            }
            Ok(Err(err)) => Err(TransportCloseError::process(err)),
            Err(_) => {
                tracing::warn!(
                    provider_id = %self.provider_id,
                    grace_ms = self.close_grace.as_millis(),
                    "provider ignored termination request, killing"
                );
                child.kill().await.map_err(TransportCloseError::process)
            }
        }
    }
}

#[async_trait]
impl TransportBinding for PipedBinding {
    fn kind(&self) -> TransportKind {
        TransportKind::Piped
    }

    fn process_id(&self) -> Option<u32> {
        self.process_id
    }

    async fn close(&mut self) -> TransportCloseResult {
        self.session.close();
        // Dropping the writer task drops stdin, which signals EOF to the child.
        drop(self.writer.take());
        let Some(child) = self.child.take() else {
            return Ok(());
        };

        let result = self.stop_child(child).await;
        drop(self.reader.take());
        drop(self.stderr.take());
        result
    }
}

async fn write_frames(
    provider_id: ProviderId,
    stdin: ChildStdin,
    mut queued: mpsc::UnboundedReceiver<OutboundFrame>,
    pending: Arc<PendingCalls>,
) {
    let mut sink = FramedWrite::new(stdin, LinesCodec::new());
    while let Some(frame) = queued.recv().await {
        if let Err(err) = sink.send(frame.body).await {
            tracing::warn!(%provider_id, error = %err, "provider stdin closed");
            pending.close();
            return;
        }
    }
}

async fn read_frames(
    provider_id: ProviderId,
    stdout: ChildStdout,
    outbound: FrameSender,
    pending: Arc<PendingCalls>,
) {
    let mut lines = FramedRead::new(stdout, LinesCodec::new_with_max_length(MAX_FRAME_BYTES));
    while let Some(line) = lines.next().await {
        match line {
            Ok(frame) if frame.trim().is_empty() => {}
            Ok(frame) => rpc::dispatch_frame(&provider_id, &pending, &outbound, &frame),
            Err(err) => {
                tracing::warn!(%provider_id, error = %err, "unreadable provider output");
                break;
            }
        }
    }
    rpc::channel_ended(&provider_id, &pending);
}

async fn forward_stderr(provider_id: ProviderId, stderr: ChildStderr) {
    let mut lines = FramedRead::new(stderr, LinesCodec::new());
    while let Some(Ok(line)) = lines.next().await {
        tracing::debug!(%provider_id, line = %line, "provider stderr");
    }
}

#[cfg(unix)]
fn request_termination(provider_id: &ProviderId, child: &Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(raw_pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(err) = kill(Pid::from_raw(raw_pid), Signal::SIGTERM) {
        tracing::debug!(%provider_id, error = %err, "failed to signal provider");
    }
}

// Closing stdin is the only polite request available here; the grace
// period then falls through to a hard kill.
#[cfg(not(unix))]
fn request_termination(_provider_id: &ProviderId, _child: &Child) {}
