use std::io::Write;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::Notify;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

/// Name of the tunnel client binary looked up on PATH.
const CLIENT_BIN: &str = "frpc";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("could not stage the client configuration: {0}")]
    Stage(std::io::Error),
    #[error("could not launch `{CLIENT_BIN}`: {0}")]
    Spawn(std::io::Error),
    #[error("tunnel client exited with {0}")]
    Exited(std::process::ExitStatus),
    #[error("could not signal the tunnel client: {0}")]
    Close(Errno),
    #[error("io error while running the tunnel client: {0}")]
    Io(#[from] std::io::Error),
}

/// The tunnel client proper is an external collaborator; this seam is all
/// the lifecycle controller knows about it.
#[cfg_attr(test, automock)]
#[async_trait]
pub(crate) trait TunnelSession: Send {
    /// Runs the session to completion. For datagram transports this returns
    /// once the underlying socket loop exits, which may be before the
    /// graceful-close sequence has finished.
    async fn run(&mut self) -> Result<(), SessionError>;
    /// Handle for closing the session from another task while `run` is
    /// still pending.
    fn closer(&self) -> Box<dyn SessionCloser>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub(crate) trait SessionCloser: Send + Sync {
    /// Requests an orderly shutdown, allowing `grace` for it to complete
    /// before forceful teardown.
    async fn graceful_close(&self, grace: Duration) -> Result<(), SessionError>;
}

/// Shared between the session and its closer so the two sides agree on
/// whether a close was requested and whether the child is already gone.
#[derive(Default)]
struct SessionState {
    close_requested: AtomicBool,
    exited: AtomicBool,
    exit_notify: Notify,
}

/// Runs the rendered configuration through a local `frpc` process.
pub(crate) struct FrpcSession {
    child: Child,
    pid: i32,
    state: Arc<SessionState>,
    /// keeps the staged config file alive for the lifetime of the child
    _config: tempfile::NamedTempFile,
}

impl FrpcSession {
    pub fn spawn(rendered: &str) -> Result<Self, SessionError> {
        let mut config = tempfile::Builder::new()
            .prefix("tunboot-")
            .suffix(".ini")
            .tempfile()
            .map_err(SessionError::Stage)?;
        config
            .write_all(rendered.as_bytes())
            .map_err(SessionError::Stage)?;

        let child = Command::new(CLIENT_BIN)
            .arg("-c")
            .arg(config.path())
            .stdin(Stdio::null())
            .spawn()
            .map_err(SessionError::Spawn)?;
        let pid = child.id().ok_or_else(|| {
            SessionError::Spawn(std::io::Error::other("client exited before startup"))
        })? as i32;
        debug!("{CLIENT_BIN} started with pid {pid}");
        Ok(FrpcSession {
            child,
            pid,
            state: Arc::new(SessionState::default()),
            _config: config,
        })
    }
}

#[async_trait]
impl TunnelSession for FrpcSession {
    async fn run(&mut self) -> Result<(), SessionError> {
        let status = self.child.wait().await;
        self.state.exited.store(true, Ordering::SeqCst);
        self.state.exit_notify.notify_waiters();
        let status = status?;
        if status.success() {
            return Ok(());
        }
        // dying to our own close request is a clean shutdown, not a failure
        if self.state.close_requested.load(Ordering::SeqCst) {
            debug!("tunnel client stopped after a requested close ({status})");
            return Ok(());
        }
        Err(SessionError::Exited(status))
    }

    fn closer(&self) -> Box<dyn SessionCloser> {
        Box::new(FrpcCloser {
            pid: Pid::from_raw(self.pid),
            state: Arc::clone(&self.state),
        })
    }
}

struct FrpcCloser {
    pid: Pid,
    state: Arc<SessionState>,
}

#[async_trait]
impl SessionCloser for FrpcCloser {
    async fn graceful_close(&self, grace: Duration) -> Result<(), SessionError> {
        self.state.close_requested.store(true, Ordering::SeqCst);
        if self.state.exited.load(Ordering::SeqCst) {
            return Ok(());
        }
        info!("closing tunnel client (pid {})", self.pid);
        match kill(self.pid, Signal::SIGTERM) {
            Ok(()) => {}
            // already gone counts as closed
            Err(Errno::ESRCH) => return Ok(()),
            Err(err) => return Err(SessionError::Close(err)),
        }
        tokio::select! {
            _ = self.state.exit_notify.notified() => return Ok(()),
            _ = tokio::time::sleep(grace) => {}
        }
        // the pid may be recycled once the child is reaped; only escalate
        // while it is still ours
        if self.state.exited.load(Ordering::SeqCst) {
            return Ok(());
        }
        match kill(self.pid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(err) => Err(SessionError::Close(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn session_around(command: &mut Command) -> FrpcSession {
        let child = command.spawn().unwrap();
        let pid = child.id().unwrap() as i32;
        FrpcSession {
            child,
            pid,
            state: Arc::new(SessionState::default()),
            _config: tempfile::NamedTempFile::new().unwrap(),
        }
    }

    #[tokio::test]
    async fn requested_close_ends_the_run_cleanly() {
        let mut session = session_around(Command::new("sleep").arg("30"));
        let closer = session.closer();
        let run = tokio::spawn(async move { session.run().await });
        // let wait() arm before the close lands
        tokio::time::sleep(Duration::from_millis(20)).await;
        closer
            .graceful_close(Duration::from_millis(200))
            .await
            .unwrap();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unrequested_failure_is_still_an_error() {
        let mut session = session_around(&mut Command::new("false"));
        let result = session.run().await;
        assert!(matches!(result, Err(SessionError::Exited(_))));
    }

    #[tokio::test]
    async fn close_after_the_child_is_reaped_does_not_signal() {
        let mut session = session_around(&mut Command::new("true"));
        let closer = session.closer();
        session.run().await.unwrap();
        // the pid could belong to anyone now; the closer must notice the
        // recorded exit and stand down
        closer
            .graceful_close(Duration::from_millis(50))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn close_returns_as_soon_as_the_child_exits() {
        let mut session = session_around(Command::new("sleep").arg("30"));
        let closer = session.closer();
        let run = tokio::spawn(async move { session.run().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let started = Instant::now();
        closer.graceful_close(Duration::from_secs(5)).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn closing_a_dead_pid_is_not_an_error() {
        // pid is recycled-safe here: spawn a short-lived child and wait it out
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id().unwrap() as i32;
        child.wait().await.unwrap();
        let closer = FrpcCloser {
            pid: Pid::from_raw(pid),
            state: Arc::new(SessionState::default()),
        };
        assert!(closer.graceful_close(Duration::from_millis(1)).await.is_ok());
    }
}
