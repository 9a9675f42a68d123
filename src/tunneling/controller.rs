use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use super::client_config::ClientConfig;
use super::session::{SessionCloser, SessionError, TunnelSession};

/// How long a graceful close may take to issue its shutdown frames.
pub(crate) const CLOSE_GRACE: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Drives a started session to completion. For connectionless transports a
/// single background task waits for a termination signal, closes the session
/// gracefully and fires a one-shot completion event; the main path waits on
/// that event after `run` returns so the process cannot exit while shutdown
/// frames are still being issued.
pub(crate) struct TunnelLifecycleController<S: TunnelSession> {
    config: ClientConfig,
    session: S,
}

impl<S: TunnelSession> TunnelLifecycleController<S> {
    pub fn new(config: ClientConfig, session: S) -> Self {
        TunnelLifecycleController { config, session }
    }

    pub async fn run(self) -> Result<(), ControllerError> {
        self.run_with_shutdown(wait_for_termination()).await
    }

    /// The shutdown future is injected so tests can stand in for the OS
    /// signal handler.
    pub(crate) async fn run_with_shutdown<F>(mut self, shutdown: F) -> Result<(), ControllerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let close_done = if self.config.common.protocol.is_connectionless() {
            let closer = self.session.closer();
            Some(spawn_close_listener(closer, shutdown))
        } else {
            None
        };

        self.session.run().await?;

        if let Some(done) = close_done {
            debug!("waiting for the close sequence to finish");
            // a dropped sender means the listener never armed; nothing to wait for
            let _ = done.await;
        }
        Ok(())
    }
}

fn spawn_close_listener<F>(
    closer: Box<dyn SessionCloser>,
    shutdown: F,
) -> oneshot::Receiver<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        shutdown.await;
        info!("termination requested, closing the session");
        if let Err(err) = closer.graceful_close(CLOSE_GRACE).await {
            error!("graceful close failed: {err}");
        }
        let _ = tx.send(());
    });
    rx
}

async fn wait_for_termination() {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(err) => {
            error!("could not install the SIGTERM handler: {err}");
            return std::future::pending::<()>().await;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received interrupt"),
        _ = terminate.recv() => info!("received terminate"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tunneling::client_config::{
        ClientConfig, CommonConfig, Protocol, ProxyConfig,
    };
    use crate::tunneling::session::{MockSessionCloser, MockTunnelSession};
    use mockall::predicate::eq;

    fn config_with(protocol: Protocol) -> ClientConfig {
        ClientConfig {
            common: CommonConfig {
                server_addr: String::from("s.example.com"),
                server_port: 7000,
                token: String::from("t"),
                protocol,
                log_level: String::from("error"),
                pool_count: 2,
            },
            proxies: vec![ProxyConfig {
                name: String::from("http-abc123"),
                proxy_type: String::from("http"),
                local_ip: String::from("127.0.0.1"),
                local_port: 8080,
                use_encryption: false,
                use_compression: true,
                subdomain: Some(String::from("abc123")),
            }],
            visitors: Vec::new(),
        }
    }

    #[tokio::test]
    async fn kcp_close_sequence_runs_before_exit() {
        let mut closer = MockSessionCloser::new();
        closer
            .expect_graceful_close()
            .with(eq(CLOSE_GRACE))
            .times(1)
            .returning(|_| Ok(()));

        let mut session = MockTunnelSession::new();
        session
            .expect_closer()
            .times(1)
            .return_once(move || Box::new(closer));
        // run returns as soon as the socket loop exits; the controller must
        // still wait for the close task before finishing
        session.expect_run().times(1).returning(|| Ok(()));

        let controller = TunnelLifecycleController::new(config_with(Protocol::Kcp), session);
        // stand-in for the signal: fires immediately
        controller
            .run_with_shutdown(std::future::ready(()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn tcp_transport_spawns_no_close_listener() {
        let mut session = MockTunnelSession::new();
        session.expect_closer().times(0);
        session.expect_run().times(1).returning(|| Ok(()));

        let controller = TunnelLifecycleController::new(config_with(Protocol::Tcp), session);
        controller
            .run_with_shutdown(std::future::pending::<()>())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn run_failure_propagates_without_waiting_for_a_signal() {
        let mut session = MockTunnelSession::new();
        session
            .expect_closer()
            .times(1)
            .return_once(|| Box::new(MockSessionCloser::new()));
        session.expect_run().times(1).returning(|| {
            Err(SessionError::Spawn(std::io::Error::other(
                "connection refused",
            )))
        });

        let controller = TunnelLifecycleController::new(config_with(Protocol::Kcp), session);
        let result = controller
            .run_with_shutdown(std::future::pending::<()>())
            .await;
        assert!(matches!(result, Err(ControllerError::Session(_))));
    }

    #[tokio::test]
    async fn close_error_is_logged_not_fatal() {
        let mut closer = MockSessionCloser::new();
        closer
            .expect_graceful_close()
            .times(1)
            .returning(|_| Err(SessionError::Close(nix::errno::Errno::EPERM)));

        let mut session = MockTunnelSession::new();
        session
            .expect_closer()
            .times(1)
            .return_once(move || Box::new(closer));
        session.expect_run().times(1).returning(|| Ok(()));

        let controller = TunnelLifecycleController::new(config_with(Protocol::Kcp), session);
        controller
            .run_with_shutdown(std::future::ready(()))
            .await
            .unwrap();
    }
}
