//! Unix socket lifecycle and gRPC listener

use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use tokio::net::UnixListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnixListenerStream;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::api::device_plugin_server::DevicePluginServer;
use crate::error::PluginError;
use crate::error::Result;
use crate::service::DevicePluginService;

/// bound on graceful shutdown before the server task is aborted
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct Running {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the plugin socket file and the gRPC server serving on it
#[derive(Debug)]
pub struct SocketServer {
    socket_path: PathBuf,
    readiness_attempts: u32,
    readiness_interval: Duration,
    running: Mutex<Option<Running>>,
}

impl SocketServer {
    pub fn new(socket_path: PathBuf, readiness_attempts: u32, readiness_interval: Duration) -> Self {
        Self {
            socket_path,
            readiness_attempts,
            readiness_interval,
            running: Mutex::new(None),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// bind the socket and serve `service` on a background task
    pub async fn start(&self, service: DevicePluginService) -> Result<()> {
        info!("start device plugin server: {}", self.socket_path.display());

        let mut running = self.running.lock().await;
        if running.is_some() {
            warn!("device plugin server already running");
            return Ok(());
        }

        // clean up old socket file if it exists
        match tokio::fs::remove_file(&self.socket_path).await {
            Ok(()) => info!("removed stale socket {}", self.socket_path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                error!("error removing socket file: {}", source);
                return Err(PluginError::SocketCleanup {
                    path: self.socket_path.clone(),
                    source,
                });
            }
        }

        let listener = UnixListener::bind(&self.socket_path).map_err(|source| {
            error!("error creating listener on socket: {}", source);
            PluginError::Listen {
                path: self.socket_path.clone(),
                source,
            }
        })?;

        info!("gRPC server is bound to: {}", self.socket_path.display());

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let task = tokio::spawn(async move {
            let result = tonic::transport::Server::builder()
                .add_service(DevicePluginServer::new(service))
                .serve_with_incoming_shutdown(UnixListenerStream::new(listener), async move {
                    token.cancelled().await;
                    info!("shutting down gRPC server");
                })
                .await;
            if let Err(e) = result {
                error!("device plugin gRPC server failed: {}", e);
            }
        });
        *running = Some(Running { shutdown, task });
        drop(running);

        self.wait_for_socket().await;
        Ok(())
    }

    /// best effort check that the socket file is visible before registering
    async fn wait_for_socket(&self) {
        for attempt in 1..=self.readiness_attempts {
            if tokio::fs::try_exists(&self.socket_path)
                .await
                .unwrap_or(false)
            {
                info!("socket found; server is up and running");
                return;
            }
            info!(
                "waiting for socket to be created (attempt {}/{})",
                attempt, self.readiness_attempts
            );
            tokio::time::sleep(self.readiness_interval).await;
        }
        warn!(
            "socket {} not visible after {} attempts",
            self.socket_path.display(),
            self.readiness_attempts
        );
    }

    /// stop serving, release the listener and remove the socket file
    ///
    /// Safe to call when the server was never started or is already stopped.
    pub async fn stop(&self) {
        let Some(Running { shutdown, mut task }) = self.running.lock().await.take() else {
            return;
        };

        shutdown.cancel();
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut task).await {
            Ok(Ok(())) => info!("gRPC server stopped"),
            Ok(Err(e)) => error!("gRPC server task failed: {}", e),
            Err(_) => {
                warn!(
                    "gRPC server did not stop within {:?}, aborting",
                    SHUTDOWN_TIMEOUT
                );
                task.abort();
                let _ = task.await;
            }
        }

        match tokio::fs::remove_file(&self.socket_path).await {
            Ok(()) => info!("socket file removed"),
            Err(e) => error!("error removing socket file during stop: {}", e),
        }
    }
}
