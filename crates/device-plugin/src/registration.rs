//! One-shot registration of the plugin endpoint with the kubelet

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tonic::transport::Channel;
use tonic::transport::Endpoint;
use tonic::transport::Uri;
use tonic::Request;
use tower::service_fn;
use tracing::info;
use tracing::warn;

use crate::api;
use crate::api::registration_client;
use crate::api::DevicePluginOptions;
use crate::api::RegisterRequest;
use crate::error::PluginError;
use crate::error::Result;

/// Bounded exponential backoff around the registration call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// retries after the first attempt, 0 fails fast
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// delay before retry number `retry` (starting at 0)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Client for the kubelet `Registration` service
#[derive(Debug, Clone)]
pub struct RegistrationClient {
    kubelet_socket: PathBuf,
    dial_timeout: Duration,
    retry: RetryPolicy,
}

impl RegistrationClient {
    pub fn new(kubelet_socket: PathBuf, dial_timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            kubelet_socket,
            dial_timeout,
            retry,
        }
    }

    /// register `endpoint` as the provider of `resource_name`
    pub async fn register(
        &self,
        endpoint: &str,
        resource_name: &str,
        options: DevicePluginOptions,
    ) -> Result<()> {
        let request = RegisterRequest {
            version: api::VERSION.to_string(),
            endpoint: endpoint.to_string(),
            resource_name: resource_name.to_string(),
            options: Some(options),
        };

        let mut retry = 0;
        loop {
            match self.register_once(request.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if retry < self.retry.max_retries => {
                    let delay = self.retry.backoff(retry);
                    retry += 1;
                    warn!(
                        "registration attempt {}/{} failed: {}, retrying in {:?}",
                        retry,
                        self.retry.max_retries + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn register_once(&self, request: RegisterRequest) -> Result<()> {
        info!(
            "registering {} (endpoint {}) with kubelet: {}",
            request.resource_name,
            request.endpoint,
            self.kubelet_socket.display()
        );

        let channel = self.connect().await?;
        let mut client = registration_client::RegistrationClient::new(channel);

        client
            .register(Request::new(request))
            .await
            .map_err(|source| PluginError::Register { source })?;

        info!("successfully registered device plugin with kubelet");
        Ok(())
    }

    /// create Unix Domain Socket client connection
    async fn connect(&self) -> Result<Channel> {
        let connecting = uds_channel(&self.kubelet_socket, self.dial_timeout);
        match tokio::time::timeout(self.dial_timeout, connecting).await {
            Ok(Ok(channel)) => Ok(channel),
            Ok(Err(source)) => Err(PluginError::Dial {
                path: self.kubelet_socket.clone(),
                source,
            }),
            Err(_) => Err(PluginError::DialTimeout {
                path: self.kubelet_socket.clone(),
                timeout: self.dial_timeout,
            }),
        }
    }
}

/// Connect a gRPC channel to the Unix socket at `socket_path`
pub async fn uds_channel(
    socket_path: &Path,
    timeout: Duration,
) -> std::result::Result<Channel, tonic::transport::Error> {
    let socket_path = socket_path.to_path_buf();

    // The HTTP URL is a placeholder since we're using Unix socket connector
    Endpoint::from_static("http://tonic")
        .connect_timeout(timeout)
        .connect_with_connector(service_fn(move |_: Uri| {
            let socket_path = socket_path.clone();
            async move {
                match UnixStream::connect(socket_path).await {
                    Ok(stream) => Ok(TokioIo::new(stream)),
                    Err(e) => Err(Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
                }
            }
        }))
        .await
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;

    #[test]
    fn backoff_doubles_until_cap() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1000),
        };

        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert_eq!(policy.backoff(4), Duration::from_millis(1000));
        assert_eq!(policy.backoff(40), Duration::from_millis(1000));
    }

    #[test(tokio::test)]
    async fn register_fails_when_kubelet_socket_is_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let client = RegistrationClient::new(
            dir.path().join("kubelet.sock"),
            Duration::from_millis(200),
            RetryPolicy::default(),
        );

        let result = client
            .register("mosvector.sock", "github.com/mosvector", DevicePluginOptions::default())
            .await;

        assert!(
            matches!(result, Err(PluginError::Dial { .. })),
            "unexpected result: {result:?}"
        );
    }

    #[test(tokio::test(start_paused = true))]
    async fn register_retries_before_giving_up() {
        let dir = tempfile::tempdir().expect("tempdir");
        let client = RegistrationClient::new(
            dir.path().join("kubelet.sock"),
            Duration::from_millis(200),
            RetryPolicy {
                max_retries: 2,
                initial_backoff: Duration::from_millis(100),
                max_backoff: Duration::from_millis(150),
            },
        );

        let started = tokio::time::Instant::now();
        let result = client
            .register("mosvector.sock", "github.com/mosvector", DevicePluginOptions::default())
            .await;

        assert!(result.is_err());
        assert!(started.elapsed() >= Duration::from_millis(250));
    }
}
