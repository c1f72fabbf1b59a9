use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;

use crate::advertiser::DeviceAdvertiser;
use crate::allocator::Allocator;
use crate::api::DevicePluginOptions;
use crate::config::PluginConfig;
use crate::device::DeviceInventory;
use crate::device::StaticInventory;
use crate::error::PluginError;
use crate::error::Result;
use crate::lifecycle::Lifecycle;
use crate::lifecycle::PluginState;
use crate::registration::RegistrationClient;
use crate::service::DevicePluginService;
use crate::socket::SocketServer;

/// Device plugin advertising a single device node to the kubelet
#[derive(Debug)]
pub struct MosvectorDevicePlugin {
    config: PluginConfig,
    inventory: Arc<dyn DeviceInventory>,
    /// optional capabilities declared to the kubelet, none are implemented
    options: DevicePluginOptions,
    lifecycle: Arc<Lifecycle>,
    server: SocketServer,
    registration: RegistrationClient,
    /// cancels every open ListAndWatch stream
    shutdown: CancellationToken,
}

impl MosvectorDevicePlugin {
    /// create a plugin advertising the configured device as always healthy
    pub fn new(config: PluginConfig) -> Arc<Self> {
        let inventory = Arc::new(StaticInventory::new(config.device_id.clone()));
        Self::with_inventory(config, inventory)
    }

    pub fn with_inventory(config: PluginConfig, inventory: Arc<dyn DeviceInventory>) -> Arc<Self> {
        info!("creating device plugin for {}", config.resource_name);

        let server = SocketServer::new(
            config.socket_path(),
            config.readiness_attempts,
            config.readiness_interval,
        );
        let registration = RegistrationClient::new(
            config.kubelet_socket.clone(),
            config.registration_timeout,
            config.retry,
        );

        Arc::new(Self {
            config,
            inventory,
            options: DevicePluginOptions::default(),
            lifecycle: Arc::new(Lifecycle::new()),
            server,
            registration,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn state(&self) -> PluginState {
        self.lifecycle.current()
    }

    pub fn socket_path(&self) -> &Path {
        self.server.socket_path()
    }

    /// endpoint name sent to the kubelet, relative to the plugin directory
    fn endpoint(&self) -> String {
        self.socket_path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.config.socket_name.clone())
    }

    fn service(&self) -> DevicePluginService {
        let advertiser = DeviceAdvertiser::new(
            self.inventory.clone(),
            self.config.advertise_interval,
            self.lifecycle.clone(),
            self.shutdown.clone(),
        );
        let allocator = Allocator::new(
            self.config.host_path.clone(),
            self.config.container_path.clone(),
            self.config.allocation_policy,
            self.inventory.clone(),
        );
        DevicePluginService::new(advertiser, allocator, self.options)
    }

    /// serve on the plugin socket, then register with the kubelet
    ///
    /// On any failure the plugin is stopped before the error is returned.
    pub async fn start(&self) -> Result<()> {
        let state = self.state();
        if state != PluginState::Unbound {
            return Err(PluginError::InvalidState {
                operation: "start",
                state,
            });
        }

        info!("starting device plugin");
        if let Err(e) = self.server.start(self.service()).await {
            self.stop().await;
            return Err(e);
        }
        if !self
            .lifecycle
            .transition(PluginState::Unbound, PluginState::Listening)
        {
            return self.abort_start().await;
        }

        if let Err(e) = self
            .registration
            .register(&self.endpoint(), &self.config.resource_name, self.options)
            .await
        {
            error!("error registering device plugin: {}", e);
            self.stop().await;
            return Err(e);
        }
        if !self.lifecycle.registered() {
            return self.abort_start().await;
        }

        Ok(())
    }

    /// start raced with stop
    async fn abort_start(&self) -> Result<()> {
        let state = self.state();
        self.stop().await;
        Err(PluginError::InvalidState {
            operation: "start",
            state,
        })
    }

    /// stop streams and the server, then remove the socket file
    ///
    /// Idempotent and callable from any state.
    pub async fn stop(&self) {
        let previous = self.lifecycle.stop();
        if previous == PluginState::Stopped && !self.server.is_running().await {
            return;
        }

        info!("stopping device plugin");
        self.shutdown.cancel();
        self.server.stop().await;
    }
}
