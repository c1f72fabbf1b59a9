//! Kubelet device plugin advertising a single `/dev/mosvector` device node.
//!
//! The plugin serves the `v1beta1` device plugin API on a Unix socket in the
//! kubelet plugin directory, registers that socket with the kubelet, streams
//! the device inventory on every `ListAndWatch` subscription and answers
//! `Allocate` with a bind-mount of the device node.

pub mod advertiser;
pub mod allocator;
pub mod api;
pub mod config;
pub mod device;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod plugin;
pub mod registration;
pub mod service;
pub mod shutdown;
pub mod socket;

pub use config::PluginConfig;
pub use error::PluginError;
pub use lifecycle::PluginState;
pub use plugin::MosvectorDevicePlugin;
