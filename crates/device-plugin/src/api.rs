//! Generated bindings for the kubelet device plugin `v1beta1` API.
#![allow(clippy::doc_markdown)]
#![allow(clippy::doc_overindented_list_items)]

tonic::include_proto!("v1beta1");

/// API version reported when registering with the kubelet
pub const VERSION: &str = "v1beta1";

/// Health value for a device that can be allocated
pub const HEALTHY: &str = "Healthy";

/// Health value for a device that must not be allocated
pub const UNHEALTHY: &str = "Unhealthy";
