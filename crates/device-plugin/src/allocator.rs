//! Allocate: map container requests to device bind-mounts

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing::warn;

use crate::api::AllocateRequest;
use crate::api::AllocateResponse;
use crate::api::ContainerAllocateResponse;
use crate::api::DeviceSpec;
use crate::device::DeviceInventory;

/// cgroup permissions granted on the device node
pub const DEVICE_PERMISSIONS: &str = "rw";

/// How Allocate treats device ids that are not in the advertised inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationPolicy {
    /// grant the device regardless of the requested ids
    #[default]
    Permissive,
    /// reject any container request naming an id that is not advertised
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum AllocationError {
    #[display("container request {container} names unknown device {device_id:?}")]
    UnknownDevice { container: usize, device_id: String },
}

impl core::error::Error for AllocationError {}

impl From<AllocationError> for tonic::Status {
    fn from(err: AllocationError) -> Self {
        tonic::Status::invalid_argument(err.to_string())
    }
}

/// Hands out the device node to every container request.
///
/// There is no reservation: the same device path is granted to any number
/// of concurrent requests.
#[derive(Debug, Clone)]
pub struct Allocator {
    host_path: PathBuf,
    container_path: PathBuf,
    policy: AllocationPolicy,
    inventory: Arc<dyn DeviceInventory>,
}

impl Allocator {
    pub fn new(
        host_path: PathBuf,
        container_path: PathBuf,
        policy: AllocationPolicy,
        inventory: Arc<dyn DeviceInventory>,
    ) -> Self {
        Self {
            host_path,
            container_path,
            policy,
            inventory,
        }
    }

    fn device_spec(&self) -> DeviceSpec {
        DeviceSpec {
            container_path: self.container_path.to_string_lossy().into_owned(),
            host_path: self.host_path.to_string_lossy().into_owned(),
            permissions: DEVICE_PERMISSIONS.to_string(),
        }
    }

    /// one container response per container request, in request order
    pub fn allocate(&self, request: &AllocateRequest) -> Result<AllocateResponse, AllocationError> {
        info!(
            "allocate called with {} container request(s)",
            request.container_requests.len()
        );

        let mut container_responses = Vec::with_capacity(request.container_requests.len());
        for (container, container_req) in request.container_requests.iter().enumerate() {
            info!(
                "allocating device for container request, device IDs: {:?}",
                container_req.devices_ids
            );

            if let Some(unknown) = container_req
                .devices_ids
                .iter()
                .find(|id| !self.inventory.contains(id))
            {
                match self.policy {
                    AllocationPolicy::Permissive => {
                        warn!("granting device despite unknown device id {:?}", unknown);
                    }
                    AllocationPolicy::Strict => {
                        return Err(AllocationError::UnknownDevice {
                            container,
                            device_id: unknown.clone(),
                        });
                    }
                }
            }

            container_responses.push(ContainerAllocateResponse {
                envs: HashMap::new(),
                mounts: Vec::new(),
                devices: vec![self.device_spec()],
                annotations: HashMap::new(),
                cdi_devices: Vec::new(),
            });
        }

        info!("allocated devices for {} container(s)", container_responses.len());
        Ok(AllocateResponse {
            container_responses,
        })
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::api::ContainerAllocateRequest;
    use crate::device::StaticInventory;

    fn allocator(policy: AllocationPolicy) -> Allocator {
        Allocator::new(
            PathBuf::from("/dev/mosvector"),
            PathBuf::from("/dev/mosvector"),
            policy,
            Arc::new(StaticInventory::new("mosvector-0")),
        )
    }

    fn request(containers: &[&[&str]]) -> AllocateRequest {
        AllocateRequest {
            container_requests: containers
                .iter()
                .map(|ids| ContainerAllocateRequest {
                    devices_ids: ids.iter().map(|id| id.to_string()).collect(),
                })
                .collect(),
        }
    }

    #[test]
    fn every_container_gets_the_device_node() {
        let response = allocator(AllocationPolicy::Permissive)
            .allocate(&request(&[&["mosvector-0"], &[], &["bogus", "mosvector-0"]]))
            .expect("permissive allocate never fails");

        assert_eq!(response.container_responses.len(), 3);
        for container in &response.container_responses {
            assert_eq!(
                container.devices,
                vec![DeviceSpec {
                    container_path: "/dev/mosvector".to_string(),
                    host_path: "/dev/mosvector".to_string(),
                    permissions: "rw".to_string(),
                }]
            );
            assert!(container.mounts.is_empty());
            assert!(container.envs.is_empty());
        }
    }

    #[test]
    fn empty_request_yields_empty_response() {
        let response = allocator(AllocationPolicy::Strict)
            .allocate(&AllocateRequest::default())
            .expect("empty request");

        assert!(response.container_responses.is_empty());
    }

    #[test]
    fn strict_policy_rejects_unknown_ids() {
        let err = allocator(AllocationPolicy::Strict)
            .allocate(&request(&[&["mosvector-0"], &["mosvector-7"]]))
            .expect_err("unknown id must be rejected");

        assert_eq!(
            err,
            AllocationError::UnknownDevice {
                container: 1,
                device_id: "mosvector-7".to_string(),
            }
        );
        assert_eq!(tonic::Status::from(err).code(), tonic::Code::InvalidArgument);
    }

    #[test]
    fn strict_policy_grants_advertised_ids() {
        let response = allocator(AllocationPolicy::Strict)
            .allocate(&request(&[&["mosvector-0"]]))
            .expect("advertised id");

        assert_eq!(response.container_responses.len(), 1);
    }

    #[test]
    fn container_path_may_differ_from_host_path() {
        let allocator = Allocator::new(
            PathBuf::from("/dev/mosvector"),
            PathBuf::from("/dev/accel0"),
            AllocationPolicy::Permissive,
            Arc::new(StaticInventory::new("mosvector-0")),
        );
        let response = allocator
            .allocate(&request(&[&["mosvector-0"]]))
            .expect("allocate");

        let spec = &response.container_responses[0].devices[0];
        assert_eq!(spec.host_path, "/dev/mosvector");
        assert_eq!(spec.container_path, "/dev/accel0");
    }
}
