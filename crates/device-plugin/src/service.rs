use tonic::Request;
use tonic::Response;
use tonic::Result as TonicResult;
use tracing::debug;
use tracing::info;

use crate::advertiser::DeviceAdvertiser;
use crate::advertiser::DeviceListStream;
use crate::allocator::Allocator;
use crate::api::device_plugin_server::DevicePlugin;
use crate::api::AllocateRequest;
use crate::api::AllocateResponse;
use crate::api::DevicePluginOptions;
use crate::api::Empty;
use crate::api::PreStartContainerRequest;
use crate::api::PreStartContainerResponse;
use crate::api::PreferredAllocationRequest;
use crate::api::PreferredAllocationResponse;

/// DevicePlugin service implementation
#[derive(Debug, Clone)]
pub struct DevicePluginService {
    advertiser: DeviceAdvertiser,
    allocator: Allocator,
    options: DevicePluginOptions,
}

impl DevicePluginService {
    pub fn new(
        advertiser: DeviceAdvertiser,
        allocator: Allocator,
        options: DevicePluginOptions,
    ) -> Self {
        Self {
            advertiser,
            allocator,
            options,
        }
    }
}

#[tonic::async_trait]
impl DevicePlugin for DevicePluginService {
    async fn get_device_plugin_options(
        &self,
        _request: Request<Empty>,
    ) -> TonicResult<Response<DevicePluginOptions>> {
        debug!("getting device plugin options");
        Ok(Response::new(self.options))
    }

    type ListAndWatchStream = DeviceListStream;

    async fn list_and_watch(
        &self,
        _request: Request<Empty>,
    ) -> TonicResult<Response<Self::ListAndWatchStream>> {
        info!("starting to watch device list");
        Ok(Response::new(self.advertiser.subscribe()))
    }

    async fn get_preferred_allocation(
        &self,
        request: Request<PreferredAllocationRequest>,
    ) -> TonicResult<Response<PreferredAllocationResponse>> {
        debug!("getting preferred device allocation: {:?}", request.get_ref());
        Ok(Response::new(PreferredAllocationResponse::default()))
    }

    async fn allocate(
        &self,
        request: Request<AllocateRequest>,
    ) -> TonicResult<Response<AllocateResponse>> {
        let response = self.allocator.allocate(request.get_ref())?;
        Ok(Response::new(response))
    }

    async fn pre_start_container(
        &self,
        request: Request<PreStartContainerRequest>,
    ) -> TonicResult<Response<PreStartContainerResponse>> {
        debug!("pre-start container: {:?}", request.get_ref());
        Ok(Response::new(PreStartContainerResponse {}))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use similar_asserts::assert_eq;
    use test_log::test;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::allocator::AllocationPolicy;
    use crate::device::StaticInventory;
    use crate::lifecycle::Lifecycle;

    fn service() -> DevicePluginService {
        let inventory = Arc::new(StaticInventory::new("mosvector-0"));
        DevicePluginService::new(
            DeviceAdvertiser::new(
                inventory.clone(),
                Duration::from_secs(5),
                Arc::new(Lifecycle::new()),
                CancellationToken::new(),
            ),
            Allocator::new(
                PathBuf::from("/dev/mosvector"),
                PathBuf::from("/dev/mosvector"),
                AllocationPolicy::Permissive,
                inventory,
            ),
            DevicePluginOptions::default(),
        )
    }

    #[test(tokio::test)]
    async fn options_declare_no_optional_capabilities() {
        let options = service()
            .get_device_plugin_options(Request::new(Empty {}))
            .await
            .expect("options")
            .into_inner();

        assert!(!options.pre_start_required);
        assert!(!options.get_preferred_allocation_available);
    }

    #[test(tokio::test)]
    async fn preferred_allocation_and_pre_start_are_empty() {
        let service = service();

        let preferred = service
            .get_preferred_allocation(Request::new(PreferredAllocationRequest::default()))
            .await
            .expect("preferred allocation")
            .into_inner();
        assert_eq!(preferred, PreferredAllocationResponse::default());

        let pre_start = service
            .pre_start_container(Request::new(PreStartContainerRequest {
                devices_ids: vec!["mosvector-0".to_string()],
            }))
            .await
            .expect("pre-start")
            .into_inner();
        assert_eq!(pre_start, PreStartContainerResponse {});
    }
}
