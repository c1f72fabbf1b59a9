//! ListAndWatch streams: periodic full snapshots of the device inventory

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::Status;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::api;
use crate::api::ListAndWatchResponse;
use crate::device::DeviceInventory;
use crate::lifecycle::Lifecycle;

pub type DeviceListStream =
    Pin<Box<dyn Stream<Item = Result<ListAndWatchResponse, Status>> + Send>>;

/// Why a subscriber loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    Shutdown,
    Disconnected,
    SendFailed,
}

#[derive(Debug, Clone)]
pub struct DeviceAdvertiser {
    inventory: Arc<dyn DeviceInventory>,
    interval: Duration,
    lifecycle: Arc<Lifecycle>,
    shutdown: CancellationToken,
}

impl DeviceAdvertiser {
    pub fn new(
        inventory: Arc<dyn DeviceInventory>,
        interval: Duration,
        lifecycle: Arc<Lifecycle>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inventory,
            interval,
            lifecycle,
            shutdown,
        }
    }

    /// current inventory as a ListAndWatch message
    pub fn snapshot(&self) -> ListAndWatchResponse {
        ListAndWatchResponse {
            devices: self
                .inventory
                .snapshot()
                .iter()
                .map(api::Device::from)
                .collect(),
        }
    }

    /// open a new subscriber stream, the first message is sent immediately
    pub fn subscribe(&self) -> DeviceListStream {
        self.lifecycle.subscribe();

        let (tx, rx) = mpsc::channel(1);
        let advertiser = self.clone();
        tokio::spawn(async move {
            let end = advertiser.run(tx).await;
            info!("device list stream closed: {:?}", end);
        });

        Box::pin(ReceiverStream::new(rx))
    }

    async fn run(&self, tx: mpsc::Sender<Result<ListAndWatchResponse, Status>>) -> StreamEnd {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return StreamEnd::Shutdown,
                _ = tx.closed() => return StreamEnd::Disconnected,
                _ = ticker.tick() => {}
            }

            let response = self.snapshot();
            debug!("sending device list: {} device(s)", response.devices.len());

            let sent = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return StreamEnd::Shutdown,
                sent = tx.send(Ok(response)) => sent,
            };
            if let Err(e) = sent {
                warn!("failed to send device list: {}", e);
                return StreamEnd::SendFailed;
            }
        }
    }
}
