use std::sync::Arc;

use skylab_model::RetryPolicy;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::{
    error::{CoreError, CoreResult},
    retry::call_with_retries,
    service::{DeviceInfo, InventoryService, ServiceError},
};

/// Device facts needed to annotate leases.
pub struct InventoryLookup {
    inventory: Arc<dyn InventoryService>,
    retry: RetryPolicy,
}

impl InventoryLookup {
    pub fn new(inventory: Arc<dyn InventoryService>, retry: RetryPolicy) -> Self {
        Self { inventory, retry }
    }

    /// Device record for `hostname`. A device-level refusal becomes `NotFound`.
    pub async fn device(
        &self,
        hostname: &str,
        cancel: &CancellationToken,
    ) -> CoreResult<DeviceInfo> {
        let res = call_with_retries(&self.retry, cancel, "get device", || {
            self.inventory.get_device(hostname)
        })
        .await;
        match res {
            Err(CoreError::Service {
                source: ServiceError::Device { reason },
                ..
            }) => Err(CoreError::NotFound(format!("device {hostname}: {reason}"))),
            other => other,
        }
    }

    /// Model of `hostname`; may be empty when the inventory has none recorded.
    #[instrument(level = "debug", skip(self, cancel))]
    pub async fn model_for(&self, hostname: &str, cancel: &CancellationToken) -> CoreResult<String> {
        let device = self.device(hostname, cancel).await?;
        if device.model.is_empty() {
            debug!(hostname, "inventory has no model for device");
        }
        Ok(device.model)
    }
}
