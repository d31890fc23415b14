use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use skylab_core::service::{DeviceInfo, InventoryService, ServiceError};

use crate::transport::Transport;

const METHOD: &str = "unifiedfleet.api.v1.rpc.FleetService/GetChromeOSDeviceData";

/// Fleet inventory (UFS) pRPC client.
pub struct InventoryClient {
    transport: Transport,
    origin: String,
}

impl InventoryClient {
    /// `host` may be a bare host name (HTTPS is assumed) or a full origin.
    pub fn new(transport: Transport, host: &str) -> Self {
        let host = host.trim_end_matches('/');
        let origin = if host.contains("://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        Self { transport, origin }
    }
}

#[derive(Debug, Serialize)]
struct DeviceRequest<'a> {
    hostname: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceData {
    #[serde(default)]
    machine: Option<Machine>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Machine {
    #[serde(default)]
    chromeos_machine: Option<ChromeOsMachine>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChromeOsMachine {
    #[serde(default)]
    model: String,
    #[serde(default)]
    build_target: String,
}

#[async_trait]
impl InventoryService for InventoryClient {
    async fn get_device(&self, hostname: &str) -> Result<DeviceInfo, ServiceError> {
        let url = format!("{}/prpc/{METHOD}", self.origin);
        let data: DeviceData = self
            .transport
            .prpc(&url, &DeviceRequest { hostname })
            .await
            .map_err(|e| match e {
                ServiceError::Http { status: 404, message } => ServiceError::Device {
                    reason: if message.is_empty() {
                        format!("{hostname} is not in the inventory")
                    } else {
                        message
                    },
                },
                other => other,
            })?;

        let machine = data
            .machine
            .and_then(|m| m.chromeos_machine)
            .unwrap_or_default();
        Ok(DeviceInfo {
            hostname: hostname.to_string(),
            model: machine.model,
            board: machine.build_target,
        })
    }
}
