//! Buildbucket v2 pRPC client for the DUT leaser builder.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use skylab_core::service::{BuildInfo, BuildService, ScheduleRequest, ServiceError};
use skylab_model::{BuildId, BuildStatus, KeyValue};
use tracing::debug;

use crate::transport::Transport;

const SERVICE: &str = "buildbucket.v2.Builds";

/// Output property the leaser sets once it holds a DUT.
const DUT_NAME_PROPERTY: &str = "dut_name";

/// Fully qualified builder name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderId {
    pub project: String,
    pub bucket: String,
    pub builder: String,
}

impl Default for BuilderId {
    fn default() -> Self {
        Self {
            project: "chromeos".into(),
            bucket: "test_runner".into(),
            builder: "dut_leaser".into(),
        }
    }
}

pub struct BuildbucketClient {
    transport: Transport,
    /// `scheme://host` of the pRPC server.
    origin: String,
    builder: BuilderId,
}

impl BuildbucketClient {
    /// `host` may be a bare host name (HTTPS is assumed) or a full origin.
    pub fn new(transport: Transport, host: &str, builder: BuilderId) -> Self {
        let host = host.trim_end_matches('/');
        let origin = if host.contains("://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        Self {
            transport,
            origin,
            builder,
        }
    }

    fn method(&self, name: &str) -> String {
        format!("{}/prpc/{SERVICE}/{name}", self.origin)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleBuildRequest<'a> {
    builder: &'a BuilderId,
    properties: LeaseProperties,
    dimensions: Vec<KeyValue>,
    tags: Vec<KeyValue>,
}

#[derive(Debug, Serialize)]
struct LeaseProperties {
    lease_length_minutes: u32,
}

#[derive(Debug, Serialize)]
struct GetBuildRequest {
    id: BuildId,
    fields: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelBuildRequest<'a> {
    id: BuildId,
    summary_markdown: &'a str,
}

#[derive(Debug, Deserialize)]
struct Build {
    id: BuildId,
    #[serde(default = "unspecified")]
    status: BuildStatus,
    #[serde(default)]
    output: Option<BuildOutput>,
}

#[derive(Debug, Default, Deserialize)]
struct BuildOutput {
    #[serde(default)]
    properties: serde_json::Map<String, Value>,
}

fn unspecified() -> BuildStatus {
    BuildStatus::Unspecified
}

impl From<Build> for BuildInfo {
    fn from(b: Build) -> Self {
        let dut_name = b
            .output
            .and_then(|o| o.properties.get(DUT_NAME_PROPERTY).cloned())
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.is_empty());
        BuildInfo {
            id: b.id,
            status: b.status,
            dut_name,
        }
    }
}

#[async_trait]
impl BuildService for BuildbucketClient {
    async fn schedule_build(&self, request: &ScheduleRequest) -> Result<BuildId, ServiceError> {
        let body = ScheduleBuildRequest {
            builder: &self.builder,
            properties: LeaseProperties {
                lease_length_minutes: request.lease_minutes,
            },
            dimensions: request.dimensions.to_pairs(),
            tags: request.tags.iter().map(KeyValue::from_tag).collect(),
        };
        let build: Build = self
            .transport
            .prpc(&self.method("ScheduleBuild"), &body)
            .await?;
        debug!(build_id = %build.id, "scheduled lease build");
        Ok(build.id)
    }

    async fn get_build(&self, id: BuildId) -> Result<BuildInfo, ServiceError> {
        let body = GetBuildRequest {
            id,
            fields: "id,status,output.properties",
        };
        let build: Build = self.transport.prpc(&self.method("GetBuild"), &body).await?;
        Ok(build.into())
    }

    async fn cancel_build(&self, id: BuildId, summary: &str) -> Result<(), ServiceError> {
        let body = CancelBuildRequest {
            id,
            summary_markdown: summary,
        };
        let _: Build = self
            .transport
            .prpc(&self.method("CancelBuild"), &body)
            .await?;
        Ok(())
    }

    fn build_url(&self, id: BuildId) -> String {
        format!(
            "https://ci.chromium.org/p/{}/builders/{}/{}/b{}",
            self.builder.project, self.builder.bucket, self.builder.builder, id
        )
    }
}
