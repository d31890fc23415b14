use std::{error::Error as _, time::Duration};

use reqwest::{Client, RequestBuilder, header};
use serde::{Serialize, de::DeserializeOwned};
use skylab_core::service::ServiceError;
use tracing::trace;

/// Prefix pRPC servers put in front of every JSON response body.
const PRPC_XSSI_PREFIX: &str = ")]}'";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared HTTP client with optional bearer credentials.
///
/// Cloning is cheap; every service client holds one clone.
#[derive(Clone, Debug)]
pub struct Transport {
    http: Client,
    token: Option<String>,
}

impl Transport {
    pub fn new(token: Option<String>) -> Result<Self, ServiceError> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(concat!("skylab/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ServiceError::network(false, error_chain(&e)))?;
        Ok(Self::with_client(http, token))
    }

    pub fn with_client(http: Client, token: Option<String>) -> Self {
        Self {
            http,
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }

    /// `GET url?query` decoding a JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ServiceError> {
        let body = self.send(self.http.get(url).query(query)).await?;
        decode(&body)
    }

    /// `POST url` with a JSON body, decoding a JSON response.
    pub async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T, ServiceError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = self.send(self.http.post(url).json(body)).await?;
        decode(&body)
    }

    /// Unary pRPC call in JSON encoding.
    pub async fn prpc<B, T>(&self, url: &str, body: &B) -> Result<T, ServiceError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let req = self
            .http
            .post(url)
            .header(header::ACCEPT, "application/json")
            .json(body);
        let body = self.send(req).await?;
        decode(strip_xssi_prefix(&body))
    }

    async fn send(&self, req: RequestBuilder) -> Result<String, ServiceError> {
        let req = match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        };
        let resp = req.send().await.map_err(network_error)?;
        let status = resp.status();
        let body = resp.text().await.map_err(network_error)?;
        trace!(status = status.as_u16(), len = body.len(), "response received");
        if !status.is_success() {
            return Err(ServiceError::http(status.as_u16(), body.trim()));
        }
        Ok(body)
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ServiceError> {
    serde_json::from_str(body).map_err(|e| ServiceError::Decode(e.to_string()))
}

pub(crate) fn strip_xssi_prefix(body: &str) -> &str {
    body.strip_prefix(PRPC_XSSI_PREFIX)
        .map(str::trim_start)
        .unwrap_or(body)
}

/// Timeouts and refused connections are worth retrying.
fn network_error(e: reqwest::Error) -> ServiceError {
    ServiceError::network(e.is_timeout() || e.is_connect(), error_chain(&e))
}

/// Renders an error with all of its sources, so classifiers can see the
/// underlying I/O message.
fn error_chain(e: &reqwest::Error) -> String {
    let mut out = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
