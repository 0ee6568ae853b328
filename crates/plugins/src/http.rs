//! Shared HTTP transport for the network-backed adapters.

use reqwest::{Client, Method, RequestBuilder, Response};
use std::collections::BTreeMap;
use std::time::Duration;
use toolrelay_core::{AdapterError, CancellationToken, ExecutionRequest, RawResponse};
use tracing::debug;

/// Client used by the built-in adapters. Per-attempt timeouts are enforced
/// by the executor; this only bounds connection setup.
pub fn default_client() -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| Client::new())
}

pub fn prepare(client: &Client, request: &ExecutionRequest) -> Result<RequestBuilder, AdapterError> {
    let method = Method::from_bytes(request.method.as_bytes())
        .map_err(|_| AdapterError::Build(format!("Invalid HTTP method: {}", request.method)))?;
    let mut builder = client.request(method, &request.url);
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &request.body {
        builder = builder.body(body.clone());
    }
    Ok(builder)
}

pub fn response_headers(response: &Response) -> BTreeMap<String, String> {
    response
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect()
}

pub fn status_text(response: &Response) -> String {
    response
        .status()
        .canonical_reason()
        .unwrap_or_default()
        .to_string()
}

/// Send `request`, aborting as soon as `cancel` fires.
pub async fn send(
    client: &Client,
    request: &ExecutionRequest,
    cancel: &CancellationToken,
) -> Result<RawResponse, AdapterError> {
    let builder = prepare(client, request)?;
    debug!("Sending {}", request.summary());

    let exchange = async move {
        let response = builder
            .send()
            .await
            .map_err(|e| AdapterError::Http(e.to_string()))?;
        let status = response.status().as_u16();
        let status_text = status_text(&response);
        let headers = response_headers(&response);
        let body = response
            .text()
            .await
            .map_err(|e| AdapterError::Http(e.to_string()))?;
        Ok(RawResponse {
            status,
            status_text,
            headers,
            body,
        })
    };

    tokio::select! {
        _ = cancel.cancelled() => Err(AdapterError::Cancelled),
        result = exchange => result,
    }
}
