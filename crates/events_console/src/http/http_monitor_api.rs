use async_trait::async_trait;
use common::domain::{BatchStatus, Message, MonitorBatch, MonitorParams, BATCH_STATUS_HEADER};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::domain::{ConsoleError, ConsoleResult, EventsConsoleConfig, MonitorApi};

const MONITOR_PATH: &str = "/api/EventHub/monitor";
const STOP_PATH: &str = "/api/EventHub/stop";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Talks to the eventscope proxy over HTTP
pub struct HttpMonitorApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpMonitorApi {
    pub fn new(config: &EventsConsoleConfig) -> ConsoleResult<Self> {
        let base_url = config.proxy_base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ConsoleError::Api("proxy base url cannot be empty".to_string()));
        }

        Ok(Self {
            base_url,
            client: reqwest::Client::builder()
                .timeout(config.request_timeout())
                .build()
                .map_err(|error| ConsoleError::Api(error.to_string()))?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn error_from_response(response: reqwest::Response) -> ConsoleError {
    let status = response.status();
    let detail = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
    };
    ConsoleError::Api(format!("status {}: {}", status.as_u16(), detail))
}

#[async_trait]
impl MonitorApi for HttpMonitorApi {
    #[instrument(skip(self, params), fields(device_id = %params.device_id))]
    async fn monitor(&self, params: &MonitorParams) -> ConsoleResult<MonitorBatch> {
        let response = self
            .client
            .post(self.url(MONITOR_PATH))
            .json(params)
            .send()
            .await
            .map_err(|error| ConsoleError::Api(format!("monitor request failed: {}", error)))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let status = BatchStatus::from_header(
            response
                .headers()
                .get(BATCH_STATUS_HEADER)
                .and_then(|value| value.to_str().ok()),
        );
        let messages: Vec<Message> = response
            .json()
            .await
            .map_err(|error| ConsoleError::Api(format!("invalid monitor response: {}", error)))?;

        debug!(count = messages.len(), status = status.as_str(), "monitor batch received");
        Ok(MonitorBatch { messages, status })
    }

    #[instrument(skip(self))]
    async fn stop(&self) -> ConsoleResult<()> {
        let response = self
            .client
            .post(self.url(STOP_PATH))
            .send()
            .await
            .map_err(|error| ConsoleError::Api(format!("stop request failed: {}", error)))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }
}
