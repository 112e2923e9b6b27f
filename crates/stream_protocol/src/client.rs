use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::config::StreamApiConfig;
use crate::error::{parse_error_message, StreamApiError};
use crate::payload::QueryRequest;
use crate::retry::is_retryable_http_error;
use crate::endpoint::endpoint_url;

/// Optional cancellation signal shared between the interrupt path and connect loop.
pub type CancellationSignal = Arc<AtomicBool>;

/// Raw response body chunks in transport order.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, StreamApiError>>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);
const EVENT_STREAM: &str = "text/event-stream";

#[derive(Debug)]
pub struct StreamApiClient {
    http: Client,
    config: StreamApiConfig,
    query_url: Url,
    interrupt_url: Url,
}

impl StreamApiClient {
    pub fn new(config: StreamApiConfig) -> Result<Self, StreamApiError> {
        let query_url = endpoint_url(&config.base_url, &config.query_path)?;
        let interrupt_url = endpoint_url(&config.base_url, &config.interrupt_path)?;

        let mut builder = Client::builder();
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let http = builder.build().map_err(StreamApiError::from)?;

        Ok(Self {
            http,
            config,
            query_url,
            interrupt_url,
        })
    }

    pub fn config(&self) -> &StreamApiConfig {
        &self.config
    }

    pub fn query_url(&self) -> &Url {
        &self.query_url
    }

    pub fn interrupt_url(&self) -> &Url {
        &self.interrupt_url
    }

    pub fn build_headers(&self) -> Result<HeaderMap, StreamApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(EVENT_STREAM));
        if let Some(user_agent) = self.config.user_agent.as_deref() {
            headers.insert(
                USER_AGENT,
                HeaderValue::from_str(user_agent)
                    .map_err(|_| StreamApiError::InvalidHeader("user-agent".to_owned()))?,
            );
        }
        for (key, value) in &self.config.extra_headers {
            headers.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| StreamApiError::InvalidHeader(format!("invalid key: {key}")))?,
                HeaderValue::from_str(value)
                    .map_err(|_| StreamApiError::InvalidHeader(format!("invalid value for {key}")))?,
            );
        }
        Ok(headers)
    }

    pub fn build_request(
        &self,
        request: &QueryRequest,
    ) -> Result<reqwest::RequestBuilder, StreamApiError> {
        Ok(self
            .http
            .post(self.query_url.clone())
            .headers(self.build_headers()?)
            .json(request))
    }

    /// Sends the query, retrying transient connect failures with backoff.
    ///
    /// Cancellation is honoured between and during attempts; once a successful
    /// response is returned the caller owns the stream.
    pub async fn send_with_retry(
        &self,
        request: &QueryRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, StreamApiError> {
        let policy = self.config.retry;
        let mut last_status: Option<StatusCode> = None;
        let mut last_error = None;

        for attempt in 0..=policy.max_retries {
            if is_cancelled(cancellation) {
                return Err(StreamApiError::Cancelled);
            }

            let response = self.build_request(request)?.send();
            let response = await_or_cancel(response, cancellation)
                .await?
                .map_err(StreamApiError::from);

            match response {
                Ok(response) => {
                    if response.status().is_success() {
                        return Ok(response);
                    }

                    let status = response.status();
                    last_status = Some(status);
                    let body = await_or_cancel(response.text(), cancellation)
                        .await?
                        .unwrap_or_default();
                    let message = parse_error_message(status, &body);
                    last_error = Some(message.clone());

                    if attempt < policy.max_retries && is_retryable_http_error(status.as_u16(), &body) {
                        warn!(attempt, %status, %message, "retrying query after transient status");
                        await_or_cancel(tokio::time::sleep(policy.delay_for(attempt)), cancellation)
                            .await?;
                        continue;
                    }

                    return Err(StreamApiError::Status(status, message));
                }
                Err(error) => {
                    let message = error.to_string();
                    last_error = Some(message.clone());
                    if attempt < policy.max_retries {
                        warn!(attempt, %message, "retrying query after connect failure");
                        await_or_cancel(tokio::time::sleep(policy.delay_for(attempt)), cancellation)
                            .await?;
                        continue;
                    }
                    return Err(StreamApiError::RetryExhausted {
                        status: last_status,
                        last_error,
                    });
                }
            }
        }

        Err(StreamApiError::RetryExhausted {
            status: last_status,
            last_error,
        })
    }

    /// Opens the push stream for one query and returns its body chunks.
    ///
    /// The returned stream is not tied to `cancellation`; callers keep draining it
    /// after an interrupt until the upstream closes it.
    pub async fn open_stream(
        &self,
        request: &QueryRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<ByteStream, StreamApiError> {
        let response = self.send_with_retry(request, cancellation).await?;
        debug!(url = %self.query_url, status = %response.status(), "query stream opened");

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(StreamApiError::from))
            .boxed())
    }

    /// Asks the upstream service to cancel the current turn. Safe to repeat.
    pub async fn interrupt(&self) -> Result<(), StreamApiError> {
        let response = self
            .http
            .post(self.interrupt_url.clone())
            .headers(self.build_headers()?)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(StreamApiError::Status(status, parse_error_message(status, &body)))
    }
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, StreamApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(StreamApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(StreamApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}
