use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, USER_AGENT};

use crate::domain::TaxonomyId;
use crate::error::FetchError;
use crate::session::DownloadSession;

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFasta {
    pub status: u16,
    pub text: String,
}

impl FetchedFasta {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

pub trait ProteomeClient: Send + Sync {
    fn fetch_fasta(
        &self,
        session: &DownloadSession,
        tax_id: TaxonomyId,
    ) -> Result<FetchedFasta, FetchError>;
}

impl<C: ProteomeClient + ?Sized> ProteomeClient for &C {
    fn fetch_fasta(
        &self,
        session: &DownloadSession,
        tax_id: TaxonomyId,
    ) -> Result<FetchedFasta, FetchError> {
        (**self).fetch_fasta(session, tax_id)
    }
}

impl<C: ProteomeClient + ?Sized> ProteomeClient for Box<C> {
    fn fetch_fasta(
        &self,
        session: &DownloadSession,
        tax_id: TaxonomyId,
    ) -> Result<FetchedFasta, FetchError> {
        (**self).fetch_fasta(session, tax_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

/// Shared blocking client; the client identity is set per request from the
/// session passed to each fetch.
pub fn build_client(
    options: &HttpOptions,
    headers: HeaderMap,
    on_error: fn(String) -> FetchError,
) -> Result<Client, FetchError> {
    Client::builder()
        .default_headers(headers)
        .timeout(options.timeout)
        .build()
        .map_err(|err| on_error(err.to_string()))
}

pub(crate) fn get_as(client: &Client, session: &DownloadSession, url: &str) -> RequestBuilder {
    client.get(url).header(USER_AGENT, session.user_agent())
}

pub(crate) fn send_with_retries<F>(
    policy: RetryPolicy,
    mut make_req: F,
    on_error: fn(String) -> FetchError,
) -> Result<Response, FetchError>
where
    F: FnMut() -> RequestBuilder,
{
    let mut attempt = 0usize;
    loop {
        let response = make_req().send();
        match response {
            Ok(resp) => {
                let status = resp.status().as_u16();
                if attempt < policy.max_retries && is_retryable_status(status) {
                    backoff(policy, attempt);
                    attempt += 1;
                    continue;
                }
                return Ok(resp);
            }
            Err(err) => {
                if attempt < policy.max_retries && is_retryable_error(&err) {
                    backoff(policy, attempt);
                    attempt += 1;
                    continue;
                }
                return Err(on_error(err.to_string()));
            }
        }
    }
}

fn backoff(policy: RetryPolicy, attempt: usize) {
    let delay = policy.base_delay * (attempt as u32 + 1);
    tracing::debug!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "retry");
    thread::sleep(delay);
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
