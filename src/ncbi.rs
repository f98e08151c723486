use reqwest::blocking::{Client, Response};
use reqwest::header::HeaderMap;
use serde_json::Value;
use tracing::debug;

use crate::domain::TaxonomyId;
use crate::error::FetchError;
use crate::fetch::{
    FetchedFasta, HttpOptions, ProteomeClient, RetryPolicy, build_client, get_as,
    send_with_retries,
};
use crate::session::DownloadSession;

const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
/// Upper bound of records E-utilities returns per efetch call.
pub const EFETCH_PAGE: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHistory {
    pub count: u64,
    pub web_env: String,
    pub query_key: String,
}

/// Protein database search by `txid<id>[Organism]`, fetched back as FASTA
/// through the E-utilities history server.
#[derive(Clone)]
pub struct NcbiProteomeClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl NcbiProteomeClient {
    pub fn new(options: &HttpOptions) -> Result<Self, FetchError> {
        let client = build_client(options, HeaderMap::new(), FetchError::NcbiHttp)?;
        let api_key = std::env::var("NCBI_API_KEY")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        Ok(Self {
            client,
            base_url: EUTILS_BASE.to_string(),
            api_key,
            retry: options.retry,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn organism_term(tax_id: TaxonomyId) -> String {
        format!("txid{tax_id}[Organism]")
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{name}.fcgi", self.base_url.trim_end_matches('/'))
    }

    fn with_key<'a>(&'a self, mut params: Vec<(&'a str, String)>) -> Vec<(&'a str, String)> {
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    fn handle_status(response: Response) -> Result<Response, FetchError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "NCBI request failed".to_string());
        Err(FetchError::NcbiStatus { status, message })
    }

    fn search(
        &self,
        session: &DownloadSession,
        tax_id: TaxonomyId,
    ) -> Result<SearchHistory, FetchError> {
        let url = self.endpoint("esearch");
        let params = self.with_key(vec![
            ("db", "protein".to_string()),
            ("term", Self::organism_term(tax_id)),
            ("usehistory", "y".to_string()),
            ("retmax", "0".to_string()),
            ("retmode", "json".to_string()),
        ]);
        let response = send_with_retries(
            self.retry,
            || get_as(&self.client, session, &url).query(&params),
            FetchError::NcbiHttp,
        )?;
        let response = Self::handle_status(response)?;
        let payload: Value = response
            .json()
            .map_err(|err| FetchError::NcbiHttp(err.to_string()))?;
        parse_search_history(&payload)
    }

    fn fetch_page(
        &self,
        session: &DownloadSession,
        history: &SearchHistory,
        start: u64,
    ) -> Result<(u16, String), FetchError> {
        let url = self.endpoint("efetch");
        let params = self.with_key(vec![
            ("db", "protein".to_string()),
            ("query_key", history.query_key.clone()),
            ("WebEnv", history.web_env.clone()),
            ("rettype", "fasta".to_string()),
            ("retmode", "text".to_string()),
            ("retstart", start.to_string()),
            ("retmax", EFETCH_PAGE.to_string()),
        ]);
        let response = send_with_retries(
            self.retry,
            || get_as(&self.client, session, &url).query(&params),
            FetchError::NcbiHttp,
        )?;
        let response = Self::handle_status(response)?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|err| FetchError::NcbiHttp(err.to_string()))?;
        Ok((status, text))
    }
}

impl ProteomeClient for NcbiProteomeClient {
    fn fetch_fasta(
        &self,
        session: &DownloadSession,
        tax_id: TaxonomyId,
    ) -> Result<FetchedFasta, FetchError> {
        let history = self.search(session, tax_id)?;
        debug!(tax_id = %tax_id, count = history.count, "esearch");
        if history.count == 0 {
            return Ok(FetchedFasta {
                status: 200,
                text: String::new(),
            });
        }

        let mut status = 200;
        let mut text = String::new();
        for start in page_starts(history.count) {
            let (page_status, page) = self.fetch_page(session, &history, start)?;
            status = page_status;
            text.push_str(&page);
        }
        Ok(FetchedFasta { status, text })
    }
}

pub fn parse_search_history(payload: &Value) -> Result<SearchHistory, FetchError> {
    let result = &payload["esearchresult"];
    if let Some(message) = result["ERROR"].as_str() {
        return Err(FetchError::NcbiHttp(message.to_string()));
    }
    let count = result["count"]
        .as_str()
        .and_then(|value| value.parse::<u64>().ok())
        .ok_or_else(|| FetchError::NcbiHttp("esearch response without count".to_string()))?;
    let web_env = result["webenv"].as_str().unwrap_or_default().to_string();
    let query_key = result["querykey"].as_str().unwrap_or_default().to_string();
    if count > 0 && (web_env.is_empty() || query_key.is_empty()) {
        return Err(FetchError::NcbiHttp(
            "esearch response without history".to_string(),
        ));
    }
    Ok(SearchHistory {
        count,
        web_env,
        query_key,
    })
}

fn page_starts(count: u64) -> impl Iterator<Item = u64> {
    (0..count).step_by(EFETCH_PAGE as usize)
}
