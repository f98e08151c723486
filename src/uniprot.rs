use reqwest::blocking::{Client, Response};
use reqwest::header::HeaderMap;

use crate::domain::TaxonomyId;
use crate::error::FetchError;
use crate::fetch::{
    FetchedFasta, HttpOptions, ProteomeClient, RetryPolicy, build_client, get_as,
    send_with_retries,
};
use crate::session::DownloadSession;

const UNIPROT_BASE: &str = "https://rest.uniprot.org/uniprotkb";

/// Streams every UniProtKB entry of an organism as one FASTA body.
#[derive(Clone)]
pub struct UniprotProteomeClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl UniprotProteomeClient {
    pub fn new(options: &HttpOptions) -> Result<Self, FetchError> {
        let client = build_client(options, HeaderMap::new(), FetchError::UniprotHttp)?;
        Ok(Self {
            client,
            base_url: UNIPROT_BASE.to_string(),
            retry: options.retry,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn stream_url(&self) -> String {
        format!("{}/stream", self.base_url.trim_end_matches('/'))
    }

    pub fn organism_query(tax_id: TaxonomyId) -> String {
        format!("organism_id:{tax_id}")
    }

    fn handle_status(response: Response) -> Result<Response, FetchError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "UniProt request failed".to_string());
        Err(FetchError::UniprotStatus { status, message })
    }
}

impl ProteomeClient for UniprotProteomeClient {
    fn fetch_fasta(
        &self,
        session: &DownloadSession,
        tax_id: TaxonomyId,
    ) -> Result<FetchedFasta, FetchError> {
        let url = self.stream_url();
        let query = Self::organism_query(tax_id);
        let response = send_with_retries(
            self.retry,
            || {
                get_as(&self.client, session, &url)
                    .query(&[("query", query.as_str()), ("format", "fasta")])
            },
            FetchError::UniprotHttp,
        )?;
        let response = Self::handle_status(response)?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|err| FetchError::UniprotHttp(err.to_string()))?;
        Ok(FetchedFasta { status, text })
    }
}
