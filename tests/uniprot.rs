use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use taxid2prot::domain::TaxonomyId;
use taxid2prot::error::FetchError;
use taxid2prot::fetch::{FetchedFasta, HttpOptions, ProteomeClient};
use taxid2prot::session::{DownloadSession, SessionOptions};
use taxid2prot::uniprot::UniprotProteomeClient;

const AGENT: &str = "taxid2prot-tests/1.0";

/// Runs one blocking fetch against `base` off the async runtime.
async fn fetch(base: String, tax_id: u64) -> Result<FetchedFasta, FetchError> {
    tokio::task::spawn_blocking(move || {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let options = SessionOptions {
            user_agent: Some(AGENT.to_string()),
            ..SessionOptions::default()
        };
        let session = DownloadSession::create(&dir, &options).unwrap();
        let client = UniprotProteomeClient::new(&HttpOptions::default())
            .unwrap()
            .with_base_url(base);
        client.fetch_fasta(&session, TaxonomyId::new(tax_id).unwrap())
    })
    .await
    .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn stream_query_selects_organism_as_fasta() {
    let server = MockServer::start().await;
    let body = ">sp|P0A7V3|RS3_ECOLI 30S ribosomal protein S3 OS=Escherichia coli OX=562\nMGQKVHP\n";
    Mock::given(method("GET"))
        .and(path("/uniprotkb/stream"))
        .and(query_param("query", "organism_id:562"))
        .and(query_param("format", "fasta"))
        .and(header("user-agent", AGENT))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;

    let fetched = fetch(format!("{}/uniprotkb", server.uri()), 562).await.unwrap();

    assert_eq!(fetched.status, 200);
    assert_eq!(fetched.text, body);
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].headers.get("user-agent").unwrap(), AGENT);
}

#[tokio::test(flavor = "multi_thread")]
async fn unavailable_service_is_a_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stream"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = fetch(server.uri(), 9606).await.unwrap_err();

    assert_matches!(
        err,
        FetchError::UniprotStatus { status: 503, ref message } if message == "maintenance"
    );
    assert!(err.is_remote());
}
