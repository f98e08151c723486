use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;

use taxid2prot::config::ConfigLoader;
use taxid2prot::domain::{Source, Strategy};
use taxid2prot::error::FetchError;

#[test]
fn resolve_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("taxid2prot.json");
    fs::write(
        &path,
        r#"{
            "schema_version": 1,
            "taxa": [562, "txid9606", {"id": 10090, "label": "mouse"}],
            "source": "ncbi",
            "strategy": "export",
            "out": "downloads",
            "batch_size": 5,
            "workers": 2,
            "timeout_secs": 30,
            "retries": 2,
            "user_agent": "taxid2prot-tests",
            "poll": {"interval_secs": 1, "notice_every": 5, "deadline_secs": 90}
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    let ids: Vec<u64> = resolved.taxa.iter().map(|id| id.get()).collect();
    assert_eq!(ids, vec![562, 9606, 10090]);
    assert_eq!(resolved.source, Source::Ncbi);
    assert_eq!(resolved.strategy, Strategy::Export);
    assert_eq!(resolved.out.as_str(), "downloads");
    assert_eq!(resolved.batch_size, 5);
    assert_eq!(resolved.workers, Some(2));
    assert_eq!(resolved.timeout, Duration::from_secs(30));
    assert_eq!(resolved.retries, 2);
    assert_eq!(resolved.user_agent.as_deref(), Some("taxid2prot-tests"));
    assert_eq!(resolved.poll.interval, Duration::from_secs(1));
    assert_eq!(resolved.poll.notice_every, 5);
    assert_eq!(resolved.poll.deadline, Duration::from_secs(90));
}

#[test]
fn explicit_missing_file_is_a_read_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, FetchError::ConfigRead(_));
    assert!(err.is_configuration());
}

#[test]
fn malformed_json_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("broken.json");
    fs::write(&path, "{ \"taxa\": [562,").unwrap();
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, FetchError::ConfigParse(_));
}

#[test]
fn zero_taxon_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("zero.json");
    fs::write(&path, r#"{"taxa": [0]}"#).unwrap();
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, FetchError::InvalidTaxonomyId(value) if value == "0");
}

#[test]
fn newer_schema_version_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("future.json");
    fs::write(&path, r#"{"schema_version": 2, "taxa": [562]}"#).unwrap();
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, FetchError::ConfigParse(message) if message.contains("schema_version 2"));
}
