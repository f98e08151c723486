use std::collections::{HashMap, HashSet};
use std::fs;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use taxid2prot::app::{App, ItemOutcome, RunOptions, run_parallel};
use taxid2prot::domain::TaxonomyId;
use taxid2prot::error::FetchError;
use taxid2prot::fetch::{FetchedFasta, ProteomeClient};
use taxid2prot::output::JsonOutput;
use taxid2prot::session::{DownloadSession, SessionOptions};

/// Serves canned bodies by taxonomy id; unknown ids answer 404.
#[derive(Default)]
struct MockProteome {
    bodies: HashMap<u64, String>,
    calls: Mutex<Vec<u64>>,
}

impl MockProteome {
    fn with(mut self, tax_id: u64, body: &str) -> Self {
        self.bodies.insert(tax_id, body.to_string());
        self
    }
}

impl ProteomeClient for MockProteome {
    fn fetch_fasta(
        &self,
        _session: &DownloadSession,
        tax_id: TaxonomyId,
    ) -> Result<FetchedFasta, FetchError> {
        self.calls.lock().unwrap().push(tax_id.get());
        match self.bodies.get(&tax_id.get()) {
            Some(text) => Ok(FetchedFasta {
                status: 200,
                text: text.clone(),
            }),
            None => Err(FetchError::UniprotStatus {
                status: 404,
                message: "not found".to_string(),
            }),
        }
    }
}

fn utf8_temp() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, path)
}

fn ids(values: &[u64]) -> Vec<TaxonomyId> {
    values
        .iter()
        .map(|value| TaxonomyId::new(*value).unwrap())
        .collect()
}

fn fasta_files(dir: &camino::Utf8Path) -> Vec<String> {
    let mut names: Vec<String> = dir
        .read_dir_utf8()
        .unwrap()
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string())
        .filter(|name| name.ends_with(".fasta"))
        .collect();
    names.sort();
    names
}

#[test]
fn one_file_for_hit_and_warning_for_empty_body() {
    let (_temp, base) = utf8_temp();
    let session = DownloadSession::create(&base, &SessionOptions::default()).unwrap();
    let client = MockProteome::default()
        .with(
            435,
            ">sp|P0A7V3|RS3_ECOLI 30S ribosomal protein S3 OS=Escherichia coli OX=562\nMGQKVHP\n",
        )
        .with(436, "");
    let app = App::new(client);

    let report = app.run(&session, &ids(&[435, 436]), &JsonOutput).unwrap();

    assert_eq!(fasta_files(session.directory()), vec!["escherichia_coli_435.fasta"]);
    assert_eq!(report.items.len(), 2);
    assert_eq!(report.items[0].outcome, ItemOutcome::Saved);
    assert_eq!(report.items[0].organism.as_deref(), Some("escherichia_coli"));
    assert_eq!(report.items[1].outcome, ItemOutcome::Empty);
    assert_eq!(report.items[1].tax_id, TaxonomyId::new(436).ok());
    assert_eq!(report.count(ItemOutcome::Empty), 1);
}

#[test]
fn remote_failure_does_not_abort_batch() {
    let (_temp, base) = utf8_temp();
    let session = DownloadSession::create(&base, &SessionOptions::default()).unwrap();
    let client = MockProteome::default().with(9606, ">p1 kinase [Homo sapiens]\nMK\n");
    let app = App::new(client);

    let report = app.run(&session, &ids(&[1, 9606]), &JsonOutput).unwrap();

    assert_eq!(report.items[0].outcome, ItemOutcome::Failed);
    assert_matches!(&report.items[0].message, Some(message) if message.contains("404"));
    assert_eq!(report.items[1].outcome, ItemOutcome::Saved);
    assert_eq!(fasta_files(session.directory()), vec!["homo_sapiens_9606.fasta"]);
}

#[test]
fn unnamed_payload_uses_fallback_name() {
    let (_temp, base) = utf8_temp();
    let session = DownloadSession::create(&base, &SessionOptions::default()).unwrap();
    let app = App::new(MockProteome::default().with(7, ">anonymous\nMK\n"));

    let report = app.run(&session, &ids(&[7]), &JsonOutput).unwrap();

    assert_eq!(report.items[0].organism.as_deref(), Some("no_name"));
    assert_eq!(fasta_files(session.directory()), vec!["no_name_7.fasta"]);
}

#[test]
fn manifest_records_every_item() {
    let (_temp, base) = utf8_temp();
    let session = DownloadSession::create(&base, &SessionOptions::default()).unwrap();
    let app = App::new(MockProteome::default().with(435, ">x OS=Escherichia coli\nM\n"));

    app.run(&session, &ids(&[435, 436]), &JsonOutput).unwrap();

    let raw = fs::read_to_string(session.directory().join("manifest.json")).unwrap();
    let manifest: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(manifest["source"], "uniprot");
    assert_eq!(manifest["strategy"], "direct");
    assert_eq!(manifest["items"][0]["outcome"], "saved");
    assert_eq!(manifest["items"][1]["outcome"], "failed");
    assert!(manifest["tool"].as_str().unwrap().starts_with("taxid2prot/"));
}

#[test]
fn parallel_run_keeps_order_in_distinct_directories() {
    let (_temp, base) = utf8_temp();
    let mut options = RunOptions::new(base.clone());
    options.workers = 3;
    let input = ids(&[10, 11, 12, 13, 14]);

    let reports = run_parallel(
        &options,
        &input,
        || {
            let mut client = MockProteome::default();
            for id in 10..15 {
                client = client.with(id, &format!(">p{id} [Species n{id}]\nMK\n"));
            }
            Ok(client)
        },
        &JsonOutput,
    )
    .unwrap()
    .into_iter()
    .map(Result::unwrap)
    .collect::<Vec<_>>();

    assert_eq!(reports.len(), 3);
    let order: Vec<TaxonomyId> = reports
        .iter()
        .flat_map(|report| report.items.iter().filter_map(|item| item.tax_id))
        .collect();
    assert_eq!(order, input);

    let directories: HashSet<&str> = reports.iter().map(|r| r.directory.as_str()).collect();
    assert_eq!(directories.len(), 3);
    assert!(base.join("proteins(2)").is_dir());
    assert!(!base.join("proteins(3)").exists());
}

#[test]
fn parallel_run_rejects_bad_base_before_fetching() {
    let (_temp, base) = utf8_temp();
    let options = RunOptions::new(base.join("missing"));

    let err = run_parallel(
        &options,
        &ids(&[435]),
        || Ok(MockProteome::default()),
        &JsonOutput,
    )
    .unwrap_err();

    assert_matches!(err, FetchError::InvalidSavePath(_));
    assert!(err.is_configuration());
}

/// Deletes its own output directory while fetching one id, so that worker
/// cannot write its manifest.
struct VanishingDirectory {
    doomed: u64,
}

impl ProteomeClient for VanishingDirectory {
    fn fetch_fasta(
        &self,
        session: &DownloadSession,
        tax_id: TaxonomyId,
    ) -> Result<FetchedFasta, FetchError> {
        if tax_id.get() == self.doomed {
            fs::remove_dir_all(session.directory()).unwrap();
        }
        Ok(FetchedFasta {
            status: 200,
            text: format!(">p{tax_id} [Species n{tax_id}]\nMK\n"),
        })
    }
}

#[test]
fn failed_worker_keeps_other_reports() {
    let (_temp, base) = utf8_temp();
    let mut options = RunOptions::new(base.clone());
    options.workers = 2;

    let results = run_parallel(
        &options,
        &ids(&[20, 21]),
        || Ok(VanishingDirectory { doomed: 21 }),
        &JsonOutput,
    )
    .unwrap();

    assert_eq!(results.len(), 2);
    let report = results[0].as_ref().unwrap();
    assert_eq!(report.items[0].outcome, ItemOutcome::Saved);
    assert!(base.join("proteins(0)").join("manifest.json").is_file());
    assert_matches!(&results[1], Err(FetchError::Filesystem(_)));
}
