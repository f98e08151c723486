use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::app::DEFAULT_BATCH_SIZE;
use crate::domain::{Source, Strategy, TaxonomyId};
use crate::error::FetchError;
use crate::export::PollPolicy;
use crate::fetch::DEFAULT_TIMEOUT_SECS;

pub const CONFIG_FILE: &str = "taxid2prot.json";
/// The only `schema_version` this build understands.
pub const SUPPORTED_SCHEMA: u32 = 1;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub taxa: Vec<TaxonEntry>,
    #[serde(default)]
    pub source: Option<Source>,
    #[serde(default)]
    pub strategy: Option<Strategy>,
    #[serde(default)]
    pub out: Option<String>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub retries: Option<usize>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub poll: Option<PollEntry>,
}

/// `435`, `"txid435"` or `{ "id": 435, "label": "E. coli" }`.
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum TaxonEntry {
    Number(u64),
    Shorthand(String),
    Detailed(TaxonEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TaxonEntryObject {
    pub id: TaxonIdValue,
    /// Free-form note, kept for readers of the config file only.
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum TaxonIdValue {
    Number(u64),
    Text(String),
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PollEntry {
    #[serde(default)]
    pub interval_secs: Option<u64>,
    #[serde(default)]
    pub notice_every: Option<u32>,
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub taxa: Vec<TaxonomyId>,
    pub source: Source,
    pub strategy: Strategy,
    pub out: Utf8PathBuf,
    pub batch_size: usize,
    pub workers: Option<usize>,
    pub timeout: Duration,
    pub retries: usize,
    pub user_agent: Option<String>,
    pub poll: PollPolicy,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, FetchError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(FetchError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| FetchError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| FetchError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, FetchError> {
        let schema_version = config.schema_version.unwrap_or(SUPPORTED_SCHEMA);
        if schema_version != SUPPORTED_SCHEMA {
            return Err(FetchError::ConfigParse(format!(
                "unsupported schema_version {schema_version}, expected {SUPPORTED_SCHEMA}"
            )));
        }

        let taxa = config
            .taxa
            .into_iter()
            .map(|entry| match entry {
                TaxonEntry::Number(value) => TaxonomyId::new(value),
                TaxonEntry::Shorthand(value) => value.parse(),
                TaxonEntry::Detailed(obj) => match obj.id {
                    TaxonIdValue::Number(value) => TaxonomyId::new(value),
                    TaxonIdValue::Text(value) => value.parse(),
                },
            })
            .collect::<Result<Vec<_>, FetchError>>()?;

        let defaults = PollPolicy::default();
        let poll = config.poll.unwrap_or_default();
        let poll = PollPolicy {
            interval: poll
                .interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.interval),
            notice_every: poll.notice_every.unwrap_or(defaults.notice_every),
            deadline: poll
                .deadline_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.deadline),
        };

        Ok(ResolvedConfig {
            schema_version,
            taxa,
            source: config.source.unwrap_or_default(),
            strategy: config.strategy.unwrap_or_default(),
            out: Utf8PathBuf::from(config.out.unwrap_or_else(|| ".".to_string())),
            batch_size: config.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            workers: config.workers,
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            retries: config.retries.unwrap_or(0),
            user_agent: config.user_agent,
            poll,
        })
    }
}
