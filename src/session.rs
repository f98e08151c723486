use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use rand::seq::IndexedRandom;
use tracing::{debug, info};

use crate::domain::Source;
use crate::error::FetchError;

pub const DIRECTORY_ATTEMPTS: usize = 40;
pub const DIRECTORY_PREFIX: &str = "proteins";

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:132.0) Gecko/20100101 Firefox/132.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_7_1) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
];

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub source: Source,
    pub user_agent: Option<String>,
}

/// Per-worker transport context. Built once, then only borrowed.
#[derive(Debug, Clone)]
pub struct DownloadSession {
    directory: Utf8PathBuf,
    user_agent: String,
    source: Source,
}

impl DownloadSession {
    pub fn create(base: &Utf8Path, options: &SessionOptions) -> Result<Self, FetchError> {
        if !base.as_std_path().is_dir() {
            return Err(FetchError::InvalidSavePath(base.to_string()));
        }
        let directory = create_download_dir(base)?;
        info!("Your files will be saved in {directory}.");

        let user_agent = options
            .user_agent
            .clone()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(random_user_agent);
        debug!(user_agent = %user_agent, "session client identity");

        Ok(Self {
            directory,
            user_agent,
            source: options.source,
        })
    }

    pub fn directory(&self) -> &Utf8Path {
        &self.directory
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn source(&self) -> Source {
        self.source
    }
}

/// Claim the first free `proteins(<i>)` directory under `base`.
///
/// `create_dir` fails on an existing entry, so concurrent workers probing the
/// same base never end up sharing a directory.
pub fn create_download_dir(base: &Utf8Path) -> Result<Utf8PathBuf, FetchError> {
    for attempt in 0..DIRECTORY_ATTEMPTS {
        let candidate = base.join(format!("{DIRECTORY_PREFIX}({attempt})"));
        match fs::create_dir(candidate.as_std_path()) {
            Ok(()) => return Ok(candidate),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(FetchError::Filesystem(format!(
                    "create {candidate}: {err}"
                )));
            }
        }
    }
    Err(FetchError::DirectoryExhausted {
        base: base.to_string(),
        attempts: DIRECTORY_ATTEMPTS,
    })
}

pub fn random_user_agent() -> String {
    let mut rng = rand::rng();
    USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(USER_AGENTS[0])
        .to_string()
}
