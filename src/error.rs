use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum FetchError {
    #[error("invalid taxonomy id: {0}")]
    InvalidTaxonomyId(String),

    #[error("invalid save path, not an existing directory: {0}")]
    #[diagnostic(help("pass an existing directory with --out"))]
    InvalidSavePath(String),

    #[error("unable to create a download folder under {base} after {attempts} attempts")]
    DirectoryExhausted { base: String, attempts: usize },

    #[error("missing config file taxid2prot.json in current directory")]
    #[diagnostic(help("pass taxonomy ids on the command line or use --config"))]
    MissingConfig,

    #[error("no taxonomy ids to fetch")]
    #[diagnostic(help("list ids in the \"taxa\" array of the config file or pass them as arguments"))]
    NoTaxonomyIds,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("uniprot request failed: {0}")]
    UniprotHttp(String),

    #[error("uniprot returned status {status}: {message}")]
    UniprotStatus { status: u16, message: String },

    #[error("NCBI request failed: {0}")]
    NcbiHttp(String),

    #[error("NCBI returned status {status}: {message}")]
    NcbiStatus { status: u16, message: String },

    #[error("export failed: {0}")]
    Export(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl FetchError {
    /// Errors that abort a run before any identifier is fetched.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FetchError::InvalidTaxonomyId(_)
                | FetchError::InvalidSavePath(_)
                | FetchError::DirectoryExhausted { .. }
                | FetchError::MissingConfig
                | FetchError::NoTaxonomyIds
                | FetchError::ConfigRead(_)
                | FetchError::ConfigParse(_)
        )
    }

    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            FetchError::UniprotHttp(_)
                | FetchError::UniprotStatus { .. }
                | FetchError::NcbiHttp(_)
                | FetchError::NcbiStatus { .. }
        )
    }
}
