use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxonomyId(u64);

impl TaxonomyId {
    pub fn new(value: u64) -> Result<Self, FetchError> {
        if value == 0 {
            return Err(FetchError::InvalidTaxonomyId(value.to_string()));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaxonomyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaxonomyId {
    type Err = FetchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let digits = trimmed
            .strip_prefix("txid")
            .or_else(|| trimmed.strip_prefix("TXID"))
            .unwrap_or(trimmed);
        let is_valid = !digits.is_empty() && digits.chars().all(|ch| ch.is_ascii_digit());
        if !is_valid {
            return Err(FetchError::InvalidTaxonomyId(value.to_string()));
        }
        let number = digits
            .parse::<u64>()
            .map_err(|_| FetchError::InvalidTaxonomyId(value.to_string()))?;
        Self::new(number).map_err(|_| FetchError::InvalidTaxonomyId(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    #[default]
    Uniprot,
    Ncbi,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Uniprot => write!(f, "uniprot"),
            Source::Ncbi => write!(f, "ncbi"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// One synchronous request per taxonomy id.
    #[default]
    Direct,
    /// Queue exports, wait for them in batches, then rename by organism.
    Export,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Direct => write!(f, "direct"),
            Strategy::Export => write!(f, "export"),
        }
    }
}

/// Lowercase, underscore-joined scientific name used in output file names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganismName(String);

impl OrganismName {
    pub const FALLBACK: &'static str = "no_name";

    pub fn normalize(raw: &str) -> Option<Self> {
        let joined = raw
            .split_whitespace()
            .map(|part| part.to_lowercase())
            .collect::<Vec<_>>()
            .join("_");
        if joined.is_empty() {
            return None;
        }
        Some(Self(joined))
    }

    pub fn fallback() -> Self {
        Self(Self::FALLBACK.to_string())
    }

    pub fn is_fallback(&self) -> bool {
        self.0 == Self::FALLBACK
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrganismName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
