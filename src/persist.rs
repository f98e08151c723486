use std::collections::HashMap;
use std::fs;
use std::io::{self, BufRead, BufReader, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{OrganismName, TaxonomyId};
use crate::error::FetchError;
use crate::organism::first_line_organism;

/// Prefix of the files dropped by the export queue before renaming.
pub const EXPORT_PREFIX: &str = "sequence";
pub const FASTA_EXT: &str = "fasta";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Written(Utf8PathBuf),
    /// Target already existed and was left untouched.
    Conflict(Utf8PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    Renamed {
        from: Utf8PathBuf,
        to: Utf8PathBuf,
        organism: OrganismName,
    },
    NoName(Utf8PathBuf),
    Conflict {
        from: Utf8PathBuf,
        to: Utf8PathBuf,
    },
}

pub fn fasta_path(dir: &Utf8Path, organism: &OrganismName, tax_id: TaxonomyId) -> Utf8PathBuf {
    dir.join(format!("{organism}_{tax_id}.{FASTA_EXT}"))
}

/// Write `text` to `<dir>/<organism>_<tax_id>.fasta` unless that file exists.
pub fn persist_fasta(
    dir: &Utf8Path,
    organism: &OrganismName,
    tax_id: TaxonomyId,
    text: &str,
) -> Result<PersistOutcome, FetchError> {
    let target = fasta_path(dir, organism, tax_id);
    if target.as_std_path().exists() {
        warn!("File {target} already exists, skipping write.");
        return Ok(PersistOutcome::Conflict(target));
    }
    write_no_clobber(dir, &target, text.as_bytes())
}

/// Temp file in `dir`, then a persist that refuses to replace `target`.
pub fn write_no_clobber(
    dir: &Utf8Path,
    target: &Utf8Path,
    content: &[u8],
) -> Result<PersistOutcome, FetchError> {
    let mut temp = tempfile::Builder::new()
        .prefix(".taxid2prot")
        .suffix(".tmp")
        .tempfile_in(dir.as_std_path())
        .map_err(|err| FetchError::Filesystem(format!("temp file in {dir}: {err}")))?;
    temp.write_all(content)
        .map_err(|err| FetchError::Filesystem(err.to_string()))?;
    temp.flush()
        .map_err(|err| FetchError::Filesystem(err.to_string()))?;

    match temp.persist_noclobber(target.as_std_path()) {
        Ok(_) => Ok(PersistOutcome::Written(target.to_path_buf())),
        Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
            warn!("File {target} already exists, skipping write.");
            Ok(PersistOutcome::Conflict(target.to_path_buf()))
        }
        Err(err) => Err(FetchError::Filesystem(format!(
            "persist {target}: {}",
            err.error
        ))),
    }
}

/// Replace `<dir>/manifest.json` with `value` through a temp file.
pub fn write_manifest<T: Serialize>(dir: &Utf8Path, value: &T) -> Result<Utf8PathBuf, FetchError> {
    let path = dir.join(MANIFEST_FILE);
    let tmp_path = path.with_extension("json.tmp");
    let content =
        serde_json::to_vec_pretty(value).map_err(|err| FetchError::Filesystem(err.to_string()))?;
    fs::write(tmp_path.as_std_path(), &content)
        .map_err(|err| FetchError::Filesystem(err.to_string()))?;
    fs::rename(tmp_path.as_std_path(), path.as_std_path())
        .map_err(|err| FetchError::Filesystem(err.to_string()))?;
    Ok(path)
}

/// Rename every `sequence*.fasta` in `dir` after the organism on its first line.
///
/// When `<organism>.fasta` is taken and `tax_ids` knows the file, the
/// `<organism>_<tax_id>.fasta` name is tried next. Nothing is overwritten.
pub fn rename_downloads(
    dir: &Utf8Path,
    tax_ids: &HashMap<Utf8PathBuf, TaxonomyId>,
) -> Result<Vec<RenameOutcome>, FetchError> {
    let mut outcomes = Vec::new();
    for path in export_files(dir)? {
        let first_line = read_first_line(&path)?;
        let Some(organism) = first_line_organism(&first_line) else {
            warn!("Cannot find an organism name in {path}, leaving it as is.");
            outcomes.push(RenameOutcome::NoName(path));
            continue;
        };
        let mut target = dir.join(format!("{organism}.{FASTA_EXT}"));
        if target.as_std_path().exists()
            && let Some(tax_id) = tax_ids.get(&path)
        {
            target = fasta_path(dir, &organism, *tax_id);
        }
        if target.as_std_path().exists() {
            warn!("Cannot rename {path}: {target} already exists.");
            outcomes.push(RenameOutcome::Conflict { from: path, to: target });
            continue;
        }
        fs::rename(path.as_std_path(), target.as_std_path())
            .map_err(|err| FetchError::Filesystem(format!("rename {path}: {err}")))?;
        info!("Renamed {path} to {target}.");
        outcomes.push(RenameOutcome::Renamed {
            from: path,
            to: target,
            organism,
        });
    }
    Ok(outcomes)
}

fn export_files(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, FetchError> {
    let entries = dir
        .read_dir_utf8()
        .map_err(|err| FetchError::Filesystem(format!("read {dir}: {err}")))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| FetchError::Filesystem(err.to_string()))?;
        let name = entry.file_name();
        let is_export = name.starts_with(EXPORT_PREFIX) && entry.path().extension() == Some(FASTA_EXT);
        if is_export && entry.path().as_std_path().is_file() {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

fn read_first_line(path: &Utf8Path) -> Result<String, FetchError> {
    let file = fs::File::open(path.as_std_path())
        .map_err(|err| FetchError::Filesystem(format!("open {path}: {err}")))?;
    let mut line = String::new();
    BufReader::new(file)
        .read_line(&mut line)
        .map_err(|err| FetchError::Filesystem(format!("read {path}: {err}")))?;
    Ok(line)
}
