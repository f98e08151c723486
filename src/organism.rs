use std::sync::LazyLock;

use regex::Regex;

use crate::domain::OrganismName;

static OS_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"OS=([A-Za-z]+\s[A-Za-z]+)").expect("valid OS= pattern"));
static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([A-Za-z0-9_\s]+)\]").expect("valid bracket pattern"));

/// Scientific name from a FASTA payload, or `no_name` when nothing matches.
///
/// UniProt headers carry `OS=Genus species`, NCBI headers end in
/// `[Genus species]`; the `OS=` key is tried first.
pub fn extract_organism_name(text: &str) -> OrganismName {
    find_name(text).unwrap_or_else(OrganismName::fallback)
}

/// Same rules restricted to the first line, `None` on a miss.
pub fn first_line_organism(text: &str) -> Option<OrganismName> {
    find_name(text.lines().next().unwrap_or(""))
}

fn find_name(text: &str) -> Option<OrganismName> {
    [&*OS_KEY, &*BRACKETED]
        .into_iter()
        .filter_map(|pattern| pattern.captures(text))
        .filter_map(|caps| caps.get(1))
        .find_map(|found| OrganismName::normalize(found.as_str()))
}
