//! Batch input files.

use std::path::Path;

/// Extracts identifiers from the text of an input file.
///
/// Lines are trimmed; blank lines and lines starting with `#` are dropped.
/// Order is preserved and duplicates are kept (the ledger skips them).
pub fn parse_links(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

/// Reads identifiers from the input file at `path`.
pub async fn read_links(path: &Path) -> std::io::Result<Vec<String>> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(parse_links(&text))
}
