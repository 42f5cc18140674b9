//! Parses chunk file names:
//! `base@k.ext` for an ordinary chunk, `base@@k.ext` (double at-sign) for
//! the final one, or a bare `base.ext` for an unchunked table.

use loader_types::Compression;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedChunkName {
    pub index: Option<u64>,
    pub is_last: bool,
}

/// Returns `None` if `name` doesn't belong to `basename` at all.
pub fn parse_chunk_name(name: &str, basename: &str) -> Option<(ParsedChunkName, Compression)> {
    let rest = name.strip_prefix(basename)?;
    let compression = Compression::from_filename(name);

    if let Some(tail) = rest.strip_prefix("@@") {
        let index = leading_digits(tail)?;
        return Some((ParsedChunkName { index: Some(index), is_last: true }, compression));
    }
    if let Some(tail) = rest.strip_prefix('@') {
        let index = leading_digits(tail)?;
        return Some((ParsedChunkName { index: Some(index), is_last: false }, compression));
    }
    if rest.is_empty() || rest.starts_with('.') {
        return Some((ParsedChunkName { index: None, is_last: true }, compression));
    }
    None
}

fn leading_digits(s: &str) -> Option<u64> {
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

pub fn idx_sidecar_name(chunk_filename: &str) -> String {
    format!("{chunk_filename}.idx")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ordinary_chunk() {
        let (parsed, _) = parse_chunk_name("orders@3.tsv.zst", "orders").unwrap();
        assert_eq!(parsed.index, Some(3));
        assert!(!parsed.is_last);
    }

    #[test]
    fn parses_last_chunk_marker() {
        let (parsed, _) = parse_chunk_name("orders@@7.tsv", "orders").unwrap();
        assert_eq!(parsed.index, Some(7));
        assert!(parsed.is_last);
    }

    #[test]
    fn parses_unchunked_table() {
        let (parsed, compression) = parse_chunk_name("orders.tsv.gz", "orders").unwrap();
        assert_eq!(parsed.index, None);
        assert!(parsed.is_last);
        assert_eq!(compression, Compression::Gzip);
    }

    #[test]
    fn rejects_names_for_a_different_table() {
        assert!(parse_chunk_name("customers@0.tsv", "orders").is_none());
        assert!(parse_chunk_name("orders_history@0.tsv", "orders").is_none());
    }

    #[test]
    fn idx_sidecar_appends_suffix() {
        assert_eq!(idx_sidecar_name("orders@0.tsv.zst"), "orders@0.tsv.zst.idx");
    }
}
