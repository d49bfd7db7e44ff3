//! Label table loading (§3, §4.1): `obj.names` or `labels.txt`, one label per
//! line, capped at 256 entries of at most 64 bytes each.

use std::fs::read_to_string;
use std::path::Path;

pub const MAX_LABELS: usize = 256;
pub const MAX_LABEL_LEN: usize = 64;
const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    names: Vec<String>,
}

impl LabelTable {
    pub fn empty() -> Self {
        Self { names: Vec::new() }
    }

    /// Reads the first existing of `obj.names` / `labels.txt` under `dir`.
    /// Absence of either file is not an error: an empty table is returned.
    pub fn load(dir: &Path) -> Self {
        for candidate in ["obj.names", "labels.txt"] {
            let path = dir.join(candidate);
            if path.is_file() {
                match read_to_string(&path) {
                    Ok(text) => return Self::parse(&text),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "failed reading label file");
                    }
                }
            }
        }
        Self::empty()
    }

    fn parse(text: &str) -> Self {
        let mut names = Vec::new();
        for line in text.lines() {
            if names.len() >= MAX_LABELS {
                break;
            }
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                continue;
            }
            let truncated: String = truncate_bytes(trimmed, MAX_LABEL_LEN - 1);
            names.push(truncated);
        }
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Renders a class id to its label, or the literal `"unknown"` when out
    /// of range (invariant 2, §8).
    pub fn name_of(&self, class_id: i32) -> &str {
        if class_id < 0 {
            return UNKNOWN;
        }
        self.names
            .get(class_id as usize)
            .map(String::as_str)
            .unwrap_or(UNKNOWN)
    }
}

/// Truncates a string to at most `max_bytes` bytes without splitting a UTF-8
/// code point.
fn truncate_bytes(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_lines_trims_crlf_and_skips_blanks() {
        let table = LabelTable::parse("person\r\ncar\n\nbicycle\r\n");
        assert_eq!(table.len(), 3);
        assert_eq!(table.name_of(0), "person");
        assert_eq!(table.name_of(1), "car");
        assert_eq!(table.name_of(2), "bicycle");
    }

    #[test]
    fn out_of_range_class_id_renders_unknown() {
        let table = LabelTable::parse("person\n");
        assert_eq!(table.name_of(5), "unknown");
        assert_eq!(table.name_of(-1), "unknown");
    }

    #[test]
    fn caps_at_256_entries() {
        let text = (0..300).map(|i| format!("c{i}\n")).collect::<String>();
        let table = LabelTable::parse(&text);
        assert_eq!(table.len(), MAX_LABELS);
    }

    #[test]
    fn truncates_long_lines() {
        let long = "x".repeat(200);
        let table = LabelTable::parse(&format!("{long}\n"));
        assert!(table.name_of(0).len() < MAX_LABEL_LEN);
    }

    #[test]
    fn load_prefers_obj_names_over_labels_txt() {
        let dir = tempdir();
        std::fs::write(dir.join("obj.names"), "a\nb\n").unwrap();
        std::fs::write(dir.join("labels.txt"), "z\n").unwrap();
        let table = LabelTable::load(&dir);
        assert_eq!(table.name_of(0), "a");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn load_missing_directory_yields_empty_table() {
        let table = LabelTable::load(Path::new("/nonexistent/cira-labels-test"));
        assert!(table.is_empty());
    }

    fn tempdir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("cira-labels-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let _ = std::io::stdout().flush();
        dir
    }
}
