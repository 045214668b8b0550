//! Column cleaning transforms for the consolidated file.
//!
//! The text column is normalized to lowercase `[a-z0-9 ]`; the source
//! column is reduced from its HTML tag wrapper to the inner label; the last
//! column loses any embedded newline picked up from the landing object's
//! trailing line terminator.

use anyhow::{Context, Result};
use firehose_model::COLUMN_COUNT;
use regex::Regex;
use std::path::Path;
use tracing::{info, instrument};

/// Compiled cleaning patterns.
pub struct TextCleaner {
    links: Regex,
    marks: Regex,
    non_ascii: Regex,
    charset: Regex,
    source_tag: Regex,
}

impl TextCleaner {
    pub fn new() -> Result<Self> {
        Ok(Self {
            // http(s) links, bare domains ending .com/.in, www. prefixes
            links: Regex::new(r"(?i)https?://\S+|www\.\S+|\S+\.com\b|\S+\.in\b")
                .context("invalid link pattern")?,
            marks: Regex::new(r"[@#_]").context("invalid marks pattern")?,
            non_ascii: Regex::new(r"[^\x00-\x7F]+").context("invalid non-ascii pattern")?,
            charset: Regex::new(r"[^A-Za-z0-9 ]").context("invalid charset pattern")?,
            source_tag: Regex::new(r"<[^>]+>([\w\s]+)<[^>]+>").context("invalid tag pattern")?,
        })
    }

    /// Normalize a text field: lowercase, then strip links, marks,
    /// non-ASCII bytes, and anything left outside `[a-z0-9 ]`.
    ///
    /// Idempotent on already-clean text: a clean string contains nothing
    /// any of the patterns match.
    pub fn clean_text(&self, text: &str) -> String {
        let lowered = text.to_lowercase();
        let stripped = self.links.replace_all(&lowered, "");
        let stripped = self.marks.replace_all(&stripped, "");
        let stripped = self.non_ascii.replace_all(&stripped, "");
        self.charset.replace_all(&stripped, "").into_owned()
    }

    /// Extract the inner label from a single HTML-tag wrapper, or empty
    /// when the markup does not match.
    pub fn clean_source(&self, source: &str) -> String {
        self.source_tag
            .captures(source)
            .and_then(|captures| captures.get(1))
            .map(|inner| inner.as_str().to_string())
            .unwrap_or_default()
    }

    /// Strip embedded newline characters.
    pub fn strip_newlines(&self, value: &str) -> String {
        value.replace(['\n', '\r'], "")
    }
}

/// Rewrite the consolidated file in place with cleaned columns.
///
/// The file stays headerless; only the text column (2), the source column
/// (3), and the last column change. Returns the number of rows rewritten.
#[instrument(skip(cleaner))]
pub fn clean_file(path: &Path, cleaner: &TextCleaner) -> Result<usize> {
    let mut rows: Vec<Vec<String>> = Vec::new();

    {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .context("Failed to open consolidated file")?;

        for record in reader.records() {
            let record = record.context("Failed to read consolidated row")?;
            let mut fields: Vec<String> = record.iter().map(str::to_string).collect();

            if let Some(text) = fields.get_mut(2) {
                *text = cleaner.clean_text(text);
            }
            if let Some(source) = fields.get_mut(3) {
                *source = cleaner.clean_source(source);
            }
            if let Some(last) = fields.last_mut() {
                *last = cleaner.strip_newlines(last);
            }

            rows.push(fields);
        }
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .context("Failed to rewrite consolidated file")?;

    for row in &rows {
        writer.write_record(row).context("Failed to write cleaned row")?;
    }
    writer.flush().context("Failed to flush consolidated file")?;

    info!(rows = rows.len(), columns = COLUMN_COUNT, "Cleaned consolidated file");
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn cleaner() -> TextCleaner {
        TextCleaner::new().unwrap()
    }

    #[test]
    fn test_clean_text_reference_case() {
        // Lowercased, URL and emoji stripped, punctuation removed.
        assert_eq!(
            cleaner().clean_text("Check http://x.com now! 😀"),
            "check  now "
        );
    }

    #[test]
    fn test_clean_text_strips_domains_and_marks() {
        let cleaner = cleaner();
        assert_eq!(cleaner.clean_text("see example.com for info"), "see  for info");
        assert_eq!(cleaner.clean_text("visit www.site.org today"), "visit  today");
        assert_eq!(cleaner.clean_text("@user #tag some_text"), "user tag sometext");
    }

    #[test]
    fn test_clean_text_is_idempotent() {
        let cleaner = cleaner();
        let once = cleaner.clean_text("Check http://x.com now! 😀");
        let twice = cleaner.clean_text(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_clean_source_extracts_inner_label() {
        assert_eq!(
            cleaner().clean_source(r#"<a href="x">Twitter Web App</a>"#),
            "Twitter Web App"
        );
    }

    #[test]
    fn test_clean_source_without_markup_is_empty() {
        assert_eq!(cleaner().clean_source("not markup"), "");
    }

    #[test]
    fn test_strip_newlines() {
        assert_eq!(cleaner().strip_newlines("9\n"), "9");
        assert_eq!(cleaner().strip_newlines("9"), "9");
    }

    #[test]
    fn test_clean_file_rewrites_target_columns() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"123,2021-01-01,Check http://x.com now! 😀,"<a href=""x"">Twitter Web App</a>",77,someone,,10,20,1,2,300,2015-06-01,0,4,"9
""#
        )
        .unwrap();
        file.flush().unwrap();

        let rows = clean_file(file.path(), &cleaner()).unwrap();
        assert_eq!(rows, 1);

        let cleaned = std::fs::read_to_string(file.path()).unwrap();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(cleaned.as_bytes());
        let record = reader.records().next().unwrap().unwrap();

        assert_eq!(&record[2], "check  now ");
        assert_eq!(&record[3], "Twitter Web App");
        assert_eq!(&record[15], "9");
        // Untouched columns survive as-is.
        assert_eq!(&record[0], "123");
        assert_eq!(&record[12], "2015-06-01");
    }

    #[test]
    fn test_clean_file_empty_input() {
        let file = NamedTempFile::new().unwrap();
        let rows = clean_file(file.path(), &cleaner()).unwrap();
        assert_eq!(rows, 0);
        assert_eq!(std::fs::read_to_string(file.path()).unwrap(), "");
    }
}
