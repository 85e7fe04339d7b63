//! Decode configuration surface
//!
//! Recognized options for the decode pipeline, with the same keys and
//! defaults the original task exposed. Inconsistencies are rejected by
//! `validate()` before any batch is processed; the UNK-mapping file is
//! parsed eagerly for the same reason.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ApuntarError, Result};

/// Configuration for the decode post-processing pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Character joining tokens in output lines
    pub delimiter: String,
    /// Replace UNK tokens from the source via attention
    pub unk_replace: bool,
    /// Optional source→target mapping table for UNK replacement
    pub unk_mapping: Option<PathBuf>,
    /// Destination for decoded text; `None` prints to stdout
    pub save_pred_path: Option<PathBuf>,
    /// Dump attention records alongside the text output
    pub dump_attn_scores: bool,
    /// Directory for the attention dump (required when dumping)
    pub attn_dir: String,
    /// File name for the attention dump (required when dumping)
    pub attn_name: String,
    /// Identifier of a registered text post-processing transform; empty = none
    pub postproc_fn: String,
    /// Flush the output buffer every this many examples
    pub flush_every: usize,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            delimiter: " ".to_string(),
            unk_replace: false,
            unk_mapping: None,
            save_pred_path: None,
            dump_attn_scores: false,
            attn_dir: String::new(),
            attn_name: String::new(),
            postproc_fn: String::new(),
            flush_every: 100,
        }
    }
}

impl DecodeConfig {
    /// Create a configuration with all defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the token join delimiter
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Enable attention-guided UNK replacement
    #[must_use]
    pub fn with_unk_replace(mut self, enabled: bool) -> Self {
        self.unk_replace = enabled;
        self
    }

    /// Set the UNK source→target mapping file
    #[must_use]
    pub fn with_unk_mapping(mut self, path: impl Into<PathBuf>) -> Self {
        self.unk_mapping = Some(path.into());
        self
    }

    /// Set the decoded-text destination
    #[must_use]
    pub fn with_save_pred_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.save_pred_path = Some(path.into());
        self
    }

    /// Enable the attention dump into `dir/name`
    #[must_use]
    pub fn with_attn_dump(mut self, dir: impl Into<String>, name: impl Into<String>) -> Self {
        self.dump_attn_scores = true;
        self.attn_dir = dir.into();
        self.attn_name = name.into();
        self
    }

    /// Select a registered post-processing transform
    #[must_use]
    pub fn with_postproc_fn(mut self, name: impl Into<String>) -> Self {
        self.postproc_fn = name.into();
        self
    }

    /// Set the flush threshold
    #[must_use]
    pub fn with_flush_every(mut self, n: usize) -> Self {
        self.flush_every = n;
        self
    }

    /// Reject inconsistent configurations before any batch is processed
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the attention dump is enabled
    /// without a directory and file name, or the flush threshold is 0.
    pub fn validate(&self) -> Result<()> {
        if self.dump_attn_scores && (self.attn_dir.is_empty() || self.attn_name.is_empty()) {
            return Err(ApuntarError::InvalidConfiguration {
                reason: "dump_attn_scores requires attn_dir and attn_name".to_string(),
            });
        }
        if self.flush_every == 0 {
            return Err(ApuntarError::InvalidConfiguration {
                reason: "flush_every must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Full path of the attention dump file, when dumping is enabled
    #[must_use]
    pub fn attn_path(&self) -> Option<PathBuf> {
        if self.dump_attn_scores {
            Some(PathBuf::from(&self.attn_dir).join(&self.attn_name))
        } else {
            None
        }
    }
}

/// Load a source→target UNK mapping table
///
/// The file holds one `source_token \t target_token` pair per line;
/// both fields are trimmed. A line without a tab is rejected rather
/// than skipped, since a silently dropped mapping mis-replaces tokens
/// for the whole run.
///
/// # Errors
///
/// `IoError` if the file can't be read, `InvalidConfiguration` on a
/// malformed line.
pub fn load_unk_mapping(path: &Path) -> Result<HashMap<String, String>> {
    let content = fs::read_to_string(path).map_err(|e| ApuntarError::IoError {
        message: format!("Failed to read UNK mapping {}: {e}", path.display()),
    })?;

    let mut mapping = HashMap::new();
    for (lineno, line) in content.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        let mut fields = line.splitn(3, '\t');
        let source = fields.next().unwrap_or("");
        let target = fields.next().ok_or_else(|| ApuntarError::InvalidConfiguration {
            reason: format!(
                "UNK mapping {}:{}: expected 'source\\ttarget'",
                path.display(),
                lineno + 1
            ),
        })?;
        mapping.insert(source.trim().to_string(), target.trim().to_string());
    }
    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_matches_original_params() {
        let config = DecodeConfig::default();
        assert_eq!(config.delimiter, " ");
        assert!(!config.unk_replace);
        assert!(config.unk_mapping.is_none());
        assert!(config.save_pred_path.is_none());
        assert!(!config.dump_attn_scores);
        assert_eq!(config.attn_dir, "");
        assert_eq!(config.attn_name, "");
        assert_eq!(config.postproc_fn, "");
        assert_eq!(config.flush_every, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let config = DecodeConfig::new()
            .with_delimiter("")
            .with_unk_replace(true)
            .with_flush_every(10)
            .with_attn_dump("/tmp/attn", "scores.bin");
        assert!(config.dump_attn_scores);
        assert_eq!(
            config.attn_path().unwrap(),
            PathBuf::from("/tmp/attn/scores.bin")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_dump_without_destination() {
        let mut config = DecodeConfig::new();
        config.dump_attn_scores = true;
        assert!(config.validate().is_err());

        config.attn_dir = "somewhere".to_string();
        assert!(config.validate().is_err());

        config.attn_name = "scores.bin".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_flush() {
        let config = DecodeConfig::new().with_flush_every(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_attn_path_none_when_disabled() {
        assert!(DecodeConfig::new().attn_path().is_none());
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: DecodeConfig =
            serde_json::from_str(r#"{"unk_replace": true, "delimiter": ""}"#).unwrap();
        assert!(config.unk_replace);
        assert_eq!(config.delimiter, "");
        assert_eq!(config.flush_every, 100);
    }

    #[test]
    fn test_load_unk_mapping() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "北京\tBeijing").unwrap();
        writeln!(file, " 首都 \tcapital").unwrap();
        let mapping = load_unk_mapping(file.path()).unwrap();
        assert_eq!(mapping["北京"], "Beijing");
        assert_eq!(mapping["首都"], "capital");
    }

    #[test]
    fn test_load_unk_mapping_rejects_line_without_tab() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "北京 Beijing").unwrap();
        let result = load_unk_mapping(file.path());
        assert!(matches!(
            result,
            Err(ApuntarError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_load_unk_mapping_missing_file() {
        let result = load_unk_mapping(Path::new("/nonexistent/mapping.tsv"));
        assert!(matches!(result, Err(ApuntarError::IoError { .. })));
    }
}
