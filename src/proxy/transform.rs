//! Match and replace stages applied to every relayed chunk.
//!
//! Both stages are compiled once at startup and shared by every connection:
//!
//! - **Match** scans a chunk read-only and reports each non-overlapping
//!   occurrence with a process-wide match id.
//! - **Replace** rewrites a chunk, substituting each non-overlapping occurrence
//!   of its pattern with literal replacement text.
//!
//! Stages operate per chunk. An occurrence that straddles two reads is not
//! seen by either stage.
//!
//! # Replace syntax
//!
//! The replace spec has the form `pattern~replacement`. There is no escape
//! for `~`, so a spec that does not split into exactly two parts is rejected.
//!
//! ```ignore
//! use tcp_proxy::proxy::transform::Pipeline;
//!
//! let pipeline = Pipeline::from_specs(Some("GET .*"), Some("foo~bar"));
//! let matches = pipeline.scan(b"GET /foo\r\n");
//! let forwarded = pipeline.rewrite(b"GET /foo\r\n");
//! ```

use super::sequence::Sequence;
use regex::bytes::{NoExpand, Regex, RegexBuilder};
use std::borrow::Cow;
use thiserror::Error;
use tracing::{info, warn};

/// Separator between pattern and replacement in a replace spec.
pub const REPLACE_SEPARATOR: char = '~';

/// Errors from compiling a match or replace spec.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The pattern is not a valid regular expression.
    #[error("Invalid {stage} regex: {source}")]
    InvalidRegex {
        /// Which stage the pattern belongs to ("match" or "replace").
        stage: &'static str,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// The replace spec is not of the form `pattern~replacement`.
    #[error("Invalid replace option '{0}': expected 'regex~replacement'")]
    MalformedReplace(String),
}

/// One occurrence found by the match stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Process-wide match id.
    pub id: u64,
    /// The matched bytes.
    pub bytes: Vec<u8>,
}

impl Match {
    /// Matched bytes rendered as text for logging.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

fn compile(pattern: &str, stage: &'static str) -> Result<Regex, TransformError> {
    // CRLF mode keeps `.` from swallowing the `\r` of line-oriented protocols.
    RegexBuilder::new(pattern)
        .crlf(true)
        .build()
        .map_err(|source| TransformError::InvalidRegex { stage, source })
}

/// Read-only inspection stage.
#[derive(Debug, Clone, Default)]
pub enum MatchStage {
    /// No pattern configured.
    #[default]
    Disabled,
    /// Compiled match pattern.
    Compiled(Regex),
}

impl MatchStage {
    /// Compile a match pattern.
    pub fn compile(pattern: &str) -> Result<Self, TransformError> {
        Ok(Self::Compiled(compile(pattern, "match")?))
    }

    /// Whether a pattern is configured.
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Compiled(_))
    }

    /// Find every non-overlapping occurrence in `chunk`, numbering each from `ids`.
    pub fn scan(&self, chunk: &[u8], ids: &Sequence) -> Vec<Match> {
        match self {
            Self::Disabled => Vec::new(),
            Self::Compiled(re) => re
                .find_iter(chunk)
                .map(|m| Match {
                    id: ids.next_id(),
                    bytes: m.as_bytes().to_vec(),
                })
                .collect(),
        }
    }
}

/// Rewriting stage.
#[derive(Debug, Clone, Default)]
pub enum ReplaceStage {
    /// No replacement configured.
    #[default]
    Disabled,
    /// Compiled pattern with its literal replacement.
    Compiled {
        /// Pattern to search for.
        pattern: Regex,
        /// Literal bytes substituted for each occurrence.
        replacement: Vec<u8>,
    },
}

impl ReplaceStage {
    /// Compile a `pattern~replacement` spec.
    pub fn compile(spec: &str) -> Result<Self, TransformError> {
        let parts: Vec<&str> = spec.split(REPLACE_SEPARATOR).collect();
        let [pattern, replacement] = parts.as_slice() else {
            return Err(TransformError::MalformedReplace(spec.to_string()));
        };

        Ok(Self::Compiled {
            pattern: compile(pattern, "replace")?,
            replacement: replacement.as_bytes().to_vec(),
        })
    }

    /// Whether a replacement is configured.
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Compiled { .. })
    }

    /// Rewrite `chunk`. Borrows the input unchanged when nothing matched.
    pub fn apply<'a>(&self, chunk: &'a [u8]) -> Cow<'a, [u8]> {
        match self {
            Self::Disabled => Cow::Borrowed(chunk),
            Self::Compiled {
                pattern,
                replacement,
            } => pattern.replace_all(chunk, NoExpand(replacement.as_slice())),
        }
    }
}

/// The match and replace stages shared by every pipe in the process.
#[derive(Debug, Default)]
pub struct Pipeline {
    matcher: MatchStage,
    replacer: ReplaceStage,
    match_ids: Sequence,
}

impl Pipeline {
    /// Build a pipeline from already compiled stages.
    pub fn new(matcher: MatchStage, replacer: ReplaceStage) -> Self {
        Self {
            matcher,
            replacer,
            match_ids: Sequence::new(),
        }
    }

    /// A pipeline that forwards bytes untouched and reports no matches.
    pub fn passthrough() -> Self {
        Self::default()
    }

    /// Compile user supplied specs.
    ///
    /// Absent or empty specs disable the stage. A spec that fails to compile
    /// is logged as a warning and disables its stage; it never aborts startup.
    pub fn from_specs(match_spec: Option<&str>, replace_spec: Option<&str>) -> Self {
        let matcher = match match_spec.filter(|s| !s.is_empty()) {
            None => MatchStage::Disabled,
            Some(spec) => match MatchStage::compile(spec) {
                Ok(stage) => {
                    info!("Matching {}", spec);
                    stage
                }
                Err(e) => {
                    warn!("{}", e);
                    MatchStage::Disabled
                }
            },
        };

        let replacer = match replace_spec.filter(|s| !s.is_empty()) {
            None => ReplaceStage::Disabled,
            Some(spec) => match ReplaceStage::compile(spec) {
                Ok(stage) => {
                    if let ReplaceStage::Compiled {
                        pattern,
                        replacement,
                    } = &stage
                    {
                        info!(
                            "Replacing {} with {}",
                            pattern,
                            String::from_utf8_lossy(replacement)
                        );
                    }
                    stage
                }
                Err(e) => {
                    warn!("{}", e);
                    ReplaceStage::Disabled
                }
            },
        };

        Self::new(matcher, replacer)
    }

    /// Run the match stage over a chunk.
    pub fn scan(&self, chunk: &[u8]) -> Vec<Match> {
        self.matcher.scan(chunk, &self.match_ids)
    }

    /// Run the replace stage over a chunk.
    pub fn rewrite<'a>(&self, chunk: &'a [u8]) -> Cow<'a, [u8]> {
        self.replacer.apply(chunk)
    }

    /// The match stage.
    pub fn matcher(&self) -> &MatchStage {
        &self.matcher
    }

    /// The replace stage.
    pub fn replacer(&self) -> &ReplaceStage {
        &self.replacer
    }

    /// Number of match ids handed out so far.
    pub fn matches_reported(&self) -> u64 {
        self.match_ids.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_http_request_line() {
        let pipeline = Pipeline::from_specs(Some("GET .*"), None);

        let matches = pipeline.scan(b"GET /\r\n");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, 1);
        assert_eq!(matches[0].text(), "GET /");
    }

    #[test]
    fn test_match_counts_non_overlapping() {
        let pipeline = Pipeline::from_specs(Some("aa"), None);

        // "aaaaa" holds two non-overlapping "aa"
        let matches = pipeline.scan(b"aaaaa");
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, 1);
        assert_eq!(matches[1].id, 2);
    }

    #[test]
    fn test_match_ids_increase_across_chunks() {
        let pipeline = Pipeline::from_specs(Some("x"), None);

        let first = pipeline.scan(b"x-x");
        let second = pipeline.scan(b"none here");
        let third = pipeline.scan(b"x");

        assert_eq!(first.iter().map(|m| m.id).collect::<Vec<_>>(), vec![1, 2]);
        assert!(second.is_empty());
        assert_eq!(third[0].id, 3);
        assert_eq!(pipeline.matches_reported(), 3);
    }

    #[test]
    fn test_match_does_not_alter_bytes() {
        let pipeline = Pipeline::from_specs(Some("secret"), None);
        let chunk = b"my secret";

        let _ = pipeline.scan(chunk);
        assert!(matches!(pipeline.rewrite(chunk), Cow::Borrowed(b) if b == chunk));
    }

    #[test]
    fn test_match_misses_split_occurrence() {
        let pipeline = Pipeline::from_specs(Some("hello"), None);

        assert!(pipeline.scan(b"hel").is_empty());
        assert!(pipeline.scan(b"lo").is_empty());
        assert_eq!(pipeline.matches_reported(), 0);
    }

    #[test]
    fn test_match_binary_chunk() {
        let pipeline = Pipeline::from_specs(Some(r"(?-u)\xff\x00"), None);

        let matches = pipeline.scan(&[0x01, 0xff, 0x00, 0x02]);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].bytes, vec![0xff, 0x00]);
    }

    #[test]
    fn test_replace_all_occurrences() {
        let pipeline = Pipeline::from_specs(None, Some("foo~bar"));

        assert_eq!(pipeline.rewrite(b"foofoobaz").as_ref(), b"barbarbaz");
    }

    #[test]
    fn test_replace_changes_length() {
        let pipeline = Pipeline::from_specs(None, Some("a~xyz"));

        let out = pipeline.rewrite(b"banana");
        assert_eq!(out.as_ref(), b"bxyznxyznxyz");
        assert_eq!(out.len(), 12);
    }

    #[test]
    fn test_replace_is_literal() {
        let pipeline = Pipeline::from_specs(None, Some("(h)ello~$1i"));

        assert_eq!(pipeline.rewrite(b"hello").as_ref(), b"$1i");
    }

    #[test]
    fn test_replace_with_empty_replacement() {
        let pipeline = Pipeline::from_specs(None, Some("-~"));

        assert_eq!(pipeline.rewrite(b"a-b-c").as_ref(), b"abc");
    }

    #[test]
    fn test_replace_untouched_chunk_is_borrowed() {
        let pipeline = Pipeline::from_specs(None, Some("foo~bar"));

        assert!(matches!(pipeline.rewrite(b"nothing"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_replace_spec_without_separator() {
        let err = ReplaceStage::compile("foobar").unwrap_err();
        assert!(matches!(err, TransformError::MalformedReplace(_)));
    }

    #[test]
    fn test_replace_spec_with_extra_separator() {
        let err = ReplaceStage::compile("a~b~c").unwrap_err();
        assert!(matches!(err, TransformError::MalformedReplace(_)));
    }

    #[test]
    fn test_replace_spec_bad_regex() {
        let err = ReplaceStage::compile("(unterminated~x").unwrap_err();
        assert!(matches!(
            err,
            TransformError::InvalidRegex {
                stage: "replace",
                ..
            }
        ));
    }

    #[test]
    fn test_malformed_specs_disable_stages() {
        let pipeline = Pipeline::from_specs(Some("(oops"), Some("(unterminated~x"));

        assert!(!pipeline.matcher().is_enabled());
        assert!(!pipeline.replacer().is_enabled());
        assert!(pipeline.scan(b"(oops").is_empty());
        assert_eq!(pipeline.rewrite(b"(unterminated").as_ref(), b"(unterminated");
    }

    #[test]
    fn test_empty_specs_disable_stages() {
        let pipeline = Pipeline::from_specs(Some(""), Some(""));

        assert!(!pipeline.matcher().is_enabled());
        assert!(!pipeline.replacer().is_enabled());
    }

    #[test]
    fn test_passthrough() {
        let pipeline = Pipeline::passthrough();

        assert!(pipeline.scan(b"anything").is_empty());
        assert_eq!(pipeline.rewrite(b"anything").as_ref(), b"anything");
    }

    #[test]
    fn test_transform_error_display() {
        let err = TransformError::MalformedReplace("a~b~c".to_string());
        assert!(err.to_string().contains("a~b~c"));
    }
}
