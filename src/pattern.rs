//! [C1] ID pattern & reference configuration.
//!
//! Declarative description of requirement ID shape, assertion labels,
//! comment styles, and reference keywords. Produces the predicates and
//! regexes the parsers (`crate::parser`) and the test scanner compile
//! against. Configurations are constructed once per run and passed by
//! reference; nothing here is globally mutable (`spec.md` §9).

use std::path::Path;

use once_cell::sync::Lazy;
use regex::{escape as re_escape, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceError};

/// A bare, unprefixed requirement id token that can appear standalone in
/// source (not attached to any keyword), e.g. a test body mentioning
/// `REQ-p00001` in a comment without an `Implements:`/`Validates:` prefix.
static GENERIC_ID_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Z]+-[A-Za-z0-9-]+").unwrap());

/// A single requirement type code: a short letter, a display name, and the
/// level at which it sits in the requirement hierarchy (lower levels are
/// ancestors of higher ones, e.g. PRD=0, OPS=1, DEV=2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCode {
    pub code: String,
    pub name: String,
    pub level: u8,
}

/// The numeric portion of an ID: either fixed-width (zero-padded) or
/// variable-width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumericFormat {
    Fixed(usize),
    Variable,
}

/// Declares the prefix, type codes, and numeric format for requirement and
/// journey IDs in this repository. Immutable per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdPattern {
    pub prefix: String,
    pub types: Vec<TypeCode>,
    pub numeric: NumericFormat,
    /// Label alphabet for assertion suffixes, e.g. `A, B, ..., Z, A0, ...`.
    /// Matches any run of `[A-Z0-9]` per the original parser's permissive
    /// `ASSERTION_LINE_PATTERN`.
    #[serde(skip, default = "default_label_regex")]
    label_regex: OnceRegex,
    #[serde(skip, default = "default_id_regex_cell")]
    id_regex: OnceRegex,
}

// serde can't derive Regex; store it behind a lazily-built cell so IdPattern
// stays Clone/Debug without re-compiling the regex on every clone.
#[derive(Debug, Clone)]
struct OnceRegex(std::sync::Arc<once_cell::sync::OnceCell<Regex>>);

fn default_label_regex() -> OnceRegex {
    OnceRegex(std::sync::Arc::new(once_cell::sync::OnceCell::new()))
}
fn default_id_regex_cell() -> OnceRegex {
    OnceRegex(std::sync::Arc::new(once_cell::sync::OnceCell::new()))
}

pub const LABEL_PATTERN: &str = r"[A-Z0-9]+";

impl IdPattern {
    pub fn new(prefix: impl Into<String>, types: Vec<TypeCode>, numeric: NumericFormat) -> Self {
        IdPattern {
            prefix: prefix.into(),
            types,
            numeric,
            label_regex: default_label_regex(),
            id_regex: default_id_regex_cell(),
        }
    }

    /// A sensible default covering PRD/OPS/DEV levels, matching the
    /// `REQ-<type><number>` shape used throughout `spec.md`'s examples
    /// (e.g. `REQ-p00001`, `REQ-o00062`).
    pub fn default_requirements() -> Self {
        IdPattern::new(
            "REQ",
            vec![
                TypeCode {
                    code: "p".to_string(),
                    name: "Product".to_string(),
                    level: 0,
                },
                TypeCode {
                    code: "o".to_string(),
                    name: "Operational".to_string(),
                    level: 1,
                },
                TypeCode {
                    code: "d".to_string(),
                    name: "Development".to_string(),
                    level: 2,
                },
            ],
            NumericFormat::Fixed(5),
        )
    }

    fn numeric_pattern(&self) -> String {
        match self.numeric {
            NumericFormat::Fixed(width) => format!(r"\d{{{width}}}"),
            NumericFormat::Variable => r"\d+".to_string(),
        }
    }

    fn type_code_alternation(&self) -> String {
        let mut codes: Vec<&str> = self.types.iter().map(|t| t.code.as_str()).collect();
        codes.sort_by_key(|c| std::cmp::Reverse(c.len()));
        codes.join("|")
    }

    fn id_regex(&self) -> &Regex {
        self.id_regex.0.get_or_init(|| {
            let pattern = format!(
                r"^{prefix}-(?P<type>{types})(?P<num>{num})(?:-(?P<label>{label}))?$",
                prefix = re_escape(&self.prefix),
                types = self.type_code_alternation(),
                num = self.numeric_pattern(),
                label = LABEL_PATTERN,
            );
            RegexBuilder::new(&pattern)
                .build()
                .expect("id pattern must compile")
        })
    }

    fn label_regex(&self) -> &Regex {
        self.label_regex
            .0
            .get_or_init(|| Regex::new(&format!("^{LABEL_PATTERN}$")).unwrap())
    }

    /// Whether a string is a well-formed ID under the current pattern.
    pub fn is_valid(&self, id: &str) -> bool {
        self.id_regex().is_match(id)
    }

    /// Whether a bare label (no requirement prefix) is well-formed.
    pub fn is_valid_label(&self, label: &str) -> bool {
        self.label_regex().is_match(label)
    }

    /// Parse an ID into its type code, numeric part, and optional assertion
    /// label suffix.
    pub fn parse_id(&self, id: &str) -> Option<ParsedId> {
        let caps = self.id_regex().captures(id)?;
        Some(ParsedId {
            type_code: caps.name("type")?.as_str().to_string(),
            numeric_part: caps.name("num")?.as_str().to_string(),
            assertion_label: caps.name("label").map(|m| m.as_str().to_string()),
        })
    }

    /// The requirement ID with any assertion-label suffix stripped.
    pub fn requirement_id_of(&self, id: &str) -> Option<String> {
        let parsed = self.parse_id(id)?;
        Some(format!(
            "{}-{}{}",
            self.prefix, parsed.type_code, parsed.numeric_part
        ))
    }

    /// Build an assertion ID from a requirement ID and a label.
    pub fn assertion_id(&self, requirement_id: &str, label: &str) -> String {
        format!("{requirement_id}-{label}")
    }

    pub fn type_level(&self, type_code: &str) -> Option<u8> {
        self.types.iter().find(|t| t.code == type_code).map(|t| t.level)
    }

    /// Every substring of `text` that is a well-formed id under this
    /// pattern, in order of appearance, deduplicated. Used by the test
    /// scanner to pick up bare id mentions that carry no keyword at all
    /// (`spec.md` §3 "test reference mechanisms").
    pub fn find_valid_ids(&self, text: &str) -> Vec<String> {
        let mut seen = std::collections::BTreeSet::new();
        let mut out = Vec::new();
        for m in GENERIC_ID_TOKEN.find_iter(text) {
            let candidate = m.as_str();
            if self.is_valid(candidate) && seen.insert(candidate.to_string()) {
                out.push(candidate.to_string());
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedId {
    pub type_code: String,
    pub numeric_part: String,
    pub assertion_label: Option<String>,
}

/// A single-line or block comment style recognized in source/test files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommentStyle {
    Hash,
    SlashSlash,
    DashDash,
    SlashStar,
    HtmlComment,
}

impl CommentStyle {
    pub fn all() -> &'static [CommentStyle] {
        &[
            CommentStyle::Hash,
            CommentStyle::SlashSlash,
            CommentStyle::DashDash,
            CommentStyle::SlashStar,
            CommentStyle::HtmlComment,
        ]
    }

    /// The prefix token that opens a line comment (or block) in this style.
    pub fn prefix(&self) -> &'static str {
        match self {
            CommentStyle::Hash => "#",
            CommentStyle::SlashSlash => "//",
            CommentStyle::DashDash => "--",
            CommentStyle::SlashStar => "/*",
            CommentStyle::HtmlComment => "<!--",
        }
    }

    pub fn suffix(&self) -> Option<&'static str> {
        match self {
            CommentStyle::SlashStar => Some("*/"),
            CommentStyle::HtmlComment => Some("-->"),
            _ => None,
        }
    }

    /// Strip this style's comment markers from a line, returning the inner
    /// text if the line is a comment in this style.
    pub fn strip<'a>(&self, line: &'a str) -> Option<&'a str> {
        let trimmed = line.trim_start();
        let rest = trimmed.strip_prefix(self.prefix())?;
        match self.suffix() {
            Some(suffix) => Some(rest.strip_suffix(suffix).unwrap_or(rest).trim()),
            None => Some(rest.trim()),
        }
    }
}

/// The reference keywords recognized in code/test annotations. `validates`
/// may have a configurable synonym in addition to the literal `Validates`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceKeywords {
    pub implements: String,
    pub refines: String,
    pub addresses: String,
    pub validates: String,
    pub validates_synonym: Option<String>,
}

impl Default for ReferenceKeywords {
    fn default() -> Self {
        ReferenceKeywords {
            implements: "Implements".to_string(),
            refines: "Refines".to_string(),
            addresses: "Addresses".to_string(),
            validates: "Validates".to_string(),
            validates_synonym: None,
        }
    }
}

/// Comment styles, keywords, and block markers recognized in a source file.
/// Resolved per file via [`EngineConfig::resolve_reference_config`] since it
/// may vary by path (`spec.md` §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceConfig {
    pub comment_styles: Vec<CommentStyle>,
    pub keywords: ReferenceKeywords,
    pub block_header: String,
    /// Enable the legacy bare `IMPLEMENTS:` test-scanner keyword in addition
    /// to the configured `validates` keyword (`spec.md` §9, open question c).
    pub legacy_implements_enabled: bool,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        ReferenceConfig {
            comment_styles: CommentStyle::all().to_vec(),
            keywords: ReferenceKeywords::default(),
            block_header: "IMPLEMENTS REQUIREMENTS:".to_string(),
            legacy_implements_enabled: true,
        }
    }
}

impl ReferenceConfig {
    /// Build a case-insensitive, anchored regex matching
    /// `<keyword>: <id>[, <id>...]` for a single-line reference comment,
    /// using the given keyword (e.g. `Implements` or a validates synonym).
    pub fn build_implements_regex(&self, keyword: &str) -> Result<Regex> {
        let pattern = format!(r"(?i)\b{}\s*:\s*(?P<ids>[^\r\n]+)", re_escape(keyword));
        Ok(RegexBuilder::new(&pattern).build()?)
    }

    pub fn build_validates_regex(&self, keyword: &str) -> Result<Regex> {
        self.build_implements_regex(keyword)
    }

    /// Regex matching the block-form header line, comment-prefixed, e.g.
    /// `# IMPLEMENTS REQUIREMENTS:`.
    pub fn build_block_header_regex(&self) -> Result<Regex> {
        let prefixes: Vec<String> = self
            .comment_styles
            .iter()
            .map(|s| re_escape(s.prefix()))
            .collect();
        let pattern = format!(
            r"(?i)^\s*(?:{})\s*{}\s*$",
            prefixes.join("|"),
            re_escape(&self.block_header)
        );
        Ok(RegexBuilder::new(&pattern).build()?)
    }

    /// Regex matching a single block-body reference line, e.g.
    /// `#   REQ-p00001: description`.
    pub fn build_block_ref_regex(&self) -> Result<Regex> {
        let prefixes: Vec<String> = self
            .comment_styles
            .iter()
            .map(|s| re_escape(s.prefix()))
            .collect();
        let pattern = format!(
            r"^\s*(?:{})\s+(?P<id>[A-Za-z][\w-]*)\s*:\s*(?P<desc>.*)$",
            prefixes.join("|")
        );
        Ok(RegexBuilder::new(&pattern).build()?)
    }

    /// All keywords (implements-family and validates-family) this config
    /// recognizes, in priority order. Unknown keywords are never an error —
    /// they simply never match (contract in `spec.md` §4.1).
    pub fn all_implements_keywords(&self) -> Vec<&str> {
        vec![
            self.keywords.implements.as_str(),
            self.keywords.refines.as_str(),
            self.keywords.addresses.as_str(),
        ]
    }

    pub fn all_validates_keywords(&self) -> Vec<&str> {
        let mut keywords = vec![self.keywords.validates.as_str()];
        if let Some(synonym) = &self.keywords.validates_synonym {
            keywords.push(synonym.as_str());
        }
        if self.legacy_implements_enabled {
            keywords.push("IMPLEMENTS");
        }
        keywords
    }
}

/// Sentinel values meaning "no reference" in an Implements/Refines/Addresses
/// field, matching `original_source`'s `RequirementParser.DEFAULT_NO_REFERENCE_VALUES`.
pub fn default_no_reference_values() -> Vec<String> {
    ["-", "null", "none", "x", "X", "N/A", "n/a"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Sentinel prefixes marking a placeholder/removed assertion, matching
/// `original_source`'s `RequirementParser.DEFAULT_PLACEHOLDER_VALUES`.
pub fn default_placeholder_values() -> Vec<String> {
    ["obsolete", "removed", "deprecated", "n/a", "-", "reserved"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Whether `hash` mode hashes the full requirement body, or only the
/// concatenation of normalized assertion text (`spec.md` I6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum HashMode {
    #[default]
    FullText,
    NormalizedText,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether placeholder assertions count toward coverage totals. Default
    /// excludes them (`spec.md` §9 "Placeholder assertions").
    pub count_placeholders: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            count_placeholders: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestScannerConfig {
    pub test_dirs: Vec<String>,
    pub globs: Vec<String>,
}

impl Default for TestScannerConfig {
    fn default() -> Self {
        TestScannerConfig {
            test_dirs: vec!["tests".to_string(), "test".to_string()],
            globs: vec!["*.py".to_string(), "*.rs".to_string(), "*_test.*".to_string()],
        }
    }
}

/// A single path-prefix override of the default reference config, for
/// repositories where some subtree uses different comment conventions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceOverride {
    pub path_prefix: String,
    pub config: ReferenceConfig,
}

/// Top-level engine configuration: constructed once at startup and passed
/// by reference everywhere (`spec.md` §9 "Dynamic configuration"). No part
/// of this is ever mutated for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub id_pattern: IdPattern,
    pub reference: ReferenceConfig,
    pub reference_overrides: Vec<ReferenceOverride>,
    pub hash_mode: HashMode,
    pub metrics: MetricsConfig,
    pub no_reference_values: Vec<String>,
    pub placeholder_values: Vec<String>,
    pub test_scanner: TestScannerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            id_pattern: IdPattern::default_requirements(),
            reference: ReferenceConfig::default(),
            reference_overrides: Vec::new(),
            hash_mode: HashMode::default(),
            metrics: MetricsConfig::default(),
            no_reference_values: default_no_reference_values(),
            placeholder_values: default_placeholder_values(),
            test_scanner: TestScannerConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Resolve the reference configuration for a given source file. The
    /// first override whose `path_prefix` matches wins; otherwise the
    /// top-level default is returned.
    pub fn resolve_reference_config(&self, file_path: &Path) -> ReferenceConfig {
        let file_str = file_path.to_string_lossy();
        for candidate in &self.reference_overrides {
            if file_str.starts_with(candidate.path_prefix.as_str()) {
                return candidate.config.clone();
            }
        }
        self.reference.clone()
    }

    /// Whether `value` is one of the configured "no reference" sentinels,
    /// matched case-sensitively per the original parser.
    pub fn is_no_reference_value(&self, value: &str) -> bool {
        self.no_reference_values.iter().any(|v| v == value.trim())
    }

    /// Whether `text` begins with one of the configured placeholder
    /// sentinels, matched case-insensitively (original parser behavior).
    pub fn is_placeholder_text(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.placeholder_values
            .iter()
            .any(|p| lower.starts_with(&p.to_lowercase()))
    }
}

impl PartialEq for IdPattern {
    fn eq(&self, other: &Self) -> bool {
        self.prefix == other.prefix && self.types == other.types && self.numeric == other.numeric
    }
}

pub fn require_valid_id(pattern: &IdPattern, id: &str) -> Result<()> {
    if pattern.is_valid(id) {
        Ok(())
    } else {
        Err(TraceError::ParseError {
            file: String::new(),
            line: 0,
            message: format!("'{id}' is not a well-formed ID under the configured pattern"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_well_formed_ids() {
        let pattern = IdPattern::default_requirements();
        assert!(pattern.is_valid("REQ-p00001"));
        assert!(pattern.is_valid("REQ-o00062"));
        assert!(!pattern.is_valid("REQ-q00001"));
        assert!(!pattern.is_valid("REQ-p1"));
    }

    #[test]
    fn parses_assertion_suffix() {
        let pattern = IdPattern::default_requirements();
        let parsed = pattern.parse_id("REQ-p00001-A").unwrap();
        assert_eq!(parsed.type_code, "p");
        assert_eq!(parsed.numeric_part, "00001");
        assert_eq!(parsed.assertion_label.as_deref(), Some("A"));
        assert_eq!(
            pattern.requirement_id_of("REQ-p00001-A").unwrap(),
            "REQ-p00001"
        );
    }

    #[test]
    fn unknown_keyword_never_errors() {
        let cfg = ReferenceConfig::default();
        let re = cfg.build_implements_regex("Satisfies").unwrap();
        assert!(re.captures("# Satisfies: REQ-p00001").is_some());
        let re2 = cfg.build_implements_regex("Bogus").unwrap();
        assert!(re2.captures("// Implements: REQ-p00001").is_none());
    }
}
