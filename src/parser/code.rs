use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::TraceError;
use crate::graph::EdgeKind;
use crate::pattern::EngineConfig;

use super::{parse_assertion_scoped_field, ContentKind, DocParser, ParsedContent, ReferenceCandidate};

static SYMBOL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:fn|struct|enum|trait|impl|class|def|function)\s+(?P<name>[A-Za-z_][A-Za-z0-9_]*)",
    )
    .unwrap()
});

/// Scans source files for comment-attached `Implements`/`Refines`/
/// `Addresses`/`Validates` references and associates each with the next
/// symbol definition line, producing one `ParsedContent::CodeSymbol` per
/// annotated symbol (`spec.md` §3, "code references").
///
/// A plain source file can carry a `Validates:` annotation directly (not
/// just under `tests/`) when a non-test function still exercises an
/// assertion, e.g. a runtime self-check; `all_validates_keywords()` is
/// checked here too, not only in the test scanner.
///
/// Both single-line (`// Implements: REQ-p00001`) and block-form
/// (`# IMPLEMENTS REQUIREMENTS:` header followed by indented id: desc
/// lines) annotations are recognized, per `ReferenceConfig`.
pub struct CodeParser;

impl DocParser for CodeParser {
    fn applies_to(&self, path: &Path, _config: &EngineConfig) -> bool {
        !matches!(path.extension().and_then(|e| e.to_str()), Some("md"))
    }

    fn parse(
        &self,
        path: &Path,
        text: &str,
        config: &EngineConfig,
    ) -> (Vec<ParsedContent>, Vec<TraceError>) {
        let ref_config = config.resolve_reference_config(path);
        let mut contents = Vec::new();
        let mut errors = Vec::new();

        let implements_regexes: Vec<(Regex, EdgeKind)> = ref_config
            .all_implements_keywords()
            .into_iter()
            .filter_map(|kw| ref_config.build_implements_regex(kw).ok().map(|r| (r, kind_for(kw, &ref_config))))
            .collect();

        let validates_regexes: Vec<Regex> = ref_config
            .all_validates_keywords()
            .into_iter()
            .filter_map(|kw| ref_config.build_validates_regex(kw).ok())
            .collect();

        let block_header_re = ref_config.build_block_header_regex().ok();
        let block_ref_re = ref_config.build_block_ref_regex().ok();

        let lines: Vec<&str> = text.lines().collect();
        let mut pending: Vec<ReferenceCandidate> = Vec::new();
        let mut pending_start: Option<usize> = None;
        let mut in_block = false;

        for (idx, raw_line) in lines.iter().enumerate() {
            let lineno = idx + 1;
            let comment_body = ref_config
                .comment_styles
                .iter()
                .find_map(|style| style.strip(raw_line));

            if let Some(header_re) = &block_header_re {
                if header_re.is_match(raw_line) {
                    in_block = true;
                    pending_start.get_or_insert(lineno);
                    continue;
                }
            }
            if in_block {
                if let (Some(body), Some(ref_re)) = (comment_body, &block_ref_re) {
                    if let Some(caps) = ref_re.captures(body).or_else(|| ref_re.captures(raw_line)) {
                        let id = caps.name("id").unwrap().as_str().to_string();
                        if config.id_pattern.is_valid(&id) || config.id_pattern.is_valid_label(&id) {
                            pending.push(ReferenceCandidate {
                                kind: EdgeKind::Implements,
                                target_id: id,
                                assertion_targets: Vec::new(),
                            });
                            continue;
                        }
                    }
                }
                in_block = false;
            }

            if let Some(body) = comment_body {
                for (re, kind) in &implements_regexes {
                    if let Some(caps) = re.captures(body) {
                        pending_start.get_or_insert(lineno);
                        pending.extend(parse_assertion_scoped_field(&caps["ids"], *kind, config));
                    }
                }
                for re in &validates_regexes {
                    if let Some(caps) = re.captures(body) {
                        pending_start.get_or_insert(lineno);
                        pending.extend(parse_assertion_scoped_field(&caps["ids"], EdgeKind::Validates, config));
                    }
                }
                continue;
            }

            if raw_line.trim().is_empty() {
                continue;
            }

            if !pending.is_empty() {
                let symbol_name = SYMBOL_PATTERN
                    .captures(raw_line)
                    .map(|c| c["name"].to_string())
                    .unwrap_or_else(|| raw_line.trim().to_string());
                let mut record = ParsedContent::new(ContentKind::CodeSymbol, symbol_name.clone());
                record.id = Some(format!("{}::{}@{}", path.display(), symbol_name, lineno));
                record.start_line = pending_start.unwrap_or(lineno);
                record.end_line = lineno;
                record.references = std::mem::take(&mut pending);
                contents.push(record);
            }
            pending_start = None;
        }

        if !pending.is_empty() {
            errors.push(TraceError::ParseError {
                file: path.display().to_string(),
                line: pending_start.unwrap_or(1),
                message: "reference comment not followed by a symbol definition".to_string(),
            });
        }

        (contents, errors)
    }
}

fn kind_for(keyword: &str, ref_config: &crate::pattern::ReferenceConfig) -> EdgeKind {
    if keyword.eq_ignore_ascii_case(&ref_config.keywords.refines) {
        EdgeKind::Refines
    } else if keyword.eq_ignore_ascii_case(&ref_config.keywords.addresses) {
        EdgeKind::Addresses
    } else {
        EdgeKind::Implements
    }
}
