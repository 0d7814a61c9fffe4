use std::path::Path;

use crate::error::TraceError;
use crate::pattern::EngineConfig;

use super::requirement::{END_MARKER_PATTERN, HEADER_PATTERN};
use super::{ContentKind, DocParser, ParsedContent};

/// Emits a whole-file `ParsedContent::File` identity node for every file the
/// builder walks, plus, for Markdown spec files, one `FileRegion` per span
/// of text outside any requirement block: the preamble before the first
/// requirement, the gaps between requirements, and the postamble after the
/// last one. A spec file with no requirement headers at all gets a single
/// `Remainder` record instead, since there's no structure to report
/// (`spec.md` §3, "every file gets a structural node").
pub struct FileStructureParser;

impl DocParser for FileStructureParser {
    fn applies_to(&self, _path: &Path, _config: &EngineConfig) -> bool {
        true
    }

    fn parse(
        &self,
        path: &Path,
        text: &str,
        config: &EngineConfig,
    ) -> (Vec<ParsedContent>, Vec<TraceError>) {
        let lines: Vec<&str> = text.lines().collect();
        let line_count = lines.len().max(1);

        let mut contents = Vec::new();
        let mut file_node = ParsedContent::new(ContentKind::File, path.display().to_string());
        file_node.id = Some(format!("FILE:{}", path.display()));
        file_node.start_line = 1;
        file_node.end_line = line_count;
        contents.push(file_node);

        if !matches!(path.extension().and_then(|e| e.to_str()), Some("md")) {
            return (contents, Vec::new());
        }

        let mut boundaries: Vec<(usize, usize)> = Vec::new();
        let mut i = 0;
        while i < lines.len() {
            let Some(caps) = HEADER_PATTERN.captures(lines[i]) else {
                i += 1;
                continue;
            };
            if !config.id_pattern.is_valid(caps.name("id").unwrap().as_str()) {
                i += 1;
                continue;
            }
            let start = i + 1;
            let mut end = i + 1;
            while end < lines.len()
                && !HEADER_PATTERN.is_match(lines[end])
                && !END_MARKER_PATTERN.is_match(lines[end].trim())
            {
                end += 1;
            }
            let block_end = if end < lines.len() { end + 1 } else { end };
            boundaries.push((start, block_end));
            i = block_end.max(i + 1);
        }

        if boundaries.is_empty() {
            let mut remainder = ParsedContent::new(ContentKind::Remainder, path.display().to_string());
            remainder.start_line = 1;
            remainder.end_line = line_count;
            contents.push(remainder);
            return (contents, Vec::new());
        }

        let mut region = |kind: &str, start: usize, end: usize, contents: &mut Vec<ParsedContent>| {
            if start > end {
                return;
            }
            let mut record = ParsedContent::new(ContentKind::FileRegion, format!("{kind} of {}", path.display()));
            record.id = Some(format!("FILEREGION:{}:{}:{}", path.display(), start, end));
            record.start_line = start;
            record.end_line = end;
            record.content.insert("region_kind".to_string(), kind.to_string());
            contents.push(record);
        };

        region("preamble", 1, boundaries[0].0.saturating_sub(1), &mut contents);
        for pair in boundaries.windows(2) {
            region("inter_requirement", pair[0].1 + 1, pair[1].0.saturating_sub(1), &mut contents);
        }
        region("postamble", boundaries.last().unwrap().1 + 1, line_count, &mut contents);

        (contents, Vec::new())
    }
}
