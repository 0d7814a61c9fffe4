//! [C7] The disk replayer: projects mutations recorded in a [`crate::mutation::MutationLog`]
//! back onto the spec files they came from, preserving everything in each
//! file the mutation didn't touch (`spec.md` §8).
//!
//! Writes are atomic (write to a sibling temp file, then rename), the
//! pattern `buildonomy-noet-core` uses whenever it persists a belief file
//! to disk rather than risk a torn write on crash.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{info, warn};

use crate::error::{Result, TraceError};
use crate::graph::{EdgeKind, Graph, Node, NodeKind};
use crate::mutation::MutationEntry;
use crate::pattern::EngineConfig;

/// Text-level edits the replayer can apply to a single file's line buffer.
/// Each is independent of surrounding content, so coalesced edits to the
/// same file apply cleanly regardless of order once sorted descending by
/// line (`spec.md` §8 "edit primitives").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextEdit {
    ReplaceHeaderTitle { line: usize, id: String, title: String },
    ReplaceBody { id: String, start_line: usize, end_line: usize, body_text: String },
    InsertAssertionLine { requirement_id: String, after_line: usize, label: String, text: String },
    RemoveLineRange { start_line: usize, end_line: usize },
    RenameIdOccurrences { start_line: usize, end_line: usize, old_id: String, new_id: String },
    UpdateEndMarkerHash { line: usize, hash: String },
    InsertRequirementBlock { id: String, at_line: usize, block_text: String },
    /// Rewrites a single assertion's own line in place: used both for a
    /// direct text edit and to re-emit a sibling assertion whose label
    /// changed under compaction.
    ModifyAssertionText { requirement_id: String, line: usize, label: String, text: String },
    /// Rewrites the id list following a reference keyword on one line,
    /// locating the keyword and its trailing colon textually so the
    /// original comment marker and indentation survive untouched.
    ModifyReferenceField { requirement_id: String, line: usize, keyword: String, ids: Vec<String> },
    /// Swaps one reference keyword for another on the same line, leaving
    /// the id list it introduces untouched.
    ChangeReferenceType { requirement_id: String, line: usize, old_keyword: String, new_keyword: String },
    /// Sets or clears a `**Status**:` line within a requirement's block,
    /// inserting one directly under the header if none exists yet.
    ModifyStatus { id: String, start_line: usize, end_line: usize, status: Option<String> },
}

impl TextEdit {
    fn anchor_line(&self) -> usize {
        match self {
            TextEdit::ReplaceHeaderTitle { line, .. } => *line,
            TextEdit::ReplaceBody { start_line, .. } => *start_line,
            TextEdit::InsertAssertionLine { after_line, .. } => *after_line,
            TextEdit::RemoveLineRange { start_line, .. } => *start_line,
            TextEdit::RenameIdOccurrences { start_line, .. } => *start_line,
            TextEdit::UpdateEndMarkerHash { line, .. } => *line,
            TextEdit::InsertRequirementBlock { at_line, .. } => *at_line,
            TextEdit::ModifyAssertionText { line, .. } => *line,
            TextEdit::ModifyReferenceField { line, .. } => *line,
            TextEdit::ChangeReferenceType { line, .. } => *line,
            TextEdit::ModifyStatus { start_line, .. } => *start_line,
        }
    }

    fn apply(&self, lines: &mut Vec<String>) {
        match self {
            TextEdit::ReplaceHeaderTitle { line, id, title } => {
                if let Some(l) = lines.get_mut(line.saturating_sub(1)) {
                    *l = format!("# {id}: {title}");
                }
            }
            TextEdit::ReplaceBody { start_line, end_line, body_text, .. } => {
                let start = start_line.saturating_sub(1).min(lines.len());
                let end = (*end_line).min(lines.len());
                let replacement: Vec<String> = body_text.lines().map(|l| l.to_string()).collect();
                lines.splice(start..end, replacement);
            }
            TextEdit::InsertAssertionLine { after_line, label, text, .. } => {
                let at = (*after_line).min(lines.len());
                lines.insert(at, format!("{label}. {text}"));
            }
            TextEdit::RemoveLineRange { start_line, end_line } => {
                let start = start_line.saturating_sub(1).min(lines.len());
                let end = (*end_line).min(lines.len());
                if start < end {
                    lines.drain(start..end);
                }
            }
            TextEdit::RenameIdOccurrences { start_line, end_line, old_id, new_id } => {
                let start = start_line.saturating_sub(1).min(lines.len());
                let end = (*end_line).min(lines.len());
                for line in &mut lines[start..end] {
                    *line = line.replace(old_id.as_str(), new_id.as_str());
                }
            }
            TextEdit::UpdateEndMarkerHash { line, hash } => {
                if let Some(l) = lines.get_mut(line.saturating_sub(1)) {
                    if let Some(pos) = l.find("**Hash**:") {
                        l.truncate(pos + "**Hash**:".len());
                        l.push(' ');
                        l.push_str(hash);
                    }
                }
            }
            TextEdit::InsertRequirementBlock { at_line, block_text, .. } => {
                let at = (*at_line).min(lines.len());
                let new_lines: Vec<String> = block_text.lines().map(|l| l.to_string()).collect();
                for (offset, l) in new_lines.into_iter().enumerate() {
                    lines.insert(at + offset, l);
                }
            }
            TextEdit::ModifyAssertionText { line, label, text, .. } => {
                if let Some(l) = lines.get_mut(line.saturating_sub(1)) {
                    *l = format!("{label}. {text}");
                }
            }
            TextEdit::ModifyReferenceField { line, keyword, ids, .. } => {
                if let Some(l) = lines.get_mut(line.saturating_sub(1)) {
                    if let Some(new_line) = replace_after_keyword(l, keyword, &ids.join(", ")) {
                        *l = new_line;
                    }
                }
            }
            TextEdit::ChangeReferenceType { line, old_keyword, new_keyword, .. } => {
                if let Some(l) = lines.get_mut(line.saturating_sub(1)) {
                    if let Some(new_line) = replace_keyword_word(l, old_keyword, new_keyword) {
                        *l = new_line;
                    }
                }
            }
            TextEdit::ModifyStatus { start_line, end_line, status, .. } => {
                let s = start_line.saturating_sub(1).min(lines.len());
                let e = (*end_line).min(lines.len());
                let found = lines[s..e].iter().position(|l| l.to_lowercase().contains("**status**:"));
                match (found, status) {
                    (Some(idx), Some(v)) => lines[s + idx] = format!("**Status**: {v}"),
                    (Some(idx), None) => {
                        lines.remove(s + idx);
                    }
                    (None, Some(v)) => lines.insert((s + 1).min(lines.len()), format!("**Status**: {v}")),
                    (None, None) => {}
                }
            }
        }
    }
}

/// Find `keyword` case-insensitively, then the next `:` after it, and
/// replace everything past that colon with a single space and `new_value`.
/// Leaves the original comment marker, bold markers, and indentation in
/// place untouched.
fn replace_after_keyword(line: &str, keyword: &str, new_value: &str) -> Option<String> {
    let lower = line.to_lowercase();
    let kw_pos = lower.find(&keyword.to_lowercase())?;
    let after_kw = kw_pos + keyword.len();
    let colon_offset = line[after_kw..].find(':')?;
    let cut = after_kw + colon_offset + 1;
    let mut out = line[..cut].to_string();
    out.push(' ');
    out.push_str(new_value);
    Some(out)
}

fn replace_keyword_word(line: &str, old_keyword: &str, new_keyword: &str) -> Option<String> {
    let lower = line.to_lowercase();
    let pos = lower.find(&old_keyword.to_lowercase())?;
    let mut out = line.to_string();
    out.replace_range(pos..pos + old_keyword.len(), new_keyword);
    Some(out)
}

/// A snapshot of file modification times taken right after a build, used
/// to detect whether a spec file changed on disk before replay runs
/// (`spec.md` §8 "external change detection").
#[derive(Debug, Clone, Default)]
pub struct FileSnapshot {
    mtimes: BTreeMap<PathBuf, SystemTime>,
}

impl FileSnapshot {
    pub fn capture(files: &[PathBuf]) -> Result<Self> {
        let mut mtimes = BTreeMap::new();
        for file in files {
            let meta = fs::metadata(file)?;
            mtimes.insert(file.clone(), meta.modified()?);
        }
        Ok(FileSnapshot { mtimes })
    }

    fn check(&self, file: &Path) -> Result<()> {
        let Some(expected) = self.mtimes.get(file) else {
            return Ok(());
        };
        let actual = fs::metadata(file)?.modified()?;
        if actual != *expected {
            return Err(TraceError::Conflict(vec![file.display().to_string()]));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct ReplayReport {
    pub files_written: Vec<PathBuf>,
    pub conflicts: Vec<String>,
}

pub struct DiskReplayer<'a> {
    config: &'a EngineConfig,
}

impl<'a> DiskReplayer<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        DiskReplayer { config }
    }

    /// Replay the entries in `entries` onto disk, using `graph` as the
    /// post-mutation source of truth for each affected node's current
    /// text. Mutations are coalesced by (file, requirement id) before any
    /// edit is generated, so three edits to the same requirement produce
    /// one rewrite of its block rather than three overlapping ones
    /// (`spec.md` §8 "coalescing").
    pub fn replay(
        &self,
        graph: &Graph,
        entries: &[MutationEntry],
        snapshot: &FileSnapshot,
    ) -> Result<ReplayReport> {
        info!(hash_mode = ?self.config.hash_mode, entries = entries.len(), "starting replay");
        let mut report = ReplayReport::default();
        let mut by_file: BTreeMap<PathBuf, Vec<TextEdit>> = BTreeMap::new();

        for entry in entries {
            for (file, edit) in self.edit_for(graph, entry) {
                by_file.entry(file).or_default().push(edit);
            }
        }

        for (file, mut edits) in by_file {
            if let Err(err) = snapshot.check(&file) {
                warn!(file = %file.display(), "external change detected, skipping replay");
                report.conflicts.push(file.display().to_string());
                let _ = err;
                continue;
            }
            edits.sort_by(|a, b| b.anchor_line().cmp(&a.anchor_line()));
            self.apply_edits(&file, &edits)?;
            self.sync_hash(graph, &file, &edits)?;
            report.files_written.push(file);
        }

        Ok(report)
    }

    /// Translate one logged mutation into zero or more (file, edit) pairs.
    /// `RestoreRequirementCascade`/`RestoreAssertionCascade` are never
    /// produced directly by a caller — only ever as the computed inverse of
    /// `DeleteRequirement`/`RemoveAssertion` — and replaying through `undo`
    /// re-applies the forward op from the log, so they're intentionally
    /// left unhandled here.
    fn edit_for(&self, graph: &Graph, entry: &MutationEntry) -> Vec<(PathBuf, TextEdit)> {
        use crate::mutation::MutationOp::*;
        match &entry.op {
            CreateRequirement { id, title, body_text, parent_id, .. } => {
                let Some(parent_id) = parent_id else { return Vec::new() };
                let Some(parent) = graph.find_by_id(parent_id) else { return Vec::new() };
                let (Some(file), Some(end_line)) = (parent.source_file.clone(), parent.end_line) else {
                    return Vec::new();
                };
                let block_text = format!("\n# {id}: {title}\n\n{body_text}\n\n*End* *{id}*\n");
                vec![(file, TextEdit::InsertRequirementBlock { id: id.clone(), at_line: end_line, block_text })]
            }
            DeleteRequirement { id } => {
                let Some(node) = graph.find_by_id(id) else { return Vec::new() };
                let (Some(file), Some(start_line), Some(end_line)) =
                    (node.source_file.clone(), node.start_line, node.end_line)
                else {
                    return Vec::new();
                };
                vec![(file, TextEdit::RemoveLineRange { start_line, end_line })]
            }
            RenameRequirement { old_id, new_id } => {
                let Some(node) = graph.find_by_id(new_id) else { return Vec::new() };
                let (Some(file), Some(start_line), Some(end_line)) =
                    (node.source_file.clone(), node.start_line, node.end_line)
                else {
                    return Vec::new();
                };
                vec![(
                    file,
                    TextEdit::RenameIdOccurrences {
                        start_line,
                        end_line,
                        old_id: old_id.clone(),
                        new_id: new_id.clone(),
                    },
                )]
            }
            RenameAssertion { new_id, .. } => {
                let Some(node) = graph.find_by_id(new_id) else { return Vec::new() };
                let (Some(file), Some(line)) = (node.source_file.clone(), node.start_line) else {
                    return Vec::new();
                };
                let requirement_id = self.config.id_pattern.requirement_id_of(new_id).unwrap_or_default();
                vec![(
                    file,
                    TextEdit::ModifyAssertionText {
                        requirement_id,
                        line,
                        label: node.title.clone(),
                        text: node.body_text.clone(),
                    },
                )]
            }
            UpdateTitle { id, title } => {
                let Some(node) = graph.find_by_id(id) else { return Vec::new() };
                let (Some(file), Some(line)) = (node.source_file.clone(), node.start_line) else {
                    return Vec::new();
                };
                vec![(file, TextEdit::ReplaceHeaderTitle { line, id: id.clone(), title: title.clone() })]
            }
            UpdateBody { id, body_text } => {
                let Some(node) = graph.find_by_id(id) else { return Vec::new() };
                let (Some(file), Some(start_line), Some(end_line)) =
                    (node.source_file.clone(), node.start_line, node.end_line)
                else {
                    return Vec::new();
                };
                vec![(
                    file,
                    TextEdit::ReplaceBody { id: id.clone(), start_line, end_line, body_text: body_text.clone() },
                )]
            }
            AddAssertion { requirement_id, label, text } => {
                let Some(node) = graph.find_by_id(requirement_id) else { return Vec::new() };
                let (Some(file), Some(end_line)) = (node.source_file.clone(), node.end_line) else {
                    return Vec::new();
                };
                vec![(
                    file,
                    TextEdit::InsertAssertionLine {
                        requirement_id: requirement_id.clone(),
                        after_line: end_line,
                        label: label.clone(),
                        text: text.clone(),
                    },
                )]
            }
            RemoveAssertion { assertion_id, compact } => {
                let node = graph
                    .find_by_id(assertion_id)
                    .or_else(|| graph.deleted_nodes().find(|n| &n.id == assertion_id));
                let Some(node) = node else { return Vec::new() };
                let (Some(file), Some(line)) = (node.source_file.clone(), node.start_line) else {
                    return Vec::new();
                };
                let mut edits = vec![(file, TextEdit::RemoveLineRange { start_line: line, end_line: line })];
                if *compact {
                    if let Some(requirement_id) = self.config.id_pattern.requirement_id_of(assertion_id) {
                        for sibling in graph.iter_children(&requirement_id) {
                            if sibling.kind != NodeKind::Assertion {
                                continue;
                            }
                            if let (Some(sib_file), Some(sib_line)) =
                                (sibling.source_file.clone(), sibling.start_line)
                            {
                                edits.push((
                                    sib_file,
                                    TextEdit::ModifyAssertionText {
                                        requirement_id: requirement_id.clone(),
                                        line: sib_line,
                                        label: sibling.title.clone(),
                                        text: sibling.body_text.clone(),
                                    },
                                ));
                            }
                        }
                    }
                }
                edits
            }
            UpdateAssertion { assertion_id, text } => {
                let Some(node) = graph.find_by_id(assertion_id) else { return Vec::new() };
                let (Some(file), Some(line)) = (node.source_file.clone(), node.start_line) else {
                    return Vec::new();
                };
                let requirement_id = self.config.id_pattern.requirement_id_of(assertion_id).unwrap_or_default();
                vec![(
                    file,
                    TextEdit::ModifyAssertionText { requirement_id, line, label: node.title.clone(), text: text.clone() },
                )]
            }
            AddEdge { source, kind, .. } | RemoveEdge { source, kind, .. } => {
                self.reference_field_edit(graph, source, *kind)
            }
            ChangeEdgeKind { source, target: _, old_kind, new_kind } => {
                let Some(node) = graph.find_by_id(source) else { return Vec::new() };
                let (Some(file), Some(line)) = (node.source_file.clone(), node.start_line) else {
                    return Vec::new();
                };
                let (Some(old_keyword), Some(new_keyword)) =
                    (self.keyword_for(*old_kind), self.keyword_for(*new_kind))
                else {
                    return Vec::new();
                };
                vec![(
                    file,
                    TextEdit::ChangeReferenceType {
                        requirement_id: source.clone(),
                        line,
                        old_keyword: old_keyword.to_string(),
                        new_keyword: new_keyword.to_string(),
                    },
                )]
            }
            FixBrokenReference { source, kind, .. } => self.reference_field_edit(graph, source, *kind),
            SetContent { .. } => Vec::new(),
            ChangeStatus { id, status } => {
                let Some(node) = graph.find_by_id(id) else { return Vec::new() };
                let (Some(file), Some(start_line), Some(end_line)) =
                    (node.source_file.clone(), node.start_line, node.end_line)
                else {
                    return Vec::new();
                };
                vec![(
                    file,
                    TextEdit::ModifyStatus { id: id.clone(), start_line, end_line, status: status.clone() },
                )]
            }
            RestoreRequirementCascade { .. } | RestoreAssertionCascade { .. } => Vec::new(),
        }
    }

    /// Rewrite the id list after `source`'s reference keyword for `kind`,
    /// reflecting whatever edges of that kind `source` now carries in
    /// `graph` — shared by `AddEdge`, `RemoveEdge`, and
    /// `FixBrokenReference`, since all three ultimately just change which
    /// ids follow the keyword on that line.
    fn reference_field_edit(&self, graph: &Graph, source: &str, kind: EdgeKind) -> Vec<(PathBuf, TextEdit)> {
        let Some(keyword) = self.keyword_for(kind) else { return Vec::new() };
        let Some(node) = graph.find_by_id(source) else { return Vec::new() };
        let (Some(file), Some(line)) = (node.source_file.clone(), node.start_line) else {
            return Vec::new();
        };
        let ids = reference_field_ids(graph, source, kind);
        vec![(
            file,
            TextEdit::ModifyReferenceField {
                requirement_id: source.to_string(),
                line,
                keyword: keyword.to_string(),
                ids,
            },
        )]
    }

    fn keyword_for(&self, kind: EdgeKind) -> Option<&str> {
        let keywords = &self.config.reference.keywords;
        match kind {
            EdgeKind::Implements => Some(keywords.implements.as_str()),
            EdgeKind::Refines => Some(keywords.refines.as_str()),
            EdgeKind::Addresses => Some(keywords.addresses.as_str()),
            EdgeKind::Validates => Some(keywords.validates.as_str()),
            EdgeKind::Produces | EdgeKind::Contains => None,
        }
    }

    fn apply_edits(&self, file: &Path, edits: &[TextEdit]) -> Result<()> {
        let original = fs::read_to_string(file)?;
        let mut lines: Vec<String> = original.lines().map(|l| l.to_string()).collect();
        for edit in edits {
            edit.apply(&mut lines);
        }
        let mut text = lines.join("\n");
        text.push('\n');
        atomic_write(file, &text)?;
        info!(file = %file.display(), edits = edits.len(), "replayed mutations to disk");
        Ok(())
    }

    /// After applying edits, recompute and rewrite the `**Hash**:` markers
    /// for every requirement whose block changed, so the next build sees a
    /// consistent hash rather than flagging it stale (`spec.md` I6).
    fn sync_hash(&self, graph: &Graph, file: &Path, edits: &[TextEdit]) -> Result<()> {
        let touched_ids: Vec<&str> = edits
            .iter()
            .filter_map(|e| match e {
                TextEdit::ReplaceHeaderTitle { id, .. } => Some(id.as_str()),
                TextEdit::RenameIdOccurrences { new_id, .. } => Some(new_id.as_str()),
                TextEdit::ReplaceBody { id, .. } => Some(id.as_str()),
                TextEdit::InsertRequirementBlock { id, .. } => Some(id.as_str()),
                TextEdit::InsertAssertionLine { requirement_id, .. } => Some(requirement_id.as_str()),
                TextEdit::ModifyAssertionText { requirement_id, .. } => Some(requirement_id.as_str()),
                TextEdit::ModifyReferenceField { requirement_id, .. } => Some(requirement_id.as_str()),
                TextEdit::ChangeReferenceType { requirement_id, .. } => Some(requirement_id.as_str()),
                TextEdit::ModifyStatus { id, .. } => Some(id.as_str()),
                TextEdit::RemoveLineRange { .. } | TextEdit::UpdateEndMarkerHash { .. } => None,
            })
            .collect();
        if touched_ids.is_empty() {
            return Ok(());
        }
        let text = fs::read_to_string(file)?;
        let mut lines: Vec<String> = text.lines().map(|l| l.to_string()).collect();
        for id in touched_ids {
            if let Some(node) = graph.find_by_id(id) {
                if let Some(end_line) = node.end_line {
                    let hash = node.hash.clone().unwrap_or_default();
                    TextEdit::UpdateEndMarkerHash { line: end_line, hash }.apply(&mut lines);
                }
            }
        }
        let mut out = lines.join("\n");
        out.push('\n');
        atomic_write(file, &out)
    }
}

/// Every id a `Validates`/`Implements`/`Refines`/`Addresses` field
/// following `source`'s own `kind` edges should list, rendering an edge's
/// `assertion_targets` as `target-firstLabel, otherLabel, ...` the same
/// way the parser reads it back.
fn reference_field_ids(graph: &Graph, source: &str, kind: EdgeKind) -> Vec<String> {
    graph
        .iter_outgoing_edges(source)
        .filter(|e| e.kind == kind)
        .map(|e| {
            if e.assertion_targets.is_empty() {
                e.target.clone()
            } else {
                let mut parts = vec![format!("{}-{}", e.target, e.assertion_targets[0])];
                parts.extend(e.assertion_targets[1..].iter().cloned());
                parts.join(", ")
            }
        })
        .collect()
}

fn atomic_write(path: &Path, contents: &str) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp_path = dir.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("reqtrace")
    ));
    {
        let mut tmp = fs::File::create(&tmp_path)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Whether any requirement node's current in-memory hash differs from the
/// hash recorded in its source file's end marker, without reading from
/// disk again (cheap pre-replay check).
pub fn requirements_needing_hash_sync(graph: &Graph) -> Vec<String> {
    graph
        .nodes_by_kind(NodeKind::Requirement)
        .filter(|n: &&Node| {
            let recorded = n.content.get("recorded_hash");
            recorded.is_some() && recorded != n.hash.as_ref()
        })
        .map(|n| n.id.clone())
        .collect()
}
