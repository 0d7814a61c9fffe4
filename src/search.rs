//! [C6] Search, scope, and cursor pagination over a built [`Graph`]
//! (`spec.md` §7).
//!
//! Field-weighted scoring is grounded on `BeliefGraph::paginate`'s
//! `ResultsPage` cursor shape
//! (`examples/buildonomy-noet-core/src/beliefbase/graph.rs`), combined with
//! `regex`-based term matching in the style of the teacher's query-building
//! helpers (`examples/buildonomy-noet-core/src/query.rs`).

use std::collections::BTreeSet;

use regex::{Regex, RegexBuilder};

use crate::error::{Result, TraceError};
use crate::graph::{Graph, Node, NodeKind};
use crate::pattern::IdPattern;

const SCORE_ID_EXACT: u32 = 100;
const SCORE_TITLE: u32 = 50;
const SCORE_KEYWORD_EXACT: u32 = 40;
const SCORE_KEYWORD_SUBSTRING: u32 = 25;
const SCORE_BODY: u32 = 10;

/// A single search term: a bare word, or one alternative within an
/// OR-group. `exact` marks an `=`-prefixed term (require a whole-token
/// match rather than a substring); `negated` marks a `-`-prefixed term,
/// which `ParsedQuery::parse` pulls out into `excluded` rather than into
/// any AND-group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTerm {
    pub text: String,
    pub exact: bool,
    pub negated: bool,
}

/// A query split into AND-groups of OR-alternatives, required phrases, and
/// excluded terms (`spec.md` §4.6.1).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedQuery {
    pub and_groups: Vec<Vec<SearchTerm>>,
    pub excluded: Vec<SearchTerm>,
    pub phrases: Vec<String>,
}

impl ParsedQuery {
    /// Parse a query string. `"quoted phrases"` become required literal
    /// substrings; a bare token split on unescaped `|` becomes one
    /// OR-group; a token prefixed with `-` is pulled into `excluded`
    /// instead of joining any AND-group; a token (or OR-alternative)
    /// prefixed with `=` is marked `exact`.
    pub fn parse(query: &str) -> Self {
        let mut parsed = ParsedQuery::default();
        let mut chars = query.chars().peekable();
        let mut current = String::new();
        let mut in_quotes = false;

        let mut tokens: Vec<(String, bool)> = Vec::new();
        while let Some(c) = chars.next() {
            match c {
                '"' => {
                    if in_quotes {
                        tokens.push((std::mem::take(&mut current), true));
                        in_quotes = false;
                    } else {
                        if !current.is_empty() {
                            tokens.push((std::mem::take(&mut current), false));
                        }
                        in_quotes = true;
                    }
                }
                c if c.is_whitespace() && !in_quotes => {
                    if !current.is_empty() {
                        tokens.push((std::mem::take(&mut current), false));
                    }
                }
                c => current.push(c),
            }
        }
        if !current.is_empty() {
            tokens.push((current, in_quotes));
        }

        for (token, is_phrase) in tokens {
            if is_phrase {
                parsed.phrases.push(token);
                continue;
            }
            if let Some(rest) = token.strip_prefix('-') {
                if rest.is_empty() {
                    continue;
                }
                let (exact, text) = strip_exact(rest);
                parsed.excluded.push(SearchTerm { text, exact, negated: true });
                continue;
            }
            let group: Vec<SearchTerm> = token
                .split('|')
                .filter(|alt| !alt.is_empty())
                .map(|alt| {
                    let (exact, text) = strip_exact(alt);
                    SearchTerm { text, exact, negated: false }
                })
                .collect();
            if !group.is_empty() {
                parsed.and_groups.push(group);
            }
        }

        parsed
    }
}

fn strip_exact(token: &str) -> (bool, String) {
    match token.strip_prefix('=') {
        Some(rest) => (true, rest.to_string()),
        None => (false, token.to_string()),
    }
}

/// Which field(s) a search or phrase check is restricted to
/// (`spec.md` §4.6.2, "field parameter").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Id,
    Title,
    Body,
    Keywords,
    All,
}

/// Which direction `collect_scope_ids` walks tree edges from the scope
/// root (`spec.md` §4.6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeDirection {
    Ancestors,
    Descendants,
    Both,
}

fn keyword_tokens(node: &Node) -> Vec<String> {
    node.content
        .get("keywords")
        .map(|raw| raw.split(',').map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

/// Score one term against `node`, restricted to `field`. `All` sums every
/// field's contribution, matching the teacher's original "sum every hit"
/// scoring rather than picking a single best field.
fn term_score(node: &Node, term: &SearchTerm, field: SearchField) -> u32 {
    let needle = term.text.to_lowercase();
    if needle.is_empty() {
        return 0;
    }
    let mut score = 0;

    if matches!(field, SearchField::Id | SearchField::All) {
        let matches = if term.exact {
            node.id.eq_ignore_ascii_case(&term.text)
        } else {
            node.id.to_lowercase().contains(&needle)
        };
        if matches {
            score += SCORE_ID_EXACT;
        }
    }

    if matches!(field, SearchField::Title | SearchField::All) {
        let lower_title = node.title.to_lowercase();
        let matches = if term.exact { lower_title == needle } else { lower_title.contains(&needle) };
        if matches {
            score += SCORE_TITLE;
        }
    }

    if matches!(field, SearchField::Keywords | SearchField::All) {
        let tokens = keyword_tokens(node);
        if tokens.iter().any(|t| *t == needle) {
            score += SCORE_KEYWORD_EXACT;
        } else if !term.exact && tokens.iter().any(|t| t.contains(&needle)) {
            score += SCORE_KEYWORD_SUBSTRING;
        }
    }

    if matches!(field, SearchField::Body | SearchField::All) {
        let lower_body = node.body_text.to_lowercase();
        let matches = if term.exact {
            lower_body.split_whitespace().any(|w| w == needle)
        } else {
            lower_body.contains(&needle)
        };
        if matches {
            score += SCORE_BODY;
        }
    }

    score
}

/// The text a phrase check or exclusion check is matched against, limited
/// to the same field subset the term scoring used.
fn concatenated_text(node: &Node, field: SearchField) -> String {
    let mut parts = Vec::new();
    if matches!(field, SearchField::Id | SearchField::All) {
        parts.push(node.id.clone());
    }
    if matches!(field, SearchField::Title | SearchField::All) {
        parts.push(node.title.clone());
    }
    if matches!(field, SearchField::Keywords | SearchField::All) {
        if let Some(k) = node.content.get("keywords") {
            parts.push(k.clone());
        }
    }
    if matches!(field, SearchField::Body | SearchField::All) {
        parts.push(node.body_text.clone());
    }
    parts.join(" ").to_lowercase()
}

/// Score a node against a parsed query: sum of each AND-group's best
/// (max) term score, zeroed entirely by any matched exclusion or any
/// unmatched required phrase (`spec.md` §4.6.2).
fn score_node(node: &Node, query: &ParsedQuery, field: SearchField) -> u32 {
    let haystack = concatenated_text(node, field);

    for excluded in &query.excluded {
        if haystack.contains(&excluded.text.to_lowercase()) {
            return 0;
        }
    }
    for phrase in &query.phrases {
        if !haystack.contains(&phrase.to_lowercase()) {
            return 0;
        }
    }

    let mut total = 0;
    for group in &query.and_groups {
        let best = group.iter().map(|term| term_score(node, term, field)).max().unwrap_or(0);
        if best == 0 {
            return 0;
        }
        total += best;
    }
    total
}

/// A single scored search result, shaped for the graph-JSON summary
/// surface (`spec.md` §4.8 "Graph-JSON surface").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredResult {
    pub id: String,
    pub title: String,
    pub level: Option<u8>,
    pub status: Option<String>,
    pub score: u32,
    /// Assertion ids that matched, when `include_assertions` promoted this
    /// requirement into the results via a child match rather than its own.
    pub matched_assertions: Vec<String>,
}

fn summarize(node: &Node, id_pattern: &IdPattern, score: u32) -> ScoredResult {
    let level = id_pattern.parse_id(&node.id).and_then(|p| id_pattern.type_level(&p.type_code));
    ScoredResult {
        id: node.id.clone(),
        title: node.title.clone(),
        level,
        status: node.content.get("status").cloned(),
        score,
        matched_assertions: Vec::new(),
    }
}

/// BFS from `scope_id` in the requested tree direction, deduped, including
/// `scope_id` itself. Returns `None` if `scope_id` isn't in the graph
/// (`spec.md` §4.6.3 step 1).
fn collect_scope_ids(graph: &Graph, scope_id: &str, direction: ScopeDirection) -> Option<BTreeSet<String>> {
    if !graph.has_node(scope_id) {
        return None;
    }
    let mut ids: BTreeSet<String> = BTreeSet::new();
    ids.insert(scope_id.to_string());
    match direction {
        ScopeDirection::Descendants => {
            for node in graph.walk(scope_id, crate::graph::Order::PreOrder) {
                ids.insert(node.id.clone());
            }
        }
        ScopeDirection::Ancestors => {
            for node in graph.ancestors(scope_id) {
                ids.insert(node.id.clone());
            }
        }
        ScopeDirection::Both => {
            for node in graph.walk(scope_id, crate::graph::Order::PreOrder) {
                ids.insert(node.id.clone());
            }
            for node in graph.ancestors(scope_id) {
                ids.insert(node.id.clone());
            }
        }
    }
    Some(ids)
}

/// Options controlling a [`scoped_search`] pass, beyond the query text and
/// scope itself.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub field: SearchField,
    pub regex: bool,
    pub include_assertions: bool,
    pub limit: Option<usize>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions { field: SearchField::All, regex: false, include_assertions: false, limit: None }
    }
}

/// Search within an optional scope (a requirement id plus its tree
/// neighborhood in `direction`); without a scope, search runs over every
/// requirement in the graph (`spec.md` §4.6.3).
pub fn scoped_search(
    graph: &Graph,
    id_pattern: &IdPattern,
    query: &str,
    scope: Option<(&str, ScopeDirection)>,
    options: &SearchOptions,
) -> Result<Vec<ScoredResult>> {
    let scope_ids = match scope {
        Some((root, direction)) => {
            Some(collect_scope_ids(graph, root, direction).ok_or_else(|| TraceError::NotFound(root.to_string()))?)
        }
        None => None,
    };

    let requirements: Vec<&Node> = graph
        .nodes_by_kind(NodeKind::Requirement)
        .filter(|n| scope_ids.as_ref().is_none_or(|ids| ids.contains(&n.id)))
        .collect();

    let mut results: Vec<ScoredResult> = if options.regex {
        let re = RegexBuilder::new(query)
            .case_insensitive(true)
            .build()
            .map_err(|err| TraceError::Regex(err.to_string()))?;
        requirements
            .into_iter()
            .filter(|node| re.is_match(&concatenated_text(node, options.field)))
            .map(|node| summarize(node, id_pattern, 0))
            .collect()
    } else {
        let parsed = ParsedQuery::parse(query);
        requirements
            .into_iter()
            .map(|node| (node, score_node(node, &parsed, options.field)))
            .filter(|(_, score)| *score > 0)
            .map(|(node, score)| summarize(node, id_pattern, score))
            .collect()
    };

    if options.include_assertions {
        attach_assertion_matches(graph, id_pattern, query, options, &mut results);
    }

    results.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    if let Some(limit) = options.limit {
        results.truncate(limit);
    }
    Ok(results)
}

/// For every requirement's assertion children that match the query, either
/// attach their ids to that requirement's existing result or, if the
/// requirement wasn't already matched on its own, add it with a zero
/// inherited score purely to carry the assertion match
/// (`spec.md` §4.6.3 step 3).
fn attach_assertion_matches(
    graph: &Graph,
    id_pattern: &IdPattern,
    query: &str,
    options: &SearchOptions,
    results: &mut Vec<ScoredResult>,
) {
    let regex = if options.regex {
        RegexBuilder::new(query).case_insensitive(true).build().ok()
    } else {
        None
    };
    let parsed = if options.regex { None } else { Some(ParsedQuery::parse(query)) };

    for result in results.iter_mut() {
        collect_matches(graph, &result.id, &regex, &parsed, options.field, &mut result.matched_assertions);
    }

    let existing: BTreeSet<String> = results.iter().map(|r| r.id.clone()).collect();
    for req in graph.nodes_by_kind(NodeKind::Requirement) {
        if existing.contains(&req.id) {
            continue;
        }
        let mut matched = Vec::new();
        collect_matches(graph, &req.id, &regex, &parsed, options.field, &mut matched);
        if !matched.is_empty() {
            let mut summary = summarize(req, id_pattern, 0);
            summary.matched_assertions = matched;
            results.push(summary);
        }
    }
}

fn collect_matches(
    graph: &Graph,
    requirement_id: &str,
    regex: &Option<Regex>,
    parsed: &Option<ParsedQuery>,
    field: SearchField,
    out: &mut Vec<String>,
) {
    for assertion in graph.iter_children(requirement_id).filter(|n| n.kind == NodeKind::Assertion) {
        let hit = match (regex, parsed) {
            (Some(re), _) => re.is_match(&concatenated_text(assertion, field)),
            (None, Some(q)) => score_node(assertion, q, field) > 0,
            _ => false,
        };
        if hit {
            out.push(assertion.id.clone());
        }
    }
}

/// A requirement carried in [`DiscoverReport::pruned`]: an ancestor whose
/// own match was subsumed by a matched descendant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrunedRequirement {
    pub result: ScoredResult,
    pub superseded_by: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiscoverStats {
    pub input_count: usize,
    pub result_count: usize,
    pub pruned_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DiscoverReport {
    pub results: Vec<ScoredResult>,
    pub pruned: Vec<PrunedRequirement>,
    pub stats: DiscoverStats,
}

/// Run [`scoped_search`], then drop every result that is a tree-ancestor
/// of another result, recording it in `pruned` with the descendants that
/// superseded it (`spec.md` §4.6.4).
pub fn discover_requirements(
    graph: &Graph,
    id_pattern: &IdPattern,
    query: &str,
    scope: Option<(&str, ScopeDirection)>,
    options: &SearchOptions,
) -> Result<DiscoverReport> {
    let matched = scoped_search(graph, id_pattern, query, scope, options)?;
    let input_count = matched.len();
    let matched_ids: BTreeSet<String> = matched.iter().map(|r| r.id.clone()).collect();

    let mut superseded_by: std::collections::BTreeMap<String, Vec<String>> = std::collections::BTreeMap::new();
    for result in &matched {
        for ancestor in graph.ancestors(&result.id) {
            if matched_ids.contains(&ancestor.id) {
                superseded_by.entry(ancestor.id.clone()).or_default().push(result.id.clone());
            }
        }
    }

    let mut results = Vec::new();
    let mut pruned = Vec::new();
    for result in matched {
        match superseded_by.remove(&result.id) {
            Some(mut descendants) => {
                descendants.sort();
                descendants.dedup();
                pruned.push(PrunedRequirement { result, superseded_by: descendants });
            }
            None => results.push(result),
        }
    }

    let stats = DiscoverStats { input_count, result_count: results.len(), pruned_count: pruned.len() };
    Ok(DiscoverReport { results, pruned, stats })
}

/// The presentation mode a cursor batch is rendered in
/// (`spec.md` §4.6.5 "batch_size is a presentation knob").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// Positive batch size: items are grouped `children` arrays of this
    /// many requirements per batch.
    Fixed(usize),
    /// `batch_size = -1`: each assertion becomes its own first-class item.
    FlattenAssertions,
    /// `batch_size = 0`: assertions and coverage are inlined into their
    /// owning requirement's item rather than flattened or grouped.
    InlineAssertionsOrCoverage,
}

impl BatchMode {
    pub fn from_raw(batch_size: i64) -> Self {
        match batch_size {
            i64::MIN..=-1 => BatchMode::FlattenAssertions,
            0 => BatchMode::InlineAssertionsOrCoverage,
            n => BatchMode::Fixed(n as usize),
        }
    }

    fn step(&self) -> usize {
        match self {
            BatchMode::Fixed(n) => (*n).max(1),
            BatchMode::FlattenAssertions | BatchMode::InlineAssertionsOrCoverage => 1,
        }
    }
}

/// A single-slot, per-session server-side cursor over an already-ordered
/// result set (`spec.md` §4.6.5 "cursor protocol"). Opening a new cursor
/// is the caller's responsibility — replacing the prior one is just
/// dropping the old `Cursor` and creating a new one.
#[derive(Debug, Clone)]
pub struct Cursor {
    results: Vec<ScoredResult>,
    position: usize,
    mode: BatchMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorInfo {
    pub total: usize,
    pub position: usize,
    pub remaining: usize,
}

/// Materialize `results` into a new cursor, positioned at the start.
pub fn open_cursor(results: Vec<ScoredResult>, batch_size: i64) -> Cursor {
    Cursor { results, position: 0, mode: BatchMode::from_raw(batch_size) }
}

impl Cursor {
    /// Advance by up to `count` items (or one batch-worth, whichever the
    /// caller wants) and return the next slice; an empty slice once
    /// exhausted.
    pub fn next_batch(&mut self, count: usize) -> &[ScoredResult] {
        let step = count.max(self.mode.step());
        let start = self.position;
        let end = (start + step).min(self.results.len());
        self.position = end;
        &self.results[start..end]
    }

    pub fn info(&self) -> CursorInfo {
        CursorInfo {
            total: self.results.len(),
            position: self.position,
            remaining: self.results.len().saturating_sub(self.position),
        }
    }
}

/// Requirements with zero incoming `Validates` edges among their
/// assertions, honoring `count_placeholders` (`spec.md` §4.4, "coverage
/// metrics").
pub fn uncovered_requirements(graph: &Graph, count_placeholders: bool) -> Vec<String> {
    let mut out = Vec::new();
    for req in graph.nodes_by_kind(NodeKind::Requirement) {
        let assertions: Vec<&Node> = graph
            .iter_children(&req.id)
            .filter(|n| n.kind == NodeKind::Assertion)
            .collect();
        let relevant: Vec<&&Node> = assertions
            .iter()
            .filter(|a| {
                count_placeholders
                    || a.content.get("is_placeholder").map(|v| v.as_str()) != Some("true")
            })
            .collect();
        if relevant.is_empty() {
            continue;
        }
        let covered = relevant
            .iter()
            .all(|a| graph.iter_incoming_edges(&a.id).any(|e| e.kind.is_coverage_edge()));
        if !covered {
            out.push(req.id.clone());
        }
    }
    out
}

pub fn validate_query(query: &str) -> Result<ParsedQuery> {
    Ok(ParsedQuery::parse(query))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, EdgeKind, Node};
    use crate::pattern::IdPattern;

    fn sample() -> Graph {
        let mut g = Graph::new();
        g.insert_node(
            Node::new("REQ-p00001", NodeKind::Requirement, "Parsing engine").with_body("Parses markdown specs."),
        );
        g.insert_node(
            Node::new("REQ-p00002", NodeKind::Requirement, "Search engine")
                .with_body("Scores requirements by keyword."),
        );
        g
    }

    #[test]
    fn id_match_outranks_body_match() {
        let g = sample();
        let id_pattern = IdPattern::default_requirements();
        let results = scoped_search(&g, &id_pattern, "REQ-p00001", None, &SearchOptions::default()).unwrap();
        assert_eq!(results[0].id, "REQ-p00001");
        assert!(results[0].score >= SCORE_ID_EXACT);
    }

    #[test]
    fn excluded_term_zeroes_an_otherwise_matching_node() {
        let g = sample();
        let id_pattern = IdPattern::default_requirements();
        let results =
            scoped_search(&g, &id_pattern, "engine -parses", None, &SearchOptions::default()).unwrap();
        assert!(results.iter().all(|r| r.id != "REQ-p00001"));
        assert!(results.iter().any(|r| r.id == "REQ-p00002"));
    }

    #[test]
    fn or_group_matches_either_alternative() {
        let g = sample();
        let id_pattern = IdPattern::default_requirements();
        let results = scoped_search(&g, &id_pattern, "parses|scores", None, &SearchOptions::default()).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn discover_drops_descendants_already_covered() {
        let mut g = Graph::new();
        g.insert_node(Node::new("REQ-p00001", NodeKind::Requirement, "auth root"));
        g.insert_node(Node::new("REQ-o00001", NodeKind::Requirement, "auth child"));
        g.add_edge_raw(Edge::new("REQ-o00001", "REQ-p00001", EdgeKind::Implements)).unwrap();
        let id_pattern = IdPattern::default_requirements();
        let report = discover_requirements(
            &g,
            &id_pattern,
            "auth",
            Some(("REQ-p00001", ScopeDirection::Descendants)),
            &SearchOptions::default(),
        )
        .unwrap();
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].id, "REQ-o00001");
        assert_eq!(report.pruned.len(), 1);
        assert_eq!(report.pruned[0].result.id, "REQ-p00001");
        assert_eq!(report.pruned[0].superseded_by, vec!["REQ-o00001".to_string()]);
    }

    #[test]
    fn cursor_paginates_in_fixed_batches() {
        let results: Vec<ScoredResult> = (0..5)
            .map(|i| ScoredResult {
                id: format!("REQ-p{i:05}"),
                title: String::new(),
                level: None,
                status: None,
                score: 1,
                matched_assertions: Vec::new(),
            })
            .collect();
        let mut cursor = open_cursor(results, 2);
        assert_eq!(cursor.next_batch(2).len(), 2);
        assert_eq!(cursor.next_batch(2).len(), 2);
        assert_eq!(cursor.next_batch(2).len(), 1);
        assert_eq!(cursor.info().remaining, 0);
        assert!(cursor.next_batch(2).is_empty());
    }

    #[test]
    fn cursor_flattens_with_negative_batch_size() {
        let results: Vec<ScoredResult> = (0..3)
            .map(|i| ScoredResult {
                id: format!("REQ-p{i:05}"),
                title: String::new(),
                level: None,
                status: None,
                score: 1,
                matched_assertions: Vec::new(),
            })
            .collect();
        let mut cursor = open_cursor(results, -1);
        assert_eq!(cursor.next_batch(1).len(), 1);
        assert_eq!(cursor.info().total, 3);
    }
}
