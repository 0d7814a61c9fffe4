mod common;

use tempfile::tempdir;

use reqtrace_core::{EngineConfig, GraphBuilder, NodeKind};

#[test]
fn builds_graph_with_requirements_code_and_tests() {
    common::init_logging();
    let dir = tempdir().unwrap();
    let repo = common::create_test_repo(&dir);

    let config = EngineConfig::default();
    let builder = GraphBuilder::new(&config);
    let (graph, report) = builder.build_dir(&repo).unwrap();

    assert!(report.parse_errors.is_empty(), "unexpected errors: {:?}", report.parse_errors);
    assert!(graph.has_node("REQ-p00001"));
    assert!(graph.has_node("REQ-o00001"));
    assert!(graph.has_node("REQ-p00001-A"));
    assert!(graph.count_by_kind(NodeKind::CodeSymbol) >= 1);
    assert!(graph.count_by_kind(NodeKind::Test) >= 1);

    let roots: Vec<&str> = graph.iter_roots().map(|n| n.id.as_str()).collect();
    assert_eq!(roots, vec!["REQ-p00001"]);
}

#[test]
fn detects_stale_hash_against_recorded_marker() {
    common::init_logging();
    let dir = tempdir().unwrap();
    let repo = common::create_test_repo(&dir);

    let config = EngineConfig::default();
    let builder = GraphBuilder::new(&config);
    let (_graph, report) = builder.build_dir(&repo).unwrap();

    // The fixture's end markers carry a literal "placeholder" hash, which
    // will never match a computed sha256 digest.
    assert!(report.stale_hashes.contains(&"REQ-p00001".to_string()));
    assert!(report.stale_hashes.contains(&"REQ-o00001".to_string()));
}

#[test]
fn flags_broken_reference_to_missing_requirement() {
    common::init_logging();
    let dir = tempdir().unwrap();
    let repo = common::create_test_repo(&dir);
    std::fs::write(
        repo.join("dangling.md"),
        "\
# REQ-o00002: Dangling child

**Implements**: REQ-p09999

Body.

## Assertions

A. Some assertion text.

*End* *REQ-o00002*
",
    )
    .unwrap();

    let config = EngineConfig::default();
    let builder = GraphBuilder::new(&config);
    let (_graph, report) = builder.build_dir(&repo).unwrap();

    assert!(report.broken_references.iter().any(|b| b.target_id == "REQ-p09999"));
}
