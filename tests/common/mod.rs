use std::path::PathBuf;

use tempfile::TempDir;

/// Mirrors `buildonomy-noet-core`'s `tests/common/mod.rs::init_logging`:
/// a `try_init` so multiple test binaries can call it without panicking.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Write a small spec tree: one root product requirement, one child
/// operational requirement that implements it, and a source file with a
/// code annotation and a test file validating one of its assertions.
pub fn create_test_repo(dir: &TempDir) -> PathBuf {
    let root = dir.path().to_path_buf();

    std::fs::write(
        root.join("requirements.md"),
        "\
# REQ-p00001: Track requirement coverage

Body text describing the root requirement.

## Assertions

A. The system parses Markdown requirement blocks.
B. The system reports coverage gaps.

*End* *REQ-p00001* | **Hash**: placeholder

# REQ-o00001: Parse requirement headers

**Implements**: REQ-p00001

Operational requirement body.

## Assertions

A. Headers matching the configured ID pattern are recognized.

*End* *REQ-o00001* | **Hash**: placeholder
",
    )
    .unwrap();

    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::write(
        root.join("src/lib.rs"),
        "\
// Implements: REQ-o00001
fn parse_header(line: &str) -> bool {
    line.starts_with('#')
}
",
    )
    .unwrap();

    std::fs::create_dir_all(root.join("tests")).unwrap();
    std::fs::write(
        root.join("tests/parser_test.rs"),
        "\
// Validates: REQ-o00001-A
fn test_parse_header_recognizes_hash_prefix() {
    assert!(true);
}
",
    )
    .unwrap();

    root
}
