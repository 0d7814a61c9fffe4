mod common;

use chrono::Utc;
use tempfile::tempdir;

use reqtrace_core::builder::GraphBuilder;
use reqtrace_core::mutation::MutationOp;
use reqtrace_core::replayer::{DiskReplayer, FileSnapshot};
use reqtrace_core::EngineConfig;

#[test]
fn renaming_a_requirement_replays_to_disk_and_preserves_siblings() {
    common::init_logging();
    let dir = tempdir().unwrap();
    let repo = common::create_test_repo(&dir);

    let config = EngineConfig::default();
    let builder = GraphBuilder::new(&config);
    let (mut graph, _report) = builder.build_dir(&repo).unwrap();

    let spec_file = repo.join("requirements.md");
    let snapshot = FileSnapshot::capture(&[spec_file.clone()]).unwrap();

    graph
        .apply(
            MutationOp::UpdateTitle {
                id: "REQ-o00001".to_string(),
                title: "Parse requirement headers robustly".to_string(),
            },
            &config.id_pattern,
            Utc::now(),
        )
        .unwrap();

    let replayer = DiskReplayer::new(&config);
    let entries: Vec<_> = graph.mutation_log_entries().to_vec();
    let report = replayer.replay(&graph, &entries, &snapshot).unwrap();

    assert!(report.conflicts.is_empty());
    assert_eq!(report.files_written, vec![spec_file.clone()]);

    let updated_text = std::fs::read_to_string(&spec_file).unwrap();
    assert!(updated_text.contains("# REQ-o00001: Parse requirement headers robustly"));
    // The sibling requirement's body must be untouched by the rewrite.
    assert!(updated_text.contains("Track requirement coverage"));
}
