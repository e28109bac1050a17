use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;

fn docgraph_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_docgraph"))
}

fn run(data_dir: &Path, args: &[&str]) -> Output {
    let output = Command::new(docgraph_bin())
        .arg("--data-dir")
        .arg(data_dir)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("spawn docgraph");
    assert!(
        output.status.success(),
        "docgraph {args:?} failed:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

#[test]
fn import_query_delete_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    let input = dir.path().join("graph.json");
    fs::write(
        &input,
        r#"{
            "entities": [
                {"entityId": "A", "name": "Alice", "entityType": "person",
                 "observations": ["drinks espresso"]},
                {"entityId": "B", "name": "Berlin", "entityType": "place"}
            ],
            "relations": [
                {"fromEntityId": "A", "toEntityId": "B", "relationType": "visited"}
            ]
        }"#,
    )
    .unwrap();

    run(&data, &["import", "--user", "u", input.to_str().unwrap()]);

    let users = stdout_json(&run(&data, &["users"]));
    assert_eq!(users, serde_json::json!(["u"]));

    let hits = stdout_json(&run(&data, &["search", "--user", "u", "espresso"]));
    assert_eq!(hits[0]["entityId"], "A");

    let around = stdout_json(&run(&data, &["neighbors", "--user", "u", "A", "--depth", "1"]));
    assert_eq!(around["entities"].as_array().unwrap().len(), 2);
    assert_eq!(around["relations"][0]["relationId"], "A|visited|B");

    let summary = stdout_json(&run(&data, &["summary", "--user", "u"]));
    assert_eq!(summary["totalEntities"], 2);
    assert_eq!(summary["entityTypes"]["place"], 1);

    run(&data, &["delete-entity", "--user", "u", "B"]);
    let exported = stdout_json(&run(&data, &["export", "--user", "u"]));
    assert_eq!(exported["entities"].as_array().unwrap().len(), 1);
    assert!(exported["relations"].as_array().unwrap().is_empty());

    run(&data, &["clear", "--user", "u"]);
    let users = stdout_json(&run(&data, &["users"]));
    assert_eq!(users, serde_json::json!([]));
}
