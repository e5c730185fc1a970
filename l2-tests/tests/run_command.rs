use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

fn jobflow_cmd() -> Command {
    Command::cargo_bin("jobflow").unwrap()
}

#[test]
fn test_run_single_job_prints_its_output() {
    let dir = tempdir().unwrap();
    let flow_file = dir.path().join("add.json");
    fs::write(
        &flow_file,
        r#"{
            "uuid": "11111111-1111-1111-1111-111111111111",
            "name": "add-two",
            "children": [
                {
                    "kind": "job",
                    "uuid": "22222222-2222-2222-2222-222222222222",
                    "index": 1,
                    "name": "sum",
                    "callable": "add",
                    "args": [3, 4]
                }
            ]
        }"#,
    )
    .unwrap();

    jobflow_cmd()
        .arg("run")
        .arg(&flow_file)
        .assert()
        .success()
        .stdout(predicate::str::contains("done").and(predicate::str::contains("7.0")));
}

#[test]
fn test_run_with_dependent_jobs_resolves_the_reference() {
    let dir = tempdir().unwrap();
    let flow_file = dir.path().join("chain.json");
    fs::write(
        &flow_file,
        r#"{
            "uuid": "33333333-3333-3333-3333-333333333333",
            "name": "chain",
            "children": [
                {
                    "kind": "job",
                    "uuid": "44444444-4444-4444-4444-444444444444",
                    "index": 1,
                    "name": "a",
                    "callable": "add",
                    "args": [1, 2]
                },
                {
                    "kind": "job",
                    "uuid": "55555555-5555-5555-5555-555555555555",
                    "index": 1,
                    "name": "b",
                    "callable": "add",
                    "args": [
                        {
                            "@module": "jobflow",
                            "@class": "OutputReference",
                            "uuid": "44444444-4444-4444-4444-444444444444",
                            "attributes": []
                        },
                        10
                    ]
                }
            ]
        }"#,
    )
    .unwrap();

    jobflow_cmd()
        .arg("run")
        .arg(&flow_file)
        .assert()
        .success()
        .stdout(predicate::str::contains("13.0"));
}

#[test]
fn test_run_unknown_callable_fails_the_process_but_still_prints_the_report() {
    let dir = tempdir().unwrap();
    let flow_file = dir.path().join("bad.json");
    fs::write(
        &flow_file,
        r#"{
            "uuid": "66666666-6666-6666-6666-666666666666",
            "name": "broken",
            "children": [
                {
                    "kind": "job",
                    "uuid": "77777777-7777-7777-7777-777777777777",
                    "index": 1,
                    "name": "nope",
                    "callable": "does-not-exist",
                    "args": []
                }
            ]
        }"#,
    )
    .unwrap();

    jobflow_cmd()
        .arg("run")
        .arg(&flow_file)
        .assert()
        .failure()
        .stdout(predicate::str::contains("failed"));
}

#[test]
fn test_run_rejects_a_flow_file_with_an_unrecognized_extension() {
    let dir = tempdir().unwrap();
    let flow_file = dir.path().join("flow.txt");
    fs::write(&flow_file, "{}").unwrap();

    jobflow_cmd().arg("run").arg(&flow_file).assert().failure();
}
