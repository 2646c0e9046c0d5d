// Command-line behaviour of the `selrule` binary against the fixture rules.
// Requires: assert_cmd, predicates crates in [dev-dependencies]

use assert_cmd::Command;
use predicates::{prelude::PredicateBooleanExt, str::contains};

const DATA: &str = "tests/fixtures/projects.json";
const RULES: &str = "tests/fixtures/rules/deliverables.sel";

fn selrule() -> Command {
    let mut cmd = Command::cargo_bin("selrule").unwrap();
    cmd.env_remove("SELRULE_LOG");
    cmd
}

#[test]
fn verify_walks_a_directory() {
    selrule()
        .args(["verify", "tests/fixtures/rules", "--data", DATA])
        .assert()
        .success()
        .stdout(contains("2 file(s) verified, 0 error(s), 0 warning(s)"));
}

#[test]
fn verify_reports_positions_and_fails() {
    selrule()
        .args(["verify", "tests/fixtures/broken.sel", "--data", DATA])
        .assert()
        .failure()
        .stderr(contains("broken.sel:2:5: error:").and(contains("'MISSING'")))
        .stdout(contains("1 error(s)"));
}

#[test]
fn verify_without_data_cannot_resolve_objects() {
    selrule()
        .args(["verify", RULES])
        .assert()
        .failure()
        .stderr(contains("not found in any registered data engine"));
}

#[test]
fn ast_prints_the_tree_as_json() {
    selrule()
        .args(["ast", RULES, "--data", DATA])
        .assert()
        .success()
        .stdout(contains("\"source\"").and(contains("KICKOFF")).and(contains("\"node\": \"compare\"")));
}

#[test]
fn scopes_show_modules_rules_and_blocks() {
    selrule()
        .args(["scopes", RULES, "--data", DATA])
        .assert()
        .success()
        .stdout(contains("\"REPORTS.BY_ID\"").and(contains("\"REPORTS.DUE_AFTER.BLOCK1\"")));
}

#[test]
fn run_prints_selected_records() {
    selrule()
        .args(["run", RULES, "--data", DATA, "--rule", "by_id", "101"])
        .assert()
        .success()
        .stdout(contains("\"TITLE\": \"Review\"").and(contains("Kickoff").not()));
}

#[test]
fn run_takes_plain_text_arguments() {
    selrule()
        .args(["run", RULES, "--data", DATA, "--rule", "reports.due_after", "2024-04-01"])
        .assert()
        .success()
        .stdout(contains("Launch").and(contains("Review").not()));
}

#[test]
fn run_rejects_a_wrong_argument_count() {
    selrule()
        .args(["run", RULES, "--data", DATA, "--rule", "by_id"])
        .assert()
        .failure()
        .stderr(contains("BY_ID").and(contains("expected 1, got 0")));
}

#[test]
fn missing_files_are_reported() {
    selrule()
        .args(["ast", "tests/fixtures/nothing_here.sel"])
        .assert()
        .failure()
        .stderr(contains("nothing_here.sel"));
}
