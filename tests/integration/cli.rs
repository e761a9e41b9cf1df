use git_subrepo_testtools::cargo_bin_git_subrepo;
use predicates::prelude::*;

fn subrepo_anywhere(dir: &std::path::Path) -> assert_cmd::Command {
    cargo_bin_git_subrepo(dir)
}

#[test]
fn help_lists_the_subcommands() {
    let dir = tempfile::TempDir::new().unwrap();
    subrepo_anywhere(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("import")
                .and(predicate::str::contains("reimport"))
                .and(predicate::str::contains("delete"))
                .and(predicate::str::contains("tree")),
        );
}

#[test]
fn subcommand_help_is_available() {
    let dir = tempfile::TempDir::new().unwrap();
    subrepo_anywhere(dir.path())
        .args(["import", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--force"));
}

#[test]
fn completion_of_a_subcommand_prefix() {
    let dir = tempfile::TempDir::new().unwrap();
    subrepo_anywhere(dir.path())
        .args(["--_complete", "1", "git-subrepo", "im"])
        .assert()
        .success()
        .stdout("import\n");
}

#[test]
fn completion_of_an_empty_word_lists_subcommands() {
    let dir = tempfile::TempDir::new().unwrap();
    subrepo_anywhere(dir.path())
        .args(["--_complete", "1", "git-subrepo", ""])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("import\n")
                .and(predicate::str::contains("reimport\n"))
                .and(predicate::str::contains("delete\n"))
                .and(predicate::str::contains("tree\n")),
        );
}

#[test]
fn completion_of_flags_after_a_subcommand() {
    let dir = tempfile::TempDir::new().unwrap();
    subrepo_anywhere(dir.path())
        .args(["--_complete", "2", "git-subrepo", "import", "--f"])
        .assert()
        .success()
        .stdout("--force\n");
}

#[test]
fn completion_handles_a_double_dash_word() {
    let dir = tempfile::TempDir::new().unwrap();
    subrepo_anywhere(dir.path())
        .args(["--_complete", "2", "git-subrepo", "reimport", "--"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--branch\n").and(predicate::str::contains("--verbose\n")),
        );
}

#[test]
fn completion_without_candidates_exits_one() {
    let dir = tempfile::TempDir::new().unwrap();
    subrepo_anywhere(dir.path())
        .args(["--_complete", "1", "git-subrepo", "zzz"])
        .assert()
        .code(1)
        .stdout("");
}

#[test]
fn completion_ignores_words_after_the_cursor() {
    let dir = tempfile::TempDir::new().unwrap();
    subrepo_anywhere(dir.path())
        .args(["--_complete", "1", "git-subrepo", "im", "ignored", "words"])
        .assert()
        .success()
        .stdout("import\n");
}
