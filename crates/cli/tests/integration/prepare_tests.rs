//! End-to-end prepare behavior through the binary.

use predicates::prelude::*;

use crate::common::TestEnv;

#[test]
fn prepare_is_idempotent_across_invocations() {
  let env = TestEnv::with_manifest("variables:\n  RIG_IT_GREETING:\n    default: hello\n");
  for _ in 0..2 {
    env
      .rig_cmd()
      .arg("prepare")
      .arg("--mode")
      .arg("non-interactive")
      .env_remove("RIG_IT_GREETING")
      .assert()
      .success()
      .stdout(predicate::str::contains("Project prepared"));
  }
}

#[test]
fn text_mode_stores_the_answered_value() {
  let env = TestEnv::with_manifest("variables:\n  - RIG_IT_ANSWERED\n");

  env
    .rig_cmd()
    .arg("prepare")
    .arg("--mode")
    .arg("text")
    .env_remove("RIG_IT_ANSWERED")
    .write_stdin("from-the-prompt\n")
    .assert()
    .success()
    .stdout(predicate::str::contains("RIG_IT_ANSWERED=from-the-prompt"));

  // The answer must persist, so a later non-interactive run also succeeds.
  assert!(env.local_state().contains("from-the-prompt"), "{}", env.local_state());
  env
    .rig_cmd()
    .arg("prepare")
    .arg("--mode")
    .arg("non-interactive")
    .env_remove("RIG_IT_ANSWERED")
    .assert()
    .success();
}

#[test]
fn text_mode_with_a_blank_answer_fails_like_non_interactive() {
  let env = TestEnv::with_manifest("variables:\n  - RIG_IT_BLANK\n");

  env
    .rig_cmd()
    .arg("prepare")
    .arg("--mode")
    .arg("text")
    .env_remove("RIG_IT_BLANK")
    .write_stdin("\n")
    .assert()
    .failure()
    .stderr(predicate::str::contains("RIG_IT_BLANK"));
}

#[test]
fn ambient_environment_satisfies_a_variable() {
  let env = TestEnv::with_manifest("variables:\n  - RIG_IT_AMBIENT\n");

  env
    .rig_cmd()
    .arg("prepare")
    .arg("--mode")
    .arg("non-interactive")
    .env("RIG_IT_AMBIENT", "already-there")
    .assert()
    .success()
    .stdout(predicate::str::contains("RIG_IT_AMBIENT=already-there"));
}
