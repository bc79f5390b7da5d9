//! `rig run`: prepare plus command execution.

#![cfg(unix)]

use predicates::prelude::*;

use crate::common::TestEnv;

#[test]
fn run_executes_with_the_prepared_environment() {
  let env = TestEnv::with_manifest(concat!(
    "variables:\n",
    "  RIG_RUN_GREETING:\n",
    "    default: hi\n",
    "commands:\n",
    "  greet:\n",
    "    unix: echo \"hello $RIG_RUN_GREETING\"\n",
  ));

  env
    .rig_cmd()
    .arg("run")
    .arg("greet")
    .arg("--mode")
    .arg("non-interactive")
    .env_remove("RIG_RUN_GREETING")
    .assert()
    .success()
    .stdout(predicate::str::contains("hello hi"));
}

#[test]
fn run_defaults_to_the_default_command() {
  let env = TestEnv::with_manifest("commands:\n  default:\n    unix: echo default-ran\n");

  env
    .rig_cmd()
    .arg("run")
    .arg("--mode")
    .arg("non-interactive")
    .assert()
    .success()
    .stdout(predicate::str::contains("default-ran"));
}

#[test]
fn run_propagates_the_exit_code() {
  let env = TestEnv::with_manifest("commands:\n  flaky:\n    unix: exit 3\n");

  env
    .rig_cmd()
    .arg("run")
    .arg("flaky")
    .arg("--mode")
    .arg("non-interactive")
    .assert()
    .code(3);
}

#[test]
fn run_unknown_command_fails_before_preparing() {
  let env = TestEnv::with_manifest("name: runner\n");

  env
    .rig_cmd()
    .arg("run")
    .arg("missing")
    .assert()
    .failure()
    .stderr(predicate::str::contains("'missing' not found"));
}

#[test]
fn run_refuses_when_prepare_fails() {
  let env = TestEnv::with_manifest(concat!(
    "variables:\n",
    "  - RIG_RUN_REQUIRED\n",
    "commands:\n",
    "  greet:\n",
    "    unix: echo hello\n",
  ));

  env
    .rig_cmd()
    .arg("run")
    .arg("greet")
    .arg("--mode")
    .arg("non-interactive")
    .env_remove("RIG_RUN_REQUIRED")
    .assert()
    .failure()
    .stderr(predicate::str::contains("Unable to prepare the project."));
}
