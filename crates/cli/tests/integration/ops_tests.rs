//! Manifest-editing commands, exercised through the binary.

use predicates::prelude::*;

use crate::common::TestEnv;

#[test]
fn add_variable_lands_in_the_manifest() {
  let env = TestEnv::with_manifest("name: ops\n");

  env
    .rig_cmd()
    .arg("add-variable")
    .arg("DB_USERNAME")
    .arg("--default")
    .arg("guest")
    .assert()
    .success()
    .stdout(predicate::str::contains("Added variable DB_USERNAME"));

  let manifest = env.manifest();
  assert!(manifest.contains("DB_USERNAME"), "{}", manifest);
  assert!(manifest.contains("guest"), "{}", manifest);
}

#[test]
fn remove_variable_clears_the_manifest() {
  let env = TestEnv::with_manifest("name: ops\nvariables:\n  - DB_USERNAME\n");

  env.rig_cmd().arg("remove-variable").arg("DB_USERNAME").assert().success();

  assert!(!env.manifest().contains("DB_USERNAME"), "{}", env.manifest());
}

#[test]
fn add_download_rolls_back_when_the_fetch_fails() {
  let env = TestEnv::with_manifest("name: ops\n");

  // Port 1 refuses immediately; the edit must not survive the failure.
  env
    .rig_cmd()
    .arg("add-download")
    .arg("MYDATA")
    .arg("http://127.0.0.1:1/data.csv")
    .assert()
    .failure()
    .stderr(predicate::str::contains("prepare failed"));

  assert!(!env.manifest().contains("MYDATA"), "{}", env.manifest());
}

#[test]
fn remove_download_requires_the_declaration() {
  let env = TestEnv::with_manifest("name: ops\n");

  env
    .rig_cmd()
    .arg("remove-download")
    .arg("MYDATA")
    .assert()
    .failure()
    .stderr(predicate::str::contains("MYDATA not found"));
}

#[test]
fn command_lifecycle_through_the_cli() {
  let env = TestEnv::with_manifest("name: ops\n");

  env
    .rig_cmd()
    .arg("add-command")
    .arg("analyze")
    .arg("python analyze.py")
    .assert()
    .success();
  assert!(env.manifest().contains("python analyze.py"), "{}", env.manifest());

  env
    .rig_cmd()
    .arg("update-command")
    .arg("analyze")
    .arg("python analyze.py --fast")
    .assert()
    .success();
  assert!(env.manifest().contains("--fast"), "{}", env.manifest());

  env.rig_cmd().arg("remove-command").arg("analyze").assert().success();
  assert!(!env.manifest().contains("analyze"), "{}", env.manifest());
}

#[test]
fn add_packages_to_a_missing_spec_fails() {
  let env = TestEnv::with_manifest("name: ops\n");

  env
    .rig_cmd()
    .arg("add-packages")
    .arg("numpy")
    .arg("--env-spec")
    .arg("training")
    .assert()
    .failure()
    .stderr(predicate::str::contains("training doesn't exist"));
}

#[test]
fn remove_service_not_declared_fails() {
  let env = TestEnv::with_manifest("name: ops\n");

  env
    .rig_cmd()
    .arg("remove-service")
    .arg("redis")
    .assert()
    .failure()
    .stderr(predicate::str::contains("'redis' not found"));
}
