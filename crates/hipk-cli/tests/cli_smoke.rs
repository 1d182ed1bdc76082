use assert_cmd::Command;

const ENTRY_POINT: &str = "AMax_Ti_S_To_S_W_256_C_4";

fn hipk(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("hipk").unwrap();
    cmd.current_dir(dir.path()).env("RUST_LOG", "warn");
    for (key, _) in std::env::vars() {
        if key.starts_with("HIPK_") {
            cmd.env_remove(key);
        }
    }
    cmd
}

fn write_artifact(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("amax.co");
    let mut image = b"\x7fELF\0".to_vec();
    image.extend_from_slice(ENTRY_POINT.as_bytes());
    image.push(0);
    std::fs::write(&path, image).unwrap();
    path
}

#[test]
fn help_works() {
    let dir = tempfile::tempdir().unwrap();
    hipk(&dir).arg("--help").assert().success();
}

#[test]
fn version_works() {
    let dir = tempfile::tempdir().unwrap();
    hipk(&dir).arg("--version").assert().success();
}

#[test]
fn help_mentions_core_subcommands() {
    let dir = tempfile::tempdir().unwrap();
    let out = hipk(&dir).arg("--help").assert().success().get_output().stdout.clone();
    let s = String::from_utf8(out).unwrap();
    for needle in ["run", "info", "config", "--config"] {
        assert!(s.contains(needle), "help missing `{needle}`");
    }
}

#[test]
fn invalid_command_fails() {
    let dir = tempfile::tempdir().unwrap();
    hipk(&dir).arg("nonexistent-command").assert().failure();
}

#[test]
fn emulated_run_passes() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact(&dir);
    let out = hipk(&dir)
        .args(["run", "--backend", "emulated", "--artifact"])
        .arg(&artifact)
        .assert()
        .code(0)
        .get_output()
        .stdout
        .clone();
    let s = String::from_utf8(out).unwrap();
    assert!(s.contains("PASS"), "{s}");
    assert!(s.contains("0.8"), "{s}");
}

#[test]
fn missing_artifact_exits_with_device_code() {
    let dir = tempfile::tempdir().unwrap();
    let out = hipk(&dir)
        .args(["run", "--backend", "emulated", "--artifact", "missing.co"])
        .assert()
        .code(3)
        .get_output()
        .stderr
        .clone();
    let s = String::from_utf8(out).unwrap();
    assert!(s.contains("HIP status: 301"), "{s}");
}

#[test]
fn invalid_problem_size_is_generic_failure() {
    let dir = tempfile::tempdir().unwrap();
    hipk(&dir).args(["run", "--backend", "emulated", "-m", "0"]).assert().code(1);
}

#[test]
fn config_show_prints_toml() {
    let dir = tempfile::tempdir().unwrap();
    let out = hipk(&dir).args(["config", "show"]).assert().success().get_output().stdout.clone();
    let s = String::from_utf8(out).unwrap();
    assert!(s.contains("[problem]"), "{s}");
    assert!(s.contains(ENTRY_POINT), "{s}");
}

#[test]
fn config_file_is_picked_up_from_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hipk.toml"), "[problem]\nm = 17\n").unwrap();
    let out = hipk(&dir).args(["config", "show"]).assert().success().get_output().stdout.clone();
    let s = String::from_utf8(out).unwrap();
    assert!(s.contains("m = 17"), "{s}");
}
