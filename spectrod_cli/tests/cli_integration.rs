use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::tempdir;

fn write_config(dir: &tempfile::TempDir) -> PathBuf {
    let data_dir = dir.path().join("data");
    std::fs::create_dir_all(&data_dir).expect("data dir");
    let toml = format!(
        r#"
[hardware]
driver_path = "/tmp"
data_dir = "{}"

[defaults]
exposure_secs = 0.005
interval_secs = 0.0
acquisition_mode = 1
series_length = 2
accumulation_count = 1
target_temperature_c = -20
target_intensity = 30000
"#,
        data_dir.display()
    );
    let path = dir.path().join("spectrod.toml");
    let mut f = std::fs::File::create(&path).expect("config file");
    f.write_all(toml.as_bytes()).expect("write config");
    path
}

fn spectrod() -> Command {
    Command::cargo_bin("spectrod").expect("binary built")
}

#[test]
fn help_succeeds() {
    spectrod()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Spectrum acquisition daemon"));
}

#[test]
fn missing_config_fails_nonzero() {
    spectrod()
        .args(["--config", "/nonexistent/spectrod.toml", "--check"])
        .assert()
        .failure();
}

#[rstest::rstest]
#[case("[defaults]\nexposure_secs = -1.0\n", "exposure_secs")]
#[case("[defaults]\nacquisition_mode = 9\n", "acquisition_mode")]
#[case("[publish]\nperiod_ms = 0\n", "period_ms")]
fn invalid_config_fails_validation(#[case] toml: &str, #[case] hint: &str) {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, toml).expect("write");
    spectrod()
        .args(["--config"])
        .arg(&path)
        .arg("--check")
        .assert()
        .failure()
        .stderr(predicate::str::contains(hint));
}

#[test]
fn check_accepts_a_valid_config() {
    let dir = tempdir().expect("tempdir");
    let config = write_config(&dir);
    spectrod()
        .args(["--config"])
        .arg(&config)
        .arg("--check")
        .assert()
        .success()
        .stdout(predicate::str::contains("config ok"));
}

#[test]
fn command_session_activate_start_exit() {
    let dir = tempdir().expect("tempdir");
    let config = write_config(&dir);
    spectrod()
        .args(["--config"])
        .arg(&config)
        .write_stdin("activate\nstartAcquisition\nexit\n")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("ok seq=1")
                .and(predicate::str::contains("exiting")),
        );
}

#[test]
fn unknown_commands_do_not_kill_the_loop() {
    let dir = tempdir().expect("tempdir");
    let config = write_config(&dir);
    spectrod()
        .args(["--config"])
        .arg(&config)
        .write_stdin("fire\nactivate\nexit\n")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("error: unknown command")
                .and(predicate::str::contains("exiting")),
        );
}

#[test]
fn empty_log_is_reported_as_such() {
    let dir = tempdir().expect("tempdir");
    let config = write_config(&dir);
    spectrod()
        .args(["--config"])
        .arg(&config)
        .write_stdin("activate\ngetLastSpectrum\nexit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("no spectra recorded today"));
}

#[test]
fn json_mode_emits_parseable_replies() {
    let dir = tempdir().expect("tempdir");
    let config = write_config(&dir);
    let output = spectrod()
        .args(["--config"])
        .arg(&config)
        .arg("--json")
        .write_stdin("activate\nexit\n")
        .output()
        .expect("run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut saw_ok = false;
    for line in stdout.lines().filter(|l| !l.is_empty()) {
        let v: serde_json::Value = serde_json::from_str(line)
            .unwrap_or_else(|e| panic!("non-JSON line {line:?}: {e}"));
        if v["type"] == "reply" && v["status"] == "ok" {
            saw_ok = true;
        }
    }
    assert!(saw_ok, "no ok reply in output:\n{stdout}");
}
