use std::{
    fs,
    path::{Path, PathBuf},
    process::{Command, Output},
};

fn write_config(dir: &Path, file_name: &str, name: &str, extra: &str) -> PathBuf {
    let data_dir = dir.join("data");
    fs::create_dir_all(&data_dir).expect("create data dir");

    let config_path = dir.join(file_name);
    fs::write(
        &config_path,
        format!(
            r#"
name = "{name}"
env = "dev"
sqlite_path = "{sqlite}"
pid = "{pid}"

[bind.http]
domain_name = "localhost"
ip = "127.0.0.1"
port = 39991

[observability.log]
output = "console"

[ledger]
backend = "static"

[[ledger.plans]]
tier = 1
duration_id = 1
duration_seconds = 2592000
price_minor_units = 1000000

{extra}
"#,
            sqlite = data_dir.display(),
            pid = dir.join("keygate.pid").display()
        ),
    )
    .expect("write config");

    config_path
}

fn write_valid_config(dir: &Path, file_name: &str) -> PathBuf {
    write_config(
        dir,
        file_name,
        "keygate-cli-test",
        r#"
[auth]
secret_salt = "0123456789abcdef0123456789abcdef"
admin_shared_key = "cli-admin-key"

[upstream]
endpoint = "http://127.0.0.1:1/v1/generate"
"#,
    )
}

/// 缺少上游与管理密钥：只产生告警
fn write_warning_only_config(dir: &Path, file_name: &str) -> PathBuf {
    write_config(
        dir,
        file_name,
        "keygate-cli-warning-test",
        r#"
[auth]
secret_salt = "0123456789abcdef0123456789abcdef"
"#,
    )
}

/// 没有 secret salt 的配置不能启动
fn write_validation_error_config(dir: &Path, file_name: &str) -> PathBuf {
    write_config(
        dir,
        file_name,
        "keygate-cli-validation-error-test",
        r#"
[auth]
admin_shared_key = "cli-admin-key"
"#,
    )
}

fn run_keygate(args: &[&str], current_dir: Option<&Path>) -> Output {
    let mut cmd = Command::new(PathBuf::from(env!("CARGO_BIN_EXE_keygate")));
    cmd.args(args);
    if let Some(dir) = current_dir {
        cmd.current_dir(dir);
    }
    cmd.output().expect("run keygate command")
}

#[test]
fn keygate_test_command_accepts_explicit_valid_config() {
    let temp = tempfile::tempdir().expect("temp dir");
    let config_path = write_valid_config(temp.path(), "valid.toml");
    let output = run_keygate(&["test", config_path.to_str().expect("utf8 path")], None);

    assert!(
        output.status.success(),
        "command should succeed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn keygate_test_command_finds_default_config_in_current_directory() {
    let temp = tempfile::tempdir().expect("temp dir");
    write_valid_config(temp.path(), "config.toml");
    let output = run_keygate(&["test"], Some(temp.path()));

    assert!(
        output.status.success(),
        "command should succeed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn keygate_test_command_succeeds_with_warning_only_config() {
    let temp = tempfile::tempdir().expect("temp dir");
    let config_path = write_warning_only_config(temp.path(), "warning.toml");
    let output = run_keygate(&["test", config_path.to_str().expect("utf8 path")], None);

    assert!(
        output.status.success(),
        "warning-only config should succeed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn keygate_test_command_fails_for_missing_custom_config_path() {
    let temp = tempfile::tempdir().expect("temp dir");
    let missing_path = temp.path().join("missing.toml");
    let output = run_keygate(&["test", missing_path.to_str().expect("utf8 path")], None);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "command should fail");
    assert!(
        stderr.contains("Config file not found"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn keygate_test_command_fails_when_no_default_config_exists() {
    let temp = tempfile::tempdir().expect("temp dir");
    let output = run_keygate(&["test"], Some(temp.path()));
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "command should fail");
    assert!(
        stderr.contains("No configuration file found"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn keygate_test_command_fails_for_invalid_config_content() {
    let temp = tempfile::tempdir().expect("temp dir");
    let bad_path = temp.path().join("bad.toml");
    fs::write(&bad_path, "name = \"broken\"\n[bind\n").expect("write invalid toml");

    let output = run_keygate(&["test", bad_path.to_str().expect("utf8 path")], None);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "command should fail");
    assert!(stderr.contains("Parse"), "unexpected stderr: {stderr}");
}

#[test]
fn keygate_test_command_fails_for_validation_errors() {
    let temp = tempfile::tempdir().expect("temp dir");
    let config_path = write_validation_error_config(temp.path(), "validation-error.toml");
    let output = run_keygate(&["test", config_path.to_str().expect("utf8 path")], None);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "command should fail");
    assert!(stderr.contains("Validation"), "unexpected stderr: {stderr}");
}

#[test]
fn keygate_run_mode_fails_for_missing_custom_config_flag() {
    let temp = tempfile::tempdir().expect("temp dir");
    let missing_path = temp.path().join("missing-run.toml");
    let output = run_keygate(
        &["--config", missing_path.to_str().expect("utf8 path")],
        None,
    );
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "run mode should fail");
    assert!(
        stderr.contains("Config file not found"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn keygate_run_mode_fails_for_validation_errors() {
    let temp = tempfile::tempdir().expect("temp dir");
    let config_path = write_validation_error_config(temp.path(), "run-validation-error.toml");
    let output = run_keygate(
        &["--config", config_path.to_str().expect("utf8 path")],
        None,
    );
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "run mode should fail");
    assert!(
        stderr.contains("auth.secret_salt"),
        "unexpected stderr: {stderr}"
    );
    // 校验失败时不应写出 PID 文件
    assert!(!temp.path().join("keygate.pid").exists());
}

#[test]
fn keygate_test_command_accepts_shipped_example_config() {
    let example = Path::new(env!("CARGO_MANIFEST_DIR")).join("config.example.toml");
    let output = run_keygate(&["test", example.to_str().expect("utf8 path")], None);

    assert!(
        output.status.success(),
        "example config should validate, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}
