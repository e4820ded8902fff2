#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;

fn cirrus() -> Command {
    let mut cmd = Command::cargo_bin("cirrus").unwrap();
    // 実行環境の認証情報を拾わない
    for var in [
        "AZURE_TENANT_ID",
        "AZURE_CLIENT_ID",
        "AZURE_CLIENT_SECRET",
        "AZURE_SUBSCRIPTION_ID",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

/// CLIヘルプが正しく表示されることを確認
#[test]
fn test_cli_help() {
    cirrus()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("application-gateway"))
        .stdout(predicate::str::contains("find"))
        .stdout(predicate::str::contains("types"));
}

/// バージョン表示
#[test]
fn test_cli_version() {
    cirrus()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("cirrus"));
}

/// 認証情報なしで実行できる
#[test]
fn test_types() {
    cirrus()
        .arg("types")
        .assert()
        .success()
        .stdout(predicate::str::contains("cdn-endpoint"))
        .stdout(predicate::str::contains("application-gateway"))
        .stdout(predicate::str::contains("dns-record-set"));
}

#[test]
fn test_gateway_help_lists_certificate_commands() {
    cirrus()
        .args(["application-gateway", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("add-certificate"))
        .stdout(predicate::str::contains("import-certificate"))
        .stdout(predicate::str::contains("list-certificate"))
        .stdout(predicate::str::contains("remove-certificate"));
}

#[test]
fn test_add_certificate_help() {
    cirrus()
        .args(["application-gateway", "add-certificate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<PFX_PATH>"))
        .stdout(predicate::str::contains("--password"));
}

#[test]
fn test_remove_certificate_requires_name() {
    cirrus()
        .args(["application-gateway", "remove-certificate", "rg", "agw"])
        .assert()
        .failure();
}

/// PFX が無ければ認証やパスワード入力の前に失敗する
#[test]
fn test_add_certificate_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    cirrus()
        .current_dir(dir.path())
        .args([
            "application-gateway",
            "add-certificate",
            "rg",
            "agw",
            "site",
            "missing.pfx",
            "--password",
            "x",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.pfx"));
}

/// 認証情報が見つからない場合はエラー
#[test]
fn test_find_without_credentials() {
    let dir = tempfile::tempdir().unwrap();
    cirrus()
        .current_dir(dir.path())
        .env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .env("CIRRUS_CREDENTIALS_PATH", dir.path().join("none.yaml"))
        .args(["find", "disk"])
        .assert()
        .failure();
}

#[test]
fn test_invalid_command() {
    cirrus().arg("invalid-command").assert().failure();
}
