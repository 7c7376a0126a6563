mod support;

use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;

use support::{TestWc, URL};

fn bin() -> Command {
    let mut cmd = Command::cargo_bin("svnctx").expect("binary");
    cmd.env_remove("SVNCTX_CONFIG")
        .env_remove("SVNCTX_NON_INTERACTIVE")
        .env_remove("USER")
        .env_remove("USERNAME");
    cmd
}

fn json_output(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("run svnctx");
    serde_json::from_slice(&output.stdout).expect("json stdout")
}

#[test]
fn svnctx_help_works() {
    bin()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("working-copy locks"));
}

#[test]
fn subcommand_help_works() {
    for cmd in ["init", "lock", "locked", "cleanup", "auth"] {
        bin().arg(cmd).arg("--help").assert().success();
    }
}

#[test]
fn init_creates_then_reports_nothing_to_do() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let target = dir.path().join("checkout");

    let first = json_output(
        bin()
            .args(["init", "--json", "--url", URL, "--revision", "12"])
            .arg(&target),
    );
    assert_eq!(first["schema_version"], "svnctx.v1");
    assert_eq!(first["command"], "init");
    assert_eq!(first["status"], "success");
    assert_eq!(first["data"]["created"], true);
    assert_eq!(first["data"]["revision"], 12);
    assert!(svnctx::wc::is_working_copy(&target));

    bin()
        .args(["init", "--url", URL])
        .arg(&target)
        .assert()
        .success()
        .stdout(contains("nothing to do"));

    bin()
        .args(["init", "--url", "svn://example.com/other"])
        .arg(&target)
        .assert()
        .code(2);
    Ok(())
}

#[test]
fn lock_reports_hierarchy_and_releases() -> Result<(), Box<dyn std::error::Error>> {
    let test = TestWc::tree()?;

    let value = json_output(
        bin()
            .args(["lock", "--json", "--write", "--depth", "immediates"])
            .arg(test.root()),
    );
    assert_eq!(value["status"], "success");
    assert_eq!(value["data"]["depth"], "immediates");
    assert_eq!(value["data"]["write_lock"], true);
    assert_eq!(value["data"]["locked"].as_array().map(Vec::len), Some(3));
    assert!(!test.has_lock_file(""));

    let file = json_output(
        bin()
            .args(["lock", "--json"])
            .arg(test.path("a/notes.txt")),
    );
    assert_eq!(
        file["data"]["root"],
        test.path("a").display().to_string()
    );
    assert_eq!(file["data"]["locked"].as_array().map(Vec::len), Some(1));
    Ok(())
}

#[test]
fn lock_errors_use_exit_codes() -> Result<(), Box<dyn std::error::Error>> {
    let test = TestWc::tree()?;

    bin()
        .args(["lock", "--depth", "sideways"])
        .arg(test.root())
        .assert()
        .code(2)
        .stderr(contains("Invalid depth"));

    let value = json_output(bin().args(["lock", "--json"]).arg(test.outside()));
    assert_eq!(value["status"], "error");
    assert_eq!(value["error"]["kind"], "user_error");
    assert_eq!(value["error"]["code"], 2);
    Ok(())
}

#[test]
fn locked_and_cleanup_handle_stale_locks() -> Result<(), Box<dyn std::error::Error>> {
    let test = TestWc::tree()?;
    std::fs::write(svnctx::wc::lock_file(&test.path("b")), "")?;

    let locked = json_output(bin().args(["locked", "--json"]).arg(test.path("b")));
    assert_eq!(locked["data"]["locked"], false);

    bin()
        .arg("locked")
        .arg(test.path("b"))
        .assert()
        .success()
        .stdout(contains("stale lock file present"));

    let cleaned = json_output(bin().args(["cleanup", "--json"]).arg(test.root()));
    assert_eq!(
        cleaned["data"]["removed"],
        serde_json::json!([test.path("b").display().to_string()])
    );
    assert!(!test.has_lock_file("b"));
    Ok(())
}

#[test]
fn auth_resolves_from_config_without_prompting() -> Result<(), Box<dyn std::error::Error>> {
    let test = TestWc::init()?;
    let config = test.write_config(
        "[auth]\nusername = \"dave\"\npassword = \"top-secret\"\n",
    )?;

    let output = bin()
        .args(["auth", "--json", "--non-interactive", "--config"])
        .arg(&config)
        .arg("<svn://example.com:3690> repo")
        .output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    assert!(!stdout.contains("top-secret"));

    let value: Value = serde_json::from_str(&stdout)?;
    assert_eq!(value["data"]["username"], "dave");
    assert_eq!(value["data"]["kind"], "svn.simple");
    assert_eq!(value["data"]["providers"], 1);
    Ok(())
}

#[test]
fn auth_prompts_on_stdin() -> Result<(), Box<dyn std::error::Error>> {
    let test = TestWc::init()?;
    let config = test.write_config("[session]\nretry_limit = 1\n")?;

    let value = json_output(
        bin()
            .args(["auth", "--json", "--kind", "username", "--config"])
            .arg(&config)
            .arg("realm")
            .write_stdin("\nerin\n"),
    );
    assert_eq!(value["status"], "success", "{value}");
    assert_eq!(value["data"]["username"], "erin");
    assert_eq!(value["data"]["providers"], 2);
    Ok(())
}

#[test]
fn auth_password_prompt_never_reaches_output() -> Result<(), Box<dyn std::error::Error>> {
    let test = TestWc::init()?;
    let config = test.write_config("[session]\nretry_limit = 0\n")?;

    let output = bin()
        .args(["auth", "--json", "--config"])
        .arg(&config)
        .arg("realm")
        .write_stdin("quinn\nsw0rdfish\n")
        .output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    let stderr = String::from_utf8(output.stderr)?;
    assert!(!stdout.contains("sw0rdfish"));
    assert!(!stderr.contains("sw0rdfish"));
    assert!(stderr.contains("Password for 'quinn'"));

    let value: Value = serde_json::from_str(&stdout)?;
    assert_eq!(value["data"]["username"], "quinn");
    assert_eq!(value["data"]["kind"], "svn.simple");
    Ok(())
}

#[test]
fn auth_without_credentials_fails() -> Result<(), Box<dyn std::error::Error>> {
    let test = TestWc::init()?;
    let config = test.write_config("[session]\nnon_interactive = true\n")?;

    bin()
        .args(["auth", "--config"])
        .arg(&config)
        .arg("realm")
        .assert()
        .code(4)
        .stderr(contains("No svn.simple credential available"));
    Ok(())
}

#[test]
fn invalid_config_is_a_user_error() -> Result<(), Box<dyn std::error::Error>> {
    let test = TestWc::init()?;
    let config = test.write_config("[auth]\nssl_trusted_failures = [\"bogus\"]\n")?;

    bin()
        .args(["auth", "--config"])
        .arg(&config)
        .arg("realm")
        .assert()
        .code(2)
        .stderr(contains("hint: fix svnctx.toml then retry"));
    Ok(())
}
