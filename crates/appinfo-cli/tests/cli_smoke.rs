use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

struct TempHome {
    path: PathBuf,
}

impl TempHome {
    fn new(name: &str) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock error")
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "appinfo-cli-tests-{}-{}-{}",
            name,
            std::process::id(),
            timestamp
        ));
        fs::create_dir_all(&path).expect("failed to create temp HOME");
        Self { path }
    }

    fn db_path(&self) -> PathBuf {
        self.path.join("appinfo.db")
    }

    fn list_path(&self) -> PathBuf {
        self.path.join("packages.txt")
    }

    /// Writes a config selecting the `list` backend over `packages`.
    fn with_list_backend(self, packages: &[&str]) -> Self {
        fs::write(self.list_path(), packages.join("\n")).expect("failed to write package list");
        let config_dir = self.path.join(".config").join("appinfo");
        fs::create_dir_all(&config_dir).expect("failed to create config dir");
        let config = format!(
            "[store]\npath = {:?}\n\n[backend]\ndefault = \"list\"\nlist_file = {:?}\n",
            self.db_path().display().to_string(),
            self.list_path().display().to_string()
        );
        fs::write(config_dir.join("config.toml"), config).expect("failed to write config");
        self
    }
}

impl Drop for TempHome {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

fn appinfo(home: &TempHome, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_appinfo"))
        .args(args)
        .current_dir(&home.path)
        .env("HOME", &home.path)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run appinfo")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn help_lists_maintenance_and_read_commands() {
    let home = TempHome::new("help");
    let output = appinfo(&home, &["--help"]);

    assert!(output.status.success(), "appinfo --help should succeed");
    let text = stdout(&output);
    for command in ["create", "sync", "rate", "reset", "score", "id"] {
        assert!(
            text.contains(command),
            "help should list {}, got:\n{}",
            command,
            text
        );
    }
}

#[test]
fn unknown_backend_fails_immediately() {
    let home = TempHome::new("unknown-backend");
    let output = appinfo(&home, &["--backend", "portage", "score", "vim"]);

    assert!(!output.status.success());
    assert!(
        stderr(&output).contains("Selected PMS (portage) is not available yet."),
        "got:\n{}",
        stderr(&output)
    );
}

#[test]
fn commands_before_create_report_missing_database() {
    let home = TempHome::new("missing-db").with_list_backend(&["vim"]);
    let output = appinfo(&home, &["sync"]);

    assert!(!output.status.success());
    assert!(
        stderr(&output).contains("No such DB"),
        "got:\n{}",
        stderr(&output)
    );
    assert!(!home.db_path().exists());
}

#[test]
fn create_sync_rate_and_score_round_trip() {
    let home = TempHome::new("round-trip").with_list_backend(&["vim", "emacs"]);

    let output = appinfo(&home, &["create"]);
    assert!(output.status.success(), "create failed:\n{}", stderr(&output));
    assert!(stdout(&output).contains("DB created successfully."));

    let output = appinfo(&home, &["sync"]);
    assert!(output.status.success(), "sync failed:\n{}", stderr(&output));
    assert!(stdout(&output).contains("2 package inserted."));

    let output = appinfo(&home, &["sync"]);
    assert!(stdout(&output).contains("0 package inserted."));

    let output = appinfo(&home, &["score", "vim"]);
    assert_eq!(stdout(&output).trim(), "1");

    let output = appinfo(&home, &["rate", "vim", "3"]);
    assert!(output.status.success(), "rate failed:\n{}", stderr(&output));
    assert!(stdout(&output).contains("vim score=3 ratings=1"));

    appinfo(&home, &["rate", "vim", "1"]);
    let output = appinfo(&home, &["score", "vim"]);
    assert_eq!(stdout(&output).trim(), "2");

    let output = appinfo(&home, &["rate", "vim", "9"]);
    assert!(stdout(&output).contains("vim score=9 ratings=3"));
}

#[test]
fn verbose_names_the_package_source() {
    let home = TempHome::new("verbose").with_list_backend(&["vim"]);
    let output = appinfo(&home, &["-v", "create"]);

    assert!(output.status.success(), "create failed:\n{}", stderr(&output));
    assert!(
        stderr(&output).contains("package source: list"),
        "got:\n{}",
        stderr(&output)
    );
}

#[test]
fn rating_unknown_package_fails() {
    let home = TempHome::new("rate-unknown").with_list_backend(&["vim"]);
    appinfo(&home, &["create"]);
    appinfo(&home, &["sync"]);

    let output = appinfo(&home, &["rate", "nano", "4"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Package nano does not exist"));

    let output = appinfo(&home, &["id", "nano"]);
    assert!(!output.status.success());
}

#[test]
fn create_twice_keeps_database_unless_forced() {
    let home = TempHome::new("create-twice").with_list_backend(&["vim"]);
    appinfo(&home, &["create"]);
    appinfo(&home, &["sync"]);

    let output = appinfo(&home, &["create"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("DB already exists."));
    let output = appinfo(&home, &["list"]);
    assert!(stdout(&output).contains("vim"));

    let output = appinfo(&home, &["create", "--force"]);
    assert!(output.status.success(), "forced create failed:\n{}", stderr(&output));
    assert!(home.path.join("appinfo.db.backup").exists());
    let output = appinfo(&home, &["list"]);
    assert!(stdout(&output).contains("no packages stored"));
}

#[test]
fn reset_and_json_listing() {
    let home = TempHome::new("reset").with_list_backend(&["vim", "emacs"]);
    appinfo(&home, &["create"]);
    appinfo(&home, &["sync"]);
    appinfo(&home, &["rate", "vim", "5"]);
    appinfo(&home, &["rate", "emacs", "4"]);

    let output = appinfo(&home, &["reset", "vim"]);
    assert!(stdout(&output).contains("All scores reset."));
    assert_eq!(stdout(&appinfo(&home, &["score", "vim"])).trim(), "1");
    assert_eq!(stdout(&appinfo(&home, &["score", "emacs"])).trim(), "4");

    appinfo(&home, &["reset"]);
    let output = appinfo(&home, &["list", "--json"]);
    let records: serde_json::Value =
        serde_json::from_str(&stdout(&output)).expect("list --json should print json");
    let records = records.as_array().expect("expected a json array");
    assert_eq!(records.len(), 2);
    for record in records {
        assert_eq!(record["score"], 0);
        assert_eq!(record["nose"], 0);
    }
}
