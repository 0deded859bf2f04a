//! End-to-end tests for the `expipe` binary: layered config on disk plus
//! plugin executables on an isolated `PATH`.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Sandbox {
    tmp: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let sb = Self { tmp: TempDir::new().unwrap() };
        fs::create_dir_all(sb.config_dir()).unwrap();
        fs::create_dir_all(sb.bin()).unwrap();
        fs::create_dir_all(sb.outside()).unwrap();
        sb
    }

    fn config_dir(&self) -> PathBuf { self.tmp.path().join("config") }
    fn bin(&self) -> PathBuf { self.tmp.path().join("bin") }
    fn outside(&self) -> PathBuf { self.tmp.path().join("outside") }

    fn project(&self, name: &str, yaml: &str) -> PathBuf {
        let root = self.tmp.path().join("work").join(name);
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("expipe.yaml"), yaml).unwrap();
        root
    }

    fn expipe(&self, cwd: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("expipe");
        cmd.current_dir(cwd)
            .env("EXPIPE_CONFIG_DIR", self.config_dir())
            .env("PATH", self.bin())
            .env_remove("RUST_LOG");
        cmd
    }
}

mod config_resolution {
    use super::*;

    #[test]
    fn help_lists_builtin_commands() {
        let sb = Sandbox::new();
        sb.expipe(&sb.outside())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("config").and(predicate::str::contains("status")));
    }

    #[test]
    fn status_from_nested_directory_finds_project() {
        let sb = Sandbox::new();
        let root = sb.project("proj", "type: project\n");
        let nested = root.join("sub").join("dir");
        fs::create_dir_all(&nested).unwrap();

        sb.expipe(&nested)
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("project: proj"))
            .stdout(predicate::str::contains("type: project (local)"));
    }

    #[test]
    fn config_writes_are_visible_to_status() {
        let sb = Sandbox::new();
        let root = sb.project("proj", "type: project\n");

        sb.expipe(&root).args(["config", "global", "-a", "data_path", "/g", "-p", "a"]).assert().success();
        sb.expipe(&root).args(["config", "project", "-a", "data_path", "/i", "-p", "b"]).assert().success();
        sb.expipe(&root).args(["config", "local", "-p", "b", "-p", "c"]).assert().success();

        assert!(sb.config_dir().join("config.yaml").is_file());
        assert!(sb.config_dir().join("proj").join("proj.yaml").is_file());

        sb.expipe(&root)
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("data_path: /i (project)"))
            .stdout(predicate::str::contains("plugins: [a, b, c]"));
    }

    #[test]
    fn explicit_project_id_inside_project_is_rejected() {
        let sb = Sandbox::new();
        let root = sb.project("proj", "type: project\n");
        sb.expipe(&root)
            .args(["config", "project", "--project-id", "foo", "-a", "k", "v"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("inside project"));
        assert!(!sb.config_dir().join("foo").exists());
    }

    #[test]
    fn malformed_config_aborts_startup() {
        let sb = Sandbox::new();
        fs::write(sb.config_dir().join("config.yaml"), "plugins: [a\n").unwrap();
        sb.expipe(&sb.outside())
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("malformed config file"));
    }

    #[test]
    fn empty_values_do_not_abort_startup() {
        let sb = Sandbox::new();
        let root = sb.project("proj", "type: project\nusername:\nlab: ~\n");
        sb.expipe(&root)
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("username: ~ (local)"));
    }

    #[test]
    fn unresolved_plugin_reference_only_warns() {
        let sb = Sandbox::new();
        fs::write(sb.config_dir().join("config.yaml"), "plugins: [ghost]\n").unwrap();
        sb.expipe(&sb.outside())
            .arg("status")
            .assert()
            .success()
            .stderr(predicate::str::contains("ghost"));
    }
}

#[cfg(unix)]
mod external_plugins {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn install(sb: &Sandbox, name: &str, body: &str, mode: u32) {
        let path = sb.bin().join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perm = fs::metadata(&path).unwrap().permissions();
        perm.set_mode(mode);
        fs::set_permissions(&path, perm).unwrap();
    }

    const EPHYS: &str = r#"if [ "$1" = "--expipe-manifest" ]; then
  echo '{"plugins":[{"name":"ephys","commands":[{"name":"process","about":"Process recordings"}]}]}'
  exit 0
fi
echo "ran $1 in $EXPIPE_PROJECT_ID"
"#;

    #[test]
    fn external_command_is_attached_and_runs() {
        let sb = Sandbox::new();
        let root = sb.project("proj", "type: project\nplugins: [ephys]\n");
        install(&sb, "plugin-expipe-ephys", EPHYS, 0o755);

        sb.expipe(&root)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("process"));
        sb.expipe(&root)
            .arg("process")
            .assert()
            .success()
            .stdout(predicate::str::contains("ran process in proj"))
            .stderr(predicate::str::contains("ephys").not());
    }

    #[test]
    fn broken_external_plugin_is_reported_and_skipped() {
        let sb = Sandbox::new();
        let root = sb.project("proj", "type: project\n");
        install(&sb, "plugin-expipe-ephys", EPHYS, 0o755);
        install(&sb, "plugin-expipe-broken", "exit 0", 0o644);

        sb.expipe(&root)
            .arg("process")
            .assert()
            .success()
            .stdout(predicate::str::contains("ran process"))
            .stderr(predicate::str::contains("plugin-expipe-broken"));
    }

    #[test]
    fn external_plugin_clashing_with_builtin_aborts() {
        let sb = Sandbox::new();
        let body = r#"echo '{"plugins":[{"name":"copycat","commands":[{"name":"status"}]}]}'"#;
        install(&sb, "plugin-expipe-copycat", body, 0o755);

        sb.expipe(&sb.outside())
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("plugin-expipe-copycat::copycat"));
    }
}
