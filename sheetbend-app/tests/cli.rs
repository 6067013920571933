use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("../sheetbend-io/tests/data");
    path.push(name);
    path
}

fn copy_into(dir: &Path, name: &str) -> PathBuf {
    let target = dir.join(name);
    fs::copy(fixture(name), &target).expect("复制测试数据失败");
    target
}

fn sheetbend(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("sheetbend").expect("找不到 sheetbend 可执行文件");
    cmd.current_dir(dir).env_remove("SHEETBEND_CONFIG");
    cmd
}

#[test]
fn inspect_prints_part_summary() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    sheetbend(dir.path())
        .arg("inspect")
        .arg(fixture("bracket.dxf"))
        .assert()
        .success()
        .stdout(predicate::str::contains("顶点数: 4"))
        .stdout(predicate::str::contains("折弯线数: 2"))
        .stdout(predicate::str::contains("闭合: 是"));
}

#[test]
fn inspect_json_is_machine_readable() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let output = sheetbend(dir.path())
        .args(["inspect", "--json"])
        .arg(fixture("plate.geo"))
        .output()
        .expect("运行 sheetbend 失败");
    assert!(output.status.success());

    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("输出应为合法 JSON");
    assert_eq!(value["format"], "Geo");
    assert_eq!(value["vertices"].as_array().map(Vec::len), Some(4));
    assert_eq!(value["bends"].as_array().map(Vec::len), Some(2));
    assert_eq!(value["closed"], true);
}

#[test]
fn rewrite_creates_prefixed_copy() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let source = copy_into(dir.path(), "plate.geo");
    let original = fs::read(&source).expect("读取源文件失败");

    sheetbend(dir.path())
        .arg("rewrite")
        .arg(&source)
        .assert()
        .success()
        .stdout(predicate::str::contains("modified_plate.geo"));

    assert!(dir.path().join("modified_plate.geo").exists());
    assert_eq!(fs::read(&source).expect("读取源文件失败"), original);
}

#[test]
fn config_file_changes_output_prefix() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let source = copy_into(dir.path(), "bracket.dxf");
    let config = dir.path().join("sheetbend.toml");
    fs::write(&config, "[export]\noutput_prefix = \"edited_\"\n").expect("写入配置失败");

    sheetbend(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("rewrite")
        .arg(&source)
        .assert()
        .success();

    assert!(dir.path().join("edited_bracket.dxf").exists());
    assert!(!dir.path().join("modified_bracket.dxf").exists());
}

#[test]
fn rejected_config_file_stops_the_run() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let source = copy_into(dir.path(), "bracket.dxf");
    let config = dir.path().join("sheetbend.toml");
    fs::write(&config, "[export]\noutput_prefix = \"\"\n").expect("写入配置失败");

    sheetbend(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("rewrite")
        .arg(&source)
        .assert()
        .failure()
        .stderr(predicate::str::contains("加载指定配置失败"))
        .stderr(predicate::str::contains("output_prefix 不能为空"));

    assert!(!dir.path().join("modified_bracket.dxf").exists());
}

#[test]
fn broken_discovered_config_is_reported_and_defaults_apply() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let source = copy_into(dir.path(), "bracket.dxf");
    let config = dir.path().join("broken.toml");
    fs::write(&config, "[export\n").expect("写入配置失败");

    sheetbend(dir.path())
        .env("SHEETBEND_CONFIG", &config)
        .arg("rewrite")
        .arg(&source)
        .assert()
        .success()
        .stderr(predicate::str::contains("加载默认配置失败"));

    assert!(dir.path().join("modified_bracket.dxf").exists());
}

#[test]
fn exec_runs_commands_in_order() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let source = copy_into(dir.path(), "bracket.dxf");

    sheetbend(dir.path())
        .arg("exec")
        .arg(&source)
        .args(["add LINE 0,0 10,0", "undo", "redo", "save"])
        .assert()
        .success()
        .stdout(predicate::str::contains("文档包含 2 条多段线、2 条折弯线"));

    assert!(dir.path().join("modified_bracket.dxf").exists());
}

#[test]
fn exec_reports_unknown_command() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let source = copy_into(dir.path(), "bracket.dxf");

    sheetbend(dir.path())
        .arg("exec")
        .arg(&source)
        .arg("explode")
        .assert()
        .failure()
        .stderr(predicate::str::contains("未知命令"));
}

#[test]
fn sketch_lists_polylines() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let path = dir.path().join("outline.sketch");
    fs::write(&path, "RECTANGLE closed\n0,0\n40,0\n40,20\n0,20\n\nLINE\n10,0\n10,20\n")
        .expect("写入草图失败");

    sheetbend(dir.path())
        .arg("sketch")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("文档包含 2 条多段线"))
        .stdout(predicate::str::contains("RECTANGLE (闭合)"));
}

#[test]
fn unsupported_extension_fails() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let path = dir.path().join("part.step");
    fs::write(&path, "ISO-10303-21;").expect("写入文件失败");

    sheetbend(dir.path())
        .arg("inspect")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported file format"));
}
