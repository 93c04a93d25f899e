//! Layered configuration: global file, workspace files, environment.

use super::test_utils::with_env;
use qengine::config::ConfigLoader;
use qengine::module::NativeDialect;
use qengine::QuestionEngine;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_global(xdg: &TempDir, contents: &str) {
    let dir = xdg.path().join("qengine");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("config.toml"), contents).unwrap();
}

fn write_workspace(workspace: &TempDir, name: &str, contents: &str) {
    let dir = workspace.path().join("config");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(name), contents).unwrap();
}

#[test]
fn test_sources_layer_in_order() {
    let xdg = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    write_global(
        &xdg,
        "[executor]\nphase_timeout_ms = 100\n\n[logging]\nlevel = \"debug\"\n",
    );
    write_workspace(&workspace, "config.toml", "[executor]\nphase_timeout_ms = 200\n");
    write_workspace(&workspace, "ci.toml", "[loader]\ndialects = [\"calculation\"]\n");

    let xdg_path = xdg.path().to_string_lossy().into_owned();
    let config = with_env(
        &[("XDG_CONFIG_HOME", xdg_path.as_str()), ("QENGINE_ENV", "ci")],
        || ConfigLoader::load(workspace.path()).unwrap(),
    );

    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.executor.phase_timeout_ms, Some(200));
    assert_eq!(config.loader.dialects, vec!["calculation"]);
    assert!(config.validate().is_ok());
}

#[test]
fn test_environment_overrides_files() {
    let xdg = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    write_workspace(&workspace, "config.toml", "[executor]\nphase_timeout_ms = 200\n");

    let xdg_path = xdg.path().to_string_lossy().into_owned();
    let config = with_env(
        &[
            ("XDG_CONFIG_HOME", xdg_path.as_str()),
            ("QENGINE__EXECUTOR__PHASE_TIMEOUT_MS", "750"),
            ("QENGINE__LOADER__DIALECTS", "native,calculation"),
        ],
        || ConfigLoader::load(workspace.path()).unwrap(),
    );

    assert_eq!(config.executor.phase_timeout_ms, Some(750));
    assert_eq!(config.loader.dialects, vec!["native", "calculation"]);
}

#[test]
fn test_engine_from_config_uses_sled_store() {
    let workspace = TempDir::new().unwrap();
    let store_path = workspace.path().join("store");
    write_workspace(
        &workspace,
        "config.toml",
        &format!("[storage]\nstore_path = {:?}\n", store_path.to_string_lossy()),
    );
    let xdg = TempDir::new().unwrap();
    let xdg_path = xdg.path().to_string_lossy().into_owned();

    let config = with_env(&[("XDG_CONFIG_HOME", xdg_path.as_str())], || {
        ConfigLoader::load(workspace.path()).unwrap()
    });
    assert_eq!(config.storage.store_path, Some(PathBuf::from(&store_path)));

    let engine = QuestionEngine::from_config(&config, NativeDialect::new()).unwrap();
    assert_eq!(engine.loader().dialect_names(), vec!["calculation", "native"]);
    assert!(store_path.exists());
}

#[test]
fn test_unknown_dialect_fails_validation() {
    let workspace = TempDir::new().unwrap();
    write_workspace(
        &workspace,
        "config.toml",
        "[loader]\ndialects = [\"calculation\", \"python\"]\n",
    );
    let xdg = TempDir::new().unwrap();
    let xdg_path = xdg.path().to_string_lossy().into_owned();

    let config = with_env(&[("XDG_CONFIG_HOME", xdg_path.as_str())], || {
        ConfigLoader::load(workspace.path()).unwrap()
    });
    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 1);
    assert!(QuestionEngine::from_config(&config, NativeDialect::new()).is_err());
}

#[test]
fn test_zero_timeout_from_file_means_unbounded() {
    let xdg = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    write_workspace(&workspace, "config.toml", "[executor]\nphase_timeout_ms = 0\n");

    let xdg_path = xdg.path().to_string_lossy().into_owned();
    let config = with_env(&[("XDG_CONFIG_HOME", xdg_path.as_str())], || {
        ConfigLoader::load(workspace.path()).unwrap()
    });

    assert_eq!(config.executor.phase_timeout_ms, Some(0));
    assert_eq!(config.executor.phase_timeout(), None);
    assert!(config.validate().is_ok());
}
