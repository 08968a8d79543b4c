//! Integration tests for discovery, the session pool and value exchange.

use std::env;
use std::path::PathBuf;
use std::ptr::NonNull;
use std::sync::Arc;

use matlab_mcp_core::{ConsoleWindowStatus, LibrarySettings, Platform, SessionStatus};
use matlab_mcp_loader::testing::{FakeLoader, FakeValue};
use matlab_mcp_session::{
    EngineManager, EngineManagerConfig, FixedLocator, InstallLocator, MxArray, NoInstall,
};

fn config(var: &str) -> EngineManagerConfig {
    EngineManagerConfig {
        console: ConsoleWindowStatus::Hide,
        output_buffer_size: 512,
        install_dir: None,
        library_path_var: var.to_string(),
        libraries: LibrarySettings::for_platform(Platform::detect()),
        platform: Platform::detect(),
    }
}

fn install_dir() -> PathBuf {
    std::fs::canonicalize(env::temp_dir()).unwrap()
}

fn manager_with(loader: &FakeLoader, var: &str, locator: Box<dyn InstallLocator>) -> EngineManager {
    EngineManager::with_parts(config(var), Arc::new(loader.clone()), locator)
}

#[test]
fn test_probe_success_records_directory() {
    let var = "MATLAB_MCP_IT_PROBE_OK";
    env::set_var(var, "/usr/lib");
    let dir = install_dir();
    let loader = FakeLoader::new();
    loader.require_dir(&dir);

    let manager = manager_with(&loader, var, Box::new(FixedLocator::new(&dir)));

    assert!(manager.is_available());
    assert_eq!(manager.install_dir(), Some(dir.as_path()));
    assert!(!manager.libraries().engine().is_loaded());
    assert_eq!(loader.loads(), 1);

    let separator = Platform::detect().path_separator();
    assert_eq!(
        env::var(var).unwrap(),
        format!("/usr/lib{}{}", separator, dir.display())
    );
    env::remove_var(var);
}

#[test]
fn test_probe_failure_restores_variable() {
    let var = "MATLAB_MCP_IT_PROBE_FAIL";
    let original = "C:\\Windows;C:\\Tools;";
    env::set_var(var, original);
    let loader = FakeLoader::new();
    loader.require_dir("/nowhere/bin/glnxa64");

    let manager = manager_with(&loader, var, Box::new(FixedLocator::new(install_dir())));

    assert!(!manager.is_available());
    assert!(manager.install_dir().is_none());
    assert_eq!(env::var(var).unwrap(), original);
    assert!(manager.libraries().engine().search_dir().is_none());
    env::remove_var(var);
}

#[test]
fn test_bad_install_dir_rejected_while_engine_loaded() {
    let var = "MATLAB_MCP_IT_RELOCATE";
    env::set_var(var, "/usr/lib");
    let dir = install_dir();
    let loader = FakeLoader::new();
    loader.require_dir(&dir);

    let mut manager = manager_with(&loader, var, Box::new(FixedLocator::new(&dir)));
    assert!(manager.get_session(1).is_connected());
    assert!(manager.libraries().engine().is_loaded());
    let committed = env::var(var).unwrap();

    assert!(!manager.set_install_dir(dir.join("not-a-matlab-install")));
    assert!(!manager.is_available());
    assert!(manager.install_dir().is_none());
    assert_eq!(env::var(var).unwrap(), committed);

    assert!(manager.get_session(1).is_connected());
    assert!(manager.set_install_dir(&dir));
    assert_eq!(manager.install_dir(), Some(dir.as_path()));
    env::remove_var(var);
}

#[test]
fn test_sessions_open_the_configured_platform_way() {
    let loader = FakeLoader::new();
    let windows = EngineManagerConfig {
        platform: Platform::Windows,
        ..config("MATLAB_MCP_IT_WINDOWS_UNUSED")
    };
    let mut manager = EngineManager::with_parts(windows, Arc::new(loader.clone()), Box::new(NoInstall));
    let session = manager.get_session(1);
    assert!(session.is_connected());
    assert!(session.is_single_use());

    let linux = EngineManagerConfig {
        platform: Platform::Linux,
        ..config("MATLAB_MCP_IT_LINUX_UNUSED")
    };
    let mut manager = EngineManager::with_parts(linux, Arc::new(loader), Box::new(NoInstall));
    let session = manager.get_session(1);
    assert!(session.is_connected());
    assert!(!session.is_single_use());
}

#[test]
fn test_probe_failure_removes_unset_variable() {
    let var = "MATLAB_MCP_IT_PROBE_UNSET";
    env::remove_var(var);
    let loader = FakeLoader::new();
    loader.require_dir("/nowhere");

    let manager = manager_with(&loader, var, Box::new(FixedLocator::new(install_dir())));

    assert!(!manager.is_available());
    assert!(env::var_os(var).is_none());
}

#[test]
fn test_no_install_leaves_variable_alone() {
    let var = "MATLAB_MCP_IT_NO_INSTALL";
    env::set_var(var, "keep");

    let manager = manager_with(&FakeLoader::new(), var, Box::new(NoInstall));

    assert!(!manager.is_available());
    assert_eq!(env::var(var).unwrap(), "keep");
    env::remove_var(var);
}

#[test]
fn test_configured_install_dir_wins() {
    let var = "MATLAB_MCP_IT_CONFIGURED";
    let dir = install_dir();
    let mut config = config(var);
    config.install_dir = Some(dir.clone());

    let manager = EngineManager::with_parts(config, Arc::new(FakeLoader::new()), Box::new(NoInstall));

    assert!(manager.is_available());
    assert_eq!(manager.install_dir(), Some(dir.as_path()));
    env::remove_var(var);
}

#[test]
fn test_explicit_load_unload_is_idempotent() {
    let var = "MATLAB_MCP_IT_LOAD_UNLOAD";
    let manager = manager_with(&FakeLoader::new(), var, Box::new(FixedLocator::new(install_dir())));
    let engine = manager.libraries().engine();

    engine.load().unwrap();
    engine.load().unwrap();
    assert!(engine.is_loaded());

    engine.unload();
    engine.unload();
    assert!(!engine.is_loaded());
    env::remove_var(var);
}

#[test]
fn test_sessions_load_from_install_dir() {
    let var = "MATLAB_MCP_IT_SESSION_DIR";
    let dir = install_dir();
    let loader = FakeLoader::new();
    loader.require_dir(&dir);

    let mut manager = manager_with(&loader, var, Box::new(FixedLocator::new(&dir)));
    assert!(manager.get_session(1).is_connected());

    let opened = loader.opened_paths();
    assert!(opened.iter().all(|path| path.parent() == Some(dir.as_path())));
    env::remove_var(var);
}

#[test]
fn test_unavailable_pool_builds_dead_sessions() {
    let loader = FakeLoader::new();
    for kind in ["libeng.so", "libeng.dylib", "libeng.dll"] {
        loader.refuse(kind);
    }
    let mut manager = manager_with(&loader, "MATLAB_MCP_IT_DEAD", Box::new(NoInstall));

    let session = manager.get_session(1);
    assert_eq!(session.status(), SessionStatus::Closed);
    assert!(!session.is_connected());
    assert!(!session.clear_workspace());
    assert!(!session.set_visible(false));
    assert!(manager.exists(1));
}

#[test]
fn test_struct_values_through_session() {
    let mut manager = manager_with(&FakeLoader::new(), "MATLAB_MCP_IT_STRUCT", Box::new(NoInstall));
    let libs = Arc::clone(manager.libraries());
    let session = manager.get_session(1);

    let raw = FakeValue::structure([
        ("gain", FakeValue::Double(0.5)),
        ("name", FakeValue::text("plant")),
        ("stable", FakeValue::Logical(false)),
        ("inputs", FakeValue::text_cell(["u1", "u2", "u3"])),
    ])
    .into_raw();
    let value = unsafe { MxArray::from_raw(NonNull::new(raw).unwrap(), Arc::clone(&libs)) };
    assert!(session.put_var("model", &value));
    drop(value);

    let model = session.get_var("model").unwrap();
    assert_eq!(model.scalar_field("gain").unwrap(), 0.5);
    assert_eq!(model.string_field("name").unwrap(), "plant");
    assert!(!model.bool_field("stable").unwrap());
    assert_eq!(model.string_vec_field("inputs").unwrap(), vec!["u1", "u2", "u3"]);
}

#[test]
fn test_eval_and_read_back() {
    let mut manager = manager_with(&FakeLoader::new(), "MATLAB_MCP_IT_EVAL", Box::new(NoInstall));
    let session = manager.get_session(9);

    assert!(session.run_command("answer = 42"));
    assert_eq!(session.engine_output(), "answer = 42\n");

    let answer = session.get_var("answer").unwrap();
    assert_eq!(answer.to_scalar().unwrap(), Some(42.0));
}

#[test]
fn test_dropping_manager_closes_sessions() {
    let mut manager = manager_with(&FakeLoader::new(), "MATLAB_MCP_IT_DROP", Box::new(NoInstall));
    manager.get_session(1);
    manager.get_session(2);
    let libs = Arc::clone(manager.libraries());

    drop(manager);
    assert_eq!(Arc::strong_count(&libs), 1);
    assert!(libs.engine().is_loaded());
}
