#![allow(missing_docs)]

use std::fs;
use std::path::Path;
use std::sync::Once;
use std::time::{Duration, Instant};

use docgraph::graph::sample::build_sample;
use docgraph::graph::IdKind;
use docgraph::session::{Session, SessionConfig, StorageKind, ORIGINAL_STEP};
use docgraph::storage::read_file;
use docgraph::wm::WindowManager;
use docgraph::DocError;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn config(dir: &Path) -> SessionConfig {
    SessionConfig::default()
        .autosave_path(dir.join("autosave.docg"))
        .autosave_interval_secs(30)
}

#[test]
fn save_then_open_restarts_history() {
    init_tracing();
    let dir = TempDir::new().expect("tempdir");
    let doc = dir.path().join("doc.docg");
    let mut s = Session::new(config(dir.path()), WindowManager::new()).expect("session");
    build_sample(s.main_mut(), 2).expect("sample");
    s.push("Add sample").expect("push");
    s.save(&doc).expect("save");
    let saved = s.main().outline();

    let mut wm = WindowManager::new();
    wm.open(None, None);
    let opened = Session::open(config(dir.path()), wm, &doc).expect("open");
    assert_eq!(opened.main().outline(), saved);
    assert_eq!(opened.ledger().names(), vec![ORIGINAL_STEP]);
    assert_eq!(opened.file_path(), Some(doc.as_path()));
    let window = opened.host().window(0).expect("window");
    assert_eq!(window.screen, opened.main().lookup(IdKind::Screen, "Layout"));
}

#[test]
fn load_replaces_graph_and_history() {
    init_tracing();
    let dir = TempDir::new().expect("tempdir");
    let doc = dir.path().join("doc.docg");
    let mut s = Session::new(config(dir.path()), WindowManager::new()).expect("session");
    build_sample(s.main_mut(), 1).expect("sample");
    s.push("Add sample").expect("push");
    s.save(&doc).expect("save");
    build_sample(s.main_mut(), 1).expect("sample");
    s.push("Add more").expect("push");
    assert_eq!(s.ledger().len(), 3);

    let report = s.load(&doc).expect("load");
    assert_eq!(report.unresolved_refs, 0);
    assert_eq!(s.ledger().len(), 1);
    assert_eq!(s.main().count(IdKind::Scene), 1);
    assert!(matches!(s.undo(), Err(DocError::NoUndoAvailable)));
}

#[test]
fn autosave_writes_the_active_snapshot() {
    init_tracing();
    let dir = TempDir::new().expect("tempdir");
    let cfg = config(dir.path());
    let mut s = Session::new(cfg.clone(), WindowManager::new()).expect("session");
    build_sample(s.main_mut(), 3).expect("sample");
    s.push("Add sample").expect("push");

    let start = Instant::now();
    assert!(!s.autosave_tick(start).expect("tick"));
    assert!(s.autosave_tick(start + Duration::from_secs(31)).expect("tick"));
    let status = s.flush_autosave().expect("autosave enabled");
    assert_eq!(status.completed, 1);
    assert!(status.last_error.is_none());

    let path = Session::<WindowManager>::recoverable_autosave(&cfg).expect("autosave file");
    // identical to a flat save of the same graph
    let flat = dir.path().join("flat.docg");
    s.save(&flat).expect("save");
    assert_eq!(fs::read(&path).expect("autosave"), fs::read(&flat).expect("flat"));
    assert_eq!(status.last_bytes, fs::metadata(&path).expect("meta").len());
}

#[test]
fn recover_loads_the_autosave() {
    init_tracing();
    let dir = TempDir::new().expect("tempdir");
    let cfg = config(dir.path());
    let expected = {
        let mut crashed = Session::new(cfg.clone(), WindowManager::new()).expect("session");
        build_sample(crashed.main_mut(), 2).expect("sample");
        crashed.push("Add sample").expect("push");
        crashed.autosave_now().expect("autosave");
        crashed.flush_autosave();
        crashed.main().outline()
    };

    let mut fresh = Session::new(cfg, WindowManager::new()).expect("session");
    let report = fresh.recover().expect("recover");
    assert_eq!(report.ids, 7);
    assert_eq!(fresh.main().outline(), expected);
    assert_eq!(fresh.ledger().names(), vec![ORIGINAL_STEP]);
    assert_eq!(fresh.file_path(), None);
}

#[test]
fn recover_without_autosave_is_not_found() {
    init_tracing();
    let dir = TempDir::new().expect("tempdir");
    let cfg = config(dir.path()).autosave_enabled(false);
    let mut s = Session::new(cfg, WindowManager::new()).expect("session");
    assert!(matches!(s.recover(), Err(DocError::NotFound(_))));
}

#[test]
fn disk_undo_autosaves_by_copying_the_snapshot() {
    init_tracing();
    let dir = TempDir::new().expect("tempdir");
    let cfg = config(dir.path()).disk_undo(dir.path().join("undo"));
    assert_eq!(cfg.undo.storage, StorageKind::Disk);
    let mut s = Session::new(cfg.clone(), WindowManager::new()).expect("session");
    build_sample(s.main_mut(), 1).expect("sample");
    s.push("Add sample").expect("push");
    s.autosave_now().expect("autosave");
    let status = s.flush_autosave().expect("enabled");
    assert!(status.last_error.is_none(), "{:?}", status.last_error);

    let autosaved = read_file(&cfg.autosave_file()).expect("read autosave");
    assert_eq!(autosaved.main.outline(), s.main().outline());
    s.undo().expect("undo");
    assert!(s.main().is_empty());
}

#[test]
fn config_file_drives_the_session() {
    init_tracing();
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        format!(
            "[undo]\nsteps = 2\n\n[autosave]\nenabled = false\npath = {:?}\n",
            dir.path().join("auto.docg")
        ),
    )
    .expect("write config");

    let cfg = SessionConfig::load(Some(path)).expect("config");
    assert_eq!(cfg.undo.steps, 2);
    let mut s = Session::new(cfg, WindowManager::new()).expect("session");
    build_sample(s.main_mut(), 1).expect("sample");
    s.push("One").expect("push");
    s.push("Two").expect("push");
    assert_eq!(s.ledger().names(), vec!["One", "Two"]);
    assert!(s.flush_autosave().is_none());
}
