#![allow(missing_docs)]

use std::path::Path;
use std::sync::Once;

use docgraph::graph::sample::build_sample;
use docgraph::graph::{IdData, IdKind, Material};
use docgraph::session::{Session, SessionConfig, ORIGINAL_STEP};
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

fn session(dir: &Path) -> Session {
    let config = SessionConfig::default()
        .undo_steps(16)
        .autosave_enabled(false)
        .autosave_path(dir.join("autosave.docg"));
    let mut wm = WindowManager::new();
    wm.open(None, None);
    Session::new(config, wm).expect("session")
}

fn object_z(session: &Session, name: &str) -> f32 {
    let main = session.main();
    let handle = main.lookup(IdKind::Object, name).expect("object");
    main.object(handle).expect("object data").location[2]
}

fn move_cube(session: &mut Session, name: &str) {
    let handle = session
        .main()
        .lookup(IdKind::Object, name)
        .expect("object");
    session
        .main_mut()
        .object_mut(handle)
        .expect("object data")
        .location[2] += 1.0;
}

#[test]
fn n_undos_return_to_before_the_first_edit() {
    init_tracing();
    let dir = TempDir::new().expect("tempdir");
    let mut s = session(dir.path());
    let empty = s.main().outline();

    build_sample(s.main_mut(), 2).expect("sample");
    s.push("Add sample").expect("push");
    let mut outlines = vec![empty, s.main().outline()];
    for i in 0..4 {
        move_cube(&mut s, "Cube");
        s.push(&format!("Move {i}")).expect("push");
        outlines.push(s.main().outline());
    }
    assert_eq!(s.ledger().len(), 6);

    for expected in outlines.iter().rev().skip(1) {
        s.undo().expect("undo");
        assert_eq!(&s.main().outline(), expected);
    }
    assert_eq!(s.ledger().cursor(), Some(0));
    assert!(s.main().is_empty());

    for expected in outlines.iter().skip(1) {
        s.redo().expect("redo");
        assert_eq!(&s.main().outline(), expected);
    }
}

#[test]
fn navigation_past_the_ends_changes_nothing() {
    init_tracing();
    let dir = TempDir::new().expect("tempdir");
    let mut s = session(dir.path());
    build_sample(s.main_mut(), 1).expect("sample");
    s.push("Add sample").expect("push");
    let before = s.main().outline();

    let err = s.redo().unwrap_err();
    assert!(matches!(err, DocError::NoRedoAvailable));
    assert!(err.is_navigation_noop());
    assert_eq!(s.main().outline(), before);
    assert_eq!(s.ledger().cursor(), Some(1));

    s.undo().expect("undo");
    let err = s.undo().unwrap_err();
    assert!(matches!(err, DocError::NoUndoAvailable));
    assert_eq!(s.ledger().cursor(), Some(0));
}

#[test]
fn pushing_after_undo_discards_redo() {
    init_tracing();
    let dir = TempDir::new().expect("tempdir");
    let mut s = session(dir.path());
    build_sample(s.main_mut(), 1).expect("sample");
    s.push("Add sample").expect("push");
    move_cube(&mut s, "Cube");
    s.push("Move").expect("push");

    s.undo().expect("undo");
    s.main_mut()
        .add(IdKind::Material, "Gold", IdData::Material(Material::default()))
        .expect("add");
    let report = s.push("Add gold").expect("push");
    assert_eq!(report.discarded_redo, 1);
    assert_eq!(
        s.ledger().names(),
        vec![ORIGINAL_STEP, "Add sample", "Add gold"]
    );
    assert!(!s.ledger().can_redo());
    assert_eq!(object_z(&s, "Cube"), 0.0);
}

#[test]
fn unchanged_blocks_are_shared_between_steps() {
    init_tracing();
    let dir = TempDir::new().expect("tempdir");
    let mut s = session(dir.path());
    build_sample(s.main_mut(), 8).expect("sample");
    s.push("Add sample").expect("push");
    move_cube(&mut s, "Cube.003");
    let report = s.push("Move one").expect("push");

    assert!(report.append.identical_chunks > report.append.copied_chunks);
    assert!(report.append.copied_bytes < report.bytes as usize);
    let audit = s.ledger().verify().expect("ownership");
    assert!(audit.bytes <= s.ledger().memory_usage());
}

#[test]
fn jump_by_index_and_name() {
    init_tracing();
    let dir = TempDir::new().expect("tempdir");
    let mut s = session(dir.path());
    build_sample(s.main_mut(), 1).expect("sample");
    s.push("Add sample").expect("push");
    move_cube(&mut s, "Cube");
    s.push("Move").expect("push");
    move_cube(&mut s, "Cube");
    s.push("Move").expect("push");

    s.jump(1).expect("jump");
    assert_eq!(object_z(&s, "Cube"), 0.0);
    // the newest element carrying the name wins
    s.jump_to_name("Move").expect("jump by name");
    assert_eq!(s.ledger().cursor(), Some(3));
    assert_eq!(object_z(&s, "Cube"), 2.0);

    assert!(matches!(s.jump(9), Err(DocError::NotFound(_))));
    assert!(matches!(s.jump_to_name("Nope"), Err(DocError::NotFound(_))));
    assert_eq!(s.ledger().cursor(), Some(3));
}

#[test]
fn windows_track_their_scene_across_steps() {
    init_tracing();
    let dir = TempDir::new().expect("tempdir");
    let mut s = session(dir.path());
    build_sample(s.main_mut(), 1).expect("sample");
    let scene = s.main().lookup(IdKind::Scene, "Scene");
    s.host_mut().window_mut(0).expect("window").scene = scene;
    s.push("Add sample").expect("push");

    move_cube(&mut s, "Cube");
    s.push("Move").expect("push");
    s.undo().expect("undo");
    let window = s.host().window(0).expect("window");
    assert_eq!(window.scene, s.main().lookup(IdKind::Scene, "Scene"));

    s.jump(0).expect("jump");
    let window = s.host().window(0).expect("window");
    assert_eq!(window.scene, None);
}

#[test]
fn renamed_datablock_is_found_by_its_step_name() {
    init_tracing();
    let dir = TempDir::new().expect("tempdir");
    let mut s = session(dir.path());
    build_sample(s.main_mut(), 1).expect("sample");
    s.push("Add sample").expect("push");
    let cube = s.main().lookup(IdKind::Object, "Cube").expect("cube");
    s.main_mut().rename(cube, "Renamed").expect("rename");
    s.push("Rename").expect("push");

    s.undo().expect("undo");
    assert!(s.main().lookup(IdKind::Object, "Cube").is_some());
    assert!(s.main().lookup(IdKind::Object, "Renamed").is_none());
    s.redo().expect("redo");
    assert!(s.main().lookup(IdKind::Object, "Renamed").is_some());
}
