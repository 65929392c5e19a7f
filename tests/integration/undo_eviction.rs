#![allow(missing_docs)]

use std::fs;
use std::sync::Once;

use docgraph::graph::sample::build_sample;
use docgraph::graph::{IdKind, Main};
use docgraph::undo::{LedgerLimits, NoWindows, StepDirection, UndoLedger, UndoStorage};
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

fn nudge(main: &mut Main, step: usize) {
    let objects: Vec<_> = main.list(IdKind::Object).collect();
    let target = objects[step % objects.len()];
    main.object_mut(target).expect("object").location[0] += 0.5;
}

fn fill(ledger: &mut UndoLedger, main: &mut Main, pushes: usize) -> Vec<String> {
    let mut outlines = Vec::new();
    for i in 0..pushes {
        nudge(main, i);
        ledger.push(&format!("Edit {i}"), main).expect("push");
        outlines.push(main.outline());
    }
    outlines
}

#[test]
fn step_limit_keeps_the_newest_elements() {
    init_tracing();
    let mut main = Main::new();
    build_sample(&mut main, 4).expect("sample");
    let mut ledger = UndoLedger::new(LedgerLimits::new(3, 0), UndoStorage::Memory);
    let outlines = fill(&mut ledger, &mut main, 10);

    assert_eq!(ledger.len(), 3);
    assert_eq!(ledger.names(), vec!["Edit 7", "Edit 8", "Edit 9"]);
    ledger.verify().expect("ownership after eviction");

    // every retained element still reads back in full
    for (offset, expected) in outlines[7..].iter().enumerate() {
        let outcome = ledger.read_elem(offset).expect("read");
        assert_eq!(&outcome.main.outline(), expected);
    }
}

#[test]
fn eviction_transfers_shared_payloads() {
    init_tracing();
    let mut main = Main::new();
    build_sample(&mut main, 6).expect("sample");
    let mut ledger = UndoLedger::new(LedgerLimits::new(2, 0), UndoStorage::Memory);
    ledger.push("Base", &main).expect("push");
    let base_owned = ledger.memory_usage();
    nudge(&mut main, 0);
    ledger.push("Edit", &main).expect("push");
    nudge(&mut main, 1);
    let report = ledger.push("Edit again", &main).expect("push");
    assert_eq!(report.evicted, 1);

    // the unchanged chunks moved to the new head instead of being freed
    let head = ledger.elems().next().expect("head");
    assert_eq!(head.memfile().owned_bytes(), head.memfile().size());
    assert!(ledger.memory_usage() < 2 * base_owned);
    ledger.verify().expect("ownership");
}

#[test]
fn memory_limit_evicts_but_keeps_the_cursor() {
    init_tracing();
    let mut main = Main::new();
    build_sample(&mut main, 4).expect("sample");
    let mut probe = UndoLedger::new(LedgerLimits::default(), UndoStorage::Memory);
    probe.push("probe", &main).expect("push");
    let one_snapshot = probe.memory_usage();

    let limit = one_snapshot + one_snapshot / 2;
    let mut ledger = UndoLedger::new(LedgerLimits::new(32, limit), UndoStorage::Memory);
    fill(&mut ledger, &mut main, 20);
    assert!(ledger.len() < 20);
    assert!(ledger.memory_usage() <= limit || ledger.len() == 1);
    assert_eq!(ledger.cursor(), Some(ledger.len() - 1));

    // a limit below one snapshot still retains the active element
    let mut tiny = UndoLedger::new(LedgerLimits::new(32, 1), UndoStorage::Memory);
    fill(&mut tiny, &mut main, 3);
    assert_eq!(tiny.len(), 1);
    assert_eq!(tiny.names(), vec!["Edit 2"]);
}

#[test]
fn shrinking_the_limits_evicts_immediately() {
    init_tracing();
    let mut main = Main::new();
    build_sample(&mut main, 2).expect("sample");
    let mut ledger = UndoLedger::new(LedgerLimits::new(10, 0), UndoStorage::Memory);
    fill(&mut ledger, &mut main, 6);
    let evicted = ledger.set_limits(LedgerLimits::new(2, 0));
    assert_eq!(evicted, 4);
    assert_eq!(ledger.len(), 2);
    ledger
        .step(StepDirection::Undo, &mut main, &mut NoWindows)
        .expect("undo");
    assert!(!ledger.can_undo());
}

#[test]
fn disk_storage_removes_evicted_files() {
    init_tracing();
    let dir = TempDir::new().expect("tempdir");
    let undo_dir = dir.path().join("undo");
    let mut main = Main::new();
    build_sample(&mut main, 2).expect("sample");
    let mut ledger = UndoLedger::new(
        LedgerLimits::new(2, 0),
        UndoStorage::Disk {
            dir: undo_dir.clone(),
        },
    );
    let outlines = fill(&mut ledger, &mut main, 5);

    let files: Vec<_> = fs::read_dir(&undo_dir)
        .expect("read_dir")
        .collect::<Result<_, _>>()
        .expect("entries");
    assert_eq!(files.len(), 2);
    for elem in ledger.elems() {
        assert!(elem.path().expect("disk path").is_file());
        assert!(elem.memfile().is_empty());
    }

    ledger
        .step(StepDirection::Undo, &mut main, &mut NoWindows)
        .expect("undo");
    assert_eq!(main.outline(), outlines[3]);

    drop(ledger);
    assert_eq!(fs::read_dir(&undo_dir).expect("read_dir").count(), 0);
}
