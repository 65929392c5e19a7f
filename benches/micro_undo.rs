//! Micro benchmarks for snapshot pushes and undo steps.
#![forbid(unsafe_code)]
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use docgraph::graph::sample::build_sample;
use docgraph::graph::{IdKind, Main};
use docgraph::storage::{write_main, Catalog};
use docgraph::undo::{LedgerLimits, NoWindows, StepDirection, UndoLedger, UndoStorage};

const OBJECT_COUNTS: [usize; 3] = [8, 64, 512];

fn sample(objects: usize) -> Main {
    let mut main = Main::new();
    build_sample(&mut main, objects).expect("sample");
    main
}

fn nudge(main: &mut Main, step: usize) {
    let objects: Vec<_> = main.list(IdKind::Object).collect();
    let target = objects[step % objects.len()];
    if let Some(ob) = main.object_mut(target) {
        ob.location[0] += 0.25;
    }
}

fn micro_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("micro/undo_push");
    group.sample_size(30);
    group.throughput(Throughput::Elements(1));
    for objects in OBJECT_COUNTS {
        group.bench_with_input(BenchmarkId::new("one_edit", objects), &objects, |b, &n| {
            let mut main = sample(n);
            let mut ledger = UndoLedger::new(LedgerLimits::new(32, 0), UndoStorage::Memory);
            ledger.push("Base", &main).expect("push");
            let mut step = 0;
            b.iter(|| {
                nudge(&mut main, step);
                step += 1;
                black_box(ledger.push("Edit", &main).expect("push"));
            });
        });
    }
    group.finish();
}

fn micro_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("micro/undo_step");
    group.sample_size(30);
    group.throughput(Throughput::Elements(2));
    for objects in OBJECT_COUNTS {
        group.bench_with_input(BenchmarkId::new("undo_redo", objects), &objects, |b, &n| {
            let mut main = sample(n);
            let mut ledger = UndoLedger::new(LedgerLimits::new(32, 0), UndoStorage::Memory);
            ledger.push("Base", &main).expect("push");
            nudge(&mut main, 0);
            ledger.push("Edit", &main).expect("push");
            b.iter(|| {
                ledger
                    .step(StepDirection::Undo, &mut main, &mut NoWindows)
                    .expect("undo");
                ledger
                    .step(StepDirection::Redo, &mut main, &mut NoWindows)
                    .expect("redo");
                black_box(main.len());
            });
        });
    }
    group.finish();
}

fn micro_flat_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("micro/flat_write");
    group.sample_size(30);
    for objects in OBJECT_COUNTS {
        let main = sample(objects);
        group.bench_with_input(BenchmarkId::new("write_main", objects), &main, |b, main| {
            let mut bytes = Vec::new();
            b.iter(|| {
                bytes.clear();
                black_box(write_main(main, Catalog::compiled(), &mut bytes).expect("write"));
            });
        });
    }
    group.finish();
}

criterion_group!(benches, micro_push, micro_step, micro_flat_write);
criterion_main!(benches);
