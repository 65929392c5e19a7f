#![allow(missing_docs)]

use std::fs;
use std::sync::Once;

use docgraph::graph::sample::build_sample;
use docgraph::graph::{IdData, IdKind, Main, Material, Object};
use docgraph::storage::{
    read_file, read_main, write_file, write_main, Catalog, MemFileBuilder,
};
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

fn sample(objects: usize) -> Main {
    let mut main = Main::new();
    build_sample(&mut main, objects).expect("sample");
    main
}

#[test]
fn file_roundtrip_preserves_structure() {
    init_tracing();
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("scene.docg");
    let main = sample(4);
    let stats = write_file(&main, &path).expect("write");
    assert_eq!(stats.ids, main.len());
    assert_eq!(stats.bytes, fs::metadata(&path).expect("metadata").len());

    let outcome = read_file(&path).expect("read");
    assert_eq!(outcome.main.outline(), main.outline());
    assert_eq!(outcome.report.ids, main.len());
    assert_eq!(outcome.report.dangling_pointers, 0);
    assert_eq!(outcome.report.unresolved_refs, 0);
    assert_eq!(outcome.report.checksum, stats.checksum);
}

#[test]
fn shared_targets_stay_shared() {
    init_tracing();
    let main = sample(3);
    let mut bytes = Vec::new();
    write_main(&main, Catalog::compiled(), &mut bytes).expect("write");
    let loaded = read_main(bytes.as_slice(), Catalog::compiled())
        .expect("read")
        .main;

    let mesh = loaded.lookup(IdKind::Mesh, "Cube").expect("mesh");
    let users: Vec<_> = loaded
        .list(IdKind::Object)
        .filter_map(|h| loaded.object(h))
        .filter(|ob| ob.data == Some(mesh))
        .collect();
    assert_eq!(users.len(), 3);
    assert_eq!(loaded.get(mesh).expect("mesh block").header().use_count(), 3);
}

#[test]
fn identities_survive_a_roundtrip() {
    init_tracing();
    let main = sample(2);
    let mut bytes = Vec::new();
    write_main(&main, Catalog::compiled(), &mut bytes).expect("write");
    let loaded = read_main(bytes.as_slice(), Catalog::compiled())
        .expect("read")
        .main;
    for kind in IdKind::ALL {
        for handle in main.list(kind) {
            let before = main.get(handle).expect("block").header();
            let after = loaded
                .get(loaded.lookup(kind, before.name()).expect("same name"))
                .expect("block")
                .header();
            assert_eq!(before.uid(), after.uid());
        }
    }
    assert!(loaded.next_uid() >= main.next_uid());
}

#[test]
fn memfile_stream_matches_flat_save() {
    init_tracing();
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("flat.docg");
    let main = sample(2);
    write_file(&main, &path).expect("write");

    let mut builder = MemFileBuilder::new(None);
    write_main(&main, Catalog::compiled(), &mut builder).expect("write");
    let (memfile, stats) = builder.finish();
    assert_eq!(stats.identical_chunks, 0);

    let mut flat = Vec::new();
    memfile.write_to(&mut flat).expect("write_to");
    assert_eq!(flat, fs::read(&path).expect("read flat"));
}

#[test]
fn freed_targets_are_written_as_null() {
    init_tracing();
    let mut main = Main::new();
    let material = main
        .add(
            IdKind::Material,
            "Steel",
            IdData::Material(Material::default()),
        )
        .expect("material");
    main.add(
        IdKind::Object,
        "Bolt",
        IdData::Object(Object {
            material: Some(material),
            ..Object::default()
        }),
    )
    .expect("object");
    main.free(material).expect("free");

    let mut bytes = Vec::new();
    let stats = write_main(&main, Catalog::compiled(), &mut bytes).expect("write");
    assert_eq!(stats.dangling, 1);
    let loaded = read_main(bytes.as_slice(), Catalog::compiled())
        .expect("read")
        .main;
    let bolt = loaded.lookup(IdKind::Object, "Bolt").expect("bolt");
    assert_eq!(loaded.object(bolt).expect("object").material, None);
    assert_eq!(loaded.count(IdKind::Material), 0);
}

#[test]
fn trailing_bytes_after_end_block_are_ignored() {
    init_tracing();
    let main = sample(1);
    let mut bytes = Vec::new();
    write_main(&main, Catalog::compiled(), &mut bytes).expect("write");
    bytes.extend_from_slice(b"appended garbage");
    let loaded = read_main(bytes.as_slice(), Catalog::compiled()).expect("read");
    assert_eq!(loaded.main.outline(), main.outline());
}

#[test]
fn foreign_and_cut_files_are_rejected() {
    init_tracing();
    let main = sample(1);
    let mut bytes = Vec::new();
    write_main(&main, Catalog::compiled(), &mut bytes).expect("write");

    let err = read_main(&b"PK\x03\x04 not a document"[..], Catalog::compiled()).unwrap_err();
    assert!(matches!(err, DocError::NotAValidFile(_)), "{err}");

    let cut = &bytes[..bytes.len() / 2];
    let err = read_main(cut, Catalog::compiled()).unwrap_err();
    assert!(matches!(err, DocError::Truncated(_)), "{err}");
}
