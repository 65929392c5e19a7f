#![allow(missing_docs)]

use std::sync::Once;

use docgraph::graph::sample::build_sample;
use docgraph::graph::{IdKind, Main};
use docgraph::storage::catalog::{Catalog, StructDef};
use docgraph::storage::{read_main, write_main};
use docgraph::DocError;
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

/// Layouts of an older revision: doubles where the current build stores
/// floats, a shorter location, no metallic factor and a field that no longer
/// exists.
fn legacy_catalog() -> Catalog {
    Catalog::compiled()
        .with_struct(
            StructDef::builder("Material")
                .id_header()
                .int("legacy_gloss", 2)
                .floats("color", 8, 3)
                .floats("roughness", 8, 1)
                .finish(),
        )
        .and_then(|c| {
            c.with_struct(
                StructDef::builder("Object")
                    .id_header()
                    .floats("size", 8, 3)
                    .floats("loc", 4, 2)
                    .pointer("data", "Mesh")
                    .pointer("parent", "Object")
                    .pointer("mat", "Material")
                    .finish(),
            )
        })
        .and_then(|c| {
            c.with_struct(
                StructDef::builder("Mesh")
                    .id_header()
                    .uint("flag", 4)
                    .int("mat", 8)
                    .pointer("verts", "Vertex")
                    .finish(),
            )
        })
        .and_then(|c| {
            c.with_struct(
                StructDef::builder("Vertex")
                    .uint("flag", 2)
                    .floats("co", 8, 3)
                    .finish(),
            )
        })
        .expect("legacy catalog")
}

fn legacy_bytes(main: &Main) -> Vec<u8> {
    let mut bytes = Vec::new();
    write_main(main, &legacy_catalog(), &mut bytes).expect("write legacy");
    bytes
}

#[test]
fn older_layouts_are_translated_by_field_name() {
    init_tracing();
    let mut main = Main::new();
    let sample = build_sample(&mut main, 2).expect("sample");
    {
        let ma = main.material_mut(sample.material).expect("material");
        ma.color = [0.25, 0.5, 0.75];
        ma.roughness = 0.125;
        ma.metallic = 0.9;
    }
    main.object_mut(sample.objects[1])
        .expect("object")
        .location = [1.0, 2.0, 3.0];
    main.mesh_mut(sample.mesh).expect("mesh").smooth = true;

    let outcome = read_main(legacy_bytes(&main).as_slice(), Catalog::compiled()).expect("read");
    let loaded = outcome.main;
    assert!(outcome.report.remapped_blocks >= 5);

    let ma = loaded
        .material(loaded.lookup(IdKind::Material, "Material").expect("material"))
        .expect("material data");
    assert_eq!(ma.color, [0.25, 0.5, 0.75]);
    assert_eq!(ma.roughness, 0.125);
    // absent in the stored layout
    assert_eq!(ma.metallic, 0.0);

    let ob = loaded
        .object(loaded.lookup(IdKind::Object, "Cube.001").expect("object"))
        .expect("object data");
    assert_eq!(ob.location, [1.0, 2.0, 0.0]);
    assert_eq!(ob.scale, [1.0, 1.0, 1.0]);
    assert_eq!(ob.data, loaded.lookup(IdKind::Mesh, "Cube"));

    let mesh = loaded
        .mesh(loaded.lookup(IdKind::Mesh, "Cube").expect("mesh"))
        .expect("mesh data");
    assert!(mesh.smooth);
    assert_eq!(mesh.vertices.len(), 8);
    assert_eq!(mesh.vertices[7].co, [1.0, 1.0, 1.0]);
    // stored as a plain integer, so the pointer cannot be recovered
    assert_eq!(mesh.material, None);
}

#[test]
fn identical_layouts_are_not_remapped() {
    init_tracing();
    let mut main = Main::new();
    build_sample(&mut main, 1).expect("sample");
    let mut bytes = Vec::new();
    write_main(&main, Catalog::compiled(), &mut bytes).expect("write");
    let outcome = read_main(bytes.as_slice(), Catalog::compiled()).expect("read");
    assert_eq!(outcome.report.remapped_blocks, 0);
}

#[test]
fn newer_format_version_is_unsupported() {
    init_tracing();
    let mut main = Main::new();
    build_sample(&mut main, 1).expect("sample");
    let mut bytes = Vec::new();
    write_main(&main, Catalog::compiled(), &mut bytes).expect("write");
    bytes[8..10].copy_from_slice(&99u16.to_le_bytes());
    let err = read_main(bytes.as_slice(), Catalog::compiled()).unwrap_err();
    assert!(matches!(err, DocError::UnsupportedVersion(_)), "{err}");
}

#[test]
fn unknown_struct_in_use_is_unsupported() {
    init_tracing();
    let mut main = Main::new();
    build_sample(&mut main, 1).expect("sample");
    let mut bytes = Vec::new();
    write_main(&main, Catalog::compiled(), &mut bytes).expect("write");

    // rename the vertex struct inside the embedded catalog, as a build with
    // a struct this reader never heard of would have written it
    let dna_end = bytes.len() - 28;
    let mut i = 0;
    while i + 6 <= dna_end {
        if &bytes[i..i + 6] == b"Vertex" {
            bytes[i..i + 6].copy_from_slice(b"VertX9");
        }
        i += 1;
    }
    let crc = crc32fast::hash(&bytes[..dna_end]);
    let at = bytes.len() - 4;
    bytes[at..].copy_from_slice(&crc.to_le_bytes());

    let err = read_main(bytes.as_slice(), Catalog::compiled()).unwrap_err();
    assert!(matches!(err, DocError::UnsupportedVersion(_)), "{err}");
}
