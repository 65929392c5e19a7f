#![forbid(unsafe_code)]

//! Deterministic sample documents for demos, benchmarks and tests.

use crate::graph::{
    IdData, IdHandle, IdKind, Main, Material, Mesh, NameRef, Object, Scene, Screen, Vertex,
};
use crate::types::Result;

/// Handles of the datablocks created by [`build_sample`].
#[derive(Clone, Debug)]
pub struct SampleHandles {
    /// The scene linking every object.
    pub scene: IdHandle,
    /// Screen referring to the scene by name.
    pub screen: IdHandle,
    /// Camera object.
    pub camera: IdHandle,
    /// Cube objects, in creation order.
    pub objects: Vec<IdHandle>,
    /// Mesh shared by the cubes.
    pub mesh: IdHandle,
    /// Material of the mesh.
    pub material: IdHandle,
}

fn cube_vertices() -> Vec<Vertex> {
    let mut vertices = Vec::with_capacity(8);
    for i in 0..8u8 {
        let bit = |b: u8| if i & (1 << b) != 0 { 1.0 } else { -1.0 };
        vertices.push(Vertex {
            co: [bit(0), bit(1), bit(2)],
            flag: 0,
        });
    }
    vertices
}

/// Adds a scene with a camera, `objects` cubes sharing one mesh and
/// material, and a screen showing the scene.
pub fn build_sample(main: &mut Main, objects: usize) -> Result<SampleHandles> {
    let material = main.add(
        IdKind::Material,
        "Material",
        IdData::Material(Material::default()),
    )?;
    let mesh = main.add(
        IdKind::Mesh,
        "Cube",
        IdData::Mesh(Mesh {
            vertices: cube_vertices(),
            material: Some(material),
            smooth: false,
        }),
    )?;
    main.retain(material)?;

    let camera = main.add(
        IdKind::Object,
        "Camera",
        IdData::Object(Object {
            location: [7.0, -6.0, 5.0],
            ..Object::default()
        }),
    )?;
    let mut handles = Vec::with_capacity(objects);
    for i in 0..objects {
        let ob = main.add(
            IdKind::Object,
            "Cube",
            IdData::Object(Object {
                data: Some(mesh),
                location: [i as f32 * 2.5, 0.0, 0.0],
                ..Object::default()
            }),
        )?;
        main.retain(mesh)?;
        handles.push(ob);
    }

    let mut linked = vec![camera];
    linked.extend(handles.iter().copied());
    for ob in &linked {
        main.retain(*ob)?;
    }
    let scene = main.add(
        IdKind::Scene,
        "Scene",
        IdData::Scene(Scene {
            camera: Some(camera),
            objects: linked,
            ..Scene::default()
        }),
    )?;
    let screen = main.add(
        IdKind::Screen,
        "Layout",
        IdData::Screen(Screen {
            scene: NameRef::to(IdKind::Scene, scene),
            layout: 0,
        }),
    )?;
    Ok(SampleHandles {
        scene,
        screen,
        camera,
        objects: handles,
        mesh,
        material,
    })
}
