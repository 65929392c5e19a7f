#![forbid(unsafe_code)]

use crate::graph::{IdHandle, IdKind};

/// Cross reference persisted as kind plus name rather than as a pointer.
///
/// Resolved after every datablock of a snapshot has been rebuilt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NameRef {
    kind: IdKind,
    target: Option<IdHandle>,
}

impl NameRef {
    /// Unset reference to a datablock of `kind`.
    pub fn unset(kind: IdKind) -> Self {
        Self { kind, target: None }
    }

    /// Reference bound to `target`.
    pub fn to(kind: IdKind, target: IdHandle) -> Self {
        Self {
            kind,
            target: Some(target),
        }
    }

    /// Kind the reference points at.
    pub fn kind(&self) -> IdKind {
        self.kind
    }

    /// Bound target, if any.
    pub fn target(&self) -> Option<IdHandle> {
        self.target
    }

    /// Rebinds the reference.
    pub fn set(&mut self, target: Option<IdHandle>) {
        self.target = target;
    }
}

/// A scene: playback range, active camera and the objects it links.
#[derive(Clone, Debug, PartialEq)]
pub struct Scene {
    /// Current frame.
    pub frame_current: i32,
    /// Last frame of playback.
    pub frame_end: i32,
    /// Active camera object.
    pub camera: Option<IdHandle>,
    /// Linked objects, in link order.
    pub objects: Vec<IdHandle>,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            frame_current: 1,
            frame_end: 250,
            camera: None,
            objects: Vec::new(),
        }
    }
}

/// An object placing mesh data in a scene.
#[derive(Clone, Debug, PartialEq)]
pub struct Object {
    /// Mesh the object instances.
    pub data: Option<IdHandle>,
    /// Parent object.
    pub parent: Option<IdHandle>,
    /// Material override.
    pub material: Option<IdHandle>,
    /// Translation.
    pub location: [f32; 3],
    /// Per-axis scale.
    pub scale: [f32; 3],
}

impl Default for Object {
    fn default() -> Self {
        Self {
            data: None,
            parent: None,
            material: None,
            location: [0.0; 3],
            scale: [1.0; 3],
        }
    }
}

/// One mesh vertex.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vertex {
    /// Coordinates.
    pub co: [f32; 3],
    /// Selection and hide bits.
    pub flag: u8,
}

/// Vertex geometry with an optional material.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    /// Vertices, in index order.
    pub vertices: Vec<Vertex>,
    /// Material of the mesh.
    pub material: Option<IdHandle>,
    /// Smooth shading.
    pub smooth: bool,
}

/// Surface shading parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    /// Base color, linear RGB.
    pub color: [f32; 3],
    /// Roughness in 0..=1.
    pub roughness: f32,
    /// Metallic factor in 0..=1.
    pub metallic: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            color: [0.8, 0.8, 0.8],
            roughness: 0.5,
            metallic: 0.0,
        }
    }
}

/// A UI layout showing one scene.
#[derive(Clone, Debug, PartialEq)]
pub struct Screen {
    /// Scene shown, referenced by name.
    pub scene: NameRef,
    /// Layout preset.
    pub layout: i32,
}

impl Default for Screen {
    fn default() -> Self {
        Self {
            scene: NameRef::unset(IdKind::Scene),
            layout: 0,
        }
    }
}

/// Kind-specific payload of a datablock.
#[derive(Clone, Debug, PartialEq)]
pub enum IdData {
    /// Scene payload.
    Scene(Scene),
    /// Screen payload.
    Screen(Screen),
    /// Object payload.
    Object(Object),
    /// Mesh payload.
    Mesh(Mesh),
    /// Material payload.
    Material(Material),
}

impl IdData {
    /// Kind this payload belongs to.
    pub fn kind(&self) -> IdKind {
        match self {
            IdData::Scene(_) => IdKind::Scene,
            IdData::Screen(_) => IdKind::Screen,
            IdData::Object(_) => IdKind::Object,
            IdData::Mesh(_) => IdKind::Mesh,
            IdData::Material(_) => IdKind::Material,
        }
    }

    /// Default payload for `kind`.
    pub fn default_for(kind: IdKind) -> Self {
        match kind {
            IdKind::Scene => IdData::Scene(Scene::default()),
            IdKind::Screen => IdData::Screen(Screen::default()),
            IdKind::Object => IdData::Object(Object::default()),
            IdKind::Mesh => IdData::Mesh(Mesh::default()),
            IdKind::Material => IdData::Material(Material::default()),
        }
    }

    /// Direct pointers to other datablocks, in field order.
    pub fn pointers(&self) -> Vec<IdHandle> {
        match self {
            IdData::Scene(scene) => scene
                .camera
                .into_iter()
                .chain(scene.objects.iter().copied())
                .collect(),
            IdData::Object(ob) => [ob.data, ob.parent, ob.material].into_iter().flatten().collect(),
            IdData::Mesh(mesh) => mesh.material.into_iter().collect(),
            IdData::Screen(_) | IdData::Material(_) => Vec::new(),
        }
    }

    /// Name-based references, in field order.
    pub fn name_refs(&self) -> Vec<&NameRef> {
        match self {
            IdData::Screen(screen) => vec![&screen.scene],
            _ => Vec::new(),
        }
    }

    pub(crate) fn name_refs_mut(&mut self) -> Vec<&mut NameRef> {
        match self {
            IdData::Screen(screen) => vec![&mut screen.scene],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_for_matches_kind() {
        for kind in IdKind::ALL {
            assert_eq!(IdData::default_for(kind).kind(), kind);
        }
    }

    #[test]
    fn screens_expose_their_scene_reference() {
        let data = IdData::default_for(IdKind::Screen);
        let refs = data.name_refs();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind(), IdKind::Scene);
        assert!(refs[0].target().is_none());
        assert!(data.pointers().is_empty());
    }
}
