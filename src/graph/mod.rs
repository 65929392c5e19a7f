#![forbid(unsafe_code)]

//! The live document graph.
//!
//! A [`Main`] owns every ID datablock in per-kind lists that are kept sorted
//! by name. Datablocks point at each other through [`IdHandle`]s, which are
//! only meaningful for the `Main` that issued them; a graph rebuilt from a
//! snapshot hands out fresh handles.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::Serialize;

use crate::types::SessionUid;

mod data;
mod outline;
mod persist;
mod registry;
pub mod sample;

pub use data::{IdData, Material, Mesh, NameRef, Object, Scene, Screen, Vertex};
pub(crate) use persist::{decode_id, encode_id, LINK as LINK_STRUCT};
pub use persist::compiled_struct_defs;
pub(crate) use registry::clamp_name;
pub use registry::MAX_NAME_LEN;

/// Kinds of ID datablocks, in the order the writer visits their lists.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize)]
pub enum IdKind {
    /// Top-level container of objects.
    Scene,
    /// UI layout bound to a scene by name.
    Screen,
    /// Placed instance of object data.
    Object,
    /// Vertex geometry.
    Mesh,
    /// Surface shading parameters.
    Material,
}

impl IdKind {
    /// Every kind, in list order.
    pub const ALL: [IdKind; 5] = [
        IdKind::Scene,
        IdKind::Screen,
        IdKind::Object,
        IdKind::Mesh,
        IdKind::Material,
    ];

    /// Two-character code used in block codes and cross references.
    pub const fn code(self) -> [u8; 2] {
        match self {
            IdKind::Scene => *b"SC",
            IdKind::Screen => *b"SR",
            IdKind::Object => *b"OB",
            IdKind::Mesh => *b"ME",
            IdKind::Material => *b"MA",
        }
    }

    /// The code as text.
    pub const fn code_str(self) -> &'static str {
        match self {
            IdKind::Scene => "SC",
            IdKind::Screen => "SR",
            IdKind::Object => "OB",
            IdKind::Mesh => "ME",
            IdKind::Material => "MA",
        }
    }

    /// The code packed as a little-endian u16.
    pub fn code_u16(self) -> u16 {
        u16::from_le_bytes(self.code())
    }

    /// Kind for a two-character code.
    pub fn from_code(code: [u8; 2]) -> Option<IdKind> {
        IdKind::ALL.into_iter().find(|k| k.code() == code)
    }

    /// Kind for a packed u16 code.
    pub fn from_code_u16(code: u16) -> Option<IdKind> {
        IdKind::from_code(code.to_le_bytes())
    }

    /// Name of the catalog struct describing this kind.
    pub const fn struct_name(self) -> &'static str {
        match self {
            IdKind::Scene => "Scene",
            IdKind::Screen => "Screen",
            IdKind::Object => "Object",
            IdKind::Mesh => "Mesh",
            IdKind::Material => "Material",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.struct_name())
    }
}

/// Identifies the `Main` that issued a handle.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct RegistryId(u32);

impl RegistryId {
    pub(crate) fn next() -> RegistryId {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        RegistryId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Arena handle of an ID datablock inside one [`Main`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct IdHandle {
    registry: RegistryId,
    index: u32,
    generation: u32,
}

impl IdHandle {
    pub(crate) fn new(registry: RegistryId, index: u32, generation: u32) -> Self {
        Self {
            registry,
            index,
            generation,
        }
    }

    /// Registry that issued this handle.
    pub fn registry(self) -> RegistryId {
        self.registry
    }
}

/// Bookkeeping shared by every ID datablock.
#[derive(Clone, Debug, PartialEq)]
pub struct IdHeader {
    pub(crate) name: String,
    pub(crate) kind: IdKind,
    pub(crate) use_count: u32,
    pub(crate) uid: SessionUid,
    pub(crate) registry: RegistryId,
}

impl IdHeader {
    /// Unique name within the kind's list.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Datablock kind.
    pub fn kind(&self) -> IdKind {
        self.kind
    }

    /// Number of retained references.
    pub fn use_count(&self) -> u32 {
        self.use_count
    }

    /// Identity written as the block's source identity.
    pub fn uid(&self) -> SessionUid {
        self.uid
    }

    /// Registry that owns the datablock.
    pub fn registry(&self) -> RegistryId {
        self.registry
    }
}

/// One ID object: header plus kind-specific data.
#[derive(Clone, Debug, PartialEq)]
pub struct Datablock {
    pub(crate) header: IdHeader,
    /// Kind-specific payload.
    pub data: IdData,
}

impl Datablock {
    /// Shared ID bookkeeping.
    pub fn header(&self) -> &IdHeader {
        &self.header
    }

    /// Shortcut for `header().name()`.
    pub fn name(&self) -> &str {
        &self.header.name
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    block: Option<Datablock>,
}

/// The live document graph: per-kind lists of ID datablocks.
#[derive(Debug)]
pub struct Main {
    registry: RegistryId,
    slots: Vec<Slot>,
    free_slots: Vec<u32>,
    lists: [BTreeMap<String, IdHandle>; IdKind::ALL.len()],
    next_uid: u64,
}

impl Default for Main {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! typed_access {
    ($get:ident, $get_mut:ident, $variant:ident, $ty:ty) => {
        #[doc = concat!("Borrows the ", stringify!($variant), " data behind `handle`.")]
        pub fn $get(&self, handle: IdHandle) -> Option<&$ty> {
            match &self.get(handle)?.data {
                IdData::$variant(inner) => Some(inner),
                _ => None,
            }
        }

        #[doc = concat!("Mutably borrows the ", stringify!($variant), " data behind `handle`.")]
        pub fn $get_mut(&mut self, handle: IdHandle) -> Option<&mut $ty> {
            match &mut self.get_mut(handle)?.data {
                IdData::$variant(inner) => Some(inner),
                _ => None,
            }
        }
    };
}

impl Main {
    /// Creates an empty graph with its own registry.
    pub fn new() -> Self {
        Self::with_registry(RegistryId::next())
    }

    pub(crate) fn with_registry(registry: RegistryId) -> Self {
        Self {
            registry,
            slots: Vec::new(),
            free_slots: Vec::new(),
            lists: Default::default(),
            next_uid: 1,
        }
    }

    /// Registry that issued this graph's handles.
    pub fn registry(&self) -> RegistryId {
        self.registry
    }

    /// Datablock behind `handle`, if it is live in this graph.
    pub fn get(&self, handle: IdHandle) -> Option<&Datablock> {
        if handle.registry != self.registry {
            return None;
        }
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.block.as_ref()
    }

    /// Mutable datablock behind `handle`.
    ///
    /// The header stays read-only so names can only change through
    /// [`Main::rename`], which keeps the lists sorted and unique.
    pub fn get_mut(&mut self, handle: IdHandle) -> Option<&mut Datablock> {
        if handle.registry != self.registry {
            return None;
        }
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.block.as_mut()
    }

    /// Name of the datablock behind `handle`.
    pub fn name_of(&self, handle: IdHandle) -> Option<&str> {
        self.get(handle).map(Datablock::name)
    }

    /// Handles of one kind, in name order.
    pub fn list(&self, kind: IdKind) -> impl Iterator<Item = IdHandle> + '_ {
        self.lists[kind.index()].values().copied()
    }

    /// First datablock of `kind` in name order.
    pub fn first(&self, kind: IdKind) -> Option<IdHandle> {
        self.list(kind).next()
    }

    /// Number of datablocks of `kind`.
    pub fn count(&self, kind: IdKind) -> usize {
        self.lists[kind.index()].len()
    }

    /// Every handle, kind by kind in name order.
    pub fn handles(&self) -> impl Iterator<Item = IdHandle> + '_ {
        IdKind::ALL.into_iter().flat_map(move |kind| self.list(kind))
    }

    /// Total number of datablocks.
    pub fn len(&self) -> usize {
        self.lists.iter().map(BTreeMap::len).sum()
    }

    /// Returns true if the graph holds no datablocks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Next identity the graph will assign.
    pub fn next_uid(&self) -> u64 {
        self.next_uid
    }

    /// Raises the identity counter so identities stay unique across swaps.
    pub fn bump_uid_floor(&mut self, floor: u64) {
        self.next_uid = self.next_uid.max(floor);
    }

    /// Frees every datablock. Returns how many were owned.
    pub fn free_all(self) -> usize {
        let count = self.len();
        drop(self);
        count
    }

    typed_access!(scene, scene_mut, Scene, Scene);
    typed_access!(screen, screen_mut, Screen, Screen);
    typed_access!(object, object_mut, Object, Object);
    typed_access!(mesh, mesh_mut, Mesh, Mesh);
    typed_access!(material, material_mut, Material, Material);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_codes_roundtrip() {
        for kind in IdKind::ALL {
            assert_eq!(IdKind::from_code(kind.code()), Some(kind));
            assert_eq!(IdKind::from_code_u16(kind.code_u16()), Some(kind));
        }
        assert_eq!(IdKind::from_code(*b"ZZ"), None);
    }

    #[test]
    fn handles_from_other_graphs_are_rejected() {
        let mut a = Main::new();
        let b = Main::new();
        let mat = a
            .add(IdKind::Material, "Steel", IdData::Material(Material::default()))
            .unwrap();
        assert!(a.get(mat).is_some());
        assert!(b.get(mat).is_none());
    }

    #[test]
    fn typed_access_checks_kind() {
        let mut main = Main::new();
        let mat = main
            .add(IdKind::Material, "Steel", IdData::Material(Material::default()))
            .unwrap();
        assert!(main.material(mat).is_some());
        assert!(main.mesh(mat).is_none());
        main.material_mut(mat).unwrap().roughness = 0.25;
        assert_eq!(main.material(mat).unwrap().roughness, 0.25);
    }
}
