#![forbid(unsafe_code)]

use tracing::{debug, warn};

use crate::graph::{Datablock, IdData, IdHandle, IdHeader, IdKind, Main, Slot};
use crate::primitives::bytes::floor_char_boundary;
use crate::types::{DocError, Result, SessionUid};

/// Longest ID name in bytes; one byte of the stored field is the terminator.
pub const MAX_NAME_LEN: usize = crate::storage::catalog::ID_NAME_LEN - 1;

const MAX_SUFFIX: u32 = 999;

/// Splits a trailing `.NNN` (all digits) off `name`.
fn split_suffix(name: &str) -> (&str, Option<u32>) {
    if let Some((base, digits)) = name.rsplit_once('.') {
        if !digits.is_empty() && digits.len() <= 3 && digits.bytes().all(|b| b.is_ascii_digit()) {
            return (base, digits.parse().ok());
        }
    }
    (name, None)
}

pub(crate) fn clamp_name(name: &str, max: usize) -> &str {
    &name[..floor_char_boundary(name, max)]
}

impl Main {
    /// Name `requested` would get in `kind`'s list.
    ///
    /// Free names are kept as-is; taken ones get the lowest free `.NNN`
    /// suffix on their base name. Names are clamped to [`MAX_NAME_LEN`].
    pub fn unique_name(&self, kind: IdKind, requested: &str) -> String {
        let list = &self.lists[kind.index()];
        let requested = clamp_name(requested, MAX_NAME_LEN);
        if !requested.is_empty() && !list.contains_key(requested) {
            return requested.to_string();
        }
        let (base, _) = split_suffix(requested);
        let base = if base.is_empty() { kind.struct_name() } else { base };
        let base = clamp_name(base, MAX_NAME_LEN - 4);
        for n in 1..=MAX_SUFFIX {
            let candidate = format!("{base}.{n:03}");
            if !list.contains_key(&candidate) {
                return candidate;
            }
        }
        // Every three digit suffix is taken; widen.
        let mut n = MAX_SUFFIX + 1;
        loop {
            let candidate = format!("{}.{n}", clamp_name(base, MAX_NAME_LEN - 1 - n.to_string().len()));
            if !list.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Adds a datablock under a unique variant of `requested`.
    pub fn add(&mut self, kind: IdKind, requested: &str, data: IdData) -> Result<IdHandle> {
        if data.kind() != kind {
            return Err(DocError::Invalid("datablock data does not match its kind"));
        }
        let name = self.unique_name(kind, requested);
        let uid = SessionUid(self.next_uid);
        self.next_uid += 1;
        let handle = self.install(Datablock {
            header: IdHeader {
                name: name.clone(),
                kind,
                use_count: 0,
                uid,
                registry: self.registry,
            },
            data,
        });
        self.lists[kind.index()].insert(name, handle);
        debug!(kind = %kind, name = self.name_of(handle).unwrap_or_default(), uid = %uid, "graph.id.add");
        Ok(handle)
    }

    fn install(&mut self, block: Datablock) -> IdHandle {
        if let Some(index) = self.free_slots.pop() {
            let slot = &mut self.slots[index as usize];
            slot.block = Some(block);
            return IdHandle::new(self.registry, index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            block: Some(block),
        });
        IdHandle::new(self.registry, index, 0)
    }

    /// Builds a graph from datablocks decoded out of a snapshot.
    ///
    /// Datablock `i` lives behind `IdHandle::new(registry, i, 0)`; the
    /// identity counter resumes past the largest identity seen.
    pub(crate) fn from_loaded(
        registry: crate::graph::RegistryId,
        blocks: Vec<Datablock>,
    ) -> Result<Main> {
        let mut main = Main::with_registry(registry);
        let mut max_uid = 0;
        main.slots.reserve(blocks.len());
        for mut block in blocks {
            block.header.registry = registry;
            max_uid = max_uid.max(block.header.uid.0);
            let kind = block.header.kind;
            let name = block.header.name.clone();
            let handle = main.install(block);
            if main.lists[kind.index()].insert(name, handle).is_some() {
                return Err(DocError::Corrupt("duplicate ID name in snapshot"));
            }
        }
        main.next_uid = max_uid + 1;
        Ok(main)
    }

    /// Handle of the datablock named `name` in `kind`'s list.
    pub fn lookup(&self, kind: IdKind, name: &str) -> Option<IdHandle> {
        self.lists[kind.index()].get(name).copied()
    }

    /// Increments the use count of `handle`.
    pub fn retain(&mut self, handle: IdHandle) -> Result<u32> {
        let block = self
            .get_mut(handle)
            .ok_or(DocError::NotFound("datablock"))?;
        block.header.use_count = block.header.use_count.saturating_add(1);
        Ok(block.header.use_count)
    }

    /// Decrements the use count of `handle`, saturating at zero.
    pub fn release(&mut self, handle: IdHandle) -> Result<u32> {
        let block = self
            .get_mut(handle)
            .ok_or(DocError::NotFound("datablock"))?;
        if block.header.use_count == 0 {
            warn!(name = block.header.name.as_str(), "graph.id.release_underflow");
        } else {
            block.header.use_count -= 1;
        }
        Ok(block.header.use_count)
    }

    /// Removes a datablock. Stale handles to it stop resolving.
    pub fn free(&mut self, handle: IdHandle) -> Result<Datablock> {
        if self.get(handle).is_none() {
            return Err(DocError::NotFound("datablock"));
        }
        let slot = &mut self.slots[handle.index as usize];
        let block = slot.block.take().ok_or(DocError::NotFound("datablock"))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_slots.push(handle.index);
        self.lists[block.header.kind.index()].remove(&block.header.name);
        if block.header.use_count > 0 {
            debug!(
                name = block.header.name.as_str(),
                users = block.header.use_count,
                "graph.id.free_referenced"
            );
        }
        Ok(block)
    }

    /// Renames a datablock, uniquifying `requested`. Returns the final name.
    pub fn rename(&mut self, handle: IdHandle, requested: &str) -> Result<String> {
        let (kind, old) = match self.get(handle) {
            Some(block) => (block.header.kind, block.header.name.clone()),
            None => return Err(DocError::NotFound("datablock")),
        };
        if clamp_name(requested, MAX_NAME_LEN) == old {
            return Ok(old);
        }
        self.lists[kind.index()].remove(&old);
        let name = self.unique_name(kind, requested);
        self.lists[kind.index()].insert(name.clone(), handle);
        if let Some(block) = self.get_mut(handle) {
            block.header.name = name.clone();
        }
        Ok(name)
    }
}
