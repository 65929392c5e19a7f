#![forbid(unsafe_code)]

//! Structural type catalog embedded in every snapshot.
//!
//! A [`Catalog`] lists the field layout of every serializable struct. The
//! writer emits it as the first block so a reader built against a different
//! layout can still locate each field by name.

use std::sync::OnceLock;

use rustc_hash::FxHashMap;

use crate::primitives::bytes::{buf::Cursor, le};
use crate::types::{DocError, Result};
use tracing::trace;

mod reconcile;
mod record;

pub use reconcile::StructMap;
pub use record::{FieldReader, FieldWriter};

/// Bytes reserved for an ID name, including the terminating NUL.
pub const ID_NAME_LEN: usize = 64;
/// Bytes of a name+type cross reference: 2-byte kind code plus the name.
pub const ID_REF_LEN: usize = 2 + ID_NAME_LEN;
/// Bytes of a serialized pointer.
pub const POINTER_LEN: usize = 8;

const CATALOG_TAG: [u8; 4] = *b"SDNA";

const TAG_INT_SIGNED: u8 = 1;
const TAG_INT_UNSIGNED: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_CHAR: u8 = 4;
const TAG_POINTER: u8 = 5;
const TAG_ID_REF: u8 = 6;

/// Storage class of one field element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldType {
    /// Two's complement or unsigned integer of `width` bytes.
    Int {
        /// Width in bytes: 1, 2, 4 or 8.
        width: u8,
        /// Whether the value is sign extended on load.
        signed: bool,
    },
    /// IEEE float of `width` bytes (4 or 8).
    Float {
        /// Width in bytes.
        width: u8,
    },
    /// One byte of a NUL padded string.
    Char,
    /// Identity token of another block, relinked on read.
    Pointer {
        /// Struct name the pointer is declared against.
        target: String,
    },
    /// Cross reference by ID kind code and name, resolved after linking.
    IdRef,
}

impl FieldType {
    /// Size of a single element.
    pub fn elem_size(&self) -> usize {
        match self {
            FieldType::Int { width, .. } | FieldType::Float { width } => *width as usize,
            FieldType::Char => 1,
            FieldType::Pointer { .. } => POINTER_LEN,
            FieldType::IdRef => ID_REF_LEN,
        }
    }

    fn tag(&self) -> u8 {
        match self {
            FieldType::Int { signed: true, .. } => TAG_INT_SIGNED,
            FieldType::Int { signed: false, .. } => TAG_INT_UNSIGNED,
            FieldType::Float { .. } => TAG_FLOAT,
            FieldType::Char => TAG_CHAR,
            FieldType::Pointer { .. } => TAG_POINTER,
            FieldType::IdRef => TAG_ID_REF,
        }
    }

    /// Returns true for integer and float fields.
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Int { .. } | FieldType::Float { .. })
    }
}

/// One field of a struct layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name, unique within the struct.
    pub name: String,
    /// Element type.
    pub ty: FieldType,
    /// Number of elements (1 for scalars).
    pub array_len: u16,
    /// Byte offset within the struct.
    pub offset: u32,
    /// Total size in bytes (`elem_size * array_len`).
    pub size: u32,
}

/// Resolved location of a field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldLoc {
    /// Byte offset within the struct.
    pub offset: u32,
    /// Total size in bytes.
    pub size: u32,
    /// Element type.
    pub ty: FieldType,
}

/// Layout of one serializable struct.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructDef {
    name: String,
    size: u32,
    fields: Vec<FieldDef>,
}

impl StructDef {
    /// Starts a packed layout named `name`.
    pub fn builder(name: &str) -> StructBuilder {
        StructBuilder {
            name: name.to_string(),
            fields: Vec::new(),
            offset: 0,
        }
    }

    /// Struct name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of one element in bytes.
    pub fn size(&self) -> usize {
        self.size as usize
    }

    /// Ordered fields.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields holding pointers, in declaration order.
    pub fn pointer_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields
            .iter()
            .filter(|f| matches!(f.ty, FieldType::Pointer { .. }))
    }
}

/// Incremental builder computing packed field offsets.
#[derive(Debug)]
pub struct StructBuilder {
    name: String,
    fields: Vec<FieldDef>,
    offset: u32,
}

impl StructBuilder {
    /// Appends a field with `array_len` elements of `ty`.
    pub fn field(mut self, name: &str, ty: FieldType, array_len: u16) -> Self {
        let size = (ty.elem_size() * array_len as usize) as u32;
        self.fields.push(FieldDef {
            name: name.to_string(),
            ty,
            array_len,
            offset: self.offset,
            size,
        });
        self.offset += size;
        self
    }

    /// Appends a signed integer of `width` bytes.
    pub fn int(self, name: &str, width: u8) -> Self {
        self.field(
            name,
            FieldType::Int {
                width,
                signed: true,
            },
            1,
        )
    }

    /// Appends an unsigned integer of `width` bytes.
    pub fn uint(self, name: &str, width: u8) -> Self {
        self.field(
            name,
            FieldType::Int {
                width,
                signed: false,
            },
            1,
        )
    }

    /// Appends `len` floats of `width` bytes.
    pub fn floats(self, name: &str, width: u8, len: u16) -> Self {
        self.field(name, FieldType::Float { width }, len)
    }

    /// Appends a single `f32`.
    pub fn f32(self, name: &str) -> Self {
        self.floats(name, 4, 1)
    }

    /// Appends a NUL padded `char[len]`.
    pub fn chars(self, name: &str, len: u16) -> Self {
        self.field(name, FieldType::Char, len)
    }

    /// Appends a pointer to `target`.
    pub fn pointer(self, name: &str, target: &str) -> Self {
        self.field(
            name,
            FieldType::Pointer {
                target: target.to_string(),
            },
            1,
        )
    }

    /// Appends a name+type cross reference.
    pub fn id_ref(self, name: &str) -> Self {
        self.field(name, FieldType::IdRef, 1)
    }

    /// Appends the header shared by every ID struct: `name` and `us`.
    pub fn id_header(self) -> Self {
        self.chars("name", ID_NAME_LEN as u16).int("us", 4)
    }

    /// Finishes the layout.
    pub fn finish(self) -> StructDef {
        StructDef {
            name: self.name,
            size: self.offset,
            fields: self.fields,
        }
    }
}

/// Ordered set of struct layouts with a name index.
#[derive(Clone, Debug)]
pub struct Catalog {
    structs: Vec<StructDef>,
    index: FxHashMap<String, u32>,
}

impl PartialEq for Catalog {
    fn eq(&self, other: &Self) -> bool {
        self.structs == other.structs
    }
}

impl Catalog {
    /// Builds a catalog, rejecting duplicate struct or field names.
    pub fn new(structs: Vec<StructDef>) -> Result<Self> {
        let mut index = FxHashMap::with_capacity_and_hasher(structs.len(), Default::default());
        for (i, def) in structs.iter().enumerate() {
            validate_struct(def)?;
            if index.insert(def.name.clone(), i as u32).is_some() {
                return Err(DocError::Invalid("duplicate struct name in catalog"));
            }
        }
        Ok(Self { structs, index })
    }

    /// Catalog of the layouts compiled into this build.
    pub fn compiled() -> &'static Catalog {
        static COMPILED: OnceLock<Catalog> = OnceLock::new();
        COMPILED.get_or_init(|| {
            let structs = crate::graph::compiled_struct_defs();
            let index = structs
                .iter()
                .enumerate()
                .map(|(i, def)| (def.name.clone(), i as u32))
                .collect();
            Catalog { structs, index }
        })
    }

    /// Returns a copy where the struct named like `def` is replaced (or appended).
    pub fn with_struct(&self, def: StructDef) -> Result<Self> {
        let mut structs = self.structs.clone();
        match structs.iter_mut().find(|s| s.name == def.name) {
            Some(slot) => *slot = def,
            None => structs.push(def),
        }
        Catalog::new(structs)
    }

    /// Number of structs.
    pub fn len(&self) -> usize {
        self.structs.len()
    }

    /// Returns true if the catalog holds no structs.
    pub fn is_empty(&self) -> bool {
        self.structs.is_empty()
    }

    /// All structs in index order.
    pub fn structs(&self) -> &[StructDef] {
        &self.structs
    }

    /// Struct at `index`.
    pub fn get(&self, index: u32) -> Option<&StructDef> {
        self.structs.get(index as usize)
    }

    /// Index of the struct named `name`.
    pub fn index_of(&self, name: &str) -> Option<u32> {
        self.index.get(name).copied()
    }

    /// Struct named `name`.
    pub fn find(&self, name: &str) -> Option<&StructDef> {
        self.index_of(name).and_then(|i| self.get(i))
    }

    /// Resolves `type_name.field_name` to its location.
    pub fn resolve(&self, type_name: &str, field_name: &str) -> Result<FieldLoc> {
        let def = self.find(type_name).ok_or(DocError::NotFound("struct"))?;
        let field = def.field(field_name).ok_or(DocError::NotFound("field"))?;
        Ok(FieldLoc {
            offset: field.offset,
            size: field.size,
            ty: field.ty.clone(),
        })
    }

    /// Serializes the catalog into a block payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(&CATALOG_TAG);
        le::put_u32(&mut out, self.structs.len() as u32);
        for def in &self.structs {
            le::put_str(&mut out, &def.name)?;
            le::put_u32(&mut out, def.size);
            let count: u16 = def
                .fields
                .len()
                .try_into()
                .map_err(|_| DocError::Invalid("too many fields in struct"))?;
            le::put_u16(&mut out, count);
            for field in &def.fields {
                le::put_str(&mut out, &field.name)?;
                out.push(field.ty.tag());
                out.push(field.ty.elem_size().min(u8::MAX as usize) as u8);
                le::put_u16(&mut out, field.array_len);
                le::put_u32(&mut out, field.offset);
                le::put_u32(&mut out, field.size);
                if let FieldType::Pointer { target } = &field.ty {
                    le::put_str(&mut out, target)?;
                }
            }
        }
        Ok(out)
    }

    /// Parses a catalog block payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        if cursor.take(4)? != CATALOG_TAG {
            return Err(DocError::Corrupt("catalog tag mismatch"));
        }
        let struct_count = cursor.u32()? as usize;
        let mut structs = Vec::with_capacity(struct_count.min(1024));
        for _ in 0..struct_count {
            let name = cursor.str()?.to_string();
            let size = cursor.u32()?;
            let field_count = cursor.u16()? as usize;
            let mut fields = Vec::with_capacity(field_count);
            for _ in 0..field_count {
                let field_name = cursor.str()?.to_string();
                let tag = cursor.u8()?;
                let width = cursor.u8()?;
                let array_len = cursor.u16()?;
                let offset = cursor.u32()?;
                let field_size = cursor.u32()?;
                let ty = match tag {
                    TAG_INT_SIGNED | TAG_INT_UNSIGNED => {
                        if !matches!(width, 1 | 2 | 4 | 8) {
                            return Err(DocError::Corrupt("invalid integer width"));
                        }
                        FieldType::Int {
                            width,
                            signed: tag == TAG_INT_SIGNED,
                        }
                    }
                    TAG_FLOAT => {
                        if !matches!(width, 4 | 8) {
                            return Err(DocError::Corrupt("invalid float width"));
                        }
                        FieldType::Float { width }
                    }
                    TAG_CHAR => FieldType::Char,
                    TAG_POINTER => FieldType::Pointer {
                        target: cursor.str()?.to_string(),
                    },
                    TAG_ID_REF => FieldType::IdRef,
                    other => {
                        return Err(DocError::UnsupportedVersion(format!(
                            "unknown field type tag 0x{other:02X} in struct {name}"
                        )))
                    }
                };
                fields.push(FieldDef {
                    name: field_name,
                    ty,
                    array_len,
                    offset,
                    size: field_size,
                });
            }
            structs.push(StructDef { name, size, fields });
        }
        cursor.ensure_consumed()?;
        let catalog = Catalog::new(structs).map_err(|err| match err {
            DocError::Invalid(_) => DocError::Corrupt("catalog layout inconsistent"),
            other => other,
        })?;
        trace!(structs = catalog.len(), "catalog.decode");
        Ok(catalog)
    }
}

fn validate_struct(def: &StructDef) -> Result<()> {
    for (i, field) in def.fields.iter().enumerate() {
        let expected = field.ty.elem_size() as u64 * u64::from(field.array_len);
        if u64::from(field.size) != expected {
            return Err(DocError::Invalid("field size does not match its type"));
        }
        if u64::from(field.offset) + expected > u64::from(def.size) {
            return Err(DocError::Invalid("field extends past struct size"));
        }
        if def.fields[..i].iter().any(|f| f.name == field.name) {
            return Err(DocError::Invalid("duplicate field name"));
        }
    }
    Ok(())
}
