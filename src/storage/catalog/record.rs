#![forbid(unsafe_code)]

//! Name-addressed access to struct bytes laid out by a [`StructDef`].
//!
//! Setters and getters for fields that the layout does not declare are no-ops
//! (writes are dropped, reads return zero), which is what lets one encoder
//! target several layout revisions.

use crate::primitives::bytes::{get_fixed_str, le, put_fixed_str};
use crate::types::SessionUid;

use super::{FieldDef, FieldType, StructDef, ID_NAME_LEN, POINTER_LEN};

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Scalar {
    Int(i64),
    Float(f64),
}

impl Scalar {
    fn as_i64(self) -> i64 {
        match self {
            Scalar::Int(v) => v,
            Scalar::Float(v) => v as i64,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Scalar::Int(v) => v as f64,
            Scalar::Float(v) => v,
        }
    }
}

pub(crate) fn load_scalar(ty: &FieldType, src: &[u8]) -> Scalar {
    match ty {
        FieldType::Int { signed: true, .. } => Scalar::Int(le::read_int(src)),
        FieldType::Int { signed: false, .. } => Scalar::Int(le::read_uint(src) as i64),
        FieldType::Float { width: 8 } => Scalar::Float(f64::from_bits(le::read_uint(src))),
        FieldType::Float { .. } => {
            Scalar::Float(f64::from(f32::from_bits(le::read_uint(src) as u32)))
        }
        _ => Scalar::Int(0),
    }
}

pub(crate) fn store_scalar(ty: &FieldType, dst: &mut [u8], value: Scalar) {
    match ty {
        FieldType::Int { .. } => le::write_uint(dst, value.as_i64() as u64),
        FieldType::Float { width: 8 } => le::write_uint(dst, value.as_f64().to_bits()),
        FieldType::Float { .. } => le::write_uint(dst, u64::from((value.as_f64() as f32).to_bits())),
        _ => {}
    }
}

fn field_range(field: &FieldDef, elem: usize) -> std::ops::Range<usize> {
    let size = field.ty.elem_size();
    let start = field.offset as usize + elem * size;
    start..start + size
}

/// Writes fields of one struct element by name.
pub struct FieldWriter<'a> {
    def: &'a StructDef,
    buf: &'a mut [u8],
}

impl<'a> FieldWriter<'a> {
    /// Wraps one element's bytes; `buf` must be `def.size()` long.
    pub fn new(def: &'a StructDef, buf: &'a mut [u8]) -> Self {
        debug_assert_eq!(buf.len(), def.size(), "element buffer size mismatch");
        Self { def, buf }
    }

    /// Layout being written.
    pub fn def(&self) -> &StructDef {
        self.def
    }

    fn numeric(&mut self, name: &str, values: &[Scalar]) {
        let Some(field) = self.def.field(name) else {
            return;
        };
        if !field.ty.is_numeric() {
            return;
        }
        for (i, value) in values.iter().take(field.array_len as usize).enumerate() {
            let range = field_range(field, i);
            store_scalar(&field.ty, &mut self.buf[range], *value);
        }
    }

    /// Sets an integer field, converting to the declared width.
    pub fn set_int(&mut self, name: &str, value: i64) {
        self.numeric(name, &[Scalar::Int(value)]);
    }

    /// Sets a float field.
    pub fn set_float(&mut self, name: &str, value: f64) {
        self.numeric(name, &[Scalar::Float(value)]);
    }

    /// Sets a float array field; extra values are dropped.
    pub fn set_floats(&mut self, name: &str, values: &[f32]) {
        let scalars: Vec<Scalar> = values.iter().map(|v| Scalar::Float(f64::from(*v))).collect();
        self.numeric(name, &scalars);
    }

    /// Sets a `char[N]` field, truncating on a char boundary.
    pub fn set_chars(&mut self, name: &str, value: &str) {
        let Some(field) = self.def.field(name) else {
            return;
        };
        if field.ty != FieldType::Char {
            return;
        }
        let start = field.offset as usize;
        put_fixed_str(&mut self.buf[start..start + field.size as usize], value);
    }

    /// Sets a pointer field to an identity token.
    pub fn set_ptr(&mut self, name: &str, target: SessionUid) {
        let Some(field) = self.def.field(name) else {
            return;
        };
        if !matches!(field.ty, FieldType::Pointer { .. }) {
            return;
        }
        let range = field_range(field, 0);
        self.buf[range].copy_from_slice(&target.0.to_le_bytes());
    }

    /// Sets a name+type cross reference. A zero `code` stores a null reference.
    pub fn set_id_ref(&mut self, name: &str, code: u16, id_name: &str) {
        let Some(field) = self.def.field(name) else {
            return;
        };
        if field.ty != FieldType::IdRef {
            return;
        }
        let range = field_range(field, 0);
        let dst = &mut self.buf[range];
        dst[..2].copy_from_slice(&code.to_le_bytes());
        put_fixed_str(&mut dst[2..2 + ID_NAME_LEN], id_name);
    }
}

/// Reads fields of one struct element by name.
#[derive(Clone, Copy)]
pub struct FieldReader<'a> {
    def: &'a StructDef,
    buf: &'a [u8],
}

impl<'a> FieldReader<'a> {
    /// Wraps one element's bytes; `buf` must be `def.size()` long.
    pub fn new(def: &'a StructDef, buf: &'a [u8]) -> Self {
        debug_assert_eq!(buf.len(), def.size(), "element buffer size mismatch");
        Self { def, buf }
    }

    /// Layout being read.
    pub fn def(&self) -> &StructDef {
        self.def
    }

    fn numeric(&self, name: &str, elem: usize) -> Option<Scalar> {
        let field = self.def.field(name)?;
        if !field.ty.is_numeric() || elem >= field.array_len as usize {
            return None;
        }
        Some(load_scalar(&field.ty, &self.buf[field_range(field, elem)]))
    }

    /// Integer value of `name`, zero when absent.
    pub fn int(&self, name: &str) -> i64 {
        self.numeric(name, 0).map(Scalar::as_i64).unwrap_or(0)
    }

    /// Float value of `name`, zero when absent.
    pub fn float(&self, name: &str) -> f64 {
        self.numeric(name, 0).map(Scalar::as_f64).unwrap_or(0.0)
    }

    /// First `N` floats of `name`; missing elements read as zero.
    pub fn floats<const N: usize>(&self, name: &str) -> [f32; N] {
        let mut out = [0f32; N];
        for (i, slot) in out.iter_mut().enumerate() {
            if let Some(value) = self.numeric(name, i) {
                *slot = value.as_f64() as f32;
            }
        }
        out
    }

    /// Contents of a `char[N]` field, empty when absent.
    pub fn chars(&self, name: &str) -> String {
        match self.def.field(name) {
            Some(field) if field.ty == FieldType::Char => {
                let start = field.offset as usize;
                get_fixed_str(&self.buf[start..start + field.size as usize])
            }
            _ => String::new(),
        }
    }

    /// Identity token stored in a pointer field, null when absent.
    pub fn ptr(&self, name: &str) -> SessionUid {
        match self.def.field(name) {
            Some(field) if matches!(field.ty, FieldType::Pointer { .. }) => {
                let range = field_range(field, 0);
                debug_assert_eq!(range.len(), POINTER_LEN);
                SessionUid(le::read_uint(&self.buf[range]))
            }
            _ => SessionUid::NULL,
        }
    }

    /// Kind code and name of a cross reference, `None` for a null reference.
    pub fn id_ref(&self, name: &str) -> Option<(u16, String)> {
        let field = self.def.field(name)?;
        if field.ty != FieldType::IdRef {
            return None;
        }
        let src = &self.buf[field_range(field, 0)];
        let code = u16::from_le_bytes([src[0], src[1]]);
        if code == 0 {
            return None;
        }
        Some((code, get_fixed_str(&src[2..2 + ID_NAME_LEN])))
    }
}
