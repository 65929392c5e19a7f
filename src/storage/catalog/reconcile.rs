#![forbid(unsafe_code)]

use crate::types::{DocError, Result};
use tracing::trace;

use super::record::{load_scalar, store_scalar};
use super::{FieldType, StructDef};

#[derive(Clone, Debug)]
enum CopyKind {
    Numeric {
        src_ty: FieldType,
        dst_ty: FieldType,
    },
    Bytes {
        terminate: bool,
    },
}

#[derive(Clone, Debug)]
struct FieldCopy {
    src_offset: usize,
    dst_offset: usize,
    src_elem: usize,
    dst_elem: usize,
    src_len: usize,
    dst_len: usize,
    copy: CopyKind,
}

/// Translation from a stored struct layout to the compiled one.
///
/// Fields are matched by name. Missing fields stay zero, fields only the
/// stored layout knows are skipped.
#[derive(Clone, Debug)]
pub struct StructMap {
    src_size: usize,
    dst_size: usize,
    identity: bool,
    copies: Vec<FieldCopy>,
}

impl StructMap {
    /// Plans the copy from `src` (embedded catalog) to `dst` (compiled).
    pub fn new(src: &StructDef, dst: &StructDef) -> Self {
        if src == dst {
            return Self {
                src_size: src.size(),
                dst_size: dst.size(),
                identity: true,
                copies: Vec::new(),
            };
        }
        let mut copies = Vec::new();
        for dst_field in dst.fields() {
            let Some(src_field) = src.field(&dst_field.name) else {
                trace!(
                    r#struct = dst.name(),
                    field = dst_field.name.as_str(),
                    "catalog.reconcile.zero_fill"
                );
                continue;
            };
            let copy = match (&src_field.ty, &dst_field.ty) {
                (s, d) if s.is_numeric() && d.is_numeric() => CopyKind::Numeric {
                    src_ty: s.clone(),
                    dst_ty: d.clone(),
                },
                (FieldType::Char, FieldType::Char) => CopyKind::Bytes { terminate: true },
                (FieldType::Pointer { .. }, FieldType::Pointer { .. })
                | (FieldType::IdRef, FieldType::IdRef) => CopyKind::Bytes { terminate: false },
                _ => {
                    trace!(
                        r#struct = dst.name(),
                        field = dst_field.name.as_str(),
                        "catalog.reconcile.class_mismatch"
                    );
                    continue;
                }
            };
            copies.push(FieldCopy {
                src_offset: src_field.offset as usize,
                dst_offset: dst_field.offset as usize,
                src_elem: src_field.ty.elem_size(),
                dst_elem: dst_field.ty.elem_size(),
                src_len: src_field.array_len as usize,
                dst_len: dst_field.array_len as usize,
                copy,
            });
        }
        Self {
            src_size: src.size(),
            dst_size: dst.size(),
            identity: false,
            copies,
        }
    }

    /// Returns true when both layouts are identical.
    pub fn is_identity(&self) -> bool {
        self.identity
    }

    /// Size of one compiled element.
    pub fn dst_size(&self) -> usize {
        self.dst_size
    }

    /// Translates `count` stored elements into a freshly allocated buffer.
    pub fn remap(&self, src: &[u8], count: usize) -> Result<Vec<u8>> {
        let expected = self
            .src_size
            .checked_mul(count)
            .ok_or(DocError::Corrupt("block element count overflow"))?;
        if src.len() != expected {
            return Err(DocError::Corrupt("block length does not match struct size"));
        }
        let total = self
            .dst_size
            .checked_mul(count)
            .ok_or(DocError::Corrupt("block element count overflow"))?;
        let mut out = Vec::new();
        out.try_reserve_exact(total).map_err(DocError::oom(total))?;
        if self.identity {
            out.extend_from_slice(src);
            return Ok(out);
        }
        out.resize(total, 0);
        for elem in 0..count {
            let s = &src[elem * self.src_size..(elem + 1) * self.src_size];
            let d = &mut out[elem * self.dst_size..(elem + 1) * self.dst_size];
            for copy in &self.copies {
                copy.apply(s, d);
            }
        }
        Ok(out)
    }
}

impl FieldCopy {
    fn apply(&self, src: &[u8], dst: &mut [u8]) {
        match &self.copy {
            CopyKind::Numeric { src_ty, dst_ty } => {
                for i in 0..self.src_len.min(self.dst_len) {
                    let s = self.src_offset + i * self.src_elem;
                    let d = self.dst_offset + i * self.dst_elem;
                    let value = load_scalar(src_ty, &src[s..s + self.src_elem]);
                    store_scalar(dst_ty, &mut dst[d..d + self.dst_elem], value);
                }
            }
            CopyKind::Bytes { terminate } => {
                let src_bytes = self.src_elem * self.src_len;
                let dst_bytes = self.dst_elem * self.dst_len;
                let mut n = src_bytes.min(dst_bytes);
                if *terminate && src_bytes > dst_bytes {
                    n = n.saturating_sub(1);
                }
                dst[self.dst_offset..self.dst_offset + n]
                    .copy_from_slice(&src[self.src_offset..self.src_offset + n]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{FieldReader, FieldWriter};
    use super::*;
    use crate::types::SessionUid;

    fn old_layout() -> StructDef {
        StructDef::builder("Object")
            .chars("name", 16)
            .int("us", 2)
            .floats("loc", 8, 3)
            .int("legacy_flag", 4)
            .pointer("data", "Mesh")
            .finish()
    }

    fn new_layout() -> StructDef {
        StructDef::builder("Object")
            .chars("name", 8)
            .pointer("data", "Mesh")
            .int("us", 4)
            .floats("loc", 4, 4)
            .f32("added")
            .finish()
    }

    #[test]
    fn identical_layouts_copy_verbatim() {
        let def = new_layout();
        let map = StructMap::new(&def, &def);
        assert!(map.is_identity());
        let src = vec![7u8; def.size() * 2];
        assert_eq!(map.remap(&src, 2).unwrap(), src);
    }

    #[test]
    fn fields_move_widen_and_zero_fill() {
        let old = old_layout();
        let new = new_layout();
        let mut src = vec![0u8; old.size()];
        {
            let mut w = FieldWriter::new(&old, &mut src);
            w.set_chars("name", "LongObjectName");
            w.set_int("us", -2);
            w.set_floats("loc", &[1.5, -2.0, 3.25]);
            w.set_int("legacy_flag", 9);
            w.set_ptr("data", SessionUid(0xabc));
        }
        let map = StructMap::new(&old, &new);
        assert!(!map.is_identity());
        let out = map.remap(&src, 1).unwrap();
        let r = FieldReader::new(&new, &out);
        assert_eq!(r.chars("name"), "LongObj");
        assert_eq!(r.int("us"), -2);
        assert_eq!(r.floats::<4>("loc"), [1.5, -2.0, 3.25, 0.0]);
        assert_eq!(r.float("added"), 0.0);
        assert_eq!(r.ptr("data"), SessionUid(0xabc));
    }

    #[test]
    fn length_mismatch_is_corruption() {
        let def = new_layout();
        let map = StructMap::new(&def, &def);
        assert!(matches!(
            map.remap(&[0u8; 3], 1),
            Err(DocError::Corrupt(_))
        ));
    }
}
