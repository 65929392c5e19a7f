#![forbid(unsafe_code)]

//! Mapping between datablocks and their catalog struct layouts.

use crate::graph::{
    Datablock, IdData, IdKind, Material, Mesh, Object, Scene, Screen, Vertex,
};
use crate::storage::catalog::{FieldReader, FieldWriter, StructDef};
use crate::storage::reader::LinkCtx;
use crate::storage::writer::WriteCtx;
use crate::types::Result;

pub(crate) const VERTEX: &str = "Vertex";
pub(crate) const LINK: &str = "Link";

const SLOT_OBJECTS: u8 = 0;
const SLOT_VERTICES: u8 = 0;

const MESH_SMOOTH: i64 = 1 << 0;

/// Struct layouts of this build, in catalog order.
pub fn compiled_struct_defs() -> Vec<StructDef> {
    vec![
        StructDef::builder(IdKind::Scene.struct_name())
            .id_header()
            .int("frame_current", 4)
            .int("frame_end", 4)
            .pointer("camera", IdKind::Object.struct_name())
            .pointer("objects", LINK)
            .finish(),
        StructDef::builder(IdKind::Screen.struct_name())
            .id_header()
            .id_ref("scene")
            .int("layout", 4)
            .finish(),
        StructDef::builder(IdKind::Object.struct_name())
            .id_header()
            .pointer("data", IdKind::Mesh.struct_name())
            .pointer("parent", IdKind::Object.struct_name())
            .pointer("mat", IdKind::Material.struct_name())
            .floats("loc", 4, 3)
            .floats("size", 4, 3)
            .finish(),
        StructDef::builder(IdKind::Mesh.struct_name())
            .id_header()
            .pointer("verts", VERTEX)
            .pointer("mat", IdKind::Material.struct_name())
            .uint("flag", 2)
            .finish(),
        StructDef::builder(IdKind::Material.struct_name())
            .id_header()
            .floats("color", 4, 3)
            .f32("roughness")
            .f32("metallic")
            .finish(),
        StructDef::builder(VERTEX)
            .floats("co", 4, 3)
            .uint("flag", 1)
            .finish(),
        StructDef::builder(LINK).pointer("ptr", "ID").finish(),
    ]
}

/// Fills the payload of an ID block. Sub-data is queued on `ctx`.
pub(crate) fn encode_id(
    block: &Datablock,
    w: &mut FieldWriter<'_>,
    ctx: &mut WriteCtx<'_>,
) -> Result<()> {
    w.set_chars("name", block.name());
    w.set_int("us", i64::from(block.header.use_count));
    match &block.data {
        IdData::Scene(scene) => {
            w.set_int("frame_current", i64::from(scene.frame_current));
            w.set_int("frame_end", i64::from(scene.frame_end));
            w.set_ptr("camera", ctx.id_ptr(scene.camera));
            let objects = ctx.id_array(SLOT_OBJECTS, &scene.objects)?;
            w.set_ptr("objects", objects);
        }
        IdData::Screen(screen) => {
            let (code, name) = ctx.name_ref(&screen.scene);
            w.set_id_ref("scene", code, &name);
            w.set_int("layout", i64::from(screen.layout));
        }
        IdData::Object(ob) => {
            w.set_ptr("data", ctx.id_ptr(ob.data));
            w.set_ptr("parent", ctx.id_ptr(ob.parent));
            w.set_ptr("mat", ctx.id_ptr(ob.material));
            w.set_floats("loc", &ob.location);
            w.set_floats("size", &ob.scale);
        }
        IdData::Mesh(mesh) => {
            let verts = ctx.data_array(SLOT_VERTICES, VERTEX, &mesh.vertices, |v, vw| {
                vw.set_floats("co", &v.co);
                vw.set_int("flag", i64::from(v.flag));
            })?;
            w.set_ptr("verts", verts);
            w.set_ptr("mat", ctx.id_ptr(mesh.material));
            w.set_int("flag", if mesh.smooth { MESH_SMOOTH } else { 0 });
        }
        IdData::Material(ma) => {
            w.set_floats("color", &ma.color);
            w.set_float("roughness", f64::from(ma.roughness));
            w.set_float("metallic", f64::from(ma.metallic));
        }
    }
    Ok(())
}

/// Rebuilds the data of an ID block, resolving pointers through `ctx`.
pub(crate) fn decode_id(
    kind: IdKind,
    r: &FieldReader<'_>,
    ctx: &mut LinkCtx<'_>,
) -> Result<IdData> {
    let data = match kind {
        IdKind::Scene => IdData::Scene(Scene {
            frame_current: r.int("frame_current") as i32,
            frame_end: r.int("frame_end") as i32,
            camera: ctx.id_ptr(r.ptr("camera"), IdKind::Object),
            objects: ctx.id_array(r.ptr("objects"), IdKind::Object)?,
        }),
        IdKind::Screen => IdData::Screen(Screen {
            scene: ctx.name_ref(r.id_ref("scene"), IdKind::Scene),
            layout: r.int("layout") as i32,
        }),
        IdKind::Object => IdData::Object(Object {
            data: ctx.id_ptr(r.ptr("data"), IdKind::Mesh),
            parent: ctx.id_ptr(r.ptr("parent"), IdKind::Object),
            material: ctx.id_ptr(r.ptr("mat"), IdKind::Material),
            location: r.floats("loc"),
            scale: r.floats("size"),
        }),
        IdKind::Mesh => {
            let mut vertices = Vec::new();
            ctx.data_array(r.ptr("verts"), VERTEX, |vr| {
                vertices.push(Vertex {
                    co: vr.floats("co"),
                    flag: vr.int("flag") as u8,
                });
            })?;
            IdData::Mesh(Mesh {
                vertices,
                material: ctx.id_ptr(r.ptr("mat"), IdKind::Material),
                smooth: r.int("flag") & MESH_SMOOTH != 0,
            })
        }
        IdKind::Material => IdData::Material(Material {
            color: r.floats("color"),
            roughness: r.float("roughness") as f32,
            metallic: r.float("metallic") as f32,
        }),
    };
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::catalog::Catalog;

    #[test]
    fn every_kind_has_a_compiled_struct() {
        let catalog = Catalog::compiled();
        for kind in IdKind::ALL {
            let def = catalog.find(kind.struct_name()).unwrap();
            assert!(def.field("name").is_some());
            assert!(def.field("us").is_some());
        }
        assert!(catalog.find(VERTEX).is_some());
        assert!(catalog.find(LINK).is_some());
    }

    #[test]
    fn compiled_defs_form_a_valid_catalog() {
        assert!(Catalog::new(compiled_struct_defs()).is_ok());
    }
}
