#![forbid(unsafe_code)]

use std::fmt::Write;

use crate::graph::{IdData, IdHandle, Main};

impl Main {
    fn target_label(&self, handle: Option<IdHandle>) -> String {
        match handle.and_then(|h| self.get(h)) {
            Some(block) => format!("{}:{}", block.header.kind, block.name()),
            None => "-".to_string(),
        }
    }

    /// Deterministic text rendering of the graph.
    ///
    /// Pointers are rendered as `Kind:name`, so two graphs with the same
    /// names, field values and pointer topology render identically no matter
    /// which handles they use.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        for handle in self.handles() {
            let Some(block) = self.get(handle) else {
                continue;
            };
            let _ = write!(
                out,
                "{}:{} us={}",
                block.header.kind,
                block.name(),
                block.header.use_count
            );
            match &block.data {
                IdData::Scene(scene) => {
                    let objects: Vec<String> = scene
                        .objects
                        .iter()
                        .map(|h| self.target_label(Some(*h)))
                        .collect();
                    let _ = write!(
                        out,
                        " frame={}/{} camera={} objects=[{}]",
                        scene.frame_current,
                        scene.frame_end,
                        self.target_label(scene.camera),
                        objects.join(",")
                    );
                }
                IdData::Screen(screen) => {
                    let _ = write!(
                        out,
                        " scene={} layout={}",
                        self.target_label(screen.scene.target()),
                        screen.layout
                    );
                }
                IdData::Object(ob) => {
                    let _ = write!(
                        out,
                        " data={} parent={} mat={} loc={:?} size={:?}",
                        self.target_label(ob.data),
                        self.target_label(ob.parent),
                        self.target_label(ob.material),
                        ob.location,
                        ob.scale
                    );
                }
                IdData::Mesh(mesh) => {
                    let _ = write!(
                        out,
                        " mat={} smooth={} verts={:?}",
                        self.target_label(mesh.material),
                        mesh.smooth,
                        mesh.vertices
                            .iter()
                            .map(|v| (v.co, v.flag))
                            .collect::<Vec<_>>()
                    );
                }
                IdData::Material(ma) => {
                    let _ = write!(
                        out,
                        " color={:?} roughness={} metallic={}",
                        ma.color, ma.roughness, ma.metallic
                    );
                }
            }
            out.push('\n');
        }
        out
    }
}
