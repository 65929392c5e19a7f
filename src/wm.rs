#![forbid(unsafe_code)]

//! Window layer: open windows and the scene and screen each one shows.
//!
//! Windows outlive any particular graph. When history swaps the live graph
//! every window is re-pointed at the datablocks of the same name.

use crate::graph::{IdHandle, IdKind, Main};
use crate::undo::{Binding, WindowHost};

/// One open window.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Window {
    /// Scene shown in the window.
    pub scene: Option<IdHandle>,
    /// Layout of the window.
    pub screen: Option<IdHandle>,
}

/// Every open window, in opening order.
#[derive(Clone, Debug, Default)]
pub struct WindowManager {
    windows: Vec<Window>,
}

impl WindowManager {
    /// No windows.
    pub fn new() -> Self {
        Self::default()
    }

    /// One window showing the first scene and screen of `main`.
    pub fn for_main(main: &Main) -> Self {
        let mut wm = Self::new();
        wm.open(main.first(IdKind::Scene), main.first(IdKind::Screen));
        wm
    }

    /// Opens a window and returns its index.
    pub fn open(&mut self, scene: Option<IdHandle>, screen: Option<IdHandle>) -> usize {
        self.windows.push(Window { scene, screen });
        self.windows.len() - 1
    }

    /// Closes window `index`.
    pub fn close(&mut self, index: usize) -> Option<Window> {
        (index < self.windows.len()).then(|| self.windows.remove(index))
    }

    /// Open windows.
    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    /// Window `index`.
    pub fn window(&self, index: usize) -> Option<&Window> {
        self.windows.get(index)
    }

    /// Mutable window `index`.
    pub fn window_mut(&mut self, index: usize) -> Option<&mut Window> {
        self.windows.get_mut(index)
    }
}

// Window i occupies slots 2i (scene) and 2i + 1 (screen).
impl WindowHost for WindowManager {
    fn bindings(&self) -> Vec<Binding> {
        let mut out = Vec::with_capacity(self.windows.len() * 2);
        for (i, window) in self.windows.iter().enumerate() {
            let base = (i * 2) as u32;
            out.push(Binding {
                slot: base,
                kind: IdKind::Scene,
                target: window.scene,
            });
            out.push(Binding {
                slot: base + 1,
                kind: IdKind::Screen,
                target: window.screen,
            });
        }
        out
    }

    fn rebind(&mut self, bindings: Vec<Binding>) {
        for binding in bindings {
            let index = (binding.slot / 2) as usize;
            let Some(window) = self.windows.get_mut(index) else {
                continue;
            };
            match binding.kind {
                IdKind::Scene => window.scene = binding.target,
                IdKind::Screen => window.screen = binding.target,
                _ => {}
            }
        }
    }
}
