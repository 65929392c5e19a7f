#![forbid(unsafe_code)]

use serde::Serialize;
use tracing::debug;

use crate::graph::{IdHandle, IdKind, Main};

/// One association the window layer keeps onto the live graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    /// Host-defined slot the association lives in.
    pub slot: u32,
    /// Kind of datablock the slot expects.
    pub kind: IdKind,
    /// Bound datablock.
    pub target: Option<IdHandle>,
}

/// Owner of associations that must survive a graph swap.
pub trait WindowHost {
    /// Current associations onto the outgoing graph.
    fn bindings(&self) -> Vec<Binding>;
    /// Receives the associations re-resolved onto the new graph.
    fn rebind(&mut self, bindings: Vec<Binding>);
}

/// Host without any windows.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoWindows;

impl WindowHost for NoWindows {
    fn bindings(&self) -> Vec<Binding> {
        Vec::new()
    }

    fn rebind(&mut self, _bindings: Vec<Binding>) {}
}

/// What one swap did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SwapReport {
    /// Datablocks freed with the outgoing graph.
    pub freed_ids: usize,
    /// Bindings found again by name.
    pub rebound: usize,
    /// Bindings that fell back to the first datablock of their kind.
    pub fallback: usize,
    /// Bindings left empty because the new graph has no datablock of the kind.
    pub unbound: usize,
}

/// Replaces `live` with `incoming`, carrying the window layer's bindings over
/// by name.
///
/// `incoming` must be fully linked. A binding whose target no longer exists
/// under its old name is bound to the first datablock of its kind.
pub fn swap_main(live: &mut Main, mut incoming: Main, host: &mut dyn WindowHost) -> SwapReport {
    let detached: Vec<(Binding, Option<String>)> = host
        .bindings()
        .into_iter()
        .map(|binding| {
            let name = binding
                .target
                .and_then(|handle| live.name_of(handle))
                .map(str::to_owned);
            (binding, name)
        })
        .collect();

    incoming.bump_uid_floor(live.next_uid());
    let outgoing = std::mem::replace(live, incoming);
    let mut report = SwapReport {
        freed_ids: outgoing.free_all(),
        ..SwapReport::default()
    };

    let mut rebound = Vec::with_capacity(detached.len());
    for (mut binding, name) in detached {
        let by_name = name
            .as_deref()
            .and_then(|name| live.lookup(binding.kind, name));
        binding.target = match by_name {
            Some(handle) => {
                report.rebound += 1;
                Some(handle)
            }
            None => match live.first(binding.kind) {
                Some(handle) => {
                    debug!(
                        slot = binding.slot,
                        kind = %binding.kind,
                        missing = name.as_deref().unwrap_or("-"),
                        "swap.rebind.fallback"
                    );
                    report.fallback += 1;
                    Some(handle)
                }
                None => {
                    report.unbound += 1;
                    None
                }
            },
        };
        rebound.push(binding);
    }
    host.rebind(rebound);
    debug!(
        freed = report.freed_ids,
        rebound = report.rebound,
        fallback = report.fallback,
        unbound = report.unbound,
        "swap.complete"
    );
    report
}
