//! Per-join session state.

use std::sync::atomic::{AtomicBool, Ordering};

use flare_render::{Patch, RenderedNode, diff};

use crate::context::ViewContext;
use crate::view::LiveView;

/// The last tree sent to the client and the render counter.
#[derive(Debug, Clone)]
pub struct Snapshot {
    node: RenderedNode,
    renders: u64,
    full_render_every: u32,
}

impl Snapshot {
    /// Start from the tree sent in the join reply.
    ///
    /// `full_render_every` of `N > 0` makes every Nth later render
    /// structural.
    pub fn new(node: RenderedNode, full_render_every: u32) -> Self {
        Self {
            node,
            renders: 0,
            full_render_every,
        }
    }

    /// Tree the client is assumed to hold.
    pub fn node(&self) -> &RenderedNode {
        &self.node
    }

    /// Diff `next` against the snapshot and make it the new snapshot.
    ///
    /// With `full` set, or on a periodic full render, the whole tree is sent.
    pub fn advance(&mut self, next: RenderedNode, full: bool) -> Patch {
        self.renders += 1;
        let periodic = self.full_render_every > 0
            && self.renders % u64::from(self.full_render_every) == 0;
        let patch = if full || periodic {
            Patch::Structural(next.clone())
        } else {
            diff(Some(&self.node), &next)
        };
        self.node = next;
        patch
    }
}

/// Mutable part of a session, serialized behind the entry's lock.
pub(crate) struct Session {
    pub(crate) view: Box<dyn LiveView>,
    pub(crate) snapshot: Snapshot,
}

/// A row of the session table.
pub(crate) struct SessionEntry {
    pub(crate) topic: String,
    pub(crate) join_ref: Option<String>,
    pub(crate) seq: u64,
    pub(crate) ctx: ViewContext,
    pub(crate) state: tokio::sync::Mutex<Session>,
    desynced: AtomicBool,
}

impl SessionEntry {
    pub(crate) fn new(
        topic: String,
        join_ref: Option<String>,
        seq: u64,
        ctx: ViewContext,
        session: Session,
    ) -> Self {
        Self {
            topic,
            join_ref,
            seq,
            ctx,
            state: tokio::sync::Mutex::new(session),
            desynced: AtomicBool::new(false),
        }
    }

    /// The client may have missed a frame; send the next patch in full.
    pub(crate) fn mark_desynced(&self) {
        self.desynced.store(true, Ordering::Release);
    }

    /// Read and clear the desync flag.
    pub(crate) fn take_desynced(&self) -> bool {
        self.desynced.swap(false, Ordering::AcqRel)
    }
}
