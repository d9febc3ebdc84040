//! # flare-render
//!
//! The rendered-tree model and its diff engine. Pure data and algorithms,
//! no I/O.
//!
//! - [`RenderedNode`]: statics `S` interleaved with dynamic [`Slot`]s `D`,
//!   always with `len(S) == len(D) + 1`
//! - [`diff`]: computes a [`Patch`] between a previous and a current node
//! - [`Patch::apply`]: the client-side merge, used to check that a patch
//!   reproduces the current render
//! - [`template`]: splits marker-annotated markup into a node, and the
//!   [`Renderable`] output type views return

#![deny(unsafe_code)]

pub mod diff;
pub mod errors;
pub mod node;
pub mod template;

pub use diff::{Patch, SlotDiff, diff};
pub use errors::{ConstructionError, Result};
pub use node::{RenderedNode, Slot};
pub use template::{Renderable, decompose};
