//! Slot-fill decision engine: placement resolution, targeting, frequency
//! and budget guards, weighted selection, and event recording.

#![warn(clippy::unwrap_used)]

pub mod budget;
pub mod dispatcher;
pub mod frequency;
pub mod pipeline;
pub mod recorder;
pub mod resolver;
pub mod rotation;
pub mod selector;
pub mod targeting;

#[cfg(test)]
pub(crate) mod testutil;

pub use dispatcher::EventDispatcher;
pub use pipeline::AdSelector;
pub use recorder::EventRecorder;
pub use resolver::{PlacementResolver, Resolution, ResolutionSource};
