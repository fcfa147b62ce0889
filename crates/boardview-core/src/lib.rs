//! # Boardview Core
//!
//! Board data model for the Boardview inspector: pads, traces and drill
//! holes held in fixed-capacity instanced stores, the layer-offset rule that
//! keeps copper off the substrate surface, and the footprint index used to
//! hit-test instances.
//!
//! Nothing here touches a GPU. Stores keep a CPU copy of their instance
//! buffer and a dirty flag; uploading is the renderer's job.

pub mod geometry;
pub mod layer;
pub mod entity;
pub mod store;
pub mod trace;
pub mod spatial;
pub mod board;
pub mod error;

pub use board::{Board, BoardDimensions, BoardSettings, StoreCapacities};
pub use entity::{EntityId, EntityKind, Footprint, Hole, Pad, PadShape, Placeable, Placement, Trace, TraceSegment};
pub use error::BoardError;
pub use geometry::{BBox, Point, Size};
pub use layer::{Layer, LayerOffsetCalculator, LayerOffsets};
pub use store::{InstanceRaw, InstancedEntityStore, Slot};
pub use trace::TraceStore;
