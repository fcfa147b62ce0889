//! # Boardview Renderer
//!
//! Everything between the board model and a graphics device: one instanced
//! render store per entity kind, appearance programs carrying highlight
//! state, the ledger that releases GPU resources exactly once, ray picking,
//! and the hover/selection/drag state machine.
//!
//! [`BoardEngine`] wires these together behind a [`GraphicsBackend`]. The
//! in-memory [`HeadlessBackend`] stands in for a real device in tools and
//! tests.

pub mod appearance;
pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod headless;
pub mod interaction;
pub mod ledger;
pub mod picking;
pub mod render_data;
pub mod render_store;
pub mod viewpoint;

pub use appearance::{Appearance, AppearanceFactory, AppearancePalette, AppearanceProgram, AppearanceUniforms};
pub use backend::{GraphicsBackend, ResourceHandle, SurfaceConfig};
pub use config::EngineConfig;
pub use engine::BoardEngine;
pub use error::{BackendError, EngineError};
pub use headless::{HeadlessBackend, LiveCounts};
pub use interaction::{HighlightSink, InteractionState, InteractionStateMachine, Target};
pub use ledger::{DisposalReport, LedgerStats, ResourceLedger};
pub use picking::{Hit, HitTestEngine};
pub use render_data::{EngineStats, FrameStats};
pub use render_store::{HandleKind, RenderHandle, RenderStore};
pub use viewpoint::{Ray, Viewpoint};
