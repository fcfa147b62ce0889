//! The seam between the board engine and whatever actually talks to a GPU.
//!
//! Backends hand out opaque ids; the engine never interprets them beyond
//! identity. Every `create_*` must be balanced by exactly one `destroy`, which
//! the [`crate::ledger::ResourceLedger`] guarantees on teardown.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::appearance::AppearanceUniforms;
use crate::error::BackendError;

macro_rules! resource_id {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u64);

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

resource_id!(GeometryId);
resource_id!(ProgramId);
resource_id!(BufferId);
resource_id!(TextureId);
resource_id!(MeshId);

/// Identity of any GPU-resident allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceHandle {
    Mesh(MeshId),
    Program(ProgramId),
    Geometry(GeometryId),
    Texture(TextureId),
    Buffer(BufferId),
}

/// Base shapes instances are stretched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaseShape {
    /// Unit cube centred on the origin.
    Box,
    /// Unit-diameter, unit-height cylinder along +y.
    Cylinder { segments: u32 },
    /// Outline edges of a unit cube, drawn with the edge colour.
    BoxEdges,
    /// Outline edges of the unit cylinder.
    CylinderEdges { segments: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeometryDescriptor {
    pub label: String,
    pub shape: BaseShape,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgramDescriptor {
    pub label: String,
    pub uniforms: AppearanceUniforms,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor {
    pub label: String,
    pub width: u32,
    pub height: u32,
    /// RGBA8 texels, `width * height * 4` bytes.
    pub texels: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshDescriptor {
    pub label: String,
    pub geometry: GeometryId,
    /// `None` draws with the backend's plain material, which has no
    /// appearance uniforms.
    pub program: Option<ProgramId>,
    /// `None` for single, non-instanced meshes.
    pub instances: Option<BufferId>,
    pub texture: Option<TextureId>,
}

/// Rendering surface options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceConfig {
    pub msaa_samples: u32,
    pub depth_bits: u32,
    pub logarithmic_depth: bool,
}

impl SurfaceConfig {
    pub fn full() -> Self {
        Self {
            msaa_samples: 4,
            depth_bits: 32,
            logarithmic_depth: true,
        }
    }

    pub fn reduced() -> Self {
        Self {
            msaa_samples: 1,
            depth_bits: 24,
            logarithmic_depth: false,
        }
    }
}

/// Operations the engine needs from a graphics device.
pub trait GraphicsBackend: fmt::Debug {
    fn configure_surface(&mut self, config: &SurfaceConfig) -> Result<(), BackendError>;

    fn create_geometry(&mut self, descriptor: &GeometryDescriptor) -> Result<GeometryId, BackendError>;

    fn create_program(&mut self, descriptor: &ProgramDescriptor) -> Result<ProgramId, BackendError>;

    fn create_texture(&mut self, descriptor: &TextureDescriptor) -> Result<TextureId, BackendError>;

    /// Allocate an instance buffer of `capacity` rows of `stride` bytes.
    fn create_instance_buffer(
        &mut self,
        label: &str,
        capacity: usize,
        stride: usize,
    ) -> Result<BufferId, BackendError>;

    fn create_mesh(&mut self, descriptor: &MeshDescriptor) -> Result<MeshId, BackendError>;

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<(), BackendError>;

    fn write_uniforms(&mut self, program: ProgramId, uniforms: &AppearanceUniforms) -> Result<(), BackendError>;

    /// Submit one draw of `instance_count` instances of `mesh`.
    fn draw(&mut self, mesh: MeshId, instance_count: u32) -> Result<(), BackendError>;

    fn destroy(&mut self, handle: ResourceHandle) -> Result<(), BackendError>;

    /// Allocations created and not yet destroyed.
    fn live_allocations(&self) -> usize;
}
