//! In-memory graphics backend.
//!
//! Keeps a table of every live allocation so callers can assert that
//! teardown left nothing behind. Used by the inspect binary and by tests.

use std::collections::{BTreeMap, HashMap};

use crate::appearance::AppearanceUniforms;
use crate::backend::{
    BufferId, GeometryDescriptor, GeometryId, GraphicsBackend, MeshDescriptor, MeshId,
    ProgramDescriptor, ProgramId, ResourceHandle, SurfaceConfig, TextureDescriptor, TextureId,
};
use crate::error::BackendError;

#[derive(Debug, Clone)]
struct BufferRecord {
    label: String,
    stride: usize,
    data: Vec<u8>,
}

/// Counts of live allocations per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct LiveCounts {
    pub geometries: usize,
    pub programs: usize,
    pub textures: usize,
    pub buffers: usize,
    pub meshes: usize,
}

impl LiveCounts {
    pub fn total(&self) -> usize {
        self.geometries + self.programs + self.textures + self.buffers + self.meshes
    }
}

#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_id: u64,
    surface: Option<SurfaceConfig>,
    reject_full: bool,
    reject_reduced: bool,
    geometries: HashMap<GeometryId, GeometryDescriptor>,
    programs: HashMap<ProgramId, AppearanceUniforms>,
    textures: HashMap<TextureId, TextureDescriptor>,
    buffers: HashMap<BufferId, BufferRecord>,
    meshes: HashMap<MeshId, MeshDescriptor>,
    draws: Vec<(MeshId, u32)>,
    destroyed: BTreeMap<ResourceHandle, usize>,
    bytes_written: usize,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose surface refuses multisampled configurations, forcing
    /// the reduced fallback.
    pub fn without_msaa() -> Self {
        Self {
            reject_full: true,
            ..Self::default()
        }
    }

    /// A backend that cannot create any surface.
    pub fn unavailable() -> Self {
        Self {
            reject_full: true,
            reject_reduced: true,
            ..Self::default()
        }
    }

    pub fn surface(&self) -> Option<&SurfaceConfig> {
        self.surface.as_ref()
    }

    pub fn live(&self) -> LiveCounts {
        LiveCounts {
            geometries: self.geometries.len(),
            programs: self.programs.len(),
            textures: self.textures.len(),
            buffers: self.buffers.len(),
            meshes: self.meshes.len(),
        }
    }

    pub fn uniforms(&self, program: ProgramId) -> Option<&AppearanceUniforms> {
        self.programs.get(&program)
    }

    pub fn buffer_data(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(|b| b.data.as_slice())
    }

    pub fn buffer_label(&self, buffer: BufferId) -> Option<&str> {
        self.buffers.get(&buffer).map(|b| b.label.as_str())
    }

    pub fn mesh(&self, mesh: MeshId) -> Option<&MeshDescriptor> {
        self.meshes.get(&mesh)
    }

    /// Draws submitted since the last [`HeadlessBackend::take_draws`].
    pub fn take_draws(&mut self) -> Vec<(MeshId, u32)> {
        std::mem::take(&mut self.draws)
    }

    /// How many times each handle has been destroyed.
    pub fn destroy_count(&self, handle: ResourceHandle) -> usize {
        self.destroyed.get(&handle).copied().unwrap_or(0)
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn configure_surface(&mut self, config: &SurfaceConfig) -> Result<(), BackendError> {
        let refused = if config.msaa_samples > 1 {
            self.reject_full
        } else {
            self.reject_reduced
        };
        if refused {
            return Err(BackendError::Surface(format!(
                "{}x MSAA with {}-bit depth is not supported",
                config.msaa_samples, config.depth_bits
            )));
        }
        self.surface = Some(*config);
        Ok(())
    }

    fn create_geometry(&mut self, descriptor: &GeometryDescriptor) -> Result<GeometryId, BackendError> {
        let id = GeometryId(self.allocate());
        self.geometries.insert(id, descriptor.clone());
        Ok(id)
    }

    fn create_program(&mut self, descriptor: &ProgramDescriptor) -> Result<ProgramId, BackendError> {
        let id = ProgramId(self.allocate());
        self.programs.insert(id, descriptor.uniforms);
        Ok(id)
    }

    fn create_texture(&mut self, descriptor: &TextureDescriptor) -> Result<TextureId, BackendError> {
        let expected = descriptor.width as usize * descriptor.height as usize * 4;
        if descriptor.texels.len() != expected {
            return Err(BackendError::Allocation(format!(
                "texture '{}' expects {} bytes, got {}",
                descriptor.label,
                expected,
                descriptor.texels.len()
            )));
        }
        let id = TextureId(self.allocate());
        self.textures.insert(id, descriptor.clone());
        Ok(id)
    }

    fn create_instance_buffer(
        &mut self,
        label: &str,
        capacity: usize,
        stride: usize,
    ) -> Result<BufferId, BackendError> {
        let size = capacity
            .checked_mul(stride)
            .ok_or_else(|| BackendError::Allocation(format!("buffer '{}' is too large", label)))?;
        let id = BufferId(self.allocate());
        self.buffers.insert(
            id,
            BufferRecord {
                label: label.to_string(),
                stride,
                data: vec![0; size],
            },
        );
        Ok(id)
    }

    fn create_mesh(&mut self, descriptor: &MeshDescriptor) -> Result<MeshId, BackendError> {
        if !self.geometries.contains_key(&descriptor.geometry) {
            return Err(BackendError::UnknownResource(ResourceHandle::Geometry(
                descriptor.geometry,
            )));
        }
        let id = MeshId(self.allocate());
        self.meshes.insert(id, descriptor.clone());
        Ok(id)
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<(), BackendError> {
        let record = self
            .buffers
            .get_mut(&buffer)
            .ok_or(BackendError::UnknownResource(ResourceHandle::Buffer(buffer)))?;
        let start = offset as usize;
        let end = start + data.len();
        if end > record.data.len() || start % record.stride.max(1) != 0 {
            return Err(BackendError::BufferOverrun {
                offset,
                len: data.len(),
                size: record.data.len(),
            });
        }
        record.data[start..end].copy_from_slice(data);
        self.bytes_written += data.len();
        Ok(())
    }

    fn write_uniforms(&mut self, program: ProgramId, uniforms: &AppearanceUniforms) -> Result<(), BackendError> {
        let slot = self
            .programs
            .get_mut(&program)
            .ok_or(BackendError::UnknownResource(ResourceHandle::Program(program)))?;
        *slot = *uniforms;
        Ok(())
    }

    fn draw(&mut self, mesh: MeshId, instance_count: u32) -> Result<(), BackendError> {
        if !self.meshes.contains_key(&mesh) {
            return Err(BackendError::UnknownResource(ResourceHandle::Mesh(mesh)));
        }
        self.draws.push((mesh, instance_count));
        Ok(())
    }

    fn destroy(&mut self, handle: ResourceHandle) -> Result<(), BackendError> {
        let removed = match handle {
            ResourceHandle::Mesh(id) => self.meshes.remove(&id).is_some(),
            ResourceHandle::Program(id) => self.programs.remove(&id).is_some(),
            ResourceHandle::Geometry(id) => self.geometries.remove(&id).is_some(),
            ResourceHandle::Texture(id) => self.textures.remove(&id).is_some(),
            ResourceHandle::Buffer(id) => self.buffers.remove(&id).is_some(),
        };
        if !removed {
            return Err(BackendError::UnknownResource(handle));
        }
        *self.destroyed.entry(handle).or_insert(0) += 1;
        Ok(())
    }

    fn live_allocations(&self) -> usize {
        self.live().total()
    }
}
