//! GPU-side counterpart of one entity store: the base geometry, its edge
//! outline, the instance buffer, the meshes that draw them, and the
//! appearance program that carries highlight state.

use std::fmt;

use serde::{Deserialize, Serialize};

use boardview_core::{Board, EntityKind, InstanceRaw};

use crate::appearance::{Appearance, AppearanceFactory, AppearanceProgram};
use crate::backend::{
    BaseShape, BufferId, GeometryDescriptor, GeometryId, GraphicsBackend, MeshDescriptor, MeshId,
    ResourceHandle, TextureDescriptor, TextureId,
};
use crate::error::BackendError;

const CYLINDER_SEGMENTS: u32 = 32;

/// What a render handle draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleKind {
    Pad,
    Trace,
    Hole,
    /// The board body: a single non-instanced mesh.
    Substrate,
}

impl HandleKind {
    pub const ALL: [HandleKind; 4] = [
        HandleKind::Pad,
        HandleKind::Trace,
        HandleKind::Hole,
        HandleKind::Substrate,
    ];

    pub fn from_entity(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Pad => HandleKind::Pad,
            EntityKind::Trace => HandleKind::Trace,
            EntityKind::Hole => HandleKind::Hole,
        }
    }

    /// Entity store behind this handle, `None` for the substrate.
    pub fn entity_kind(&self) -> Option<EntityKind> {
        match self {
            HandleKind::Pad => Some(EntityKind::Pad),
            HandleKind::Trace => Some(EntityKind::Trace),
            HandleKind::Hole => Some(EntityKind::Hole),
            HandleKind::Substrate => None,
        }
    }

    pub fn is_instanced(&self) -> bool {
        self.entity_kind().is_some()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HandleKind::Pad => "pad",
            HandleKind::Trace => "trace",
            HandleKind::Hole => "hole",
            HandleKind::Substrate => "substrate",
        }
    }

    fn base_shape(&self) -> (BaseShape, BaseShape) {
        match self {
            HandleKind::Hole => (
                BaseShape::Cylinder {
                    segments: CYLINDER_SEGMENTS,
                },
                BaseShape::CylinderEdges {
                    segments: CYLINDER_SEGMENTS,
                },
            ),
            _ => (BaseShape::Box, BaseShape::BoxEdges),
        }
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tagged reference to a drawable store, as handed to the hit test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderHandle {
    pub kind: HandleKind,
    pub mesh: MeshId,
}

#[derive(Debug, Clone)]
struct StoreResources {
    geometry: GeometryId,
    edge_geometry: GeometryId,
    instance_buffer: Option<BufferId>,
    texture: Option<TextureId>,
    mesh: MeshId,
    edge_mesh: MeshId,
}

#[derive(Debug)]
pub struct RenderStore {
    kind: HandleKind,
    capacity: usize,
    resources: StoreResources,
    appearance: Option<AppearanceProgram>,
}

impl RenderStore {
    /// Allocate everything one store needs. On failure, whatever was already
    /// created is destroyed before the error is returned.
    pub fn create(
        backend: &mut dyn GraphicsBackend,
        factory: &AppearanceFactory,
        kind: HandleKind,
        capacity: usize,
    ) -> Result<Self, BackendError> {
        let mut created = Vec::new();
        match Self::allocate(backend, factory, kind, capacity, &mut created) {
            Ok(store) => {
                log::debug!(
                    "Created {} render store ({} resources, capacity {})",
                    kind,
                    created.len(),
                    capacity
                );
                Ok(store)
            }
            Err(e) => {
                created.sort();
                for handle in created {
                    if let Err(err) = backend.destroy(handle) {
                        log::warn!("Rollback of {:?} failed: {}", handle, err);
                    }
                }
                Err(e)
            }
        }
    }

    fn allocate(
        backend: &mut dyn GraphicsBackend,
        factory: &AppearanceFactory,
        kind: HandleKind,
        capacity: usize,
        created: &mut Vec<ResourceHandle>,
    ) -> Result<Self, BackendError> {
        let (shape, edge_shape) = kind.base_shape();
        let geometry = backend.create_geometry(&GeometryDescriptor {
            label: format!("{}-geometry", kind),
            shape,
        })?;
        created.push(ResourceHandle::Geometry(geometry));
        let edge_geometry = backend.create_geometry(&GeometryDescriptor {
            label: format!("{}-edges", kind),
            shape: edge_shape,
        })?;
        created.push(ResourceHandle::Geometry(edge_geometry));

        let appearance = match appearance_for(factory, kind) {
            Some(look) => {
                let program = factory.create(backend, &format!("{}-appearance", kind), &look)?;
                created.push(ResourceHandle::Program(program.id()));
                Some(program)
            }
            None => None,
        };

        let instance_buffer = if kind.is_instanced() {
            let id = backend.create_instance_buffer(
                &format!("{}-instances", kind),
                capacity,
                std::mem::size_of::<InstanceRaw>(),
            )?;
            created.push(ResourceHandle::Buffer(id));
            Some(id)
        } else {
            None
        };

        let texture = if kind == HandleKind::Substrate {
            let id = backend.create_texture(&solder_mask_texture())?;
            created.push(ResourceHandle::Texture(id));
            Some(id)
        } else {
            None
        };

        let program = appearance.as_ref().map(|p| p.id());
        let mesh = backend.create_mesh(&MeshDescriptor {
            label: format!("{}-mesh", kind),
            geometry,
            program,
            instances: instance_buffer,
            texture,
        })?;
        created.push(ResourceHandle::Mesh(mesh));
        let edge_mesh = backend.create_mesh(&MeshDescriptor {
            label: format!("{}-edge-mesh", kind),
            geometry: edge_geometry,
            program,
            instances: instance_buffer,
            texture: None,
        })?;
        created.push(ResourceHandle::Mesh(edge_mesh));

        Ok(Self {
            kind,
            capacity: if kind.is_instanced() { capacity } else { 1 },
            resources: StoreResources {
                geometry,
                edge_geometry,
                instance_buffer,
                texture,
                mesh,
                edge_mesh,
            },
            appearance,
        })
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn handle(&self) -> RenderHandle {
        RenderHandle {
            kind: self.kind,
            mesh: self.resources.mesh,
        }
    }

    pub fn appearance(&self) -> Option<&AppearanceProgram> {
        self.appearance.as_ref()
    }

    /// `None` when the store draws with a plain material.
    pub fn appearance_mut(&mut self) -> Option<&mut AppearanceProgram> {
        self.appearance.as_mut()
    }

    pub fn instance_buffer(&self) -> Option<BufferId> {
        self.resources.instance_buffer
    }

    /// Every backend allocation this store owns.
    pub fn resource_handles(&self) -> Vec<ResourceHandle> {
        let r = &self.resources;
        let mut handles = vec![
            ResourceHandle::Mesh(r.mesh),
            ResourceHandle::Mesh(r.edge_mesh),
            ResourceHandle::Geometry(r.geometry),
            ResourceHandle::Geometry(r.edge_geometry),
        ];
        if let Some(program) = &self.appearance {
            handles.push(ResourceHandle::Program(program.id()));
        }
        if let Some(buffer) = r.instance_buffer {
            handles.push(ResourceHandle::Buffer(buffer));
        }
        if let Some(texture) = r.texture {
            handles.push(ResourceHandle::Texture(texture));
        }
        handles
    }

    /// Copy the board's instance rows into the GPU buffer if they changed
    /// since the last upload. Returns whether a write happened.
    pub fn upload(&self, backend: &mut dyn GraphicsBackend, board: &mut Board) -> Result<bool, BackendError> {
        let (Some(kind), Some(buffer)) = (self.kind.entity_kind(), self.resources.instance_buffer) else {
            return Ok(false);
        };
        if !board.is_dirty(kind) {
            return Ok(false);
        }
        let rows = board.instances(kind);
        let rows = &rows[..rows.len().min(self.capacity)];
        let written = !rows.is_empty();
        if written {
            backend.write_buffer(buffer, 0, bytemuck::cast_slice(rows))?;
        }
        board.mark_clean(kind);
        Ok(written)
    }

    /// Number of instances the next draw should cover.
    pub fn instance_count(&self, board: &Board) -> u32 {
        match self.kind.entity_kind() {
            Some(kind) => board.instance_count(kind).min(self.capacity) as u32,
            None => 1,
        }
    }

    /// Submit the body and edge meshes. Empty stores are skipped.
    pub fn draw(&self, backend: &mut dyn GraphicsBackend, instance_count: u32) -> Result<usize, BackendError> {
        if instance_count == 0 {
            return Ok(0);
        }
        backend.draw(self.resources.mesh, instance_count)?;
        backend.draw(self.resources.edge_mesh, instance_count)?;
        Ok(2)
    }

    /// Push pending highlight and clock changes. No-op without an appearance
    /// program.
    pub fn flush_appearance(&mut self, backend: &mut dyn GraphicsBackend) -> Result<bool, BackendError> {
        match self.appearance.as_mut() {
            Some(program) => program.flush(backend),
            None => Ok(false),
        }
    }
}

fn appearance_for(factory: &AppearanceFactory, kind: HandleKind) -> Option<Appearance> {
    let palette = factory.palette();
    match kind {
        HandleKind::Pad => palette.pad,
        HandleKind::Trace => palette.trace,
        HandleKind::Hole => palette.hole,
        HandleKind::Substrate => palette.substrate,
    }
}

/// 2x2 solder-mask weave sampled across the substrate.
fn solder_mask_texture() -> TextureDescriptor {
    let dark = [12, 82, 38, 255];
    let light = [18, 104, 50, 255];
    let texels = [dark, light, light, dark].concat();
    TextureDescriptor {
        label: "substrate-solder-mask".to_string(),
        width: 2,
        height: 2,
        texels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appearance::AppearancePalette;
    use crate::headless::HeadlessBackend;
    use boardview_core::{BoardDimensions, BoardSettings, Layer, Pad, Point, Size};

    fn factory() -> AppearanceFactory {
        AppearanceFactory::new(AppearancePalette::default())
    }

    #[test]
    fn test_create_allocates_expected_resources() {
        let mut backend = HeadlessBackend::new();
        let pads = RenderStore::create(&mut backend, &factory(), HandleKind::Pad, 16).unwrap();
        assert_eq!(pads.resource_handles().len(), 6);
        assert!(pads.instance_buffer().is_some());

        let substrate = RenderStore::create(&mut backend, &factory(), HandleKind::Substrate, 16).unwrap();
        assert!(substrate.instance_buffer().is_none());
        assert_eq!(substrate.capacity(), 1);

        let live = backend.live();
        assert_eq!(live.meshes, 4);
        assert_eq!(live.textures, 1);
        assert_eq!(live.buffers, 1);
    }

    #[test]
    fn test_plain_material_has_no_program() {
        let mut backend = HeadlessBackend::new();
        let palette = AppearancePalette {
            trace: None,
            ..AppearancePalette::default()
        };
        let store =
            RenderStore::create(&mut backend, &AppearanceFactory::new(palette), HandleKind::Trace, 4).unwrap();
        assert!(store.appearance().is_none());
        assert_eq!(backend.live().programs, 0);
    }

    #[test]
    fn test_upload_only_when_dirty() {
        let mut backend = HeadlessBackend::new();
        let mut board = Board::new(BoardDimensions::default(), &BoardSettings::default()).unwrap();
        let store = RenderStore::create(&mut backend, &factory(), HandleKind::Pad, 8).unwrap();

        board.add_pad(Pad::rectangle("p1", Point::new(1.0, 1.0), Size::new(2.0, 2.0), Layer::Top));
        assert!(store.upload(&mut backend, &mut board).unwrap());
        assert!(!store.upload(&mut backend, &mut board).unwrap());
        assert_eq!(backend.bytes_written(), std::mem::size_of::<InstanceRaw>());

        let buffer = store.instance_buffer().unwrap();
        let expected: &[u8] = bytemuck::cast_slice(board.instances(EntityKind::Pad));
        assert_eq!(&backend.buffer_data(buffer).unwrap()[..expected.len()], expected);
    }

    #[test]
    fn test_draw_skips_empty_store() {
        let mut backend = HeadlessBackend::new();
        let store = RenderStore::create(&mut backend, &factory(), HandleKind::Hole, 8).unwrap();
        assert_eq!(store.draw(&mut backend, 0).unwrap(), 0);
        assert_eq!(store.draw(&mut backend, 3).unwrap(), 2);
        assert_eq!(backend.take_draws().len(), 2);
    }
}
