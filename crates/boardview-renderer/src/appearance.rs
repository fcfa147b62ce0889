//! Appearance programs: the parameterised shading each store draws with.
//!
//! The shading itself is opaque to the engine. What the engine owns is the
//! uniform block it feeds the program: colours, edge thickness, the
//! hovered/selected flags with the instance they apply to, and the clock.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use boardview_core::Slot;

use crate::backend::{GraphicsBackend, ProgramDescriptor, ProgramId};
use crate::error::BackendError;

/// Marks "no instance" in the hovered/selected instance uniforms.
pub const NO_INSTANCE: i32 = -1;

/// Uniform block shared with the appearance program. 64 bytes, std140
/// compatible.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct AppearanceUniforms {
    pub base_color: [f32; 4],
    pub edge_color: [f32; 4],
    pub edge_thickness: f32,
    pub hovered: u32,
    pub selected: u32,
    pub time: f32,
    pub hovered_instance: i32,
    pub selected_instance: i32,
    pub _padding: [u32; 2],
}

impl AppearanceUniforms {
    pub fn from_appearance(appearance: &Appearance) -> Self {
        Self {
            base_color: appearance.base_color,
            edge_color: appearance.edge_color,
            edge_thickness: appearance.edge_thickness,
            hovered: 0,
            selected: 0,
            time: 0.0,
            hovered_instance: NO_INSTANCE,
            selected_instance: NO_INSTANCE,
            _padding: [0; 2],
        }
    }
}

/// Static look of one store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Appearance {
    pub base_color: [f32; 4],
    pub edge_color: [f32; 4],
    pub edge_thickness: f32,
}

/// Appearance per render target. `None` means the target is drawn with the
/// backend's plain material and cannot show highlights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppearancePalette {
    pub pad: Option<Appearance>,
    pub trace: Option<Appearance>,
    pub hole: Option<Appearance>,
    pub substrate: Option<Appearance>,
}

impl Default for AppearancePalette {
    fn default() -> Self {
        Self {
            pad: Some(Appearance {
                base_color: [0.85, 0.65, 0.25, 1.0],
                edge_color: [1.0, 0.9, 0.6, 1.0],
                edge_thickness: 0.04,
            }),
            trace: Some(Appearance {
                base_color: [0.78, 0.5, 0.2, 1.0],
                edge_color: [0.95, 0.75, 0.45, 1.0],
                edge_thickness: 0.02,
            }),
            hole: Some(Appearance {
                base_color: [0.1, 0.1, 0.1, 1.0],
                edge_color: [0.7, 0.7, 0.7, 1.0],
                edge_thickness: 0.03,
            }),
            substrate: Some(Appearance {
                base_color: [0.05, 0.35, 0.15, 1.0],
                edge_color: [0.02, 0.2, 0.08, 1.0],
                edge_thickness: 0.0,
            }),
        }
    }
}

/// A created program and the CPU copy of its uniforms.
#[derive(Debug, Clone)]
pub struct AppearanceProgram {
    id: ProgramId,
    uniforms: AppearanceUniforms,
    dirty: bool,
}

impl AppearanceProgram {
    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn uniforms(&self) -> &AppearanceUniforms {
        &self.uniforms
    }

    pub fn set_hovered(&mut self, slot: Option<Slot>) {
        let (flag, instance) = flag_for(slot);
        if self.uniforms.hovered != flag || self.uniforms.hovered_instance != instance {
            self.uniforms.hovered = flag;
            self.uniforms.hovered_instance = instance;
            self.dirty = true;
        }
    }

    pub fn set_selected(&mut self, slot: Option<Slot>) {
        let (flag, instance) = flag_for(slot);
        if self.uniforms.selected != flag || self.uniforms.selected_instance != instance {
            self.uniforms.selected = flag;
            self.uniforms.selected_instance = instance;
            self.dirty = true;
        }
    }

    pub fn set_time(&mut self, seconds: f32) {
        self.uniforms.time = seconds;
        self.dirty = true;
    }

    pub fn is_instance_hovered(&self, slot: Slot) -> bool {
        self.uniforms.hovered != 0 && self.uniforms.hovered_instance == slot as i32
    }

    pub fn is_instance_selected(&self, slot: Slot) -> bool {
        self.uniforms.selected != 0 && self.uniforms.selected_instance == slot as i32
    }

    /// Push pending uniform changes. Returns whether anything was written.
    pub fn flush(&mut self, backend: &mut dyn GraphicsBackend) -> Result<bool, BackendError> {
        if !self.dirty {
            return Ok(false);
        }
        backend.write_uniforms(self.id, &self.uniforms)?;
        self.dirty = false;
        Ok(true)
    }
}

fn flag_for(slot: Option<Slot>) -> (u32, i32) {
    match slot {
        Some(s) => (1, s as i32),
        None => (0, NO_INSTANCE),
    }
}

/// Builds appearance programs from a palette. Constructed by the engine and
/// passed where needed; there is no global instance.
#[derive(Debug, Clone)]
pub struct AppearanceFactory {
    palette: AppearancePalette,
}

impl AppearanceFactory {
    pub fn new(palette: AppearancePalette) -> Self {
        Self { palette }
    }

    pub fn palette(&self) -> &AppearancePalette {
        &self.palette
    }

    pub fn create(
        &self,
        backend: &mut dyn GraphicsBackend,
        label: &str,
        appearance: &Appearance,
    ) -> Result<AppearanceProgram, BackendError> {
        let uniforms = AppearanceUniforms::from_appearance(appearance);
        let id = backend.create_program(&ProgramDescriptor {
            label: label.to_string(),
            uniforms,
        })?;
        Ok(AppearanceProgram {
            id,
            uniforms,
            dirty: false,
        })
    }
}
