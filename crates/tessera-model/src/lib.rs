//! Scene description files for Tessera.
//!
//! Defaults mirror the values an object takes when a parameter is left unset.

use serde::{Deserialize, Serialize};

pub const SCENE_VERSION: u32 = 1;

/// Radius used for spheres without an explicit per-sphere radius.
pub const DEFAULT_SPHERE_RADIUS: f32 = 0.01;

/// Aluminium, used for metals that do not specify their optical constants.
pub const ALUMINIUM_ETA: [f32; 3] = [1.697_002_8, 0.879_832_9, 0.530_173_6];
pub const ALUMINIUM_K: [f32; 3] = [9.302_007, 6.276_04, 4.894_339_6];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneFile {
    pub version: u32,
    pub camera: CameraDesc,
    #[serde(default)]
    pub spheres: SphereSet,
    #[serde(default)]
    pub materials: Vec<MaterialDesc>,
    #[serde(default)]
    pub lights: Vec<LightDesc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CameraDesc {
    pub position: [f32; 3],
    pub look_at: [f32; 3],
    #[serde(default = "default_up")]
    pub up: [f32; 3],
    #[serde(default = "default_fovy")]
    pub fovy: f32,
}

/// Spheres sharing one parameter block. Per-sphere arrays, when present, run
/// parallel to `positions`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SphereSet {
    #[serde(default = "default_radius")]
    pub radius: f32,
    #[serde(default)]
    pub positions: Vec<[f32; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radii: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub materials: Option<Vec<u32>>,
}

impl Default for SphereSet {
    fn default() -> Self {
        Self {
            radius: DEFAULT_SPHERE_RADIUS,
            positions: Vec::new(),
            radii: None,
            materials: None,
        }
    }
}

impl SphereSet {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn radius_of(&self, index: usize) -> f32 {
        self.radii
            .as_ref()
            .and_then(|radii| radii.get(index).copied())
            .unwrap_or(self.radius)
    }

    pub fn material_of(&self, index: usize) -> u32 {
        self.materials
            .as_ref()
            .and_then(|materials| materials.get(index).copied())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MaterialDesc {
    Diffuse {
        #[serde(default = "default_albedo")]
        albedo: [f32; 3],
    },
    Metal {
        #[serde(default = "default_eta")]
        eta: [f32; 3],
        #[serde(default = "default_k")]
        k: [f32; 3],
        #[serde(default = "default_roughness")]
        roughness: f32,
    },
    Emissive {
        #[serde(default = "default_color")]
        color: [f32; 3],
        #[serde(default = "default_intensity")]
        intensity: f32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LightDesc {
    /// Constant light present everywhere.
    Ambient {
        #[serde(default = "default_color")]
        color: [f32; 3],
        #[serde(default = "default_intensity")]
        intensity: f32,
        #[serde(default = "default_visible")]
        visible: bool,
    },
}

fn default_up() -> [f32; 3] {
    [0.0, 1.0, 0.0]
}

fn default_fovy() -> f32 {
    60.0
}

fn default_radius() -> f32 {
    DEFAULT_SPHERE_RADIUS
}

fn default_albedo() -> [f32; 3] {
    [0.8, 0.8, 0.8]
}

fn default_eta() -> [f32; 3] {
    ALUMINIUM_ETA
}

fn default_k() -> [f32; 3] {
    ALUMINIUM_K
}

fn default_roughness() -> f32 {
    0.1
}

fn default_color() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

fn default_intensity() -> f32 {
    1.0
}

fn default_visible() -> bool {
    true
}

/// Small scene used by `tessera demo-scene`: a ground sphere, a ring of spheres
/// alternating diffuse and metal, one emitter and a sky.
pub fn demo_scene() -> SceneFile {
    let mut positions = vec![[0.0, -1000.0, 0.0]];
    let mut radii = vec![1000.0];
    let mut materials = vec![0];

    let ring = 8;
    for i in 0..ring {
        let angle = i as f32 / ring as f32 * std::f32::consts::TAU;
        positions.push([angle.cos() * 2.5, 0.5, angle.sin() * 2.5]);
        radii.push(0.5);
        materials.push(if i % 2 == 0 { 1 } else { 2 });
    }
    positions.push([0.0, 1.2, 0.0]);
    radii.push(0.8);
    materials.push(3);

    SceneFile {
        version: SCENE_VERSION,
        camera: CameraDesc {
            position: [0.0, 3.0, 7.5],
            look_at: [0.0, 0.5, 0.0],
            up: default_up(),
            fovy: 40.0,
        },
        spheres: SphereSet {
            radius: DEFAULT_SPHERE_RADIUS,
            positions,
            radii: Some(radii),
            materials: Some(materials),
        },
        materials: vec![
            MaterialDesc::Diffuse {
                albedo: [0.5, 0.5, 0.5],
            },
            MaterialDesc::Diffuse {
                albedo: [0.8, 0.3, 0.2],
            },
            MaterialDesc::Metal {
                eta: ALUMINIUM_ETA,
                k: ALUMINIUM_K,
                roughness: 0.05,
            },
            MaterialDesc::Emissive {
                color: [1.0, 0.9, 0.7],
                intensity: 4.0,
            },
        ],
        lights: vec![LightDesc::Ambient {
            color: [0.6, 0.75, 1.0],
            intensity: 0.8,
            visible: true,
        }],
    }
}
