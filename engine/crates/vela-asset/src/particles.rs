//! 粒子系统描述（JSON）与粒子池
//!
//! ```json
//! {
//!     "file format identifier": 1.0,
//!     "description": "snow",
//!     "author": "vela",
//!     "model": "assets/models/flake.glb",
//!     "pool size": 1000,
//!     "prefix dictionary": "flake",
//!     "cubic volume vertex 0,0,0": [-10.0, 0.0, -10.0],
//!     "cubic volume vertex 1,1,1": [10.0, 20.0, 10.0]
//! }
//! ```

use std::path::Path;

use glam::Vec3;
use serde::Deserialize;
use vela_scene::components::{Rigidbody, Transform};
use vela_scene::ecs::Entity;
use vela_scene::scene::Scene;
use vela_scene::scene_graph::ROOT_NODE;

use crate::error::{AssetError, AssetResult};

pub const FORMAT_MAJOR_VERSION: u64 = 1;

/// 文件中的原始字段，键名带空格
#[derive(Debug, Deserialize)]
struct ParticleFile {
    #[serde(rename = "file format identifier")]
    format_version: f64,
    description: String,
    author: String,
    model: String,
    #[serde(rename = "pool size")]
    pool_size: usize,
    #[serde(rename = "prefix dictionary")]
    prefix: String,
    #[serde(rename = "cubic volume vertex 0,0,0")]
    volume_a: [f32; 3],
    #[serde(rename = "cubic volume vertex 1,1,1")]
    volume_b: [f32; 3],
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParticleDescription {
    pub format_version: f64,
    pub description: String,
    pub author: String,
    /// 粒子使用的 glTF 模型
    pub model: String,
    pub pool_size: usize,
    /// 粒子在字典中的名字前缀，后接下标
    pub prefix: String,
    pub volume_min: Vec3,
    pub volume_max: Vec3,
}
// new & init
impl ParticleDescription {
    pub fn from_file(path: impl AsRef<Path>) -> AssetResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| AssetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// 缺少键或类型错误时警告并返回错误，错误信息包含键名
    pub fn from_json(text: &str) -> AssetResult<Self> {
        let file: ParticleFile = serde_json::from_str(text).map_err(|e| {
            log::warn!("particle description: {e}");
            AssetError::Particle(e.to_string())
        })?;

        let format_version = file.format_version;
        if format_version.trunc() as u64 != FORMAT_MAJOR_VERSION {
            log::warn!("particle description: unsupported format version {format_version}");
            return Err(AssetError::Particle(format!(
                "format version {format_version}, expected major version {FORMAT_MAJOR_VERSION}"
            )));
        }

        let volume_a = Vec3::from(file.volume_a);
        let volume_b = Vec3::from(file.volume_b);
        Ok(Self {
            format_version,
            description: file.description,
            author: file.author,
            model: file.model,
            pool_size: file.pool_size,
            prefix: file.prefix,
            volume_min: volume_a.min(volume_b),
            volume_max: volume_a.max(volume_b),
        })
    }
}

/// 固定大小的粒子池，每个粒子是一个带 Transform 与 Rigidbody 的实体
pub struct ParticleSystem {
    description: ParticleDescription,
    group: Entity,
    particles: Vec<Entity>,
}
// new & init
impl ParticleSystem {
    pub fn new(scene: &mut Scene, description: ParticleDescription) -> Self {
        let _span = tracy_client::span!("ParticleSystem::new");

        let group = scene.registry.create();
        scene.registry.emplace(group, Transform::default());
        let group_node = scene.scene_graph.create_node(
            ROOT_NODE,
            group,
            &description.prefix,
            &format!("{}::{}", description.model, description.prefix),
            &mut scene.dictionary,
        );

        let extent = description.volume_max - description.volume_min;
        let mut particles = Vec::with_capacity(description.pool_size);
        for index in 0..description.pool_size {
            let position = description.volume_min + extent * spread(index);
            let entity = scene.registry.create();
            scene.registry.emplace(entity, Transform::from_translation(position));
            let name = format!("{}{index}", description.prefix);
            let long_name = format!("{}::{}::{index}", description.model, description.prefix);
            scene.scene_graph.create_node(group_node, entity, &name, &long_name, &mut scene.dictionary);

            // 下落速度在 [0.5, 1.5) 之间变化
            let fall = 0.5 + spread(index + description.pool_size).y;
            scene.registry.emplace(
                entity,
                Rigidbody {
                    velocity: Vec3::new(0.0, -fall, 0.0),
                    ..Default::default()
                },
            );
            particles.push(entity);
        }

        log::info!(
            "particle system `{}` by {}: {} particles",
            description.description,
            description.author,
            particles.len()
        );
        Self {
            description,
            group,
            particles,
        }
    }

    pub fn from_file(scene: &mut Scene, path: impl AsRef<Path>) -> AssetResult<Self> {
        Ok(Self::new(scene, ParticleDescription::from_file(path)?))
    }
}
// getters
impl ParticleSystem {
    #[inline]
    pub fn description(&self) -> &ParticleDescription {
        &self.description
    }

    #[inline]
    pub fn group(&self) -> Entity {
        self.group
    }

    #[inline]
    pub fn particles(&self) -> &[Entity] {
        &self.particles
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }
}
// update
impl ParticleSystem {
    /// 粒子按速度移动，落到体积底部后回到顶部
    pub fn update(&self, scene: &mut Scene, step: f32) {
        let min = self.description.volume_min;
        let max = self.description.volume_max;
        let height = max.y - min.y;
        for &particle in &self.particles {
            let Some(velocity) = scene.registry.get::<Rigidbody>(particle).map(|body| body.velocity) else {
                continue;
            };
            let Some(transform) = scene.registry.get_mut::<Transform>(particle) else {
                continue;
            };
            let mut position = transform.translation() + velocity * step;
            if position.y < min.y && height > 0.0 {
                position.y += height * ((min.y - position.y) / height).ceil();
            }
            transform.set_translation(position);
        }
    }
}

/// [0, 1)^3 内的低差异序列
fn spread(index: usize) -> Vec3 {
    // 三维黄金比例序列
    const G: f64 = 1.220_744_084_605_759_5;
    const A: [f64; 3] = [1.0 / G, 1.0 / (G * G), 1.0 / (G * G * G)];
    let n = index as f64 + 0.5;
    Vec3::new((n * A[0]).fract() as f32, (n * A[1]).fract() as f32, (n * A[2]).fract() as f32)
}
