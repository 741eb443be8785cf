//! 场景 -> draw 命令
//!
//! 每个规范实体的每个 primitive 生成一条实例化 draw，实例数等于 InstanceTag 的长度。
//! 结果按材质种类稳定排序，相同 pipeline 的 draw 相邻。

use itertools::Itertools;
use vela_gfx::backend::DrawCommand;
use vela_render_interface::instance_buffer::InstanceData;
use vela_scene::components::{InstanceTag, MaterialComponent, MeshComponent, SkeletalComponent};
use vela_scene::ecs::Entity;
use vela_scene::scene::Scene;

/// 本帧 draw 列表的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub draws: usize,
    pub instances: usize,
    /// 因为缺少资源而跳过的 primitive
    pub skipped: usize,
}

/// 生成本帧的 draw 列表，引用 `frame_slot` 槽位的实例缓冲与关节缓冲
pub fn build_draw_list(scene: &Scene, frame_slot: usize) -> (Vec<DrawCommand>, DrawStats) {
    let _span = tracy_client::span!("build_draw_list");

    let mut stats = DrawStats::default();
    let mut draws = Vec::new();
    for canonical in scene.canonical_entities() {
        append_entity_draws(scene, canonical, frame_slot, &mut draws, &mut stats);
    }

    let draws = draws.into_iter().sorted_by_key(|d: &DrawCommand| d.kind).collect_vec();
    stats.draws = draws.len();
    (draws, stats)
}

fn append_entity_draws(
    scene: &Scene,
    canonical: Entity,
    frame_slot: usize,
    draws: &mut Vec<DrawCommand>,
    stats: &mut DrawStats,
) {
    let registry = &scene.registry;
    let resources = &scene.resources;
    let (Some(mesh_component), Some(tag)) = (registry.get::<MeshComponent>(canonical), registry.get::<InstanceTag>(canonical))
    else {
        return;
    };
    if tag.is_empty() {
        return;
    }

    let Some(model) = resources.models.get(mesh_component.model) else {
        log::warn!("{canonical:?} references a missing model");
        return;
    };
    let (Some(vertex_buffer), Some(mesh)) = (model.vertex_buffer(), model.mesh(mesh_component.mesh_index)) else {
        log::warn!("model `{}` is not uploaded or has no mesh {}", model.name(), mesh_component.mesh_index);
        return;
    };
    let index_buffer = model.index_buffer().map(|b| b.raw_handle());

    let joint_buffer_index = registry
        .get::<SkeletalComponent>(canonical)
        .and_then(|s| resources.rigs.get(s.rig))
        .map_or(InstanceData::NO_SKELETON, |rig| rig.joint_buffer_index(frame_slot));
    let material_overrides = registry.get::<MaterialComponent>(canonical);

    for (index, primitive) in mesh.primitives.iter().enumerate() {
        let instance_buffer = mesh_component
            .instance_buffers
            .get(index)
            .and_then(|&handle| resources.instance_buffers.get(handle));
        let material_handle = material_overrides
            .and_then(|m| m.materials.get(index).copied())
            .unwrap_or(primitive.material);
        let (Some(instance_buffer), Some(material)) = (instance_buffer, resources.materials.get(material_handle)) else {
            stats.skipped += 1;
            continue;
        };
        // 当前槽位还没有上传时跳过，避免着色器读到未初始化的数据
        if instance_buffer.count() < tag.len() || !instance_buffer.is_uploaded(frame_slot) {
            stats.skipped += 1;
            continue;
        }

        let indexed = primitive.is_indexed() && index_buffer.is_some();
        draws.push(DrawCommand {
            kind: material.kind,
            vertex_buffer: vertex_buffer.raw_handle(),
            index_buffer: if indexed { index_buffer } else { None },
            first_index: primitive.first_index,
            index_count: primitive.index_count,
            first_vertex: primitive.first_vertex,
            vertex_count: primitive.vertex_count,
            instance_count: tag.len() as u32,
            push_constants: material.push_constants(instance_buffer.bindless_index(frame_slot), joint_buffer_index),
        });
        stats.instances += tag.len();
    }
}
