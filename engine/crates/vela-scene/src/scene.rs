use glam::Mat4;
use itertools::Itertools;
use slotmap::Key;
use vela_gfx::error::GfxResult;
use vela_render_interface::instance_buffer::InstanceData;
use vela_render_interface::render_context::RenderContext;

use crate::components::{InstanceTag, MeshComponent, SkeletalComponent, Transform};
use crate::dictionary::Dictionary;
use crate::ecs::{Entity, Registry};
use crate::resources::SceneResources;
use crate::scene_graph::SceneGraph;

/// 场景：注册表、场景图、名字字典与共享资源
///
/// 加载阶段由资产加载器独占写入；渲染阶段由渲染线程每帧更新。
/// 字段公开，方便调用方同时借用不同部分。
#[derive(Default)]
pub struct Scene {
    pub registry: Registry,
    pub scene_graph: SceneGraph,
    pub dictionary: Dictionary,
    pub resources: SceneResources,
}
// new & init
impl Scene {
    pub fn new() -> Self {
        Self::default()
    }
}
// getters
impl Scene {
    /// 持有 mesh 的规范实体
    pub fn canonical_entities(&self) -> Vec<Entity> {
        self.registry.view::<(MeshComponent, InstanceTag)>()
    }

    /// 规范实体的实例数量，其余实体返回 0
    pub fn instance_count(&self, canonical: Entity) -> usize {
        self.registry.get::<InstanceTag>(canonical).map_or(0, |tag| tag.len())
    }

    pub fn retrieve(&self, name: &str) -> Option<Entity> {
        self.dictionary.retrieve(name)
    }
}
// tools
impl Scene {
    /// 销毁实体并移除其名字，用于撤销失败的加载
    ///
    /// 场景图节点需要调用方另行通过 [`SceneGraph::truncate`] 回滚。
    pub fn destroy_entities(&mut self, entities: &[Entity]) {
        for &entity in entities {
            self.dictionary.remove_entity(entity);
            self.registry.destroy(entity);
        }
    }
}
// update
impl Scene {
    /// 重新计算脏的全局矩阵
    ///
    /// 不在场景图中的实体（扁平加载）没有父节点，局部矩阵即全局矩阵。
    pub fn update_transforms(&mut self, frame_id: u64) -> usize {
        let mut updated = self.scene_graph.update_transforms(&mut self.registry, frame_id);

        let graph = &self.scene_graph;
        if let Some(storage) = self.registry.storage_mut::<Transform>() {
            for (entity, transform) in storage.iter_mut() {
                if transform.is_dirty() && graph.node_index(entity).is_none() {
                    transform.set_global(Mat4::IDENTITY, frame_id);
                    updated += 1;
                }
            }
        }
        updated
    }

    /// 推进所有骨骼动画，并把关节矩阵上传到当前帧槽位，返回本帧姿态变化的 rig 数量
    pub fn update_animations(
        &mut self,
        ctx: &RenderContext,
        step: f32,
        frame_id: u64,
        frame_slot: usize,
    ) -> GfxResult<usize> {
        let _span = tracy_client::span!("Scene::update_animations");
        let mut updated = 0;
        for rig in self.resources.rigs.values_mut() {
            if rig.update(step, frame_id) {
                updated += 1;
            }
            rig.upload_joint_matrices(ctx, frame_id, frame_slot)?;
        }
        Ok(updated)
    }

    /// 把每个规范实体的实例矩阵写入其各个 primitive 的实例缓冲，并上传到当前帧槽位
    ///
    /// 只有实例数量变化或者某个实例在本帧更新过矩阵时才重写 CPU 端数据；
    /// 其他槽位在轮到自己时补上传。返回本帧重写的实例缓冲数量。
    pub fn fill_instance_buffers(&mut self, ctx: &RenderContext, frame_id: u64, frame_slot: usize) -> GfxResult<usize> {
        let _span = tracy_client::span!("Scene::fill_instance_buffers");

        let mut written = 0;
        for canonical in self.canonical_entities() {
            let (Some(mesh), Some(tag)) =
                (self.registry.get::<MeshComponent>(canonical), self.registry.get::<InstanceTag>(canonical))
            else {
                continue;
            };

            let joint_buffer_index = self
                .registry
                .get::<SkeletalComponent>(canonical)
                .and_then(|s| self.resources.rigs.get(s.rig))
                .map_or(InstanceData::NO_SKELETON, |rig| rig.joint_buffer_index(frame_slot));

            let transforms = tag
                .instances
                .iter()
                .filter_map(|&e| self.registry.get::<Transform>(e).map(|t| (e, t)))
                .collect_vec();
            let changed = transforms.iter().any(|(_, t)| t.last_updated_frame() == Some(frame_id));

            for &handle in &mesh.instance_buffers {
                let Some(instance_buffer) = self.resources.instance_buffers.get_mut(handle) else {
                    log::warn!("mesh of {canonical:?} references a missing instance buffer");
                    continue;
                };
                if changed || instance_buffer.count() != transforms.len() {
                    instance_buffer.resize(transforms.len());
                    for (index, (entity, transform)) in transforms.iter().enumerate() {
                        let data = InstanceData {
                            entity_id: entity.data().as_ffi() as u32,
                            ..InstanceData::new(transform.global_matrix())
                        };
                        instance_buffer.update_at(index, data)?;
                    }
                    written += 1;
                }
                instance_buffer.upload(ctx, frame_id, frame_slot, joint_buffer_index)?;
            }
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::Vec3;
    use slotmap::Key;
    use vela_gfx::host::HostBackend;
    use vela_render_interface::instance_buffer::InstanceBuffer;
    use vela_render_interface::pipeline_settings::RendererSettings;

    use super::*;
    use crate::resources::ModelHandle;
    use crate::scene_graph::ROOT_NODE;

    #[test]
    fn test_fill_instance_buffers_only_when_changed() {
        let host = Arc::new(HostBackend::new());
        let ctx = RenderContext::new(host, RendererSettings::default()).unwrap();
        let mut scene = Scene::new();

        let instance_buffer = InstanceBuffer::new(&ctx, "cube").unwrap();
        let handle = scene.resources.instance_buffers.insert(instance_buffer);

        let canonical = scene.registry.create();
        let second = scene.registry.create();
        scene.registry.emplace(canonical, Transform::from_translation(Vec3::X));
        scene.registry.emplace(second, Transform::from_translation(Vec3::Y));
        scene.registry.emplace(
            canonical,
            MeshComponent {
                model: ModelHandle::null(),
                mesh_index: 0,
                instance_buffers: vec![handle],
            },
        );
        scene.registry.emplace(
            canonical,
            InstanceTag {
                instances: vec![canonical, second],
            },
        );
        scene.scene_graph.create_node(ROOT_NODE, canonical, "cube", "cube::0", &mut scene.dictionary);
        scene.scene_graph.create_node(ROOT_NODE, second, "cube", "cube::1", &mut scene.dictionary);

        assert_eq!(scene.canonical_entities(), vec![canonical]);
        assert_eq!(scene.instance_count(canonical), 2);

        scene.update_transforms(1);
        assert_eq!(scene.fill_instance_buffers(&ctx, 1, 1).unwrap(), 1);
        let buffer = &scene.resources.instance_buffers[handle];
        assert_eq!(buffer.count(), 2);
        let second_data = buffer.uploaded(1, 1).unwrap();
        assert!(second_data.model.w_axis.truncate().abs_diff_eq(Vec3::Y, 1e-6));
        assert_eq!(second_data.joint_buffer_index, InstanceData::NO_SKELETON);
        assert!(!buffer.is_uploaded(2));

        // 没有变化时不重写，但下一个帧槽位仍然补上传
        scene.update_transforms(2);
        assert_eq!(scene.fill_instance_buffers(&ctx, 2, 2).unwrap(), 0);
        assert!(scene.resources.instance_buffers[handle].is_uploaded(2));

        scene.registry.get_mut::<Transform>(second).unwrap().set_translation(Vec3::Z);
        scene.update_transforms(3);
        assert_eq!(scene.fill_instance_buffers(&ctx, 3, 0).unwrap(), 1);
        let buffer = &scene.resources.instance_buffers[handle];
        assert!(buffer.uploaded(0, 1).unwrap().model.w_axis.truncate().abs_diff_eq(Vec3::Z, 1e-6));
        // 槽位 1 还保存着第 1 帧的数据
        assert!(buffer.uploaded(1, 1).unwrap().model.w_axis.truncate().abs_diff_eq(Vec3::Y, 1e-6));
    }

    #[test]
    fn test_transforms_outside_graph_are_updated() {
        let mut scene = Scene::new();
        let loose = scene.registry.create();
        scene.registry.emplace(loose, Transform::from_translation(Vec3::X));

        assert_eq!(scene.update_transforms(1), 1);
        assert_eq!(scene.registry.get::<Transform>(loose).unwrap().last_updated_frame(), Some(1));
        assert_eq!(scene.update_transforms(2), 0);

        scene.registry.get_mut::<Transform>(loose).unwrap().set_translation(Vec3::new(7.0, 0.0, 0.0));
        assert_eq!(scene.update_transforms(3), 1);
        let transform = scene.registry.get::<Transform>(loose).unwrap();
        assert!(transform.global_matrix().w_axis.truncate().abs_diff_eq(Vec3::new(7.0, 0.0, 0.0), 1e-6));
    }

    #[test]
    fn test_destroy_entities_removes_names() {
        let mut scene = Scene::new();
        let e = scene.registry.create();
        scene.scene_graph.create_node(ROOT_NODE, e, "lamp", "lamp::0", &mut scene.dictionary);
        let checkpoint = 1;

        scene.destroy_entities(&[e]);
        scene.scene_graph.truncate(checkpoint);
        assert!(!scene.registry.valid(e));
        assert_eq!(scene.retrieve("lamp"), None);
        assert!(scene.scene_graph.is_empty());
    }
}
