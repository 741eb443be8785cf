//! 节点树 -> 实体与场景图节点
//!
//! 含有 mesh 的节点（及其祖先）是"可实例化的"：每个请求的实例都会创建一份。
//! 第一个实例中的 mesh 节点成为规范实体，持有 Mesh/Material/InstanceTag；
//! 之后的实例只创建带 Transform 的轻量实体，并追加到规范实体的 InstanceTag 中。

use std::collections::HashMap;

use glam::{Mat4, Quat, Vec3};
use gltf::khr_lights_punctual::Kind as LightKind;
use vela_render_interface::instance_buffer::InstanceBuffer;
use vela_render_interface::render_context::RenderContext;
use vela_gfx::backend::MaterialKind;
use vela_scene::components::{
    DefaultDiffuse, GroupTag, InstanceTag, MaterialComponent, MeshComponent, PbrNoMap, PointLight, SkeletalComponent,
    Transform,
};
use vela_scene::ecs::Entity;
use vela_scene::resources::{InstanceBufferHandle, MaterialHandle, ModelHandle, RigHandle};
use vela_scene::scene::Scene;
use vela_scene::scene_graph::ROOT_NODE;

use super::LoadJournal;
use crate::error::{AssetError, AssetResult};

/// 每个 glTF mesh 在模型中的下标以及各 primitive 的材质
pub(crate) struct MeshInfo {
    pub model_mesh: usize,
    pub name: String,
    pub materials: Vec<MaterialHandle>,
}

pub(crate) struct NodeRequest {
    pub instance_count: usize,
    pub scene_id: Option<usize>,
    pub use_scene_graph: bool,
}

pub(crate) struct NodeOutput {
    pub group: Entity,
    pub canonical_entities: Vec<Entity>,
    pub first_instances: Vec<Entity>,
}

pub(crate) struct NodeBuilder<'a> {
    pub ctx: &'a RenderContext,
    pub document: &'a gltf::Document,
    pub asset_name: &'a str,
    pub asset_path: &'a str,
    pub model: ModelHandle,
    pub meshes: &'a [Option<MeshInfo>],
    pub rig: Option<RigHandle>,
}

/// 标记子树中含有 mesh 的节点
pub(crate) fn mark_nodes(document: &gltf::Document) -> Vec<bool> {
    fn mark(node: &gltf::Node, marks: &mut Vec<Option<bool>>) -> bool {
        if let Some(done) = marks[node.index()] {
            return done;
        }
        // 先占位，防止非法的环导致无限递归
        marks[node.index()] = Some(false);
        let mut markable = node.mesh().is_some();
        for child in node.children() {
            markable |= mark(&child, marks);
        }
        marks[node.index()] = Some(markable);
        markable
    }

    let mut marks = vec![None; document.nodes().len()];
    for node in document.nodes() {
        mark(&node, &mut marks);
    }
    marks.into_iter().map(|m| m.unwrap_or(false)).collect()
}

/// 所有 primitive 都没有贴图时打上着色标记：默认 PBR 参数用 DefaultDiffuse，否则用 PbrNoMap
fn tag_untextured(scene: &mut Scene, entity: Entity, materials: &[MaterialHandle]) {
    let mut untextured = materials.iter().map(|&handle| scene.resources.materials.get(handle)).peekable();
    if untextured.peek().is_none() {
        return;
    }
    let mut default_params = true;
    for material in untextured {
        let Some(material) = material.filter(|m| m.kind == MaterialKind::NoMap) else {
            return;
        };
        default_params &= material.params.roughness == 1.0 && material.params.metallic == 0.0;
    }
    if default_params {
        scene.registry.emplace(entity, DefaultDiffuse);
    } else {
        scene.registry.emplace(entity, PbrNoMap);
    }
}

fn node_transform(node: &gltf::Node) -> Transform {
    let (t, r, s) = node.transform().decomposed();
    Transform::new(Vec3::from(t), Quat::from_array(r).normalize(), Vec3::from(s))
}

/// 没有 scene 时，把不是任何节点子节点的节点作为根
fn root_nodes(document: &gltf::Document) -> Vec<gltf::Node<'_>> {
    let mut is_child = vec![false; document.nodes().len()];
    for node in document.nodes() {
        for child in node.children() {
            is_child[child.index()] = true;
        }
    }
    document.nodes().filter(|n| !is_child[n.index()]).collect()
}

struct BuildState {
    marks: Vec<bool>,
    use_scene_graph: bool,
    instance_count: usize,
    /// glTF 节点下标 -> 规范实体
    canonical: HashMap<usize, Entity>,
    canonical_order: Vec<Entity>,
    skinned: Vec<Entity>,
}

impl NodeBuilder<'_> {
    pub fn build(&self, scene: &mut Scene, request: &NodeRequest, journal: &mut LoadJournal) -> AssetResult<NodeOutput> {
        let _span = tracy_client::span!("gltf::build_nodes");

        let roots: Vec<gltf::Node> = match request.scene_id {
            Some(id) => {
                let gltf_scene = self.document.scenes().nth(id).ok_or_else(|| {
                    AssetError::parse(self.asset_path, format!("scene {id} does not exist"))
                })?;
                gltf_scene.nodes().collect()
            }
            None if self.document.scenes().len() > 0 => self.document.scenes().flat_map(|s| s.nodes()).collect(),
            None => root_nodes(self.document),
        };

        // 分组节点
        let group = scene.registry.create();
        journal.entities.push(group);
        scene.registry.emplace(group, Transform::default());
        scene.registry.emplace(
            group,
            GroupTag {
                asset_name: self.asset_name.to_string(),
            },
        );
        let group_node = if request.use_scene_graph {
            scene
                .scene_graph
                .create_node(ROOT_NODE, group, self.asset_name, self.asset_path, &mut scene.dictionary)
        } else {
            scene.dictionary.insert_short(self.asset_name, group);
            scene.dictionary.insert_long(self.asset_path, group);
            ROOT_NODE
        };

        let mut state = BuildState {
            marks: mark_nodes(self.document),
            use_scene_graph: request.use_scene_graph,
            instance_count: request.instance_count,
            canonical: HashMap::new(),
            canonical_order: Vec::new(),
            skinned: Vec::new(),
        };

        let mut first_instances = Vec::with_capacity(request.instance_count);
        for instance in 0..request.instance_count {
            let mut first = None;
            for root in &roots {
                let entity = self.spawn_node(scene, journal, &mut state, root, group_node, Mat4::IDENTITY, instance)?;
                first = first.or(entity);
            }
            first_instances.extend(first);
        }

        // 骨骼与动画挂到带 skin 的规范实体以及分组实体上
        if let Some(rig) = self.rig {
            for &entity in state.skinned.iter().chain(std::iter::once(&group)) {
                scene.registry.emplace(entity, SkeletalComponent { rig });
            }
        }

        Ok(NodeOutput {
            group,
            canonical_entities: state.canonical_order,
            first_instances,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_node(
        &self,
        scene: &mut Scene,
        journal: &mut LoadJournal,
        state: &mut BuildState,
        node: &gltf::Node,
        parent: usize,
        parent_global: Mat4,
        instance: usize,
    ) -> AssetResult<Option<Entity>> {
        let markable = state.marks.get(node.index()).copied().unwrap_or(false);
        if instance > 0 && !markable {
            return Ok(None);
        }

        let entity = scene.registry.create();
        journal.entities.push(entity);

        let local = node_transform(node);
        let global = parent_global * local.local_matrix();
        let transform = if state.use_scene_graph { local } else { Transform::from_matrix(global) };
        scene.registry.emplace(entity, transform);

        let base_name = node.name().map_or_else(|| format!("node-{}", node.index()), str::to_string);
        let name = if instance == 0 { base_name } else { format!("{base_name}_{instance}") };
        let long_name = format!("{}::{}::{}", self.asset_path, instance, node.index());
        let graph_node = if state.use_scene_graph {
            scene.scene_graph.create_node(parent, entity, &name, &long_name, &mut scene.dictionary)
        } else {
            scene.dictionary.insert_short(&name, entity);
            scene.dictionary.insert_long(&long_name, entity);
            parent
        };

        if let Some(mesh) = node.mesh() {
            self.attach_mesh(scene, journal, state, node, &mesh, entity)?;
        }

        if let Some(light) = node.light() {
            match light.kind() {
                LightKind::Point => scene.registry.emplace(
                    entity,
                    PointLight {
                        color: Vec3::from(light.color()),
                        intensity: light.intensity(),
                        range: light.range(),
                    },
                ),
                _ => log::debug!("light `{}` is not a point light, ignored", light.name().unwrap_or("?")),
            }
        }

        for child in node.children() {
            self.spawn_node(scene, journal, state, &child, graph_node, global, instance)?;
        }
        Ok(Some(entity))
    }

    fn attach_mesh(
        &self,
        scene: &mut Scene,
        journal: &mut LoadJournal,
        state: &mut BuildState,
        node: &gltf::Node,
        mesh: &gltf::Mesh,
        entity: Entity,
    ) -> AssetResult<()> {
        let Some(Some(info)) = self.meshes.get(mesh.index()) else {
            log::warn!("node {} references mesh {} which has nothing to draw", node.index(), mesh.index());
            return Ok(());
        };

        if let Some(&canonical) = state.canonical.get(&node.index()) {
            if let Some(tag) = scene.registry.get_mut::<InstanceTag>(canonical) {
                tag.instances.push(entity);
            }
            return Ok(());
        }

        let mut instance_buffers: Vec<InstanceBufferHandle> = Vec::with_capacity(info.materials.len());
        for primitive in 0..info.materials.len() {
            let buffer = InstanceBuffer::with_capacity(
                self.ctx,
                state.instance_count,
                format!("{}-{}-{}", info.name, node.index(), primitive),
            )?;
            let handle = scene.resources.instance_buffers.insert(buffer);
            journal.instance_buffers.push(handle);
            instance_buffers.push(handle);
        }

        scene.registry.emplace(
            entity,
            MeshComponent {
                model: self.model,
                mesh_index: info.model_mesh,
                instance_buffers,
            },
        );
        scene.registry.emplace(
            entity,
            MaterialComponent {
                materials: info.materials.clone(),
            },
        );
        scene.registry.emplace(entity, InstanceTag::new(entity));
        tag_untextured(scene, entity, &info.materials);

        if node.skin().is_some() {
            state.skinned.push(entity);
        }
        state.canonical.insert(node.index(), entity);
        state.canonical_order.push(entity);
        Ok(())
    }
}
