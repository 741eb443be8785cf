//! glTF 场景构建
//!
//! 加载分为以下阶段，任意阶段失败都会撤销本次加载创建的全部实体与资源：
//!
//! 1. 解析：按内容识别 GLB，检查必需扩展，导入 buffer 与 image
//! 2. 纹理：按用途选择 sRGB / 线性，创建纹理并注册 bindless 槽位
//! 3. 材质：按可用贴图选择最具体的材质种类
//! 4. 顶点：每个 mesh 一个任务并行读取，重建切线，对非索引数据去重
//! 5. 骨骼：skin 0，关节按父先子后重新排序，关节矩阵缓冲注册到 bindless
//! 6. 动画：sampler 与 channel，丢弃指向未知关节的 channel
//! 7. 节点：按请求的实例数创建实体，mesh 数据只保留一份
//! 8. 连接：带 skin 的实体获得骨骼与动画

mod accessor;
mod animations;
mod materials;
mod meshes;
mod nodes;
mod parse;
mod skeleton;
mod tangents;
mod textures;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

use vela_render_interface::render_context::RenderContext;
use vela_scene::ecs::Entity;
use vela_scene::resources::{InstanceBufferHandle, MaterialHandle, ModelHandle, Rig, RigHandle, TextureHandle};
use vela_scene::scene::Scene;

pub use parse::{SUPPORTED_EXTENSIONS, is_glb};
pub use tangents::generate_tangents;

use crate::error::{AssetError, AssetResult};
use nodes::{MeshInfo, NodeBuilder, NodeRequest};

/// 一次成功加载的结果
#[derive(Debug, Clone)]
pub struct LoadedAsset {
    /// 分组实体，资产的全部节点都在它下面
    pub group: Entity,
    pub model: ModelHandle,
    pub rig: Option<RigHandle>,
    /// 持有 mesh 的规范实体，按创建顺序
    pub canonical_entities: Vec<Entity>,
}

/// 本次加载创建的全部对象，失败时据此回滚
#[derive(Default)]
pub(crate) struct LoadJournal {
    pub entities: Vec<Entity>,
    pub textures: Vec<TextureHandle>,
    pub materials: Vec<MaterialHandle>,
    pub models: Vec<ModelHandle>,
    pub rigs: Vec<RigHandle>,
    pub instance_buffers: Vec<InstanceBufferHandle>,
    graph_len: usize,
}
impl LoadJournal {
    fn new(scene: &Scene) -> Self {
        Self {
            graph_len: scene.scene_graph.len(),
            ..Default::default()
        }
    }

    /// 撤销本次加载；已经登记但尚未提交的 bindless 写入一并丢弃
    fn rollback(self, scene: &mut Scene, ctx: &RenderContext) {
        log::warn!(
            "rolling back: {} entities, {} textures, {} materials, {} instance buffers",
            self.entities.len(),
            self.textures.len(),
            self.materials.len(),
            self.instance_buffers.len()
        );
        scene.destroy_entities(&self.entities);
        scene.scene_graph.truncate(self.graph_len);
        let resources = &mut scene.resources;

        let texture_ids = self
            .textures
            .iter()
            .filter_map(|&h| resources.textures.get(h))
            .map(|t| t.texture.id())
            .collect::<Vec<_>>();
        let buffer_ids = self
            .instance_buffers
            .iter()
            .filter_map(|&h| resources.instance_buffers.get(h))
            .flat_map(|b| b.gpu_buffers().buffer_ids())
            .chain(
                self.rigs
                    .iter()
                    .filter_map(|&h| resources.rigs.get(h))
                    .flat_map(|r| r.joint_buffers().buffer_ids()),
            )
            .collect::<Vec<_>>();
        ctx.bindless_manager().discard_pending(&buffer_ids, &texture_ids);

        for handle in self.instance_buffers {
            resources.instance_buffers.remove(handle);
        }
        for handle in self.rigs {
            resources.rigs.remove(handle);
        }
        for handle in self.models {
            resources.models.remove(handle);
        }
        for handle in self.materials {
            resources.materials.remove(handle);
        }
        for handle in self.textures {
            resources.textures.remove(handle);
        }
    }
}

/// glTF / GLB 文件的构建器
///
/// # 使用示例
/// ```ignore
/// let builder = GltfBuilder::new(&ctx, "assets/models/fox.glb");
/// let asset = builder.load(&mut scene, 4, None)?;
/// let fox = scene.retrieve("fox").unwrap();
/// ```
pub struct GltfBuilder<'a> {
    ctx: &'a RenderContext,
    path: PathBuf,
    pool: Option<rayon::ThreadPool>,
}
// new & init
impl<'a> GltfBuilder<'a> {
    pub fn new(ctx: &'a RenderContext, path: impl AsRef<Path>) -> Self {
        Self {
            ctx,
            path: path.as_ref().to_path_buf(),
            pool: None,
        }
    }

    /// 使用独立的加载线程池，0 表示使用 rayon 的全局线程池
    pub fn with_loader_threads(mut self, threads: usize) -> AssetResult<Self> {
        if threads == 0 {
            self.pool = None;
            return Ok(self);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("Asset-Loader-{index}"))
            .build()
            .map_err(|e| AssetError::semantic(format!("failed to create loader thread pool: {e}")))?;
        self.pool = Some(pool);
        Ok(self)
    }
}
// load
impl GltfBuilder<'_> {
    /// 加载 `instance_count` 个实例；`scene_id` 为 `None` 时加载全部 scene
    pub fn load(&self, scene: &mut Scene, instance_count: usize, scene_id: Option<usize>) -> AssetResult<LoadedAsset> {
        self.build(
            scene,
            NodeRequest {
                instance_count,
                scene_id,
                use_scene_graph: true,
            },
            None,
        )
    }

    /// 加载全部 scene，并在 `out_first_instances` 中返回每个实例的第一个实体
    ///
    /// `use_scene_graph` 为 false 时不创建场景图节点，实体的 Transform 直接保存展平后的矩阵。
    pub fn load_with_instances(
        &self,
        scene: &mut Scene,
        instance_count: usize,
        out_first_instances: &mut Vec<Entity>,
        use_scene_graph: bool,
    ) -> AssetResult<LoadedAsset> {
        self.build(
            scene,
            NodeRequest {
                instance_count,
                scene_id: None,
                use_scene_graph,
            },
            Some(out_first_instances),
        )
    }

    fn build(
        &self,
        scene: &mut Scene,
        request: NodeRequest,
        out_first_instances: Option<&mut Vec<Entity>>,
    ) -> AssetResult<LoadedAsset> {
        let _span = tracy_client::span!("GltfBuilder::build");
        let mut journal = LoadJournal::new(scene);

        match self.build_stages(scene, &request, &mut journal) {
            Ok((asset, first_instances)) => {
                if let Some(out) = out_first_instances {
                    out.extend(first_instances);
                }
                log::info!(
                    "loaded {} x{}: {} entities",
                    self.path.display(),
                    request.instance_count,
                    journal.entities.len()
                );
                Ok(asset)
            }
            Err(e) => {
                log::error!("failed to load {}: {e}", self.path.display());
                journal.rollback(scene, self.ctx);
                Err(e)
            }
        }
    }

    fn build_stages(
        &self,
        scene: &mut Scene,
        request: &NodeRequest,
        journal: &mut LoadJournal,
    ) -> AssetResult<(LoadedAsset, Vec<Entity>)> {
        if request.instance_count == 0 {
            return Err(AssetError::semantic("instance count must be at least 1"));
        }

        let asset_path = self.path.to_string_lossy().to_string();
        let asset_name = self.path.file_stem().map_or_else(|| asset_path.clone(), |s| s.to_string_lossy().to_string());

        // 1. parse
        let parsed = parse::parse(&self.path)?;
        let document = &parsed.document;

        // 5. skeleton 先于顶点读取，JOINTS_0 需要重排后的关节下标
        let loaded_skeleton = skeleton::load_skeleton(document, &parsed.buffers)?;

        // 2. textures
        let textures =
            textures::load_textures(self.ctx, document, &parsed.images, &mut scene.resources, &mut journal.textures)?;

        // 3. materials
        let material_table = materials::load_materials(
            document,
            &textures,
            self.ctx.settings().normal_map_intensity,
            &mut scene.resources,
            &mut journal.materials,
        );

        // 4. vertices
        let skin_to_joint = loaded_skeleton.as_ref().map(|s| s.skin_to_joint.as_slice());
        let loaded_meshes = meshes::load_meshes(document, &parsed.buffers, skin_to_joint, self.pool.as_ref())?;
        let (mut model, mesh_map) = meshes::build_model(&asset_name, loaded_meshes, &material_table, document.meshes().len());
        model.upload(self.ctx)?;

        let mesh_infos: Vec<Option<MeshInfo>> = mesh_map
            .iter()
            .map(|slot| {
                let model_mesh = (*slot)?;
                let mesh = model.mesh(model_mesh)?;
                Some(MeshInfo {
                    model_mesh,
                    name: mesh.name.clone(),
                    materials: mesh.primitives.iter().map(|p| p.material).collect(),
                })
            })
            .collect();
        log::info!(
            "model `{}`: {} vertices, {} indices, {} meshes",
            model.name(),
            model.vertices().len(),
            model.indices().len(),
            model.meshes().len()
        );
        let model_handle = scene.resources.models.insert(model);
        journal.models.push(model_handle);

        // 6. animations
        let rig = match loaded_skeleton {
            Some(loaded) => {
                let animations = animations::load_animations(document, &parsed.buffers, &loaded.skeleton)?;
                let rig = Rig::new(self.ctx, loaded.skeleton, animations)?;
                let handle = scene.resources.rigs.insert(rig);
                journal.rigs.push(handle);
                Some(handle)
            }
            None => {
                if document.animations().len() > 0 {
                    log::warn!("{} animations ignored, the file has no skin", document.animations().len());
                }
                None
            }
        };

        // 7 & 8. nodes
        let node_builder = NodeBuilder {
            ctx: self.ctx,
            document,
            asset_name: &asset_name,
            asset_path: &asset_path,
            model: model_handle,
            meshes: &mesh_infos,
            rig,
        };
        let output = node_builder.build(scene, request, journal)?;

        Ok((
            LoadedAsset {
                group: output.group,
                model: model_handle,
                rig,
                canonical_entities: output.canonical_entities,
            },
            output.first_instances,
        ))
    }
}
