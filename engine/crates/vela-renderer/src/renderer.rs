use std::sync::Arc;
use std::time::Duration;

use vela_gfx::backend::{DrawCommand, GfxBackend};
use vela_render_interface::frame_counter::FrameCounter;
use vela_render_interface::pipeline_settings::RendererSettings;
use vela_render_interface::render_context::RenderContext;
use vela_scene::scene::Scene;

use crate::draw_list::{DrawStats, build_draw_list};
use crate::error::RenderResult;
use crate::outer_app::{FrameInfo, OuterApp};
use crate::timer::Timer;

/// 一帧的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame_id: u64,
    pub transforms_updated: usize,
    pub rigs_updated: usize,
    pub instance_buffers_written: usize,
    pub draw: DrawStats,
}

/// 渲染器：持有渲染上下文、场景与帧计数
///
/// 渲染线程上单线程执行，场景在 `render_frame` 期间只被本线程访问。
pub struct Renderer {
    ctx: RenderContext,
    scene: Scene,
    frame_counter: FrameCounter,
    timer: Timer,
    last_stats: FrameStats,
}
// new & init
impl Renderer {
    pub fn new(backend: Arc<dyn GfxBackend>, settings: RendererSettings) -> RenderResult<Self> {
        let _span = tracy_client::span!("Renderer::new");
        log::info!("renderer on `{}` backend, {} frames in flight", backend.name(), settings.frames_in_flight);

        let frame_counter = FrameCounter::new(1, settings.frames_in_flight);
        let ctx = RenderContext::new(backend, settings)?;
        Ok(Self {
            ctx,
            scene: Scene::new(),
            frame_counter,
            timer: Timer::default(),
            last_stats: FrameStats::default(),
        })
    }

    /// 每帧使用固定的时间步长，而不是真实的帧间隔
    pub fn with_fixed_step(mut self, step: Duration) -> Self {
        self.timer = Timer::with_fixed_step(step);
        self
    }

    pub fn init_app(&mut self, app: &mut dyn OuterApp) -> RenderResult<()> {
        let _span = tracy_client::span!("OuterApp::init");
        app.init(&self.ctx, &mut self.scene)
    }
}
// getters
impl Renderer {
    #[inline]
    pub fn ctx(&self) -> &RenderContext {
        &self.ctx
    }

    #[inline]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    #[inline]
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    /// 同时借用上下文与场景，用于加载资产
    #[inline]
    pub fn ctx_and_scene_mut(&mut self) -> (&RenderContext, &mut Scene) {
        (&self.ctx, &mut self.scene)
    }

    #[inline]
    pub fn frame_counter(&self) -> &FrameCounter {
        &self.frame_counter
    }

    #[inline]
    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    #[inline]
    pub fn last_stats(&self) -> FrameStats {
        self.last_stats
    }
}
// update
impl Renderer {
    /// 渲染一帧
    ///
    /// `begin_frame` 先等待当前槽位上一次提交的 fence，之后才写入该槽位的实例缓冲与关节缓冲；
    /// 同时回收已经离开 frames in flight 窗口的旧 buffer。
    pub fn render_frame(&mut self, app: &mut dyn OuterApp) -> RenderResult<FrameStats> {
        let _span = tracy_client::span!("Renderer::render_frame");
        let frame_id = self.frame_counter.frame_id();
        let frame_slot = self.frame_counter.frame_slot();
        self.timer.tick();

        self.ctx.backend().begin_frame(frame_id, frame_slot)?;
        self.ctx.cleanup(frame_id);

        let draws = match self.prepare_frame(app, frame_id, frame_slot) {
            Ok(draws) => draws,
            Err(e) => {
                // 已经开始的帧必须结束，否则下一帧无法开始
                if let Err(end_error) = self.ctx.backend().end_frame() {
                    log::error!("failed to end frame {frame_id} after error: {end_error}");
                }
                return Err(e);
            }
        };

        // 7. 提交
        {
            let _span = tracy_client::span!("submit");
            let backend = self.ctx.backend();
            backend.record_draws(&draws)?;
            backend.end_frame()?;
        }

        log::trace!("{} {:?}", self.frame_counter.frame_name(), self.last_stats);
        self.frame_counter.next_frame();
        tracy_client::frame_mark();
        Ok(self.last_stats)
    }

    fn prepare_frame(
        &mut self,
        app: &mut dyn OuterApp,
        frame_id: u64,
        frame_slot: usize,
    ) -> RenderResult<Vec<DrawCommand>> {
        let step = self.timer.delta_time_s();

        // 1. 输入 -> 应用状态
        {
            let _span = tracy_client::span!("OuterApp::update");
            let frame = FrameInfo {
                frame_id,
                timer: &self.timer,
            };
            app.update(&self.ctx, &mut self.scene, &frame)?;
        }

        // 2. 变换
        let transforms_updated = self.scene.update_transforms(frame_id);

        // 3. 动画
        let rigs_updated = self.scene.update_animations(&self.ctx, step, frame_id, frame_slot)?;

        // 4. 实例缓冲
        let instance_buffers_written = self.scene.fill_instance_buffers(&self.ctx, frame_id, frame_slot)?;

        // 5. 所有新的 bindless 槽位在 draw 之前一次性提交
        self.ctx.bindless_manager().update_bindless_descriptor_sets()?;

        // 6. draw 列表
        let (draws, draw) = build_draw_list(&self.scene, frame_slot);

        self.last_stats = FrameStats {
            frame_id,
            transforms_updated,
            rigs_updated,
            instance_buffers_written,
            draw,
        };
        Ok(draws)
    }

    /// 连续渲染 `frames` 帧，返回最后一帧的统计
    pub fn run(&mut self, app: &mut dyn OuterApp, frames: usize) -> RenderResult<FrameStats> {
        for _ in 0..frames {
            self.render_frame(app)?;
        }
        Ok(self.last_stats)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.ctx.backend().wait_idle() {
            log::error!("failed to wait for device idle: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use glam::{Mat4, Quat, Vec3};
    use vela_animation::animations::Animations;
    use vela_animation::skeleton::{Joint, Skeleton};
    use vela_gfx::host::HostBackend;
    use vela_render_interface::instance_buffer::InstanceBuffer;
    use vela_scene::components::{InstanceTag, MaterialComponent, MeshComponent, SkeletalComponent, Transform};
    use vela_scene::ecs::Entity;
    use vela_scene::material::{Material, MaterialParams, MaterialTextures};
    use vela_scene::model::{Mesh, Model, Primitive, Vertex};
    use vela_scene::resources::Rig;
    use vela_scene::scene_graph::ROOT_NODE;

    use super::*;
    use crate::error::RenderError;

    /// 一个三角形，`instances` 个实例排成一排
    struct Triangles {
        instances: usize,
        skinned: bool,
        canonical: Option<Entity>,
        moved: Option<Entity>,
    }
    impl Triangles {
        fn new(instances: usize) -> Self {
            Self {
                instances,
                skinned: false,
                canonical: None,
                moved: None,
            }
        }
    }
    impl OuterApp for Triangles {
        fn init(&mut self, ctx: &RenderContext, scene: &mut Scene) -> RenderResult<()> {
            let material = scene.resources.materials.insert(Material::new(
                "plain",
                MaterialParams::with_normal_map_intensity(1.0),
                MaterialTextures::default(),
                self.skinned,
            ));
            let vertices = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]
                .map(|position| Vertex {
                    position,
                    ..Default::default()
                })
                .to_vec();
            let mesh = Mesh {
                name: "triangle".to_string(),
                primitives: vec![Primitive {
                    first_index: 0,
                    first_vertex: 0,
                    index_count: 3,
                    vertex_count: 3,
                    material,
                }],
            };
            let mut model = Model::new("triangle", vertices, vec![0, 1, 2], vec![mesh]);
            model.upload(ctx)?;
            let model = scene.resources.models.insert(model);
            let instance_buffer = scene.resources.instance_buffers.insert(InstanceBuffer::new(ctx, "triangle")?);

            let mut instances = Vec::new();
            for i in 0..self.instances {
                let entity = scene.registry.create();
                scene.registry.emplace(entity, Transform::from_translation(Vec3::X * i as f32));
                scene.scene_graph.create_node(
                    ROOT_NODE,
                    entity,
                    &format!("triangle_{i}"),
                    &format!("test::{i}"),
                    &mut scene.dictionary,
                );
                instances.push(entity);
            }
            let canonical = *instances.first().ok_or_else(|| RenderError::App("no instances".to_string()))?;
            scene.registry.emplace(
                canonical,
                MeshComponent {
                    model,
                    mesh_index: 0,
                    instance_buffers: vec![instance_buffer],
                },
            );
            scene.registry.emplace(
                canonical,
                MaterialComponent {
                    materials: vec![material],
                },
            );
            scene.registry.emplace(canonical, InstanceTag { instances: instances.clone() });

            if self.skinned {
                let joints = vec![Joint::new("root", Mat4::IDENTITY, Vec3::ZERO, Quat::IDENTITY, Vec3::ONE)];
                let skeleton = Skeleton::new("skeleton", joints, HashMap::from([(0, 0)]));
                let rig = scene.resources.rigs.insert(Rig::new(ctx, skeleton, Animations::new())?);
                scene.registry.emplace(canonical, SkeletalComponent { rig });
            }

            self.canonical = Some(canonical);
            self.moved = instances.last().copied();
            Ok(())
        }

        fn update(&mut self, _ctx: &RenderContext, scene: &mut Scene, frame: &FrameInfo) -> RenderResult<()> {
            if frame.frame_id == 3 {
                if let Some(transform) = self.moved.and_then(|e| scene.registry.get_mut::<Transform>(e)) {
                    transform.set_translation(Vec3::new(0.0, 5.0, 0.0));
                }
            }
            Ok(())
        }
    }

    fn renderer(host: &Arc<HostBackend>) -> Renderer {
        Renderer::new(host.clone(), RendererSettings::default())
            .unwrap()
            .with_fixed_step(Duration::from_millis(16))
    }

    #[test]
    fn test_instanced_draw_after_first_frame() {
        let host = Arc::new(HostBackend::new());
        let mut renderer = renderer(&host);
        let mut app = Triangles::new(4);
        renderer.init_app(&mut app).unwrap();

        let stats = renderer.render_frame(&mut app).unwrap();
        assert_eq!(stats.frame_id, 1);
        assert_eq!(stats.transforms_updated, 4);
        assert_eq!(stats.instance_buffers_written, 1);
        assert_eq!(stats.draw.draws, 1);
        assert_eq!(stats.draw.instances, 4);

        let frame = host.last_frame().unwrap();
        assert_eq!(frame.draws.len(), 1);
        let draw = &frame.draws[0];
        assert_eq!(draw.instance_count, 4);
        assert_eq!(draw.index_count, 3);
        assert!(draw.index_buffer.is_some());

        let scene = renderer.scene();
        let canonical = app.canonical.unwrap();
        let handle = scene.registry.get::<MeshComponent>(canonical).unwrap().instance_buffers[0];
        let instance_buffer = &scene.resources.instance_buffers[handle];
        assert_eq!(instance_buffer.count(), 4);
        assert_eq!(frame.frame_slot, 1);
        assert_eq!(draw.push_constants.instance_buffer_index, instance_buffer.bindless_index(1));
        assert!(instance_buffer.uploaded(1, 3).unwrap().model.w_axis.truncate().abs_diff_eq(Vec3::new(3.0, 0.0, 0.0), 1e-6));

        // 新注册的实例缓冲在 draw 之前已经写入 descriptor set
        let bound = host.bound_buffer(instance_buffer.bindless_index(1)).unwrap();
        assert_eq!(bound.buffer_id, instance_buffer.descriptor(1).buffer.buffer_id);
    }

    #[test]
    fn test_instance_buffer_rewritten_only_on_change() {
        let host = Arc::new(HostBackend::new());
        let mut renderer = renderer(&host);
        let mut app = Triangles::new(2);
        renderer.init_app(&mut app).unwrap();

        assert_eq!(renderer.render_frame(&mut app).unwrap().instance_buffers_written, 1);
        assert_eq!(renderer.render_frame(&mut app).unwrap().instance_buffers_written, 0);
        // 第 3 帧移动最后一个实例
        let stats = renderer.render_frame(&mut app).unwrap();
        assert_eq!(stats.transforms_updated, 1);
        assert_eq!(stats.instance_buffers_written, 1);

        let scene = renderer.scene();
        let handle = scene.registry.get::<MeshComponent>(app.canonical.unwrap()).unwrap().instance_buffers[0];
        // 第 3 帧使用槽位 0
        let moved = scene.resources.instance_buffers[handle].uploaded(0, 1).unwrap();
        assert!(moved.model.w_axis.truncate().abs_diff_eq(Vec3::new(0.0, 5.0, 0.0), 1e-6));
    }

    #[test]
    fn test_each_frame_slot_draws_from_its_own_buffer() {
        let host = Arc::new(HostBackend::new());
        let mut renderer = renderer(&host);
        let mut app = Triangles::new(2);
        renderer.init_app(&mut app).unwrap();
        renderer.run(&mut app, 4).unwrap();

        let frames = host.finished_frames();
        let indices = frames.iter().map(|f| f.draws[0].push_constants.instance_buffer_index).collect::<Vec<_>>();
        // 槽位 1, 2, 0, 1
        assert_eq!(indices[0], indices[3]);
        assert_ne!(indices[0], indices[1]);
        assert_ne!(indices[1], indices[2]);
        assert_ne!(indices[0], indices[2]);

        // 第 3 帧的移动最终上传到了每个槽位
        let scene = renderer.scene();
        let handle = scene.registry.get::<MeshComponent>(app.canonical.unwrap()).unwrap().instance_buffers[0];
        let instance_buffer = &scene.resources.instance_buffers[handle];
        for slot in [0, 1] {
            let moved = instance_buffer.uploaded(slot, 1).unwrap();
            assert!(moved.model.w_axis.truncate().abs_diff_eq(Vec3::new(0.0, 5.0, 0.0), 1e-6));
        }
        // 槽位 2 只在第 2 帧上传过
        let stale = instance_buffer.uploaded(2, 1).unwrap();
        assert!(stale.model.w_axis.truncate().abs_diff_eq(Vec3::X, 1e-6));
    }

    #[test]
    fn test_failed_update_still_ends_frame() {
        struct Failing;
        impl OuterApp for Failing {
            fn init(&mut self, _ctx: &RenderContext, _scene: &mut Scene) -> RenderResult<()> {
                Ok(())
            }

            fn update(&mut self, _ctx: &RenderContext, _scene: &mut Scene, frame: &FrameInfo) -> RenderResult<()> {
                if frame.frame_id == 1 {
                    return Err(RenderError::App("boom".to_string()));
                }
                Ok(())
            }
        }

        let host = Arc::new(HostBackend::new());
        let mut renderer = renderer(&host);
        let mut app = Failing;
        renderer.init_app(&mut app).unwrap();
        assert!(renderer.render_frame(&mut app).is_err());
        assert_eq!(renderer.frame_counter().frame_id(), 1);
        assert_eq!(host.finished_frames().len(), 1);
        assert!(host.finished_frames()[0].draws.is_empty());
        // 失败的帧不推进帧计数，但下一次 begin_frame 可以正常开始
        assert!(renderer.render_frame(&mut app).is_err());
        assert_eq!(host.finished_frames().len(), 2);
    }

    #[test]
    fn test_frame_slots_cycle() {
        let host = Arc::new(HostBackend::new());
        let mut renderer = renderer(&host);
        let mut app = Triangles::new(1);
        renderer.init_app(&mut app).unwrap();
        renderer.run(&mut app, 4).unwrap();

        let frames = host.finished_frames();
        let ids = frames.iter().map(|f| f.frame_id).collect::<Vec<_>>();
        let slots = frames.iter().map(|f| f.frame_slot).collect::<Vec<_>>();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(slots, vec![1, 2, 0, 1]);
        assert_eq!(renderer.frame_counter().frame_id(), 5);
    }

    #[test]
    fn test_skinned_draw_references_joint_buffer() {
        let host = Arc::new(HostBackend::new());
        let mut renderer = renderer(&host);
        let mut app = Triangles::new(1);
        app.skinned = true;
        renderer.init_app(&mut app).unwrap();
        renderer.render_frame(&mut app).unwrap();

        let scene = renderer.scene();
        let rig = scene.resources.rigs.values().next().unwrap();
        let draw = &host.last_frame().unwrap().draws[0];
        assert_eq!(draw.kind, vela_gfx::backend::MaterialKind::DiffuseSA);
        assert_eq!(draw.push_constants.joint_buffer_index, rig.joint_buffer_index(1));
    }

    #[test]
    fn test_empty_scene_renders_nothing() {
        let host = Arc::new(HostBackend::new());
        let mut renderer = renderer(&host);
        let mut app = crate::outer_app::StaticScene;
        renderer.init_app(&mut app).unwrap();
        let stats = renderer.render_frame(&mut app).unwrap();
        assert_eq!(stats.draw, DrawStats::default());
        assert!(host.last_frame().unwrap().draws.is_empty());
    }
}
