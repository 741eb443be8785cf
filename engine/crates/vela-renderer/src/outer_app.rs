use vela_render_interface::render_context::RenderContext;
use vela_scene::scene::Scene;

use crate::error::RenderResult;
use crate::timer::Timer;

/// 每帧传给外部应用的信息
pub struct FrameInfo<'a> {
    pub frame_id: u64,
    pub timer: &'a Timer,
}

/// 外部应用接口
///
/// 定义应用生命周期的钩子。输入处理、游戏逻辑都在 `update` 中写入场景。
pub trait OuterApp {
    /// 加载资源、创建实体
    fn init(&mut self, ctx: &RenderContext, scene: &mut Scene) -> RenderResult<()>;

    /// 每帧更新逻辑，在变换与动画更新之前执行
    fn update(&mut self, _ctx: &RenderContext, _scene: &mut Scene, _frame: &FrameInfo) -> RenderResult<()> {
        Ok(())
    }
}

/// 不做任何事情的应用，只渲染已经加载的场景
#[derive(Debug, Default)]
pub struct StaticScene;
impl OuterApp for StaticScene {
    fn init(&mut self, _ctx: &RenderContext, _scene: &mut Scene) -> RenderResult<()> {
        Ok(())
    }
}
