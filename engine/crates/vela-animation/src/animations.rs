use indexmap::IndexMap;

use crate::animation::SkeletalAnimation;
use crate::skeleton::Skeleton;

/// 一个骨骼拥有的全部动画
///
/// 按插入顺序保存，可以通过名字或下标访问；同一时刻最多一个激活的动画。
#[derive(Debug, Clone, Default)]
pub struct Animations {
    animations: IndexMap<String, SkeletalAnimation>,
    active: Option<usize>,

    /// 上一次执行更新的帧号
    last_frame_id: Option<u64>,
}
// new & init
impl Animations {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加动画，返回下标；重名时追加数字后缀
    pub fn push(&mut self, animation: SkeletalAnimation) -> usize {
        let mut name = animation.name().to_string();
        if self.animations.contains_key(&name) {
            let mut suffix = 1;
            while self.animations.contains_key(&format!("{name}_{suffix}")) {
                suffix += 1;
            }
            let unique = format!("{name}_{suffix}");
            log::warn!("duplicate animation name `{}`, stored as `{}`", name, unique);
            name = unique;
        }
        self.animations.insert_full(name, animation).0
    }
}
// getters
impl Animations {
    #[inline]
    pub fn len(&self) -> usize {
        self.animations.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.animations.is_empty()
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&SkeletalAnimation> {
        self.animations.get(name)
    }

    #[inline]
    pub fn get_mut(&mut self, name: &str) -> Option<&mut SkeletalAnimation> {
        self.animations.get_mut(name)
    }

    #[inline]
    pub fn get_index(&self, index: usize) -> Option<&SkeletalAnimation> {
        self.animations.get_index(index).map(|(_, a)| a)
    }

    #[inline]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.animations.get_index_of(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.animations.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SkeletalAnimation> {
        self.animations.values()
    }

    #[inline]
    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn active(&self) -> Option<&SkeletalAnimation> {
        self.active.and_then(|i| self.get_index(i))
    }

    #[inline]
    pub fn last_frame_id(&self) -> Option<u64> {
        self.last_frame_id
    }
}
// lifecycle
impl Animations {
    /// 激活并从头播放某个动画，之前激活的动画被停止
    pub fn start_index(&mut self, index: usize, repeat: bool) -> bool {
        if index >= self.animations.len() {
            log::warn!("animation index {} out of range ({} animations)", index, self.animations.len());
            return false;
        }
        self.stop();
        if let Some((_, animation)) = self.animations.get_index_mut(index) {
            animation.set_repeat(repeat);
            animation.start();
        }
        self.active = Some(index);
        true
    }

    pub fn start(&mut self, name: &str, repeat: bool) -> bool {
        match self.index_of(name) {
            Some(index) => self.start_index(index, repeat),
            None => {
                log::warn!("animation `{}` not found", name);
                false
            }
        }
    }

    pub fn stop(&mut self) {
        if let Some((_, animation)) = self.active.take().and_then(|i| self.animations.get_index_mut(i)) {
            animation.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.active().is_some_and(SkeletalAnimation::is_running)
    }

    pub fn will_expire(&self, step: f32) -> bool {
        self.active().is_some_and(|a| a.will_expire(step))
    }
}
// update
impl Animations {
    /// 推进激活的动画并重新计算骨骼矩阵
    ///
    /// 同一帧号内只执行一次，返回是否执行了更新。
    pub fn update(&mut self, step: f32, skeleton: &mut Skeleton, frame_id: u64) -> bool {
        if self.last_frame_id == Some(frame_id) {
            return false;
        }
        self.last_frame_id = Some(frame_id);

        let _span = tracy_client::span!("Animations::update");
        if let Some((_, animation)) = self.active.and_then(|i| self.animations.get_index_mut(i)) {
            animation.update(step, skeleton);
        }
        skeleton.update();
        true
    }
}
