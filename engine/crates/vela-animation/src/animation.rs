use glam::Quat;

use crate::AnimationError;
use crate::sampler::{Path, Sampler};
use crate::skeleton::Skeleton;

/// 关节 + 属性 + sampler 的组合
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    pub target_joint: usize,
    pub path: Path,
    pub sampler_index: usize,
}

/// 一段骨骼动画
///
/// 时间由 `start()` 之后累积的 step 推进，与墙钟无关。
#[derive(Debug, Clone)]
pub struct SkeletalAnimation {
    name: String,
    samplers: Vec<Sampler>,
    channels: Vec<Channel>,

    first_keyframe_time: f32,
    last_keyframe_time: f32,

    repeat: bool,
    running: bool,
    current_time: f32,
}
// new & init
impl SkeletalAnimation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            samplers: Vec::new(),
            channels: Vec::new(),
            first_keyframe_time: 0.0,
            last_keyframe_time: 0.0,
            repeat: false,
            running: false,
            current_time: 0.0,
        }
    }

    /// 添加 sampler 并扩展首尾关键帧时间，返回 sampler 索引
    pub fn add_sampler(&mut self, sampler: Sampler) -> usize {
        if let (Some(first), Some(last)) = (sampler.first_time(), sampler.last_time()) {
            if self.samplers.iter().all(Sampler::is_empty) {
                self.first_keyframe_time = first;
                self.last_keyframe_time = last;
            } else {
                self.first_keyframe_time = self.first_keyframe_time.min(first);
                self.last_keyframe_time = self.last_keyframe_time.max(last);
            }
        }
        self.samplers.push(sampler);
        self.samplers.len() - 1
    }

    pub fn add_channel(&mut self, channel: Channel) -> Result<(), AnimationError> {
        if channel.sampler_index >= self.samplers.len() {
            return Err(AnimationError::InvalidSampler(format!(
                "channel references sampler {} of {}",
                channel.sampler_index,
                self.samplers.len()
            )));
        }
        self.channels.push(channel);
        Ok(())
    }
}
// getters
impl SkeletalAnimation {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    #[inline]
    pub fn samplers(&self) -> &[Sampler] {
        &self.samplers
    }

    #[inline]
    pub fn first_keyframe_time(&self) -> f32 {
        self.first_keyframe_time
    }

    #[inline]
    pub fn last_keyframe_time(&self) -> f32 {
        self.last_keyframe_time
    }

    #[inline]
    pub fn duration(&self) -> f32 {
        self.last_keyframe_time - self.first_keyframe_time
    }

    #[inline]
    pub fn current_time(&self) -> f32 {
        self.current_time
    }

    #[inline]
    pub fn repeat(&self) -> bool {
        self.repeat
    }

    #[inline]
    pub fn set_repeat(&mut self, repeat: bool) {
        self.repeat = repeat;
    }
}
// lifecycle
impl SkeletalAnimation {
    pub fn start(&mut self) {
        self.current_time = self.first_keyframe_time;
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.current_time = self.first_keyframe_time;
    }

    pub fn is_running(&self) -> bool {
        self.running && (self.repeat || self.current_time - self.first_keyframe_time < self.duration())
    }

    /// 再推进 `step` 之后动画是否结束
    pub fn will_expire(&self, step: f32) -> bool {
        !self.repeat && self.running && self.current_time + step - self.first_keyframe_time >= self.duration()
    }
}
// update
impl SkeletalAnimation {
    /// 推进 `step` 秒并将采样结果写入骨骼的 deformed T/R/S
    ///
    /// 动画结束（非循环）时骨骼恢复到绑定姿势。
    pub fn update(&mut self, step: f32, skeleton: &mut Skeleton) {
        if !self.running {
            return;
        }

        self.current_time += step;
        let elapsed = self.current_time - self.first_keyframe_time;
        let duration = self.duration();
        if elapsed >= duration {
            if self.repeat && duration > 0.0 {
                self.current_time = self.first_keyframe_time + elapsed % duration;
            } else if self.repeat {
                // 单个关键帧的循环动画保持该姿势
                self.current_time = self.first_keyframe_time;
            } else {
                self.running = false;
                skeleton.reset_to_bind_pose();
                return;
            }
        }

        if let Err(e) = self.apply(self.current_time, skeleton) {
            log::warn!("animation `{}`: {}, falling back to bind pose", self.name, e);
            skeleton.reset_to_bind_pose();
        }
    }

    fn apply(&self, time: f32, skeleton: &mut Skeleton) -> Result<(), AnimationError> {
        let joint_count = skeleton.joint_count();
        for channel in &self.channels {
            let sampler = self.samplers.get(channel.sampler_index).ok_or_else(|| {
                AnimationError::InvalidSampler(format!("missing sampler {}", channel.sampler_index))
            })?;
            let joint = skeleton.joints_mut().get_mut(channel.target_joint).ok_or(AnimationError::UnknownJoint {
                joint: channel.target_joint,
                joint_count,
            })?;

            // 空的 sampler 不做任何事
            let Some(value) = sampler.sample(time, channel.path) else {
                continue;
            };
            match channel.path {
                Path::Translation => joint.deformed_translation = value.truncate(),
                Path::Rotation => joint.deformed_rotation = Quat::from_vec4(value),
                Path::Scale => joint.deformed_scale = value.truncate(),
            }
        }
        Ok(())
    }
}
