//! 骨骼动画
//!
//! 数据都是普通的记录：[`sampler::Sampler`] 保存关键帧，[`animation::Channel`] 指向关节与 sampler，
//! 更新逻辑对 `Path` 和 `Interpolation` 做模式匹配。

pub mod animation;
pub mod animations;
pub mod character_animation;
pub mod sampler;
pub mod skeleton;

#[derive(Debug, thiserror::Error)]
pub enum AnimationError {
    #[error("sampler: {0}")]
    InvalidSampler(String),

    #[error("channel targets joint {joint}, skeleton has {joint_count} joints")]
    UnknownJoint { joint: usize, joint_count: usize },
}
