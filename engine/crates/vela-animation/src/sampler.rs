use glam::{Quat, Vec4};

use crate::AnimationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Linear,
    Step,
    CubicSpline,
}

/// 通道作用的属性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Path {
    Translation,
    Rotation,
    Scale,
}

/// 一组关键帧
///
/// 输出统一存为 `Vec4`：平移与缩放使用 xyz，旋转四元数按 x,y,z,w 存放。
/// CUBICSPLINE 每个时间戳对应三个输出（入切线、值、出切线）。
#[derive(Debug, Clone)]
pub struct Sampler {
    timestamps: Vec<f32>,
    outputs: Vec<Vec4>,
    interpolation: Interpolation,
}
// new & init
impl Sampler {
    pub fn new(timestamps: Vec<f32>, outputs: Vec<Vec4>, interpolation: Interpolation) -> Result<Self, AnimationError> {
        if !timestamps.windows(2).all(|w| w[0] < w[1]) {
            return Err(AnimationError::InvalidSampler("timestamps are not strictly ascending".to_string()));
        }
        let per_key = match interpolation {
            Interpolation::CubicSpline => 3,
            Interpolation::Linear | Interpolation::Step => 1,
        };
        if outputs.len() != timestamps.len() * per_key {
            return Err(AnimationError::InvalidSampler(format!(
                "{} outputs for {} timestamps with {:?} interpolation",
                outputs.len(),
                timestamps.len(),
                interpolation
            )));
        }
        Ok(Self {
            timestamps,
            outputs,
            interpolation,
        })
    }
}
// getters
impl Sampler {
    #[inline]
    pub fn timestamps(&self) -> &[f32] {
        &self.timestamps
    }

    #[inline]
    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    #[inline]
    pub fn first_time(&self) -> Option<f32> {
        self.timestamps.first().copied()
    }

    #[inline]
    pub fn last_time(&self) -> Option<f32> {
        self.timestamps.last().copied()
    }

    /// 第 k 个关键帧的值
    #[inline]
    pub fn value(&self, k: usize) -> Vec4 {
        match self.interpolation {
            Interpolation::CubicSpline => self.outputs[3 * k + 1],
            Interpolation::Linear | Interpolation::Step => self.outputs[k],
        }
    }
}
// tools
impl Sampler {
    /// 在时间 `t` 处采样；空的 sampler 返回 `None`
    ///
    /// 恰好落在关键帧上时返回该关键帧的原始输出；超出范围时夹取到首尾关键帧。
    pub fn sample(&self, t: f32, path: Path) -> Option<Vec4> {
        let last = self.timestamps.len().checked_sub(1)?;
        if last == 0 || t <= self.timestamps[0] {
            return Some(self.value(0));
        }
        if t >= self.timestamps[last] {
            return Some(self.value(last));
        }

        // t_k <= t < t_{k+1}
        let k = self.timestamps.partition_point(|&ts| ts <= t) - 1;
        let t0 = self.timestamps[k];
        let t1 = self.timestamps[k + 1];
        if t == t0 {
            return Some(self.value(k));
        }
        let dt = t1 - t0;
        let a = (t - t0) / dt;

        let result = match self.interpolation {
            Interpolation::Step => self.value(k),
            Interpolation::Linear => match path {
                Path::Rotation => {
                    let q0 = Quat::from_vec4(self.value(k));
                    let q1 = Quat::from_vec4(self.value(k + 1));
                    Vec4::from(q0.slerp(q1, a).normalize())
                }
                Path::Translation | Path::Scale => self.value(k).lerp(self.value(k + 1), a),
            },
            Interpolation::CubicSpline => {
                let p0 = self.outputs[3 * k + 1];
                let m0 = self.outputs[3 * k + 2] * dt;
                let p1 = self.outputs[3 * (k + 1) + 1];
                let m1 = self.outputs[3 * (k + 1)] * dt;
                let value = hermite(p0, m0, p1, m1, a);
                match path {
                    Path::Rotation => Vec4::from(Quat::from_vec4(value).normalize()),
                    Path::Translation | Path::Scale => value,
                }
            }
        };
        Some(result)
    }
}

/// 三次 Hermite 基函数
fn hermite(p0: Vec4, m0: Vec4, p1: Vec4, m1: Vec4, t: f32) -> Vec4 {
    let t2 = t * t;
    let t3 = t2 * t;
    p0 * (2.0 * t3 - 3.0 * t2 + 1.0) + m0 * (t3 - 2.0 * t2 + t) + p1 * (-2.0 * t3 + 3.0 * t2) + m1 * (t3 - t2)
}
