use std::time::{Duration, Instant};

/// 帧计时
///
/// 设置了固定步长时，`delta_time_s` 总是返回该步长，用于离线运行和测试。
#[derive(Debug)]
pub struct Timer {
    last_tick: Instant,

    delta_time: Duration,
    total_time: Duration,
    fixed_step: Option<Duration>,
}

impl Default for Timer {
    fn default() -> Self {
        Self {
            last_tick: Instant::now(),
            delta_time: Duration::ZERO,
            total_time: Duration::ZERO,
            fixed_step: None,
        }
    }
}

impl Timer {
    pub fn with_fixed_step(step: Duration) -> Self {
        Self {
            fixed_step: Some(step),
            ..Default::default()
        }
    }

    /// 每帧开始的时候调用
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta_time = self.fixed_step.unwrap_or_else(|| now.duration_since(self.last_tick));
        self.last_tick = now;
        self.total_time += self.delta_time;
    }

    #[inline]
    pub fn delta_time(&self) -> Duration {
        self.delta_time
    }

    /// 上一帧的时间（毫秒）
    #[inline]
    pub fn delta_time_ms(&self) -> f32 {
        self.delta_time.as_secs_f32() * 1000.0
    }

    /// 上一帧的时间（秒）
    #[inline]
    pub fn delta_time_s(&self) -> f32 {
        self.delta_time.as_secs_f32()
    }

    /// 当前帧率，第一帧之前为 0
    #[inline]
    pub fn fps(&self) -> f32 {
        let dt = self.delta_time.as_secs_f32();
        if dt > 0.0 { 1.0 / dt } else { 0.0 }
    }

    /// 总运行时间
    #[inline]
    pub fn total_time_s(&self) -> f32 {
        self.total_time.as_secs_f32()
    }
}
