use crate::animations::Animations;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterState {
    Idle,
    Walk,
    Run,
    Jumping,
}

/// 每帧的角色输入
#[derive(Debug, Clone, Copy, Default)]
pub struct CharacterInput {
    /// 移动轴的大小，0..=1
    pub axis: f32,
    /// 本帧是否触发跳跃
    pub jump: bool,
}

/// 各状态对应的动画名
#[derive(Debug, Clone)]
pub struct CharacterAnimationNames {
    pub idle: String,
    pub walk: String,
    pub run: String,
    pub jump: String,
}
impl Default for CharacterAnimationNames {
    fn default() -> Self {
        Self {
            idle: "idle".to_string(),
            walk: "walk".to_string(),
            run: "run".to_string(),
            jump: "jump".to_string(),
        }
    }
}

/// 角色动画状态机
///
/// - 移动轴决定 Idle / Walk / Run
/// - 跳跃进入 Jumping，跳跃动画播完后回到 Idle；Jumping 期间移动轴不会打断它
pub struct CharacterAnimation {
    state: CharacterState,
    names: CharacterAnimationNames,

    walk_threshold: f32,
    run_threshold: f32,
}
// new & init
impl CharacterAnimation {
    pub fn new(names: CharacterAnimationNames) -> Self {
        Self {
            state: CharacterState::Idle,
            names,
            walk_threshold: 0.1,
            run_threshold: 0.6,
        }
    }

    pub fn with_thresholds(mut self, walk: f32, run: f32) -> Self {
        self.walk_threshold = walk;
        self.run_threshold = run.max(walk);
        self
    }

    /// 进入初始状态，开始播放 idle 动画
    pub fn start(&mut self, animations: &mut Animations) {
        self.state = CharacterState::Idle;
        animations.start(&self.names.idle, true);
    }
}
// getters
impl CharacterAnimation {
    #[inline]
    pub fn state(&self) -> CharacterState {
        self.state
    }
}
// update
impl CharacterAnimation {
    /// 根据输入切换状态，`step` 为本帧将要推进的时间
    ///
    /// 需要在 `Animations::update` 之前调用。
    pub fn update(&mut self, input: CharacterInput, step: f32, animations: &mut Animations) {
        let next = match self.state {
            CharacterState::Jumping => {
                if animations.will_expire(step) || !animations.is_running() {
                    CharacterState::Idle
                } else {
                    CharacterState::Jumping
                }
            }
            _ if input.jump => CharacterState::Jumping,
            _ => self.locomotion_state(input.axis),
        };

        if next != self.state {
            log::debug!("character animation {:?} -> {:?}", self.state, next);
            self.state = next;
            let (name, repeat) = match next {
                CharacterState::Idle => (&self.names.idle, true),
                CharacterState::Walk => (&self.names.walk, true),
                CharacterState::Run => (&self.names.run, true),
                CharacterState::Jumping => (&self.names.jump, false),
            };
            animations.start(name, repeat);
        }
    }

    fn locomotion_state(&self, axis: f32) -> CharacterState {
        let axis = axis.abs();
        if axis >= self.run_threshold {
            CharacterState::Run
        } else if axis >= self.walk_threshold {
            CharacterState::Walk
        } else {
            CharacterState::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::tests::rotation_animation;
    use crate::skeleton::tests::two_joint_skeleton;

    fn animations() -> Animations {
        let mut animations = Animations::new();
        for name in ["idle", "walk", "run", "jump"] {
            animations.push(rotation_animation(name));
        }
        animations
    }

    #[test]
    fn test_locomotion() {
        let mut animations = animations();
        let mut character = CharacterAnimation::new(CharacterAnimationNames::default());
        character.start(&mut animations);
        assert_eq!(character.state(), CharacterState::Idle);

        character.update(CharacterInput { axis: 0.3, jump: false }, 0.016, &mut animations);
        assert_eq!(character.state(), CharacterState::Walk);
        assert_eq!(animations.active().map(|a| a.name()), Some("walk"));

        character.update(CharacterInput { axis: -0.9, jump: false }, 0.016, &mut animations);
        assert_eq!(character.state(), CharacterState::Run);

        character.update(CharacterInput::default(), 0.016, &mut animations);
        assert_eq!(character.state(), CharacterState::Idle);
    }

    #[test]
    fn test_jump_is_not_cancelled_by_axis() {
        let mut skeleton = two_joint_skeleton();
        let mut animations = animations();
        let mut character = CharacterAnimation::new(CharacterAnimationNames::default());
        character.start(&mut animations);

        character.update(CharacterInput { axis: 0.0, jump: true }, 0.25, &mut animations);
        assert_eq!(character.state(), CharacterState::Jumping);
        animations.update(0.25, &mut skeleton, 1);

        // 移动轴不打断跳跃
        character.update(CharacterInput { axis: 1.0, jump: false }, 0.25, &mut animations);
        assert_eq!(character.state(), CharacterState::Jumping);
        animations.update(0.25, &mut skeleton, 2);

        // 跳跃动画时长为 1 秒，下一次推进之后结束
        character.update(CharacterInput { axis: 1.0, jump: false }, 0.5, &mut animations);
        assert_eq!(character.state(), CharacterState::Idle);
        assert_eq!(animations.active().map(|a| a.name()), Some("idle"));
    }
}
