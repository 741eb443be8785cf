//! glTF animation -> [`SkeletalAnimation`]

use std::collections::HashMap;

use glam::Vec4;
use gltf::animation::{Interpolation as GltfInterpolation, Property};
use vela_animation::animation::{Channel, SkeletalAnimation};
use vela_animation::animations::Animations;
use vela_animation::sampler::{Interpolation, Path, Sampler};
use vela_animation::skeleton::Skeleton;

use super::accessor;
use crate::error::AssetResult;

fn read_sampler(sampler: &gltf::animation::Sampler, buffers: &[gltf::buffer::Data]) -> AssetResult<Option<Sampler>> {
    let (timestamps, _) = accessor::read_floats(&sampler.input(), buffers)?;
    let (outputs, components) = accessor::read_floats(&sampler.output(), buffers)?;

    let outputs = match components {
        3 => outputs.chunks_exact(3).map(|c| Vec4::new(c[0], c[1], c[2], 0.0)).collect(),
        4 => outputs.chunks_exact(4).map(Vec4::from_slice).collect(),
        n => {
            log::warn!("animation sampler output has {n} components, ignored");
            return Ok(None);
        }
    };
    let interpolation = match sampler.interpolation() {
        GltfInterpolation::Linear => Interpolation::Linear,
        GltfInterpolation::Step => Interpolation::Step,
        GltfInterpolation::CubicSpline => Interpolation::CubicSpline,
    };

    match Sampler::new(timestamps, outputs, interpolation) {
        Ok(sampler) => Ok(Some(sampler)),
        Err(e) => {
            log::warn!("invalid animation sampler dropped: {e}");
            Ok(None)
        }
    }
}

/// 读取全部动画
///
/// 指向非关节节点的 channel、morph target 权重 channel 以及非法的 sampler 会被丢弃并给出警告。
pub(crate) fn load_animations(
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
    skeleton: &Skeleton,
) -> AssetResult<Animations> {
    let _span = tracy_client::span!("gltf::load_animations");
    let mut animations = Animations::new();

    for gltf_animation in document.animations() {
        let name = gltf_animation
            .name()
            .map_or_else(|| format!("animation-{}", gltf_animation.index()), str::to_string);
        let mut animation = SkeletalAnimation::new(&name);
        // glTF sampler 下标 -> 本动画中的 sampler 下标
        let mut sampler_map: HashMap<usize, Option<usize>> = HashMap::new();

        for channel in gltf_animation.channels() {
            let target = channel.target();
            let node = target.node().index();
            let Some(joint) = skeleton.joint_index_by_node(node) else {
                log::warn!("animation `{name}`: channel targets node {node} which is not a joint, dropped");
                continue;
            };
            let path = match target.property() {
                Property::Translation => Path::Translation,
                Property::Rotation => Path::Rotation,
                Property::Scale => Path::Scale,
                Property::MorphTargetWeights => {
                    log::debug!("animation `{name}`: morph target weights are not supported");
                    continue;
                }
            };

            let gltf_sampler = channel.sampler();
            let sampler_index = match sampler_map.get(&gltf_sampler.index()) {
                Some(index) => *index,
                None => {
                    let index = read_sampler(&gltf_sampler, buffers)?.map(|s| animation.add_sampler(s));
                    sampler_map.insert(gltf_sampler.index(), index);
                    index
                }
            };
            let Some(sampler_index) = sampler_index else {
                continue;
            };

            if let Err(e) = animation.add_channel(Channel {
                target_joint: joint,
                path,
                sampler_index,
            }) {
                log::warn!("animation `{name}`: {e}");
            }
        }

        if animation.channels().is_empty() {
            log::warn!("animation `{name}` has no usable channels, skipped");
            continue;
        }
        log::info!(
            "animation `{name}`: {} channels, {:.3}s..{:.3}s",
            animation.channels().len(),
            animation.first_keyframe_time(),
            animation.last_keyframe_time()
        );
        animations.push(animation);
    }
    Ok(animations)
}
