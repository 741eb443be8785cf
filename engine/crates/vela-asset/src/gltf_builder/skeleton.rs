//! skin 0 -> [`Skeleton`]
//!
//! 关节按深度优先重新排序，保证父关节下标总是小于子关节。

use std::collections::{HashMap, HashSet};

use glam::{Quat, Vec3};
use vela_animation::skeleton::{Joint, Skeleton};

use super::accessor;
use crate::error::{AssetError, AssetResult};

pub(crate) struct LoadedSkeleton {
    pub skeleton: Skeleton,
    /// skin.joints 中的下标 -> 重排后的关节下标，用于转换 JOINTS_0
    pub skin_to_joint: Vec<u32>,
}

pub(crate) fn load_skeleton(
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
) -> AssetResult<Option<LoadedSkeleton>> {
    let Some(skin) = document.skins().next() else {
        return Ok(None);
    };
    let _span = tracy_client::span!("gltf::load_skeleton");
    if document.skins().len() > 1 {
        log::warn!("{} skins found, only skin 0 is used", document.skins().len());
    }

    let skin_joints = skin.joints().collect::<Vec<_>>();
    if skin_joints.is_empty() {
        return Err(AssetError::semantic("skin 0 has no joints"));
    }

    let accessor = skin
        .inverse_bind_matrices()
        .ok_or_else(|| AssetError::semantic("skin 0 has no inverse bind matrices"))?;
    let inverse_bind_matrices = accessor::read_mat4(&accessor, buffers)?;
    if inverse_bind_matrices.len() != skin_joints.len() {
        return Err(AssetError::semantic(format!(
            "skin 0 has {} joints but {} inverse bind matrices",
            skin_joints.len(),
            inverse_bind_matrices.len()
        )));
    }

    // 节点下标 -> skin 中的下标
    let node_to_skin: HashMap<usize, usize> = skin_joints.iter().enumerate().map(|(i, n)| (n.index(), i)).collect();
    let joint_nodes: HashSet<usize> = node_to_skin.keys().copied().collect();

    // 找到每个关节在关节集合内的父节点
    let mut parent_of: HashMap<usize, usize> = HashMap::new();
    for node in document.nodes().filter(|n| joint_nodes.contains(&n.index())) {
        for child in node.children().filter(|c| joint_nodes.contains(&c.index())) {
            parent_of.insert(child.index(), node.index());
        }
    }

    // 从 skin.joints[0] 所在的根开始深度优先，其余没有访问到的根依次追加
    let mut order: Vec<usize> = Vec::with_capacity(skin_joints.len());
    let mut visited: HashSet<usize> = HashSet::new();
    let root_of = |mut node: usize| {
        while let Some(&parent) = parent_of.get(&node) {
            node = parent;
        }
        node
    };
    let roots = std::iter::once(root_of(skin_joints[0].index()))
        .chain(skin_joints.iter().map(|n| n.index()).filter(|n| !parent_of.contains_key(n)));
    for root in roots {
        visit(document, root, &joint_nodes, &mut visited, &mut order);
    }

    let node_to_joint: HashMap<usize, usize> = order.iter().enumerate().map(|(joint, &node)| (node, joint)).collect();
    let nodes = document.nodes().collect::<Vec<_>>();

    let mut joints = Vec::with_capacity(order.len());
    for &node_index in &order {
        let node = &nodes[node_index];
        let (t, r, s) = node.transform().decomposed();
        let mut joint = Joint::new(
            node.name().map_or_else(|| format!("joint-{node_index}"), str::to_string),
            inverse_bind_matrices[node_to_skin[&node_index]],
            Vec3::from(t),
            Quat::from_array(r).normalize(),
            Vec3::from(s),
        );
        joint.parent = parent_of.get(&node_index).map(|p| node_to_joint[p]);
        joint.children = node
            .children()
            .filter_map(|c| node_to_joint.get(&c.index()).copied())
            .collect();
        joints.push(joint);
    }

    let skin_to_joint = skin_joints.iter().map(|n| node_to_joint[&n.index()] as u32).collect();
    let name = skin.name().map_or_else(|| "skeleton".to_string(), str::to_string);
    let skeleton = Skeleton::new(name, joints, node_to_joint);
    log::info!("skeleton `{}` with {} joints", skeleton.name(), skeleton.joint_count());

    Ok(Some(LoadedSkeleton {
        skeleton,
        skin_to_joint,
    }))
}

fn visit(
    document: &gltf::Document,
    node_index: usize,
    joint_nodes: &HashSet<usize>,
    visited: &mut HashSet<usize>,
    order: &mut Vec<usize>,
) {
    if !joint_nodes.contains(&node_index) || !visited.insert(node_index) {
        return;
    }
    order.push(node_index);
    let Some(node) = document.nodes().nth(node_index) else {
        return;
    };
    for child in node.children() {
        visit(document, child.index(), joint_nodes, visited, order);
    }
}
