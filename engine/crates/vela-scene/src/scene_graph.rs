use std::collections::HashMap;
use std::fmt::Write as _;

use glam::Mat4;
use slotmap::Key;

use crate::components::Transform;
use crate::dictionary::Dictionary;
use crate::ecs::{Entity, Registry};

/// 根节点下标，总是存在
pub const ROOT_NODE: usize = 0;

#[derive(Debug, Clone)]
pub struct SceneNode {
    entity: Entity,
    name: String,
    long_name: String,
    parent: Option<usize>,
    children: Vec<usize>,
}
// getters
impl SceneNode {
    #[inline]
    pub fn entity(&self) -> Entity {
        self.entity
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn long_name(&self) -> &str {
        &self.long_name
    }

    #[inline]
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    #[inline]
    pub fn children(&self) -> &[usize] {
        &self.children
    }
}

/// 节点以下标寻址的场景树
///
/// 子节点按插入顺序追加到父节点的 children 中，父节点在插入时确定且不再修改。
#[derive(Debug)]
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
    entity_to_node: HashMap<Entity, usize>,
}
impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}
// new & init
impl SceneGraph {
    pub fn new() -> Self {
        let root = SceneNode {
            entity: Entity::null(),
            name: "root".to_string(),
            long_name: "root".to_string(),
            parent: None,
            children: Vec::new(),
        };
        Self {
            nodes: vec![root],
            entity_to_node: HashMap::new(),
        }
    }
}
// getters
impl SceneGraph {
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// 只有根节点时为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    #[inline]
    pub fn get_node(&self, index: usize) -> Option<&SceneNode> {
        self.nodes.get(index)
    }

    pub fn get_node_by_game_object(&self, entity: Entity) -> Option<&SceneNode> {
        self.entity_to_node.get(&entity).map(|&index| &self.nodes[index])
    }

    #[inline]
    pub fn node_index(&self, entity: Entity) -> Option<usize> {
        self.entity_to_node.get(&entity).copied()
    }
}
// tools
impl SceneGraph {
    /// 在 `parent` 下创建节点，并把名字写入字典
    ///
    /// `parent` 不存在时挂到根节点下并给出警告。
    pub fn create_node(
        &mut self,
        parent: usize,
        entity: Entity,
        name: &str,
        long_name: &str,
        dictionary: &mut Dictionary,
    ) -> usize {
        let parent = if parent < self.nodes.len() {
            parent
        } else {
            log::warn!("scene graph: parent node {parent} does not exist, '{name}' attached to root");
            ROOT_NODE
        };

        let index = self.nodes.len();
        self.nodes.push(SceneNode {
            entity,
            name: name.to_string(),
            long_name: long_name.to_string(),
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(index);
        if self.entity_to_node.insert(entity, index).is_some() {
            log::warn!("scene graph: entity {entity:?} is referenced by more than one node");
        }

        dictionary.insert_short(name, entity);
        dictionary.insert_long(long_name, entity);
        index
    }

    /// 丢弃 `len` 之后追加的节点，用于撤销失败的加载
    pub fn truncate(&mut self, len: usize) {
        let len = len.max(1);
        if len >= self.nodes.len() {
            return;
        }
        for node in self.nodes.drain(len..) {
            self.entity_to_node.remove(&node.entity);
        }
        for node in &mut self.nodes {
            node.children.retain(|&c| c < len);
        }
    }

    /// 深度优先的节点下标，包含 `root` 本身
    pub fn depth_first(&self, root: usize) -> Vec<usize> {
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(index) = stack.pop() {
            let Some(node) = self.nodes.get(index) else {
                continue;
            };
            order.push(index);
            stack.extend(node.children.iter().rev());
        }
        order
    }

    /// 以缩进文本输出子树，同时写入 info 日志
    pub fn traverse_info(&self, root: usize, indent: usize) -> String {
        let mut out = String::new();
        self.traverse_info_impl(root, indent, &mut out);
        for line in out.lines() {
            log::info!("{line}");
        }
        out
    }

    fn traverse_info_impl(&self, index: usize, indent: usize, out: &mut String) {
        let Some(node) = self.nodes.get(index) else {
            return;
        };
        let _ = writeln!(out, "{:indent$}{} ({})", "", node.name, node.long_name, indent = indent * 2);
        for &child in &node.children {
            self.traverse_info_impl(child, indent + 1, out);
        }
    }

    /// 深度优先的节点名序列，不含根节点
    pub fn dump_names(&self) -> Vec<String> {
        self.depth_first(ROOT_NODE).into_iter().skip(1).map(|i| self.nodes[i].name.clone()).collect()
    }

    /// 实体到节点下标的映射
    pub fn create_linear_map(&self) -> HashMap<Entity, usize> {
        self.depth_first(ROOT_NODE)
            .into_iter()
            .skip(1)
            .map(|index| (self.nodes[index].entity, index))
            .collect()
    }
}
// update
impl SceneGraph {
    /// 重新计算脏的全局矩阵
    ///
    /// 节点自身脏，或者祖先在本次更新中被重新计算时才会更新；返回更新的 Transform 数量。
    pub fn update_transforms(&self, registry: &mut Registry, frame_id: u64) -> usize {
        let _span = tracy_client::span!("SceneGraph::update_transforms");

        let mut updated = 0;
        // (node, 父节点全局矩阵, 父节点是否在本次更新)
        let mut stack: Vec<(usize, Mat4, bool)> = vec![(ROOT_NODE, Mat4::IDENTITY, false)];
        while let Some((index, parent_global, parent_changed)) = stack.pop() {
            let node = &self.nodes[index];
            let (global, changed) = match registry.get_mut::<Transform>(node.entity) {
                Some(transform) if parent_changed || transform.is_dirty() => {
                    transform.set_global(parent_global, frame_id);
                    updated += 1;
                    (transform.global_matrix(), true)
                }
                Some(transform) => (transform.global_matrix(), false),
                None => (parent_global, parent_changed),
            };
            for &child in node.children.iter().rev() {
                stack.push((child, global, changed));
            }
        }
        updated
    }
}
