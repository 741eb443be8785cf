use std::collections::HashMap;

use crate::ecs::Entity;

/// 名字到实体的查找表
///
/// 短名由人手写，长名一般是资产路径加实例后缀。重复插入保留第一次的结果并给出警告。
#[derive(Debug, Default)]
pub struct Dictionary {
    short_names: HashMap<String, Entity>,
    long_names: HashMap<String, Entity>,
}
impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入短名，名字已存在时返回 false
    pub fn insert_short(&mut self, name: impl Into<String>, entity: Entity) -> bool {
        Self::insert(&mut self.short_names, name.into(), entity, "short")
    }

    /// 插入长名，名字已存在时返回 false
    pub fn insert_long(&mut self, name: impl Into<String>, entity: Entity) -> bool {
        Self::insert(&mut self.long_names, name.into(), entity, "long")
    }

    /// 先查短名，再查长名
    pub fn retrieve(&self, name: &str) -> Option<Entity> {
        self.short_names.get(name).or_else(|| self.long_names.get(name)).copied()
    }

    pub fn retrieve_short(&self, name: &str) -> Option<Entity> {
        self.short_names.get(name).copied()
    }

    pub fn retrieve_long(&self, name: &str) -> Option<Entity> {
        self.long_names.get(name).copied()
    }

    /// 删除指向该实体的全部名字，用于撤销失败的加载
    pub fn remove_entity(&mut self, entity: Entity) {
        self.short_names.retain(|_, e| *e != entity);
        self.long_names.retain(|_, e| *e != entity);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.short_names.len() + self.long_names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.short_names.is_empty() && self.long_names.is_empty()
    }

    fn insert(map: &mut HashMap<String, Entity>, name: String, entity: Entity, kind: &str) -> bool {
        if let Some(existing) = map.get(&name) {
            log::warn!("dictionary: {kind} name '{name}' already maps to {existing:?}, keeping the first");
            return false;
        }
        map.insert(name, entity);
        true
    }
}
