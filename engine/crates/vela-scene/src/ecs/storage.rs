use std::any::Any;

use slotmap::SecondaryMap;

use crate::ecs::{Component, Entity};

/// 单个组件类型的密集存储
///
/// `dense` 与 `entities` 一一对应，`sparse` 记录实体在密集数组中的位置；删除使用 swap_remove。
pub struct ComponentStorage<T> {
    dense: Vec<T>,
    entities: Vec<Entity>,
    sparse: SecondaryMap<Entity, usize>,
}
impl<T> Default for ComponentStorage<T> {
    fn default() -> Self {
        Self {
            dense: Vec::new(),
            entities: Vec::new(),
            sparse: SecondaryMap::new(),
        }
    }
}
impl<T: Component> ComponentStorage<T> {
    /// 插入组件，返回被替换的旧值
    pub fn insert(&mut self, entity: Entity, value: T) -> Option<T> {
        if let Some(&slot) = self.sparse.get(entity) {
            return Some(std::mem::replace(&mut self.dense[slot], value));
        }
        self.sparse.insert(entity, self.dense.len());
        self.dense.push(value);
        self.entities.push(entity);
        None
    }

    pub fn remove(&mut self, entity: Entity) -> Option<T> {
        let slot = self.sparse.remove(entity)?;
        let value = self.dense.swap_remove(slot);
        self.entities.swap_remove(slot);
        if let Some(&moved) = self.entities.get(slot) {
            self.sparse.insert(moved, slot);
        }
        Some(value)
    }

    #[inline]
    pub fn get(&self, entity: Entity) -> Option<&T> {
        self.sparse.get(entity).map(|&slot| &self.dense[slot])
    }

    #[inline]
    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        self.sparse.get(entity).map(|&slot| &mut self.dense[slot])
    }

    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        self.sparse.contains_key(entity)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> {
        self.entities.iter().copied().zip(self.dense.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, &mut T)> {
        self.entities.iter().copied().zip(self.dense.iter_mut())
    }
}

/// 类型擦除后的存储，用于销毁实体时移除其全部组件
pub(crate) trait ErasedStorage: Send + Sync {
    fn remove_entity(&mut self, entity: Entity);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
impl<T: Component> ErasedStorage for ComponentStorage<T> {
    fn remove_entity(&mut self, entity: Entity) {
        self.remove(entity);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
