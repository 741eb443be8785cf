use std::any::TypeId;
use std::collections::HashMap;

use slotmap::SlotMap;

use crate::ecs::storage::{ComponentStorage, ErasedStorage};
use crate::ecs::{Component, Entity};

/// 实体注册表
///
/// 每个实体上每种组件最多一个；销毁实体会移除其全部组件。
#[derive(Default)]
pub struct Registry {
    entities: SlotMap<Entity, ()>,
    storages: HashMap<TypeId, Box<dyn ErasedStorage>>,
}
// new & init
impl Registry {
    pub fn new() -> Self {
        Self::default()
    }
}
// entity
impl Registry {
    pub fn create(&mut self) -> Entity {
        self.entities.insert(())
    }

    /// 销毁实体及其全部组件，实体无效时返回 false
    pub fn destroy(&mut self, entity: Entity) -> bool {
        if self.entities.remove(entity).is_none() {
            return false;
        }
        for storage in self.storages.values_mut() {
            storage.remove_entity(entity);
        }
        true
    }

    #[inline]
    pub fn valid(&self, entity: Entity) -> bool {
        self.entities.contains_key(entity)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.keys()
    }
}
// component
impl Registry {
    /// 为实体添加组件，已存在同类型组件时会替换并给出警告
    ///
    /// # Panics
    /// 实体无效时 panic，这是调用方的逻辑错误。
    pub fn emplace<T: Component>(&mut self, entity: Entity, value: T) {
        assert!(self.valid(entity), "emplace on an invalid entity: {entity:?}");
        if self.storage_mut_or_insert::<T>().insert(entity, value).is_some() {
            log::warn!("entity {entity:?} already has a {}, replaced", std::any::type_name::<T>());
        }
    }

    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.storage::<T>()?.get(entity)
    }

    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        self.storage_mut::<T>()?.get_mut(entity)
    }

    pub fn remove<T: Component>(&mut self, entity: Entity) -> Option<T> {
        self.storage_mut::<T>()?.remove(entity)
    }

    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.storage::<T>().is_some_and(|s| s.contains(entity))
    }

    /// 实体是否同时拥有 `S` 中的全部组件
    pub fn all_of<S: ComponentSet>(&self, entity: Entity) -> bool {
        self.valid(entity) && S::contains_all(self, entity)
    }

    /// 拥有 `S` 中全部组件的实体，按第一个组件的存储顺序
    pub fn view<S: ComponentSet>(&self) -> Vec<Entity> {
        S::candidates(self).iter().copied().filter(|&e| S::contains_all(self, e)).collect()
    }

    pub fn storage<T: Component>(&self) -> Option<&ComponentStorage<T>> {
        self.storages.get(&TypeId::of::<T>())?.as_any().downcast_ref::<ComponentStorage<T>>()
    }

    pub fn storage_mut<T: Component>(&mut self) -> Option<&mut ComponentStorage<T>> {
        self.storages.get_mut(&TypeId::of::<T>())?.as_any_mut().downcast_mut::<ComponentStorage<T>>()
    }

    /// 遍历某一类组件
    pub fn iter<T: Component>(&self) -> impl Iterator<Item = (Entity, &T)> {
        self.storage::<T>().into_iter().flat_map(|s| s.iter())
    }

    fn storage_mut_or_insert<T: Component>(&mut self) -> &mut ComponentStorage<T> {
        self.storages
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(ComponentStorage::<T>::default()))
            .as_any_mut()
            .downcast_mut::<ComponentStorage<T>>()
            .unwrap_or_else(|| unreachable!("storage keyed by TypeId"))
    }
}

/// 组件类型的元组，用于 `all_of` 与 `view`
pub trait ComponentSet {
    fn contains_all(registry: &Registry, entity: Entity) -> bool;

    /// 候选实体：第一个组件类型的实体列表
    fn candidates(registry: &Registry) -> &[Entity];
}

macro_rules! impl_component_set {
    ($first:ident $(, $rest:ident)*) => {
        impl<$first: Component $(, $rest: Component)*> ComponentSet for ($first, $($rest,)*) {
            fn contains_all(registry: &Registry, entity: Entity) -> bool {
                registry.has::<$first>(entity) $(&& registry.has::<$rest>(entity))*
            }

            fn candidates(registry: &Registry) -> &[Entity] {
                registry.storage::<$first>().map(|s| s.entities()).unwrap_or(&[])
            }
        }
    };
}
impl_component_set!(A);
impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);
