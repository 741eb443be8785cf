//! 实体-组件注册表
//!
//! 实体是 slotmap 的 key（下标 + 代数），组件按类型存放在密集数组中。

mod registry;
mod storage;

pub use registry::{ComponentSet, Registry};
pub use storage::ComponentStorage;

slotmap::new_key_type! {
    /// 不透明的实体句柄
    pub struct Entity;
}

/// 可以挂在实体上的组件类型
pub trait Component: 'static + Send + Sync {}

#[cfg(test)]
mod tests;
