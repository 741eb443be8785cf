use crate::ecs::{Component, Registry};

#[derive(Debug, PartialEq)]
struct Position(f32);
impl Component for Position {}

#[derive(Debug, PartialEq)]
struct Velocity(f32);
impl Component for Velocity {}

#[test]
fn test_emplace_get_remove() {
    let mut registry = Registry::new();
    let e = registry.create();
    registry.emplace(e, Position(1.0));
    assert_eq!(registry.get::<Position>(e), Some(&Position(1.0)));

    // 重复 emplace 会替换
    registry.emplace(e, Position(2.0));
    assert_eq!(registry.get::<Position>(e), Some(&Position(2.0)));
    assert_eq!(registry.storage::<Position>().map(|s| s.len()), Some(1));

    assert_eq!(registry.remove::<Position>(e), Some(Position(2.0)));
    assert!(!registry.has::<Position>(e));
}

#[test]
fn test_view_and_all_of() {
    let mut registry = Registry::new();
    let a = registry.create();
    let b = registry.create();
    let c = registry.create();
    registry.emplace(a, Position(0.0));
    registry.emplace(a, Velocity(1.0));
    registry.emplace(b, Position(0.0));
    registry.emplace(c, Velocity(1.0));

    assert!(registry.all_of::<(Position, Velocity)>(a));
    assert!(!registry.all_of::<(Position, Velocity)>(b));
    assert_eq!(registry.view::<(Position, Velocity)>(), vec![a]);
    assert_eq!(registry.view::<(Position,)>(), vec![a, b]);
}

#[test]
fn test_destroy_removes_components_and_invalidates() {
    let mut registry = Registry::new();
    let a = registry.create();
    let b = registry.create();
    registry.emplace(a, Position(1.0));
    registry.emplace(b, Position(2.0));

    assert!(registry.destroy(a));
    assert!(!registry.valid(a));
    assert!(!registry.destroy(a));
    assert_eq!(registry.get::<Position>(a), None);
    // swap_remove 之后 b 仍然能找到
    assert_eq!(registry.get::<Position>(b), Some(&Position(2.0)));

    // 重用的槽位代数不同，旧句柄不会命中新实体
    let c = registry.create();
    assert_ne!(a, c);
    assert!(!registry.has::<Position>(c));
}
