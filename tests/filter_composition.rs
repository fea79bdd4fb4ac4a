//! `With`/`Without` narrow a query to entities carrying (or lacking) a
//! component; `Any` matches an archetype signature against a union of
//! conditions.

use loom_ecs::prelude::*;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Position {
    x: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Velocity {
    x: f32,
}

fn signature_hash<T: Component>() -> u32 {
    loom_ecs::component::descriptor::<T>().hash
}

#[test]
fn without_filter_keeps_only_the_entity_lacking_the_excluded_component() {
    let mut world = World::new();
    let a = world.spawn_with((Position { x: 1.0 },)).unwrap();
    let _b = world.spawn_with((Position { x: 2.0 }, Velocity { x: 3.0 })).unwrap();
    let _c = world.spawn_with((Velocity { x: 4.0 },)).unwrap();

    let matches: Vec<Position> = world.query::<&Position, Without<Velocity>>().copied().collect();
    assert_eq!(matches, vec![Position { x: 1.0 }]);
    assert!(world.is_alive(a));
}

#[test]
fn any_filter_matches_a_signature_carrying_either_condition() {
    let pos_hash = signature_hash::<Position>();
    let vel_hash = signature_hash::<Velocity>();

    let a_signature = [pos_hash];
    let b_signature = {
        let mut sig = [pos_hash, vel_hash];
        sig.sort_unstable();
        sig
    };
    let c_signature = [vel_hash];
    let neither_signature: [u32; 0] = [];

    type AnyPosOrVel = Any<(With<Position>, With<Velocity>)>;
    assert!(AnyPosOrVel::matches(&a_signature));
    assert!(AnyPosOrVel::matches(&b_signature));
    assert!(AnyPosOrVel::matches(&c_signature));
    assert!(!AnyPosOrVel::matches(&neither_signature));
}
