//! Basic spawn and query behavior over one- and two-component signatures.

use loom_ecs::prelude::*;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Velocity {
    x: f32,
    y: f32,
}

#[test]
fn query_with_position_visits_both_entities() {
    let mut world = World::new();
    world
        .spawn_with((Position { x: 1.0, y: 2.0 }, Velocity { x: 3.0, y: 4.0 }))
        .unwrap();
    world.spawn_with((Position { x: 5.0, y: 6.0 },)).unwrap();

    let mut positions: Vec<Position> = world.query::<&Position, ()>().copied().collect();
    positions.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap());
    assert_eq!(positions, vec![Position { x: 1.0, y: 2.0 }, Position { x: 5.0, y: 6.0 }]);
}

#[test]
fn query_with_position_and_velocity_visits_only_the_shared_row() {
    let mut world = World::new();
    world
        .spawn_with((Position { x: 1.0, y: 2.0 }, Velocity { x: 3.0, y: 4.0 }))
        .unwrap();
    world.spawn_with((Position { x: 5.0, y: 6.0 },)).unwrap();

    let rows: Vec<(&Position, &Velocity)> = world.query::<(&Position, &Velocity), ()>().collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(*rows[0].0, Position { x: 1.0, y: 2.0 });
    assert_eq!(*rows[0].1, Velocity { x: 3.0, y: 4.0 });
}
