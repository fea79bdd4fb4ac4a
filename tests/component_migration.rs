//! Adding a component to an entity migrates it into a new archetype
//! without disturbing its existing values.

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
fn add_components_migrates_and_both_rows_surface_in_the_joint_query() {
    let mut world = World::new();
    let e1 = world
        .spawn_with((Position { x: 1.0, y: 2.0 }, Velocity { x: 3.0, y: 4.0 }))
        .unwrap();
    let e2 = world.spawn_with((Position { x: 5.0, y: 6.0 },)).unwrap();

    world.add_components_with(e2, (Velocity { x: 7.0, y: 8.0 },)).unwrap();

    let mut rows: Vec<(Position, Velocity)> = world
        .query::<(&Position, &Velocity), ()>()
        .map(|(p, v)| (*p, *v))
        .collect();
    rows.sort_by(|a, b| a.0.x.partial_cmp(&b.0.x).unwrap());

    assert_eq!(
        rows,
        vec![
            (Position { x: 1.0, y: 2.0 }, Velocity { x: 3.0, y: 4.0 }),
            (Position { x: 5.0, y: 6.0 }, Velocity { x: 7.0, y: 8.0 }),
        ]
    );
    assert!(world.has_component::<Velocity>(e1));
    assert!(world.has_component::<Velocity>(e2));
}
