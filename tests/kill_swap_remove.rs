//! Killing a mid-population entity leaves every other entity's component
//! values intact, with the last row relocated into the vacated slot.

use loom_ecs::prelude::*;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[test]
fn kill_mid_population_entity_preserves_the_rest() {
    let mut world = World::new();
    let entities: Vec<EntityId> = (1..=5)
        .map(|i| world.spawn_with((Position { x: i as f32, y: i as f32 },)).unwrap())
        .collect();

    world.kill(entities[2]).unwrap();

    assert!(!world.is_alive(entities[2]));
    let remaining: Vec<bool> = entities.iter().map(|&e| world.is_alive(e)).collect();
    assert_eq!(remaining, vec![true, true, false, true, true]);
    assert_eq!(world.query::<&Position, ()>().count(), 4);

    // e5 (the last row) now occupies e3's former slot and keeps its own value.
    assert_eq!(world.get_component::<Position>(entities[4]), Some(&Position { x: 5.0, y: 5.0 }));
    for (i, &e) in entities.iter().enumerate() {
        if i == 2 {
            continue;
        }
        let expected = (i + 1) as f32;
        assert_eq!(world.get_component::<Position>(e), Some(&Position { x: expected, y: expected }));
    }
}
