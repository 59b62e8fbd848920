//! Property tests for the kernel's standing invariants and laws.

use std::collections::BTreeSet;

use proptest::prelude::*;

use contracts::{
    Action, Agent, Direction, EngineConfig, Position, Terrain, ALL_DIRECTIONS,
};
use kernel_core::{pathfind::astar_path, Kernel};

const WORLD: i32 = 20;

fn direction_strategy() -> impl Strategy<Value = Direction> {
    prop_oneof![
        Just(Direction::North),
        Just(Direction::South),
        Just(Direction::East),
        Just(Direction::West),
    ]
}

#[derive(Debug, Clone)]
enum BuildOp {
    PlaceWall(Direction),
    RemoveWall(Direction),
    PlaceDoor(Direction),
    Walk(Direction),
}

fn build_op_strategy() -> impl Strategy<Value = BuildOp> {
    prop_oneof![
        direction_strategy().prop_map(BuildOp::PlaceWall),
        direction_strategy().prop_map(BuildOp::RemoveWall),
        direction_strategy().prop_map(BuildOp::PlaceDoor),
        direction_strategy().prop_map(BuildOp::Walk),
    ]
}

fn builder_kernel(positions: &[(i32, i32)]) -> Kernel {
    let mut kernel = Kernel::new(EngineConfig {
        world_width: WORLD,
        world_height: WORLD,
        ..EngineConfig::default()
    });
    for (index, (x, y)) in positions.iter().enumerate() {
        let mut agent = Agent::new(format!("Builder{index}"), "model-a", Position::new(*x, *y));
        agent.inventory.add_resource("wood", 200);
        kernel.insert_agent(agent);
    }
    kernel
}

fn assert_wall_invariants(kernel: &Kernel) {
    for (position, cell) in kernel.cells() {
        // Sparse storage: the default cell is never persisted.
        assert!(!cell.is_default(), "default cell stored at {position:?}");
        // Doors only exist inside walls.
        assert!(cell.doors.is_subset(&cell.walls));

        for direction in ALL_DIRECTIONS {
            if !cell.has_wall(direction) {
                continue;
            }
            let neighbor = position.step(direction);
            if neighbor.in_bounds(WORLD, WORLD) {
                let mirror = kernel.cell(neighbor);
                assert!(
                    mirror.has_wall(direction.opposite()),
                    "wall at {position:?} {direction:?} has no mirror"
                );
                assert_eq!(
                    cell.has_door(direction),
                    mirror.has_door(direction.opposite()),
                    "door asymmetry at {position:?} {direction:?}"
                );
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn wall_symmetry_survives_arbitrary_building(
        ops in prop::collection::vec((0usize..3, build_op_strategy()), 1..60),
        positions in prop::collection::vec((1i32..WORLD - 1, 1i32..WORLD - 1), 3),
    ) {
        let mut kernel = builder_kernel(&positions);
        let names: Vec<String> = kernel.agents().keys().cloned().collect();

        for (who, op) in ops {
            let agent = &names[who % names.len()];
            let action = match op {
                BuildOp::PlaceWall(direction) => Action::PlaceWall { direction },
                BuildOp::RemoveWall(direction) => Action::RemoveWall { direction },
                BuildOp::PlaceDoor(direction) => Action::PlaceDoor { direction },
                BuildOp::Walk(direction) => Action::Walk { direction },
            };
            // Failures are fine; the invariant must hold either way.
            let _ = kernel.execute_action(agent, &action, 1);
        }

        assert_wall_invariants(&kernel);
    }

    #[test]
    fn place_then_remove_restores_the_grid_exactly(
        x in 1i32..WORLD - 1,
        y in 1i32..WORLD - 1,
        direction in direction_strategy(),
    ) {
        let mut kernel = builder_kernel(&[(x, y)]);
        let name = kernel.agents().keys().next().expect("builder").clone();
        let before = kernel.cells().clone();

        let placed = kernel.execute_action(&name, &Action::PlaceWall { direction }, 1);
        prop_assert!(placed.success);
        let removed = kernel.execute_action(&name, &Action::RemoveWall { direction }, 1);
        prop_assert!(removed.success);

        prop_assert_eq!(kernel.cells(), &before);
    }

    #[test]
    fn astar_matches_bfs_shortest_path_length(
        blocked in prop::collection::btree_set((0i32..12, 0i32..12), 0..40),
        goal_x in 0i32..12,
        goal_y in 0i32..12,
    ) {
        let start = Position::new(0, 0);
        let goal = Position::new(goal_x, goal_y);
        let blocked: BTreeSet<Position> = blocked
            .into_iter()
            .map(|(x, y)| Position::new(x, y))
            .filter(|p| *p != start && *p != goal)
            .collect();

        let can_step = |from: Position, direction: Direction| {
            let to = from.step(direction);
            to.in_bounds(12, 12) && !blocked.contains(&to)
        };

        let astar = astar_path(start, goal, can_step);
        let bfs = bfs_path_length(start, goal, &blocked);

        match (astar, bfs) {
            (Some(path), Some(steps)) => prop_assert_eq!(path.len() - 1, steps),
            (None, None) => {}
            (astar, bfs) => prop_assert!(false, "reachability disagrees: {:?} vs {:?}", astar, bfs),
        }
    }

    #[test]
    fn failed_actions_are_pure(
        direction in direction_strategy(),
        op in 0usize..5,
    ) {
        // An agent with nothing, boxed in by water, fails most things.
        let mut kernel = Kernel::new(EngineConfig {
            world_width: WORLD,
            world_height: WORLD,
            ..EngineConfig::default()
        });
        let home = Position::new(10, 10);
        kernel.seed_terrain(
            ALL_DIRECTIONS
                .iter()
                .map(|d| (home.step(*d), Terrain::Water))
                .chain([(home, Terrain::Hill)]),
        );
        kernel.insert_agent(Agent::new("Ash", "model-a", home));
        let inventory_before = kernel.agent("Ash").expect("ash").inventory.clone();
        let cells_before = kernel.cells().clone();

        let action = match op {
            0 => Action::Walk { direction },
            1 => Action::Gather,
            2 => Action::PlaceWall { direction },
            3 => Action::Drop { kind: "wood".to_string(), quantity: 1 },
            _ => Action::Speak { text: "hello?".to_string() },
        };
        let result = kernel.execute_action("Ash", &action, 1);

        prop_assert!(!result.success);
        prop_assert!(result.events.is_empty());
        prop_assert_eq!(&kernel.agent("Ash").expect("ash").inventory, &inventory_before);
        prop_assert_eq!(kernel.cells(), &cells_before);
    }
}

fn bfs_path_length(start: Position, goal: Position, blocked: &BTreeSet<Position>) -> Option<usize> {
    use std::collections::VecDeque;

    if start == goal {
        return Some(0);
    }
    let mut visited = BTreeSet::from([start]);
    let mut queue = VecDeque::from([(start, 0usize)]);
    while let Some((current, steps)) = queue.pop_front() {
        for direction in ALL_DIRECTIONS {
            let next = current.step(direction);
            if !next.in_bounds(12, 12) || blocked.contains(&next) || !visited.insert(next) {
                continue;
            }
            if next == goal {
                return Some(steps + 1);
            }
            queue.push_back((next, steps + 1));
        }
    }
    None
}
