use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use contracts::{Position, ALL_DIRECTIONS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenNode {
    f_score: i32,
    position: Position,
}

// Ties on f break toward lower (y, x) so equal-length paths are stable.
impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.f_score
            .cmp(&other.f_score)
            .then(self.position.y.cmp(&other.position.y))
            .then(self.position.x.cmp(&other.position.x))
    }
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A* over the cardinal-step grid. `can_step` is the navigable-graph oracle
/// (bounds, terrain, walls, doors). Returns the full path including `start`,
/// or `None` when the goal is unreachable.
pub fn astar_path(
    start: Position,
    goal: Position,
    can_step: impl Fn(Position, contracts::Direction) -> bool,
) -> Option<Vec<Position>> {
    if start == goal {
        return Some(vec![start]);
    }

    let mut open = BinaryHeap::new();
    open.push(Reverse(OpenNode {
        f_score: start.manhattan_distance(goal),
        position: start,
    }));

    let mut came_from: BTreeMap<Position, Position> = BTreeMap::new();
    let mut g_score: BTreeMap<Position, i32> = BTreeMap::new();
    g_score.insert(start, 0);

    while let Some(Reverse(node)) = open.pop() {
        let current = node.position;
        if current == goal {
            let mut path = vec![current];
            let mut cursor = current;
            while let Some(&previous) = came_from.get(&cursor) {
                path.push(previous);
                cursor = previous;
            }
            path.reverse();
            return Some(path);
        }

        let current_g = g_score.get(&current).copied().unwrap_or(i32::MAX);
        for direction in ALL_DIRECTIONS {
            if !can_step(current, direction) {
                continue;
            }
            let neighbor = current.step(direction);
            let tentative_g = current_g + 1;
            if tentative_g < g_score.get(&neighbor).copied().unwrap_or(i32::MAX) {
                came_from.insert(neighbor, current);
                g_score.insert(neighbor, tentative_g);
                open.push(Reverse(OpenNode {
                    f_score: tentative_g + neighbor.manhattan_distance(goal),
                    position: neighbor,
                }));
            }
        }
    }

    None
}
