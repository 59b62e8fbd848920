use serde::{Deserialize, Serialize};

pub type AgentName = String;
pub type ObjectId = String;
pub type ConversationId = String;
pub type InvitationId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    North,
    South,
    East,
    West,
}

pub const ALL_DIRECTIONS: [Direction; 4] = [
    Direction::North,
    Direction::South,
    Direction::East,
    Direction::West,
];

impl Direction {
    /// Grid deltas: north is y-1, south is y+1, east is x+1, west is x-1.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Self::North => (0, -1),
            Self::South => (0, 1),
            Self::East => (1, 0),
            Self::West => (-1, 0),
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Self::North => Self::South,
            Self::South => Self::North,
            Self::East => Self::West,
            Self::West => Self::East,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::North => "north",
            Self::South => "south",
            Self::East => "east",
            Self::West => "west",
        }
    }

    pub fn parse(value: &str) -> Option<Direction> {
        match value {
            "north" => Some(Self::North),
            "south" => Some(Self::South),
            "east" => Some(Self::East),
            "west" => Some(Self::West),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn step(self, direction: Direction) -> Position {
        let (dx, dy) = direction.delta();
        Position {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    pub fn in_bounds(self, width: i32, height: i32) -> bool {
        self.x >= 0 && self.x < width && self.y >= 0 && self.y < height
    }

    pub fn manhattan_distance(self, other: Position) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    pub fn chebyshev_distance(self, other: Position) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    /// Eight-way compass bucket toward another position, None when equal.
    pub fn compass_to(self, other: Position) -> Option<CompassOctant> {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        if dx == 0 && dy == 0 {
            return None;
        }
        let east = dx > 0 && dx.abs() * 2 > dy.abs();
        let west = dx < 0 && dx.abs() * 2 > dy.abs();
        let south = dy > 0 && dy.abs() * 2 > dx.abs();
        let north = dy < 0 && dy.abs() * 2 > dx.abs();
        Some(match (north, south, east, west) {
            (true, _, true, _) => CompassOctant::Northeast,
            (true, _, _, true) => CompassOctant::Northwest,
            (_, true, true, _) => CompassOctant::Southeast,
            (_, true, _, true) => CompassOctant::Southwest,
            (true, _, _, _) => CompassOctant::North,
            (_, true, _, _) => CompassOctant::South,
            (_, _, true, _) => CompassOctant::East,
            _ => CompassOctant::West,
        })
    }

    /// Primary cardinal direction toward another position; x-axis wins ties.
    pub fn direction_to(self, other: Position) -> Option<Direction> {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        if dx == 0 && dy == 0 {
            return None;
        }
        if dx.abs() >= dy.abs() {
            Some(if dx > 0 {
                Direction::East
            } else {
                Direction::West
            })
        } else {
            Some(if dy > 0 {
                Direction::South
            } else {
                Direction::North
            })
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CompassOctant {
    #[serde(rename = "N")]
    North,
    #[serde(rename = "NE")]
    Northeast,
    #[serde(rename = "E")]
    East,
    #[serde(rename = "SE")]
    Southeast,
    #[serde(rename = "S")]
    South,
    #[serde(rename = "SW")]
    Southwest,
    #[serde(rename = "W")]
    West,
    #[serde(rename = "NW")]
    Northwest,
}

impl CompassOctant {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::North => "N",
            Self::Northeast => "NE",
            Self::East => "E",
            Self::Southeast => "SE",
            Self::South => "S",
            Self::Southwest => "SW",
            Self::West => "W",
            Self::Northwest => "NW",
        }
    }
}

/// Inclusive rectangle for vision and spatial queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rect {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl Rect {
    pub fn around(center: Position, radius: i32) -> Self {
        Self {
            min_x: center.x - radius,
            min_y: center.y - radius,
            max_x: center.x + radius,
            max_y: center.y + radius,
        }
    }

    pub fn clamp(self, width: i32, height: i32) -> Self {
        Self {
            min_x: self.min_x.max(0),
            min_y: self.min_y.max(0),
            max_x: self.max_x.min(width - 1),
            max_y: self.max_y.min(height - 1),
        }
    }

    pub fn contains(self, pos: Position) -> bool {
        pos.x >= self.min_x && pos.x <= self.max_x && pos.y >= self.min_y && pos.y <= self.max_y
    }

    pub fn positions(self) -> Vec<Position> {
        let mut out = Vec::new();
        for y in self.min_y..=self.max_y {
            for x in self.min_x..=self.max_x {
                out.push(Position::new(x, y));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_deltas_round_trip() {
        let origin = Position::new(5, 5);
        for direction in ALL_DIRECTIONS {
            let stepped = origin.step(direction);
            assert_eq!(stepped.step(direction.opposite()), origin);
        }
    }

    #[test]
    fn north_decreases_y() {
        assert_eq!(Position::new(5, 5).step(Direction::North), Position::new(5, 4));
        assert_eq!(Position::new(5, 5).step(Direction::South), Position::new(5, 6));
    }

    #[test]
    fn chebyshev_takes_axis_max() {
        let a = Position::new(0, 0);
        assert_eq!(a.chebyshev_distance(Position::new(3, 1)), 3);
        assert_eq!(a.chebyshev_distance(Position::new(2, 7)), 7);
        assert_eq!(a.manhattan_distance(Position::new(3, 1)), 4);
    }

    #[test]
    fn rect_clamps_to_world_bounds() {
        let rect = Rect::around(Position::new(0, 0), 3).clamp(10, 10);
        assert_eq!(rect.min_x, 0);
        assert_eq!(rect.min_y, 0);
        assert_eq!(rect.max_x, 3);
        assert_eq!(rect.max_y, 3);
    }

    #[test]
    fn compass_buckets_cover_diagonals() {
        let a = Position::new(10, 10);
        assert_eq!(a.compass_to(Position::new(10, 2)), Some(CompassOctant::North));
        assert_eq!(a.compass_to(Position::new(14, 6)), Some(CompassOctant::Northeast));
        assert_eq!(a.compass_to(Position::new(18, 11)), Some(CompassOctant::East));
        assert_eq!(a.compass_to(Position::new(10, 10)), None);
    }
}
