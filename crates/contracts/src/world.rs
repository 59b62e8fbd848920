use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{Direction, Position};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Terrain {
    Grass,
    Water,
    Coast,
    Sand,
    Stone,
    Forest,
    Hill,
}

impl Terrain {
    pub fn passable(self) -> bool {
        !matches!(self, Self::Water)
    }

    pub fn gatherable_resource(self) -> Option<&'static str> {
        match self {
            Self::Grass => Some("grass"),
            Self::Sand => Some("clay"),
            Self::Forest => Some("wood"),
            Self::Stone => Some("stone"),
            Self::Water | Self::Coast | Self::Hill => None,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Self::Grass => '.',
            Self::Water => '~',
            Self::Coast => ',',
            Self::Sand => ':',
            Self::Stone => '^',
            Self::Forest => 'T',
            Self::Hill => 'n',
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Grass => "grass",
            Self::Water => "water",
            Self::Coast => "coast",
            Self::Sand => "sand",
            Self::Stone => "stone",
            Self::Forest => "forest",
            Self::Hill => "hill",
        }
    }

    pub fn parse(value: &str) -> Option<Terrain> {
        match value {
            "grass" => Some(Self::Grass),
            "water" => Some(Self::Water),
            "coast" => Some(Self::Coast),
            "sand" => Some(Self::Sand),
            "stone" => Some(Self::Stone),
            "forest" => Some(Self::Forest),
            "hill" => Some(Self::Hill),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Weather {
    Clear,
    Cloudy,
    Rainy,
    Foggy,
}

impl Weather {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Cloudy => "cloudy",
            Self::Rainy => "rainy",
            Self::Foggy => "foggy",
        }
    }

    pub fn parse(value: &str) -> Option<Weather> {
        match value {
            "clear" => Some(Self::Clear),
            "cloudy" => Some(Self::Cloudy),
            "rainy" => Some(Self::Rainy),
            "foggy" => Some(Self::Foggy),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    pub fn from_tick(tick: u64) -> TimeOfDay {
        match tick % 4 {
            0 => Self::Morning,
            1 => Self::Afternoon,
            2 => Self::Evening,
            _ => Self::Night,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
            Self::Night => "night",
        }
    }
}

/// A grid cell. Walls sit on edges; a door direction must also be a wall
/// direction. Cells equal to the default are not persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cell {
    pub terrain: Terrain,
    #[serde(default)]
    pub walls: BTreeSet<Direction>,
    #[serde(default)]
    pub doors: BTreeSet<Direction>,
    #[serde(default)]
    pub place_name: Option<String>,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            terrain: Terrain::Grass,
            walls: BTreeSet::new(),
            doors: BTreeSet::new(),
            place_name: None,
        }
    }
}

impl Cell {
    pub fn with_terrain(terrain: Terrain) -> Self {
        Self {
            terrain,
            ..Self::default()
        }
    }

    pub fn is_default(&self) -> bool {
        self == &Self::default()
    }

    pub fn has_wall(&self, direction: Direction) -> bool {
        self.walls.contains(&direction)
    }

    pub fn has_door(&self, direction: Direction) -> bool {
        self.doors.contains(&direction)
    }

    /// An edge can be crossed when it carries no wall, or a door in the wall.
    pub fn can_exit(&self, direction: Direction) -> bool {
        !self.walls.contains(&direction) || self.doors.contains(&direction)
    }
}

/// World-level singleton state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorldMeta {
    pub tick: u64,
    pub width: i32,
    pub height: i32,
    pub weather: Weather,
    pub next_event_seq: u64,
}

impl WorldMeta {
    pub fn time_of_day(&self) -> TimeOfDay {
        TimeOfDay::from_tick(self.tick)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Structure {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub interior: BTreeSet<Position>,
    pub creators: BTreeSet<String>,
    #[serde(default)]
    pub is_private: bool,
}

impl Structure {
    pub fn contains(&self, pos: Position) -> bool {
        self.interior.contains(&pos)
    }

    pub fn size(&self) -> usize {
        self.interior.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_water_blocks_movement() {
        for terrain in [
            Terrain::Grass,
            Terrain::Coast,
            Terrain::Sand,
            Terrain::Stone,
            Terrain::Forest,
            Terrain::Hill,
        ] {
            assert!(terrain.passable());
        }
        assert!(!Terrain::Water.passable());
    }

    #[test]
    fn gatherable_resources_match_terrain() {
        assert_eq!(Terrain::Forest.gatherable_resource(), Some("wood"));
        assert_eq!(Terrain::Sand.gatherable_resource(), Some("clay"));
        assert_eq!(Terrain::Hill.gatherable_resource(), None);
    }

    #[test]
    fn time_of_day_cycles_every_four_ticks() {
        assert_eq!(TimeOfDay::from_tick(0), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_tick(3), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_tick(4), TimeOfDay::Morning);
    }

    #[test]
    fn door_in_wall_allows_exit() {
        let mut cell = Cell::default();
        cell.walls.insert(Direction::North);
        assert!(!cell.can_exit(Direction::North));
        cell.doors.insert(Direction::North);
        assert!(cell.can_exit(Direction::North));
        assert!(cell.can_exit(Direction::South));
    }
}
