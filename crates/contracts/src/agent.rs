use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::{AgentName, ObjectId, Position};

/// A unique crafted or found item carried in an inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub id: ObjectId,
    pub kind: String,
    #[serde(default)]
    pub properties: Vec<String>,
}

impl Item {
    pub fn has_property(&self, property: &str) -> bool {
        self.properties.iter().any(|p| p == property)
    }
}

/// Hybrid inventory: counted stacks for resources, unique items for the rest.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Inventory {
    #[serde(default)]
    pub stacks: BTreeMap<String, u32>,
    #[serde(default)]
    pub items: Vec<Item>,
}

impl Inventory {
    pub fn resource_quantity(&self, kind: &str) -> u32 {
        self.stacks.get(kind).copied().unwrap_or(0)
    }

    pub fn has_resource(&self, kind: &str, quantity: u32) -> bool {
        self.resource_quantity(kind) >= quantity
    }

    pub fn add_resource(&mut self, kind: &str, quantity: u32) {
        *self.stacks.entry(kind.to_string()).or_insert(0) += quantity;
    }

    /// Removes `quantity` of `kind`; empty stacks disappear. Returns false
    /// (leaving the inventory untouched) when there is not enough.
    pub fn remove_resource(&mut self, kind: &str, quantity: u32) -> bool {
        match self.stacks.get_mut(kind) {
            Some(current) if *current >= quantity => {
                *current -= quantity;
                if *current == 0 {
                    self.stacks.remove(kind);
                }
                true
            }
            _ => false,
        }
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn item_of_kind(&self, kind: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.kind == kind)
    }

    pub fn add_item(&mut self, item: Item) {
        self.items.push(item);
    }

    pub fn remove_item(&mut self, id: &str) -> Option<Item> {
        let index = self.items.iter().position(|item| item.id == id)?;
        Some(self.items.remove(index))
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty() && self.items.is_empty()
    }

    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        for (kind, quantity) in &self.stacks {
            parts.push(format!("{kind} x{quantity}"));
        }
        for item in &self.items {
            if item.properties.is_empty() {
                parts.push(item.kind.clone());
            } else {
                parts.push(format!("{} ({})", item.kind, item.properties.join(", ")));
            }
        }
        if parts.is_empty() {
            "empty".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Multi-tick travel state. While a journey is set the agent is in trance
/// and skips its turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Journey {
    pub destination: Position,
    /// Full path including the starting cell; `path[0]` is the position the
    /// agent stood on when the journey was planned.
    pub path: Vec<Position>,
    pub progress: usize,
}

impl Journey {
    pub fn new(destination: Position, path: Vec<Position>) -> Self {
        Self {
            destination,
            path,
            progress: 0,
        }
    }

    pub fn next_position(&self) -> Option<Position> {
        self.path.get(self.progress + 1).copied()
    }

    pub fn is_complete(&self) -> bool {
        self.progress + 1 >= self.path.len()
    }

    pub fn remaining_steps(&self) -> usize {
        self.path.len().saturating_sub(self.progress + 1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Agent {
    pub name: AgentName,
    pub model_id: String,
    #[serde(default)]
    pub personality: String,
    pub position: Position,
    #[serde(default)]
    pub inventory: Inventory,
    #[serde(default)]
    pub journey: Option<Journey>,
    #[serde(default)]
    pub sleeping: bool,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub last_turn_tick: u64,
    #[serde(default)]
    pub known_agents: BTreeSet<AgentName>,
    #[serde(default)]
    pub pending_dream: Option<String>,
}

impl Agent {
    pub fn new(name: impl Into<AgentName>, model_id: impl Into<String>, position: Position) -> Self {
        Self {
            name: name.into(),
            model_id: model_id.into(),
            personality: String::new(),
            position,
            inventory: Inventory::default(),
            journey: None,
            sleeping: false,
            session_id: None,
            last_turn_tick: 0,
            known_agents: BTreeSet::new(),
            pending_dream: None,
        }
    }

    pub fn is_journeying(&self) -> bool {
        self.journey.is_some()
    }

    pub fn knows(&self, other: &str) -> bool {
        self.known_agents.contains(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stacks_collapse_when_emptied() {
        let mut inventory = Inventory::default();
        inventory.add_resource("wood", 2);
        assert!(inventory.remove_resource("wood", 2));
        assert!(!inventory.stacks.contains_key("wood"));
        assert!(!inventory.remove_resource("wood", 1));
    }

    #[test]
    fn remove_resource_rejects_shortfalls_without_mutation() {
        let mut inventory = Inventory::default();
        inventory.add_resource("stone", 1);
        assert!(!inventory.remove_resource("stone", 2));
        assert_eq!(inventory.resource_quantity("stone"), 1);
    }

    #[test]
    fn journey_progress_tracks_remaining_steps() {
        let path = vec![
            Position::new(0, 0),
            Position::new(1, 0),
            Position::new(2, 0),
        ];
        let mut journey = Journey::new(Position::new(2, 0), path);
        assert_eq!(journey.remaining_steps(), 2);
        assert_eq!(journey.next_position(), Some(Position::new(1, 0)));
        journey.progress = 2;
        assert!(journey.is_complete());
        assert_eq!(journey.next_position(), None);
    }
}
