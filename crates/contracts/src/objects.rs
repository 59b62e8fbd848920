use serde::{Deserialize, Serialize};

use crate::types::{AgentName, ObjectId, Position};

/// Persistent world object. Polymorphic over `kind`; stored in a single
/// discriminator + JSON-extras table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorldObject {
    pub id: ObjectId,
    pub position: Position,
    #[serde(default)]
    pub created_by: Option<AgentName>,
    #[serde(default)]
    pub created_tick: u64,
    #[serde(default = "default_passable")]
    pub passable: bool,
    #[serde(flatten)]
    pub kind: ObjectKind,
}

fn default_passable() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "object_type", rename_all = "snake_case")]
pub enum ObjectKind {
    Sign {
        text: String,
    },
    PlacedItem {
        item_kind: String,
        #[serde(default = "default_quantity")]
        quantity: u32,
        #[serde(default)]
        properties: Vec<String>,
    },
}

fn default_quantity() -> u32 {
    1
}

impl WorldObject {
    pub fn sign(
        id: impl Into<ObjectId>,
        position: Position,
        author: impl Into<AgentName>,
        tick: u64,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            position,
            created_by: Some(author.into()),
            created_tick: tick,
            passable: true,
            kind: ObjectKind::Sign { text: text.into() },
        }
    }

    pub fn placed_item(
        id: impl Into<ObjectId>,
        position: Position,
        owner: impl Into<AgentName>,
        tick: u64,
        item_kind: impl Into<String>,
        quantity: u32,
        properties: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            position,
            created_by: Some(owner.into()),
            created_tick: tick,
            passable: true,
            kind: ObjectKind::PlacedItem {
                item_kind: item_kind.into(),
                quantity,
                properties,
            },
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind {
            ObjectKind::Sign { .. } => "sign",
            ObjectKind::PlacedItem { .. } => "placed_item",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_kind_serialises_with_discriminator() {
        let sign = WorldObject::sign("obj-1", Position::new(2, 3), "Rowan", 7, "welcome");
        let value = serde_json::to_value(&sign).expect("serialise");
        assert_eq!(value["object_type"], "sign");
        assert_eq!(value["text"], "welcome");

        let back: WorldObject = serde_json::from_value(value).expect("deserialise");
        assert_eq!(back, sign);
    }
}
