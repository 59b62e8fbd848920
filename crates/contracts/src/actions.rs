use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conversation::Privacy;
use crate::events::Event;
use crate::types::{AgentName, Direction, Position};

fn default_quantity() -> u32 {
    1
}

/// The closed action vocabulary. Object interaction is addressed by compass
/// direction (plus `down` for the agent's own cell) so agents never observe
/// internal object ids.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    // Movement
    Walk {
        direction: Direction,
    },
    Approach {
        target: String,
    },
    Journey {
        destination: JourneyTarget,
    },
    // Perception
    Examine {
        direction: String,
    },
    SenseOthers,
    // Interaction
    Take {
        direction: String,
    },
    Drop {
        kind: String,
        #[serde(default = "default_quantity")]
        quantity: u32,
    },
    Give {
        recipient: AgentName,
        kind: String,
        #[serde(default = "default_quantity")]
        quantity: u32,
    },
    Gather,
    // Material
    Combine {
        items: Vec<String>,
    },
    Work {
        material: String,
        technique: String,
    },
    Apply {
        tool: String,
        target: String,
    },
    // Building
    BuildShelter {
        facing: Direction,
    },
    PlaceWall {
        direction: Direction,
    },
    PlaceDoor {
        direction: Direction,
    },
    PlaceItem {
        item: String,
    },
    RemoveWall {
        direction: Direction,
    },
    // Expression
    WriteSign {
        text: String,
    },
    ReadSign {
        direction: String,
    },
    NamePlace {
        name: String,
    },
    // Social
    Speak {
        text: String,
    },
    Invite {
        invitee: AgentName,
        #[serde(default = "default_privacy")]
        privacy: Privacy,
    },
    AcceptInvite,
    DeclineInvite,
    JoinConversation {
        participant: AgentName,
    },
    LeaveConversation,
    // State
    Sleep,
}

fn default_privacy() -> Privacy {
    Privacy::Public
}

/// Journey destinations may be raw coordinates or a named place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum JourneyTarget {
    Position(Position),
    Landmark(String),
}

impl Action {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Walk { .. } => "walk",
            Self::Approach { .. } => "approach",
            Self::Journey { .. } => "journey",
            Self::Examine { .. } => "examine",
            Self::SenseOthers => "sense_others",
            Self::Take { .. } => "take",
            Self::Drop { .. } => "drop",
            Self::Give { .. } => "give",
            Self::Gather => "gather",
            Self::Combine { .. } => "combine",
            Self::Work { .. } => "work",
            Self::Apply { .. } => "apply",
            Self::BuildShelter { .. } => "build_shelter",
            Self::PlaceWall { .. } => "place_wall",
            Self::PlaceDoor { .. } => "place_door",
            Self::PlaceItem { .. } => "place_item",
            Self::RemoveWall { .. } => "remove_wall",
            Self::WriteSign { .. } => "write_sign",
            Self::ReadSign { .. } => "read_sign",
            Self::NamePlace { .. } => "name_place",
            Self::Speak { .. } => "speak",
            Self::Invite { .. } => "invite",
            Self::AcceptInvite => "accept_invite",
            Self::DeclineInvite => "decline_invite",
            Self::JoinConversation { .. } => "join_conversation",
            Self::LeaveConversation => "leave_conversation",
            Self::Sleep => "sleep",
        }
    }
}

/// Result of executing an action. Failed actions carry no events and have
/// consumed nothing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            events: Vec::new(),
            data: None,
        }
    }

    pub fn ok_with(message: impl Into<String>, events: Vec<Event>, data: Option<Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            events,
            data,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            events: Vec::new(),
            data: None,
        }
    }

    pub fn fail_with(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: false,
            message: message.into(),
            events: Vec::new(),
            data: Some(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_round_trip_through_tagged_json() {
        let action = Action::Give {
            recipient: "Sage".to_string(),
            kind: "wood".to_string(),
            quantity: 2,
        };
        let value = serde_json::to_value(&action).expect("serialise");
        assert_eq!(value["type"], "give");
        let back: Action = serde_json::from_value(value).expect("deserialise");
        assert_eq!(back, action);
    }

    #[test]
    fn journey_target_accepts_coordinates_or_landmark() {
        let by_position: Action =
            serde_json::from_value(serde_json::json!({
                "type": "journey",
                "destination": {"x": 20, "y": 5},
            }))
            .expect("position destination");
        assert!(matches!(
            by_position,
            Action::Journey {
                destination: JourneyTarget::Position(Position { x: 20, y: 5 })
            }
        ));

        let by_name: Action = serde_json::from_value(serde_json::json!({
            "type": "journey",
            "destination": "the old oak",
        }))
        .expect("landmark destination");
        assert!(matches!(
            by_name,
            Action::Journey {
                destination: JourneyTarget::Landmark(_)
            }
        ));
    }

    #[test]
    fn quantity_defaults_to_one() {
        let action: Action = serde_json::from_value(serde_json::json!({
            "type": "drop",
            "kind": "stone",
        }))
        .expect("drop without quantity");
        assert!(matches!(action, Action::Drop { quantity: 1, .. }));
    }
}
