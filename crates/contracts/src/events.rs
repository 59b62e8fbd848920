use serde::{Deserialize, Serialize};

use crate::conversation::Privacy;
use crate::types::{AgentName, ConversationId, Direction, InvitationId, ObjectId, Position};
use crate::world::Weather;

/// One record in the append-only audit log. Sequence numbers are assigned at
/// commit and increase monotonically across the run; events are never
/// replayed into state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub tick: u64,
    pub seq: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    /// Events are created inside the tick with `seq = 0`; the commit phase
    /// assigns the real sequence numbers.
    pub fn unsequenced(tick: u64, kind: EventKind) -> Self {
        Self { tick, seq: 0, kind }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    AgentMoved {
        agent: AgentName,
        from: Position,
        to: Position,
    },
    JourneyStarted {
        agent: AgentName,
        destination: Position,
        path_length: usize,
    },
    JourneyInterrupted {
        agent: AgentName,
        reason: String,
        at: Position,
    },
    JourneyArrived {
        agent: AgentName,
        destination: Position,
    },
    AgentGathered {
        agent: AgentName,
        resource: String,
        at: Position,
    },
    ItemTaken {
        agent: AgentName,
        object_id: ObjectId,
        kind: String,
        from: Position,
    },
    ItemDropped {
        agent: AgentName,
        kind: String,
        quantity: u32,
        at: Position,
    },
    ItemGiven {
        giver: AgentName,
        receiver: AgentName,
        kind: String,
        quantity: u32,
    },
    CraftSucceeded {
        agent: AgentName,
        inputs: Vec<String>,
        #[serde(default)]
        technique: Option<String>,
        output: String,
        quantity: u32,
    },
    SignWritten {
        object_id: ObjectId,
        position: Position,
        text: String,
        author: AgentName,
    },
    ObjectPlaced {
        object_id: ObjectId,
        kind: String,
        position: Position,
        by: AgentName,
    },
    WallPlaced {
        position: Position,
        direction: Direction,
        builder: AgentName,
    },
    WallRemoved {
        position: Position,
        direction: Direction,
        builder: AgentName,
    },
    DoorPlaced {
        position: Position,
        direction: Direction,
        builder: AgentName,
    },
    StructureDetected {
        structure_id: ObjectId,
        size: usize,
        creators: Vec<AgentName>,
    },
    PlaceNamed {
        position: Position,
        name: String,
        by: AgentName,
    },
    AgentSlept {
        agent: AgentName,
        at: Position,
    },
    AgentWoke {
        agent: AgentName,
        at: Position,
        reason: String,
    },
    AgentsMet {
        agent: AgentName,
        other: AgentName,
    },
    InvitationSent {
        invitation_id: InvitationId,
        inviter: AgentName,
        invitee: AgentName,
        privacy: Privacy,
    },
    InvitationAccepted {
        invitation_id: InvitationId,
        agent: AgentName,
        inviter: AgentName,
        conversation_id: ConversationId,
    },
    InvitationDeclined {
        invitation_id: InvitationId,
        agent: AgentName,
        inviter: AgentName,
    },
    InvitationExpired {
        invitation_id: InvitationId,
        inviter: AgentName,
        invitee: AgentName,
    },
    ConversationStarted {
        conversation_id: ConversationId,
        participants: Vec<AgentName>,
        privacy: Privacy,
    },
    ConversationTurnAdded {
        conversation_id: ConversationId,
        speaker: AgentName,
        text: String,
    },
    ConversationParticipantJoined {
        conversation_id: ConversationId,
        agent: AgentName,
    },
    ConversationParticipantLeft {
        conversation_id: ConversationId,
        agent: AgentName,
    },
    ConversationEnded {
        conversation_id: ConversationId,
        reason: String,
    },
    WeatherChanged {
        old: Weather,
        new: Weather,
    },
    ObserverTriggered {
        text: String,
    },
    DreamSent {
        agent: AgentName,
    },
}

impl EventKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::AgentMoved { .. } => "agent_moved",
            Self::JourneyStarted { .. } => "journey_started",
            Self::JourneyInterrupted { .. } => "journey_interrupted",
            Self::JourneyArrived { .. } => "journey_arrived",
            Self::AgentGathered { .. } => "agent_gathered",
            Self::ItemTaken { .. } => "item_taken",
            Self::ItemDropped { .. } => "item_dropped",
            Self::ItemGiven { .. } => "item_given",
            Self::CraftSucceeded { .. } => "craft_succeeded",
            Self::SignWritten { .. } => "sign_written",
            Self::ObjectPlaced { .. } => "object_placed",
            Self::WallPlaced { .. } => "wall_placed",
            Self::WallRemoved { .. } => "wall_removed",
            Self::DoorPlaced { .. } => "door_placed",
            Self::StructureDetected { .. } => "structure_detected",
            Self::PlaceNamed { .. } => "place_named",
            Self::AgentSlept { .. } => "agent_slept",
            Self::AgentWoke { .. } => "agent_woke",
            Self::AgentsMet { .. } => "agents_met",
            Self::InvitationSent { .. } => "invitation_sent",
            Self::InvitationAccepted { .. } => "invitation_accepted",
            Self::InvitationDeclined { .. } => "invitation_declined",
            Self::InvitationExpired { .. } => "invitation_expired",
            Self::ConversationStarted { .. } => "conversation_started",
            Self::ConversationTurnAdded { .. } => "conversation_turn_added",
            Self::ConversationParticipantJoined { .. } => "conversation_participant_joined",
            Self::ConversationParticipantLeft { .. } => "conversation_participant_left",
            Self::ConversationEnded { .. } => "conversation_ended",
            Self::WeatherChanged { .. } => "weather_changed",
            Self::ObserverTriggered { .. } => "observer_triggered",
            Self::DreamSent { .. } => "dream_sent",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_flattens_kind_into_one_record() {
        let event = Event {
            tick: 12,
            seq: 40,
            kind: EventKind::AgentMoved {
                agent: "Rowan".to_string(),
                from: Position::new(5, 5),
                to: Position::new(5, 4),
            },
        };
        let value = serde_json::to_value(&event).expect("serialise");
        assert_eq!(value["tick"], 12);
        assert_eq!(value["seq"], 40);
        assert_eq!(value["type"], "agent_moved");
        assert_eq!(value["to"]["y"], 4);
    }
}
