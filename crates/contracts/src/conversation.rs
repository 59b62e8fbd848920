use serde::{Deserialize, Serialize};

use crate::types::{AgentName, ConversationId, InvitationId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Privacy {
    Public,
    Private,
}

impl Privacy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }

    pub fn parse(value: &str) -> Option<Privacy> {
        match value {
            "public" => Some(Self::Public),
            "private" => Some(Self::Private),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
}

impl InvitationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<InvitationStatus> {
        match value {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "declined" => Some(Self::Declined),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// Invitations are never deleted; they reach a terminal status instead.
/// `expires_at_tick = created_tick + expiry_ticks`, and a pending invitation
/// expires once the current tick moves past it, so the invitee gets the full
/// window to respond.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Invitation {
    pub id: InvitationId,
    pub inviter: AgentName,
    pub invitee: AgentName,
    pub privacy: Privacy,
    pub created_tick: u64,
    pub expires_at_tick: u64,
    pub status: InvitationStatus,
}

impl Invitation {
    pub fn is_pending(&self) -> bool {
        self.status == InvitationStatus::Pending
    }

    pub fn is_expired_at(&self, tick: u64) -> bool {
        self.is_pending() && tick > self.expires_at_tick
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationTurn {
    pub speaker: AgentName,
    pub text: String,
    pub tick: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub name: AgentName,
    pub joined_tick: u64,
    #[serde(default)]
    pub left_tick: Option<u64>,
    /// Tick at which this participant last received the conversation state;
    /// turns after it are the participant's unseen turns.
    #[serde(default)]
    pub last_turn_tick: Option<u64>,
}

impl Participant {
    pub fn is_active(&self) -> bool {
        self.left_tick.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub privacy: Privacy,
    pub created_by: AgentName,
    pub participants: Vec<Participant>,
    pub turns: Vec<ConversationTurn>,
    pub started_tick: u64,
    #[serde(default)]
    pub ended_tick: Option<u64>,
}

impl Conversation {
    pub fn is_active(&self) -> bool {
        self.ended_tick.is_none()
    }

    pub fn active_participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| p.is_active())
    }

    pub fn has_active_participant(&self, name: &str) -> bool {
        self.participants
            .iter()
            .any(|p| p.name == name && p.is_active())
    }

    pub fn participant(&self, name: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.name == name)
    }

    pub fn participant_mut(&mut self, name: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.name == name)
    }

    pub fn unseen_turns(&self, name: &str) -> Vec<&ConversationTurn> {
        let since = self
            .participant(name)
            .and_then(|p| p.last_turn_tick);
        self.turns
            .iter()
            .filter(|turn| match since {
                Some(tick) => turn.tick > tick,
                None => true,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_conversation() -> Conversation {
        Conversation {
            id: "conv-1".to_string(),
            privacy: Privacy::Public,
            created_by: "Rowan".to_string(),
            participants: vec![
                Participant {
                    name: "Rowan".to_string(),
                    joined_tick: 1,
                    left_tick: None,
                    last_turn_tick: Some(2),
                },
                Participant {
                    name: "Sage".to_string(),
                    joined_tick: 1,
                    left_tick: None,
                    last_turn_tick: None,
                },
            ],
            turns: vec![
                ConversationTurn {
                    speaker: "Rowan".to_string(),
                    text: "hello".to_string(),
                    tick: 2,
                },
                ConversationTurn {
                    speaker: "Sage".to_string(),
                    text: "well met".to_string(),
                    tick: 3,
                },
            ],
            started_tick: 1,
            ended_tick: None,
        }
    }

    #[test]
    fn unseen_turns_follow_last_turn_tick() {
        let conversation = sample_conversation();
        let rowan: Vec<_> = conversation.unseen_turns("Rowan");
        assert_eq!(rowan.len(), 1);
        assert_eq!(rowan[0].speaker, "Sage");

        // No last_turn_tick means the whole history is unseen.
        assert_eq!(conversation.unseen_turns("Sage").len(), 2);
    }

    #[test]
    fn pending_invitation_expires_strictly_after_window() {
        let invitation = Invitation {
            id: "inv-1".to_string(),
            inviter: "Rowan".to_string(),
            invitee: "Sage".to_string(),
            privacy: Privacy::Public,
            created_tick: 1,
            expires_at_tick: 3,
            status: InvitationStatus::Pending,
        };
        assert!(!invitation.is_expired_at(3));
        assert!(invitation.is_expired_at(4));
    }
}
