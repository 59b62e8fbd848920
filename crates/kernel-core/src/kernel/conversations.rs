use contracts::{
    AgentName, Conversation, ConversationId, ConversationTurn, Invitation, InvitationId,
    InvitationStatus, Participant, Privacy,
};

use super::Kernel;

/// Outcome of accepting an invitation: either a fresh conversation was
/// created or the invitee joined the inviter's existing public one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptOutcome {
    pub invitation: Invitation,
    pub conversation_id: ConversationId,
    pub started: bool,
}

impl Kernel {
    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    /// The active conversation an agent participates in, if any. At most one
    /// exists by construction.
    pub fn conversation_for_agent(&self, name: &str) -> Option<&Conversation> {
        self.conversations
            .values()
            .find(|conversation| conversation.is_active() && conversation.has_active_participant(name))
    }

    pub fn is_in_conversation(&self, name: &str) -> bool {
        self.conversation_for_agent(name).is_some()
    }

    pub fn active_conversations(&self) -> Vec<&Conversation> {
        self.conversations
            .values()
            .filter(|conversation| conversation.is_active())
            .collect()
    }

    /// Pending invitation addressed to the agent, if any.
    pub fn pending_invitation_for(&self, name: &str) -> Option<&Invitation> {
        self.invitations
            .values()
            .find(|invitation| invitation.is_pending() && invitation.invitee == name)
    }

    /// Pending invitation sent by the agent, if any.
    pub fn pending_invitation_from(&self, name: &str) -> Option<&Invitation> {
        self.invitations
            .values()
            .find(|invitation| invitation.is_pending() && invitation.inviter == name)
    }

    pub fn pending_invitations(&self) -> Vec<&Invitation> {
        self.invitations
            .values()
            .filter(|invitation| invitation.is_pending())
            .collect()
    }

    /// Records an invitation. Visibility and availability preconditions are
    /// the action engine's responsibility.
    pub(crate) fn create_invitation(
        &mut self,
        inviter: &str,
        invitee: &str,
        privacy: Privacy,
        tick: u64,
    ) -> InvitationId {
        let id = self.mint_invitation_id();
        let invitation = Invitation {
            id: id.clone(),
            inviter: inviter.to_string(),
            invitee: invitee.to_string(),
            privacy,
            created_tick: tick,
            expires_at_tick: tick + self.config.invite_expiry_ticks,
            status: InvitationStatus::Pending,
        };
        self.dirty.invitations.insert(id.clone());
        self.invitations.insert(id.clone(), invitation);
        id
    }

    /// Accepts the invitee's pending invitation. When the inviter already
    /// sits in a public conversation the invitee joins it; a stale private
    /// invitation expires instead. Returns `None` when there is nothing to
    /// accept.
    pub(crate) fn accept_invitation(&mut self, invitee: &str, tick: u64) -> Option<AcceptOutcome> {
        let invitation = self.pending_invitation_for(invitee)?.clone();

        if let Some(existing) = self.conversation_for_agent(&invitation.inviter) {
            let existing_id = existing.id.clone();
            let existing_privacy = existing.privacy;
            if existing_privacy == Privacy::Public {
                self.add_participant(&existing_id, invitee, tick);
                self.set_invitation_status(&invitation.id, InvitationStatus::Accepted);
                return Some(AcceptOutcome {
                    invitation,
                    conversation_id: existing_id,
                    started: false,
                });
            }
            // Inviter has since entered a private conversation; the
            // invitation can no longer be honoured.
            self.set_invitation_status(&invitation.id, InvitationStatus::Expired);
            return None;
        }

        let conversation_id = self.mint_conversation_id();
        let conversation = Conversation {
            id: conversation_id.clone(),
            privacy: invitation.privacy,
            created_by: invitation.inviter.clone(),
            participants: vec![
                Participant {
                    name: invitation.inviter.clone(),
                    joined_tick: tick,
                    left_tick: None,
                    last_turn_tick: None,
                },
                Participant {
                    name: invitee.to_string(),
                    joined_tick: tick,
                    left_tick: None,
                    last_turn_tick: None,
                },
            ],
            turns: Vec::new(),
            started_tick: tick,
            ended_tick: None,
        };
        self.dirty.conversations.insert(conversation_id.clone());
        self.conversations
            .insert(conversation_id.clone(), conversation);
        self.set_invitation_status(&invitation.id, InvitationStatus::Accepted);

        Some(AcceptOutcome {
            invitation,
            conversation_id,
            started: true,
        })
    }

    pub(crate) fn decline_invitation(&mut self, invitee: &str) -> Option<Invitation> {
        let invitation = self.pending_invitation_for(invitee)?.clone();
        self.set_invitation_status(&invitation.id, InvitationStatus::Declined);
        Some(invitation)
    }

    pub(crate) fn add_participant(&mut self, conversation_id: &str, name: &str, tick: u64) {
        if let Some(conversation) = self.conversations.get_mut(conversation_id) {
            if !conversation.is_active() || conversation.has_active_participant(name) {
                return;
            }
            conversation.participants.push(Participant {
                name: name.to_string(),
                joined_tick: tick,
                left_tick: None,
                last_turn_tick: None,
            });
            self.dirty.conversations.insert(conversation_id.to_string());
        }
    }

    /// Removes the agent; when the last participant leaves the conversation
    /// ends and cannot reopen. Returns (conversation id, ended).
    pub(crate) fn leave_conversation(
        &mut self,
        name: &str,
        tick: u64,
    ) -> Option<(ConversationId, bool)> {
        let conversation_id = self.conversation_for_agent(name)?.id.clone();
        let conversation = self.conversations.get_mut(&conversation_id)?;

        if let Some(participant) = conversation.participant_mut(name) {
            participant.left_tick = Some(tick);
        }
        let ended = conversation.active_participants().count() == 0;
        if ended {
            conversation.ended_tick = Some(tick);
        }
        self.dirty.conversations.insert(conversation_id.clone());
        Some((conversation_id, ended))
    }

    /// Appends a turn spoken by the agent in its active conversation and
    /// advances the speaker's `last_turn_tick`.
    pub(crate) fn add_turn(
        &mut self,
        speaker: &str,
        text: &str,
        tick: u64,
    ) -> Option<ConversationId> {
        let conversation_id = self.conversation_for_agent(speaker)?.id.clone();
        let conversation = self.conversations.get_mut(&conversation_id)?;
        conversation.turns.push(ConversationTurn {
            speaker: speaker.to_string(),
            text: text.to_string(),
            tick,
        });
        if let Some(participant) = conversation.participant_mut(speaker) {
            participant.last_turn_tick = Some(tick);
        }
        self.dirty.conversations.insert(conversation_id.clone());
        Some(conversation_id)
    }

    /// Hands the agent its conversation context (unseen turns) and marks the
    /// history as seen up to the current tick.
    pub(crate) fn take_conversation_context(
        &mut self,
        name: &str,
        tick: u64,
    ) -> Option<(ConversationId, Vec<ConversationTurn>, Vec<AgentName>)> {
        let conversation_id = self.conversation_for_agent(name)?.id.clone();
        let conversation = self.conversations.get_mut(&conversation_id)?;

        let unseen: Vec<ConversationTurn> = conversation
            .unseen_turns(name)
            .into_iter()
            .cloned()
            .collect();
        let others: Vec<AgentName> = conversation
            .active_participants()
            .filter(|participant| participant.name != name)
            .map(|participant| participant.name.clone())
            .collect();

        if let Some(participant) = conversation.participant_mut(name) {
            participant.last_turn_tick = Some(tick);
        }
        self.dirty.conversations.insert(conversation_id.clone());
        Some((conversation_id, unseen, others))
    }

    /// Ends a conversation outright (observer command). All remaining
    /// participants are marked as having left.
    pub fn end_conversation(&mut self, conversation_id: &str, tick: u64) -> bool {
        let Some(conversation) = self.conversations.get_mut(conversation_id) else {
            return false;
        };
        if !conversation.is_active() {
            return false;
        }
        for participant in &mut conversation.participants {
            if participant.left_tick.is_none() {
                participant.left_tick = Some(tick);
            }
        }
        conversation.ended_tick = Some(tick);
        self.dirty.conversations.insert(conversation_id.to_string());
        true
    }

    /// Expires pending invitations whose response window has passed.
    pub(crate) fn expire_invitations(&mut self, tick: u64) -> Vec<Invitation> {
        let expired_ids: Vec<InvitationId> = self
            .invitations
            .values()
            .filter(|invitation| invitation.is_expired_at(tick))
            .map(|invitation| invitation.id.clone())
            .collect();

        let mut expired = Vec::new();
        for id in expired_ids {
            self.set_invitation_status(&id, InvitationStatus::Expired);
            if let Some(invitation) = self.invitations.get(&id) {
                expired.push(invitation.clone());
            }
        }
        expired
    }

    fn set_invitation_status(&mut self, id: &str, status: InvitationStatus) {
        if let Some(invitation) = self.invitations.get_mut(id) {
            invitation.status = status;
            self.dirty.invitations.insert(id.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Agent, EngineConfig, Position};

    fn kernel() -> Kernel {
        let mut k = Kernel::new(EngineConfig::default());
        k.insert_agent(Agent::new("Ash", "model-a", Position::new(5, 5)));
        k.insert_agent(Agent::new("Briar", "model-a", Position::new(6, 5)));
        k.insert_agent(Agent::new("Cedar", "model-a", Position::new(7, 5)));
        k
    }

    #[test]
    fn accept_creates_conversation_with_both_participants() {
        let mut k = kernel();
        k.create_invitation("Ash", "Briar", Privacy::Public, 1);

        let outcome = k.accept_invitation("Briar", 3).expect("accepted");
        assert!(outcome.started);

        let conversation = k.conversation(&outcome.conversation_id).expect("exists");
        assert_eq!(conversation.active_participants().count(), 2);
        assert!(conversation.has_active_participant("Ash"));
        assert!(conversation.has_active_participant("Briar"));
        assert_eq!(conversation.started_tick, 3);
    }

    #[test]
    fn accept_joins_inviters_existing_public_conversation() {
        let mut k = kernel();
        k.create_invitation("Ash", "Briar", Privacy::Public, 1);
        k.accept_invitation("Briar", 2).expect("first accept");

        k.create_invitation("Ash", "Cedar", Privacy::Public, 2);
        let outcome = k.accept_invitation("Cedar", 3).expect("second accept");
        assert!(!outcome.started);

        let conversation = k.conversation(&outcome.conversation_id).expect("exists");
        assert_eq!(conversation.active_participants().count(), 3);
    }

    #[test]
    fn stale_private_invitation_cannot_be_accepted() {
        let mut k = kernel();
        // Ash ends up in a private conversation with Cedar first.
        k.create_invitation("Ash", "Cedar", Privacy::Private, 1);
        k.accept_invitation("Cedar", 2).expect("cedar accept");

        k.create_invitation("Ash", "Briar", Privacy::Private, 1);
        // The outstanding invite to Briar is now stale.
        assert!(k.accept_invitation("Briar", 3).is_none());
        assert!(!k.is_in_conversation("Briar"));
    }

    #[test]
    fn invitations_retire_rather_than_disappear() {
        let mut k = kernel();
        let id = k.create_invitation("Ash", "Briar", Privacy::Public, 1);
        k.decline_invitation("Briar").expect("declined");

        let invitation = k.invitations().get(&id).expect("still stored");
        assert_eq!(invitation.status, InvitationStatus::Declined);
        assert!(k.pending_invitation_for("Briar").is_none());
    }

    #[test]
    fn expiry_respects_the_response_window() {
        let mut k = kernel();
        let id = k.create_invitation("Ash", "Briar", Privacy::Public, 1);

        // Ticks 2 and 3 are still inside the window.
        assert!(k.expire_invitations(2).is_empty());
        assert!(k.expire_invitations(3).is_empty());

        let expired = k.expire_invitations(4);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, id);
        assert_eq!(
            k.invitations().get(&id).expect("stored").status,
            InvitationStatus::Expired
        );
    }

    #[test]
    fn conversation_ends_when_last_participant_leaves() {
        let mut k = kernel();
        k.create_invitation("Ash", "Briar", Privacy::Public, 1);
        let outcome = k.accept_invitation("Briar", 2).expect("accepted");

        let (_, ended) = k.leave_conversation("Ash", 3).expect("ash leaves");
        assert!(!ended);
        let (_, ended) = k.leave_conversation("Briar", 3).expect("briar leaves");
        assert!(ended);

        let conversation = k.conversation(&outcome.conversation_id).expect("exists");
        assert_eq!(conversation.ended_tick, Some(3));
        // Ended conversations never reopen.
        k.add_participant(&outcome.conversation_id, "Cedar", 4);
        assert!(!k.is_in_conversation("Cedar"));
    }

    #[test]
    fn unseen_turns_reset_when_context_is_taken() {
        let mut k = kernel();
        k.create_invitation("Ash", "Briar", Privacy::Public, 1);
        k.accept_invitation("Briar", 2).expect("accepted");
        k.add_turn("Ash", "hello there", 3).expect("spoken");

        let (_, unseen, others) = k.take_conversation_context("Briar", 3).expect("context");
        assert_eq!(unseen.len(), 1);
        assert_eq!(others, vec!["Ash".to_string()]);

        let (_, unseen, _) = k.take_conversation_context("Briar", 4).expect("context");
        assert!(unseen.is_empty());
    }

    #[test]
    fn agent_sits_in_at_most_one_active_conversation() {
        let mut k = kernel();
        k.create_invitation("Ash", "Briar", Privacy::Public, 1);
        k.accept_invitation("Briar", 2).expect("accepted");

        let first = k.conversation_for_agent("Ash").expect("active").id.clone();
        k.end_conversation(&first, 5);
        assert!(k.conversation_for_agent("Ash").is_none());
    }
}
