use contracts::{Agent, AgentName, CompassOctant, Item, Journey, Position};

use super::Kernel;
use crate::pathfind::astar_path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensedAgent {
    pub name: AgentName,
    pub direction: Option<CompassOctant>,
    pub distance: DistanceBucket,
}

/// Coarse Chebyshev distance buckets for presence sensing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceBucket {
    Nearby,
    Far,
    VeryFar,
}

impl DistanceBucket {
    pub fn from_distance(distance: i32) -> Self {
        if distance <= 10 {
            Self::Nearby
        } else if distance <= 30 {
            Self::Far
        } else {
            Self::VeryFar
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nearby => "nearby",
            Self::Far => "far",
            Self::VeryFar => "very_far",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JourneyPlanError {
    AlreadyThere,
    Unreachable,
}

impl Kernel {
    pub fn agent(&self, name: &str) -> Option<&Agent> {
        self.agents.get(name)
    }

    pub(crate) fn agent_mut(&mut self, name: &str) -> Option<&mut Agent> {
        if let Some(agent) = self.agents.get_mut(name) {
            self.dirty.agents.insert(agent.name.clone());
            Some(agent)
        } else {
            None
        }
    }

    pub fn agents_at(&self, position: Position) -> Vec<&Agent> {
        self.agents
            .values()
            .filter(|agent| agent.position == position)
            .collect()
    }

    /// Agents within a Chebyshev radius of a position, excluding `except`.
    pub fn agents_within(&self, position: Position, radius: i32, except: &str) -> Vec<&Agent> {
        self.agents
            .values()
            .filter(|agent| {
                agent.name != except && agent.position.chebyshev_distance(position) <= radius
            })
            .collect()
    }

    pub(crate) fn update_position(&mut self, name: &str, position: Position) {
        if let Some(agent) = self.agent_mut(name) {
            agent.position = position;
        }
    }

    pub(crate) fn set_sleeping(&mut self, name: &str, sleeping: bool) {
        if let Some(agent) = self.agent_mut(name) {
            agent.sleeping = sleeping;
        }
    }

    pub(crate) fn set_session(&mut self, name: &str, session_id: String, tick: u64) {
        if let Some(agent) = self.agent_mut(name) {
            agent.session_id = Some(session_id);
            agent.last_turn_tick = tick;
        }
    }

    pub fn set_dream(&mut self, name: &str, text: String) {
        if let Some(agent) = self.agent_mut(name) {
            agent.pending_dream = Some(text);
        }
    }

    pub(crate) fn take_dream(&mut self, name: &str) -> Option<String> {
        self.agent_mut(name).and_then(|agent| agent.pending_dream.take())
    }

    /// Symmetric, monotone meeting ledger: once co-visible, always known.
    /// Returns true when the pair was new.
    pub(crate) fn record_meeting(&mut self, a: &str, b: &str) -> bool {
        if a == b {
            return false;
        }
        let already = self
            .agents
            .get(a)
            .map(|agent| agent.knows(b))
            .unwrap_or(true);
        if already {
            return false;
        }
        if let Some(agent) = self.agent_mut(a) {
            agent.known_agents.insert(b.to_string());
        }
        if let Some(agent) = self.agent_mut(b) {
            agent.known_agents.insert(a.to_string());
        }
        true
    }

    /// Categorical presence sensing over the meeting ledger. Unknown agents
    /// are omitted; sleeping agents do not register.
    pub fn sense_others(&self, name: &str) -> Vec<SensedAgent> {
        let Some(agent) = self.agents.get(name) else {
            return Vec::new();
        };

        agent
            .known_agents
            .iter()
            .filter_map(|other_name| {
                let other = self.agents.get(other_name)?;
                if other.sleeping {
                    return None;
                }
                let distance = agent.position.chebyshev_distance(other.position);
                Some(SensedAgent {
                    name: other_name.clone(),
                    direction: agent.position.compass_to(other.position),
                    distance: DistanceBucket::from_distance(distance),
                })
            })
            .collect()
    }

    /// Plans a journey with A* and puts the agent in trance. `path[0]` is the
    /// agent's current cell.
    pub(crate) fn start_journey(
        &mut self,
        name: &str,
        destination: Position,
    ) -> Result<usize, JourneyPlanError> {
        let Some(agent) = self.agents.get(name) else {
            return Err(JourneyPlanError::Unreachable);
        };
        let start = agent.position;
        if start == destination {
            return Err(JourneyPlanError::AlreadyThere);
        }

        let path = astar_path(start, destination, |from, direction| {
            self.can_step(from, direction)
        })
        .ok_or(JourneyPlanError::Unreachable)?;

        let steps = path.len() - 1;
        if let Some(agent) = self.agent_mut(name) {
            agent.journey = Some(Journey::new(destination, path));
        }
        Ok(steps)
    }

    /// Advances one step along the journey path. Returns the new position
    /// and whether the agent arrived (the journey clears on arrival).
    pub(crate) fn advance_journey(&mut self, name: &str) -> Option<(Position, bool)> {
        let journey = self.agents.get(name)?.journey.clone()?;
        let next = journey.next_position()?;

        let agent = self.agent_mut(name)?;
        agent.position = next;
        let journey = agent.journey.as_mut()?;
        journey.progress += 1;
        let arrived = journey.is_complete();
        if arrived {
            agent.journey = None;
        }
        Some((next, arrived))
    }

    /// Clears the journey; the agent stays where it is.
    pub(crate) fn interrupt_journey(&mut self, name: &str) {
        if let Some(agent) = self.agent_mut(name) {
            agent.journey = None;
        }
    }

    pub fn add_resource(&mut self, name: &str, kind: &str, quantity: u32) {
        if let Some(agent) = self.agent_mut(name) {
            agent.inventory.add_resource(kind, quantity);
        }
    }

    pub(crate) fn remove_resource(&mut self, name: &str, kind: &str, quantity: u32) -> bool {
        self.agent_mut(name)
            .map(|agent| agent.inventory.remove_resource(kind, quantity))
            .unwrap_or(false)
    }

    pub(crate) fn add_item(&mut self, name: &str, item: Item) {
        if let Some(agent) = self.agent_mut(name) {
            agent.inventory.add_item(item);
        }
    }

    pub(crate) fn remove_item(&mut self, name: &str, item_id: &str) -> Option<Item> {
        self.agent_mut(name)
            .and_then(|agent| agent.inventory.remove_item(item_id))
    }
}
