use serde::{Deserialize, Serialize};

use contracts::{
    AgentName, ConversationId, ConversationTurn, EventKind, ObjectKind, Position, Rect, TimeOfDay,
    Weather,
};

use crate::context::TickContext;
use crate::kernel::Kernel;

/// Structured perception handed to the reasoner each turn. Everything the
/// agent can know this tick, nothing it cannot: the grid view is clamped to
/// the world bounds and to the effective (night-adjusted) vision radius.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Perception {
    pub tick: u64,
    pub time_of_day: TimeOfDay,
    pub weather: Weather,
    pub position: Position,
    pub grid: Vec<String>,
    pub cells: Vec<PerceivedCell>,
    pub visible_agents: Vec<PerceivedAgent>,
    pub inventory: String,
    #[serde(default)]
    pub journey: Option<String>,
    #[serde(default)]
    pub conversation: Option<ConversationView>,
    #[serde(default)]
    pub pending_invitation: Option<InvitationView>,
    #[serde(default)]
    pub dream: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerceivedCell {
    pub position: Position,
    pub terrain: String,
    #[serde(default)]
    pub walls: Vec<String>,
    #[serde(default)]
    pub doors: Vec<String>,
    #[serde(default)]
    pub place_name: Option<String>,
    #[serde(default)]
    pub objects: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerceivedAgent {
    pub name: AgentName,
    pub position: Position,
    pub sleeping: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationView {
    pub conversation_id: ConversationId,
    pub other_participants: Vec<AgentName>,
    pub unseen_turns: Vec<ConversationTurn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationView {
    pub inviter: AgentName,
    pub privacy: String,
    pub expires_at_tick: u64,
}

impl Kernel {
    /// Builds the agent's perception for this tick. Recording the meeting
    /// ledger is a deliberate side effect: every agent visible here becomes
    /// permanently known to both sides.
    pub fn build_perception(&mut self, agent_name: &str, ctx: &mut TickContext) -> Option<Perception> {
        let agent = self.agent(agent_name)?.clone();
        let radius = self.config().effective_vision_radius(ctx.time_of_day);
        let rect = Rect::around(agent.position, radius)
            .clamp(self.meta().width, self.meta().height);

        let visible: Vec<PerceivedAgent> = self
            .agents_within(agent.position, radius, agent_name)
            .into_iter()
            .map(|other| PerceivedAgent {
                name: other.name.clone(),
                position: other.position,
                sleeping: other.sleeping,
            })
            .collect();

        for other in &visible {
            if self.record_meeting(agent_name, &other.name) {
                ctx.push_event(EventKind::AgentsMet {
                    agent: agent_name.to_string(),
                    other: other.name.clone(),
                });
            }
        }

        let cells: Vec<PerceivedCell> = self
            .cells_in_rect(rect)
            .into_iter()
            .map(|(position, cell)| PerceivedCell {
                position,
                terrain: cell.terrain.as_str().to_string(),
                walls: cell.walls.iter().map(|d| d.as_str().to_string()).collect(),
                doors: cell.doors.iter().map(|d| d.as_str().to_string()).collect(),
                place_name: cell.place_name.clone(),
                objects: self
                    .objects_at(position)
                    .into_iter()
                    .map(|object| match &object.kind {
                        ObjectKind::Sign { .. } => "sign".to_string(),
                        ObjectKind::PlacedItem { item_kind, .. } => item_kind.clone(),
                    })
                    .collect(),
            })
            .collect();

        let grid = render_grid(&agent.position, &cells, &visible, rect);

        let journey = agent.journey.as_ref().map(|journey| {
            format!(
                "Traveling to ({}, {}), {} steps remaining.",
                journey.destination.x,
                journey.destination.y,
                journey.remaining_steps()
            )
        });

        let conversation = self
            .take_conversation_context(agent_name, ctx.tick)
            .map(|(conversation_id, unseen_turns, other_participants)| ConversationView {
                conversation_id,
                other_participants,
                unseen_turns,
            });

        let pending_invitation = self.pending_invitation_for(agent_name).map(|invitation| {
            InvitationView {
                inviter: invitation.inviter.clone(),
                privacy: invitation.privacy.as_str().to_string(),
                expires_at_tick: invitation.expires_at_tick,
            }
        });

        let dream = self.take_dream(agent_name);

        Some(Perception {
            tick: ctx.tick,
            time_of_day: ctx.time_of_day,
            weather: ctx.weather,
            position: agent.position,
            grid,
            cells,
            visible_agents: visible,
            inventory: agent.inventory.summary(),
            journey,
            conversation,
            pending_invitation,
            dream,
        })
    }
}

/// Plain character rows of the visible rect: terrain symbols, `@` for the
/// seer, `A` for other agents, `*` for objects.
fn render_grid(
    center: &Position,
    cells: &[PerceivedCell],
    agents: &[PerceivedAgent],
    rect: Rect,
) -> Vec<String> {
    let width = (rect.max_x - rect.min_x + 1).max(0) as usize;
    let height = (rect.max_y - rect.min_y + 1).max(0) as usize;
    let mut rows = vec![vec![' '; width]; height];

    for cell in cells {
        let col = (cell.position.x - rect.min_x) as usize;
        let row = (cell.position.y - rect.min_y) as usize;
        if row < height && col < width {
            rows[row][col] = if cell.objects.is_empty() {
                terrain_symbol(&cell.terrain)
            } else {
                '*'
            };
        }
    }
    for agent in agents {
        let col = (agent.position.x - rect.min_x) as usize;
        let row = (agent.position.y - rect.min_y) as usize;
        if row < height && col < width {
            rows[row][col] = 'A';
        }
    }
    let col = (center.x - rect.min_x) as usize;
    let row = (center.y - rect.min_y) as usize;
    if row < height && col < width {
        rows[row][col] = '@';
    }

    rows.into_iter().map(|row| row.into_iter().collect()).collect()
}

fn terrain_symbol(terrain: &str) -> char {
    match terrain {
        "grass" => '.',
        "water" => '~',
        "coast" => ',',
        "sand" => ':',
        "stone" => '^',
        "forest" => 'T',
        "hill" => 'n',
        _ => '?',
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Agent, EngineConfig, Terrain};

    fn kernel_with(agents: &[(&str, i32, i32)]) -> Kernel {
        let mut k = Kernel::new(EngineConfig {
            world_width: 30,
            world_height: 30,
            ..EngineConfig::default()
        });
        for (name, x, y) in agents {
            k.insert_agent(Agent::new(*name, "model-a", Position::new(*x, *y)));
        }
        k
    }

    #[test]
    fn perception_clamps_to_world_edges() {
        let mut k = kernel_with(&[("Ash", 0, 0)]);
        let mut ctx = k.begin_tick();
        let perception = k.build_perception("Ash", &mut ctx).expect("perception");

        // Radius 3 around the corner clamps to a 4x4 view.
        assert_eq!(perception.cells.len(), 16);
        assert!(perception
            .cells
            .iter()
            .all(|cell| cell.position.x >= 0 && cell.position.y >= 0));
        assert_eq!(perception.grid.len(), 4);
    }

    #[test]
    fn perception_records_meetings_symmetrically() {
        let mut k = kernel_with(&[("Ash", 5, 5), ("Briar", 6, 5)]);
        let mut ctx = k.begin_tick();
        let perception = k.build_perception("Ash", &mut ctx).expect("perception");

        assert_eq!(perception.visible_agents.len(), 1);
        assert!(k.agent("Ash").expect("ash").knows("Briar"));
        assert!(k.agent("Briar").expect("briar").knows("Ash"));
        assert!(ctx
            .events
            .iter()
            .any(|event| matches!(event.kind, EventKind::AgentsMet { .. })));
    }

    #[test]
    fn night_vision_narrows_the_view() {
        let mut k = kernel_with(&[("Ash", 10, 10), ("Briar", 13, 10)]);
        let mut ctx = k.begin_tick();
        ctx.time_of_day = TimeOfDay::Night;
        let perception = k.build_perception("Ash", &mut ctx).expect("perception");

        // Effective radius 1 at night: 3x3 view, Briar out of sight.
        assert_eq!(perception.cells.len(), 9);
        assert!(perception.visible_agents.is_empty());
    }

    #[test]
    fn grid_marks_seer_terrain_and_objects() {
        let mut k = kernel_with(&[("Ash", 10, 10)]);
        k.seed_terrain([(Position::new(11, 10), Terrain::Forest)]);
        let mut ctx = k.begin_tick();
        let perception = k.build_perception("Ash", &mut ctx).expect("perception");

        let center_row = &perception.grid[3];
        assert_eq!(center_row.chars().nth(3), Some('@'));
        assert_eq!(center_row.chars().nth(4), Some('T'));
    }

    #[test]
    fn dream_is_delivered_exactly_once() {
        let mut k = kernel_with(&[("Ash", 5, 5)]);
        k.set_dream("Ash", "a pale tower by the sea".to_string());

        let mut ctx = k.begin_tick();
        let first = k.build_perception("Ash", &mut ctx).expect("perception");
        assert_eq!(first.dream.as_deref(), Some("a pale tower by the sea"));

        let second = k.build_perception("Ash", &mut ctx).expect("perception");
        assert!(second.dream.is_none());
    }
}
