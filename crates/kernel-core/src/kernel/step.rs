use std::collections::BTreeMap;

use contracts::{AgentName, EventKind, TimeOfDay};

use super::Kernel;
use crate::context::TickContext;
use crate::scheduler::Scheduler;

impl Kernel {
    /// Phase 0: advance the tick counter and open a fresh context.
    pub fn begin_tick(&mut self) -> TickContext {
        let tick = self.advance_tick();
        TickContext::new(tick, self.weather())
    }

    /// Phase 1: retire pending invitations whose response window has passed.
    pub fn phase_invitation_expiry(&mut self, ctx: &mut TickContext) {
        for invitation in self.expire_invitations(ctx.tick) {
            ctx.push_event(EventKind::InvitationExpired {
                invitation_id: invitation.id,
                inviter: invitation.inviter,
                invitee: invitation.invitee,
            });
        }
    }

    /// Phase 2: wake sleeping agents on the morning transition or when
    /// another agent stands in their cell.
    pub fn phase_wake(&mut self, ctx: &mut TickContext) {
        let mut to_wake: Vec<(AgentName, &'static str)> = Vec::new();

        for (name, agent) in self.agents.iter() {
            if !agent.sleeping {
                continue;
            }
            if ctx.time_of_day == TimeOfDay::Morning {
                to_wake.push((name.clone(), "morning"));
                continue;
            }
            let visited = self
                .agents
                .values()
                .any(|other| other.name != *name && other.position == agent.position);
            if visited {
                to_wake.push((name.clone(), "visitor"));
            }
        }

        for (name, reason) in to_wake {
            let position = match self.agent(&name) {
                Some(agent) => agent.position,
                None => continue,
            };
            self.set_sleeping(&name, false);
            ctx.woke.insert(name.clone());
            ctx.push_event(EventKind::AgentWoke {
                agent: name,
                at: position,
                reason: reason.to_string(),
            });
        }
    }

    /// Phase 3: compute the acting set and its clusters. Awake agents act;
    /// journeying agents sit in trance unless an observer force ends it.
    /// Skip counters consume a turn without acting.
    pub fn phase_schedule(&mut self, ctx: &mut TickContext, scheduler: &mut Scheduler) {
        let forced = scheduler.forced().cloned();

        let mut acting: BTreeMap<AgentName, &contracts::Agent> = BTreeMap::new();
        for (name, agent) in self.agents.iter() {
            if agent.sleeping {
                continue;
            }
            let force_ends_trance = forced.as_deref() == Some(name.as_str());
            if agent.is_journeying() && !force_ends_trance {
                continue;
            }
            acting.insert(name.clone(), agent);
        }

        let mut skipped: Vec<AgentName> = Vec::new();
        for name in acting.keys() {
            if scheduler.consume_skip(name) {
                skipped.push(name.clone());
            }
        }
        for name in &skipped {
            acting.remove(name);
        }

        let radius = self.config.cluster_radius(ctx.time_of_day);
        ctx.clusters = scheduler.compute_clusters(&acting, radius);
        ctx.acting = acting.into_keys().collect();

        for name in skipped {
            let result = ctx.turn_results.entry(name).or_default();
            result.skipped = Some("observer_skip".to_string());
        }
    }

    /// Phase 4: advance journeys one step, then check the interrupt
    /// conditions: a forced turn, a blocked next step, another agent in
    /// vision from the new cell, or arrival.
    pub fn phase_movement(&mut self, ctx: &mut TickContext, scheduler: &mut Scheduler) {
        if let Some(forced) = scheduler.take_forced() {
            let forced_position = self
                .agent(&forced)
                .filter(|agent| agent.is_journeying())
                .map(|agent| agent.position);
            if let Some(position) = forced_position {
                self.interrupt_journey(&forced);
                ctx.push_event(EventKind::JourneyInterrupted {
                    agent: forced,
                    reason: "observer_forced".to_string(),
                    at: position,
                });
            }
        }

        let travelers: Vec<AgentName> = self
            .agents
            .values()
            .filter(|agent| agent.is_journeying())
            .map(|agent| agent.name.clone())
            .collect();
        let radius = self.config.effective_vision_radius(ctx.time_of_day);

        for name in travelers {
            let Some(agent) = self.agent(&name) else {
                continue;
            };
            let position = agent.position;
            let destination = agent.journey.as_ref().map(|journey| journey.destination);
            let next = agent.journey.as_ref().and_then(|journey| journey.next_position());

            // A wall raised since planning invalidates the path.
            let step_open = match next {
                Some(next) => position
                    .direction_to(next)
                    .map(|direction| self.can_step(position, direction))
                    .unwrap_or(false),
                None => false,
            };
            if !step_open {
                self.interrupt_journey(&name);
                ctx.push_event(EventKind::JourneyInterrupted {
                    agent: name,
                    reason: "path_blocked".to_string(),
                    at: position,
                });
                continue;
            }

            let Some((new_position, arrived)) = self.advance_journey(&name) else {
                continue;
            };
            ctx.push_event(EventKind::AgentMoved {
                agent: name.clone(),
                from: position,
                to: new_position,
            });

            if arrived {
                if let Some(destination) = destination {
                    ctx.push_event(EventKind::JourneyArrived {
                        agent: name.clone(),
                        destination,
                    });
                }
                continue;
            }

            // Another agent visible from the new cell breaks the trance.
            if !self.agents_within(new_position, radius, &name).is_empty() {
                self.interrupt_journey(&name);
                ctx.push_event(EventKind::JourneyInterrupted {
                    agent: name,
                    reason: "encountered_agent".to_string(),
                    at: new_position,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Agent, EngineConfig, Position};

    fn kernel_with(agents: &[(&str, i32, i32)]) -> Kernel {
        let mut k = Kernel::new(EngineConfig {
            world_width: 60,
            world_height: 60,
            ..EngineConfig::default()
        });
        for (name, x, y) in agents {
            k.insert_agent(Agent::new(*name, "model-a", Position::new(*x, *y)));
        }
        k
    }

    #[test]
    fn morning_wakes_every_sleeper() {
        let mut k = kernel_with(&[("Ash", 5, 5), ("Briar", 30, 30)]);
        k.set_sleeping("Ash", true);
        k.set_sleeping("Briar", true);

        // Ticks run 1, 2, 3 (night), then 4 is the morning transition.
        for _ in 0..3 {
            let mut ctx = k.begin_tick();
            k.phase_wake(&mut ctx);
            assert!(ctx.woke.is_empty());
        }

        let mut ctx = k.begin_tick();
        assert_eq!(ctx.time_of_day, TimeOfDay::Morning);
        k.phase_wake(&mut ctx);
        assert_eq!(ctx.woke.len(), 2);
        assert!(!k.agent("Ash").expect("ash").sleeping);
    }

    #[test]
    fn visitor_in_cell_wakes_sleeper() {
        let mut k = kernel_with(&[("Ash", 5, 5), ("Briar", 5, 5)]);
        k.set_sleeping("Ash", true);

        let mut ctx = k.begin_tick();
        assert_ne!(ctx.time_of_day, TimeOfDay::Morning);
        k.phase_wake(&mut ctx);
        assert!(ctx.woke.contains("Ash"));
        assert!(ctx
            .events
            .iter()
            .any(|event| matches!(&event.kind, EventKind::AgentWoke { reason, .. } if reason == "visitor")));
    }

    #[test]
    fn journeying_agents_sit_out_the_schedule() {
        let mut k = kernel_with(&[("Ash", 5, 5), ("Briar", 30, 30)]);
        k.start_journey("Ash", Position::new(20, 5)).expect("path");

        let mut scheduler = Scheduler::new();
        let mut ctx = k.begin_tick();
        k.phase_schedule(&mut ctx, &mut scheduler);

        assert!(!ctx.acting.contains("Ash"));
        assert!(ctx.acting.contains("Briar"));
    }

    #[test]
    fn force_turn_overrides_trance() {
        let mut k = kernel_with(&[("Ash", 5, 5)]);
        k.start_journey("Ash", Position::new(20, 5)).expect("path");

        let mut scheduler = Scheduler::new();
        scheduler.force_next("Ash".to_string());

        let mut ctx = k.begin_tick();
        k.phase_schedule(&mut ctx, &mut scheduler);
        assert!(ctx.acting.contains("Ash"));

        k.phase_movement(&mut ctx, &mut scheduler);
        assert!(k.agent("Ash").expect("ash").journey.is_none());
        assert!(ctx.events.iter().any(|event| matches!(
            &event.kind,
            EventKind::JourneyInterrupted { reason, .. } if reason == "observer_forced"
        )));
    }

    #[test]
    fn movement_advances_one_cell_per_tick() {
        let mut k = kernel_with(&[("Ash", 5, 5)]);
        k.start_journey("Ash", Position::new(9, 5)).expect("path");

        let mut scheduler = Scheduler::new();
        for expected_x in 6..=8 {
            let mut ctx = k.begin_tick();
            k.phase_movement(&mut ctx, &mut scheduler);
            assert_eq!(
                k.agent("Ash").expect("ash").position,
                Position::new(expected_x, 5)
            );
            assert!(k.agent("Ash").expect("ash").is_journeying());
        }

        let mut ctx = k.begin_tick();
        k.phase_movement(&mut ctx, &mut scheduler);
        assert_eq!(k.agent("Ash").expect("ash").position, Position::new(9, 5));
        assert!(k.agent("Ash").expect("ash").journey.is_none());
        assert!(ctx
            .events
            .iter()
            .any(|event| matches!(event.kind, EventKind::JourneyArrived { .. })));
    }

    #[test]
    fn wall_raised_across_the_path_interrupts() {
        let mut k = kernel_with(&[("Ash", 5, 5)]);
        k.start_journey("Ash", Position::new(9, 5)).expect("path");
        // Wall across the next step's shared edge.
        k.place_wall(Position::new(5, 5), contracts::Direction::East);

        let mut scheduler = Scheduler::new();
        let mut ctx = k.begin_tick();
        k.phase_movement(&mut ctx, &mut scheduler);

        assert_eq!(k.agent("Ash").expect("ash").position, Position::new(5, 5));
        assert!(k.agent("Ash").expect("ash").journey.is_none());
        assert!(ctx.events.iter().any(|event| matches!(
            &event.kind,
            EventKind::JourneyInterrupted { reason, .. } if reason == "path_blocked"
        )));
    }

    #[test]
    fn encountering_an_agent_interrupts_after_the_step() {
        let mut k = kernel_with(&[("Ash", 5, 5), ("Briar", 8, 5)]);
        k.start_journey("Ash", Position::new(20, 5)).expect("path");

        let mut scheduler = Scheduler::new();
        let mut ctx = k.begin_tick();
        k.phase_movement(&mut ctx, &mut scheduler);

        // Ash stepped to (6,5); Briar at (8,5) is within vision radius 3.
        assert_eq!(k.agent("Ash").expect("ash").position, Position::new(6, 5));
        assert!(k.agent("Ash").expect("ash").journey.is_none());
        assert!(ctx.events.iter().any(|event| matches!(
            &event.kind,
            EventKind::JourneyInterrupted { reason, .. } if reason == "encountered_agent"
        )));
    }

    #[test]
    fn expiry_phase_emits_events_for_stale_invitations() {
        let mut k = kernel_with(&[("Ash", 5, 5), ("Briar", 6, 5)]);
        k.create_invitation("Ash", "Briar", contracts::Privacy::Public, 1);

        // Window: ticks 2 and 3 remain open; tick 4 expires.
        for _ in 0..3 {
            let mut ctx = k.begin_tick();
            k.phase_invitation_expiry(&mut ctx);
            assert!(ctx.events.is_empty());
        }
        let mut ctx = k.begin_tick();
        k.phase_invitation_expiry(&mut ctx);
        assert_eq!(ctx.events.len(), 1);
        assert!(matches!(
            ctx.events[0].kind,
            EventKind::InvitationExpired { .. }
        ));
    }
}
