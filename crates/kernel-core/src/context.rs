use std::collections::{BTreeMap, BTreeSet};

use contracts::{Action, AgentName, Event, EventKind, TimeOfDay, Weather};

/// Outcome of one agent's turn, kept for auditing and session persistence.
#[derive(Debug, Clone, Default)]
pub struct TurnResult {
    pub actions: Vec<Action>,
    pub narrations: Vec<String>,
    pub session_id: Option<String>,
    /// Set when the turn produced no actions for a reason worth logging
    /// (deadline, reasoner error, observer skip).
    pub skipped: Option<String>,
}

/// State carrier threaded through the tick phases. Phases append to it;
/// durable world state lives in the kernel and is persisted at commit.
#[derive(Debug, Clone)]
pub struct TickContext {
    pub tick: u64,
    pub time_of_day: TimeOfDay,
    pub weather: Weather,
    pub woke: BTreeSet<AgentName>,
    pub acting: BTreeSet<AgentName>,
    pub clusters: Vec<Vec<AgentName>>,
    pub events: Vec<Event>,
    pub turn_results: BTreeMap<AgentName, TurnResult>,
}

impl TickContext {
    pub fn new(tick: u64, weather: Weather) -> Self {
        Self {
            tick,
            time_of_day: TimeOfDay::from_tick(tick),
            weather,
            woke: BTreeSet::new(),
            acting: BTreeSet::new(),
            clusters: Vec::new(),
            events: Vec::new(),
            turn_results: BTreeMap::new(),
        }
    }

    pub fn push_event(&mut self, kind: EventKind) {
        self.events.push(Event::unsequenced(self.tick, kind));
    }

    pub fn extend_events(&mut self, events: impl IntoIterator<Item = Event>) {
        self.events.extend(events);
    }
}
