use std::collections::{BTreeMap, BTreeSet};

mod actions;
mod agents;
mod conversations;
mod step;
mod world;

pub use agents::{DistanceBucket, JourneyPlanError, SensedAgent};
pub use conversations::AcceptOutcome;

use contracts::{
    Agent, AgentName, Cell, Conversation, ConversationId, EngineConfig, Invitation, InvitationId,
    ObjectId, Position, Structure, Terrain, TimeOfDay, Weather, WorldMeta, WorldObject,
};

use crate::crafting::RecipeBook;

/// Entities touched since the last commit. The storage layer persists
/// exactly these and clears the set when the transaction lands.
#[derive(Debug, Clone, Default)]
pub struct DirtyState {
    pub meta: bool,
    pub cells: BTreeSet<Position>,
    pub agents: BTreeSet<AgentName>,
    pub objects: BTreeSet<ObjectId>,
    pub removed_objects: BTreeSet<ObjectId>,
    pub named_places: BTreeSet<String>,
    pub structures: BTreeSet<ObjectId>,
    pub removed_structures: BTreeSet<ObjectId>,
    pub conversations: BTreeSet<ConversationId>,
    pub invitations: BTreeSet<InvitationId>,
}

impl DirtyState {
    pub fn is_empty(&self) -> bool {
        !self.meta
            && self.cells.is_empty()
            && self.agents.is_empty()
            && self.objects.is_empty()
            && self.removed_objects.is_empty()
            && self.named_places.is_empty()
            && self.structures.is_empty()
            && self.removed_structures.is_empty()
            && self.conversations.is_empty()
            && self.invitations.is_empty()
    }
}

/// The single-writer simulation kernel. Owns all world state; the services
/// are `impl Kernel` modules (world, agents, conversations, actions, step)
/// and storage only sees the dirty delta at commit time.
#[derive(Debug)]
pub struct Kernel {
    config: EngineConfig,
    meta: WorldMeta,
    cells: BTreeMap<Position, Cell>,
    objects: BTreeMap<ObjectId, WorldObject>,
    agents: BTreeMap<AgentName, Agent>,
    named_places: BTreeMap<String, Position>,
    structures: BTreeMap<ObjectId, Structure>,
    conversations: BTreeMap<ConversationId, Conversation>,
    invitations: BTreeMap<InvitationId, Invitation>,
    recipes: RecipeBook,
    next_object_id: u64,
    next_conversation_id: u64,
    next_invitation_id: u64,
    dirty: DirtyState,
}

impl Kernel {
    pub fn new(config: EngineConfig) -> Self {
        let meta = WorldMeta {
            tick: 0,
            width: config.world_width,
            height: config.world_height,
            weather: Weather::Clear,
            next_event_seq: 1,
        };
        Self {
            config,
            meta,
            cells: BTreeMap::new(),
            objects: BTreeMap::new(),
            agents: BTreeMap::new(),
            named_places: BTreeMap::new(),
            structures: BTreeMap::new(),
            conversations: BTreeMap::new(),
            invitations: BTreeMap::new(),
            recipes: RecipeBook::builtin(),
            next_object_id: 1,
            next_conversation_id: 1,
            next_invitation_id: 1,
            dirty: DirtyState::default(),
        }
    }

    /// Rebuilds a kernel from persisted state. Id counters continue from the
    /// stored values so restart never reuses an id.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        config: EngineConfig,
        meta: WorldMeta,
        cells: BTreeMap<Position, Cell>,
        objects: BTreeMap<ObjectId, WorldObject>,
        agents: BTreeMap<AgentName, Agent>,
        named_places: BTreeMap<String, Position>,
        structures: BTreeMap<ObjectId, Structure>,
        conversations: BTreeMap<ConversationId, Conversation>,
        invitations: BTreeMap<InvitationId, Invitation>,
        next_object_id: u64,
        next_conversation_id: u64,
        next_invitation_id: u64,
    ) -> Self {
        Self {
            config,
            meta,
            cells,
            objects,
            agents,
            named_places,
            structures,
            conversations,
            invitations,
            recipes: RecipeBook::builtin(),
            next_object_id,
            next_conversation_id,
            next_invitation_id,
            dirty: DirtyState::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn meta(&self) -> &WorldMeta {
        &self.meta
    }

    pub fn tick(&self) -> u64 {
        self.meta.tick
    }

    pub fn time_of_day(&self) -> TimeOfDay {
        self.meta.time_of_day()
    }

    pub fn weather(&self) -> Weather {
        self.meta.weather
    }

    pub fn recipes(&self) -> &RecipeBook {
        &self.recipes
    }

    pub fn cells(&self) -> &BTreeMap<Position, Cell> {
        &self.cells
    }

    pub fn objects(&self) -> &BTreeMap<ObjectId, WorldObject> {
        &self.objects
    }

    pub fn agents(&self) -> &BTreeMap<AgentName, Agent> {
        &self.agents
    }

    pub fn named_places(&self) -> &BTreeMap<String, Position> {
        &self.named_places
    }

    pub fn structures(&self) -> &BTreeMap<ObjectId, Structure> {
        &self.structures
    }

    pub fn conversations(&self) -> &BTreeMap<ConversationId, Conversation> {
        &self.conversations
    }

    pub fn invitations(&self) -> &BTreeMap<InvitationId, Invitation> {
        &self.invitations
    }

    pub fn id_counters(&self) -> (u64, u64, u64) {
        (
            self.next_object_id,
            self.next_conversation_id,
            self.next_invitation_id,
        )
    }

    pub fn dirty(&self) -> &DirtyState {
        &self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = DirtyState::default();
    }

    /// Marks every entity dirty so the next commit writes the full state.
    /// Used when bootstrapping a fresh database.
    pub fn mark_all_dirty(&mut self) {
        self.dirty.meta = true;
        self.dirty.cells = self.cells.keys().copied().collect();
        self.dirty.agents = self.agents.keys().cloned().collect();
        self.dirty.objects = self.objects.keys().cloned().collect();
        self.dirty.named_places = self.named_places.keys().cloned().collect();
        self.dirty.structures = self.structures.keys().cloned().collect();
        self.dirty.conversations = self.conversations.keys().cloned().collect();
        self.dirty.invitations = self.invitations.keys().cloned().collect();
    }

    pub fn set_weather_internal(&mut self, weather: Weather) {
        self.meta.weather = weather;
        self.dirty.meta = true;
    }

    pub(crate) fn advance_tick(&mut self) -> u64 {
        self.meta.tick += 1;
        self.dirty.meta = true;
        self.meta.tick
    }

    /// Assigns the next run-global event sequence number.
    pub fn next_seq(&mut self) -> u64 {
        let seq = self.meta.next_event_seq;
        self.meta.next_event_seq += 1;
        self.dirty.meta = true;
        seq
    }

    pub(crate) fn mint_object_id(&mut self) -> ObjectId {
        let id = format!("obj_{:06}", self.next_object_id);
        self.next_object_id += 1;
        self.dirty.meta = true;
        id
    }

    pub(crate) fn mint_conversation_id(&mut self) -> ConversationId {
        let id = format!("conv_{:06}", self.next_conversation_id);
        self.next_conversation_id += 1;
        self.dirty.meta = true;
        id
    }

    pub(crate) fn mint_invitation_id(&mut self) -> InvitationId {
        let id = format!("inv_{:06}", self.next_invitation_id);
        self.next_invitation_id += 1;
        self.dirty.meta = true;
        id
    }

    /// Seeds terrain for a fresh world. Only non-default cells are stored.
    pub fn seed_terrain(&mut self, terrain: impl IntoIterator<Item = (Position, Terrain)>) {
        for (position, kind) in terrain {
            if !position.in_bounds(self.meta.width, self.meta.height) {
                continue;
            }
            if kind == Terrain::Grass {
                continue;
            }
            self.cells.insert(position, Cell::with_terrain(kind));
            self.dirty.cells.insert(position);
        }
    }

    pub fn insert_agent(&mut self, agent: Agent) {
        self.dirty.agents.insert(agent.name.clone());
        self.agents.insert(agent.name.clone(), agent);
    }
}
