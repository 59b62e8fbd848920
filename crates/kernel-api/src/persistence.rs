use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use contracts::{
    Agent, AgentName, Cell, Conversation, ConversationId, ConversationTurn, Direction,
    EngineConfig, Event, Invitation, InvitationId, InvitationStatus, Item, Journey, ObjectId,
    ObjectKind, Participant, Position, Privacy, Structure, Terrain, Weather, WorldMeta,
    WorldObject, SCHEMA_VERSION,
};
use kernel_core::Kernel;

use crate::event_log::EventLog;
use crate::StorageError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS world_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    tick INTEGER NOT NULL DEFAULT 0,
    weather TEXT NOT NULL DEFAULT 'clear',
    width INTEGER NOT NULL,
    height INTEGER NOT NULL,
    next_event_seq INTEGER NOT NULL DEFAULT 1,
    next_object_id INTEGER NOT NULL DEFAULT 1,
    next_conversation_id INTEGER NOT NULL DEFAULT 1,
    next_invitation_id INTEGER NOT NULL DEFAULT 1,
    config_json TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS cells (
    x INTEGER NOT NULL,
    y INTEGER NOT NULL,
    terrain TEXT NOT NULL DEFAULT 'grass',
    walls TEXT NOT NULL DEFAULT '[]',
    doors TEXT NOT NULL DEFAULT '[]',
    place_name TEXT,
    PRIMARY KEY (x, y)
);

CREATE TABLE IF NOT EXISTS objects (
    id TEXT PRIMARY KEY,
    object_type TEXT NOT NULL,
    x INTEGER NOT NULL,
    y INTEGER NOT NULL,
    created_by TEXT,
    created_tick INTEGER NOT NULL DEFAULT 0,
    passable INTEGER NOT NULL DEFAULT 1,
    data TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_objects_position ON objects(x, y);

CREATE TABLE IF NOT EXISTS agents (
    name TEXT PRIMARY KEY,
    model_id TEXT NOT NULL,
    personality TEXT NOT NULL DEFAULT '',
    x INTEGER NOT NULL,
    y INTEGER NOT NULL,
    is_sleeping INTEGER NOT NULL DEFAULT 0,
    session_id TEXT,
    last_turn_tick INTEGER NOT NULL DEFAULT 0,
    known_agents TEXT NOT NULL DEFAULT '[]',
    journey TEXT,
    pending_dream TEXT
);

CREATE TABLE IF NOT EXISTS inventory_stacks (
    agent TEXT NOT NULL,
    item_type TEXT NOT NULL,
    quantity INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (agent, item_type),
    FOREIGN KEY (agent) REFERENCES agents(name) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS inventory_items (
    id TEXT PRIMARY KEY,
    agent TEXT NOT NULL,
    item_type TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '[]',
    FOREIGN KEY (agent) REFERENCES agents(name) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_inventory_items_agent ON inventory_items(agent);

CREATE TABLE IF NOT EXISTS named_places (
    name TEXT PRIMARY KEY,
    x INTEGER NOT NULL,
    y INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS structures (
    id TEXT PRIMARY KEY,
    name TEXT,
    interior_cells TEXT NOT NULL,
    creators TEXT NOT NULL DEFAULT '[]',
    is_private INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    privacy TEXT NOT NULL DEFAULT 'public',
    created_by TEXT NOT NULL,
    started_tick INTEGER NOT NULL,
    ended_tick INTEGER
);

CREATE TABLE IF NOT EXISTS conversation_participants (
    conversation_id TEXT NOT NULL,
    agent TEXT NOT NULL,
    joined_tick INTEGER NOT NULL,
    left_tick INTEGER,
    last_turn_tick INTEGER,
    PRIMARY KEY (conversation_id, agent),
    FOREIGN KEY (conversation_id) REFERENCES conversations(id)
);
CREATE INDEX IF NOT EXISTS idx_conv_participants_agent ON conversation_participants(agent);

CREATE TABLE IF NOT EXISTS conversation_turns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id TEXT NOT NULL,
    speaker TEXT NOT NULL,
    message TEXT NOT NULL,
    tick INTEGER NOT NULL,
    FOREIGN KEY (conversation_id) REFERENCES conversations(id)
);
CREATE INDEX IF NOT EXISTS idx_conv_turns_conv ON conversation_turns(conversation_id);

CREATE TABLE IF NOT EXISTS conversation_invitations (
    id TEXT PRIMARY KEY,
    inviter TEXT NOT NULL,
    invitee TEXT NOT NULL,
    privacy TEXT NOT NULL DEFAULT 'public',
    created_tick INTEGER NOT NULL,
    expires_at_tick INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
);
CREATE INDEX IF NOT EXISTS idx_invitations_invitee ON conversation_invitations(invitee);
";

/// The authoritative embedded store. All writes from one tick land in a
/// single transaction together with the audit-log frames; readers use
/// SQLite's WAL multi-version path and never block the writer.
#[derive(Debug)]
pub struct SqliteWorldStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteWorldStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path.as_ref())?;
        let mut store = Self {
            conn,
            path: path.as_ref().to_path_buf(),
        };
        store.configure()?;
        store.migrate()?;
        store.verify_schema_version()?;
        Ok(store)
    }

    /// Read-only handle over the same database for observer queries; sees a
    /// consistent point-in-time view through WAL.
    pub fn open_reader(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        )?;
        let store = Self {
            conn,
            path: path.as_ref().to_path_buf(),
        };
        store.verify_schema_version()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn configure(&mut self) -> Result<(), StorageError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    fn migrate(&mut self) -> Result<(), StorageError> {
        self.conn.execute_batch(SCHEMA)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, ?2)",
            params![SCHEMA_VERSION, "initial"],
        )?;
        Ok(())
    }

    /// A database written by a different schema version is fatal to the
    /// process; there is no in-place upgrade path.
    fn verify_schema_version(&self) -> Result<(), StorageError> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .optional()?
            .flatten();
        match found {
            Some(version) if version == SCHEMA_VERSION => Ok(()),
            Some(version) => Err(StorageError::SchemaMismatch {
                found: version,
                expected: SCHEMA_VERSION,
            }),
            None => Err(StorageError::SchemaMismatch {
                found: 0,
                expected: SCHEMA_VERSION,
            }),
        }
    }

    pub fn has_world(&self) -> Result<bool, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM world_state", [], |row| row.get(0))?;
        Ok(count > 0)
    }

    /// Flushes the WAL so the main database file is self-contained before a
    /// snapshot copy.
    pub fn checkpoint(&self) -> Result<(), StorageError> {
        self.conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        Ok(())
    }

    // --- Commit ---

    /// The commit phase: assigns run-global sequence numbers, persists the
    /// kernel's dirty delta, appends the audit frames, and lands everything
    /// together. On any failure the transaction rolls back, appended frames
    /// are truncated away, and the error is surfaced; the caller restores
    /// in-memory state by reloading.
    pub fn commit_tick(
        &mut self,
        kernel: &mut Kernel,
        events: &mut [Event],
        log: &EventLog,
    ) -> Result<(), StorageError> {
        for event in events.iter_mut() {
            event.seq = kernel.next_seq();
        }

        let dirty = kernel.dirty().clone();
        let tx = self.conn.transaction()?;

        write_world_row(&tx, kernel)?;

        for position in &dirty.cells {
            match kernel.cells().get(position) {
                Some(cell) => upsert_cell(&tx, *position, cell)?,
                None => {
                    tx.execute(
                        "DELETE FROM cells WHERE x = ?1 AND y = ?2",
                        params![position.x, position.y],
                    )?;
                }
            }
        }

        for id in &dirty.removed_objects {
            tx.execute("DELETE FROM objects WHERE id = ?1", params![id])?;
        }
        for id in &dirty.objects {
            if let Some(object) = kernel.objects().get(id) {
                upsert_object(&tx, object)?;
            }
        }

        for name in &dirty.agents {
            if let Some(agent) = kernel.agents().get(name) {
                upsert_agent(&tx, agent)?;
            }
        }

        for name in &dirty.named_places {
            if let Some(position) = kernel.named_places().get(name) {
                tx.execute(
                    "INSERT INTO named_places (name, x, y) VALUES (?1, ?2, ?3)
                     ON CONFLICT(name) DO UPDATE SET x = excluded.x, y = excluded.y",
                    params![name, position.x, position.y],
                )?;
            }
        }

        for id in &dirty.removed_structures {
            tx.execute("DELETE FROM structures WHERE id = ?1", params![id])?;
        }
        for id in &dirty.structures {
            if let Some(structure) = kernel.structures().get(id) {
                upsert_structure(&tx, structure)?;
            }
        }

        for id in &dirty.conversations {
            if let Some(conversation) = kernel.conversations().get(id) {
                upsert_conversation(&tx, conversation)?;
            }
        }

        for id in &dirty.invitations {
            if let Some(invitation) = kernel.invitations().get(id) {
                upsert_invitation(&tx, invitation)?;
            }
        }

        // Audit frames share the commit envelope: appended before the
        // database commit, truncated away if it fails.
        let log_rollback = log.append(events)?;
        if let Err(err) = tx.commit() {
            log.truncate_to(log_rollback)?;
            return Err(StorageError::from(err));
        }

        kernel.clear_dirty();
        debug!(tick = kernel.tick(), events = events.len(), "tick committed");
        Ok(())
    }

    /// Writes the complete kernel state. Used when bootstrapping a fresh
    /// database from `init`.
    pub fn persist_full(&mut self, kernel: &mut Kernel) -> Result<(), StorageError> {
        kernel.mark_all_dirty();
        let log = EventLog::new(self.path.with_file_name("events.jsonl"));
        self.commit_tick(kernel, &mut [], &log)
    }

    // --- Load ---

    /// Reconstructs the kernel from the database alone. The event log is
    /// never consulted.
    pub fn load_kernel(&self, runtime_config: &EngineConfig) -> Result<Kernel, StorageError> {
        let (meta, counters, mut config) = self.load_world_row()?;
        // Paths are runtime concerns, not world state.
        config.data_dir = runtime_config.data_dir.clone();
        config.agents_root = runtime_config.agents_root.clone();

        let cells = self.load_cells()?;
        let objects = self.load_objects()?;
        let mut agents = self.load_agents()?;
        self.load_inventories(&mut agents)?;
        let named_places = self.load_named_places()?;
        let structures = self.load_structures()?;
        let conversations = self.load_conversations()?;
        let invitations = self.load_invitations()?;

        Ok(Kernel::from_parts(
            config,
            meta,
            cells,
            objects,
            agents,
            named_places,
            structures,
            conversations,
            invitations,
            counters.0,
            counters.1,
            counters.2,
        ))
    }

    fn load_world_row(&self) -> Result<(WorldMeta, (u64, u64, u64), EngineConfig), StorageError> {
        self.conn
            .query_row(
                "SELECT tick, weather, width, height, next_event_seq,
                        next_object_id, next_conversation_id, next_invitation_id, config_json
                 FROM world_state WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, i64>(7)?,
                        row.get::<_, String>(8)?,
                    ))
                },
            )
            .optional()?
            .ok_or(StorageError::WorldMissing)
            .and_then(
                |(tick, weather, width, height, seq, obj, conv, inv, config_json)| {
                    let weather =
                        Weather::parse(&weather).ok_or_else(|| StorageError::corrupt("weather"))?;
                    let config: EngineConfig = serde_json::from_str(&config_json)?;
                    Ok((
                        WorldMeta {
                            tick: tick as u64,
                            width: width as i32,
                            height: height as i32,
                            weather,
                            next_event_seq: seq as u64,
                        },
                        (obj as u64, conv as u64, inv as u64),
                        config,
                    ))
                },
            )
    }

    fn load_cells(&self) -> Result<BTreeMap<Position, Cell>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT x, y, terrain, walls, doors, place_name FROM cells")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut cells = BTreeMap::new();
        for row in rows {
            let (x, y, terrain, walls, doors, place_name) = row?;
            let cell = Cell {
                terrain: Terrain::parse(&terrain).ok_or_else(|| StorageError::corrupt("terrain"))?,
                walls: parse_directions(&walls)?,
                doors: parse_directions(&doors)?,
                place_name,
            };
            cells.insert(Position::new(x as i32, y as i32), cell);
        }
        Ok(cells)
    }

    fn load_objects(&self) -> Result<BTreeMap<ObjectId, WorldObject>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, x, y, created_by, created_tick, passable, data FROM objects",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut objects = BTreeMap::new();
        for row in rows {
            let (id, x, y, created_by, created_tick, passable, data) = row?;
            let kind: ObjectKind = serde_json::from_str(&data)?;
            objects.insert(
                id.clone(),
                WorldObject {
                    id,
                    position: Position::new(x as i32, y as i32),
                    created_by,
                    created_tick: created_tick as u64,
                    passable: passable != 0,
                    kind,
                },
            );
        }
        Ok(objects)
    }

    fn load_agents(&self) -> Result<BTreeMap<AgentName, Agent>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT name, model_id, personality, x, y, is_sleeping, session_id,
                    last_turn_tick, known_agents, journey, pending_dream
             FROM agents",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, Option<String>>(9)?,
                row.get::<_, Option<String>>(10)?,
            ))
        })?;

        let mut agents = BTreeMap::new();
        for row in rows {
            let (
                name,
                model_id,
                personality,
                x,
                y,
                is_sleeping,
                session_id,
                last_turn_tick,
                known_agents,
                journey,
                pending_dream,
            ) = row?;
            let known: BTreeSet<AgentName> = serde_json::from_str(&known_agents)?;
            let journey: Option<Journey> = match journey {
                Some(raw) => Some(serde_json::from_str(&raw)?),
                None => None,
            };
            agents.insert(
                name.clone(),
                Agent {
                    name,
                    model_id,
                    personality,
                    position: Position::new(x as i32, y as i32),
                    inventory: Default::default(),
                    journey,
                    sleeping: is_sleeping != 0,
                    session_id,
                    last_turn_tick: last_turn_tick as u64,
                    known_agents: known,
                    pending_dream,
                },
            );
        }
        Ok(agents)
    }

    fn load_inventories(
        &self,
        agents: &mut BTreeMap<AgentName, Agent>,
    ) -> Result<(), StorageError> {
        let mut stacks = self
            .conn
            .prepare("SELECT agent, item_type, quantity FROM inventory_stacks")?;
        let rows = stacks.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        for row in rows {
            let (agent, item_type, quantity) = row?;
            if let Some(agent) = agents.get_mut(&agent) {
                agent.inventory.add_resource(&item_type, quantity as u32);
            }
        }

        let mut items = self
            .conn
            .prepare("SELECT id, agent, item_type, properties FROM inventory_items")?;
        let rows = items.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        for row in rows {
            let (id, agent, item_type, properties) = row?;
            if let Some(agent) = agents.get_mut(&agent) {
                agent.inventory.add_item(Item {
                    id,
                    kind: item_type,
                    properties: serde_json::from_str(&properties)?,
                });
            }
        }
        Ok(())
    }

    fn load_named_places(&self) -> Result<BTreeMap<String, Position>, StorageError> {
        let mut stmt = self.conn.prepare("SELECT name, x, y FROM named_places")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        let mut places = BTreeMap::new();
        for row in rows {
            let (name, x, y) = row?;
            places.insert(name, Position::new(x as i32, y as i32));
        }
        Ok(places)
    }

    fn load_structures(&self) -> Result<BTreeMap<ObjectId, Structure>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, interior_cells, creators, is_private FROM structures")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;
        let mut structures = BTreeMap::new();
        for row in rows {
            let (id, name, interior, creators, is_private) = row?;
            structures.insert(
                id.clone(),
                Structure {
                    id,
                    name,
                    interior: serde_json::from_str(&interior)?,
                    creators: serde_json::from_str(&creators)?,
                    is_private: is_private != 0,
                },
            );
        }
        Ok(structures)
    }

    fn load_conversations(&self) -> Result<BTreeMap<ConversationId, Conversation>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, privacy, created_by, started_tick, ended_tick FROM conversations")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Option<i64>>(4)?,
            ))
        })?;

        let mut conversations = BTreeMap::new();
        for row in rows {
            let (id, privacy, created_by, started_tick, ended_tick) = row?;
            conversations.insert(
                id.clone(),
                Conversation {
                    id,
                    privacy: Privacy::parse(&privacy)
                        .ok_or_else(|| StorageError::corrupt("privacy"))?,
                    created_by,
                    participants: Vec::new(),
                    turns: Vec::new(),
                    started_tick: started_tick as u64,
                    ended_tick: ended_tick.map(|tick| tick as u64),
                },
            );
        }

        let mut participants = self.conn.prepare(
            "SELECT conversation_id, agent, joined_tick, left_tick, last_turn_tick
             FROM conversation_participants ORDER BY joined_tick, agent",
        )?;
        let rows = participants.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<i64>>(3)?,
                row.get::<_, Option<i64>>(4)?,
            ))
        })?;
        for row in rows {
            let (conversation_id, agent, joined_tick, left_tick, last_turn_tick) = row?;
            if let Some(conversation) = conversations.get_mut(&conversation_id) {
                conversation.participants.push(Participant {
                    name: agent,
                    joined_tick: joined_tick as u64,
                    left_tick: left_tick.map(|tick| tick as u64),
                    last_turn_tick: last_turn_tick.map(|tick| tick as u64),
                });
            }
        }

        let mut turns = self.conn.prepare(
            "SELECT conversation_id, speaker, message, tick FROM conversation_turns ORDER BY id",
        )?;
        let rows = turns.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;
        for row in rows {
            let (conversation_id, speaker, message, tick) = row?;
            if let Some(conversation) = conversations.get_mut(&conversation_id) {
                conversation.turns.push(ConversationTurn {
                    speaker,
                    text: message,
                    tick: tick as u64,
                });
            }
        }

        Ok(conversations)
    }

    fn load_invitations(&self) -> Result<BTreeMap<InvitationId, Invitation>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, inviter, invitee, privacy, created_tick, expires_at_tick, status
             FROM conversation_invitations",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;
        let mut invitations = BTreeMap::new();
        for row in rows {
            let (id, inviter, invitee, privacy, created_tick, expires_at_tick, status) = row?;
            invitations.insert(
                id.clone(),
                Invitation {
                    id,
                    inviter,
                    invitee,
                    privacy: Privacy::parse(&privacy)
                        .ok_or_else(|| StorageError::corrupt("privacy"))?,
                    created_tick: created_tick as u64,
                    expires_at_tick: expires_at_tick as u64,
                    status: InvitationStatus::parse(&status)
                        .ok_or_else(|| StorageError::corrupt("invitation status"))?,
                },
            );
        }
        Ok(invitations)
    }
}

fn parse_directions(raw: &str) -> Result<BTreeSet<Direction>, StorageError> {
    let names: Vec<String> = serde_json::from_str(raw)?;
    let mut directions = BTreeSet::new();
    for name in names {
        directions
            .insert(Direction::parse(&name).ok_or_else(|| StorageError::corrupt("direction"))?);
    }
    Ok(directions)
}

fn directions_json(directions: &BTreeSet<Direction>) -> Result<String, StorageError> {
    let names: Vec<&str> = directions.iter().map(|d| d.as_str()).collect();
    Ok(serde_json::to_string(&names)?)
}

fn write_world_row(tx: &rusqlite::Transaction<'_>, kernel: &Kernel) -> Result<(), StorageError> {
    let meta = kernel.meta();
    let (next_object_id, next_conversation_id, next_invitation_id) = kernel.id_counters();
    let config_json = serde_json::to_string(kernel.config())?;
    tx.execute(
        "INSERT INTO world_state (
            id, tick, weather, width, height, next_event_seq,
            next_object_id, next_conversation_id, next_invitation_id, config_json
        ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(id) DO UPDATE SET
            tick = excluded.tick,
            weather = excluded.weather,
            width = excluded.width,
            height = excluded.height,
            next_event_seq = excluded.next_event_seq,
            next_object_id = excluded.next_object_id,
            next_conversation_id = excluded.next_conversation_id,
            next_invitation_id = excluded.next_invitation_id,
            config_json = excluded.config_json",
        params![
            meta.tick as i64,
            meta.weather.as_str(),
            meta.width,
            meta.height,
            meta.next_event_seq as i64,
            next_object_id as i64,
            next_conversation_id as i64,
            next_invitation_id as i64,
            config_json,
        ],
    )?;
    Ok(())
}

fn upsert_cell(
    tx: &rusqlite::Transaction<'_>,
    position: Position,
    cell: &Cell,
) -> Result<(), StorageError> {
    tx.execute(
        "INSERT INTO cells (x, y, terrain, walls, doors, place_name)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(x, y) DO UPDATE SET
            terrain = excluded.terrain,
            walls = excluded.walls,
            doors = excluded.doors,
            place_name = excluded.place_name",
        params![
            position.x,
            position.y,
            cell.terrain.as_str(),
            directions_json(&cell.walls)?,
            directions_json(&cell.doors)?,
            cell.place_name,
        ],
    )?;
    Ok(())
}

fn upsert_object(tx: &rusqlite::Transaction<'_>, object: &WorldObject) -> Result<(), StorageError> {
    tx.execute(
        "INSERT INTO objects (id, object_type, x, y, created_by, created_tick, passable, data)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
            object_type = excluded.object_type,
            x = excluded.x,
            y = excluded.y,
            created_by = excluded.created_by,
            created_tick = excluded.created_tick,
            passable = excluded.passable,
            data = excluded.data",
        params![
            object.id,
            object.type_name(),
            object.position.x,
            object.position.y,
            object.created_by,
            object.created_tick as i64,
            object.passable as i64,
            serde_json::to_string(&object.kind)?,
        ],
    )?;
    Ok(())
}

fn upsert_agent(tx: &rusqlite::Transaction<'_>, agent: &Agent) -> Result<(), StorageError> {
    tx.execute(
        "INSERT INTO agents (
            name, model_id, personality, x, y, is_sleeping, session_id,
            last_turn_tick, known_agents, journey, pending_dream
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(name) DO UPDATE SET
            model_id = excluded.model_id,
            personality = excluded.personality,
            x = excluded.x,
            y = excluded.y,
            is_sleeping = excluded.is_sleeping,
            session_id = excluded.session_id,
            last_turn_tick = excluded.last_turn_tick,
            known_agents = excluded.known_agents,
            journey = excluded.journey,
            pending_dream = excluded.pending_dream",
        params![
            agent.name,
            agent.model_id,
            agent.personality,
            agent.position.x,
            agent.position.y,
            agent.sleeping as i64,
            agent.session_id,
            agent.last_turn_tick as i64,
            serde_json::to_string(&agent.known_agents)?,
            match &agent.journey {
                Some(journey) => Some(serde_json::to_string(journey)?),
                None => None,
            },
            agent.pending_dream,
        ],
    )?;

    tx.execute(
        "DELETE FROM inventory_stacks WHERE agent = ?1",
        params![agent.name],
    )?;
    for (kind, quantity) in &agent.inventory.stacks {
        tx.execute(
            "INSERT INTO inventory_stacks (agent, item_type, quantity) VALUES (?1, ?2, ?3)",
            params![agent.name, kind, *quantity as i64],
        )?;
    }

    tx.execute(
        "DELETE FROM inventory_items WHERE agent = ?1",
        params![agent.name],
    )?;
    for item in &agent.inventory.items {
        tx.execute(
            "INSERT INTO inventory_items (id, agent, item_type, properties)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                item.id,
                agent.name,
                item.kind,
                serde_json::to_string(&item.properties)?,
            ],
        )?;
    }
    Ok(())
}

fn upsert_structure(
    tx: &rusqlite::Transaction<'_>,
    structure: &Structure,
) -> Result<(), StorageError> {
    tx.execute(
        "INSERT INTO structures (id, name, interior_cells, creators, is_private)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            interior_cells = excluded.interior_cells,
            creators = excluded.creators,
            is_private = excluded.is_private",
        params![
            structure.id,
            structure.name,
            serde_json::to_string(&structure.interior)?,
            serde_json::to_string(&structure.creators)?,
            structure.is_private as i64,
        ],
    )?;
    Ok(())
}

fn upsert_conversation(
    tx: &rusqlite::Transaction<'_>,
    conversation: &Conversation,
) -> Result<(), StorageError> {
    tx.execute(
        "INSERT INTO conversations (id, privacy, created_by, started_tick, ended_tick)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            privacy = excluded.privacy,
            created_by = excluded.created_by,
            started_tick = excluded.started_tick,
            ended_tick = excluded.ended_tick",
        params![
            conversation.id,
            conversation.privacy.as_str(),
            conversation.created_by,
            conversation.started_tick as i64,
            conversation.ended_tick.map(|tick| tick as i64),
        ],
    )?;

    tx.execute(
        "DELETE FROM conversation_participants WHERE conversation_id = ?1",
        params![conversation.id],
    )?;
    for participant in &conversation.participants {
        tx.execute(
            "INSERT INTO conversation_participants
                (conversation_id, agent, joined_tick, left_tick, last_turn_tick)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                conversation.id,
                participant.name,
                participant.joined_tick as i64,
                participant.left_tick.map(|tick| tick as i64),
                participant.last_turn_tick.map(|tick| tick as i64),
            ],
        )?;
    }

    tx.execute(
        "DELETE FROM conversation_turns WHERE conversation_id = ?1",
        params![conversation.id],
    )?;
    for turn in &conversation.turns {
        tx.execute(
            "INSERT INTO conversation_turns (conversation_id, speaker, message, tick)
             VALUES (?1, ?2, ?3, ?4)",
            params![conversation.id, turn.speaker, turn.text, turn.tick as i64],
        )?;
    }
    Ok(())
}

fn upsert_invitation(
    tx: &rusqlite::Transaction<'_>,
    invitation: &Invitation,
) -> Result<(), StorageError> {
    tx.execute(
        "INSERT INTO conversation_invitations
            (id, inviter, invitee, privacy, created_tick, expires_at_tick, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET status = excluded.status",
        params![
            invitation.id,
            invitation.inviter,
            invitation.invitee,
            invitation.privacy.as_str(),
            invitation.created_tick as i64,
            invitation.expires_at_tick as i64,
            invitation.status.as_str(),
        ],
    )?;
    Ok(())
}
