//! Cross-boundary contracts for the world kernel, storage, observer API, and CLI.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub mod actions;
pub mod agent;
pub mod conversation;
pub mod events;
pub mod objects;
pub mod observer;
pub mod types;
pub mod world;

pub use actions::{Action, ActionResult, JourneyTarget};
pub use agent::{Agent, Inventory, Item, Journey};
pub use conversation::{
    Conversation, ConversationTurn, Invitation, InvitationStatus, Participant, Privacy,
};
pub use events::{Event, EventKind};
pub use objects::{ObjectKind, WorldObject};
pub use observer::ObserverCommand;
pub use types::{
    AgentName, CompassOctant, ConversationId, Direction, InvitationId, ObjectId, Position, Rect,
    ALL_DIRECTIONS,
};
pub use world::{Cell, Structure, Terrain, TimeOfDay, Weather, WorldMeta};

pub const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default = "default_world_width")]
    pub world_width: i32,
    #[serde(default = "default_world_height")]
    pub world_height: i32,
    #[serde(default = "default_vision_radius")]
    pub vision_radius: i32,
    #[serde(default = "default_night_vision_factor")]
    pub night_vision_factor: f64,
    #[serde(default = "default_cluster_buffer")]
    pub cluster_buffer: i32,
    #[serde(default = "default_invite_expiry_ticks")]
    pub invite_expiry_ticks: u64,
    #[serde(default = "default_tick_deadline_secs")]
    pub tick_deadline_secs: u64,
    #[serde(default = "default_snapshot_every_ticks")]
    pub snapshot_every_ticks: u64,
    #[serde(default = "default_snapshot_keep")]
    pub snapshot_keep: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_agents_root")]
    pub agents_root: PathBuf,
}

impl EngineConfig {
    /// Vision radius adjusted for the time of day. At night the radius is
    /// scaled by the night-vision factor, floored at one cell. Applied
    /// identically everywhere visibility is checked.
    pub fn effective_vision_radius(&self, time_of_day: TimeOfDay) -> i32 {
        if time_of_day == TimeOfDay::Night {
            ((self.vision_radius as f64 * self.night_vision_factor) as i32).max(1)
        } else {
            self.vision_radius
        }
    }

    pub fn cluster_radius(&self, time_of_day: TimeOfDay) -> i32 {
        self.effective_vision_radius(time_of_day) + self.cluster_buffer
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("world.db")
    }

    pub fn event_log_path(&self) -> PathBuf {
        self.data_dir.join("events.jsonl")
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.data_dir.join("snapshots")
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            world_width: default_world_width(),
            world_height: default_world_height(),
            vision_radius: default_vision_radius(),
            night_vision_factor: default_night_vision_factor(),
            cluster_buffer: default_cluster_buffer(),
            invite_expiry_ticks: default_invite_expiry_ticks(),
            tick_deadline_secs: default_tick_deadline_secs(),
            snapshot_every_ticks: default_snapshot_every_ticks(),
            snapshot_keep: default_snapshot_keep(),
            seed: default_seed(),
            data_dir: default_data_dir(),
            agents_root: default_agents_root(),
        }
    }
}

fn default_world_width() -> i32 {
    500
}

fn default_world_height() -> i32 {
    500
}

fn default_vision_radius() -> i32 {
    3
}

fn default_night_vision_factor() -> f64 {
    0.6
}

fn default_cluster_buffer() -> i32 {
    2
}

fn default_invite_expiry_ticks() -> u64 {
    2
}

fn default_tick_deadline_secs() -> u64 {
    120
}

fn default_snapshot_every_ticks() -> u64 {
    24
}

fn default_snapshot_keep() -> usize {
    5
}

fn default_seed() -> u64 {
    1337
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_agents_root() -> PathBuf {
    PathBuf::from("agents")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn night_vision_shrinks_but_never_below_one() {
        let config = EngineConfig::default();
        assert_eq!(config.effective_vision_radius(TimeOfDay::Morning), 3);
        assert_eq!(config.effective_vision_radius(TimeOfDay::Night), 1);

        let wide = EngineConfig {
            vision_radius: 10,
            ..EngineConfig::default()
        };
        assert_eq!(wide.effective_vision_radius(TimeOfDay::Night), 6);
    }

    #[test]
    fn config_deserialises_with_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").expect("defaults");
        assert_eq!(config, EngineConfig::default());
    }
}
