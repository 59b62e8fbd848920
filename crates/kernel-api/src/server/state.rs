use std::path::PathBuf;

use tokio::sync::mpsc::UnboundedSender;

use contracts::{EngineConfig, ObserverCommand};
use kernel_core::Kernel;

use crate::event_log::EventLog;
use crate::persistence::SqliteWorldStore;
use crate::server::HttpApiError;

/// Shared observer state. Queries open a fresh read-only connection so each
/// request sees a consistent point-in-time view without blocking the
/// single-threaded writer; commands go to the engine loop over a channel.
#[derive(Clone)]
pub struct ObserverHandle {
    database_path: PathBuf,
    event_log_path: PathBuf,
    runtime_config: EngineConfig,
    command_tx: UnboundedSender<ObserverCommand>,
}

impl ObserverHandle {
    pub fn new(config: &EngineConfig, command_tx: UnboundedSender<ObserverCommand>) -> Self {
        Self {
            database_path: config.database_path(),
            event_log_path: config.event_log_path(),
            runtime_config: config.clone(),
            command_tx,
        }
    }

    /// Loads a consistent snapshot of the world for one query.
    pub(crate) fn snapshot(&self) -> Result<Kernel, HttpApiError> {
        let store = SqliteWorldStore::open_reader(&self.database_path)
            .map_err(HttpApiError::from_storage)?;
        store
            .load_kernel(&self.runtime_config)
            .map_err(HttpApiError::from_storage)
    }

    pub(crate) fn event_log(&self) -> EventLog {
        EventLog::new(self.event_log_path.clone())
    }

    pub(crate) fn send_command(&self, command: ObserverCommand) -> Result<(), HttpApiError> {
        self.command_tx
            .send(command)
            .map_err(|_| HttpApiError::unavailable("engine loop is not running"))
    }
}
