use serde::{Deserialize, Serialize};

use crate::types::{AgentName, ConversationId};
use crate::world::Weather;

/// The whitelisted observer command set. Each command produces at most one
/// event in a subsequent tick and may never overwrite prior events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ObserverCommand {
    TriggerEvent { text: String },
    SetWeather { weather: Weather },
    SendDream { agent: AgentName, text: String },
    ForceTurn { agent: AgentName },
    SkipTurns { agent: AgentName, turns: u32 },
    EndConversation { conversation_id: ConversationId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_from_tagged_json() {
        let command: ObserverCommand = serde_json::from_value(serde_json::json!({
            "command": "set_weather",
            "weather": "foggy",
        }))
        .expect("parse");
        assert_eq!(
            command,
            ObserverCommand::SetWeather {
                weather: Weather::Foggy
            }
        );
    }
}
