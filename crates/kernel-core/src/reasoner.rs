use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use contracts::{Action, ActionResult, Agent, Position, TimeOfDay, Weather};

use crate::perception::Perception;

/// One entry of the fixed tool schema declared to the reasoner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A tool invocation emitted by the reasoner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    /// Resolves the call against the closed action vocabulary. Unknown tool
    /// names and malformed arguments are both rejected.
    pub fn to_action(&self) -> Result<Action, ReasonerError> {
        let mut object = match &self.arguments {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            _ => {
                return Err(ReasonerError::protocol(format!(
                    "tool arguments for {} must be an object",
                    self.name
                )))
            }
        };
        object.insert("type".to_string(), Value::String(self.name.clone()));
        serde_json::from_value(Value::Object(object))
            .map_err(|err| ReasonerError::protocol(format!("bad tool call {}: {err}", self.name)))
    }
}

#[derive(Debug)]
pub enum ReasonerError {
    /// Session or transport is gone for good; the run should stop.
    Terminal(String),
    /// This turn failed; the agent skips it and the tick continues.
    Transient(String),
}

impl ReasonerError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }
}

impl fmt::Display for ReasonerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminal(message) => write!(f, "terminal reasoner error: {message}"),
            Self::Transient(message) => write!(f, "reasoner error: {message}"),
        }
    }
}

impl std::error::Error for ReasonerError {}

/// The external turn-taking oracle. One session per agent; the session id is
/// persisted so a restarted engine resumes the same session.
#[async_trait(?Send)]
pub trait Reasoner {
    async fn begin_session(&self, agent: &Agent) -> Result<String, ReasonerError>;

    /// One turn: perception in, ordered tool calls out. An empty vector ends
    /// the turn.
    async fn turn(
        &self,
        session_id: &str,
        perception: &Perception,
        tools: &[ToolSpec],
    ) -> Result<Vec<ToolCall>, ReasonerError>;

    /// Hands the narrated result of an executed tool call back to the
    /// session.
    async fn tool_result(&self, session_id: &str, narration: &str) -> Result<(), ReasonerError>;
}

#[derive(Debug)]
pub struct NarratorError(pub String);

impl fmt::Display for NarratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "narrator error: {}", self.0)
    }
}

impl std::error::Error for NarratorError {}

#[derive(Debug, Clone)]
pub struct NarrationContext {
    pub agent: String,
    pub action_type: String,
    pub position: Position,
    pub time_of_day: TimeOfDay,
    pub weather: Weather,
}

/// Converts structured action results into prose for the reasoner. Pure from
/// the engine's point of view; failures fall back to the raw result message.
#[async_trait(?Send)]
pub trait Narrator {
    async fn narrate(
        &self,
        result: &ActionResult,
        ctx: &NarrationContext,
    ) -> Result<String, NarratorError>;
}

/// Stand-in reasoner that takes no actions. Lets the engine run headless
/// (tests, `status`, storage maintenance) without an external model.
#[derive(Debug, Default)]
pub struct NullReasoner;

#[async_trait(?Send)]
impl Reasoner for NullReasoner {
    async fn begin_session(&self, agent: &Agent) -> Result<String, ReasonerError> {
        Ok(format!("null-session-{}", agent.name))
    }

    async fn turn(
        &self,
        _session_id: &str,
        _perception: &Perception,
        _tools: &[ToolSpec],
    ) -> Result<Vec<ToolCall>, ReasonerError> {
        Ok(Vec::new())
    }

    async fn tool_result(&self, _session_id: &str, _narration: &str) -> Result<(), ReasonerError> {
        Ok(())
    }
}

/// Local template narrator. Simple actions get a short weather-tinted line;
/// anything with structured data keeps its message plus the details, which
/// is also the documented fallback when an external narrator misbehaves.
#[derive(Debug, Default)]
pub struct TemplateNarrator;

impl TemplateNarrator {
    fn atmosphere(time_of_day: TimeOfDay, weather: Weather) -> &'static str {
        match (weather, time_of_day) {
            (Weather::Rainy, _) => "Rain patters softly around you.",
            (Weather::Foggy, _) => "The fog softens every shape.",
            (Weather::Cloudy, _) => "The light is soft and gray.",
            (Weather::Clear, TimeOfDay::Morning) => "The morning is fresh.",
            (Weather::Clear, TimeOfDay::Afternoon) => "Warm light lies on everything.",
            (Weather::Clear, TimeOfDay::Evening) => "The light is long and low.",
            (Weather::Clear, TimeOfDay::Night) => "Stars prick the dark overhead.",
        }
    }
}

#[async_trait(?Send)]
impl Narrator for TemplateNarrator {
    async fn narrate(
        &self,
        result: &ActionResult,
        ctx: &NarrationContext,
    ) -> Result<String, NarratorError> {
        let mut narration = result.message.clone();
        if let Some(data) = &result.data {
            narration.push('\n');
            narration.push_str(&serde_json::to_string_pretty(data).unwrap_or_default());
        }
        if result.success {
            narration.push(' ');
            narration.push_str(Self::atmosphere(ctx.time_of_day, ctx.weather));
        }
        Ok(narration)
    }
}

/// The fixed 27-entry tool schema for the action vocabulary.
pub fn action_tool_schema() -> Vec<ToolSpec> {
    fn tool(name: &str, description: &str, parameters: Value) -> ToolSpec {
        ToolSpec {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
    let direction = json!({ "type": "string", "enum": ["north", "south", "east", "west"] });
    let facing_direction = direction.clone();
    let look_direction =
        json!({ "type": "string", "enum": ["north", "south", "east", "west", "down"] });

    vec![
        tool(
            "walk",
            "Move one cell in a cardinal direction.",
            json!({ "type": "object", "properties": { "direction": direction }, "required": ["direction"] }),
        ),
        tool(
            "approach",
            "Move one cell toward a visible agent or object.",
            json!({ "type": "object", "properties": { "target": { "type": "string" } }, "required": ["target"] }),
        ),
        tool(
            "journey",
            "Travel toward distant coordinates or a named place, one cell per tick.",
            json!({ "type": "object", "properties": { "destination": {} }, "required": ["destination"] }),
        ),
        tool(
            "examine",
            "Inspect a neighboring cell, or your own with \"down\".",
            json!({ "type": "object", "properties": { "direction": look_direction.clone() }, "required": ["direction"] }),
        ),
        tool(
            "sense_others",
            "Feel rough direction and distance to everyone you have met.",
            json!({ "type": "object", "properties": {} }),
        ),
        tool(
            "take",
            "Pick up what lies in a neighboring cell, or underfoot with \"down\".",
            json!({ "type": "object", "properties": { "direction": look_direction.clone() }, "required": ["direction"] }),
        ),
        tool(
            "drop",
            "Put something from your inventory on the ground.",
            json!({ "type": "object", "properties": { "kind": { "type": "string" }, "quantity": { "type": "integer", "minimum": 1 } }, "required": ["kind"] }),
        ),
        tool(
            "give",
            "Hand something to an agent beside you.",
            json!({ "type": "object", "properties": { "recipient": { "type": "string" }, "kind": { "type": "string" }, "quantity": { "type": "integer", "minimum": 1 } }, "required": ["recipient", "kind"] }),
        ),
        tool(
            "gather",
            "Collect what this terrain offers.",
            json!({ "type": "object", "properties": {} }),
        ),
        tool(
            "combine",
            "Join two or more materials into something new.",
            json!({ "type": "object", "properties": { "items": { "type": "array", "items": { "type": "string" }, "minItems": 2 } }, "required": ["items"] }),
        ),
        tool(
            "work",
            "Shape one material with a technique (split, weave, hollow, chip, ...).",
            json!({ "type": "object", "properties": { "material": { "type": "string" }, "technique": { "type": "string" } }, "required": ["material", "technique"] }),
        ),
        tool(
            "apply",
            "Use a tool on a target material.",
            json!({ "type": "object", "properties": { "tool": { "type": "string" }, "target": { "type": "string" } }, "required": ["tool", "target"] }),
        ),
        tool(
            "build_shelter",
            "Raise a walled shelter around yourself with a door on the facing side.",
            json!({ "type": "object", "properties": { "facing": facing_direction }, "required": ["facing"] }),
        ),
        tool(
            "place_wall",
            "Build a wall on one edge of your cell.",
            json!({ "type": "object", "properties": { "direction": direction }, "required": ["direction"] }),
        ),
        tool(
            "place_door",
            "Set a door into an existing wall.",
            json!({ "type": "object", "properties": { "direction": direction }, "required": ["direction"] }),
        ),
        tool(
            "place_item",
            "Stand something from your inventory in the world.",
            json!({ "type": "object", "properties": { "item": { "type": "string" } }, "required": ["item"] }),
        ),
        tool(
            "remove_wall",
            "Tear down a wall on one edge of your cell.",
            json!({ "type": "object", "properties": { "direction": direction }, "required": ["direction"] }),
        ),
        tool(
            "write_sign",
            "Leave a readable sign here.",
            json!({ "type": "object", "properties": { "text": { "type": "string" } }, "required": ["text"] }),
        ),
        tool(
            "read_sign",
            "Read a sign in a neighboring cell, or underfoot with \"down\".",
            json!({ "type": "object", "properties": { "direction": look_direction }, "required": ["direction"] }),
        ),
        tool(
            "name_place",
            "Give this spot a name others can journey to.",
            json!({ "type": "object", "properties": { "name": { "type": "string" } }, "required": ["name"] }),
        ),
        tool(
            "speak",
            "Say something in your current conversation.",
            json!({ "type": "object", "properties": { "text": { "type": "string" } }, "required": ["text"] }),
        ),
        tool(
            "invite",
            "Invite a visible agent to a conversation.",
            json!({ "type": "object", "properties": { "invitee": { "type": "string" }, "privacy": { "type": "string", "enum": ["public", "private"] } }, "required": ["invitee"] }),
        ),
        tool(
            "accept_invite",
            "Accept your pending invitation.",
            json!({ "type": "object", "properties": {} }),
        ),
        tool(
            "decline_invite",
            "Decline your pending invitation.",
            json!({ "type": "object", "properties": {} }),
        ),
        tool(
            "join_conversation",
            "Join the public conversation of a visible participant.",
            json!({ "type": "object", "properties": { "participant": { "type": "string" } }, "required": ["participant"] }),
        ),
        tool(
            "leave_conversation",
            "Leave your current conversation.",
            json!({ "type": "object", "properties": {} }),
        ),
        tool(
            "sleep",
            "Lie down and sleep until morning or until someone arrives.",
            json!({ "type": "object", "properties": {} }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_covers_the_whole_vocabulary() {
        let schema = action_tool_schema();
        assert_eq!(schema.len(), 27);
        let mut names: Vec<&str> = schema.iter().map(|tool| tool.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 27);
    }

    #[test]
    fn tool_calls_resolve_to_actions() {
        let call = ToolCall {
            name: "walk".to_string(),
            arguments: json!({ "direction": "north" }),
        };
        assert_eq!(
            call.to_action().expect("valid"),
            Action::Walk {
                direction: contracts::Direction::North
            }
        );

        let bare = ToolCall {
            name: "sleep".to_string(),
            arguments: Value::Null,
        };
        assert_eq!(bare.to_action().expect("valid"), Action::Sleep);
    }

    #[test]
    fn unknown_tool_names_are_rejected() {
        let call = ToolCall {
            name: "teleport".to_string(),
            arguments: json!({}),
        };
        assert!(call.to_action().is_err());
    }

    #[test]
    fn every_schema_entry_with_defaults_parses() {
        // Tools whose only parameters are optional must parse bare.
        for name in [
            "sense_others",
            "gather",
            "accept_invite",
            "decline_invite",
            "leave_conversation",
            "sleep",
        ] {
            let call = ToolCall {
                name: name.to_string(),
                arguments: json!({}),
            };
            assert!(call.to_action().is_ok(), "{name} should parse bare");
        }
    }
}
