//! Deterministic tick-pipeline kernel: world state, services, action engine,
//! scheduler, perception, and the agent-turn adapter for the external
//! reasoner. Storage and the observer API live in `kernel-api`.

pub mod context;
pub mod crafting;
pub mod kernel;
pub mod pathfind;
pub mod perception;
pub mod reasoner;
pub mod scheduler;
pub mod turn;

pub use context::{TickContext, TurnResult};
pub use crafting::{CraftVerb, Recipe, RecipeBook};
pub use kernel::{DirtyState, DistanceBucket, JourneyPlanError, Kernel, SensedAgent};
pub use perception::Perception;
pub use reasoner::{
    action_tool_schema, NarrationContext, Narrator, NarratorError, NullReasoner, Reasoner,
    ReasonerError, TemplateNarrator, ToolCall, ToolSpec,
};
pub use scheduler::Scheduler;
pub use turn::run_agent_turns;
