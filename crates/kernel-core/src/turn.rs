use std::cell::RefCell;
use std::time::Duration;

use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use contracts::{ActionResult, AgentName};

use crate::context::TickContext;
use crate::kernel::Kernel;
use crate::reasoner::{
    action_tool_schema, NarrationContext, Narrator, Reasoner, ReasonerError, ToolSpec,
};

// Runaway batches are truncated; the reasoner signals completion by
// returning fewer calls.
const MAX_ACTIONS_PER_TURN: usize = 8;

struct TurnShared<'a> {
    kernel: &'a mut Kernel,
    ctx: &'a mut TickContext,
}

/// Phase 5: agent turns. Clusters run as cooperative tasks on the engine's
/// single worker thread and are joined together; agents inside one cluster
/// act strictly in cluster order so each sees the previous actor's results.
/// The only suspension points are the reasoner and narrator calls, all of
/// which share one per-tick deadline.
pub async fn run_agent_turns(
    kernel: &mut Kernel,
    ctx: &mut TickContext,
    reasoner: &dyn Reasoner,
    narrator: &dyn Narrator,
) -> Result<(), ReasonerError> {
    let clusters = ctx.clusters.clone();
    if clusters.is_empty() {
        return Ok(());
    }

    let deadline = Instant::now() + Duration::from_secs(kernel.config().tick_deadline_secs);
    let tools = action_tool_schema();
    let shared = RefCell::new(TurnShared { kernel, ctx });
    let terminal: RefCell<Option<ReasonerError>> = RefCell::new(None);

    let tasks = clusters.iter().map(|cluster| {
        run_cluster(&shared, &terminal, cluster, reasoner, narrator, &tools, deadline)
    });
    futures::future::join_all(tasks).await;

    match terminal.into_inner() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

async fn run_cluster(
    shared: &RefCell<TurnShared<'_>>,
    terminal: &RefCell<Option<ReasonerError>>,
    cluster: &[AgentName],
    reasoner: &dyn Reasoner,
    narrator: &dyn Narrator,
    tools: &[ToolSpec],
    deadline: Instant,
) {
    for agent_name in cluster {
        if terminal.borrow().is_some() {
            return;
        }
        let acting = shared.borrow().ctx.acting.contains(agent_name);
        if !acting {
            continue;
        }
        if let Err(error) =
            run_agent_turn(shared, agent_name, reasoner, narrator, tools, deadline).await
        {
            if error.is_terminal() {
                *terminal.borrow_mut() = Some(error);
                return;
            }
            warn!(agent = agent_name.as_str(), error = %error, "turn skipped");
            let mut guard = shared.borrow_mut();
            let result = guard.ctx.turn_results.entry(agent_name.clone()).or_default();
            result.skipped = Some(error.to_string());
        }
    }
}

async fn run_agent_turn(
    shared: &RefCell<TurnShared<'_>>,
    agent_name: &str,
    reasoner: &dyn Reasoner,
    narrator: &dyn Narrator,
    tools: &[ToolSpec],
    deadline: Instant,
) -> Result<(), ReasonerError> {
    // Perception (and the agent snapshot for session setup) come from the
    // current state, inside one short borrow.
    let (perception, agent_snapshot, session_id, tick) = {
        let mut guard = shared.borrow_mut();
        let TurnShared { kernel, ctx } = &mut *guard;
        let Some(perception) = kernel.build_perception(agent_name, ctx) else {
            return Ok(());
        };
        let Some(agent) = kernel.agent(agent_name) else {
            return Ok(());
        };
        (perception, agent.clone(), agent.session_id.clone(), ctx.tick)
    };

    let session_id = match session_id {
        Some(existing) => existing,
        None => {
            let session = match timeout_at(deadline, reasoner.begin_session(&agent_snapshot)).await
            {
                Ok(result) => result?,
                Err(_) => {
                    return Err(ReasonerError::Transient("tick deadline elapsed".to_string()))
                }
            };
            let mut guard = shared.borrow_mut();
            guard.kernel.set_session(agent_name, session.clone(), tick);
            session
        }
    };

    let calls = match timeout_at(deadline, reasoner.turn(&session_id, &perception, tools)).await {
        Ok(result) => result?,
        Err(_) => return Err(ReasonerError::Transient("tick deadline elapsed".to_string())),
    };

    {
        let mut guard = shared.borrow_mut();
        let result = guard.ctx.turn_results.entry(agent_name.to_string()).or_default();
        result.session_id = Some(session_id.clone());
    }

    for call in calls.into_iter().take(MAX_ACTIONS_PER_TURN) {
        let action = match call.to_action() {
            Ok(action) => action,
            Err(error) => {
                debug!(agent = agent_name, error = %error, "unparseable tool call");
                let _ = timeout_at(
                    deadline,
                    reasoner.tool_result(&session_id, "That is not something you can do here."),
                )
                .await;
                continue;
            }
        };

        // Execute synchronously between suspension points; events land in
        // the context immediately so later actors see them.
        let (result, narration_ctx) = {
            let mut guard = shared.borrow_mut();
            let TurnShared { kernel, ctx } = &mut *guard;
            let result = kernel.execute_action(agent_name, &action, ctx.tick);
            ctx.extend_events(result.events.clone());
            let turn = ctx.turn_results.entry(agent_name.to_string()).or_default();
            turn.actions.push(action.clone());
            let position = kernel
                .agent(agent_name)
                .map(|agent| agent.position)
                .unwrap_or(perception.position);
            (
                result,
                NarrationContext {
                    agent: agent_name.to_string(),
                    action_type: action.type_name().to_string(),
                    position,
                    time_of_day: ctx.time_of_day,
                    weather: ctx.weather,
                },
            )
        };

        let narration = narrate_with_fallback(narrator, &result, &narration_ctx, deadline).await;
        {
            let mut guard = shared.borrow_mut();
            let turn = guard.ctx.turn_results.entry(agent_name.to_string()).or_default();
            turn.narrations.push(narration.clone());
        }

        match timeout_at(deadline, reasoner.tool_result(&session_id, &narration)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) if error.is_terminal() => return Err(error),
            Ok(Err(error)) => {
                debug!(agent = agent_name, error = %error, "tool result delivery failed");
            }
            Err(_) => return Err(ReasonerError::Transient("tick deadline elapsed".to_string())),
        }
    }

    Ok(())
}

/// Narrator failures and deadline overruns fall back to the raw message.
async fn narrate_with_fallback(
    narrator: &dyn Narrator,
    result: &ActionResult,
    ctx: &NarrationContext,
    deadline: Instant,
) -> String {
    match timeout_at(deadline, narrator.narrate(result, ctx)).await {
        Ok(Ok(narration)) => narration,
        Ok(Err(error)) => {
            debug!(error = %error, "narrator failed, using raw message");
            result.message.clone()
        }
        Err(_) => result.message.clone(),
    }
}
