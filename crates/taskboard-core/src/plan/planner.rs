//! The Planner: turns a user goal into a validated [`PlanResult`] via a
//! transient agent session (§4.6).

use std::pin::Pin;
use std::sync::Arc;

use async_stream::stream;
use futures::{Stream, StreamExt};
use uuid::Uuid;

use crate::error::PlanError;
use crate::plan::prompt::{build_planner_prompt, extract_plan_json};
use crate::plan::schema::PlanResult;
use crate::session::{SessionEventKind, SessionManager};

/// One event in the lazy plan stream a caller consumes while a plan is
/// being generated.
#[derive(Debug, Clone)]
pub enum PlanEvent {
    Thinking(String),
    /// A tool invocation announcement surfaced by the underlying session.
    Reading(String),
    PlanReady(PlanResult),
    Error(String),
}

pub type PlanEventStream = Pin<Box<dyn Stream<Item = PlanEvent> + Send>>;

/// Drive a planning session for `goal` and stream back progress. Returns
/// early, without materialising any state, on any LLM-level error.
pub fn plan(manager: Arc<dyn SessionManager>, goal: String, shared_context: String) -> PlanEventStream {
    Box::pin(stream! {
        let session_name = format!("plan-{}", Uuid::new_v4());
        let session = match manager.create_session(&session_name).await {
            Ok(session) => session,
            Err(err) => {
                yield PlanEvent::Error(format!("failed to create planning session: {err}"));
                return;
            }
        };

        let prompt = build_planner_prompt(&goal, &shared_context);
        let mut content_buffer = String::new();
        let mut chat = session.chat_stream(&prompt);

        while let Some(event) = chat.next().await {
            match event.kind {
                SessionEventKind::Content => {
                    if let Some(text) = event.content {
                        content_buffer.push_str(&text);
                    }
                }
                SessionEventKind::Thinking => {
                    if let Some(text) = event.content {
                        yield PlanEvent::Thinking(text);
                    }
                }
                SessionEventKind::ToolCall => {
                    let detail = event
                        .tool_name
                        .map(|name| format!("invoking {name}"))
                        .unwrap_or_else(|| "invoking a tool".to_string());
                    yield PlanEvent::Reading(detail);
                }
                SessionEventKind::ToolResult => {
                    let detail = event
                        .tool_result
                        .unwrap_or_else(|| "tool call finished".to_string());
                    yield PlanEvent::Reading(detail);
                }
                SessionEventKind::Error => {
                    let message = event.error.unwrap_or_else(|| "unknown session error".to_string());
                    yield PlanEvent::Error(message);
                    return;
                }
                SessionEventKind::Done => break,
            }
        }

        let _ = manager.delete(&session_name).await;

        match extract_plan_json(&content_buffer).and_then(parse_and_validate) {
            Ok(plan) => yield PlanEvent::PlanReady(plan),
            Err(err) => yield PlanEvent::Error(err.to_string()),
        }
    })
}

fn parse_and_validate(value: serde_json::Value) -> Result<PlanResult, PlanError> {
    let plan: PlanResult = serde_json::from_value(value).map_err(|err| PlanError::Malformed(err.to_string()))?;
    plan.validate()?;
    Ok(plan)
}
