//! The Synthesizer: summarises a completed workspace's done tasks into a
//! single report (§4.6).

use std::sync::Arc;

use futures::StreamExt;
use sqlx::SqlitePool;
use taskboard_db::models::TaskStatus;
use taskboard_db::queries::{tasks, workspaces};
use uuid::Uuid;

use crate::error::BoardError;
use crate::session::{SessionEventKind, SessionManager};

const RESULT_SUMMARY_TRUNCATE_CHARS: usize = 500;

/// Summarise `workspace_id`'s done tasks, write the summary to
/// `workspace.summary`, mark `summary_generated`, and return the text.
pub async fn synthesize(
    pool: &SqlitePool,
    session_manager: &Arc<dyn SessionManager>,
    workspace_id: Uuid,
) -> Result<String, BoardError> {
    let done = tasks::list_tasks(pool, Some(workspace_id), Some(&[TaskStatus::Done])).await?;
    let prompt = build_summary_prompt(&done);

    let session_name = format!("synth-{workspace_id}");
    let session = session_manager
        .create_session(&session_name)
        .await
        .map_err(|err| BoardError::Conflict(format!("failed to create synthesis session: {err}")))?;

    let mut summary = String::new();
    let mut stream = session.chat_stream(&prompt);
    while let Some(event) = stream.next().await {
        match event.kind {
            SessionEventKind::Content => {
                if let Some(text) = event.content {
                    summary.push_str(&text);
                }
            }
            SessionEventKind::Error => {
                let message = event.error.unwrap_or_else(|| "unknown synthesis error".to_string());
                return Err(BoardError::Conflict(format!("synthesis failed: {message}")));
            }
            SessionEventKind::Done => break,
            _ => {}
        }
    }
    let _ = session_manager.delete(&session_name).await;

    workspaces::set_summary(pool, workspace_id, &summary).await?;
    Ok(summary)
}

fn build_summary_prompt(done_tasks: &[taskboard_db::models::Task]) -> String {
    let mut prompt = String::from(
        "Summarise the following completed tasks into a short workspace report for the user:\n\n",
    );
    for task in done_tasks {
        let result = task.result.as_deref().unwrap_or("");
        let truncated = if result.len() > RESULT_SUMMARY_TRUNCATE_CHARS {
            &result[..RESULT_SUMMARY_TRUNCATE_CHARS]
        } else {
            result
        };
        prompt.push_str(&format!("- {}: {}\n", task.title, truncated));
    }
    prompt
}
