//! The default [`SessionManager`]: shells out to the `claude` CLI binary
//! per session and parses its `stream-json` output.
//!
//! Adapted from the host's `harness::claude_code` adapter (spawn a
//! subprocess, parse JSONL lines into typed events) but driven through the
//! `Session`/`SessionManager` seam instead of the host's `Harness` trait,
//! and kept alive for the life of a conversation rather than exiting after
//! one turn: each `chat_stream` call re-invokes the binary with
//! `--resume <session id>` so a session can receive more than one prompt
//! (the Planner and Synthesizer each send exactly one, but a task session
//! may in principle be re-prompted on retry).

use std::pin::Pin;
use std::process::Stdio;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::Stream;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use taskboard_core::{Session, SessionEvent, SessionManager};

pub type EventStream = Pin<Box<dyn Stream<Item = SessionEvent> + Send>>;

/// Spawns `claude` per `chat_stream` call. Cheap to clone; holds only the
/// binary path.
#[derive(Clone)]
pub struct ClaudeCodeSessionManager {
    binary_path: String,
}

impl ClaudeCodeSessionManager {
    pub fn new() -> Self {
        ClaudeCodeSessionManager { binary_path: "claude".to_string() }
    }

    pub fn with_binary(path: impl Into<String>) -> Self {
        ClaudeCodeSessionManager { binary_path: path.into() }
    }
}

impl Default for ClaudeCodeSessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionManager for ClaudeCodeSessionManager {
    async fn create_session(&self, name: &str) -> Result<Box<dyn Session>> {
        Ok(Box::new(ClaudeCodeSession {
            id: name.to_string(),
            binary_path: self.binary_path.clone(),
            system_prompt: Mutex::new(None),
            started: Mutex::new(false),
        }))
    }

    async fn delete(&self, _id: &str) -> Result<()> {
        // Nothing to release: each `chat_stream` call owns its own
        // short-lived child process.
        Ok(())
    }
}

struct ClaudeCodeSession {
    id: String,
    binary_path: String,
    system_prompt: Mutex<Option<String>>,
    started: Mutex<bool>,
}

#[async_trait]
impl Session for ClaudeCodeSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn inject_context(&self, prose: &str) -> Result<()> {
        *self.system_prompt.lock().unwrap() = Some(prose.to_string());
        Ok(())
    }

    fn chat_stream(&self, prompt: &str) -> EventStream {
        let binary_path = self.binary_path.clone();
        let system_prompt = self.system_prompt.lock().unwrap().clone();
        let resume = {
            let mut started = self.started.lock().unwrap();
            let resume = *started;
            *started = true;
            resume
        };
        let session_id = self.id.clone();
        let prompt = prompt.to_string();

        Box::pin(async_stream::stream! {
            let mut command = Command::new(&binary_path);
            command
                .arg("-p")
                .arg(&prompt)
                .arg("--output-format")
                .arg("stream-json")
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .stdin(Stdio::null());
            if let Some(system_prompt) = &system_prompt {
                command.arg("--append-system-prompt").arg(system_prompt);
            }
            if resume {
                command.arg("--resume").arg(&session_id);
            } else {
                command.arg("--session-id").arg(&session_id);
            }

            let mut child = match command.spawn().context("failed to spawn claude binary") {
                Ok(child) => child,
                Err(err) => {
                    yield SessionEvent::error(err.to_string());
                    return;
                }
            };

            let Some(stdout) = child.stdout.take() else {
                yield SessionEvent::error("claude process produced no stdout");
                return;
            };

            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        for event in parse_stream_json_line(&line) {
                            yield event;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        yield SessionEvent::error(format!("failed reading claude output: {err}"));
                        return;
                    }
                }
            }

            match child.wait().await {
                Ok(status) if !status.success() => {
                    yield SessionEvent::error(format!("claude exited with {status}"));
                    return;
                }
                Err(err) => {
                    yield SessionEvent::error(format!("failed waiting on claude process: {err}"));
                    return;
                }
                _ => {}
            }

            yield SessionEvent::done();
        })
    }
}

/// Parse one `stream-json` line into zero or more [`SessionEvent`]s.
/// Unrecognised line shapes are ignored rather than treated as errors --
/// only the `error` event type and I/O failures surface as `Error`.
fn parse_stream_json_line(line: &str) -> Vec<SessionEvent> {
    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(_) => return Vec::new(),
    };

    let event_type = value.get("type").and_then(|t| t.as_str()).unwrap_or("");
    let mut events = Vec::new();

    match event_type {
        "assistant" => {
            if let Some(blocks) = value.pointer("/message/content").and_then(|c| c.as_array()) {
                for block in blocks {
                    match block.get("type").and_then(|t| t.as_str()) {
                        Some("text") => {
                            if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                                events.push(SessionEvent::content(text));
                            }
                        }
                        Some("thinking") => {
                            if let Some(text) = block.get("thinking").and_then(|t| t.as_str()) {
                                events.push(SessionEvent {
                                    kind: taskboard_core::SessionEventKind::Thinking,
                                    content: Some(text.to_string()),
                                    tool_name: None,
                                    tool_result: None,
                                    error: None,
                                });
                            }
                        }
                        Some("tool_use") => {
                            let tool_name = block.get("name").and_then(|n| n.as_str()).unwrap_or("unknown");
                            events.push(SessionEvent {
                                kind: taskboard_core::SessionEventKind::ToolCall,
                                content: None,
                                tool_name: Some(tool_name.to_string()),
                                tool_result: block.get("input").map(|v| v.to_string()),
                                error: None,
                            });
                        }
                        _ => {}
                    }
                }
            }
        }
        "tool_result" => {
            let tool_name = value.get("name").and_then(|n| n.as_str()).unwrap_or("unknown");
            let output = value.get("output").or_else(|| value.get("content")).map(|v| v.to_string()).unwrap_or_default();
            events.push(SessionEvent {
                kind: taskboard_core::SessionEventKind::ToolResult,
                content: None,
                tool_name: Some(tool_name.to_string()),
                tool_result: Some(output),
                error: None,
            });
        }
        "result" => {
            if let Some(text) = value.get("result").and_then(|r| r.as_str()) {
                events.push(SessionEvent::content(text));
            }
        }
        "error" => {
            let message = value
                .pointer("/error/message")
                .and_then(|m| m.as_str())
                .or_else(|| value.get("message").and_then(|m| m.as_str()))
                .unwrap_or("unknown error");
            events.push(SessionEvent::error(message));
        }
        _ => {}
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assistant_text_block() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"hello"}]}}"#;
        let events = parse_stream_json_line(line);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].content.as_deref(), Some("hello"));
    }

    #[test]
    fn parses_tool_use_block() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"search","input":{"q":"rust"}}]}}"#;
        let events = parse_stream_json_line(line);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tool_name.as_deref(), Some("search"));
    }

    #[test]
    fn parses_result_line() {
        let line = r#"{"type":"result","result":"final answer"}"#;
        let events = parse_stream_json_line(line);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].content.as_deref(), Some("final answer"));
    }

    #[test]
    fn parses_error_line() {
        let line = r#"{"type":"error","error":{"message":"boom"}}"#;
        let events = parse_stream_json_line(line);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].error.as_deref(), Some("boom"));
    }

    #[test]
    fn ignores_unrecognised_line_shape() {
        let line = r#"{"type":"system","subtype":"init"}"#;
        assert!(parse_stream_json_line(line).is_empty());
    }

    #[test]
    fn ignores_malformed_json() {
        assert!(parse_stream_json_line("not json").is_empty());
    }
}
