//! `SessionManager` -- the inward interface the core consumes for all LLM
//! work (task dispatch, planning, synthesis).
//!
//! This plays the same role the host's `Harness` trait plays for agent
//! processes: an object-safe adapter boundary so the core never needs to
//! know how a concrete provider is wired. Unlike `Harness`, which spawns an
//! OS subprocess, a `Session` here is a logical conversation with an LLM
//! provider; the concrete chat/tool wiring lives entirely outside this
//! crate's non-goals.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

/// One event from a session's streaming response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEventKind {
    Content,
    Thinking,
    ToolCall,
    ToolResult,
    Error,
    Done,
}

#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub content: Option<String>,
    pub tool_name: Option<String>,
    pub tool_result: Option<String>,
    pub error: Option<String>,
}

impl SessionEvent {
    pub fn content(text: impl Into<String>) -> Self {
        SessionEvent {
            kind: SessionEventKind::Content,
            content: Some(text.into()),
            tool_name: None,
            tool_result: None,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        SessionEvent {
            kind: SessionEventKind::Error,
            content: None,
            tool_name: None,
            tool_result: None,
            error: Some(message.into()),
        }
    }

    pub fn done() -> Self {
        SessionEvent {
            kind: SessionEventKind::Done,
            content: None,
            tool_name: None,
            tool_result: None,
            error: None,
        }
    }
}

pub type EventStream = Pin<Box<dyn Stream<Item = SessionEvent> + Send>>;

/// A single transient conversation with an LLM provider.
///
/// Object-safe so it can be stored as `Box<dyn Session>`.
#[async_trait]
pub trait Session: Send + Sync {
    fn id(&self) -> &str;

    /// Inject shared prose into the session's system prompt. Called once,
    /// before the first `chat_stream`, with a workspace's shared context.
    async fn inject_context(&self, prose: &str) -> anyhow::Result<()>;

    /// Send a prompt and stream back the response.
    fn chat_stream(&self, prompt: &str) -> EventStream;
}

/// Factory for transient [`Session`]s, uniquely named per call.
///
/// Implementors wrap whatever chat-session runtime and LLM provider wiring
/// the host repository's `agent` module provides; this core treats that
/// entirely as an external collaborator.
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Create a new transient session named `name` (e.g. the task id, or
    /// `"plan-<goal-hash>"` for planning).
    async fn create_session(&self, name: &str) -> anyhow::Result<Box<dyn Session>>;

    /// Release a session's resources.
    async fn delete(&self, id: &str) -> anyhow::Result<()>;
}

#[cfg(test)]
pub mod fakes {
    //! An in-memory `SessionManager` used throughout the Board/Scheduler
    //! test suite so end-to-end scenarios (§8) never need a live LLM.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// A scripted reply: either a sequence of content chunks ending in
    /// success, or a single error event.
    #[derive(Debug, Clone)]
    pub enum ScriptedReply {
        Content(Vec<String>),
        Error(String),
    }

    /// A simpler per-task fake: wraps one fixed reply, used directly as a
    /// `SessionManager` for single-call tests (planning, synthesis).
    pub struct FixedReplySessionManager {
        pub reply: ScriptedReply,
    }

    #[async_trait]
    impl SessionManager for FixedReplySessionManager {
        async fn create_session(&self, name: &str) -> anyhow::Result<Box<dyn Session>> {
            Ok(Box::new(FixedReplySession {
                id: name.to_string(),
                reply: self.reply.clone(),
            }))
        }

        async fn delete(&self, _id: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct FixedReplySession {
        id: String,
        reply: ScriptedReply,
    }

    #[async_trait]
    impl Session for FixedReplySession {
        fn id(&self) -> &str {
            &self.id
        }

        async fn inject_context(&self, _prose: &str) -> anyhow::Result<()> {
            Ok(())
        }

        fn chat_stream(&self, _prompt: &str) -> EventStream {
            let events = match &self.reply {
                ScriptedReply::Content(chunks) => {
                    let mut events: Vec<SessionEvent> =
                        chunks.iter().map(SessionEvent::content).collect();
                    events.push(SessionEvent::done());
                    events
                }
                ScriptedReply::Error(message) => vec![SessionEvent::error(message.clone())],
            };
            Box::pin(futures::stream::iter(events))
        }
    }

    /// A session manager that replays one scripted reply per call to
    /// `create_session`, in FIFO order -- this is what the §8 Retry and
    /// Exhaustion scenarios need (first call errors, later calls succeed).
    pub struct QueuedSessionManager {
        replies: Mutex<VecDeque<ScriptedReply>>,
    }

    impl QueuedSessionManager {
        pub fn new(replies: Vec<ScriptedReply>) -> Self {
            QueuedSessionManager {
                replies: Mutex::new(replies.into()),
            }
        }
    }

    #[async_trait]
    impl SessionManager for QueuedSessionManager {
        async fn create_session(&self, name: &str) -> anyhow::Result<Box<dyn Session>> {
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(ScriptedReply::Content(vec!["done".to_string()]));
            Ok(Box::new(FixedReplySession {
                id: name.to_string(),
                reply,
            }))
        }

        async fn delete(&self, _id: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn fixed_reply_session_streams_content_then_done() {
        use futures::StreamExt;

        let manager = FixedReplySessionManager {
            reply: ScriptedReply::Content(vec!["a".into(), "b".into()]),
        };
        let session = manager.create_session("t1").await.unwrap();
        let events: Vec<SessionEvent> = session.chat_stream("prompt").collect().await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].kind, SessionEventKind::Content);
        assert_eq!(events[2].kind, SessionEventKind::Done);
    }

    #[tokio::test]
    async fn queued_session_manager_replays_in_order() {
        use futures::StreamExt;

        let manager = QueuedSessionManager::new(vec![
            ScriptedReply::Error("boom".into()),
            ScriptedReply::Content(vec!["ok".into()]),
        ]);

        let first = manager.create_session("t1").await.unwrap();
        let first_events: Vec<SessionEvent> = first.chat_stream("p").collect().await;
        assert_eq!(first_events[0].kind, SessionEventKind::Error);

        let second = manager.create_session("t1").await.unwrap();
        let second_events: Vec<SessionEvent> = second.chat_stream("p").collect().await;
        assert_eq!(second_events[0].kind, SessionEventKind::Content);
    }
}
