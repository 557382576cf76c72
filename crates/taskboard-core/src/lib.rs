//! Core TaskBoard engine: the Board façade, the Scheduler dispatch loop,
//! goal planning, and workspace synthesis, all layered on top of the
//! `taskboard-db` store.

pub mod board;
pub mod bus;
pub mod error;
pub mod handle;
pub mod plan;
pub mod scheduler;
pub mod session;
pub mod synth;

pub use board::{Board, Overview};
pub use bus::{BoardEvent, BoardEventKind, EventBus};
pub use error::{BoardError, ExecutionError, PlanError};
pub use handle::{NoopSchedulerHandle, SchedulerHandle};
pub use plan::{approve_and_create, plan, PlanEvent, PlanEventStream, PlanResult, PlannedTask};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use session::{Session, SessionEvent, SessionEventKind, SessionManager};
pub use synth::synthesize;
