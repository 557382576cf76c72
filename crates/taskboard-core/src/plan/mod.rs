//! Planning: goal -> validated [`schema::PlanResult`] -> materialized
//! workspace/task DAG (§4.6).

pub mod planner;
pub mod prompt;
pub mod schema;
pub mod service;

pub use planner::{plan, PlanEvent, PlanEventStream};
pub use schema::{PlanResult, PlannedTask};
pub use service::approve_and_create;
