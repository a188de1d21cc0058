//! Alert evaluation, action dispatch, and the service facade.

mod actions;
mod evaluator;
mod service;

pub use actions::{ActionDispatcher, DispatchError, TracingDispatcher};
pub use evaluator::{AlertEvaluator, EvaluateError, TestError, TestOutcome};
pub use service::{AlertService, ServiceError};
