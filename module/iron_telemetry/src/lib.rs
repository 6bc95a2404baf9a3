//! Centralized logging and tracing abstraction for Iron Cage runtime
//!
//! Provides unified logging infrastructure across all Iron Cage crates.
//! Features:
//! - Structured logging with tracing
//! - Multiple output formats (JSON, text)
//! - Log level configuration via environment variables
//! - Agent context injection in all logs

#![cfg_attr(not(feature = "enabled"), allow(unused_variables, dead_code))]

#[cfg(feature = "enabled")]
mod implementation
{
  use tracing::level_filters::LevelFilter;

  /// Log level configuration
  #[derive(Debug, Clone, Copy)]
  pub enum LogLevel
  {
    Debug,
    Info,
    Warn,
    Error,
  }

  impl From<LogLevel> for LevelFilter
  {
    fn from(level: LogLevel) -> Self
    {
      match level
      {
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Error => LevelFilter::ERROR,
      }
    }
  }

  /// Initialize logging infrastructure
  ///
  /// Sets up tracing subscriber with specified log level.
  /// Call this once at application startup.
  pub fn init_logging(level: LogLevel) -> Result<(), Box<dyn std::error::Error>>
  {
    use tracing_subscriber::FmtSubscriber;

    let subscriber = FmtSubscriber::builder()
      .with_max_level(level)
      .with_target(false)
      .with_thread_ids(true)
      .with_line_number(true)
      .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
  }

  /// Log an agent lifecycle event
  pub fn log_agent_event(agent_id: &str, event: &str)
  {
    tracing::info!(
      agent_id = %agent_id,
      event = %event,
      "Agent event"
    );
  }

  /// Log a budget warning
  pub fn log_budget_warning(agent_id: &str, spent: f64, limit: f64)
  {
    tracing::warn!(
      agent_id = %agent_id,
      spent = spent,
      limit = limit,
      percentage = (spent / limit) * 100.0,
      "Budget threshold reached"
    );
  }

  /// Log a budget operation's terminal outcome (usage, release, or expiry).
  pub fn log_budget_operation(operation_id: &str, agent_id: &str, outcome: &str)
  {
    tracing::info!(
      operation_id = %operation_id,
      agent_id = %agent_id,
      outcome = %outcome,
      "Budget operation resolved"
    );
  }

  /// Log a circuit breaker state transition.
  pub fn log_circuit_transition(from: &str, to: &str)
  {
    tracing::info!(
      from = %from,
      to = %to,
      "Circuit breaker transition"
    );
  }

  /// Log a lock manager event (acquired, released, expired, denied).
  pub fn log_lock_event(resource_id: &str, agent_id: &str, event: &str)
  {
    tracing::info!(
      resource_id = %resource_id,
      agent_id = %agent_id,
      event = %event,
      "Lock event"
    );
  }

  /// Log a communication hub event (dispatched, retried, timed out, errored).
  pub fn log_hub_event(message_id: &str, message_type: &str, event: &str)
  {
    tracing::info!(
      message_id = %message_id,
      message_type = %message_type,
      event = %event,
      "Hub event"
    );
  }

  /// Log a task executor event (assigned, completed, failed, checkpointed).
  pub fn log_task_event(task_id: &str, event: &str)
  {
    tracing::info!(
      task_id = %task_id,
      event = %event,
      "Task executor event"
    );
  }
}

#[cfg(feature = "enabled")]
pub use implementation::*;

#[cfg(not(feature = "enabled"))]
mod stub
{
  /// Stub log level for disabled feature
  #[derive(Debug, Clone, Copy)]
  pub enum LogLevel
  {
    Debug,
    Info,
    Warn,
    Error,
  }

  /// Stub init function
  pub fn init_logging(_level: LogLevel) -> Result<(), Box<dyn std::error::Error>>
  {
    Ok(())
  }

  /// Stub log function
  pub fn log_agent_event(_agent_id: &str, _event: &str) {}

  /// Stub log function
  pub fn log_budget_warning(_agent_id: &str, _spent: f64, _limit: f64) {}

  /// Stub log function
  pub fn log_budget_operation(_operation_id: &str, _agent_id: &str, _outcome: &str) {}

  /// Stub log function
  pub fn log_circuit_transition(_from: &str, _to: &str) {}

  /// Stub log function
  pub fn log_lock_event(_resource_id: &str, _agent_id: &str, _event: &str) {}

  /// Stub log function
  pub fn log_hub_event(_message_id: &str, _message_type: &str, _event: &str) {}

  /// Stub log function
  pub fn log_task_event(_task_id: &str, _event: &str) {}
}

#[cfg(not(feature = "enabled"))]
pub use stub::*;
