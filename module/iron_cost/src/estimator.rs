//! Pure, stateless cost estimation.
//!
//! Estimates a dollar cost for an LLM call or a planned task before any
//! money is committed. Never touches the ledger; callers pass the result
//! into `BudgetManager::validate_operation`.

use crate::pricing::Model;
use iron_types::{ Error, Result };

/// Average characters per token used for the rough token estimate.
const CHARS_PER_TOKEN: f64 = 4.0;
/// Fudge factor applied on top of the naive length/4 estimate.
const TOKEN_ESTIMATE_FUDGE: f64 = 1.1;
/// Multiplier applied to account for retries of a task.
const RETRY_BUFFER: f64 = 1.2;

/// A single chat message passed to an LLM, for cost-estimation purposes.
#[derive(Debug, Clone)]
pub struct ChatMessage
{
  pub role: String,
  pub content: String,
}

/// Result of a cost estimate: token counts plus a dollar total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate
{
  pub input_tokens: u32,
  pub output_tokens: u32,
  pub total_usd: f64,
}

/// Relative complexity of a planned task, scaling its estimated cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskComplexity
{
  Low,
  Medium,
  High,
  Critical,
}

impl TaskComplexity
{
  fn factor( self ) -> f64
  {
    match self
    {
      TaskComplexity::Low => 1.0,
      TaskComplexity::Medium => 1.5,
      TaskComplexity::High => 2.0,
      TaskComplexity::Critical => 2.5,
    }
  }
}

/// Category of work a task performs, scaling its estimated cost.
///
/// Code generation and review tasks tend to round-trip the full file
/// context through the model; planning and status tasks are comparatively
/// cheap. Unlisted categories use the baseline factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType
{
  Planning,
  CodeGeneration,
  Review,
  Testing,
  Other,
}

impl TaskType
{
  fn factor( self ) -> f64
  {
    match self
    {
      TaskType::Planning => 0.8,
      TaskType::CodeGeneration => 1.3,
      TaskType::Review => 1.1,
      TaskType::Testing => 1.0,
      TaskType::Other => 1.0,
    }
  }
}

/// A unit of planned work to be cost-estimated before execution.
#[derive(Debug, Clone)]
pub struct Task
{
  pub description: String,
  pub complexity: TaskComplexity,
  pub task_type: TaskType,
  pub expected_output_tokens: u32,
}

/// Estimate the number of tokens a string of text will consume.
///
/// `ceil(len(text) / 4) * 1.1`, matching the rough heuristic LLM clients
/// use before an exact tokenizer result is available.
pub fn estimate_tokens( text: &str ) -> u32
{
  let raw = ( text.len() as f64 / CHARS_PER_TOKEN ).ceil();
  ( raw * TOKEN_ESTIMATE_FUDGE ).ceil() as u32
}

/// Estimate the dollar cost of sending `messages` to `model`, capped at
/// `max_tokens` output tokens (falling back to the model's own limit).
pub fn estimate_message_cost(
  messages: &[ ChatMessage ],
  max_tokens: Option< u32 >,
  model: &Model,
) -> Result< CostEstimate >
{
  if !model.has_valid_pricing()
  {
    return Err( Error::BudgetValidation(
      iron_types::BudgetValidationError( format!( "unknown or unpriced model: {}", model.name() ) )
    ) );
  }

  let input_tokens: u32 = messages
    .iter()
    .map( | m | estimate_tokens( &m.content ) )
    .sum();

  let output_tokens = max_tokens
    .or( model.max_output_tokens() )
    .unwrap_or( input_tokens );

  let total_usd = model.calculate_cost( input_tokens, output_tokens );

  Ok( CostEstimate { input_tokens, output_tokens, total_usd } )
}

/// Estimate the dollar cost of executing `task` against `model`.
///
/// `base_cost = calculate_cost(estimate_tokens(description), expected_output_tokens)`,
/// scaled by the task's complexity factor, task-type factor, and a fixed
/// 1.2x retry buffer.
pub fn estimate_task_cost( task: &Task, model: &Model ) -> Result< CostEstimate >
{
  if !model.has_valid_pricing()
  {
    return Err( Error::BudgetValidation(
      iron_types::BudgetValidationError( format!( "unknown or unpriced model: {}", model.name() ) )
    ) );
  }

  let input_tokens = estimate_tokens( &task.description );
  let output_tokens = task.expected_output_tokens;

  let base_cost = model.calculate_cost( input_tokens, output_tokens );
  let total_usd = base_cost * task.complexity.factor() * task.task_type.factor() * RETRY_BUFFER;

  Ok( CostEstimate { input_tokens, output_tokens, total_usd } )
}

#[cfg(test)]
mod tests
{
  use super::*;
  use crate::pricing::PricingManager;

  fn priced_model() -> Model
  {
    let manager = PricingManager::new().expect( "pricing manager loads embedded data" );
    manager
      .get( "gpt-3.5-turbo" )
      .or_else( || manager.get( "gpt-4" ) )
      .expect( "at least one priced model is embedded" )
  }

  #[test]
  fn estimate_tokens_matches_formula()
  {
    // 8 chars / 4 = 2.0, * 1.1 = 2.2 -> ceil = 3
    assert_eq!( estimate_tokens( "abcdefgh" ), 3 );
    assert_eq!( estimate_tokens( "" ), 0 );
  }

  #[test]
  fn task_complexity_scales_cost()
  {
    let model = priced_model();
    let mut task = Task
    {
      description: "implement a parser".to_string(),
      complexity: TaskComplexity::Low,
      task_type: TaskType::Other,
      expected_output_tokens: 100,
    };

    let low = estimate_task_cost( &task, &model ).unwrap();
    task.complexity = TaskComplexity::Critical;
    let critical = estimate_task_cost( &task, &model ).unwrap();

    assert!( critical.total_usd > low.total_usd );
  }

  #[test]
  fn unknown_model_fails_loudly()
  {
    let model = Model::default();
    let task = Task
    {
      description: "x".to_string(),
      complexity: TaskComplexity::Low,
      task_type: TaskType::Other,
      expected_output_tokens: 1,
    };

    assert!( estimate_task_cost( &task, &model ).is_err() );
  }
}
