//! Performance benchmarks for the entity id newtypes.
//!
//! Measures `generate`/`parse`/`parse_flexible`/`as_str` against the
//! complexity table documented on `iron_types::ids`. Used to establish a
//! baseline and detect regressions across the id types used throughout
//! the coordination core (`OperationId`, `LockId`, `MessageId`, `TaskId`).
//!
//! ```bash
//! cargo bench --bench id_benchmarks
//! ```

use criterion::{ black_box, criterion_group, criterion_main, Criterion };
use iron_types::{ AgentId, LockId, MessageId, OperationId, TaskId };

fn benchmark_generate( c: &mut Criterion )
{
  c.bench_function( "agent_id_generate", |b|
  {
    b.iter( AgentId::generate );
  } );

  c.bench_function( "operation_id_generate", |b|
  {
    b.iter( OperationId::generate );
  } );

  c.bench_function( "message_id_generate", |b|
  {
    b.iter( MessageId::generate );
  } );
}

fn benchmark_parse( c: &mut Criterion )
{
  let valid = AgentId::generate().as_str().to_string();

  c.bench_function( "agent_id_parse", |b|
  {
    b.iter( || AgentId::parse( black_box( &valid ) ) );
  } );
}

fn benchmark_parse_flexible( c: &mut Criterion )
{
  let legacy = format!( "task-{}", uuid::Uuid::new_v4() );

  c.bench_function( "task_id_parse_flexible_legacy_hyphen", |b|
  {
    b.iter( || TaskId::parse_flexible( black_box( &legacy ) ) );
  } );
}

fn benchmark_as_str( c: &mut Criterion )
{
  let id = LockId::generate();

  c.bench_function( "lock_id_as_str", |b|
  {
    b.iter( || black_box( &id ).as_str() );
  } );
}

criterion_group!(
  id_benchmarks,
  benchmark_generate,
  benchmark_parse,
  benchmark_parse_flexible,
  benchmark_as_str,
);

criterion_main!( id_benchmarks );
