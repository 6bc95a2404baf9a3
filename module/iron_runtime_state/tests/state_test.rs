use iron_runtime_state::{ Consistency, InMemoryStateStore, StateStore };
use iron_types::AgentId;

#[tokio::test]
async fn unconditional_writes_always_succeed_and_increment_version()
{
  let store = InMemoryStateStore::new();
  let agent = AgentId::generate();

  let first = store.write( "counter", serde_json::json!( 1 ), &agent, None ).await.unwrap();
  let second = store.write( "counter", serde_json::json!( 2 ), &agent, None ).await.unwrap();

  assert_eq!( first.version, 1 );
  assert_eq!( second.version, 2 );
}

#[tokio::test]
async fn reading_an_unwritten_key_returns_none()
{
  let store = InMemoryStateStore::new();
  let agent = AgentId::generate();

  let result = store.read( "never-written", &agent, Consistency::Strong ).await.unwrap();
  assert!( result.is_none() );
}

#[tokio::test]
async fn subscriptions_are_isolated_per_agent_and_survive_unrelated_cleanup()
{
  let store = InMemoryStateStore::new();
  let alice = AgentId::generate();
  let bob = AgentId::generate();

  let alice_sub = store.subscribe( "alice:*", &alice ).await.unwrap();
  let bob_sub = store.subscribe( "bob:*", &bob ).await.unwrap();

  let removed = store.unsubscribe_agent( &alice ).await;
  assert_eq!( removed, vec![ alice_sub.subscription_id ] );

  // Bob's subscription is untouched by Alice's cleanup.
  assert!( store.unsubscribe( &bob_sub.subscription_id ).await.is_ok() );
}
