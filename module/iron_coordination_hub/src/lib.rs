//! The Communication Hub: priority message routing composing the Budget
//! Manager, Lock Manager, and State Store, plus the bridged collaborator
//! traits (language model, filesystem) it dispatches CLAUDE_REQUEST and
//! FILE_* messages to.

#![cfg_attr(not(feature = "enabled"), allow(unused))]

#[cfg(feature = "enabled")]
pub mod collaborators;
#[cfg(feature = "enabled")]
pub mod hub;
#[cfg(feature = "enabled")]
pub mod message;

#[cfg(feature = "enabled")]
pub use collaborators::{ Filesystem, LanguageModelClient };
#[cfg(feature = "enabled")]
pub use hub::{ Hub, HubConfig, HubEvent, HubResponse };
#[cfg(feature = "enabled")]
pub use message::{ Message, MessageKind };
