//! Integration layer wiring the Budget Manager, Distributed Lock
//! Manager, Communication Hub, and Task Executor into a single
//! coordination core, plus the default collaborator implementations and
//! layered configuration used to build one.

#![cfg_attr(not(feature = "enabled"), allow(unused))]

#[cfg(feature = "enabled")]
pub mod collaborators;
#[cfg(feature = "enabled")]
pub mod config;
#[cfg(feature = "enabled")]
pub mod core;

#[cfg(feature = "enabled")]
pub use collaborators::{ LocalFilesystem, NullLanguageModelClient };
#[cfg(feature = "enabled")]
pub use config::RuntimeConfig;
#[cfg(feature = "enabled")]
pub use core::CoordinationCore;
