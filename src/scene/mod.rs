//! Runtime scene state: the instance registry and the top-level rebuild protocol.

pub mod rebuild;
pub mod registry;
