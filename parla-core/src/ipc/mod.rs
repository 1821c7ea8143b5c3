//! Event types serialised over the host application's event bus.
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` so a UI layer
//! can forward them as-is (camelCase fields, lowercase enum values).

pub mod events;
