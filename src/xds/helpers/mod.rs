//! Helpers for editing xDS resources passing through the relay.

mod listener_modifier;

pub use listener_modifier::{router_index, ListenerModifier};
