//! Deferred method invocation.
//!
//! The original kernel represents a scheduled callback as
//! `(owner, activation_method, *act_params)` and dispatches it with
//! `getattr(owner, activation)(*act_params)` at fire time. Rust has no
//! reflective equivalent, and closures captured over `&mut` entity state
//! would violate the "never capture closures over mutable state across
//! event boundaries" rule: a closure closing over a `&mut Node` cannot be
//! stored in a queue the node itself lives in.
//!
//! Instead a [`Process`] names its target entity and carries a tagged
//! [`crate::kernel::entity::EntityEvent`] payload. `Timeline::run` resolves
//! the name back to the live entity at fire time (the "entity swap" in
//! `Timeline::execute`), which is the Rust analogue of the Python
//! `getattr(owner, activation)` re-fetch.

use crate::kernel::entity::EntityEvent;

#[derive(Debug, Clone)]
pub struct Process {
    pub owner: String,
    pub activation: EntityEvent,
}

impl Process {
    pub fn new(owner: impl Into<String>, activation: EntityEvent) -> Self {
        Self {
            owner: owner.into(),
            activation,
        }
    }
}
