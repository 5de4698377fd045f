// Copyright (C) Microsoft Corporation. All rights reserved.

//! State-machine engine - Error module

use swx_osal::OsalError;
use thiserror::Error;

/// Errors reported by the state-machine engine.
///
/// An event with no matching table entry is NOT an error; protocol state
/// machines routinely receive events irrelevant to their current state,
/// so that case is reported as an unhandled
/// [Transition](crate::machine::Transition).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SmError {
    /// The state-machine type id was never registered.
    #[error("state-machine type {0} is not registered")]
    TypeNotRegistered(u32),

    /// The state-machine type id is already registered.
    #[error("state-machine type {0} is already registered")]
    TypeAlreadyRegistered(u32),

    /// Instances of the type still exist.
    #[error("state-machine type {type_id} still has {instances} live instance(s)")]
    TypeInUse {
        /// The type being unregistered.
        type_id: u32,
        /// Number of live instances referencing it.
        instances: usize,
    },

    /// The instance is already bound to a type.
    #[error("state machine is already started")]
    AlreadyStarted,

    /// The instance is not bound to a type.
    #[error("state machine is not started")]
    NotStarted,

    /// A state index is outside the type's table.
    #[error("state {state} out of range (type has {nr_states} states)")]
    InvalidState {
        /// The offending state index.
        state: usize,
        /// Number of states in the type.
        nr_states: usize,
    },

    /// An event id is outside the type's table.
    #[error("event {event} out of range (type has {nr_events} events)")]
    InvalidEvent {
        /// The offending event id.
        event: usize,
        /// Number of events in the type.
        nr_events: usize,
    },

    /// A condition callback computed a state outside the table. This is a
    /// programming error in the callback; the instance's current state is
    /// left unchanged.
    #[error("condition callback returned state {returned} (type has {nr_states} states)")]
    InvalidNextState {
        /// The state the callback returned.
        returned: usize,
        /// Number of states in the type.
        nr_states: usize,
    },

    /// An action or condition callback failed.
    #[error("callback failed: {0}")]
    Callback(String),

    /// Failure in the underlying lock package.
    #[error("lock error: {0}")]
    Osal(#[from] OsalError),
}
