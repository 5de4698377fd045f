// Copyright (C) Microsoft Corporation. All rights reserved.

//! State-machine type definitions: the shared transition tables.

use std::fmt;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use crate::error::SmError;
use crate::machine::TransitionRecord;

/// Context handed to action and condition callbacks during a transition.
///
/// Anything beyond this (per-port driver state, hardware handles) is
/// expected to be captured by the callback closures themselves.
#[derive(Debug)]
pub struct SmEvent<'a> {
    /// The event being processed.
    pub event_id: usize,
    /// Caller-supplied id of the instance (port number, monitor id, ...).
    pub user_id: u32,
    /// The instance's state when the event arrived.
    pub state: usize,
    /// Caller-supplied payload for this notification.
    pub payload: &'a [u8],
}

/// Side-effect callback invoked while a transition is being made.
pub type ActionFn = Arc<dyn Fn(&SmEvent<'_>) -> Result<(), SmError> + Send + Sync>;

/// Callback that computes the next state from runtime data, used when the
/// next state depends on more than `{state, event}`.
pub type ConditionFn = Arc<dyn Fn(&SmEvent<'_>) -> Result<usize, SmError> + Send + Sync>;

/// Per-type observer invoked after each recorded transition.
pub type TransitionLogger = Arc<dyn Fn(&TransitionRecord) + Send + Sync>;

/// One `{state, event}` entry of a transition table.
///
/// `next_state` set with no callbacks is a plain static transition; a
/// `condition` overrides `next_state` dynamically; an entry with an
/// `action` but no next state handles the event in place. A missing entry
/// means the event is ignored in that state.
#[derive(Clone, Default)]
pub struct SmTransition {
    /// Statically-known next state, if any.
    pub next_state: Option<usize>,
    /// Invoked during the move.
    pub action: Option<ActionFn>,
    /// Computes the next state dynamically, overriding `next_state`.
    pub condition: Option<ConditionFn>,
}

impl fmt::Debug for SmTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmTransition")
            .field("next_state", &self.next_state)
            .field("action", &self.action.is_some())
            .field("condition", &self.condition.is_some())
            .finish()
    }
}

/// Everything needed to register a state-machine type.
pub struct SmTableSpec {
    /// Process-wide numeric id of the type.
    pub type_id: u32,
    /// Number of states; states are `0..nr_states`.
    pub nr_states: usize,
    /// Number of events; events are `0..nr_events`.
    pub nr_events: usize,
    /// Sparse `{state, event, transition}` entries; unlisted pairs ignore
    /// the event.
    pub entries: Vec<(usize, usize, SmTransition)>,
    /// Optional observer of recorded transitions.
    pub logger: Option<TransitionLogger>,
    /// Succeed silently if the type id is already registered.
    pub ok_if_registered: bool,
}

/// A registered state-machine type: the dense transition table shared by
/// all instances of the type.
pub(crate) struct SmType {
    pub(crate) id: u32,
    pub(crate) nr_states: usize,
    pub(crate) nr_events: usize,
    entries: Vec<Option<SmTransition>>,
    pub(crate) logger: Option<TransitionLogger>,
    pub(crate) instances: AtomicUsize,
}

impl fmt::Debug for SmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmType")
            .field("id", &self.id)
            .field("nr_states", &self.nr_states)
            .field("nr_events", &self.nr_events)
            .field("entries", &self.entries)
            .field("logger", &self.logger.is_some())
            .field("instances", &self.instances)
            .finish()
    }
}

impl SmType {
    pub(crate) fn from_spec(spec: SmTableSpec) -> Result<SmType, SmError> {
        let mut entries: Vec<Option<SmTransition>> = Vec::new();
        entries.resize_with(spec.nr_states * spec.nr_events, || None);

        for (state, event, transition) in spec.entries {
            if state >= spec.nr_states {
                return Err(SmError::InvalidState {
                    state,
                    nr_states: spec.nr_states,
                });
            }
            if event >= spec.nr_events {
                return Err(SmError::InvalidEvent {
                    event,
                    nr_events: spec.nr_events,
                });
            }
            if let Some(next) = transition.next_state {
                if next >= spec.nr_states {
                    return Err(SmError::InvalidState {
                        state: next,
                        nr_states: spec.nr_states,
                    });
                }
            }
            entries[state * spec.nr_events + event] = Some(transition);
        }

        Ok(SmType {
            id: spec.type_id,
            nr_states: spec.nr_states,
            nr_events: spec.nr_events,
            entries,
            logger: spec.logger,
            instances: AtomicUsize::new(0),
        })
    }

    /// Table entry for `{state, event}`, if one was registered.
    pub(crate) fn entry(&self, state: usize, event: usize) -> Option<&SmTransition> {
        self.entries[state * self.nr_events + event].as_ref()
    }
}
