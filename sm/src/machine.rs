// Copyright (C) Microsoft Corporation. All rights reserved.

//! State-machine instances and their transition history.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use swx_types::LockClass;
use swx_types::SwitchId;
use swx_types::Timestamp;
use swx_types::Wait;
use tracing::instrument;

use swx_osal::OsalLock;

use crate::engine::SmEngine;
use crate::error::SmError;
use crate::table::SmEvent;
use crate::table::SmTransition;
use crate::table::SmType;

/// Compute the destination of a matched table entry and run its action.
///
/// Returns the next state (`None` means stay put) or the first callback
/// error; the caller decides what a failure does to the instance.
fn run_entry(
    entry: &SmTransition,
    event: &SmEvent<'_>,
    nr_states: usize,
) -> Result<Option<usize>, SmError> {
    let next = match &entry.condition {
        Some(condition) => {
            let next = condition(event)?;
            if next >= nr_states {
                return Err(SmError::InvalidNextState {
                    returned: next,
                    nr_states,
                });
            }
            Some(next)
        }
        None => entry.next_state,
    };
    if let Some(action) = &entry.action {
        action(event)?;
    }
    Ok(next)
}

/// What clock a history record's timestamp is taken from.
///
/// The mode affects only what is recorded, never transition logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampMode {
    /// Monotonic time since the engine was created.
    #[default]
    SystemUptime,
    /// Absolute wall-clock time.
    Absolute,
    /// Monotonic time since the history was last cleared.
    SinceLastClear,
}

/// Outcome of one event notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State when the event arrived.
    pub from: usize,
    /// State after processing; equals `from` when the event did not move
    /// the machine.
    pub to: usize,
    /// Whether a table entry matched `{from, event}`. An unhandled event
    /// is benign, not an error.
    pub handled: bool,
}

/// One recorded transition in an instance's history ring.
#[derive(Debug, Clone)]
pub struct TransitionRecord {
    /// The event that was processed.
    pub event_id: usize,
    /// The instance's caller-supplied id.
    pub user_id: u32,
    /// Timestamp per the instance's [TimestampMode].
    pub timestamp: Timestamp,
    /// State before the event.
    pub from: usize,
    /// State after the event.
    pub to: usize,
    /// Whether a table entry matched.
    pub handled: bool,
    /// Outcome of the transition. A failed transition (callback error,
    /// out-of-range condition result) leaves the state unchanged but is
    /// still recorded, carrying the error here.
    pub status: Result<(), SmError>,
    /// Caller payload, truncated to the instance's payload bound.
    pub payload: Vec<u8>,
}

struct SmInner {
    ty: Option<Arc<SmType>>,
    current: usize,
    history: VecDeque<TransitionRecord>,
    history_cap: usize,
    payload_cap: usize,
    ts_mode: TimestampMode,
    last_clear: Instant,
}

/// One live instance of a registered state-machine type.
///
/// Event processing is atomic per instance: [StateMachine::notify] is
/// serialized through an internal [OsalLock] of class
/// [LockClass::StateMachine], so the lock participates in the global
/// precedence order and concurrent events on different instances proceed
/// independently.
pub struct StateMachine {
    engine: SmEngine,
    user_id: u32,
    lock: OsalLock,
    inner: Mutex<SmInner>,
}

impl StateMachine {
    pub(crate) fn new(
        engine: SmEngine,
        user_id: u32,
        history_size: usize,
        payload_size: usize,
    ) -> StateMachine {
        let lock = OsalLock::new(
            format!("sm-{user_id}"),
            SwitchId::GLOBAL,
            LockClass::StateMachine,
            engine.registry(),
        );
        StateMachine {
            engine,
            user_id,
            lock,
            inner: Mutex::new(SmInner {
                ty: None,
                current: 0,
                history: VecDeque::with_capacity(history_size),
                history_cap: history_size,
                payload_cap: payload_size,
                ts_mode: TimestampMode::default(),
                last_clear: Instant::now(),
            }),
        }
    }

    /// The caller-supplied instance id.
    pub fn user_id(&self) -> u32 {
        self.user_id
    }

    /// Run `f` with the instance serialized against concurrent events.
    fn with_locked<T>(&self, f: impl FnOnce(&mut SmInner) -> Result<T, SmError>) -> Result<T, SmError> {
        self.lock.capture(Wait::Forever)?;
        let result = {
            let mut inner = self.inner.lock();
            f(&mut inner)
        };
        let released = self.lock.release();
        let value = result?;
        released?;
        Ok(value)
    }

    /// Bind the instance to a registered type and set its initial state.
    #[instrument(skip(self), fields(user_id = self.user_id))]
    pub fn start(&self, type_id: u32, initial_state: usize) -> Result<(), SmError> {
        // acquire() already counts this instance against the type, which
        // closes the window in which a concurrent unregistration could see
        // the type as unused.
        let ty = self
            .engine
            .acquire(type_id)
            .ok_or(SmError::TypeNotRegistered(type_id))?;
        let result = self.with_locked(|inner| {
            if inner.ty.is_some() {
                return Err(SmError::AlreadyStarted);
            }
            if initial_state >= ty.nr_states {
                return Err(SmError::InvalidState {
                    state: initial_state,
                    nr_states: ty.nr_states,
                });
            }
            inner.current = initial_state;
            inner.ty = Some(ty.clone());
            tracing::debug!(type_id, initial_state, "state machine started");
            Ok(())
        });
        if result.is_err() {
            ty.instances.fetch_sub(1, Ordering::AcqRel);
        }
        result
    }

    /// Detach the instance from its type; further events are errors.
    #[instrument(skip(self), fields(user_id = self.user_id))]
    pub fn stop(&self) -> Result<(), SmError> {
        self.with_locked(|inner| {
            let ty = inner.ty.take().ok_or(SmError::NotStarted)?;
            ty.instances.fetch_sub(1, Ordering::AcqRel);
            tracing::debug!(type_id = ty.id, "state machine stopped");
            Ok(())
        })
    }

    /// Process one event.
    ///
    /// Looks up `{current state, event}` in the type's table; a condition
    /// callback, if present, computes the next state, otherwise the static
    /// next state applies; the action callback, if present, runs during
    /// the move. A missing table entry is a benign no-op reported as an
    /// unhandled [Transition]. Callback failures and out-of-range
    /// condition results leave the current state unchanged; the failed
    /// transition is still recorded in history with its error status.
    pub fn notify(&self, event_id: usize, payload: &[u8]) -> Result<Transition, SmError> {
        self.with_locked(|inner| {
            let ty = inner.ty.clone().ok_or(SmError::NotStarted)?;
            if event_id >= ty.nr_events {
                return Err(SmError::InvalidEvent {
                    event: event_id,
                    nr_events: ty.nr_events,
                });
            }

            let from = inner.current;
            let (transition, status) = match ty.entry(from, event_id) {
                None => (
                    Transition {
                        from,
                        to: from,
                        handled: false,
                    },
                    Ok(()),
                ),
                Some(entry) => {
                    let event = SmEvent {
                        event_id,
                        user_id: self.user_id,
                        state: from,
                        payload,
                    };
                    match run_entry(entry, &event, ty.nr_states) {
                        Ok(next) => {
                            let to = next.unwrap_or(from);
                            inner.current = to;
                            (
                                Transition {
                                    from,
                                    to,
                                    handled: true,
                                },
                                Ok(()),
                            )
                        }
                        Err(err) => (
                            Transition {
                                from,
                                to: from,
                                handled: true,
                            },
                            Err(err),
                        ),
                    }
                }
            };

            tracing::trace!(
                user_id = self.user_id,
                event_id,
                from = transition.from,
                to = transition.to,
                handled = transition.handled,
                ok = status.is_ok(),
                "state machine event"
            );
            self.record(inner, &ty, event_id, payload, transition, status.clone());
            status.map(|()| transition)
        })
    }

    fn record(
        &self,
        inner: &mut SmInner,
        ty: &SmType,
        event_id: usize,
        payload: &[u8],
        transition: Transition,
        status: Result<(), SmError>,
    ) {
        if inner.history_cap == 0 && ty.logger.is_none() {
            return;
        }
        let kept = payload.len().min(inner.payload_cap);
        let record = TransitionRecord {
            event_id,
            user_id: self.user_id,
            timestamp: self.timestamp(inner.ts_mode, inner.last_clear),
            from: transition.from,
            to: transition.to,
            handled: transition.handled,
            status,
            payload: payload[..kept].to_vec(),
        };
        if let Some(logger) = &ty.logger {
            logger(&record);
        }
        if inner.history_cap > 0 {
            if inner.history.len() == inner.history_cap {
                inner.history.pop_front();
            }
            inner.history.push_back(record);
        }
    }

    fn timestamp(&self, mode: TimestampMode, last_clear: Instant) -> Timestamp {
        match mode {
            TimestampMode::SystemUptime => Timestamp::since(self.engine.epoch()),
            TimestampMode::Absolute => Timestamp::now_wall(),
            TimestampMode::SinceLastClear => Timestamp::since(last_clear),
        }
    }

    /// The instance's current state.
    pub fn current_state(&self) -> Result<usize, SmError> {
        let inner = self.inner.lock();
        if inner.ty.is_none() {
            return Err(SmError::NotStarted);
        }
        Ok(inner.current)
    }

    /// Select the clock used for subsequent history records.
    pub fn set_timestamp_mode(&self, mode: TimestampMode) {
        self.inner.lock().ts_mode = mode;
    }

    /// The most recent transitions, oldest first.
    pub fn history(&self) -> Vec<TransitionRecord> {
        self.inner.lock().history.iter().cloned().collect()
    }

    /// Drop all history records and reset the since-last-clear clock.
    pub fn clear_history(&self) {
        let mut inner = self.inner.lock();
        inner.history.clear();
        inner.last_clear = Instant::now();
    }

    /// Change the history capacity at runtime; 0 disables history. Excess
    /// records are dropped oldest-first.
    pub fn resize_history(&self, capacity: usize) {
        let mut inner = self.inner.lock();
        inner.history_cap = capacity;
        while inner.history.len() > capacity {
            inner.history.pop_front();
        }
    }

    /// Dump the instance's state and history through the logging sink.
    pub fn dbg_dump(&self) {
        let inner = self.inner.lock();
        tracing::info!(
            user_id = self.user_id,
            type_id = inner.ty.as_ref().map(|ty| ty.id),
            state = inner.current,
            history_len = inner.history.len(),
            history_cap = inner.history_cap,
            ts_mode = ?inner.ts_mode,
            "state machine"
        );
        for record in inner.history.iter() {
            tracing::info!(
                event_id = record.event_id,
                timestamp = %record.timestamp,
                from = record.from,
                to = record.to,
                handled = record.handled,
                "history record"
            );
        }
    }
}

impl Drop for StateMachine {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        if let Some(ty) = inner.ty.take() {
            ty.instances.fetch_sub(1, Ordering::AcqRel);
        }
    }
}
