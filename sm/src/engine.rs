// Copyright (C) Microsoft Corporation. All rights reserved.

//! The engine context: registry of state-machine types.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use swx_osal::LockRegistry;
use tracing::instrument;

use crate::error::SmError;
use crate::machine::StateMachine;
use crate::table::SmTableSpec;
use crate::table::SmType;

struct EngineInner {
    registry: Arc<LockRegistry>,
    /// Reference instant for the system-uptime timestamp mode.
    epoch: Instant,
    types: RwLock<HashMap<u32, Arc<SmType>>>,
}

/// Handle to the state-machine engine.
///
/// Cheap to clone; all clones share the type registry. Created once at SDK
/// initialization with the process-wide [LockRegistry] so that every
/// instance's internal lock participates in the global precedence order.
#[derive(Clone)]
pub struct SmEngine {
    inner: Arc<EngineInner>,
}

impl SmEngine {
    /// Create an engine bound to the given lock registry.
    pub fn new(registry: Arc<LockRegistry>) -> SmEngine {
        SmEngine {
            inner: Arc::new(EngineInner {
                registry,
                epoch: Instant::now(),
                types: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a state-machine type from its transition table.
    ///
    /// Fails with [SmError::TypeAlreadyRegistered] on an id conflict
    /// unless the spec sets `ok_if_registered`, in which case the existing
    /// registration is kept untouched.
    #[instrument(skip(self, spec), fields(type_id = spec.type_id))]
    pub fn register_table(&self, spec: SmTableSpec) -> Result<(), SmError> {
        let mut types = self.inner.types.write();
        if types.contains_key(&spec.type_id) {
            if spec.ok_if_registered {
                tracing::debug!("type already registered, keeping existing table");
                return Ok(());
            }
            return Err(SmError::TypeAlreadyRegistered(spec.type_id));
        }
        let type_id = spec.type_id;
        let ty = SmType::from_spec(spec)?;
        tracing::debug!(
            nr_states = ty.nr_states,
            nr_events = ty.nr_events,
            "registered state-machine type"
        );
        types.insert(type_id, Arc::new(ty));
        Ok(())
    }

    /// Remove a registered type.
    ///
    /// Fails with [SmError::TypeInUse] while instances still reference the
    /// type, unless `skip_if_used` turns that case into a silent no-op.
    #[instrument(skip(self))]
    pub fn unregister_table(&self, type_id: u32, skip_if_used: bool) -> Result<(), SmError> {
        let mut types = self.inner.types.write();
        let Some(ty) = types.get(&type_id) else {
            return Err(SmError::TypeNotRegistered(type_id));
        };
        let instances = ty.instances.load(Ordering::Acquire);
        if instances > 0 {
            if skip_if_used {
                tracing::debug!(instances, "type in use, skipping unregister");
                return Ok(());
            }
            return Err(SmError::TypeInUse { type_id, instances });
        }
        types.remove(&type_id);
        Ok(())
    }

    /// Whether a type id is currently registered.
    pub fn is_registered(&self, type_id: u32) -> bool {
        self.inner.types.read().contains_key(&type_id)
    }

    /// Create an unstarted state-machine instance.
    ///
    /// `history_size` of 0 disables transition history; `payload_size`
    /// bounds the caller payload bytes kept per history record.
    pub fn create_state_machine(
        &self,
        user_id: u32,
        history_size: usize,
        payload_size: usize,
    ) -> StateMachine {
        StateMachine::new(self.clone(), user_id, history_size, payload_size)
    }

    /// Create an instance and immediately bind it to a registered type.
    pub fn create_and_start(
        &self,
        user_id: u32,
        history_size: usize,
        payload_size: usize,
        type_id: u32,
        initial_state: usize,
    ) -> Result<StateMachine, SmError> {
        let machine = self.create_state_machine(user_id, history_size, payload_size);
        machine.start(type_id, initial_state)?;
        Ok(machine)
    }

    /// Look up a type and count the caller as a live instance of it.
    ///
    /// The increment happens under the `types` guard so that an
    /// unregistration racing with an instance start can never observe a
    /// zero instance count for a type that is about to be bound. The
    /// caller must decrement if it does not go on to bind the type.
    pub(crate) fn acquire(&self, type_id: u32) -> Option<Arc<SmType>> {
        let types = self.inner.types.read();
        let ty = types.get(&type_id)?;
        ty.instances.fetch_add(1, Ordering::AcqRel);
        Some(ty.clone())
    }

    pub(crate) fn registry(&self) -> Arc<LockRegistry> {
        self.inner.registry.clone()
    }

    pub(crate) fn epoch(&self) -> Instant {
        self.inner.epoch
    }
}
