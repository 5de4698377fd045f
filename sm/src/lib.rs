// Copyright (C) Microsoft Corporation. All rights reserved.

#![warn(missing_docs)]

//! Generic event-driven state-machine engine for the swx switch SDK.
//!
//! A state-machine **type** is a registered `{state × event}` transition
//! table shared by all of its instances; an **instance** is one live,
//! independently-progressing occupant of that type (one per port, one per
//! counter-rate monitor, ...). Transition processing is serialized per
//! instance through the `swx_osal` lock package; concurrent events on
//! different instances never block each other.

pub mod engine;
pub mod error;
pub mod machine;
pub mod table;

pub use engine::SmEngine;
pub use error::SmError;
pub use machine::StateMachine;
pub use machine::TimestampMode;
pub use machine::Transition;
pub use machine::TransitionRecord;
pub use table::ActionFn;
pub use table::ConditionFn;
pub use table::SmEvent;
pub use table::SmTableSpec;
pub use table::SmTransition;
pub use table::TransitionLogger;
