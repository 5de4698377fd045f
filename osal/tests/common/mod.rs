// Copyright (C) Microsoft Corporation. All rights reserved.

//! Shared helpers for the osal integration tests.

use std::sync::Arc;

use swx_osal::LockRegistry;
use swx_osal::ViolationPolicy;

/// Install a test tracing subscriber; repeated calls are harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// A fresh enforcing registry for one test.
pub fn registry() -> Arc<LockRegistry> {
    init_tracing();
    LockRegistry::new(ViolationPolicy::Enforce)
}
