// Copyright (C) Microsoft Corporation. All rights reserved.

//! Owning-switch identifier.

use std::fmt;

/// Index of the switch a resource belongs to.
///
/// Locks and state machines that guard per-switch resources carry the
/// switch index for diagnostics; process-wide resources use
/// [SwitchId::GLOBAL].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SwitchId(pub u16);

impl SwitchId {
    /// Sentinel for resources not tied to any particular switch.
    pub const GLOBAL: SwitchId = SwitchId(0);

    /// Whether this is the process-wide sentinel.
    pub fn is_global(self) -> bool {
        self == SwitchId::GLOBAL
    }
}

impl fmt::Display for SwitchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_global() {
            write!(f, "global")
        } else {
            write!(f, "sw{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_sentinel() {
        assert!(SwitchId::GLOBAL.is_global());
        assert!(!SwitchId(3).is_global());
        assert_eq!(SwitchId::GLOBAL.to_string(), "global");
        assert_eq!(SwitchId(3).to_string(), "sw3");
    }
}
