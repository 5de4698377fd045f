// Copyright (C) Microsoft Corporation. All rights reserved.

//! The global lock-precedence list.
//!
//! Every lock in the SDK belongs to exactly one [LockClass]. The order of
//! the variants below IS the acquisition order: a thread holding a lock of
//! some class may only capture locks of the same class or of classes
//! listed further down. Capturing upward while holding something further
//! down is a precedence violation and is rejected by the lock registry
//! before the underlying primitive is ever touched.
//!
//! A class is shared by every lock instance guarding that subsystem,
//! regardless of how many switches are present; the per-thread bookkeeping
//! therefore counts holds per class, not per instance.

/// Precedence class of a lock, highest precedence first.
///
/// The `repr` discriminant doubles as the class's rank and as its bit
/// position in the per-thread held-set mask, so the list is bounded by the
/// mask width (64 classes).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockClass {
    /// Switch-wide state (attach/detach, global configuration).
    Switch = 0,
    /// Per-port attribute tables.
    PortAttr = 1,
    /// Port-set membership tables.
    PortSet = 2,
    /// Link-aggregation group state.
    Lag = 3,
    /// MAC address table.
    MacTable = 4,
    /// MAC table maintenance (aging/purge) worker state.
    MacMaint = 5,
    /// L3 routing tables.
    Routing = 6,
    /// ARP/neighbor tables.
    ArpTable = 7,
    /// Multicast group tables.
    Multicast = 8,
    /// ACL rule tables.
    Acl = 9,
    /// VLAN membership tables.
    Vlan = 10,
    /// Mirror session state.
    Mirror = 11,
    /// Tunnel engine state.
    Tunnel = 12,
    /// NAT tables.
    Nat = 13,
    /// QoS queue and scheduler configuration.
    Qos = 14,
    /// Parity sweep and error repair state.
    Parity = 15,
    /// Scheduler token/ring configuration.
    Scheduler = 16,
    /// State-machine engine internals.
    StateMachine = 17,
    /// Timer task wheel.
    Timer = 18,
    /// Event queue dispatch state.
    EventQueue = 19,
    /// Packet receive path.
    PktRx = 20,
    /// Platform services (transceiver, LED, sensor access).
    Platform = 21,
    /// Shared I2C bus access.
    I2cBus = 22,
    /// Debug/diagnostic facilities.
    Debug = 23,

    /// Sentinel: exempt from precedence checking and bookkeeping.
    NoPrecedence = 63,
}

impl LockClass {
    /// Number of ranked classes (the sentinel excluded).
    pub const COUNT: usize = 24;

    /// Rank in the global ordering; lower is more senior.
    pub fn rank(self) -> usize {
        self as usize
    }

    /// Single-bit mask identifying this class in a held-set.
    ///
    /// The sentinel contributes no bit.
    pub fn bit(self) -> u64 {
        if self.is_checked() {
            1u64 << self.rank()
        } else {
            0
        }
    }

    /// Whether this class participates in precedence checking.
    pub fn is_checked(self) -> bool {
        !matches!(self, LockClass::NoPrecedence)
    }

    /// Mask of every class strictly junior to (listed after) this one.
    pub fn junior_mask(self) -> u64 {
        if !self.is_checked() {
            return 0;
        }
        // All bits above this class's own bit.
        !0u64 << (self.rank() + 1)
    }

    /// Display name of the class.
    pub fn name(self) -> &'static str {
        match self {
            LockClass::Switch => "SWITCH",
            LockClass::PortAttr => "PORT_ATTR",
            LockClass::PortSet => "PORT_SET",
            LockClass::Lag => "LAG",
            LockClass::MacTable => "MAC_TABLE",
            LockClass::MacMaint => "MAC_MAINT",
            LockClass::Routing => "ROUTING",
            LockClass::ArpTable => "ARP_TABLE",
            LockClass::Multicast => "MULTICAST",
            LockClass::Acl => "ACL",
            LockClass::Vlan => "VLAN",
            LockClass::Mirror => "MIRROR",
            LockClass::Tunnel => "TUNNEL",
            LockClass::Nat => "NAT",
            LockClass::Qos => "QOS",
            LockClass::Parity => "PARITY",
            LockClass::Scheduler => "SCHEDULER",
            LockClass::StateMachine => "STATE_MACHINE",
            LockClass::Timer => "TIMER",
            LockClass::EventQueue => "EVENT_QUEUE",
            LockClass::PktRx => "PKT_RX",
            LockClass::Platform => "PLATFORM",
            LockClass::I2cBus => "I2C_BUS",
            LockClass::Debug => "DEBUG",
            LockClass::NoPrecedence => "NO_PRECEDENCE",
        }
    }

    /// All ranked classes, in precedence order.
    pub fn ranked() -> [LockClass; LockClass::COUNT] {
        [
            LockClass::Switch,
            LockClass::PortAttr,
            LockClass::PortSet,
            LockClass::Lag,
            LockClass::MacTable,
            LockClass::MacMaint,
            LockClass::Routing,
            LockClass::ArpTable,
            LockClass::Multicast,
            LockClass::Acl,
            LockClass::Vlan,
            LockClass::Mirror,
            LockClass::Tunnel,
            LockClass::Nat,
            LockClass::Qos,
            LockClass::Parity,
            LockClass::Scheduler,
            LockClass::StateMachine,
            LockClass::Timer,
            LockClass::EventQueue,
            LockClass::PktRx,
            LockClass::Platform,
            LockClass::I2cBus,
            LockClass::Debug,
        ]
    }
}
