// Copyright 2024-2026 blobshim Contributors
// SPDX-License-Identifier: Apache-2.0

//! One-shot construction guard for the virtual file.
//!
//! `Uninitialized -> Constructing -> Open -> Closed`, never backwards. A
//! construction that fails moves straight to `Closed`.

use std::sync::atomic::{AtomicU8, Ordering};

use super::ContractViolation;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized = 0,
    Constructing = 1,
    Open = 2,
    Closed = 3,
}

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Uninitialized,
            1 => Self::Constructing,
            2 => Self::Open,
            _ => Self::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Constructing => "constructing",
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Uninitialized as u8),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Take the guard. Fails on every call after the first.
    pub(crate) fn begin(&self) -> Result<(), ContractViolation> {
        self.state
            .compare_exchange(
                LifecycleState::Uninitialized as u8,
                LifecycleState::Constructing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|current| ContractViolation::AlreadyConstructed {
                state: LifecycleState::from_u8(current),
            })
    }

    pub(crate) fn mark_open(&self) {
        self.transition(LifecycleState::Constructing, LifecycleState::Open);
    }

    pub(crate) fn mark_failed(&self) {
        self.transition(LifecycleState::Constructing, LifecycleState::Closed);
    }

    /// Returns true only for the caller that actually moved `Open -> Closed`.
    pub(crate) fn mark_closed(&self) -> bool {
        self.transition(LifecycleState::Open, LifecycleState::Closed)
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
