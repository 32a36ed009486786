// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task identifiers.
//!
//! Task IDs are snowflakes: 64-bit, time-sortable, unique for the lifetime
//! of the cluster. The host is the only ID allocator, so a single in-process
//! generator suffices.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Unique identifier for a task or VPS session.
///
/// Wraps the raw snowflake value; ordering follows allocation order because
/// the high bits are a millisecond timestamp.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TaskId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Self)
    }
}

/// Custom epoch for the timestamp component: 2024-01-01T00:00:00Z.
const EPOCH_MS: u64 = 1_704_067_200_000;

const INSTANCE_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

/// Snowflake ID generator: 41-bit milliseconds, 10-bit instance, 12-bit sequence.
///
/// Monotonic within a process. If the wall clock regresses, IDs keep using
/// the last observed millisecond until real time catches up.
pub struct SnowflakeGenerator {
    instance_id: u64,
    state: Mutex<GeneratorState>,
}

struct GeneratorState {
    last_ms: u64,
    sequence: u64,
}

impl SnowflakeGenerator {
    pub fn new(instance_id: u16) -> Self {
        Self {
            instance_id: u64::from(instance_id) & ((1 << INSTANCE_BITS) - 1),
            state: Mutex::new(GeneratorState { last_ms: 0, sequence: 0 }),
        }
    }

    /// Allocate the next ID.
    pub fn next_id(&self) -> TaskId {
        let mut state = self.state.lock();
        let now = Self::now_ms();
        if now > state.last_ms {
            state.last_ms = now;
            state.sequence = 0;
        } else {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                // Sequence exhausted within one millisecond; claim the next one.
                state.last_ms += 1;
            }
        }
        let id = (state.last_ms << (INSTANCE_BITS + SEQUENCE_BITS))
            | (self.instance_id << SEQUENCE_BITS)
            | state.sequence;
        TaskId(id)
    }

    fn now_ms() -> u64 {
        let unix_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
        unix_ms.saturating_sub(EPOCH_MS)
    }
}

impl Default for SnowflakeGenerator {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
