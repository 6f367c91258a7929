//! Voice allocation strategies.
//!
//! A strategy only picks a key out of the pool's tiers; moving the voice
//! between tiers is the pool's job. Strategies must never return a key that
//! is not in one of the tiers.

use crate::pool::VoiceKey;

/// Snapshot of a pool's membership, handed to a strategy on allocation.
#[derive(Debug, Clone, Copy)]
pub struct PoolTiers<'a> {
    /// Idle voices, least recently used first.
    pub available: &'a [VoiceKey],
    /// Voices fading out after a release, earliest release first.
    pub releasing: &'a [VoiceKey],
    /// Every sounding voice (releasing ones included), oldest allocation first.
    pub active: &'a [VoiceKey],
}

impl PoolTiers<'_> {
    /// True if `key` belongs to any tier.
    pub fn contains(&self, key: VoiceKey) -> bool {
        self.available.contains(&key) || self.active.contains(&key)
    }
}

/// Picks the voice to hand out next.
pub trait AllocationStrategy: Send {
    /// Choose a voice, or `None` if the strategy will not allocate.
    fn allocate(&mut self, tiers: &PoolTiers<'_>) -> Option<VoiceKey>;

    fn name(&self) -> &'static str;
}

/// Cycles through the available voices. Never steals.
///
/// The cursor advances modulo the current number of available voices, so the
/// same membership and call sequence always yield the same voices.
#[derive(Debug, Clone, Default)]
pub struct RoundRobin {
    cursor: usize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AllocationStrategy for RoundRobin {
    fn allocate(&mut self, tiers: &PoolTiers<'_>) -> Option<VoiceKey> {
        if tiers.available.is_empty() {
            return None;
        }
        let index = self.cursor % tiers.available.len();
        self.cursor = index + 1;
        Some(tiers.available[index])
    }

    fn name(&self) -> &'static str {
        "round-robin"
    }
}

/// Least recently used, stealing when nothing is idle.
///
/// Tiers are drained in a fixed order:
/// 1. available, least recently used first
/// 2. releasing, earliest released first
/// 3. active, oldest allocation first
#[derive(Debug, Clone, Copy, Default)]
pub struct LeastRecentlyUsed;

impl LeastRecentlyUsed {
    pub fn new() -> Self {
        Self
    }
}

impl AllocationStrategy for LeastRecentlyUsed {
    fn allocate(&mut self, tiers: &PoolTiers<'_>) -> Option<VoiceKey> {
        tiers
            .available
            .first()
            .or_else(|| tiers.releasing.first())
            .or_else(|| tiers.active.first())
            .copied()
    }

    fn name(&self) -> &'static str {
        "lru"
    }
}
