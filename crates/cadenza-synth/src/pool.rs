//! Voice pool.
//!
//! Owns a collection of voices and tracks which are idle and which are
//! sounding. Voices move between the two sets only through their own
//! lifecycle messages (`started`, `ended`) or explicit pool calls:
//!
//! ```text
//!            allocate / started
//!   available ──────────────────▶ active
//!       ▲                           │ release_node (graceful)
//!       │ ended / return_node       ▼
//!       └──────────────────────  releasing
//! ```
//!
//! Every voice is in exactly one of `available` and `active`; `releasing` is
//! a subset of `active`.

use crate::error::Error;
use crate::strategy::{AllocationStrategy, PoolTiers};
use crate::voice::Voice;
use cadenza_core::{AudioContext, NodeEvent, ProcessingNode, UnitOptions};
use std::fmt;

/// Handle of a voice owned by a [`VoicePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceKey(usize);

impl VoiceKey {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position of the voice in insertion order.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for VoiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice#{}", self.0)
    }
}

/// Pool-side state of a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    /// Free to allocate.
    Idle,
    /// Allocated or playing.
    Active,
    /// Fading out after a graceful stop. Still counts as active.
    Releasing,
}

/// Result of an allocation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allocation {
    /// An idle voice was handed out.
    Idle(VoiceKey),
    /// A sounding voice was hard-stopped and handed out again.
    Stolen(VoiceKey),
    /// No voice available and the strategy does not steal.
    Exhausted,
}

impl Allocation {
    pub fn key(self) -> Option<VoiceKey> {
        match self {
            Self::Idle(key) | Self::Stolen(key) => Some(key),
            Self::Exhausted => None,
        }
    }

    pub fn is_stolen(self) -> bool {
        matches!(self, Self::Stolen(_))
    }
}

/// Polyphonic voice pool.
///
/// Driven from the control thread. After [`dispose`](Self::dispose) every
/// operation is a no-op.
pub struct VoicePool<V: Voice> {
    voices: Vec<V>,
    /// Non-lifecycle messages consumed while draining each voice.
    messages: Vec<Vec<NodeEvent>>,
    available: Vec<VoiceKey>,
    active: Vec<VoiceKey>,
    releasing: Vec<VoiceKey>,
    strategy: Box<dyn AllocationStrategy>,
    disposed: bool,
}

impl<V: Voice> VoicePool<V> {
    pub fn new(strategy: impl AllocationStrategy + 'static) -> Self {
        Self {
            voices: Vec::new(),
            messages: Vec::new(),
            available: Vec::new(),
            active: Vec::new(),
            releasing: Vec::new(),
            strategy: Box::new(strategy),
            disposed: false,
        }
    }

    pub fn with_voices(
        voices: impl IntoIterator<Item = V>,
        strategy: impl AllocationStrategy + 'static,
    ) -> Self {
        let mut pool = Self::new(strategy);
        for voice in voices {
            pool.add(voice);
        }
        pool
    }

    /// Take ownership of a voice and make it available.
    ///
    /// Returns `None` (dropping the voice) once the pool is disposed.
    pub fn add(&mut self, voice: V) -> Option<VoiceKey> {
        if self.disposed {
            return None;
        }
        let key = VoiceKey(self.voices.len());
        tracing::debug!("Pool added {} ({})", key, voice.id());
        self.voices.push(voice);
        self.messages.push(Vec::new());
        self.available.push(key);
        Some(key)
    }

    /// Drain every voice's messages in order and apply lifecycle transitions.
    ///
    /// Returns the number of messages consumed. Called by
    /// [`allocate`](Self::allocate) before consulting the strategy.
    pub fn process_events(&mut self) -> usize {
        if self.disposed {
            return 0;
        }
        let mut consumed = 0;
        for index in 0..self.voices.len() {
            let key = VoiceKey(index);
            while let Some(event) = self.voices[index].poll_event() {
                consumed += 1;
                match event {
                    NodeEvent::Started => self.on_started(key),
                    NodeEvent::Ended => self.on_ended(key),
                    NodeEvent::Unrecognized => {}
                    other => self.messages[index].push(other),
                }
            }
        }
        consumed
    }

    fn on_started(&mut self, key: VoiceKey) {
        if remove(&mut self.available, key) {
            self.active.push(key);
            tracing::trace!("{} started", key);
        }
    }

    fn on_ended(&mut self, key: VoiceKey) {
        if remove(&mut self.active, key) {
            remove(&mut self.releasing, key);
            self.available.push(key);
            tracing::trace!("{} ended", key);
        }
    }

    /// Hand out a voice chosen by the strategy.
    ///
    /// The voice is active when this returns. A stolen voice has been
    /// hard-stopped; the caller restarts it.
    pub fn allocate(&mut self) -> Allocation {
        if self.disposed {
            return Allocation::Exhausted;
        }
        self.process_events();

        let tiers = PoolTiers {
            available: &self.available,
            releasing: &self.releasing,
            active: &self.active,
        };
        let Some(key) = self.strategy.allocate(&tiers) else {
            return Allocation::Exhausted;
        };

        if remove(&mut self.available, key) {
            self.active.push(key);
            return Allocation::Idle(key);
        }

        if remove(&mut self.active, key) {
            remove(&mut self.releasing, key);
            self.active.push(key);
            let voice = &mut self.voices[key.0];
            if let Err(e) = voice.stop() {
                tracing::warn!("Stopping stolen {} ({}): {}", key, voice.id(), e);
            }
            tracing::debug!("Stole {} ({})", key, voice.id());
            return Allocation::Stolen(key);
        }

        tracing::warn!(
            "Strategy '{}' chose {}, which is not in the pool",
            self.strategy.name(),
            key
        );
        Allocation::Exhausted
    }

    /// Like [`allocate`](Self::allocate), `None` when exhausted.
    pub fn allocate_node(&mut self) -> Option<VoiceKey> {
        self.allocate().key()
    }

    /// Move an active voice back to the available set without stopping it.
    ///
    /// Returns false if the voice was not active.
    pub fn return_node(&mut self, key: VoiceKey) -> bool {
        if self.disposed || !remove(&mut self.active, key) {
            return false;
        }
        remove(&mut self.releasing, key);
        self.available.push(key);
        true
    }

    /// Stop an active voice.
    ///
    /// Voices with a release tail fade out and stay active until they report
    /// `ended`; others are hard-stopped and return to the available set at
    /// once. Returns false if the voice was not active.
    pub fn release_node(&mut self, key: VoiceKey) -> bool {
        if self.disposed || !self.active.contains(&key) {
            return false;
        }
        if self.releasing.contains(&key) {
            return true;
        }

        let voice = &mut self.voices[key.0];
        if voice.supports_release() {
            if let Err(e) = voice.release() {
                tracing::warn!("Releasing {} ({}): {}", key, voice.id(), e);
            }
            self.releasing.push(key);
        } else {
            if let Err(e) = voice.stop() {
                tracing::warn!("Stopping {} ({}): {}", key, voice.id(), e);
            }
            remove(&mut self.active, key);
            self.available.push(key);
        }
        true
    }

    /// Call `f` on every active voice, oldest allocation first.
    pub fn apply_to_active<F: FnMut(&mut V)>(&mut self, mut f: F) {
        for key in &self.active {
            f(&mut self.voices[key.0]);
        }
    }

    /// Call `f` on every voice in the pool.
    pub fn apply_to_all<F: FnMut(&mut V)>(&mut self, f: F) {
        self.voices.iter_mut().for_each(f);
    }

    /// Call `f` on every active voice, stopping at the first error.
    ///
    /// Not atomic: voices visited before the failure keep their changes.
    pub fn try_apply_to_active<E, F>(&mut self, mut f: F) -> std::result::Result<(), E>
    where
        F: FnMut(&mut V) -> std::result::Result<(), E>,
    {
        for key in &self.active {
            f(&mut self.voices[key.0])?;
        }
        Ok(())
    }

    /// Dispose every voice and empty the pool. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        for voice in &mut self.voices {
            voice.dispose();
        }
        let count = self.voices.len();
        self.voices.clear();
        self.messages.clear();
        self.available.clear();
        self.active.clear();
        self.releasing.clear();
        self.disposed = true;
        tracing::debug!("Voice pool disposed ({} voices)", count);
    }

    pub fn voice(&self, key: VoiceKey) -> Option<&V> {
        self.voices.get(key.0)
    }

    pub fn voice_mut(&mut self, key: VoiceKey) -> Option<&mut V> {
        self.voices.get_mut(key.0)
    }

    pub fn state(&self, key: VoiceKey) -> Option<VoiceState> {
        if self.releasing.contains(&key) {
            Some(VoiceState::Releasing)
        } else if self.active.contains(&key) {
            Some(VoiceState::Active)
        } else if self.available.contains(&key) {
            Some(VoiceState::Idle)
        } else {
            None
        }
    }

    /// Non-lifecycle messages (updates, custom) a voice sent, oldest first.
    pub fn take_messages(&mut self, key: VoiceKey) -> Vec<NodeEvent> {
        self.messages
            .get_mut(key.0)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    pub fn keys(&self) -> impl Iterator<Item = VoiceKey> {
        (0..self.voices.len()).map(VoiceKey)
    }

    /// Idle voices, least recently used first.
    pub fn available(&self) -> &[VoiceKey] {
        &self.available
    }

    /// Sounding voices, oldest allocation first.
    pub fn active(&self) -> &[VoiceKey] {
        &self.active
    }

    pub fn releasing(&self) -> &[VoiceKey] {
        &self.releasing
    }

    pub fn available_count(&self) -> usize {
        self.available.len()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn releasing_count(&self) -> usize {
        self.releasing.len()
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }
}

impl VoicePool<ProcessingNode> {
    /// Build a pool of `count` fresh nodes of a registered unit.
    pub fn from_unit(
        context: &AudioContext,
        unit: &str,
        options: &UnitOptions,
        count: usize,
        strategy: impl AllocationStrategy + 'static,
    ) -> crate::Result<Self> {
        if count == 0 {
            return Err(Error::InvalidConfig(
                "voice pool needs at least one voice".to_string(),
            ));
        }
        let voices = (0..count)
            .map(|_| context.create_node(unit, options))
            .collect::<cadenza_core::Result<Vec<_>>>()?;
        Ok(Self::with_voices(voices, strategy))
    }
}

impl<V: Voice> fmt::Debug for VoicePool<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoicePool")
            .field("strategy", &self.strategy.name())
            .field("available", &self.available)
            .field("active", &self.active)
            .field("releasing", &self.releasing)
            .field("disposed", &self.disposed)
            .finish()
    }
}

/// Remove `key` keeping order. Returns false if absent.
fn remove(keys: &mut Vec<VoiceKey>, key: VoiceKey) -> bool {
    match keys.iter().position(|&k| k == key) {
        Some(pos) => {
            keys.remove(pos);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{LeastRecentlyUsed, RoundRobin};
    use cadenza_core::{Destination, NodeId, NodeIdRegistry};
    use proptest::prelude::*;
    use std::collections::{HashSet, VecDeque};

    struct MockVoice {
        id: NodeId,
        inbox: VecDeque<NodeEvent>,
        graceful: bool,
        log: Vec<&'static str>,
    }

    impl Voice for MockVoice {
        fn id(&self) -> &NodeId {
            &self.id
        }

        fn connect(&mut self, _destination: Destination) -> cadenza_core::Result<()> {
            self.log.push("connect");
            Ok(())
        }

        fn disconnect_all(&mut self) -> cadenza_core::Result<()> {
            self.log.push("disconnect");
            Ok(())
        }

        fn poll_event(&mut self) -> Option<NodeEvent> {
            self.inbox.pop_front()
        }

        fn supports_release(&self) -> bool {
            self.graceful
        }

        fn release(&mut self) -> cadenza_core::Result<()> {
            self.log.push("release");
            Ok(())
        }

        fn stop(&mut self) -> cadenza_core::Result<()> {
            self.log.push("stop");
            Ok(())
        }

        fn dispose(&mut self) {
            self.log.push("dispose");
        }
    }

    fn pool(
        count: usize,
        graceful: bool,
        strategy: impl AllocationStrategy + 'static,
    ) -> VoicePool<MockVoice> {
        let ids = NodeIdRegistry::new();
        VoicePool::with_voices(
            (0..count).map(|_| MockVoice {
                id: ids.issue("mock"),
                inbox: VecDeque::new(),
                graceful,
                log: Vec::new(),
            }),
            strategy,
        )
    }

    fn send(pool: &mut VoicePool<MockVoice>, key: VoiceKey, event: NodeEvent) {
        pool.voice_mut(key).unwrap().inbox.push_back(event);
    }

    fn assert_invariant(pool: &VoicePool<MockVoice>) {
        let available: HashSet<_> = pool.available().iter().copied().collect();
        let active: HashSet<_> = pool.active().iter().copied().collect();
        let all: HashSet<_> = pool.keys().collect();

        assert!(available.is_disjoint(&active));
        assert!(pool.releasing().iter().all(|k| active.contains(k)));
        assert!(available.union(&active).all(|k| all.contains(k)));
        assert_eq!(available.len() + active.len(), pool.len());
    }

    #[test]
    fn test_round_robin_exhausts() {
        let mut pool = pool(4, false, RoundRobin::new());

        let keys: HashSet<_> = (0..4).map(|_| pool.allocate_node().unwrap()).collect();
        assert_eq!(keys.len(), 4);
        assert_eq!(pool.allocate(), Allocation::Exhausted);
        assert_eq!(pool.active_count(), 4);
    }

    #[test]
    fn test_lru_steals_active_voice() {
        let mut pool = pool(2, false, LeastRecentlyUsed::new());
        let first = pool.allocate_node().unwrap();
        let second = pool.allocate_node().unwrap();

        let third = pool.allocate();
        assert_eq!(third, Allocation::Stolen(first));
        assert_ne!(first, second);
        assert_eq!(pool.voice(first).unwrap().log, vec!["stop"]);
        // The stolen voice is now the most recent allocation.
        assert_eq!(pool.active(), &[second, first]);
        assert_invariant(&pool);
    }

    #[test]
    fn test_lru_prefers_releasing_over_active() {
        let mut pool = pool(3, true, LeastRecentlyUsed::new());
        let a = pool.allocate_node().unwrap();
        let b = pool.allocate_node().unwrap();
        let c = pool.allocate_node().unwrap();
        assert!(pool.release_node(c));
        assert!(pool.release_node(b));

        assert_eq!(pool.allocate(), Allocation::Stolen(c));
        assert_eq!(pool.state(c), Some(VoiceState::Active));
        assert_eq!(pool.releasing(), &[b]);
        assert_eq!(pool.state(a), Some(VoiceState::Active));
    }

    #[test]
    fn test_ended_returns_same_voice() {
        let mut pool = pool(1, false, RoundRobin::new());
        let voice = pool.allocate_node().unwrap();
        assert_eq!(pool.allocate_node(), None);

        send(&mut pool, voice, NodeEvent::Ended);
        assert_eq!(pool.allocate_node(), Some(voice));
    }

    #[test]
    fn test_lifecycle_messages_are_idempotent() {
        let mut pool = pool(2, false, RoundRobin::new());
        let key = VoiceKey::new(1);

        send(&mut pool, key, NodeEvent::Started);
        send(&mut pool, key, NodeEvent::Started);
        assert_eq!(pool.process_events(), 2);
        assert_eq!(pool.active(), &[key]);

        send(&mut pool, key, NodeEvent::Ended);
        send(&mut pool, key, NodeEvent::Ended);
        pool.process_events();
        assert_eq!(pool.state(key), Some(VoiceState::Idle));
        assert_eq!(pool.available_count(), 2);
        assert_invariant(&pool);
    }

    #[test]
    fn test_events_apply_in_order() {
        let mut pool = pool(1, false, RoundRobin::new());
        let key = VoiceKey::new(0);

        send(&mut pool, key, NodeEvent::Started);
        send(&mut pool, key, NodeEvent::Ended);
        pool.process_events();
        assert_eq!(pool.state(key), Some(VoiceState::Idle));

        send(&mut pool, key, NodeEvent::Ended);
        send(&mut pool, key, NodeEvent::Started);
        pool.process_events();
        assert_eq!(pool.state(key), Some(VoiceState::Active));
    }

    #[test]
    fn test_other_messages_are_kept() {
        let mut pool = pool(1, false, RoundRobin::new());
        let key = VoiceKey::new(0);
        send(&mut pool, key, NodeEvent::Update { position: 0.5 });
        send(&mut pool, key, NodeEvent::Unrecognized);
        pool.process_events();

        assert_eq!(pool.take_messages(key), vec![NodeEvent::Update { position: 0.5 }]);
        assert!(pool.take_messages(key).is_empty());
    }

    #[test]
    fn test_release_graceful_voice() {
        let mut pool = pool(1, true, RoundRobin::new());
        let key = pool.allocate_node().unwrap();

        assert!(pool.release_node(key));
        assert!(pool.release_node(key));
        assert_eq!(pool.state(key), Some(VoiceState::Releasing));
        assert_eq!(pool.voice(key).unwrap().log, vec!["release"]);
        // Round-robin never hands out a releasing voice.
        assert_eq!(pool.allocate_node(), None);

        send(&mut pool, key, NodeEvent::Ended);
        assert_eq!(pool.allocate_node(), Some(key));
        assert_eq!(pool.releasing_count(), 0);
    }

    #[test]
    fn test_release_without_tail_returns_at_once() {
        let mut pool = pool(1, false, RoundRobin::new());
        let key = pool.allocate_node().unwrap();

        assert!(pool.release_node(key));
        assert_eq!(pool.state(key), Some(VoiceState::Idle));
        assert_eq!(pool.voice(key).unwrap().log, vec!["stop"]);
        assert!(!pool.release_node(key));
    }

    #[test]
    fn test_return_node() {
        let mut pool = pool(2, true, RoundRobin::new());
        let key = pool.allocate_node().unwrap();
        pool.release_node(key);

        assert!(pool.return_node(key));
        assert!(!pool.return_node(key));
        assert_eq!(pool.state(key), Some(VoiceState::Idle));
        assert_eq!(pool.releasing_count(), 0);
    }

    #[test]
    fn test_apply_helpers() {
        let mut pool = pool(3, false, RoundRobin::new());
        let a = pool.allocate_node().unwrap();
        let b = pool.allocate_node().unwrap();
        let idle = pool.available()[0];

        pool.apply_to_active(|v| v.log.push("active"));
        pool.apply_to_all(|v| v.log.push("all"));
        assert_eq!(pool.voice(a).unwrap().log, vec!["active", "all"]);
        assert_eq!(pool.voice(idle).unwrap().log, vec!["all"]);

        let mut visited = 0;
        let result: std::result::Result<(), &str> = pool.try_apply_to_active(|_| {
            visited += 1;
            Err("boom")
        });
        assert_eq!(result, Err("boom"));
        assert_eq!(visited, 1);
        assert_eq!(pool.active(), &[a, b]);
    }

    #[test]
    fn test_disposed_pool_is_inert() {
        let mut pool = pool(2, true, LeastRecentlyUsed::new());
        let key = pool.allocate_node().unwrap();
        pool.dispose();
        pool.dispose();

        assert!(pool.is_disposed());
        assert!(pool.is_empty());
        assert_eq!(pool.allocate(), Allocation::Exhausted);
        assert!(!pool.return_node(key));
        assert!(!pool.release_node(key));
        assert_eq!(pool.process_events(), 0);
        assert_eq!(pool.state(key), None);

        let ids = NodeIdRegistry::new();
        let late = MockVoice {
            id: ids.issue("mock"),
            inbox: VecDeque::new(),
            graceful: false,
            log: Vec::new(),
        };
        assert_eq!(pool.add(late), None);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Started(usize),
        Ended(usize),
        Allocate,
        Return(usize),
        Release(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..4usize).prop_map(Op::Started),
            (0..4usize).prop_map(Op::Ended),
            Just(Op::Allocate),
            (0..4usize).prop_map(Op::Return),
            (0..4usize).prop_map(Op::Release),
        ]
    }

    proptest! {
        #[test]
        fn prop_sets_stay_disjoint(
            lru in any::<bool>(),
            graceful in any::<bool>(),
            ops in proptest::collection::vec(op(), 0..64),
        ) {
            let mut pool = if lru {
                pool(4, graceful, LeastRecentlyUsed::new())
            } else {
                pool(4, graceful, RoundRobin::new())
            };

            for op in ops {
                match op {
                    Op::Started(i) => send(&mut pool, VoiceKey::new(i), NodeEvent::Started),
                    Op::Ended(i) => send(&mut pool, VoiceKey::new(i), NodeEvent::Ended),
                    Op::Allocate => {
                        pool.allocate();
                    }
                    Op::Return(i) => {
                        pool.return_node(VoiceKey::new(i));
                    }
                    Op::Release(i) => {
                        pool.release_node(VoiceKey::new(i));
                    }
                }
                pool.process_events();
                assert_invariant(&pool);
            }
        }
    }
}
