use tracing::{debug, warn};

use crate::config::EvictionPolicy;
use crate::error::AudioError;
use crate::voice::{AudioBackend, Voice};

/// Index of a voice slot in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Active,
}

struct Slot {
    voice: Box<dyn Voice>,
    state: VoiceState,
    owner: Option<String>,
    priority: u8,
    acquired_seq: u64,
    released_seq: u64,
}

/// A voice handed out by [`VoicePool::acquire`]. `evicted` names the sound
/// that lost the voice when it had to be stolen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquired {
    pub id: VoiceId,
    pub evicted: Option<String>,
}

/// Bounded set of reusable voices.
pub struct VoicePool {
    slots: Vec<Slot>,
    capacity: usize,
    policy: EvictionPolicy,
    seq: u64,
}

impl VoicePool {
    pub fn new(capacity: usize, policy: EvictionPolicy) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
            policy,
            seq: 0,
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Hand out a voice for `owner`: the least recently released idle voice,
    /// else a new voice while under capacity, else whatever the eviction
    /// policy picks.
    pub fn acquire(
        &mut self,
        backend: &mut dyn AudioBackend,
        owner: &str,
        priority: u8,
    ) -> Result<Acquired, AudioError> {
        let idle = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.state == VoiceState::Idle)
            .min_by_key(|(_, s)| s.released_seq)
            .map(|(i, _)| i);

        let (index, evicted) = match idle {
            Some(index) => (index, None),
            None if self.slots.len() < self.capacity => {
                let voice = backend.create_voice()?;
                self.slots.push(Slot {
                    voice,
                    state: VoiceState::Idle,
                    owner: None,
                    priority: 0,
                    acquired_seq: 0,
                    released_seq: 0,
                });
                debug!("Voice pool grew to {}/{}", self.slots.len(), self.capacity);
                (self.slots.len() - 1, None)
            }
            None => {
                let index = self.victim(priority).ok_or(AudioError::PoolExhausted(self.capacity))?;
                let slot = &mut self.slots[index];
                slot.voice.pause();
                slot.voice.unbind();
                let evicted = slot.owner.take();
                warn!(
                    "Voice pool full, cutting off '{}' for '{}'",
                    evicted.as_deref().unwrap_or("?"),
                    owner
                );
                (index, evicted)
            }
        };

        let seq = self.next_seq();
        let slot = &mut self.slots[index];
        slot.state = VoiceState::Active;
        slot.owner = Some(owner.to_string());
        slot.priority = priority;
        slot.acquired_seq = seq;

        Ok(Acquired {
            id: VoiceId(index),
            evicted,
        })
    }

    fn victim(&self, priority: u8) -> Option<usize> {
        let active = self.slots.iter().enumerate();
        match self.policy {
            EvictionPolicy::Reject => None,
            EvictionPolicy::StealOldest => {
                active.min_by_key(|(_, s)| s.acquired_seq).map(|(i, _)| i)
            }
            EvictionPolicy::StealLowestPriority => active
                .min_by_key(|(_, s)| (s.priority, s.acquired_seq))
                .filter(|(_, s)| s.priority <= priority)
                .map(|(i, _)| i),
        }
    }

    /// Return a voice to the pool, detached from its sound.
    pub fn release(&mut self, id: VoiceId) {
        let seq = self.next_seq();
        if let Some(slot) = self.slots.get_mut(id.0) {
            slot.voice.pause();
            slot.voice.unbind();
            slot.state = VoiceState::Idle;
            slot.owner = None;
            slot.released_seq = seq;
        }
    }

    /// The voice in an active slot.
    pub fn voice_mut(&mut self, id: VoiceId) -> Option<&mut (dyn Voice + 'static)> {
        self.slots
            .get_mut(id.0)
            .filter(|s| s.state == VoiceState::Active)
            .map(|s| s.voice.as_mut())
    }

    pub fn state(&self, id: VoiceId) -> Option<VoiceState> {
        self.slots.get(id.0).map(|s| s.state)
    }

    pub fn owner(&self, id: VoiceId) -> Option<&str> {
        self.slots.get(id.0).and_then(|s| s.owner.as_deref())
    }

    /// Voices created so far; never exceeds the capacity.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn active_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state == VoiceState::Active)
            .count()
    }

    /// Stop and drop every voice.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.voice.pause();
            slot.voice.unbind();
        }
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;

    #[test]
    fn reuses_idle_voices() {
        let mut backend = HeadlessBackend::new();
        let mut pool = VoicePool::new(4, EvictionPolicy::StealOldest);

        let a = pool.acquire(&mut backend, "a", 100).unwrap();
        pool.release(a.id);
        assert_eq!(pool.state(a.id), Some(VoiceState::Idle));
        assert_eq!(pool.owner(a.id), None);

        let b = pool.acquire(&mut backend, "b", 100).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.owner(b.id), Some("b"));
    }

    #[test]
    fn prefers_least_recently_released() {
        let mut backend = HeadlessBackend::new();
        let mut pool = VoicePool::new(4, EvictionPolicy::StealOldest);
        let a = pool.acquire(&mut backend, "a", 100).unwrap();
        let b = pool.acquire(&mut backend, "b", 100).unwrap();
        pool.release(b.id);
        pool.release(a.id);

        let next = pool.acquire(&mut backend, "c", 100).unwrap();
        assert_eq!(next.id, b.id);
    }

    #[test]
    fn never_grows_past_capacity() {
        let mut backend = HeadlessBackend::new();
        let probes = backend.probes();
        let capacity = 3;
        let mut pool = VoicePool::new(capacity, EvictionPolicy::StealOldest);

        let first = pool.acquire(&mut backend, "s0", 100).unwrap();
        for n in 1..capacity {
            pool.acquire(&mut backend, &format!("s{n}"), 100).unwrap();
        }
        let extra = pool.acquire(&mut backend, "extra", 100).unwrap();

        assert_eq!(pool.len(), capacity);
        assert_eq!(probes.len(), capacity);
        assert_eq!(extra.id, first.id);
        assert_eq!(extra.evicted.as_deref(), Some("s0"));
        assert_eq!(pool.owner(extra.id), Some("extra"));
    }

    #[test]
    fn reject_policy_refuses_when_full() {
        let mut backend = HeadlessBackend::new();
        let mut pool = VoicePool::new(1, EvictionPolicy::Reject);
        pool.acquire(&mut backend, "a", 100).unwrap();
        assert!(matches!(
            pool.acquire(&mut backend, "b", 100),
            Err(AudioError::PoolExhausted(1))
        ));
        assert_eq!(pool.owner(VoiceId(0)), Some("a"));
    }

    #[test]
    fn lowest_priority_is_stolen_first() {
        let mut backend = HeadlessBackend::new();
        let mut pool = VoicePool::new(3, EvictionPolicy::StealLowestPriority);
        pool.acquire(&mut backend, "music", 200).unwrap();
        let low = pool.acquire(&mut backend, "footstep", 50).unwrap();
        pool.acquire(&mut backend, "hit", 100).unwrap();

        let got = pool.acquire(&mut backend, "explosion", 100).unwrap();
        assert_eq!(got.id, low.id);
        assert_eq!(got.evicted.as_deref(), Some("footstep"));
    }

    #[test]
    fn lowest_priority_never_steals_upward() {
        let mut backend = HeadlessBackend::new();
        let mut pool = VoicePool::new(1, EvictionPolicy::StealLowestPriority);
        pool.acquire(&mut backend, "music", 200).unwrap();
        assert!(pool.acquire(&mut backend, "click", 100).is_err());
    }

    #[test]
    fn clear_drops_all_voices() {
        let mut backend = HeadlessBackend::new();
        let mut pool = VoicePool::new(2, EvictionPolicy::StealOldest);
        pool.acquire(&mut backend, "a", 100).unwrap();
        pool.clear();
        assert!(pool.is_empty());
        assert_eq!(pool.active_count(), 0);
    }
}
