//! Synth voice allocation: free list, generation-tagged stealing, and the
//! needs-free drain loop.
//!
//! The allocator owns the control-core view of every voice slot — owner key,
//! generation tag, release bookkeeping. The audio core never reads any of
//! it; the two sides meet only in the command cells and needs-free flags of
//! [`EngineShared`].

use tecla_engine::{EngineShared, VoiceCommand};

/// How note events map onto voice slots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlaybackMode {
    /// One slot per sounding note, stealing the oldest when exhausted.
    #[default]
    Poly,
    /// A single slot redirected to the newest held note.
    Mono,
    /// A single slot cycled through the held notes by the arpeggiator clock.
    Arpeggio,
}

impl PlaybackMode {
    /// True for the single-voice modes.
    #[inline]
    pub fn is_single_voice(self) -> bool {
        !matches!(self, PlaybackMode::Poly)
    }
}

/// The slot single-voice modes play through.
pub const MONO_SLOT: usize = 0;

/// Drain iterations between reissues of an unacknowledged StartRelease.
const RELEASE_RETRY_INTERVAL: u8 = 2;
/// Reissues before giving up (the flag is still awaited either way).
const RELEASE_RETRY_LIMIT: u8 = 3;

#[derive(Clone, Copy, Debug, Default)]
struct Slot {
    owner: Option<usize>,
    generation: u32,
    release: Option<Release>,
}

#[derive(Clone, Copy, Debug, Default)]
struct Release {
    iterations: u8,
    retries: u8,
}

/// Fixed ring buffer of free slot ids.
#[derive(Clone, Copy, Debug)]
struct FreeList<const N: usize> {
    slots: [usize; N],
    head: usize,
    len: usize,
}

impl<const N: usize> FreeList<N> {
    fn full() -> Self {
        Self {
            slots: core::array::from_fn(|i| i),
            head: 0,
            len: N,
        }
    }

    fn pop(&mut self) -> Option<usize> {
        if self.len == 0 {
            return None;
        }
        let slot = self.slots[self.head];
        self.head = (self.head + 1) % N;
        self.len -= 1;
        Some(slot)
    }

    fn push(&mut self, slot: usize) {
        debug_assert!(self.len < N);
        self.slots[(self.head + self.len) % N] = slot;
        self.len += 1;
    }

    fn len(&self) -> usize {
        self.len
    }
}

/// Result of a note-on allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoiceOn {
    /// The slot now sounding the note.
    pub slot: usize,
    /// The key whose note was evicted, when stealing occurred.
    pub stolen_from: Option<usize>,
}

/// Control-core allocator over `N` voice slots.
#[derive(Clone, Copy, Debug)]
pub struct VoiceAllocator<const N: usize> {
    slots: [Slot; N],
    free: FreeList<N>,
    generation: u32,
    mode: PlaybackMode,
}

impl<const N: usize> Default for VoiceAllocator<N> {
    fn default() -> Self {
        Self::new(PlaybackMode::Poly)
    }
}

impl<const N: usize> VoiceAllocator<N> {
    /// Create with every slot free.
    pub fn new(mode: PlaybackMode) -> Self {
        Self {
            slots: [Slot::default(); N],
            free: FreeList::full(),
            generation: 0,
            mode,
        }
    }

    /// Current playback mode.
    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    /// Switch playback mode. Existing voices are hard-reset; the caller is
    /// expected to have force-released all held notes first.
    pub fn set_mode(&mut self, mode: PlaybackMode, shared: &EngineShared<N>) {
        self.reset(shared);
        self.mode = mode;
    }

    /// Key currently driving a slot, if any.
    pub fn owner_of(&self, slot: usize) -> Option<usize> {
        self.slots[slot].owner
    }

    /// A slot's generation tag.
    pub fn generation_of(&self, slot: usize) -> u32 {
        self.slots[slot].generation
    }

    /// Number of slots on the free list.
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Number of owned slots (sounding or releasing).
    pub fn in_use_count(&self) -> usize {
        self.slots.iter().filter(|s| s.owner.is_some()).count()
    }

    /// Assign a slot to `key` at `freq_hz` and issue StartAttack.
    ///
    /// Poly mode pops the free list or steals the slot with the minimum
    /// generation tag (fast takeover — no waiting for its release). Single-
    /// voice modes always redirect [`MONO_SLOT`].
    pub fn note_on(&mut self, key: usize, freq_hz: f32, shared: &EngineShared<N>) -> VoiceOn {
        let (slot, stolen_from) = if self.mode.is_single_voice() {
            let previous = self.slots[MONO_SLOT].owner.filter(|&k| k != key);
            (MONO_SLOT, previous)
        } else if let Some(slot) = self.free.pop() {
            (slot, None)
        } else {
            self.steal()
        };

        // A stolen or redirected slot may carry a stale release: drop both
        // the bookkeeping and any unobserved needs-free flag before reuse.
        shared.take_needs_free(slot);
        self.generation = self.generation.wrapping_add(1);
        self.slots[slot] = Slot {
            owner: Some(key),
            generation: self.generation,
            release: None,
        };

        shared.set_frequency(slot, freq_hz);
        shared.send_command(slot, VoiceCommand::StartAttack);
        VoiceOn { slot, stolen_from }
    }

    /// The in-use slot with the minimum generation tag.
    fn steal(&mut self) -> (usize, Option<usize>) {
        let slot = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.owner.is_some())
            .min_by_key(|(_, s)| s.generation)
            .map_or(0, |(i, _)| i);
        (slot, self.slots[slot].owner)
    }

    /// Issue StartRelease for the slot owned by `key`, if any.
    ///
    /// The slot stays owned until the audio core raises needs-free and
    /// [`drain`](Self::drain) observes it.
    pub fn note_off(&mut self, key: usize, shared: &EngineShared<N>) {
        for (slot, state) in self.slots.iter_mut().enumerate() {
            if state.owner == Some(key) && state.release.is_none() {
                state.release = Some(Release::default());
                shared.send_command(slot, VoiceCommand::StartRelease);
                return;
            }
        }
    }

    /// Once-per-control-iteration drain of needs-free flags.
    ///
    /// Releasing slots whose flag has not appeared are nudged by reissuing
    /// StartRelease every [`RELEASE_RETRY_INTERVAL`] iterations, up to
    /// [`RELEASE_RETRY_LIMIT`] times — the hand-off is lock-free and a write
    /// can be overwritten before the audio core sees it. Past the limit the
    /// slot just waits; the flag arrives eventually or the slot is stolen.
    pub fn drain(&mut self, shared: &EngineShared<N>) {
        for (slot, state) in self.slots.iter_mut().enumerate() {
            let Some(release) = &mut state.release else {
                continue;
            };
            if shared.take_needs_free(slot) {
                state.owner = None;
                state.release = None;
                if !self.mode.is_single_voice() {
                    self.free.push(slot);
                }
                continue;
            }
            release.iterations += 1;
            if release.iterations >= RELEASE_RETRY_INTERVAL {
                release.iterations = 0;
                if release.retries < RELEASE_RETRY_LIMIT {
                    release.retries += 1;
                    shared.send_command(slot, VoiceCommand::StartRelease);
                }
            }
        }
    }

    /// Panic path: Reset every slot and rebuild the free list.
    ///
    /// The generation counter is deliberately not rewound; tags stay unique
    /// across the process lifetime.
    pub fn reset(&mut self, shared: &EngineShared<N>) {
        for slot in 0..N {
            shared.send_command(slot, VoiceCommand::Reset);
            shared.take_needs_free(slot);
            self.slots[slot] = Slot {
                generation: self.slots[slot].generation,
                ..Slot::default()
            };
        }
        self.free = FreeList::full();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tecla_engine::{Engine, EnvelopeStage, EnvelopeTiming, LEVEL_MAX};

    const TICK_HZ: f32 = 31_250.0;

    fn instant_release(shared: &EngineShared<4>) {
        shared.set_envelope(EnvelopeTiming {
            attack_ticks: 0,
            decay_ticks: 0,
            sustain_level: LEVEL_MAX,
            release_ticks: 0,
        });
    }

    #[test]
    fn fresh_allocations_use_distinct_slots() {
        let shared: EngineShared<4> = EngineShared::new();
        let mut alloc: VoiceAllocator<4> = VoiceAllocator::new(PlaybackMode::Poly);
        let mut seen = [false; 4];
        for key in 0..4 {
            let on = alloc.note_on(key, 220.0, &shared);
            assert!(on.stolen_from.is_none());
            assert!(!seen[on.slot]);
            seen[on.slot] = true;
        }
        assert_eq!(alloc.free_len(), 0);
    }

    #[test]
    fn generations_increase_with_every_assignment() {
        let shared: EngineShared<4> = EngineShared::new();
        let mut alloc: VoiceAllocator<4> = VoiceAllocator::new(PlaybackMode::Poly);
        let mut last = 0;
        for key in 0..4 {
            let on = alloc.note_on(key, 220.0, &shared);
            let generation = alloc.generation_of(on.slot);
            assert!(generation > last);
            last = generation;
        }
    }

    #[test]
    fn exhausted_pool_steals_minimum_generation() {
        let shared: EngineShared<4> = EngineShared::new();
        let mut alloc: VoiceAllocator<4> = VoiceAllocator::new(PlaybackMode::Poly);
        for key in 0..4 {
            alloc.note_on(key, 220.0, &shared);
        }
        let oldest_slot = (0..4)
            .min_by_key(|&s| alloc.generation_of(s))
            .unwrap();
        let on = alloc.note_on(99, 330.0, &shared);
        assert_eq!(on.slot, oldest_slot);
        assert_eq!(on.stolen_from, Some(0));
        assert_eq!(alloc.owner_of(on.slot), Some(99));
    }

    #[test]
    fn note_off_keeps_ownership_until_drain() {
        let shared: EngineShared<4> = EngineShared::new();
        instant_release(&shared);
        let mut engine: Engine<4> = Engine::new(TICK_HZ);
        let mut alloc: VoiceAllocator<4> = VoiceAllocator::new(PlaybackMode::Poly);

        let on = alloc.note_on(7, 440.0, &shared);
        engine.tick(&shared);
        alloc.note_off(7, &shared);
        assert_eq!(alloc.owner_of(on.slot), Some(7));
        assert_eq!(alloc.free_len(), 3);

        engine.tick(&shared); // audio observes the release, frees instantly
        alloc.drain(&shared);
        assert_eq!(alloc.owner_of(on.slot), None);
        assert_eq!(alloc.free_len(), 4);
    }

    #[test]
    fn drain_reissues_release_a_bounded_number_of_times() {
        // No engine ticking here: the command is never consumed, so the
        // allocator should reissue at its interval and then stop.
        let shared: EngineShared<4> = EngineShared::new();
        let mut alloc: VoiceAllocator<4> = VoiceAllocator::new(PlaybackMode::Poly);
        alloc.note_on(1, 440.0, &shared);
        shared.take_command(0); // consume the StartAttack
        alloc.note_off(1, &shared);
        assert_eq!(shared.take_command(0), Some(VoiceCommand::StartRelease));

        let mut reissues = 0;
        for _ in 0..64 {
            alloc.drain(&shared);
            if shared.take_command(0) == Some(VoiceCommand::StartRelease) {
                reissues += 1;
            }
        }
        assert_eq!(reissues, 3);
        // Ownership still held — the slot waits for the flag.
        assert_eq!(alloc.owner_of(0), Some(1));
    }

    #[test]
    fn stealing_a_releasing_slot_discards_stale_flag() {
        let shared: EngineShared<2> = EngineShared::new();
        let mut alloc: VoiceAllocator<2> = VoiceAllocator::new(PlaybackMode::Poly);
        alloc.note_on(0, 220.0, &shared);
        alloc.note_on(1, 330.0, &shared);
        alloc.note_off(0, &shared);
        // Audio side would raise the flag around now; simulate it landing
        // just before the steal.
        shared.raise_needs_free(0);
        let on = alloc.note_on(2, 550.0, &shared);
        assert_eq!(on.slot, 0);
        assert_eq!(on.stolen_from, Some(0));

        // The stale flag must not free the re-assigned slot.
        alloc.drain(&shared);
        assert_eq!(alloc.owner_of(0), Some(2));
    }

    #[test]
    fn mono_mode_redirects_a_single_slot() {
        let shared: EngineShared<4> = EngineShared::new();
        let mut alloc: VoiceAllocator<4> = VoiceAllocator::new(PlaybackMode::Mono);
        let first = alloc.note_on(10, 220.0, &shared);
        assert_eq!(first.slot, MONO_SLOT);
        assert!(first.stolen_from.is_none());

        let second = alloc.note_on(11, 440.0, &shared);
        assert_eq!(second.slot, MONO_SLOT);
        assert_eq!(second.stolen_from, Some(10));
        assert_eq!(shared.frequency(MONO_SLOT), 440.0);
    }

    #[test]
    fn reset_frees_everything_and_keeps_generations_monotonic() {
        let shared: EngineShared<4> = EngineShared::new();
        let mut alloc: VoiceAllocator<4> = VoiceAllocator::new(PlaybackMode::Poly);
        for key in 0..4 {
            alloc.note_on(key, 220.0, &shared);
        }
        let before = alloc.generation_of(3);
        alloc.reset(&shared);
        assert_eq!(alloc.in_use_count(), 0);
        assert_eq!(alloc.free_len(), 4);
        for slot in 0..4 {
            assert_eq!(shared.take_command(slot), Some(VoiceCommand::Reset));
        }
        let on = alloc.note_on(5, 440.0, &shared);
        assert!(alloc.generation_of(on.slot) > before);
    }

    #[test]
    fn scenario_nine_presses_on_eight_voices_steals_the_first() {
        let shared: EngineShared<8> = EngineShared::new();
        shared.set_envelope(EnvelopeTiming {
            attack_ticks: 0,
            decay_ticks: 0,
            sustain_level: LEVEL_MAX,
            release_ticks: 8,
        });
        let mut engine: Engine<8> = Engine::new(TICK_HZ);
        let mut alloc: VoiceAllocator<8> = VoiceAllocator::new(PlaybackMode::Poly);

        let mut slot_of_first = None;
        for key in 0..8 {
            let on = alloc.note_on(key, 110.0 * (key + 1) as f32, &shared);
            if key == 0 {
                slot_of_first = Some(on.slot);
            }
        }
        engine.tick(&shared);
        assert_eq!(engine.active_count(), 8);

        let ninth = alloc.note_on(8, 990.0, &shared);
        assert_eq!(Some(ninth.slot), slot_of_first);
        assert_eq!(ninth.stolen_from, Some(0));

        // The first key's note stops sounding at its old frequency: the slot
        // now carries the ninth key's pitch.
        engine.tick(&shared);
        assert_eq!(shared.frequency(ninth.slot), 990.0);
        assert_eq!(engine.stage(ninth.slot), EnvelopeStage::Sustain);
        assert_eq!(alloc.owner_of(ninth.slot), Some(8));
        assert_eq!(alloc.in_use_count(), 8);
    }
}
