//! MIDI/MPE channel allocation.
//!
//! Whether notes need a channel each is decided once per settings or tuning
//! change ([`BendPolicy::decide`]); the pool itself is a fixed 16-entry
//! collection managed under one of two disciplines. Channel starvation drops
//! the note rather than stealing — evicting a channel would audibly retune a
//! note the external receiver is already sustaining.

use crate::tuning::Tuning;
use tecla_midi::{MAX_CHANNEL, MIN_CHANNEL};

/// Whether per-note pitch bend is needed, and why.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BendPolicy {
    /// Exact semitone tuning, MPE off: one fixed channel for everything.
    #[default]
    NotRequired,
    /// MPE turned on by the user; bend values are all zero under the current
    /// tuning, so channels may be shared when the pool runs dry.
    Forced,
    /// Non-semitone tuning or just intonation: every note carries its own
    /// bend and must have its own channel.
    Implied,
}

impl BendPolicy {
    /// Decide the policy for the current tuning and user settings.
    ///
    /// A bend requirement implied by the tuning wins over the user toggle;
    /// the toggle only matters when the tuning itself needs nothing.
    pub fn decide(tuning: &Tuning, just_intonation: bool, mpe_forced: bool) -> Self {
        if just_intonation || !tuning.is_semitone_multiple() {
            BendPolicy::Implied
        } else if mpe_forced {
            BendPolicy::Forced
        } else {
            BendPolicy::NotRequired
        }
    }

    /// True when an MPE zone is advertised and the pool is in use.
    #[inline]
    pub fn needs_zone(self) -> bool {
        !matches!(self, BendPolicy::NotRequired)
    }
}

/// Hand-out order for freed channels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PoolDiscipline {
    /// Insertion order — channels rotate through the pool.
    #[default]
    RoundRobin,
    /// Always hand out the lowest free channel. Less fair, easier to read on
    /// a MIDI monitor.
    LowestFirst,
}

/// Contiguous member-channel range of the MPE zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelRange {
    /// Lowest member channel (its master is `low - 1`).
    pub low: u8,
    /// Highest member channel, inclusive.
    pub high: u8,
}

impl Default for ChannelRange {
    fn default() -> Self {
        Self { low: 2, high: 16 }
    }
}

impl ChannelRange {
    /// Clamp into a valid zone: members within `[2, 16]`, at least one
    /// member. A collapsed or inverted range becomes the minimal `[2, 2]`.
    pub fn clamped(self) -> Self {
        let low = self.low.clamp(MIN_CHANNEL + 1, MAX_CHANNEL);
        let high = self.high.clamp(low, MAX_CHANNEL);
        if self.high < self.low {
            Self { low, high: low }
        } else {
            Self { low, high }
        }
    }

    /// Number of member channels.
    #[inline]
    pub fn member_count(&self) -> u8 {
        self.high - self.low + 1
    }

    /// The zone master channel.
    #[inline]
    pub fn master(&self) -> u8 {
        self.low - 1
    }
}

/// Fixed-capacity channel pool.
#[derive(Clone, Copy, Debug)]
struct Pool {
    channels: [u8; MAX_CHANNEL as usize],
    len: usize,
}

impl Pool {
    fn empty() -> Self {
        Self {
            channels: [0; MAX_CHANNEL as usize],
            len: 0,
        }
    }

    fn fill(range: ChannelRange) -> Self {
        let mut pool = Self::empty();
        for channel in range.low..=range.high {
            pool.channels[pool.len] = channel;
            pool.len += 1;
        }
        pool
    }

    fn pop(&mut self) -> Option<u8> {
        if self.len == 0 {
            return None;
        }
        let channel = self.channels[0];
        self.channels.copy_within(1..self.len, 0);
        self.len -= 1;
        Some(channel)
    }

    fn push(&mut self, channel: u8, discipline: PoolDiscipline) {
        debug_assert!(self.len < self.channels.len());
        match discipline {
            PoolDiscipline::RoundRobin => {
                self.channels[self.len] = channel;
                self.len += 1;
            }
            PoolDiscipline::LowestFirst => {
                let pos = self.channels[..self.len]
                    .iter()
                    .position(|&c| c > channel)
                    .unwrap_or(self.len);
                self.channels.copy_within(pos..self.len, pos + 1);
                self.channels[pos] = channel;
                self.len += 1;
            }
        }
    }

    fn contains(&self, channel: u8) -> bool {
        self.channels[..self.len].contains(&channel)
    }
}

/// A channel handed to one note.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Assignment {
    /// Channel number, 1–16.
    pub channel: u8,
    /// True when the channel came out of the pool and must go back on
    /// note-off; fixed and hash-shared channels are not pooled.
    pub exclusive: bool,
}

/// Control-core MIDI channel allocator.
#[derive(Clone, Copy, Debug)]
pub struct ChannelAllocator {
    policy: BendPolicy,
    discipline: PoolDiscipline,
    range: ChannelRange,
    fixed_channel: u8,
    pool: Pool,
    dropped: u32,
}

impl Default for ChannelAllocator {
    fn default() -> Self {
        Self::new(
            BendPolicy::NotRequired,
            PoolDiscipline::RoundRobin,
            ChannelRange::default(),
        )
    }
}

impl ChannelAllocator {
    /// Create an allocator; the pool is populated when the policy uses one.
    pub fn new(policy: BendPolicy, discipline: PoolDiscipline, range: ChannelRange) -> Self {
        let range = range.clamped();
        Self {
            policy,
            discipline,
            range,
            fixed_channel: MIN_CHANNEL,
            pool: if policy.needs_zone() {
                Pool::fill(range)
            } else {
                Pool::empty()
            },
            dropped: 0,
        }
    }

    /// Repopulate for a new policy/discipline/range.
    ///
    /// Every held note must have been force-released first; assignments made
    /// under the old pool are invalid afterwards.
    pub fn rebuild(&mut self, policy: BendPolicy, discipline: PoolDiscipline, range: ChannelRange) {
        *self = Self {
            dropped: self.dropped,
            ..Self::new(policy, discipline, range)
        };
    }

    /// Active bend policy.
    pub fn policy(&self) -> BendPolicy {
        self.policy
    }

    /// Active pool discipline.
    pub fn discipline(&self) -> PoolDiscipline {
        self.discipline
    }

    /// Active member range.
    pub fn range(&self) -> ChannelRange {
        self.range
    }

    /// The single channel used when no zone is active.
    pub fn fixed_channel(&self) -> u8 {
        self.fixed_channel
    }

    /// Free channels currently in the pool.
    pub fn pool_len(&self) -> usize {
        self.pool.len
    }

    /// True when the channel is sitting in the pool.
    pub fn pool_contains(&self, channel: u8) -> bool {
        self.pool.contains(channel)
    }

    /// Notes dropped to channel starvation since startup.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// Assign a channel for a note at `step`.
    ///
    /// Returns `None` — and counts and logs the drop — when per-note bend is
    /// required and the pool is empty. When bend is not strictly required
    /// (policy [`BendPolicy::Forced`]) an exhausted pool falls back to
    /// hashing the step over the member range instead.
    pub fn assign(&mut self, step: i32) -> Option<Assignment> {
        match self.policy {
            BendPolicy::NotRequired => Some(Assignment {
                channel: self.fixed_channel,
                exclusive: false,
            }),
            BendPolicy::Forced | BendPolicy::Implied => {
                if let Some(channel) = self.pool.pop() {
                    return Some(Assignment {
                        channel,
                        exclusive: true,
                    });
                }
                if self.policy == BendPolicy::Forced {
                    let count = i32::from(self.range.member_count());
                    let channel = self.range.low + step.rem_euclid(count) as u8;
                    return Some(Assignment {
                        channel,
                        exclusive: false,
                    });
                }
                self.dropped = self.dropped.wrapping_add(1);
                #[cfg(feature = "tracing")]
                tracing::warn!(step, "channel pool empty, note dropped");
                None
            }
        }
    }

    /// Return an assignment on note-off. Non-exclusive channels (fixed or
    /// hash-shared) never touch the pool.
    pub fn release(&mut self, assignment: Assignment) {
        if assignment.exclusive {
            self.pool.push(assignment.channel, self.discipline);
        }
    }
}
