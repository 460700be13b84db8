//! Wraparound-safe arithmetic for cumulative kernel counters.
//!
//! Kernel counters in /proc and /sys are unsigned and wrap at the native word
//! width. A delta is `(modulus + new - old) mod modulus`, which corrects for at
//! most one wrap between samples. More than one full wrap is indistinguishable
//! from no wrap at all and is not corrected.

use serde::{Deserialize, Serialize};

/// Modulus at which cumulative counters wrap, selected once at baseline from
/// the detected CPU word width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CounterModulus {
    Bits32,
    #[default]
    Bits64,
}

impl CounterModulus {
    pub fn from_word_width(is_64_bit: bool) -> Self {
        if is_64_bit {
            CounterModulus::Bits64
        } else {
            CounterModulus::Bits32
        }
    }

    pub fn value(self) -> u128 {
        match self {
            CounterModulus::Bits32 => 1u128 << 32,
            CounterModulus::Bits64 => 1u128 << 64,
        }
    }

    /// Delta between two readings of a counter wrapping at this modulus.
    pub fn delta(self, old: u64, new: u64) -> u64 {
        counter_delta(old, new, self.value()) as u64
    }
}

/// Computes `(modulus + new - old) % modulus`.
///
/// Readings are reduced into `[0, modulus)` first, so the result is always in
/// that range. `modulus` must be non-zero.
pub fn counter_delta(old: u64, new: u64, modulus: u128) -> u128 {
    let old = old as u128 % modulus;
    let new = new as u128 % modulus;
    (modulus + new - old) % modulus
}
