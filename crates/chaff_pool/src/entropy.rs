// Copyright (c) the Chaff Project Authors.
// Licensed under the MIT License.

//! Entropy gating for candidate randomizers.

/// Decides whether a candidate block is random enough to serve as a
/// randomizer.
///
/// A randomizer that is mostly one byte value, or otherwise strongly
/// skewed, weakens the anonymization of every block it touches. The gate
/// applies two cheap checks over the byte histogram:
///
/// - **dominance**: no single byte value may account for more than
///   `max_dominance` of the block, and
/// - **entropy floor**: the first-order (Shannon) entropy must reach
///   `min_bits_per_byte`.
///
/// Blocks from the OS RNG sit near 8 bits/byte and pass with enormous
/// margin; the gate exists to reject the pathological cases (all zeros, a
/// broken RNG, a hostile caller promoting structured data).
///
/// # Examples
///
/// ```
/// use chaff_pool::EntropyGate;
///
/// let gate = EntropyGate::default();
/// assert!(!gate.accepts(&[0u8; 4096]));
///
/// let counting: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
/// assert!(gate.accepts(&counting));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntropyGate {
    min_bits_per_byte: f64,
    max_dominance: f64,
}

impl EntropyGate {
    /// Creates a gate with an explicit entropy floor (bits per byte) and
    /// dominance ceiling (fraction of the block).
    #[must_use]
    pub fn new(min_bits_per_byte: f64, max_dominance: f64) -> Self {
        Self {
            min_bits_per_byte,
            max_dominance,
        }
    }

    /// The configured entropy floor in bits per byte.
    #[must_use]
    pub fn min_bits_per_byte(&self) -> f64 {
        self.min_bits_per_byte
    }

    /// Returns `true` if `bytes` passes both checks.
    #[must_use]
    pub fn accepts(&self, bytes: &[u8]) -> bool {
        if bytes.is_empty() {
            return false;
        }

        let mut histogram = [0u64; 256];
        for &b in bytes {
            histogram[b as usize] += 1;
        }

        let total = bytes.len() as f64;
        let peak = histogram.iter().copied().max().unwrap_or(0) as f64;
        if peak / total > self.max_dominance {
            return false;
        }

        let entropy: f64 = histogram
            .iter()
            .filter(|&&count| count > 0)
            .map(|&count| {
                let p = count as f64 / total;
                -p * p.log2()
            })
            .sum();

        entropy >= self.min_bits_per_byte
    }
}

impl Default for EntropyGate {
    /// The floor of 5 bits/byte with a 50% dominance ceiling: far below
    /// anything the OS RNG produces, far above anything an attacker could
    /// pass off as structured cover data.
    fn default() -> Self {
        Self::new(5.0, 0.5)
    }
}
