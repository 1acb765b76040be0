/// Wrap point of a monotonically increasing counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Width {
    /// The counter is `n` bits wide and restarts at zero after `2^n - 1`.
    Bits(u32),
    /// The counter restarts at zero when it reaches this value.
    Range(u64),
}

impl Width {
    pub fn modulus(self) -> u128 {
        match self {
            Self::Bits(n) => 1 << n.min(64),
            Self::Range(range) => range as u128,
        }
    }

    /// Whether `value`, read from a counter of this width, is negative when
    /// reinterpreted as a signed integer of the same width.
    pub fn is_negative(self, value: u64) -> bool {
        match self {
            Self::Bits(0) => false,
            Self::Bits(n) => (value >> (n.min(64) - 1)) & 1 == 1,
            Self::Range(_) => false,
        }
    }

    /// Truncates `value` to the width.
    pub fn mask(self, value: u64) -> u64 {
        match self {
            Self::Bits(n) if n < 64 => value & ((1 << n) - 1),
            Self::Bits(_) => value,
            Self::Range(range) if range > 0 => value % range,
            Self::Range(_) => value,
        }
    }
}

/// Difference between two samples of a counter of `width`.
///
/// A sample lower than its predecessor is taken as exactly one wrap, the
/// result is `modulus - start + now`. Several wraps between two samples are
/// indistinguishable from one and are undercounted.
pub fn delta(start: u64, now: u64, width: Width) -> u64 {
    if now >= start {
        return now - start;
    }
    let wrapped = width.modulus().saturating_sub(start as u128) + now as u128;
    log::debug!(
        "counter wrapped: start {}, now {}, width {:?}, delta {}",
        start,
        now,
        width,
        wrapped
    );
    wrapped.min(u64::MAX as u128) as u64
}
