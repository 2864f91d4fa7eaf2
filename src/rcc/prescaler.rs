//! Bus prescalers
//!
//! HCLK is divided down from SYSCLK by `HPRE`; PCLK1 and PCLK2 are divided
//! down from HCLK by `PPRE1` and `PPRE2`. All three are binary dividers
//! with an enable bit above a shift field:
//!
//! | field | disabled | divide by `2^(shift+1)`  |
//! |-------|----------|--------------------------|
//! | HPRE  | `0xxx`   | `1000 \| shift`          |
//! | PPREx | `0xx`    | `100 \| shift`           |
//!
//! `HPRE` skips `/32`: encodings `1100..=1111` divide by 64 to 512.

use super::RccError;

/// Largest `HPRE` shift the solver uses. Above it the encoding is no longer
/// a plain shift.
pub const AHB_MAX_SHIFT: u8 = 3;
/// Largest `PPREx` shift
pub const APB_MAX_SHIFT: u8 = 3;

/// Encoding family of a prescaler field
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PrescalerKind {
    /// 4-bit `HPRE`
    Ahb,
    /// 3-bit `PPRE1` / `PPRE2`
    Apb,
}

impl PrescalerKind {
    const fn enable(self) -> u8 {
        match self {
            PrescalerKind::Ahb => 0b1000,
            PrescalerKind::Apb => 0b100,
        }
    }

    /// Encodes a divide-by-`2^(shift+1)` setting
    pub const fn encode(self, shift: u8) -> u8 {
        self.enable() | (shift & (self.enable() - 1))
    }

    /// Inverse of [`encode`](Self::encode). `None` if the divider is
    /// disabled.
    pub const fn decode(self, bits: u8) -> Option<u8> {
        if bits & self.enable() == 0 {
            None
        } else {
            Some(bits & (self.enable() - 1))
        }
    }

    /// log2 of the divisor the hardware applies for `bits`
    pub const fn divisor_shift(self, bits: u8) -> u32 {
        match (self, self.decode(bits)) {
            (_, None) => 0,
            (PrescalerKind::Ahb, Some(shift)) if shift >= 4 => shift as u32 + 2,
            (_, Some(shift)) => shift as u32 + 1,
        }
    }

    /// Output frequency of the prescaler for an input frequency
    pub const fn divide(self, input_hz: u32, bits: u8) -> u32 {
        input_hz >> self.divisor_shift(bits)
    }

    /// Whichever of two encodings divides more
    pub const fn slower(self, a: u8, b: u8) -> u8 {
        if self.divisor_shift(a) >= self.divisor_shift(b) {
            a
        } else {
            b
        }
    }
}

/// The three bus clock domains
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bus {
    /// AHB, HCLK
    Ahb,
    /// APB1, PCLK1
    Apb1,
    /// APB2, PCLK2
    Apb2,
}

impl Bus {
    /// Encoding family of this bus' prescaler
    pub const fn kind(self) -> PrescalerKind {
        match self {
            Bus::Ahb => PrescalerKind::Ahb,
            Bus::Apb1 | Bus::Apb2 => PrescalerKind::Apb,
        }
    }

    /// Largest shift the solver tries on this bus
    pub const fn max_shift(self) -> u8 {
        match self {
            Bus::Ahb => AHB_MAX_SHIFT,
            Bus::Apb1 | Bus::Apb2 => APB_MAX_SHIFT,
        }
    }
}

/// Picks the smallest binary divider bringing `input_hz` down to at most
/// `max_hz`.
///
/// Returns the divided frequency and the field encoding. An input that
/// already fits passes through with the divider disabled. If even
/// `max_shift` is not enough, the `max_shift` result is returned anyway.
pub fn solve_binary_divisor(
    input_hz: u32,
    max_shift: u8,
    max_hz: u32,
    kind: PrescalerKind,
) -> (u32, u8) {
    if input_hz <= max_hz {
        return (input_hz, 0);
    }

    for shift in 0..=max_shift {
        let output_hz = input_hz >> (shift + 1);
        if output_hz <= max_hz {
            return (output_hz, kind.encode(shift));
        }
    }

    (input_hz >> (max_shift + 1), kind.encode(max_shift))
}

/// As [`solve_binary_divisor`] for one bus, but reports a divider that
/// could not reach `max_hz`
pub fn solve_binary_divisor_checked(
    input_hz: u32,
    max_hz: u32,
    bus: Bus,
) -> Result<(u32, u8), RccError> {
    let (output_hz, bits) =
        solve_binary_divisor(input_hz, bus.max_shift(), max_hz, bus.kind());
    if output_hz > max_hz {
        Err(RccError::PrescalerSaturated {
            bus,
            hz: output_hz,
            max_hz,
        })
    } else {
        Ok((output_hz, bits))
    }
}

/// Recovers the shift chosen by [`solve_binary_divisor`] from its encoding
pub fn decode_binary_divisor(bits: u8, kind: PrescalerKind) -> Option<u8> {
    kind.decode(bits)
}
