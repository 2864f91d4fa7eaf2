//! Flash wait states
//!
//! The number of wait states the flash needs depends on HCLK and on the
//! supply voltage. See RM0090 Table 10/11 and RM0390 Table 5.

use super::chip::ChipLimits;
use super::RccError;

/// Supply voltage range, as used by the flash timing tables
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VoltageBand {
    /// 2.7V - 3.6V
    Above2V7 = 0,
    /// 2.4V - 2.7V
    Above2V4 = 1,
    /// 2.1V - 2.4V
    Above2V1 = 2,
    /// 1.8V - 2.1V
    Below2V1 = 3,
}

impl VoltageBand {
    /// Band of a supply voltage in millivolts
    pub fn from_millivolts(vcc_mv: u32) -> Self {
        if vcc_mv >= 2700 {
            VoltageBand::Above2V7
        } else if vcc_mv >= 2400 {
            VoltageBand::Above2V4
        } else if vcc_mv >= 2100 {
            VoltageBand::Above2V1
        } else {
            VoltageBand::Below2V1
        }
    }

    /// Prefetch must stay disabled below 2.1V
    pub fn allows_prefetch(self) -> bool {
        self != VoltageBand::Below2V1
    }
}

/// Returns the fewest wait states at which the flash is rated for `ahb_hz`
/// at `vcc_mv`.
///
/// Walks the band's table from the most wait states down and stops at the
/// first ceiling below `ahb_hz`. A frequency above every ceiling gets the
/// band's maximum, never fewer.
pub fn lookup_wait_states<C: ChipLimits>(ahb_hz: u32, vcc_mv: u32) -> u8 {
    let table = C::FLASH_WAIT_STATES[VoltageBand::from_millivolts(vcc_mv) as usize];

    let mut wait_states = table.len().saturating_sub(1);
    for (ws, &ceiling) in table.iter().enumerate().rev() {
        if ceiling < ahb_hz {
            break;
        }
        wait_states = ws;
    }

    wait_states as u8
}

/// As [`lookup_wait_states`], but reports a frequency above every rating
pub fn lookup_wait_states_checked<C: ChipLimits>(
    ahb_hz: u32,
    vcc_mv: u32,
) -> Result<u8, RccError> {
    let table = C::FLASH_WAIT_STATES[VoltageBand::from_millivolts(vcc_mv) as usize];
    match table.last() {
        Some(&ceiling) if ceiling >= ahb_hz => {
            Ok(lookup_wait_states::<C>(ahb_hz, vcc_mv))
        }
        _ => Err(RccError::FlashTooSlow { ahb_hz, vcc_mv }),
    }
}
