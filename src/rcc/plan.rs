//! Clock tree plan
//!
//! The same structure describes a configuration about to be applied and a
//! configuration decoded from the device.

use super::pll::PllPlan;
use super::prescaler::PrescalerKind;
use crate::time::Hertz;

/// System clock multiplexer selection (`SW` / `SWS`)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockSource {
    /// HSI, the 16MHz internal RC oscillator
    Internal,
    /// HSE, an external crystal or clock
    ExternalCrystal,
    /// Main PLL, P output
    Pll,
}

impl ClockSource {
    /// `SW` encoding
    pub fn bits(self) -> u32 {
        match self {
            ClockSource::Internal => 0b00,
            ClockSource::ExternalCrystal => 0b01,
            ClockSource::Pll => 0b10,
        }
    }
}

/// A complete core clock configuration
///
/// Filled in by [`ClockConfig::plan`](super::ClockConfig::plan), applied by
/// the [`ClockSequencer`](super::ClockSequencer), reconstructed by the
/// [`ClockStateReader`](super::ClockStateReader). It is a snapshot: nothing
/// keeps it in sync with the device once applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockPlan {
    /// System clock source
    pub source: ClockSource,
    /// SYSCLK. 0 when read back from a device whose SYSCLK source
    /// frequency cannot be determined.
    pub sys_hz: u32,
    /// HCLK
    pub ahb_hz: u32,
    /// PCLK1
    pub apb1_hz: u32,
    /// PCLK2
    pub apb2_hz: u32,
    /// Main PLL parameters. `pll.out_hz == 0` when the PLL is not used.
    pub pll: PllPlan,
    /// HSE is an external clock signal rather than a crystal
    pub hse_bypass: bool,
    /// HSE frequency, if the board has one
    pub hse_hz: Option<u32>,
    /// `HPRE` encoding
    pub hpre: u8,
    /// `PPRE1` encoding
    pub ppre1: u8,
    /// `PPRE2` encoding
    pub ppre2: u8,
    /// Flash wait states
    pub flash_latency: u8,
    /// Flash prefetch enable
    pub flash_prefetch: bool,
    /// Overdrive regulator mode
    pub overdrive: bool,
}

/// Getters for pclk and their timer kernel clocks
macro_rules! pclk_getter {
    ($($n:tt: $tim_ker_ck:ident,)+) => {
        paste::paste! {
            $(
                #[doc = "Returns the frequency of the APB" $n " bus"]
                pub fn [<pclk $n>](&self) -> Hertz {
                    Hertz::from_raw(self.[<apb $n _hz>])
                }

                #[doc = "Returns the timer kernel clock on the APB" $n " bus. Timers run at"]
                #[doc = "twice PCLK" $n " when the APB" $n " prescaler divides."]
                pub fn $tim_ker_ck(&self) -> Hertz {
                    match PrescalerKind::Apb.decode(self.[<ppre $n>]) {
                        None => Hertz::from_raw(self.[<apb $n _hz>]),
                        Some(_) => Hertz::from_raw(self.[<apb $n _hz>] * 2),
                    }
                }
            )+
        }
    };
}

impl ClockPlan {
    /// Returns the system clock frequency
    pub fn sys_ck(&self) -> Hertz {
        Hertz::from_raw(self.sys_hz)
    }

    /// `false` for a plan read back from a device running from an
    /// oscillator of unknown frequency, typically HSE when the board's HSE
    /// frequency was not given
    pub fn sys_known(&self) -> bool {
        self.sys_hz != 0
    }

    /// Returns the frequency of the AHB bus
    pub fn hclk(&self) -> Hertz {
        Hertz::from_raw(self.ahb_hz)
    }

    pclk_getter! {
        1: timx_ker_ck,
        2: timy_ker_ck,
    }

    /// Returns `Some(frequency)` of the PLL Q output if the PLL is running,
    /// otherwise `None`
    pub fn pll_q_ck(&self) -> Option<Hertz> {
        self.pll
            .is_valid()
            .then(|| Hertz::from_raw(self.pll.q_hz()))
    }

    /// Returns `Some(frequency)` if HSE is in use, otherwise `None`
    pub fn hse_ck(&self) -> Option<Hertz> {
        self.hse_hz.map(Hertz::from_raw)
    }
}
