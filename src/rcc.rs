//! Reset and Clock Control
//!
//! This module configures the RCC unit to provide set frequencies for
//! the system clock `sys_ck`, the High-performance Bus (AHB) `hclk` and
//! the Peripheral (APB) Buses `pclk1` and `pclk2`, together with the
//! matching flash wait states.
//!
//! See Figure 21 "Clock tree" in Reference Manual RM0090, and Figure 13 in
//! RM0390 for the STM32F446.
//!
//! HSI is 16 MHz.
//!
//! # Usage
//!
//! A builder pattern is used to specify the state and frequency of
//! possible clocks. The `freeze` method configures the RCC peripheral
//! in a best-effort attempt to generate these clocks. The actual
//! clocks configured are returned as a [`ClockPlan`].
//!
//! Some clock specifications imply other clock specifications, as follows:
//!
//! * `use_hse(a)` implies `sys_ck(a)`
//!
//! * `sys_ck(b)` implies the PLL unless `b` equals HSI or `use_hse(b)` was
//!   specified. The PLL runs from HSE if there is one, otherwise from HSI.
//!
//! `freeze` never panics. A frequency the PLL cannot reach degrades to the
//! closest frequency below it, and if the PLL cannot run at all SYSCLK is
//! taken straight from its input oscillator. Use
//! [`ClockConfig::plan_checked`] to detect these cases up front.
//!
//! Simple example:
//!
//! ```rust,ignore
//!     let regs = unsafe { Mmio::steal() };
//!     let clocks = regs
//!         .constrain::<Stm32f40x>()
//!         .use_hse(8.MHz())
//!         .sys_ck(168.MHz())
//!         .freeze();
//!
//!     assert_eq!(clocks.pclk1().raw(), 42_000_000);
//! ```
//!
//! # Ordering
//!
//! Applying a configuration is done by the [`ClockSequencer`], which orders
//! register writes so the core never runs faster than the flash or a bus
//! is rated for, even between two writes. The configuration in effect can
//! be read back at any time with the [`ClockStateReader`].
#![deny(missing_docs)]

use core::fmt;
use core::marker::PhantomData;

use crate::regs::RegisterFile;
use crate::time::Hertz;

#[cfg(feature = "log")]
use log::debug;

pub mod chip;
mod flash;
#[cfg(test)]
pub(crate) mod mock;
mod plan;
mod pll;
mod prescaler;
mod reader;
mod sequencer;
mod source;

pub use chip::{ChipLimits, Stm32f40x, Stm32f42x, Stm32f446};
pub use flash::{lookup_wait_states, lookup_wait_states_checked, VoltageBand};
pub use plan::{ClockPlan, ClockSource};
pub use pll::{
    solve_pll, solve_pll_checked, PllPlan, PllSource, PLL_Q_MAX, PLL_Q_MIN,
    PLL_R_MAX, USB_CLOCK_HZ,
};
pub use prescaler::{
    decode_binary_divisor, solve_binary_divisor, solve_binary_divisor_checked,
    Bus, PrescalerKind, AHB_MAX_SHIFT, APB_MAX_SHIFT,
};
pub use reader::ClockStateReader;
pub use sequencer::{ClockSequencer, Direction, SequencerState};
pub use source::{
    enable_hse, enable_hsi, enable_oscillator, enable_pll, enable_precursor,
    pll_matches,
};

/// HSI frequency
pub const HSI_HZ: u32 = 16_000_000;

/// Supply voltage assumed when none is given
pub const DEFAULT_VCC_MV: u32 = 3300;

/// A clock configuration that cannot be met within the ratings
///
/// Only returned by the checked planning functions. The unchecked ones
/// settle for the closest safe configuration instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RccError {
    /// No PLL parameters satisfy the VCO limits
    PllUnreachable {
        /// PLL input frequency
        in_hz: u32,
        /// Requested output frequency
        target_hz: u32,
    },
    /// The largest divider still leaves a bus above its maximum
    PrescalerSaturated {
        /// Bus that could not be divided down
        bus: Bus,
        /// Frequency with the largest divider
        hz: u32,
        /// Maximum frequency of the bus
        max_hz: u32,
    },
    /// HCLK is above every flash rating for the supply voltage
    FlashTooSlow {
        /// HCLK
        ahb_hz: u32,
        /// Supply voltage in millivolts
        vcc_mv: u32,
    },
}

impl fmt::Display for RccError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RccError::PllUnreachable { in_hz, target_hz } => write!(
                f,
                "no PLL configuration reaches {target_hz}Hz from {in_hz}Hz"
            ),
            RccError::PrescalerSaturated { bus, hz, max_hz } => write!(
                f,
                "{bus:?} runs at {hz}Hz with the largest divider, max is {max_hz}Hz"
            ),
            RccError::FlashTooSlow { ahb_hz, vcc_mv } => write!(
                f,
                "flash is not rated for {ahb_hz}Hz at {vcc_mv}mV"
            ),
        }
    }
}

/// Configuration of the core clocks
///
/// Can be planned for a chip family without touching hardware.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockConfig {
    hse: Option<u32>,
    bypass_hse: bool,
    sys_ck: Option<u32>,
    vcc_mv: u32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockConfig {
    /// HSI at 16MHz, at the default supply voltage
    pub const fn new() -> Self {
        ClockConfig {
            hse: None,
            bypass_hse: false,
            sys_ck: None,
            vcc_mv: DEFAULT_VCC_MV,
        }
    }

    /// Uses HSE (external oscillator) instead of HSI (internal RC
    /// oscillator) as the clock source. Will result in a hang if an
    /// external oscillator is not connected or it fails to start.
    #[must_use]
    pub fn use_hse(mut self, freq: Hertz) -> Self {
        self.hse = Some(freq.raw());
        self
    }

    /// Use an external clock signal rather than a crystal oscillator,
    /// bypassing the XTAL driver.
    #[must_use]
    pub fn bypass_hse(mut self) -> Self {
        self.bypass_hse = true;
        self
    }

    /// Set SYSCLK frequency
    #[must_use]
    pub fn sys_ck(mut self, freq: Hertz) -> Self {
        self.sys_ck = Some(freq.raw());
        self
    }

    /// Set the supply voltage in millivolts. Selects the flash timing.
    #[must_use]
    pub fn vcc_mv(mut self, vcc_mv: u32) -> Self {
        self.vcc_mv = vcc_mv;
        self
    }

    /// Configured HSE frequency
    pub fn hse(&self) -> Option<u32> {
        self.hse
    }

    /// The oscillator SYSCLK runs from when the PLL is not used, and its
    /// frequency
    fn raw_source(&self) -> (ClockSource, u32) {
        match self.hse {
            Some(hse) => (ClockSource::ExternalCrystal, hse),
            None => (ClockSource::Internal, HSI_HZ),
        }
    }

    fn pll_source(&self) -> (PllSource, u32) {
        match self.hse {
            Some(hse) => (PllSource::ExternalCrystal, hse),
            None => (PllSource::Internal, HSI_HZ),
        }
    }

    /// Requested SYSCLK, if it needs the PLL
    fn pll_target(&self) -> Option<u32> {
        let (_, srcclk) = self.raw_source();
        match self.sys_ck {
            Some(sys_ck) if sys_ck != srcclk && sys_ck != HSI_HZ => Some(sys_ck),
            _ => None,
        }
    }

    /// Computes the clock tree for chip family `C`.
    ///
    /// Never fails. A PLL target it cannot reach runs SYSCLK from the PLL
    /// input oscillator instead, which may be faster than `sys_ck`. Each bus
    /// is divided down as far as its prescaler allows, and the flash gets the
    /// most wait states its table knows if HCLK is above all of them.
    pub fn plan<C: ChipLimits>(&self) -> ClockPlan {
        let (pll_source, pll_in_hz) = self.pll_source();
        let (raw_source, raw_hz) = self.raw_source();

        let unused = PllPlan::unused(pll_source, pll_in_hz);
        let (source, sys_hz, pll) = match self.pll_target() {
            Some(target) => {
                let pll = solve_pll::<C>(pll_in_hz, target, pll_source);
                if pll.is_valid() {
                    (ClockSource::Pll, pll.out_hz, pll)
                } else {
                    #[cfg(feature = "log")]
                    debug!("PLL cannot reach {} Hz, staying on {:?}", target, raw_source);

                    (raw_source, raw_hz, pll)
                }
            }
            // Neither the PLL nor the raw source: HSI was asked for
            None if self.sys_ck.is_some_and(|sys_ck| sys_ck != raw_hz) => {
                (ClockSource::Internal, HSI_HZ, unused)
            }
            None => (raw_source, raw_hz, unused),
        };

        // AHB first, then both APBs from HCLK
        let (ahb_hz, hpre) = solve_binary_divisor(
            sys_hz,
            AHB_MAX_SHIFT,
            C::AHB_MAX_HZ,
            PrescalerKind::Ahb,
        );
        let (apb1_hz, ppre1) = solve_binary_divisor(
            ahb_hz,
            APB_MAX_SHIFT,
            C::APB1_MAX_HZ,
            PrescalerKind::Apb,
        );
        let (apb2_hz, ppre2) = solve_binary_divisor(
            ahb_hz,
            APB_MAX_SHIFT,
            C::APB2_MAX_HZ,
            PrescalerKind::Apb,
        );

        ClockPlan {
            source,
            sys_hz,
            ahb_hz,
            apb1_hz,
            apb2_hz,
            pll,
            hse_bypass: self.bypass_hse,
            hse_hz: self.hse,
            hpre,
            ppre1,
            ppre2,
            flash_latency: lookup_wait_states::<C>(ahb_hz, self.vcc_mv),
            flash_prefetch: VoltageBand::from_millivolts(self.vcc_mv)
                .allows_prefetch(),
            overdrive: C::OVERDRIVE_ABOVE_HZ.is_some_and(|limit| sys_hz > limit),
        }
    }

    /// As [`plan`](Self::plan), but fails instead of settling for a
    /// fallback
    pub fn plan_checked<C: ChipLimits>(&self) -> Result<ClockPlan, RccError> {
        if let Some(target) = self.pll_target() {
            let (pll_source, pll_in_hz) = self.pll_source();
            solve_pll_checked::<C>(pll_in_hz, target, pll_source)?;
        }

        let plan = self.plan::<C>();
        solve_binary_divisor_checked(plan.sys_hz, C::AHB_MAX_HZ, Bus::Ahb)?;
        solve_binary_divisor_checked(plan.ahb_hz, C::APB1_MAX_HZ, Bus::Apb1)?;
        solve_binary_divisor_checked(plan.ahb_hz, C::APB2_MAX_HZ, Bus::Apb2)?;
        lookup_wait_states_checked::<C>(plan.ahb_hz, self.vcc_mv)?;

        Ok(plan)
    }
}

/// Extension trait that constrains a register file to clock configuration
pub trait RccExt: Sized {
    /// Constrains the register file to configuring the clocks of chip
    /// family `C`
    fn constrain<C: ChipLimits>(self) -> Rcc<Self, C>;
}

impl<R: RegisterFile> RccExt for R {
    fn constrain<C: ChipLimits>(self) -> Rcc<Self, C> {
        Rcc {
            config: ClockConfig::new(),
            regs: self,
            _chip: PhantomData,
        }
    }
}

/// Constrained RCC peripheral
///
/// Generated by calling `constrain` on a register file. For example:
///
/// ```rust,ignore
/// let regs = unsafe { Mmio::steal() };
/// let rcc = regs.constrain::<Stm32f42x>();
/// ```
pub struct Rcc<R, C> {
    config: ClockConfig,
    regs: R,
    _chip: PhantomData<C>,
}

/// Setters forwarded to the [`ClockConfig`]
macro_rules! config_setter {
    ($($(#[$doc:meta])* $name:ident($($arg:ident: $ty:ty),*),)+) => {
        $(
            $(#[$doc])*
            #[must_use]
            pub fn $name(mut self, $($arg: $ty),*) -> Self {
                self.config = self.config.$name($($arg),*);
                self
            }
        )+
    };
}

impl<R: RegisterFile, C: ChipLimits> Rcc<R, C> {
    config_setter! {
        /// Uses HSE (external oscillator) instead of HSI (internal RC
        /// oscillator) as the clock source. Will result in a hang if an
        /// external oscillator is not connected or it fails to start.
        use_hse(freq: Hertz),
        /// Use an external clock signal rather than a crystal oscillator,
        /// bypassing the XTAL driver.
        bypass_hse(),
        /// Set SYSCLK frequency
        sys_ck(freq: Hertz),
        /// Set the supply voltage in millivolts
        vcc_mv(vcc_mv: u32),
    }

    /// Set SYSCLK frequency - ALIAS
    #[must_use]
    pub fn sysclk(self, freq: Hertz) -> Self {
        self.sys_ck(freq)
    }

    /// The configuration built so far
    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    /// The clocks as currently configured in hardware
    pub fn clocks(&self) -> ClockPlan {
        ClockStateReader::<C>::new(self.config.hse).read_clocks(&self.regs)
    }

    /// Freeze the core clocks, returning the configuration actually
    /// applied.
    ///
    /// When the PLL is used, `freeze` never results in a clock _faster_
    /// than the one specified, though it may be slower. When the PLL cannot
    /// reach `sys_ck`, for example a target below its slowest output,
    /// SYSCLK falls back to the oscillator that would have fed the PLL.
    /// That oscillator can be faster than requested: `sys_ck(8.MHz())` on
    /// HSI runs at 16MHz.
    ///
    /// Blocks until every oscillator, the PLL and the overdrive regulator
    /// (if needed) report ready. There is no timeout: a missing HSE hangs
    /// here.
    pub fn freeze(mut self) -> ClockPlan {
        let target = self.config.plan::<C>();
        let current = self.clocks();

        #[cfg(feature = "log")]
        debug!(
            "freeze: SYSCLK {} Hz -> {} Hz ({:?})",
            current.sys_hz, target.sys_hz, target.source
        );

        ClockSequencer::<R, C>::new(&mut self.regs).configure(&target, &current)
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockRegisters;
    use super::*;
    use crate::regs::{RegisterFile, FLASH_ACR, RCC_CFGR, RCC_CR};
    use crate::time::RateExtU32;

    #[test]
    fn default_is_hsi() {
        let plan = ClockConfig::new().plan::<Stm32f40x>();
        assert_eq!(plan.source, ClockSource::Internal);
        assert_eq!(plan.sys_hz, HSI_HZ);
        assert_eq!(plan.ahb_hz, HSI_HZ);
        assert_eq!(plan.apb1_hz, HSI_HZ);
        assert_eq!(plan.flash_latency, 0);
        assert!(!plan.pll.is_valid());
    }

    #[test]
    fn hse_implies_sys_ck() {
        let plan = ClockConfig::new().use_hse(8.MHz()).plan::<Stm32f40x>();
        assert_eq!(plan.source, ClockSource::ExternalCrystal);
        assert_eq!(plan.sys_hz, 8_000_000);
        assert_eq!(plan.hse_hz, Some(8_000_000));
    }

    #[test]
    fn hsi_without_pll() {
        let plan = ClockConfig::new()
            .use_hse(8.MHz())
            .sys_ck(16.MHz())
            .plan::<Stm32f40x>();
        assert_eq!(plan.source, ClockSource::Internal);
        assert_eq!(plan.sys_hz, HSI_HZ);
    }

    #[test]
    fn f40x_168mhz() {
        let plan = ClockConfig::new()
            .use_hse(8.MHz())
            .sys_ck(168.MHz())
            .vcc_mv(3300)
            .plan::<Stm32f40x>();

        assert_eq!(plan.source, ClockSource::Pll);
        assert_eq!((plan.pll.m, plan.pll.n, plan.pll.p, plan.pll.q), (4, 168, 0, 7));
        assert_eq!(plan.sys_hz, 168_000_000);
        assert_eq!(plan.ahb_hz, 168_000_000);
        assert_eq!(plan.apb1_hz, 42_000_000);
        assert_eq!(plan.apb2_hz, 84_000_000);
        assert_eq!((plan.hpre, plan.ppre1, plan.ppre2), (0, 0b101, 0b100));
        assert_eq!(plan.flash_latency, 5);
        assert!(plan.flash_prefetch);
        assert!(!plan.overdrive);
    }

    #[test]
    fn apb_divided_from_ahb() {
        // 180MHz on an F40x: the PLL tops out at 168MHz
        let plan = ClockConfig::new()
            .sys_ck(180.MHz())
            .plan::<Stm32f40x>();
        assert_eq!(plan.sys_hz, 168_000_000);
        assert_eq!(plan.apb1_hz, plan.ahb_hz / 4);
        assert_eq!(plan.apb2_hz, plan.ahb_hz / 2);
    }

    #[test]
    fn f42x_180mhz_needs_overdrive() {
        let plan = ClockConfig::new()
            .use_hse(8.MHz())
            .sys_ck(180.MHz())
            .plan::<Stm32f42x>();
        assert_eq!(plan.sys_hz, 180_000_000);
        assert_eq!(plan.apb1_hz, 45_000_000);
        assert_eq!(plan.apb2_hz, 90_000_000);
        assert!(plan.overdrive);
    }

    #[test]
    fn low_voltage_disables_prefetch() {
        let plan = ClockConfig::new()
            .sys_ck(48.MHz())
            .vcc_mv(1800)
            .plan::<Stm32f40x>();
        assert!(!plan.flash_prefetch);
        // 20MHz per wait state below 2.1V
        assert_eq!(plan.flash_latency, 2);
    }

    #[test]
    fn unreachable_pll_falls_back() {
        // 500kHz cannot feed the VCO with any M
        let config = ClockConfig::new().use_hse(500.kHz()).sys_ck(100.MHz());

        let plan = config.plan::<Stm32f40x>();
        assert_eq!(plan.source, ClockSource::ExternalCrystal);
        assert_eq!(plan.sys_hz, 500_000);
        assert!(!plan.pll.is_valid());

        assert_eq!(
            config.plan_checked::<Stm32f40x>(),
            Err(RccError::PllUnreachable {
                in_hz: 500_000,
                target_hz: 100_000_000,
            })
        );
    }

    #[test]
    fn fallback_can_be_faster_than_requested() {
        // The slowest PLL output, 100MHz VCO / 8, is above both targets
        let hsi = ClockConfig::new().sys_ck(8.MHz()).plan::<Stm32f40x>();
        assert_eq!(hsi.source, ClockSource::Internal);
        assert_eq!(hsi.sys_hz, 16_000_000);

        let hse = ClockConfig::new()
            .use_hse(25.MHz())
            .sys_ck(10.MHz())
            .plan::<Stm32f40x>();
        assert_eq!(hse.source, ClockSource::ExternalCrystal);
        assert_eq!(hse.sys_hz, 25_000_000);
    }

    #[test]
    fn flash_too_slow() {
        let config = ClockConfig::new()
            .use_hse(8.MHz())
            .sys_ck(168.MHz())
            .vcc_mv(1800);

        // Best effort still boots, on the slowest flash setting
        assert_eq!(config.plan::<Stm32f40x>().flash_latency, 7);
        assert_eq!(
            config.plan_checked::<Stm32f40x>(),
            Err(RccError::FlashTooSlow {
                ahb_hz: 168_000_000,
                vcc_mv: 1800,
            })
        );
    }

    #[test]
    fn checked_matches_unchecked() {
        let config = ClockConfig::new().use_hse(8.MHz()).sys_ck(168.MHz());
        assert_eq!(config.plan_checked::<Stm32f40x>(), Ok(config.plan::<Stm32f40x>()));
    }

    #[test]
    fn freeze() {
        let mut regs = MockRegisters::new();
        let clocks = (&mut regs)
            .constrain::<Stm32f40x>()
            .use_hse(8.MHz())
            .bypass_hse()
            .sys_ck(168.MHz())
            .vcc_mv(3300)
            .freeze();

        assert_eq!(clocks.sys_ck().raw(), 168_000_000);
        assert!(regs.is_set(RCC_CR::HSEBYP));
        assert!(regs.is_set(RCC_CR::PLLRDY));
        assert_eq!(regs.field(RCC_CFGR::SWS), 0b10);
        assert_eq!(regs.field(FLASH_ACR::LATENCY), 5);
    }

    #[test]
    fn reader_round_trip() {
        let mut regs = MockRegisters::new();
        let applied = (&mut regs)
            .constrain::<Stm32f40x>()
            .use_hse(8.MHz())
            .sys_ck(168.MHz())
            .freeze();

        let read = ClockStateReader::<Stm32f40x>::new(Some(8_000_000)).read_clocks(&regs);
        assert_eq!(read, applied);
    }

    #[test]
    fn reader_round_trip_overdrive() {
        let mut regs = MockRegisters::new();
        let rcc = (&mut regs)
            .constrain::<Stm32f42x>()
            .use_hse(8.MHz())
            .sys_ck(180.MHz());
        let applied = rcc.freeze();
        assert!(applied.overdrive);

        let read = ClockStateReader::<Stm32f42x>::new(Some(8_000_000)).read_clocks(&regs);
        assert_eq!(read, applied);
    }

    #[test]
    fn reader_round_trip_f446() {
        let mut regs = MockRegisters::new();
        let applied = (&mut regs)
            .constrain::<Stm32f446>()
            .sys_ck(180.MHz())
            .freeze();

        let read = ClockStateReader::<Stm32f446>::new(None).read_clocks(&regs);
        assert_eq!(read, applied);
    }

    #[test]
    fn display() {
        let error = RccError::FlashTooSlow {
            ahb_hz: 200_000_000,
            vcc_mv: 3300,
        };
        assert_eq!(
            format!("{error}"),
            "flash is not rated for 200000000Hz at 3300mV"
        );
    }
}
