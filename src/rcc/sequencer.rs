//! Ordered application of a clock plan
//!
//! The order of the register writes is what keeps the core within its
//! ratings while the clock tree changes:
//!
//! * **Raising** SYSCLK: bring up the new source, then program the bus
//!   prescalers and the flash latency for the new frequency while still
//!   running from the old, slower clock, then switch the multiplexer, then
//!   negotiate overdrive if the new frequency needs it.
//! * **Lowering** SYSCLK: bring up the new source, switch the multiplexer
//!   first, then relax the prescalers and the flash latency.
//! * **Unknown** current SYSCLK, for example HSE of an unknown frequency:
//!   bring up the new source, program the larger of the current and the new
//!   flash latency and bus dividers, switch the multiplexer, then program
//!   the new settings.
//!
//! Folding both into one fixed order opens a window where the core or a
//! bus runs faster than the flash or the bus is rated for.

use core::marker::PhantomData;

use super::chip::ChipLimits;
use super::plan::ClockPlan;
use super::prescaler::PrescalerKind;
use super::source::enable_precursor;
use crate::pwr::{enable_overdrive, overdrive_active};
use crate::regs::{block_until, RegisterFile, FLASH_ACR, RCC_CFGR};

#[cfg(feature = "log")]
use log::debug;

/// Progress of a [`ClockSequencer`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SequencerState {
    /// Nothing written yet
    Idle,
    /// Waiting for the new oscillator or PLL
    PrecursorEnabling,
    /// Waiting for the system clock multiplexer
    MuxSwitching,
    /// Waiting for the overdrive regulator
    OverdriveNegotiating,
    /// The plan is applied
    Stable,
}

/// Direction of a frequency change
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// SYSCLK stays the same or goes up
    Raising,
    /// SYSCLK goes down
    Lowering,
    /// The current SYSCLK could not be decoded
    Unknown,
}

impl Direction {
    /// Direction of the change from `current` to `target`
    pub fn of(target: &ClockPlan, current: &ClockPlan) -> Self {
        if !current.sys_known() {
            Direction::Unknown
        } else if target.sys_hz >= current.sys_hz {
            Direction::Raising
        } else {
            Direction::Lowering
        }
    }
}

/// Applies a [`ClockPlan`] to a register file
pub struct ClockSequencer<'a, R, C> {
    regs: &'a mut R,
    state: SequencerState,
    _chip: PhantomData<C>,
}

impl<'a, R: RegisterFile, C: ChipLimits> ClockSequencer<'a, R, C> {
    /// Creates a sequencer in the `Idle` state
    pub fn new(regs: &'a mut R) -> Self {
        ClockSequencer {
            regs,
            state: SequencerState::Idle,
            _chip: PhantomData,
        }
    }

    /// Current state
    pub fn state(&self) -> SequencerState {
        self.state
    }

    fn enter(&mut self, next: SequencerState) {
        #[cfg(feature = "log")]
        debug!("clock sequencer: {:?} -> {:?}", self.state, next);

        self.state = next;
    }

    /// Moves the device from `current` to `target`, and returns the plan
    /// now in effect.
    ///
    /// `current` must describe the device as it is, typically from
    /// [`ClockStateReader::read_clocks`](super::ClockStateReader::read_clocks).
    /// Never fails; every wait on the hardware blocks without a timeout.
    ///
    /// The returned plan is `target`, except that `overdrive` reports the
    /// regulator as it is.
    pub fn configure(
        &mut self,
        target: &ClockPlan,
        current: &ClockPlan,
    ) -> ClockPlan {
        self.state = SequencerState::Idle;
        let direction = Direction::of(target, current);

        #[cfg(feature = "log")]
        debug!(
            "clock sequencer: {:?} {} Hz -> {} Hz",
            direction, current.sys_hz, target.sys_hz
        );

        self.enter(SequencerState::PrecursorEnabling);
        enable_precursor::<R, C>(self.regs, target);

        match direction {
            Direction::Raising => {
                self.program_bus_and_flash(target);
                self.enter(SequencerState::MuxSwitching);
                self.switch_mux(target);
            }
            Direction::Lowering => {
                self.enter(SequencerState::MuxSwitching);
                self.switch_mux(target);
                self.program_bus_and_flash(target);
            }
            Direction::Unknown => {
                let guard = self.guard_for(target);
                self.program_bus_and_flash(&guard);
                self.enter(SequencerState::MuxSwitching);
                self.switch_mux(target);
                self.program_bus_and_flash(target);
            }
        }

        if target.overdrive && !overdrive_active(self.regs) {
            self.enter(SequencerState::OverdriveNegotiating);
            enable_overdrive(self.regs);
        }

        self.enter(SequencerState::Stable);

        #[cfg(feature = "log")]
        {
            debug!("--- RCC register settings");

            let cfgr = self.regs.copy::<RCC_CFGR::Register>();
            debug!(
                "CFGR register: SWS={:#b} HPRE={:#b} PPRE1={:#b} PPRE2={:#b}",
                cfgr.read(RCC_CFGR::SWS),
                cfgr.read(RCC_CFGR::HPRE),
                cfgr.read(RCC_CFGR::PPRE1),
                cfgr.read(RCC_CFGR::PPRE2),
            );

            let pllcfgr = self.regs.read(crate::regs::Reg::RccPllcfgr);
            debug!("PLLCFGR register: {:#010x}", pllcfgr);

            let acr = self.regs.copy::<FLASH_ACR::Register>();
            debug!(
                "FLASH_ACR register: LATENCY={} PRFTEN={}",
                acr.read(FLASH_ACR::LATENCY),
                acr.read(FLASH_ACR::PRFTEN),
            );
        }

        // Overdrive is never left once entered
        ClockPlan {
            overdrive: overdrive_active(self.regs),
            ..*target
        }
    }

    /// Settings that hold for both the running clock and `target`: the
    /// larger flash latency and the slower divider on every bus
    fn guard_for(&self, target: &ClockPlan) -> ClockPlan {
        let cfgr = self.regs.copy::<RCC_CFGR::Register>();
        let current_latency = self.regs.field(FLASH_ACR::LATENCY) as u8;
        ClockPlan {
            hpre: PrescalerKind::Ahb.slower(cfgr.read(RCC_CFGR::HPRE) as u8, target.hpre),
            ppre1: PrescalerKind::Apb.slower(cfgr.read(RCC_CFGR::PPRE1) as u8, target.ppre1),
            ppre2: PrescalerKind::Apb.slower(cfgr.read(RCC_CFGR::PPRE2) as u8, target.ppre2),
            flash_latency: current_latency.max(target.flash_latency),
            ..*target
        }
    }

    /// Writes prescalers and flash latency.
    ///
    /// When the latency grows it is written first, when it shrinks it is
    /// written last, so HCLK never outruns the latency in between.
    fn program_bus_and_flash(&mut self, target: &ClockPlan) {
        let current_latency = self.regs.field(FLASH_ACR::LATENCY);
        if u32::from(target.flash_latency) >= current_latency {
            self.program_flash(target);
            self.program_prescalers(target);
        } else {
            self.program_prescalers(target);
            self.program_flash(target);
        }
    }

    fn program_prescalers(&mut self, target: &ClockPlan) {
        // One write, so the three dividers change together
        self.regs.modify(
            RCC_CFGR::HPRE.val(target.hpre.into())
                + RCC_CFGR::PPRE1.val(target.ppre1.into())
                + RCC_CFGR::PPRE2.val(target.ppre2.into()),
        );
    }

    fn program_flash(&mut self, target: &ClockPlan) {
        self.regs.modify(
            FLASH_ACR::LATENCY.val(target.flash_latency.into())
                + FLASH_ACR::PRFTEN.val(target.flash_prefetch as u32)
                + FLASH_ACR::ICEN::SET
                + FLASH_ACR::DCEN::SET,
        );
        // The new latency must be in effect before the clock changes
        block_until(
            self.regs,
            FLASH_ACR::LATENCY,
            target.flash_latency.into(),
        );
    }

    fn switch_mux(&mut self, target: &ClockPlan) {
        let sw = target.source.bits();
        self.regs.modify(RCC_CFGR::SW.val(sw));
        block_until(self.regs, RCC_CFGR::SWS, sw);
    }
}
