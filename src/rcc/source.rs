//! Oscillator and PLL enable
//!
//! Brings up the clock a new configuration runs from, without selecting it
//! on the system clock multiplexer. Every wait is a [`block_until`] with no
//! timeout.

use super::chip::ChipLimits;
use super::pll::{PllPlan, PllSource};
use super::plan::{ClockPlan, ClockSource};
use crate::regs::{block_until, RegisterFile, RCC_CFGR, RCC_CR, RCC_PLLCFGR};

#[cfg(feature = "log")]
use log::debug;

/// Enables HSI and waits for it to stabilise
pub fn enable_hsi<R: RegisterFile>(regs: &mut R) {
    if regs.is_set(RCC_CR::HSIRDY) {
        return;
    }
    regs.modify(RCC_CR::HSION::SET);
    block_until(regs, RCC_CR::HSIRDY, 1);
}

/// Enables HSE and waits for it to stabilise. Hangs if no oscillator is
/// connected or it fails to start.
///
/// `HSEBYP` can only change while HSE is off, so an oscillator already
/// running in the other mode is left as is.
pub fn enable_hse<R: RegisterFile>(regs: &mut R, bypass: bool) {
    if regs.is_set(RCC_CR::HSERDY) {
        return;
    }
    regs.modify(RCC_CR::HSEBYP.val(bypass as u32));
    regs.modify(RCC_CR::HSEON::SET);
    block_until(regs, RCC_CR::HSERDY, 1);
}

/// Enables the oscillator behind a PLL source
pub fn enable_oscillator<R: RegisterFile>(
    regs: &mut R,
    source: PllSource,
    bypass: bool,
) {
    match source {
        PllSource::Internal => enable_hsi(regs),
        PllSource::ExternalCrystal => enable_hse(regs, bypass),
    }
}

/// `true` if the PLL is locked with exactly the parameters of `pll`
pub fn pll_matches<R: RegisterFile, C: ChipLimits>(regs: &R, pll: &PllPlan) -> bool {
    let pllcfgr = regs.copy::<RCC_PLLCFGR::Register>();
    regs.is_set(RCC_CR::PLLRDY)
        && pllcfgr.read(RCC_PLLCFGR::PLLM) == pll.m
        && pllcfgr.read(RCC_PLLCFGR::PLLN) == pll.n
        && pllcfgr.read(RCC_PLLCFGR::PLLP) == pll.p
        && pllcfgr.read(RCC_PLLCFGR::PLLQ) == pll.q
        && PllSource::from_bits(pllcfgr.read(RCC_PLLCFGR::PLLSRC)) == pll.source
        && (!C::HAS_PLL_R || pllcfgr.read(RCC_PLLCFGR::PLLR) == pll.r)
}

/// Programs and locks the main PLL.
///
/// `PLLCFGR` can only be written while the PLL is off, and the PLL can only
/// be turned off while it does not drive SYSCLK. If it does, SYSCLK is
/// first parked on HSI, which runs slower than any PLL output.
pub fn enable_pll<R: RegisterFile, C: ChipLimits>(
    regs: &mut R,
    pll: &PllPlan,
    hse_bypass: bool,
) {
    enable_oscillator(regs, pll.source, hse_bypass);

    if pll_matches::<R, C>(regs, pll) {
        return;
    }

    if regs.is_set(RCC_CR::PLLON) {
        if regs.field(RCC_CFGR::SWS) == ClockSource::Pll.bits() {
            #[cfg(feature = "log")]
            debug!("parking SYSCLK on HSI to reprogram the PLL");

            enable_hsi(regs);
            regs.modify(RCC_CFGR::SW.val(ClockSource::Internal.bits()));
            block_until(regs, RCC_CFGR::SWS, ClockSource::Internal.bits());
        }
        regs.modify(RCC_CR::PLLON::CLEAR);
        block_until(regs, RCC_CR::PLLRDY, 0);
    }

    let mut pllcfgr = RCC_PLLCFGR::PLLM.val(pll.m)
        + RCC_PLLCFGR::PLLN.val(pll.n)
        + RCC_PLLCFGR::PLLP.val(pll.p)
        + RCC_PLLCFGR::PLLSRC.val(pll.source.bits())
        + RCC_PLLCFGR::PLLQ.val(pll.q);
    if C::HAS_PLL_R {
        pllcfgr = pllcfgr + RCC_PLLCFGR::PLLR.val(pll.r);
    }
    regs.modify(pllcfgr);

    regs.modify(RCC_CR::PLLON::SET);
    block_until(regs, RCC_CR::PLLRDY, 1);
}

/// Enables whatever `plan` selects as the system clock source, and waits
/// until it is ready to be switched to
pub fn enable_precursor<R: RegisterFile, C: ChipLimits>(
    regs: &mut R,
    plan: &ClockPlan,
) {
    match plan.source {
        ClockSource::Internal => enable_hsi(regs),
        ClockSource::ExternalCrystal => enable_hse(regs, plan.hse_bypass),
        ClockSource::Pll => enable_pll::<R, C>(regs, &plan.pll, plan.hse_bypass),
    }
}
