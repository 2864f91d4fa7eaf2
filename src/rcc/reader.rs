//! Clock tree decoding
//!
//! Rebuilds a [`ClockPlan`] from the registers alone, independently of
//! whatever plan wrote them.

use core::marker::PhantomData;

use super::chip::ChipLimits;
use super::plan::{ClockPlan, ClockSource};
use super::pll::{PllPlan, PllSource, PLL_R_MAX};
use super::prescaler::PrescalerKind;
use super::HSI_HZ;
use crate::regs::{RegisterFile, FLASH_ACR, PWR_CSR, RCC_CFGR, RCC_CR, RCC_PLLCFGR};

/// Decodes the live clock configuration
///
/// HSE has no frequency register, so the board's HSE frequency has to be
/// supplied. Without it anything running from HSE decodes as 0Hz, and the
/// decoded plan reports `sys_known() == false`.
pub struct ClockStateReader<C> {
    hse_hz: Option<u32>,
    _chip: PhantomData<C>,
}

impl<C: ChipLimits> ClockStateReader<C> {
    /// Creates a reader for a board with the given HSE frequency
    pub fn new(hse_hz: Option<u32>) -> Self {
        ClockStateReader {
            hse_hz,
            _chip: PhantomData,
        }
    }

    fn pll_input_hz(&self, source: PllSource) -> u32 {
        match source {
            PllSource::Internal => HSI_HZ,
            PllSource::ExternalCrystal => self.hse_hz.unwrap_or(0),
        }
    }

    /// Decodes `PLLCFGR`. A PLL that is not locked decodes as unused.
    ///
    /// Out of range settings are decoded as they are, with frequencies
    /// beyond `u32` saturating.
    pub fn read_pll<R: RegisterFile>(&self, regs: &R) -> PllPlan {
        let pllcfgr = regs.copy::<RCC_PLLCFGR::Register>();
        let source = PllSource::from_bits(pllcfgr.read(RCC_PLLCFGR::PLLSRC));
        let in_hz = self.pll_input_hz(source);

        let m = pllcfgr.read(RCC_PLLCFGR::PLLM);
        if !regs.is_set(RCC_CR::PLLRDY) || m == 0 {
            return PllPlan::unused(source, in_hz);
        }

        let n = pllcfgr.read(RCC_PLLCFGR::PLLN);
        let p = pllcfgr.read(RCC_PLLCFGR::PLLP);
        let vco_out_hz = u64::from(in_hz / m) * u64::from(n);
        let out_hz = vco_out_hz / u64::from(2 * (p + 1));

        PllPlan {
            source,
            in_hz,
            out_hz: u32::try_from(out_hz).unwrap_or(u32::MAX),
            m,
            n,
            p,
            q: pllcfgr.read(RCC_PLLCFGR::PLLQ),
            r: if C::HAS_PLL_R {
                pllcfgr.read(RCC_PLLCFGR::PLLR)
            } else {
                PLL_R_MAX
            },
        }
    }

    /// Decodes the complete clock tree. Never writes to `regs`.
    ///
    /// `sys_hz` and the bus frequencies are 0 when SYSCLK runs, directly or
    /// through the PLL, from an HSE of unknown frequency.
    pub fn read_clocks<R: RegisterFile>(&self, regs: &R) -> ClockPlan {
        let pll = self.read_pll(regs);

        let (source, sys_hz) = match regs.field(RCC_CFGR::SWS) {
            0b00 => (ClockSource::Internal, HSI_HZ),
            0b01 => (ClockSource::ExternalCrystal, self.hse_hz.unwrap_or(0)),
            0b10 => (ClockSource::Pll, pll.out_hz),
            // PLL R on parts that have it, reserved otherwise
            _ if C::HAS_PLL_R => (ClockSource::Pll, pll.r_hz()),
            _ => (ClockSource::Internal, HSI_HZ),
        };

        let cfgr = regs.copy::<RCC_CFGR::Register>();
        let hpre = cfgr.read(RCC_CFGR::HPRE) as u8;
        let ppre1 = cfgr.read(RCC_CFGR::PPRE1) as u8;
        let ppre2 = cfgr.read(RCC_CFGR::PPRE2) as u8;

        let ahb_hz = PrescalerKind::Ahb.divide(sys_hz, hpre);
        let acr = regs.copy::<FLASH_ACR::Register>();

        ClockPlan {
            source,
            sys_hz,
            ahb_hz,
            apb1_hz: PrescalerKind::Apb.divide(ahb_hz, ppre1),
            apb2_hz: PrescalerKind::Apb.divide(ahb_hz, ppre2),
            pll,
            hse_bypass: regs.is_set(RCC_CR::HSEBYP),
            hse_hz: self.hse_hz,
            hpre,
            ppre1,
            ppre2,
            flash_latency: acr.read(FLASH_ACR::LATENCY) as u8,
            flash_prefetch: acr.is_set(FLASH_ACR::PRFTEN),
            overdrive: regs.is_set(PWR_CSR::ODSWRDY),
        }
    }
}
