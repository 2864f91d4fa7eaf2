//! Main PLL parameter search
//!
//! The STM32F4 main PLL produces
//!
//! ```text
//! vco_in  = pll_in / M        M in [2, 63]
//! vco_out = vco_in * N        N in [2, 511]
//! pll_p   = vco_out / P       P in {2, 4, 6, 8}, encoded 0..=3
//! pll_q   = vco_out / Q       Q in [2, 15], the 48MHz USB/SDIO clock
//! ```
//!
//! [`solve_pll`] searches this space for the P output closest to, but not
//! above, a requested system clock.

use super::chip::ChipLimits;
use super::RccError;

/// USB OTG FS / SDIO / RNG reference clock derived from the Q tap
pub const USB_CLOCK_HZ: u32 = 48_000_000;

const PLL_M_MIN: u32 = 2;
const PLL_M_MAX: u32 = 63;
const PLL_N_MIN: u32 = 2;
const PLL_N_MAX: u32 = 511;
const PLL_P_MAX: u32 = 3;
/// Smallest valid `PLLQ` divider
pub const PLL_Q_MIN: u32 = 2;
/// Largest valid `PLLQ` divider
pub const PLL_Q_MAX: u32 = 15;
/// Largest valid `PLLR` divider
pub const PLL_R_MAX: u32 = 7;

/// Input of the main PLL, as selected by `PLLSRC`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PllSource {
    /// HSI, the 16MHz internal RC oscillator
    Internal,
    /// HSE, an external crystal or clock
    ExternalCrystal,
}

impl PllSource {
    /// `PLLSRC` encoding
    pub fn bits(self) -> u32 {
        match self {
            PllSource::Internal => 0,
            PllSource::ExternalCrystal => 1,
        }
    }

    /// Decodes `PLLSRC`
    pub fn from_bits(bits: u32) -> Self {
        if bits & 1 == 0 {
            PllSource::Internal
        } else {
            PllSource::ExternalCrystal
        }
    }
}

/// Parameters of the main PLL
///
/// `m`, `n`, `q` and `r` hold the raw divider values. `p` holds the `PLLP`
/// encoding, dividing by `2 * (p + 1)`. A plan that found no valid
/// parameters has `out_hz == 0`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PllPlan {
    /// Oscillator feeding the PLL
    pub source: PllSource,
    /// Frequency of that oscillator
    pub in_hz: u32,
    /// P tap output, the system clock candidate
    pub out_hz: u32,
    /// Input divider
    pub m: u32,
    /// VCO multiplier
    pub n: u32,
    /// System clock divider encoding
    pub p: u32,
    /// USB clock divider
    pub q: u32,
    /// R tap divider
    pub r: u32,
}

impl PllPlan {
    /// A plan that leaves the PLL unused. Q and R sit at their slowest
    /// setting.
    pub fn unused(source: PllSource, in_hz: u32) -> Self {
        PllPlan {
            source,
            in_hz,
            out_hz: 0,
            m: 0,
            n: 0,
            p: 0,
            q: PLL_Q_MAX,
            r: PLL_R_MAX,
        }
    }

    /// `true` if the search found valid parameters
    pub fn is_valid(&self) -> bool {
        self.out_hz != 0
    }

    /// VCO input frequency (after `M`)
    pub fn vco_in_hz(&self) -> u32 {
        match self.m {
            0 => 0,
            m => self.in_hz / m,
        }
    }

    /// VCO output frequency (after `N`). Saturates for parameters read
    /// back from an out of range `PLLCFGR`.
    pub fn vco_out_hz(&self) -> u32 {
        self.vco_in_hz().saturating_mul(self.n)
    }

    /// Q tap output frequency
    pub fn q_hz(&self) -> u32 {
        match self.q {
            0 => 0,
            q => self.vco_out_hz() / q,
        }
    }

    /// R tap output frequency
    pub fn r_hz(&self) -> u32 {
        match self.r {
            0 => 0,
            r => self.vco_out_hz() / r,
        }
    }
}

/// Q divider for a VCO output. The slowest divider if the result does not
/// fit the field.
fn usb_divider(vco_out: u32) -> u32 {
    let q = vco_out / USB_CLOCK_HZ;
    if (PLL_Q_MIN..=PLL_Q_MAX).contains(&q) {
        q
    } else {
        PLL_Q_MAX
    }
}

/// Finds PLL parameters whose P output is the closest to `target_hz`
/// without exceeding it (or `C::PLL_MAX_HZ`).
///
/// The scan runs over ascending `m`, then `n`, then `p`. A candidate
/// replaces the best so far only if it is strictly closer, so among equally
/// close candidates the first one scanned wins. The scan stops early on an
/// exact match whose VCO frequency is also a multiple of the USB clock,
/// since nothing can improve on it.
///
/// Both loop exits rely on monotonicity and must not be turned into
/// `continue`s or narrowed bounds:
///
/// * `vco_in = in_hz / m` never increases with `m`, so once it falls below
///   the VCO input minimum no larger `m` can bring it back.
/// * `vco_out = vco_in * n` strictly increases with `n`, so once it exceeds
///   the VCO output maximum every larger `n` does too.
///
/// If nothing satisfies the VCO limits the returned plan has `out_hz == 0`.
pub fn solve_pll<C: ChipLimits>(
    in_hz: u32,
    target_hz: u32,
    source: PllSource,
) -> PllPlan {
    let mut best = PllPlan::unused(source, in_hz);

    'search: for m in PLL_M_MIN..=PLL_M_MAX {
        let vco_in = in_hz / m;
        if vco_in > C::VCO_IN_MAX_HZ {
            continue;
        }
        if vco_in < C::VCO_IN_MIN_HZ {
            break;
        }

        for n in PLL_N_MIN..=PLL_N_MAX {
            let vco_out = vco_in * n;
            if vco_out > C::VCO_OUT_MAX_HZ {
                break;
            }
            if vco_out < C::VCO_OUT_MIN_HZ {
                continue;
            }

            for p in 0..=PLL_P_MAX {
                let pll_out = vco_out / (2 * (p + 1));
                if pll_out > C::PLL_MAX_HZ || pll_out > target_hz {
                    continue;
                }
                // best.out_hz starts at 0, so any candidate beats it
                if target_hz - pll_out >= target_hz - best.out_hz {
                    continue;
                }

                best = PllPlan {
                    source,
                    in_hz,
                    out_hz: pll_out,
                    m,
                    n,
                    p,
                    q: usb_divider(vco_out),
                    r: PLL_R_MAX,
                };

                if pll_out == target_hz && vco_out % USB_CLOCK_HZ == 0 {
                    break 'search;
                }
            }
        }
    }

    best
}

/// As [`solve_pll`], but reports a search that found nothing
pub fn solve_pll_checked<C: ChipLimits>(
    in_hz: u32,
    target_hz: u32,
    source: PllSource,
) -> Result<PllPlan, RccError> {
    let plan = solve_pll::<C>(in_hz, target_hz, source);
    if plan.is_valid() {
        Ok(plan)
    } else {
        Err(RccError::PllUnreachable { in_hz, target_hz })
    }
}

#[cfg(test)]
mod tests {
    use super::{
        solve_pll, solve_pll_checked, PllPlan, PllSource, PLL_Q_MAX,
        PLL_Q_MIN, PLL_R_MAX, USB_CLOCK_HZ,
    };
    use crate::rcc::chip::{ChipLimits, Stm32f40x, Stm32f42x, Stm32f446};
    use crate::rcc::RccError;

    /// Reference scan without any pruning
    fn brute_force<C: ChipLimits>(in_hz: u32, target_hz: u32) -> Option<(u32, u32, u32, u32)> {
        let mut best: Option<(u32, u32, u32, u32)> = None;
        for m in 2..=63 {
            let vco_in = in_hz / m;
            if vco_in < C::VCO_IN_MIN_HZ || vco_in > C::VCO_IN_MAX_HZ {
                continue;
            }
            for n in 2..=511 {
                let vco_out = vco_in * n;
                if vco_out < C::VCO_OUT_MIN_HZ || vco_out > C::VCO_OUT_MAX_HZ {
                    continue;
                }
                for p in 0..=3 {
                    let out = vco_out / (2 * (p + 1));
                    if out > C::PLL_MAX_HZ || out > target_hz {
                        continue;
                    }
                    match best {
                        Some((_, _, _, b)) if target_hz - out >= target_hz - b => {}
                        _ => best = Some((m, n, p, out)),
                    }
                }
            }
        }
        best
    }

    fn check_invariants<C: ChipLimits>(plan: &PllPlan, target_hz: u32) {
        let vco_in = plan.in_hz / plan.m;
        let vco_out = vco_in * plan.n;
        assert!(vco_in >= C::VCO_IN_MIN_HZ && vco_in <= C::VCO_IN_MAX_HZ, "{plan:?}");
        assert!(vco_out >= C::VCO_OUT_MIN_HZ && vco_out <= C::VCO_OUT_MAX_HZ, "{plan:?}");
        assert_eq!(plan.out_hz, vco_out / (2 * (plan.p + 1)));
        assert!(plan.out_hz <= target_hz);
        assert!(plan.out_hz <= C::PLL_MAX_HZ);
        assert!(plan.p <= 3);
        assert!((PLL_Q_MIN..=PLL_Q_MAX).contains(&plan.q));
        assert_eq!(plan.r, PLL_R_MAX);
    }

    #[test]
    fn hse_8mhz_to_168mhz() {
        let plan = solve_pll::<Stm32f40x>(8_000_000, 168_000_000, PllSource::ExternalCrystal);

        assert_eq!(plan.m, 4);
        assert_eq!(plan.vco_in_hz(), 2_000_000);
        assert_eq!(plan.n, 168);
        assert_eq!(plan.vco_out_hz(), 336_000_000);
        assert_eq!(plan.p, 0);
        assert_eq!(plan.out_hz, 168_000_000);
        assert_eq!(plan.q, 7);
        assert_eq!(plan.q_hz(), USB_CLOCK_HZ);
        assert_eq!(plan.source, PllSource::ExternalCrystal);
    }

    #[test]
    fn vco_saturates_out_of_range() {
        let plan = PllPlan {
            m: 2,
            n: 432,
            q: 2,
            ..PllPlan::unused(PllSource::ExternalCrystal, 50_000_000)
        };

        assert_eq!(plan.vco_in_hz(), 25_000_000);
        assert_eq!(plan.vco_out_hz(), u32::MAX);
        assert_eq!(plan.q_hz(), u32::MAX / 2);
    }

    #[test]
    fn hsi_16mhz_to_168mhz() {
        let plan = solve_pll::<Stm32f40x>(16_000_000, 168_000_000, PllSource::Internal);

        assert_eq!((plan.m, plan.n, plan.p, plan.q), (8, 168, 0, 7));
        assert_eq!(plan.out_hz, 168_000_000);
    }

    #[test]
    fn ties_keep_first_candidate() {
        // 180MHz is reachable from m=4, n=180 and from m=8, n=360 alike;
        // neither VCO is a multiple of 48MHz so the scan runs to the end.
        let plan = solve_pll::<Stm32f42x>(8_000_000, 180_000_000, PllSource::ExternalCrystal);

        assert_eq!((plan.m, plan.n, plan.p), (4, 180, 0));
        assert_eq!(plan.out_hz, 180_000_000);
        // 360MHz / 48MHz = 7.5, rounded down
        assert_eq!(plan.q, 7);
    }

    #[test]
    fn never_above_family_maximum() {
        let plan = solve_pll::<Stm32f40x>(8_000_000, 180_000_000, PllSource::ExternalCrystal);

        assert_eq!(plan.out_hz, 168_000_000);
        check_invariants::<Stm32f40x>(&plan, 180_000_000);
    }

    #[test]
    fn invariants_hold_over_target_range() {
        for in_hz in [8_000_000, 16_000_000] {
            let mut target_hz = 100_000_000;
            while target_hz <= 180_000_000 {
                let plan = solve_pll::<Stm32f446>(in_hz, target_hz, PllSource::ExternalCrystal);
                check_invariants::<Stm32f446>(&plan, target_hz);

                target_hz += 999_983;
            }
            // Both ends of the range exactly
            for target_hz in [100_000_000, 180_000_000] {
                let plan = solve_pll::<Stm32f446>(in_hz, target_hz, PllSource::ExternalCrystal);
                check_invariants::<Stm32f446>(&plan, target_hz);
                assert_eq!(plan.out_hz, target_hz);
            }
        }
    }

    #[test]
    fn matches_brute_force() {
        let cases = [
            (8_000_000, 100_000_000),
            (8_000_000, 123_456_789),
            (8_000_000, 168_000_000),
            (12_000_000, 120_000_000),
            (16_000_000, 84_000_000),
            (16_000_000, 150_000_001),
            (25_000_000, 100_000_000),
            (25_000_000, 167_999_999),
            (26_000_000, 180_000_000),
        ];

        for (in_hz, target_hz) in cases {
            let plan = solve_pll::<Stm32f42x>(in_hz, target_hz, PllSource::ExternalCrystal);
            let (m, n, p, out) = brute_force::<Stm32f42x>(in_hz, target_hz).unwrap();

            println!("{in_hz} Hz -> {target_hz} Hz: {plan:?}");
            assert_eq!(plan.out_hz, out);
            assert_eq!((plan.m, plan.n, plan.p), (m, n, p));
        }
    }

    #[test]
    fn unreachable_target_leaves_zero() {
        // No M brings a 500kHz input up to the VCO input minimum
        let plan = solve_pll::<Stm32f40x>(500_000, 168_000_000, PllSource::ExternalCrystal);
        assert_eq!(plan.out_hz, 0);
        assert!(!plan.is_valid());
        assert_eq!(plan, PllPlan::unused(PllSource::ExternalCrystal, 500_000));

        // The slowest P output is 100MHz / 8
        let plan = solve_pll::<Stm32f40x>(8_000_000, 10_000_000, PllSource::ExternalCrystal);
        assert_eq!(plan.out_hz, 0);
    }

    #[test]
    fn checked_reports_unreachable() {
        assert_eq!(
            solve_pll_checked::<Stm32f40x>(8_000_000, 10_000_000, PllSource::Internal),
            Err(RccError::PllUnreachable {
                in_hz: 8_000_000,
                target_hz: 10_000_000
            })
        );
        assert!(solve_pll_checked::<Stm32f40x>(8_000_000, 96_000_000, PllSource::Internal).is_ok());
    }
}
