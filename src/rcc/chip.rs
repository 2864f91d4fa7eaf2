//! Hardware limits of the supported STM32F4 families
//!
//! Each family is an uninhabited type implementing [`ChipLimits`]. The
//! solvers and the sequencer are generic over it, so the limits are
//! resolved at compile time.

/// Flash wait-state ceilings, indexed `[voltage band][wait states]`.
///
/// Entry `[b][w]` is the highest HCLK in Hz that the flash supports with `w`
/// wait states in voltage band `b`. Every row increases monotonically. Band
/// order follows [`VoltageBand`](super::flash::VoltageBand).
pub type WaitStateTable = [&'static [u32]; 4];

/// Clock limits of a chip family
pub trait ChipLimits {
    /// Maximum AHB clock (HCLK)
    const AHB_MAX_HZ: u32;
    /// Maximum low speed APB1 clock (PCLK1)
    const APB1_MAX_HZ: u32;
    /// Maximum high speed APB2 clock (PCLK2)
    const APB2_MAX_HZ: u32;
    /// Maximum PLL output (P tap)
    const PLL_MAX_HZ: u32;

    /// Lowest VCO input (PLL reference after `M`)
    const VCO_IN_MIN_HZ: u32 = 1_000_000;
    /// Highest VCO input
    const VCO_IN_MAX_HZ: u32 = 2_000_000;
    /// Lowest VCO output
    const VCO_OUT_MIN_HZ: u32 = 100_000_000;
    /// Highest VCO output
    const VCO_OUT_MAX_HZ: u32 = 432_000_000;

    /// The PLL has an R output tap, with a `PLLR` field in `RCC_PLLCFGR`
    const HAS_PLL_R: bool = false;

    /// System clocks above this frequency need the overdrive regulator
    /// mode. `None` if the family has no overdrive.
    const OVERDRIVE_ABOVE_HZ: Option<u32> = None;

    /// Flash wait states per voltage band
    const FLASH_WAIT_STATES: WaitStateTable;
}

/// STM32F405/F407/F415/F417, RM0090 Table 10
pub enum Stm32f40x {}

impl ChipLimits for Stm32f40x {
    const AHB_MAX_HZ: u32 = 168_000_000;
    const APB1_MAX_HZ: u32 = 42_000_000;
    const APB2_MAX_HZ: u32 = 84_000_000;
    const PLL_MAX_HZ: u32 = 168_000_000;

    const FLASH_WAIT_STATES: WaitStateTable = [
        &[
            30_000_000,
            60_000_000,
            90_000_000,
            120_000_000,
            150_000_000,
            168_000_000,
        ],
        &[
            24_000_000,
            48_000_000,
            72_000_000,
            96_000_000,
            120_000_000,
            144_000_000,
            168_000_000,
        ],
        &[
            22_000_000,
            44_000_000,
            66_000_000,
            88_000_000,
            110_000_000,
            132_000_000,
            154_000_000,
            168_000_000,
        ],
        &[
            20_000_000,
            40_000_000,
            60_000_000,
            80_000_000,
            100_000_000,
            120_000_000,
            140_000_000,
            160_000_000,
        ],
    ];
}

// F42x/43x and F446 share the same flash timings
const WAIT_STATES_180MHZ: WaitStateTable = [
    &[
        30_000_000,
        60_000_000,
        90_000_000,
        120_000_000,
        150_000_000,
        180_000_000,
    ],
    &[
        24_000_000,
        48_000_000,
        72_000_000,
        96_000_000,
        120_000_000,
        144_000_000,
        168_000_000,
        180_000_000,
    ],
    &[
        22_000_000,
        44_000_000,
        66_000_000,
        88_000_000,
        110_000_000,
        132_000_000,
        154_000_000,
        176_000_000,
        180_000_000,
    ],
    &[
        20_000_000,
        40_000_000,
        60_000_000,
        80_000_000,
        100_000_000,
        120_000_000,
        140_000_000,
        160_000_000,
        168_000_000,
    ],
];

/// STM32F427/F429/F437/F439, RM0090 Table 11
pub enum Stm32f42x {}

impl ChipLimits for Stm32f42x {
    const AHB_MAX_HZ: u32 = 180_000_000;
    const APB1_MAX_HZ: u32 = 45_000_000;
    const APB2_MAX_HZ: u32 = 90_000_000;
    const PLL_MAX_HZ: u32 = 180_000_000;

    const OVERDRIVE_ABOVE_HZ: Option<u32> = Some(168_000_000);

    const FLASH_WAIT_STATES: WaitStateTable = WAIT_STATES_180MHZ;
}

/// STM32F446, RM0390 Table 5
pub enum Stm32f446 {}

impl ChipLimits for Stm32f446 {
    const AHB_MAX_HZ: u32 = 180_000_000;
    const APB1_MAX_HZ: u32 = 45_000_000;
    const APB2_MAX_HZ: u32 = 90_000_000;
    const PLL_MAX_HZ: u32 = 180_000_000;

    const HAS_PLL_R: bool = true;
    const OVERDRIVE_ABOVE_HZ: Option<u32> = Some(168_000_000);

    const FLASH_WAIT_STATES: WaitStateTable = WAIT_STATES_180MHZ;
}
