//! Prelude

pub use crate::rcc::RccExt as _stm32f4_clocktree_rcc_RccExt;
pub use crate::regs::RegisterFile as _stm32f4_clocktree_regs_RegisterFile;

pub use fugit::RateExtU32 as _;
