//! Power Control (PWR)
//!
//! STM32F42x/43x and STM32F446 need the main regulator in overdrive mode
//! to run SYSCLK above 168MHz. Entering overdrive is a two step handshake:
//! `ODEN` raises the regulator (`ODRDY`), then `ODSWEN` switches the core
//! domain onto it (`ODSWRDY`).
//!
//! Overdrive is only ever switched on here. Leaving it is a power policy
//! decision this crate does not make.

use crate::regs::{block_until, RegisterFile, PWR_CR, PWR_CSR, RCC_APB1ENR};

#[cfg(feature = "log")]
use log::debug;

/// `true` if the core domain runs on the overdrive regulator
pub fn overdrive_active<R: RegisterFile>(regs: &R) -> bool {
    regs.is_set(PWR_CSR::ODSWRDY)
}

/// Enters overdrive mode. Blocks, with no timeout, on both acknowledgments.
pub fn enable_overdrive<R: RegisterFile>(regs: &mut R) {
    // PWR registers are only reachable with the PWR interface clocked
    regs.modify(RCC_APB1ENR::PWREN::SET);

    if overdrive_active(regs) {
        return;
    }

    #[cfg(feature = "log")]
    debug!("PWR: enabling overdrive");

    regs.modify(PWR_CR::ODEN::SET);
    block_until(regs, PWR_CSR::ODRDY, 1);

    regs.modify(PWR_CR::ODSWEN::SET);
    block_until(regs, PWR_CSR::ODSWRDY, 1);
}
