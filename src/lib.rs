//! Clock tree configuration for STM32F4 microcontrollers
//!
//! Computes PLL parameters, bus prescalers and flash wait states for a
//! requested system clock, and applies them in an order that keeps the
//! core within its ratings at every step. See [`rcc`] to get started.
#![cfg_attr(not(test), no_std)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod prelude;

pub mod pwr;

pub mod time;

pub mod rcc;

pub mod regs;
