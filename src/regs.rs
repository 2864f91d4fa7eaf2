//! Register file access
//!
//! The clock tree is programmed through a small set of 32-bit registers in
//! the RCC, FLASH and PWR blocks. Instead of touching those blocks through
//! process-wide singletons, every routine in this crate receives a
//! [`RegisterFile`] handle. On the device that handle is [`Mmio`]; in unit
//! tests it is a mock that emulates the status flags and records writes.
//!
//! Field positions follow RM0090 (STM32F405/7, STM32F42x/43x) and RM0390
//! (STM32F446). They are a wire format to the hardware and must stay
//! bit-exact.

use tock_registers::fields::{Field, FieldValue};
use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::registers::ReadWrite;
use tock_registers::{register_bitfields, register_structs, LocalRegisterCopy, RegisterLongName};

const RCC_BASE: usize = 0x4002_3800;
const FLASH_BASE: usize = 0x4002_3C00;
const PWR_BASE: usize = 0x4000_7000;

register_bitfields![u32,
    /// RCC clock control register
    pub RCC_CR [
        HSION OFFSET(0) NUMBITS(1) [],
        HSIRDY OFFSET(1) NUMBITS(1) [],
        HSEON OFFSET(16) NUMBITS(1) [],
        HSERDY OFFSET(17) NUMBITS(1) [],
        HSEBYP OFFSET(18) NUMBITS(1) [],
        PLLON OFFSET(24) NUMBITS(1) [],
        PLLRDY OFFSET(25) NUMBITS(1) []
    ],
    /// RCC PLL configuration register
    pub RCC_PLLCFGR [
        PLLM OFFSET(0) NUMBITS(6) [],
        PLLN OFFSET(6) NUMBITS(9) [],
        PLLP OFFSET(16) NUMBITS(2) [],
        PLLSRC OFFSET(22) NUMBITS(1) [],
        PLLQ OFFSET(24) NUMBITS(4) [],
        // STM32F446 only, reserved elsewhere
        PLLR OFFSET(28) NUMBITS(3) []
    ],
    /// RCC clock configuration register
    pub RCC_CFGR [
        SW OFFSET(0) NUMBITS(2) [],
        SWS OFFSET(2) NUMBITS(2) [],
        HPRE OFFSET(4) NUMBITS(4) [],
        PPRE1 OFFSET(10) NUMBITS(3) [],
        PPRE2 OFFSET(13) NUMBITS(3) []
    ],
    /// RCC APB1 peripheral clock enable register
    pub RCC_APB1ENR [
        PWREN OFFSET(28) NUMBITS(1) []
    ],
    /// Flash access control register
    pub FLASH_ACR [
        LATENCY OFFSET(0) NUMBITS(4) [],
        PRFTEN OFFSET(8) NUMBITS(1) [],
        ICEN OFFSET(9) NUMBITS(1) [],
        DCEN OFFSET(10) NUMBITS(1) []
    ],
    /// PWR power control register
    pub PWR_CR [
        ODEN OFFSET(16) NUMBITS(1) [],
        ODSWEN OFFSET(17) NUMBITS(1) []
    ],
    /// PWR power control/status register
    pub PWR_CSR [
        ODRDY OFFSET(16) NUMBITS(1) [],
        ODSWRDY OFFSET(17) NUMBITS(1) []
    ]
];

register_structs! {
    RccRegisters {
        (0x000 => cr: ReadWrite<u32, RCC_CR::Register>),
        (0x004 => pllcfgr: ReadWrite<u32, RCC_PLLCFGR::Register>),
        (0x008 => cfgr: ReadWrite<u32, RCC_CFGR::Register>),
        (0x00C => _reserved0),
        (0x040 => apb1enr: ReadWrite<u32, RCC_APB1ENR::Register>),
        (0x044 => @END),
    },
    FlashRegisters {
        (0x000 => acr: ReadWrite<u32, FLASH_ACR::Register>),
        (0x004 => @END),
    },
    PwrRegisters {
        (0x000 => cr: ReadWrite<u32, PWR_CR::Register>),
        (0x004 => csr: ReadWrite<u32, PWR_CSR::Register>),
        (0x008 => @END),
    }
}

/// The registers this crate reads or writes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reg {
    /// RCC clock control register
    RccCr = 0,
    /// RCC PLL configuration register
    RccPllcfgr = 1,
    /// RCC clock configuration register
    RccCfgr = 2,
    /// RCC APB1 peripheral clock enable register
    RccApb1enr = 3,
    /// Flash access control register
    FlashAcr = 4,
    /// PWR power control register
    PwrCr = 5,
    /// PWR power control/status register
    PwrCsr = 6,
}

impl Reg {
    /// Number of registers in the file
    pub const COUNT: usize = 7;

    /// Every register, in index order
    pub const ALL: [Reg; Reg::COUNT] = [
        Reg::RccCr,
        Reg::RccPllcfgr,
        Reg::RccCfgr,
        Reg::RccApb1enr,
        Reg::FlashAcr,
        Reg::PwrCr,
        Reg::PwrCsr,
    ];

    /// Value of the register after a system reset
    pub const fn reset_value(self) -> u32 {
        match self {
            // HSION | HSIRDY | HSITRIM = 16
            Reg::RccCr => 0x0000_0083,
            // PLLM = 16, PLLN = 192, PLLP = /2, PLLQ = 4, PLLR = 2
            Reg::RccPllcfgr => 0x2400_3010,
            Reg::PwrCr => 0x0000_C000,
            _ => 0,
        }
    }
}

/// Ties a register layout to its place in the register file
pub trait Located: RegisterLongName {
    /// Register the layout describes
    const REG: Reg;
}

macro_rules! located {
    ($($reg:ident),+ $(,)?) => {
        paste::paste! {
            $(
                impl Located for [<$reg:snake:upper>]::Register {
                    const REG: Reg = Reg::$reg;
                }
            )+
        }
    };
}

located!(RccCr, RccPllcfgr, RccCfgr, RccApb1enr, FlashAcr, PwrCr, PwrCsr);

/// Handle to the clock, flash and power control registers
///
/// Implementors only move whole words. Field access goes through the
/// `tock-registers` layouts above, keyed by [`Located::REG`].
pub trait RegisterFile {
    /// Reads a whole register
    fn read(&self, reg: Reg) -> u32;

    /// Writes a whole register
    fn write(&mut self, reg: Reg, value: u32);

    /// Reads a register once, for decoding several fields of it
    fn copy<T: Located>(&self) -> LocalRegisterCopy<u32, T> {
        LocalRegisterCopy::new(self.read(T::REG))
    }

    /// Reads a single field
    fn field<T: Located>(&self, field: Field<u32, T>) -> u32 {
        field.read(self.read(T::REG))
    }

    /// Returns `true` if any bit of `field` is set
    fn is_set<T: Located>(&self, field: Field<u32, T>) -> bool {
        field.is_set(self.read(T::REG))
    }

    /// Read-modify-write of one or more fields of one register, in a single
    /// write
    fn modify<T: Located>(&mut self, value: FieldValue<u32, T>) {
        let word = value.modify(self.read(T::REG));
        self.write(T::REG, word);
    }
}

impl<R: RegisterFile + ?Sized> RegisterFile for &mut R {
    fn read(&self, reg: Reg) -> u32 {
        (**self).read(reg)
    }

    fn write(&mut self, reg: Reg, value: u32) {
        (**self).write(reg, value)
    }
}

/// Spins until `field` reads back `expected`.
///
/// This never times out. If the hardware never reports `expected`, for
/// example a crystal that does not start or a PLL that does not lock, the
/// caller hangs here. At boot there is nothing sensible left to run on.
pub fn block_until<R: RegisterFile + ?Sized, T: Located>(
    regs: &R,
    field: Field<u32, T>,
    expected: u32,
) {
    while regs.field(field) != expected {
        core::hint::spin_loop();
    }
}

/// Memory mapped register file of an STM32F4 device
pub struct Mmio {
    rcc: &'static RccRegisters,
    flash: &'static FlashRegisters,
    pwr: &'static PwrRegisters,
}

impl Mmio {
    /// Creates a handle to the device registers.
    ///
    /// # Safety
    ///
    /// Must only be called on an STM32F4 device, and no other code may
    /// program the RCC, FLASH or PWR blocks while the handle is alive.
    pub unsafe fn steal() -> Self {
        Mmio {
            rcc: &*(RCC_BASE as *const RccRegisters),
            flash: &*(FLASH_BASE as *const FlashRegisters),
            pwr: &*(PWR_BASE as *const PwrRegisters),
        }
    }
}

impl RegisterFile for Mmio {
    fn read(&self, reg: Reg) -> u32 {
        match reg {
            Reg::RccCr => self.rcc.cr.get(),
            Reg::RccPllcfgr => self.rcc.pllcfgr.get(),
            Reg::RccCfgr => self.rcc.cfgr.get(),
            Reg::RccApb1enr => self.rcc.apb1enr.get(),
            Reg::FlashAcr => self.flash.acr.get(),
            Reg::PwrCr => self.pwr.cr.get(),
            Reg::PwrCsr => self.pwr.csr.get(),
        }
    }

    fn write(&mut self, reg: Reg, value: u32) {
        match reg {
            Reg::RccCr => self.rcc.cr.set(value),
            Reg::RccPllcfgr => self.rcc.pllcfgr.set(value),
            Reg::RccCfgr => self.rcc.cfgr.set(value),
            Reg::RccApb1enr => self.rcc.apb1enr.set(value),
            Reg::FlashAcr => self.flash.acr.set(value),
            Reg::PwrCr => self.pwr.cr.set(value),
            Reg::PwrCsr => self.pwr.csr.set(value),
        }
        // Complete the store before the next status poll
        cortex_m::asm::dsb();
    }
}
