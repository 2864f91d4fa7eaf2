//! Mock register file for host tests
//!
//! Holds the registers at their reset values. Ready and acknowledge flags
//! follow their enable bits only after the status register has been polled
//! a few times, so a missing wait leaves the flag stale. Every write is
//! logged together with the register file as it was just before it.

use core::cell::Cell;

use tock_registers::fields::Field;

use crate::regs::{Located, Reg, RegisterFile, PWR_CR, PWR_CSR, RCC_CFGR, RCC_CR};

/// Polls of the status register before a flag catches up
const LAG: u8 = 3;

/// One logged register write
#[derive(Clone, Copy, Debug)]
pub(crate) struct Write {
    pub reg: Reg,
    pub before: u32,
    pub after: u32,
    /// Every register as it read just before this write
    pub snapshot: [u32; Reg::COUNT],
}

impl Write {
    /// `true` if this write changed `field`
    pub fn changed<T: Located>(&self, field: Field<u32, T>) -> bool {
        self.reg == T::REG && field.read(self.before) != field.read(self.after)
    }

    /// Value of `field` when the write was issued
    pub fn seen<T: Located>(&self, field: Field<u32, T>) -> u32 {
        field.read(self.snapshot[T::REG as usize])
    }

    /// `true` if this write moved `field` to `value`
    pub fn sets<T: Located>(&self, field: Field<u32, T>, value: u32) -> bool {
        self.changed(field) && field.read(self.after) == value
    }
}

/// A status field that follows a control field
#[derive(Clone, Copy)]
struct Mirror {
    control: (Reg, Field<u32, ()>),
    status: (Reg, Field<u32, ()>),
}

fn untyped<T: Located>(field: Field<u32, T>) -> (Reg, Field<u32, ()>) {
    (T::REG, Field::new(field.mask, field.shift))
}

fn mirrors() -> [Mirror; 6] {
    [
        Mirror {
            control: untyped(RCC_CR::HSION),
            status: untyped(RCC_CR::HSIRDY),
        },
        Mirror {
            control: untyped(RCC_CR::HSEON),
            status: untyped(RCC_CR::HSERDY),
        },
        Mirror {
            control: untyped(RCC_CR::PLLON),
            status: untyped(RCC_CR::PLLRDY),
        },
        Mirror {
            control: untyped(RCC_CFGR::SW),
            status: untyped(RCC_CFGR::SWS),
        },
        Mirror {
            control: untyped(PWR_CR::ODEN),
            status: untyped(PWR_CSR::ODRDY),
        },
        Mirror {
            control: untyped(PWR_CR::ODSWEN),
            status: untyped(PWR_CSR::ODSWRDY),
        },
    ]
}

pub(crate) struct MockRegisters {
    values: [Cell<u32>; Reg::COUNT],
    // Remaining status polls per mirror, 0 when in sync
    pending: [Cell<u8>; 6],
    pub log: Vec<Write>,
}

impl MockRegisters {
    pub fn new() -> Self {
        MockRegisters {
            values: Reg::ALL.map(|reg| Cell::new(reg.reset_value())),
            pending: Default::default(),
            log: Vec::new(),
        }
    }

    /// Log positions of every write that changed `field`
    pub fn changes<T: Located>(&self, field: Field<u32, T>) -> Vec<usize> {
        self.log
            .iter()
            .enumerate()
            .filter(|(_, w)| w.changed(field))
            .map(|(i, _)| i)
            .collect()
    }

    /// Log position of the first write that changed `field`
    pub fn first_change<T: Located>(&self, field: Field<u32, T>) -> Option<usize> {
        self.changes(field).first().copied()
    }

    /// Log position of the last write that changed `field`
    pub fn last_change<T: Located>(&self, field: Field<u32, T>) -> Option<usize> {
        self.changes(field).last().copied()
    }

    /// Brings every status flag up to date at once, as if enough time had
    /// passed. For tests that poke control bits directly.
    pub fn settle(&self) {
        for (mirror, pending) in mirrors().iter().zip(&self.pending) {
            self.follow(mirror);
            pending.set(0);
        }
    }

    fn follow(&self, mirror: &Mirror) {
        let (from_reg, from) = mirror.control;
        let (to_reg, to) = mirror.status;
        let bits = from.read(self.values[from_reg as usize].get());
        let value = &self.values[to_reg as usize];
        value.set(to.val(bits).modify(value.get()));
    }

    fn in_sync(&self, mirror: &Mirror) -> bool {
        let (from_reg, from) = mirror.control;
        let (to_reg, to) = mirror.status;
        from.read(self.values[from_reg as usize].get())
            == to.read(self.values[to_reg as usize].get())
    }
}

impl RegisterFile for MockRegisters {
    fn read(&self, reg: Reg) -> u32 {
        for (mirror, pending) in mirrors().iter().zip(&self.pending) {
            if mirror.status.0 != reg || pending.get() == 0 {
                continue;
            }
            pending.set(pending.get() - 1);
            if pending.get() == 0 {
                self.follow(mirror);
            }
        }
        self.values[reg as usize].get()
    }

    fn write(&mut self, reg: Reg, value: u32) {
        self.log.push(Write {
            reg,
            before: self.values[reg as usize].get(),
            after: value,
            snapshot: Reg::ALL.map(|r| self.values[r as usize].get()),
        });
        self.values[reg as usize].set(value);

        for (mirror, pending) in mirrors().iter().zip(&self.pending) {
            if self.in_sync(mirror) {
                pending.set(0);
            } else if pending.get() == 0 {
                pending.set(LAG);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MockRegisters;
    use crate::regs::{RegisterFile, RCC_CR};

    #[test]
    fn ready_flag_lags_enable() {
        let mut regs = MockRegisters::new();
        regs.modify(RCC_CR::PLLON::SET);

        assert!(!regs.is_set(RCC_CR::PLLRDY));
        assert!(!regs.is_set(RCC_CR::PLLRDY));
        assert!(regs.is_set(RCC_CR::PLLRDY));
    }

    #[test]
    fn settle_catches_up() {
        let mut regs = MockRegisters::new();
        regs.modify(RCC_CR::HSEON::SET);
        regs.settle();

        assert!(regs.is_set(RCC_CR::HSERDY));
        assert_eq!(regs.log.len(), 1);
        assert_eq!(regs.log[0].seen(RCC_CR::HSERDY), 0);
    }
}
