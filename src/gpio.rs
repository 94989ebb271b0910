// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Parallel I/O (PIO) controllers and per-pin GPIO handles.
//!
//! The SAM3X8E has four PIO controllers (A-D), each managing 32 lines
//! through banks of write-one-to-act registers, so pin operations are plain
//! stores with no read-modify-write.
//!
//! A [`Pin`] is constructed from an Arduino Due board pin number and owns
//! the invariant that its controller clock is running and the line is under
//! PIO (not peripheral) control. A handful of Due board pins are wired to
//! two package pins at once (D4, D10); for those the handle mirrors every
//! write to both lines and ORs reads.

use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};
use tock_registers::register_structs;

use crate::pins;
use crate::pmc;
use crate::static_ref::StaticRef;
use crate::support;

register_structs! {
    pub PioRegisters {
        /// PIO Enable Register
        (0x0000 => per: WriteOnly<u32>),
        /// PIO Disable Register (hands the line to a peripheral)
        (0x0004 => pdr: WriteOnly<u32>),
        /// PIO Status Register
        (0x0008 => psr: ReadOnly<u32>),
        (0x000C => _reserved0),
        /// Output Enable Register
        (0x0010 => oer: WriteOnly<u32>),
        /// Output Disable Register
        (0x0014 => odr: WriteOnly<u32>),
        /// Output Status Register
        (0x0018 => osr: ReadOnly<u32>),
        (0x001C => _reserved1),
        /// Input Filter Enable Register
        (0x0020 => ifer: WriteOnly<u32>),
        /// Input Filter Disable Register
        (0x0024 => ifdr: WriteOnly<u32>),
        /// Input Filter Status Register
        (0x0028 => ifsr: ReadOnly<u32>),
        (0x002C => _reserved2),
        /// Set Output Data Register
        (0x0030 => sodr: WriteOnly<u32>),
        /// Clear Output Data Register
        (0x0034 => codr: WriteOnly<u32>),
        /// Output Data Status Register
        (0x0038 => odsr: ReadWrite<u32>),
        /// Pin Data Status Register (input levels)
        (0x003C => pdsr: ReadOnly<u32>),
        /// Interrupt Enable Register
        (0x0040 => ier: WriteOnly<u32>),
        /// Interrupt Disable Register
        (0x0044 => idr: WriteOnly<u32>),
        /// Interrupt Mask Register
        (0x0048 => imr: ReadOnly<u32>),
        /// Interrupt Status Register
        (0x004C => isr: ReadOnly<u32>),
        /// Multi-driver (open drain) Enable Register
        (0x0050 => mder: WriteOnly<u32>),
        /// Multi-driver Disable Register
        (0x0054 => mddr: WriteOnly<u32>),
        /// Multi-driver Status Register
        (0x0058 => mdsr: ReadOnly<u32>),
        (0x005C => _reserved3),
        /// Pull-up Disable Register
        (0x0060 => pudr: WriteOnly<u32>),
        /// Pull-up Enable Register
        (0x0064 => puer: WriteOnly<u32>),
        /// Pull-up Status Register
        (0x0068 => pusr: ReadOnly<u32>),
        (0x006C => _reserved4),
        /// Peripheral AB Select Register (0 = A, 1 = B)
        (0x0070 => absr: ReadWrite<u32>),
        (0x0074 => _reserved5),
        /// System Clock Glitch Input Filter Select Register
        (0x0080 => scifsr: WriteOnly<u32>),
        /// Debouncing Input Filter Select Register
        (0x0084 => difsr: WriteOnly<u32>),
        /// Glitch or Debouncing Input Filter Selection Status Register
        (0x0088 => ifdgsr: ReadOnly<u32>),
        /// Slow Clock Divider Debouncing Register
        (0x008C => scdr: ReadWrite<u32>),
        (0x0090 => _reserved6),
        /// Output Write Enable Register
        (0x00A0 => ower: WriteOnly<u32>),
        /// Output Write Disable Register
        (0x00A4 => owdr: WriteOnly<u32>),
        /// Output Write Status Register
        (0x00A8 => owsr: ReadOnly<u32>),
        (0x00AC => _reserved7),
        /// Write Protect Mode Register
        (0x00E4 => wpmr: ReadWrite<u32>),
        /// Write Protect Status Register
        (0x00E8 => wpsr: ReadOnly<u32>),
        (0x00EC => @END),
    }
}

const PIOA_BASE: StaticRef<PioRegisters> =
    unsafe { StaticRef::new(0x400E_0E00 as *const PioRegisters) };
const PIOB_BASE: StaticRef<PioRegisters> =
    unsafe { StaticRef::new(0x400E_1000 as *const PioRegisters) };
const PIOC_BASE: StaticRef<PioRegisters> =
    unsafe { StaticRef::new(0x400E_1200 as *const PioRegisters) };
const PIOD_BASE: StaticRef<PioRegisters> =
    unsafe { StaticRef::new(0x400E_1400 as *const PioRegisters) };

/// The four PIO controllers.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PioPort {
    A,
    B,
    C,
    D,
}

impl PioPort {
    fn registers(self) -> StaticRef<PioRegisters> {
        match self {
            PioPort::A => PIOA_BASE,
            PioPort::B => PIOB_BASE,
            PioPort::C => PIOC_BASE,
            PioPort::D => PIOD_BASE,
        }
    }

    pub fn peripheral_id(self) -> pmc::PeripheralId {
        match self {
            PioPort::A => pmc::PeripheralId::PioA,
            PioPort::B => pmc::PeripheralId::PioB,
            PioPort::C => pmc::PeripheralId::PioC,
            PioPort::D => pmc::PeripheralId::PioD,
        }
    }
}

/// Hand a set of lines to Peripheral A: enable the controller clock, select
/// function A in ABSR, and disable PIO control. Used by the UART and TWI
/// drivers for their fixed pin assignments.
pub fn hand_to_peripheral_a(port: PioPort, mask: u32) {
    pmc::enable_clock(port.peripheral_id());
    let regs = port.registers();
    regs.absr.set(regs.absr.get() & !mask);
    regs.pdr.set(mask);
}

/// Enable the on-chip pull-ups for a set of lines.
pub fn enable_pull_ups(port: PioPort, mask: u32) {
    port.registers().puer.set(mask);
}

#[derive(Copy, Clone)]
struct Line {
    registers: StaticRef<PioRegisters>,
    mask: u32,
}

impl Line {
    fn new(port: PioPort, bit: u8) -> Line {
        Line {
            registers: port.registers(),
            mask: 1 << bit,
        }
    }

    fn claim(&self) {
        let regs = self.registers;
        regs.per.set(self.mask);
        regs.idr.set(self.mask);
        regs.pudr.set(self.mask);
        regs.mddr.set(self.mask);
        regs.ifdr.set(self.mask);
    }
}

/// A misconfigured pin number is an unrecoverable boot error: nothing is up
/// yet that could report it, so park the CPU.
fn unknown_pin_trap() -> ! {
    loop {
        support::nop();
    }
}

/// Handle on one Due board pin (both package pins, for the dual-wired ones).
pub struct Pin {
    primary: Line,
    secondary: Option<Line>,
}

impl Pin {
    /// Claim an Arduino Due digital pin for PIO use.
    ///
    /// Enables the controller clock(s), takes the line(s) under PIO control,
    /// and disables interrupts, pull-ups, multi-drive, and the input filter.
    /// An unknown pin number traps.
    pub fn new(board_pin: u8) -> Pin {
        let desc = match pins::lookup(board_pin) {
            Some(d) => d,
            None => unknown_pin_trap(),
        };

        let primary = Line::new(desc.port, desc.bit);
        pmc::enable_clock(desc.port.peripheral_id());
        primary.claim();

        let secondary = desc.secondary.map(|(port, bit)| {
            let line = Line::new(port, bit);
            pmc::enable_clock(port.peripheral_id());
            line.claim();
            line
        });

        Pin { primary, secondary }
    }

    fn each<F: Fn(&Line)>(&self, f: F) {
        f(&self.primary);
        if let Some(ref line) = self.secondary {
            f(line);
        }
    }

    /// Drive the pin as an output, with the given initial level.
    pub fn output(&self, initial: bool) {
        self.write(initial);
        self.each(|l| l.registers.oer.set(l.mask));
    }

    /// Configure the pin as an input.
    pub fn input(&self) {
        self.each(|l| l.registers.odr.set(l.mask));
    }

    pub fn pull_up(&self, on: bool) {
        self.each(|l| {
            if on {
                l.registers.puer.set(l.mask);
            } else {
                l.registers.pudr.set(l.mask);
            }
        });
    }

    /// Input with the on-chip pull-up.
    pub fn input_pullup(&self) {
        self.input();
        self.pull_up(true);
    }

    /// Multi-driver (open drain) mode.
    pub fn open_drain(&self, on: bool) {
        self.each(|l| {
            if on {
                l.registers.mder.set(l.mask);
            } else {
                l.registers.mddr.set(l.mask);
            }
        });
    }

    /// Glitch input filter.
    pub fn input_filter(&self, on: bool) {
        self.each(|l| {
            if on {
                l.registers.ifer.set(l.mask);
            } else {
                l.registers.ifdr.set(l.mask);
            }
        });
    }

    pub fn write(&self, high: bool) {
        self.each(|l| {
            if high {
                l.registers.sodr.set(l.mask);
            } else {
                l.registers.codr.set(l.mask);
            }
        });
    }

    pub fn on(&self) {
        self.write(true);
    }

    pub fn off(&self) {
        self.write(false);
    }

    /// Sampled input level; the OR of both lines for dual-wired pins.
    pub fn read(&self) -> bool {
        let mut level = self.primary.registers.pdsr.get() & self.primary.mask != 0;
        if let Some(ref line) = self.secondary {
            level |= line.registers.pdsr.get() & line.mask != 0;
        }
        level
    }

    /// Last value written to the output latch.
    pub fn read_output_latch(&self) -> bool {
        let mut level = self.primary.registers.odsr.get() & self.primary.mask != 0;
        if let Some(ref line) = self.secondary {
            level |= line.registers.odsr.get() & line.mask != 0;
        }
        level
    }

    pub fn toggle(&self) {
        self.write(!self.read_output_latch());
    }
}
