// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! 12-bit DAC controller (DACC), tag-addressed half-word writes.
//!
//! Lazily initialized like the ADC. Both channels are enabled and the
//! controller runs in tag mode, so each conversion word carries its channel
//! in bits 13:12 and no mode switch is needed between channels.

use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};
use tock_registers::{register_bitfields, register_structs};

use crate::pmc;
use crate::static_ref::StaticRef;

register_structs! {
    DacRegisters {
        /// Control Register
        (0x0000 => cr: WriteOnly<u32, Control::Register>),
        /// Mode Register
        (0x0004 => mr: ReadWrite<u32, Mode::Register>),
        (0x0008 => _reserved0),
        /// Channel Enable Register
        (0x0010 => cher: WriteOnly<u32>),
        /// Channel Disable Register
        (0x0014 => chdr: WriteOnly<u32>),
        /// Channel Status Register
        (0x0018 => chsr: ReadOnly<u32>),
        (0x001C => _reserved1),
        /// Conversion Data Register
        (0x0020 => cdr: WriteOnly<u32>),
        /// Interrupt Enable Register
        (0x0024 => ier: WriteOnly<u32>),
        /// Interrupt Disable Register
        (0x0028 => idr: WriteOnly<u32>),
        /// Interrupt Mask Register
        (0x002C => imr: ReadOnly<u32>),
        /// Interrupt Status Register
        (0x0030 => isr: ReadOnly<u32, Interrupt::Register>),
        (0x0034 => _reserved2),
        /// Analog Current Register
        (0x0094 => acr: ReadWrite<u32>),
        (0x0098 => _reserved3),
        /// Write Protect Mode Register
        (0x00E4 => wpmr: ReadWrite<u32>),
        /// Write Protect Status Register
        (0x00E8 => wpsr: ReadOnly<u32>),
        (0x00EC => @END),
    }
}

register_bitfields![u32,
    Control [
        /// Software reset
        SWRST 0
    ],
    Mode [
        /// Start-up time
        STARTUP OFFSET(24) NUMBITS(6) [],
        MAXS OFFSET(21) NUMBITS(1) [],
        /// Tag mode: channel selected by data bits 13:12
        TAG OFFSET(20) NUMBITS(1) [],
        USER_SEL OFFSET(16) NUMBITS(2) [],
        REFRESH OFFSET(8) NUMBITS(8) [],
        FASTWKUP OFFSET(6) NUMBITS(1) [],
        SLEEP OFFSET(5) NUMBITS(1) [],
        /// Transfer size (0 = half-word)
        WORD OFFSET(4) NUMBITS(1) [
            HalfWord = 0,
            Word = 1
        ],
        TRGSEL OFFSET(1) NUMBITS(3) [],
        TRGEN OFFSET(0) NUMBITS(1) [
            Disabled = 0,
            Enabled = 1
        ]
    ],
    Interrupt [
        TXBUFE 3,
        ENDTX 2,
        EOC 1,
        /// CDR can accept the next conversion word
        TXRDY 0
    ]
];

const DACC_BASE: StaticRef<DacRegisters> =
    unsafe { StaticRef::new(0x400C_8000 as *const DacRegisters) };

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum DacError {
    /// Only channels 0 and 1 exist.
    InvalidChannel,
    /// Values are 12-bit.
    ValueOutOfRange,
}

pub struct Dac {
    registers: StaticRef<DacRegisters>,
    initialized: bool,
}

impl Dac {
    pub const fn new() -> Dac {
        Dac {
            registers: DACC_BASE,
            initialized: false,
        }
    }

    fn ensure_init(&mut self) {
        if self.initialized {
            return;
        }
        let regs = self.registers;

        pmc::enable_clock(pmc::PeripheralId::Dacc);
        regs.cr.write(Control::SWRST::SET);
        regs.mr
            .write(Mode::TRGEN::Disabled + Mode::WORD::HalfWord + Mode::TAG::SET);
        regs.cher.set(0b11);
        self.initialized = true;
    }

    /// Convert `value` on `channel`. Blocks until the controller accepts
    /// the word.
    pub fn write12(&mut self, channel: u8, value: u16) -> Result<(), DacError> {
        if channel > 1 {
            return Err(DacError::InvalidChannel);
        }
        if value > 0xFFF {
            return Err(DacError::ValueOutOfRange);
        }
        self.ensure_init();
        let regs = self.registers;

        while !regs.isr.is_set(Interrupt::TXRDY) {}
        regs.cdr.set(((channel as u32) << 12) | value as u32);
        Ok(())
    }
}

impl Default for Dac {
    fn default() -> Dac {
        Dac::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{Dac, DacError};

    #[test]
    fn rejects_bad_channel_and_range_before_touching_hardware() {
        let mut dac = Dac::new();
        assert_eq!(dac.write12(2, 0), Err(DacError::InvalidChannel));
        assert_eq!(dac.write12(0, 0x1000), Err(DacError::ValueOutOfRange));
    }
}
