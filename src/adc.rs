// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! 12-bit ADC, software-triggered, polled.
//!
//! The converter is brought up lazily on the first read: peripheral clock,
//! software reset, then a mode word derived from the requested ADC clock.
//! One channel is kept enabled at a time; switching channels disables the
//! previous one so LCDR only ever reports the channel just converted.

use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};
use tock_registers::{register_bitfields, register_structs};

use crate::pmc;
use crate::static_ref::StaticRef;
use crate::support;

register_structs! {
    AdcRegisters {
        /// Control Register
        (0x0000 => cr: WriteOnly<u32, Control::Register>),
        /// Mode Register
        (0x0004 => mr: ReadWrite<u32, Mode::Register>),
        /// Channel Sequence Registers
        (0x0008 => seqr1: ReadWrite<u32>),
        (0x000C => seqr2: ReadWrite<u32>),
        /// Channel Enable Register
        (0x0010 => cher: WriteOnly<u32>),
        /// Channel Disable Register
        (0x0014 => chdr: WriteOnly<u32>),
        /// Channel Status Register
        (0x0018 => chsr: ReadOnly<u32>),
        (0x001C => _reserved0),
        /// Last Converted Data Register
        (0x0020 => lcdr: ReadOnly<u32>),
        /// Interrupt Enable Register
        (0x0024 => ier: WriteOnly<u32>),
        /// Interrupt Disable Register
        (0x0028 => idr: WriteOnly<u32>),
        /// Interrupt Mask Register
        (0x002C => imr: ReadOnly<u32>),
        /// Interrupt Status Register
        (0x0030 => isr: ReadOnly<u32, Interrupt::Register>),
        (0x0034 => _reserved1),
        /// Overrun Status Register
        (0x003C => over: ReadOnly<u32>),
        /// Extended Mode Register
        (0x0040 => emr: ReadWrite<u32>),
        /// Compare Window Register
        (0x0044 => cwr: ReadWrite<u32>),
        /// Channel Gain Register
        (0x0048 => cgr: ReadWrite<u32>),
        /// Channel Offset Register
        (0x004C => cor: ReadWrite<u32>),
        /// Per-channel Data Registers
        (0x0050 => cdr: [ReadOnly<u32>; 16]),
        (0x0090 => _reserved2),
        /// Analog Control Register
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
        /// Start a conversion
        START 1,
        /// Software reset
        SWRST 0
    ],
    Mode [
        /// Transfer period
        TRANSFER OFFSET(28) NUMBITS(2) [],
        /// Tracking time = (TRACKTIM + 1) ADC cycles
        TRACKTIM OFFSET(24) NUMBITS(4) [],
        /// Start-up time selection
        STARTUP OFFSET(16) NUMBITS(4) [],
        /// ADC clock = MCK / ((PRESCAL + 1) * 2)
        PRESCAL OFFSET(8) NUMBITS(8) [],
        FREERUN OFFSET(7) NUMBITS(1) [],
        SLEEP OFFSET(5) NUMBITS(1) [],
        LOWRES OFFSET(4) NUMBITS(1) [],
        TRGEN OFFSET(0) NUMBITS(1) [
            Disabled = 0,
            Enabled = 1
        ]
    ],
    Interrupt [
        /// LCDR holds fresh data
        DRDY 24,
        GOVRE 25,
        COMPE 26
    ]
];

const ADC_BASE: StaticRef<AdcRegisters> =
    unsafe { StaticRef::new(0x400C_0000 as *const AdcRegisters) };

/// Returned when a conversion never completes (or the channel is invalid);
/// deliberately outside the 12-bit range.
pub const READ_FAILED: u16 = 0xFFFF;

const DRDY_TIMEOUT_ITERS: u32 = 400_000;

/// MR.PRESCAL for a target ADC clock: ceil(mck / (2 * adc_clock)) - 1.
const fn prescal_for(mck_hz: u32, adc_clock_hz: u32) -> u32 {
    (mck_hz + 2 * adc_clock_hz - 1) / (2 * adc_clock_hz) - 1
}

/// The ADC, parameterized by the active master clock and the ADC clock it
/// should derive from it.
pub struct Adc {
    registers: StaticRef<AdcRegisters>,
    mck_hz: u32,
    adc_clock_hz: u32,
    initialized: bool,
    active_channel: Option<u8>,
}

impl Adc {
    pub const DEFAULT_CLOCK_HZ: u32 = 1_000_000;

    pub const fn new(mck_hz: u32, adc_clock_hz: u32) -> Adc {
        Adc {
            registers: ADC_BASE,
            mck_hz,
            adc_clock_hz,
            initialized: false,
            active_channel: None,
        }
    }

    fn ensure_init(&mut self) {
        if self.initialized {
            return;
        }
        let regs = self.registers;

        pmc::enable_clock(pmc::PeripheralId::Adc);
        regs.cr.write(Control::SWRST::SET);
        regs.mr.write(
            Mode::PRESCAL.val(prescal_for(self.mck_hz, self.adc_clock_hz))
                + Mode::STARTUP.val(8)
                + Mode::TRACKTIM.val(3)
                + Mode::TRANSFER.val(1),
        );
        regs.chdr.set(0xFFFF);
        self.initialized = true;
    }

    /// Sample `channel` (0..16) once and return the 12-bit result, or
    /// [`READ_FAILED`] on timeout or a bad channel number.
    pub fn read12(&mut self, channel: u8) -> u16 {
        if channel > 15 {
            return READ_FAILED;
        }
        self.ensure_init();
        let regs = self.registers;

        if self.active_channel != Some(channel) {
            if let Some(previous) = self.active_channel {
                regs.chdr.set(1 << previous);
            }
            regs.cher.set(1 << channel);
            self.active_channel = Some(channel);
        }

        regs.cr.write(Control::START::SET);
        if !support::spin_until(DRDY_TIMEOUT_ITERS, || regs.isr.is_set(Interrupt::DRDY)) {
            return READ_FAILED;
        }
        (regs.lcdr.get() & 0xFFF) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::prescal_for;

    #[test]
    fn prescaler_math() {
        // 84 MHz / (2 * 1 MHz) = 42 -> PRESCAL 41.
        assert_eq!(prescal_for(84_000_000, 1_000_000), 41);
        // Non-integer ratios round the clock down (prescaler up):
        // 84 MHz / (2 * 10 MHz) = 4.2 -> ceil 5 -> PRESCAL 4.
        assert_eq!(prescal_for(84_000_000, 10_000_000), 4);
        // Reset clock: 4 MHz / (2 * 1 MHz) = 2 -> PRESCAL 1.
        assert_eq!(prescal_for(4_000_000, 1_000_000), 1);
    }
}
