// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Watchdog timer.
//!
//! The WDT is running at reset with a ~16 s period. This runtime does not
//! feed it; the board bring-up disables it instead. WDT_MR is write-once
//! until the next reset, so [`Wdt::disable`] is final.

use tock_registers::interfaces::Writeable;
use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};
use tock_registers::{register_bitfields, register_structs};

use crate::static_ref::StaticRef;

register_structs! {
    WdtRegisters {
        /// Control Register
        (0x00 => cr: WriteOnly<u32, Control::Register>),
        /// Mode Register (write-once)
        (0x04 => mr: ReadWrite<u32, Mode::Register>),
        /// Status Register
        (0x08 => sr: ReadOnly<u32, Status::Register>),
        (0x0C => @END),
    }
}

register_bitfields![u32,
    Control [
        /// Write access key
        KEY OFFSET(24) NUMBITS(8) [
            Passwd = 0xA5
        ],
        /// Restart the watchdog counter
        WDRSTT OFFSET(0) NUMBITS(1) []
    ],
    Mode [
        WDIDLEHLT OFFSET(29) NUMBITS(1) [],
        WDDBGHLT OFFSET(28) NUMBITS(1) [],
        /// Delta window
        WDD OFFSET(16) NUMBITS(12) [],
        /// Watchdog disable
        WDDIS OFFSET(15) NUMBITS(1) [],
        WDRPROC OFFSET(14) NUMBITS(1) [],
        /// Reset enable on underflow/error
        WDRSTEN OFFSET(13) NUMBITS(1) [],
        WDFIEN OFFSET(12) NUMBITS(1) [],
        /// Counter value
        WDV OFFSET(0) NUMBITS(12) []
    ],
    Status [
        /// Underflow occurred
        WDUNF 0,
        /// Error (counter reset outside the window)
        WDERR 1
    ]
];

const WDT_BASE: StaticRef<WdtRegisters> =
    unsafe { StaticRef::new(0x400E_1A50 as *const WdtRegisters) };

pub struct Wdt {
    registers: StaticRef<WdtRegisters>,
}

impl Wdt {
    pub const fn new() -> Wdt {
        Wdt {
            registers: WDT_BASE,
        }
    }

    /// Turn the watchdog off for good (until the next reset).
    pub fn disable(&self) {
        self.registers.mr.write(Mode::WDDIS::SET);
    }

    /// Feed the watchdog. Only meaningful if `disable` was never called.
    pub fn restart(&self) {
        self.registers
            .cr
            .write(Control::KEY::Passwd + Control::WDRSTT::SET);
    }
}

impl Default for Wdt {
    fn default() -> Wdt {
        Wdt::new()
    }
}
