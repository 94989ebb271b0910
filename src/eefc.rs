// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Enhanced Embedded Flash Controller (EEFC).
//!
//! The SAM3X8E has two flash banks, each with its own EEFC instance. Bank 0
//! (EEFC0) holds the firmware; the key/value store in [`crate::kvstore`]
//! uses the last page of bank 1 through EEFC1.
//!
//! Programming model: the caller streams a full page into the write latch
//! (the page's own memory-mapped address), then issues a single command via
//! FCR and polls FRDY. The controller reports programming failures through
//! the FCMDE and FLOCKE status bits, which clear on read.

use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};
use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};
use tock_registers::{register_bitfields, register_structs};

use crate::static_ref::StaticRef;
use crate::support;

register_structs! {
    EefcRegisters {
        /// Flash Mode Register
        (0x00 => fmr: ReadWrite<u32, FlashMode::Register>),
        /// Flash Command Register
        (0x04 => fcr: WriteOnly<u32, FlashCommand::Register>),
        /// Flash Status Register (FCMDE/FLOCKE clear on read)
        (0x08 => fsr: ReadOnly<u32, FlashStatus::Register>),
        /// Flash Result Register
        (0x0C => frr: ReadOnly<u32>),
        (0x10 => @END),
    }
}

register_bitfields![u32,
    FlashMode [
        /// Flash access mode (128/64-bit)
        FAM OFFSET(24) NUMBITS(1) [],
        /// Sequential code optimization disable
        SCOD OFFSET(16) NUMBITS(1) [],
        /// Flash wait states (cycles per access = FWS + 1)
        FWS OFFSET(8) NUMBITS(4) [],
        /// Ready interrupt enable
        FRDY OFFSET(0) NUMBITS(1) []
    ],
    FlashCommand [
        /// Write access password
        FKEY OFFSET(24) NUMBITS(8) [
            Passwd = 0x5A
        ],
        /// Command argument (page number for page commands)
        FARG OFFSET(8) NUMBITS(16) [],
        FCMD OFFSET(0) NUMBITS(8) [
            GetDescriptor = 0x00,
            WritePage = 0x01,
            ErasePageAndWritePage = 0x03,
            EraseAll = 0x05,
            SetLockBit = 0x08,
            ClearLockBit = 0x09,
            GetLockBit = 0x0A
        ]
    ],
    FlashStatus [
        /// Lock error: the command touched a locked region
        FLOCKE 2,
        /// Command error: bad command or bad argument
        FCMDE 1,
        /// Ready for a new command
        FRDY 0
    ]
];

const EEFC0_BASE: StaticRef<EefcRegisters> =
    unsafe { StaticRef::new(0x400E_0A00 as *const EefcRegisters) };
const EEFC1_BASE: StaticRef<EefcRegisters> =
    unsafe { StaticRef::new(0x400E_0C00 as *const EefcRegisters) };

/// Both banks use 256-byte pages.
pub const FLASH_PAGE_SIZE: usize = 256;

/// Start of flash bank 1 in the memory map.
pub const BANK1_BASE: usize = 0x000C_0000;

/// Errors a flash command can report.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum FlashError {
    /// FRDY never came back within the iteration bound.
    Timeout,
    /// The controller rejected the command (FCMDE).
    CommandError,
    /// The command addressed a locked region (FLOCKE).
    LockError,
}

/// One EEFC instance.
pub struct Eefc {
    registers: StaticRef<EefcRegisters>,
}

impl Eefc {
    /// The controller for flash bank 0 (firmware bank).
    pub const fn eefc0() -> Eefc {
        Eefc {
            registers: EEFC0_BASE,
        }
    }

    /// The controller for flash bank 1.
    pub const fn eefc1() -> Eefc {
        Eefc {
            registers: EEFC1_BASE,
        }
    }

    /// Program the flash wait states. Must happen before raising MCK.
    pub fn set_wait_states(&self, wait_states: u32) {
        self.registers
            .fmr
            .modify(FlashMode::FWS.val(wait_states));
    }

    /// Poll FRDY for up to `max_iters` iterations.
    pub fn wait_ready(&self, max_iters: u32) -> bool {
        let regs = self.registers;
        support::spin_until(max_iters, || regs.fsr.is_set(FlashStatus::FRDY))
    }

    /// Erase the given page of this bank and program it with the contents of
    /// the write latch. The latch must already hold the full page image.
    pub fn erase_and_write_page(&self, page: u16) {
        self.registers.fcr.write(
            FlashCommand::FKEY::Passwd
                + FlashCommand::FARG.val(page as u32)
                + FlashCommand::FCMD::ErasePageAndWritePage,
        );
    }

    /// Decode the completion status of the last command. FSR clears on
    /// read, so this samples it exactly once.
    pub fn command_result(&self) -> Result<(), FlashError> {
        let fsr = self.registers.fsr.extract();
        if fsr.is_set(FlashStatus::FCMDE) {
            Err(FlashError::CommandError)
        } else if fsr.is_set(FlashStatus::FLOCKE) {
            Err(FlashError::LockError)
        } else {
            Ok(())
        }
    }
}
