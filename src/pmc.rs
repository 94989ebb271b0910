// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Power Management Controller (PMC).
//!
//! The PMC owns the clock tree: the main crystal oscillator, PLLA (the CPU
//! and peripheral clock multiplier), the UTMI PLL feeding the USB
//! transceiver, and the per-peripheral clock gates every driver in this
//! crate enables before touching its registers.
//!
//! [`setup_mck_84mhz`] performs the full bring-up from the ~4 MHz reset
//! clock to an 84 MHz master clock. Every step is guarded by an iteration
//! bound; on a timeout the function reports failure and leaves the chip on
//! whatever clock it had, so callers can continue degraded (all drivers take
//! the active MCK as a parameter).

use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};
use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};
use tock_registers::{register_bitfields, register_structs};

use crate::eefc::Eefc;
use crate::static_ref::StaticRef;
use crate::support;

register_structs! {
    PmcRegisters {
        /// System Clock Enable Register
        (0x0000 => scer: WriteOnly<u32, SystemClock::Register>),
        /// System Clock Disable Register
        (0x0004 => scdr: WriteOnly<u32, SystemClock::Register>),
        /// System Clock Status Register
        (0x0008 => scsr: ReadOnly<u32, SystemClock::Register>),
        (0x000C => _reserved0),
        /// Peripheral Clock Enable Register 0 (IDs 0..32)
        (0x0010 => pcer0: WriteOnly<u32>),
        /// Peripheral Clock Disable Register 0
        (0x0014 => pcdr0: WriteOnly<u32>),
        /// Peripheral Clock Status Register 0
        (0x0018 => pcsr0: ReadOnly<u32>),
        /// UTMI Clock Register
        (0x001C => ckgr_uckr: ReadWrite<u32, UtmiClock::Register>),
        /// Main Oscillator Register
        (0x0020 => ckgr_mor: ReadWrite<u32, MainOscillator::Register>),
        /// Main Clock Frequency Register
        (0x0024 => ckgr_mcfr: ReadOnly<u32>),
        /// PLLA Register
        (0x0028 => ckgr_pllar: ReadWrite<u32, PllA::Register>),
        (0x002C => _reserved1),
        /// Master Clock Register
        (0x0030 => mckr: ReadWrite<u32, MasterClock::Register>),
        (0x0034 => _reserved2),
        /// USB Clock Register
        (0x0038 => usb: ReadWrite<u32, UsbClock::Register>),
        (0x003C => _reserved3),
        /// Programmable Clock Registers
        (0x0040 => pck: [ReadWrite<u32>; 3]),
        (0x004C => _reserved4),
        /// Interrupt Enable Register
        (0x0060 => ier: WriteOnly<u32, Status::Register>),
        /// Interrupt Disable Register
        (0x0064 => idr: WriteOnly<u32, Status::Register>),
        /// Status Register
        (0x0068 => sr: ReadOnly<u32, Status::Register>),
        /// Interrupt Mask Register
        (0x006C => imr: ReadOnly<u32, Status::Register>),
        /// Fast Startup Mode Register
        (0x0070 => fsmr: ReadWrite<u32>),
        /// Fast Startup Polarity Register
        (0x0074 => fspr: ReadWrite<u32>),
        /// Fault Output Clear Register
        (0x0078 => focr: WriteOnly<u32>),
        (0x007C => _reserved5),
        /// Write Protect Mode Register
        (0x00E4 => wpmr: ReadWrite<u32>),
        /// Write Protect Status Register
        (0x00E8 => wpsr: ReadOnly<u32>),
        (0x00EC => _reserved6),
        /// Peripheral Clock Enable Register 1 (IDs 32..45)
        (0x0100 => pcer1: WriteOnly<u32>),
        /// Peripheral Clock Disable Register 1
        (0x0104 => pcdr1: WriteOnly<u32>),
        /// Peripheral Clock Status Register 1
        (0x0108 => pcsr1: ReadOnly<u32>),
        /// Peripheral Control Register
        (0x010C => pcr: ReadWrite<u32>),
        (0x0110 => @END),
    }
}

register_bitfields![u32,
    SystemClock [
        /// USB OTG clock (48 MHz) enable
        UOTGCLK 5,
        PCK0 8,
        PCK1 9,
        PCK2 10
    ],
    UtmiClock [
        /// UTMI PLL start-up counter
        UPLLCOUNT OFFSET(20) NUMBITS(4) [],
        /// UTMI PLL enable
        UPLLEN OFFSET(16) NUMBITS(1) []
    ],
    MainOscillator [
        CFDEN OFFSET(25) NUMBITS(1) [],
        /// Main oscillator selection (0 = on-chip RC, 1 = crystal)
        MOSCSEL OFFSET(24) NUMBITS(1) [],
        /// Write access password, must read as written 0x37
        KEY OFFSET(16) NUMBITS(8) [
            Passwd = 0x37
        ],
        /// Crystal start-up time, in units of 8 slow-clock cycles
        MOSCXTST OFFSET(8) NUMBITS(8) [],
        MOSCRCF OFFSET(4) NUMBITS(3) [],
        MOSCRCEN OFFSET(3) NUMBITS(1) [],
        MOSCXTBY OFFSET(1) NUMBITS(1) [],
        MOSCXTEN OFFSET(0) NUMBITS(1) []
    ],
    PllA [
        /// Must be written one when programming CKGR_PLLAR
        ONE OFFSET(29) NUMBITS(1) [],
        /// PLLA multiplier; output = input * (MULA + 1)
        MULA OFFSET(16) NUMBITS(11) [],
        /// PLLA lock counter
        PLLACOUNT OFFSET(8) NUMBITS(6) [],
        /// PLLA front-end divider
        DIVA OFFSET(0) NUMBITS(8) []
    ],
    MasterClock [
        /// UPLL output divided by two
        UPLLDIV2 OFFSET(13) NUMBITS(1) [],
        /// PLLA output divided by two
        PLLADIV2 OFFSET(12) NUMBITS(1) [],
        /// Processor clock prescaler
        PRES OFFSET(4) NUMBITS(3) [
            Clk1 = 0,
            Clk2 = 1,
            Clk4 = 2,
            Clk8 = 3,
            Clk16 = 4,
            Clk32 = 5,
            Clk64 = 6,
            Clk3 = 7
        ],
        /// Master clock source
        CSS OFFSET(0) NUMBITS(2) [
            SlowClk = 0,
            MainClk = 1,
            PllaClk = 2,
            UpllClk = 3
        ]
    ],
    UsbClock [
        /// USB clock divider (output = input / (USBDIV + 1))
        USBDIV OFFSET(8) NUMBITS(4) [],
        /// USB input clock (0 = PLLA, 1 = UPLL)
        USBS OFFSET(0) NUMBITS(1) []
    ],
    Status [
        FOS 20,
        CFDS 19,
        CFDEV 18,
        MOSCRCS 17,
        MOSCSELS 16,
        PCKRDY2 10,
        PCKRDY1 9,
        PCKRDY0 8,
        OSCSELS 7,
        /// UTMI PLL locked
        LOCKU 6,
        /// Master clock ready
        MCKRDY 3,
        /// PLLA locked
        LOCKA 1,
        /// Main crystal oscillator stabilized
        MOSCXTS 0
    ]
];

const PMC_BASE: StaticRef<PmcRegisters> =
    unsafe { StaticRef::new(0x400E_0600 as *const PmcRegisters) };

/// Peripheral identifiers, datasheet table 9-1. The identifier selects both
/// the PMC clock-gate bit and the NVIC interrupt line.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(u32)]
pub enum PeripheralId {
    Supc = 0,
    Rstc = 1,
    Rtc = 2,
    Rtt = 3,
    Wdt = 4,
    Pmc = 5,
    Eefc0 = 6,
    Eefc1 = 7,
    Uart = 8,
    Smc = 9,
    PioA = 11,
    PioB = 12,
    PioC = 13,
    PioD = 14,
    Usart0 = 17,
    Usart1 = 18,
    Usart2 = 19,
    Usart3 = 20,
    Hsmci = 21,
    Twi0 = 22,
    Twi1 = 23,
    Spi0 = 24,
    Ssc = 26,
    Tc0 = 27,
    Tc1 = 28,
    Tc2 = 29,
    Pwm = 36,
    Adc = 37,
    Dacc = 38,
    Dmac = 39,
    Uotghs = 40,
    Trng = 41,
    Emac = 42,
    Can0 = 43,
    Can1 = 44,
}

/// Enable the clock gate for a peripheral. Write-one-to-enable, so no
/// read-modify-write is needed.
pub fn enable_clock(id: PeripheralId) {
    let regs = PMC_BASE;
    let id = id as u32;
    if id < 32 {
        regs.pcer0.set(1 << id);
    } else {
        regs.pcer1.set(1 << (id - 32));
    }
}

/// Disable the clock gate for a peripheral.
pub fn disable_clock(id: PeripheralId) {
    let regs = PMC_BASE;
    let id = id as u32;
    if id < 32 {
        regs.pcdr0.set(1 << id);
    } else {
        regs.pcdr1.set(1 << (id - 32));
    }
}

/// The Due's main crystal.
pub const MAIN_CRYSTAL_HZ: u32 = 12_000_000;
/// Master clock after a successful [`setup_mck_84mhz`].
pub const MCK_FAST_HZ: u32 = 84_000_000;
/// Approximate master clock at reset (4 MHz internal RC).
pub const MCK_RESET_HZ: u32 = 4_000_000;

/// Iteration bound for each clock bring-up step.
const CLOCK_TIMEOUT_ITERS: u32 = 5_000_000;

/// Bring the master clock from the reset default to 84 MHz:
/// crystal -> MAINCK -> PLLA (x7) -> MCK.
///
/// Returns false if any step times out. No rollback is attempted; the clock
/// tree stays in whatever state the last successful step left it, which is
/// always a running configuration.
pub fn setup_mck_84mhz() -> bool {
    let regs = PMC_BASE;

    // More wait states before more megahertz. 4 covers 84 MHz on both banks.
    Eefc::eefc0().set_wait_states(4);
    Eefc::eefc1().set_wait_states(4);
    support::dsb();
    support::isb();

    // Start the 12 MHz crystal with a long (0xFF) start-up count. The KEY
    // field reads as zero, so it must ride along on every CKGR_MOR write.
    regs.ckgr_mor.modify(
        MainOscillator::KEY::Passwd
            + MainOscillator::MOSCXTST.val(0xFF)
            + MainOscillator::MOSCXTEN::SET,
    );
    if !support::spin_until(CLOCK_TIMEOUT_ITERS, || regs.sr.is_set(Status::MOSCXTS)) {
        return false;
    }

    // Switch MAINCK from the internal RC to the crystal.
    regs.ckgr_mor
        .modify(MainOscillator::KEY::Passwd + MainOscillator::MOSCSEL::SET);
    if !support::spin_until(CLOCK_TIMEOUT_ITERS, || regs.sr.is_set(Status::MOSCXTS)) {
        return false;
    }

    // 12 MHz * (6 + 1) / 1 = 84 MHz. Bit 29 must be written one (silicon
    // requirement for CKGR_PLLAR).
    regs.ckgr_pllar.write(
        PllA::ONE::SET + PllA::MULA.val(6) + PllA::PLLACOUNT.val(0x3F) + PllA::DIVA.val(1),
    );
    if !support::spin_until(CLOCK_TIMEOUT_ITERS, || regs.sr.is_set(Status::LOCKA)) {
        return false;
    }

    // Program the prescaler at the current (main) source, then switch the
    // source. The PMC wants these as two acknowledged steps.
    regs.mckr.modify(MasterClock::PRES::Clk1);
    if !support::spin_until(CLOCK_TIMEOUT_ITERS, || regs.sr.is_set(Status::MCKRDY)) {
        return false;
    }
    regs.mckr.modify(MasterClock::CSS::PllaClk);
    if !support::spin_until(CLOCK_TIMEOUT_ITERS, || regs.sr.is_set(Status::MCKRDY)) {
        return false;
    }

    support::dsb();
    support::isb();
    true
}

/// Start the UTMI PLL and route it, undivided, to the USB controller.
/// Returns false if the PLL fails to lock.
pub fn enable_upll_usb_clock() -> bool {
    let regs = PMC_BASE;

    regs.ckgr_uckr
        .modify(UtmiClock::UPLLEN::SET + UtmiClock::UPLLCOUNT.val(0xF));
    if !support::spin_until(CLOCK_TIMEOUT_ITERS, || regs.sr.is_set(Status::LOCKU)) {
        return false;
    }

    regs.usb.write(UsbClock::USBS::SET + UsbClock::USBDIV.val(0));
    regs.scer.write(SystemClock::UOTGCLK::SET);
    true
}
