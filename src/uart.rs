// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Programming Port UART (PA8/PA9, 8-N-1, polling).
//!
//! This is the telemetry channel: the boot banner and application logging go
//! through here. TX waits are bounded only by the shift register draining at
//! line rate, so no timeouts are used.
//!
//! LF in [`Uart::write_string`] is expanded to CRLF for terminal friendliness.

use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};
use tock_registers::{register_bitfields, register_structs};

use crate::gpio::{self, PioPort};
use crate::pmc;
use crate::static_ref::StaticRef;

register_structs! {
    UartRegisters {
        /// Control Register
        (0x0000 => cr: WriteOnly<u32, Control::Register>),
        /// Mode Register
        (0x0004 => mr: ReadWrite<u32, Mode::Register>),
        /// Interrupt Enable Register
        (0x0008 => ier: WriteOnly<u32, Status::Register>),
        /// Interrupt Disable Register
        (0x000C => idr: WriteOnly<u32, Status::Register>),
        /// Interrupt Mask Register
        (0x0010 => imr: ReadOnly<u32, Status::Register>),
        /// Status Register
        (0x0014 => sr: ReadOnly<u32, Status::Register>),
        /// Receive Holding Register
        (0x0018 => rhr: ReadOnly<u32>),
        /// Transmit Holding Register
        (0x001C => thr: WriteOnly<u32>),
        /// Baud Rate Generator Register
        (0x0020 => brgr: ReadWrite<u32, BaudRate::Register>),
        (0x0024 => @END),
    }
}

register_bitfields![u32,
    Control [
        /// Reset status bits
        RSTSTA 8,
        TXDIS 7,
        TXEN 6,
        RXDIS 5,
        RXEN 4,
        RSTTX 3,
        RSTRX 2
    ],
    Mode [
        /// Channel mode
        CHMODE OFFSET(14) NUMBITS(2) [
            Normal = 0,
            AutomaticEcho = 1,
            LocalLoopback = 2,
            RemoteLoopback = 3
        ],
        /// Parity
        PAR OFFSET(9) NUMBITS(3) [
            Even = 0,
            Odd = 1,
            Space = 2,
            Mark = 3,
            No = 4
        ]
    ],
    Status [
        TXEMPTY 9,
        PARE 7,
        FRAME 6,
        OVRE 5,
        /// Transmit holding register is free
        TXRDY 1,
        /// A byte is waiting in RHR
        RXRDY 0
    ],
    BaudRate [
        /// Clock divisor; baud = MCK / (16 * CD)
        CD OFFSET(0) NUMBITS(16) []
    ]
];

const UART_BASE: StaticRef<UartRegisters> =
    unsafe { StaticRef::new(0x400E_0800 as *const UartRegisters) };

const RX_PIN_MASK: u32 = 1 << 8; // PA8 = URXD
const TX_PIN_MASK: u32 = 1 << 9; // PA9 = UTXD

/// Nearest baud-rate divisor for the 16x oversampled UART.
const fn clock_divisor(mck_hz: u32, baud: u32) -> u32 {
    (mck_hz + 8 * baud) / (16 * baud)
}

/// Fixed-width uppercase hex rendering, most significant nibble first.
/// Shift-and-lookup only, no division.
pub fn hex32(v: u32) -> [u8; 8] {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = [0u8; 8];
    let mut i = 0;
    while i < 8 {
        out[i] = DIGITS[((v >> (28 - 4 * i)) & 0xF) as usize];
        i += 1;
    }
    out
}

/// Decimal rendering. Returns the buffer and the number of valid leading
/// bytes.
pub fn dec32(v: u32) -> ([u8; 10], usize) {
    let mut tmp = [0u8; 10];
    let mut out = [0u8; 10];
    let mut v = v;
    let mut n = 0;
    loop {
        tmp[n] = b'0' + (v % 10) as u8;
        v /= 10;
        n += 1;
        if v == 0 {
            break;
        }
    }
    let mut i = 0;
    while i < n {
        out[i] = tmp[n - 1 - i];
        i += 1;
    }
    (out, n)
}

/// The Programming Port serial. `begin` is idempotent; calling it again just
/// reprograms the divisor and re-enables the transceiver.
pub struct Uart {
    registers: StaticRef<UartRegisters>,
    mck_hz: u32,
}

impl Uart {
    pub const fn new(mck_hz: u32) -> Uart {
        Uart {
            registers: UART_BASE,
            mck_hz,
        }
    }

    /// Configure 8-N-1 at `baud` and enable both directions.
    pub fn begin(&mut self, baud: u32) {
        let regs = self.registers;

        pmc::enable_clock(pmc::PeripheralId::Uart);
        gpio::hand_to_peripheral_a(PioPort::A, RX_PIN_MASK | TX_PIN_MASK);
        gpio::enable_pull_ups(PioPort::A, RX_PIN_MASK);

        regs.cr.write(
            Control::RSTRX::SET + Control::RSTTX::SET + Control::RXDIS::SET + Control::TXDIS::SET,
        );
        regs.mr.write(Mode::PAR::No + Mode::CHMODE::Normal);
        regs.brgr
            .write(BaudRate::CD.val(clock_divisor(self.mck_hz, baud)));
        regs.cr.write(Control::RXEN::SET + Control::TXEN::SET);
    }

    /// Blocking single-byte transmit.
    pub fn write_byte(&mut self, byte: u8) {
        let regs = self.registers;
        while !regs.sr.is_set(Status::TXRDY) {}
        regs.thr.set(byte as u32);
    }

    /// Write a string, expanding `\n` to `\r\n`.
    pub fn write_string(&mut self, s: &str) {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
    }

    /// Eight uppercase hex digits, no prefix.
    pub fn write_hex32(&mut self, v: u32) {
        for byte in hex32(v) {
            self.write_byte(byte);
        }
    }

    /// Unsigned decimal.
    pub fn write_dec32(&mut self, v: u32) {
        let (buf, len) = dec32(v);
        for &byte in &buf[..len] {
            self.write_byte(byte);
        }
    }

    /// Non-blocking receive.
    pub fn read_byte(&mut self) -> Option<u8> {
        let regs = self.registers;
        if regs.sr.is_set(Status::RXRDY) {
            Some((regs.rhr.get() & 0xFF) as u8)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{clock_divisor, dec32, hex32};

    #[test]
    fn hex_rendering() {
        assert_eq!(&hex32(0x0000_03E8), b"000003E8");
        assert_eq!(&hex32(0xDEAD_BEEF), b"DEADBEEF");
        assert_eq!(&hex32(0), b"00000000");
        assert_eq!(&hex32(u32::MAX), b"FFFFFFFF");
    }

    #[test]
    fn hex_round_trips_through_a_parser() {
        for v in [0u32, 1, 0x3E8, 0x8000_0000, 0x1234_5678, u32::MAX] {
            let digits = hex32(v);
            let s = core::str::from_utf8(&digits).unwrap();
            assert_eq!(u32::from_str_radix(s, 16).unwrap(), v);
        }
    }

    #[test]
    fn dec_rendering() {
        let (buf, len) = dec32(0);
        assert_eq!(&buf[..len], b"0");
        let (buf, len) = dec32(84_000_000);
        assert_eq!(&buf[..len], b"84000000");
        let (buf, len) = dec32(u32::MAX);
        assert_eq!(&buf[..len], b"4294967295");
    }

    #[test]
    fn divisor_rounds_to_nearest() {
        // 84 MHz / (16 * 115200) = 45.57 -> 46
        assert_eq!(clock_divisor(84_000_000, 115_200), 46);
        // 84 MHz / (16 * 9600) = 546.875 -> 547
        assert_eq!(clock_divisor(84_000_000, 9_600), 547);
    }
}
