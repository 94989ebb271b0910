// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Arduino Due board pin database.
//!
//! Maps Due board pin numbers (digital D0-D53, analog A0-A11 as 54-65, the
//! DAC/CAN/TWI1 pins, and the RX/TX LEDs) to their PIO controller and line.
//! Board pins D4 and D10 are each physically wired to two package pins; the
//! descriptor carries the second line so the GPIO handle can mirror them.

use crate::gpio::PioPort;

/// Where a board pin lands on the chip.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct PinDescriptor {
    pub port: PioPort,
    pub bit: u8,
    /// Second package pin for dual-wired board pins.
    pub secondary: Option<(PioPort, u8)>,
}

const fn single(port: PioPort, bit: u8) -> PinDescriptor {
    PinDescriptor {
        port,
        bit,
        secondary: None,
    }
}

const fn dual(port: PioPort, bit: u8, port2: PioPort, bit2: u8) -> PinDescriptor {
    PinDescriptor {
        port,
        bit,
        secondary: Some((port2, bit2)),
    }
}

/// The amber "L" LED.
pub const LED_BUILTIN: u8 = 13;
/// TWI1 data, shared with board pin 20.
pub const PIN_SDA: u8 = 20;
/// TWI1 clock, shared with board pin 21.
pub const PIN_SCL: u8 = 21;

#[rustfmt::skip]
static PIN_MAP: [PinDescriptor; 74] = [
    single(PioPort::A, 8),                      // D0  RX0
    single(PioPort::A, 9),                      // D1  TX0
    single(PioPort::B, 25),                     // D2
    single(PioPort::C, 28),                     // D3
    dual(PioPort::C, 26, PioPort::A, 29),       // D4  (two package pins)
    single(PioPort::C, 25),                     // D5
    single(PioPort::C, 24),                     // D6
    single(PioPort::C, 23),                     // D7
    single(PioPort::C, 22),                     // D8
    single(PioPort::C, 21),                     // D9
    dual(PioPort::C, 29, PioPort::A, 28),       // D10 (two package pins)
    single(PioPort::D, 7),                      // D11
    single(PioPort::D, 8),                      // D12
    single(PioPort::B, 27),                     // D13 "L" LED
    single(PioPort::D, 4),                      // D14 TX3
    single(PioPort::D, 5),                      // D15 RX3
    single(PioPort::A, 13),                     // D16 TX2
    single(PioPort::A, 12),                     // D17 RX2
    single(PioPort::A, 11),                     // D18 TX1
    single(PioPort::A, 10),                     // D19 RX1
    single(PioPort::B, 12),                     // D20 SDA
    single(PioPort::B, 13),                     // D21 SCL
    single(PioPort::B, 26),                     // D22
    single(PioPort::A, 14),                     // D23
    single(PioPort::A, 15),                     // D24
    single(PioPort::D, 0),                      // D25
    single(PioPort::D, 1),                      // D26
    single(PioPort::D, 2),                      // D27
    single(PioPort::D, 3),                      // D28
    single(PioPort::D, 6),                      // D29
    single(PioPort::D, 9),                      // D30
    single(PioPort::A, 7),                      // D31
    single(PioPort::D, 10),                     // D32
    single(PioPort::C, 1),                      // D33
    single(PioPort::C, 2),                      // D34
    single(PioPort::C, 3),                      // D35
    single(PioPort::C, 4),                      // D36
    single(PioPort::C, 5),                      // D37
    single(PioPort::C, 6),                      // D38
    single(PioPort::C, 7),                      // D39
    single(PioPort::C, 8),                      // D40
    single(PioPort::C, 9),                      // D41
    single(PioPort::A, 19),                     // D42
    single(PioPort::A, 20),                     // D43
    single(PioPort::C, 19),                     // D44
    single(PioPort::C, 18),                     // D45
    single(PioPort::C, 17),                     // D46
    single(PioPort::C, 16),                     // D47
    single(PioPort::C, 15),                     // D48
    single(PioPort::C, 14),                     // D49
    single(PioPort::C, 13),                     // D50
    single(PioPort::C, 12),                     // D51
    single(PioPort::B, 21),                     // D52
    single(PioPort::B, 14),                     // D53
    single(PioPort::A, 16),                     // 54 A0
    single(PioPort::A, 24),                     // 55 A1
    single(PioPort::A, 23),                     // 56 A2
    single(PioPort::A, 22),                     // 57 A3
    single(PioPort::A, 6),                      // 58 A4
    single(PioPort::A, 4),                      // 59 A5
    single(PioPort::A, 3),                      // 60 A6
    single(PioPort::A, 2),                      // 61 A7
    single(PioPort::B, 17),                     // 62 A8
    single(PioPort::B, 18),                     // 63 A9
    single(PioPort::B, 19),                     // 64 A10
    single(PioPort::B, 20),                     // 65 A11
    single(PioPort::B, 15),                     // 66 DAC0
    single(PioPort::B, 16),                     // 67 DAC1
    single(PioPort::A, 1),                      // 68 CANRX0
    single(PioPort::A, 0),                      // 69 CANTX0
    single(PioPort::A, 17),                     // 70 SDA1
    single(PioPort::A, 18),                     // 71 SCL1
    single(PioPort::C, 30),                     // 72 RX LED
    single(PioPort::A, 21),                     // 73 TX LED
];

/// Look up a Due board pin. `None` for pin numbers the board does not have.
pub fn lookup(board_pin: u8) -> Option<PinDescriptor> {
    PIN_MAP.get(board_pin as usize).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn led_is_pb27() {
        let d = lookup(LED_BUILTIN).unwrap();
        assert_eq!(d.port, PioPort::B);
        assert_eq!(d.bit, 27);
        assert_eq!(d.secondary, None);
    }

    #[test]
    fn twi1_pins() {
        assert_eq!(lookup(PIN_SDA).unwrap(), single(PioPort::B, 12));
        assert_eq!(lookup(PIN_SCL).unwrap(), single(PioPort::B, 13));
    }

    #[test]
    fn dual_wired_pins() {
        let d4 = lookup(4).unwrap();
        assert_eq!((d4.port, d4.bit), (PioPort::C, 26));
        assert_eq!(d4.secondary, Some((PioPort::A, 29)));

        let d10 = lookup(10).unwrap();
        assert_eq!((d10.port, d10.bit), (PioPort::C, 29));
        assert_eq!(d10.secondary, Some((PioPort::A, 28)));
    }

    #[test]
    fn out_of_range_is_unknown() {
        assert_eq!(lookup(74), None);
        assert_eq!(lookup(255), None);
    }
}
