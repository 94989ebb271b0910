// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! One-shot board bring-up for the Arduino Due.
//!
//! [`Board::init`] is the usual first call of `main`: it disables the
//! watchdog, raises the clock tree to 84 MHz (continuing degraded at the
//! reset clock if the crystal or PLL fails), starts the Programming Port
//! serial and the millisecond tick, unmasks interrupts, and hands back a
//! [`Due`] context owning the constructed drivers.
//!
//! Each peripheral must only ever have one driver; constructing the context
//! here and nowhere else is how the rest of the crate keeps that promise.

use crate::pmc;
use crate::support;
use crate::systick::SysTick;
use crate::twi::Twi;
use crate::uart::Uart;
use crate::usb::UsbDevice;
use crate::wdt::Wdt;

/// Bring-up options. The defaults match the classic Due sketch environment:
/// 115200 baud banner, 100 kHz I²C, no USB.
#[derive(Copy, Clone, Debug)]
pub struct BoardConfig {
    pub baud: u32,
    pub print_boot_banner: bool,
    pub i2c_clock_hz: u32,
    /// Also bring up the native-port CDC serial.
    pub with_usb: bool,
}

impl Default for BoardConfig {
    fn default() -> BoardConfig {
        BoardConfig {
            baud: 115_200,
            print_boot_banner: true,
            i2c_clock_hz: 100_000,
            with_usb: false,
        }
    }
}

/// The live board: clock facts plus the driver instances.
pub struct Due {
    /// Whether the 84 MHz bring-up succeeded.
    pub clock_ok: bool,
    pub mck_hz: u32,
    pub cpu_hz: u32,
    pub serial: Uart,
    pub timer: SysTick,
    pub i2c: Twi,
    pub usb: Option<UsbDevice>,
}

pub struct Board;

impl Board {
    /// Bring the board up. See the module docs for the sequence.
    pub fn init(config: BoardConfig) -> Due {
        Wdt::new().disable();

        let clock_ok = pmc::setup_mck_84mhz();
        let mck_hz = if clock_ok {
            pmc::MCK_FAST_HZ
        } else {
            pmc::MCK_RESET_HZ
        };
        let cpu_hz = mck_hz;

        let mut serial = Uart::new(mck_hz);
        serial.begin(config.baud);
        if config.print_boot_banner {
            serial.write_string("BOOT\n");
            serial.write_string(if clock_ok {
                "clock_ok=1\n"
            } else {
                "clock_ok=0\n"
            });
        }

        let timer = SysTick::new(cpu_hz);
        timer.start_tick_1ms();
        unsafe { support::enable_interrupts() };

        let mut i2c = Twi::twi1(mck_hz);
        i2c.begin_master();
        i2c.set_clock(config.i2c_clock_hz);

        let usb = if config.with_usb {
            let mut usb = UsbDevice::new();
            usb.begin();
            Some(usb)
        } else {
            None
        };

        Due {
            clock_ok,
            mck_hz,
            cpu_hz,
            serial,
            timer,
            i2c,
            usb,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BoardConfig;

    #[test]
    fn defaults_match_the_documented_contract() {
        let config = BoardConfig::default();
        assert_eq!(config.baud, 115_200);
        assert!(config.print_boot_banner);
        assert_eq!(config.i2c_clock_hz, 100_000);
        assert!(!config.with_usb);
    }
}
