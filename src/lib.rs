// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Peripheral implementations for the Atmel SAM3X8E MCU as wired on the
//! Arduino Due.
//!
//! <https://www.microchip.com/en-us/product/ATSAM3X8E>
//!
//! Everything here runs with no operating system and no vendor HAL: drivers
//! talk to memory-mapped registers directly and are polled from the main
//! loop. The only interrupt in use is SysTick, which drives the millisecond
//! tick counter in [`systick`].
//!
//! The usual entry point is [`board::Board::init`], which brings the chip to
//! 84 MHz, starts the tick timer and the Programming Port serial, and hands
//! back a context owning the constructed drivers.

#![no_std]

pub mod adc;
pub mod board;
pub mod dac;
pub mod eefc;
pub mod gpio;
pub mod kvstore;
pub mod pins;
pub mod pmc;
pub mod ring_buffer;
pub mod static_ref;
pub mod support;
pub mod systick;
pub mod twi;
pub mod uart;
pub mod usb;
pub mod wdt;
