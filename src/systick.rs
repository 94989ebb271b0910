// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! ARM Cortex-M SysTick timer and the millisecond tick counter.
//!
//! SysTick is the only interrupt source in this runtime. Its handler does
//! one thing: a wrapping increment of the global tick counter. Everything
//! else (sleeps, deadlines, timeouts) is built on top of [`millis`] with
//! wrap-around-safe modular arithmetic, so the counter rolling over every
//! ~49.7 days is a non-event.
//!
//! The vector-table collaborator must route the SysTick exception to
//! `SysTick_Handler` (exported here for bare-metal builds).

use core::sync::atomic::{AtomicU32, Ordering};

use tock_registers::interfaces::Writeable;
use tock_registers::registers::{ReadOnly, ReadWrite};
use tock_registers::{register_bitfields, register_structs};

use crate::static_ref::StaticRef;
use crate::support;

register_structs! {
    SysTickRegisters {
        /// Control and Status Register
        (0x00 => csr: ReadWrite<u32, ControlAndStatus::Register>),
        /// Reload Value Register
        (0x04 => rvr: ReadWrite<u32, ReloadValue::Register>),
        /// Current Value Register (any write clears to 0)
        (0x08 => cvr: ReadWrite<u32, CurrentValue::Register>),
        /// Calibration Value Register
        (0x0C => calib: ReadOnly<u32>),
        (0x10 => @END),
    }
}

register_bitfields![u32,
    ControlAndStatus [
        /// Set if the counter reached 0 since the last read of this register.
        COUNTFLAG 16,
        /// Clock source: (0) external reference or (1) processor clock.
        CLKSOURCE 2,
        /// Request the SysTick exception when the counter reaches 0.
        TICKINT 1,
        /// Counter enable.
        ENABLE 0
    ],
    ReloadValue [
        RELOAD OFFSET(0) NUMBITS(24) []
    ],
    CurrentValue [
        CURRENT OFFSET(0) NUMBITS(24) []
    ]
];

const SYSTICK_BASE: StaticRef<SysTickRegisters> =
    unsafe { StaticRef::new(0xE000_E010 as *const SysTickRegisters) };

/// The process-wide millisecond counter.
///
/// `Relaxed` is sufficient here: there is one hardware thread and one writer
/// (the SysTick handler), and relaxed atomics lower to plain single-copy
/// loads and stores on this target.
static TICKS: AtomicU32 = AtomicU32::new(0);

/// Milliseconds since `start_tick_1ms`, modulo 2^32.
///
/// A single 32-bit load, so the snapshot is atomic with respect to the
/// SysTick handler.
pub fn millis() -> u32 {
    TICKS.load(Ordering::Relaxed)
}

/// The entire body of the SysTick exception: one wrapping increment.
pub fn tick_from_handler() {
    let t = TICKS.load(Ordering::Relaxed);
    TICKS.store(t.wrapping_add(1), Ordering::Relaxed);
}

/// SysTick exception entry for bare-metal builds. The reset-trampoline
/// collaborator places this in the vector table.
#[cfg(all(target_arch = "arm", target_os = "none"))]
#[no_mangle]
pub extern "C" fn SysTick_Handler() {
    tick_from_handler();
}

/// Wrap-safe deadline test: true once `now` is at or past `deadline` in
/// modular time, i.e. `(now - deadline) mod 2^32` has bit 31 clear.
pub const fn deadline_reached(now: u32, deadline: u32) -> bool {
    now.wrapping_sub(deadline) & 0x8000_0000 == 0
}

const fn reload_for_1ms(cpu_hz: u32) -> u32 {
    cpu_hz / 1000 - 1
}

/// Handle on the SysTick hardware. Constructed once with the active CPU
/// frequency; [`SysTick::start_tick_1ms`] is called once and the timer then
/// runs for the life of the program.
pub struct SysTick {
    registers: StaticRef<SysTickRegisters>,
    cpu_hz: u32,
}

impl SysTick {
    pub const fn new(cpu_hz: u32) -> SysTick {
        SysTick {
            registers: SYSTICK_BASE,
            cpu_hz,
        }
    }

    /// Start the 1 ms tick: reload = cpu_hz/1000 - 1, counter cleared,
    /// processor clock, interrupt on.
    pub fn start_tick_1ms(&self) {
        let regs = self.registers;
        regs.rvr
            .write(ReloadValue::RELOAD.val(reload_for_1ms(self.cpu_hz)));
        regs.cvr.set(0);
        regs.csr.write(
            ControlAndStatus::ENABLE::SET
                + ControlAndStatus::TICKINT::SET
                + ControlAndStatus::CLKSOURCE::SET,
        );
        support::dsb();
        support::isb();
    }

    /// See [`millis`].
    pub fn millis(&self) -> u32 {
        millis()
    }

    /// Busy-wait until at least `ms` ticks have elapsed from the call.
    pub fn sleep(&self, ms: u32) {
        let start = millis();
        while millis().wrapping_sub(start) < ms {}
    }

    /// Busy-wait until `deadline` is reached in modular tick time.
    ///
    /// The drift-free way to run a periodic task: keep a `next` deadline,
    /// `sleep_until(next)`, then `next = next.wrapping_add(period)`.
    pub fn sleep_until(&self, deadline: u32) {
        while !deadline_reached(millis(), deadline) {}
    }

    /// `sleep_until(millis() + ms)`. Successive calls accumulate loop-body
    /// drift; use [`SysTick::sleep_until`] for exact cadence.
    pub fn sleep_for(&self, ms: u32) {
        self.sleep_until(millis().wrapping_add(ms));
    }
}

/// A drift-free periodic deadline: `next` advances by exactly `period` each
/// round, so late loop bodies do not accumulate error (as long as they stay
/// under one period).
pub struct Periodic {
    next: u32,
    period_ms: u32,
}

impl Periodic {
    /// Start a schedule whose first deadline is `period_ms` from `now`.
    pub fn starting_at(now: u32, period_ms: u32) -> Periodic {
        Periodic {
            next: now.wrapping_add(period_ms),
            period_ms,
        }
    }

    /// The upcoming deadline.
    pub fn next_deadline(&self) -> u32 {
        self.next
    }

    /// Block until the current deadline, then advance it by one period.
    pub fn wait(&mut self, timer: &SysTick) {
        timer.sleep_until(self.next);
        self.next = self.next.wrapping_add(self.period_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::{deadline_reached, reload_for_1ms};

    #[test]
    fn reload_value_for_84mhz() {
        assert_eq!(reload_for_1ms(84_000_000), 83_999);
    }

    #[test]
    fn deadline_simple() {
        assert!(!deadline_reached(0, 1000));
        assert!(!deadline_reached(999, 1000));
        assert!(deadline_reached(1000, 1000));
        assert!(deadline_reached(1001, 1000));
    }

    #[test]
    fn deadline_across_wrap() {
        // Deadline sits just past the wrap point.
        let deadline = 0xFFFF_FF00u32.wrapping_add(0x200);
        assert!(!deadline_reached(0xFFFF_FF00, deadline));
        assert!(!deadline_reached(0xFFFF_FFFF, deadline));
        assert!(!deadline_reached(0x0000_00FF, deadline));
        assert!(deadline_reached(0x0000_0100, deadline));
        assert!(deadline_reached(0x0000_01FF, deadline));
    }

    #[test]
    fn deadline_half_range_convention() {
        // Anything less than 2^31 ahead counts as "before" the deadline.
        assert!(!deadline_reached(0, 0x7FFF_FFFF));
        assert!(deadline_reached(0, 0x8000_0000));
    }

    #[test]
    fn periodic_deadlines_are_exactly_spaced() {
        let mut schedule = super::Periodic::starting_at(500, 1000);
        let mut expected = 1500u32;
        for _ in 0..8 {
            assert_eq!(schedule.next_deadline(), expected);
            // Advance the way `wait` does, without the hardware sleep.
            schedule.next = schedule.next.wrapping_add(schedule.period_ms);
            expected = expected.wrapping_add(1000);
        }
    }

    #[test]
    fn periodic_survives_counter_wrap() {
        let mut schedule = super::Periodic::starting_at(0xFFFF_FC00, 0x400);
        assert_eq!(schedule.next_deadline(), 0);
        schedule.next = schedule.next.wrapping_add(schedule.period_ms);
        assert_eq!(schedule.next_deadline(), 0x400);
    }
}
