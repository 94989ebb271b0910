// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Two-Wire Interface (I²C), master and slave, fully polled.
//!
//! The driver wraps one TWI instance in a mode state machine:
//!
//! ```text
//!   Idle --begin_master()--> Master
//!   Idle --begin_slave(a)--> Slave(a): Idle <-> Receiving / Transmitting
//! ```
//!
//! Master transactions are synchronous calls with 20 ms flag timeouts and
//! NACK detection; errors carry an Arduino-compatible wire code
//! ([`MasterError::wire_code`]). Slave mode is driven by calling
//! [`Twi::poll`] from the main loop as fast as possible; completed writes
//! are delivered through the `on_receive` callback and master reads are
//! answered by filling a [`SlaveReply`] from the `on_request` callback.
//!
//! The SAM3X TWI needs a disable/enable cycle before it reliably accepts
//! the next address phase after a repeated START, so the slave path re-arms
//! the peripheral at the end of every transaction.

use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};
use tock_registers::{register_bitfields, register_structs};

use crate::gpio::{self, PioPort};
use crate::pmc::{self, PeripheralId};
use crate::static_ref::StaticRef;
use crate::support;
use crate::systick;

register_structs! {
    TwiRegisters {
        /// Control Register
        (0x0000 => cr: WriteOnly<u32, Control::Register>),
        /// Master Mode Register
        (0x0004 => mmr: ReadWrite<u32, MasterMode::Register>),
        /// Slave Mode Register
        (0x0008 => smr: ReadWrite<u32, SlaveMode::Register>),
        /// Internal Address Register
        (0x000C => iadr: ReadWrite<u32>),
        /// Clock Waveform Generator Register
        (0x0010 => cwgr: ReadWrite<u32, ClockWaveform::Register>),
        (0x0014 => _reserved0),
        /// Status Register
        (0x0020 => sr: ReadOnly<u32, Status::Register>),
        /// Interrupt Enable Register
        (0x0024 => ier: WriteOnly<u32, Status::Register>),
        /// Interrupt Disable Register
        (0x0028 => idr: WriteOnly<u32, Status::Register>),
        /// Interrupt Mask Register
        (0x002C => imr: ReadOnly<u32, Status::Register>),
        /// Receive Holding Register
        (0x0030 => rhr: ReadOnly<u32>),
        /// Transmit Holding Register
        (0x0034 => thr: WriteOnly<u32>),
        (0x0038 => _reserved1),
        /// PDC Transfer Control Register
        (0x0120 => ptcr: WriteOnly<u32, PdcTransfer::Register>),
        /// PDC Transfer Status Register
        (0x0124 => ptsr: ReadOnly<u32>),
        (0x0128 => @END),
    }
}

register_bitfields![u32,
    Control [
        /// Software reset
        SWRST 7,
        QUICK 6,
        /// Slave mode disable
        SVDIS 5,
        /// Slave mode enable
        SVEN 4,
        /// Master mode disable
        MSDIS 3,
        /// Master mode enable
        MSEN 2,
        /// Send a STOP condition
        STOP 1,
        /// Send a START condition
        START 0
    ],
    MasterMode [
        /// Target device address
        DADR OFFSET(16) NUMBITS(7) [],
        /// Transfer direction (1 = master read)
        MREAD OFFSET(12) NUMBITS(1) [],
        /// Internal device address size
        IADRSZ OFFSET(8) NUMBITS(2) [
            None = 0,
            OneByte = 1,
            TwoBytes = 2,
            ThreeBytes = 3
        ]
    ],
    SlaveMode [
        /// Our slave address
        SADR OFFSET(16) NUMBITS(7) []
    ],
    ClockWaveform [
        /// Clock divider applied to both CLDIV and CHDIV
        CKDIV OFFSET(16) NUMBITS(3) [],
        /// Clock high divider
        CHDIV OFFSET(8) NUMBITS(8) [],
        /// Clock low divider
        CLDIV OFFSET(0) NUMBITS(8) []
    ],
    Status [
        TXBUFE 15,
        RXBUFF 14,
        ENDTX 13,
        ENDRX 12,
        /// End of slave access
        EOSACC 11,
        SCLWS 10,
        ARBLST 9,
        /// Not acknowledged
        NACK 8,
        /// Overrun
        OVRE 6,
        /// General call access
        GACC 5,
        /// Slave access in progress
        SVACC 4,
        /// Direction of the slave access (1 = master reads from us)
        SVREAD 3,
        /// Transmit holding register empty
        TXRDY 2,
        /// Receive holding register full
        RXRDY 1,
        /// Transmission complete
        TXCOMP 0
    ],
    PdcTransfer [
        TXTDIS 9,
        TXTEN 8,
        RXTDIS 1,
        RXTEN 0
    ]
];

const TWI0_BASE: StaticRef<TwiRegisters> =
    unsafe { StaticRef::new(0x4008_C000 as *const TwiRegisters) };
const TWI1_BASE: StaticRef<TwiRegisters> =
    unsafe { StaticRef::new(0x4009_0000 as *const TwiRegisters) };

/// Master TX, shared RX and slave TX buffers are all this large; extra bytes
/// are dropped.
pub const BUFFER_SIZE: usize = 32;

/// Flag timeout for master transactions.
const FLAG_TIMEOUT_MS: u32 = 20;

/// Settle spins after a software reset or slave enable.
const SETTLE_ITERS: u32 = 100;

/// Default bus speed after `begin_master`.
pub const DEFAULT_CLOCK_HZ: u32 = 100_000;

/// Master transaction failures.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum MasterError {
    /// More bytes written than the TX buffer holds.
    BufferOverflow,
    /// The address phase was not acknowledged (nobody home).
    AddressNack,
    /// A data byte was not acknowledged.
    DataNack,
    /// A status flag never rose within the timeout.
    Timeout,
}

impl MasterError {
    /// Arduino `Wire.endTransmission` compatible code. Success is 0.
    pub fn wire_code(self) -> u8 {
        match self {
            MasterError::BufferOverflow => 1,
            MasterError::AddressNack => 2,
            MasterError::DataNack => 3,
            MasterError::Timeout => 4,
        }
    }
}

/// Map a master-transaction result to the Arduino wire code.
pub fn wire_code(result: Result<(), MasterError>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(e) => e.wire_code(),
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Mode {
    Idle,
    Master,
    Slave(u8),
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum SlaveState {
    Idle,
    Receiving,
    Transmitting,
}

/// Passed to the `on_request` callback; the only way to queue slave TX
/// bytes, which keeps the "slave writes happen only inside `on_request`"
/// invariant in the type system.
pub struct SlaveReply<'a> {
    buf: &'a mut [u8; BUFFER_SIZE],
    len: &'a mut usize,
}

impl SlaveReply<'_> {
    /// Queue one byte for the master. Returns how many bytes were accepted
    /// (0 once the buffer is full).
    pub fn write(&mut self, byte: u8) -> usize {
        if *self.len < BUFFER_SIZE {
            self.buf[*self.len] = byte;
            *self.len += 1;
            1
        } else {
            0
        }
    }

    /// Queue a run of bytes, truncating at the buffer boundary.
    pub fn write_all(&mut self, bytes: &[u8]) -> usize {
        let mut n = 0;
        for &b in bytes {
            if self.write(b) == 0 {
                break;
            }
            n += 1;
        }
        n
    }
}

/// Invoked from `poll` with the bytes of a completed master->slave write.
pub type ReceiveCallback = fn(&[u8]);
/// Invoked from `poll` when the master reads from us.
pub type RequestCallback = fn(&mut SlaveReply);

/// One TWI peripheral instance.
pub struct Twi {
    registers: StaticRef<TwiRegisters>,
    peripheral_id: PeripheralId,
    pin_port: PioPort,
    pin_mask: u32,
    mck_hz: u32,

    mode: Mode,
    slave_state: SlaveState,

    target: u8,
    tx: [u8; BUFFER_SIZE],
    tx_len: usize,

    rx: [u8; BUFFER_SIZE],
    rx_len: usize,
    rx_pos: usize,

    slave_tx: [u8; BUFFER_SIZE],
    slave_tx_len: usize,
    slave_tx_pos: usize,

    on_receive: Option<ReceiveCallback>,
    on_request: Option<RequestCallback>,
}

impl Twi {
    const fn new(
        registers: StaticRef<TwiRegisters>,
        peripheral_id: PeripheralId,
        pin_port: PioPort,
        pin_mask: u32,
        mck_hz: u32,
    ) -> Twi {
        Twi {
            registers,
            peripheral_id,
            pin_port,
            pin_mask,
            mck_hz,
            mode: Mode::Idle,
            slave_state: SlaveState::Idle,
            target: 0,
            tx: [0; BUFFER_SIZE],
            tx_len: 0,
            rx: [0; BUFFER_SIZE],
            rx_len: 0,
            rx_pos: 0,
            slave_tx: [0; BUFFER_SIZE],
            slave_tx_len: 0,
            slave_tx_pos: 0,
            on_receive: None,
            on_request: None,
        }
    }

    /// TWI1: the Due's SDA/SCL header pins (PB12/PB13, Peripheral A).
    pub const fn twi1(mck_hz: u32) -> Twi {
        Twi::new(
            TWI1_BASE,
            PeripheralId::Twi1,
            PioPort::B,
            (1 << 12) | (1 << 13),
            mck_hz,
        )
    }

    /// TWI0: the SDA1/SCL1 pins (PA17/PA18, Peripheral A).
    pub const fn twi0(mck_hz: u32) -> Twi {
        Twi::new(
            TWI0_BASE,
            PeripheralId::Twi0,
            PioPort::A,
            (1 << 17) | (1 << 18),
            mck_hz,
        )
    }

    fn configure_pins_and_reset(&mut self) {
        let regs = self.registers;

        gpio::hand_to_peripheral_a(self.pin_port, self.pin_mask);
        gpio::enable_pull_ups(self.pin_port, self.pin_mask);
        pmc::enable_clock(self.peripheral_id);

        regs.ptcr
            .write(PdcTransfer::RXTDIS::SET + PdcTransfer::TXTDIS::SET);
        regs.cr.write(Control::SWRST::SET);
        let _ = regs.rhr.get();
        support::spin_delay(SETTLE_ITERS);
        regs.cr.write(Control::SVDIS::SET + Control::MSDIS::SET);
    }

    fn reset_buffers(&mut self) {
        self.tx_len = 0;
        self.rx_len = 0;
        self.rx_pos = 0;
        self.slave_tx_len = 0;
        self.slave_tx_pos = 0;
    }

    /// Enter master mode at the default 100 kHz.
    pub fn begin_master(&mut self) {
        self.configure_pins_and_reset();
        self.registers.cr.write(Control::MSEN::SET);
        self.mode = Mode::Master;
        self.slave_state = SlaveState::Idle;
        self.reset_buffers();
        self.set_clock(DEFAULT_CLOCK_HZ);
    }

    /// Enter slave mode, answering at `address` (7-bit).
    pub fn begin_slave(&mut self, address: u8) {
        let regs = self.registers;
        self.configure_pins_and_reset();
        regs.smr.write(SlaveMode::SADR.val((address & 0x7F) as u32));
        regs.cr.write(Control::SVEN::SET);
        support::spin_delay(SETTLE_ITERS);
        // Flush anything stale from before the reset.
        let _ = regs.sr.get();
        let _ = regs.rhr.get();
        self.reset_buffers();
        self.mode = Mode::Slave(address & 0x7F);
        self.slave_state = SlaveState::Idle;
    }

    /// Program the bus bit clock. A zero rate is ignored.
    pub fn set_clock(&mut self, hz: u32) {
        if hz == 0 {
            return;
        }
        if let Some((ckdiv, cldiv)) = clock_dividers(self.mck_hz, hz) {
            self.registers.cwgr.write(
                ClockWaveform::CKDIV.val(ckdiv)
                    + ClockWaveform::CHDIV.val(cldiv)
                    + ClockWaveform::CLDIV.val(cldiv),
            );
        }
    }

    pub fn set_on_receive(&mut self, callback: ReceiveCallback) {
        self.on_receive = Some(callback);
    }

    pub fn set_on_request(&mut self, callback: RequestCallback) {
        self.on_request = Some(callback);
    }

    // --- master ---

    /// Open a write transaction to `address`. Bytes queue via [`Twi::write`]
    /// and ship on [`Twi::end_transmission`].
    pub fn begin_transmission(&mut self, address: u8) {
        self.target = address & 0x7F;
        self.tx_len = 0;
    }

    /// Queue one byte for the open master write. Returns the number of
    /// bytes accepted: 0 when the buffer is full or no transaction is open.
    pub fn write(&mut self, byte: u8) -> usize {
        if self.mode != Mode::Master {
            return 0;
        }
        if self.tx_len < BUFFER_SIZE {
            self.tx[self.tx_len] = byte;
            self.tx_len += 1;
            1
        } else {
            0
        }
    }

    /// Ship the queued write. NACK on the first byte reports
    /// [`MasterError::AddressNack`]; later NACKs report
    /// [`MasterError::DataNack`]; stuck flags report [`MasterError::Timeout`].
    pub fn end_transmission(&mut self, send_stop: bool) -> Result<(), MasterError> {
        if self.mode != Mode::Master {
            return Err(MasterError::Timeout);
        }
        let regs = self.registers;

        regs.mmr.write(
            MasterMode::DADR.val(self.target as u32)
                + MasterMode::MREAD.val(0)
                + MasterMode::IADRSZ::None,
        );

        if self.tx_len == 0 {
            // Address-only probe. QUICK sends the address byte and a STOP.
            regs.cr.write(Control::QUICK::SET);
            return self.wait_txcomp_checking_nack();
        }

        for i in 0..self.tx_len {
            regs.thr.set(self.tx[i] as u32);
            match self.wait_flag_checking_nack(Status::TXRDY) {
                Ok(()) => {}
                Err(MasterError::DataNack) if i == 0 => return Err(MasterError::AddressNack),
                Err(e) => return Err(e),
            }
        }

        if send_stop {
            regs.cr.write(Control::STOP::SET);
            if !self.wait_flag(Status::TXCOMP) {
                return Err(MasterError::Timeout);
            }
        }
        Ok(())
    }

    /// Master read: fetch up to `quantity` bytes (capped at the buffer size)
    /// from `address` into the RX buffer. Returns the number received; 0 on
    /// NACK or timeout. Drain with [`Twi::available`] / [`Twi::read`].
    pub fn request_from(&mut self, address: u8, quantity: usize, send_stop: bool) -> usize {
        if self.mode != Mode::Master {
            return 0;
        }
        let regs = self.registers;
        let count = quantity.min(BUFFER_SIZE);

        self.rx_len = 0;
        self.rx_pos = 0;
        if count == 0 {
            return 0;
        }

        regs.mmr.write(
            MasterMode::DADR.val((address & 0x7F) as u32)
                + MasterMode::MREAD::SET
                + MasterMode::IADRSZ::None,
        );

        // Single-byte reads need START and STOP raised together, the Atmel
        // one-shot idiom; otherwise STOP goes out just before the last byte.
        if count == 1 && send_stop {
            regs.cr.write(Control::START::SET + Control::STOP::SET);
        } else {
            regs.cr.write(Control::START::SET);
        }

        for i in 0..count {
            if send_stop && count > 1 && i == count - 1 {
                regs.cr.write(Control::STOP::SET);
            }
            if self.wait_flag_checking_nack(Status::RXRDY).is_err() {
                return 0;
            }
            self.rx[i] = (regs.rhr.get() & 0xFF) as u8;
        }

        if send_stop {
            // Best effort; the data is already in hand.
            let _ = self.wait_flag(Status::TXCOMP);
        }

        self.rx_len = count;
        count
    }

    /// Bytes left in the RX buffer.
    pub fn available(&self) -> usize {
        self.rx_len - self.rx_pos
    }

    /// Next byte from the RX buffer.
    pub fn read(&mut self) -> Option<u8> {
        if self.rx_pos < self.rx_len {
            let b = self.rx[self.rx_pos];
            self.rx_pos += 1;
            Some(b)
        } else {
            None
        }
    }

    fn wait_flag(&self, flag: tock_registers::fields::Field<u32, Status::Register>) -> bool {
        let regs = self.registers;
        let start = systick::millis();
        loop {
            if regs.sr.is_set(flag) {
                return true;
            }
            if systick::millis().wrapping_sub(start) >= FLAG_TIMEOUT_MS {
                return false;
            }
        }
    }

    fn wait_flag_checking_nack(
        &self,
        flag: tock_registers::fields::Field<u32, Status::Register>,
    ) -> Result<(), MasterError> {
        let regs = self.registers;
        let start = systick::millis();
        loop {
            let sr = regs.sr.extract();
            if sr.is_set(Status::NACK) {
                return Err(MasterError::DataNack);
            }
            if sr.is_set(flag) {
                return Ok(());
            }
            if systick::millis().wrapping_sub(start) >= FLAG_TIMEOUT_MS {
                return Err(MasterError::Timeout);
            }
        }
    }

    fn wait_txcomp_checking_nack(&self) -> Result<(), MasterError> {
        match self.wait_flag_checking_nack(Status::TXCOMP) {
            // A NACK on an address-only probe is an address NACK.
            Err(MasterError::DataNack) => Err(MasterError::AddressNack),
            other => other,
        }
    }

    // --- slave ---

    /// Service the slave state machine. Call from the main loop as often as
    /// possible while in slave mode; a no-op otherwise.
    pub fn poll(&mut self) {
        if !matches!(self.mode, Mode::Slave(_)) {
            return;
        }
        let regs = self.registers;
        let sr = regs.sr.extract();

        if !sr.is_set(Status::SVACC) {
            // The end of an access shows up one status read after SVACC
            // drops; finalize and re-arm there.
            if sr.is_set(Status::EOSACC) {
                if self.slave_state == SlaveState::Receiving && self.rx_len > 0 {
                    self.deliver_receive();
                }
                self.rearm();
            }
            return;
        }

        if sr.is_set(Status::SVREAD) {
            self.service_slave_read(sr.is_set(Status::EOSACC) || sr.is_set(Status::NACK));
        } else {
            self.service_slave_write(sr.is_set(Status::OVRE), sr.is_set(Status::EOSACC));
        }
    }

    /// The master is reading from us.
    fn service_slave_read(&mut self, terminal: bool) {
        let regs = self.registers;

        if self.slave_state != SlaveState::Transmitting {
            // A repeated START flipped a write into a read: deliver the
            // received bytes before answering.
            if self.slave_state == SlaveState::Receiving && self.rx_len > 0 {
                self.deliver_receive();
            }
            self.slave_state = SlaveState::Transmitting;
            self.fill_slave_reply();
        }

        if terminal {
            self.rearm();
            return;
        }

        while self.registers.sr.is_set(Status::TXRDY) {
            let byte = if self.slave_tx_pos < self.slave_tx_len {
                let b = self.slave_tx[self.slave_tx_pos];
                self.slave_tx_pos += 1;
                b
            } else {
                0
            };
            regs.thr.set(byte as u32);

            let sr = self.registers.sr.extract();
            if sr.is_set(Status::EOSACC) || sr.is_set(Status::NACK) {
                self.rearm();
                return;
            }
        }
    }

    /// The master is writing to us.
    fn service_slave_write(&mut self, overrun: bool, end_of_access: bool) {
        let regs = self.registers;

        if self.slave_state != SlaveState::Receiving {
            self.rx_len = 0;
            self.rx_pos = 0;
            self.slave_state = SlaveState::Receiving;
        }

        if overrun {
            let _ = regs.rhr.get();
        }

        while self.registers.sr.is_set(Status::RXRDY) {
            let byte = (regs.rhr.get() & 0xFF) as u8;
            if self.rx_len < BUFFER_SIZE {
                self.rx[self.rx_len] = byte;
                self.rx_len += 1;
            }
        }

        if end_of_access {
            if self.rx_len > 0 {
                self.deliver_receive();
            }
            self.rearm();
        }
    }

    /// Run the user `on_request` callback to fill the slave TX buffer. An
    /// empty reply becomes a single zero byte so the master always gets a
    /// defined payload.
    fn fill_slave_reply(&mut self) {
        self.slave_tx_len = 0;
        self.slave_tx_pos = 0;
        if let Some(callback) = self.on_request {
            let mut reply = SlaveReply {
                buf: &mut self.slave_tx,
                len: &mut self.slave_tx_len,
            };
            callback(&mut reply);
        }
        if self.slave_tx_len == 0 {
            self.slave_tx[0] = 0;
            self.slave_tx_len = 1;
        }
    }

    fn deliver_receive(&mut self) {
        self.rx_pos = 0;
        if let Some(callback) = self.on_receive {
            callback(&self.rx[..self.rx_len]);
        }
        self.rx_len = 0;
        self.rx_pos = 0;
    }

    /// Disable/enable the slave interface and flush stale state. Required
    /// before the peripheral reliably accepts the next repeated START.
    fn rearm(&mut self) {
        let regs = self.registers;
        regs.cr.write(Control::SVDIS::SET);
        regs.cr.write(Control::SVEN::SET);
        let _ = regs.sr.get();
        let _ = regs.rhr.get();
        self.reset_buffers();
        self.slave_state = SlaveState::Idle;
    }
}

/// Find the smallest CKDIV in 0..=7 such that
/// `(mck / (2 * hz) - 4) >> ckdiv` fits in the 8-bit CLDIV field.
fn clock_dividers(mck_hz: u32, hz: u32) -> Option<(u32, u32)> {
    let base = (mck_hz / (2 * hz)).saturating_sub(4);
    for ckdiv in 0..=7 {
        let cldiv = base >> ckdiv;
        if cldiv <= 0xFF {
            return Some((ckdiv, cldiv));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dividers_for_standard_rates_at_84mhz() {
        // 84 MHz / (2 * 100 kHz) - 4 = 416; needs one halving to fit.
        assert_eq!(clock_dividers(84_000_000, 100_000), Some((1, 208)));
        // 84 MHz / (2 * 400 kHz) - 4 = 101; fits directly.
        assert_eq!(clock_dividers(84_000_000, 400_000), Some((0, 101)));
    }

    #[test]
    fn dividers_at_reset_clock() {
        // 4 MHz / (2 * 100 kHz) - 4 = 16.
        assert_eq!(clock_dividers(4_000_000, 100_000), Some((0, 16)));
    }

    #[test]
    fn dividers_unreachable_rate() {
        // 2^7 * 255 < 84 MHz / (2 * 1 Hz) - 4: no encoding exists.
        assert_eq!(clock_dividers(84_000_000, 1), None);
    }

    #[test]
    fn master_tx_buffer_caps_at_32() {
        let mut twi = Twi::twi1(84_000_000);
        twi.mode = Mode::Master;
        twi.begin_transmission(0x42);
        for i in 0..BUFFER_SIZE {
            assert_eq!(twi.write(i as u8), 1);
        }
        // The 33rd byte is dropped.
        assert_eq!(twi.write(0xAA), 0);
        assert_eq!(twi.tx_len, BUFFER_SIZE);
    }

    #[test]
    fn write_outside_master_mode_is_rejected() {
        let mut twi = Twi::twi1(84_000_000);
        assert_eq!(twi.write(0x55), 0);
    }

    #[test]
    fn slave_reply_caps_at_buffer_size() {
        let mut buf = [0u8; BUFFER_SIZE];
        let mut len = 0usize;
        let mut reply = SlaveReply {
            buf: &mut buf,
            len: &mut len,
        };
        for i in 0..BUFFER_SIZE {
            assert_eq!(reply.write(i as u8), 1);
        }
        assert_eq!(reply.write(0xFF), 0);
        assert_eq!(len, BUFFER_SIZE);
    }

    #[test]
    fn slave_reply_write_all_truncates() {
        let mut buf = [0u8; BUFFER_SIZE];
        let mut len = 0usize;
        let mut reply = SlaveReply {
            buf: &mut buf,
            len: &mut len,
        };
        let long = [0xA5u8; BUFFER_SIZE + 10];
        assert_eq!(reply.write_all(&long), BUFFER_SIZE);
    }
}
