// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! UOTGHS USB controller in full-speed device mode, with a CDC-ACM serial
//! function.
//!
//! The controller is polled, like everything else in this runtime: call
//! [`UsbDevice::poll`] from the main loop. Each pass services the bus-reset
//! flag, the control endpoint's SETUP state machine, the CDC OUT endpoint
//! (draining host data into a ring buffer), and any deferred address commit
//! from a `SET_ADDRESS` request.
//!
//! Lifecycle: `Detached` -> `Powered` (after [`UsbDevice::begin`] forces
//! re-enumeration via DETACH) -> `Default` (host bus reset observed) ->
//! `Addressed` -> `Configured`. The CDC IN path transmits only once
//! configured.

pub mod descriptors;

use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::registers::{ReadOnly, ReadWrite, WriteOnly};
use tock_registers::{register_bitfields, register_structs};

use crate::pmc;
use crate::ring_buffer::RingBuffer;
use crate::static_ref::StaticRef;
use crate::support;

use self::descriptors::{BULK_PACKET_SIZE, EP0_SIZE, EP_CDC_IN, EP_CDC_NOTIFY, EP_CDC_OUT};

register_structs! {
    UotghsRegisters {
        /// Device General Control Register
        (0x0000 => devctrl: ReadWrite<u32, DeviceControl::Register>),
        /// Device Global Interrupt Status Register
        (0x0004 => devisr: ReadOnly<u32, DeviceInterrupt::Register>),
        /// Device Global Interrupt Clear Register
        (0x0008 => devicr: WriteOnly<u32, DeviceInterrupt::Register>),
        /// Device Global Interrupt Set Register
        (0x000C => devifr: WriteOnly<u32, DeviceInterrupt::Register>),
        /// Device Global Interrupt Mask Register
        (0x0010 => devimr: ReadOnly<u32, DeviceInterrupt::Register>),
        /// Device Global Interrupt Disable Register
        (0x0014 => devidr: WriteOnly<u32, DeviceInterrupt::Register>),
        /// Device Global Interrupt Enable Register
        (0x0018 => devier: WriteOnly<u32, DeviceInterrupt::Register>),
        /// Device Endpoint Register (enable/reset)
        (0x001C => devept: ReadWrite<u32>),
        /// Device Frame Number Register
        (0x0020 => devfnum: ReadOnly<u32>),
        (0x0024 => _reserved0),
        /// Device Endpoint Configuration Registers
        (0x0100 => deveptcfg: [ReadWrite<u32, EndpointConfig::Register>; 10]),
        (0x0128 => _reserved1),
        /// Device Endpoint Status Registers
        (0x0130 => deveptisr: [ReadOnly<u32, EndpointStatus::Register>; 10]),
        (0x0158 => _reserved2),
        /// Device Endpoint Status Clear Registers
        (0x0160 => devepticr: [WriteOnly<u32, EndpointStatus::Register>; 10]),
        (0x0188 => _reserved3),
        /// Device Endpoint Status Set Registers
        (0x0190 => deveptifr: [WriteOnly<u32, EndpointStatus::Register>; 10]),
        (0x01B8 => _reserved4),
        /// Device Endpoint Control (mask) Registers
        (0x01C0 => deveptimr: [ReadOnly<u32, EndpointControl::Register>; 10]),
        (0x01E8 => _reserved5),
        /// Device Endpoint Control Enable Registers
        (0x01F0 => deveptier: [WriteOnly<u32, EndpointControl::Register>; 10]),
        (0x0218 => _reserved6),
        /// Device Endpoint Control Disable Registers
        (0x0220 => deveptidr: [WriteOnly<u32, EndpointControl::Register>; 10]),
        (0x0248 => _reserved7),
        /// General Control Register
        (0x0800 => ctrl: ReadWrite<u32, Control::Register>),
        /// General Status Register
        (0x0804 => sr: ReadOnly<u32, GeneralStatus::Register>),
        /// General Status Clear Register
        (0x0808 => scr: WriteOnly<u32, GeneralStatus::Register>),
        /// General Status Set Register
        (0x080C => sfr: WriteOnly<u32, GeneralStatus::Register>),
        (0x0810 => _reserved8),
        /// General Finite State Machine Register
        (0x082C => fsm: ReadOnly<u32>),
        (0x0830 => @END),
    }
}

register_bitfields![u32,
    Control [
        /// Mode when UID is ignored (1 = device)
        UIMOD OFFSET(25) NUMBITS(1) [
            Host = 0,
            Device = 1
        ],
        /// Honor the UID pin instead of UIMOD
        UID OFFSET(24) NUMBITS(1) [],
        /// USB macro enable
        USBE OFFSET(15) NUMBITS(1) [],
        /// Freeze the USB clock
        FRZCLK OFFSET(14) NUMBITS(1) [],
        VBUSPO OFFSET(13) NUMBITS(1) [],
        /// OTG pad enable
        OTGPADE OFFSET(12) NUMBITS(1) []
    ],
    GeneralStatus [
        /// UTMI clock is usable
        CLKUSABLE OFFSET(14) NUMBITS(1) [],
        SPEED OFFSET(12) NUMBITS(2) [
            Full = 0,
            High = 1,
            Low = 2
        ]
    ],
    DeviceControl [
        LS OFFSET(12) NUMBITS(1) [],
        SPDCONF OFFSET(10) NUMBITS(2) [
            Normal = 0,
            ForceFullSpeed = 3
        ],
        RMWKUP OFFSET(9) NUMBITS(1) [],
        /// Detach from the bus (pull-up removed)
        DETACH OFFSET(8) NUMBITS(1) [],
        /// Address enable
        ADDEN OFFSET(7) NUMBITS(1) [],
        /// Device address
        UADD OFFSET(0) NUMBITS(7) []
    ],
    DeviceInterrupt [
        UPRSM 6,
        EORSM 5,
        WAKEUP 4,
        /// End of bus reset
        EORST 3,
        SOF 2,
        MSOF 1,
        SUSP 0
    ],
    EndpointConfig [
        NBTRANS OFFSET(13) NUMBITS(2) [],
        EPTYPE OFFSET(11) NUMBITS(2) [
            Control = 0,
            Isochronous = 1,
            Bulk = 2,
            Interrupt = 3
        ],
        AUTOSW OFFSET(9) NUMBITS(1) [],
        EPDIR OFFSET(8) NUMBITS(1) [
            Out = 0,
            In = 1
        ],
        EPSIZE OFFSET(4) NUMBITS(3) [
            Bytes8 = 0,
            Bytes16 = 1,
            Bytes32 = 2,
            Bytes64 = 3,
            Bytes128 = 4,
            Bytes256 = 5,
            Bytes512 = 6,
            Bytes1024 = 7
        ],
        EPBK OFFSET(2) NUMBITS(2) [
            Single = 0,
            Double = 1,
            Triple = 2
        ],
        /// DPRAM bank allocation
        ALLOC OFFSET(1) NUMBITS(1) []
    ],
    EndpointStatus [
        /// Bytes in the current bank
        BYCT OFFSET(20) NUMBITS(11) [],
        CFGOK OFFSET(18) NUMBITS(1) [],
        CTRLDIR OFFSET(17) NUMBITS(1) [],
        RWALL OFFSET(16) NUMBITS(1) [],
        CURRBK OFFSET(14) NUMBITS(2) [],
        NBUSYBK OFFSET(12) NUMBITS(2) [],
        DTSEQ OFFSET(8) NUMBITS(2) [],
        SHORTPACKET OFFSET(7) NUMBITS(1) [],
        STALLEDI OFFSET(6) NUMBITS(1) [],
        OVERFI OFFSET(5) NUMBITS(1) [],
        NAKINI OFFSET(4) NUMBITS(1) [],
        NAKOUTI OFFSET(3) NUMBITS(1) [],
        /// SETUP packet received (control endpoints)
        RXSTPI OFFSET(2) NUMBITS(1) [],
        /// OUT data received
        RXOUTI OFFSET(1) NUMBITS(1) [],
        /// IN bank free / transmit done
        TXINI OFFSET(0) NUMBITS(1) []
    ],
    EndpointControl [
        /// Request a STALL handshake
        STALLRQ OFFSET(19) NUMBITS(1) [],
        RSTDT OFFSET(18) NUMBITS(1) [],
        NYETDIS OFFSET(17) NUMBITS(1) [],
        EPDISHDMA OFFSET(16) NUMBITS(1) [],
        /// Bank ownership; clearing releases the bank to the controller
        FIFOCON OFFSET(14) NUMBITS(1) [],
        KILLBK OFFSET(13) NUMBITS(1) [],
        NBUSYBKE OFFSET(12) NUMBITS(1) [],
        SHORTPACKETE OFFSET(7) NUMBITS(1) [],
        STALLEDE OFFSET(6) NUMBITS(1) [],
        OVERFE OFFSET(5) NUMBITS(1) [],
        NAKINE OFFSET(4) NUMBITS(1) [],
        NAKOUTE OFFSET(3) NUMBITS(1) [],
        RXSTPE OFFSET(2) NUMBITS(1) [],
        RXOUTE OFFSET(1) NUMBITS(1) [],
        TXINE OFFSET(0) NUMBITS(1) []
    ]
];

const UOTGHS_BASE: StaticRef<UotghsRegisters> =
    unsafe { StaticRef::new(0x400A_C000 as *const UotghsRegisters) };

/// Endpoint FIFO RAM. Each endpoint owns a 32 KiB window; sequential byte
/// accesses anywhere in the window stream through the endpoint's bank.
const DPRAM_BASE: usize = 0x2018_0000;
const DPRAM_EP_STRIDE: usize = 0x8000;

/// Inbound CDC bytes waiting for the application.
const CDC_RX_CAPACITY: usize = 512;

/// Bound on endpoint-flag waits during control and bulk transfers.
const EP_FLAG_TIMEOUT_ITERS: u32 = 2_000_000;

/// Spins with DETACH held high to force the host to re-enumerate.
const DETACH_SPIN_ITERS: u32 = 10_000;

// Standard request codes we implement; everything else stalls.
const REQ_SET_ADDRESS: u8 = 0x05;
const REQ_GET_DESCRIPTOR: u8 = 0x06;
const REQ_SET_CONFIGURATION: u8 = 0x09;
// CDC class requests.
const REQ_CDC_SET_LINE_CODING: u8 = 0x20;
const REQ_CDC_GET_LINE_CODING: u8 = 0x21;
const REQ_CDC_SET_CONTROL_LINE_STATE: u8 = 0x22;

/// Where the device sits in the Chapter-9 lifecycle.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum DeviceState {
    Detached,
    Powered,
    Default,
    Addressed(u8),
    Configured(u8),
}

/// CDC line coding, as exchanged by `SET_LINE_CODING`/`GET_LINE_CODING`.
/// The UART-less CDC path carries it but does not act on it.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct LineCoding {
    pub dte_rate: u32,
    pub char_format: u8,
    pub parity_type: u8,
    pub data_bits: u8,
}

impl LineCoding {
    pub const fn default_coding() -> LineCoding {
        LineCoding {
            dte_rate: 115_200,
            char_format: 0,
            parity_type: 0,
            data_bits: 8,
        }
    }

    fn decode(bytes: &[u8; 7]) -> LineCoding {
        LineCoding {
            dte_rate: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            char_format: bytes[4],
            parity_type: bytes[5],
            data_bits: bytes[6],
        }
    }

    fn encode(&self) -> [u8; 7] {
        let rate = self.dte_rate.to_le_bytes();
        [
            rate[0],
            rate[1],
            rate[2],
            rate[3],
            self.char_format,
            self.parity_type,
            self.data_bits,
        ]
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum UsbError {
    /// IN endpoints only transmit in the configured state.
    NotConfigured,
    /// An endpoint flag never rose.
    Timeout,
}

#[derive(Copy, Clone)]
struct SetupPacket {
    request_type: u8,
    request: u8,
    value: u16,
    #[allow(dead_code)]
    index: u16,
    length: u16,
}

impl SetupPacket {
    fn from_bytes(raw: &[u8; 8]) -> SetupPacket {
        SetupPacket {
            request_type: raw[0],
            request: raw[1],
            value: u16::from_le_bytes([raw[2], raw[3]]),
            index: u16::from_le_bytes([raw[4], raw[5]]),
            length: u16::from_le_bytes([raw[6], raw[7]]),
        }
    }
}

fn fifo_ptr(endpoint: usize) -> *mut u8 {
    (DPRAM_BASE + endpoint * DPRAM_EP_STRIDE) as *mut u8
}

fn fifo_read(endpoint: usize, buf: &mut [u8]) {
    let base = fifo_ptr(endpoint);
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte = unsafe { core::ptr::read_volatile(base.add(i)) };
    }
}

fn fifo_write(endpoint: usize, data: &[u8]) {
    let base = fifo_ptr(endpoint);
    for (i, &byte) in data.iter().enumerate() {
        unsafe { core::ptr::write_volatile(base.add(i), byte) };
    }
}

/// The USB device controller plus CDC function state.
pub struct UsbDevice {
    registers: StaticRef<UotghsRegisters>,
    state: DeviceState,
    address: u8,
    pending_address: Option<u8>,
    config_value: u8,
    line_coding: LineCoding,
    rx: RingBuffer<CDC_RX_CAPACITY>,
}

impl UsbDevice {
    pub const fn new() -> UsbDevice {
        UsbDevice {
            registers: UOTGHS_BASE,
            state: DeviceState::Detached,
            address: 0,
            pending_address: None,
            config_value: 0,
            line_coding: LineCoding::default_coding(),
            rx: RingBuffer::new(),
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn is_configured(&self) -> bool {
        matches!(self.state, DeviceState::Configured(_))
    }

    /// Bring up the controller: UPLL, device mode, pull-up attach. Returns
    /// false if the USB clock fails to lock. Endpoints are configured when
    /// the host's bus reset arrives.
    pub fn begin(&mut self) -> bool {
        let regs = self.registers;

        pmc::enable_clock(pmc::PeripheralId::Uotghs);
        if !pmc::enable_upll_usb_clock() {
            return false;
        }

        // Device mode, pads on, clock running (FRZCLK stays clear).
        regs.ctrl
            .write(Control::UIMOD::Device + Control::OTGPADE::SET + Control::USBE::SET);
        regs.devier.write(DeviceInterrupt::EORST::SET);

        // Cycle DETACH so a host that already had us enumerates afresh.
        regs.devctrl.write(DeviceControl::DETACH::SET);
        support::spin_delay(DETACH_SPIN_ITERS);
        regs.devctrl.set(0);

        support::dsb();
        support::isb();

        self.state = DeviceState::Powered;
        true
    }

    /// One cooperative service pass. Call from the main loop.
    pub fn poll(&mut self) {
        let regs = self.registers;

        if regs.devisr.is_set(DeviceInterrupt::EORST) {
            regs.devicr.write(DeviceInterrupt::EORST::SET);
            self.handle_bus_reset();
        }

        self.service_ep0();

        if self.is_configured() {
            self.service_cdc_out();
        }

        // A SET_ADDRESS commits only after its status ZLP has left: TXINI
        // high again means the control IN bank is empty. Until then, keep
        // the address pending and retry next pass.
        if let Some(address) = self.pending_address {
            if regs.deveptisr[0].is_set(EndpointStatus::TXINI) {
                self.pending_address = None;
                regs.devctrl
                    .write(DeviceControl::UADD.val(address as u32));
                regs.devctrl
                    .write(DeviceControl::UADD.val(address as u32) + DeviceControl::ADDEN::SET);
                self.address = address;
                self.state = DeviceState::Addressed(address);
            }
        }
    }

    /// The host reset the bus: back to address 0, endpoints reconfigured.
    fn handle_bus_reset(&mut self) {
        let regs = self.registers;

        regs.devctrl.set(0);
        self.address = 0;
        self.pending_address = None;
        self.config_value = 0;
        self.rx = RingBuffer::new();

        self.configure_endpoints();
        self.state = DeviceState::Default;
    }

    fn enable_endpoint(&self, endpoint: usize) {
        let regs = self.registers;
        regs.devept.set(regs.devept.get() | (1 << endpoint));
    }

    fn configure_endpoints(&self) {
        let regs = self.registers;

        // EP0: control, 64 bytes, one bank.
        regs.deveptcfg[0].write(
            EndpointConfig::EPTYPE::Control
                + EndpointConfig::EPSIZE::Bytes64
                + EndpointConfig::EPBK::Single
                + EndpointConfig::ALLOC::SET,
        );
        self.enable_endpoint(0);
        regs.devepticr[0].set(0xFF);
        regs.deveptier[0].write(EndpointControl::RXSTPE::SET);

        // EP1: CDC notification, interrupt IN, 8 bytes.
        regs.deveptcfg[EP_CDC_NOTIFY].write(
            EndpointConfig::EPTYPE::Interrupt
                + EndpointConfig::EPDIR::In
                + EndpointConfig::EPSIZE::Bytes8
                + EndpointConfig::EPBK::Single
                + EndpointConfig::ALLOC::SET,
        );
        self.enable_endpoint(EP_CDC_NOTIFY);

        // EP2: CDC data OUT, bulk, 64 bytes.
        regs.deveptcfg[EP_CDC_OUT].write(
            EndpointConfig::EPTYPE::Bulk
                + EndpointConfig::EPDIR::Out
                + EndpointConfig::EPSIZE::Bytes64
                + EndpointConfig::EPBK::Single
                + EndpointConfig::ALLOC::SET,
        );
        self.enable_endpoint(EP_CDC_OUT);
        regs.deveptier[EP_CDC_OUT].write(EndpointControl::RXOUTE::SET);

        // EP3: CDC data IN, bulk, 64 bytes.
        regs.deveptcfg[EP_CDC_IN].write(
            EndpointConfig::EPTYPE::Bulk
                + EndpointConfig::EPDIR::In
                + EndpointConfig::EPSIZE::Bytes64
                + EndpointConfig::EPBK::Single
                + EndpointConfig::ALLOC::SET,
        );
        self.enable_endpoint(EP_CDC_IN);
    }

    // --- control endpoint ---

    fn service_ep0(&mut self) {
        let regs = self.registers;

        if !regs.deveptisr[0].is_set(EndpointStatus::RXSTPI) {
            return;
        }

        let mut raw = [0u8; 8];
        fifo_read(0, &mut raw);
        regs.devepticr[0].write(EndpointStatus::RXSTPI::SET);

        let setup = SetupPacket::from_bytes(&raw);
        self.dispatch_setup(&setup);
    }

    fn dispatch_setup(&mut self, setup: &SetupPacket) {
        match (setup.request_type, setup.request) {
            (0x80, REQ_GET_DESCRIPTOR) => {
                let descriptor_type = (setup.value >> 8) as u8;
                let index = (setup.value & 0xFF) as u8;
                match descriptors::descriptor(descriptor_type, index) {
                    Some(descriptor) => {
                        let len = descriptor.len().min(setup.length as usize);
                        let _ = self.ep0_send(&descriptor[..len]);
                    }
                    None => self.stall_ep0(),
                }
            }
            (0x00, REQ_SET_ADDRESS) => {
                // Status first; the new address takes effect afterwards, at
                // the top of the next poll pass.
                let _ = self.ep0_send_zlp();
                self.pending_address = Some((setup.value & 0x7F) as u8);
            }
            (0x00, REQ_SET_CONFIGURATION) => {
                self.config_value = (setup.value & 0xFF) as u8;
                let _ = self.ep0_send_zlp();
                if self.config_value != 0 {
                    self.state = DeviceState::Configured(self.config_value);
                } else {
                    self.state = DeviceState::Addressed(self.address);
                }
            }
            (0x21, REQ_CDC_SET_LINE_CODING) if setup.length == 7 => {
                let mut raw = [0u8; 7];
                if self.ep0_read_data(&mut raw).is_ok() {
                    self.line_coding = LineCoding::decode(&raw);
                }
                let _ = self.ep0_send_zlp();
            }
            (0xA1, REQ_CDC_GET_LINE_CODING) => {
                let raw = self.line_coding.encode();
                let len = raw.len().min(setup.length as usize);
                let _ = self.ep0_send(&raw[..len]);
            }
            (0x21, REQ_CDC_SET_CONTROL_LINE_STATE) => {
                // DTR/RTS are not modeled; acknowledge and move on.
                let _ = self.ep0_send_zlp();
            }
            _ => self.stall_ep0(),
        }
    }

    /// Transmit a control IN payload in EP0-sized chunks, then a ZLP.
    fn ep0_send(&mut self, data: &[u8]) -> Result<(), UsbError> {
        for chunk in data.chunks(EP0_SIZE) {
            self.ep0_wait_txini()?;
            fifo_write(0, chunk);
            self.registers.devepticr[0].write(EndpointStatus::TXINI::SET);
        }
        self.ep0_send_zlp()
    }

    /// A zero-length IN: the status stage of OUT and no-data requests.
    fn ep0_send_zlp(&mut self) -> Result<(), UsbError> {
        self.ep0_wait_txini()?;
        self.registers.devepticr[0].write(EndpointStatus::TXINI::SET);
        Ok(())
    }

    fn ep0_wait_txini(&self) -> Result<(), UsbError> {
        let regs = self.registers;
        if support::spin_until(EP_FLAG_TIMEOUT_ITERS, || {
            regs.deveptisr[0].is_set(EndpointStatus::TXINI)
        }) {
            Ok(())
        } else {
            Err(UsbError::Timeout)
        }
    }

    /// Receive the data stage of a control OUT request into `buf`.
    fn ep0_read_data(&mut self, buf: &mut [u8]) -> Result<(), UsbError> {
        let regs = self.registers;
        if !support::spin_until(EP_FLAG_TIMEOUT_ITERS, || {
            regs.deveptisr[0].is_set(EndpointStatus::RXOUTI)
        }) {
            return Err(UsbError::Timeout);
        }
        fifo_read(0, buf);
        regs.devepticr[0].write(EndpointStatus::RXOUTI::SET);
        Ok(())
    }

    /// Answer an unsupported request with a STALL handshake. The controller
    /// drops the request flag itself when the next SETUP arrives.
    fn stall_ep0(&mut self) {
        self.registers.deveptier[0].write(EndpointControl::STALLRQ::SET);
    }

    // --- CDC data path ---

    /// Drain EP2 into the RX ring. Overflow is dropped silently.
    fn service_cdc_out(&mut self) {
        let regs = self.registers;

        if !regs.deveptisr[EP_CDC_OUT].is_set(EndpointStatus::RXOUTI) {
            return;
        }
        let count = regs.deveptisr[EP_CDC_OUT].read(EndpointStatus::BYCT) as usize;
        regs.devepticr[EP_CDC_OUT].write(EndpointStatus::RXOUTI::SET);

        let base = fifo_ptr(EP_CDC_OUT);
        for i in 0..count {
            let byte = unsafe { core::ptr::read_volatile(base.add(i)) };
            let _ = self.rx.enqueue(byte);
        }

        // Hand the bank back so the host can send more.
        regs.deveptidr[EP_CDC_OUT].write(EndpointControl::FIFOCON::SET);
    }

    /// Bytes waiting in the CDC RX queue.
    pub fn cdc_available(&self) -> usize {
        self.rx.len()
    }

    /// Pop one byte of host data.
    pub fn cdc_read(&mut self) -> Option<u8> {
        self.rx.dequeue()
    }

    /// Ship `data` to the host on the bulk IN endpoint, in 64-byte banks.
    pub fn cdc_write(&mut self, data: &[u8]) -> Result<(), UsbError> {
        if !self.is_configured() {
            return Err(UsbError::NotConfigured);
        }
        let regs = self.registers;

        for chunk in data.chunks(BULK_PACKET_SIZE) {
            if !support::spin_until(EP_FLAG_TIMEOUT_ITERS, || {
                regs.deveptisr[EP_CDC_IN].is_set(EndpointStatus::TXINI)
            }) {
                return Err(UsbError::Timeout);
            }
            fifo_write(EP_CDC_IN, chunk);
            regs.devepticr[EP_CDC_IN].write(EndpointStatus::TXINI::SET);
            regs.deveptidr[EP_CDC_IN].write(EndpointControl::FIFOCON::SET);
        }
        Ok(())
    }

    /// UTF-8 bytes verbatim; no newline translation on the USB side.
    pub fn cdc_write_string(&mut self, s: &str) -> Result<(), UsbError> {
        self.cdc_write(s.as_bytes())
    }

    /// Last line coding the host set.
    pub fn line_coding(&self) -> LineCoding {
        self.line_coding
    }
}

impl Default for UsbDevice {
    fn default() -> UsbDevice {
        UsbDevice::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{DeviceState, LineCoding, SetupPacket, UsbDevice};

    #[test]
    fn setup_packet_field_decoding() {
        // GET_DESCRIPTOR(device), wLength 64.
        let raw = [0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x40, 0x00];
        let setup = SetupPacket::from_bytes(&raw);
        assert_eq!(setup.request_type, 0x80);
        assert_eq!(setup.request, 0x06);
        assert_eq!(setup.value, 0x0100);
        assert_eq!(setup.index, 0);
        assert_eq!(setup.length, 64);
    }

    #[test]
    fn line_coding_round_trip() {
        let coding = LineCoding {
            dte_rate: 250_000,
            char_format: 2,
            parity_type: 1,
            data_bits: 7,
        };
        assert_eq!(LineCoding::decode(&coding.encode()), coding);

        let default = LineCoding::default_coding();
        assert_eq!(default.dte_rate, 115_200);
        assert_eq!(
            default.encode(),
            [0x00, 0xC2, 0x01, 0x00, 0, 0, 8]
        );
    }

    #[test]
    fn fresh_device_is_detached_and_unconfigured() {
        let dev = UsbDevice::new();
        assert_eq!(dev.state(), DeviceState::Detached);
        assert!(!dev.is_configured());
        assert_eq!(dev.cdc_available(), 0);
    }

    #[test]
    fn cdc_write_refused_until_configured() {
        let mut dev = UsbDevice::new();
        assert_eq!(
            dev.cdc_write(b"ping"),
            Err(super::UsbError::NotConfigured)
        );
    }
}
