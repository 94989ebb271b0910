// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! USB descriptor tables for the CDC-ACM serial function.
//!
//! Everything is assembled at build time as plain byte arrays, including the
//! configuration descriptor's `wTotalLength`, so enumeration never patches
//! bytes at runtime. The layout is one IAD-fronted CDC ACM function: a COMM
//! interface with the interrupt notification endpoint, and a DATA interface
//! with the bulk OUT/IN pair.

/// Arduino's VID and the Due native-port PID, which is what this board is.
pub const VENDOR_ID: u16 = 0x2341;
pub const PRODUCT_ID: u16 = 0x003E;

/// Control endpoint max packet size.
pub const EP0_SIZE: usize = 64;

/// CDC notification endpoint (interrupt IN, 8 bytes).
pub const EP_CDC_NOTIFY: usize = 1;
/// CDC data OUT endpoint (bulk, 64 bytes).
pub const EP_CDC_OUT: usize = 2;
/// CDC data IN endpoint (bulk, 64 bytes).
pub const EP_CDC_IN: usize = 3;

pub const BULK_PACKET_SIZE: usize = 64;

// Descriptor type codes (USB 2.0 table 9-5, IAD from the ECN).
pub const DESC_DEVICE: u8 = 1;
pub const DESC_CONFIGURATION: u8 = 2;
pub const DESC_STRING: u8 = 3;

/// Device descriptor: USB 2.00, IAD-capable class triple (EF/02/01), 64-byte
/// EP0, one configuration.
#[rustfmt::skip]
pub static DEVICE: [u8; 18] = [
    18,                         // bLength
    DESC_DEVICE,                // bDescriptorType
    0x00, 0x02,                 // bcdUSB 2.00
    0xEF,                       // bDeviceClass: miscellaneous
    0x02,                       // bDeviceSubClass: common class
    0x01,                       // bDeviceProtocol: IAD
    EP0_SIZE as u8,             // bMaxPacketSize0
    (VENDOR_ID & 0xFF) as u8, (VENDOR_ID >> 8) as u8,
    (PRODUCT_ID & 0xFF) as u8, (PRODUCT_ID >> 8) as u8,
    0x00, 0x01,                 // bcdDevice 1.00
    1,                          // iManufacturer
    2,                          // iProduct
    3,                          // iSerialNumber
    1,                          // bNumConfigurations
];

/// Total length of the configuration descriptor and everything it carries:
/// config 9 + IAD 8 + COMM interface 9 + header 5 + call mgmt 5 + ACM 4 +
/// union 5 + notify EP 7 + DATA interface 9 + two bulk EPs 14.
pub const CONFIG_TOTAL_LEN: usize = 9 + 8 + 9 + 5 + 5 + 4 + 5 + 7 + 9 + 7 + 7;

#[rustfmt::skip]
pub static CONFIGURATION: [u8; CONFIG_TOTAL_LEN] = [
    // Configuration
    9, DESC_CONFIGURATION,
    (CONFIG_TOTAL_LEN & 0xFF) as u8, (CONFIG_TOTAL_LEN >> 8) as u8, // wTotalLength
    2,                          // bNumInterfaces
    1,                          // bConfigurationValue
    0,                          // iConfiguration
    0xA0,                       // bmAttributes: bus powered, remote wakeup
    50,                         // bMaxPower: 100 mA

    // Interface Association: CDC ACM function over interfaces 0..2
    8, 0x0B,
    0,                          // bFirstInterface
    2,                          // bInterfaceCount
    0x02, 0x02, 0x01,           // function class/subclass/protocol
    0,                          // iFunction

    // Interface 0: CDC communication class, ACM, one notification endpoint
    9, 4,
    0,                          // bInterfaceNumber
    0,                          // bAlternateSetting
    1,                          // bNumEndpoints
    0x02, 0x02, 0x01,           // CDC / ACM / AT commands
    0,                          // iInterface

    // CDC Header functional descriptor, bcdCDC 1.10
    5, 0x24, 0x00, 0x10, 0x01,
    // CDC Call Management: handled by the device, over the data interface
    5, 0x24, 0x01, 0x01, 1,
    // CDC Abstract Control Management: line coding + serial state
    4, 0x24, 0x02, 0x06,
    // CDC Union: control interface 0, subordinate interface 1
    5, 0x24, 0x06, 0, 1,

    // Endpoint 1: interrupt IN, 8 bytes, interval 16
    7, 5, 0x80 | EP_CDC_NOTIFY as u8, 0x03, 8, 0, 16,

    // Interface 1: CDC data class, two bulk endpoints
    9, 4,
    1,                          // bInterfaceNumber
    0,                          // bAlternateSetting
    2,                          // bNumEndpoints
    0x0A, 0x00, 0x00,           // data class
    0,                          // iInterface

    // Endpoint 2: bulk OUT, 64 bytes
    7, 5, EP_CDC_OUT as u8, 0x02, BULK_PACKET_SIZE as u8, 0, 0,
    // Endpoint 3: bulk IN, 64 bytes
    7, 5, 0x80 | EP_CDC_IN as u8, 0x02, BULK_PACKET_SIZE as u8, 0, 0,
];

/// String 0: the language table. en-US only.
pub static STRING_LANGUAGE: [u8; 4] = [4, DESC_STRING, 0x09, 0x04];

/// String 1, UTF-16LE.
#[rustfmt::skip]
pub static STRING_MANUFACTURER: [u8; 24] = [
    24, DESC_STRING,
    b'A', 0, b'r', 0, b'd', 0, b'u', 0, b'i', 0, b'n', 0, b'o', 0, b' ', 0,
    b'L', 0, b'L', 0, b'C', 0,
];

/// String 2, UTF-16LE.
#[rustfmt::skip]
pub static STRING_PRODUCT: [u8; 24] = [
    24, DESC_STRING,
    b'A', 0, b'r', 0, b'd', 0, b'u', 0, b'i', 0, b'n', 0, b'o', 0, b' ', 0,
    b'D', 0, b'u', 0, b'e', 0,
];

/// String 3, UTF-16LE.
#[rustfmt::skip]
pub static STRING_SERIAL: [u8; 26] = [
    26, DESC_STRING,
    b'3', 0, b'X', 0, b'8', 0, b'E', 0, b'0', 0, b'0', 0, b'0', 0, b'0', 0,
    b'0', 0, b'0', 0, b'0', 0, b'1', 0,
];

/// Look up the descriptor for a `GET_DESCRIPTOR(type, index)` request.
pub fn descriptor(descriptor_type: u8, index: u8) -> Option<&'static [u8]> {
    match (descriptor_type, index) {
        (DESC_DEVICE, _) => Some(&DEVICE),
        (DESC_CONFIGURATION, _) => Some(&CONFIGURATION),
        (DESC_STRING, 0) => Some(&STRING_LANGUAGE),
        (DESC_STRING, 1) => Some(&STRING_MANUFACTURER),
        (DESC_STRING, 2) => Some(&STRING_PRODUCT),
        (DESC_STRING, 3) => Some(&STRING_SERIAL),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_descriptor_shape() {
        assert_eq!(DEVICE.len(), 18);
        assert_eq!(DEVICE[0] as usize, DEVICE.len());
        assert_eq!(DEVICE[1], DESC_DEVICE);
        // bcdUSB 2.00, IAD class triple, EP0 size.
        assert_eq!(&DEVICE[2..4], &[0x00, 0x02]);
        assert_eq!(&DEVICE[4..7], &[0xEF, 0x02, 0x01]);
        assert_eq!(DEVICE[7] as usize, EP0_SIZE);
        assert_eq!(
            u16::from_le_bytes([DEVICE[8], DEVICE[9]]),
            VENDOR_ID
        );
        assert_eq!(
            u16::from_le_bytes([DEVICE[10], DEVICE[11]]),
            PRODUCT_ID
        );
    }

    #[test]
    fn config_total_length_is_consistent() {
        assert_eq!(CONFIGURATION.len(), CONFIG_TOTAL_LEN);
        assert_eq!(
            u16::from_le_bytes([CONFIGURATION[2], CONFIGURATION[3]]) as usize,
            CONFIG_TOTAL_LEN
        );
    }

    #[test]
    fn config_sub_descriptor_lengths_tile_exactly() {
        // Walking bLength fields must land exactly on the end.
        let mut off = 0;
        while off < CONFIGURATION.len() {
            let len = CONFIGURATION[off] as usize;
            assert!(len >= 2);
            off += len;
        }
        assert_eq!(off, CONFIGURATION.len());
    }

    #[test]
    fn endpoint_addresses_match_the_driver() {
        // notification EP: IN | 1, interrupt, 8 bytes, interval 16
        let notify = &CONFIGURATION[9 + 8 + 9 + 5 + 5 + 4 + 5..][..7];
        assert_eq!(notify, &[7, 5, 0x81, 0x03, 8, 0, 16]);

        let data_out = &CONFIGURATION[CONFIG_TOTAL_LEN - 14..][..7];
        assert_eq!(data_out, &[7, 5, 0x02, 0x02, 64, 0, 0]);
        let data_in = &CONFIGURATION[CONFIG_TOTAL_LEN - 7..][..7];
        assert_eq!(data_in, &[7, 5, 0x83, 0x02, 64, 0, 0]);
    }

    #[test]
    fn string_descriptors_have_matching_length_bytes() {
        for s in [
            &STRING_LANGUAGE[..],
            &STRING_MANUFACTURER[..],
            &STRING_PRODUCT[..],
            &STRING_SERIAL[..],
        ] {
            assert_eq!(s[0] as usize, s.len());
            assert_eq!(s[1], DESC_STRING);
            assert_eq!(s.len() % 2, 0);
        }
    }

    #[test]
    fn lookup_covers_the_table_and_nothing_else() {
        assert!(descriptor(DESC_DEVICE, 0).is_some());
        assert!(descriptor(DESC_CONFIGURATION, 0).is_some());
        for i in 0..=3 {
            assert!(descriptor(DESC_STRING, i).is_some());
        }
        assert!(descriptor(DESC_STRING, 4).is_none());
        assert!(descriptor(6, 0).is_none()); // device qualifier
    }
}
