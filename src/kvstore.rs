// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Persistent key/value storage in one reserved flash page.
//!
//! A single 256-byte page (the last page of flash bank 1, address
//! `0x000F_FF00`) holds a versioned, CRC-protected blob of typed entries:
//!
//! ```text
//! offset 0   magic "EEKV" (0x4545_4B56 LE)
//!        4   format version (1)
//!        8   payload length
//!       12   CRC-32 of the payload
//!       16   entries: {key_len u8, type_tag u8, value_len u16 LE, key, value}
//!        …   0xFF padding
//! ```
//!
//! Erased flash (all `0xFF`) reads as an empty store. Every mutation
//! rewrites the whole page through the EEFC erase-and-write-page command, so
//! keys are unique and last-write-wins by construction.
//!
//! The flash itself sits behind the small [`PageController`] trait so the
//! codec and store logic run against plain RAM in unit tests. The
//! collaborating linker script must keep firmware out of the reserved page;
//! note that re-flashing the firmware erases it.

use crc::{Crc, CRC_32_ISO_HDLC};

use crate::eefc::{Eefc, FlashError, FLASH_PAGE_SIZE};
use crate::support;

/// Size of the reserved page.
pub const PAGE_SIZE: usize = FLASH_PAGE_SIZE;
/// Bytes available to entries once the header is paid for.
pub const PAYLOAD_CAPACITY: usize = PAGE_SIZE - HEADER_LEN;

/// Address of the reserved page (bank 1, page 1023).
pub const RESERVED_PAGE_ADDR: usize = 0x000F_FF00;
/// The same page as a bank-1-relative page index for EEFC1 commands.
pub const RESERVED_PAGE_INDEX: u16 = 1023;

const HEADER_LEN: usize = 16;
const MAGIC: u32 = 0x4545_4B56; // "EEKV"
const FORMAT_VERSION: u32 = 1;
const ENTRY_OVERHEAD: usize = 4;

const FRDY_WAIT_ITERS: u32 = 5_000_000;
const PROGRAM_WAIT_ITERS: u32 = 20_000_000;

/// Reflected IEEE CRC-32, init and xorout 0xFFFFFFFF.
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Value type carried by each entry.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum TypeTag {
    Raw = 1,
    Utf8 = 2,
    U32 = 3,
    Bool = 4,
}

impl TypeTag {
    fn from_u8(v: u8) -> Option<TypeTag> {
        match v {
            1 => Some(TypeTag::Raw),
            2 => Some(TypeTag::Utf8),
            3 => Some(TypeTag::U32),
            4 => Some(TypeTag::Bool),
            _ => None,
        }
    }
}

/// Everything that can go wrong with the store.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum KvError {
    /// The page is erased or holds a zero-length payload.
    Empty,
    /// The page holds something, but not our format.
    BadMagic,
    /// Ours, but a format revision we do not understand.
    UnsupportedVersion,
    /// Header fields are self-inconsistent.
    CorruptHeader,
    /// An entry overruns the payload or carries an unknown tag.
    CorruptPayload,
    /// Payload bytes do not match the stored CRC.
    CrcMismatch,
    KeyNotFound,
    /// The entry exists with a different type tag or width.
    TypeMismatch,
    /// Stored bytes are not well-formed UTF-8.
    InvalidUtf8,
    /// Key is empty, too long, or uses characters outside `[A-Za-z0-9._-]`.
    InvalidKey,
    /// Value longer than the format can express.
    ValueTooLarge,
    /// Caller's output buffer cannot hold the stored value.
    BufferTooSmall,
    /// The new payload would overflow the page by `missing` bytes.
    NoRoom { missing: usize },
    /// The EEFC reported a programming failure.
    Flash(FlashError),
}

fn validate_key(key: &str) -> Result<(), KvError> {
    let bytes = key.as_bytes();
    if bytes.is_empty() || bytes.len() > 255 {
        return Err(KvError::InvalidKey);
    }
    for &b in bytes {
        let ok = b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-';
        if !ok {
            return Err(KvError::InvalidKey);
        }
    }
    Ok(())
}

fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Validate the header and CRC, returning the payload slice. An erased page
/// or a zero-length payload is [`KvError::Empty`].
fn parse_page(page: &[u8; PAGE_SIZE]) -> Result<&[u8], KvError> {
    let magic = read_u32_le(&page[0..4]);
    if magic == 0xFFFF_FFFF {
        return Err(KvError::Empty);
    }
    if magic != MAGIC {
        return Err(KvError::BadMagic);
    }
    if read_u32_le(&page[4..8]) != FORMAT_VERSION {
        return Err(KvError::UnsupportedVersion);
    }
    let len = read_u32_le(&page[8..12]) as usize;
    if len > PAYLOAD_CAPACITY {
        return Err(KvError::CorruptHeader);
    }
    let payload = &page[HEADER_LEN..HEADER_LEN + len];
    if CRC32.checksum(payload) != read_u32_le(&page[12..16]) {
        return Err(KvError::CrcMismatch);
    }
    if payload.is_empty() {
        return Err(KvError::Empty);
    }
    Ok(payload)
}

/// Walk the payload for `key`.
fn find_entry<'a>(payload: &'a [u8], key: &[u8]) -> Result<(TypeTag, &'a [u8]), KvError> {
    let mut off = 0;
    while off < payload.len() {
        if off + ENTRY_OVERHEAD > payload.len() {
            return Err(KvError::CorruptPayload);
        }
        let key_len = payload[off] as usize;
        let raw_tag = payload[off + 1];
        let value_len = u16::from_le_bytes([payload[off + 2], payload[off + 3]]) as usize;
        let key_start = off + ENTRY_OVERHEAD;
        let value_start = key_start + key_len;
        let end = value_start + value_len;
        if key_len == 0 || end > payload.len() {
            return Err(KvError::CorruptPayload);
        }
        if &payload[key_start..value_start] == key {
            let tag = TypeTag::from_u8(raw_tag).ok_or(KvError::CorruptPayload)?;
            return Ok((tag, &payload[value_start..end]));
        }
        off = end;
    }
    Err(KvError::KeyNotFound)
}

/// Remove `key` from the working payload, compacting in place. Returns the
/// new length and whether anything was removed.
fn remove_entry(buf: &mut [u8], len: usize, key: &[u8]) -> Result<(usize, bool), KvError> {
    let mut off = 0;
    while off < len {
        if off + ENTRY_OVERHEAD > len {
            return Err(KvError::CorruptPayload);
        }
        let key_len = buf[off] as usize;
        let value_len = u16::from_le_bytes([buf[off + 2], buf[off + 3]]) as usize;
        let key_start = off + ENTRY_OVERHEAD;
        let end = key_start + key_len + value_len;
        if key_len == 0 || end > len {
            return Err(KvError::CorruptPayload);
        }
        if &buf[key_start..key_start + key_len] == key {
            buf.copy_within(end..len, off);
            return Ok((len - (end - off), true));
        }
        off = end;
    }
    Ok((len, false))
}

/// Append an entry, reporting by how many bytes the page would overflow.
fn append_entry(
    buf: &mut [u8],
    len: usize,
    key: &[u8],
    tag: TypeTag,
    value: &[u8],
) -> Result<usize, KvError> {
    let needed = ENTRY_OVERHEAD + key.len() + value.len();
    if len + needed > PAYLOAD_CAPACITY {
        return Err(KvError::NoRoom {
            missing: len + needed - PAYLOAD_CAPACITY,
        });
    }
    buf[len] = key.len() as u8;
    buf[len + 1] = tag as u8;
    buf[len + 2..len + 4].copy_from_slice(&(value.len() as u16).to_le_bytes());
    buf[len + 4..len + 4 + key.len()].copy_from_slice(key);
    buf[len + 4 + key.len()..len + needed].copy_from_slice(value);
    Ok(len + needed)
}

/// Assemble the full page image for a payload: header, payload, 0xFF fill.
fn build_page_image(payload: &[u8]) -> [u8; PAGE_SIZE] {
    let mut image = [0xFFu8; PAGE_SIZE];
    image[0..4].copy_from_slice(&MAGIC.to_le_bytes());
    image[4..8].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    image[8..12].copy_from_slice(&(payload.len() as u32).to_le_bytes());
    image[12..16].copy_from_slice(&CRC32.checksum(payload).to_le_bytes());
    image[HEADER_LEN..HEADER_LEN + payload.len()].copy_from_slice(payload);
    image
}

/// The physical page the store lives on. Split out as a trait so the store
/// logic is exercised against RAM in tests.
pub trait PageController {
    fn read_page(&self, page: &mut [u8; PAGE_SIZE]);
    fn program_page(&mut self, image: &[u8; PAGE_SIZE]) -> Result<(), FlashError>;
}

/// The reserved page in flash bank 1, programmed through EEFC1.
pub struct ReservedPage {
    eefc: Eefc,
}

impl ReservedPage {
    pub const fn new() -> ReservedPage {
        ReservedPage {
            eefc: Eefc::eefc1(),
        }
    }
}

impl Default for ReservedPage {
    fn default() -> ReservedPage {
        ReservedPage::new()
    }
}

impl PageController for ReservedPage {
    fn read_page(&self, page: &mut [u8; PAGE_SIZE]) {
        for word in 0..PAGE_SIZE / 4 {
            let value = unsafe { support::read32(RESERVED_PAGE_ADDR + 4 * word) };
            page[4 * word..4 * word + 4].copy_from_slice(&value.to_le_bytes());
        }
    }

    fn program_page(&mut self, image: &[u8; PAGE_SIZE]) -> Result<(), FlashError> {
        if !self.eefc.wait_ready(FRDY_WAIT_ITERS) {
            return Err(FlashError::Timeout);
        }

        // Stream the image into the write latch, which is mapped at the
        // page's own address, as little-endian words.
        for word in 0..PAGE_SIZE / 4 {
            let value = read_u32_le(&image[4 * word..4 * word + 4]);
            unsafe { support::write32(RESERVED_PAGE_ADDR + 4 * word, value) };
        }
        support::dsb();
        support::isb();

        self.eefc.erase_and_write_page(RESERVED_PAGE_INDEX);
        if !self.eefc.wait_ready(PROGRAM_WAIT_ITERS) {
            return Err(FlashError::Timeout);
        }
        self.eefc.command_result()
    }
}

/// The key/value store.
pub struct KvStore<C: PageController> {
    controller: C,
}

impl<C: PageController> KvStore<C> {
    pub const fn new(controller: C) -> KvStore<C> {
        KvStore { controller }
    }

    /// Copy the value stored under `key` into `out`. Returns the value
    /// length and its type tag.
    pub fn load(&mut self, key: &str, out: &mut [u8]) -> Result<(usize, TypeTag), KvError> {
        validate_key(key)?;
        let mut page = [0u8; PAGE_SIZE];
        self.controller.read_page(&mut page);
        let payload = parse_page(&page)?;
        let (tag, value) = find_entry(payload, key.as_bytes())?;
        if out.len() < value.len() {
            return Err(KvError::BufferTooSmall);
        }
        out[..value.len()].copy_from_slice(value);
        Ok((value.len(), tag))
    }

    /// Whether `key` currently resolves to a value.
    pub fn contains(&mut self, key: &str) -> bool {
        if validate_key(key).is_err() {
            return false;
        }
        let mut page = [0u8; PAGE_SIZE];
        self.controller.read_page(&mut page);
        match parse_page(&page) {
            Ok(payload) => find_entry(payload, key.as_bytes()).is_ok(),
            Err(_) => false,
        }
    }

    /// Store `value` under `key`, replacing any previous entry. An erased
    /// or foreign page is treated as an empty store; a corrupt one is
    /// reported rather than silently wiped.
    pub fn save(&mut self, key: &str, tag: TypeTag, value: &[u8]) -> Result<(), KvError> {
        validate_key(key)?;
        if value.len() > u16::MAX as usize {
            return Err(KvError::ValueTooLarge);
        }

        let mut work = [0u8; PAYLOAD_CAPACITY];
        let len = self.load_working_payload(&mut work)?;
        let (len, _) = remove_entry(&mut work, len, key.as_bytes())?;
        let len = append_entry(&mut work, len, key.as_bytes(), tag, value)?;
        self.write_payload(&work[..len])
    }

    /// Drop `key`. [`KvError::KeyNotFound`] when nothing changed.
    pub fn remove(&mut self, key: &str) -> Result<(), KvError> {
        validate_key(key)?;

        let mut work = [0u8; PAYLOAD_CAPACITY];
        let len = self.load_working_payload(&mut work)?;
        let (len, removed) = remove_entry(&mut work, len, key.as_bytes())?;
        if !removed {
            return Err(KvError::KeyNotFound);
        }
        self.write_payload(&work[..len])
    }

    /// Rewrite the page with an empty payload.
    pub fn remove_all(&mut self) -> Result<(), KvError> {
        self.write_payload(&[])
    }

    /// Alias for [`KvStore::remove_all`].
    pub fn clear(&mut self) -> Result<(), KvError> {
        self.remove_all()
    }

    // --- typed helpers ---

    pub fn save_raw(&mut self, key: &str, value: &[u8]) -> Result<(), KvError> {
        self.save(key, TypeTag::Raw, value)
    }

    pub fn save_str(&mut self, key: &str, value: &str) -> Result<(), KvError> {
        self.save(key, TypeTag::Utf8, value.as_bytes())
    }

    pub fn save_u32(&mut self, key: &str, value: u32) -> Result<(), KvError> {
        self.save(key, TypeTag::U32, &value.to_le_bytes())
    }

    pub fn save_bool(&mut self, key: &str, value: bool) -> Result<(), KvError> {
        self.save(key, TypeTag::Bool, &[value as u8])
    }

    pub fn load_u32(&mut self, key: &str) -> Result<u32, KvError> {
        validate_key(key)?;
        let mut page = [0u8; PAGE_SIZE];
        self.controller.read_page(&mut page);
        let (tag, value) = find_entry(parse_page(&page)?, key.as_bytes())?;
        if tag != TypeTag::U32 || value.len() != 4 {
            return Err(KvError::TypeMismatch);
        }
        Ok(read_u32_le(value))
    }

    pub fn load_bool(&mut self, key: &str) -> Result<bool, KvError> {
        validate_key(key)?;
        let mut page = [0u8; PAGE_SIZE];
        self.controller.read_page(&mut page);
        let (tag, value) = find_entry(parse_page(&page)?, key.as_bytes())?;
        if tag != TypeTag::Bool || value.len() != 1 {
            return Err(KvError::TypeMismatch);
        }
        Ok(value[0] != 0)
    }

    /// Decode the stored string into `out` and hand back the `&str` view.
    pub fn load_str<'a>(&mut self, key: &str, out: &'a mut [u8]) -> Result<&'a str, KvError> {
        let (len, tag) = self.load(key, out)?;
        if tag != TypeTag::Utf8 {
            return Err(KvError::TypeMismatch);
        }
        core::str::from_utf8(&out[..len]).map_err(|_| KvError::InvalidUtf8)
    }

    /// Read the current payload into `work` for a mutation. Empty and
    /// foreign pages start from scratch; corruption propagates.
    fn load_working_payload(&mut self, work: &mut [u8; PAYLOAD_CAPACITY]) -> Result<usize, KvError> {
        let mut page = [0u8; PAGE_SIZE];
        self.controller.read_page(&mut page);
        match parse_page(&page) {
            Ok(payload) => {
                work[..payload.len()].copy_from_slice(payload);
                Ok(payload.len())
            }
            Err(KvError::Empty) | Err(KvError::BadMagic) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write_payload(&mut self, payload: &[u8]) -> Result<(), KvError> {
        if payload.len() > PAYLOAD_CAPACITY {
            return Err(KvError::NoRoom {
                missing: payload.len() - PAYLOAD_CAPACITY,
            });
        }
        let image = build_page_image(payload);
        self.controller.program_page(&image).map_err(KvError::Flash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// RAM stand-in for the reserved page; starts erased.
    struct RamPage {
        page: [u8; PAGE_SIZE],
    }

    impl RamPage {
        fn erased() -> RamPage {
            RamPage {
                page: [0xFF; PAGE_SIZE],
            }
        }
    }

    impl PageController for RamPage {
        fn read_page(&self, page: &mut [u8; PAGE_SIZE]) {
            page.copy_from_slice(&self.page);
        }

        fn program_page(&mut self, image: &[u8; PAGE_SIZE]) -> Result<(), FlashError> {
            self.page.copy_from_slice(image);
            Ok(())
        }
    }

    fn fresh_store() -> KvStore<RamPage> {
        KvStore::new(RamPage::erased())
    }

    #[test]
    fn crc_known_vector() {
        assert_eq!(CRC32.checksum(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn erased_page_is_empty_not_bad_magic() {
        let mut store = fresh_store();
        let mut out = [0u8; 8];
        assert_eq!(store.load("time", &mut out), Err(KvError::Empty));
        assert!(!store.contains("time"));
    }

    #[test]
    fn save_then_load_round_trips() {
        let mut store = fresh_store();
        store.save_raw("blob", &[1, 2, 3, 4, 5]).unwrap();

        let mut out = [0u8; 16];
        let (len, tag) = store.load("blob", &mut out).unwrap();
        assert_eq!(tag, TypeTag::Raw);
        assert_eq!(&out[..len], &[1, 2, 3, 4, 5]);
        assert!(store.contains("blob"));
    }

    #[test]
    fn typed_round_trips() {
        let mut store = fresh_store();
        store.save_u32("time", 0x1234_5678).unwrap();
        store.save_bool("armed", true).unwrap();
        store.save_str("name", "due").unwrap();

        assert_eq!(store.load_u32("time"), Ok(0x1234_5678));
        assert_eq!(store.load_bool("armed"), Ok(true));
        let mut buf = [0u8; 16];
        assert_eq!(store.load_str("name", &mut buf), Ok("due"));
    }

    #[test]
    fn type_tag_is_checked() {
        let mut store = fresh_store();
        store.save_str("time", "noon").unwrap();
        assert_eq!(store.load_u32("time"), Err(KvError::TypeMismatch));
        assert_eq!(store.load_bool("time"), Err(KvError::TypeMismatch));
    }

    #[test]
    fn last_write_wins() {
        let mut store = fresh_store();
        store.save_u32("k", 1).unwrap();
        store.save_u32("k", 2).unwrap();
        assert_eq!(store.load_u32("k"), Ok(2));

        // Replacing does not leak the old entry's space.
        let mut page = [0u8; PAGE_SIZE];
        store.controller.read_page(&mut page);
        let len = u32::from_le_bytes([page[8], page[9], page[10], page[11]]) as usize;
        assert_eq!(len, ENTRY_OVERHEAD + 1 + 4);
    }

    #[test]
    fn multiple_keys_coexist() {
        let mut store = fresh_store();
        store.save_u32("a", 1).unwrap();
        store.save_u32("b", 2).unwrap();
        store.save_u32("c", 3).unwrap();
        assert_eq!(store.load_u32("a"), Ok(1));
        assert_eq!(store.load_u32("b"), Ok(2));
        assert_eq!(store.load_u32("c"), Ok(3));
    }

    #[test]
    fn remove_then_not_found() {
        let mut store = fresh_store();
        store.save_u32("a", 1).unwrap();
        store.save_u32("b", 2).unwrap();
        store.remove("a").unwrap();
        assert_eq!(store.load_u32("a"), Err(KvError::KeyNotFound));
        assert_eq!(store.load_u32("b"), Ok(2));
        assert_eq!(store.remove("a"), Err(KvError::KeyNotFound));
    }

    #[test]
    fn remove_all_empties_the_store() {
        let mut store = fresh_store();
        store.save_u32("time", 0x1234_5678).unwrap();
        store.remove_all().unwrap();
        assert_eq!(store.load_u32("time"), Err(KvError::Empty));
    }

    #[test]
    fn corrupting_the_crc_is_detected() {
        let mut store = fresh_store();
        store.save_u32("time", 42).unwrap();
        store.controller.page[12] ^= 0xA5;
        assert_eq!(store.load_u32("time"), Err(KvError::CrcMismatch));
    }

    #[test]
    fn corrupting_the_payload_is_detected() {
        let mut store = fresh_store();
        store.save_u32("time", 42).unwrap();
        store.controller.page[HEADER_LEN + 2] ^= 0x01;
        assert_eq!(store.load_u32("time"), Err(KvError::CrcMismatch));
    }

    #[test]
    fn foreign_magic_reports_bad_magic_but_save_recovers() {
        let mut store = fresh_store();
        store.controller.page[0..4].copy_from_slice(b"ELF\x7F");
        let mut out = [0u8; 4];
        assert_eq!(store.load("k", &mut out), Err(KvError::BadMagic));

        store.save_u32("k", 7).unwrap();
        assert_eq!(store.load_u32("k"), Ok(7));
    }

    #[test]
    fn unsupported_version_is_reported() {
        let mut store = fresh_store();
        store.save_u32("k", 7).unwrap();
        store.controller.page[4] = 2;
        assert_eq!(store.load_u32("k"), Err(KvError::UnsupportedVersion));
    }

    #[test]
    fn oversize_header_length_is_corrupt() {
        let mut store = fresh_store();
        store.save_u32("k", 7).unwrap();
        store.controller.page[8..12].copy_from_slice(&(PAYLOAD_CAPACITY as u32 + 1).to_le_bytes());
        assert_eq!(store.load_u32("k"), Err(KvError::CorruptHeader));
    }

    #[test]
    fn no_room_reports_the_overflow() {
        let mut store = fresh_store();
        let big = [0xABu8; 200];
        store.save_raw("a", &big).unwrap(); // 4 + 1 + 200 = 205 bytes

        let more = [0xCDu8; 100];
        // 205 + (4 + 1 + 100) = 310 > 240 by 70 bytes.
        assert_eq!(
            store.save_raw("b", &more),
            Err(KvError::NoRoom { missing: 70 })
        );
        // The original entry is untouched.
        let mut out = [0u8; 200];
        assert_eq!(store.load("a", &mut out), Ok((200, TypeTag::Raw)));
    }

    #[test]
    fn key_charset_is_enforced() {
        let mut store = fresh_store();
        assert_eq!(store.save_u32("", 0), Err(KvError::InvalidKey));
        assert_eq!(store.save_u32("has space", 0), Err(KvError::InvalidKey));
        assert_eq!(store.save_u32("tab\t", 0), Err(KvError::InvalidKey));
        assert!(store.save_u32("Ok_key-1.x", 0).is_ok());
    }

    #[test]
    fn invalid_utf8_is_rejected_on_string_load() {
        let mut store = fresh_store();
        store.save("s", TypeTag::Utf8, &[0xFF, 0xFE, 0x01]).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(store.load_str("s", &mut buf), Err(KvError::InvalidUtf8));
    }

    #[test]
    fn load_into_small_buffer_is_reported() {
        let mut store = fresh_store();
        store.save_raw("blob", &[0u8; 16]).unwrap();
        let mut out = [0u8; 8];
        assert_eq!(store.load("blob", &mut out), Err(KvError::BufferTooSmall));
    }

    #[test]
    fn page_image_layout() {
        let payload = b"\x01\x03\x04\x00k\x78\x56\x34\x12";
        let image = build_page_image(payload);
        assert_eq!(&image[0..4], &MAGIC.to_le_bytes());
        assert_eq!(read_u32_le(&image[4..8]), FORMAT_VERSION);
        assert_eq!(read_u32_le(&image[8..12]) as usize, payload.len());
        assert_eq!(read_u32_le(&image[12..16]), CRC32.checksum(payload));
        assert_eq!(&image[HEADER_LEN..HEADER_LEN + payload.len()], payload);
        assert!(image[HEADER_LEN + payload.len()..].iter().all(|&b| b == 0xFF));
    }
}
