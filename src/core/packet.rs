//! # Packet
//!
//! Byte-array backed reader/writer for the game wire format.
//!
//! A [`Packet`] owns an expandable byte vector with an independent read cursor. Writes always
//! append to the end of the vector; reads consume from the cursor and fail with
//! [`ProtocolError::OutOfData`] when fewer bytes remain than requested.
//!
//! ## Integer variants
//! The client pairs every opcode with one of four historical encodings per integer width, so
//! each fixed-width accessor takes a [`Variant`]. With `b0` the most significant byte:
//!
//! | Width | Standard | Alt1 | Alt2 | Alt3 |
//! |---|---|---|---|---|
//! | 1 | `v` | `v + 128` | `-v` | `128 - v` |
//! | 2 | `[b0,b1]` | `[b1,b0]` | `[b0,b1+128]` | `[b1+128,b0]` |
//! | 3 | `[b0,b1,b2]` | `[b2,b1,b0]` | `[b1,b2,b0]` | `[b0,b2,b1]` |
//! | 4 | `[b0,b1,b2,b3]` | `[b3,b2,b1,b0]` | `[b2,b3,b0,b1]` | `[b1,b0,b3,b2]` |
//! | 8 | big-endian | little-endian | low half first, halves big-endian | high half first, halves little-endian |
//!
//! ## Size patching
//! Length-prefixed regions are written by reserving the size field, writing the payload, then
//! calling one of the `patch_size_*` methods with the payload length. The field is located by
//! counting backward from the current end of the buffer, so nothing else may be written between
//! the payload and the patch call.

use crate::error::{constants, ProtocolError, Result};
use crate::utils::rsa::RsaKeyPair;
use crate::utils::xtea;

/// Byte-order and value transform applied to a fixed-width integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Standard,
    Alt1,
    Alt2,
    Alt3,
}

impl Variant {
    /// All four variants, in wire-table order.
    pub const ALL: [Variant; 4] = [
        Variant::Standard,
        Variant::Alt1,
        Variant::Alt2,
        Variant::Alt3,
    ];
}

/// Largest value a smart integer can carry.
pub const SMART_MAX: u16 = 0x7FFF;

/// Signed smart range.
pub const SIGNED_SMART_MIN: i16 = -16384;
pub const SIGNED_SMART_MAX: i16 = 16383;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    pub(crate) data: Vec<u8>,
    pub(crate) pos: usize,
    pub(crate) bit_pos: usize,
}

impl Packet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            pos: 0,
            bit_pos: 0,
        }
    }

    /// Create a packet for reading over a copy of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::from_vec(bytes.to_vec())
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            data,
            pos: 0,
            bit_pos: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read cursor position.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    /// Bytes left between the read cursor and the end of the buffer.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.pos = 0;
        self.bit_pos = 0;
    }

    fn take(&mut self, n: usize) -> Result<&[u8]> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(ProtocolError::OutOfData {
                needed: n,
                remaining,
            });
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.data[start..start + n])
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Look at the next byte without consuming it.
    pub fn peek_u8(&self) -> Result<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or(ProtocolError::OutOfData {
                needed: 1,
                remaining: 0,
            })
    }

    // ------------------------------------------------------------------
    // Fixed-width readers
    // ------------------------------------------------------------------

    pub fn read_u8(&mut self) -> Result<u8> {
        self.read_u8_as(Variant::Standard)
    }

    pub fn read_u8_as(&mut self, variant: Variant) -> Result<u8> {
        let [b] = self.take_array::<1>()?;
        Ok(match variant {
            Variant::Standard => b,
            Variant::Alt1 => b.wrapping_sub(128),
            Variant::Alt2 => 0u8.wrapping_sub(b),
            Variant::Alt3 => 128u8.wrapping_sub(b),
        })
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_i8_as(&mut self, variant: Variant) -> Result<i8> {
        Ok(self.read_u8_as(variant)? as i8)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_u16_as(Variant::Standard)
    }

    pub fn read_u16_as(&mut self, variant: Variant) -> Result<u16> {
        let [x, y] = self.take_array::<2>()?;
        let (hi, lo) = match variant {
            Variant::Standard => (x, y),
            Variant::Alt1 => (y, x),
            Variant::Alt2 => (x, y.wrapping_sub(128)),
            Variant::Alt3 => (y, x.wrapping_sub(128)),
        };
        Ok(u16::from_be_bytes([hi, lo]))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_i16_as(&mut self, variant: Variant) -> Result<i16> {
        Ok(self.read_u16_as(variant)? as i16)
    }

    pub fn read_u24(&mut self) -> Result<u32> {
        self.read_u24_as(Variant::Standard)
    }

    pub fn read_u24_as(&mut self, variant: Variant) -> Result<u32> {
        let [x, y, z] = self.take_array::<3>()?;
        let [b0, b1, b2] = match variant {
            Variant::Standard => [x, y, z],
            Variant::Alt1 => [z, y, x],
            Variant::Alt2 => [z, x, y],
            Variant::Alt3 => [x, z, y],
        };
        Ok(u32::from_be_bytes([0, b0, b1, b2]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_u32_as(Variant::Standard)
    }

    pub fn read_u32_as(&mut self, variant: Variant) -> Result<u32> {
        let [w, x, y, z] = self.take_array::<4>()?;
        let bytes = match variant {
            Variant::Standard => [w, x, y, z],
            Variant::Alt1 => [z, y, x, w],
            Variant::Alt2 => [y, z, w, x],
            Variant::Alt3 => [x, w, z, y],
        };
        Ok(u32::from_be_bytes(bytes))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_i32_as(&mut self, variant: Variant) -> Result<i32> {
        Ok(self.read_u32_as(variant)? as i32)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.read_u64_as(Variant::Standard)
    }

    pub fn read_u64_as(&mut self, variant: Variant) -> Result<u64> {
        let raw = self.take_array::<8>()?;
        Ok(match variant {
            Variant::Standard => u64::from_be_bytes(raw),
            Variant::Alt1 => u64::from_le_bytes(raw),
            Variant::Alt2 => {
                let lo = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
                let hi = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]);
                (u64::from(hi) << 32) | u64::from(lo)
            }
            Variant::Alt3 => {
                let hi = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
                let lo = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);
                (u64::from(hi) << 32) | u64::from(lo)
            }
        })
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.read_u64()? as i64)
    }

    /// Read `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        Ok(self.take(n)?.to_vec())
    }

    /// Read `n` raw bytes, stored in reverse order on the wire.
    pub fn read_bytes_reversed(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut out = self.take(n)?.to_vec();
        out.reverse();
        Ok(out)
    }

    /// Carve the next `n` bytes into an independent packet.
    pub fn read_packet(&mut self, n: usize) -> Result<Packet> {
        Ok(Packet::from_bytes(self.take(n)?))
    }

    /// Carve every remaining byte into an independent packet.
    pub fn remaining_packet(&mut self) -> Packet {
        let rest = self.data[self.pos..].to_vec();
        self.pos = self.data.len();
        Packet::from_vec(rest)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    // ------------------------------------------------------------------
    // Fixed-width writers
    // ------------------------------------------------------------------

    pub fn write_u8(&mut self, value: u8) {
        self.write_u8_as(value, Variant::Standard);
    }

    pub fn write_u8_as(&mut self, value: u8, variant: Variant) {
        self.data.push(match variant {
            Variant::Standard => value,
            Variant::Alt1 => value.wrapping_add(128),
            Variant::Alt2 => 0u8.wrapping_sub(value),
            Variant::Alt3 => 128u8.wrapping_sub(value),
        });
    }

    pub fn write_i8(&mut self, value: i8) {
        self.write_u8(value as u8);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_u16_as(value, Variant::Standard);
    }

    pub fn write_u16_as(&mut self, value: u16, variant: Variant) {
        let [hi, lo] = value.to_be_bytes();
        let bytes = match variant {
            Variant::Standard => [hi, lo],
            Variant::Alt1 => [lo, hi],
            Variant::Alt2 => [hi, lo.wrapping_add(128)],
            Variant::Alt3 => [lo.wrapping_add(128), hi],
        };
        self.data.extend_from_slice(&bytes);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.write_u16(value as u16);
    }

    /// Write the low 24 bits of `value`.
    pub fn write_u24(&mut self, value: u32) {
        self.write_u24_as(value, Variant::Standard);
    }

    pub fn write_u24_as(&mut self, value: u32, variant: Variant) {
        let [_, b0, b1, b2] = value.to_be_bytes();
        let bytes = match variant {
            Variant::Standard => [b0, b1, b2],
            Variant::Alt1 => [b2, b1, b0],
            Variant::Alt2 => [b1, b2, b0],
            Variant::Alt3 => [b0, b2, b1],
        };
        self.data.extend_from_slice(&bytes);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_u32_as(value, Variant::Standard);
    }

    pub fn write_u32_as(&mut self, value: u32, variant: Variant) {
        let [b0, b1, b2, b3] = value.to_be_bytes();
        let bytes = match variant {
            Variant::Standard => [b0, b1, b2, b3],
            Variant::Alt1 => [b3, b2, b1, b0],
            Variant::Alt2 => [b2, b3, b0, b1],
            Variant::Alt3 => [b1, b0, b3, b2],
        };
        self.data.extend_from_slice(&bytes);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_u32(value as u32);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write_u64_as(value, Variant::Standard);
    }

    pub fn write_u64_as(&mut self, value: u64, variant: Variant) {
        let hi = (value >> 32) as u32;
        let lo = value as u32;
        match variant {
            Variant::Standard => self.data.extend_from_slice(&value.to_be_bytes()),
            Variant::Alt1 => self.data.extend_from_slice(&value.to_le_bytes()),
            Variant::Alt2 => {
                self.data.extend_from_slice(&lo.to_be_bytes());
                self.data.extend_from_slice(&hi.to_be_bytes());
            }
            Variant::Alt3 => {
                self.data.extend_from_slice(&hi.to_le_bytes());
                self.data.extend_from_slice(&lo.to_le_bytes());
            }
        }
    }

    pub fn write_i64(&mut self, value: i64) {
        self.write_u64(value as u64);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn write_bytes_reversed(&mut self, bytes: &[u8]) {
        self.data.extend(bytes.iter().rev());
    }

    // ------------------------------------------------------------------
    // Variable-width integers
    // ------------------------------------------------------------------

    /// Unsigned smart: one byte below 128, otherwise two bytes offset by `0x8000`.
    pub fn read_smart(&mut self) -> Result<u16> {
        if self.peek_u8()? >= 128 {
            Ok(self.read_u16()? - 0x8000)
        } else {
            Ok(u16::from(self.read_u8()?))
        }
    }

    pub fn write_smart(&mut self, value: u16) -> Result<()> {
        match value {
            0..=127 => self.write_u8(value as u8),
            128..=SMART_MAX => self.write_u16(value + 0x8000),
            _ => return Err(ProtocolError::bad_encoding(constants::ERR_SMART_RANGE)),
        }
        Ok(())
    }

    /// Signed smart: one byte biased by `0x40`, or two bytes biased by `0xC000`.
    pub fn read_smart_signed(&mut self) -> Result<i16> {
        if self.peek_u8()? >= 128 {
            Ok((i32::from(self.read_u16()?) - 0xC000) as i16)
        } else {
            Ok(i16::from(self.read_u8()?) - 64)
        }
    }

    pub fn write_smart_signed(&mut self, value: i16) -> Result<()> {
        match value {
            -64..=63 => self.write_u8((value + 64) as u8),
            SIGNED_SMART_MIN..=SIGNED_SMART_MAX => {
                self.write_u16((i32::from(value) + 0xC000) as u16)
            }
            _ => return Err(ProtocolError::bad_encoding(constants::ERR_SMART_RANGE)),
        }
        Ok(())
    }

    /// Sum of consecutive smarts, continuing while a chunk equals `0x7FFF`.
    pub fn read_extended_smart(&mut self) -> Result<u32> {
        let mut total = 0u32;
        let mut next = self.read_smart()?;
        while next == SMART_MAX {
            total = total.wrapping_add(u32::from(SMART_MAX));
            next = self.read_smart()?;
        }
        Ok(total.wrapping_add(u32::from(next)))
    }

    /// 7-bit groups, most significant first, high bit set on every byte but the last.
    pub fn read_var_u32(&mut self) -> Result<u32> {
        let mut value = 0u32;
        let mut byte = self.read_u8()?;
        let mut groups = 1;
        while byte & 0x80 != 0 {
            if groups == 5 {
                return Err(ProtocolError::bad_encoding(constants::ERR_VARINT));
            }
            value = (value | u32::from(byte & 0x7F)) << 7;
            byte = self.read_u8()?;
            groups += 1;
        }
        Ok(value | u32::from(byte))
    }

    pub fn write_var_u32(&mut self, value: u32) {
        for shift in [28u32, 21, 14, 7] {
            if value >> shift != 0 {
                self.write_u8(((value >> shift) as u8) | 0x80);
            }
        }
        self.write_u8((value & 0x7F) as u8);
    }

    /// Big-endian unsigned integer of `width` bytes, `width` in `[1, 8]`.
    pub fn read_uint_sized(&mut self, width: usize) -> Result<u64> {
        if !(1..=8).contains(&width) {
            return Err(ProtocolError::bad_encoding(constants::ERR_SIZE_RANGE));
        }
        Ok(self
            .take(width)?
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }

    pub fn write_uint_sized(&mut self, width: usize, value: u64) -> Result<()> {
        if !(1..=8).contains(&width) {
            return Err(ProtocolError::bad_encoding(constants::ERR_SIZE_RANGE));
        }
        self.data
            .extend_from_slice(&value.to_be_bytes()[8 - width..]);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Strings
    // ------------------------------------------------------------------

    /// NUL-terminated string, one byte per character.
    pub fn read_cstr(&mut self) -> Result<String> {
        let rest = &self.data[self.pos.min(self.data.len())..];
        let Some(end) = rest.iter().position(|b| *b == 0) else {
            return Err(ProtocolError::OutOfData {
                needed: rest.len() + 1,
                remaining: rest.len(),
            });
        };
        let text = rest[..end].iter().map(|b| char::from(*b)).collect();
        self.pos += end + 1;
        Ok(text)
    }

    /// String preceded by a zero version marker.
    pub fn read_versioned_str(&mut self) -> Result<String> {
        if self.read_u8()? != 0 {
            return Err(ProtocolError::bad_encoding(constants::ERR_STRING_VERSION));
        }
        self.read_cstr()
    }

    /// Empty when the next byte is a bare terminator, otherwise a regular string.
    pub fn read_fast_cstr(&mut self) -> Result<String> {
        if self.peek_u8()? == 0 {
            self.pos += 1;
            return Ok(String::new());
        }
        self.read_cstr()
    }

    /// Characters outside Latin-1 are written as `?`.
    pub fn write_cstr(&mut self, text: &str) -> Result<()> {
        if text.contains('\0') {
            return Err(ProtocolError::bad_encoding(constants::ERR_STRING_NUL));
        }
        self.data
            .extend(text.chars().map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?')));
        self.data.push(0);
        Ok(())
    }

    pub fn write_versioned_str(&mut self, text: &str) -> Result<()> {
        self.write_u8(0);
        self.write_cstr(text)
    }

    // ------------------------------------------------------------------
    // Size patching
    // ------------------------------------------------------------------

    fn patch_position(&self, length: usize, width: usize) -> Result<usize> {
        self.data
            .len()
            .checked_sub(length + width)
            .ok_or_else(|| ProtocolError::bad_encoding(constants::ERR_SIZE_PATCH))
    }

    /// Overwrite the one-byte size field that precedes the last `length` bytes.
    pub fn patch_size_u8(&mut self, length: usize) -> Result<()> {
        let at = self.patch_position(length, 1)?;
        let value =
            u8::try_from(length).map_err(|_| ProtocolError::bad_encoding(constants::ERR_SIZE_RANGE))?;
        self.data[at] = value;
        Ok(())
    }

    /// Overwrite the two-byte size field that precedes the last `length` bytes.
    pub fn patch_size_u16(&mut self, length: usize) -> Result<()> {
        let at = self.patch_position(length, 2)?;
        let value = u16::try_from(length)
            .map_err(|_| ProtocolError::bad_encoding(constants::ERR_SIZE_RANGE))?;
        self.data[at..at + 2].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    /// Overwrite the four-byte size field that precedes the last `length` bytes.
    pub fn patch_size_u32(&mut self, length: usize) -> Result<()> {
        let at = self.patch_position(length, 4)?;
        let value = u32::try_from(length)
            .map_err(|_| ProtocolError::bad_encoding(constants::ERR_SIZE_RANGE))?;
        self.data[at..at + 4].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    // ------------------------------------------------------------------
    // Checksums and ciphers
    // ------------------------------------------------------------------

    /// Append the CRC32 of everything from `offset` to the end, returning the checksum.
    pub fn append_crc(&mut self, offset: usize) -> Result<u32> {
        let region = self.data.get(offset..).ok_or(ProtocolError::OutOfData {
            needed: offset,
            remaining: self.data.len(),
        })?;
        let checksum = crc32fast::hash(region);
        self.write_u32(checksum);
        Ok(checksum)
    }

    /// Check that the trailing four bytes hold the CRC32 of the bytes before them.
    pub fn verify_crc(&self) -> bool {
        let Some(split) = self.data.len().checked_sub(4) else {
            return false;
        };
        let (body, trailer) = self.data.split_at(split);
        let expected = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        crc32fast::hash(body) == expected
    }

    fn cipher_region(&mut self, offset: usize, length: usize) -> Result<&mut [u8]> {
        let len = self.data.len();
        if offset > length || length > len {
            return Err(ProtocolError::OutOfData {
                needed: length,
                remaining: len,
            });
        }
        Ok(&mut self.data[offset..length])
    }

    /// XTEA-decrypt `(length - offset) / 8` blocks in place, starting at `offset`.
    pub fn xtea_decrypt(&mut self, key: &[u32; 4], offset: usize, length: usize) -> Result<()> {
        xtea::decrypt(self.cipher_region(offset, length)?, key);
        Ok(())
    }

    /// XTEA-encrypt `(length - offset) / 8` blocks in place, starting at `offset`.
    pub fn xtea_encrypt(&mut self, key: &[u32; 4], offset: usize, length: usize) -> Result<()> {
        xtea::encrypt(self.cipher_region(offset, length)?, key);
        Ok(())
    }

    /// Read a length-prefixed RSA block and decrypt it into a new packet.
    pub fn rsa_decrypt(&mut self, key: &RsaKeyPair) -> Result<Packet> {
        let length = usize::from(self.read_u8()?);
        let ciphertext = self.take(length)?.to_vec();
        Ok(Packet::from_vec(key.decrypt(&ciphertext)?))
    }

    /// Replace the contents with the RSA-encrypted form `[len][ciphertext]`.
    pub fn rsa_encrypt(&mut self, key: &RsaKeyPair) -> Result<()> {
        let ciphertext = key.encrypt(&self.data)?;
        let length = u8::try_from(ciphertext.len())
            .map_err(|_| ProtocolError::bad_encoding(constants::ERR_SIZE_RANGE))?;
        self.clear();
        self.write_u8(length);
        self.write_bytes(&ciphertext);
        Ok(())
    }
}

impl From<Vec<u8>> for Packet {
    fn from(data: Vec<u8>) -> Self {
        Packet::from_vec(data)
    }
}

impl AsRef<[u8]> for Packet {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
