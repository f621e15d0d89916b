//! Bit-addressed access over a [`Packet`]'s byte storage.
//!
//! Bit mode overlays the same backing vector as byte mode. [`Packet::enter_bit_mode`] puts the
//! bit cursor at the end of the current bytes and [`Packet::exit_bit_mode`] hands control back;
//! since bit writes only touch the tail of the vector, the byte cursor needs no adjustment.
//! Interleaving byte writes with bit writes before exiting bit mode is not supported and
//! produces whatever the overlapping writes leave behind.

use super::packet::Packet;
use crate::error::{constants, ProtocolError, Result};

const fn bit_masks() -> [u32; 33] {
    let mut masks = [0u32; 33];
    let mut i = 1;
    while i < 33 {
        masks[i] = if i == 32 { u32::MAX } else { (1 << i) - 1 };
        i += 1;
    }
    masks
}

static BIT_MASKS: [u32; 33] = bit_masks();

fn check_count(n: u32) -> Result<usize> {
    if (1..=32).contains(&n) {
        Ok(n as usize)
    } else {
        Err(ProtocolError::bad_encoding(constants::ERR_BIT_COUNT))
    }
}

impl Packet {
    /// Start bit-mode writes at the end of the current bytes.
    pub fn enter_bit_mode(&mut self) {
        self.bit_pos = self.data.len() * 8;
    }

    pub fn exit_bit_mode(&mut self) {}

    /// Bit cursor position.
    pub fn bit_position(&self) -> usize {
        self.bit_pos
    }

    /// Pack the low `n` bits of `value`, most significant first.
    pub fn write_bits(&mut self, n: u32, value: u32) -> Result<()> {
        let mut n = check_count(n)?;
        let mut byte_pos = self.bit_pos >> 3;
        let mut rem = 8 - (self.bit_pos & 7);
        self.bit_pos += n;

        if self.data.len() <= byte_pos {
            self.data.resize(byte_pos + 1, 0);
        }

        while n > rem {
            let mask = BIT_MASKS[rem] as u8;
            self.data[byte_pos] &= !mask;
            self.data[byte_pos] |= ((value >> (n - rem)) & BIT_MASKS[rem]) as u8;
            byte_pos += 1;
            n -= rem;
            rem = 8;
            if self.data.len() <= byte_pos {
                self.data.resize(byte_pos + 1, 0);
            }
        }

        if n == rem {
            let mask = BIT_MASKS[rem] as u8;
            self.data[byte_pos] &= !mask;
            self.data[byte_pos] |= (value & BIT_MASKS[rem]) as u8;
        } else {
            let shift = rem - n;
            self.data[byte_pos] &= !((BIT_MASKS[n] << shift) as u8);
            self.data[byte_pos] |= ((value & BIT_MASKS[n]) << shift) as u8;
        }
        Ok(())
    }

    /// Start bit-mode reads at the read cursor.
    pub fn start_bit_read(&mut self) {
        self.bit_pos = self.pos * 8;
    }

    /// Return to byte reads at the first whole byte after the bit cursor.
    pub fn finish_bit_read(&mut self) {
        self.pos = self.bit_pos.div_ceil(8).min(self.data.len());
    }

    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        let mut n = check_count(n)?;
        let end_byte = (self.bit_pos + n).div_ceil(8);
        if end_byte > self.data.len() {
            return Err(ProtocolError::OutOfData {
                needed: end_byte - (self.bit_pos >> 3),
                remaining: self.data.len().saturating_sub(self.bit_pos >> 3),
            });
        }

        let mut byte_pos = self.bit_pos >> 3;
        let mut rem = 8 - (self.bit_pos & 7);
        self.bit_pos += n;
        let mut value = 0u32;

        while n > rem {
            let bits = u32::from(self.data[byte_pos]) & BIT_MASKS[rem];
            value = value.wrapping_add(bits << (n - rem));
            byte_pos += 1;
            n -= rem;
            rem = 8;
        }

        let byte = u32::from(self.data[byte_pos]);
        if n == rem {
            value = value.wrapping_add(byte & BIT_MASKS[rem]);
        } else {
            value = value.wrapping_add((byte >> (rem - n)) & BIT_MASKS[n]);
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn thirty_bits_after_three_bytes() {
        let mut p = Packet::from_bytes(&[98, 0, 0]);
        p.enter_bit_mode();
        p.write_bits(30, 51_809_698).unwrap();
        p.exit_bit_mode();
        assert_eq!(p.as_bytes(), &[98, 0, 0, 12, 90, 54, 136]);
    }

    #[test]
    fn single_bits_fill_a_byte() {
        let mut p = Packet::new();
        p.enter_bit_mode();
        for bit in [1u32, 0, 1, 0, 1, 0, 1, 1] {
            p.write_bits(1, bit).unwrap();
        }
        assert_eq!(p.as_bytes(), &[0b1010_1011]);
    }

    #[test]
    fn full_word_spans_five_bytes() {
        let mut p = Packet::new();
        p.enter_bit_mode();
        p.write_bits(4, 0xF).unwrap();
        p.write_bits(32, 0x1234_5678).unwrap();
        assert_eq!(p.as_bytes(), &[0xF1, 0x23, 0x45, 0x67, 0x80]);

        p.start_bit_read();
        assert_eq!(p.read_bits(4).unwrap(), 0xF);
        assert_eq!(p.read_bits(32).unwrap(), 0x1234_5678);
        p.finish_bit_read();
        assert_eq!(p.remaining(), 0);
    }

    #[test]
    fn mixed_widths_read_back() {
        let mut p = Packet::new();
        p.enter_bit_mode();
        p.write_bits(30, 0x2ABC_DEF1 & 0x3FFF_FFFF).unwrap();
        for _ in 0..5 {
            p.write_bits(18, 0).unwrap();
        }
        p.write_bits(11, 2047).unwrap();
        p.exit_bit_mode();

        p.start_bit_read();
        assert_eq!(p.read_bits(30).unwrap(), 0x2ABC_DEF1 & 0x3FFF_FFFF);
        for _ in 0..5 {
            assert_eq!(p.read_bits(18).unwrap(), 0);
        }
        assert_eq!(p.read_bits(11).unwrap(), 2047);
        assert!(p.read_bits(8).is_err());
    }

    #[test]
    fn rejects_bad_counts() {
        let mut p = Packet::new();
        p.enter_bit_mode();
        assert!(p.write_bits(0, 1).is_err());
        assert!(p.write_bits(33, 1).is_err());
    }
}
