//! XTEA block cipher over big-endian words.
//!
//! Operates in place on whole 8-byte blocks; a trailing partial block is left untouched.

pub const XTEA_BLOCK_BYTES: usize = 8;
const XTEA_DELTA: u32 = 0x9E37_79B9;
const XTEA_ROUNDS: u32 = 32;
const XTEA_DECRYPT_SUM: u32 = 0xC6EF_3720;

#[inline]
fn feistel(v: u32) -> u32 {
    ((v << 4) ^ (v >> 5)).wrapping_add(v)
}

#[inline]
fn load(block: &[u8]) -> (u32, u32) {
    (
        u32::from_be_bytes([block[0], block[1], block[2], block[3]]),
        u32::from_be_bytes([block[4], block[5], block[6], block[7]]),
    )
}

#[inline]
fn store(block: &mut [u8], v0: u32, v1: u32) {
    block[..4].copy_from_slice(&v0.to_be_bytes());
    block[4..8].copy_from_slice(&v1.to_be_bytes());
}

pub fn decrypt(data: &mut [u8], key: &[u32; 4]) {
    for block in data.chunks_exact_mut(XTEA_BLOCK_BYTES) {
        let (mut v0, mut v1) = load(block);
        let mut sum = XTEA_DECRYPT_SUM;
        for _ in 0..XTEA_ROUNDS {
            v1 = v1.wrapping_sub(
                feistel(v0) ^ sum.wrapping_add(key[((sum >> 11) & 3) as usize]),
            );
            sum = sum.wrapping_sub(XTEA_DELTA);
            v0 = v0.wrapping_sub(feistel(v1) ^ sum.wrapping_add(key[(sum & 3) as usize]));
        }
        store(block, v0, v1);
    }
}

pub fn encrypt(data: &mut [u8], key: &[u32; 4]) {
    for block in data.chunks_exact_mut(XTEA_BLOCK_BYTES) {
        let (mut v0, mut v1) = load(block);
        let mut sum = 0u32;
        for _ in 0..XTEA_ROUNDS {
            v0 = v0.wrapping_add(feistel(v1) ^ sum.wrapping_add(key[(sum & 3) as usize]));
            sum = sum.wrapping_add(XTEA_DELTA);
            v1 = v1.wrapping_add(
                feistel(v0) ^ sum.wrapping_add(key[((sum >> 11) & 3) as usize]),
            );
        }
        store(block, v0, v1);
    }
}
