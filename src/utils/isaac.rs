//! ISAAC stream cipher used to perturb game-phase opcodes.
//!
//! Both ends of a connection seed a generator from the same four words exchanged in the login
//! block; the client adds each word to the opcode byte it sends and the server subtracts it.
//! Identically-seeded generators must produce identical sequences.

const SIZE: usize = 256;
const GOLDEN_RATIO: u32 = 0x9E37_79B9;

#[derive(Clone)]
pub struct IsaacRandom {
    count: usize,
    a: u32,
    b: u32,
    c: u32,
    mem: [u32; SIZE],
    rsl: [u32; SIZE],
}

impl std::fmt::Debug for IsaacRandom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsaacRandom")
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}

#[inline]
fn mix(s: &mut [u32; 8]) {
    s[0] ^= s[1] << 11;
    s[3] = s[3].wrapping_add(s[0]);
    s[1] = s[1].wrapping_add(s[2]);

    s[1] ^= s[2] >> 2;
    s[4] = s[4].wrapping_add(s[1]);
    s[2] = s[2].wrapping_add(s[3]);

    s[2] ^= s[3] << 8;
    s[5] = s[5].wrapping_add(s[2]);
    s[3] = s[3].wrapping_add(s[4]);

    s[3] ^= s[4] >> 16;
    s[6] = s[6].wrapping_add(s[3]);
    s[4] = s[4].wrapping_add(s[5]);

    s[4] ^= s[5] << 10;
    s[7] = s[7].wrapping_add(s[4]);
    s[5] = s[5].wrapping_add(s[6]);

    s[5] ^= s[6] >> 4;
    s[0] = s[0].wrapping_add(s[5]);
    s[6] = s[6].wrapping_add(s[7]);

    s[6] ^= s[7] << 8;
    s[1] = s[1].wrapping_add(s[6]);
    s[7] = s[7].wrapping_add(s[0]);

    s[7] ^= s[0] >> 9;
    s[2] = s[2].wrapping_add(s[7]);
    s[0] = s[0].wrapping_add(s[1]);
}

impl IsaacRandom {
    /// Seed a generator. Seed words beyond the table size are ignored; missing words are zero.
    pub fn new(seed: &[u32]) -> Self {
        let mut rsl = [0u32; SIZE];
        for (slot, word) in rsl.iter_mut().zip(seed) {
            *slot = *word;
        }
        let mut isaac = Self {
            count: 0,
            a: 0,
            b: 0,
            c: 0,
            mem: [0; SIZE],
            rsl,
        };
        isaac.init();
        isaac
    }

    fn init(&mut self) {
        let mut s = [GOLDEN_RATIO; 8];
        for _ in 0..4 {
            mix(&mut s);
        }

        for pass in 0..2 {
            for i in (0..SIZE).step_by(8) {
                let source = if pass == 0 { &self.rsl } else { &self.mem };
                for (j, word) in s.iter_mut().enumerate() {
                    *word = word.wrapping_add(source[i + j]);
                }
                mix(&mut s);
                self.mem[i..i + 8].copy_from_slice(&s);
            }
        }

        self.remix();
        self.count = SIZE;
    }

    fn remix(&mut self) {
        self.c = self.c.wrapping_add(1);
        self.b = self.b.wrapping_add(self.c);

        for i in 0..SIZE {
            let x = self.mem[i];
            self.a ^= match i & 3 {
                0 => self.a << 13,
                1 => self.a >> 6,
                2 => self.a << 2,
                _ => self.a >> 16,
            };
            self.a = self.a.wrapping_add(self.mem[(i + 128) & 0xFF]);

            let y = self.mem[((x >> 2) & 0xFF) as usize]
                .wrapping_add(self.a)
                .wrapping_add(self.b);
            self.mem[i] = y;
            self.b = self.mem[((y >> 10) & 0xFF) as usize].wrapping_add(x);
            self.rsl[i] = self.b;
        }
    }

    /// Produce the next word, remixing the table once every 256 words.
    pub fn next_u32(&mut self) -> u32 {
        if self.count == 0 {
            self.remix();
            self.count = SIZE - 1;
        } else {
            self.count -= 1;
        }
        self.rsl[self.count]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_seeds_agree() {
        let mut left = IsaacRandom::new(&[0x1234, 0x5678, 0x9ABC, 0xDEF0]);
        let mut right = IsaacRandom::new(&[0x1234, 0x5678, 0x9ABC, 0xDEF0]);
        for _ in 0..1000 {
            assert_eq!(left.next_u32(), right.next_u32());
        }
    }

    #[test]
    fn known_sequence() {
        let mut isaac = IsaacRandom::new(&[1, 2, 3, 4]);
        assert_eq!(isaac.next_u32(), 0xDAF8_863E);
        assert_eq!(isaac.next_u32(), 0x74A5_CB37);
        assert_eq!(isaac.next_u32(), 0xAFD4_ED73);
    }

    #[test]
    fn zero_seed_across_remix() {
        let mut isaac = IsaacRandom::new(&[0; 4]);
        let words: Vec<u32> = (0..600).map(|_| isaac.next_u32()).collect();
        assert_eq!(words[0], 0x1826_00F3);
        assert_eq!(words[255], 0xE76D_D339);
        assert_eq!(words[256], 0x7A68_710F);
        assert_eq!(words[599], 0x97CA_2070);
    }

    #[test]
    fn offset_seeds_diverge() {
        let mut inbound = IsaacRandom::new(&[10, 20, 30, 40]);
        let mut outbound = IsaacRandom::new(&[60, 70, 80, 90]);
        let same = (0..64)
            .filter(|_| inbound.next_u32() == outbound.next_u32())
            .count();
        assert!(same < 4);
    }
}
