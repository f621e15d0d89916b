//! Raw, unpadded RSA used for the login block.
//!
//! The client encrypts the block with the server's public exponent and no padding scheme; the
//! server recovers it with a plain modular exponentiation. Ciphertexts arrive with the length
//! quirks of a signed big-integer encoder, which [`RsaKeyPair::decrypt`] normalises before
//! exponentiation.

use crate::error::{constants, ProtocolError, Result};
use num_bigint::BigUint;

/// Private exponent of the built-in login key.
pub const DEFAULT_PRIVATE_EXPONENT: &str = "571fb062048b61721ebfcf1e877153241b70c3aa26edb0f9f06a1b2be07c4e45eaba4fc356ea806cbed298d38613590a53fde0383c3a411758516293240925e5";

/// Modulus of the built-in login key.
pub const DEFAULT_MODULUS: &str = "0088c38748a58228f7261cdc340b5691d7d0975dee0ecdb717609e6bf971eb3fe723ef9d130e4686813739768ad9472eb46d8bfcc042c1a5fcb05e931f632eea5d";

/// Width the client's 512-bit ciphertexts are normalised to.
const BLOCK_BYTES: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaKeyPair {
    modulus: BigUint,
    private_exponent: BigUint,
    public_exponent: Option<BigUint>,
}

fn parse_hex(hex: &str) -> Result<BigUint> {
    BigUint::parse_bytes(hex.trim().as_bytes(), 16)
        .ok_or_else(|| ProtocolError::bad_encoding(constants::ERR_RSA_KEY))
}

impl RsaKeyPair {
    pub fn new(
        modulus: BigUint,
        private_exponent: BigUint,
        public_exponent: Option<BigUint>,
    ) -> Result<Self> {
        if modulus <= BigUint::from(1u8) {
            return Err(ProtocolError::bad_encoding(constants::ERR_RSA_KEY));
        }
        Ok(Self {
            modulus,
            private_exponent,
            public_exponent,
        })
    }

    /// Build a key from hexadecimal strings.
    pub fn from_hex(modulus: &str, private_exponent: &str, public_exponent: Option<&str>) -> Result<Self> {
        let public_exponent = public_exponent.map(parse_hex).transpose()?;
        Self::new(parse_hex(modulus)?, parse_hex(private_exponent)?, public_exponent)
    }

    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    /// Decrypt a raw ciphertext, returning the plaintext without leading zero bytes.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let normalized = normalize(ciphertext);
        let value = BigUint::from_bytes_be(&normalized);
        if value >= self.modulus {
            return Err(ProtocolError::bad_encoding(constants::ERR_RSA_RANGE));
        }
        let plain = value.modpow(&self.private_exponent, &self.modulus);
        Ok(strip_leading_zeros(plain.to_bytes_be()))
    }

    /// Encrypt with the public exponent; only available when the key carries one.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let exponent = self
            .public_exponent
            .as_ref()
            .ok_or_else(|| ProtocolError::bad_encoding(constants::ERR_RSA_KEY))?;
        let value = BigUint::from_bytes_be(plaintext);
        if value >= self.modulus {
            return Err(ProtocolError::bad_encoding(constants::ERR_RSA_RANGE));
        }
        Ok(strip_leading_zeros(
            value.modpow(exponent, &self.modulus).to_bytes_be(),
        ))
    }
}

impl Default for RsaKeyPair {
    fn default() -> Self {
        // The built-in constants are valid hex, so parsing cannot fail.
        let modulus = BigUint::parse_bytes(DEFAULT_MODULUS.as_bytes(), 16).unwrap_or_default();
        let private_exponent =
            BigUint::parse_bytes(DEFAULT_PRIVATE_EXPONENT.as_bytes(), 16).unwrap_or_default();
        Self {
            modulus,
            private_exponent,
            public_exponent: None,
        }
    }
}

/// Drop the sign byte of a 65-byte block and left-pad a 63-byte block to full width.
fn normalize(ciphertext: &[u8]) -> Vec<u8> {
    match ciphertext.len() {
        65 if ciphertext[0] == 0 => ciphertext[1..].to_vec(),
        63 => {
            let mut padded = vec![0u8; BLOCK_BYTES - ciphertext.len()];
            padded.extend_from_slice(ciphertext);
            padded
        }
        _ => ciphertext.to_vec(),
    }
}

fn strip_leading_zeros(mut bytes: Vec<u8>) -> Vec<u8> {
    let zeros = bytes.iter().take_while(|b| **b == 0).count();
    bytes.drain(..zeros);
    bytes
}

/// Fixed 512-bit keypair with public exponent 65537, for tests and local client tooling.
pub mod test_keys {
    use super::RsaKeyPair;
    use crate::error::Result;

    pub const MODULUS: &str = "ab2fb2f0c12c083c797ed60ddea8074c17df635659361fffab5d99c803e5f4051ab0950015234fb8f3875dc0838e34d2073b6b46dd7d69fef6f3db3d817cf535";
    pub const PRIVATE_EXPONENT: &str = "148734cb202f1a91bdf412d138f9275edda2013492a025f82fe19a965cb94fa8b68ccbbcdf71d2c049cf31daef1d2eef07bbde3cfc08d814234339803f4f89a1";
    pub const PUBLIC_EXPONENT: &str = "10001";

    pub fn keypair() -> Result<RsaKeyPair> {
        RsaKeyPair::from_hex(MODULUS, PRIVATE_EXPONENT, Some(PUBLIC_EXPONENT))
    }
}
