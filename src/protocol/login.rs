//! # Login Blocks
//!
//! Decoding of the world login frame and the account-creation frame, plus the success
//! replies sent back before a connection enters the game phase.
//!
//! ## Login frame
//! `[opcode][len:2][body]`, where the body is a cleartext preamble followed by a
//! length-prefixed RSA block `[magic = 10][seed:4×4][username:8][password\0]`.
//!
//! The four seed words key the inbound ISAAC generator; the outbound generator uses the same
//! words each increased by [`OUTBOUND_SEED_OFFSET`].

use crate::core::packet::Packet;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::opcodes::{login, LoginResponse};
use crate::utils::base37;
use crate::utils::rsa::RsaKeyPair;

pub const UID_LENGTH: usize = 24;
pub const CHECKSUM_COUNT: usize = 29;
pub const OUTBOUND_SEED_OFFSET: u32 = 50;

/// Decoded world login frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub opcode: u8,
    pub revision: u32,
    pub unknown: u8,
    pub window_mode: u8,
    pub canvas_width: u16,
    pub canvas_height: u16,
    pub preference: u8,
    pub uid: [u8; UID_LENGTH],
    pub settings: String,
    pub affiliate: u32,
    pub preferences: Vec<u8>,
    pub verify_id: u16,
    pub checksums: [u32; CHECKSUM_COUNT],
    pub seed: [u32; 4],
    /// Raw base-37 username as sent.
    pub username: u64,
    pub password: String,
}

fn read_frame(packet: &mut Packet) -> Result<Packet> {
    let length = usize::from(packet.read_u16()?);
    if length > packet.remaining() {
        return Err(ProtocolError::OutOfData {
            needed: length,
            remaining: packet.remaining(),
        });
    }
    packet.read_packet(length)
}

fn read_magic(block: &mut Packet) -> Result<()> {
    if block.read_u8()? != login::RSA_MAGIC {
        return Err(ProtocolError::bad_encoding(constants::ERR_RSA_MAGIC));
    }
    Ok(())
}

impl LoginRequest {
    /// Decode a full frame, opcode included.
    pub fn decode(packet: &mut Packet, key: &RsaKeyPair) -> Result<Self> {
        let opcode = packet.read_u8()?;
        let mut body = read_frame(packet)?;

        let revision = body.read_u32()?;
        let unknown = body.read_u8()?;
        let window_mode = body.read_u8()?;
        let canvas_width = body.read_u16()?;
        let canvas_height = body.read_u16()?;
        let preference = body.read_u8()?;

        let mut uid = [0u8; UID_LENGTH];
        uid.copy_from_slice(&body.read_bytes(UID_LENGTH)?);

        let settings = body.read_cstr()?;
        let affiliate = body.read_u32()?;
        let preferences_len = usize::from(body.read_u8()?);
        let preferences = body.read_bytes(preferences_len)?;
        let verify_id = body.read_u16()?;

        let mut checksums = [0u32; CHECKSUM_COUNT];
        for checksum in checksums.iter_mut() {
            *checksum = body.read_u32()?;
        }

        let mut block = body.rsa_decrypt(key)?;
        read_magic(&mut block)?;

        let mut seed = [0u32; 4];
        for word in seed.iter_mut() {
            *word = block.read_u32()?;
        }
        let username = block.read_u64()?;
        let password = block.read_cstr()?;

        Ok(Self {
            opcode,
            revision,
            unknown,
            window_mode,
            canvas_width,
            canvas_height,
            preference,
            uid,
            settings,
            affiliate,
            preferences,
            verify_id,
            checksums,
            seed,
            username,
            password,
        })
    }

    /// Encode the frame as a client would, RSA block included.
    pub fn encode(&self, key: &RsaKeyPair) -> Result<Vec<u8>> {
        let mut block = Packet::new();
        block.write_u8(login::RSA_MAGIC);
        for word in self.seed {
            block.write_u32(word);
        }
        block.write_u64(self.username);
        block.write_cstr(&self.password)?;
        block.rsa_encrypt(key)?;

        let mut frame = Packet::new();
        frame.write_u8(self.opcode);
        frame.write_u16(0);
        let start = frame.len();

        frame.write_u32(self.revision);
        frame.write_u8(self.unknown);
        frame.write_u8(self.window_mode);
        frame.write_u16(self.canvas_width);
        frame.write_u16(self.canvas_height);
        frame.write_u8(self.preference);
        frame.write_bytes(&self.uid);
        frame.write_cstr(&self.settings)?;
        frame.write_u32(self.affiliate);
        let preferences_len = u8::try_from(self.preferences.len())
            .map_err(|_| ProtocolError::bad_encoding(constants::ERR_SIZE_RANGE))?;
        frame.write_u8(preferences_len);
        frame.write_bytes(&self.preferences);
        frame.write_u16(self.verify_id);
        for checksum in self.checksums {
            frame.write_u32(checksum);
        }
        frame.write_bytes(block.as_bytes());

        frame.patch_size_u16(frame.len() - start)?;
        Ok(frame.into_inner())
    }

    pub fn is_reconnect(&self) -> bool {
        self.opcode == login::WORLD_RECONNECT
    }

    /// Title-cased display form of the username.
    pub fn display_name(&self) -> Result<String> {
        base37::decode(self.username)
            .map(|raw| base37::to_display_name(&raw))
            .ok_or_else(|| ProtocolError::bad_encoding("Username is not a valid base-37 name"))
    }

    pub fn inbound_seed(&self) -> [u32; 4] {
        self.seed
    }

    pub fn outbound_seed(&self) -> [u32; 4] {
        self.seed.map(|word| word.wrapping_add(OUTBOUND_SEED_OFFSET))
    }
}

impl Default for LoginRequest {
    fn default() -> Self {
        Self {
            opcode: login::WORLD_CONNECT,
            revision: crate::config::CLIENT_VERSION,
            unknown: 0,
            window_mode: 1,
            canvas_width: 765,
            canvas_height: 503,
            preference: 0,
            uid: [0; UID_LENGTH],
            settings: String::new(),
            affiliate: 0,
            preferences: Vec::new(),
            verify_id: 0,
            checksums: [0; CHECKSUM_COUNT],
            seed: [0; 4],
            username: 0,
            password: String::new(),
        }
    }
}

/// Reply to a successful login.
///
/// A fresh connect carries the account flags and the assigned player index; a reconnect is the
/// bare response code.
pub fn encode_success(opcode: u8, player_id: u16) -> Vec<u8> {
    if opcode == login::WORLD_RECONNECT {
        return vec![u8::from(LoginResponse::Reconnected)];
    }

    let mut response = Packet::with_capacity(11);
    response.write_u8(LoginResponse::Ok.into());
    response.write_u8(0); // staff mod level
    response.write_u8(0); // player mod level
    response.write_bool(false); // underage
    response.write_bool(false); // parental chat consent
    response.write_bool(false); // parental advert consent
    response.write_bool(false); // map quickchat
    response.write_u16(player_id);
    response.write_bool(false); // mouse recorder
    response.write_bool(true); // members map
    response.into_inner()
}

/// Day-of-birth and country step of account creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreationProgress {
    pub day: u8,
    pub month: u8,
    pub year: u16,
    pub country: u16,
}

impl CreationProgress {
    pub fn decode(packet: &mut Packet) -> Result<Self> {
        Ok(Self {
            day: packet.read_u8()?,
            month: packet.read_u8()?,
            year: packet.read_u16()?,
            country: packet.read_u16()?,
        })
    }
}

/// Final account-creation frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountCreation {
    pub revision: u16,
    pub opt_in: u16,
    pub username: u64,
    pub password: String,
    pub affiliate: u16,
    pub day: u8,
    pub month: u8,
    pub year: u16,
    pub country: u16,
    pub key: [u32; 4],
    pub email: String,
}

impl AccountCreation {
    /// Decode `[len:2][body]`; the bytes after the RSA block are XTEA-encrypted with the
    /// four key words interleaved through it.
    pub fn decode(packet: &mut Packet, rsa: &RsaKeyPair) -> Result<Self> {
        let mut body = read_frame(packet)?;
        let revision = body.read_u16()?;

        let mut block = body.rsa_decrypt(rsa)?;
        read_magic(&mut block)?;

        let mut key = [0u32; 4];
        let opt_in = block.read_u16()?;
        let username = block.read_u64()?;
        key[0] = block.read_u32()?;
        let password = block.read_cstr()?;
        key[1] = block.read_u32()?;
        let affiliate = block.read_u16()?;
        let day = block.read_u8()?;
        let month = block.read_u8()?;
        key[2] = block.read_u32()?;
        let year = block.read_u16()?;
        let country = block.read_u16()?;
        key[3] = block.read_u32()?;

        let mut extra = body.remaining_packet();
        let length = extra.len();
        extra.xtea_decrypt(&key, 0, length)?;
        let email = extra.read_cstr()?;

        Ok(Self {
            revision,
            opt_in,
            username,
            password,
            affiliate,
            day,
            month,
            year,
            country,
            key,
            email,
        })
    }
}

/// Follow-up to a name check: `[21][count]([name:8])*`.
pub fn encode_name_suggestions(names: &[&str]) -> Result<Vec<u8>> {
    let count =
        u8::try_from(names.len()).map_err(|_| ProtocolError::bad_encoding(constants::ERR_SIZE_RANGE))?;
    let mut response = Packet::with_capacity(2 + names.len() * 8);
    response.write_u8(login::CREATE_CHECK_NAME);
    response.write_u8(count);
    for name in names {
        response.write_u64(base37::encode(name));
    }
    Ok(response.into_inner())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::utils::rsa::test_keys;

    fn sample_request() -> LoginRequest {
        LoginRequest {
            seed: [0x0102_0304, 0xDEAD_BEEF, 7, 0xFFFF_FFFF],
            username: base37::encode("zezima"),
            password: "hunter2".into(),
            settings: "wwGlrZHF5gKN6D3mDdihco3oPeYN2KFybL9hUUFqOvk".into(),
            preferences: vec![1, 2, 3],
            verify_id: 9,
            checksums: [0xABCD_0123; CHECKSUM_COUNT],
            ..LoginRequest::default()
        }
    }

    #[test]
    fn encode_decode_login_frame() {
        let key = test_keys::keypair().unwrap();
        let request = sample_request();
        let frame = request.encode(&key).unwrap();

        let declared = usize::from(u16::from_be_bytes([frame[1], frame[2]]));
        assert_eq!(declared, frame.len() - 3);

        let decoded = LoginRequest::decode(&mut Packet::from_vec(frame), &key).unwrap();
        assert_eq!(decoded, request);
        assert_eq!(decoded.display_name().unwrap(), "Zezima");
    }

    #[test]
    fn outbound_seed_is_offset() {
        let request = sample_request();
        assert_eq!(
            request.outbound_seed(),
            [0x0102_0336, 0xDEAD_BF21, 57, 49]
        );
    }

    #[test]
    fn truncated_frame_is_out_of_data() {
        let key = test_keys::keypair().unwrap();
        let mut frame = sample_request().encode(&key).unwrap();
        frame.truncate(frame.len() - 10);
        assert!(matches!(
            LoginRequest::decode(&mut Packet::from_vec(frame), &key),
            Err(ProtocolError::OutOfData { .. })
        ));
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let key = test_keys::keypair().unwrap();
        let mut block = Packet::new();
        block.write_u8(11);
        block.write_bytes(&[0; 24]);
        block.rsa_encrypt(&key).unwrap();

        let mut frame = Packet::new();
        frame.write_u16(2 + block.len() as u16);
        frame.write_u16(578);
        frame.write_bytes(block.as_bytes());
        assert!(matches!(
            AccountCreation::decode(&mut Packet::from_vec(frame.into_inner()), &key),
            Err(ProtocolError::BadEncoding(_))
        ));
    }

    #[test]
    fn account_creation_round() {
        let key = test_keys::keypair().unwrap();
        let xtea_key = [11, 22, 33, 44];

        let mut block = Packet::new();
        block.write_u8(login::RSA_MAGIC);
        block.write_u16(1);
        block.write_u64(base37::encode("new_user"));
        block.write_u32(xtea_key[0]);
        block.write_cstr("pw").unwrap();
        block.write_u32(xtea_key[1]);
        block.write_u16(0);
        block.write_u8(12);
        block.write_u8(3);
        block.write_u32(xtea_key[2]);
        block.write_u16(1990);
        block.write_u16(6);
        block.write_u32(xtea_key[3]);
        block.rsa_encrypt(&key).unwrap();

        let mut extra = Packet::new();
        extra.write_cstr("a@b.c").unwrap();
        extra.write_bytes(&[0; 2]);
        extra.xtea_encrypt(&xtea_key, 0, 8).unwrap();

        let mut frame = Packet::new();
        frame.write_u16(0);
        frame.write_u16(578);
        frame.write_bytes(block.as_bytes());
        frame.write_bytes(extra.as_bytes());
        let size = frame.len() - 2;
        frame.patch_size_u16(size).unwrap();

        let creation = AccountCreation::decode(&mut Packet::from_vec(frame.into_inner()), &key).unwrap();
        assert_eq!(creation.revision, 578);
        assert_eq!(base37::decode(creation.username).unwrap(), "new_user");
        assert_eq!(creation.password, "pw");
        assert_eq!((creation.day, creation.month, creation.year), (12, 3, 1990));
        assert_eq!(creation.country, 6);
        assert_eq!(creation.key, xtea_key);
        assert_eq!(creation.email, "a@b.c");
    }

    #[test]
    fn connect_and_reconnect_replies() {
        assert_eq!(
            encode_success(login::WORLD_CONNECT, 0x0102),
            vec![2, 0, 0, 0, 0, 0, 0, 1, 2, 0, 1]
        );
        assert_eq!(encode_success(login::WORLD_RECONNECT, 5), vec![15]);
    }

    #[test]
    fn name_suggestions() {
        let response = encode_name_suggestions(&["test"]).unwrap();
        assert_eq!(response[..2], [21, 1]);
        assert_eq!(
            u64::from_be_bytes(response[2..10].try_into().unwrap()),
            base37::encode("test")
        );
    }
}
