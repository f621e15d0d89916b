//! # File Server (JS5)
//!
//! Request decoding and response framing for the cache update channel.
//!
//! Requests arrive as four-byte records `[type][archive][group:2]`. Only plain and priority
//! requests name a group; every other record type is a status message and is skipped.
//!
//! Responses carry a five-byte container header and are split into 512-byte blocks, each
//! block after the first starting with a `0xFF` marker byte.

use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};
use crate::protocol::opcodes::js5;

/// Output block size; a marker byte opens each block after the first.
pub const BLOCK_SIZE: usize = 512;

pub const BLOCK_MARKER: u8 = 0xFF;

/// Archive and group of the master checksum table.
pub const CHECKSUM_TABLE: (u8, u16) = (255, 255);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileRequest {
    pub prefetch: bool,
    pub archive: u8,
    pub group: u16,
}

impl FileRequest {
    pub fn is_checksum_table(&self) -> bool {
        (self.archive, self.group) == CHECKSUM_TABLE
    }
}

/// Decode every request record left in `packet`.
pub fn decode_requests(packet: &mut Packet) -> Result<Vec<FileRequest>> {
    let mut requests = Vec::new();

    while packet.remaining() > 0 {
        match packet.read_u8()? {
            kind @ (js5::REQUEST | js5::PRIORITY_REQUEST) => {
                let archive = packet.read_u8()?;
                let group = packet.read_u16()?;
                requests.push(FileRequest {
                    prefetch: kind == js5::REQUEST,
                    archive,
                    group,
                });
            }
            _ => packet.skip(3)?,
        }
    }

    Ok(requests)
}

/// Frame `file` as the reply to `request`.
pub fn encode_response(request: &FileRequest, file: &[u8]) -> Result<Vec<u8>> {
    if request.is_checksum_table() {
        let mut response = Vec::with_capacity(file.len() + 3);
        response.push(request.archive);
        response.extend_from_slice(&request.group.to_be_bytes());
        response.extend_from_slice(file);
        return Ok(response);
    }

    if file.len() < 5 {
        return Err(ProtocolError::OutOfData {
            needed: 5,
            remaining: file.len(),
        });
    }

    let compression = file[0];
    let length = u32::from_be_bytes([file[1], file[2], file[3], file[4]]);
    // Compressed containers carry a four-byte uncompressed length after the header.
    let body_len = length as usize + if compression != 0 { 4 } else { 0 };
    let body = file.get(5..5 + body_len).ok_or(ProtocolError::OutOfData {
        needed: body_len,
        remaining: file.len() - 5,
    })?;

    let mut settings = compression;
    if request.prefetch {
        settings |= 0x80;
    }

    let mut response = Vec::with_capacity(8 + body_len + body_len / (BLOCK_SIZE - 1) + 1);
    response.push(request.archive);
    response.extend_from_slice(&request.group.to_be_bytes());
    response.push(settings);
    response.extend_from_slice(&length.to_be_bytes());

    for byte in body {
        if response.len() % BLOCK_SIZE == 0 {
            response.push(BLOCK_MARKER);
        }
        response.push(*byte);
    }

    Ok(response)
}
