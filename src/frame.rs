//! The 84-byte SPI frame: preamble, length, payload, info byte, checksum.

use crate::packet::PACKET_HEADER_SIZE;

pub const FRAME_SIZE: usize = 84;
pub const FRAME_EMPTY_SIZE: u8 = 4;
pub const FRAME_PREAMBLE: u8 = 0xAA;
const INFO_BUSY: u8 = 1 << 0;

/// Maximum higher-level packet payload a frame can carry.
pub const MAX_PAYLOAD_LEN: usize = FRAME_SIZE - FRAME_EMPTY_SIZE as usize;

/// Pearson permutation table, verbatim from Pearson, CACM 33(6), 1990.
#[rustfmt::skip]
pub const PEARSON_PERMUTATION: [u8; 256] = [
    1, 87, 49, 12, 176, 178, 102, 166, 121, 193, 6, 84, 249, 230, 44, 163,
    14, 197, 213, 181, 161, 85, 218, 80, 64, 239, 24, 226, 236, 142, 38, 200,
    110, 177, 104, 103, 141, 253, 255, 50, 77, 101, 81, 18, 45, 96, 31, 222,
    25, 107, 190, 70, 86, 237, 240, 34, 72, 242, 20, 214, 244, 227, 149, 235,
    97, 234, 57, 22, 60, 250, 82, 175, 208, 5, 127, 199, 111, 62, 135, 248,
    174, 169, 211, 58, 66, 154, 106, 195, 245, 171, 17, 187, 182, 179, 0, 243,
    132, 56, 148, 75, 128, 133, 158, 100, 130, 126, 91, 13, 153, 246, 216, 219,
    119, 68, 223, 78, 83, 88, 201, 99, 122, 11, 92, 32, 136, 114, 52, 10,
    138, 30, 48, 183, 156, 35, 61, 26, 143, 74, 251, 94, 129, 162, 63, 152,
    170, 7, 115, 167, 241, 206, 3, 150, 55, 59, 151, 220, 90, 53, 23, 131,
    125, 173, 15, 238, 79, 95, 89, 16, 105, 137, 225, 224, 217, 160, 37, 123,
    118, 73, 2, 157, 46, 116, 9, 145, 134, 228, 207, 212, 202, 215, 69, 229,
    27, 188, 67, 124, 168, 252, 42, 4, 29, 108, 21, 247, 19, 205, 39, 203,
    233, 40, 186, 147, 198, 192, 155, 33, 164, 191, 98, 204, 165, 180, 117, 76,
    140, 36, 210, 172, 41, 54, 159, 8, 185, 232, 113, 196, 231, 47, 146, 120,
    51, 65, 28, 144, 254, 221, 93, 189, 194, 139, 112, 43, 71, 109, 184, 209,
];

/// Computes the Pearson-8 checksum of `data` using the canonical permutation.
pub fn pearson8(data: &[u8]) -> u8 {
    let mut checksum: u8 = 0;
    for &byte in data {
        checksum = PEARSON_PERMUTATION[(checksum ^ byte) as usize];
    }
    checksum
}

/// Outcome of parsing a received 84-byte frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult {
    /// Preamble byte was 0: the slave drove nothing at all, not even a header.
    Empty,
    /// Preamble byte was neither 0 nor 0xAA.
    BadPreamble,
    /// `length` fell outside `[4 + header_size, 84]`.
    BadLength,
    /// Checksum byte did not match `pearson8(frame[0..length-1])`.
    BadChecksum,
    /// A properly framed response; `payload` is `None` for a length-4 frame.
    Ok { payload: Option<Vec<u8>>, busy: bool },
}

/// Builds a poll-only (no payload) 84-byte frame with the given info byte.
pub fn build_poll(info: u8) -> [u8; FRAME_SIZE] {
    build(None, info)
}

/// Builds an 84-byte frame carrying `payload` (at most [`MAX_PAYLOAD_LEN`] bytes),
/// or a poll-only frame if `payload` is `None`.
///
/// Panics if `payload` exceeds [`MAX_PAYLOAD_LEN`]; callers are expected to
/// have already rejected oversize requests (see [`crate::transceiver`]).
pub fn build(payload: Option<&[u8]>, info: u8) -> [u8; FRAME_SIZE] {
    let mut frame = [0u8; FRAME_SIZE];
    frame[0] = FRAME_PREAMBLE;

    let length: u8 = match payload {
        Some(bytes) => {
            assert!(bytes.len() <= MAX_PAYLOAD_LEN, "payload exceeds frame budget");
            frame[2..2 + bytes.len()].copy_from_slice(bytes);
            FRAME_EMPTY_SIZE + bytes.len() as u8
        }
        None => FRAME_EMPTY_SIZE,
    };

    frame[1] = length;
    frame[(length - 2) as usize] = info;
    frame[(length - 1) as usize] = pearson8(&frame[0..(length - 1) as usize]);
    frame
}

/// Parses a received 84-byte frame.
pub fn parse(frame: &[u8; FRAME_SIZE]) -> ParseResult {
    if frame[0] == 0 {
        return ParseResult::Empty;
    }
    if frame[0] != FRAME_PREAMBLE {
        return ParseResult::BadPreamble;
    }

    let length = frame[1];
    // A frame either carries no payload (length == 4, header-less empty
    // response) or a complete higher-level packet, which itself starts with
    // an 8-byte header; lengths in between (a truncated header) are malformed.
    let valid_length = length == FRAME_EMPTY_SIZE
        || ((length as usize) >= FRAME_EMPTY_SIZE as usize + PACKET_HEADER_SIZE
            && (length as usize) <= FRAME_SIZE);
    if !valid_length {
        return ParseResult::BadLength;
    }

    let checksum_index = (length - 1) as usize;
    let checksum = pearson8(&frame[0..checksum_index]);
    if checksum != frame[checksum_index] {
        return ParseResult::BadChecksum;
    }

    let info = frame[(length - 2) as usize];
    let busy = info & INFO_BUSY != 0;

    if length == FRAME_EMPTY_SIZE {
        return ParseResult::Ok { payload: None, busy };
    }

    let payload = frame[2..(length - 2) as usize].to_vec();
    ParseResult::Ok { payload: Some(payload), busy }
}
