// Copyright 2024 Kevin Ludwig
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Descriptor tag: the 16-byte header every tagged descriptor starts with.

use zerocopy::{
    little_endian::{U16, U32},
    FromBytes, Immutable, KnownLayout,
};

pub const TAG_PRIMARY_VOLUME: u16 = 0x0001;
pub const TAG_ANCHOR_VOLUME_POINTER: u16 = 0x0002;
pub const TAG_VOLUME_POINTER: u16 = 0x0003;
pub const TAG_IMPLEMENTATION_USE_VOLUME: u16 = 0x0004;
pub const TAG_PARTITION: u16 = 0x0005;
pub const TAG_LOGICAL_VOLUME: u16 = 0x0006;
pub const TAG_UNALLOCATED_SPACE: u16 = 0x0007;
pub const TAG_TERMINATING: u16 = 0x0008;
pub const TAG_FILE_SET: u16 = 0x0100;
pub const TAG_FILE_IDENTIFIER: u16 = 0x0101;
pub const TAG_ALLOCATION_EXTENT: u16 = 0x0102;
pub const TAG_INDIRECT_ENTRY: u16 = 0x0103;
pub const TAG_TERMINAL_ENTRY: u16 = 0x0104;
pub const TAG_FILE_ENTRY: u16 = 0x0105;
pub const TAG_EXTENDED_FILE_ENTRY: u16 = 0x010A;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
pub struct RawTag {
    pub tag_id: U16,
    pub version: U16,
    pub checksum: u8,
    pub reserved: u8,
    pub serial: U16,
    pub crc: U16,
    pub crc_len: U16,
    pub location: U32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub tag_id: u16,
    pub version: u16,
    pub serial: u16,
    pub crc: u16,
    pub crc_len: u16,
    pub location: u32,
}

/// Parses and validates the 16-byte tag at the start of `sector`. Returns
/// `None` if the byte-sum checksum (every byte of the tag except byte 4,
/// the checksum byte itself) doesn't match.
pub fn parse_tag(sector: &[u8]) -> Option<Tag> {
    if sector.len() < 16 {
        return None;
    }
    let raw = RawTag::ref_from_bytes(&sector[..16]).ok()?;
    let mut sum: u8 = 0;
    for (i, &byte) in sector[..16].iter().enumerate() {
        if i != 4 {
            sum = sum.wrapping_add(byte);
        }
    }
    if sum != raw.checksum {
        return None;
    }
    Some(Tag {
        tag_id: raw.tag_id.get(),
        version: raw.version.get(),
        serial: raw.serial.get(),
        crc: raw.crc.get(),
        crc_len: raw.crc_len.get(),
        location: raw.location.get(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_bytes(tag_id: u16) -> [u8; 16] {
        let mut b = [0u8; 16];
        b[0..2].copy_from_slice(&tag_id.to_le_bytes());
        let mut sum: u8 = 0;
        for (i, &byte) in b.iter().enumerate() {
            if i != 4 {
                sum = sum.wrapping_add(byte);
            }
        }
        b[4] = sum;
        b
    }

    #[test]
    fn valid_checksum_parses() {
        let b = tag_bytes(TAG_ANCHOR_VOLUME_POINTER);
        let tag = parse_tag(&b).unwrap();
        assert_eq!(tag.tag_id, TAG_ANCHOR_VOLUME_POINTER);
    }

    #[test]
    fn bad_checksum_rejected() {
        let mut b = tag_bytes(TAG_ANCHOR_VOLUME_POINTER);
        b[4] ^= 0xFF;
        assert!(parse_tag(&b).is_none());
    }
}
