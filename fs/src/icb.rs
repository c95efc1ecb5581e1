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

//! ICB Tag, File Entry, and Extended File Entry: the per-file/per-directory
//! descriptor, plus the view over its allocation-descriptor area.

use crate::codec::{timestamp, u16_le, u32_le, u64_le, Timestamp};
use crate::extent::AllocationType;
use crate::tag::{parse_tag, Tag, TAG_EXTENDED_FILE_ENTRY, TAG_FILE_ENTRY};
use udf_err::{Error, Result};

pub const FILE_TYPE_DIRECTORY: u8 = 4;

#[derive(Debug, Clone, Copy)]
pub struct IcbTag {
    pub file_type: u8,
    pub flags: u16,
}

impl IcbTag {
    pub fn allocation_type(&self) -> Option<AllocationType> {
        AllocationType::from_flags(self.flags)
    }
}

fn parse_icb_tag(b: &[u8]) -> IcbTag {
    IcbTag {
        file_type: b[11],
        flags: u16_le(&b[18..]),
    }
}

/// A parsed File Entry or Extended File Entry (spec.md §3, §4.7): the two
/// layouts differ only in prelude length and field offsets, not in meaning,
/// so they're unified into one struct after parsing.
#[derive(Clone)]
pub struct FileEntry {
    pub tag: Tag,
    pub icb_tag: IcbTag,
    pub permissions: u32,
    pub information_length: u64,
    pub modification_time: Timestamp,
    /// Raw bytes of the allocation-descriptor area (or, for an Embedded
    /// ICB, the file's literal content).
    pub allocation_descriptors: Vec<u8>,
}

impl FileEntry {
    pub fn is_directory(&self) -> bool {
        self.icb_tag.file_type == FILE_TYPE_DIRECTORY
    }
}

struct Layout {
    prelude_len: usize,
    uid_perm_base: usize,
    information_length_off: usize,
    modification_time_off: usize,
    l_ea_off: usize,
    l_ad_off: usize,
}

const REGULAR: Layout = Layout {
    prelude_len: 176,
    uid_perm_base: 36,
    information_length_off: 56,
    modification_time_off: 84,
    l_ea_off: 168,
    l_ad_off: 172,
};

const EXTENDED: Layout = Layout {
    prelude_len: 216,
    uid_perm_base: 36,
    information_length_off: 56,
    modification_time_off: 92,
    l_ea_off: 208,
    l_ad_off: 212,
};

fn try_parse(sector: &[u8], layout: &Layout, expected_tag: u16) -> Option<FileEntry> {
    if sector.len() < layout.prelude_len {
        return None;
    }
    let tag = parse_tag(sector)?;
    if tag.tag_id != expected_tag {
        return None;
    }
    let icb_tag = parse_icb_tag(&sector[16..]);
    let permissions = u32_le(&sector[layout.uid_perm_base + 8..]);
    let information_length = u64_le(&sector[layout.information_length_off..]);
    let modification_time = timestamp(&sector[layout.modification_time_off..]);
    let l_ea = u32_le(&sector[layout.l_ea_off..]) as usize;
    let l_ad = u32_le(&sector[layout.l_ad_off..]) as usize;
    let ad_start = layout.prelude_len + l_ea;
    let ad_end = ad_start + l_ad;
    if ad_end > sector.len() {
        return None;
    }
    Some(FileEntry {
        tag,
        icb_tag,
        permissions,
        information_length,
        modification_time,
        allocation_descriptors: sector[ad_start..ad_end].to_vec(),
    })
}

/// Selects between File Entry and Extended File Entry layout per §4.7:
/// attempt the regular 176-byte prelude first, fall back to the 216-byte
/// Extended prelude, and fail with `BadFileEntry` if neither fits.
pub fn parse_file_entry(sector: &[u8]) -> Result<FileEntry> {
    try_parse(sector, &REGULAR, TAG_FILE_ENTRY)
        .or_else(|| try_parse(sector, &EXTENDED, TAG_EXTENDED_FILE_ENTRY))
        .ok_or(Error::BadFileEntry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extent::parse_list;

    fn tagged_sector(tag_id: u16, len: usize) -> Vec<u8> {
        let mut b = vec![0u8; len];
        b[0..2].copy_from_slice(&tag_id.to_le_bytes());
        let mut sum: u8 = 0;
        for (i, &byte) in b[..16].iter().enumerate() {
            if i != 4 {
                sum = sum.wrapping_add(byte);
            }
        }
        b[4] = sum;
        b
    }

    #[test]
    fn parses_regular_file_entry_with_embedded_alloc_type() {
        let mut b = tagged_sector(TAG_FILE_ENTRY, 2048);
        b[16 + 18] = 3; // icb flags: Embedded
        b[56..64].copy_from_slice(&11u64.to_le_bytes()); // information_length
        b[172..176].copy_from_slice(&11u32.to_le_bytes()); // L_AD
        b[176..187].copy_from_slice(b"hello world");
        let fe = parse_file_entry(&b).unwrap();
        assert_eq!(fe.information_length, 11);
        assert_eq!(fe.icb_tag.allocation_type(), Some(AllocationType::Embedded));
        assert_eq!(&fe.allocation_descriptors, b"hello world");
    }

    #[test]
    fn falls_back_to_extended_layout() {
        let mut b = tagged_sector(TAG_EXTENDED_FILE_ENTRY, 2048);
        b[16 + 18] = 1; // Long descriptors
        b[208..212].copy_from_slice(&0u32.to_le_bytes()); // L_EA
        b[212..216].copy_from_slice(&16u32.to_le_bytes()); // L_AD: one long extent
        b[216..220].copy_from_slice(&4096u32.to_le_bytes());
        b[220..224].copy_from_slice(&5u32.to_le_bytes());
        let fe = parse_file_entry(&b).unwrap();
        let list = parse_list(fe.icb_tag.allocation_type().unwrap(), &fe.allocation_descriptors, 0);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].length, 4096);
        assert_eq!(list[0].location, 5);
    }

    #[test]
    fn rejects_when_neither_layout_fits() {
        let b = tagged_sector(TAG_FILE_ENTRY, 100);
        assert!(matches!(parse_file_entry(&b), Err(Error::BadFileEntry)));
    }
}
