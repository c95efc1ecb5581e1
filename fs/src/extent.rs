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

//! The four on-disk extent (allocation descriptor) shapes, unified behind
//! one access contract, plus the allocation-type selector carried in an ICB
//! tag's flags.

use crate::codec::{u16_le, u32_le, u48_le};

const EXTENT_FLAG_MASK: u32 = 0xC000_0000;
const EXTENT_LENGTH_MASK: u32 = 0x3FFF_FFFF;

/// What an extent's top two length bits mean (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtentFlag {
    Recorded,
    AllocatedNotRecorded,
    NotRecordedNotAllocated,
    Continuation,
}

impl ExtentFlag {
    fn from_bits(raw_length: u32) -> Self {
        match (raw_length & EXTENT_FLAG_MASK) >> 30 {
            0 => ExtentFlag::Recorded,
            1 => ExtentFlag::AllocatedNotRecorded,
            2 => ExtentFlag::NotRecordedNotAllocated,
            _ => ExtentFlag::Continuation,
        }
    }

    pub fn is_sparse(self) -> bool {
        matches!(
            self,
            ExtentFlag::AllocatedNotRecorded | ExtentFlag::NotRecordedNotAllocated
        )
    }

    pub fn is_continuation(self) -> bool {
        matches!(self, ExtentFlag::Continuation)
    }
}

/// A decoded extent, normalized across all four on-disk shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub location: u64,
    pub length: u32,
    pub partition_ref: u16,
    pub flag: ExtentFlag,
}

/// Short form (8 B): `length(u32), location(u32)`. Partition is implicit —
/// the caller supplies it from the enclosing ICB's own partition.
pub fn parse_short(b: &[u8], partition_ref: u16) -> Extent {
    let raw_length = u32_le(&b[0..]);
    Extent {
        location: u32_le(&b[4..]) as u64,
        length: raw_length & EXTENT_LENGTH_MASK,
        partition_ref,
        flag: ExtentFlag::from_bits(raw_length),
    }
}

/// Small form (8 B): `length(u16), location(u48)`. No flag bits — the
/// length field here isn't wide enough to carry them. Not reachable through
/// `AllocationType` (no ICB tag selects it), but part of the four on-disk
/// shapes spec.md §3 requires decoding support for.
#[allow(dead_code)]
pub fn parse_small(b: &[u8], partition_ref: u16) -> Extent {
    Extent {
        location: u48_le(&b[2..]),
        length: u16_le(&b[0..]) as u32,
        partition_ref,
        flag: ExtentFlag::Recorded,
    }
}

/// Long form (16 B): `length(u32), {block:u32, part_ref:u16}(+2 reserved)`.
pub fn parse_long(b: &[u8]) -> Extent {
    let raw_length = u32_le(&b[0..]);
    Extent {
        location: u32_le(&b[4..]) as u64,
        length: raw_length & EXTENT_LENGTH_MASK,
        partition_ref: u16_le(&b[8..]),
        flag: ExtentFlag::from_bits(raw_length),
    }
}

/// Extended form (24 B): `extent_len, recorded_len, info_len,
/// {block, part_ref}(+2)`; reported length is `info_len`, flag comes from
/// `extent_len`'s top bits (the generic "extent length field" of spec.md §3).
pub fn parse_extended(b: &[u8]) -> Extent {
    let raw_extent_len = u32_le(&b[0..]);
    let info_len = u32_le(&b[8..]);
    Extent {
        location: u32_le(&b[12..]) as u64,
        length: info_len,
        partition_ref: u16_le(&b[16..]),
        flag: ExtentFlag::from_bits(raw_extent_len),
    }
}

/// Selects the allocation type from the bottom bits of an ICB tag's flags
/// (spec.md §3: `0=Short, 1=Long, 2=Extended, 3=Embedded`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationType {
    Short,
    Long,
    Extended,
    Embedded,
}

impl AllocationType {
    pub fn from_flags(flags: u16) -> Option<Self> {
        match flags & 0x7 {
            0 => Some(AllocationType::Short),
            1 => Some(AllocationType::Long),
            2 => Some(AllocationType::Extended),
            3 => Some(AllocationType::Embedded),
            _ => None,
        }
    }

    /// On-disk size, in bytes, of one allocation descriptor of this type.
    /// `Embedded` has no descriptor shape — its AD area *is* file data.
    pub fn descriptor_len(self) -> Option<usize> {
        match self {
            AllocationType::Short => Some(8),
            AllocationType::Long => Some(16),
            AllocationType::Extended => Some(24),
            AllocationType::Embedded => None,
        }
    }
}

/// Decodes every fixed-size allocation descriptor packed into `b`, in order.
/// `own_partition` is used as the implicit partition reference for the
/// Short/Small shapes, which don't carry one on disk.
pub fn parse_list(alloc_type: AllocationType, b: &[u8], own_partition: u16) -> Vec<Extent> {
    let Some(stride) = alloc_type.descriptor_len() else {
        return Vec::new();
    };
    b.chunks_exact(stride)
        .map(|chunk| match alloc_type {
            AllocationType::Short => parse_short(chunk, own_partition),
            AllocationType::Long => parse_long(chunk),
            AllocationType::Extended => parse_extended(chunk),
            AllocationType::Embedded => unreachable!(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_extent_flag_continuation() {
        let mut b = [0u8; 8];
        b[0..4].copy_from_slice(&(0xC000_0010u32).to_le_bytes());
        b[4..8].copy_from_slice(&42u32.to_le_bytes());
        let e = parse_short(&b, 0);
        assert_eq!(e.length, 0x10);
        assert_eq!(e.location, 42);
        assert!(e.flag.is_continuation());
    }

    #[test]
    fn long_extent_sparse() {
        let mut b = [0u8; 16];
        b[0..4].copy_from_slice(&(0x4000_1000u32).to_le_bytes());
        b[4..8].copy_from_slice(&7u32.to_le_bytes());
        b[8..10].copy_from_slice(&3u16.to_le_bytes());
        let e = parse_long(&b);
        assert_eq!(e.length, 0x1000);
        assert_eq!(e.partition_ref, 3);
        assert!(e.flag.is_sparse());
    }

    #[test]
    fn allocation_type_from_icb_flags() {
        assert_eq!(AllocationType::from_flags(3), Some(AllocationType::Embedded));
        assert_eq!(AllocationType::from_flags(0xFFFC), None);
    }
}
