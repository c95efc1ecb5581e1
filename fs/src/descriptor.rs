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

//! Volume-level descriptors: Anchor, Primary Volume, Partition, Logical
//! Volume, File Set, and the partition map array embedded in the LVD.

use crate::codec::{d_string, timestamp, u16_le, u32_le, Timestamp};
use crate::entity::EntityId;
use crate::extent::{parse_short, Extent};
use crate::tag::{parse_tag, Tag};
use udf_err::{Error, Result};

pub struct AnchorVolumeDescriptorPointer {
    pub tag: Tag,
    pub main_vds_extent: Extent,
    pub reserve_vds_extent: Extent,
}

pub fn parse_anchor(sector: &[u8]) -> Option<AnchorVolumeDescriptorPointer> {
    let tag = parse_tag(sector)?;
    if sector.len() < 32 {
        return None;
    }
    Some(AnchorVolumeDescriptorPointer {
        tag,
        main_vds_extent: parse_short(&sector[16..], 0),
        reserve_vds_extent: parse_short(&sector[24..], 0),
    })
}

/// Carried for presence/completeness only — spec.md §3 notes the PVD isn't
/// otherwise required by the reader.
#[allow(dead_code)]
pub struct PrimaryVolumeDescriptor {
    pub tag: Tag,
    pub volume_identifier: String,
    pub recording_date_time: Timestamp,
}

pub fn parse_primary_volume(sector: &[u8]) -> Option<PrimaryVolumeDescriptor> {
    let tag = parse_tag(sector)?;
    Some(PrimaryVolumeDescriptor {
        tag,
        volume_identifier: d_string(&sector[24..], 32),
        recording_date_time: timestamp(&sector[376..]),
    })
}

#[allow(dead_code)]
pub struct PartitionDescriptor {
    pub tag: Tag,
    pub partition_flags: u16,
    pub partition_number: u16,
    pub partition_contents: EntityId,
    pub access_type: u32,
    pub starting_location: u32,
    pub length: u32,
}

pub fn parse_partition(sector: &[u8]) -> Option<PartitionDescriptor> {
    let tag = parse_tag(sector)?;
    Some(PartitionDescriptor {
        tag,
        partition_flags: u16_le(&sector[20..]),
        partition_number: u16_le(&sector[22..]),
        partition_contents: EntityId::ref_copy(&sector[24..56]),
        access_type: u32_le(&sector[184..]),
        starting_location: u32_le(&sector[188..]),
        length: u32_le(&sector[192..]),
    })
}

/// A logical-partition-map entry: Type 1 is a direct physical-partition
/// reference, Type 2 carries a 32-byte Entity ID identifying the kind of
/// virtualisation (this reader resolves every Type 2 map through the
/// metadata-partition indirection of spec.md §4.3).
#[derive(Debug, Clone, Copy)]
pub enum PartitionMap {
    Type1 {
        partition_number: u16,
    },
    Type2 {
        partition_number: u16,
    },
}

pub fn parse_partition_maps(b: &[u8], count: u32) -> Result<Vec<PartitionMap>> {
    let mut maps = Vec::with_capacity(count as usize);
    let mut offset = 0usize;
    for _ in 0..count {
        if offset + 2 > b.len() {
            return Err(Error::BadDescriptor("truncated partition map"));
        }
        let map_type = b[offset];
        let map_len = b[offset + 1] as usize;
        match map_type {
            1 => {
                if offset + 6 > b.len() {
                    return Err(Error::BadDescriptor("truncated type-1 partition map"));
                }
                maps.push(PartitionMap::Type1 {
                    partition_number: u16_le(&b[offset + 4..]),
                });
            }
            2 => {
                if offset + 40 > b.len() {
                    return Err(Error::BadDescriptor("truncated type-2 partition map"));
                }
                maps.push(PartitionMap::Type2 {
                    partition_number: u16_le(&b[offset + 38..]),
                });
            }
            _ => return Err(Error::BadDescriptor("unknown partition map type")),
        }
        offset += map_len.max(1);
    }
    Ok(maps)
}

pub struct LogicalVolumeDescriptor {
    #[allow(dead_code)]
    pub tag: Tag,
    #[allow(dead_code)]
    pub logical_block_size: u32,
    pub contents_use: (u32, u16), // (block, partition_ref) of FSD extent
    #[allow(dead_code)]
    pub n_partition_maps: u32,
    pub partition_maps: Vec<PartitionMap>,
}

pub fn parse_logical_volume(sector: &[u8]) -> Result<LogicalVolumeDescriptor> {
    let tag = parse_tag(sector).ok_or(Error::BadDescriptor("bad LVD tag"))?;
    let logical_block_size = u32_le(&sector[212..]);
    let contents_use = (u32_le(&sector[252..]), u16_le(&sector[256..]));
    let map_table_length = u32_le(&sector[264..]);
    let n_partition_maps = u32_le(&sector[268..]);
    let maps_start = 440;
    let maps_end = maps_start + map_table_length as usize;
    if maps_end > sector.len() {
        return Err(Error::BadDescriptor("LVD partition map table overruns sector"));
    }
    let partition_maps = parse_partition_maps(&sector[maps_start..maps_end], n_partition_maps)?;
    Ok(LogicalVolumeDescriptor {
        tag,
        logical_block_size,
        contents_use,
        n_partition_maps,
        partition_maps,
    })
}

pub struct FileSetDescriptor {
    #[allow(dead_code)]
    pub tag: Tag,
    pub root_icb: (u32, u16), // (block, partition_ref)
}

pub fn parse_file_set(sector: &[u8]) -> Result<FileSetDescriptor> {
    let tag = parse_tag(sector).ok_or(Error::BadDescriptor("bad FSD tag"))?;
    let root_icb = (u32_le(&sector[404..]), u16_le(&sector[408..]));
    Ok(FileSetDescriptor { tag, root_icb })
}

/// Header of an Allocation Extent Descriptor: `tag(16B)`, then
/// `previous_aed_location(u32)`, `length_of_ads(u32)`, followed by a fresh
/// allocation-descriptor list at offset 24 (§4.6 continuation rule).
pub struct AllocationExtentDescriptor {
    #[allow(dead_code)]
    pub tag: Tag,
    pub length_of_ads: u32,
}

pub fn parse_allocation_extent(sector: &[u8]) -> Option<AllocationExtentDescriptor> {
    let tag = parse_tag(sector)?;
    Some(AllocationExtentDescriptor {
        tag,
        length_of_ads: u32_le(&sector[20..]),
    })
}

pub const ALLOCATION_EXTENT_HEADER_LEN: usize = 24;

impl EntityId {
    fn ref_copy(b: &[u8]) -> EntityId {
        EntityId {
            flags: b[0],
            identifier: b[1..24].try_into().unwrap(),
            identifier_suffix: b[24..32].try_into().unwrap(),
        }
    }
}
