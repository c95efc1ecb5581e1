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

//! Builds the table mapping a logical partition reference number to its
//! starting physical block, including the UDF 2.50+ metadata-partition
//! indirection (spec.md §4.3).

use std::collections::HashMap;

use udf_ds::{read_exact_at, DataStorage};
use udf_err::{Error, Result};

use crate::descriptor::{PartitionDescriptor, PartitionMap};
use crate::extent::parse_list;
use crate::icb::parse_file_entry;

/// `logical_partition_start[i]`, indexed by position in the LVD's
/// `partition_maps` array (not by on-disk partition number).
pub fn build_partition_start_table<DS: DataStorage>(
    storage: &DS,
    sector_size: u64,
    partitions: &HashMap<u16, PartitionDescriptor>,
    maps: &[PartitionMap],
) -> Result<Vec<u64>> {
    let mut table = Vec::with_capacity(maps.len());
    for map in maps {
        let partition_number = match map {
            PartitionMap::Type1 { partition_number } => *partition_number,
            PartitionMap::Type2 { partition_number } => *partition_number,
        };
        let pd = partitions
            .get(&partition_number)
            .ok_or(Error::UnknownPartition(partition_number))?;
        let start = match map {
            PartitionMap::Type1 { .. } => pd.starting_location as u64,
            PartitionMap::Type2 { .. } => {
                resolve_metadata_partition(storage, sector_size, pd).unwrap_or(pd.starting_location as u64)
            }
        };
        table.push(start);
    }
    Ok(table)
}

/// Reads the sector at the partition's starting location as a File Entry;
/// if it parses and carries at least one allocation descriptor, the
/// metadata partition's true start is `starting_location + AD[0].location`.
/// Any other outcome (unparsable sector, no allocation descriptors) is
/// reported to the caller, which treats the map as a plain Type 1 mapping.
fn resolve_metadata_partition<DS: DataStorage>(
    storage: &DS,
    sector_size: u64,
    pd: &PartitionDescriptor,
) -> Option<u64> {
    let mut sector = vec![0u8; sector_size as usize];
    read_exact_at(storage, pd.starting_location as u64 * sector_size, &mut sector).ok()?;
    let fe = parse_file_entry(&sector).ok()?;
    let alloc_type = fe.icb_tag.allocation_type()?;
    let extents = parse_list(alloc_type, &fe.allocation_descriptors, 0);
    let first = extents.first()?;
    Some(pd.starting_location as u64 + first.location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::TAG_FILE_ENTRY;

    struct Mem(Vec<u8>);

    impl DataStorage for Mem {
        fn read_at(&self, offset: u64, buf: &mut [u8]) -> udf_err::Result<usize> {
            let offset = offset as usize;
            if offset >= self.0.len() {
                return Ok(0);
            }
            let n = buf.len().min(self.0.len() - offset);
            buf[..n].copy_from_slice(&self.0[offset..offset + n]);
            Ok(n)
        }
    }

    fn tagged_sector(tag_id: u16) -> Vec<u8> {
        let mut b = vec![0u8; 2048];
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

    fn pd(number: u16, starting_location: u32) -> PartitionDescriptor {
        PartitionDescriptor {
            tag: crate::tag::parse_tag(&tagged_sector(crate::tag::TAG_PARTITION)).unwrap(),
            partition_flags: 0,
            partition_number: number,
            partition_contents: crate::entity::EntityId {
                flags: 0,
                identifier: [0; 23],
                identifier_suffix: [0; 8],
            },
            access_type: 0,
            starting_location,
            length: 0,
        }
    }

    #[test]
    fn type1_map_resolves_directly() {
        let storage = Mem(vec![0u8; 4096]);
        let mut partitions = HashMap::new();
        partitions.insert(0, pd(0, 1000));
        let maps = vec![PartitionMap::Type1 { partition_number: 0 }];
        let table = build_partition_start_table(&storage, 2048, &partitions, &maps).unwrap();
        assert_eq!(table, vec![1000]);
    }

    #[test]
    fn type2_map_resolves_through_metadata_file_entry() {
        let mut image = vec![0u8; 4 * 2048];
        let mut meta_sector = tagged_sector(TAG_FILE_ENTRY);
        meta_sector[16 + 18] = 1; // Long descriptors
        meta_sector[172..176].copy_from_slice(&16u32.to_le_bytes()); // L_AD
        meta_sector[176..180].copy_from_slice(&100u32.to_le_bytes()); // extent length
        meta_sector[180..184].copy_from_slice(&7u32.to_le_bytes()); // extent block
        image[2048..4096].copy_from_slice(&meta_sector);

        let storage = Mem(image);
        let mut partitions = HashMap::new();
        partitions.insert(0, pd(0, 1));
        let maps = vec![PartitionMap::Type2 { partition_number: 0 }];
        let table = build_partition_start_table(&storage, 2048, &partitions, &maps).unwrap();
        assert_eq!(table, vec![1 + 7]);
    }

    #[test]
    fn unknown_partition_number_errors() {
        let storage = Mem(vec![0u8; 2048]);
        let partitions = HashMap::new();
        let maps = vec![PartitionMap::Type1 { partition_number: 5 }];
        assert!(matches!(
            build_partition_start_table(&storage, 2048, &partitions, &maps),
            Err(Error::UnknownPartition(5))
        ));
    }
}
