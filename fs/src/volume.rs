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

//! Volume bootstrap: sector-size auto-detection, anchor discovery, the
//! Volume Descriptor Sequence walk, and root File Entry resolution
//! (spec.md §4.4).

use std::collections::HashMap;

use udf_ds::{read_exact_at, DataStorage};
use udf_err::{Error, Result};

use crate::descriptor::{
    parse_anchor, parse_file_set, parse_logical_volume, parse_partition, parse_primary_volume,
    AnchorVolumeDescriptorPointer, FileSetDescriptor, LogicalVolumeDescriptor,
    PartitionDescriptor, PrimaryVolumeDescriptor,
};
use crate::extent::Extent;
use crate::icb::{parse_file_entry, FileEntry};
use crate::partition::build_partition_start_table;
use crate::tag::{parse_tag, TAG_LOGICAL_VOLUME, TAG_PARTITION, TAG_PRIMARY_VOLUME, TAG_TERMINATING};

/// The sizes tried in order during sector-size auto-detection (spec.md
/// §4.4 step 1, §9 design note: bounded linear search, one read each).
const CANDIDATE_SECTOR_SIZES: [u64; 7] = [512, 1024, 2048, 4096, 8192, 16384, 32768];

const ANCHOR_LBA: u64 = 256;

/// Opaque reference to a directory's own ICB, returned by `Volume::root()`
/// and usable as the `entry` argument to `Volume::read_dir`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntryHandle {
    pub(crate) partition_ref: u16,
    pub(crate) block: u32,
}

impl DirEntryHandle {
    pub(crate) fn new(partition_ref: u16, block: u32) -> Self {
        Self { partition_ref, block }
    }
}

/// A bootstrapped, read-only UDF volume. Immutable after `open()`; every
/// accessor takes `&self`.
pub struct Volume<DS: DataStorage> {
    storage: DS,
    sector_size: u64,
    #[allow(dead_code)]
    primary_volume: Option<PrimaryVolumeDescriptor>,
    #[allow(dead_code)]
    partitions: HashMap<u16, PartitionDescriptor>,
    #[allow(dead_code)]
    logical_volume: LogicalVolumeDescriptor,
    file_set: FileSetDescriptor,
    partition_start: Vec<u64>,
    root_entry: FileEntry,
}

struct VdsScan {
    primary_volume: Option<PrimaryVolumeDescriptor>,
    partitions: HashMap<u16, PartitionDescriptor>,
    logical_volume: Option<LogicalVolumeDescriptor>,
}

impl<DS: DataStorage> Volume<DS> {
    /// Bootstraps a volume from a random-access byte source. See spec.md
    /// §4.4 for the five-step algorithm this follows.
    pub fn open(storage: DS) -> Result<Self> {
        let (sector_size, anchor) = detect_sector_size_and_anchor(&storage)?;

        let mut scan = walk_vds(&storage, sector_size, &anchor.main_vds_extent)?;
        if scan.logical_volume.is_none() {
            scan = walk_vds(&storage, sector_size, &anchor.reserve_vds_extent)?;
        }

        if scan.primary_volume.is_none() || scan.partitions.is_empty() || scan.logical_volume.is_none() {
            return Err(Error::BadDescriptor(
                "volume descriptor sequence lacks a PVD, LVD, or any PD",
            ));
        }
        let logical_volume = scan.logical_volume.unwrap();

        let partition_start = build_partition_start_table(
            &storage,
            sector_size,
            &scan.partitions,
            &logical_volume.partition_maps,
        )?;

        let (fsd_block, fsd_part_ref) = logical_volume.contents_use;
        let fsd_start = *partition_start
            .get(fsd_part_ref as usize)
            .ok_or(Error::UnknownPartition(fsd_part_ref))?;
        let mut fsd_sector = vec![0u8; sector_size as usize];
        read_exact_at(&storage, sector_size * (fsd_start + fsd_block as u64), &mut fsd_sector)?;
        let file_set = parse_file_set(&fsd_sector)?;

        let (root_block, root_part_ref) = file_set.root_icb;
        let root_start = *partition_start
            .get(root_part_ref as usize)
            .ok_or(Error::UnknownPartition(root_part_ref))?;
        let mut root_sector = vec![0u8; sector_size as usize];
        read_exact_at(&storage, sector_size * (root_start + root_block as u64), &mut root_sector)?;
        let root_entry = parse_file_entry(&root_sector)?;

        Ok(Self {
            storage,
            sector_size,
            primary_volume: scan.primary_volume,
            partitions: scan.partitions,
            logical_volume,
            file_set,
            partition_start,
            root_entry,
        })
    }

    pub fn root(&self) -> DirEntryHandle {
        DirEntryHandle::new(self.file_set.root_icb.1, self.file_set.root_icb.0)
    }

    /// Lists the children of `entry` (root if `None`), decoding each
    /// child's own File Entry eagerly so `File`'s accessors are infallible.
    pub fn read_dir(&self, entry: Option<DirEntryHandle>) -> Result<Vec<crate::file::File<'_, DS>>> {
        let (partition_ref, _block, fe) = match entry {
            None => (self.file_set.root_icb.1, self.file_set.root_icb.0, self.root_entry.clone()),
            Some(handle) => {
                let fe = self.read_entry_at(handle.partition_ref, handle.block)?;
                (handle.partition_ref, handle.block, fe)
            }
        };
        if !fe.is_directory() {
            return Err(Error::BadDescriptor("read_dir entry is not a directory"));
        }

        let fids = crate::dir::read_directory(&self.storage, self.sector_size, &self.partition_start, partition_ref, &fe)?;
        let mut files = Vec::with_capacity(fids.len());
        for fid in fids {
            let child_entry = self.read_entry_at(fid.icb_partition_ref, fid.icb_block)?;
            files.push(crate::file::File::new(self, fid.name, fid.icb_partition_ref, fid.icb_block, child_entry));
        }
        Ok(files)
    }

    pub(crate) fn storage(&self) -> &DS {
        &self.storage
    }

    pub(crate) fn sector_size(&self) -> u64 {
        self.sector_size
    }

    pub(crate) fn partition_start(&self) -> &[u64] {
        &self.partition_start
    }

    pub(crate) fn absolute_block(&self, partition_ref: u16, block: u32) -> Result<u64> {
        let start = *self
            .partition_start
            .get(partition_ref as usize)
            .ok_or(Error::UnknownPartition(partition_ref))?;
        Ok(start + block as u64)
    }

    fn read_entry_at(&self, partition_ref: u16, block: u32) -> Result<FileEntry> {
        let abs = self.absolute_block(partition_ref, block)?;
        let mut sector = vec![0u8; self.sector_size as usize];
        read_exact_at(&self.storage, self.sector_size * abs, &mut sector)?;
        parse_file_entry(&sector)
    }
}

fn detect_sector_size_and_anchor<DS: DataStorage>(
    storage: &DS,
) -> Result<(u64, AnchorVolumeDescriptorPointer)> {
    for &sector_size in &CANDIDATE_SECTOR_SIZES {
        let mut sector = vec![0u8; sector_size as usize];
        if read_exact_at(storage, sector_size * ANCHOR_LBA, &mut sector).is_err() {
            continue;
        }
        if let Some(anchor) = parse_anchor(&sector) {
            if anchor.tag.tag_id == crate::tag::TAG_ANCHOR_VOLUME_POINTER {
                return Ok((sector_size, anchor));
            }
        }
    }
    Err(Error::NoAnchor)
}

/// Walks one Volume Descriptor Sequence extent, recording the last-seen
/// PVD, every PD keyed by partition number, and the last-seen LVD, until a
/// Terminating descriptor or the extent's sector count is exhausted.
fn walk_vds<DS: DataStorage>(storage: &DS, sector_size: u64, extent: &Extent) -> Result<VdsScan> {
    let mut scan = VdsScan {
        primary_volume: None,
        partitions: HashMap::new(),
        logical_volume: None,
    };
    let sector_count = (extent.length as u64).div_ceil(sector_size).max(1);
    for i in 0..sector_count {
        let mut sector = vec![0u8; sector_size as usize];
        if read_exact_at(storage, sector_size * (extent.location + i), &mut sector).is_err() {
            break;
        }
        let Some(tag) = parse_tag(&sector) else {
            log::warn!("skipping descriptor with bad tag checksum at VDS sector {i}");
            continue;
        };
        match tag.tag_id {
            TAG_PRIMARY_VOLUME => {
                if let Some(pvd) = parse_primary_volume(&sector) {
                    scan.primary_volume = Some(pvd);
                }
            }
            TAG_PARTITION => {
                if let Some(pd) = parse_partition(&sector) {
                    scan.partitions.insert(pd.partition_number, pd);
                }
            }
            TAG_LOGICAL_VOLUME => match parse_logical_volume(&sector) {
                Ok(lvd) => scan.logical_volume = Some(lvd),
                Err(err) => log::warn!("skipping malformed logical volume descriptor: {err}"),
            },
            TAG_TERMINATING => break,
            _ => {}
        }
    }
    Ok(scan)
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn tagged(tag_id: u16, len: usize) -> Vec<u8> {
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

    /// Builds a minimal image: one partition, one LVD pointing at an FSD,
    /// whose root ICB is an embedded empty directory. Exercises the full
    /// bootstrap end to end (spec.md §8 scenario "SectorSize512" variant).
    fn minimal_image(sector_size: usize) -> Vec<u8> {
        let sectors = 260;
        let mut image = vec![0u8; sectors * sector_size];
        let put = |image: &mut Vec<u8>, lba: usize, sector: Vec<u8>| {
            image[lba * sector_size..lba * sector_size + sector.len()].copy_from_slice(&sector);
        };

        let mut anchor = tagged(crate::tag::TAG_ANCHOR_VOLUME_POINTER, sector_size);
        anchor[16..20].copy_from_slice(&(4 * sector_size as u32).to_le_bytes()); // main_vds length: 4 sectors
        anchor[20..24].copy_from_slice(&17u32.to_le_bytes()); // main_vds location
        put(&mut image, 256, anchor);

        let pvd = tagged(crate::tag::TAG_PRIMARY_VOLUME, sector_size);
        put(&mut image, 17, pvd);

        let mut pd = tagged(crate::tag::TAG_PARTITION, sector_size);
        pd[22..24].copy_from_slice(&0u16.to_le_bytes());
        pd[188..192].copy_from_slice(&30u32.to_le_bytes()); // starting_location
        put(&mut image, 18, pd);

        let mut lvd = tagged(crate::tag::TAG_LOGICAL_VOLUME, sector_size);
        lvd[252..256].copy_from_slice(&0u32.to_le_bytes()); // FSD block
        lvd[256..258].copy_from_slice(&0u16.to_le_bytes()); // FSD partition ref
        lvd[264..268].copy_from_slice(&6u32.to_le_bytes()); // map table length
        lvd[268..272].copy_from_slice(&1u32.to_le_bytes()); // n partition maps
        lvd[440] = 1;
        lvd[441] = 6;
        lvd[444..446].copy_from_slice(&0u16.to_le_bytes());
        put(&mut image, 19, lvd);

        let terminator = tagged(crate::tag::TAG_TERMINATING, sector_size);
        put(&mut image, 20, terminator);

        // FSD at partition 0, block 0 => absolute block 30.
        let mut fsd = tagged(crate::tag::TAG_FILE_SET, sector_size);
        fsd[404..408].copy_from_slice(&1u32.to_le_bytes()); // root ICB block
        fsd[408..410].copy_from_slice(&0u16.to_le_bytes()); // root ICB partition ref
        put(&mut image, 30, fsd);

        // Root File Entry at partition 0, block 1 => absolute block 31.
        let mut root_fe = tagged(crate::tag::TAG_FILE_ENTRY, sector_size);
        root_fe[16 + 11] = crate::icb::FILE_TYPE_DIRECTORY;
        root_fe[16 + 18] = 3; // Embedded
        root_fe[172..176].copy_from_slice(&0u32.to_le_bytes()); // L_AD = 0 (empty dir)
        put(&mut image, 31, root_fe);

        image
    }

    #[test]
    fn bootstraps_minimal_volume_and_lists_empty_root() {
        let image = minimal_image(2048);
        let storage = Mem(image);
        let volume = Volume::open(storage).unwrap();
        let children = volume.read_dir(None).unwrap();
        assert!(children.is_empty());
    }

    #[test]
    fn no_anchor_at_any_sector_size_errors() {
        let storage = Mem(vec![0u8; 32768 * 257]);
        assert!(matches!(Volume::open(storage), Err(Error::NoAnchor)));
    }
}
