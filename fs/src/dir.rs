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

//! File Identifier Descriptor stream decoding (spec.md §4.5).

use udf_ds::{read_exact_at, DataStorage};
use udf_err::Result;

use crate::codec::{d_characters, u16_le, u8};
use crate::icb::FileEntry;
use crate::reader::resolve_extents;
use crate::tag::parse_tag;

const FID_PRELUDE_LEN: usize = 38;

const CHAR_DELETED: u8 = 0x04;
const CHAR_PARENT: u8 = 0x08;

/// One decoded directory entry: enough to resolve the child's own ICB.
#[derive(Debug, Clone)]
pub struct FileIdentifier {
    pub name: String,
    pub characteristics: u8,
    pub icb_block: u32,
    pub icb_partition_ref: u16,
}

/// Parses one FID at the start of `b`, returning it and its on-disk stride
/// (already rounded up to a multiple of 4). `None` if `b` is too short for
/// even the fixed prelude, or its tag doesn't validate.
fn parse_fid(b: &[u8]) -> Option<(FileIdentifier, usize)> {
    if b.len() < FID_PRELUDE_LEN {
        return None;
    }
    parse_tag(b)?;
    let characteristics = u8(&b[18..]);
    let id_len = u8(&b[19..]) as usize;
    let icb_block = u32_le_at(&b[24..]);
    let icb_partition_ref = u16_le(&b[28..]);
    let iu_len = u16_le(&b[36..]) as usize;
    let id_start = FID_PRELUDE_LEN + iu_len;
    let id_end = id_start + id_len;
    if id_end > b.len() {
        return None;
    }
    let name = d_characters(&b[id_start..id_end], id_len);
    let stride = round_up_4(id_end);
    Some((
        FileIdentifier {
            name,
            characteristics,
            icb_block,
            icb_partition_ref,
        },
        stride,
    ))
}

fn u32_le_at(b: &[u8]) -> u32 {
    u32::from_le_bytes(b[0..4].try_into().unwrap())
}

fn round_up_4(n: usize) -> usize {
    (n + 3) & !3
}

/// Flattens a directory's allocation descriptor list (resolving any
/// continuations) into a single contiguous buffer, concatenating only the
/// recorded extents: a well-formed directory has no sparse extents, and a
/// sparse one contributes nothing to the FID stream (§4.5 step 1).
fn flatten<DS: DataStorage>(
    storage: &DS,
    sector_size: u64,
    partition_start: &[u64],
    own_partition: u16,
    fe: &FileEntry,
) -> Result<Vec<u8>> {
    let Some(alloc_type) = fe.icb_tag.allocation_type() else {
        return Ok(Vec::new());
    };
    if alloc_type == crate::extent::AllocationType::Embedded {
        return Ok(fe.allocation_descriptors.clone());
    }
    let extents = resolve_extents(
        storage,
        sector_size,
        partition_start,
        own_partition,
        alloc_type,
        &fe.allocation_descriptors,
    )?;
    let mut buf = Vec::new();
    for extent in extents {
        if extent.flag.is_sparse() {
            continue;
        }
        let start = *partition_start
            .get(extent.partition_ref as usize)
            .ok_or(udf_err::Error::UnknownPartition(extent.partition_ref))?;
        let offset = sector_size * (start + extent.location);
        let mut chunk = vec![0u8; extent.length as usize];
        read_exact_at(storage, offset, &mut chunk)?;
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

/// Reads and decodes a directory's FID stream, skipping the parent entry,
/// deleted entries, and empty-name entries (§4.5, §8 scenario 6). Stops
/// silently on trailing bytes too short for another FID, logging a warning.
pub fn read_directory<DS: DataStorage>(
    storage: &DS,
    sector_size: u64,
    partition_start: &[u64],
    own_partition: u16,
    fe: &FileEntry,
) -> Result<Vec<FileIdentifier>> {
    let buf = flatten(storage, sector_size, partition_start, own_partition, fe)?;
    let mut entries = Vec::new();
    let mut off = 0usize;
    while off + FID_PRELUDE_LEN <= buf.len() {
        let Some((fid, stride)) = parse_fid(&buf[off..]) else {
            log::warn!("directory stream truncated at offset {off}, stopping");
            break;
        };
        if !fid.name.is_empty() && fid.characteristics & (CHAR_PARENT | CHAR_DELETED) == 0 {
            entries.push(fid);
        }
        off += stride;
    }
    if off < buf.len() && buf.len() - off < FID_PRELUDE_LEN && !buf[off..].is_empty() {
        log::warn!(
            "directory stream has {} trailing byte(s) short of a full FID, tolerated",
            buf.len() - off
        );
    }
    Ok(entries)
}
