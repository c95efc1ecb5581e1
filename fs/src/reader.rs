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

//! Flattens a (possibly chained, possibly sparse) allocation-descriptor list
//! into an ordered, seekable byte-range plan, and the reader that serves
//! bytes from it (spec.md §4.6).

use std::io::SeekFrom;

use udf_ds::{read_exact_at, DataStorage};
use udf_err::{Error, Result};

use crate::descriptor::{parse_allocation_extent, ALLOCATION_EXTENT_HEADER_LEN};
use crate::extent::{parse_list, AllocationType, Extent};
use crate::icb::FileEntry;

#[derive(Debug, Clone)]
enum Source {
    Absolute(u64),
    Sparse,
    /// Data lives in the File Entry's own AD area (ICB alloc_type = Embedded).
    Inline(std::sync::Arc<[u8]>),
}

#[derive(Debug, Clone)]
struct Segment {
    logical_start: u64,
    logical_length: u64,
    source: Source,
}

/// An ordered, immutable plan of where a file's bytes live. Shared (not
/// mutable) state: independent `ContentReader`s built from the same plan
/// hold their own cursor.
#[derive(Debug, Clone)]
pub struct Plan {
    segments: Vec<Segment>,
    size: u64,
}

impl Plan {
    /// Builds the plan for a File Entry, resolving embedded content, flat
    /// extent lists, sparse extents, and allocation-extent continuations.
    pub fn build<DS: DataStorage>(
        storage: &DS,
        sector_size: u64,
        partition_start: &[u64],
        own_partition: u16,
        fe: &FileEntry,
    ) -> Result<Plan> {
        let alloc_type = fe
            .icb_tag
            .allocation_type()
            .ok_or(Error::BadFileEntry)?;

        if alloc_type == AllocationType::Embedded {
            let len = (fe.allocation_descriptors.len() as u64).min(fe.information_length);
            let content: std::sync::Arc<[u8]> =
                fe.allocation_descriptors[..len as usize].into();
            return Ok(Plan {
                segments: vec![Segment {
                    logical_start: 0,
                    logical_length: len,
                    source: Source::Inline(content),
                }],
                size: len,
            });
        }

        let extents = resolve_extents(
            storage,
            sector_size,
            partition_start,
            own_partition,
            alloc_type,
            &fe.allocation_descriptors,
        )?;

        let mut segments = Vec::with_capacity(extents.len());
        let mut logical_start = 0u64;
        for extent in &extents {
            let source = if extent.flag.is_sparse() {
                Source::Sparse
            } else {
                let start = *partition_start
                    .get(extent.partition_ref as usize)
                    .ok_or(Error::UnknownPartition(extent.partition_ref))?;
                Source::Absolute(sector_size * (start + extent.location))
            };
            segments.push(Segment {
                logical_start,
                logical_length: extent.length as u64,
                source,
            });
            logical_start += extent.length as u64;
        }

        let size = logical_start;
        if size != fe.information_length {
            log::warn!(
                "file content plan length {size} does not match information_length {}",
                fe.information_length
            );
        }
        Ok(Plan {
            segments,
            size: size.min(fe.information_length),
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Resolves a raw allocation-descriptor list into a flat, continuation-free
/// list of extents: continuation entries (flag bits `11`) are followed into
/// their Allocation Extent Descriptor and replaced by the extents it
/// contains; the continuation entry itself contributes nothing.
pub(crate) fn resolve_extents<DS: DataStorage>(
    storage: &DS,
    sector_size: u64,
    partition_start: &[u64],
    own_partition: u16,
    alloc_type: AllocationType,
    ad_bytes: &[u8],
) -> Result<Vec<Extent>> {
    let mut out = Vec::new();
    for extent in parse_list(alloc_type, ad_bytes, own_partition) {
        if extent.flag.is_continuation() {
            let start = *partition_start
                .get(extent.partition_ref as usize)
                .ok_or(Error::UnknownPartition(extent.partition_ref))?;
            let aed_offset = sector_size * (start + extent.location);

            let mut header = vec![0u8; ALLOCATION_EXTENT_HEADER_LEN];
            read_exact_at(storage, aed_offset, &mut header)?;
            let aed = parse_allocation_extent(&header).ok_or(Error::BadDescriptor("bad AED tag"))?;

            let mut body = vec![0u8; aed.length_of_ads as usize];
            read_exact_at(storage, aed_offset + ALLOCATION_EXTENT_HEADER_LEN as u64, &mut body)?;

            let nested = resolve_extents(storage, sector_size, partition_start, own_partition, alloc_type, &body)?;
            out.extend(nested);
        } else {
            out.push(extent);
        }
    }
    Ok(out)
}

/// A seekable, independent cursor over a `Plan`. Multiple readers over the
/// same plan share no mutable state.
pub struct ContentReader<'v, DS> {
    storage: &'v DS,
    plan: Plan,
    pos: u64,
}

impl<'v, DS: DataStorage> ContentReader<'v, DS> {
    pub fn new(storage: &'v DS, plan: Plan) -> Self {
        Self {
            storage,
            plan,
            pos: 0,
        }
    }

    pub fn size(&self) -> u64 {
        self.plan.size
    }

    /// Reads into `buf` starting at the next cursor position, advancing it.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.read_at(buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }

    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => n as i128,
            SeekFrom::Current(n) => self.pos as i128 + n as i128,
            SeekFrom::End(n) => self.plan.size as i128 + n as i128,
        };
        if target < 0 || target as u64 > self.plan.size {
            return Err(Error::SeekPastEnd);
        }
        self.pos = target as u64;
        Ok(self.pos)
    }

    /// Reads `buf.len()` bytes (or up to EOF) starting at absolute logical
    /// offset `off`, without touching the cursor. Walks segments in order,
    /// filling zeros for sparse ranges and delegating to the underlying
    /// source for recorded ranges, stopping at EOF or an underlying error.
    pub fn read_at(&self, mut buf: &mut [u8], mut off: u64) -> Result<usize> {
        if off >= self.plan.size {
            return Ok(0);
        }
        let mut total = 0usize;
        for segment in &self.plan.segments {
            if buf.is_empty() || off >= self.plan.size {
                break;
            }
            let segment_end = segment.logical_start + segment.logical_length;
            if off < segment.logical_start || off >= segment_end {
                continue;
            }
            let within = off - segment.logical_start;
            let available = (segment_end - off) as usize;
            let chunk_len = buf.len().min(available);
            match &segment.source {
                Source::Sparse => {
                    buf[..chunk_len].fill(0);
                }
                Source::Inline(data) => {
                    buf[..chunk_len].copy_from_slice(&data[within as usize..within as usize + chunk_len]);
                }
                Source::Absolute(base) => {
                    let read = self.storage.read_at(base + within, &mut buf[..chunk_len])?;
                    if read < chunk_len {
                        buf[read..chunk_len].fill(0);
                        total += chunk_len;
                        break;
                    }
                }
            }
            total += chunk_len;
            off += chunk_len as u64;
            buf = &mut buf[chunk_len..];
        }
        Ok(total)
    }
}
