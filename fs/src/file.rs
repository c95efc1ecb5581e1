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

//! Public per-file handle: borrows its owning `Volume`, carries an eagerly
//! decoded File Entry so its accessors are infallible (spec.md §3
//! "Ownership and lifecycle", §6).

use udf_ds::DataStorage;
use udf_err::Result;

use crate::codec::Timestamp;
use crate::icb::FileEntry;
use crate::reader::{ContentReader, Plan};
use crate::volume::{DirEntryHandle, Volume};

/// Extracts the low 3 bits of each 5-bit permission group (owner, group,
/// other) and packs them into a conventional 9-bit POSIX mode, adding a
/// directory-type bit for directories (spec.md §6 "POSIX mode synthesis").
fn synthesize_mode(permissions: u32, is_dir: bool) -> u32 {
    const S_IFDIR: u32 = 0o040000;
    let other = permissions & 0x7;
    let group = (permissions >> 5) & 0x7;
    let owner = (permissions >> 10) & 0x7;
    let mut mode = (owner << 6) | (group << 3) | other;
    if is_dir {
        mode |= S_IFDIR;
    }
    mode
}

pub struct File<'v, DS: DataStorage> {
    volume: &'v Volume<DS>,
    name: String,
    icb_partition_ref: u16,
    icb_block: u32,
    entry: FileEntry,
}

impl<'v, DS: DataStorage> File<'v, DS> {
    pub(crate) fn new(
        volume: &'v Volume<DS>,
        name: String,
        icb_partition_ref: u16,
        icb_block: u32,
        entry: FileEntry,
    ) -> Self {
        Self {
            volume,
            name,
            icb_partition_ref,
            icb_block,
            entry,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dir(&self) -> bool {
        self.entry.is_directory()
    }

    pub fn mod_time(&self) -> Timestamp {
        self.entry.modification_time
    }

    pub fn mode(&self) -> u32 {
        synthesize_mode(self.entry.permissions, self.is_dir())
    }

    /// Absolute logical block of this file's own ICB.
    pub fn icb_position(&self) -> u64 {
        self.volume
            .absolute_block(self.icb_partition_ref, self.icb_block)
            .unwrap_or(self.icb_block as u64)
    }

    pub fn handle(&self) -> DirEntryHandle {
        DirEntryHandle::new(self.icb_partition_ref, self.icb_block)
    }

    /// Size of the file's content, resolved from its allocation plan
    /// (spec.md §4.6: logged and clamped on mismatch with `information_length`).
    pub fn size(&self) -> Result<u64> {
        Ok(self.build_plan()?.size())
    }

    pub fn reader(&self) -> Result<ContentReader<'v, DS>> {
        let plan = self.build_plan()?;
        Ok(ContentReader::new(self.volume.storage(), plan))
    }

    fn build_plan(&self) -> Result<Plan> {
        Plan::build(
            self.volume.storage(),
            self.volume.sector_size(),
            self.volume.partition_start(),
            self.icb_partition_ref,
            &self.entry,
        )
    }
}
