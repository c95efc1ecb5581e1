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

//! Entity Identifier: a 32-byte opaque domain tag (e.g. `*OSTA UDF Compliant`).

use zerocopy::{FromBytes, Immutable, KnownLayout};

#[repr(C)]
#[derive(Clone, Copy, FromBytes, Immutable, KnownLayout)]
pub struct EntityId {
    pub flags: u8,
    pub identifier: [u8; 23],
    pub identifier_suffix: [u8; 8],
}

impl EntityId {
    pub fn identifier_str(&self) -> std::borrow::Cow<'_, str> {
        let end = self
            .identifier
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.identifier.len());
        String::from_utf8_lossy(&self.identifier[..end])
    }
}

impl std::fmt::Debug for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityId")
            .field("flags", &self.flags)
            .field("identifier", &self.identifier_str())
            .finish()
    }
}
