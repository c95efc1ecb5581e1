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

//! Read-only reader for ISO/IEC 13346 (ECMA-167) UDF filesystems.

mod codec;
mod descriptor;
mod dir;
mod entity;
mod extent;
mod icb;
mod partition;
mod reader;
mod tag;

mod file;
mod volume;

pub use codec::Timestamp;
pub use file::File;
pub use reader::ContentReader;
pub use udf_err::{Error, Result};
pub use volume::{DirEntryHandle, Volume};
