#![deny(missing_docs)]

/*!
A mutable single-file virtual file system, in pure Rust.

`packfs` packs named binary blobs into one random-access container file, the
kind of thing a game's resource updater uses to patch assets in place without
rewriting the whole archive. Files can be written, overwritten, renamed and
deleted; freed space is tracked at cluster granularity and adjacent free
regions coalesce, so the container stays compact across churn.

Stored names are masked with a per-archive XOR seed. That is obfuscation, not
encryption: it keeps asset names out of a casual hex dump and nothing more.

### 🀄 Show me some code _dang it!_

```
use std::io::Cursor;
use packfs::prelude::*;

// any Read + Write + Seek target works, here an in-memory buffer
let target = Cursor::new(Vec::new());

let mut fs = FileSystem::create(target, FileAccess::ReadWrite, 16, 32).unwrap();
fs.write_file("tank/turret.mesh", &[12, 23, 34, 45, 56, 67, 78, 90]).unwrap();
fs.write_file("tank/idle.wav", b"...pretend this is audio...").unwrap();

assert_eq!(fs.read_file("tank/turret.mesh").unwrap(), &[12, 23, 34, 45, 56, 67, 78, 90]);

fs.delete_file("tank/idle.wav").unwrap();
assert!(!fs.has_file("tank/idle.wav"));
```
*/


pub(crate) mod global;

pub(crate) mod fs;

pub(crate) mod manager;

/// Current `packfs` container format version.
pub const VERSION: u8 = 0;

/// Magic sequence identifying a `packfs` container: "GFF"
pub const MAGIC: [u8; crate::MAGIC_LENGTH] = *b"GFF";
pub(crate) const MAGIC_LENGTH: usize = 3;

/// The alignment unit for space bookkeeping. Every allocation is rounded up
/// to a whole number of clusters, free regions merge along cluster boundaries.
pub const CLUSTER_SIZE: u32 = 4096;

/// Maximum length, in bytes, of a stored file name.
pub const MAX_NAME_LENGTH: usize = 255;

/// Size of the per-archive name obfuscation seed.
pub const SEED_LENGTH: usize = 4;

// The data region addresses at most 2^31 bytes.
pub(crate) const MAX_CLUSTER_COUNT: u32 = ((i32::MAX as u32) + 1) / CLUSTER_SIZE;

/// Maximum size, in bytes, of a single stored file.
pub const MAX_FILE_SIZE: usize = i32::MAX as usize;

/// Consolidated crate imports.
pub mod prelude {
	pub use crate::global::{error::*, file_info::FileInfo};
	pub use crate::fs::{FileAccess, FileSystem};
	pub use crate::manager::FileSystemManager;
}

pub use crate::global::{
	error::{Error, Result},
	file_info::FileInfo,
};
pub use crate::fs::{FileAccess, FileSystem};
pub use crate::manager::FileSystemManager;
