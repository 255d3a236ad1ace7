use std::{fmt, sync::Arc};

/// Stand-alone, read-only metadata for a stored file. This is a projection of
/// a live block-table entry, it carries no capability to mutate the container.
#[derive(Debug, Clone)]
pub struct FileInfo {
	/// The file's name.
	pub name: Arc<str>,
	/// Absolute byte offset of the file's data in the backing stream.
	pub offset: u64,
	/// Exact length of the file's data in bytes.
	pub length: u32,
}

impl fmt::Display for FileInfo {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(
			f,
			"[FileInfo] name: {}, offset: {}, length: {}B",
			self.name, self.offset, self.length
		)
	}
}
