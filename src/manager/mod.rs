use std::{
	fs::{self, File, OpenOptions},
	path::{Component, Path, PathBuf},
};

use hashbrown::HashMap;

use crate::fs::{FileAccess, FileSystem};
use crate::global::error::*;

/// Registry of open containers, keyed by normalized absolute path.
///
/// The manager enforces at most one [`FileSystem`] instance per path and
/// picks the backing stream for each container, a plain [`File`] here.
#[derive(Default)]
pub struct FileSystemManager {
	registry: HashMap<PathBuf, FileSystem<File>>,
}

impl FileSystemManager {
	/// An empty registry.
	pub fn new() -> FileSystemManager {
		FileSystemManager {
			registry: HashMap::new(),
		}
	}

	/// Creates a brand-new container at `path` and registers it. Any file
	/// already at that path is truncated. Fails with [`Error::PathOccupied`]
	/// when the path is already registered, and with [`Error::AccessDenied`]
	/// when `access` is not writable.
	pub fn create_file_system(
		&mut self, path: impl AsRef<Path>, access: FileAccess, max_file_count: u32, max_block_count: u32,
	) -> Result<&mut FileSystem<File>> {
		if !access.writable() {
			return Err(Error::AccessDenied("write"));
		};

		let full = normalize(path.as_ref())?;
		if self.registry.contains_key(&full) {
			return Err(Error::PathOccupied(full));
		};

		let handle = OpenOptions::new()
			.read(true)
			.write(true)
			.create(true)
			.truncate(true)
			.open(&full)?;

		let fs = match FileSystem::create(handle, access, max_file_count, max_block_count) {
			Ok(fs) => fs,
			Err(error) => {
				// don't leave a half-written container behind
				let _ = fs::remove_file(&full);
				return Err(error);
			},
		};

		Ok(self.registry.entry(full).or_insert(fs))
	}

	/// Loads an existing container at `path` and registers it.
	pub fn load_file_system(&mut self, path: impl AsRef<Path>, access: FileAccess) -> Result<&mut FileSystem<File>> {
		let full = normalize(path.as_ref())?;
		if self.registry.contains_key(&full) {
			return Err(Error::PathOccupied(full));
		};

		let handle = OpenOptions::new().read(true).write(access.writable()).open(&full)?;
		let fs = FileSystem::load(handle, access)?;

		Ok(self.registry.entry(full).or_insert(fs))
	}

	/// The registered container at `path`, if any.
	pub fn get_file_system(&self, path: impl AsRef<Path>) -> Option<&FileSystem<File>> {
		let full = normalize(path.as_ref()).ok()?;
		self.registry.get(&full)
	}

	/// Mutable access to the registered container at `path`, if any.
	pub fn get_file_system_mut(&mut self, path: impl AsRef<Path>) -> Option<&mut FileSystem<File>> {
		let full = normalize(path.as_ref()).ok()?;
		self.registry.get_mut(&full)
	}

	/// Whether a container is registered at `path`.
	pub fn has_file_system(&self, path: impl AsRef<Path>) -> bool {
		self.get_file_system(path).is_some()
	}

	/// Iterates over every registered container.
	pub fn file_systems(&self) -> impl Iterator<Item = (&Path, &FileSystem<File>)> {
		self.registry.iter().map(|(path, fs)| (path.as_path(), fs))
	}

	/// Count of registered containers.
	pub fn count(&self) -> usize {
		self.registry.len()
	}

	/// Unregisters the container at `path`, flushing and closing its handle,
	/// and optionally deleting the physical file.
	pub fn destroy_file_system(&mut self, path: impl AsRef<Path>, delete_physical_file: bool) -> Result<()> {
		let full = normalize(path.as_ref())?;

		let fs = match self.registry.remove(&full) {
			Some(fs) => fs,
			None => return Err(Error::PathNotRegistered(full)),
		};

		// read-only handles have nothing to sync
		let handle = fs.into_inner();
		let _ = handle.sync_all();
		drop(handle);

		if delete_physical_file {
			fs::remove_file(&full)?;
		};

		Ok(())
	}
}

/// Lexically normalizes `path` to an absolute form without touching the file
/// system; the container may not exist yet on create.
fn normalize(path: &Path) -> Result<PathBuf> {
	if path.as_os_str().is_empty() {
		return Err(Error::InvalidArgument("path is empty"));
	};

	let absolute = if path.is_absolute() {
		path.to_path_buf()
	} else {
		std::env::current_dir()?.join(path)
	};

	let mut out = PathBuf::new();
	for component in absolute.components() {
		match component {
			Component::CurDir => {},
			Component::ParentDir => {
				out.pop();
			},
			other => out.push(other),
		}
	}

	Ok(out)
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn normalization_is_lexical() {
		let a = normalize(Path::new("/data/packs/../packs/./base.pak")).unwrap();
		let b = normalize(Path::new("/data/packs/base.pak")).unwrap();
		assert_eq!(a, b);
	}

	#[test]
	fn empty_path_is_rejected() {
		assert!(matches!(normalize(Path::new("")), Err(Error::InvalidArgument(_))));
	}
}
