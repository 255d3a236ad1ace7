use std::{
	fmt,
	io::{Read, Seek, SeekFrom, Write},
	sync::Arc,
};

use parking_lot::Mutex;

use crate::global::{
	block::Block,
	error::*,
	file_info::FileInfo,
	header::Header,
};

pub(crate) mod table;
use table::BlockTable;

/// The access mode a container is opened with. Creation always requires a
/// writable mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAccess {
	/// Look, don't touch.
	Read,
	/// Mutating operations only.
	Write,
	/// The default for a container you own.
	ReadWrite,
}

impl FileAccess {
	/// Whether this mode permits reading file data.
	pub fn readable(&self) -> bool {
		matches!(self, FileAccess::Read | FileAccess::ReadWrite)
	}

	/// Whether this mode permits mutating the container.
	pub fn writable(&self) -> bool {
		matches!(self, FileAccess::Write | FileAccess::ReadWrite)
	}
}

impl Default for FileAccess {
	fn default() -> FileAccess {
		FileAccess::ReadWrite
	}
}

/// A single-file virtual file system over any seekable byte stream.
///
/// The backing handle is exclusively owned for the instance's lifetime and
/// wrapped in a [`Mutex`] so that read operations work through `&self`;
/// mutating operations take `&mut self` and never contend for the lock.
///
/// There is no internal serialization beyond that: one instance, one owner.
/// Use [`FileSystemManager`](crate::manager::FileSystemManager) to enforce at
/// most one instance per path.
pub struct FileSystem<T> {
	handle: Mutex<T>,
	header: Header,
	table: BlockTable,
	access: FileAccess,
}

impl<T> FileSystem<T> {
	/// The access mode this container was opened with.
	pub fn access(&self) -> FileAccess {
		self.access
	}

	/// Count of files currently stored.
	pub fn file_count(&self) -> usize {
		self.table.file_count()
	}

	/// The file-count ceiling fixed at creation.
	pub fn max_file_count(&self) -> u32 {
		self.header.max_file_count
	}

	/// Count of live block-table entries, free blocks included.
	pub fn block_count(&self) -> usize {
		self.table.blocks.len()
	}

	/// The block-table ceiling fixed at creation.
	pub fn max_block_count(&self) -> u32 {
		self.header.max_block_count
	}

	/// O(1) index lookup.
	pub fn has_file(&self, name: impl AsRef<str>) -> bool {
		self.table.index.contains_key(name.as_ref())
	}

	/// Metadata of the named file, without touching its bytes.
	pub fn file_info(&self, name: impl AsRef<str>) -> Option<FileInfo> {
		let &slot = self.table.index.get(name.as_ref())?;
		self.info_at(slot)
	}

	/// A snapshot of every stored file's metadata.
	pub fn file_infos(&self) -> Vec<FileInfo> {
		(0..self.table.blocks.len()).filter_map(|slot| self.info_at(slot)).collect()
	}

	fn info_at(&self, slot: usize) -> Option<FileInfo> {
		let block = &self.table.blocks[slot];
		Some(FileInfo {
			name: block.name.clone()?,
			offset: self.data_offset(block.cluster),
			length: block.length,
		})
	}

	fn data_offset(&self, cluster: u32) -> u64 {
		self.header.data_offset() + cluster as u64 * crate::CLUSTER_SIZE as u64
	}

	/// Consume the [`FileSystem`] and return the underlying handle.
	pub fn into_inner(self) -> T {
		self.handle.into_inner()
	}
}

impl<T> fmt::Display for FileSystem<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"[FileSystem] version: {}, files: {}/{}, blocks: {}/{}",
			self.header.version,
			self.file_count(),
			self.header.max_file_count,
			self.block_count(),
			self.header.max_block_count,
		)
	}
}

impl<T> FileSystem<T>
where
	T: Read + Seek,
{
	/// Parses a [`FileSystem`] from an existing container.
	///
	/// Structural corruption is fatal for the source: a mismatched magic or
	/// version, an out-of-range block count or an inconsistent block table
	/// all refuse to load. Discard the container and fetch it again.
	pub fn load(mut handle: T, access: FileAccess) -> Result<FileSystem<T>> {
		// start reading from the start of the input
		handle.seek(SeekFrom::Start(0))?;

		let header = Header::from_handle(&mut handle)?;
		header.validate()?;

		// the block table sits contiguously right behind the header
		let mut blocks = Vec::with_capacity(header.block_count as usize);
		for _ in 0..header.block_count {
			blocks.push(Block::from_handle(&mut handle, &header.seed)?);
		}

		let table = BlockTable::from_blocks(blocks, header.max_file_count, header.max_block_count)?;

		Ok(FileSystem {
			handle: Mutex::new(handle),
			header,
			table,
			access,
		})
	}

	/// Reads the named file's bytes in full.
	pub fn read_file(&self, name: impl AsRef<str>) -> Result<Vec<u8>> {
		let name = name.as_ref();
		self.read_file_segment(name, 0, self.length_of(name)?)
	}

	/// Reads `length` bytes of the named file starting at `offset` into its
	/// data. The requested window must lie within the stored length.
	pub fn read_file_segment(&self, name: impl AsRef<str>, offset: u32, length: u32) -> Result<Vec<u8>> {
		if !self.access.readable() {
			return Err(Error::AccessDenied("read"));
		};

		let name = name.as_ref();
		let &slot = self
			.table
			.index
			.get(name)
			.ok_or_else(|| Error::NotFound(name.to_string()))?;
		let block = &self.table.blocks[slot];

		if offset as u64 + length as u64 > block.length as u64 {
			return Err(Error::InvalidArgument("segment lies outside the stored file"));
		};

		let mut buffer = vec![0u8; length as usize];
		let mut guard = self.handle.lock();
		guard.seek(SeekFrom::Start(self.data_offset(block.cluster) + offset as u64))?;
		guard.read_exact(&mut buffer)?;

		Ok(buffer)
	}

	fn length_of(&self, name: &str) -> Result<u32> {
		match self.table.index.get(name) {
			Some(&slot) => Ok(self.table.blocks[slot].length),
			None => Err(Error::NotFound(name.to_string())),
		}
	}
}

impl<T> FileSystem<T>
where
	T: Read + Write + Seek,
{
	/// Initializes a brand-new container on `handle`: a header with a fresh
	/// random obfuscation seed, and a block table holding a single free block
	/// spanning the whole allocatable cluster range.
	pub fn create(handle: T, access: FileAccess, max_file_count: u32, max_block_count: u32) -> Result<FileSystem<T>> {
		if !access.writable() {
			return Err(Error::AccessDenied("write"));
		};

		if max_file_count == 0 || max_block_count == 0 {
			return Err(Error::InvalidArgument("capacities must be greater than zero"));
		};

		if max_file_count > max_block_count {
			return Err(Error::InvalidArgument("max_file_count cannot exceed max_block_count"));
		};

		let header = Header::new(max_file_count, max_block_count);
		let table = BlockTable::new(max_file_count, max_block_count);

		let mut fs = FileSystem {
			handle: Mutex::new(handle),
			header,
			table,
			access,
		};

		let fresh = fs.table.clone();
		fs.commit(fresh, &[0])?;
		fs.flush()?;
		Ok(fs)
	}

	/// Stores `data` under `name`, overwriting any previous content.
	///
	/// A replacement whose rounded size still fits the existing block is
	/// overwritten in place; otherwise the old block is freed (coalescing
	/// with its neighbours) and the write proceeds as a fresh insert. All
	/// stream writes happen before the in-memory state is swapped, so an I/O
	/// failure leaves the index agreeing with the disk.
	pub fn write_file(&mut self, name: impl AsRef<str>, data: &[u8]) -> Result<()> {
		let name = name.as_ref();
		self.check_writable_name(name)?;

		if data.len() > crate::MAX_FILE_SIZE {
			return Err(Error::CapacityExceeded("file length"));
		};

		let length = data.len() as u32;
		let mut table = self.table.clone();
		let mut dirty = Vec::new();

		let slot = match table.index.get(name).copied() {
			Some(slot) => {
				let old_cluster = table.blocks[slot].cluster;
				let old_span = table.blocks[slot].cluster_span();
				let new_span = length.div_ceil(crate::CLUSTER_SIZE).max(1);

				if new_span <= old_span {
					// overwrite in place
					table.blocks[slot].length = length;
					dirty.push(slot);

					if new_span < old_span {
						table.insert_free(old_cluster + new_span, old_span - new_span, &mut dirty);
					};
					slot
				} else {
					table.release(name, &mut dirty)?;
					table.allocate(Arc::from(name), length, &mut dirty)?
				}
			},
			None => table.allocate(Arc::from(name), length, &mut dirty)?,
		};

		// payload first, then the touched table entries, then the header
		let offset = self.data_offset(table.blocks[slot].cluster);
		{
			let handle = self.handle.get_mut();
			handle.seek(SeekFrom::Start(offset))?;
			handle.write_all(data)?;
		}

		self.commit(table, &dirty)
	}

	/// Removes the named file, merging its clusters with any physically
	/// adjacent free blocks.
	pub fn delete_file(&mut self, name: impl AsRef<str>) -> Result<()> {
		if !self.access.writable() {
			return Err(Error::AccessDenied("write"));
		};

		let mut table = self.table.clone();
		let mut dirty = Vec::new();
		table.release(name.as_ref(), &mut dirty)?;

		self.commit(table, &dirty)
	}

	/// Relabels `old` as `new`. Pure metadata, the data region is untouched.
	pub fn rename(&mut self, old: impl AsRef<str>, new: impl AsRef<str>) -> Result<()> {
		let new = new.as_ref();
		self.check_writable_name(new)?;

		let mut table = self.table.clone();
		let mut dirty = Vec::new();
		table.rename(old.as_ref(), Arc::from(new), &mut dirty)?;

		self.commit(table, &dirty)
	}

	/// Flushes the underlying handle.
	pub fn flush(&mut self) -> Result<()> {
		self.handle.get_mut().flush()?;
		Ok(())
	}

	fn check_writable_name(&self, name: &str) -> Result<()> {
		if !self.access.writable() {
			return Err(Error::AccessDenied("write"));
		};

		if name.is_empty() {
			return Err(Error::InvalidArgument("file name is empty"));
		};

		if name.len() > crate::MAX_NAME_LENGTH {
			return Err(Error::NameSizeOverflow(name.to_string()));
		};

		Ok(())
	}

	/// Persists the dirty entries of `table`, then the header, then swaps the
	/// scratch table in. The header goes last so a torn write leaves the old
	/// block count covering only entries that were valid before the call.
	fn commit(&mut self, table: BlockTable, dirty: &[usize]) -> Result<()> {
		let seed = self.header.seed;
		let count = table.blocks.len();

		{
			let handle = self.handle.get_mut();
			let mut written: Vec<usize> = Vec::with_capacity(dirty.len());

			for &slot in dirty {
				// slots past the shrunk count are dead, the header no longer covers them
				if slot >= count || written.contains(&slot) {
					continue;
				};

				let bytes = table.blocks[slot].to_bytes(&seed)?;
				handle.seek(SeekFrom::Start(Header::entry_offset(slot)))?;
				handle.write_all(&bytes)?;
				written.push(slot);
			}
		}

		let mut header = self.header.clone();
		header.block_count = count as u32;

		let handle = self.handle.get_mut();
		handle.seek(SeekFrom::Start(0))?;
		handle.write_all(&header.to_bytes())?;

		self.header = header;
		self.table = table;
		Ok(())
	}
}
