use std::{io::Read, sync::Arc};
use super::{error::*, name::NameSlot};

/// On-disk size of one block-table entry: a name slot plus cluster and length.
pub(crate) const ENTRY_SIZE: usize = NameSlot::BASE_SIZE + 8;

/// Descriptor of a contiguous cluster-aligned region of the data section. A
/// block is in use iff it carries a name; free blocks store a cluster-rounded
/// length while in-use blocks keep the exact byte length of their payload.
#[derive(Debug, Clone)]
pub(crate) struct Block {
	pub name: Option<Arc<str>>,
	pub cluster: u32,
	pub length: u32,
}

impl Block {
	pub fn free(cluster: u32, length: u32) -> Block {
		debug_assert!(length > 0 && length % crate::CLUSTER_SIZE == 0);
		Block {
			name: None,
			cluster,
			length,
		}
	}

	#[inline(always)]
	pub fn is_used(&self) -> bool {
		self.name.is_some()
	}

	/// Capacity in whole clusters. Every block occupies at least one cluster,
	/// including zero-length files.
	pub fn cluster_span(&self) -> u32 {
		self.length.div_ceil(crate::CLUSTER_SIZE).max(1)
	}

	pub fn end_cluster(&self) -> u32 {
		self.cluster + self.cluster_span()
	}

	pub fn from_handle<T: Read>(mut handle: T, seed: &[u8; crate::SEED_LENGTH]) -> Result<Block> {
		let slot = NameSlot::from_handle(&mut handle)?;

		let mut buffer = [0u8; 8];
		handle.read_exact(&mut buffer)?;
		let cluster = u32::from_le_bytes(buffer[0..4].try_into().unwrap());
		let length = u32::from_le_bytes(buffer[4..8].try_into().unwrap());

		let name = if slot.is_empty() {
			if length == 0 || length % crate::CLUSTER_SIZE != 0 {
				return Err(Error::CorruptedSource(format!(
					"free block at cluster: {cluster} has a misaligned length: {length}"
				)));
			};
			None
		} else {
			Some(slot.read(seed)?.into())
		};

		Ok(Block { name, cluster, length })
	}

	pub fn to_bytes(&self, seed: &[u8; crate::SEED_LENGTH]) -> Result<[u8; ENTRY_SIZE]> {
		let slot = match self.name.as_deref() {
			Some(name) => NameSlot::new(name, seed)?,
			None => NameSlot::empty(),
		};

		let mut buffer = [0u8; ENTRY_SIZE];
		buffer[0..NameSlot::BASE_SIZE].copy_from_slice(&slot.to_bytes());
		buffer[NameSlot::BASE_SIZE..NameSlot::BASE_SIZE + 4].copy_from_slice(&self.cluster.to_le_bytes());
		buffer[NameSlot::BASE_SIZE + 4..].copy_from_slice(&self.length.to_le_bytes());
		Ok(buffer)
	}
}
