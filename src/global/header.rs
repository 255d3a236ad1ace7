use std::io::Read;
use super::{block::ENTRY_SIZE, error::*};

/// The container's super-block: magic, format version, the name obfuscation
/// seed and the capacity limits fixed at creation time.
#[derive(Debug, Clone)]
pub(crate) struct Header {
	pub magic: [u8; crate::MAGIC_LENGTH],
	pub version: u8,
	pub seed: [u8; crate::SEED_LENGTH],
	pub max_file_count: u32,
	pub max_block_count: u32,
	/// Count of block-table entries currently serialized. Rewritten after the
	/// entries it covers, so a torn write leaves the old count pointing at
	/// still-valid entries.
	pub block_count: u32,
}

impl Header {
	pub const BASE_SIZE: usize = crate::MAGIC_LENGTH + 1 + crate::SEED_LENGTH + 12;

	/// A fresh header for a brand-new container, with a randomized seed.
	pub fn new(max_file_count: u32, max_block_count: u32) -> Header {
		Header {
			magic: crate::MAGIC,
			version: crate::VERSION,
			seed: rand::random(),
			max_file_count,
			max_block_count,
			block_count: 1,
		}
	}

	/// Validates the MAGIC, the version and the capacity invariants.
	pub fn validate(&self) -> Result {
		if self.magic != crate::MAGIC {
			return Err(Error::MalformedSource(self.magic));
		};

		if self.version != crate::VERSION {
			return Err(Error::IncompatibleVersion(self.version));
		};

		if self.max_file_count == 0 || self.max_block_count == 0 || self.max_file_count > self.max_block_count {
			return Err(Error::CorruptedSource(format!(
				"inconsistent capacities, max_file_count: {}, max_block_count: {}",
				self.max_file_count, self.max_block_count
			)));
		};

		if self.block_count == 0 || self.block_count > self.max_block_count {
			return Err(Error::CorruptedSource(format!(
				"block count: {} outside of (0, {}]",
				self.block_count, self.max_block_count
			)));
		};

		Ok(())
	}

	pub fn from_handle<T: Read>(mut handle: T) -> Result<Header> {
		let mut buffer: [u8; Header::BASE_SIZE] = [0u8; Header::BASE_SIZE];
		handle.read_exact(&mut buffer)?;

		Ok(Header {
			magic: buffer[0..crate::MAGIC_LENGTH].try_into().unwrap(),
			version: buffer[3],
			seed: buffer[4..8].try_into().unwrap(),
			max_file_count: u32::from_le_bytes(buffer[8..12].try_into().unwrap()),
			max_block_count: u32::from_le_bytes(buffer[12..16].try_into().unwrap()),
			block_count: u32::from_le_bytes(buffer[16..20].try_into().unwrap()),
		})
	}

	pub fn to_bytes(&self) -> [u8; Header::BASE_SIZE] {
		let mut buffer: [u8; Header::BASE_SIZE] = [0u8; Header::BASE_SIZE];
		buffer[0..crate::MAGIC_LENGTH].copy_from_slice(&self.magic);
		buffer[3] = self.version;
		buffer[4..8].copy_from_slice(&self.seed);
		buffer[8..12].copy_from_slice(&self.max_file_count.to_le_bytes());
		buffer[12..16].copy_from_slice(&self.max_block_count.to_le_bytes());
		buffer[16..20].copy_from_slice(&self.block_count.to_le_bytes());
		buffer
	}

	/// Absolute stream offset of the block-table entry at `slot`.
	pub fn entry_offset(slot: usize) -> u64 {
		(Header::BASE_SIZE + slot * ENTRY_SIZE) as u64
	}

	/// Absolute stream offset where the data region begins. The table region
	/// always reserves room for `max_block_count` entries, so a growing table
	/// never moves data.
	pub fn data_offset(&self) -> u64 {
		let table_end = (Header::BASE_SIZE + self.max_block_count as usize * ENTRY_SIZE) as u64;
		table_end.div_ceil(crate::CLUSTER_SIZE as u64) * crate::CLUSTER_SIZE as u64
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn validates_a_fresh_header() {
		let header = Header::new(8, 16);
		assert!(header.validate().is_ok());
	}

	#[test]
	fn rejects_foreign_magic() {
		let mut header = Header::new(8, 16);
		header.magic = *b"WAD";
		assert!(matches!(header.validate(), Err(Error::MalformedSource(_))));
	}

	#[test]
	fn rejects_unknown_version() {
		let mut header = Header::new(8, 16);
		header.version = 7;
		assert!(matches!(header.validate(), Err(Error::IncompatibleVersion(7))));
	}

	#[test]
	fn rejects_inconsistent_counts() {
		let mut header = Header::new(32, 16);
		assert!(matches!(header.validate(), Err(Error::CorruptedSource(_))));

		header = Header::new(8, 16);
		header.block_count = 0;
		assert!(matches!(header.validate(), Err(Error::CorruptedSource(_))));

		header.block_count = 17;
		assert!(matches!(header.validate(), Err(Error::CorruptedSource(_))));
	}

	#[test]
	fn round_trips_through_bytes() {
		let mut header = Header::new(8, 16);
		header.block_count = 5;

		let bytes = header.to_bytes();
		assert_eq!(bytes.len(), Header::BASE_SIZE);

		let read = Header::from_handle(bytes.as_slice()).unwrap();
		assert_eq!(read.seed, header.seed);
		assert_eq!(read.max_file_count, 8);
		assert_eq!(read.max_block_count, 16);
		assert_eq!(read.block_count, 5);
		assert!(read.validate().is_ok());
	}

	#[test]
	fn data_region_is_cluster_aligned() {
		let header = Header::new(8, 16);
		assert_eq!(header.data_offset() % crate::CLUSTER_SIZE as u64, 0);
		assert!(header.data_offset() >= Header::entry_offset(16));
	}
}
