use std::io::Read;
use super::error::*;

/// Fixed-capacity obfuscated name slot, embedded inline in every block-table
/// entry. The plaintext UTF-8 bytes are XORed against the container's
/// repeating seed before hitting the disk; a zero length marks a free slot.
#[derive(Clone)]
pub(crate) struct NameSlot {
	length: u8,
	bytes: [u8; crate::MAX_NAME_LENGTH],
}

impl NameSlot {
	pub const BASE_SIZE: usize = 1 + crate::MAX_NAME_LENGTH;

	#[inline(always)]
	pub fn empty() -> NameSlot {
		NameSlot {
			length: 0,
			bytes: [0u8; crate::MAX_NAME_LENGTH],
		}
	}

	/// Masks `plain` with the seed. Fails when the name overflows the slot.
	pub fn new(plain: &str, seed: &[u8; crate::SEED_LENGTH]) -> Result<NameSlot> {
		let raw = plain.as_bytes();
		if raw.len() > crate::MAX_NAME_LENGTH {
			return Err(Error::NameSizeOverflow(plain.to_string()));
		};

		let mut bytes = [0u8; crate::MAX_NAME_LENGTH];
		for (i, byte) in raw.iter().enumerate() {
			bytes[i] = byte ^ seed[i % crate::SEED_LENGTH];
		}

		Ok(NameSlot {
			length: raw.len() as u8,
			bytes,
		})
	}

	#[inline(always)]
	pub fn is_empty(&self) -> bool {
		self.length == 0
	}

	/// Reapplies the XOR mask and validates the recovered bytes as UTF-8.
	pub fn read(&self, seed: &[u8; crate::SEED_LENGTH]) -> Result<String> {
		let mut plain = Vec::with_capacity(self.length as usize);
		for i in 0..self.length as usize {
			plain.push(self.bytes[i] ^ seed[i % crate::SEED_LENGTH]);
		}

		String::from_utf8(plain).map_err(|_| Error::CorruptedSource("stored name is not valid UTF-8".to_string()))
	}

	pub fn from_handle<T: Read>(mut handle: T) -> Result<NameSlot> {
		let mut buffer = [0u8; NameSlot::BASE_SIZE];
		handle.read_exact(&mut buffer)?;

		Ok(NameSlot {
			length: buffer[0],
			bytes: buffer[1..].try_into().unwrap(),
		})
	}

	pub fn to_bytes(&self) -> [u8; NameSlot::BASE_SIZE] {
		let mut buffer = [0u8; NameSlot::BASE_SIZE];
		buffer[0] = self.length;
		buffer[1..].copy_from_slice(&self.bytes);
		buffer
	}
}
