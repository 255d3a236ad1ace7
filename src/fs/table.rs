use std::{collections::BTreeMap, sync::Arc};
use hashbrown::HashMap;

use crate::global::{block::Block, error::*};

/// The in-memory allocation state of a container: the block table, the
/// name index and the cluster-ordered free list. Pure bookkeeping, no I/O.
///
/// Mutating operations push every touched slot into a dirty list so the
/// engine knows which entries to rewrite. The table is `Clone`: the engine
/// mutates a scratch copy and swaps it in only once every stream write
/// succeeded, which keeps memory and disk in agreement on I/O failure.
#[derive(Clone)]
pub(crate) struct BlockTable {
	pub blocks: Vec<Block>,
	pub index: HashMap<Arc<str>, usize>,
	/// Free blocks keyed by their starting cluster.
	free: BTreeMap<u32, usize>,
	pub max_file_count: u32,
	pub max_block_count: u32,
}

impl BlockTable {
	/// A brand-new table: one giant free block spanning the whole
	/// allocatable cluster range.
	pub fn new(max_file_count: u32, max_block_count: u32) -> BlockTable {
		let blocks = vec![Block::free(0, crate::MAX_CLUSTER_COUNT * crate::CLUSTER_SIZE)];
		let mut free = BTreeMap::new();
		free.insert(0, 0);

		BlockTable {
			blocks,
			index: HashMap::new(),
			free,
			max_file_count,
			max_block_count,
		}
	}

	/// Rebuilds the index and free list from deserialized entries,
	/// rejecting structurally impossible tables.
	pub fn from_blocks(blocks: Vec<Block>, max_file_count: u32, max_block_count: u32) -> Result<BlockTable> {
		let mut index = HashMap::new();
		let mut free = BTreeMap::new();

		for (slot, block) in blocks.iter().enumerate() {
			if block.cluster as u64 + block.cluster_span() as u64 > crate::MAX_CLUSTER_COUNT as u64 {
				return Err(Error::CorruptedSource(format!(
					"block at cluster: {} spans past the addressable data region",
					block.cluster
				)));
			};

			match &block.name {
				Some(name) => {
					if index.insert(name.clone(), slot).is_some() {
						return Err(Error::CorruptedSource(format!("duplicate file name: {name}")));
					};
				},
				None => {
					if free.insert(block.cluster, slot).is_some() {
						return Err(Error::CorruptedSource(format!(
							"two free blocks share the cluster: {}",
							block.cluster
						)));
					};
				},
			}
		}

		if index.len() > max_file_count as usize {
			return Err(Error::CorruptedSource(format!(
				"{} files exceed the container's limit of {max_file_count}",
				index.len()
			)));
		};

		Ok(BlockTable {
			blocks,
			index,
			free,
			max_file_count,
			max_block_count,
		})
	}

	pub fn file_count(&self) -> usize {
		self.index.len()
	}

	/// Best-fit search over the free list: the smallest sufficient block,
	/// ties broken by the lowest cluster. With `exact` set, only a block of
	/// exactly `clusters` capacity qualifies.
	fn best_fit(&self, clusters: u32, exact: bool) -> Option<usize> {
		let mut best: Option<(u32, usize)> = None;

		for &slot in self.free.values() {
			let span = self.blocks[slot].cluster_span();
			if span < clusters {
				continue;
			};

			if exact {
				if span == clusters {
					return Some(slot);
				};
				continue;
			};

			match best {
				Some((span_held, _)) if span >= span_held => {},
				_ => best = Some((span, slot)),
			}
		}

		best.map(|(_, slot)| slot)
	}

	/// Allocates a block for a new name and returns its slot.
	///
	/// A split consumes a fresh table slot for the remainder. When the table
	/// is already full an exact fit is preferred; failing that the file takes
	/// the whole best-fit block and the capacity past its rounded length is
	/// abandoned until the file is deleted.
	pub fn allocate(&mut self, name: Arc<str>, length: u32, dirty: &mut Vec<usize>) -> Result<usize> {
		if self.index.len() >= self.max_file_count as usize {
			return Err(Error::CapacityExceeded("file count"));
		};

		let clusters = length.div_ceil(crate::CLUSTER_SIZE).max(1);
		let table_full = self.blocks.len() >= self.max_block_count as usize;

		let mut slot = match self.best_fit(clusters, false) {
			Some(slot) => slot,
			None => return Err(Error::CapacityExceeded("data region")),
		};

		if self.blocks[slot].cluster_span() > clusters {
			if table_full {
				if let Some(exact) = self.best_fit(clusters, true) {
					slot = exact;
				};
			} else {
				// carve the file off the front, the remainder stays free
				let remainder_cluster = self.blocks[slot].cluster + clusters;
				let remainder_length = (self.blocks[slot].cluster_span() - clusters) * crate::CLUSTER_SIZE;

				let fresh = self.blocks.len();
				self.blocks.push(Block::free(remainder_cluster, remainder_length));
				self.free.insert(remainder_cluster, fresh);
				dirty.push(fresh);
			}
		};

		let cluster = self.blocks[slot].cluster;
		self.free.remove(&cluster);

		let block = &mut self.blocks[slot];
		block.name = Some(name.clone());
		block.length = length;

		self.index.insert(name, slot);
		dirty.push(slot);
		Ok(slot)
	}

	/// Frees the named block, rounding its tracked length up to whole
	/// clusters, and coalesces it with cluster-adjacent free neighbours.
	pub fn release(&mut self, name: &str, dirty: &mut Vec<usize>) -> Result<()> {
		let slot = match self.index.remove(name) {
			Some(slot) => slot,
			None => return Err(Error::NotFound(name.to_string())),
		};

		let span = self.blocks[slot].cluster_span();
		let cluster = self.blocks[slot].cluster;

		let block = &mut self.blocks[slot];
		block.name = None;
		block.length = span * crate::CLUSTER_SIZE;

		self.free.insert(cluster, slot);
		dirty.push(slot);

		self.coalesce(cluster, dirty);
		Ok(())
	}

	/// Merges the free block starting at `cluster` with its following and
	/// preceding free neighbours, when physically adjacent.
	fn coalesce(&mut self, cluster: u32, dirty: &mut Vec<usize>) {
		let slot = self.free[&cluster];
		let end = self.blocks[slot].end_cluster();

		if let Some(&next) = self.free.get(&end) {
			self.blocks[slot].length += self.blocks[next].length;
			self.free.remove(&end);
			dirty.push(slot);
			self.remove_slot(next, dirty);
		};

		if let Some((_, &previous)) = self.free.range(..cluster).next_back() {
			if self.blocks[previous].end_cluster() == cluster {
				// refetch, the merge above may have moved this block
				let slot = self.free[&cluster];

				self.blocks[previous].length += self.blocks[slot].length;
				self.free.remove(&cluster);
				dirty.push(previous);
				self.remove_slot(slot, dirty);
			};
		};
	}

	/// Records a free region produced by an in-place shrink. Prefers growing
	/// the adjacent free block leftwards; otherwise takes a fresh table slot.
	/// When the table is full and no merge is possible the region is
	/// abandoned: unreachable, but never handed out twice.
	pub fn insert_free(&mut self, cluster: u32, clusters: u32, dirty: &mut Vec<usize>) {
		let end = cluster + clusters;

		if let Some(next) = self.free.remove(&end) {
			let block = &mut self.blocks[next];
			block.cluster = cluster;
			block.length += clusters * crate::CLUSTER_SIZE;
			self.free.insert(cluster, next);
			dirty.push(next);
			return;
		};

		if self.blocks.len() < self.max_block_count as usize {
			let slot = self.blocks.len();
			self.blocks.push(Block::free(cluster, clusters * crate::CLUSTER_SIZE));
			self.free.insert(cluster, slot);
			dirty.push(slot);
		};
	}

	/// Relabels a block in place. Pure metadata, no data movement.
	pub fn rename(&mut self, old: &str, new: Arc<str>, dirty: &mut Vec<usize>) -> Result<()> {
		if self.index.contains_key(new.as_ref()) {
			return Err(Error::AlreadyExists(new.to_string()));
		};

		let slot = match self.index.remove(old) {
			Some(slot) => slot,
			None => return Err(Error::NotFound(old.to_string())),
		};

		self.blocks[slot].name = Some(new.clone());
		self.index.insert(new, slot);
		dirty.push(slot);
		Ok(())
	}

	/// Swap-removes `slot`, shrinking the table's logical count and patching
	/// the index or free-list reference of whichever block got moved.
	fn remove_slot(&mut self, slot: usize, dirty: &mut Vec<usize>) {
		let last = self.blocks.len() - 1;

		if slot != last {
			self.blocks.swap(slot, last);

			let moved = &self.blocks[slot];
			match &moved.name {
				Some(name) => {
					self.index.insert(name.clone(), slot);
				},
				None => {
					self.free.insert(moved.cluster, slot);
				},
			}
			dirty.push(slot);
		};

		self.blocks.pop();
	}
}

#[cfg(test)]
mod test {
	use super::*;

	const CLUSTER: u32 = crate::CLUSTER_SIZE;

	fn spans(table: &BlockTable) -> Vec<(Option<&str>, u32, u32)> {
		table
			.blocks
			.iter()
			.map(|b| (b.name.as_deref(), b.cluster, b.cluster_span()))
			.collect()
	}

	#[test]
	fn fresh_table_holds_one_giant_free_block() {
		let table = BlockTable::new(4, 8);
		assert_eq!(table.blocks.len(), 1);
		assert!(!table.blocks[0].is_used());
		assert_eq!(table.blocks[0].cluster_span(), crate::MAX_CLUSTER_COUNT);
	}

	#[test]
	fn allocations_carve_off_the_front() {
		let mut table = BlockTable::new(4, 8);
		let mut dirty = vec![];

		let a = table.allocate("a".into(), 100, &mut dirty).unwrap();
		let b = table.allocate("b".into(), CLUSTER + 1, &mut dirty).unwrap();

		assert_eq!(table.blocks[a].cluster, 0);
		assert_eq!(table.blocks[a].cluster_span(), 1);
		assert_eq!(table.blocks[b].cluster, 1);
		assert_eq!(table.blocks[b].cluster_span(), 2);
		// files plus the shrinking tail block
		assert_eq!(table.blocks.len(), 3);
	}

	#[test]
	fn best_fit_prefers_the_smallest_sufficient_hole() {
		let mut table = BlockTable::new(8, 16);
		let mut dirty = vec![];

		// lay out four one-cluster files, then a two-cluster one
		for name in ["a", "b", "c", "d"] {
			table.allocate(name.into(), 10, &mut dirty).unwrap();
		}
		table.allocate("e".into(), CLUSTER * 2, &mut dirty).unwrap();

		// punch a three-cluster hole behind "a"; "e" keeps the tail pinned away
		table.release("b", &mut dirty).unwrap();
		table.release("c", &mut dirty).unwrap();
		table.release("d", &mut dirty).unwrap();

		// a one-cluster request must take the hole, not the big tail block
		let f = table.allocate("f".into(), 5, &mut dirty).unwrap();
		assert_eq!(table.blocks[f].cluster, 1);
	}

	#[test]
	fn release_coalesces_both_neighbours() {
		let mut table = BlockTable::new(8, 16);
		let mut dirty = vec![];

		for name in ["a", "b", "c"] {
			table.allocate(name.into(), 10, &mut dirty).unwrap();
		}

		table.release("a", &mut dirty).unwrap();
		table.release("c", &mut dirty).unwrap();
		// "c" merges with the tail block on release
		let before = table.blocks.len();

		table.release("b", &mut dirty).unwrap();
		// "b" bridges the hole at 0 and the tail, everything collapses into one free block
		assert_eq!(table.blocks.len(), 1);
		assert!(table.blocks.len() < before);
		assert_eq!(spans(&table), vec![(None, 0, crate::MAX_CLUSTER_COUNT)]);
	}

	#[test]
	fn full_table_takes_an_exact_fit() {
		let mut table = BlockTable::new(4, 4);
		let mut dirty = vec![];

		for name in ["a", "b", "c"] {
			table.allocate(name.into(), 10, &mut dirty).unwrap();
		}
		assert_eq!(table.blocks.len(), 4);

		table.release("b", &mut dirty).unwrap();
		// table is back to 4 after the hole..
		assert_eq!(table.blocks.len(), 4);

		// ..and the one-cluster hole at "b"'s position is an exact fit
		let d = table.allocate("d".into(), 20, &mut dirty).unwrap();
		assert_eq!(table.blocks[d].cluster, 1);
	}

	#[test]
	fn full_table_swallows_the_best_fit_whole() {
		let mut table = BlockTable::new(4, 4);
		let mut dirty = vec![];

		for name in ["a", "b", "c"] {
			table.allocate(name.into(), 10, &mut dirty).unwrap();
		}

		// no exact one-cluster fit exists, only the giant tail; the file
		// gets the whole block without a remainder entry
		let d = table.allocate("d".into(), 30, &mut dirty).unwrap();
		assert_eq!(table.blocks.len(), 4);
		assert_eq!(table.blocks[d].cluster, 3);
		assert_eq!(table.blocks[d].cluster_span(), 1);
	}

	#[test]
	fn file_count_limit_is_enforced() {
		let mut table = BlockTable::new(2, 8);
		let mut dirty = vec![];

		table.allocate("a".into(), 10, &mut dirty).unwrap();
		table.allocate("b".into(), 10, &mut dirty).unwrap();
		assert!(matches!(
			table.allocate("c".into(), 10, &mut dirty),
			Err(Error::CapacityExceeded("file count"))
		));
	}

	#[test]
	fn release_unknown_name_is_not_found() {
		let mut table = BlockTable::new(2, 4);
		let mut dirty = vec![];
		assert!(matches!(table.release("ghost", &mut dirty), Err(Error::NotFound(_))));
	}

	#[test]
	fn rename_rewires_the_index() {
		let mut table = BlockTable::new(4, 8);
		let mut dirty = vec![];

		table.allocate("old".into(), 10, &mut dirty).unwrap();
		table.allocate("taken".into(), 10, &mut dirty).unwrap();

		assert!(matches!(
			table.rename("old", "taken".into(), &mut dirty),
			Err(Error::AlreadyExists(_))
		));
		assert!(matches!(
			table.rename("ghost", "fresh".into(), &mut dirty),
			Err(Error::NotFound(_))
		));

		table.rename("old", "fresh".into(), &mut dirty).unwrap();
		assert!(table.index.contains_key("fresh"));
		assert!(!table.index.contains_key("old"));
	}

	#[test]
	fn shrink_remainder_merges_into_the_following_hole() {
		let mut table = BlockTable::new(4, 8);
		let mut dirty = vec![];

		table.allocate("a".into(), CLUSTER * 3, &mut dirty).unwrap();
		let holes_before = table.blocks.len();

		// "a" shrinks from three clusters to one, remainder extends the tail
		table.blocks[0].length = 10;
		table.insert_free(1, 2, &mut dirty);

		assert_eq!(table.blocks.len(), holes_before);
		let tail = table.free.get(&1).copied().unwrap();
		assert_eq!(table.blocks[tail].cluster, 1);
		assert_eq!(table.blocks[tail].end_cluster(), crate::MAX_CLUSTER_COUNT);
	}

	#[test]
	fn rejects_duplicate_names_on_rebuild() {
		let blocks = vec![
			Block {
				name: Some("twin".into()),
				cluster: 0,
				length: 10,
			},
			Block {
				name: Some("twin".into()),
				cluster: 1,
				length: 10,
			},
		];
		assert!(matches!(
			BlockTable::from_blocks(blocks, 4, 8),
			Err(Error::CorruptedSource(_))
		));
	}

	#[test]
	fn rejects_blocks_past_the_addressable_range() {
		let blocks = vec![Block {
			name: Some("way-out".into()),
			cluster: crate::MAX_CLUSTER_COUNT,
			length: 10,
		}];
		assert!(matches!(
			BlockTable::from_blocks(blocks, 4, 8),
			Err(Error::CorruptedSource(_))
		));
	}
}
