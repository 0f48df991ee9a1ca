//! Owns the superblock and the in-memory free-inode/free-block bitmaps, and provides
//! format/mount/unmount plus the block allocator and inode persistence helpers the inode I/O
//! engine builds on.

use std::mem::size_of;
use std::slice;

use log::{debug, trace, warn};

use crate::device::{Block, BlockDevice, BLOCK_SIZE};
use crate::error::{Error, Result};
use crate::inode::Inode;

/// The file system's on-disk signature.
pub const MAGIC: u32 = 0xF0F0_3410;
/// The size, in bytes, of one on-disk inode record.
pub const INODE_SIZE: usize = 32;
/// The number of inode records packed into a single block.
pub const INODES_PER_BLOCK: u32 = (BLOCK_SIZE / INODE_SIZE) as u32;
/// The number of direct block pointers held by one inode.
pub const POINTERS_PER_INODE: usize = 5;
/// The number of block-number pointers held by one indirect block.
pub const POINTERS_PER_BLOCK: u32 = (BLOCK_SIZE / size_of::<u32>()) as u32;

/// Block 0's contents: layout parameters and the volume's magic number.
///
/// Only the first 16 bytes of the block are significant; the rest of block 0 is zero.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Superblock {
	pub magic: u32,
	pub nblocks: u32,
	pub inblocks: u32,
	pub inodes_count: u32,
}

impl Superblock {
	fn as_bytes(&self) -> &[u8] {
		unsafe { slice::from_raw_parts(self as *const _ as *const u8, size_of::<Self>()) }
	}

	fn read_from(block: &Block) -> Self {
		let mut sb = Superblock::default();
		let dst = unsafe {
			slice::from_raw_parts_mut(&mut sb as *mut _ as *mut u8, size_of::<Self>())
		};
		dst.copy_from_slice(&block[..size_of::<Self>()]);
		sb
	}
}

/// A mounted file system: the device it sits on, a copy of the superblock, and the two
/// bitmaps reconstructed at mount time.
///
/// The bitmaps are authoritative at runtime and are never persisted: every `mount` rebuilds
/// them from scratch by scanning the inode table.
pub struct FileSystem {
	pub(crate) device: BlockDevice,
	pub(crate) super_block: Superblock,
	/// `true` at index `i` iff inode `i` is free.
	pub(crate) free_inodes: Vec<bool>,
	/// `true` at index `i` iff data block `first_data_block() + i` is free.
	pub(crate) free_blocks: Vec<bool>,
}

impl FileSystem {
	/// The block number of the first inode-table block.
	pub(crate) const INODES_FIRST_BLOCK: u32 = 1;

	/// The first data block number, i.e. `1 + inblocks`.
	pub(crate) fn first_data_block(&self) -> u32 {
		Self::INODES_FIRST_BLOCK + self.super_block.inblocks
	}

	/// A read-only view of the superblock.
	pub fn superblock(&self) -> &Superblock {
		&self.super_block
	}

	/// The number of currently free inodes.
	pub fn free_inodes_count(&self) -> usize {
		self.free_inodes.iter().filter(|&&b| b).count()
	}

	/// The number of currently free data blocks.
	pub fn free_blocks_count(&self) -> usize {
		self.free_blocks.iter().filter(|&&b| b).count()
	}

	/// Exposes the underlying device, e.g. to test the `AlreadyMounted` policy on a device
	/// that is already claimed by this mount.
	pub fn device_mut(&mut self) -> &mut BlockDevice {
		&mut self.device
	}

	/// Unmounts the file system, releasing the device handle.
	///
	/// Consumes `self`: there is nothing left to call `read_from_inode`/`write_to_inode` etc.
	/// on afterwards.
	pub fn unmount(mut self) {
		self.device.set_mounted(false);
		self.device.close();
	}

	/// Returns the smallest free block index, allocates it, and returns its absolute block
	/// number.
	pub(crate) fn block_alloc(&mut self) -> Result<u32> {
		let idx = self
			.free_blocks
			.iter()
			.position(|&free| free)
			.ok_or(Error::NoSpace)?;
		self.free_blocks[idx] = false;
		let blocknum = self.first_data_block() + idx as u32;
		trace!("allocated data block {blocknum}");
		Ok(blocknum)
	}

	/// Zeros `block_num` on disk and returns it to the free-block pool.
	pub(crate) fn block_dealloc(&mut self, block_num: u32) -> Result<()> {
		self.device.write_block(block_num, &[0u8; BLOCK_SIZE])?;
		let idx = (block_num - self.first_data_block()) as usize;
		self.free_blocks[idx] = true;
		trace!("deallocated data block {block_num}");
		Ok(())
	}

	/// Reads the block containing inode `inode_num`, returning the decoded inode along with
	/// the full block image (so a caller that intends to modify and save does not need to
	/// re-read it).
	pub(crate) fn load_inode(&mut self, inode_num: u32) -> Result<(Inode, Block)> {
		let block_num = Self::INODES_FIRST_BLOCK + inode_num / INODES_PER_BLOCK;
		let block = self.device.read_block(block_num)?;
		let slot = (inode_num % INODES_PER_BLOCK) as usize;
		let inode = Inode::read_from(&block, slot);
		Ok((inode, block))
	}

	/// Writes `inode` back into its slot of `block` and persists the block.
	pub(crate) fn save_inode(
		&mut self,
		inode: &Inode,
		inode_num: u32,
		mut block: Block,
	) -> Result<()> {
		let slot = (inode_num % INODES_PER_BLOCK) as usize;
		inode.write_into(&mut block, slot);
		let block_num = Self::INODES_FIRST_BLOCK + inode_num / INODES_PER_BLOCK;
		self.device.write_block(block_num, &block)?;
		Ok(())
	}
}

/// Formats `device` as a fresh, empty volume: zeros every block, then writes a fresh
/// superblock to block 0.
///
/// Fails with [`Error::AlreadyMounted`] if the device is currently marked mounted.
pub fn format(device: &mut BlockDevice) -> Result<()> {
	if device.is_mounted() {
		return Err(Error::AlreadyMounted);
	}

	let zero = [0u8; BLOCK_SIZE];
	for i in 0..device.nblocks() {
		device.write_block(i, &zero)?;
	}

	let nblocks = device.nblocks();
	let inblocks = nblocks / 10;
	let super_block = Superblock {
		magic: MAGIC,
		nblocks,
		inblocks,
		inodes_count: inblocks * INODES_PER_BLOCK,
	};
	let mut block = [0u8; BLOCK_SIZE];
	block[..super_block.as_bytes().len()].copy_from_slice(super_block.as_bytes());
	device.write_block(0, &block)?;
	debug!("formatted device: nblocks={nblocks} inblocks={inblocks}");
	Ok(())
}

/// Validates the superblock of `device` and rebuilds the in-memory bitmaps by scanning every
/// inode (and every referenced indirect block). The scan is strictly read-only.
pub fn mount(mut device: BlockDevice) -> Result<FileSystem> {
	let block0 = device.read_block(0)?;
	let super_block = Superblock::read_from(&block0);
	if super_block.magic != MAGIC {
		return Err(Error::BadMagic);
	}

	let mut free_inodes = vec![false; super_block.inodes_count as usize];
	let data_blocks = super_block.nblocks - super_block.inblocks - 1;
	let mut free_blocks = vec![true; data_blocks as usize];
	let first_data_block = FileSystem::INODES_FIRST_BLOCK + super_block.inblocks;

	for i in 0..super_block.inblocks {
		let block = device
			.read_block(FileSystem::INODES_FIRST_BLOCK + i)
			.map_err(|e| match e {
				Error::IoRead(src) => Error::MountScan(src),
				other => other,
			})?;
		for j in 0..INODES_PER_BLOCK {
			let inode = Inode::read_from(&block, j as usize);
			let slot = (i * INODES_PER_BLOCK + j) as usize;
			free_inodes[slot] = !inode.is_valid();
			if !inode.is_valid() {
				continue;
			}
			for &ptr in &inode.direct {
				if ptr != 0 {
					free_blocks[(ptr - first_data_block) as usize] = false;
				}
			}
			if inode.indirect != 0 {
				free_blocks[(inode.indirect - first_data_block) as usize] = false;
				let indirect_block =
					device.read_block(inode.indirect).map_err(|e| match e {
						Error::IoRead(src) => Error::MountScan(src),
						other => other,
					})?;
				for chunk in indirect_block.chunks_exact(4) {
					let ptr = u32::from_ne_bytes(chunk.try_into().unwrap());
					if ptr != 0 {
						free_blocks[(ptr - first_data_block) as usize] = false;
					}
				}
			}
		}
	}

	device.set_mounted(true);
	debug!(
		"mounted: {} free inodes, {} free blocks",
		free_inodes.iter().filter(|&&b| b).count(),
		free_blocks.iter().filter(|&&b| b).count()
	);
	Ok(FileSystem {
		device,
		super_block,
		free_inodes,
		free_blocks,
	})
}

impl Drop for FileSystem {
	fn drop(&mut self) {
		if self.device.is_mounted() {
			warn!("file system dropped without an explicit unmount");
		}
	}
}
