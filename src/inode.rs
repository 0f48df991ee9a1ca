//! The inode I/O engine: inode lifecycle and the indirect-pointer-aware random-access
//! read/write path.

use std::mem::size_of;
use std::slice;

use log::{trace, warn};

use crate::device::{Block, BLOCK_SIZE};
use crate::error::{Error, Result};
use crate::volume::{FileSystem, INODE_SIZE, POINTERS_PER_BLOCK, POINTERS_PER_INODE};

/// A 32-byte on-disk inode record: validity flag, logical size, five direct block pointers,
/// and one single-indirect block pointer.
///
/// A pointer value of `0` means "unallocated" — safe only because block `0` is reserved for
/// the superblock and the allocator never returns it.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Inode {
	pub valid: u32,
	pub size: u32,
	pub direct: [u32; POINTERS_PER_INODE],
	pub indirect: u32,
}

impl Inode {
	/// Whether this inode is currently in use.
	pub fn is_valid(&self) -> bool {
		self.valid != 0
	}

	/// Decodes the inode stored at `slot` within `block`.
	pub(crate) fn read_from(block: &Block, slot: usize) -> Self {
		let mut inode = Inode::default();
		let dst = unsafe {
			slice::from_raw_parts_mut(&mut inode as *mut _ as *mut u8, size_of::<Self>())
		};
		let off = slot * INODE_SIZE;
		dst.copy_from_slice(&block[off..off + INODE_SIZE]);
		inode
	}

	/// Encodes this inode into `slot` within `block`.
	pub(crate) fn write_into(&self, block: &mut Block, slot: usize) {
		let src = unsafe { slice::from_raw_parts(self as *const _ as *const u8, size_of::<Self>()) };
		let off = slot * INODE_SIZE;
		block[off..off + INODE_SIZE].copy_from_slice(src);
	}
}

/// Reads the pointer at index `idx` of an indirect block.
fn read_pointer(block: &Block, idx: usize) -> u32 {
	let off = idx * size_of::<u32>();
	u32::from_ne_bytes(block[off..off + 4].try_into().unwrap())
}

/// Writes pointer `value` at index `idx` of an indirect block.
fn write_pointer(block: &mut Block, idx: usize, value: u32) {
	let off = idx * size_of::<u32>();
	block[off..off + 4].copy_from_slice(&value.to_ne_bytes());
}

impl FileSystem {
	/// Allocates a free inode, marks it valid, and persists it. Returns the inode number.
	pub fn create_inode(&mut self) -> Result<u32> {
		let i = self
			.free_inodes
			.iter()
			.position(|&free| free)
			.ok_or(Error::NoInode)?;
		let inode_num = i as u32;
		let (mut inode, block) = self.load_inode(inode_num)?;
		inode.valid = 1;
		self.save_inode(&inode, inode_num, block)?;
		self.free_inodes[i] = false;
		trace!("created inode {inode_num}");
		Ok(inode_num)
	}

	/// Releases all blocks referenced by `inode_num` and frees the inode itself.
	///
	/// Idempotent: removing an already-free inode succeeds without touching the disk.
	pub fn remove_inode(&mut self, inode_num: u32) -> Result<()> {
		if inode_num >= self.super_block.inodes_count {
			return Err(Error::OutOfRange);
		}
		if self.free_inodes[inode_num as usize] {
			return Ok(());
		}

		let (mut inode, block) = self.load_inode(inode_num)?;

		for ptr in inode.direct.iter_mut() {
			if *ptr != 0 {
				self.block_dealloc(*ptr)?;
				*ptr = 0;
			}
		}

		if inode.indirect != 0 {
			let indirect_block = self.device.read_block(inode.indirect)?;
			for idx in 0..POINTERS_PER_BLOCK as usize {
				let ptr = read_pointer(&indirect_block, idx);
				if ptr != 0 {
					self.block_dealloc(ptr)?;
				}
			}
			self.block_dealloc(inode.indirect)?;
			inode.indirect = 0;
		}

		inode.size = 0;
		inode.valid = 0;
		self.save_inode(&inode, inode_num, block)?;
		self.free_inodes[inode_num as usize] = true;
		trace!("removed inode {inode_num}");
		Ok(())
	}

	/// Returns the logical byte size of `inode_num`.
	pub fn stat_inode(&mut self, inode_num: u32) -> Result<u32> {
		if inode_num >= self.super_block.inodes_count {
			return Err(Error::OutOfRange);
		}
		let (inode, _) = self.load_inode(inode_num)?;
		if !inode.is_valid() {
			return Err(Error::Invalid);
		}
		Ok(inode.size)
	}

	/// Resolves the pointer for logical block `c` of `inode`, without allocating.
	///
	/// `indirect_block` is a call-scoped cache of the inode's indirect block, loaded lazily on
	/// first need. Returns `Ok(None)` when there is no pointer to follow (unallocated slot,
	/// missing indirect block, or `c` beyond the addressable range).
	fn resolve_read_pointer(
		&mut self,
		inode: &Inode,
		indirect_block: &mut Option<Block>,
		c: usize,
	) -> Result<Option<u32>> {
		if c < POINTERS_PER_INODE {
			return Ok(match inode.direct[c] {
				0 => None,
				ptr => Some(ptr),
			});
		}
		let idx = c - POINTERS_PER_INODE;
		if inode.indirect == 0 || idx >= POINTERS_PER_BLOCK as usize {
			return Ok(None);
		}
		if indirect_block.is_none() {
			*indirect_block = Some(self.device.read_block(inode.indirect)?);
		}
		let ptr = read_pointer(indirect_block.as_ref().unwrap(), idx);
		Ok(if ptr == 0 { None } else { Some(ptr) })
	}

	/// Reads up to `length` bytes starting at `offset` from `inode_num` into `buf`, returning
	/// the number of bytes actually copied.
	///
	/// `length` is clamped so `offset + length <= size`. Hitting an unallocated pointer (a
	/// sparse hole) or running past the addressable range terminates the read early; this is
	/// not an error, the already-copied prefix is returned.
	pub fn read_from_inode(&mut self, inode_num: u32, buf: &mut [u8], length: usize, offset: usize) -> Result<usize> {
		let (inode, _) = self.load_inode(inode_num)?;
		if !inode.is_valid() {
			return Err(Error::Invalid);
		}
		let size = inode.size as usize;
		if offset >= size {
			return Err(Error::OutOfRange);
		}
		let mut remaining = length.min(size - offset);

		let start = offset / BLOCK_SIZE;
		let end = (offset + remaining) / BLOCK_SIZE;
		let mut indirect_block: Option<Block> = None;
		let mut n = 0usize;

		for c in start..=end {
			if remaining == 0 {
				break;
			}
			let ptr = match self.resolve_read_pointer(&inode, &mut indirect_block, c)? {
				Some(ptr) => ptr,
				None => break,
			};
			let block = self.device.read_block(ptr)?;
			let off = if c == start { offset % BLOCK_SIZE } else { 0 };
			let s = remaining.min(BLOCK_SIZE - off);
			buf[n..n + s].copy_from_slice(&block[off..off + s]);
			n += s;
			remaining -= s;
		}
		Ok(n)
	}

	/// Resolves the pointer for logical block `c`, allocating a new data block (and, if
	/// needed, a new indirect block) on demand.
	fn resolve_write_pointer(
		&mut self,
		inode: &mut Inode,
		indirect_block: &mut Option<Block>,
		indirect_dirty: &mut bool,
		c: usize,
	) -> Result<Option<u32>> {
		if c < POINTERS_PER_INODE {
			if inode.direct[c] == 0 {
				inode.direct[c] = self.block_alloc()?;
			}
			return Ok(Some(inode.direct[c]));
		}

		let idx = c - POINTERS_PER_INODE;
		if idx >= POINTERS_PER_BLOCK as usize {
			warn!("write beyond addressable range at logical block {c}");
			return Ok(None);
		}

		if inode.indirect == 0 {
			inode.indirect = self.block_alloc()?;
			*indirect_block = Some([0u8; BLOCK_SIZE]);
			*indirect_dirty = true;
		} else if indirect_block.is_none() {
			*indirect_block = Some(self.device.read_block(inode.indirect)?);
		}

		let block = indirect_block.as_mut().unwrap();
		let mut ptr = read_pointer(block, idx);
		if ptr == 0 {
			ptr = self.block_alloc()?;
			write_pointer(block, idx, ptr);
			*indirect_dirty = true;
		}
		Ok(Some(ptr))
	}

	/// Writes `length` bytes from `buf` to `inode_num` starting at `offset`, allocating data
	/// blocks (and the indirect block) on demand. Returns the number of bytes actually
	/// written, which is less than `length` only if allocation fails partway through
	/// ([`Error::NoSpace`] is not propagated in that case — the bytes already written are
	/// flushed and their count is returned).
	pub fn write_to_inode(&mut self, inode_num: u32, buf: &[u8], length: usize, offset: usize) -> Result<usize> {
		let (mut inode, inode_block) = self.load_inode(inode_num)?;
		if !inode.is_valid() {
			return Err(Error::Invalid);
		}

		let mut remaining = length;
		let start = offset / BLOCK_SIZE;
		let end = if remaining == 0 {
			start
		} else {
			(offset + remaining - 1) / BLOCK_SIZE
		};

		let mut indirect_block: Option<Block> = None;
		let mut indirect_dirty = false;
		let mut inode_dirty = false;
		let mut n = 0usize;

		for c in start..=end {
			if remaining == 0 {
				break;
			}
			let ptr = match self.resolve_write_pointer(
				&mut inode,
				&mut indirect_block,
				&mut indirect_dirty,
				c,
			) {
				Ok(Some(ptr)) => {
					inode_dirty = true;
					ptr
				}
				Ok(None) => break,
				Err(Error::NoSpace) => {
					warn!("out of space while writing inode {inode_num}, returning partial progress");
					break;
				}
				Err(other) => return Err(other),
			};

			let off = if c == start { offset % BLOCK_SIZE } else { 0 };
			let s = remaining.min(BLOCK_SIZE - off);

			if off == 0 && s == BLOCK_SIZE {
				let mut block = [0u8; BLOCK_SIZE];
				block.copy_from_slice(&buf[n..n + s]);
				self.device.write_block(ptr, &block)?;
			} else {
				let mut block = self.device.read_block(ptr)?;
				block[off..off + s].copy_from_slice(&buf[n..n + s]);
				self.device.write_block(ptr, &block)?;
			}

			n += s;
			remaining -= s;
		}

		if indirect_dirty {
			self.device
				.write_block(inode.indirect, indirect_block.as_ref().unwrap())?;
		}
		if inode_dirty {
			inode.size = inode.size.max((offset + n) as u32);
			self.save_inode(&inode, inode_num, inode_block)?;
		}
		trace!("wrote {n} bytes to inode {inode_num} at offset {offset}");
		Ok(n)
	}
}
