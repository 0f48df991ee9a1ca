//! A thin, fixed-block-size random-access store over a host file.
//!
//! The device has no notion of a file system; it knows only how many blocks it holds and
//! whether some owner has marked it mounted. The `mounted` flag exists purely for the volume
//! manager's benefit (see [`crate::volume`]) so that `format` can refuse to run on a device
//! that is already in use.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{Error, Result};

/// The size, in bytes, of a single block.
pub const BLOCK_SIZE: usize = 4096;

/// A fixed-size block buffer.
pub type Block = [u8; BLOCK_SIZE];

/// An emulated raw block device backed by a regular file.
pub struct BlockDevice {
	file: File,
	nblocks: u32,
	mounted: bool,
}

impl BlockDevice {
	/// Creates a new image at `path` of exactly `nblocks` blocks, truncating any existing
	/// contents.
	///
	/// The image is not formatted by this call; use [`crate::volume::format`] afterwards.
	pub fn create(path: impl AsRef<Path>, nblocks: u32) -> Result<Self> {
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.create(true)
			.truncate(true)
			.open(path)
			.map_err(Error::IoOpen)?;
		file.set_len(nblocks as u64 * BLOCK_SIZE as u64)
			.map_err(Error::IoTruncate)?;
		Ok(Self {
			file,
			nblocks,
			mounted: false,
		})
	}

	/// Opens an existing image at `path`, recovering `nblocks` from the file's length.
	///
	/// This is a convenience over the raw `open(path, nblocks)` contract: a caller that already
	/// formatted an image need not remember its block count.
	pub fn open(path: impl AsRef<Path>) -> Result<Self> {
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.open(path)
			.map_err(Error::IoOpen)?;
		let len = file.metadata().map_err(Error::IoOpen)?.len();
		let nblocks = (len / BLOCK_SIZE as u64) as u32;
		Ok(Self {
			file,
			nblocks,
			mounted: false,
		})
	}

	/// Returns the total number of blocks on the device.
	pub fn nblocks(&self) -> u32 {
		self.nblocks
	}

	/// Tells whether a volume manager has marked this device mounted.
	pub fn is_mounted(&self) -> bool {
		self.mounted
	}

	/// Sets the mounted flag. Exposed for [`crate::volume`]; policy around refusing to format a
	/// mounted device lives there, not here.
	pub fn set_mounted(&mut self, mounted: bool) {
		self.mounted = mounted;
	}

	/// Releases the backing handle.
	///
	/// Consumes `self`; the underlying `File` is closed on drop. Exposed explicitly (rather than
	/// leaving callers to rely on an implicit `Drop`) so the block device's full contract —
	/// `open`/`read`/`write`/`close`/`mark_mounted` — has a named counterpart for each operation.
	pub fn close(self) {}

	/// Reads block `blocknum` into a freshly allocated buffer.
	pub fn read_block(&mut self, blocknum: u32) -> Result<Block> {
		self.check_range(blocknum)?;
		let mut buf = [0u8; BLOCK_SIZE];
		self.file
			.seek(SeekFrom::Start(blocknum as u64 * BLOCK_SIZE as u64))
			.map_err(Error::IoRead)?;
		self.file.read_exact(&mut buf).map_err(Error::IoRead)?;
		Ok(buf)
	}

	/// Writes `buf` to block `blocknum`.
	pub fn write_block(&mut self, blocknum: u32, buf: &Block) -> Result<()> {
		self.check_range(blocknum)?;
		self.file
			.seek(SeekFrom::Start(blocknum as u64 * BLOCK_SIZE as u64))
			.map_err(Error::IoWrite)?;
		self.file.write_all(buf).map_err(Error::IoWrite)?;
		Ok(())
	}

	fn check_range(&self, blocknum: u32) -> Result<()> {
		if blocknum >= self.nblocks {
			Err(Error::IoRange)
		} else {
			Ok(())
		}
	}
}
