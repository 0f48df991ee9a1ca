//! Error kinds returned by the block device, volume manager, and inode I/O engine.

use std::io;

use thiserror::Error;

/// Every error this crate can return.
///
/// I/O variants carry the underlying [`io::Error`] as their source so a caller can still
/// inspect the OS-level detail while matching on the coarse-grained kind.
#[derive(Debug, Error)]
pub enum Error {
	/// Failed to open or create the backing image file.
	#[error("failed to open device: {0}")]
	IoOpen(#[source] io::Error),
	/// Failed to extend the backing image file to its full size.
	#[error("failed to truncate device: {0}")]
	IoTruncate(#[source] io::Error),
	/// A block number fell outside `[0, nblocks)`.
	#[error("block number out of range")]
	IoRange,
	/// Failed to read a block from the device.
	#[error("failed to read block: {0}")]
	IoRead(#[source] io::Error),
	/// Failed to write a block to the device.
	#[error("failed to write block: {0}")]
	IoWrite(#[source] io::Error),

	/// `format` was called on a device that is already mounted.
	#[error("device is already mounted")]
	AlreadyMounted,
	/// The superblock's magic number did not match.
	#[error("bad magic number: image is not formatted")]
	BadMagic,
	/// A read error occurred while rebuilding bitmaps during mount.
	#[error("failed to scan inode table while mounting: {0}")]
	MountScan(#[source] io::Error),

	/// No free inode was available.
	#[error("no free inode available")]
	NoInode,
	/// No free data block was available.
	#[error("no free data block available")]
	NoSpace,
	/// An inode number fell outside `[0, inodes_count)`.
	#[error("inode number out of range")]
	OutOfRange,
	/// The requested inode is not currently in use.
	#[error("inode is not in use")]
	Invalid,
}

/// Shorthand result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
