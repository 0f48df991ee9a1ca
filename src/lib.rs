//! A small, self-contained block-structured file system storing a flat namespace of numbered
//! files (inodes) on top of an emulated raw block device.
//!
//! There are no directories, permissions, timestamps, or symbolic links: a caller creates an
//! inode, gets back an integer handle, and reads/writes bytes at arbitrary offsets into it.
//!
//! ```no_run
//! use blockfs::device::BlockDevice;
//! use blockfs::volume;
//!
//! let mut device = BlockDevice::create("disk.img", 200)?;
//! volume::format(&mut device)?;
//! let mut fs = volume::mount(device)?;
//!
//! let inode = fs.create_inode()?;
//! fs.write_to_inode(inode, b"hello", 5, 0)?;
//! let mut buf = [0u8; 5];
//! fs.read_from_inode(inode, &mut buf, 5, 0)?;
//! assert_eq!(&buf, b"hello");
//!
//! fs.unmount();
//! # Ok::<(), blockfs::error::Error>(())
//! ```

pub mod device;
pub mod error;
pub mod inode;
pub mod volume;

pub use device::BlockDevice;
pub use error::{Error, Result};
pub use inode::Inode;
pub use volume::{format, mount, FileSystem, Superblock};
