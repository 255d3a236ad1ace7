use std::{io, path::PathBuf};
use thiserror::Error;

/// Internal `Result` type alias used by `packfs`. Basically equal to: `Result<T, Error>`
pub type Result<T = ()> = std::result::Result<T, Error>;

/// All errors manifestable within `packfs` collected into a neat enum
#[derive(Debug, Error)]
pub enum Error {
	/// thin wrapper over [`io::Error`](std::io::Error), captures all I/O errors
	#[error("i/o error: {0}")]
	Io(#[from] io::Error),
	/// invalid MAGIC sequence in the given source, hinting at corruption or possible incompatibility with the given source
	#[error("invalid magic found in header, expected {:?} but found {:?}", crate::MAGIC, .0)]
	MalformedSource([u8; crate::MAGIC_LENGTH]),
	/// the source carries a format version this implementation does not speak, contains the incompatible version
	#[error("the provided container has version: {}, while the current implementation expects version: {}", .0, crate::VERSION)]
	IncompatibleVersion(u8),
	/// the header or block table failed a structural consistency check, the source cannot be trusted
	#[error("corrupted container: {0}")]
	CorruptedSource(String),
	/// malformed caller input: empty name or path, zero capacities, capacity ordering violation
	#[error("invalid argument: {0}")]
	InvalidArgument(&'static str),
	/// a file name is longer than [`MAX_NAME_LENGTH`](crate::MAX_NAME_LENGTH) bytes, contains the overflowing name
	#[error("the maximum length of a file name is {} bytes, got an overflowing name of length: {}", crate::MAX_NAME_LENGTH, .0.len())]
	NameSizeOverflow(String),
	/// the named file is absent from the container
	#[error("file not found: {0}")]
	NotFound(String),
	/// a file with the same name already exists
	#[error("a file with the name: {0} already exists")]
	AlreadyExists(String),
	/// no capacity left for the requested operation, names the exhausted limit
	#[error("capacity exceeded: {0}")]
	CapacityExceeded(&'static str),
	/// the operation is incompatible with the access mode the container was opened with
	#[error("operation requires {0} access")]
	AccessDenied(&'static str),
	/// a file system is already registered for this normalized path
	#[error("a file system is already registered at: {}", .0.display())]
	PathOccupied(PathBuf),
	/// no file system is registered for this normalized path
	#[error("no file system registered at: {}", .0.display())]
	PathNotRegistered(PathBuf),
}
