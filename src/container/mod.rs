//! QON container reading and writing.
//!
//! A container holds one animation: a fixed header, a frame index, and one
//! size-prefixed compressed record per frame.
//!
//! ```text
//! Header (32 bytes):
//!   Magic: "QONA" (4 bytes)
//!   Version: u16
//!   Flags: u16 (bit0 = any frame inter-frame encoded, bit1 = loop)
//!   Width: u32
//!   Height: u32
//!   Channels: u8 (3 or 4)
//!   Colorspace: u8
//!   Frame count: u32
//!   Frame duration: u32 (microseconds, uniform)
//!   Reserved: 6 bytes
//!
//! Frame index (frame_count * 10 bytes):
//!   Offset: u64 (relative to start of frame data)
//!   Flags: u16 (bit0 = inter-frame encoded)
//!
//! Frame data (variable):
//!   Per frame: size u32, then that many bytes of codec output
//! ```
//!
//! Frames encoded with the inter-frame flag depend on the immediately
//! preceding frame having been reconstructed, so decoding is strictly
//! sequential whenever the container-level flag is set.

mod format;
mod packer;
mod unpacker;

pub use format::{
    CONTAINER_MAGIC, CONTAINER_VERSION, ContainerFlags, ContainerHeader, FRAME_SIZE_BYTES,
    FrameFlags, FrameIndexEntry, read_frame_record, write_frame_record,
};
pub use packer::{ContainerPacker, PackOptions, PackStats, pack_files};
pub use unpacker::{ContainerUnpacker, Frames, UnpackStats, unpack_files};

use std::io;
use std::path::PathBuf;

use crate::codec::{CodecError, ImageDesc};
use crate::imageio::ImageIoError;

/// Errors from packing or unpacking a container.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Image(#[from] ImageIoError),

    /// A failure attributed to one source or output file.
    #[error("{}: {source}", .path.display())]
    InFile {
        path: PathBuf,
        source: Box<ContainerError>,
    },

    #[error("frame {frame} geometry ({found}) does not match the first frame ({expected})")]
    GeometryMismatch {
        frame: usize,
        expected: ImageDesc,
        found: ImageDesc,
    },

    #[error("frame {frame} has invalid geometry ({desc})")]
    InvalidGeometry { frame: usize, desc: ImageDesc },

    #[error("failed to encode frame {frame}: {source}")]
    FrameEncode { frame: usize, source: CodecError },

    #[error("failed to decode frame {frame}: {source}")]
    FrameDecode { frame: usize, source: CodecError },

    #[error("container must hold at least one frame")]
    EmptyContainer,

    #[error("frame {frame} out of range ({count} frames declared)")]
    FrameOutOfRange { frame: usize, count: usize },

    #[error("packed {found} frames but {expected} were declared")]
    FrameCountMismatch { expected: usize, found: usize },
}

impl ContainerError {
    /// Attribute this error to a file path.
    pub(crate) fn in_file(self, path: &std::path::Path) -> Self {
        ContainerError::InFile {
            path: path.to_path_buf(),
            source: Box::new(self),
        }
    }
}
