//! QON - an animation container for lossless still-image sequences.
//!
//! A QON file packs an ordered sequence of same-geometry rasters into a
//! single container: a fixed header, a per-frame index, and one compressed
//! record per frame. Each frame is either a **keyframe** (independently
//! decodable) or **inter-frame encoded** (a delta against the previous
//! frame's reconstruction); the packer encodes both candidates and keeps
//! whichever is smaller.
//!
//! # Architecture
//!
//! The crate is split into three modules:
//!
//! - `codec`: the byte-oriented lossless pixel codec, with optional
//!   reference-frame (inter-frame) compression
//! - `container`: the QON file format and its pack/unpack orchestration
//! - `imageio`: PNG/QOI still-image loading and writing
//!
//! # Example
//!
//! ```rust,no_run
//! use qon::{ContainerUnpacker, PackOptions, pack_files};
//! use std::path::{Path, PathBuf};
//!
//! // Pack a sequence of stills into one animation.
//! let inputs: Vec<PathBuf> = (0..3).map(|i| format!("frame{i}.png").into()).collect();
//! let options = PackOptions {
//!     interframe: true,
//!     frame_duration_us: 100_000,
//!     ..Default::default()
//! };
//! let stats = pack_files(&inputs, Path::new("out.qon"), &options)?;
//! println!("packed {stats}");
//!
//! // Stream the frames back out.
//! let mut unpacker = ContainerUnpacker::open("out.qon")?;
//! while let Some(pixels) = unpacker.next_frame()? {
//!     println!("{} bytes", pixels.len());
//! }
//! # Ok::<(), qon::ContainerError>(())
//! ```

pub mod codec;
pub mod container;
pub mod imageio;

// Re-export commonly used types
pub use codec::{Colorspace, ImageDesc};
pub use container::{
    ContainerError, ContainerHeader, ContainerPacker, ContainerUnpacker, PackOptions, PackStats,
    UnpackStats, pack_files, unpack_files,
};
pub use imageio::OutputFormat;
