//! Container writer: packs an ordered frame sequence into one file.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::ContainerError;
use super::format::{
    ContainerFlags, ContainerHeader, FrameFlags, FrameIndexEntry, write_frame_record,
};
use crate::codec::{self, Colorspace, ImageDesc};
use crate::imageio;

/// Options for packing a frame sequence.
#[derive(Debug, Clone, Default)]
pub struct PackOptions {
    /// Encode frames relative to their predecessor whenever that is smaller.
    pub interframe: bool,
    /// Mark the animation as looping on playback.
    pub loop_playback: bool,
    /// Delay between successive frames in microseconds.
    pub frame_duration_us: u32,
}

/// Container writer that packs rasters into a QON file.
///
/// The frame count must be known up front; header and index are written as
/// placeholders at creation and backfilled by [`finalize`](Self::finalize).
///
/// Usage:
/// ```ignore
/// let mut packer = ContainerPacker::create("out.qon", frames.len(), options)?;
/// for (pixels, desc) in &frames {
///     packer.add_frame(pixels, desc)?;
/// }
/// let stats = packer.finalize()?;
/// ```
#[derive(Debug)]
pub struct ContainerPacker {
    writer: BufWriter<File>,
    header: ContainerHeader,
    entries: Vec<FrameIndexEntry>,
    options: PackOptions,
    /// Rolling reference raster; present only while inter-frame encoding is
    /// enabled, replaced after every frame.
    prev_frame: Option<Vec<u8>>,
    /// Bytes written into the frame data region so far.
    data_offset: u64,
    /// Worst-case encoded frame size, latched with the geometry.
    max_frame_size: usize,
}

impl ContainerPacker {
    /// Create a packer for exactly `frame_count` frames.
    pub fn create<P: AsRef<Path>>(
        path: P,
        frame_count: usize,
        options: PackOptions,
    ) -> Result<Self, ContainerError> {
        if frame_count == 0 {
            return Err(ContainerError::EmptyContainer);
        }
        let frame_count = u32::try_from(frame_count)
            .map_err(|_| ContainerError::FrameOutOfRange {
                frame: frame_count,
                count: u32::MAX as usize,
            })?;

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        // Reserve the header and index regions; finalize overwrites them.
        let reserved = ContainerHeader::SIZE + frame_count as usize * FrameIndexEntry::SIZE;
        writer.write_all(&vec![0u8; reserved])?;

        // Geometry is latched from the first frame.
        let header = ContainerHeader {
            width: 0,
            height: 0,
            channels: 0,
            colorspace: Colorspace::Srgb,
            frame_count,
            flags: ContainerFlags {
                interframe: false,
                loop_playback: options.loop_playback,
            },
            frame_duration_us: options.frame_duration_us,
        };

        Ok(Self {
            writer,
            header,
            entries: Vec::with_capacity(frame_count as usize),
            options,
            prev_frame: None,
            data_offset: 0,
            max_frame_size: 0,
        })
    }

    /// Geometry latched from the first frame, if any frame was added yet.
    pub fn desc(&self) -> Option<ImageDesc> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.header.desc())
        }
    }

    /// Number of frames added so far.
    pub fn frames_written(&self) -> usize {
        self.entries.len()
    }

    /// Append one frame.
    ///
    /// Returns whether the inter-frame encoding was chosen for it.
    pub fn add_frame(&mut self, pixels: &[u8], desc: &ImageDesc) -> Result<bool, ContainerError> {
        let frame = self.entries.len();
        if frame >= self.header.frame_count as usize {
            return Err(ContainerError::FrameOutOfRange {
                frame,
                count: self.header.frame_count as usize,
            });
        }

        if frame == 0 {
            if !desc.is_valid() {
                return Err(ContainerError::InvalidGeometry { frame, desc: *desc });
            }
            self.header.width = desc.width;
            self.header.height = desc.height;
            self.header.channels = desc.channels;
            self.header.colorspace = desc.colorspace;
            self.max_frame_size = codec::max_encoded_size(desc);
        } else if *desc != self.header.desc() {
            return Err(ContainerError::GeometryMismatch {
                frame,
                expected: self.header.desc(),
                found: *desc,
            });
        }

        let keyframe = codec::encode(pixels, desc, None)
            .map_err(|source| ContainerError::FrameEncode { frame, source })?;
        let interframe = match (&self.prev_frame, self.options.interframe && frame > 0) {
            (Some(prev), true) => Some(
                codec::encode(pixels, desc, Some(prev.as_slice()))
                    .map_err(|source| ContainerError::FrameEncode { frame, source })?,
            ),
            _ => None,
        };

        let (payload, used_interframe) = choose_smaller(keyframe, interframe);
        debug_assert!(payload.len() <= self.max_frame_size);

        let offset = self.data_offset;
        write_frame_record(&mut self.writer, &payload)?;
        self.data_offset += (super::FRAME_SIZE_BYTES + payload.len()) as u64;
        self.entries.push(FrameIndexEntry {
            offset,
            flags: FrameFlags {
                interframe: used_interframe,
            },
        });
        log::debug!(
            "frame {}: {} bytes, interframe={}",
            frame,
            payload.len(),
            used_interframe
        );

        // The current raster becomes the reference for the next frame.
        if self.options.interframe {
            self.prev_frame = Some(pixels.to_vec());
        }

        Ok(used_interframe)
    }

    /// Backfill the header and index and flush the file.
    pub fn finalize(mut self) -> Result<PackStats, ContainerError> {
        let expected = self.header.frame_count as usize;
        if self.entries.len() != expected {
            return Err(ContainerError::FrameCountMismatch {
                expected,
                found: self.entries.len(),
            });
        }

        // The container flag holds iff at least one entry has its bit set.
        let interframe_frames = self.entries.iter().filter(|e| e.flags.interframe).count();
        self.header.flags.interframe = interframe_frames > 0;

        self.writer.seek(SeekFrom::Start(0))?;
        self.header.write_to(&mut self.writer)?;
        for entry in &self.entries {
            entry.write_to(&mut self.writer)?;
        }
        self.writer.flush()?;

        let total_bytes = (ContainerHeader::SIZE + expected * FrameIndexEntry::SIZE) as u64
            + self.data_offset;
        Ok(PackStats {
            frame_count: expected,
            interframe_frames,
            total_bytes,
        })
    }
}

/// Pick the smaller of the two candidate encodings.
///
/// A tie keeps the keyframe: it decodes without touching the previous frame.
fn choose_smaller(keyframe: Vec<u8>, interframe: Option<Vec<u8>>) -> (Vec<u8>, bool) {
    match interframe {
        Some(interframe) if interframe.len() < keyframe.len() => (interframe, true),
        _ => (keyframe, false),
    }
}

/// Pack a list of source image files into a container.
///
/// Every failure is attributed to the file being processed at the time.
pub fn pack_files(
    inputs: &[PathBuf],
    output: &Path,
    options: &PackOptions,
) -> Result<PackStats, ContainerError> {
    let mut packer = ContainerPacker::create(output, inputs.len(), options.clone())
        .map_err(|e| match e {
            ContainerError::Io(_) => e.in_file(output),
            other => other,
        })?;

    for path in inputs {
        let image = imageio::load(path)
            .map_err(|e| ContainerError::from(e).in_file(path))?;
        packer
            .add_frame(&image.pixels, &image.desc)
            .map_err(|e| e.in_file(path))?;
    }

    packer.finalize().map_err(|e| e.in_file(output))
}

/// Statistics from a completed pack.
#[derive(Debug, Clone)]
pub struct PackStats {
    /// Total frames packed.
    pub frame_count: usize,
    /// Frames that chose the inter-frame encoding.
    pub interframe_frames: usize,
    /// Total container size in bytes.
    pub total_bytes: u64,
}

impl std::fmt::Display for PackStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} frames ({} inter-frame), {} bytes total",
            self.frame_count, self.interframe_frames, self.total_bytes
        )
    }
}
