//! Binary format definitions for QON container files.

use std::io::{self, Read, Write};

use crate::codec::{Colorspace, ImageDesc};

/// Magic bytes identifying a QON container.
pub const CONTAINER_MAGIC: &[u8; 4] = b"QONA";

/// Current format version.
pub const CONTAINER_VERSION: u16 = 1;

/// Container-level header flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerFlags {
    /// At least one frame is encoded relative to its predecessor.
    pub interframe: bool,
    /// Loop the animation on playback.
    pub loop_playback: bool,
}

impl ContainerFlags {
    pub fn to_u16(self) -> u16 {
        let mut flags = 0;
        if self.interframe {
            flags |= 1 << 0;
        }
        if self.loop_playback {
            flags |= 1 << 1;
        }
        flags
    }

    pub fn from_u16(v: u16) -> Self {
        Self {
            interframe: (v & (1 << 0)) != 0,
            loop_playback: (v & (1 << 1)) != 0,
        }
    }
}

/// File header for the QON container format.
///
/// Geometry is container-wide: every frame shares the same width, height,
/// channel count, and colorspace.
#[derive(Debug, Clone)]
pub struct ContainerHeader {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Bytes per pixel (3 or 4).
    pub channels: u8,
    /// Colorspace tag shared by all frames.
    pub colorspace: Colorspace,
    /// Total number of frames (at least 1).
    pub frame_count: u32,
    /// Container flags.
    pub flags: ContainerFlags,
    /// Delay between successive frames in microseconds, uniform.
    pub frame_duration_us: u32,
}

impl ContainerHeader {
    /// Size of the header in bytes.
    /// Magic(4) + Version(2) + Flags(2) + Width(4) + Height(4) + Channels(1) +
    /// Colorspace(1) + FrameCount(4) + FrameDuration(4) + Reserved(6) = 32
    pub const SIZE: usize = 32;

    /// Geometry descriptor shared by every frame.
    pub fn desc(&self) -> ImageDesc {
        ImageDesc {
            width: self.width,
            height: self.height,
            channels: self.channels,
            colorspace: self.colorspace,
        }
    }

    /// Write header to output.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(CONTAINER_MAGIC)?;
        w.write_all(&CONTAINER_VERSION.to_le_bytes())?;
        w.write_all(&self.flags.to_u16().to_le_bytes())?;
        w.write_all(&self.width.to_le_bytes())?;
        w.write_all(&self.height.to_le_bytes())?;
        w.write_all(&[self.channels, self.colorspace as u8])?;
        w.write_all(&self.frame_count.to_le_bytes())?;
        w.write_all(&self.frame_duration_us.to_le_bytes())?;
        // Reserved bytes
        w.write_all(&[0u8; 6])?;
        Ok(())
    }

    /// Read and validate a header.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != CONTAINER_MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Invalid QON magic bytes",
            ));
        }

        let mut buf2 = [0u8; 2];
        let mut buf4 = [0u8; 4];

        r.read_exact(&mut buf2)?;
        let version = u16::from_le_bytes(buf2);
        if version != CONTAINER_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unsupported QON version: {}", version),
            ));
        }

        r.read_exact(&mut buf2)?;
        let flags = ContainerFlags::from_u16(u16::from_le_bytes(buf2));

        r.read_exact(&mut buf4)?;
        let width = u32::from_le_bytes(buf4);

        r.read_exact(&mut buf4)?;
        let height = u32::from_le_bytes(buf4);

        r.read_exact(&mut buf2)?;
        let channels = buf2[0];
        let colorspace = Colorspace::from_u8(buf2[1]).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unknown colorspace tag: {}", buf2[1]),
            )
        })?;

        r.read_exact(&mut buf4)?;
        let frame_count = u32::from_le_bytes(buf4);

        r.read_exact(&mut buf4)?;
        let frame_duration_us = u32::from_le_bytes(buf4);

        // Skip reserved bytes
        let mut reserved = [0u8; 6];
        r.read_exact(&mut reserved)?;

        let header = Self {
            width,
            height,
            channels,
            colorspace,
            frame_count,
            flags,
            frame_duration_us,
        };
        if !header.desc().is_valid() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Malformed frame geometry ({})", header.desc()),
            ));
        }
        if frame_count == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Container declares zero frames",
            ));
        }
        Ok(header)
    }
}

/// Per-frame flags stored in the frame index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags {
    /// Frame is encoded relative to the immediately preceding frame.
    pub interframe: bool,
}

impl FrameFlags {
    pub fn to_u16(self) -> u16 {
        if self.interframe { 1 } else { 0 }
    }

    pub fn from_u16(v: u16) -> Self {
        Self {
            interframe: (v & 1) != 0,
        }
    }
}

/// Index entry for a single frame.
///
/// One entry per frame, packed back to back right after the header.
#[derive(Debug, Clone, Copy)]
pub struct FrameIndexEntry {
    /// Byte offset of the frame's size-prefixed record, relative to the
    /// start of the frame data region.
    pub offset: u64,
    /// Per-frame flags.
    pub flags: FrameFlags,
}

impl FrameIndexEntry {
    /// Size of one index entry in bytes.
    pub const SIZE: usize = 10;

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.offset.to_le_bytes())?;
        w.write_all(&self.flags.to_u16().to_le_bytes())?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf8 = [0u8; 8];
        r.read_exact(&mut buf8)?;
        let offset = u64::from_le_bytes(buf8);

        let mut buf2 = [0u8; 2];
        r.read_exact(&mut buf2)?;
        let flags = FrameFlags::from_u16(u16::from_le_bytes(buf2));

        Ok(Self { offset, flags })
    }
}

/// Width of the size prefix leading every frame record.
pub const FRAME_SIZE_BYTES: usize = 4;

/// Write one size-prefixed frame record.
pub fn write_frame_record<W: Write>(w: &mut W, payload: &[u8]) -> io::Result<()> {
    let size = u32::try_from(payload.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Frame record of {} bytes exceeds the size field", payload.len()),
        )
    })?;
    w.write_all(&size.to_le_bytes())?;
    w.write_all(payload)?;
    Ok(())
}

/// Read one size-prefixed frame record.
///
/// `max_size` bounds the declared payload length; a corrupt prefix pointing
/// past any plausible frame fails here instead of allocating.
pub fn read_frame_record<R: Read>(r: &mut R, max_size: usize) -> io::Result<Vec<u8>> {
    let mut buf4 = [0u8; 4];
    r.read_exact(&mut buf4)?;
    let size = u32::from_le_bytes(buf4) as usize;
    if size > max_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Frame record claims {} bytes, limit is {}", size, max_size),
        ));
    }
    let mut payload = vec![0u8; size];
    r.read_exact(&mut payload)?;
    Ok(payload)
}
