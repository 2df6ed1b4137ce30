//! Byte-oriented lossless pixel codec with reference-frame support.
//!
//! This is a **pure codec**: it compresses a raw raster to an op stream and
//! back. There is no file magic and no embedded header; the caller owns the
//! image description (`ImageDesc`) and passes it to both sides. The QON
//! container stores the description once in its own header, and the `.qoi`
//! still-image framing in `imageio` wraps the same stream in the standard
//! 14-byte QOI header.
//!
//! # Op stream
//!
//! Without a reference frame the stream is standard QOI data:
//!
//! ```text
//! 0x00..=0x3F  INDEX  lookup into the 64-entry running color table
//! 0x40..=0x7F  DIFF   2-bit channel deltas from the previous pixel
//! 0x80..=0xBF  LUMA   6-bit green delta + 4-bit red/blue deltas (2 bytes)
//! 0xC0..=0xFD  RUN    1..=62 repeats of the previous pixel
//! 0xFE         RGB    full red/green/blue bytes, alpha unchanged
//! 0xFF         RGBA   full red/green/blue/alpha bytes
//! ```
//!
//! # Inter-frame mode
//!
//! With a reference raster, the encoder compresses the wrapping byte-delta
//! `pixels - reference` through the same op stream and the decoder adds the
//! reference back. Delta streams start from the all-zero "no change" pixel
//! instead of QOI's opaque black, so unchanged regions collapse straight
//! into runs: a frame identical to its reference costs one run op per 62
//! pixels.

mod decode;
mod encode;

pub use decode::decode;
pub use encode::encode;

/// Op tags (2-bit tags occupy the top bits, RGB/RGBA are full bytes).
pub(crate) const OP_INDEX: u8 = 0x00;
pub(crate) const OP_DIFF: u8 = 0x40;
pub(crate) const OP_LUMA: u8 = 0x80;
pub(crate) const OP_RUN: u8 = 0xC0;
pub(crate) const OP_RGB: u8 = 0xFE;
pub(crate) const OP_RGBA: u8 = 0xFF;
pub(crate) const MASK_2: u8 = 0xC0;

/// Running color table length.
pub(crate) const INDEX_LEN: usize = 64;

/// Longest run a single RUN op can express.
pub(crate) const MAX_RUN: u8 = 62;

/// Colorspace tag carried alongside the raster. Informational only; the
/// codec treats all channels as opaque bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Colorspace {
    /// sRGB with linear alpha.
    #[default]
    Srgb = 0,
    /// All channels linear.
    Linear = 1,
}

impl Colorspace {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Colorspace::Srgb),
            1 => Some(Colorspace::Linear),
            _ => None,
        }
    }
}

impl std::fmt::Display for Colorspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Colorspace::Srgb => write!(f, "srgb"),
            Colorspace::Linear => write!(f, "linear"),
        }
    }
}

/// Geometry shared by an encoded stream and its raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Bytes per pixel (3 or 4).
    pub channels: u8,
    /// Colorspace tag.
    pub colorspace: Colorspace,
}

impl ImageDesc {
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Raster length in bytes.
    pub fn byte_len(&self) -> usize {
        self.pixel_count() * self.channels as usize
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && (self.channels == 3 || self.channels == 4)
    }
}

impl std::fmt::Display for ImageDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}, {} channels, {}",
            self.width, self.height, self.channels, self.colorspace
        )
    }
}

/// Worst-case encoded size for one frame: every pixel emitted as a full
/// RGB/RGBA op. Runs and table hits only ever shrink the stream.
pub fn max_encoded_size(desc: &ImageDesc) -> usize {
    desc.pixel_count() * (desc.channels as usize + 1)
}

/// Errors from encoding or decoding a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("invalid image description ({0})")]
    InvalidDesc(ImageDesc),

    #[error("pixel buffer is {found} bytes, expected {expected}")]
    BufferSize { expected: usize, found: usize },

    #[error("reference buffer is {found} bytes, expected {expected}")]
    ReferenceSize { expected: usize, found: usize },

    #[error("compressed stream truncated at pixel {pixel}")]
    Truncated { pixel: usize },
}

/// One pixel in the codec's working representation. 3-channel rasters carry
/// an implicit opaque alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Px {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Px {
    pub(crate) const ZERO: Px = Px {
        r: 0,
        g: 0,
        b: 0,
        a: 0,
    };

    /// Stream start value: opaque black.
    pub(crate) const START: Px = Px {
        r: 0,
        g: 0,
        b: 0,
        a: 255,
    };
}

/// Stream start value for delta streams: the "no change" pixel, so a frame
/// identical to its reference opens directly with a run op. 3-channel
/// rasters carry the implicit opaque alpha here too.
pub(crate) fn delta_start(channels: u8) -> Px {
    Px {
        r: 0,
        g: 0,
        b: 0,
        a: if channels == 4 { 0 } else { 255 },
    }
}

/// Position of a pixel in the running color table.
pub(crate) fn color_hash(px: Px) -> usize {
    (px.r as usize * 3 + px.g as usize * 5 + px.b as usize * 7 + px.a as usize * 11) % INDEX_LEN
}
