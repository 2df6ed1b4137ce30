//! Still-image loading and writing.
//!
//! These are the container's collaborators: PNG through the `image` crate,
//! QOI through this crate's own codec wrapped in the standard 14-byte
//! `qoif` framing. Sources that are neither 3- nor 4-channel (grayscale,
//! gray+alpha, palette) are forced to RGBA on load.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::codec::{self, CodecError, Colorspace, ImageDesc};

/// Magic bytes of a QOI still image.
pub const QOI_MAGIC: &[u8; 4] = b"qoif";

/// Size of the QOI file header.
pub const QOI_HEADER_SIZE: usize = 14;

/// End marker trailing every QOI file.
pub const QOI_END_MARKER: [u8; 8] = [0, 0, 0, 0, 0, 0, 0, 1];

/// Errors from loading or writing a still image.
#[derive(Debug, thiserror::Error)]
pub enum ImageIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("PNG error: {0}")]
    Png(#[from] image::ImageError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("unsupported image extension (expected .png or .qoi)")]
    UnsupportedExtension,

    #[error("malformed QOI file: {0}")]
    MalformedQoi(&'static str),

    #[error("unknown output format {0:?} (expected png or qoi)")]
    UnknownFormat(String),
}

/// Output encoding for unpacked frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Qoi,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Qoi => "qoi",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ImageIoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "qoi" => Ok(OutputFormat::Qoi),
            _ => Err(ImageIoError::UnknownFormat(s.to_string())),
        }
    }
}

/// A decoded still image.
#[derive(Debug)]
pub struct LoadedImage {
    pub pixels: Vec<u8>,
    pub desc: ImageDesc,
}

/// Load a still image, dispatching on the file extension.
pub fn load(path: &Path) -> Result<LoadedImage, ImageIoError> {
    match extension_of(path).as_deref() {
        Some("png") => load_png(path),
        Some("qoi") => load_qoi(path),
        _ => Err(ImageIoError::UnsupportedExtension),
    }
}

/// Write a raster as a still image in the given format.
pub fn write(
    path: &Path,
    pixels: &[u8],
    desc: &ImageDesc,
    format: OutputFormat,
) -> Result<(), ImageIoError> {
    match format {
        OutputFormat::Png => {
            let color = if desc.channels == 3 {
                image::ColorType::Rgb8
            } else {
                image::ColorType::Rgba8
            };
            image::save_buffer(path, pixels, desc.width, desc.height, color)?;
        }
        OutputFormat::Qoi => {
            let stream = codec::encode(pixels, desc, None)?;
            let mut data =
                Vec::with_capacity(QOI_HEADER_SIZE + stream.len() + QOI_END_MARKER.len());
            data.extend_from_slice(QOI_MAGIC);
            data.extend_from_slice(&desc.width.to_be_bytes());
            data.extend_from_slice(&desc.height.to_be_bytes());
            data.push(desc.channels);
            data.push(desc.colorspace as u8);
            data.extend_from_slice(&stream);
            data.extend_from_slice(&QOI_END_MARKER);
            fs::write(path, data)?;
        }
    }
    Ok(())
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn load_png(path: &Path) -> Result<LoadedImage, ImageIoError> {
    let img = image::open(path)?;
    let (width, height, pixels, channels) = if img.color().channel_count() == 3 {
        let buf = img.to_rgb8();
        (buf.width(), buf.height(), buf.into_raw(), 3)
    } else {
        // Force all odd encodings to RGBA.
        let buf = img.to_rgba8();
        (buf.width(), buf.height(), buf.into_raw(), 4)
    };
    Ok(LoadedImage {
        pixels,
        desc: ImageDesc {
            width,
            height,
            channels,
            colorspace: Colorspace::Srgb,
        },
    })
}

fn load_qoi(path: &Path) -> Result<LoadedImage, ImageIoError> {
    let data = fs::read(path)?;
    if data.len() < QOI_HEADER_SIZE {
        return Err(ImageIoError::MalformedQoi("truncated header"));
    }
    if &data[0..4] != QOI_MAGIC {
        return Err(ImageIoError::MalformedQoi("bad magic bytes"));
    }

    let width = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    let height = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
    let channels = data[12];
    let colorspace =
        Colorspace::from_u8(data[13]).ok_or(ImageIoError::MalformedQoi("unknown colorspace"))?;

    let desc = ImageDesc {
        width,
        height,
        channels,
        colorspace,
    };
    if !desc.is_valid() {
        return Err(ImageIoError::MalformedQoi("bad geometry"));
    }

    // The decoder stops after the last pixel, so the end marker needs no
    // special handling.
    let pixels = codec::decode(&data[QOI_HEADER_SIZE..], &desc, None)?;
    Ok(LoadedImage { pixels, desc })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn desc(width: u32, height: u32, channels: u8) -> ImageDesc {
        ImageDesc {
            width,
            height,
            channels,
            colorspace: Colorspace::Srgb,
        }
    }

    fn gradient(desc: &ImageDesc) -> Vec<u8> {
        (0..desc.byte_len()).map(|i| (i * 7) as u8).collect()
    }

    #[test]
    fn test_png_roundtrip_rgba() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        let d = desc(9, 5, 4);
        let pixels = gradient(&d);

        write(&path, &pixels, &d, OutputFormat::Png).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.desc, d);
        assert_eq!(loaded.pixels, pixels);
    }

    #[test]
    fn test_png_roundtrip_rgb() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b.png");
        let d = desc(6, 4, 3);
        let pixels = gradient(&d);

        write(&path, &pixels, &d, OutputFormat::Png).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.desc.channels, 3);
        assert_eq!(loaded.pixels, pixels);
    }

    #[test]
    fn test_qoi_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.qoi");
        let d = desc(12, 3, 4);
        let pixels = gradient(&d);

        write(&path, &pixels, &d, OutputFormat::Qoi).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.desc, d);
        assert_eq!(loaded.pixels, pixels);
    }

    #[test]
    fn test_grayscale_png_forced_to_rgba() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gray.png");
        let gray = vec![128u8; 4 * 4];
        image::save_buffer(&path, &gray, 4, 4, image::ColorType::L8).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.desc.channels, 4);
        assert_eq!(loaded.pixels.len(), 4 * 4 * 4);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let err = load(Path::new("frame.bmp")).unwrap_err();
        assert!(matches!(err, ImageIoError::UnsupportedExtension));
    }

    #[test]
    fn test_malformed_qoi_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.qoi");
        fs::write(&path, b"not a qoi file").unwrap();
        let err = load(&path).unwrap_err();
        assert!(matches!(err, ImageIoError::MalformedQoi(_)));
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("png".parse::<OutputFormat>().unwrap(), OutputFormat::Png);
        assert_eq!("QOI".parse::<OutputFormat>().unwrap(), OutputFormat::Qoi);
        assert!("gif".parse::<OutputFormat>().is_err());
    }
}
