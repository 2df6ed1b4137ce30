//! Container reader: unpacks a QON file back into individual frames.

use std::fs::{self, File};
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;

use super::ContainerError;
use super::format::{ContainerHeader, FrameIndexEntry, read_frame_record};
use crate::codec::{self, ImageDesc};
use crate::imageio::{self, OutputFormat};

/// Container reader that streams frames out of a QON file.
///
/// Decoding is sequential: a frame carrying the inter-frame flag needs the
/// previous frame's reconstruction, which the unpacker keeps as a rolling
/// reference.
///
/// Usage:
/// ```ignore
/// let mut unpacker = ContainerUnpacker::open("in.qon")?;
/// while let Some(pixels) = unpacker.next_frame()? {
///     // Use pixels...
/// }
/// ```
#[derive(Debug)]
pub struct ContainerUnpacker {
    reader: BufReader<File>,
    header: ContainerHeader,
    entries: Vec<FrameIndexEntry>,
    desc: ImageDesc,
    /// File offset of the frame data region.
    data_start: u64,
    /// Record size cap derived from the geometry.
    max_frame_size: usize,
    next: usize,
    /// Rolling reference raster; kept only while the container-level
    /// inter-frame flag is set.
    prev_frame: Option<Vec<u8>>,
}

impl ContainerUnpacker {
    /// Open a container and read its header and full frame index.
    ///
    /// An index shorter than the header's frame count is a fatal read error
    /// here, before any frame is touched.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ContainerError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let header = ContainerHeader::read_from(&mut reader)?;
        let desc = header.desc();

        let mut entries = Vec::with_capacity(header.frame_count as usize);
        for _ in 0..header.frame_count {
            entries.push(FrameIndexEntry::read_from(&mut reader)?);
        }

        let data_start =
            (ContainerHeader::SIZE + entries.len() * FrameIndexEntry::SIZE) as u64;
        let max_frame_size = codec::max_encoded_size(&desc);

        Ok(Self {
            reader,
            header,
            entries,
            desc,
            data_start,
            max_frame_size,
            next: 0,
            prev_frame: None,
        })
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// Geometry shared by every frame.
    pub fn desc(&self) -> ImageDesc {
        self.desc
    }

    pub fn frame_count(&self) -> usize {
        self.header.frame_count as usize
    }

    /// The frame index, in frame order.
    pub fn entries(&self) -> &[FrameIndexEntry] {
        &self.entries
    }

    /// Decode the next frame in sequence, or `None` past the last one.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, ContainerError> {
        let frame = self.next;
        if frame >= self.entries.len() {
            return Ok(None);
        }
        let entry = self.entries[frame];

        self.reader.seek(SeekFrom::Start(self.data_start + entry.offset))?;
        let payload = read_frame_record(&mut self.reader, self.max_frame_size)?;

        // All three conditions must hold before the reference is trusted:
        // the entry flag alone means nothing without the container-level
        // capability flag, and frame 0 has no predecessor.
        let reference = if self.header.flags.interframe && entry.flags.interframe && frame > 0 {
            self.prev_frame.as_deref()
        } else {
            None
        };

        let pixels = codec::decode(&payload, &self.desc, reference)
            .map_err(|source| ContainerError::FrameDecode { frame, source })?;

        self.next = frame + 1;
        if self.header.flags.interframe {
            self.prev_frame = Some(pixels.clone());
        }
        Ok(Some(pixels))
    }

    /// Iterate over the remaining frames.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames { unpacker: self }
    }
}

/// Iterator over decoded frames.
pub struct Frames<'a> {
    unpacker: &'a mut ContainerUnpacker,
}

impl<'a> Iterator for Frames<'a> {
    type Item = Result<Vec<u8>, ContainerError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.unpacker.next_frame().transpose()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.unpacker.frame_count() - self.unpacker.next;
        (remaining, Some(remaining))
    }
}

impl<'a> ExactSizeIterator for Frames<'a> {}

/// Unpack every frame of a container into `outdir`.
///
/// Frames are written as `00000000.<ext>`, `00000001.<ext>`, ... in the
/// requested format. A frame that fails to decode stops the unpack but
/// keeps the frames already written; every other failure is fatal.
pub fn unpack_files(
    input: &Path,
    outdir: &Path,
    format: OutputFormat,
) -> Result<UnpackStats, ContainerError> {
    let mut unpacker =
        ContainerUnpacker::open(input).map_err(|e| e.in_file(input))?;
    let desc = unpacker.desc();
    let frame_count = unpacker.frame_count();

    fs::create_dir_all(outdir)?;

    let mut frames_written = 0;
    let mut failed_frame = None;
    for frame in 0..frame_count {
        let pixels = match unpacker.next_frame() {
            Ok(Some(pixels)) => pixels,
            Ok(None) => break,
            Err(err @ ContainerError::FrameDecode { .. }) => {
                log::warn!("{}: {err}, stopping", input.display());
                failed_frame = Some(frame);
                break;
            }
            Err(err) => return Err(err.in_file(input)),
        };

        let name = format!("{frame:08}.{}", format.extension());
        let path = outdir.join(name);
        imageio::write(&path, &pixels, &desc, format)
            .map_err(|e| ContainerError::from(e).in_file(&path))?;
        frames_written += 1;
    }

    Ok(UnpackStats {
        frames_written,
        frame_count,
        failed_frame,
    })
}

/// Statistics from an unpack.
#[derive(Debug, Clone)]
pub struct UnpackStats {
    /// Frames written to the output directory.
    pub frames_written: usize,
    /// Frames the container declares.
    pub frame_count: usize,
    /// Frame that failed to decode, when the unpack stopped early.
    pub failed_frame: Option<usize>,
}

impl std::fmt::Display for UnpackStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} of {} frames", self.frames_written, self.frame_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Colorspace;
    use crate::container::{ContainerPacker, PackOptions};
    use rand::{Rng, SeedableRng, rngs::StdRng};
    use std::io::Write as _;
    use tempfile::tempdir;

    fn rgba_desc(width: u32, height: u32) -> ImageDesc {
        ImageDesc {
            width,
            height,
            channels: 4,
            colorspace: Colorspace::Srgb,
        }
    }

    fn rgb_desc(width: u32, height: u32) -> ImageDesc {
        ImageDesc {
            width,
            height,
            channels: 3,
            colorspace: Colorspace::Srgb,
        }
    }

    fn noise_frames(desc: &ImageDesc, count: usize, seed: u64) -> Vec<Vec<u8>> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut frames = Vec::with_capacity(count);
        let mut frame: Vec<u8> = (0..desc.byte_len()).map(|_| rng.r#gen()).collect();
        frames.push(frame.clone());
        for _ in 1..count {
            // Perturb a slice of the previous frame so inter-frame deltas
            // stay attractive.
            for v in frame.iter_mut().take(desc.byte_len() / 4) {
                *v = v.wrapping_add(rng.r#gen::<u8>() & 7);
            }
            frames.push(frame.clone());
        }
        frames
    }

    fn pack_frames(
        path: &Path,
        desc: &ImageDesc,
        frames: &[Vec<u8>],
        interframe: bool,
    ) {
        let options = PackOptions {
            interframe,
            frame_duration_us: 40_000,
            ..Default::default()
        };
        let mut packer = ContainerPacker::create(path, frames.len(), options).unwrap();
        for pixels in frames {
            packer.add_frame(pixels, desc).unwrap();
        }
        packer.finalize().unwrap();
    }

    #[test]
    fn test_roundtrip_keyframes_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("key.qon");
        let desc = rgba_desc(16, 12);
        let frames = noise_frames(&desc, 4, 21);

        pack_frames(&path, &desc, &frames, false);

        let mut unpacker = ContainerUnpacker::open(&path).unwrap();
        assert_eq!(unpacker.frame_count(), 4);
        assert_eq!(unpacker.desc(), desc);
        assert!(!unpacker.header().flags.interframe);
        assert_eq!(unpacker.header().frame_duration_us, 40_000);

        for original in &frames {
            let decoded = unpacker.next_frame().unwrap().unwrap();
            assert_eq!(&decoded, original);
        }
        assert!(unpacker.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_roundtrip_interframe() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("inter.qon");
        let desc = rgba_desc(16, 12);
        let frames = noise_frames(&desc, 6, 22);

        pack_frames(&path, &desc, &frames, true);

        let mut unpacker = ContainerUnpacker::open(&path).unwrap();
        assert!(unpacker.header().flags.interframe);
        for (frame, original) in frames.iter().enumerate() {
            let decoded = unpacker.next_frame().unwrap().unwrap();
            assert_eq!(&decoded, original, "frame {} mismatch", frame);
        }
    }

    #[test]
    fn test_roundtrip_interframe_rgb() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rgb.qon");
        let desc = rgb_desc(9, 6);
        let frames = noise_frames(&desc, 4, 27);

        pack_frames(&path, &desc, &frames, true);

        let mut unpacker = ContainerUnpacker::open(&path).unwrap();
        assert_eq!(unpacker.desc().channels, 3);
        for (frame, original) in frames.iter().enumerate() {
            let decoded = unpacker.next_frame().unwrap().unwrap();
            assert_eq!(&decoded, original, "frame {} mismatch", frame);
        }
        assert!(unpacker.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_frame_zero_flag_never_set() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zero.qon");
        let desc = rgba_desc(8, 8);
        let frames = noise_frames(&desc, 3, 5);

        pack_frames(&path, &desc, &frames, true);

        let unpacker = ContainerUnpacker::open(&path).unwrap();
        assert!(!unpacker.entries()[0].flags.interframe);
    }

    #[test]
    fn test_frames_iterator() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("iter.qon");
        let desc = rgba_desc(8, 8);
        let frames = noise_frames(&desc, 3, 9);

        pack_frames(&path, &desc, &frames, true);

        let mut unpacker = ContainerUnpacker::open(&path).unwrap();
        let decoded: Vec<_> = unpacker.frames().collect::<Result<_, _>>().unwrap();
        assert_eq!(decoded, frames);
    }

    #[test]
    fn test_truncated_index_fails_at_open() {
        // Header declares 5 frames but the file ends before the index does.
        let dir = tempdir().unwrap();
        let path = dir.path().join("corrupt.qon");

        let header = ContainerHeader {
            width: 4,
            height: 4,
            channels: 4,
            colorspace: Colorspace::Srgb,
            frame_count: 5,
            flags: Default::default(),
            frame_duration_us: 0,
        };
        let mut file = File::create(&path).unwrap();
        header.write_to(&mut file).unwrap();
        FrameIndexEntry {
            offset: 0,
            flags: Default::default(),
        }
        .write_to(&mut file)
        .unwrap();
        file.flush().unwrap();

        let err = ContainerUnpacker::open(&path).unwrap_err();
        match err {
            ContainerError::Io(e) => {
                assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof)
            }
            other => panic!("expected I/O error, got {other}"),
        }
    }

    #[test]
    fn test_corrupt_record_size_is_fatal_read_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("badsize.qon");
        let desc = rgba_desc(4, 4);
        let frames = noise_frames(&desc, 2, 13);
        pack_frames(&path, &desc, &frames, false);

        // Stamp an absurd size prefix over frame 0's record.
        let mut data = fs::read(&path).unwrap();
        let record_start = ContainerHeader::SIZE + 2 * FrameIndexEntry::SIZE;
        data[record_start..record_start + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        fs::write(&path, &data).unwrap();

        let mut unpacker = ContainerUnpacker::open(&path).unwrap();
        let err = unpacker.next_frame().unwrap_err();
        assert!(matches!(err, ContainerError::Io(_)));
    }

    #[test]
    fn test_unpack_files_roundtrip_png_and_qoi() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("anim.qon");
        let desc = rgba_desc(10, 7);
        let frames = noise_frames(&desc, 3, 31);
        pack_frames(&path, &desc, &frames, true);

        for format in [OutputFormat::Png, OutputFormat::Qoi] {
            let outdir = dir.path().join(format!("out-{}", format.extension()));
            let stats = unpack_files(&path, &outdir, format).unwrap();
            assert_eq!(stats.frames_written, 3);
            assert!(stats.failed_frame.is_none());

            for (frame, original) in frames.iter().enumerate() {
                let name = format!("{frame:08}.{}", format.extension());
                let loaded = imageio::load(&outdir.join(name)).unwrap();
                assert_eq!(loaded.desc, desc);
                assert_eq!(&loaded.pixels, original, "frame {} mismatch", frame);
            }
        }
    }

    #[test]
    fn test_unpack_files_stops_on_bad_frame() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.qon");
        let desc = rgba_desc(8, 8);
        let frames = noise_frames(&desc, 3, 17);
        pack_frames(&path, &desc, &frames, false);

        // Find frame 1's record and zero its payload length so the codec
        // runs out of ops mid-frame.
        let mut data = fs::read(&path).unwrap();
        let unpacker = ContainerUnpacker::open(&path).unwrap();
        let data_start = ContainerHeader::SIZE + 3 * FrameIndexEntry::SIZE;
        let record = data_start + unpacker.entries()[1].offset as usize;
        drop(unpacker);
        data[record..record + 4].copy_from_slice(&0u32.to_le_bytes());
        fs::write(&path, &data).unwrap();

        let outdir = dir.path().join("out");
        let stats = unpack_files(&path, &outdir, OutputFormat::Png).unwrap();
        assert_eq!(stats.frames_written, 1);
        assert_eq!(stats.failed_frame, Some(1));
        assert!(outdir.join("00000000.png").exists());
        assert!(!outdir.join("00000001.png").exists());
    }
}
