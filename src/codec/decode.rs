//! Op-stream to raster decompression.

use super::{
    CodecError, ImageDesc, INDEX_LEN, MASK_2, OP_DIFF, OP_INDEX, OP_LUMA, OP_RGB, OP_RGBA, Px,
    color_hash, delta_start,
};

/// Decompress an op stream back into a raster.
///
/// `reference` must match what the stream was encoded against: `Some` with
/// the identical raster for an inter-frame stream, `None` for a keyframe
/// stream. Trailing bytes past the final pixel are ignored, so a stream
/// followed by an end marker decodes cleanly.
pub fn decode(
    data: &[u8],
    desc: &ImageDesc,
    reference: Option<&[u8]>,
) -> Result<Vec<u8>, CodecError> {
    if !desc.is_valid() {
        return Err(CodecError::InvalidDesc(*desc));
    }
    let expected = desc.byte_len();
    if let Some(reference) = reference {
        if reference.len() != expected {
            return Err(CodecError::ReferenceSize {
                expected,
                found: reference.len(),
            });
        }
    }

    let start = if reference.is_some() {
        delta_start(desc.channels)
    } else {
        Px::START
    };
    let mut out = decode_stream(data, desc, start)?;
    if let Some(reference) = reference {
        for (o, r) in out.iter_mut().zip(reference) {
            *o = o.wrapping_add(*r);
        }
    }
    Ok(out)
}

fn decode_stream(data: &[u8], desc: &ImageDesc, start: Px) -> Result<Vec<u8>, CodecError> {
    let channels = desc.channels as usize;
    let mut out = Vec::with_capacity(desc.byte_len());
    let mut index = [Px::ZERO; INDEX_LEN];
    let mut px = start;
    let mut run: usize = 0;
    let mut pos = 0usize;

    for pixel in 0..desc.pixel_count() {
        if run > 0 {
            run -= 1;
        } else {
            let b1 = *data.get(pos).ok_or(CodecError::Truncated { pixel })?;
            pos += 1;

            match b1 {
                OP_RGB => {
                    let rgb = data
                        .get(pos..pos + 3)
                        .ok_or(CodecError::Truncated { pixel })?;
                    px.r = rgb[0];
                    px.g = rgb[1];
                    px.b = rgb[2];
                    pos += 3;
                }
                OP_RGBA => {
                    let rgba = data
                        .get(pos..pos + 4)
                        .ok_or(CodecError::Truncated { pixel })?;
                    px = Px {
                        r: rgba[0],
                        g: rgba[1],
                        b: rgba[2],
                        a: rgba[3],
                    };
                    pos += 4;
                }
                _ => match b1 & MASK_2 {
                    OP_INDEX => px = index[(b1 & 0x3F) as usize],
                    OP_DIFF => {
                        px.r = px.r.wrapping_add((b1 >> 4) & 0x03).wrapping_sub(2);
                        px.g = px.g.wrapping_add((b1 >> 2) & 0x03).wrapping_sub(2);
                        px.b = px.b.wrapping_add(b1 & 0x03).wrapping_sub(2);
                    }
                    OP_LUMA => {
                        let b2 = *data.get(pos).ok_or(CodecError::Truncated { pixel })?;
                        pos += 1;
                        let vg = (b1 & 0x3F).wrapping_sub(32);
                        px.r = px
                            .r
                            .wrapping_add(vg)
                            .wrapping_sub(8)
                            .wrapping_add((b2 >> 4) & 0x0F);
                        px.g = px.g.wrapping_add(vg);
                        px.b = px.b.wrapping_add(vg).wrapping_sub(8).wrapping_add(b2 & 0x0F);
                    }
                    // OP_RUN: this pixel repeats the previous one.
                    _ => run = (b1 & 0x3F) as usize,
                },
            }
            index[color_hash(px)] = px;
        }

        out.extend_from_slice(&[px.r, px.g, px.b]);
        if channels == 4 {
            out.push(px.a);
        }
    }

    Ok(out)
}
