//! Raster to op-stream compression.

use super::{
    CodecError, ImageDesc, INDEX_LEN, MAX_RUN, OP_DIFF, OP_INDEX, OP_LUMA, OP_RGB, OP_RGBA, OP_RUN,
    Px, color_hash, delta_start, max_encoded_size,
};

/// Compress a raster to an op stream.
///
/// With `reference`, the wrapping byte-delta `pixels - reference` is encoded
/// instead of the raster itself; the decoder must be handed the same
/// reference to reconstruct. The reference must have the same geometry.
pub fn encode(
    pixels: &[u8],
    desc: &ImageDesc,
    reference: Option<&[u8]>,
) -> Result<Vec<u8>, CodecError> {
    if !desc.is_valid() {
        return Err(CodecError::InvalidDesc(*desc));
    }
    let expected = desc.byte_len();
    if pixels.len() != expected {
        return Err(CodecError::BufferSize {
            expected,
            found: pixels.len(),
        });
    }

    match reference {
        None => Ok(encode_stream(pixels, desc, Px::START)),
        Some(reference) => {
            if reference.len() != expected {
                return Err(CodecError::ReferenceSize {
                    expected,
                    found: reference.len(),
                });
            }
            let delta: Vec<u8> = pixels
                .iter()
                .zip(reference)
                .map(|(p, r)| p.wrapping_sub(*r))
                .collect();
            Ok(encode_stream(&delta, desc, delta_start(desc.channels)))
        }
    }
}

fn encode_stream(pixels: &[u8], desc: &ImageDesc, start: Px) -> Vec<u8> {
    let channels = desc.channels as usize;
    let mut out = Vec::with_capacity(max_encoded_size(desc));
    let mut index = [Px::ZERO; INDEX_LEN];
    let mut prev = start;
    let mut run: u8 = 0;

    for chunk in pixels.chunks_exact(channels) {
        let px = Px {
            r: chunk[0],
            g: chunk[1],
            b: chunk[2],
            a: if channels == 4 { chunk[3] } else { 255 },
        };

        if px == prev {
            run += 1;
            if run == MAX_RUN {
                out.push(OP_RUN | (run - 1));
                run = 0;
            }
            continue;
        }
        if run > 0 {
            out.push(OP_RUN | (run - 1));
            run = 0;
        }

        let slot = color_hash(px);
        if index[slot] == px {
            out.push(OP_INDEX | slot as u8);
        } else {
            index[slot] = px;
            if px.a == prev.a {
                let dr = px.r.wrapping_sub(prev.r) as i8;
                let dg = px.g.wrapping_sub(prev.g) as i8;
                let db = px.b.wrapping_sub(prev.b) as i8;
                let dr_dg = dr.wrapping_sub(dg);
                let db_dg = db.wrapping_sub(dg);

                if (-2..=1).contains(&dr) && (-2..=1).contains(&dg) && (-2..=1).contains(&db) {
                    out.push(OP_DIFF | ((dr + 2) as u8) << 4 | ((dg + 2) as u8) << 2 | (db + 2) as u8);
                } else if (-32..=31).contains(&dg)
                    && (-8..=7).contains(&dr_dg)
                    && (-8..=7).contains(&db_dg)
                {
                    out.push(OP_LUMA | (dg + 32) as u8);
                    out.push(((dr_dg + 8) as u8) << 4 | (db_dg + 8) as u8);
                } else {
                    out.push(OP_RGB);
                    out.extend_from_slice(&[px.r, px.g, px.b]);
                }
            } else {
                out.push(OP_RGBA);
                out.extend_from_slice(&[px.r, px.g, px.b, px.a]);
            }
        }
        prev = px;
    }

    if run > 0 {
        out.push(OP_RUN | (run - 1));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Colorspace, MASK_2};

    #[test]
    fn run_ops_never_collide_with_rgb_tags() {
        // Runs are capped at 62 so OP_RUN | len never reaches 0xFE/0xFF.
        let d = ImageDesc {
            width: 200,
            height: 1,
            channels: 4,
            colorspace: Colorspace::Srgb,
        };
        let pixels = vec![0u8; d.byte_len()];
        let encoded = encode(&pixels, &d, None).unwrap();
        for &b in &encoded {
            if b & MASK_2 == OP_RUN {
                assert!(b < OP_RGB);
            }
        }
    }
}
