// ── Display rendering ──
//
// Converts raw camera frames into RGBA for on-screen preview. A
// lookup table maps sample values to display intensity, so stretch
// adjustments only rebuild the table, never rescan the frame source.
// Samples outside the table render black; alpha is always opaque.

use skysync_api::{ImageData, SampleBuffer};

/// Build a linear stretch table over `size` sample values: everything
/// at or below `black_point` maps to 0, everything at or above
/// `white_point` maps to 255.
#[allow(
    clippy::as_conversions,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn linear_lut(black_point: f64, white_point: f64, size: usize) -> Vec<u8> {
    let span = (white_point - black_point).max(f64::EPSILON);
    (0..size)
        .map(|i| ((i as f64 - black_point) / span * 255.0).clamp(0.0, 255.0).round() as u8)
        .collect()
}

/// Render a frame to tightly packed RGBA8 through a lookup table.
///
/// Mono frames replicate the looked-up intensity across R, G, and B;
/// RGB frames look up each channel independently. Returns `None` when
/// the frame geometry is inconsistent or the channel count is neither
/// 1 nor 3.
pub fn render_rgba(image: &ImageData, lut: &[u8]) -> Option<Vec<u8>> {
    if !image.is_consistent() {
        return None;
    }
    match &image.samples {
        SampleBuffer::U8(data) => expand(data, image.channels, lut, usize::from),
        SampleBuffer::U16(data) => expand(data, image.channels, lut, usize::from),
        SampleBuffer::U32(data) => expand(data, image.channels, lut, |s| {
            usize::try_from(s).unwrap_or(usize::MAX)
        }),
    }
}

fn expand<T: Copy>(
    data: &[T],
    channels: u8,
    lut: &[u8],
    index_of: impl Fn(T) -> usize,
) -> Option<Vec<u8>> {
    let shade = |sample: T| lut.get(index_of(sample)).copied().unwrap_or(0);
    match channels {
        1 => {
            let mut out = Vec::with_capacity(data.len() * 4);
            for &sample in data {
                let display = shade(sample);
                out.extend_from_slice(&[display, display, display, 255]);
            }
            Some(out)
        }
        3 => {
            let mut out = Vec::with_capacity(data.len() / 3 * 4);
            for pixel in data.chunks_exact(3) {
                out.extend_from_slice(&[shade(pixel[0]), shade(pixel[1]), shade(pixel[2]), 255]);
            }
            Some(out)
        }
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn identity_lut() -> Vec<u8> {
        (0..=255).collect()
    }

    #[test]
    fn mono_u8_replicates_intensity() {
        let frame = ImageData {
            width: 2,
            height: 1,
            channels: 1,
            samples: SampleBuffer::U8(vec![0, 200]),
        };
        let rgba = render_rgba(&frame, &identity_lut()).unwrap();
        assert_eq!(rgba, vec![0, 0, 0, 255, 200, 200, 200, 255]);
    }

    #[test]
    fn rgb_u16_looks_up_each_channel() {
        let frame = ImageData {
            width: 1,
            height: 1,
            channels: 3,
            samples: SampleBuffer::U16(vec![0, 1, 2]),
        };
        let rgba = render_rgba(&frame, &[10, 20, 30]).unwrap();
        assert_eq!(rgba, vec![10, 20, 30, 255]);
    }

    #[test]
    fn samples_beyond_lut_render_black() {
        let frame = ImageData {
            width: 2,
            height: 1,
            channels: 1,
            samples: SampleBuffer::U16(vec![1, 40_000]),
        };
        let rgba = render_rgba(&frame, &[0, 128]).unwrap();
        assert_eq!(rgba, vec![128, 128, 128, 255, 0, 0, 0, 255]);
    }

    #[test]
    fn u32_samples_are_supported() {
        let frame = ImageData {
            width: 1,
            height: 1,
            channels: 1,
            samples: SampleBuffer::U32(vec![2]),
        };
        let rgba = render_rgba(&frame, &[0, 0, 77]).unwrap();
        assert_eq!(rgba, vec![77, 77, 77, 255]);
    }

    #[test]
    fn inconsistent_geometry_is_rejected() {
        let frame = ImageData {
            width: 3,
            height: 3,
            channels: 1,
            samples: SampleBuffer::U8(vec![0; 5]),
        };
        assert_eq!(render_rgba(&frame, &identity_lut()), None);
    }

    #[test]
    fn unsupported_channel_count_is_rejected() {
        let frame = ImageData {
            width: 1,
            height: 1,
            channels: 2,
            samples: SampleBuffer::U8(vec![0, 0]),
        };
        assert_eq!(render_rgba(&frame, &identity_lut()), None);
    }

    #[test]
    fn linear_lut_clamps_at_both_ends() {
        let lut = linear_lut(10.0, 20.0, 32);
        assert_eq!(lut.len(), 32);
        assert_eq!(lut[0], 0);
        assert_eq!(lut[10], 0);
        assert_eq!(lut[20], 255);
        assert_eq!(lut[31], 255);
        assert!(lut[15] > 0 && lut[15] < 255);
    }
}
