//! Raw MJPEG stream framing
//!
//! A raw `.mjpeg` file (FFmpeg's `mjpeg` muxer) is nothing more than JPEG
//! images back to back. Frames are located by walking JPEG markers rather
//! than searching for `FF D9`, since APPn segments may embed thumbnails with
//! their own SOI/EOI pairs.

use crate::video::format::Resolution;

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const TEM: u8 = 0x01;

fn is_rst(marker: u8) -> bool {
    (0xD0..=0xD7).contains(&marker)
}

fn is_sof(marker: u8) -> bool {
    (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}

fn segment_len(data: &[u8], pos: usize) -> Option<usize> {
    let hi = *data.get(pos)? as usize;
    let lo = *data.get(pos + 1)? as usize;
    let len = (hi << 8) | lo;
    if len < 2 {
        return None;
    }
    Some(len)
}

/// Find the end (exclusive) of the JPEG image starting at `start` (an SOI)
fn image_end(data: &[u8], start: usize) -> Option<usize> {
    let mut pos = start + 2;
    loop {
        if *data.get(pos)? != 0xFF {
            return None;
        }
        // Skip fill bytes
        while *data.get(pos + 1)? == 0xFF {
            pos += 1;
        }
        let marker = *data.get(pos + 1)?;
        pos += 2;

        match marker {
            EOI => return Some(pos),
            m if is_rst(m) || m == TEM => continue,
            SOS => {
                pos += segment_len(data, pos)?;
                // Entropy-coded data: 0xFF is stuffed with 0x00, RSTn may appear
                loop {
                    if *data.get(pos)? == 0xFF {
                        let next = *data.get(pos + 1)?;
                        if next != 0x00 && next != 0xFF && !is_rst(next) {
                            break;
                        }
                        pos += if next == 0xFF { 1 } else { 2 };
                    } else {
                        pos += 1;
                    }
                }
            }
            _ => {
                pos += segment_len(data, pos)?;
            }
        }
    }
}

fn find_soi(data: &[u8], from: usize) -> Option<usize> {
    data.get(from..)?
        .windows(2)
        .position(|w| w[0] == 0xFF && w[1] == SOI)
        .map(|p| p + from)
}

/// Iterator over complete JPEG images in a concatenated stream
pub struct MjpegFrames<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for MjpegFrames<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let start = find_soi(self.data, self.pos)?;
        match image_end(self.data, start) {
            Some(end) => {
                self.pos = end;
                Some(&self.data[start..end])
            }
            None => {
                // Truncated tail
                self.pos = self.data.len();
                None
            }
        }
    }
}

/// Iterate the JPEG images of a raw MJPEG stream
pub fn frames(data: &[u8]) -> MjpegFrames<'_> {
    MjpegFrames { data, pos: 0 }
}

/// First complete JPEG image of a raw MJPEG stream
pub fn first_frame(data: &[u8]) -> Option<&[u8]> {
    frames(data).next()
}

/// Read the frame size from the SOFn header without decoding
///
/// Lets callers size an NV12 output buffer before a decode call.
pub fn probe_resolution(jpeg: &[u8]) -> Option<Resolution> {
    let start = find_soi(jpeg, 0)?;
    let mut pos = start + 2;
    loop {
        if *jpeg.get(pos)? != 0xFF {
            return None;
        }
        while *jpeg.get(pos + 1)? == 0xFF {
            pos += 1;
        }
        let marker = *jpeg.get(pos + 1)?;
        pos += 2;
        if marker == EOI || marker == SOS {
            return None;
        }
        if is_rst(marker) || marker == TEM {
            continue;
        }
        let len = segment_len(jpeg, pos)?;
        if is_sof(marker) {
            // length(2) precision(1) height(2) width(2)
            let seg = jpeg.get(pos..pos + 7)?;
            let height = u16::from_be_bytes([seg[3], seg[4]]) as u32;
            let width = u16::from_be_bytes([seg[5], seg[6]]) as u32;
            return Some(Resolution::new(width, height));
        }
        pos += len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal structurally valid JPEG: SOI, SOF0, SOS with entropy data, EOI
    fn fake_jpeg(width: u16, height: u16, entropy: &[u8]) -> Vec<u8> {
        let mut v = vec![0xFF, SOI];
        // APP0 with an embedded FFD9 in its payload
        v.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x06, 0xFF, 0xD9, 0x00, 0x00]);
        v.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x0B, 0x08]);
        v.extend_from_slice(&height.to_be_bytes());
        v.extend_from_slice(&width.to_be_bytes());
        v.extend_from_slice(&[0x01, 0x01, 0x11, 0x00]);
        v.extend_from_slice(&[0xFF, SOS, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]);
        v.extend_from_slice(entropy);
        v.extend_from_slice(&[0xFF, EOI]);
        v
    }

    #[test]
    fn test_splits_concatenated_stream() {
        let a = fake_jpeg(64, 48, &[0x12, 0xFF, 0x00, 0x34, 0xFF, 0xD0, 0x56]);
        let b = fake_jpeg(32, 16, &[0xAB, 0xCD]);
        let mut stream = a.clone();
        stream.extend_from_slice(&b);

        let found: Vec<&[u8]> = frames(&stream).collect();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0], a.as_slice());
        assert_eq!(found[1], b.as_slice());
        assert_eq!(first_frame(&stream), Some(a.as_slice()));
    }

    #[test]
    fn test_truncated_frame_is_dropped() {
        let a = fake_jpeg(64, 48, &[0x01, 0x02]);
        let b = fake_jpeg(32, 16, &[0x03]);
        let mut stream = a.clone();
        stream.extend_from_slice(&b[..b.len() - 3]);
        assert_eq!(frames(&stream).count(), 1);
        assert!(first_frame(&[0x00, 0x01, 0x02]).is_none());
    }

    #[test]
    fn test_probe_resolution() {
        let a = fake_jpeg(1600, 1200, &[0x00]);
        assert_eq!(probe_resolution(&a), Some(Resolution::new(1600, 1200)));
        assert_eq!(probe_resolution(&[0xFF, 0xD8, 0xFF, 0xD9]), None);
    }
}
