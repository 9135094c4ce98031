//! MJPEG encoder using RKMPP via FFmpeg (`mjpeg_rkmpp`)

use std::path::Path;

use ffmpeg_next as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::{codec, encoder, ffi, format, frame, Dictionary, Packet, Rational};
use tracing::{debug, error, trace};

use super::traits::{EncoderBackend, EncoderParams};
use crate::error::{CodecError, Result};
use crate::video::convert::copy_plane_from_packed;
use crate::video::ffmpeg::{init_ffmpeg, is_again, RKMPP_CODEC_NAME};

/// Hardware encoder state: codec context plus one reusable frame and packet
///
/// Field order is drop order: packet, frame, codec context.
pub struct RkmppEncoder {
    packet: Packet,
    has_packet: bool,
    frame: frame::Video,
    encoder: encoder::video::Encoder,
    codec: ffmpeg::Codec,
    params: EncoderParams,
}

// Safety: the FFmpeg codec context, frame and packet are owned exclusively by
// this value and only touched through &mut self. The owning context is never
// shared between threads, but may be moved to another one.
unsafe impl Send for RkmppEncoder {}

impl RkmppEncoder {
    pub fn new(params: EncoderParams) -> Result<Self> {
        params.resolution.ensure_even()?;
        init_ffmpeg()?;

        let codec = encoder::find_by_name(RKMPP_CODEC_NAME).ok_or_else(|| {
            CodecError::NotFound(format!(
                "hardware MJPEG encoder ({}) not found",
                RKMPP_CODEC_NAME
            ))
        })?;

        let encoder = open_encoder(codec, &params)?;

        let width = params.resolution.width;
        let height = params.resolution.height;
        let frame = frame::Video::new(Pixel::NV12, width, height);
        if frame.planes() < 2 {
            return Err(CodecError::AllocFailed(format!(
                "NV12 frame {}x{}",
                width, height
            )));
        }

        debug!(
            "Opened {} encoder {} {} (Y stride {}, UV stride {})",
            RKMPP_CODEC_NAME,
            params.resolution,
            params.quality,
            frame.stride(0),
            frame.stride(1)
        );

        Ok(Self {
            packet: Packet::empty(),
            has_packet: false,
            frame,
            encoder,
            codec,
            params,
        })
    }

    /// Copy packed NV12 into the (possibly padded) codec frame
    fn fill_frame(&mut self, nv12: &[u8], pts: i64) -> Result<()> {
        let resolution = self.params.resolution;
        let width = resolution.width as usize;
        let height = resolution.height as usize;
        let y_size = width * height;
        if nv12.len() < resolution.nv12_size() {
            return Err(CodecError::InvalidParameter(format!(
                "NV12 data too small: {} < {}",
                nv12.len(),
                resolution.nv12_size()
            )));
        }

        // The codec may still reference the previous buffer
        let ret = unsafe { ffi::av_frame_make_writable(self.frame.as_mut_ptr()) };
        if ret < 0 {
            return Err(ffmpeg::Error::from(ret).into());
        }

        let y_stride = self.frame.stride(0);
        copy_plane_from_packed(&nv12[..y_size], width, height, self.frame.data_mut(0), y_stride)?;
        let uv_stride = self.frame.stride(1);
        copy_plane_from_packed(&nv12[y_size..], width, height / 2, self.frame.data_mut(1), uv_stride)?;

        self.frame.set_pts(Some(pts));
        Ok(())
    }

    /// Receive every packet currently available and mux it
    fn drain_into(
        &mut self,
        octx: &mut format::context::Output,
        stream_index: usize,
        encoder_time_base: Rational,
        stream_time_base: Rational,
    ) -> Result<usize> {
        let mut bytes = 0;
        loop {
            match self.encoder.receive_packet(&mut self.packet) {
                Ok(()) => {
                    bytes += self.packet.size();
                    self.packet.set_stream(stream_index);
                    self.packet.rescale_ts(encoder_time_base, stream_time_base);
                    self.packet.write_interleaved(octx).map_err(|e| {
                        error!("Error writing frame: {}", e);
                        CodecError::from(e)
                    })?;
                }
                Err(e) if is_again(&e) || matches!(e, ffmpeg::Error::Eof) => return Ok(bytes),
                Err(e) => {
                    error!("Error receiving packet from encoder: {}", e);
                    return Err(e.into());
                }
            }
        }
    }
}

fn open_encoder(codec: ffmpeg::Codec, params: &EncoderParams) -> Result<encoder::video::Encoder> {
    let mut video = codec::context::Context::new_with_codec(codec)
        .encoder()
        .video()
        .map_err(|e| CodecError::AllocFailed(format!("codec context: {}", e)))?;

    let fps = params.frame_rate.max(1) as i32;
    let qp = params.quality.qp();

    video.set_width(params.resolution.width);
    video.set_height(params.resolution.height);
    video.set_format(Pixel::NV12);
    video.set_time_base(Rational::new(1, fps));
    video.set_frame_rate(Some(Rational::new(fps, 1)));
    // Every MJPEG frame is a keyframe
    video.set_gop(1);
    video.set_max_b_frames(0);
    // No rate control: the hardware must honour the fixed QP
    video.set_bit_rate(0);
    video.set_max_bit_rate(0);
    video.set_qmin(qp);
    video.set_qmax(qp);
    if params.thread_count > 1 {
        video.set_threading(codec::threading::Config {
            kind: codec::threading::Type::Frame,
            count: params.thread_count as usize,
            ..Default::default()
        });
    }

    let mut opts = Dictionary::new();
    opts.set("qp_init", &qp.to_string());

    video.open_as_with(codec, opts).map_err(|e| {
        debug!("Failed to open {}: {}", RKMPP_CODEC_NAME, e);
        CodecError::from(e)
    })
}

impl EncoderBackend for RkmppEncoder {
    fn name(&self) -> &str {
        RKMPP_CODEC_NAME
    }

    fn encode(&mut self, nv12: &[u8], pts: i64) -> Result<usize> {
        self.release_packet();
        self.fill_frame(nv12, pts)?;
        self.encoder.send_frame(&self.frame)?;

        match self.encoder.receive_packet(&mut self.packet) {
            Ok(()) => {}
            Err(e) if is_again(&e) => {
                // The pipeline holds the frame; EOF forces it out
                trace!("{} not ready for pts {}, flushing", RKMPP_CODEC_NAME, pts);
                self.encoder.send_eof()?;
                let result = self.encoder.receive_packet(&mut self.packet);
                // Leave draining mode so the next frame is accepted
                unsafe {
                    ffi::avcodec_flush_buffers(self.encoder.as_mut_ptr());
                }
                result?;
            }
            Err(e) => return Err(e.into()),
        }

        self.has_packet = true;
        Ok(self.packet.size())
    }

    fn packet(&self) -> &[u8] {
        if !self.has_packet {
            return &[];
        }
        self.packet.data().unwrap_or(&[])
    }

    fn release_packet(&mut self) {
        if self.has_packet {
            unsafe {
                ffi::av_packet_unref(self.packet.as_mut_ptr());
            }
            self.has_packet = false;
        }
    }
}

/// Encode one frame into a container file chosen by the path's extension
///
/// Returns the number of compressed bytes written.
pub fn encode_to_file(nv12: &[u8], params: EncoderParams, path: &Path) -> Result<usize> {
    let mut enc = RkmppEncoder::new(params)?;

    let mut octx = format::output(&path).map_err(|e| {
        error!("Failed to open output {}: {}", path.display(), e);
        CodecError::from(e)
    })?;

    let encoder_time_base = Rational::new(1, params.frame_rate.max(1) as i32);
    let stream_index = {
        let mut stream = octx.add_stream(enc.codec).map_err(|e| {
            error!("Failed to create output stream: {}", e);
            CodecError::from(e)
        })?;
        stream.set_parameters(&enc.encoder);
        stream.set_time_base(encoder_time_base);
        stream.index()
    };

    octx.write_header().map_err(|e| {
        error!("Failed to write header: {}", e);
        CodecError::from(e)
    })?;
    let stream_time_base = octx
        .stream(stream_index)
        .map(|s| s.time_base())
        .unwrap_or(encoder_time_base);

    enc.fill_frame(nv12, 0)?;
    enc.encoder.send_frame(&enc.frame).map_err(|e| {
        error!("Error sending frame to encoder: {}", e);
        CodecError::from(e)
    })?;
    let mut written = enc.drain_into(&mut octx, stream_index, encoder_time_base, stream_time_base)?;

    enc.encoder.send_eof()?;
    written += enc.drain_into(&mut octx, stream_index, encoder_time_base, stream_time_base)?;

    octx.write_trailer()?;
    debug!("Wrote {} bytes of MJPEG to {}", written, path.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::ffmpeg::rkmpp_available;
    use crate::video::format::{Quality, Resolution};
    use crate::video::pattern;

    #[test]
    fn test_rkmpp_encode_when_present() {
        if !rkmpp_available() {
            println!("{} not available, skipping", RKMPP_CODEC_NAME);
            return;
        }
        let res = Resolution::new(64, 48);
        let mut enc = RkmppEncoder::new(EncoderParams::new(res, Quality::new(5).unwrap())).unwrap();
        for pts in 0..3 {
            let size = enc.encode(&pattern::gradient(res, pts as u32), pts).unwrap();
            assert!(size > 0);
            assert_eq!(&enc.packet()[..2], &[0xFF, 0xD8]);
        }
    }
}
