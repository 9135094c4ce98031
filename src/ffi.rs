//! C ABI for the codec
//!
//! Every function returns 0 (or a valid pointer) on success and a negative
//! error code (or NULL) on failure; see [`crate::error`] for the codes.
//! Configuration comes from the `NV12_MJPEG_*` environment variables.
//!
//! # Memory ownership
//!
//! - `alloc_nv12_buffer()` memory is released with `free_nv12_buffer()`
//! - `encoder_create()` / `decoder_create()` contexts are released with
//!   `encoder_destroy()` / `decoder_destroy()`; both accept NULL
//! - caller buffers are only borrowed for the duration of a call
//!
//! # Thread safety
//!
//! A context must not be used from two threads at the same time. Distinct
//! contexts are independent.

use std::ffi::{CStr, OsStr};
use std::os::raw::{c_char, c_int};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr;
use std::slice;

use tracing::error;

use crate::config::CodecConfig;
use crate::error::{CodecError, Result, ERR_INVALID_PARAMETER};
use crate::utils;
use crate::video::format::Resolution;
use crate::video::{buffer, oneshot, Decoder, Encoder};

/// Opaque persistent encoder handle
pub type EncoderContext = Encoder;
/// Opaque persistent decoder handle
pub type DecoderContext = Decoder;

fn status(result: Result<()>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(e) => e.code(),
    }
}

/// # Safety
/// `path` must be NULL or a NUL-terminated string that outlives `'a`.
unsafe fn path_arg<'a>(path: *const c_char) -> Result<&'a Path> {
    if path.is_null() {
        return Err(CodecError::InvalidParameter("null path".to_string()));
    }
    let bytes = CStr::from_ptr(path).to_bytes();
    Ok(Path::new(OsStr::from_bytes(bytes)))
}

// ============================================================================
// Buffers and raw files
// ============================================================================

/// Allocate `width * height * 3 / 2` bytes; NULL on failure
#[no_mangle]
pub extern "C" fn alloc_nv12_buffer(width: c_int, height: c_int) -> *mut u8 {
    let resolution = match Resolution::from_signed(width, height) {
        Ok(resolution) => resolution,
        Err(e) => {
            error!("alloc_nv12_buffer: {}", e);
            return ptr::null_mut();
        }
    };
    let size = resolution.nv12_size();
    let buffer = unsafe { libc::malloc(size) } as *mut u8;
    if buffer.is_null() {
        error!("Failed to allocate NV12 buffer ({} bytes)", size);
    }
    buffer
}

/// Free a buffer from `alloc_nv12_buffer`; NULL is ignored
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn free_nv12_buffer(buffer: *mut u8) {
    if !buffer.is_null() {
        unsafe { libc::free(buffer as *mut libc::c_void) };
    }
}

#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn read_nv12_from_file(
    filename: *const c_char,
    buffer: *mut u8,
    width: c_int,
    height: c_int,
) -> c_int {
    if buffer.is_null() {
        return ERR_INVALID_PARAMETER;
    }
    status((|| {
        let path = unsafe { path_arg(filename)? };
        let resolution = Resolution::from_signed(width, height)?;
        let dst = unsafe { slice::from_raw_parts_mut(buffer, resolution.nv12_size()) };
        buffer::read_nv12_from_file(path, dst, resolution)
    })())
}

#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn write_nv12_to_file(
    filename: *const c_char,
    buffer: *const u8,
    width: c_int,
    height: c_int,
) -> c_int {
    if buffer.is_null() {
        return ERR_INVALID_PARAMETER;
    }
    status((|| {
        let path = unsafe { path_arg(filename)? };
        let resolution = Resolution::from_signed(width, height)?;
        let src = unsafe { slice::from_raw_parts(buffer, resolution.nv12_size()) };
        buffer::write_nv12_to_file(path, src, resolution)
    })())
}

// ============================================================================
// One-shot
// ============================================================================

/// Encode one NV12 frame (`width * height * 3 / 2` bytes) into a file
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn encode_nv12_to_mjpeg(
    nv12_data: *const u8,
    width: c_int,
    height: c_int,
    output_file: *const c_char,
    quality: c_int,
) -> c_int {
    if nv12_data.is_null() {
        return ERR_INVALID_PARAMETER;
    }
    status((|| {
        // Quality first so its code wins over any other problem
        crate::video::Quality::new(quality)?;
        let path = unsafe { path_arg(output_file)? };
        let resolution = Resolution::from_signed(width, height)?;
        let nv12 = unsafe { slice::from_raw_parts(nv12_data, resolution.nv12_size()) };
        oneshot::encode_nv12_to_mjpeg(nv12, resolution, path, quality, &CodecConfig::from_env())
            .map(|_| ())
    })())
}

/// Decode the first frame of an MJPEG file
///
/// `nv12_data` must hold `w * h * 3 / 2` bytes of the decoded size, which
/// is written to `width`/`height`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn decode_mjpeg_to_nv12(
    input_file: *const c_char,
    nv12_data: *mut u8,
    width: *mut c_int,
    height: *mut c_int,
) -> c_int {
    if nv12_data.is_null() || width.is_null() || height.is_null() {
        return ERR_INVALID_PARAMETER;
    }
    status((|| {
        let path = unsafe { path_arg(input_file)? };
        let resolution =
            oneshot::decode_mjpeg_to_nv12_with(path, &CodecConfig::from_env(), |resolution| {
                // Caller contract: the buffer fits the decoded frame
                Ok(unsafe { slice::from_raw_parts_mut(nv12_data, resolution.nv12_size()) })
            })?;
        unsafe {
            *width = resolution.width as c_int;
            *height = resolution.height as c_int;
        }
        Ok(())
    })())
}

// ============================================================================
// Persistent encoder
// ============================================================================

/// Create an encoder bound to `width`x`height` and `quality`; NULL on failure
#[no_mangle]
pub extern "C" fn encoder_create(width: c_int, height: c_int, quality: c_int) -> *mut EncoderContext {
    let created = Resolution::from_signed(width, height)
        .and_then(|resolution| Encoder::new(resolution, quality, &CodecConfig::from_env()));
    match created {
        Ok(encoder) => Box::into_raw(Box::new(encoder)),
        Err(e) => {
            error!("encoder_create({}x{}, q{}) failed: {}", width, height, quality, e);
            ptr::null_mut()
        }
    }
}

/// Encode one frame into `out_buf`
///
/// On a too-small buffer returns the out-of-memory code and stores the
/// required size in `out_size`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn encoder_encode_to_buffer(
    ctx: *mut EncoderContext,
    nv12_in: *const u8,
    out_buf: *mut u8,
    out_buf_cap: usize,
    out_size: *mut usize,
) -> c_int {
    if ctx.is_null() || nv12_in.is_null() || out_buf.is_null() || out_size.is_null() {
        return ERR_INVALID_PARAMETER;
    }
    let encoder = unsafe { &mut *ctx };
    let nv12 = unsafe { slice::from_raw_parts(nv12_in, encoder.params().resolution.nv12_size()) };
    let out = unsafe { slice::from_raw_parts_mut(out_buf, out_buf_cap) };

    match encoder.encode_to_buffer(nv12, out) {
        Ok(size) => {
            unsafe { *out_size = size };
            0
        }
        Err(e) => {
            if let CodecError::BufferTooSmall { required } = e {
                unsafe { *out_size = required };
            }
            e.code()
        }
    }
}

/// Buffer size that always fits one frame of this encoder; 0 for NULL
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn encoder_max_output_size(ctx: *const EncoderContext) -> usize {
    if ctx.is_null() {
        return 0;
    }
    unsafe { &*ctx }.max_output_size()
}

#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn encoder_destroy(ctx: *mut EncoderContext) {
    if !ctx.is_null() {
        drop(unsafe { Box::from_raw(ctx) });
    }
}

// ============================================================================
// Persistent decoder
// ============================================================================

/// Create a decoder; NULL on failure
#[no_mangle]
pub extern "C" fn decoder_create() -> *mut DecoderContext {
    match Decoder::new(&CodecConfig::from_env()) {
        Ok(decoder) => Box::into_raw(Box::new(decoder)),
        Err(e) => {
            error!("decoder_create failed: {}", e);
            ptr::null_mut()
        }
    }
}

/// Decode one JPEG image into `out_buf`
///
/// `mjpeg` is only read during the call. The decoded size is stored in
/// `out_w`/`out_h`, also when `out_buf_cap` turns out too small; both are
/// zeroed when the input could not be decoded.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn decoder_decode_from_buffer(
    ctx: *mut DecoderContext,
    mjpeg: *const u8,
    mjpeg_len: usize,
    out_buf: *mut u8,
    out_buf_cap: usize,
    out_w: *mut c_int,
    out_h: *mut c_int,
) -> c_int {
    if ctx.is_null()
        || mjpeg.is_null()
        || mjpeg_len == 0
        || out_buf.is_null()
        || out_w.is_null()
        || out_h.is_null()
    {
        return ERR_INVALID_PARAMETER;
    }
    let decoder = unsafe { &mut *ctx };
    let input = unsafe { slice::from_raw_parts(mjpeg, mjpeg_len) };
    let out = unsafe { slice::from_raw_parts_mut(out_buf, out_buf_cap) };

    let result = decoder.decode_to_buffer(input, out);
    let (width, height) = decoder
        .last_resolution()
        .map_or((0, 0), |r| (r.width as c_int, r.height as c_int));
    unsafe {
        *out_w = width;
        *out_h = height;
    }
    status(result.map(|_| ()))
}

#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn decoder_destroy(ctx: *mut DecoderContext) {
    if !ctx.is_null() {
        drop(unsafe { Box::from_raw(ctx) });
    }
}

// ============================================================================
// Utilities
// ============================================================================

/// Monotonic time in nanoseconds
#[no_mangle]
pub extern "C" fn get_time_ns() -> u64 {
    utils::get_time_ns() as u64
}

/// File size in bytes, -1 on error
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_file_size(filename: *const c_char) -> i64 {
    let size = unsafe { path_arg(filename) }.and_then(|path| utils::get_file_size(path));
    match size {
        Ok(size) => size as i64,
        Err(_) => -1,
    }
}

/// `width * height * 3 / 2`; 0 for negative dimensions
#[no_mangle]
pub extern "C" fn nv12_frame_size(width: c_int, height: c_int) -> usize {
    if width < 0 || height < 0 {
        return 0;
    }
    crate::video::nv12_frame_size(width as usize, height as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ERR_INVALID_QUALITY, ERR_NO_MEMORY};
    use crate::video::pattern;
    use std::ffi::CString;

    fn c_path(path: &Path) -> CString {
        CString::new(path.as_os_str().as_bytes()).unwrap()
    }

    #[test]
    fn test_null_arguments() {
        assert!(alloc_nv12_buffer(0, 10).is_null());
        free_nv12_buffer(ptr::null_mut());
        encoder_destroy(ptr::null_mut());
        decoder_destroy(ptr::null_mut());
        assert_eq!(encoder_max_output_size(ptr::null()), 0);
        assert_eq!(get_file_size(ptr::null()), -1);

        let mut size = 0usize;
        let mut out = [0u8; 4];
        assert_eq!(
            encoder_encode_to_buffer(ptr::null_mut(), out.as_ptr(), out.as_mut_ptr(), 4, &mut size),
            ERR_INVALID_PARAMETER
        );
        assert_eq!(
            read_nv12_from_file(ptr::null(), out.as_mut_ptr(), 2, 2),
            ERR_INVALID_PARAMETER
        );
    }

    #[test]
    fn test_alloc_and_file_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = c_path(&dir.path().join("frame.yuv"));
        let (w, h) = (16, 8);
        let size = nv12_frame_size(w, h);
        assert_eq!(size, 192);

        let buffer = alloc_nv12_buffer(w, h);
        assert!(!buffer.is_null());
        let frame = pattern::gradient(Resolution::new(16, 8), 2);
        unsafe { ptr::copy_nonoverlapping(frame.as_ptr(), buffer, size) };
        assert_eq!(write_nv12_to_file(path.as_ptr(), buffer, w, h), 0);
        assert_eq!(get_file_size(path.as_ptr()), size as i64);

        let mut back = vec![0u8; size];
        assert_eq!(read_nv12_from_file(path.as_ptr(), back.as_mut_ptr(), w, h), 0);
        assert_eq!(back, frame);
        free_nv12_buffer(buffer);
    }

    #[cfg(not(feature = "rkmpp"))]
    #[test]
    fn test_encoder_decoder_contexts() {
        assert!(encoder_create(64, 48, 0).is_null());
        assert!(encoder_create(64, 48, 32).is_null());
        assert!(encoder_create(-64, 48, 2).is_null());

        let res = Resolution::new(64, 48);
        let enc = encoder_create(64, 48, 2);
        assert!(!enc.is_null());
        let frame = pattern::gradient(res, 0);

        let mut size = 0usize;
        let mut tiny = [0u8; 8];
        let ret = encoder_encode_to_buffer(enc, frame.as_ptr(), tiny.as_mut_ptr(), tiny.len(), &mut size);
        assert_eq!(ret, ERR_NO_MEMORY);
        assert!(size > tiny.len());
        assert_eq!(tiny, [0u8; 8]);
        let required = size;

        let mut jpeg = vec![0u8; encoder_max_output_size(enc)];
        let ret = encoder_encode_to_buffer(enc, frame.as_ptr(), jpeg.as_mut_ptr(), jpeg.len(), &mut size);
        assert_eq!(ret, 0);
        assert!(required >= size);
        jpeg.truncate(size);
        encoder_destroy(enc);

        let dec = decoder_create();
        assert!(!dec.is_null());
        let (mut w, mut h) = (0, 0);
        let mut small = vec![0u8; 10];
        let ret = decoder_decode_from_buffer(dec, jpeg.as_ptr(), jpeg.len(), small.as_mut_ptr(), small.len(), &mut w, &mut h);
        assert_eq!(ret, ERR_NO_MEMORY);
        assert_eq!((w, h), (64, 48));

        let mut out = vec![0u8; res.nv12_size()];
        let ret = decoder_decode_from_buffer(dec, jpeg.as_ptr(), jpeg.len(), out.as_mut_ptr(), out.len(), &mut w, &mut h);
        assert_eq!(ret, 0);
        assert!(pattern::mean_abs_diff(&frame, &out) < 4.0);

        let garbage = b"not a jpeg at all";
        let ret = decoder_decode_from_buffer(dec, garbage.as_ptr(), garbage.len(), out.as_mut_ptr(), out.len(), &mut w, &mut h);
        assert!(ret < 0);
        assert_eq!((w, h), (0, 0));
        decoder_destroy(dec);
    }

    #[test]
    fn test_oneshot_quality_code() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = c_path(&dir.path().join("out.mjpeg"));
        let frame = vec![0u8; 96];
        assert_eq!(
            encode_nv12_to_mjpeg(frame.as_ptr(), 8, 8, path.as_ptr(), 40),
            ERR_INVALID_QUALITY
        );
    }
}
