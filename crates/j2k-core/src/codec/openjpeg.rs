//! OpenJPEG bindings.
//!
//! Owned wrappers around the codec, stream and image handles, the stream
//! callbacks that forward into a `StreamIo`, and the encode/decode sequences.
//! Every handle is destroyed on drop, so an early `?` return releases
//! everything created so far.

use std::borrow::Cow;
use std::ffi::{c_char, c_void, CStr};
use std::marker::PhantomData;
use std::mem;
use std::ptr::{self, NonNull};
use std::slice;

use openjpeg_sys as opj;

use super::stream::{MemoryStream, StreamIo};
use super::{CodecError, CodecStage, Container};
use crate::planar::{ColorSpace, Component, PlanarImage};

/// Upper bound on quality layers (size of the encoder's ratio table).
pub const MAX_QUALITY_LAYERS: usize = 100;

const OPJ_FALSE: opj::OPJ_BOOL = 0;

/// Status returned to the codec for end-of-data and write failures.
const STREAM_FAILURE: usize = usize::MAX;

/// Resolution levels the encoder uses when the image is large enough.
const DEFAULT_RESOLUTIONS: u32 = 6;

fn stage(stage: CodecStage) -> CodecError {
    CodecError::Stage(stage)
}

// ============================================================================
// Handles
// ============================================================================

struct Codec(NonNull<opj::opj_codec_t>);

impl Codec {
    fn compress() -> Result<Self, CodecError> {
        // SAFETY: plain constructor; a null return is handled below.
        let raw = unsafe { opj::opj_create_compress(opj::CODEC_FORMAT::OPJ_CODEC_J2K) };
        NonNull::new(raw).map(Self).ok_or(stage(CodecStage::CreateCodec))
    }

    fn decompress(container: Container) -> Result<Self, CodecError> {
        let format = match container {
            Container::Jp2 => opj::CODEC_FORMAT::OPJ_CODEC_JP2,
            Container::Codestream => opj::CODEC_FORMAT::OPJ_CODEC_J2K,
        };
        // SAFETY: plain constructor; a null return is handled below.
        let raw = unsafe { opj::opj_create_decompress(format) };
        NonNull::new(raw).map(Self).ok_or(stage(CodecStage::CreateCodec))
    }

    fn as_ptr(&self) -> *mut opj::opj_codec_t {
        self.0.as_ptr()
    }

    /// Route the codec's messages to the logger.
    fn install_handlers(&self, diagnostics: bool) {
        if !diagnostics {
            return;
        }
        // SAFETY: the codec is live and the handlers ignore their null
        // client data.
        unsafe {
            opj::opj_set_error_handler(self.as_ptr(), Some(error_handler), ptr::null_mut());
            opj::opj_set_warning_handler(self.as_ptr(), Some(warning_handler), ptr::null_mut());
            opj::opj_set_info_handler(self.as_ptr(), Some(info_handler), ptr::null_mut());
        }
    }
}

impl Drop for Codec {
    fn drop(&mut self) {
        // SAFETY: the handle is owned and destroyed exactly once.
        unsafe { opj::opj_destroy_codec(self.as_ptr()) }
    }
}

/// A codec stream bound to a `StreamIo` for its lifetime.
struct Stream<'a> {
    raw: NonNull<opj::opj_stream_t>,
    _io: PhantomData<&'a mut ()>,
}

impl<'a> Stream<'a> {
    fn writer<S: StreamIo>(io: &'a mut S, chunk_size: usize) -> Result<Self, CodecError> {
        // SAFETY: plain constructor; a null return is handled below.
        let raw = unsafe { opj::opj_stream_create(chunk_size, OPJ_FALSE) };
        let raw = NonNull::new(raw).ok_or(stage(CodecStage::CreateStream))?;
        // SAFETY: `io` outlives the stream through the `'a` borrow and the
        // callback is instantiated for its concrete type.
        unsafe {
            opj::opj_stream_set_write_function(raw.as_ptr(), Some(write_fn::<S>));
            opj::opj_stream_set_user_data(raw.as_ptr(), io as *mut S as *mut c_void, None);
        }
        Ok(Self {
            raw,
            _io: PhantomData,
        })
    }

    fn reader<S: StreamIo>(io: &'a mut S, len: usize) -> Result<Self, CodecError> {
        // SAFETY: plain constructor; a null return is handled below.
        let raw = unsafe { opj::opj_stream_create(len, 1) };
        let raw = NonNull::new(raw).ok_or(stage(CodecStage::CreateStream))?;
        // SAFETY: `io` outlives the stream through the `'a` borrow and the
        // callbacks are instantiated for its concrete type.
        unsafe {
            opj::opj_stream_set_read_function(raw.as_ptr(), Some(read_fn::<S>));
            opj::opj_stream_set_seek_function(raw.as_ptr(), Some(seek_fn::<S>));
            opj::opj_stream_set_skip_function(raw.as_ptr(), Some(skip_fn::<S>));
            opj::opj_stream_set_user_data_length(raw.as_ptr(), len as u64);
            opj::opj_stream_set_user_data(raw.as_ptr(), io as *mut S as *mut c_void, None);
        }
        Ok(Self {
            raw,
            _io: PhantomData,
        })
    }

    fn as_ptr(&self) -> *mut opj::opj_stream_t {
        self.raw.as_ptr()
    }
}

impl Drop for Stream<'_> {
    fn drop(&mut self) {
        // SAFETY: the handle is owned and destroyed exactly once.
        unsafe { opj::opj_stream_destroy(self.as_ptr()) }
    }
}

struct Image(NonNull<opj::opj_image_t>);

impl Image {
    /// Allocate a codec image and copy the planes of `image` into it.
    fn from_planar(image: &PlanarImage) -> Result<Self, CodecError> {
        if image.components.is_empty() {
            return Err(stage(CodecStage::CreateImage));
        }

        let mut params: Vec<opj::opj_image_cmptparm_t> = image
            .components
            .iter()
            .map(|comp| {
                // SAFETY: plain C struct; all-zero is a valid value.
                let mut param: opj::opj_image_cmptparm_t = unsafe { mem::zeroed() };
                param.dx = comp.dx;
                param.dy = comp.dy;
                param.w = comp.width;
                param.h = comp.height;
                param.x0 = image.x0;
                param.y0 = image.y0;
                param.prec = comp.precision;
                param.sgnd = u32::from(comp.signed);
                param
            })
            .collect();

        let color_space = match image.color_space {
            ColorSpace::Gray => opj::COLOR_SPACE::OPJ_CLRSPC_GRAY,
            ColorSpace::Srgb => opj::COLOR_SPACE::OPJ_CLRSPC_SRGB,
            ColorSpace::Unspecified | ColorSpace::Other => {
                opj::COLOR_SPACE::OPJ_CLRSPC_UNSPECIFIED
            }
        };

        // SAFETY: `params` holds `params.len()` initialized entries and is
        // only read during the call.
        let raw = unsafe {
            opj::opj_image_create(params.len() as u32, params.as_mut_ptr(), color_space)
        };
        let handle = NonNull::new(raw).map(Self).ok_or(stage(CodecStage::CreateImage))?;

        // SAFETY: opj_image_create returned a live image with `numcomps`
        // components, each holding a `w * h` sample buffer.
        unsafe {
            let target = &mut *handle.as_ptr();
            target.x0 = image.x0;
            target.y0 = image.y0;
            target.x1 = image.x1;
            target.y1 = image.y1;

            if target.comps.is_null() {
                return Err(stage(CodecStage::CreateImage));
            }
            let comps = slice::from_raw_parts_mut(target.comps, target.numcomps as usize);
            for (dst, src) in comps.iter_mut().zip(&image.components) {
                let len = dst.w as usize * dst.h as usize;
                if dst.data.is_null() || src.data.len() < len {
                    return Err(stage(CodecStage::CreateImage));
                }
                ptr::copy_nonoverlapping(src.data.as_ptr(), dst.data, len);
            }
        }

        Ok(handle)
    }

    fn as_ptr(&self) -> *mut opj::opj_image_t {
        self.0.as_ptr()
    }

    /// Copy the decoded image out of codec memory.
    fn to_planar(&self) -> PlanarImage {
        // SAFETY: the handle is live and the codec filled `comps` with
        // `numcomps` entries whose `data` holds `w * h` samples (or is null).
        let source = unsafe { self.0.as_ref() };
        let comps: &[opj::opj_image_comp_t] = if source.comps.is_null() {
            &[]
        } else {
            // SAFETY: `comps` is non-null with `numcomps` entries.
            unsafe { slice::from_raw_parts(source.comps, source.numcomps as usize) }
        };

        let components = comps
            .iter()
            .map(|comp| {
                let len = comp.w as usize * comp.h as usize;
                let data = if comp.data.is_null() {
                    Vec::new()
                } else {
                    // SAFETY: non-null `data` holds `w * h` samples.
                    unsafe { slice::from_raw_parts(comp.data, len) }.to_vec()
                };
                Component {
                    width: comp.w,
                    height: comp.h,
                    dx: comp.dx,
                    dy: comp.dy,
                    precision: comp.prec,
                    signed: comp.sgnd != 0,
                    data,
                }
            })
            .collect();

        let color_space = match source.color_space {
            opj::COLOR_SPACE::OPJ_CLRSPC_SRGB => ColorSpace::Srgb,
            opj::COLOR_SPACE::OPJ_CLRSPC_GRAY => ColorSpace::Gray,
            opj::COLOR_SPACE::OPJ_CLRSPC_UNKNOWN | opj::COLOR_SPACE::OPJ_CLRSPC_UNSPECIFIED => {
                ColorSpace::Unspecified
            }
            _ => ColorSpace::Other,
        };

        PlanarImage {
            x0: source.x0,
            y0: source.y0,
            x1: source.x1,
            y1: source.y1,
            color_space,
            components,
        }
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        // SAFETY: the handle is owned and destroyed exactly once.
        unsafe { opj::opj_image_destroy(self.as_ptr()) }
    }
}

// ============================================================================
// Callbacks
// ============================================================================

unsafe extern "C" fn read_fn<S: StreamIo>(
    buffer: *mut c_void,
    n: usize,
    user_data: *mut c_void,
) -> usize {
    if buffer.is_null() || user_data.is_null() || n == 0 {
        return STREAM_FAILURE;
    }
    // SAFETY: user data is the `S` registered by `Stream::reader`, and the
    // codec hands over a writable buffer of `n` bytes.
    let io = unsafe { &mut *(user_data as *mut S) };
    let buf = unsafe { slice::from_raw_parts_mut(buffer as *mut u8, n) };
    match io.read(buf) {
        0 => STREAM_FAILURE,
        read => read,
    }
}

/// A failed write reports `usize::MAX`; a zero return would make the codec
/// retry the flush forever.
unsafe extern "C" fn write_fn<S: StreamIo>(
    buffer: *mut c_void,
    n: usize,
    user_data: *mut c_void,
) -> usize {
    if user_data.is_null() || (buffer.is_null() && n > 0) {
        return STREAM_FAILURE;
    }
    if n == 0 {
        return 0;
    }
    // SAFETY: user data is the `S` registered by `Stream::writer`, and the
    // codec hands over `n` readable bytes.
    let io = unsafe { &mut *(user_data as *mut S) };
    let buf = unsafe { slice::from_raw_parts(buffer as *const u8, n) };
    io.write(buf).unwrap_or(STREAM_FAILURE)
}

unsafe extern "C" fn seek_fn<S: StreamIo>(
    offset: opj::OPJ_OFF_T,
    user_data: *mut c_void,
) -> opj::OPJ_BOOL {
    if user_data.is_null() || offset < 0 {
        return OPJ_FALSE;
    }
    // SAFETY: user data is the `S` registered by `Stream::reader`.
    let io = unsafe { &mut *(user_data as *mut S) };
    opj::OPJ_BOOL::from(io.seek(offset as u64))
}

unsafe extern "C" fn skip_fn<S: StreamIo>(
    n: opj::OPJ_OFF_T,
    user_data: *mut c_void,
) -> opj::OPJ_OFF_T {
    if user_data.is_null() || n < 0 {
        return -1;
    }
    // SAFETY: user data is the `S` registered by `Stream::reader`.
    let io = unsafe { &mut *(user_data as *mut S) };
    match io.skip(n as u64) {
        0 if n > 0 => -1,
        skipped => skipped as opj::OPJ_OFF_T,
    }
}

fn message<'a>(msg: *const c_char) -> Option<Cow<'a, str>> {
    if msg.is_null() {
        return None;
    }
    // SAFETY: the codec passes a non-null, NUL-terminated message.
    let text = unsafe { CStr::from_ptr(msg) }.to_string_lossy();
    Some(match text {
        Cow::Borrowed(s) => Cow::Borrowed(s.trim_end()),
        Cow::Owned(s) => Cow::Owned(s.trim_end().to_string()),
    })
}

unsafe extern "C" fn error_handler(msg: *const c_char, _client_data: *mut c_void) {
    if let Some(text) = message(msg) {
        log::error!("[J2K] {}", text);
    }
}

unsafe extern "C" fn warning_handler(msg: *const c_char, _client_data: *mut c_void) {
    if let Some(text) = message(msg) {
        log::warn!("[J2K] {}", text);
    }
}

unsafe extern "C" fn info_handler(msg: *const c_char, _client_data: *mut c_void) {
    if let Some(text) = message(msg) {
        log::debug!("[J2K] {}", text);
    }
}

// ============================================================================
// Encode / decode
// ============================================================================

/// Resolution levels that fit the smallest plane.
///
/// Each level past the first halves the plane, so a side of `n` samples
/// supports at most `floor(log2(n)) + 1` levels.
fn resolution_levels(image: &PlanarImage) -> u32 {
    let smallest = image
        .components
        .iter()
        .map(|comp| comp.width.min(comp.height))
        .min()
        .unwrap_or(1)
        .max(1);
    (smallest.ilog2() + 1).min(DEFAULT_RESOLUTIONS)
}

fn encoder_parameters(
    ratios: &[f32],
    image: &PlanarImage,
) -> Result<opj::opj_cparameters_t, CodecError> {
    if ratios.is_empty() || ratios.len() > MAX_QUALITY_LAYERS {
        return Err(CodecError::InvalidLayers(ratios.len()));
    }

    // SAFETY: plain C struct; all-zero is a valid value and is overwritten
    // by the defaults.
    let mut parameters: opj::opj_cparameters_t = unsafe { mem::zeroed() };
    unsafe { opj::opj_set_default_encoder_parameters(&mut parameters) };

    parameters.cod_format = 0; // J2K codestream
    parameters.tcp_numlayers = ratios.len() as _;
    for (slot, &ratio) in parameters.tcp_distoratio.iter_mut().zip(ratios) {
        *slot = ratio;
    }
    parameters.cp_fixed_quality = 1;
    parameters.numresolution = resolution_levels(image) as _;
    parameters.tcp_mct = u8::from(image.component_count() >= 3) as _;

    Ok(parameters)
}

/// Encode `image` to a raw codestream through a single-write memory stream.
///
/// # Arguments
///
/// * `image` - Planar image to encode
/// * `ratios` - Distortion ratio per quality layer (0 = lossless)
/// * `chunk_size` - Stream buffer size; the whole output must fit in it
/// * `diagnostics` - Forward the codec's messages to the logger
///
/// # Errors
///
/// A stream capacity violation is reported as `CodecError::Stream`, ahead
/// of the stage failure it causes.
pub(crate) fn encode_codestream(
    image: &PlanarImage,
    ratios: &[f32],
    chunk_size: usize,
    diagnostics: bool,
) -> Result<Vec<u8>, CodecError> {
    let mut parameters = encoder_parameters(ratios, image)?;
    let opj_image = Image::from_planar(image)?;

    let codec = Codec::compress()?;
    codec.install_handlers(diagnostics);

    // SAFETY: codec and image are live handles owned by this function.
    let setup =
        unsafe { opj::opj_setup_encoder(codec.as_ptr(), &mut parameters, opj_image.as_ptr()) };
    if setup == OPJ_FALSE {
        return Err(stage(CodecStage::SetupEncoder));
    }

    let mut memory = MemoryStream::writer();
    let result = {
        let stream = Stream::writer(&mut memory, chunk_size)?;
        compress(&codec, &opj_image, &stream)
    };

    if let Some(violation) = memory.violation() {
        return Err(CodecError::Stream(violation.clone()));
    }
    result?;

    memory.into_output().ok_or(CodecError::NoOutput)
}

fn compress(codec: &Codec, image: &Image, stream: &Stream<'_>) -> Result<(), CodecError> {
    // SAFETY: all three handles are live for the duration of the borrow.
    unsafe {
        if opj::opj_start_compress(codec.as_ptr(), image.as_ptr(), stream.as_ptr()) == OPJ_FALSE {
            return Err(stage(CodecStage::StartCompress));
        }
        if opj::opj_encode(codec.as_ptr(), stream.as_ptr()) == OPJ_FALSE {
            return Err(stage(CodecStage::Encode));
        }
        if opj::opj_end_compress(codec.as_ptr(), stream.as_ptr()) == OPJ_FALSE {
            return Err(stage(CodecStage::EndCompress));
        }
    }
    Ok(())
}

/// Decode `bytes` as the given container flavor.
pub(crate) fn decode(
    bytes: &[u8],
    container: Container,
    diagnostics: bool,
) -> Result<PlanarImage, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::EmptyInput);
    }

    let codec = Codec::decompress(container)?;
    codec.install_handlers(diagnostics);

    // SAFETY: plain C struct, overwritten by the defaults; the codec is live.
    let mut parameters: opj::opj_dparameters_t = unsafe { mem::zeroed() };
    unsafe { opj::opj_set_default_decoder_parameters(&mut parameters) };
    if unsafe { opj::opj_setup_decoder(codec.as_ptr(), &mut parameters) } == OPJ_FALSE {
        return Err(stage(CodecStage::SetupDecoder));
    }

    let mut memory = MemoryStream::reader(bytes);
    let stream = Stream::reader(&mut memory, bytes.len())?;

    let mut raw: *mut opj::opj_image_t = ptr::null_mut();
    // SAFETY: stream and codec are live; `raw` receives an owned image or
    // stays null.
    let header_ok = unsafe { opj::opj_read_header(stream.as_ptr(), codec.as_ptr(), &mut raw) };
    let image = NonNull::new(raw).map(Image);
    if header_ok == OPJ_FALSE {
        return Err(stage(CodecStage::ReadHeader));
    }
    let image = image.ok_or(stage(CodecStage::ReadHeader))?;

    // SAFETY: codec, stream and image are live handles owned here.
    if unsafe { opj::opj_decode(codec.as_ptr(), stream.as_ptr(), image.as_ptr()) } == OPJ_FALSE {
        return Err(stage(CodecStage::Decode));
    }

    // SAFETY: as above.
    if unsafe { opj::opj_end_decompress(codec.as_ptr(), stream.as_ptr()) } == OPJ_FALSE {
        log::warn!("{}", stage(CodecStage::EndDecompress));
    }

    Ok(image.to_planar())
}
