//! Turning an ordered list of images into an MP4 slideshow.
//!
//! The actual encoding is delegated to a [`VideoEncoder`]. The production
//! implementation, [`FfmpegEncoder`], stages the images as numbered frames in
//! a temporary directory and runs `ffmpeg` once over the sequence. Each image
//! is shown for five seconds on a 1920x1080 canvas (letterboxed, never
//! stretched), encoded as H.264/yuv420p.
//!
//! [`Assembler`] owns the request rules: at least two images, a default
//! timestamped file name, and one creation at a time.

use chrono::{DateTime, TimeZone};
use image::{DynamicImage, ImageFormat};
use rayon::prelude::*;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Fewest images a slideshow can be made of.
pub const MIN_IMAGES: usize = 2;

/// `strftime` pattern of generated output names.
pub const DEFAULT_NAME_FORMAT: &str = "slideshow_%Y%m%d_%H%M%S";

const STAGING_DIR: &str = ".slideshow_temp";

#[derive(Error, Debug)]
pub enum SlideshowError {
    #[error("At least 2 images are needed for a slideshow, {count} visible")]
    TooFewImages { count: usize },
    #[error("Encoding failed ({}): {diagnostics}", describe_status(.status))]
    EncodingFailed {
        status: Option<i32>,
        diagnostics: String,
    },
    #[error("A slideshow is already being created")]
    Busy,
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit code {}", code),
        None => "encoder did not run to completion".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingParams {
    pub seconds_per_image: u32,
    pub width: u32,
    pub height: u32,
    pub codec: String,
    pub pixel_format: String,
    pub output_fps: u32,
}

impl Default for EncodingParams {
    fn default() -> Self {
        Self {
            seconds_per_image: 5,
            width: 1920,
            height: 1080,
            codec: "libx264".to_string(),
            pixel_format: "yuv420p".to_string(),
            output_fps: 30,
        }
    }
}

impl EncodingParams {
    /// Fit inside the canvas keeping aspect ratio, then pad to the exact size.
    pub fn video_filter(&self) -> String {
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,format={pf}",
            w = self.width,
            h = self.height,
            pf = self.pixel_format
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideshowRequest {
    pub images: Vec<PathBuf>,
    pub output: PathBuf,
    pub params: EncodingParams,
}

impl SlideshowRequest {
    pub fn new(images: Vec<PathBuf>, output: PathBuf, params: EncodingParams) -> Result<Self, SlideshowError> {
        if images.len() < MIN_IMAGES {
            return Err(SlideshowError::TooFewImages { count: images.len() });
        }
        Ok(Self { images, output, params })
    }

    pub fn duration_secs(&self) -> u64 {
        self.images.len() as u64 * u64::from(self.params.seconds_per_image)
    }
}

/// What an encoder process reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderRun {
    /// Exit code, `None` if the process was killed by a signal.
    pub status: Option<i32>,
    pub diagnostics: String,
}

impl EncoderRun {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Something that can encode a slideshow request in one blocking call.
///
/// `Err` means the encoder could not be run at all; a run that started and
/// failed is an `Ok` with a non-zero status.
pub trait VideoEncoder {
    fn encode(&self, request: &SlideshowRequest) -> io::Result<EncoderRun>;
}

#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: PathBuf,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::with_binary("ffmpeg")
    }
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn is_available(&self) -> bool {
        which::which(&self.binary).is_ok()
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn encode(&self, request: &SlideshowRequest) -> io::Result<EncoderRun> {
        let parent = request
            .output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let stage = FrameStage::prepare(&request.images, parent)?;
        let args = ffmpeg_args(&stage.pattern, &request.output, &request.params);
        log::debug!(
            "Running {} {}",
            self.binary.display(),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let output = Command::new(&self.binary).args(&args).output().map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{} not found, install ffmpeg to create slideshows", self.binary.display()),
                )
            } else {
                e
            }
        })?;

        Ok(EncoderRun {
            status: output.status.code(),
            diagnostics: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Command line for encoding the frame sequence at `frame_pattern`.
pub fn ffmpeg_args(frame_pattern: &Path, output: &Path, params: &EncodingParams) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-y",
        "-loglevel",
        "error",
        "-framerate",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    args.push(format!("1/{}", params.seconds_per_image).into());
    args.push("-i".into());
    args.push(frame_pattern.into());
    args.push("-vf".into());
    args.push(params.video_filter().into());
    args.push("-c:v".into());
    args.push(params.codec.clone().into());
    args.push("-r".into());
    args.push(params.output_fps.to_string().into());
    args.push("-pix_fmt".into());
    args.push(params.pixel_format.clone().into());
    args.push(output.into());
    args
}

fn frame_padding(total_frames: usize) -> usize {
    if total_frames == 0 {
        1
    } else {
        total_frames.ilog10() as usize + 1
    }
}

/// Numbered copies (or links) of the input images, removed on drop.
struct FrameStage {
    dir: PathBuf,
    pattern: PathBuf,
}

impl FrameStage {
    fn prepare(images: &[PathBuf], parent: &Path) -> io::Result<Self> {
        let dir = parent.join(STAGING_DIR);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;

        // All frames must share one extension for the image2 demuxer.
        let format = match images.first().and_then(|p| p.extension()).and_then(ImageFormat::from_extension) {
            Some(ImageFormat::Png) => ImageFormat::Png,
            _ => ImageFormat::Jpeg,
        };
        let extension = if format == ImageFormat::Png { "png" } else { "jpg" };
        let padding = frame_padding(images.len());

        let stage = Self {
            pattern: dir.join(format!("frame_%0{}d.{}", padding, extension)),
            dir,
        };

        images
            .par_iter()
            .enumerate()
            .map(|(i, source)| {
                let target = stage
                    .dir
                    .join(format!("frame_{:0width$}.{}", i + 1, extension, width = padding));
                stage_frame(source, &target, format)
            })
            .collect::<io::Result<Vec<()>>>()?;

        log::debug!("Staged {} frames in {}", images.len(), stage.dir.display());
        Ok(stage)
    }
}

impl Drop for FrameStage {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            log::warn!("Could not remove {}: {}", self.dir.display(), e);
        }
    }
}

fn stage_frame(source: &Path, target: &Path, format: ImageFormat) -> io::Result<()> {
    let source_format = source.extension().and_then(ImageFormat::from_extension);
    if source_format == Some(format) {
        return link_or_copy(source, target);
    }

    let img = image::open(source).map_err(|e| invalid_image(source, e))?;
    let img = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()),
        _ => img,
    };
    img.save_with_format(target, format)
        .map_err(|e| invalid_image(source, e))
}

fn link_or_copy(source: &Path, target: &Path) -> io::Result<()> {
    let source = fs::canonicalize(source)?;
    #[cfg(unix)]
    {
        if std::os::unix::fs::symlink(&source, target).is_ok() {
            return Ok(());
        }
    }
    fs::copy(&source, target).map(|_| ())
}

fn invalid_image(path: &Path, err: image::ImageError) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("{}: {}", path.display(), err),
    )
}

/// Default output name for a slideshow created at `now`.
pub fn default_name<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    format!("{}.mp4", now.format(DEFAULT_NAME_FORMAT))
}

/// Where a slideshow named `name` ends up. Relative names land in `dir`,
/// missing `.mp4` extensions are added, no name means a timestamped default.
pub fn resolve_output<Tz: TimeZone>(dir: &Path, name: Option<&Path>, now: &DateTime<Tz>) -> PathBuf
where
    Tz::Offset: fmt::Display,
{
    let name = match name {
        Some(name) => with_mp4_extension(name.to_path_buf()),
        None => PathBuf::from(default_name(now)),
    };
    if name.is_absolute() {
        name
    } else {
        dir.join(name)
    }
}

fn with_mp4_extension(path: PathBuf) -> PathBuf {
    let is_mp4 = path
        .extension()
        .map_or(false, |e| e.eq_ignore_ascii_case("mp4"));
    if is_mp4 {
        path
    } else {
        let mut name = path.into_os_string();
        name.push(".mp4");
        PathBuf::from(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationState {
    Idle,
    Validating,
    Encoding,
    Succeeded,
    Failed,
}

impl CreationState {
    fn in_progress(self) -> bool {
        matches!(self, CreationState::Validating | CreationState::Encoding)
    }
}

pub struct Assembler<E> {
    encoder: E,
    output_dir: PathBuf,
    params: EncodingParams,
    state: Mutex<CreationState>,
}

impl<E: VideoEncoder> Assembler<E> {
    pub fn new(encoder: E, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            encoder,
            output_dir: output_dir.into(),
            params: EncodingParams::default(),
            state: Mutex::new(CreationState::Idle),
        }
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn params(&self) -> &EncodingParams {
        &self.params
    }

    pub fn state(&self) -> CreationState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Encode `images` in order into one video and return its path.
    ///
    /// Blocks until the encoder exits. Only one creation runs at a time per
    /// assembler; an overlapping call fails with [`SlideshowError::Busy`].
    pub fn create(&self, images: &[PathBuf], output: Option<&Path>) -> Result<PathBuf, SlideshowError> {
        self.begin()?;
        let result = self.run(images, output);
        self.set_state(if result.is_ok() {
            CreationState::Succeeded
        } else {
            CreationState::Failed
        });
        result
    }

    fn begin(&self) -> Result<(), SlideshowError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.in_progress() {
            log::warn!("Slideshow creation already in progress");
            return Err(SlideshowError::Busy);
        }
        *state = CreationState::Validating;
        Ok(())
    }

    fn set_state(&self, next: CreationState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    fn run(&self, images: &[PathBuf], output: Option<&Path>) -> Result<PathBuf, SlideshowError> {
        let output = resolve_output(&self.output_dir, output, &chrono::Local::now());
        let request = SlideshowRequest::new(images.to_vec(), output, self.params.clone()).map_err(|e| {
            log::warn!("{}", e);
            e
        })?;

        self.set_state(CreationState::Encoding);
        log::info!(
            "Starting slideshow creation: {} ({} images)",
            request.output.display(),
            request.images.len()
        );

        let run = self
            .encoder
            .encode(&request)
            .map_err(|e| SlideshowError::EncodingFailed {
                status: None,
                diagnostics: e.to_string(),
            })?;
        if !run.success() {
            log::error!("Encoder failed with {}: {}", describe_status(&run.status), run.diagnostics);
            return Err(SlideshowError::EncodingFailed {
                status: run.status,
                diagnostics: run.diagnostics,
            });
        }

        log::info!("Slideshow created: {}", request.output.display());
        Ok(request.output)
    }
}

impl<E: VideoEncoder + Send + Sync + 'static> Assembler<E> {
    /// Run [`Assembler::create`] on a background thread.
    pub fn spawn(
        self: &Arc<Self>,
        images: Vec<PathBuf>,
        output: Option<PathBuf>,
    ) -> JoinHandle<Result<PathBuf, SlideshowError>> {
        let assembler = Arc::clone(self);
        thread::spawn(move || assembler.create(&images, output.as_deref()))
    }
}
