//! Manage a folder of images and assemble the visible ones into an MP4
//! slideshow with ffmpeg.

pub mod catalog;
pub mod config;
pub mod player;
pub mod slideshow;

pub use catalog::{Catalog, CatalogError, ImageEntry, SortKey, Workspace};
pub use config::{ConfigError, ConfigStore, HiddenSet, Settings};
pub use slideshow::{Assembler, FfmpegEncoder, SlideshowError, SlideshowRequest, VideoEncoder};
