// src/lib.rs

//! `core-view`: an image browser that shows one image at a time on whatever
//! display is available (an X11 window, a DRM/KMS console, the Linux
//! framebuffer, or a native window elsewhere).

pub mod codec;
pub mod config;
pub mod error;
pub mod geometry;
pub mod input;
pub mod keys;
pub mod navigation;
pub mod pipeline;
pub mod platform;
pub mod session;
pub mod sources;
