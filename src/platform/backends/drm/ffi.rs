// src/platform/backends/drm/ffi.rs

//! Kernel mode-setting structures and ioctls, mirroring `<drm/drm_mode.h>`.
#![allow(non_camel_case_types)]

use libc::{c_char, c_uint};

pub const DRM_IOCTL_BASE: u8 = b'd';

pub const DRM_CAP_DUMB_BUFFER: u64 = 0x1;
pub const DRM_MODE_CONNECTED: u32 = 1;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_get_cap {
    pub capability: u64,
    pub value: u64,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_mode_card_res {
    pub fb_id_ptr: u64,
    pub crtc_id_ptr: u64,
    pub connector_id_ptr: u64,
    pub encoder_id_ptr: u64,
    pub count_fbs: u32,
    pub count_crtcs: u32,
    pub count_connectors: u32,
    pub count_encoders: u32,
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

/// A display timing. 68 bytes, passed by value inside `drm_mode_crtc`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct drm_mode_modeinfo {
    pub clock: u32,
    pub hdisplay: u16,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub hskew: u16,
    pub vdisplay: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    pub vscan: u16,
    pub vrefresh: u32,
    pub flags: u32,
    pub type_: u32,
    pub name: [c_char; 32],
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_mode_crtc {
    pub set_connectors_ptr: u64,
    pub count_connectors: u32,
    pub crtc_id: u32,
    pub fb_id: u32,
    pub x: u32,
    pub y: u32,
    pub gamma_size: u32,
    pub mode_valid: u32,
    pub mode: drm_mode_modeinfo,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_mode_get_encoder {
    pub encoder_id: u32,
    pub encoder_type: u32,
    pub crtc_id: u32,
    pub possible_crtcs: u32,
    pub possible_clones: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_mode_get_connector {
    pub encoders_ptr: u64,
    pub modes_ptr: u64,
    pub props_ptr: u64,
    pub prop_values_ptr: u64,
    pub count_modes: u32,
    pub count_props: u32,
    pub count_encoders: u32,
    pub encoder_id: u32,
    pub connector_id: u32,
    pub connector_type: u32,
    pub connector_type_id: u32,
    pub connection: u32,
    pub mm_width: u32,
    pub mm_height: u32,
    pub subpixel: u32,
    pub pad: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_mode_fb_cmd {
    pub fb_id: u32,
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub bpp: u32,
    pub depth: u32,
    pub handle: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_mode_create_dumb {
    pub height: u32,
    pub width: u32,
    pub bpp: u32,
    pub flags: u32,
    pub handle: u32,
    pub pitch: u32,
    pub size: u64,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_mode_map_dumb {
    pub handle: u32,
    pub pad: u32,
    pub offset: u64,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct drm_mode_destroy_dumb {
    pub handle: u32,
}

nix::ioctl_readwrite!(drm_ioctl_get_cap, DRM_IOCTL_BASE, 0x0c, drm_get_cap);
nix::ioctl_readwrite!(drm_ioctl_mode_getresources, DRM_IOCTL_BASE, 0xa0, drm_mode_card_res);
nix::ioctl_readwrite!(drm_ioctl_mode_getcrtc, DRM_IOCTL_BASE, 0xa1, drm_mode_crtc);
nix::ioctl_readwrite!(drm_ioctl_mode_setcrtc, DRM_IOCTL_BASE, 0xa2, drm_mode_crtc);
nix::ioctl_readwrite!(drm_ioctl_mode_getencoder, DRM_IOCTL_BASE, 0xa6, drm_mode_get_encoder);
nix::ioctl_readwrite!(drm_ioctl_mode_getconnector, DRM_IOCTL_BASE, 0xa7, drm_mode_get_connector);
nix::ioctl_readwrite!(drm_ioctl_mode_addfb, DRM_IOCTL_BASE, 0xae, drm_mode_fb_cmd);
nix::ioctl_readwrite!(drm_ioctl_mode_rmfb, DRM_IOCTL_BASE, 0xaf, c_uint);
nix::ioctl_readwrite!(drm_ioctl_mode_create_dumb, DRM_IOCTL_BASE, 0xb2, drm_mode_create_dumb);
nix::ioctl_readwrite!(drm_ioctl_mode_map_dumb, DRM_IOCTL_BASE, 0xb3, drm_mode_map_dumb);
nix::ioctl_readwrite!(drm_ioctl_mode_destroy_dumb, DRM_IOCTL_BASE, 0xb4, drm_mode_destroy_dumb);
