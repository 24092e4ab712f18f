#![allow(non_camel_case_types)]
#![allow(non_snake_case)]

use std::ffi::{c_char, c_int, c_uint, c_ulong, c_void};
use std::mem::size_of;

// ioctl request encoding (linux asm-generic/ioctl.h).
const IOC_WRITE: c_ulong = 1;
const IOC_READ: c_ulong = 2;

const fn ioc(dir: c_ulong, ty: c_ulong, nr: c_ulong, size: usize) -> c_ulong {
    (dir << 30) | ((size as c_ulong) << 16) | (ty << 8) | nr
}

const fn drm_iowr(nr: c_ulong, size: usize) -> c_ulong {
    ioc(IOC_READ | IOC_WRITE, 0x64, nr, size)
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

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct drm_prime_handle {
    pub handle: u32,
    pub flags: u32,
    pub fd: i32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct dma_buf_sync {
    pub flags: u64,
}

pub const DRM_IOCTL_MODE_CREATE_DUMB: c_ulong = drm_iowr(0xB2, size_of::<drm_mode_create_dumb>());
pub const DRM_IOCTL_MODE_MAP_DUMB: c_ulong = drm_iowr(0xB3, size_of::<drm_mode_map_dumb>());
pub const DRM_IOCTL_MODE_DESTROY_DUMB: c_ulong = drm_iowr(0xB4, size_of::<drm_mode_destroy_dumb>());
pub const DRM_IOCTL_PRIME_HANDLE_TO_FD: c_ulong = drm_iowr(0x2D, size_of::<drm_prime_handle>());

// linux/dma-buf.h
pub const DMA_BUF_IOCTL_SYNC: c_ulong = ioc(IOC_WRITE, 0x62, 0, size_of::<dma_buf_sync>());
pub const DMA_BUF_SYNC_RW: u64 = 1 | 2;
pub const DMA_BUF_SYNC_START: u64 = 0;
pub const DMA_BUF_SYNC_END: u64 = 1 << 2;

// drm.h prime export flags, aliases for O_CLOEXEC/O_RDWR.
pub const DRM_CLOEXEC: u32 = libc::O_CLOEXEC as u32;
pub const DRM_RDWR: u32 = libc::O_RDWR as u32;

pub const DRM_MODE_CONNECTED: c_uint = 1;
pub const DRM_MODE_TYPE_PREFERRED: u32 = 1 << 3;

#[repr(C)]
#[derive(Debug)]
pub struct drmModeRes {
    pub count_fbs: c_int,
    pub fbs: *mut u32,
    pub count_crtcs: c_int,
    pub crtcs: *mut u32,
    pub count_connectors: c_int,
    pub connectors: *mut u32,
    pub count_encoders: c_int,
    pub encoders: *mut u32,
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct drmModeModeInfo {
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
#[derive(Debug)]
pub struct drmModeConnector {
    pub connector_id: u32,
    pub encoder_id: u32,
    pub connector_type: u32,
    pub connector_type_id: u32,
    pub connection: c_uint,
    pub mmWidth: u32,
    pub mmHeight: u32,
    pub subpixel: c_uint,
    pub count_modes: c_int,
    pub modes: *mut drmModeModeInfo,
    pub count_props: c_int,
    pub props: *mut u32,
    pub prop_values: *mut u64,
    pub count_encoders: c_int,
    pub encoders: *mut u32,
}

#[repr(C)]
#[derive(Debug)]
pub struct drmModeEncoder {
    pub encoder_id: u32,
    pub encoder_type: u32,
    pub crtc_id: u32,
    pub possible_crtcs: u32,
    pub possible_clones: u32,
}

#[link(name = "drm")]
extern "C" {
    pub fn drmIoctl(fd: c_int, request: c_ulong, arg: *mut c_void) -> c_int;

    pub fn drmModeGetResources(fd: c_int) -> *mut drmModeRes;

    pub fn drmModeFreeResources(ptr: *mut drmModeRes);

    pub fn drmModeGetConnector(fd: c_int, connector_id: u32) -> *mut drmModeConnector;

    pub fn drmModeFreeConnector(ptr: *mut drmModeConnector);

    pub fn drmModeGetEncoder(fd: c_int, encoder_id: u32) -> *mut drmModeEncoder;

    pub fn drmModeFreeEncoder(ptr: *mut drmModeEncoder);

    pub fn drmModeAddFB2(
        fd: c_int,
        width: u32,
        height: u32,
        pixel_format: u32,
        bo_handles: *const u32,
        pitches: *const u32,
        offsets: *const u32,
        buf_id: *mut u32,
        flags: u32,
    ) -> c_int;

    pub fn drmModeRmFB(fd: c_int, buffer_id: u32) -> c_int;

    pub fn drmModeSetCrtc(
        fd: c_int,
        crtc_id: u32,
        buffer_id: u32,
        x: u32,
        y: u32,
        connectors: *mut u32,
        count: c_int,
        mode: *mut drmModeModeInfo,
    ) -> c_int;
}

#[cfg(test)]
mod tests {
    use super::*;

    // The encoded request codes must match the values from the kernel uapi
    // headers, otherwise every ioctl silently hits the wrong handler.
    #[test]
    fn ioctl_request_codes() {
        assert_eq!(DRM_IOCTL_MODE_CREATE_DUMB, 0xC02064B2);
        assert_eq!(DRM_IOCTL_MODE_MAP_DUMB, 0xC01064B3);
        assert_eq!(DRM_IOCTL_MODE_DESTROY_DUMB, 0xC00464B4);
        assert_eq!(DRM_IOCTL_PRIME_HANDLE_TO_FD, 0xC00C642D);
        assert_eq!(DMA_BUF_IOCTL_SYNC, 0x40086200);
    }

    #[test]
    fn mode_info_layout() {
        assert_eq!(size_of::<drmModeModeInfo>(), 68);
        assert_eq!(size_of::<drm_mode_create_dumb>(), 32);
        assert_eq!(size_of::<drm_prime_handle>(), 12);
    }
}
