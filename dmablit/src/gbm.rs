//! Minimal safe layer over `gbm-sys`, covering allocation and per-plane
//! DMA-BUF export.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use drm_fourcc::{DrmFourcc, DrmModifier};

pub use gbm_sys::gbm_bo_flags;

use crate::{DrmDevice, Error, Result};

#[derive(Debug)]
pub struct Device {
    raw: *mut gbm_sys::gbm_device,
    // Keeps the dup'd DRM fd alive for the device's lifetime.
    fd: OwnedFd,
}

impl Device {
    /// Create a GBM device over a duplicate of the DRM device's fd.
    ///
    /// The duplicate shares the GEM handle namespace with `dev`, so buffer
    /// handles are valid for modesetting on `dev` as well.
    pub fn new(dev: &DrmDevice) -> Result<Self> {
        let fd = dev.dup_fd()?;

        let raw = unsafe { gbm_sys::gbm_create_device(fd.as_raw_fd()) };
        if raw.is_null() {
            return Err(io::Error::last_os_error().into());
        }

        Ok(Self { raw, fd })
    }

    pub fn as_raw(&self) -> *mut gbm_sys::gbm_device {
        self.raw
    }

    /// Allocate a buffer object. An empty modifier list allocates with an
    /// implicit layout.
    pub fn alloc(
        &self,
        width: u32,
        height: u32,
        fourcc: DrmFourcc,
        modifiers: &[u64],
        flags: gbm_bo_flags::Type,
    ) -> Result<Buffer> {
        let ptr = if modifiers.is_empty() {
            unsafe { gbm_sys::gbm_bo_create(self.raw, width, height, fourcc as u32, flags) }
        } else {
            unsafe {
                gbm_sys::gbm_bo_create_with_modifiers2(
                    self.raw,
                    width,
                    height,
                    fourcc as u32,
                    modifiers.as_ptr(),
                    modifiers.len() as u32,
                    flags,
                )
            }
        };

        if ptr.is_null() {
            Err(Error::BadGbmAlloc)
        } else {
            Ok(Buffer(ptr))
        }
    }

    pub fn is_format_supported(&self, fourcc: DrmFourcc) -> bool {
        unsafe {
            gbm_sys::gbm_device_is_format_supported(
                self.raw,
                fourcc as u32,
                gbm_bo_flags::GBM_BO_USE_RENDERING,
            ) != 0
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        // The OwnedFd closes after the device is destroyed.
        unsafe { gbm_sys::gbm_device_destroy(self.raw) };
    }
}

/// A GBM buffer object.
#[derive(Debug)]
pub struct Buffer(*mut gbm_sys::gbm_bo);

impl Buffer {
    pub fn width(&self) -> u32 {
        unsafe { gbm_sys::gbm_bo_get_width(self.0) }
    }

    pub fn height(&self) -> u32 {
        unsafe { gbm_sys::gbm_bo_get_height(self.0) }
    }

    /// Stride of plane 0.
    pub fn stride(&self) -> u32 {
        unsafe { gbm_sys::gbm_bo_get_stride(self.0) }
    }

    pub fn modifier(&self) -> DrmModifier {
        DrmModifier::from(unsafe { gbm_sys::gbm_bo_get_modifier(self.0) })
    }

    /// GEM handle of plane 0, valid on the fd the device was created over.
    pub fn handle(&self) -> u32 {
        unsafe { gbm_sys::gbm_bo_get_handle(self.0).u32_ }
    }

    /// Export every plane as a DMA-BUF fd with its offset and stride.
    pub fn export(&self) -> Result<BufferExport> {
        let num_planes = unsafe { gbm_sys::gbm_bo_get_plane_count(self.0) };
        let modifier = unsafe { gbm_sys::gbm_bo_get_modifier(self.0) };
        let mut planes = Vec::with_capacity(num_planes as usize);

        for i in 0..num_planes {
            let fd = unsafe { gbm_sys::gbm_bo_get_fd_for_plane(self.0, i) };
            if fd < 0 {
                return Err(io::Error::last_os_error().into());
            }
            let offset = unsafe { gbm_sys::gbm_bo_get_offset(self.0, i) };
            let stride = unsafe { gbm_sys::gbm_bo_get_stride_for_plane(self.0, i) };

            planes.push(BufferPlane {
                dmabuf: unsafe { OwnedFd::from_raw_fd(fd) },
                offset,
                stride,
            });
        }

        Ok(BufferExport {
            modifier: DrmModifier::from(modifier),
            planes,
        })
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe { gbm_sys::gbm_bo_destroy(self.0) };
    }
}

#[derive(Debug)]
pub struct BufferExport {
    pub modifier: DrmModifier,
    pub planes: Vec<BufferPlane>,
}

#[derive(Debug)]
pub struct BufferPlane {
    pub dmabuf: OwnedFd,
    pub offset: u32,
    pub stride: u32,
}
