//! Legacy KMS modesetting, enough to put a buffer on a screen.

use std::io;
use std::os::fd::AsRawFd;

use drm_fourcc::DrmFourcc;

use crate::drm_ffi;
use crate::{gbm, DrmDevice, DumbBuffer, Error, Result};

/// A connected connector with its preferred mode and a CRTC to drive it.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    connector_id: u32,
    crtc_id: u32,
    mode: drm_ffi::drmModeModeInfo,
}

impl Output {
    /// Find the first connected connector that has a mode and a CRTC: the
    /// one currently driving the connector, or any CRTC its encoders can
    /// use if nothing is lit yet.
    pub fn first_connected(dev: &DrmDevice) -> Result<Self> {
        let res = unsafe { drm_ffi::drmModeGetResources(dev.as_raw_fd()) };
        if res.is_null() {
            return Err(io::Error::last_os_error().into());
        }

        let output = unsafe { find_output(dev, res) };
        unsafe { drm_ffi::drmModeFreeResources(res) };
        output
    }

    pub fn connector_id(&self) -> u32 {
        self.connector_id
    }

    pub fn crtc_id(&self) -> u32 {
        self.crtc_id
    }

    /// Width and height of the mode in pixels.
    pub fn mode_size(&self) -> (u32, u32) {
        (self.mode.hdisplay as u32, self.mode.vdisplay as u32)
    }

    /// Scan out `fb` on this output.
    pub fn set(&self, dev: &DrmDevice, fb: &Framebuffer) -> Result<()> {
        let mut connector_id = self.connector_id;
        let mut mode = self.mode;
        if unsafe {
            drm_ffi::drmModeSetCrtc(
                dev.as_raw_fd(),
                self.crtc_id,
                fb.id,
                0,
                0,
                &mut connector_id,
                1,
                &mut mode,
            )
        } != 0
        {
            return Err(io::Error::last_os_error().into());
        }
        Ok(())
    }
}

unsafe fn find_output(dev: &DrmDevice, res: *mut drm_ffi::drmModeRes) -> Result<Output> {
    let connectors = unsafe {
        std::slice::from_raw_parts((*res).connectors, (*res).count_connectors as usize)
    };

    for &connector_id in connectors {
        let conn = unsafe { drm_ffi::drmModeGetConnector(dev.as_raw_fd(), connector_id) };
        if conn.is_null() {
            continue;
        }

        let result = unsafe { output_from_connector(dev, res, conn) };
        unsafe { drm_ffi::drmModeFreeConnector(conn) };

        if let Some(output) = result {
            log::debug!(
                "using connector {} mode {}x{}",
                output.connector_id,
                output.mode.hdisplay,
                output.mode.vdisplay,
            );
            return Ok(output);
        }
    }

    Err(Error::NoOutput)
}

unsafe fn output_from_connector(
    dev: &DrmDevice,
    res: *mut drm_ffi::drmModeRes,
    conn: *mut drm_ffi::drmModeConnector,
) -> Option<Output> {
    unsafe {
        if (*conn).connection != drm_ffi::DRM_MODE_CONNECTED || (*conn).count_modes <= 0 {
            return None;
        }

        let modes = std::slice::from_raw_parts((*conn).modes, (*conn).count_modes as usize);
        let mode = *modes
            .iter()
            .find(|m| m.type_ & drm_ffi::DRM_MODE_TYPE_PREFERRED != 0)
            .unwrap_or(&modes[0]);

        let crtc_id = pick_crtc_id(dev, res, conn)?;

        Some(Output {
            connector_id: (*conn).connector_id,
            crtc_id,
            mode,
        })
    }
}

unsafe fn pick_crtc_id(
    dev: &DrmDevice,
    res: *mut drm_ffi::drmModeRes,
    conn: *mut drm_ffi::drmModeConnector,
) -> Option<u32> {
    unsafe {
        // Prefer the CRTC already driving this connector.
        if (*conn).encoder_id != 0 {
            let enc = drm_ffi::drmModeGetEncoder(dev.as_raw_fd(), (*conn).encoder_id);
            if !enc.is_null() {
                let crtc_id = (*enc).crtc_id;
                drm_ffi::drmModeFreeEncoder(enc);
                if crtc_id != 0 {
                    return Some(crtc_id);
                }
            }
        }

        // No active modeset (fresh boot, no compositor). Pick any CRTC one
        // of the connector's encoders can drive.
        let crtcs = std::slice::from_raw_parts((*res).crtcs, (*res).count_crtcs as usize);
        let encoders =
            std::slice::from_raw_parts((*conn).encoders, (*conn).count_encoders as usize);
        for &encoder_id in encoders {
            let enc = drm_ffi::drmModeGetEncoder(dev.as_raw_fd(), encoder_id);
            if enc.is_null() {
                continue;
            }
            let possible_crtcs = (*enc).possible_crtcs;
            drm_ffi::drmModeFreeEncoder(enc);
            if let Some(crtc_id) = crtc_for_encoder(possible_crtcs, crtcs) {
                return Some(crtc_id);
            }
        }

        None
    }
}

/// `possible_crtcs` is a bitmask over the indices of the CRTC list in
/// `drmModeRes`.
fn crtc_for_encoder(possible_crtcs: u32, crtcs: &[u32]) -> Option<u32> {
    crtcs
        .iter()
        .enumerate()
        .find(|&(i, _)| i < 32 && possible_crtcs & (1 << i) != 0)
        .map(|(_, &id)| id)
}

/// A DRM framebuffer wrapping a buffer the device already has a GEM handle
/// for.
#[derive(Debug)]
pub struct Framebuffer<'a> {
    dev: &'a DrmDevice,
    id: u32,
}

impl<'a> Framebuffer<'a> {
    /// Wrap a dumb buffer. `fourcc` must be a single-plane format matching
    /// the buffer's 32 bpp allocation.
    pub fn from_dumb(dev: &'a DrmDevice, buf: &DumbBuffer, fourcc: DrmFourcc) -> Result<Self> {
        Self::add(
            dev,
            buf.width(),
            buf.height(),
            fourcc,
            buf.handle(),
            buf.pitch(),
        )
    }

    /// Wrap plane 0 of a GBM buffer. The GBM device must have been created
    /// from `dev` so the handle is valid here.
    pub fn from_bo(dev: &'a DrmDevice, bo: &gbm::Buffer, fourcc: DrmFourcc) -> Result<Self> {
        Self::add(dev, bo.width(), bo.height(), fourcc, bo.handle(), bo.stride())
    }

    fn add(
        dev: &'a DrmDevice,
        width: u32,
        height: u32,
        fourcc: DrmFourcc,
        handle: u32,
        pitch: u32,
    ) -> Result<Self> {
        let handles = [handle, 0, 0, 0];
        let pitches = [pitch, 0, 0, 0];
        let offsets = [0u32; 4];
        let mut id = 0;

        if unsafe {
            drm_ffi::drmModeAddFB2(
                dev.as_raw_fd(),
                width,
                height,
                fourcc as u32,
                handles.as_ptr(),
                pitches.as_ptr(),
                offsets.as_ptr(),
                &mut id,
                0,
            )
        } != 0
        {
            return Err(io::Error::last_os_error().into());
        }

        Ok(Self { dev, id })
    }

    pub fn id(&self) -> u32 {
        self.id
    }
}

impl Drop for Framebuffer<'_> {
    fn drop(&mut self) {
        unsafe { drm_ffi::drmModeRmFB(self.dev.as_raw_fd(), self.id) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The encoder's possible_crtcs mask indexes into the resources' CRTC
    // list; an unlit connector must still resolve to a usable CRTC id.
    #[test]
    fn crtc_resolved_from_possible_mask() {
        let crtcs = [31, 32, 33];
        assert_eq!(crtc_for_encoder(0b001, &crtcs), Some(31));
        assert_eq!(crtc_for_encoder(0b110, &crtcs), Some(32));
        assert_eq!(crtc_for_encoder(0b100, &crtcs), Some(33));
        assert_eq!(crtc_for_encoder(0, &crtcs), None);
        // Mask bits past the end of the CRTC list never match.
        assert_eq!(crtc_for_encoder(0b1000, &crtcs), None);
    }
}
