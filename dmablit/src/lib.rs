//! Off-screen blitting, YUV-to-RGB conversion and rotation of DMA-BUF frames.
//!
//! Requires EGL 1.5 with the following extensions:
//! - [`EGL_KHR_platform_gbm`][1]
//! - [`EGL_KHR_no_config_context`][2]
//! - [`EGL_KHR_surfaceless_context`][3]
//! - [`EGL_EXT_image_dma_buf_import_modifiers`][4]
//! - [`GL_OES_EGL_image`][5] and [`GL_OES_EGL_image_external`][6]
//!
//! [1]: https://registry.khronos.org/EGL/extensions/KHR/EGL_KHR_platform_gbm.txt
//! [2]: https://registry.khronos.org/EGL/extensions/KHR/EGL_KHR_no_config_context.txt
//! [3]: https://registry.khronos.org/EGL/extensions/KHR/EGL_KHR_surfaceless_context.txt
//! [4]: https://registry.khronos.org/EGL/extensions/EXT/EGL_EXT_image_dma_buf_import_modifiers.txt
//! [5]: https://registry.khronos.org/OpenGL/extensions/OES/OES_EGL_image.txt
//! [6]: https://registry.khronos.org/OpenGL/extensions/OES/OES_EGL_image_external.txt
//!
//! # Usage
//!
//! 1. Open a DRM device with [`DrmDevice::find_card`] (dumb buffers and
//!    modesetting need a primary node) or [`DrmDevice::open`].
//! 1. Allocate a source buffer: a CPU-mappable [`DumbBuffer`] filled from a
//!    raw frame, or a [`gbm`] buffer object.
//! 1. Create an [`EglDisplay`] over the device and a GLES [`EglContext`]
//!    with [`EglContextBuilder`]; make it current. The context is
//!    surfaceless, all rendering targets imported DMA-BUFs.
//! 1. Import the source as a [`DmabufImage`] ([`DmabufImage::from_packed`]
//!    handles single-fd NV12/NV16/YUV420/422/444 layouts) and a GBM-allocated
//!    target with [`DmabufImage::from_planes`].
//! 1. Blit with [`QuadRenderer`], optionally rotated, then read the pixels
//!    back or scan the frame out through [`kms`].

#![deny(unsafe_op_in_unsafe_fn)]

mod drm;
mod drm_ffi;
mod egl;
mod errors;
mod image;
mod render;

pub mod egl_ffi;
pub mod format;
pub mod gbm;
pub mod kms;

pub use drm::{dmabuf_sync_end, dmabuf_sync_start, DrmDevice, DumbBuffer, DumbMapping};
pub use egl::{EglContext, EglContextBuilder, EglDisplay, EglExtensions};
pub use errors::{EglError, Error, Result};
pub use image::{DmabufImage, DmabufPlane};
pub use render::QuadRenderer;

#[derive(Debug, Clone, Copy)]
pub enum GraphicsApi {
    OpenGl,
    OpenGlEs,
}

/// Rotation applied when blitting a source image onto the target.
///
/// Rotation is expressed through the quad's texture coordinates; it never
/// swaps the target's dimensions. Callers size the target as they see fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees {
            0 => Some(Self::Deg0),
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            270 => Some(Self::Deg270),
            _ => None,
        }
    }

    /// Texture coordinates for a `GL_TRIANGLE_STRIP` full-screen quad with
    /// vertices at (-1,-1), (1,-1), (-1,1), (1,1).
    pub fn texcoords(self) -> [f32; 8] {
        match self {
            Self::Deg0 => [0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
            Self::Deg90 => [0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0],
            Self::Deg180 => [1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0],
            Self::Deg270 => [1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_from_degrees() {
        assert_eq!(Rotation::from_degrees(0), Some(Rotation::Deg0));
        assert_eq!(Rotation::from_degrees(90), Some(Rotation::Deg90));
        assert_eq!(Rotation::from_degrees(180), Some(Rotation::Deg180));
        assert_eq!(Rotation::from_degrees(270), Some(Rotation::Deg270));
        assert_eq!(Rotation::from_degrees(45), None);
        assert_eq!(Rotation::from_degrees(360), None);
    }

    #[test]
    fn rotation_texcoords_are_permutations() {
        let base = Rotation::Deg0.texcoords();
        for rot in [Rotation::Deg90, Rotation::Deg180, Rotation::Deg270] {
            let coords = rot.texcoords();
            for corner in coords.chunks(2) {
                assert!(base.chunks(2).any(|c| c == corner));
            }
        }
    }

    #[test]
    fn opposite_rotations_mirror_both_axes() {
        // Rotating by 180 flips every coordinate: (u, v) -> (1-u, 1-v).
        let base = Rotation::Deg0.texcoords();
        let flipped = Rotation::Deg180.texcoords();
        for i in 0..8 {
            assert_eq!(flipped[i], 1.0 - base[i]);
        }
        // Same relation between 90 and 270.
        let cw = Rotation::Deg90.texcoords();
        let ccw = Rotation::Deg270.texcoords();
        for i in 0..8 {
            assert_eq!(ccw[i], 1.0 - cw[i]);
        }
    }
}
