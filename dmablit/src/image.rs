use std::os::fd::{AsRawFd, BorrowedFd};

use drm_fourcc::{DrmFourcc, DrmModifier};

use crate::format;
use crate::{egl_ffi, EglDisplay, Error, Result};

/// One plane of a DMA-BUF frame.
#[derive(Debug, Clone, Copy)]
pub struct DmabufPlane<'fd> {
    pub fd: BorrowedFd<'fd>,
    pub offset: u32,
    pub pitch: u32,
}

/// A DMA-BUF imported into EGL as an `EGLImage`.
///
/// The image can be linked to a GL renderbuffer object (to render into the
/// DMA-BUF) or sampled as an external texture (to read from it, with YUV
/// conversion done by the driver). The underlying fds may be closed once the
/// image is created; the import keeps the memory alive.
pub struct DmabufImage {
    egl_display: egl_ffi::EGLDisplay,
    egl_image: egl_ffi::EGLImage,
    fourcc: DrmFourcc,
    width: u32,
    height: u32,
    egl_image_target_renderbuffer_storage_oes: egl_ffi::EglImageTargetRenderbufferStorageOesProc,
    egl_image_target_texture_2d_oes: egl_ffi::EglImageTargetTexture2DOesProc,
}

impl DmabufImage {
    /// Import a frame whose planes live in separate (or shared) DMA-BUFs,
    /// one [`DmabufPlane`] per plane. This is the shape GBM exports.
    pub fn from_planes(
        egl_display: &EglDisplay,
        width: u32,
        height: u32,
        fourcc: DrmFourcc,
        modifier: Option<DrmModifier>,
        planes: &[DmabufPlane],
    ) -> Result<Self> {
        let attrs = image_attrs(width, height, fourcc, modifier, planes)?;

        let egl_image = unsafe {
            egl_ffi::eglCreateImage(
                egl_display.as_raw(),
                egl_ffi::EGL_NO_CONTEXT,
                egl_ffi::EGL_LINUX_DMA_BUF_EXT,
                egl_ffi::EGLClientBuffer(std::ptr::null_mut()),
                attrs.as_ptr(),
            )
        };
        if egl_image == egl_ffi::EGL_NO_IMAGE {
            return Err(Error::last_egl());
        }

        Ok(Self {
            egl_display: egl_display.as_raw(),
            egl_image,
            fourcc,
            width,
            height,
            egl_image_target_renderbuffer_storage_oes: egl_display
                .egl_image_target_renderbuffer_storage_oes,
            egl_image_target_texture_2d_oes: egl_display.egl_image_target_texture_2d_oes,
        })
    }

    /// Import a frame packed into a single DMA-BUF, planes laid out as
    /// described in [`format::packed_layout`]. `stride` is the byte pitch of
    /// the luma (or only) plane.
    pub fn from_packed(
        egl_display: &EglDisplay,
        fd: BorrowedFd,
        width: u32,
        height: u32,
        stride: u32,
        fourcc: DrmFourcc,
    ) -> Result<Self> {
        let layout = format::packed_layout(fourcc, stride, height)?;
        let planes: Vec<DmabufPlane> = layout
            .iter()
            .map(|plane| DmabufPlane {
                fd,
                offset: plane.offset,
                pitch: plane.pitch,
            })
            .collect();
        Self::from_planes(egl_display, width, height, fourcc, None, &planes)
    }

    /// Get this image's fourcc format
    pub fn fourcc(&self) -> DrmFourcc {
        self.fourcc
    }

    /// Get this image's width
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Get this image's height
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Associate this image with a currently bound GL renderbuffer object.
    ///
    /// This allows to render directly to the underlying DMA-BUF.
    ///
    /// # Safety
    ///
    /// This function must be called from an OpenGL(-ES) context with support for
    /// [`GL_OES_EGL_image`][1] extension and a bound `GL_RENDERBUFFER`. Note that
    /// [`EglDisplay`](crate::EglDisplay) does not guarantee the presence of this extension.
    ///
    /// [1]: https://registry.khronos.org/OpenGL/extensions/OES/OES_EGL_image.txt
    pub unsafe fn set_as_gl_renderbuffer_storage(&self) {
        const GL_RENDERBUFFER: egl_ffi::EGLenum = 0x8D41;
        unsafe {
            (self.egl_image_target_renderbuffer_storage_oes)(GL_RENDERBUFFER, self.egl_image);
        }
    }

    /// Associate this image with the texture currently bound to `target`,
    /// usually `GL_TEXTURE_EXTERNAL_OES`.
    ///
    /// # Safety
    ///
    /// Same requirements as [`set_as_gl_renderbuffer_storage`](Self::set_as_gl_renderbuffer_storage),
    /// with a texture bound to `target` instead of a renderbuffer.
    pub unsafe fn set_as_gl_texture(&self, target: u32) {
        unsafe {
            (self.egl_image_target_texture_2d_oes)(target, self.egl_image);
        }
    }
}

impl Drop for DmabufImage {
    fn drop(&mut self) {
        // SAFETY: EGLImage will not be used to create any new targets. Destroying an image does not
        // affect its "siblings", in our case the renderbuffer or texture. We ignore the result,
        // since there is not much we can do in case of an error.
        unsafe { egl_ffi::eglDestroyImage(self.egl_display, self.egl_image) };
    }
}

/// Build the `eglCreateImage` attribute list for a DMA-BUF import. YUV
/// formats get BT.601 limited-range sampling hints and the preserved flag;
/// modifier keys are emitted only when an explicit modifier is given.
fn image_attrs(
    width: u32,
    height: u32,
    fourcc: DrmFourcc,
    modifier: Option<DrmModifier>,
    planes: &[DmabufPlane],
) -> Result<Vec<egl_ffi::EGLAttrib>> {
    if width == 0 || height == 0 {
        return Err(Error::ZeroImageSize);
    }

    let mut attrs = Vec::with_capacity(13 + 10 * planes.len());
    attrs.push(egl_ffi::EGL_WIDTH as _);
    attrs.push(width as _);
    attrs.push(egl_ffi::EGL_HEIGHT as _);
    attrs.push(height as _);
    attrs.push(egl_ffi::EGL_LINUX_DRM_FOURCC_EXT as _);
    attrs.push(fourcc as u32 as _);
    for (i, plane) in planes.iter().enumerate() {
        attrs.push(egl_ffi::EGL_DMA_BUF_PLANE_FD_EXT[i] as _);
        attrs.push(plane.fd.as_raw_fd() as _);
        attrs.push(egl_ffi::EGL_DMA_BUF_PLANE_OFFSET_EXT[i] as _);
        attrs.push(plane.offset as _);
        attrs.push(egl_ffi::EGL_DMA_BUF_PLANE_PITCH_EXT[i] as _);
        attrs.push(plane.pitch as _);
        if let Some(modifier) = modifier {
            let modifier = u64::from(modifier);
            attrs.push(egl_ffi::EGL_DMA_BUF_PLANE_MODIFIER_LO_EXT[i] as _);
            attrs.push((modifier & 0xFFFF_FFFF) as _);
            attrs.push(egl_ffi::EGL_DMA_BUF_PLANE_MODIFIER_HI_EXT[i] as _);
            attrs.push((modifier >> 32) as _);
        }
    }
    if format::plane_layout(fourcc).is_some() {
        // YUV sampling hints: BT.601 limited range, and keep the frame
        // contents across target binds.
        attrs.push(egl_ffi::EGL_YUV_COLOR_SPACE_HINT_EXT as _);
        attrs.push(egl_ffi::EGL_ITU_REC601_EXT as _);
        attrs.push(egl_ffi::EGL_SAMPLE_RANGE_HINT_EXT as _);
        attrs.push(egl_ffi::EGL_YUV_NARROW_RANGE_EXT as _);
        attrs.push(egl_ffi::EGL_IMAGE_PRESERVED_KHR as _);
        attrs.push(egl_ffi::EGL_TRUE as _);
    }
    attrs.push(egl_ffi::EGL_NONE as _);

    Ok(attrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::BorrowedFd;

    fn plane(fd: i32, offset: u32, pitch: u32) -> DmabufPlane<'static> {
        DmabufPlane {
            fd: unsafe { BorrowedFd::borrow_raw(fd) },
            offset,
            pitch,
        }
    }

    fn attr(attrs: &[egl_ffi::EGLAttrib], key: egl_ffi::EGLint) -> Option<egl_ffi::EGLAttrib> {
        attrs
            .chunks_exact(2)
            .take_while(|pair| pair[0] != egl_ffi::EGL_NONE as egl_ffi::EGLAttrib)
            .find(|pair| pair[0] == key as egl_ffi::EGLAttrib)
            .map(|pair| pair[1])
    }

    #[test]
    fn packed_nv12_attrs_share_fd_and_carry_yuv_hints() {
        let layout = format::packed_layout(DrmFourcc::Nv12, 1920, 1080).unwrap();
        let planes = [
            plane(5, layout[0].offset, layout[0].pitch),
            plane(5, layout[1].offset, layout[1].pitch),
        ];
        let attrs = image_attrs(1920, 1080, DrmFourcc::Nv12, None, &planes).unwrap();

        assert_eq!(attr(&attrs, egl_ffi::EGL_WIDTH), Some(1920));
        assert_eq!(
            attr(&attrs, egl_ffi::EGL_LINUX_DRM_FOURCC_EXT),
            Some(DrmFourcc::Nv12 as u32 as _),
        );
        assert_eq!(attr(&attrs, egl_ffi::EGL_DMA_BUF_PLANE0_FD_EXT), Some(5));
        assert_eq!(attr(&attrs, egl_ffi::EGL_DMA_BUF_PLANE1_FD_EXT), Some(5));
        assert_eq!(attr(&attrs, egl_ffi::EGL_DMA_BUF_PLANE0_OFFSET_EXT), Some(0));
        assert_eq!(
            attr(&attrs, egl_ffi::EGL_DMA_BUF_PLANE1_OFFSET_EXT),
            Some(1920 * 1088),
        );
        // Interleaved chroma keeps the luma pitch.
        assert_eq!(attr(&attrs, egl_ffi::EGL_DMA_BUF_PLANE0_PITCH_EXT), Some(1920));
        assert_eq!(attr(&attrs, egl_ffi::EGL_DMA_BUF_PLANE1_PITCH_EXT), Some(1920));

        // Implicit layout: no modifier keys at all.
        assert_eq!(attr(&attrs, egl_ffi::EGL_DMA_BUF_PLANE0_MODIFIER_LO_EXT), None);
        assert_eq!(attr(&attrs, egl_ffi::EGL_DMA_BUF_PLANE0_MODIFIER_HI_EXT), None);

        assert_eq!(
            attr(&attrs, egl_ffi::EGL_YUV_COLOR_SPACE_HINT_EXT),
            Some(egl_ffi::EGL_ITU_REC601_EXT as _),
        );
        assert_eq!(
            attr(&attrs, egl_ffi::EGL_SAMPLE_RANGE_HINT_EXT),
            Some(egl_ffi::EGL_YUV_NARROW_RANGE_EXT as _),
        );
        assert_eq!(
            attr(&attrs, egl_ffi::EGL_IMAGE_PRESERVED_KHR),
            Some(egl_ffi::EGL_TRUE as _),
        );

        assert_eq!(attrs.last(), Some(&(egl_ffi::EGL_NONE as egl_ffi::EGLAttrib)));
    }

    #[test]
    fn rgb_attrs_carry_explicit_modifier_and_no_hints() {
        let planes = [plane(7, 0, 2560)];
        let attrs = image_attrs(
            640,
            480,
            DrmFourcc::Abgr8888,
            Some(DrmModifier::Linear),
            &planes,
        )
        .unwrap();

        assert_eq!(attr(&attrs, egl_ffi::EGL_DMA_BUF_PLANE0_FD_EXT), Some(7));
        assert_eq!(attr(&attrs, egl_ffi::EGL_DMA_BUF_PLANE0_PITCH_EXT), Some(2560));
        assert_eq!(attr(&attrs, egl_ffi::EGL_DMA_BUF_PLANE0_MODIFIER_LO_EXT), Some(0));
        assert_eq!(attr(&attrs, egl_ffi::EGL_DMA_BUF_PLANE0_MODIFIER_HI_EXT), Some(0));

        assert_eq!(attr(&attrs, egl_ffi::EGL_YUV_COLOR_SPACE_HINT_EXT), None);
        assert_eq!(attr(&attrs, egl_ffi::EGL_SAMPLE_RANGE_HINT_EXT), None);
        assert_eq!(attr(&attrs, egl_ffi::EGL_IMAGE_PRESERVED_KHR), None);
    }

    #[test]
    fn zero_sized_imports_are_rejected() {
        let planes = [plane(3, 0, 64)];
        assert!(matches!(
            image_attrs(0, 480, DrmFourcc::Abgr8888, None, &planes),
            Err(Error::ZeroImageSize)
        ));
        assert!(matches!(
            image_attrs(640, 0, DrmFourcc::Nv12, None, &planes),
            Err(Error::ZeroImageSize)
        ));
    }
}
