use std::io;

use drm_fourcc::DrmFourcc;
use thiserror::Error;

use crate::egl_ffi;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("EGL 1.5 is required, but {0}.{1} is available")]
    OldEgl(u32, u32),
    #[error(transparent)]
    Egl(#[from] EglError),
    #[error("extension {0} is not supported")]
    ExtensionUnsupported(&'static str),
    #[error("could not allocate GBM buffer")]
    BadGbmAlloc,
    #[error("no plane layout is known for {0:?}")]
    UnsupportedFormat(DrmFourcc),
    #[error("image dimensions must be non-zero")]
    ZeroImageSize,
    #[error("no usable DRM device found in /dev/dri")]
    NoDrmDevice,
    #[error("no connected display output")]
    NoOutput,
    #[error("EglContext::release called for not current context")]
    NotCurrentContext,
    #[error("could not load GL functions: {0}")]
    GlLoad(String),
    #[error("shader failed to compile: {0}")]
    ShaderCompile(String),
    #[error("shader program failed to link: {0}")]
    ProgramLink(String),
    #[error("shader attribute {0} is missing")]
    MissingAttribute(&'static str),
    #[error("framebuffer incomplete: 0x{0:04x}")]
    IncompleteFramebuffer(u32),
    #[error("GL error 0x{0:04x}")]
    Gl(u32),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub fn last_egl() -> Self {
        Self::Egl(EglError::last())
    }
}

#[derive(Debug, Error)]
pub enum EglError {
    #[error("The last function succeeded without error.")]
    Success,
    #[error("EGL is not initialized, or could not be initialized, for the specified EGL display connection.")]
    NotInitialized,
    #[error("EGL cannot access a requested resource (for example a context is bound in another thread).")]
    BadAccess,
    #[error("EGL failed to allocate resources for the requested operation.")]
    BadAlloc,
    #[error("An unrecognized attribute or attribute value was passed in the attribute list.")]
    BadAttribute,
    #[error("An EGLContext argument does not name a valid EGL rendering context.")]
    BadContext,
    #[error("An EGLConfig argument does not name a valid EGL frame buffer configuration.")]
    BadConfig,
    #[error("The current surface of the calling thread is a window, pixel buffer or pixmap that is no longer valid.")]
    BadCurrentSurface,
    #[error("An EGLDisplay argument does not name a valid EGL display connection.")]
    BadDisplay,
    #[error("An EGLSurface argument does not name a valid surface configured for GL rendering.")]
    BadSurface,
    #[error("Arguments are inconsistent (for example, a valid context requires buffers not supplied by a valid surface).")]
    BadMatch,
    #[error("One or more argument values are invalid.")]
    BadParameter,
    #[error("A NativePixmapType argument does not refer to a valid native pixmap.")]
    BadNativePixmap,
    #[error("A NativeWindowType argument does not refer to a valid native window.")]
    BadNativeWindow,
    #[error("A power management event has occurred. The application must destroy all contexts and reinitialise OpenGL ES state and objects to continue rendering.")]
    ContextLost,
    #[error("Unknown EGL error.")]
    Unknown,
}

impl EglError {
    pub fn last() -> Self {
        match unsafe { egl_ffi::eglGetError() } {
            egl_ffi::EGL_SUCCESS => Self::Success,
            egl_ffi::EGL_NOT_INITIALIZED => Self::NotInitialized,
            egl_ffi::EGL_BAD_ACCESS => Self::BadAccess,
            egl_ffi::EGL_BAD_ALLOC => Self::BadAlloc,
            egl_ffi::EGL_BAD_ATTRIBUTE => Self::BadAttribute,
            egl_ffi::EGL_BAD_CONTEXT => Self::BadContext,
            egl_ffi::EGL_BAD_CONFIG => Self::BadConfig,
            egl_ffi::EGL_BAD_CURRENT_SURFACE => Self::BadCurrentSurface,
            egl_ffi::EGL_BAD_DISPLAY => Self::BadDisplay,
            egl_ffi::EGL_BAD_SURFACE => Self::BadSurface,
            egl_ffi::EGL_BAD_MATCH => Self::BadMatch,
            egl_ffi::EGL_BAD_PARAMETER => Self::BadParameter,
            egl_ffi::EGL_BAD_NATIVE_PIXMAP => Self::BadNativePixmap,
            egl_ffi::EGL_BAD_NATIVE_WINDOW => Self::BadNativeWindow,
            egl_ffi::EGL_CONTEXT_LOST => Self::ContextLost,
            _ => Self::Unknown,
        }
    }
}
