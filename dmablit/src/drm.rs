use std::ffi::c_void;
use std::fs::{File, OpenOptions};
use std::io;
use std::ops::{Deref, DerefMut};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::path::{Path, PathBuf};

use crate::drm_ffi;
use crate::{Error, Result};

/// An open DRM node.
///
/// Dumb buffer allocation and modesetting require a primary (`cardN`) node;
/// render nodes reject both.
#[derive(Debug)]
pub struct DrmDevice {
    fd: OwnedFd,
    path: PathBuf,
}

impl DrmDevice {
    /// Open a specific DRM node.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self {
            fd: file.into(),
            path: path.to_owned(),
        })
    }

    /// Open the first usable primary node in `/dev/dri`.
    pub fn find_card() -> Result<Self> {
        let mut cards: Vec<PathBuf> = std::fs::read_dir("/dev/dri")?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with("card"))
            })
            .collect();
        cards.sort();

        for path in cards {
            match Self::open(&path) {
                Ok(dev) => {
                    log::debug!("using DRM device {}", path.display());
                    return Ok(dev);
                }
                Err(err) => log::debug!("skipping {}: {err}", path.display()),
            }
        }

        Err(Error::NoDrmDevice)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Duplicate the device fd. The duplicate shares the GEM handle
    /// namespace of the original, unlike a fresh `open()`.
    pub(crate) fn dup_fd(&self) -> io::Result<OwnedFd> {
        self.fd.try_clone()
    }
}

impl AsFd for DrmDevice {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for DrmDevice {
    fn as_raw_fd(&self) -> i32 {
        self.fd.as_raw_fd()
    }
}

/// A CPU-mappable kernel framebuffer allocation.
///
/// For packed planar YUV, allocate with 8 bpp and the row count from
/// [`format::dumb_extent`](crate::format::dumb_extent) (e.g. `3h/2` for
/// NV12), mirroring how such frames are laid out in a single allocation.
#[derive(Debug)]
pub struct DumbBuffer<'a> {
    dev: &'a DrmDevice,
    handle: u32,
    width: u32,
    height: u32,
    pitch: u32,
    size: u64,
}

impl<'a> DumbBuffer<'a> {
    /// Allocate `rows` rows of `width` pixels at `bpp` bits per pixel.
    pub fn create(dev: &'a DrmDevice, width: u32, height: u32, bpp: u32, rows: u32) -> Result<Self> {
        let mut arg = drm_ffi::drm_mode_create_dumb {
            height: rows,
            width,
            bpp,
            ..Default::default()
        };

        if unsafe {
            drm_ffi::drmIoctl(
                dev.as_raw_fd(),
                drm_ffi::DRM_IOCTL_MODE_CREATE_DUMB,
                &mut arg as *mut _ as *mut c_void,
            )
        } != 0
        {
            return Err(io::Error::last_os_error().into());
        }

        Ok(Self {
            dev,
            handle: arg.handle,
            width,
            height,
            pitch: arg.pitch,
            size: arg.size,
        })
    }

    pub fn handle(&self) -> u32 {
        self.handle
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row, as chosen by the kernel.
    pub fn pitch(&self) -> u32 {
        self.pitch
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Map the buffer for CPU access.
    pub fn map(&self) -> Result<DumbMapping> {
        let mut arg = drm_ffi::drm_mode_map_dumb {
            handle: self.handle,
            ..Default::default()
        };

        if unsafe {
            drm_ffi::drmIoctl(
                self.dev.as_raw_fd(),
                drm_ffi::DRM_IOCTL_MODE_MAP_DUMB,
                &mut arg as *mut _ as *mut c_void,
            )
        } != 0
        {
            return Err(io::Error::last_os_error().into());
        }

        let file = File::from(self.dev.dup_fd()?);
        let mmap = unsafe {
            memmap2::MmapOptions::new()
                .offset(arg.offset)
                .len(self.size as usize)
                .map_mut(&file)?
        };

        Ok(DumbMapping { mmap })
    }

    /// Export the buffer as a DMA-BUF fd.
    pub fn export(&self) -> Result<OwnedFd> {
        let mut arg = drm_ffi::drm_prime_handle {
            handle: self.handle,
            flags: drm_ffi::DRM_CLOEXEC | drm_ffi::DRM_RDWR,
            fd: -1,
        };

        if unsafe {
            drm_ffi::drmIoctl(
                self.dev.as_raw_fd(),
                drm_ffi::DRM_IOCTL_PRIME_HANDLE_TO_FD,
                &mut arg as *mut _ as *mut c_void,
            )
        } != 0
        {
            return Err(io::Error::last_os_error().into());
        }

        Ok(unsafe { OwnedFd::from_raw_fd(arg.fd) })
    }
}

impl Drop for DumbBuffer<'_> {
    fn drop(&mut self) {
        let mut arg = drm_ffi::drm_mode_destroy_dumb {
            handle: self.handle,
        };
        // Nothing to do about a failed destroy; exported fds keep the
        // underlying memory alive either way.
        unsafe {
            drm_ffi::drmIoctl(
                self.dev.as_raw_fd(),
                drm_ffi::DRM_IOCTL_MODE_DESTROY_DUMB,
                &mut arg as *mut _ as *mut c_void,
            );
        }
    }
}

/// A writable CPU mapping of a [`DumbBuffer`].
#[derive(Debug)]
pub struct DumbMapping {
    mmap: memmap2::MmapMut,
}

impl Deref for DumbMapping {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.mmap
    }
}

impl DerefMut for DumbMapping {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.mmap
    }
}

fn dmabuf_sync(fd: BorrowedFd<'_>, flags: u64) -> io::Result<()> {
    let mut arg = drm_ffi::dma_buf_sync { flags };
    if unsafe {
        drm_ffi::drmIoctl(
            fd.as_raw_fd(),
            drm_ffi::DMA_BUF_IOCTL_SYNC,
            &mut arg as *mut _ as *mut c_void,
        )
    } != 0
    {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Bracket CPU access to a DMA-BUF: call before reading or writing the
/// mapped memory.
pub fn dmabuf_sync_start(fd: BorrowedFd<'_>) -> io::Result<()> {
    dmabuf_sync(fd, drm_ffi::DMA_BUF_SYNC_RW | drm_ffi::DMA_BUF_SYNC_START)
}

/// Bracket CPU access to a DMA-BUF: call once CPU access is finished.
pub fn dmabuf_sync_end(fd: BorrowedFd<'_>) -> io::Result<()> {
    dmabuf_sync(fd, drm_ffi::DMA_BUF_SYNC_RW | drm_ffi::DMA_BUF_SYNC_END)
}
