//! Plane layouts for the pixel formats this crate can import.
//!
//! Planar YUV frames are carried in a single allocation with every plane
//! packed after the previous one, each plane starting at a 16-row-aligned
//! boundary of the luma plane. [`packed_layout`] computes the offset and
//! pitch of each plane within such an allocation, and [`dumb_extent`]
//! computes the allocation size to request from the kernel.

use drm_fourcc::DrmFourcc;

use crate::{Error, Result};

pub(crate) const fn align16(v: u32) -> u32 {
    (v + 15) & !15
}

/// Subsampling of one plane relative to the full frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneDesc {
    pub width_div: u32,
    pub height_div: u32,
}

const fn plane(width_div: u32, height_div: u32) -> PlaneDesc {
    PlaneDesc {
        width_div,
        height_div,
    }
}

/// Per-plane subsampling for the supported planar YUV formats. Interleaved
/// chroma (NV12, NV16) counts as one plane of half-width u16 samples, so its
/// byte pitch equals the luma pitch.
pub fn plane_layout(fourcc: DrmFourcc) -> Option<&'static [PlaneDesc]> {
    const NV12: &[PlaneDesc] = &[plane(1, 1), plane(2, 2)];
    const NV16: &[PlaneDesc] = &[plane(1, 1), plane(2, 1)];
    const YUV420: &[PlaneDesc] = &[plane(1, 1), plane(2, 2), plane(2, 2)];
    const YUV422: &[PlaneDesc] = &[plane(1, 1), plane(2, 1), plane(2, 1)];
    const YUV444: &[PlaneDesc] = &[plane(1, 1), plane(1, 1), plane(1, 1)];
    match fourcc {
        DrmFourcc::Nv12 => Some(NV12),
        DrmFourcc::Nv16 => Some(NV16),
        DrmFourcc::Yuv420 => Some(YUV420),
        DrmFourcc::Yuv422 => Some(YUV422),
        DrmFourcc::Yuv444 => Some(YUV444),
        _ => None,
    }
}

/// Position of one plane within a single packed allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedPlane {
    pub offset: u32,
    /// Bytes per row of this plane.
    pub pitch: u32,
}

/// Offsets and pitches of every plane of `fourcc` within one allocation
/// whose luma (or only) plane has `stride` bytes per row and `height` rows.
///
/// Single-plane RGB formats yield one plane at offset 0. For YUV, each
/// chroma plane follows the previous plane's 16-row-aligned extent. NV12 and
/// NV16 interleave Cb and Cr, so their chroma pitch stays at the full
/// stride.
pub fn packed_layout(fourcc: DrmFourcc, stride: u32, height: u32) -> Result<Vec<PackedPlane>> {
    layout(fourcc, stride, align16(height))
}

/// Like [`packed_layout`], but without row alignment between planes. This is
/// the shape of a raw frame file, where each plane immediately follows the
/// previous one.
pub fn tight_layout(fourcc: DrmFourcc, stride: u32, height: u32) -> Result<Vec<PackedPlane>> {
    layout(fourcc, stride, height)
}

fn layout(fourcc: DrmFourcc, stride: u32, plane_height: u32) -> Result<Vec<PackedPlane>> {
    if is_rgb(fourcc) {
        return Ok(vec![PackedPlane {
            offset: 0,
            pitch: stride,
        }]);
    }

    let layout = plane_layout(fourcc).ok_or(Error::UnsupportedFormat(fourcc))?;

    let mut planes = Vec::with_capacity(layout.len());
    let mut offset = 0;
    for desc in layout {
        // NV12/NV16 chroma is u16-interleaved: samples are half-width but
        // double-size, so the byte pitch is the full stride.
        let pitch = if is_interleaved_chroma(fourcc) {
            stride
        } else {
            stride / desc.width_div
        };
        planes.push(PackedPlane { offset, pitch });
        offset += pitch * (plane_height / desc.height_div);
    }

    Ok(planes)
}

/// Bits per pixel and row count to request from the kernel for a dumb
/// buffer holding one `fourcc` frame of `height` rows.
///
/// YUV allocations are requested at 8 bpp with enough extra rows below the
/// 16-row-aligned luma plane to hold the chroma planes.
pub fn dumb_extent(fourcc: DrmFourcc, height: u32) -> Result<(u32, u32)> {
    if is_rgb(fourcc) {
        return Ok((32, height));
    }

    let layout = plane_layout(fourcc).ok_or(Error::UnsupportedFormat(fourcc))?;
    let aligned_height = align16(height);

    let mut rows = 0;
    for desc in layout {
        // Interleaved chroma planes are full-stride (see packed_layout).
        let width_div = if is_interleaved_chroma(fourcc) {
            1
        } else {
            desc.width_div
        };
        // Round up so e.g. a third YUV444 plane never lands short.
        rows += (aligned_height / desc.height_div).div_ceil(width_div);
    }

    Ok((8, rows))
}

pub fn is_rgb(fourcc: DrmFourcc) -> bool {
    matches!(
        fourcc,
        DrmFourcc::Argb8888 | DrmFourcc::Xrgb8888 | DrmFourcc::Abgr8888 | DrmFourcc::Xbgr8888
    )
}

fn is_interleaved_chroma(fourcc: DrmFourcc) -> bool {
    matches!(fourcc, DrmFourcc::Nv12 | DrmFourcc::Nv16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align16_rounds_up() {
        assert_eq!(align16(0), 0);
        assert_eq!(align16(1), 16);
        assert_eq!(align16(16), 16);
        assert_eq!(align16(17), 32);
        assert_eq!(align16(1080), 1088);
    }

    #[test]
    fn rgb_is_single_plane() {
        let planes = packed_layout(DrmFourcc::Argb8888, 7680, 1080).unwrap();
        assert_eq!(
            planes,
            [PackedPlane {
                offset: 0,
                pitch: 7680
            }]
        );
        assert_eq!(dumb_extent(DrmFourcc::Xrgb8888, 1080).unwrap(), (32, 1080));
    }

    #[test]
    fn nv12_chroma_follows_aligned_luma() {
        let planes = packed_layout(DrmFourcc::Nv12, 1920, 1080).unwrap();
        assert_eq!(planes.len(), 2);
        assert_eq!(planes[0], PackedPlane { offset: 0, pitch: 1920 });
        // Chroma starts after 1088 aligned luma rows and keeps the full
        // pitch because Cb and Cr are interleaved.
        assert_eq!(
            planes[1],
            PackedPlane {
                offset: 1920 * 1088,
                pitch: 1920
            }
        );
        assert_eq!(dumb_extent(DrmFourcc::Nv12, 1080).unwrap(), (8, 1088 + 544));
    }

    #[test]
    fn nv16_chroma_is_full_height() {
        let planes = packed_layout(DrmFourcc::Nv16, 1280, 720).unwrap();
        assert_eq!(planes[1].offset, 1280 * 720);
        assert_eq!(planes[1].pitch, 1280);
        assert_eq!(dumb_extent(DrmFourcc::Nv16, 720).unwrap(), (8, 720 * 2));
    }

    #[test]
    fn yuv420_planes_are_quarter_size() {
        let planes = packed_layout(DrmFourcc::Yuv420, 1920, 1080).unwrap();
        assert_eq!(planes.len(), 3);
        assert_eq!(planes[1].pitch, 960);
        assert_eq!(planes[1].offset, 1920 * 1088);
        assert_eq!(planes[2].offset, 1920 * 1088 + 960 * 544);
        assert_eq!(
            dumb_extent(DrmFourcc::Yuv420, 1080).unwrap(),
            (8, 1088 + 272 + 272)
        );
    }

    #[test]
    fn yuv444_planes_are_full_size() {
        let planes = packed_layout(DrmFourcc::Yuv444, 640, 480).unwrap();
        assert_eq!(planes[1].pitch, 640);
        assert_eq!(planes[1].offset, 640 * 480);
        assert_eq!(planes[2].offset, 640 * 480 * 2);
        assert_eq!(dumb_extent(DrmFourcc::Yuv444, 480).unwrap(), (8, 480 * 3));
    }

    #[test]
    fn tight_layout_has_no_alignment_gaps() {
        let planes = tight_layout(DrmFourcc::Yuv420, 1920, 1080).unwrap();
        assert_eq!(planes[1].offset, 1920 * 1080);
        assert_eq!(planes[2].offset, 1920 * 1080 + 960 * 540);
        let nv12 = tight_layout(DrmFourcc::Nv12, 1920, 1080).unwrap();
        assert_eq!(nv12[1].offset, 1920 * 1080);
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(matches!(
            packed_layout(DrmFourcc::Yvu420, 1920, 1080),
            Err(Error::UnsupportedFormat(DrmFourcc::Yvu420))
        ));
        assert!(dumb_extent(DrmFourcc::Rgb565, 600).is_err());
    }
}
