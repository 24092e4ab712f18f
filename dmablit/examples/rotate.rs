//! Generates an NV12 test frame in a dumb buffer, blits it rotated by 90
//! degrees into a GBM buffer and dumps the result as raw RGBA.

use std::io::Write;
use std::os::fd::AsFd;

use drm_fourcc::DrmFourcc;
use dmablit::*;

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

fn main() {
    let dev = DrmDevice::find_card().unwrap();
    let egl_display = EglDisplay::new(&dev).unwrap();
    let egl_context = EglContextBuilder::new(GraphicsApi::OpenGlEs)
        .version(2, 0)
        .build(&egl_display)
        .unwrap();
    let mut renderer = QuadRenderer::new(&egl_context).unwrap();

    // One NV12 frame in a single dumb buffer: a luma gradient over gray.
    let (bpp, rows) = format::dumb_extent(DrmFourcc::Nv12, HEIGHT).unwrap();
    let src = DumbBuffer::create(&dev, WIDTH, HEIGHT, bpp, rows).unwrap();
    {
        let mut map = src.map().unwrap();
        let pitch = src.pitch() as usize;
        let layout = format::packed_layout(DrmFourcc::Nv12, src.pitch(), HEIGHT).unwrap();
        for y in 0..HEIGHT as usize {
            for x in 0..WIDTH as usize {
                map[y * pitch + x] = ((x + y) % 256) as u8;
            }
        }
        let chroma = layout[1].offset as usize;
        for byte in &mut map[chroma..chroma + pitch * (HEIGHT as usize / 2)] {
            *byte = 128;
        }
    }

    let src_fd = src.export().unwrap();
    let src_image = DmabufImage::from_packed(
        &egl_display,
        src_fd.as_fd(),
        WIDTH,
        HEIGHT,
        src.pitch(),
        DrmFourcc::Nv12,
    )
    .unwrap();

    // Rotation by 90 degrees swaps the output dimensions.
    let (out_w, out_h) = (HEIGHT, WIDTH);
    let dst = egl_display
        .gbm_device()
        .alloc(
            out_w,
            out_h,
            DrmFourcc::Abgr8888,
            &[],
            gbm::gbm_bo_flags::GBM_BO_USE_RENDERING | gbm::gbm_bo_flags::GBM_BO_USE_LINEAR,
        )
        .unwrap();
    let dst_parts = dst.export().unwrap();
    let dst_planes: Vec<DmabufPlane> = dst_parts
        .planes
        .iter()
        .map(|p| DmabufPlane {
            fd: p.dmabuf.as_fd(),
            offset: p.offset,
            pitch: p.stride,
        })
        .collect();
    let dst_image = DmabufImage::from_planes(
        &egl_display,
        out_w,
        out_h,
        DrmFourcc::Abgr8888,
        Some(dst_parts.modifier),
        &dst_planes,
    )
    .unwrap();

    renderer.set_target(&dst_image).unwrap();
    renderer.bind_source(&src_image).unwrap();
    renderer.draw(out_w, out_h, Rotation::Deg90).unwrap();

    let pixels = renderer.read_pixels(out_w, out_h).unwrap();
    let mut file = std::fs::File::create("rotate.rgba").unwrap();
    file.write_all(&pixels).unwrap();
    println!("wrote {out_w}x{out_h} RGBA frame to rotate.rgba");
}
