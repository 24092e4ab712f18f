use std::fs;
use std::os::fd::AsFd;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use drm_fourcc::DrmFourcc;
use dmablit::{
    dmabuf_sync_end, dmabuf_sync_start, format, gbm, kms, DmabufImage, DmabufPlane, DrmDevice,
    DumbBuffer, EglContextBuilder, EglDisplay, GraphicsApi, QuadRenderer, Rotation,
};

const USAGE: &str = "\
usage: dmablit [options] INPUT OUTPUT WIDTH HEIGHT OUT_WIDTH OUT_HEIGHT [ANGLE] [FORMAT]

Reads a raw frame from INPUT, converts it to RGBA, rotates it by ANGLE
(0, 90, 180 or 270 degrees, default 0) and writes the OUT_WIDTHxOUT_HEIGHT
result to OUTPUT as tightly packed RGBA.

FORMAT is the input pixel format: nv12 (default), nv16, yuv420, yuv422,
yuv444, argb8888, xrgb8888, abgr8888 or xbgr8888. Planar YUV input is
expected as tightly packed planes, one after another.

options:
    --device PATH   DRM device to use instead of the first /dev/dri/card*
    --display       additionally scan the result out on the first connected
                    output for a few seconds
";

struct Args {
    input: PathBuf,
    output: PathBuf,
    width: u32,
    height: u32,
    out_width: u32,
    out_height: u32,
    rotation: Rotation,
    fourcc: DrmFourcc,
    device: Option<PathBuf>,
    display: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{err}");
            eprint!("{USAGE}");
            std::process::exit(1);
        }
    };

    if let Err(err) = run(&args) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn parse_args() -> Result<Args> {
    let mut positional = Vec::new();
    let mut device = None;
    let mut display = false;

    let mut argv = std::env::args().skip(1);
    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--device" => {
                device = Some(PathBuf::from(
                    argv.next().context("--device requires a path")?,
                ));
            }
            "--display" => display = true,
            "-h" | "--help" => {
                print!("{USAGE}");
                std::process::exit(0);
            }
            other if other.starts_with('-') => bail!("unknown option {other}"),
            _ => positional.push(arg),
        }
    }

    if positional.len() < 6 || positional.len() > 8 {
        bail!("expected 6 to 8 arguments, got {}", positional.len());
    }

    let rotation = match positional.get(6) {
        Some(angle) => {
            let degrees: u32 = angle.parse().context("ANGLE must be an integer")?;
            Rotation::from_degrees(degrees)
                .with_context(|| format!("unsupported angle {degrees}"))?
        }
        None => Rotation::Deg0,
    };

    let fourcc = match positional.get(7) {
        Some(name) => parse_fourcc(name)?,
        None => DrmFourcc::Nv12,
    };

    Ok(Args {
        input: PathBuf::from(&positional[0]),
        output: PathBuf::from(&positional[1]),
        width: positional[2].parse().context("WIDTH must be an integer")?,
        height: positional[3].parse().context("HEIGHT must be an integer")?,
        out_width: positional[4]
            .parse()
            .context("OUT_WIDTH must be an integer")?,
        out_height: positional[5]
            .parse()
            .context("OUT_HEIGHT must be an integer")?,
        rotation,
        fourcc,
        device,
        display,
    })
}

fn parse_fourcc(name: &str) -> Result<DrmFourcc> {
    Ok(match name.to_ascii_lowercase().as_str() {
        "nv12" => DrmFourcc::Nv12,
        "nv16" => DrmFourcc::Nv16,
        "yuv420" => DrmFourcc::Yuv420,
        "yuv422" => DrmFourcc::Yuv422,
        "yuv444" => DrmFourcc::Yuv444,
        "argb8888" => DrmFourcc::Argb8888,
        "xrgb8888" => DrmFourcc::Xrgb8888,
        "abgr8888" => DrmFourcc::Abgr8888,
        "xbgr8888" => DrmFourcc::Xbgr8888,
        _ => bail!("unknown format {name}"),
    })
}

fn run(args: &Args) -> Result<()> {
    ensure!(args.width > 0 && args.height > 0, "zero input size");
    ensure!(args.out_width > 0 && args.out_height > 0, "zero output size");

    let dev = match &args.device {
        Some(path) => {
            DrmDevice::open(path).with_context(|| format!("opening {}", path.display()))?
        }
        None => DrmDevice::find_card()?,
    };

    let data = fs::read(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;

    let src = upload_source(&dev, &data, args)?;
    let src_fd = src.export().context("exporting source buffer")?;

    let egl_display = EglDisplay::new(&dev).context("creating EGL display")?;
    let egl_context = EglContextBuilder::new(GraphicsApi::OpenGlEs)
        .version(2, 0)
        .build(&egl_display)
        .context("creating GLES context")?;
    let mut renderer = QuadRenderer::new(&egl_context)?;

    let src_image = DmabufImage::from_packed(
        &egl_display,
        src_fd.as_fd(),
        args.width,
        args.height,
        src.pitch(),
        args.fourcc,
    )
    .context("importing source frame")?;

    let mut dst_flags = gbm::gbm_bo_flags::GBM_BO_USE_RENDERING | gbm::gbm_bo_flags::GBM_BO_USE_LINEAR;
    if args.display {
        dst_flags |= gbm::gbm_bo_flags::GBM_BO_USE_SCANOUT;
    }
    // ABGR8888 scans out and reads back as the same RGBA byte order.
    let dst_fourcc = DrmFourcc::Abgr8888;
    let dst = egl_display
        .gbm_device()
        .alloc(args.out_width, args.out_height, dst_fourcc, &[], dst_flags)
        .context("allocating target buffer")?;

    let dst_parts = dst.export().context("exporting target buffer")?;
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
        args.out_width,
        args.out_height,
        dst_fourcc,
        Some(dst_parts.modifier),
        &dst_planes,
    )
    .context("importing target frame")?;

    renderer.set_target(&dst_image)?;
    renderer.bind_source(&src_image)?;
    renderer.draw(args.out_width, args.out_height, args.rotation)?;

    let pixels = renderer.read_pixels(args.out_width, args.out_height)?;
    fs::write(&args.output, &pixels)
        .with_context(|| format!("writing {}", args.output.display()))?;
    log::info!(
        "wrote {}x{} RGBA frame to {}",
        args.out_width,
        args.out_height,
        args.output.display()
    );

    if args.display {
        let fb = kms::Framebuffer::from_bo(&dev, &dst, dst_fourcc)
            .context("creating scanout framebuffer")?;
        let output = kms::Output::first_connected(&dev)?;
        let (mode_w, mode_h) = output.mode_size();
        if (mode_w, mode_h) != (args.out_width, args.out_height) {
            log::warn!(
                "output mode is {mode_w}x{mode_h}, scanning out a {}x{} buffer",
                args.out_width,
                args.out_height,
            );
        }
        output.set(&dev, &fb).context("setting CRTC")?;
        std::thread::sleep(Duration::from_secs(5));
    }

    Ok(())
}

/// Copy the raw frame into a freshly allocated dumb buffer, plane by plane,
/// translating the file's tight rows to the kernel-chosen pitch.
fn upload_source<'a>(dev: &'a DrmDevice, data: &[u8], args: &Args) -> Result<DumbBuffer<'a>> {
    let (bpp, rows) = format::dumb_extent(args.fourcc, args.height)?;
    let src = DumbBuffer::create(dev, args.width, args.height, bpp, rows)
        .context("allocating source buffer")?;

    let file_stride = args.width * bpp / 8;
    let src_layout = format::tight_layout(args.fourcc, file_stride, args.height)?;
    let dst_layout = format::packed_layout(args.fourcc, src.pitch(), args.height)?;
    // Single full-size plane for RGB.
    let rgb_desc = [format::PlaneDesc {
        width_div: 1,
        height_div: 1,
    }];
    let descs = format::plane_layout(args.fourcc).unwrap_or(&rgb_desc);

    let expected: usize = descs
        .iter()
        .zip(&src_layout)
        .map(|(desc, plane)| (plane.pitch * (args.height / desc.height_div)) as usize)
        .sum();
    ensure!(
        data.len() >= expected,
        "input is {} bytes, expected at least {expected}",
        data.len(),
    );

    let fd = src.export().context("exporting source buffer")?;
    let mut map = src.map().context("mapping source buffer")?;

    dmabuf_sync_start(fd.as_fd())?;
    for ((desc, src_plane), dst_plane) in descs.iter().zip(&src_layout).zip(&dst_layout) {
        let pitch = src_plane.pitch as usize;
        for row in 0..(args.height / desc.height_div) as usize {
            let s = src_plane.offset as usize + row * pitch;
            let d = dst_plane.offset as usize + row * dst_plane.pitch as usize;
            map[d..d + pitch].copy_from_slice(&data[s..s + pitch]);
        }
    }
    dmabuf_sync_end(fd.as_fd())?;
    drop(map);

    Ok(src)
}
