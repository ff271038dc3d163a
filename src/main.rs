//! fft-ocean - renders the GPU FFT ocean headlessly to PNG frames.

use clap::Parser;
use rustfft::num_complex::Complex32;

use fft_ocean::camera::{CameraSystem, ViewParams};
use fft_ocean::cli::Args;
use fft_ocean::demo::{phillips_distribution, PhillipsParams};
use fft_ocean::frame::{Drawable, FrameContext, FrameTick, ResourceProvider};
use fft_ocean::graph::{ResourceLookup, TransientPool, HEIGHT_FFT_INPUT, OCEAN_LOD_COUNTER};
use fft_ocean::ocean::cull::IndirectSlot;
use fft_ocean::ocean::fft::inverse_fft_2d_reference;
use fft_ocean::ocean::spectrum::{modulate_reference, SpectrumKind};
use fft_ocean::ocean::OceanSystem;
use fft_ocean::params::MAX_LOD_INDIRECT;
use fft_ocean::rendering::{clear_color, read_pod, GpuContext, OffscreenTarget, COLOR_FORMAT};
use fft_ocean::Result;

/// Simulation time of the verification frame (seconds)
const VERIFY_TIME_S: f64 = 1.7;

fn main() {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<bool> {
    let ctx = pollster::block_on(GpuContext::new_headless())?;
    let render_config = args.render_config();

    let mut ocean = OceanSystem::new(&ctx.device, args.ocean_config(), COLOR_FORMAT)?;
    let height_distribution = upload_demo_spectra(&ctx, &ocean, &args.phillips_params())?;

    let mut pool = TransientPool::new();
    pool.realize(&ctx.device, &ocean.declare_resources())?;

    if args.verify {
        return verify(&ctx, &mut ocean, &pool, &height_distribution);
    }

    let camera = CameraSystem::new(args.camera_preset());
    let target = OffscreenTarget::new(&ctx.device, &render_config)?;
    let recording = args.recording_config();
    std::fs::create_dir_all(&recording.output_dir)?;

    for frame in 0..recording.frames {
        let time_s = frame as f32 * recording.frame_dt_s;
        ocean.on_frame_tick(time_s as f64);
        ocean.refresh(&camera.view_params(time_s, &render_config));

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });
        let frame_ctx = FrameContext {
            device: &ctx.device,
            queue: &ctx.queue,
        };
        ocean.record_passes(&frame_ctx, &mut encoder, &pool)?;
        {
            let mut pass = target.begin_pass(&mut encoder, clear_color(render_config.sky_color));
            ocean.draw(&mut pass, &pool)?;
        }
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let path = recording.frame_path(frame);
        target.capture_png(&ctx, &path)?;
        log::info!("Frame {}/{} -> {}", frame + 1, recording.frames, path);
    }

    Ok(true)
}

/// Fill the three distributions; returns the height distribution.
fn upload_demo_spectra(
    ctx: &GpuContext,
    ocean: &OceanSystem,
    params: &PhillipsParams,
) -> Result<Vec<[f32; 2]>> {
    let config = ocean.config();
    let mut height = Vec::new();
    for kind in SpectrumKind::ALL {
        let size = kind.patch_size(config);
        let kind_params = PhillipsParams {
            rms_height_m: params.rms_height_m * size[0] / config.grid.size_m[0],
            ..params.clone()
        };
        let distribution = phillips_distribution(kind.fft_size(config), size, &kind_params);
        ocean.spectrum().upload(&ctx.queue, kind, &distribution)?;
        if kind == SpectrumKind::Height {
            height = distribution;
        }
    }
    Ok(height)
}

/// Run one unculled frame and compare it with the CPU reference kernels.
fn verify(
    ctx: &GpuContext,
    ocean: &mut OceanSystem,
    pool: &TransientPool,
    height_distribution: &[[f32; 2]],
) -> Result<bool> {
    ocean.on_frame_tick(VERIFY_TIME_S);
    ocean.refresh(&ViewParams::unculled(glam::Vec3::new(0.0, 25.0, 0.0)));

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Verify Encoder"),
        });
    let frame_ctx = FrameContext {
        device: &ctx.device,
        queue: &ctx.queue,
    };
    ocean.record_passes(&frame_ctx, &mut encoder, pool)?;
    ctx.queue.submit(std::iter::once(encoder.finish()));

    let config = ocean.config();
    let n = config.fft.height as usize;

    // After an even number of passes the spatial field sits in the input buffer
    let input = pool.buffer(HEIGHT_FFT_INPUT)?;
    let gpu: Vec<[f32; 2]> = read_pod(ctx, &input.buffer, n * n)?;

    let distribution: Vec<Complex32> = height_distribution
        .iter()
        .map(|c| Complex32::new(c[0], c[1]))
        .collect();
    let spectrum = modulate_reference(
        &distribution,
        n,
        SpectrumKind::Height.modulus(config),
        VERIFY_TIME_S as f32,
        SpectrumKind::Height,
    );
    let cpu = inverse_fft_2d_reference(&spectrum, n);

    let peak = cpu.iter().map(|c| c.norm()).fold(0.0f32, f32::max).max(1e-6);
    let max_error = gpu
        .iter()
        .zip(&cpu)
        .map(|(g, c)| (Complex32::new(g[0], g[1]) - *c).norm())
        .fold(0.0f32, f32::max);
    let relative = max_error / peak;
    log::info!(
        "Height FFT: max error {:.3e} (peak {:.3}, relative {:.3e})",
        max_error,
        peak,
        relative
    );

    let counter = pool.buffer(OCEAN_LOD_COUNTER)?;
    let slots: Vec<IndirectSlot> = read_pod(ctx, &counter.buffer, MAX_LOD_INDIRECT as usize)?;
    let visible: u32 = slots.iter().map(|s| s.instance_count).sum();
    let cells = config.grid.cell_count();
    log::info!("Culling: {} of {} cells visible with an unculled view", visible, cells);

    let ok = relative < 1e-3 && visible == cells;
    if ok {
        println!("verify: OK");
    } else {
        println!("verify: FAILED");
    }
    Ok(ok)
}
