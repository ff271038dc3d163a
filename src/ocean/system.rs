//! The ocean as a frame participant: ties the LOD grid, culler, spectral
//! synthesizer, mip generation and renderer to the host's frame graph.

use glam::Vec3;

use super::cull::{tile_buffer_size, LodCuller, COUNTER_BUFFER_SIZE};
use super::grid::{GridPlacement, LodController, LOD_FORMAT};
use super::mesh::LodMeshTable;
use super::mipmap::{MipChain, MipGenerator};
use super::render::{OceanRenderer, OceanUniforms};
use super::spectrum::{complex_buffer_size, SpectrumKind, SpectrumStore};
use super::synth::{
    SpectralSynthesizer, SynthTargets, BAKED_FORMAT, DISPLACEMENT_FORMAT, HEIGHT_FORMAT,
    NORMAL_FORMAT,
};
use crate::camera::ViewParams;
use crate::error::{OceanError, Result};
use crate::frame::{Drawable, FrameContext, FrameTick, ResourceProvider};
use crate::gpu;
use crate::graph::*;
use crate::params::OceanConfig;

/// Every resource access of the three ocean passes
pub fn ocean_resources(config: &OceanConfig) -> Vec<ResourceDecl> {
    let grid = &config.grid;
    let fft = &config.fft;
    let mut decls = Vec::new();

    let mut add = |name, pass, queue, desc, access, stage, imported| {
        decls.push(ResourceDecl {
            name,
            pass,
            queue,
            desc,
            access,
            stage,
            imported,
        })
    };
    let texture = |size: u32, format, mip_levels| ResourceDesc::Texture {
        width: size,
        height: size,
        format,
        mip_levels,
    };

    let lods = ResourceDesc::Texture {
        width: grid.grid_width,
        height: grid.grid_height,
        format: LOD_FORMAT,
        mip_levels: 1,
    };
    let counter = ResourceDesc::Buffer {
        size: COUNTER_BUFFER_SIZE,
    };
    let tiles = ResourceDesc::Buffer {
        size: tile_buffer_size(grid.cell_count()),
    };

    // LOD classification and culling
    add(OCEAN_LODS, PASS_UPDATE_LODS, PassQueue::Compute, lods, Access::Write, AccessStage::Compute, false);
    add(OCEAN_LODS, PASS_UPDATE_LODS, PassQueue::Compute, lods, Access::Read, AccessStage::Compute, false);
    add(OCEAN_LOD_COUNTER, PASS_UPDATE_LODS, PassQueue::Compute, counter, Access::Write, AccessStage::Compute, false);
    add(OCEAN_LOD_DATA, PASS_UPDATE_LODS, PassQueue::Compute, tiles, Access::Write, AccessStage::Compute, false);

    // Spectral synthesis
    for kind in SpectrumKind::ALL {
        let n = kind.fft_size(config);
        let buffer = ResourceDesc::Buffer {
            size: complex_buffer_size(n),
        };
        let input = match kind {
            SpectrumKind::Height => HEIGHT_FFT_INPUT,
            SpectrumKind::Displacement => DISPLACEMENT_FFT_INPUT,
            SpectrumKind::Normal => NORMAL_FFT_INPUT,
        };
        add(kind.distribution_name(), PASS_UPDATE_FFT, PassQueue::Compute, buffer, Access::Read, AccessStage::Compute, true);
        add(input, PASS_UPDATE_FFT, PassQueue::Compute, buffer, Access::Write, AccessStage::Compute, false);
    }

    let height_out = texture(fft.height, HEIGHT_FORMAT, 1);
    let displacement_out = texture(fft.displacement, DISPLACEMENT_FORMAT, 1);
    let normal_out = texture(fft.normal, NORMAL_FORMAT, config.normal_mip_levels());
    let baked = texture(fft.height, BAKED_FORMAT, config.vertex_mip_levels());

    for (name, desc) in [
        (HEIGHT_FFT_OUTPUT, height_out),
        (DISPLACEMENT_FFT_OUTPUT, displacement_out),
        (NORMAL_FFT_OUTPUT, normal_out),
        (HEIGHT_DISPLACEMENT_OUTPUT, baked),
        (GRADIENT_JACOBIAN_OUTPUT, baked),
    ] {
        add(name, PASS_UPDATE_FFT, PassQueue::Compute, desc, Access::Write, AccessStage::Compute, false);
        add(name, PASS_UPDATE_FFT, PassQueue::Compute, desc, Access::Read, AccessStage::Compute, false);
    }

    // Drawing
    add(OCEAN_LOD_COUNTER, PASS_RENDER, PassQueue::Graphics, counter, Access::Read, AccessStage::IndirectDraw, false);
    add(OCEAN_LOD_DATA, PASS_RENDER, PassQueue::Graphics, tiles, Access::Read, AccessStage::VertexInput, false);
    add(HEIGHT_DISPLACEMENT_OUTPUT, PASS_RENDER, PassQueue::Graphics, baked, Access::Read, AccessStage::VertexShader, false);
    add(GRADIENT_JACOBIAN_OUTPUT, PASS_RENDER, PassQueue::Graphics, baked, Access::Read, AccessStage::FragmentShader, false);
    add(NORMAL_FFT_OUTPUT, PASS_RENDER, PassQueue::Graphics, normal_out, Access::Read, AccessStage::FragmentShader, false);

    decls
}

/// GPU ocean: adaptive tile grid over an FFT-synthesized surface
pub struct OceanSystem {
    config: OceanConfig,
    meshes: LodMeshTable,
    spectrum: SpectrumStore,
    controller: LodController,
    culler: LodCuller,
    synthesizer: SpectralSynthesizer,
    mipgen: MipGenerator,
    renderer: OceanRenderer,

    vertex_views: MipViewCache,
    fragment_views: MipViewCache,
    normal_views: MipViewCache,

    time_s: f64,
    view: Option<ViewParams>,
    placement: Option<GridPlacement>,
}

impl OceanSystem {
    /// Build every pipeline and the immutable mesh table. `color_format` is
    /// the host's render target format.
    pub fn new(
        device: &wgpu::Device,
        config: OceanConfig,
        color_format: wgpu::TextureFormat,
    ) -> Result<Self> {
        config.validate()?;

        let meshes = LodMeshTable::new(device, config.grid.grid_resolution)?;
        let spectrum = SpectrumStore::new(device, &config)?;
        let controller = LodController::new(device, config.lod_distance_m, meshes.len() as u32)?;
        let culler = LodCuller::new(device, &meshes.index_counts(), config.heightmap_range_m)?;
        let synthesizer = SpectralSynthesizer::new(device, &config)?;
        let mipgen = MipGenerator::new(
            device,
            &[
                (config.fft.height, config.vertex_mip_levels()),
                (config.fft.normal, config.normal_mip_levels()),
            ],
        )?;
        let renderer = OceanRenderer::new(device, &config, color_format)?;

        log::info!(
            "Ocean ready: {}x{} cells over {:?} m, {} LOD tiers, FFT {}/{}/{}",
            config.grid.grid_width,
            config.grid.grid_height,
            config.grid.size_m,
            meshes.len(),
            config.fft.height,
            config.fft.displacement,
            config.fft.normal
        );

        Ok(Self {
            config,
            meshes,
            spectrum,
            controller,
            culler,
            synthesizer,
            mipgen,
            renderer,
            vertex_views: MipViewCache::default(),
            fragment_views: MipViewCache::default(),
            normal_views: MipViewCache::default(),
            time_s: 0.0,
            view: None,
            placement: None,
        })
    }

    pub fn config(&self) -> &OceanConfig {
        &self.config
    }

    /// Distributions an external spectrum generator fills
    pub fn spectrum(&self) -> &SpectrumStore {
        &self.spectrum
    }

    pub fn mesh_table(&self) -> &LodMeshTable {
        &self.meshes
    }

    pub fn time_s(&self) -> f64 {
        self.time_s
    }

    /// Grid placement latched by the last [`Drawable::refresh`]
    pub fn placement(&self) -> Option<&GridPlacement> {
        self.placement.as_ref()
    }

    fn record_frame(
        &mut self,
        ctx: &FrameContext<'_>,
        encoder: &mut wgpu::CommandEncoder,
        lookup: &dyn ResourceLookup,
    ) -> Result<()> {
        let (device, queue) = (ctx.device, ctx.queue);

        let view = match self.view {
            Some(view) => view,
            None => {
                log::warn!("Ocean recorded before refresh; using an unculled view at the origin");
                let view = ViewParams::unculled(Vec3::ZERO);
                self.refresh(&view);
                view
            }
        };
        let placement = GridPlacement::from_camera(view.camera_position, &self.config.grid);

        self.controller
            .record(device, queue, encoder, lookup, view.camera_position, &placement)?;
        self.culler
            .record(device, queue, encoder, lookup, &placement, &view.frustum)?;

        let hd = lookup.texture(HEIGHT_DISPLACEMENT_OUTPUT)?;
        let gj = lookup.texture(GRADIENT_JACOBIAN_OUTPUT)?;
        let normal = lookup.texture(NORMAL_FFT_OUTPUT)?;
        let vertex_levels = self.config.vertex_mip_levels();

        let vertex_views = self.vertex_views.views(hd, vertex_levels);
        let fragment_views = self.fragment_views.views(gj, vertex_levels);
        let normal_views = self.normal_views.views(normal, self.config.normal_mip_levels());

        let (Some(hd0), Some(gj0), Some(normal0)) =
            (vertex_views.first(), fragment_views.first(), normal_views.first())
        else {
            return Err(OceanError::ResourceKind {
                name: HEIGHT_DISPLACEMENT_OUTPUT.to_string(),
                expected: "texture with at least one mip level",
            });
        };

        self.synthesizer.record(
            device,
            queue,
            encoder,
            lookup,
            &self.spectrum,
            self.time_s as f32,
            &SynthTargets {
                normal: normal0,
                height_displacement: hd0,
                gradient_jacobian: gj0,
            },
        )?;

        self.renderer
            .prepare(device, queue, lookup, &OceanUniforms::new(&self.config, &view))?;

        self.mipgen.record(
            device,
            encoder,
            &[
                MipChain {
                    texture: &hd.texture,
                    size: self.config.fft.height,
                    views: vertex_views,
                },
                MipChain {
                    texture: &gj.texture,
                    size: self.config.fft.height,
                    views: fragment_views,
                },
                MipChain {
                    texture: &normal.texture,
                    size: self.config.fft.normal,
                    views: normal_views,
                },
            ],
        );

        log::debug!(
            "Ocean passes recorded at t = {:.3}s, grid center {:?}",
            self.time_s,
            placement.center
        );
        Ok(())
    }
}

impl FrameTick for OceanSystem {
    fn on_frame_tick(&mut self, elapsed_s: f64) {
        self.time_s = elapsed_s;
    }
}

impl ResourceProvider for OceanSystem {
    fn declare_resources(&self) -> Vec<ResourceDecl> {
        ocean_resources(&self.config)
    }

    fn record_passes(
        &mut self,
        ctx: &FrameContext<'_>,
        encoder: &mut wgpu::CommandEncoder,
        lookup: &dyn ResourceLookup,
    ) -> Result<()> {
        // Bind groups are created while recording
        gpu::scoped(ctx.device, || self.record_frame(ctx, encoder, lookup))
    }
}

impl Drawable for OceanSystem {
    fn refresh(&mut self, view: &ViewParams) {
        self.view = Some(*view);
        self.placement = Some(GridPlacement::from_camera(view.camera_position, &self.config.grid));
    }

    fn draw(&self, pass: &mut wgpu::RenderPass<'_>, lookup: &dyn ResourceLookup) -> Result<()> {
        self.renderer.draw(pass, lookup, &self.meshes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn find<'a>(decls: &'a [ResourceDecl], name: &str, pass: &str) -> Vec<&'a ResourceDecl> {
        decls
            .iter()
            .filter(|d| d.name == name && d.pass == pass)
            .collect()
    }

    #[test]
    fn test_declares_all_named_resources() {
        let decls = ocean_resources(&OceanConfig::default());
        let names: HashSet<&str> = decls.iter().map(|d| d.name).collect();
        for name in [
            OCEAN_LODS,
            OCEAN_LOD_COUNTER,
            OCEAN_LOD_DATA,
            HEIGHT_DISTRIBUTION,
            DISPLACEMENT_DISTRIBUTION,
            NORMAL_DISTRIBUTION,
            HEIGHT_FFT_INPUT,
            DISPLACEMENT_FFT_INPUT,
            NORMAL_FFT_INPUT,
            HEIGHT_FFT_OUTPUT,
            DISPLACEMENT_FFT_OUTPUT,
            NORMAL_FFT_OUTPUT,
            HEIGHT_DISPLACEMENT_OUTPUT,
            GRADIENT_JACOBIAN_OUTPUT,
        ] {
            assert!(names.contains(name), "{} not declared", name);
        }
    }

    #[test]
    fn test_buffer_sizes() {
        let config = OceanConfig::default();
        let decls = ocean_resources(&config);

        let counter = find(&decls, OCEAN_LOD_COUNTER, PASS_UPDATE_LODS)[0];
        assert_eq!(counter.desc, ResourceDesc::Buffer { size: 8 * 32 });

        let tiles = find(&decls, OCEAN_LOD_DATA, PASS_UPDATE_LODS)[0];
        assert_eq!(tiles.desc, ResourceDesc::Buffer { size: 32 * 32 * 8 * 32 });

        let input = find(&decls, HEIGHT_FFT_INPUT, PASS_UPDATE_FFT)[0];
        assert_eq!(input.desc, ResourceDesc::Buffer { size: 256 * 256 * 8 });
    }

    #[test]
    fn test_only_distributions_are_imported() {
        let decls = ocean_resources(&OceanConfig::default());
        let imported: HashSet<&str> = decls.iter().filter(|d| d.imported).map(|d| d.name).collect();
        let expected: HashSet<&str> = [HEIGHT_DISTRIBUTION, DISPLACEMENT_DISTRIBUTION, NORMAL_DISTRIBUTION]
            .into_iter()
            .collect();
        assert_eq!(imported, expected);
    }

    #[test]
    fn test_render_pass_reads() {
        let decls = ocean_resources(&OceanConfig::default());
        let counter = find(&decls, OCEAN_LOD_COUNTER, PASS_RENDER);
        assert_eq!(counter.len(), 1);
        assert_eq!(counter[0].stage, AccessStage::IndirectDraw);
        assert_eq!(counter[0].queue, PassQueue::Graphics);

        let tiles = find(&decls, OCEAN_LOD_DATA, PASS_RENDER);
        assert_eq!(tiles[0].stage, AccessStage::VertexInput);
    }

    #[test]
    fn test_baked_maps_carry_vertex_mips() {
        let config = OceanConfig::default();
        let decls = ocean_resources(&config);
        for name in [HEIGHT_DISPLACEMENT_OUTPUT, GRADIENT_JACOBIAN_OUTPUT] {
            for decl in decls.iter().filter(|d| d.name == name) {
                match decl.desc {
                    ResourceDesc::Texture {
                        mip_levels, format, ..
                    } => {
                        assert_eq!(mip_levels, config.vertex_mip_levels());
                        assert_eq!(format, BAKED_FORMAT);
                    }
                    _ => panic!("{} should be a texture", name),
                }
            }
        }
    }
}
