//! Host-facing capabilities of a frame participant.
//!
//! A host drives participants in this order every frame: [`FrameTick`],
//! [`Drawable::refresh`] with the frame's view, [`ResourceProvider::record_passes`]
//! and finally [`Drawable::draw`] inside its render pass.

use crate::camera::ViewParams;
use crate::error::Result;
use crate::graph::{ResourceDecl, ResourceLookup};

/// Device handles available while passes are recorded
#[derive(Clone, Copy)]
pub struct FrameContext<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
}

pub trait FrameTick {
    /// Latch the frame time (seconds since start)
    fn on_frame_tick(&mut self, elapsed_s: f64);
}

pub trait ResourceProvider {
    /// Every resource the participant reads or writes, per pass
    fn declare_resources(&self) -> Vec<ResourceDecl>;

    fn record_passes(
        &mut self,
        ctx: &FrameContext<'_>,
        encoder: &mut wgpu::CommandEncoder,
        lookup: &dyn ResourceLookup,
    ) -> Result<()>;
}

pub trait Drawable {
    /// Latch the view used by this frame's passes
    fn refresh(&mut self, view: &ViewParams);

    fn draw(&self, pass: &mut wgpu::RenderPass<'_>, lookup: &dyn ResourceLookup) -> Result<()>;
}
