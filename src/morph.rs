// src/morph.rs
//! Per-frame driver for the particle morph: advances every simulation state,
//! samples the transition, and keeps the renderer's model bindings in step.

use image::RgbaImage;

use crate::config::MorphConfig;
use crate::error::MorphError;
use crate::models::Dimensions;
use crate::normalizer::NormalizedModels;
use crate::particles::ParticleRenderer;
use crate::simulation::SimulationRegistry;
use crate::transition::{TransitionController, TransitionStatus};

/// Which models the renderer blends this frame, and how far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameBinding {
    pub source: usize,
    pub target: usize,
    pub progress: f32,
}

impl FrameBinding {
    /// Both slots on one model at progress 0.
    pub fn settled(model: usize) -> Self {
        Self {
            source: model,
            target: model,
            progress: 0.0,
        }
    }
}

/// Everything the GPU side needs to record one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramePlan {
    /// Seconds since the previous frame; 0 on the first frame and when time stalls.
    pub delta_time: f32,
    pub status: TransitionStatus,
    pub binding: FrameBinding,
}

/// Frame timing and transition bookkeeping, without any GPU resources.
#[derive(Debug)]
pub struct FrameClock {
    controller: TransitionController,
    last_time: Option<f32>,
}

impl FrameClock {
    pub fn new(controller: TransitionController) -> Self {
        Self {
            controller,
            last_time: None,
        }
    }

    pub fn controller(&self) -> &TransitionController {
        &self.controller
    }

    pub fn select_model(&mut self, index: usize) -> Result<(), MorphError> {
        self.controller.request_transition(index)
    }

    pub fn begin_frame(&mut self, time: f32) -> FramePlan {
        let delta_time = self.last_time.map_or(0.0, |last| (time - last).max(0.0));
        self.last_time = Some(self.last_time.map_or(time, |last| last.max(time)));

        let status = self.controller.tick(time);
        let binding = match status {
            TransitionStatus::Idle => FrameBinding::settled(self.controller.active()),
            TransitionStatus::Running { progress } => {
                let active = self.controller.active();
                FrameBinding {
                    source: active,
                    target: self.controller.target().unwrap_or(active),
                    progress,
                }
            }
            TransitionStatus::Finished { source, target } => FrameBinding {
                source,
                target,
                progress: 1.0,
            },
        };

        FramePlan {
            delta_time,
            status,
            binding,
        }
    }

    /// Commits a finished transition once its last frame has been drawn and
    /// returns the binding for the frames that follow.
    pub fn end_frame(&mut self, status: TransitionStatus) -> Option<FrameBinding> {
        match status {
            TransitionStatus::Finished { .. } => self.controller.commit().map(FrameBinding::settled),
            _ => None,
        }
    }
}

pub struct MorphField {
    registry: SimulationRegistry,
    clock: FrameClock,
    renderer: ParticleRenderer,
}

impl MorphField {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        camera_buffer: &wgpu::Buffer,
        normalized: &NormalizedModels,
        appearances: &[RgbaImage],
        dimensions: Dimensions,
        config: &MorphConfig,
    ) -> Result<Self, MorphError> {
        let registry = SimulationRegistry::new(device, queue, &normalized.buffers, normalized.side);
        let renderer = ParticleRenderer::new(
            device,
            queue,
            surface_format,
            camera_buffer,
            normalized,
            &registry,
            appearances,
            dimensions,
            config.particle_size,
        )?;
        let controller = TransitionController::new(registry.len(), config.transition_duration, config.easing);

        Ok(Self {
            registry,
            clock: FrameClock::new(controller),
            renderer,
        })
    }

    /// Entry point for UI triggers.
    pub fn select_model(&mut self, index: usize) -> Result<(), MorphError> {
        self.clock.select_model(index)
    }

    pub fn resize(&mut self, queue: &wgpu::Queue, dimensions: Dimensions) {
        self.renderer.resize(queue, dimensions);
    }

    pub fn active_model(&self) -> usize {
        self.clock.controller().active()
    }

    pub fn model_count(&self) -> usize {
        self.registry.len()
    }

    /// Records the simulation passes for `time` and binds the models to draw.
    /// The returned status must be handed back to [`MorphField::finish_frame`]
    /// after the frame is submitted.
    pub fn prepare_frame(
        &mut self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        time: f32,
    ) -> Result<TransitionStatus, MorphError> {
        let plan = self.clock.begin_frame(time);
        self.registry.advance_all(queue, encoder, plan.delta_time);
        self.apply(queue, plan.binding)?;
        Ok(plan.status)
    }

    pub fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        self.renderer.draw(render_pass);
    }

    /// Commits a finished transition once its last frame has been drawn.
    pub fn finish_frame(&mut self, queue: &wgpu::Queue, status: TransitionStatus) -> Result<(), MorphError> {
        match self.clock.end_frame(status) {
            Some(binding) => self.apply(queue, binding),
            None => Ok(()),
        }
    }

    fn apply(&mut self, queue: &wgpu::Queue, binding: FrameBinding) -> Result<(), MorphError> {
        self.renderer.bind_models(binding.source, binding.target)?;
        self.renderer.set_progress(queue, binding.progress);
        Ok(())
    }
}
