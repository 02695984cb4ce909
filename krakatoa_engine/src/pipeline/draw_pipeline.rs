/// Draw pipelines recorded inside the frame render pass.
///
/// The set is closed: a camera background pass followed by opaque and
/// translucent mesh passes. Each mesh pipeline owns the uniform cache of the
/// objects it draws and sweeps it once per pass.

use std::sync::Arc;

use crate::error::Result;
use crate::gpu::{
    CommandBufferHandle, DescriptorSetHandle, GpuDevice, PipelineBinding, PipelineDesc,
    PipelineKind, Scoped,
};
use crate::resource::{MeshBinding, ObjectId, ObjectUniforms, ResourceCache};
use crate::{engine_debug, engine_error};

const SOURCE: &str = "krakatoa::pipeline";

/// Descriptor set index of the camera plane samplers
pub const CAMERA_SET_INDEX: u32 = 0;

/// Provides SPIR-V by shader name
pub trait ShaderSource {
    fn load(&self, name: &str) -> Result<Vec<u32>>;
}

/// One object to draw this frame
#[derive(Debug, Clone, Copy)]
pub struct DrawRequest {
    pub object: ObjectId,
    /// `Opaque` or `Translucent`; anything else is ignored
    pub kind: PipelineKind,
    pub mesh: MeshBinding,
    pub uniforms: ObjectUniforms,
}

/// Per-frame inputs shared by every pipeline
#[derive(Debug, Clone, Copy)]
pub struct PassInputs<'a> {
    pub draws: &'a [DrawRequest],
    pub camera_set: Option<DescriptorSetHandle>,
}

fn create_pipeline(
    device: &Arc<dyn GpuDevice>,
    shaders: &dyn ShaderSource,
    name: &str,
    kind: PipelineKind,
    vertex: &str,
    fragment: &str,
) -> Result<Scoped<PipelineBinding>> {
    let desc = PipelineDesc {
        name: name.to_string(),
        kind,
        vertex_spirv: shaders.load(vertex)?,
        fragment_spirv: shaders.load(fragment)?,
    };
    let binding = device.create_pipeline(&desc).map_err(|e| {
        engine_error!(SOURCE, "Failed to create pipeline '{}': {}", name, e);
        e
    })?;
    engine_debug!(SOURCE, "Created pipeline '{}'", name);
    Ok(Scoped::new(device, binding))
}

pub struct MeshPipeline {
    cache: ResourceCache,
    binding: Scoped<PipelineBinding>,
    kind: PipelineKind,
}

impl MeshPipeline {
    pub fn new(
        device: &Arc<dyn GpuDevice>,
        shaders: &dyn ShaderSource,
        kind: PipelineKind,
        frames_in_flight: usize,
        grace: u32,
    ) -> Result<Self> {
        let (name, fragment) = match kind {
            PipelineKind::Translucent => ("translucent", "mesh_translucent.frag"),
            _ => ("opaque", "mesh_opaque.frag"),
        };
        let binding = create_pipeline(device, shaders, name, kind, "mesh.vert", fragment)?;
        let cache = ResourceCache::new(Arc::clone(device), frames_in_flight, grace)?;
        Ok(Self { cache, binding, kind })
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    pub fn binding(&self) -> PipelineBinding {
        self.binding.get()
    }

    /// Draw every request of this pipeline's kind, then sweep the cache.
    /// Returns the number of draws recorded.
    pub fn record(&mut self, device: &dyn GpuDevice, cmd: CommandBufferHandle, draws: &[DrawRequest]) -> Result<usize> {
        let binding = self.binding.get();
        let kind = self.kind;
        let mut drawn = 0;
        for request in draws.iter().filter(|r| r.kind == kind) {
            if drawn == 0 {
                device.cmd_bind_pipeline(cmd, binding.pipeline);
            }
            self.cache.draw(cmd, request.object, &request.uniforms, &binding, &request.mesh)?;
            drawn += 1;
        }
        self.cache.sweep();
        Ok(drawn)
    }
}

pub struct CameraBackgroundPipeline {
    binding: Scoped<PipelineBinding>,
}

impl CameraBackgroundPipeline {
    pub fn new(device: &Arc<dyn GpuDevice>, shaders: &dyn ShaderSource) -> Result<Self> {
        let binding = create_pipeline(
            device,
            shaders,
            "camera_background",
            PipelineKind::CameraBackground,
            "camera_background.vert",
            "camera_background.frag",
        )?;
        Ok(Self { binding })
    }

    /// Fullscreen triangle sampling the camera planes. Nothing is drawn
    /// before the first camera image arrives.
    pub fn record(&self, device: &dyn GpuDevice, cmd: CommandBufferHandle, camera_set: Option<DescriptorSetHandle>) -> bool {
        let Some(set) = camera_set else {
            return false;
        };
        let binding = self.binding.get();
        device.cmd_bind_pipeline(cmd, binding.pipeline);
        device.cmd_bind_descriptor_set(cmd, binding.layout, CAMERA_SET_INDEX, set);
        device.cmd_draw(cmd, 3);
        true
    }
}

pub enum DrawPipeline {
    Opaque(MeshPipeline),
    Translucent(MeshPipeline),
    CameraBackground(CameraBackgroundPipeline),
}

impl DrawPipeline {
    /// Background, opaque, translucent: the order they are recorded in
    pub fn create_all(
        device: &Arc<dyn GpuDevice>,
        shaders: &dyn ShaderSource,
        frames_in_flight: usize,
        grace: u32,
    ) -> Result<Vec<DrawPipeline>> {
        Ok(vec![
            DrawPipeline::CameraBackground(CameraBackgroundPipeline::new(device, shaders)?),
            DrawPipeline::Opaque(MeshPipeline::new(device, shaders, PipelineKind::Opaque, frames_in_flight, grace)?),
            DrawPipeline::Translucent(MeshPipeline::new(
                device,
                shaders,
                PipelineKind::Translucent,
                frames_in_flight,
                grace,
            )?),
        ])
    }

    pub fn kind(&self) -> PipelineKind {
        match self {
            DrawPipeline::Opaque(_) => PipelineKind::Opaque,
            DrawPipeline::Translucent(_) => PipelineKind::Translucent,
            DrawPipeline::CameraBackground(_) => PipelineKind::CameraBackground,
        }
    }

    pub fn record(&mut self, device: &dyn GpuDevice, cmd: CommandBufferHandle, inputs: &PassInputs) -> Result<()> {
        match self {
            DrawPipeline::Opaque(mesh) | DrawPipeline::Translucent(mesh) => {
                mesh.record(device, cmd, inputs.draws)?;
            }
            DrawPipeline::CameraBackground(background) => {
                background.record(device, cmd, inputs.camera_set);
            }
        }
        Ok(())
    }

    /// Uniform cache of a mesh pipeline
    pub fn cache(&self) -> Option<&ResourceCache> {
        match self {
            DrawPipeline::Opaque(mesh) | DrawPipeline::Translucent(mesh) => Some(mesh.cache()),
            DrawPipeline::CameraBackground(_) => None,
        }
    }
}

#[cfg(test)]
#[path = "draw_pipeline_tests.rs"]
mod tests;
