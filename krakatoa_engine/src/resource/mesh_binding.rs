/// Vertex and index buffers a draw binds.
///
/// [`MeshBinding`] is the plain handle view the draw path consumes;
/// [`MeshBuffers`] owns the device-local buffers behind it.

use bytemuck::{Pod, Zeroable};

use crate::command::CommandSubmissionManager;
use crate::error::{Error, Result};
use crate::gpu::{AccessFlags, BufferHandle, BufferUsage, PipelineStages, Scoped};

/// Vertex layout read by the mesh pipelines (locations 0, 1 and 2)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl MeshVertex {
    pub const POSITION_OFFSET: u32 = 0;
    pub const NORMAL_OFFSET: u32 = 12;
    pub const UV_OFFSET: u32 = 24;
    pub const STRIDE: u32 = std::mem::size_of::<MeshVertex>() as u32;

    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self { position, normal, uv }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshBinding {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: Option<BufferHandle>,
    pub vertex_count: u32,
    pub index_count: u32,
}

impl MeshBinding {
    pub fn is_indexed(&self) -> bool {
        self.index_buffer.is_some()
    }
}

/// Device-local mesh data, uploaded once through the one-shot path
#[derive(Debug)]
pub struct MeshBuffers {
    vertex: Scoped<BufferHandle>,
    index: Option<Scoped<BufferHandle>>,
    vertex_count: u32,
    index_count: u32,
}

impl MeshBuffers {
    /// Upload `vertices` and optional 32-bit `indices`, blocking until both
    /// are readable by the vertex input stage
    pub fn upload<V: Pod>(
        commands: &CommandSubmissionManager,
        vertices: &[V],
        indices: Option<&[u32]>,
    ) -> Result<Self> {
        if vertices.is_empty() {
            return Err(Error::InvalidResource("mesh with no vertices".to_string()));
        }
        let vertex = commands.create_device_buffer_with_data(
            bytemuck::cast_slice(vertices),
            BufferUsage::VERTEX,
            PipelineStages::VERTEX_INPUT,
            AccessFlags::VERTEX_ATTRIBUTE_READ,
        )?;
        let index = match indices {
            Some(indices) => Some(commands.create_device_buffer_with_data(
                bytemuck::cast_slice(indices),
                BufferUsage::INDEX,
                PipelineStages::VERTEX_INPUT,
                AccessFlags::INDEX_READ,
            )?),
            None => None,
        };
        Ok(Self {
            vertex,
            index,
            vertex_count: vertices.len() as u32,
            index_count: indices.map_or(0, |i| i.len() as u32),
        })
    }

    pub fn binding(&self) -> MeshBinding {
        MeshBinding {
            vertex_buffer: self.vertex.get(),
            index_buffer: self.index.as_ref().map(Scoped::get),
            vertex_count: self.vertex_count,
            index_count: self.index_count,
        }
    }
}
