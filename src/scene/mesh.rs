// GPU-resident mesh: one vertex buffer, one u32 index buffer

use crate::backend::buffer::GpuBuffer;
use crate::backend::pipeline::Vertex3D;
use crate::backend::{BackendError, VulkanDevice};
use anyhow::Result;
use std::sync::Arc;

pub struct Mesh {
    pub vertices: GpuBuffer,
    pub indices: GpuBuffer,
    pub index_count: u32,
    pub vertex_count: u32,
}

impl Mesh {
    pub fn new(device: Arc<VulkanDevice>, vertices: &[Vertex3D], indices: &[u32]) -> Result<Self> {
        if indices.is_empty() {
            return Err(BackendError::EmptyUpload { what: "mesh indices" }.into());
        }

        let vertex_buffer = GpuBuffer::vertex(device.clone(), vertices)?;
        let index_buffer = GpuBuffer::index(device, indices)?;

        Ok(Self {
            vertices: vertex_buffer,
            indices: index_buffer,
            index_count: indices.len() as u32,
            vertex_count: vertices.len() as u32,
        })
    }
}
