use vela_gfx::error::GfxResult;
use vela_gfx::resources::buffer::{BufferUsage, GfxBuffer};
use vela_render_interface::render_context::RenderContext;

use crate::resources::MaterialHandle;

/// 顶点格式，与着色器的顶点输入一一对应
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub tangent: [f32; 3],
    pub joint_ids: [i32; 4],
    pub weights: [f32; 4],
    pub amplification: f32,
    pub unlit: f32,
}
impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            color: [1.0; 4],
            normal: [0.0; 3],
            uv: [0.0; 2],
            tangent: [0.0; 3],
            joint_ids: [0; 4],
            weights: [0.0; 4],
            amplification: 1.0,
            unlit: 0.0,
        }
    }
}

/// 顶点去重使用的键：position/color/normal/uv 的位模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexKey([u32; 12]);

impl Vertex {
    pub fn key(&self) -> VertexKey {
        let mut bits = [0u32; 12];
        let floats = self.position.iter().chain(&self.color).chain(&self.normal).chain(&self.uv);
        for (dst, src) in bits.iter_mut().zip(floats) {
            // -0.0 与 0.0 视为同一个顶点
            *dst = if *src == 0.0 { 0 } else { src.to_bits() };
        }
        VertexKey(bits)
    }
}

/// mesh 中一段连续的顶点/索引范围以及其材质
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Primitive {
    pub first_index: u32,
    pub first_vertex: u32,
    pub index_count: u32,
    pub vertex_count: u32,
    pub material: MaterialHandle,
}
impl Primitive {
    #[inline]
    pub fn is_indexed(&self) -> bool {
        self.index_count > 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub name: String,
    pub primitives: Vec<Primitive>,
}

/// 一个资产文件的全部几何数据
///
/// 所有 mesh 共享同一份顶点/索引数组，上传后各自对应一个 device local buffer。
pub struct Model {
    name: String,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    meshes: Vec<Mesh>,

    vertex_buffer: Option<GfxBuffer>,
    index_buffer: Option<GfxBuffer>,
}
// new & init
impl Model {
    pub fn new(name: impl Into<String>, vertices: Vec<Vertex>, indices: Vec<u32>, meshes: Vec<Mesh>) -> Self {
        Self {
            name: name.into(),
            vertices,
            indices,
            meshes,
            vertex_buffer: None,
            index_buffer: None,
        }
    }

    /// 创建 GPU 顶点/索引缓冲，空数组不创建
    pub fn upload(&mut self, ctx: &RenderContext) -> GfxResult<()> {
        let _span = tracy_client::span!("Model::upload");
        if !self.vertices.is_empty() {
            self.vertex_buffer = Some(GfxBuffer::new_with_data(
                ctx.backend(),
                BufferUsage::VertexDevice,
                bytemuck::cast_slice(&self.vertices),
                format!("{}-vertices", self.name),
            )?);
        }
        if !self.indices.is_empty() {
            self.index_buffer = Some(GfxBuffer::new_with_data(
                ctx.backend(),
                BufferUsage::IndexDevice,
                bytemuck::cast_slice(&self.indices),
                format!("{}-indices", self.name),
            )?);
        }
        Ok(())
    }
}
// getters
impl Model {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    #[inline]
    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    #[inline]
    pub fn mesh(&self, index: usize) -> Option<&Mesh> {
        self.meshes.get(index)
    }

    #[inline]
    pub fn vertex_buffer(&self) -> Option<&GfxBuffer> {
        self.vertex_buffer.as_ref()
    }

    #[inline]
    pub fn index_buffer(&self) -> Option<&GfxBuffer> {
        self.index_buffer.as_ref()
    }
}
impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("vertices", &self.vertices.len())
            .field("indices", &self.indices.len())
            .field("meshes", &self.meshes.len())
            .finish()
    }
}
