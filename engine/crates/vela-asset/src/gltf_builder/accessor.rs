//! accessor -> buffer view -> buffer 的读取
//!
//! 分量类型是封闭集合 {i8, u8, i16, u16, u32, f32}，逐个显式分派。

use glam::Mat4;
use gltf::accessor::{DataType, Dimensions};

use crate::error::{AssetError, AssetResult};

#[inline]
fn component_size(data_type: DataType) -> usize {
    match data_type {
        DataType::I8 | DataType::U8 => 1,
        DataType::I16 | DataType::U16 => 2,
        DataType::U32 | DataType::F32 => 4,
    }
}

#[inline]
fn component_count(dimensions: Dimensions) -> usize {
    match dimensions {
        Dimensions::Scalar => 1,
        Dimensions::Vec2 => 2,
        Dimensions::Vec3 => 3,
        Dimensions::Vec4 | Dimensions::Mat2 => 4,
        Dimensions::Mat3 => 9,
        Dimensions::Mat4 => 16,
    }
}

/// 读取一个分量并转换为 f32，`normalized` 时按照 glTF 的规则映射到 [0, 1] 或 [-1, 1]
fn read_component(bytes: &[u8], data_type: DataType, normalized: bool) -> f32 {
    match data_type {
        DataType::I8 => {
            let v = bytes[0] as i8;
            if normalized { (v as f32 / 127.0).max(-1.0) } else { v as f32 }
        }
        DataType::U8 => {
            let v = bytes[0];
            if normalized { v as f32 / 255.0 } else { v as f32 }
        }
        DataType::I16 => {
            let v = i16::from_le_bytes([bytes[0], bytes[1]]);
            if normalized { (v as f32 / 32767.0).max(-1.0) } else { v as f32 }
        }
        DataType::U16 => {
            let v = u16::from_le_bytes([bytes[0], bytes[1]]);
            if normalized { v as f32 / 65535.0 } else { v as f32 }
        }
        DataType::U32 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32,
        DataType::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    }
}

fn read_component_u32(bytes: &[u8], data_type: DataType) -> Option<u32> {
    match data_type {
        DataType::U8 => Some(bytes[0] as u32),
        DataType::U16 => Some(u16::from_le_bytes([bytes[0], bytes[1]]) as u32),
        DataType::U32 => Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        DataType::I8 | DataType::I16 | DataType::F32 => None,
    }
}

/// 经过边界检查的 accessor 视图
struct ElementView<'a> {
    data: Option<&'a [u8]>,
    offset: usize,
    stride: usize,
    count: usize,
    data_type: DataType,
    components: usize,
}
impl<'a> ElementView<'a> {
    fn new(accessor: &gltf::Accessor, buffers: &'a [gltf::buffer::Data]) -> AssetResult<Self> {
        let data_type = accessor.data_type();
        let components = component_count(accessor.dimensions());
        let element_size = component_size(data_type) * components;
        let count = accessor.count();

        if accessor.sparse().is_some() {
            log::warn!("accessor {} is sparse, only the dense part is read", accessor.index());
        }

        let Some(view) = accessor.view() else {
            // 没有 buffer view 的 accessor 按规范视为全零
            return Ok(Self {
                data: None,
                offset: 0,
                stride: element_size,
                count,
                data_type,
                components,
            });
        };

        let buffer = &buffers
            .get(view.buffer().index())
            .ok_or_else(|| AssetError::semantic(format!("accessor {} references a missing buffer", accessor.index())))?
            .0;
        let stride = view.stride().unwrap_or(element_size);
        let offset = view.offset() + accessor.offset();
        let end = if count == 0 { offset } else { offset + (count - 1) * stride + element_size };
        if end > buffer.len() || end > view.offset() + view.length() {
            return Err(AssetError::semantic(format!(
                "accessor {} reads bytes {}..{} beyond its buffer view ({} bytes)",
                accessor.index(),
                offset,
                end,
                view.length()
            )));
        }

        Ok(Self {
            data: Some(&buffer[..]),
            offset,
            stride,
            count,
            data_type,
            components,
        })
    }

    /// 第 i 个元素的第 c 个分量
    #[inline]
    fn component(&self, i: usize, c: usize) -> Option<&'a [u8]> {
        let start = self.offset + i * self.stride + c * component_size(self.data_type);
        self.data.map(|data| &data[start..start + component_size(self.data_type)])
    }
}

/// 读取为平铺的 f32 数组，长度为 `count * components`
pub fn read_floats(accessor: &gltf::Accessor, buffers: &[gltf::buffer::Data]) -> AssetResult<(Vec<f32>, usize)> {
    let view = ElementView::new(accessor, buffers)?;
    let normalized = accessor.normalized();
    let mut out = Vec::with_capacity(view.count * view.components);
    for i in 0..view.count {
        for c in 0..view.components {
            out.push(view.component(i, c).map_or(0.0, |b| read_component(b, view.data_type, normalized)));
        }
    }
    Ok((out, view.components))
}

/// 读取 N 分量的向量，分量数不符时报错
pub fn read_vec<const N: usize>(
    accessor: &gltf::Accessor,
    buffers: &[gltf::buffer::Data],
    what: &str,
) -> AssetResult<Vec<[f32; N]>> {
    let (floats, components) = read_floats(accessor, buffers)?;
    if components != N {
        return Err(AssetError::semantic(format!(
            "{what}: accessor {} has {components} components, expected {N}",
            accessor.index()
        )));
    }
    Ok(floats
        .chunks_exact(N)
        .map(|chunk| {
            let mut v = [0.0; N];
            v.copy_from_slice(chunk);
            v
        })
        .collect())
}

/// 颜色可以是 VEC3 或 VEC4，统一为 RGBA
pub fn read_colors(accessor: &gltf::Accessor, buffers: &[gltf::buffer::Data]) -> AssetResult<Vec<[f32; 4]>> {
    let (floats, components) = read_floats(accessor, buffers)?;
    match components {
        3 => Ok(floats.chunks_exact(3).map(|c| [c[0], c[1], c[2], 1.0]).collect()),
        4 => Ok(floats.chunks_exact(4).map(|c| [c[0], c[1], c[2], c[3]]).collect()),
        n => Err(AssetError::semantic(format!("COLOR_0: accessor {} has {n} components", accessor.index()))),
    }
}

/// 读取无符号整数分量，`N` 为每个元素的分量数
pub fn read_uints<const N: usize>(
    accessor: &gltf::Accessor,
    buffers: &[gltf::buffer::Data],
    what: &str,
) -> AssetResult<Vec<[u32; N]>> {
    let view = ElementView::new(accessor, buffers)?;
    if view.components != N {
        return Err(AssetError::semantic(format!(
            "{what}: accessor {} has {} components, expected {N}",
            accessor.index(),
            view.components
        )));
    }

    let mut out = Vec::with_capacity(view.count);
    for i in 0..view.count {
        let mut element = [0u32; N];
        for (c, dst) in element.iter_mut().enumerate() {
            let Some(bytes) = view.component(i, c) else {
                continue;
            };
            *dst = read_component_u32(bytes, view.data_type).ok_or_else(|| {
                AssetError::semantic(format!(
                    "{what}: accessor {} has component type {:?}, expected an unsigned integer",
                    accessor.index(),
                    view.data_type
                ))
            })?;
        }
        out.push(element);
    }
    Ok(out)
}

pub fn read_indices(accessor: &gltf::Accessor, buffers: &[gltf::buffer::Data]) -> AssetResult<Vec<u32>> {
    Ok(read_uints::<1>(accessor, buffers, "indices")?.into_iter().map(|[i]| i).collect())
}

/// 逆绑定矩阵：必须为 MAT4 + f32
pub fn read_mat4(accessor: &gltf::Accessor, buffers: &[gltf::buffer::Data]) -> AssetResult<Vec<Mat4>> {
    if accessor.dimensions() != Dimensions::Mat4 || accessor.data_type() != DataType::F32 {
        return Err(AssetError::semantic(format!(
            "accessor {} is {:?}/{:?}, expected Mat4/F32",
            accessor.index(),
            accessor.dimensions(),
            accessor.data_type()
        )));
    }
    let (floats, _) = read_floats(accessor, buffers)?;
    Ok(floats
        .chunks_exact(16)
        .map(|c| {
            let mut cols = [0.0; 16];
            cols.copy_from_slice(c);
            Mat4::from_cols_array(&cols)
        })
        .collect())
}
