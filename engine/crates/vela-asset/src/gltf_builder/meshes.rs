//! 顶点数据：每个 glTF mesh 一个任务，在 rayon 线程池中并行读取，结果通过 channel 汇总

use std::collections::HashMap;

use gltf::Semantic;
use gltf::mesh::Mode;
use vela_scene::model::{Mesh, Model, Primitive, Vertex};

use super::accessor;
use super::materials::MaterialTable;
use super::tangents::generate_tangents;
use crate::error::{AssetError, AssetResult};

pub(crate) struct LoadedPrimitive {
    pub vertices: Vec<Vertex>,
    /// 相对于本 primitive 的首个顶点
    pub indices: Vec<u32>,
    pub material: Option<usize>,
    pub skinned: bool,
}

pub(crate) struct LoadedMesh {
    pub gltf_index: usize,
    pub name: String,
    pub primitives: Vec<LoadedPrimitive>,
}

enum MeshLoadResult {
    Success(LoadedMesh),
    Failure(usize, AssetError),
}

fn check_len<T>(what: &str, data: &[T], expected: usize) -> AssetResult<()> {
    if data.len() != expected {
        return Err(AssetError::semantic(format!("{what} has {} elements, POSITION has {expected}", data.len())));
    }
    Ok(())
}

/// 读取一个 primitive，不可绘制的 primitive 返回 `None`
pub(crate) fn load_primitive(
    primitive: &gltf::Primitive,
    buffers: &[gltf::buffer::Data],
    skin_to_joint: Option<&[u32]>,
) -> AssetResult<Option<LoadedPrimitive>> {
    if primitive.mode() != Mode::Triangles {
        log::warn!("primitive {} uses {:?}, only triangles are supported", primitive.index(), primitive.mode());
        return Ok(None);
    }

    let position_accessor = primitive
        .get(&Semantic::Positions)
        .ok_or_else(|| AssetError::semantic(format!("primitive {} has no POSITION", primitive.index())))?;
    if position_accessor.sparse().is_some() {
        return Err(AssetError::semantic(format!(
            "primitive {}: sparse POSITION accessors are not supported",
            primitive.index()
        )));
    }
    let positions = accessor::read_vec::<3>(&position_accessor, buffers, "POSITION")?;
    let count = positions.len();
    if count == 0 {
        log::warn!("primitive {} has no vertices, skipped", primitive.index());
        return Ok(None);
    }

    let normals = primitive.get(&Semantic::Normals).map(|a| accessor::read_vec::<3>(&a, buffers, "NORMAL")).transpose()?;
    let tangents = primitive.get(&Semantic::Tangents).map(|a| accessor::read_vec::<4>(&a, buffers, "TANGENT")).transpose()?;
    let colors = primitive.get(&Semantic::Colors(0)).map(|a| accessor::read_colors(&a, buffers)).transpose()?;
    let uvs = primitive.get(&Semantic::TexCoords(0)).map(|a| accessor::read_vec::<2>(&a, buffers, "TEXCOORD_0")).transpose()?;
    let joints = primitive.get(&Semantic::Joints(0)).map(|a| accessor::read_uints::<4>(&a, buffers, "JOINTS_0")).transpose()?;
    let weights = primitive.get(&Semantic::Weights(0)).map(|a| accessor::read_vec::<4>(&a, buffers, "WEIGHTS_0")).transpose()?;

    if let Some(n) = &normals {
        check_len("NORMAL", n, count)?;
    }
    if let Some(t) = &tangents {
        check_len("TANGENT", t, count)?;
    }
    if let Some(c) = &colors {
        check_len("COLOR_0", c, count)?;
    }
    if let Some(uv) = &uvs {
        check_len("TEXCOORD_0", uv, count)?;
    }
    if let Some(j) = &joints {
        check_len("JOINTS_0", j, count)?;
    }
    if let Some(w) = &weights {
        check_len("WEIGHTS_0", w, count)?;
    }

    let skinned = joints.is_some() && skin_to_joint.is_some();
    let remap_joint = |id: u32| -> AssetResult<i32> {
        match skin_to_joint {
            Some(map) => map.get(id as usize).map(|&joint| joint as i32).ok_or_else(|| {
                AssetError::semantic(format!(
                    "primitive {}: JOINTS_0 references joint {id}, skin has {} joints",
                    primitive.index(),
                    map.len()
                ))
            }),
            None => Ok(id as i32),
        }
    };

    let mut vertices = Vec::with_capacity(count);
    for (i, position) in positions.iter().enumerate() {
        let mut vertex = Vertex {
            position: *position,
            ..Default::default()
        };
        if let Some(n) = &normals {
            vertex.normal = n[i];
        }
        if let Some(t) = &tangents {
            let [x, y, z, w] = t[i];
            vertex.tangent = [x * w, y * w, z * w];
        }
        if let Some(c) = &colors {
            vertex.color = c[i];
        }
        if let Some(uv) = &uvs {
            vertex.uv = uv[i];
        }
        if let Some(j) = &joints {
            let [a, b, c, d] = j[i];
            vertex.joint_ids = [remap_joint(a)?, remap_joint(b)?, remap_joint(c)?, remap_joint(d)?];
        }
        if let Some(w) = &weights {
            vertex.weights = w[i];
        }
        vertices.push(vertex);
    }

    let indices = match primitive.indices() {
        Some(index_accessor) => {
            let indices = accessor::read_indices(&index_accessor, buffers)?;
            if let Some(bad) = indices.iter().find(|&&i| i as usize >= count) {
                return Err(AssetError::semantic(format!(
                    "primitive {}: index {bad} out of range for {count} vertices",
                    primitive.index()
                )));
            }
            indices
        }
        None => {
            let (unique, indices) = deduplicate(&vertices);
            log::debug!("primitive {}: {} -> {} vertices after deduplication", primitive.index(), count, unique.len());
            vertices = unique;
            indices
        }
    };

    if tangents.is_none() && normals.is_some() && uvs.is_some() {
        generate_tangents(&mut vertices, &indices);
    }

    Ok(Some(LoadedPrimitive {
        vertices,
        indices,
        material: primitive.material().index(),
        skinned,
    }))
}

/// 非索引的三角形列表按 position/color/normal/uv 去重，同时生成索引
pub(crate) fn deduplicate(vertices: &[Vertex]) -> (Vec<Vertex>, Vec<u32>) {
    let mut unique: Vec<Vertex> = Vec::with_capacity(vertices.len());
    let mut lookup = HashMap::with_capacity(vertices.len());
    let indices = vertices
        .iter()
        .map(|vertex| {
            *lookup.entry(vertex.key()).or_insert_with(|| {
                unique.push(*vertex);
                (unique.len() - 1) as u32
            })
        })
        .collect();
    (unique, indices)
}

fn load_mesh(mesh: &gltf::Mesh, buffers: &[gltf::buffer::Data], skin_to_joint: Option<&[u32]>) -> MeshLoadResult {
    let _span = tracy_client::span!("gltf::load_mesh");
    let name = mesh.name().map_or_else(|| format!("mesh-{}", mesh.index()), str::to_string);

    let mut primitives = Vec::new();
    for primitive in mesh.primitives() {
        match load_primitive(&primitive, buffers, skin_to_joint) {
            Ok(Some(p)) => primitives.push(p),
            Ok(None) => {}
            Err(e) => return MeshLoadResult::Failure(mesh.index(), e),
        }
    }
    MeshLoadResult::Success(LoadedMesh {
        gltf_index: mesh.index(),
        name,
        primitives,
    })
}

/// 并行读取全部 mesh，按 glTF mesh 下标返回
///
/// 所有任务结束后才返回；任意一个 mesh 失败则整个加载失败。
pub(crate) fn load_meshes(
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
    skin_to_joint: Option<&[u32]>,
    pool: Option<&rayon::ThreadPool>,
) -> AssetResult<Vec<LoadedMesh>> {
    let _span = tracy_client::span!("gltf::load_meshes");
    let meshes = document.meshes().collect::<Vec<_>>();
    let (result_tx, result_rx) = crossbeam_channel::unbounded::<MeshLoadResult>();

    let dispatch = || {
        rayon::scope(|scope| {
            for mesh in &meshes {
                let result_tx = result_tx.clone();
                scope.spawn(move |_| {
                    let _ = result_tx.send(load_mesh(mesh, buffers, skin_to_joint));
                });
            }
        })
    };
    match pool {
        Some(pool) => pool.install(dispatch),
        None => dispatch(),
    }
    drop(result_tx);

    let mut loaded = Vec::with_capacity(meshes.len());
    for result in result_rx.iter() {
        match result {
            MeshLoadResult::Success(mesh) => loaded.push(mesh),
            MeshLoadResult::Failure(index, e) => {
                log::error!("mesh {index} failed to load: {e}");
                return Err(e);
            }
        }
    }
    loaded.sort_by_key(|m| m.gltf_index);
    Ok(loaded)
}

/// 把全部 mesh 合并为一个 [`Model`]，返回 glTF mesh 下标 -> 模型中的 mesh 下标
///
/// 没有可绘制 primitive 的 mesh 会被跳过。
pub(crate) fn build_model(
    name: &str,
    loaded: Vec<LoadedMesh>,
    materials: &MaterialTable,
    mesh_count: usize,
) -> (Model, Vec<Option<usize>>) {
    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    let mut meshes = Vec::new();
    let mut mesh_map = vec![None; mesh_count];

    for loaded_mesh in loaded {
        if loaded_mesh.primitives.is_empty() {
            log::warn!("mesh `{}` has no drawable primitives, skipped", loaded_mesh.name);
            continue;
        }

        let mut primitives = Vec::with_capacity(loaded_mesh.primitives.len());
        for p in loaded_mesh.primitives {
            primitives.push(Primitive {
                first_index: indices.len() as u32,
                first_vertex: vertices.len() as u32,
                index_count: p.indices.len() as u32,
                vertex_count: p.vertices.len() as u32,
                material: materials.get(p.material, p.skinned),
            });
            vertices.extend(p.vertices);
            indices.extend(p.indices);
        }

        if let Some(slot) = mesh_map.get_mut(loaded_mesh.gltf_index) {
            *slot = Some(meshes.len());
        }
        meshes.push(Mesh {
            name: loaded_mesh.name,
            primitives,
        });
    }

    (Model::new(name, vertices, indices, meshes), mesh_map)
}
