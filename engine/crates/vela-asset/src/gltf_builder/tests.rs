use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use vela_gfx::backend::MaterialKind;
use vela_gfx::host::HostBackend;
use vela_render_interface::instance_buffer::InstanceData;
use vela_render_interface::pipeline_settings::RendererSettings;
use vela_scene::components::{
    DefaultDiffuse, GroupTag, InstanceTag, MeshComponent, PbrNoMap, SkeletalComponent, Transform,
};

use super::*;

const FLOAT: u32 = 5126;
const UNSIGNED_BYTE: u32 = 5121;

fn context() -> RenderContext {
    RenderContext::new(Arc::new(HostBackend::new()), RendererSettings::default()).unwrap()
}

/// 拼接二进制数据并生成对应的 bufferView/accessor
#[derive(Default)]
struct Fixture {
    bin: Vec<u8>,
    views: Vec<Value>,
    accessors: Vec<Value>,
}
impl Fixture {
    fn push(&mut self, bytes: &[u8], component_type: u32, count: usize, ty: &str, bounds: Option<(Value, Value)>) -> usize {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
        let offset = self.bin.len();
        self.bin.extend_from_slice(bytes);
        self.views.push(json!({ "buffer": 0, "byteOffset": offset, "byteLength": bytes.len() }));

        let mut accessor = json!({
            "bufferView": self.views.len() - 1,
            "componentType": component_type,
            "count": count,
            "type": ty,
        });
        if let Some((min, max)) = bounds {
            accessor["min"] = min;
            accessor["max"] = max;
        }
        self.accessors.push(accessor);
        self.accessors.len() - 1
    }

    fn positions(&mut self, positions: &[[f32; 3]]) -> usize {
        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];
        for p in positions {
            for c in 0..3 {
                min[c] = min[c].min(p[c]);
                max[c] = max[c].max(p[c]);
            }
        }
        self.push(bytemuck::cast_slice(positions), FLOAT, positions.len(), "VEC3", Some((json!(min), json!(max))))
    }

    fn buffers_json(&self, uri: bool) -> Value {
        let mut buffer = json!({ "byteLength": self.bin.len() });
        if uri {
            buffer["uri"] = json!(format!("data:application/octet-stream;base64,{}", STANDARD.encode(&self.bin)));
        }
        json!([buffer])
    }

    /// 写入内嵌 base64 buffer 的 .gltf
    fn write_gltf(&self, dir: &tempfile::TempDir, file: &str, mut root: Value) -> PathBuf {
        root["asset"] = json!({ "version": "2.0" });
        root["buffers"] = self.buffers_json(true);
        root["bufferViews"] = json!(self.views);
        root["accessors"] = json!(self.accessors);
        let path = dir.path().join(file);
        std::fs::write(&path, serde_json::to_vec(&root).unwrap()).unwrap();
        path
    }

    /// 写入 GLB 容器，BIN chunk 保存数据
    fn write_glb(&self, dir: &tempfile::TempDir, file: &str, mut root: Value) -> PathBuf {
        root["asset"] = json!({ "version": "2.0" });
        root["buffers"] = self.buffers_json(false);
        root["bufferViews"] = json!(self.views);
        root["accessors"] = json!(self.accessors);

        let mut json_chunk = serde_json::to_vec(&root).unwrap();
        while json_chunk.len() % 4 != 0 {
            json_chunk.push(b' ');
        }
        let mut bin_chunk = self.bin.clone();
        while bin_chunk.len() % 4 != 0 {
            bin_chunk.push(0);
        }

        let total = 12 + 8 + json_chunk.len() + 8 + bin_chunk.len();
        let mut bytes = Vec::with_capacity(total);
        bytes.extend_from_slice(b"glTF");
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&(total as u32).to_le_bytes());
        bytes.extend_from_slice(&(json_chunk.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&0x4E4F_534Au32.to_le_bytes());
        bytes.extend_from_slice(&json_chunk);
        bytes.extend_from_slice(&(bin_chunk.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&0x004E_4942u32.to_le_bytes());
        bytes.extend_from_slice(&bin_chunk);

        let path = dir.path().join(file);
        std::fs::write(&path, bytes).unwrap();
        path
    }
}

const TRIANGLE: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];

/// 只有 POSITION 的单个三角形；`holder` 是 mesh 节点的父节点，`camera-rig` 不含 mesh
fn triangle_root(fixture: &mut Fixture) -> Value {
    let position = fixture.positions(&TRIANGLE);
    json!({
        "scene": 0,
        "scenes": [{ "nodes": [0, 2] }],
        "nodes": [
            { "name": "holder", "children": [1], "translation": [0.0, 0.0, -2.0] },
            { "name": "tri", "mesh": 0 },
            { "name": "camera-rig" },
        ],
        "meshes": [{ "name": "triangle", "primitives": [{ "attributes": { "POSITION": position } }] }],
    })
}

/// 2x2 的 PNG，以 data URI 内嵌
fn png_data_uri() -> String {
    let image = image::RgbaImage::from_pixel(2, 2, image::Rgba([200, 100, 50, 255]));
    let mut bytes = Vec::new();
    image.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png).unwrap();
    format!("data:image/png;base64,{}", STANDARD.encode(&bytes))
}

/// 带 NORMAL/TEXCOORD_0 的三角形，材质使用 PNG 作为 base color 贴图
///
/// `normal_count` 与顶点数不一致时顶点读取失败，而此时纹理已经创建。
fn textured_root(fixture: &mut Fixture, normal_count: usize) -> Value {
    let position = fixture.positions(&TRIANGLE);
    let normals = vec![[0.0f32, 0.0, 1.0]; normal_count];
    let normal = fixture.push(bytemuck::cast_slice(&normals), FLOAT, normal_count, "VEC3", None);
    let uvs: [[f32; 2]; 3] = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
    let uv = fixture.push(bytemuck::cast_slice(&uvs), FLOAT, 3, "VEC2", None);
    json!({
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": "tile", "mesh": 0 }],
        "images": [{ "uri": png_data_uri() }],
        "textures": [{ "source": 0 }],
        "materials": [{ "name": "brick", "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 } } }],
        "meshes": [{
            "name": "tile",
            "primitives": [{ "attributes": { "POSITION": position, "NORMAL": normal, "TEXCOORD_0": uv }, "material": 0 }],
        }],
    })
}

fn write_triangle(dir: &tempfile::TempDir) -> PathBuf {
    let mut fixture = Fixture::default();
    let root = triangle_root(&mut fixture);
    fixture.write_gltf(dir, "triangle.gltf", root)
}

/// 两个关节的骨骼，skin.joints 的顺序与节点层级相反
fn write_skinned(dir: &tempfile::TempDir) -> PathBuf {
    write_skinned_with_joints(dir, [0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0])
}

fn write_skinned_with_joints(dir: &tempfile::TempDir, joint_ids: [u8; 12]) -> PathBuf {
    let mut fixture = Fixture::default();
    let position = fixture.positions(&TRIANGLE);
    let joints = fixture.push(&joint_ids, UNSIGNED_BYTE, 3, "VEC4", None);
    let weights: [[f32; 4]; 3] = [[1.0, 0.0, 0.0, 0.0]; 3];
    let weights = fixture.push(bytemuck::cast_slice(&weights), FLOAT, 3, "VEC4", None);
    let ibm = [glam::Mat4::IDENTITY.to_cols_array(), glam::Mat4::IDENTITY.to_cols_array()];
    let ibm = fixture.push(bytemuck::cast_slice(&ibm), FLOAT, 2, "MAT4", None);
    let times = fixture.push(bytemuck::cast_slice(&[0.0f32, 1.0]), FLOAT, 2, "SCALAR", Some((json!([0.0]), json!([1.0]))));
    let half_turn = std::f32::consts::FRAC_1_SQRT_2;
    let rotations: [[f32; 4]; 2] = [[0.0, 0.0, 0.0, 1.0], [0.0, 0.0, half_turn, half_turn]];
    let rotations = fixture.push(bytemuck::cast_slice(&rotations), FLOAT, 2, "VEC4", None);

    let root = json!({
        "scene": 0,
        "scenes": [{ "nodes": [0, 2] }],
        "nodes": [
            { "name": "root", "children": [1] },
            { "name": "tip", "translation": [0.0, 1.0, 0.0] },
            { "name": "body", "mesh": 0, "skin": 0 },
        ],
        "skins": [{ "joints": [1, 0], "inverseBindMatrices": ibm }],
        "meshes": [{
            "name": "body",
            "primitives": [{ "attributes": { "POSITION": position, "JOINTS_0": joints, "WEIGHTS_0": weights } }],
        }],
        "animations": [{
            "name": "wave",
            "samplers": [{ "input": times, "output": rotations }],
            "channels": [
                { "sampler": 0, "target": { "node": 1, "path": "rotation" } },
                { "sampler": 0, "target": { "node": 2, "path": "rotation" } },
            ],
        }],
    });
    fixture.write_gltf(dir, "skinned.gltf", root)
}

#[test]
fn test_triangle_single_instance() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_triangle(&dir);
    let ctx = context();
    let mut scene = Scene::new();

    let asset = GltfBuilder::new(&ctx, &path).load(&mut scene, 1, None).unwrap();
    assert!(asset.rig.is_none());
    assert_eq!(asset.canonical_entities.len(), 1);

    let model = &scene.resources.models[asset.model];
    assert_eq!(model.vertices().len(), 3);
    assert_eq!(model.indices().len(), 3);
    assert_eq!(model.meshes().len(), 1);
    assert!(model.vertex_buffer().is_some());

    let group = scene.retrieve("triangle").unwrap();
    assert_eq!(group, asset.group);
    assert_eq!(scene.registry.get::<GroupTag>(group).unwrap().asset_name, "triangle");

    let tri = scene.retrieve("tri").unwrap();
    assert_eq!(asset.canonical_entities[0], tri);
    assert_eq!(scene.instance_count(tri), 1);
    let long_name = format!("{}::0::1", path.display());
    assert_eq!(scene.dictionary.retrieve_long(&long_name), Some(tri));
    assert!(scene.retrieve("camera-rig").is_some());

    // 没有材质的 primitive 使用默认材质
    assert!(scene.registry.has::<DefaultDiffuse>(tri));
    assert!(!scene.registry.has::<PbrNoMap>(tri));
}

#[test]
fn test_triangle_four_instances() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_triangle(&dir);
    let ctx = context();
    let mut scene = Scene::new();

    let mut first_instances = Vec::new();
    let asset = GltfBuilder::new(&ctx, &path)
        .load_with_instances(&mut scene, 4, &mut first_instances, true)
        .unwrap();
    assert_eq!(first_instances.len(), 4);

    // 分组 + 第一个实例的 3 个节点 + 之后每个实例只复制 holder/tri
    assert_eq!(scene.registry.len(), 1 + 3 + 3 * 2);
    assert!(scene.retrieve("camera-rig").is_some());
    assert!(scene.retrieve("camera-rig_1").is_none());
    assert!(scene.retrieve("tri_3").is_some());

    let canonical = asset.canonical_entities[0];
    assert_eq!(scene.registry.get::<InstanceTag>(canonical).unwrap().len(), 4);
    assert_eq!(scene.canonical_entities(), vec![canonical]);

    scene.update_transforms(1);
    assert_eq!(scene.fill_instance_buffers(&ctx, 1, 1).unwrap(), 1);
    let mesh = scene.registry.get::<MeshComponent>(canonical).unwrap();
    let buffer = &scene.resources.instance_buffers[mesh.instance_buffers[0]];
    assert_eq!(buffer.count(), 4);
    let data = buffer.uploaded(1, 3).unwrap();
    assert!(data.model.w_axis.truncate().abs_diff_eq(glam::Vec3::new(0.0, 0.0, -2.0), 1e-6));
    assert_eq!(data.joint_buffer_index, InstanceData::NO_SKELETON);
}

#[test]
fn test_flattened_instances_without_scene_graph() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_triangle(&dir);
    let ctx = context();
    let mut scene = Scene::new();

    let mut first_instances = Vec::new();
    GltfBuilder::new(&ctx, &path)
        .load_with_instances(&mut scene, 2, &mut first_instances, false)
        .unwrap();
    assert_eq!(scene.scene_graph.len(), 1);

    let tri = scene.retrieve("tri_1").unwrap();
    let transform = scene.registry.get::<Transform>(tri).unwrap();
    assert!(transform.global_matrix().w_axis.truncate().abs_diff_eq(glam::Vec3::new(0.0, 0.0, -2.0), 1e-6));
}

#[test]
fn test_flattened_instances_follow_transform_changes() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_triangle(&dir);
    let ctx = context();
    let mut scene = Scene::new();

    let mut first_instances = Vec::new();
    GltfBuilder::new(&ctx, &path)
        .load_with_instances(&mut scene, 2, &mut first_instances, false)
        .unwrap();
    scene.update_transforms(1);
    assert_eq!(scene.fill_instance_buffers(&ctx, 1, 1).unwrap(), 1);

    let tri = scene.retrieve("tri").unwrap();
    let tri_1 = scene.retrieve("tri_1").unwrap();
    scene.registry.get_mut::<Transform>(tri_1).unwrap().set_translation(glam::Vec3::new(7.0, 0.0, 0.0));
    scene.update_transforms(2);
    assert_eq!(scene.fill_instance_buffers(&ctx, 2, 2).unwrap(), 1);

    let handle = scene.registry.get::<MeshComponent>(tri).unwrap().instance_buffers[0];
    let moved = scene.resources.instance_buffers[handle].uploaded(2, 1).unwrap();
    assert!(moved.model.w_axis.truncate().abs_diff_eq(glam::Vec3::new(7.0, 0.0, 0.0), 1e-6));
}

#[test]
fn test_loader_thread_pool() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_triangle(&dir);
    let ctx = context();
    let mut scene = Scene::new();

    let builder = GltfBuilder::new(&ctx, &path).with_loader_threads(2).unwrap();
    let asset = builder.load(&mut scene, 1, Some(0)).unwrap();
    assert_eq!(scene.resources.models[asset.model].vertices().len(), 3);
}

#[test]
fn test_same_file_same_names() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_triangle(&dir);
    let ctx = context();

    let mut first = Scene::new();
    let mut second = Scene::new();
    GltfBuilder::new(&ctx, &path).load(&mut first, 2, None).unwrap();
    GltfBuilder::new(&ctx, &path).load(&mut second, 2, None).unwrap();

    let names = first.scene_graph.dump_names();
    assert_eq!(names, second.scene_graph.dump_names());
    assert_eq!(names, ["triangle", "holder", "tri", "camera-rig", "holder_1", "tri_1"]);
}

#[test]
fn test_skinned_asset() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_skinned(&dir);
    let ctx = context();
    let mut scene = Scene::new();

    let asset = GltfBuilder::new(&ctx, &path).load(&mut scene, 1, None).unwrap();
    let rig_handle = asset.rig.unwrap();
    let rig = &scene.resources.rigs[rig_handle];

    // 父关节排在子关节前面
    let joints = rig.skeleton().joints();
    assert_eq!(joints.len(), 2);
    assert_eq!(joints[0].name, "root");
    assert_eq!(joints[1].name, "tip");
    assert_eq!(joints[1].parent, Some(0));
    assert!(rig.skeleton().is_topologically_ordered());

    // 指向 mesh 节点的 channel 被丢弃
    assert_eq!(rig.animations().len(), 1);
    assert_eq!(rig.animations().get("wave").unwrap().channels().len(), 1);

    // JOINTS_0 从 skin 下标转换为重排后的关节下标
    let model = &scene.resources.models[asset.model];
    assert_eq!(model.vertices()[0].joint_ids[0], 1);
    assert_eq!(model.vertices()[2].joint_ids[0], 0);

    let body = scene.retrieve("body").unwrap();
    assert_eq!(scene.registry.get::<SkeletalComponent>(body).unwrap().rig, rig_handle);
    assert!(scene.registry.has::<SkeletalComponent>(asset.group));

    let material = scene.registry.get::<vela_scene::components::MaterialComponent>(body).unwrap().materials[0];
    assert_eq!(scene.resources.materials[material].kind, MaterialKind::DiffuseSA);
    assert!(!scene.registry.has::<DefaultDiffuse>(body));

    let joint_buffer_index = rig.joint_buffer_index(1);
    scene.update_transforms(1);
    scene.fill_instance_buffers(&ctx, 1, 1).unwrap();
    let mesh = scene.registry.get::<MeshComponent>(body).unwrap();
    let data = scene.resources.instance_buffers[mesh.instance_buffers[0]].uploaded(1, 0).unwrap();
    assert_eq!(data.joint_buffer_index, joint_buffer_index);
}

#[test]
fn test_glb_detected_by_content() {
    let dir = tempfile::tempdir().unwrap();
    let mut fixture = Fixture::default();
    let root = triangle_root(&mut fixture);
    // 扩展名不可信，按魔数识别
    let path = fixture.write_glb(&dir, "packed.gltf", root);
    assert!(is_glb(&std::fs::read(&path).unwrap()));

    let ctx = context();
    let mut scene = Scene::new();
    let asset = GltfBuilder::new(&ctx, &path).load(&mut scene, 1, None).unwrap();
    assert_eq!(scene.resources.models[asset.model].vertices().len(), 3);
    assert!(scene.retrieve("packed").is_some());
}

#[test]
fn test_unsupported_required_extension() {
    let dir = tempfile::tempdir().unwrap();
    let mut fixture = Fixture::default();
    let mut root = triangle_root(&mut fixture);
    root["extensionsUsed"] = json!(["KHR_draco_mesh_compression"]);
    root["extensionsRequired"] = json!(["KHR_draco_mesh_compression"]);
    let path = fixture.write_gltf(&dir, "draco.gltf", root);

    let ctx = context();
    let mut scene = Scene::new();
    let err = GltfBuilder::new(&ctx, &path).load(&mut scene, 1, None).unwrap_err();
    assert!(matches!(err, AssetError::UnsupportedExtension(ref name) if name == "KHR_draco_mesh_compression"));
    assert!(scene.registry.is_empty());
    assert!(scene.dictionary.is_empty());
}

#[test]
fn test_failed_load_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let good = write_triangle(&dir);

    let mut fixture = Fixture::default();
    let position = fixture.positions(&TRIANGLE);
    let normal = fixture.push(bytemuck::cast_slice(&[[0.0f32, 0.0, 1.0]; 2]), FLOAT, 2, "VEC3", None);
    let root = json!({
        "nodes": [{ "name": "broken", "mesh": 0 }],
        "materials": [{ "name": "red", "pbrMetallicRoughness": { "baseColorFactor": [1.0, 0.0, 0.0, 1.0] } }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": position, "NORMAL": normal }, "material": 0 }] }],
    });
    let bad = fixture.write_gltf(&dir, "broken.gltf", root);

    let ctx = context();
    let mut scene = Scene::new();
    GltfBuilder::new(&ctx, &good).load(&mut scene, 2, None).unwrap();
    let entities = scene.registry.len();
    let names = scene.dictionary.len();
    let graph = scene.scene_graph.len();
    let materials = scene.resources.materials.len();

    let err = GltfBuilder::new(&ctx, &bad).load(&mut scene, 1, None).unwrap_err();
    assert!(matches!(err, AssetError::Semantic(_)));
    assert_eq!(scene.registry.len(), entities);
    assert_eq!(scene.dictionary.len(), names);
    assert_eq!(scene.scene_graph.len(), graph);
    assert_eq!(scene.resources.materials.len(), materials);
    assert_eq!(scene.resources.models.len(), 1);
    assert!(scene.retrieve("broken").is_none());
}

#[test]
fn test_zero_instances_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_triangle(&dir);
    let ctx = context();
    let mut scene = Scene::new();
    assert!(matches!(
        GltfBuilder::new(&ctx, &path).load(&mut scene, 0, None),
        Err(AssetError::Semantic(_))
    ));
}

#[test]
fn test_tangents_generated_from_normals_and_uvs() {
    let dir = tempfile::tempdir().unwrap();
    let mut fixture = Fixture::default();
    let position = fixture.positions(&TRIANGLE);
    let normal = fixture.push(bytemuck::cast_slice(&[[0.0f32, 0.0, 1.0]; 3]), FLOAT, 3, "VEC3", None);
    let uvs: [[f32; 2]; 3] = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
    let uv = fixture.push(bytemuck::cast_slice(&uvs), FLOAT, 3, "VEC2", None);
    let root = json!({
        "nodes": [{ "name": "lit", "mesh": 0 }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": position, "NORMAL": normal, "TEXCOORD_0": uv } }] }],
    });
    let path = fixture.write_gltf(&dir, "lit.gltf", root);

    let ctx = context();
    let mut scene = Scene::new();
    let asset = GltfBuilder::new(&ctx, &path).load(&mut scene, 1, None).unwrap();
    let vertices = scene.resources.models[asset.model].vertices();
    assert_eq!(vertices.len(), 3);
    for vertex in vertices {
        let n = glam::Vec3::from(vertex.normal);
        let t = glam::Vec3::from(vertex.tangent);
        assert!(n.dot(t).abs() < 1e-5);
        assert!((t.length() - 1.0).abs() < 1e-5);
        // u 沿 +X 增长
        assert!(t.abs_diff_eq(glam::Vec3::X, 1e-5));
    }
}

#[test]
fn test_textured_material() {
    let dir = tempfile::tempdir().unwrap();
    let mut fixture = Fixture::default();
    let root = textured_root(&mut fixture, 3);
    let path = fixture.write_gltf(&dir, "tile.gltf", root);

    let ctx = context();
    let mut scene = Scene::new();
    GltfBuilder::new(&ctx, &path).load(&mut scene, 1, None).unwrap();

    assert_eq!(scene.resources.textures.len(), 1);
    let texture = scene.resources.textures.values().next().unwrap();
    // base color 贴图按 sRGB 读取
    assert_eq!(texture.texture.format(), vela_gfx::resources::image::ImageFormat::Rgba8Srgb);
    assert_eq!(texture.texture.extent(), (2, 2));
    // 槽位 0 属于 atlas
    assert_ne!(texture.bindless_index, 0);
    assert_eq!(ctx.bindless_manager().texture_index(texture.texture.id()), Some(texture.bindless_index));

    let tile = scene.retrieve("tile").unwrap();
    let material = scene.registry.get::<vela_scene::components::MaterialComponent>(tile).unwrap().materials[0];
    let material = &scene.resources.materials[material];
    assert_eq!(material.name, "brick");
    assert_eq!(material.kind, MaterialKind::DiffuseMap);
    assert_eq!(material.push_constants(0, InstanceData::NO_SKELETON).diffuse_texture, texture.bindless_index);
    assert!(!scene.registry.has::<DefaultDiffuse>(tile));
    assert!(!scene.registry.has::<PbrNoMap>(tile));
}

#[test]
fn test_failed_load_discards_pending_texture_writes() {
    let dir = tempfile::tempdir().unwrap();
    let mut fixture = Fixture::default();
    let root = textured_root(&mut fixture, 2);
    let path = fixture.write_gltf(&dir, "broken-tile.gltf", root);

    let host = Arc::new(HostBackend::new());
    let ctx = RenderContext::new(host.clone(), RendererSettings::default()).unwrap();
    let mut scene = Scene::new();
    let pending = ctx.bindless_manager().pending_count();

    let err = GltfBuilder::new(&ctx, &path).load(&mut scene, 1, None).unwrap_err();
    assert!(matches!(err, AssetError::Semantic(ref msg) if msg.contains("NORMAL")));
    assert!(scene.resources.textures.is_empty());
    assert_eq!(ctx.bindless_manager().pending_count(), pending);

    // 只有 atlas 被写入 descriptor set
    ctx.bindless_manager().update_bindless_descriptor_sets().unwrap();
    let texture_writes = host
        .descriptor_writes()
        .into_iter()
        .filter_map(|write| match write {
            vela_gfx::backend::BindlessWrite::Texture { index, texture } => Some((index, texture.texture_id)),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(texture_writes, vec![(0, ctx.atlas().id())]);
}

#[test]
fn test_non_indexed_primitive_is_deduplicated() {
    let dir = tempfile::tempdir().unwrap();
    let mut fixture = Fixture::default();
    // 两个三角形组成的四边形，没有 indices
    let quad = [
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [1.0, 1.0, 0.0],
        [0.0, 0.0, 0.0],
        [1.0, 1.0, 0.0],
        [0.0, 1.0, 0.0],
    ];
    let position = fixture.positions(&quad);
    let root = json!({
        "nodes": [{ "name": "quad", "mesh": 0 }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": position } }] }],
    });
    let path = fixture.write_gltf(&dir, "quad.gltf", root);

    let ctx = context();
    let mut scene = Scene::new();
    let asset = GltfBuilder::new(&ctx, &path).load(&mut scene, 1, None).unwrap();
    let model = &scene.resources.models[asset.model];
    assert_eq!(model.vertices().len(), 4);
    assert_eq!(model.indices(), &[0, 1, 2, 0, 2, 3]);

    let primitive = &model.meshes()[0].primitives[0];
    assert_eq!(primitive.vertex_count, 4);
    assert_eq!(primitive.index_count, 6);
    assert!(primitive.is_indexed());
}

#[test]
fn test_out_of_range_joint_rejected() {
    let dir = tempfile::tempdir().unwrap();
    // skin 只有两个关节，第三个顶点引用关节 5
    let path = write_skinned_with_joints(&dir, [0, 0, 0, 0, 1, 0, 0, 0, 5, 0, 0, 0]);
    let ctx = context();
    let mut scene = Scene::new();

    let err = GltfBuilder::new(&ctx, &path).load(&mut scene, 1, None).unwrap_err();
    assert!(matches!(err, AssetError::Semantic(ref msg) if msg.contains("joint 5")));
    assert!(scene.resources.rigs.is_empty());
    assert!(scene.registry.is_empty());
}
