//! 读取文件、检查扩展、导入 buffer 与 image

use std::path::Path;

use serde_json::Value;

use crate::error::{AssetError, AssetResult};

/// 可以出现在 `extensionsRequired` 中的扩展
pub const SUPPORTED_EXTENSIONS: [&str; 4] = [
    "KHR_mesh_quantization",
    "KHR_materials_emissive_strength",
    "KHR_lights_punctual",
    "KHR_texture_transform",
];

const GLB_MAGIC: &[u8; 4] = b"glTF";

pub(crate) struct ParsedGltf {
    pub document: gltf::Document,
    pub buffers: Vec<gltf::buffer::Data>,
    pub images: Vec<gltf::image::Data>,
}

/// 按内容而不是扩展名判断是否为 GLB
#[inline]
pub fn is_glb(bytes: &[u8]) -> bool {
    bytes.starts_with(GLB_MAGIC)
}

pub(crate) fn parse(path: &Path) -> AssetResult<ParsedGltf> {
    let _span = tracy_client::span!("gltf::parse");

    let bytes = std::fs::read(path).map_err(|source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let (json, blob) = if is_glb(&bytes) {
        let glb = gltf::Glb::from_slice(&bytes).map_err(|e| AssetError::parse(path, e))?;
        (glb.json.into_owned(), glb.bin.map(|bin| bin.into_owned()))
    } else {
        (bytes, None)
    };

    let root = patch_json(path, &json)?;
    let document = gltf::Document::from_json(root).map_err(|e| AssetError::parse(path, e))?;

    let base = path.parent();
    let buffers = gltf::import_buffers(&document, base, blob).map_err(|e| AssetError::parse(path, e))?;
    let images = gltf::import_images(&document, base, &buffers).map_err(|e| AssetError::parse(path, e))?;

    log::info!(
        "parsed {}: {} buffers, {} images, {} meshes, {} nodes",
        path.display(),
        buffers.len(),
        images.len(),
        document.meshes().len(),
        document.nodes().len()
    );
    Ok(ParsedGltf {
        document,
        buffers,
        images,
    })
}

/// 检查必需扩展，并补齐加载选项允许缺省的部分
///
/// - `extensionsRequired` 中出现不支持的扩展时报错；已支持的扩展从列表中移除，避免二次校验
/// - 缺少 `asset` 时补上 2.0 版本
fn patch_json(path: &Path, json: &[u8]) -> AssetResult<gltf::json::Root> {
    let mut value: Value = serde_json::from_slice(json).map_err(|e| AssetError::parse(path, e))?;
    let Some(object) = value.as_object_mut() else {
        return Err(AssetError::parse(path, "top level JSON value is not an object"));
    };

    if let Some(Value::Array(required)) = object.get_mut("extensionsRequired") {
        for extension in required.iter() {
            let name = extension.as_str().unwrap_or_default();
            if !SUPPORTED_EXTENSIONS.contains(&name) {
                return Err(AssetError::UnsupportedExtension(name.to_string()));
            }
        }
        required.clear();
    }

    object.entry("asset").or_insert_with(|| serde_json::json!({ "version": "2.0" }));

    serde_json::from_value(value).map_err(|e| AssetError::parse(path, e))
}
