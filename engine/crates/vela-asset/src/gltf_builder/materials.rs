//! glTF material -> [`Material`]

use std::collections::HashSet;

use glam::{Vec2, Vec3, Vec4};
use vela_scene::material::{Material, MaterialParams, MaterialTexture, MaterialTextures, TextureTransform};
use vela_scene::resources::{MaterialHandle, SceneResources};

/// 材质句柄表：按 glTF material 下标排列，外加一个缺省材质
pub(crate) struct MaterialTable {
    pub by_index: Vec<MaterialHandle>,
    pub by_index_skinned: Vec<Option<MaterialHandle>>,
    pub default: MaterialHandle,
    pub default_skinned: Option<MaterialHandle>,
}
impl MaterialTable {
    pub fn get(&self, index: Option<usize>, skinned: bool) -> MaterialHandle {
        match (index, skinned) {
            (Some(i), true) => self.by_index_skinned.get(i).copied().flatten(),
            (None, true) => self.default_skinned,
            _ => None,
        }
        .or_else(|| index.and_then(|i| self.by_index.get(i).copied()))
        .unwrap_or(self.default)
    }
}

/// 被带骨骼的 primitive 使用的材质下标，`None` 代表缺省材质
pub(crate) fn skinned_materials(document: &gltf::Document) -> HashSet<Option<usize>> {
    let mut out = HashSet::new();
    for node in document.nodes().filter(|n| n.skin().is_some()) {
        let Some(mesh) = node.mesh() else { continue };
        for primitive in mesh.primitives() {
            if primitive.get(&gltf::Semantic::Joints(0)).is_some() {
                out.insert(primitive.material().index());
            }
        }
    }
    out
}

fn texture_transform(info: &gltf::texture::Info) -> Option<TextureTransform> {
    let transform = info.texture_transform()?;
    Some(TextureTransform {
        offset: Vec2::from(transform.offset()),
        rotation: transform.rotation(),
        scale: Vec2::from(transform.scale()),
    })
}

/// 把一个 glTF 材质转换为数值参数与贴图槽位
pub(crate) fn material_params(
    material: &gltf::Material,
    textures: &[MaterialTexture],
    normal_map_intensity: f32,
) -> (MaterialParams, MaterialTextures) {
    let pbr = material.pbr_metallic_roughness();
    let lookup = |index: usize| {
        let texture = textures.get(index).copied();
        if texture.is_none() {
            log::warn!("material `{}` references missing texture {index}", material.name().unwrap_or("?"));
        }
        texture
    };

    let diffuse_info = pbr.base_color_texture();
    let params = MaterialParams {
        base_color: Vec4::from(pbr.base_color_factor()),
        roughness: pbr.roughness_factor(),
        metallic: pbr.metallic_factor(),
        emissive_color: Vec3::from(material.emissive_factor()),
        emissive_strength: material.emissive_strength().unwrap_or(1.0),
        normal_map_intensity: material.normal_texture().map_or(normal_map_intensity, |n| n.scale() * normal_map_intensity),
        texture_transform: diffuse_info.as_ref().and_then(texture_transform),
    };
    let textures = MaterialTextures {
        diffuse: diffuse_info.and_then(|info| lookup(info.texture().index())),
        normal: material.normal_texture().and_then(|info| lookup(info.texture().index())),
        roughness_metallic: pbr.metallic_roughness_texture().and_then(|info| lookup(info.texture().index())),
        emissive: material.emissive_texture().and_then(|info| lookup(info.texture().index())),
    };
    (params, textures)
}

pub(crate) fn load_materials(
    document: &gltf::Document,
    textures: &[MaterialTexture],
    normal_map_intensity: f32,
    resources: &mut SceneResources,
    created: &mut Vec<MaterialHandle>,
) -> MaterialTable {
    let _span = tracy_client::span!("gltf::load_materials");
    let skinned = skinned_materials(document);
    let mut insert = |material: Material| {
        let handle = resources.materials.insert(material);
        created.push(handle);
        handle
    };

    let mut by_index = Vec::new();
    let mut by_index_skinned = Vec::new();
    for material in document.materials() {
        let index = material.index().unwrap_or_default();
        let name = material.name().map_or_else(|| format!("material-{index}"), str::to_string);
        let (params, maps) = material_params(&material, textures, normal_map_intensity);

        let static_material = Material::new(&name, params, maps, false);
        log::debug!("material `{name}`: {:?} {:?}", static_material.kind, static_material.features);
        by_index.push(insert(static_material));

        // 同一材质既可能用于静态 mesh 也可能用于蒙皮 mesh，蒙皮版本单独保存
        let skinned_handle = skinned
            .contains(&Some(index))
            .then(|| insert(Material::new(format!("{name}-skinned"), params, maps, true)));
        by_index_skinned.push(skinned_handle);
    }

    let default_params = MaterialParams::with_normal_map_intensity(normal_map_intensity);
    let default = insert(Material::new("default", default_params, MaterialTextures::default(), false));
    let default_skinned = skinned
        .contains(&None)
        .then(|| insert(Material::new("default-skinned", default_params, MaterialTextures::default(), true)));

    MaterialTable {
        by_index,
        by_index_skinned,
        default,
        default_skinned,
    }
}
