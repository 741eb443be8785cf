use std::sync::Arc;
use std::time::Duration;

use vela_gfx::host::HostBackend;
use vela_headless_app::gltf_app::GltfApp;
use vela_render_interface::pipeline_settings::RendererSettings;
use vela_renderer::renderer::Renderer;

const TRIANGLE_GLTF: &str = r#"{
    "asset": { "version": "2.0" },
    "scene": 0,
    "scenes": [{ "nodes": [0] }],
    "nodes": [{ "name": "tri", "mesh": 0 }],
    "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 } }] }],
    "buffers": [{
        "byteLength": 36,
        "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAA"
    }],
    "bufferViews": [{ "buffer": 0, "byteLength": 36 }],
    "accessors": [{
        "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
        "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]
    }]
}"#;

#[test]
fn test_render_loaded_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tri.gltf");
    std::fs::write(&path, TRIANGLE_GLTF).unwrap();

    let host = Arc::new(HostBackend::new());
    let mut renderer = Renderer::new(host.clone(), RendererSettings::default())
        .unwrap()
        .with_fixed_step(Duration::from_millis(10));
    let mut app = GltfApp::new(&path, 3, 2);
    renderer.init_app(&mut app).unwrap();
    assert!(app.asset().is_some());

    let stats = renderer.run(&mut app, 2).unwrap();
    assert_eq!(stats.frame_id, 2);
    assert_eq!(stats.draw.draws, 1);
    assert_eq!(stats.draw.instances, 3);
    assert_eq!(host.finished_frames().len(), 2);
    assert_eq!(host.last_frame().unwrap().draws[0].instance_count, 3);
}

#[test]
fn test_missing_file_fails_init() {
    let host = Arc::new(HostBackend::new());
    let mut renderer = Renderer::new(host, RendererSettings::default()).unwrap();
    let mut app = GltfApp::new("does/not/exist.gltf", 1, 0);
    assert!(renderer.init_app(&mut app).is_err());
    assert!(renderer.scene().registry.is_empty());
}
