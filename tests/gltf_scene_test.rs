use cgmath::Vector3;
use flow_scene::{
    FileImageLoader, GltfProducer, HeadlessDevice, Scene, SceneConfig, SceneError,
    data_structures::{
        light::{LightKind, UniformValue},
        material::{MaterialProperty, MaterialPropertyGroup, TextureKind, property_key},
    },
};

use crate::common::test_utils::CountingLoader;

mod common;

const TWO_BOXES: &str = "tests/fixtures/two_boxes.gltf";

fn load_two_boxes(device: &mut HeadlessDevice) -> Scene {
    let producer = GltfProducer::new(TWO_BOXES);
    let config = SceneConfig::default().with_asset_root(producer.base_dir());
    Scene::load(producer, config, &FileImageLoader, device).unwrap()
}

#[test]
fn shared_mesh_is_drawn_per_instance() {
    let mut device = HeadlessDevice::new();
    let scene = load_two_boxes(&mut device);

    let db = scene.database();
    assert_eq!(db.name, "two_boxes");
    assert_eq!(db.nodes().len(), 4);
    assert_eq!(db.meshes().len(), 1);
    assert_eq!(device.mesh_uploads().len(), 1);

    assert_eq!(scene.draw(&mut device), 2);
    let placed: Vec<_> = device.draws().iter().map(|d| (d.node, d.mesh, d.world.w.x)).collect();
    assert_eq!(placed, vec![(1, 0, -1.0), (2, 0, 1.0)]);
}

#[test]
fn texture_is_decoded_from_disk_once() {
    let mut device = HeadlessDevice::new();
    let scene = load_two_boxes(&mut device);

    assert_eq!(device.texture_uploads().len(), 1);
    let upload = &device.texture_uploads()[0];
    assert_eq!((upload.width, upload.height, upload.kind), (4, 4, TextureKind::BaseColor));

    let texture = scene.textures().get("checker").unwrap();
    assert!(texture.is_loaded());
    let mesh = &scene.meshes()[0];
    assert_eq!(mesh.bindings_of(TextureKind::BaseColor).next().unwrap().handle, texture.handle);
    assert_eq!(mesh.bindings().len(), 1);
}

#[test]
fn encoded_image_uri_resolves_to_the_file_on_disk() {
    let mut device = HeadlessDevice::new();
    let producer = GltfProducer::new("tests/fixtures/spaced_texture.gltf");
    let config = SceneConfig::default().with_asset_root(producer.base_dir());
    let scene = Scene::load(producer, config, &FileImageLoader, &mut device).unwrap();

    assert_eq!(scene.database().textures()[0].path, std::path::PathBuf::from("textures/checker tile.png"));
    let texture = scene.textures().get("checker tile").unwrap();
    assert!(texture.is_loaded());
    assert_eq!(device.texture_uploads().len(), 1);
}

#[test]
fn tangents_are_generated_from_uvs() {
    let mut device = HeadlessDevice::new();
    let scene = load_two_boxes(&mut device);
    for vertex in scene.meshes()[0].vertices() {
        assert_eq!(vertex.tangent, [1.0, 0.0, 0.0]);
    }
}

#[test]
fn material_properties_are_recorded() {
    let mut device = HeadlessDevice::new();
    let scene = load_two_boxes(&mut device);
    let material = &scene.database().materials()[0];
    let props = &material.properties;
    assert_eq!(material.name, "checker");
    assert_eq!(
        props.get_bool(&property_key(MaterialPropertyGroup::BaseColor, MaterialProperty::UseTexture)),
        Some(true)
    );
    assert_eq!(
        props.get_bool(&property_key(MaterialPropertyGroup::Normal, MaterialProperty::UseTexture)),
        Some(false)
    );
    assert_eq!(
        props.get_f32(&property_key(MaterialPropertyGroup::Roughness, MaterialProperty::Factor)),
        Some(0.5)
    );
}

#[test]
fn punctual_light_is_placed_in_world_space() {
    let mut device = HeadlessDevice::new();
    let scene = load_two_boxes(&mut device);

    let lights = scene.lights();
    assert_eq!(lights.len(), 1);
    assert_eq!(lights[0].kind, LightKind::Point);
    assert_eq!(lights[0].position, [-1.0, 2.0, 0.0]);
    assert_eq!(lights[0].intensity, 5.0);

    let uniforms = scene.light_uniforms();
    let names: Vec<_> = uniforms.iter().map(|u| u.name.as_str()).collect();
    assert!(names.contains(&"u_lights[0].position"));
    assert!(!names.contains(&"u_lights[0].direction"));
    let kind = uniforms.iter().find(|u| u.name == "u_lights[0].type").unwrap();
    assert_eq!(kind.value, UniformValue::Int(0));
    assert_eq!(scene.packed_lights().count, 1);
}

#[test]
fn bounds_cover_both_instances() {
    let mut device = HeadlessDevice::new();
    let scene = load_two_boxes(&mut device);
    let aabb = scene.aabb();
    assert_eq!(aabb.min, Vector3::new(-1.0, 0.0, 0.0));
    assert_eq!(aabb.max, Vector3::new(2.0, 1.0, 0.0));
}

#[test]
fn texture_folder_override_is_used() {
    let producer = GltfProducer::new(TWO_BOXES);
    let config = SceneConfig::default().with_texture_dir("elsewhere");
    let loader = CountingLoader::failing_for(&["checker"]);
    let mut device = HeadlessDevice::new();
    let scene = Scene::load(producer, config, &loader, &mut device).unwrap();

    assert_eq!(loader.requested(), vec![std::path::PathBuf::from("elsewhere/checker.png")]);
    assert_eq!(scene.textures().failed_count(), 1);
    assert_eq!(scene.draw_calls().len(), 2);
}

#[test]
fn unreadable_file_is_a_producer_error() {
    let mut device = HeadlessDevice::new();
    let result = Scene::load(
        GltfProducer::new("tests/fixtures/absent.gltf"),
        SceneConfig::default(),
        &FileImageLoader,
        &mut device,
    );
    assert!(matches!(result, Err(SceneError::Produce(_))));
}
