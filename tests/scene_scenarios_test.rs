use cgmath::{Matrix4, SquareMatrix, Vector3, Vector4};
use flow_scene::{
    HeadlessDevice, ROOT, Scene, SceneConfig, SceneDatabase, SceneError, SceneGraph, TextureHandle,
    data_structures::{
        database::{MeshData, NodeRecord},
        material::TextureKind,
    },
};

use crate::common::test_utils::{CountingLoader, add_textured_mesh, triangle};

mod common;

fn load(db: SceneDatabase, loader: &CountingLoader, device: &mut HeadlessDevice) -> Scene {
    Scene::from_database(db, SceneConfig::default(), loader, device).unwrap()
}

#[test]
fn siblings_sharing_a_texture_load_it_once() {
    let mut db = SceneDatabase::new("shared");
    let left = add_textured_mesh(&mut db, "left", &[(TextureKind::BaseColor, "textures/wood.png")]);
    let right = add_textured_mesh(&mut db, "right", &[(TextureKind::BaseColor, "textures/wood.png")]);
    let root = db.add_node(NodeRecord::new("root"));
    db.add_node(NodeRecord::new("l").with_parent(root).with_mesh(left));
    db.add_node(NodeRecord::new("r").with_parent(root).with_mesh(right));

    let loader = CountingLoader::new();
    let mut device = HeadlessDevice::new();
    let scene = load(db, &loader, &mut device);

    assert_eq!(scene.draw(&mut device), 2);
    assert_eq!(loader.calls(), 1);
    assert_eq!(device.texture_uploads().len(), 1);
    let draws = device.draws();
    assert_eq!(draws[0].textures, vec![TextureHandle(1)]);
    assert_eq!(draws[0].textures, draws[1].textures);
    assert_eq!((draws[0].node, draws[1].node), (1, 2));
}

#[test]
fn same_stem_in_different_folders_aliases() {
    let mut db = SceneDatabase::new("alias");
    let a = add_textured_mesh(&mut db, "a", &[(TextureKind::BaseColor, "props/crate.png")]);
    let b = add_textured_mesh(&mut db, "b", &[(TextureKind::BaseColor, "walls/crate.jpg")]);
    db.add_node(NodeRecord::new("root").with_mesh(a).with_mesh(b));

    let loader = CountingLoader::new();
    let mut device = HeadlessDevice::new();
    let scene = load(db, &loader, &mut device);

    assert_eq!(loader.calls(), 1);
    assert_eq!(scene.textures().len(), 1);
    assert_eq!(scene.mesh(a).unwrap().bindings(), scene.mesh(b).unwrap().bindings());
}

#[test]
fn translations_accumulate_through_the_chain() {
    let mut db = SceneDatabase::new("chain");
    let mesh = db.add_mesh(triangle("tri", None));
    let root = db.add_node(NodeRecord::new("root").with_translation([1.0, 0.0, 0.0]));
    let a = db.add_node(NodeRecord::new("a").with_parent(root).with_translation([0.0, 2.0, 0.0]));
    let b = db.add_node(NodeRecord::new("b").with_parent(a).with_translation([0.0, 0.0, 3.0]).with_mesh(mesh));

    let loader = CountingLoader::new();
    let mut device = HeadlessDevice::new();
    let scene = load(db, &loader, &mut device);

    let world = scene.graph().world_transform(b).unwrap();
    assert_eq!(world * Vector4::new(0.0, 0.0, 0.0, 1.0), Vector4::new(1.0, 2.0, 3.0, 1.0));

    scene.draw(&mut device);
    assert_eq!(device.draws().len(), 1);
    assert_eq!(device.draws()[0].node, b);
    assert_eq!(device.draws()[0].world.w.truncate(), Vector3::new(1.0, 2.0, 3.0));
}

#[test]
fn unset_texture_kinds_get_no_binding_and_no_slot() {
    let mut db = SceneDatabase::new("partial");
    let mesh = add_textured_mesh(&mut db, "plain", &[(TextureKind::BaseColor, "brick.png")]);
    db.add_node(NodeRecord::new("root").with_mesh(mesh));

    let loader = CountingLoader::new();
    let mut device = HeadlessDevice::new();
    let scene = load(db, &loader, &mut device);
    let record = scene.mesh(mesh).unwrap();

    assert_eq!(record.bindings_of(TextureKind::Normal).count(), 0);
    assert_eq!(record.bindings_of(TextureKind::MetalnessRoughness).count(), 0);
    let slots = record.sampler_slots();
    assert_eq!(slots.len(), 1);
    assert_eq!((slots[0].unit, slots[0].uniform), (0, "s_texBaseColor"));

    scene.draw(&mut device);
    assert_eq!(device.draws()[0].textures.len(), 1);
}

#[test]
fn bindings_follow_the_fixed_kind_order() {
    let mut db = SceneDatabase::new("order");
    let mesh = add_textured_mesh(
        &mut db,
        "full",
        &[
            (TextureKind::MetalnessRoughness, "orm.png"),
            (TextureKind::BaseColor, "albedo.png"),
            (TextureKind::Normal, "normal.png"),
        ],
    );
    db.add_node(NodeRecord::new("root").with_mesh(mesh));

    let loader = CountingLoader::new();
    let mut device = HeadlessDevice::new();
    let scene = load(db, &loader, &mut device);
    let uniforms: Vec<_> = scene.mesh(mesh).unwrap().sampler_slots().iter().map(|s| s.uniform).collect();
    assert_eq!(uniforms, vec!["s_texBaseColor", "s_texNormal", "s_texORM"]);
}

#[test]
fn missing_texture_falls_back_to_the_sentinel() {
    let mut db = SceneDatabase::new("missing");
    let a = add_textured_mesh(&mut db, "a", &[(TextureKind::BaseColor, "gone.png")]);
    let b = add_textured_mesh(&mut db, "b", &[(TextureKind::BaseColor, "gone.png")]);
    db.add_node(NodeRecord::new("root").with_mesh(a).with_mesh(b));

    let loader = CountingLoader::failing_for(&["gone"]);
    let mut device = HeadlessDevice::new();
    let scene = load(db, &loader, &mut device);

    assert_eq!(loader.calls(), 1);
    assert!(device.texture_uploads().is_empty());
    assert_eq!(scene.textures().failed_count(), 1);
    let binding = scene.mesh(a).unwrap().bindings()[0];
    assert_eq!(binding.handle, TextureHandle::MISSING);
    assert_eq!(scene.draw(&mut device), 2);
}

#[test]
fn traversal_visits_every_node_and_mesh_reference_once() {
    let mut db = SceneDatabase::new("tree");
    let m0 = db.add_mesh(triangle("m0", None));
    let m1 = db.add_mesh(triangle("m1", None));
    let root = db.add_node(NodeRecord::new("root").with_mesh(m0));
    let n1 = db.add_node(NodeRecord::new("n1").with_parent(root));
    db.add_node(NodeRecord::new("n2").with_parent(n1).with_mesh(m1).with_mesh(m0));
    db.add_node(NodeRecord::new("n3").with_parent(n1));
    let n4 = db.add_node(NodeRecord::new("n4").with_parent(root));
    db.add_node(NodeRecord::new("n5").with_parent(n4).with_mesh(m1));

    let graph = SceneGraph::from_database(&db).unwrap();
    let mut visited = Vec::new();
    graph.traverse(|node, _| visited.push(node.id));
    assert_eq!(visited, vec![0, 1, 2, 3, 4, 5]);

    let draws: Vec<_> = graph.draw_calls().iter().map(|c| (c.node, c.mesh)).collect();
    assert_eq!(draws, vec![(0, m0), (2, m1), (2, m0), (5, m1)]);

    // same tree, same order
    let again: Vec<_> = graph.draw_calls().iter().map(|c| (c.node, c.mesh)).collect();
    assert_eq!(draws, again);
}

#[test]
fn flat_pass_draws_each_mesh_once_untransformed() {
    let mut db = SceneDatabase::new("flat");
    let m0 = db.add_mesh(triangle("m0", None));
    let m1 = db.add_mesh(triangle("m1", None));
    let root = db.add_node(NodeRecord::new("root").with_scale([2.0, 2.0, 2.0]));
    db.add_node(NodeRecord::new("a").with_parent(root).with_mesh(m1).with_mesh(m1).with_mesh(m0));

    let loader = CountingLoader::new();
    let mut device = HeadlessDevice::new();
    let scene = load(db, &loader, &mut device);

    assert_eq!(scene.draw_flat(&mut device), 2);
    let flat: Vec<_> = device.draws().iter().map(|d| (d.node, d.mesh, d.world)).collect();
    assert_eq!(flat, vec![(ROOT, m0, Matrix4::identity()), (ROOT, m1, Matrix4::identity())]);
}

#[test]
fn dangling_child_aborts_with_its_id() {
    let mut db = SceneDatabase::new("broken");
    let root = db.add_node(NodeRecord::new("root"));
    db.node_mut(root).unwrap().children.push(42);

    let loader = CountingLoader::new();
    let mut device = HeadlessDevice::new();
    let err = Scene::from_database(db, SceneConfig::default(), &loader, &mut device).unwrap_err();
    assert!(matches!(err, SceneError::UnknownNode { id: 42, .. }), "{err}");
    assert_eq!(loader.calls(), 0);
}

#[test]
fn out_of_range_index_aborts_the_load() {
    let mut db = SceneDatabase::new("bad mesh");
    let mesh = db.add_mesh(MeshData {
        positions: vec![[0.0; 3]; 3],
        polygons: vec![[0, 1, 3]],
        ..MeshData::new("bad")
    });
    db.add_node(NodeRecord::new("root").with_mesh(mesh));

    let loader = CountingLoader::new();
    let mut device = HeadlessDevice::new();
    let err = Scene::from_database(db, SceneConfig::default(), &loader, &mut device).unwrap_err();
    assert!(matches!(err, SceneError::IndexOutOfRange { index: 3, .. }), "{err}");
    assert!(device.mesh_uploads().is_empty());
}

#[test]
fn zero_scale_node_is_rejected() {
    let mut db = SceneDatabase::new("flat node");
    db.add_node(NodeRecord::new("root").with_scale([1.0, 0.0, 1.0]));
    let err = SceneGraph::from_database(&db).unwrap_err();
    assert!(matches!(err, SceneError::DegenerateTransform { node: 0, .. }), "{err}");
}

#[test]
fn mesh_without_triangles_loads_and_draws_nothing() {
    let mut db = SceneDatabase::new("empty mesh");
    let empty = db.add_mesh(MeshData::new("empty"));
    db.add_node(NodeRecord::new("root").with_mesh(empty));

    let loader = CountingLoader::new();
    let mut device = HeadlessDevice::new();
    let scene = load(db, &loader, &mut device);

    assert_eq!(device.mesh_uploads()[0].buffers.index_count, 0);
    assert_eq!(scene.draw(&mut device), 1);
    assert_eq!(device.draws()[0].index_count, 0);
}
