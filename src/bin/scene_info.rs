use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use clap::Parser;
use flow_scene::{
    FileImageLoader, GltfProducer, HeadlessDevice, Scene, SceneConfig,
    context::Context,
    render::{SceneRenderer, WgpuDevice},
    resources::cache::CacheKeyPolicy,
};
use log::info;

#[derive(Parser)]
#[command(name = "scene_info")]
#[command(about = "Load a glTF scene and print its resolved draw list")]
#[command(version)]
struct Cli {
    /// Input file (.gltf or .glb)
    input: PathBuf,

    /// Load every texture as <DIR>/<stem>.png instead of the path stored in the scene
    #[arg(long, value_name = "DIR")]
    textures: Option<PathBuf>,

    /// Key the texture cache by full path instead of file stem
    #[arg(long)]
    full_path_keys: bool,

    /// Upload to a GPU and render one offscreen frame
    #[arg(long)]
    gpu: bool,

    /// Save the rendered frame as a PNG (implies --gpu)
    #[arg(long, value_name = "FILE")]
    png: Option<PathBuf>,

    /// Width and height of the rendered frame
    #[arg(long, default_value_t = 800)]
    width: u32,
    #[arg(long, default_value_t = 600)]
    height: u32,
}

fn main() -> Result<()> {
    let _ = env_logger::try_init();
    let cli = Cli::parse();

    match cli.input.extension().and_then(|e| e.to_str()) {
        Some("gltf" | "glb") => {}
        _ => bail!("Unsupported file type: {}", cli.input.display()),
    }

    let producer = GltfProducer::new(&cli.input);
    let mut config = SceneConfig::from_env().with_asset_root(producer.base_dir());
    if let Some(dir) = &cli.textures {
        config = config.with_texture_dir(dir);
    }
    if cli.full_path_keys {
        config = config.with_cache_key(CacheKeyPolicy::FullPath);
    }

    if cli.gpu || cli.png.is_some() {
        render(&cli, producer, config)
    } else {
        let mut device = HeadlessDevice::new();
        let scene = Scene::load(producer, config, &FileImageLoader, &mut device)?;
        print_scene(&scene);
        Ok(())
    }
}

fn render(cli: &Cli, producer: GltfProducer, config: SceneConfig) -> Result<()> {
    let mut ctx = Context::headless([cli.width, cli.height])?;
    let mut device = WgpuDevice::new(&ctx);
    let scene = Scene::load(producer, config, &FileImageLoader, &mut device)?;
    print_scene(&scene);

    ctx.camera.camera.frame_all(&scene.aabb());
    ctx.camera.write(&ctx.queue);
    ctx.set_lights(scene.lights());

    let mut renderer = SceneRenderer::new(&ctx)?;
    scene.draw(&mut renderer);
    let recorded = renderer.render(&ctx, &device);
    info!(
        "rendered {recorded} draws with {} textures and {} meshes on the GPU",
        device.texture_count(),
        device.mesh_count()
    );

    if let Some(path) = &cli.png {
        let pixels = futures::executor::block_on(ctx.read_pixels())?;
        let [width, height] = ctx.size;
        let image = image::RgbaImage::from_raw(width, height, pixels)
            .context("readback does not match the frame size")?;
        image
            .save(path)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("frame written to {}", path.display());
    }
    Ok(())
}

fn print_scene(scene: &Scene) {
    let db = scene.database();
    let textures = scene.textures();
    println!("scene {:?}", db.name);
    println!(
        "  {} nodes, {} meshes, {} materials, {} lights",
        db.nodes().len(),
        db.meshes().len(),
        db.materials().len(),
        db.lights().len()
    );
    println!(
        "  textures: {} cached, {} loaded, {} missing",
        textures.len(),
        textures.loaded_count(),
        textures.failed_count()
    );
    for texture in textures.iter() {
        println!(
            "    {:<24} {:?} {:?} <- {}",
            texture.key,
            texture.kind,
            texture.handle,
            texture.path.display()
        );
    }
    let aabb = scene.aabb();
    if !aabb.is_empty() {
        println!("  bounds: {:?} .. {:?}", Into::<[f32; 3]>::into(aabb.min), Into::<[f32; 3]>::into(aabb.max));
    }

    println!("draw list:");
    for (i, call) in scene.draw_calls().iter().enumerate() {
        let node = scene.graph().node(call.node).map(|n| n.name.as_str()).unwrap_or("?");
        let mesh = scene.mesh(call.mesh);
        let name = mesh.map(|m| m.name.as_str()).unwrap_or("?");
        let triangles = mesh.map(|m| m.triangle_count()).unwrap_or(0);
        let slots: Vec<_> = mesh
            .map(|m| m.sampler_slots().iter().map(|s| s.uniform).collect())
            .unwrap_or_default();
        let t = call.world.w;
        println!(
            "  {i:>4}: node {:>4} {node:<20} mesh {:>4} {name:<20} {triangles:>6} tris at ({:.3}, {:.3}, {:.3}) {slots:?}",
            call.node, call.mesh, t.x, t.y, t.z
        );
    }
}
