//! Software-rendered demo scene
//!
//! Builds a small lit scene (floor, spinning cube, sliding skinned cube,
//! directional and point light), renders a number of frames through the
//! software device and writes the last one to a PNG.
//!
//! Usage: `umbra_demo [config.toml|config.ron] [output.png]`

use std::path::{Path, PathBuf};

use umbra_engine::animation::{AnimationClip, Bone, BoneChannel, BoneTree, Keyframe, VertexWeight};
use umbra_engine::assets::{ImportedMesh, ImportedModel, MaterialDefinitionId};
use umbra_engine::config::ConfigError;
use umbra_engine::foundation::logging;
use umbra_engine::foundation::time::Stopwatch;
use umbra_engine::prelude::*;
use umbra_engine::render::backends::software::SoftwareDevice;
use umbra_engine::render::RenderError;
use umbra_engine::scene::SceneGraph;

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;
const FRAMES: u32 = 90;

#[derive(thiserror::Error, Debug)]
enum DemoError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Viewport has no output")]
    NoOutput,
}

struct DemoApp {
    ctx: RenderContext,
    renderer: DeferredRenderer,
    scene: Scene,
    materials: MaterialLibrary,
    viewport: ViewportId,
}

impl DemoApp {
    fn new(config: &ApplicationConfig) -> Self {
        let mut ctx = RenderContext::new(Box::new(SoftwareDevice::new()));
        let mut renderer = DeferredRenderer::new(&mut ctx, config.renderer.clone());
        let mut materials = MaterialLibrary::new();
        renderer.listen_to(&mut materials);
        let viewport = renderer.register_viewport(&mut ctx, WIDTH, HEIGHT);

        let scene = Scene::new().with_timestep(config.engine.fixed_timestep);
        let mut app = Self { ctx, renderer, scene, materials, viewport };
        app.build_scene();
        app
    }

    fn build_scene(&mut self) {
        let floor_material = self
            .materials
            .add(MaterialDefinition::opaque("floor", [0.6, 0.6, 0.65, 1.0]));
        let cube_material = self
            .materials
            .add(MaterialDefinition::opaque("cube", [0.9, 0.3, 0.2, 1.0]));
        let glass_material = self
            .materials
            .add(MaterialDefinition::blended("glass", [0.3, 0.6, 1.0, 0.4]));

        let camera = self.scene.create_node("camera");
        self.scene.graph_mut().set_position(camera, Vec3::new(0.0, 2.5, 7.0));
        self.scene.graph_mut().look_at(camera, Vec3::zeros(), Vec3::y());
        self.scene.attach_camera(camera, CameraComponent::default());
        self.renderer.set_viewport_camera(self.viewport, Some(camera));

        let floor = self.scene.create_node("floor");
        self.scene.graph_mut().set_position(floor, Vec3::new(0.0, -0.5, 0.0));
        self.scene.attach_model(
            floor,
            Model::new(ModelDefinition::single_mesh("floor", MeshData::plane(5.0), floor_material)),
        );

        let spinner = self.scene.create_node("spinner");
        self.scene.graph_mut().set_position(spinner, Vec3::new(-1.2, 0.0, 0.0));
        self.scene.attach_model(
            spinner,
            Model::new(ModelDefinition::single_mesh("cube", MeshData::cube(0.5), cube_material)),
        );
        self.scene.attach_script(spinner, |node, graph: &mut SceneGraph, dt: f32| {
            if let Some(rotation) = graph.node(node).map(|n| n.rotation()) {
                let spin = Quat::from_axis_angle(&Vec3::y_axis(), dt * 1.5);
                graph.set_rotation(node, spin * rotation);
            }
        });

        let slider = self.scene.create_node("slider");
        self.scene.graph_mut().set_position(slider, Vec3::new(0.5, 0.0, 0.0));
        let slider_model = self
            .scene
            .attach_model(slider, Model::new(sliding_cube(glass_material)));
        if let Some(model) = slider_model.and_then(|id| self.scene.model_mut(id)) {
            model.play("slide", true);
        }

        let sun = self.scene.create_node("sun");
        self.scene.graph_mut().look_at(sun, Vec3::new(0.3, -1.0, -0.4), Vec3::z());
        self.scene
            .attach_light(sun, LightComponent::directional(Vec3::new(1.0, 0.95, 0.9), 0.9).with_shadows(true));

        let lamp = self.scene.create_node("lamp");
        self.scene.graph_mut().set_position(lamp, Vec3::new(1.5, 1.0, 1.5));
        self.scene
            .attach_light(lamp, LightComponent::point(Vec3::new(0.4, 0.6, 1.0), 2.0, 5.0).with_shadows(true));

        let sky = self.scene.create_node("sky");
        self.scene.attach_light(sky, LightComponent::ambient(Vec3::repeat(1.0), 0.08));
    }

    fn run(&mut self, frames: u32) -> Result<FrameStats, DemoError> {
        let step = 1.0 / 60.0;
        let mut stats = FrameStats::default();
        let stopwatch = Stopwatch::start_new();
        for frame in 0..frames {
            self.scene.update(step);
            stats = self
                .renderer
                .render_viewport(&mut self.ctx, &mut self.scene, &self.materials, self.viewport);
            let report = self.ctx.submit()?;
            if report.failed > 0 {
                log::warn!("Frame {}: {} commands failed", frame, report.failed);
            }
        }
        log::info!(
            "Rendered {} frames in {:.1} ms",
            frames,
            stopwatch.elapsed_millis()
        );
        Ok(stats)
    }

    fn save_png(&self, path: &Path) -> Result<(), DemoError> {
        let output = self.renderer.output_texture(self.viewport).ok_or(DemoError::NoOutput)?;
        let texels = self.ctx.device().read_texture(output)?;
        let to_byte = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        // Texture rows start at the bottom
        let image = image::RgbaImage::from_fn(WIDTH, HEIGHT, |x, y| {
            let [r, g, b, _] = texels[((HEIGHT - 1 - y) * WIDTH + x) as usize];
            image::Rgba([to_byte(r), to_byte(g), to_byte(b), 255])
        });
        image.save(path)?;
        Ok(())
    }

    fn shutdown(mut self) -> Result<(), DemoError> {
        self.renderer.shutdown(&self.ctx);
        self.ctx.submit()?;
        Ok(())
    }
}

/// Cube skinned to one bone that slides back and forth along x
fn sliding_cube(material: MaterialDefinitionId) -> std::sync::Arc<ModelDefinition> {
    let geometry = MeshData::cube(0.35);
    let weights = (0..geometry.vertex_count() as u32)
        .map(|vertex| VertexWeight { mesh: 0, vertex, weight: 1.0 })
        .collect();
    let mut bones = BoneTree::new();
    bones.add_bone(Bone::new("root", Mat4::identity()).with_weights(weights), None);

    let mut channel = BoneChannel::new("root");
    channel.positions = vec![
        Keyframe::new(0.0, Vec3::zeros()),
        Keyframe::new(1.0, Vec3::new(1.0, 0.0, 0.0)),
        Keyframe::new(2.0, Vec3::zeros()),
    ];
    ModelDefinition::from_import(ImportedModel {
        name: "slider".into(),
        meshes: vec![ImportedMesh { name: "body".into(), geometry, material }],
        bones,
        animations: vec![AnimationClip::new("slide", 2.0, vec![channel])],
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => ApplicationConfig::load_from_file(&path)?,
        None => ApplicationConfig::default(),
    };
    let output = PathBuf::from(args.next().unwrap_or_else(|| "umbra_demo.png".to_string()));

    logging::init_with_level(&config.engine.log_level);
    config.validate()?;
    log::info!("Starting Umbra demo ({}x{}, {} frames)", WIDTH, HEIGHT, FRAMES);

    let mut app = DemoApp::new(&config);
    let stats = app.run(FRAMES)?;
    log::info!("Last frame: {:?}", stats);

    app.save_png(&output)?;
    log::info!("Wrote {}", output.display());
    app.shutdown()?;
    Ok(())
}
