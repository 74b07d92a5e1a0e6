//! Mocap Viewer - Main Entry Point
//!
//! Loads a BVH clip, opens a window and plays the clip on a bone skeleton
//! over a textured floor.

mod cli;
mod controls;

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use mocap_animation::Evaluator;
use mocap_core::{FramePacer, Timer, ViewerConfig};
use mocap_platform::{InputContext, Window};
use mocap_renderer::Renderer;
use mocap_scene::OrbitCamera;

use crate::cli::Cli;
use crate::controls::{Action, apply_camera_input, pressed_actions};

/// Fields are declared so the renderer drops before the window.
struct App {
    config: ViewerConfig,
    evaluator: Evaluator,
    camera: OrbitCamera,
    renderer: Option<Renderer>,
    window: Option<Window>,
    input: InputContext,
    clock: Timer,
    pacer: FramePacer,
    /// First fatal error; reported as the process exit status.
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: ViewerConfig, evaluator: Evaluator) -> Self {
        let mut clock = Timer::new();
        if config.animation.start_paused {
            clock.pause();
        }
        Self {
            camera: OrbitCamera::from_config(&config.camera),
            pacer: FramePacer::new(config.render.target_fps),
            config,
            evaluator,
            renderer: None,
            window: None,
            input: InputContext::new(),
            clock,
            fatal: None,
        }
    }

    /// Stops the loop; `main` logs the error on the way out.
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        if self.fatal.is_none() {
            self.fatal = Some(err);
        }
        event_loop.exit();
    }

    fn create_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(event_loop, &self.config.window).context("creating window")?;
        let renderer = Renderer::new(&window, &self.config, self.evaluator.clip().skeleton())
            .context("creating renderer")?;
        window.register_input(&mut self.input);

        info!(
            "Initialization complete (validation {}), entering main loop",
            if renderer.validation_enabled() { "on" } else { "off" }
        );
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    /// Seconds into the clip, scaled by the playback speed.
    fn animation_time(&self) -> f32 {
        self.clock.elapsed_secs() * self.config.animation.playback_speed
    }

    /// Applies this frame's input. Returns `false` when the user asked to exit.
    fn handle_input(&mut self, id: WindowId) -> bool {
        let Some(input) = self.input.state_mut(id) else {
            return true;
        };

        let mut keep_running = true;
        for action in pressed_actions(input) {
            match action {
                Action::TogglePause => {
                    let paused = self.clock.toggle_pause();
                    info!("Playback {}", if paused { "paused" } else { "resumed" });
                }
                Action::Restart => {
                    self.clock.reset();
                    info!("Playback restarted");
                }
                Action::ToggleAxes => {
                    if let Some(renderer) = self.renderer.as_mut() {
                        renderer.set_show_axes(!renderer.show_axes());
                    }
                }
                Action::Exit => keep_running = false,
            }
        }
        apply_camera_input(input, &mut self.camera);
        input.begin_frame();
        keep_running
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop, id: WindowId) {
        if !self.handle_input(id) {
            info!("Exit requested");
            event_loop.exit();
            return;
        }

        let time = self.animation_time();
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        if let Err(e) = renderer.render_frame(&self.evaluator, time, &self.camera) {
            self.fail(event_loop, anyhow::Error::new(e).context("rendering frame"));
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none()
            && let Err(e) = self.create_window(event_loop)
        {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        self.input.handle_window_event(id, &event);

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                info!("Window resized to {}x{}", size.width, size.height);
                if let Some(window) = self.window.as_mut() {
                    window.resize(size.width, size.height);
                }
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop, id),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(window) = self.window.as_ref() else {
            return;
        };

        // Nothing to draw into; sleep until the next window event.
        if window.is_minimized() {
            event_loop.set_control_flow(ControlFlow::Wait);
            return;
        }

        if self.pacer.should_render(Instant::now()) {
            window.request_redraw();
        }
        match self.pacer.next_deadline() {
            Some(deadline) => event_loop.set_control_flow(ControlFlow::WaitUntil(deadline)),
            None => event_loop.set_control_flow(ControlFlow::Poll),
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            self.input.unregister(window.id());
        }
        self.renderer = None;
        self.window = None;
    }
}

fn load_config(cli: &Cli) -> Result<ViewerConfig> {
    let mut config = match &cli.config {
        Some(path) => ViewerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ViewerConfig::default(),
    };
    if cli.no_validation {
        config.render.validation = false;
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    let clip = mocap_resources::bvh::load(&cli.motion)
        .with_context(|| format!("loading motion {}", cli.motion.display()))?;
    info!(
        "Loaded {}: {} joints, {} frames at {:.1} Hz",
        cli.motion.display(),
        clip.skeleton().len(),
        clip.motion().frame_count(),
        clip.motion().capture_rate()
    );

    if cli.dump_skeleton {
        println!("{}", clip.skeleton_info());
        println!("{}", clip.motion_info());
        return Ok(());
    }

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config, Evaluator::new(clip));
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn main() -> Result<()> {
    mocap_core::init_logging();
    info!("Starting Mocap Viewer");

    let cli = Cli::parse();
    let result = run(cli);
    if let Err(e) = &result {
        error!("Fatal: {:#}", e);
    }
    result
}
