use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, KeyEvent, MouseButton as WinitButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::config::RuntimeConfig;
use crate::core::logging::{debug, error, info};
use crate::interpreter::Interpreter;
use crate::interpreter::console::{STDERR, STDOUT};
use crate::render::canvas::{Canvas, WindowRequests};
use crate::render::gpu::{PresentError, Presenter};
use crate::runtime::frame_clock::FrameClock;
use crate::script::ScriptEngine;

/// Opens the window and drives `interpreter` until the window closes.
/// The script must already be loaded.
pub fn run<E: ScriptEngine>(
    config: RuntimeConfig,
    interpreter: Interpreter<E>,
) -> Result<(), String> {
    let event_loop = EventLoop::new().map_err(|err| err.to_string())?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut host = Host::new(config, interpreter);
    event_loop.run_app(&mut host).map_err(|err| err.to_string())
}

struct Host<E: ScriptEngine> {
    config: RuntimeConfig,
    interpreter: Interpreter<E>,
    canvas: Canvas,
    clock: FrameClock,
    window: Option<Arc<Window>>,
    window_id: Option<WindowId>,
    presenter: Option<Presenter>,
    cursor: (i32, i32),
    held_button: Option<i32>,
    render_requested: bool,
    last_fps_report: Instant,
    exited: bool,
}

impl<E: ScriptEngine> Host<E> {
    fn new(config: RuntimeConfig, interpreter: Interpreter<E>) -> Self {
        let (width, height) = interpreter.initial_size();
        Self {
            clock: FrameClock::new(config.fps),
            canvas: Canvas::new(width.max(1), height.max(1)),
            config,
            interpreter,
            window: None,
            window_id: None,
            presenter: None,
            cursor: (0, 0),
            held_button: None,
            render_requested: false,
            last_fps_report: Instant::now(),
            exited: false,
        }
    }

    fn init_runtime(&mut self, event_loop: &ActiveEventLoop) -> Result<(), String> {
        let (width, height) = self.interpreter.initial_size();
        let title = self.config.title.clone().unwrap_or_else(|| {
            self.interpreter
                .script_path()
                .and_then(|path| path.file_name())
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "vivo".to_string())
        });

        let attrs = WindowAttributes::default()
            .with_title(title)
            .with_inner_size(LogicalSize::new(width, height));

        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .map_err(|err| err.to_string())?,
        );

        let presenter = Presenter::new(window.clone())?;
        let size = window.inner_size();
        self.canvas.set_size(size.width.max(1), size.height.max(1));

        self.window_id = Some(window.id());
        self.window = Some(window);
        self.presenter = Some(presenter);

        if let Err(err) = self.interpreter.run(&mut self.canvas) {
            err.exit();
        }
        self.interpreter.setup(&mut self.canvas);
        self.after_script();

        Ok(())
    }

    fn render(&mut self, event_loop: &ActiveEventLoop) {
        if !self.render_requested {
            return;
        }
        self.render_requested = false;

        self.interpreter.update(&mut self.canvas);
        if let Err(err) = self.interpreter.draw(&mut self.canvas) {
            err.exit();
        }
        self.after_script();

        let Some(presenter) = self.presenter.as_mut() else {
            return;
        };
        if let Err(PresentError::OutOfMemory) = presenter.present(&self.canvas) {
            error!("surface out of memory; exiting");
            self.shutdown(event_loop);
        }
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        if let Some(presenter) = self.presenter.as_mut() {
            presenter.resize(new_size.width, new_size.height);
        }
        self.canvas.set_size(new_size.width, new_size.height);
        self.interpreter.window_resized(
            new_size.width,
            new_size.height,
            &mut self.canvas,
        );
        self.after_script();
    }

    /// Applies window requests and forwards console output.
    fn after_script(&mut self) {
        let requests = self.canvas.take_requests();
        if !requests.is_empty() {
            self.apply_requests(requests);
        }
        self.drain_console();
    }

    fn apply_requests(&mut self, requests: WindowRequests) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if let Some(title) = requests.title {
            window.set_title(&title);
        }
        if let Some((width, height)) = requests.size {
            debug!("script requested size {}x{}", width, height);
            let _ = window.request_inner_size(PhysicalSize::new(width, height));
        }
        if let Some(visible) = requests.cursor_visible {
            window.set_cursor_visible(visible);
        }
    }

    fn drain_console(&mut self) {
        let console = self.interpreter.console();
        let out = console.read(STDOUT, true);
        if !out.is_empty() {
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(out.as_bytes());
            let _ = stdout.flush();
        }
        let err = console.read(STDERR, true);
        if !err.is_empty() {
            let _ = std::io::stderr().lock().write_all(err.as_bytes());
        }
    }

    fn keyboard_input(&mut self, event: KeyEvent) {
        let Some(name) = key_name(&event.logical_key) else {
            return;
        };
        match event.state {
            ElementState::Pressed => {
                self.interpreter.key_pressed(&name, &mut self.canvas)
            }
            ElementState::Released => {
                self.interpreter.key_released(&name, &mut self.canvas)
            }
        }
        self.after_script();
    }

    fn cursor_moved(&mut self, x: i32, y: i32) {
        self.cursor = (x, y);
        match self.held_button {
            Some(button) => {
                self.interpreter.mouse_dragged(x, y, button, &mut self.canvas)
            }
            None => self.interpreter.mouse_moved(x, y, &mut self.canvas),
        }
        self.after_script();
    }

    fn mouse_input(&mut self, state: ElementState, button: WinitButton) {
        let Some(button) = button_index(button) else {
            return;
        };
        let (x, y) = self.cursor;
        match state {
            ElementState::Pressed => {
                self.held_button = Some(button);
                self.interpreter.mouse_pressed(x, y, button, &mut self.canvas);
            }
            ElementState::Released => {
                self.held_button = None;
                self.interpreter.mouse_released(x, y, button, &mut self.canvas);
            }
        }
        self.after_script();
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if !self.exited {
            self.exited = true;
            self.interpreter.exit(&mut self.canvas);
            self.drain_console();
        }
        event_loop.exit();
    }

    fn report_fps(&mut self, now: Instant) {
        if now.duration_since(self.last_fps_report).as_secs() < 5 {
            return;
        }
        self.last_fps_report = now;
        debug!(
            "frame {} at {:.1} fps",
            self.interpreter.frame_count(),
            self.clock.average_fps()
        );
    }
}

impl<E: ScriptEngine> ApplicationHandler for Host<E> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        if let Err(err) = self.init_runtime(event_loop) {
            error!("failed to initialize runtime: {}", err);
            event_loop.exit();
            return;
        }

        info!("running at {} fps", self.clock.fps());
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.window_id != Some(window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                self.shutdown(event_loop);
            }
            WindowEvent::Resized(new_size) => self.resize(new_size),
            WindowEvent::KeyboardInput { event, .. } => {
                self.keyboard_input(event)
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor_moved(position.x as i32, position.y as i32)
            }
            WindowEvent::MouseInput { state, button, .. } => {
                self.mouse_input(state, button)
            }
            WindowEvent::RedrawRequested => self.render(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exited {
            return;
        }

        let now = Instant::now();
        self.report_fps(now);

        if !self.render_requested && self.clock.tick(now) {
            self.render_requested = true;
            if let Some(window) = self.window.as_ref() {
                window.request_redraw();
            }
        }

        event_loop.set_control_flow(ControlFlow::WaitUntil(
            self.clock.next_deadline(),
        ));
    }
}

/// Host numbering for the buttons the interpreter understands.
fn button_index(button: WinitButton) -> Option<i32> {
    match button {
        WinitButton::Left => Some(0),
        WinitButton::Middle => Some(1),
        WinitButton::Right => Some(2),
        _ => None,
    }
}

fn key_name(key: &Key) -> Option<String> {
    match key {
        Key::Character(text) => Some(text.to_string()),
        Key::Named(NamedKey::Space) => Some(" ".to_string()),
        Key::Named(named) => Some(format!("{:?}", named).to_lowercase()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_primary_buttons_are_forwarded() {
        assert_eq!(button_index(WinitButton::Left), Some(0));
        assert_eq!(button_index(WinitButton::Middle), Some(1));
        assert_eq!(button_index(WinitButton::Right), Some(2));
        assert_eq!(button_index(WinitButton::Back), None);
        assert_eq!(button_index(WinitButton::Other(7)), None);
    }

    #[test]
    fn key_names_are_lowercase() {
        assert_eq!(key_name(&Key::Character("a".into())), Some("a".into()));
        assert_eq!(key_name(&Key::Named(NamedKey::Space)), Some(" ".into()));
        assert_eq!(
            key_name(&Key::Named(NamedKey::ArrowLeft)),
            Some("arrowleft".into())
        );
    }
}
