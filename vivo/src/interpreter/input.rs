use crate::core::logging::trace;
use crate::interpreter::{Interpreter, State};
use crate::render::graphics::Graphics;
use crate::script::{Handle, ScriptEngine, Value};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

impl MouseButton {
    /// Maps the host's button numbering. Hosts only ever report 0, 1 or 2;
    /// anything else is a broken host and aborts.
    pub fn from_index(index: i32) -> Self {
        match index {
            0 => Self::Left,
            1 => Self::Middle,
            2 => Self::Right,
            other => panic!("unsupported mouse button {}", other),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Middle => "middle",
            Self::Right => "right",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PointerState {
    pub x: i32,
    pub y: i32,
    pub button: Option<MouseButton>,
    pub held: bool,
}

impl PointerState {
    fn press(&mut self, x: i32, y: i32, button: MouseButton) {
        self.x = x;
        self.y = y;
        self.button = Some(button);
        self.held = true;
    }

    /// The press to re-deliver on frames where the button stays down.
    pub fn continued_press(&self) -> Option<(i32, i32, MouseButton)> {
        match (self.held, self.button) {
            (true, Some(button)) => Some((self.x, self.y, button)),
            _ => None,
        }
    }
}

fn pointer_args(x: i32, y: i32, button: MouseButton) -> [Value; 3] {
    [Value::from(x), Value::from(y), Value::from(button.name())]
}

/// Input events. Pointer and key state is always tracked; script entry
/// points only fire while the sketch is running. A held button is
/// re-delivered to `mouse_pressed` by the draw step.
impl<E: ScriptEngine> Interpreter<E> {
    pub fn key_pressed(&mut self, key: &str, gfx: &mut dyn Graphics) {
        let repeat = self.key_held;
        self.key_held = true;
        if self.state != State::Running {
            return;
        }

        let entry = if repeat {
            self.ctx.entry_points.key_pressed.clone()
        } else {
            self.ctx.entry_points.key_down.clone()
        };
        self.deliver(entry, &[Value::from(key)], gfx);
    }

    pub fn key_released(&mut self, key: &str, gfx: &mut dyn Graphics) {
        self.key_held = false;
        if self.state != State::Running {
            return;
        }
        let entry = self.ctx.entry_points.key_up.clone();
        self.deliver(entry, &[Value::from(key)], gfx);
    }

    pub fn mouse_moved(&mut self, x: i32, y: i32, gfx: &mut dyn Graphics) {
        self.pointer.x = x;
        self.pointer.y = y;
        if self.state != State::Running {
            return;
        }
        let entry = self.ctx.entry_points.mouse_moved.clone();
        self.deliver(entry, &[Value::from(x), Value::from(y)], gfx);
    }

    pub fn mouse_dragged(
        &mut self,
        x: i32,
        y: i32,
        button: i32,
        gfx: &mut dyn Graphics,
    ) {
        let button = MouseButton::from_index(button);
        self.pointer.x = x;
        self.pointer.y = y;
        self.pointer.button = Some(button);
        if self.state != State::Running {
            return;
        }
        let entry = self.ctx.entry_points.mouse_dragged.clone();
        self.deliver(entry, &pointer_args(x, y, button), gfx);
    }

    pub fn mouse_pressed(
        &mut self,
        x: i32,
        y: i32,
        button: i32,
        gfx: &mut dyn Graphics,
    ) {
        let button = MouseButton::from_index(button);
        self.pointer.press(x, y, button);
        if self.state != State::Running {
            return;
        }
        let entry = self.ctx.entry_points.mouse_down.clone();
        self.deliver(entry, &pointer_args(x, y, button), gfx);
    }

    pub fn mouse_released(
        &mut self,
        x: i32,
        y: i32,
        button: i32,
        gfx: &mut dyn Graphics,
    ) {
        let button = MouseButton::from_index(button);
        self.pointer.x = x;
        self.pointer.y = y;
        self.pointer.held = false;
        if self.state != State::Running {
            return;
        }
        let entry = self.ctx.entry_points.mouse_up.clone();
        self.deliver(entry, &pointer_args(x, y, button), gfx);
    }

    pub fn window_resized(
        &mut self,
        width: u32,
        height: u32,
        gfx: &mut dyn Graphics,
    ) {
        if self.state != State::Running {
            return;
        }
        let entry = self.ctx.entry_points.window_resized.clone();
        self.deliver(entry, &[Value::from(width), Value::from(height)], gfx);
    }

    /// Invokes an event entry point while running; a failure moves the
    /// interpreter into its error state.
    pub(crate) fn deliver(
        &mut self,
        entry: Option<Handle>,
        args: &[Value],
        gfx: &mut dyn Graphics,
    ) {
        if self.state != State::Running {
            return;
        }
        let Some(entry) = entry else {
            return;
        };

        trace!("event -> {}", entry.name());
        self.sync_engine(gfx);
        let result = entry.invoke(args);
        self.engine.flush(gfx);
        if let Err(failure) = result {
            self.fail(failure, gfx);
        }
    }
}
