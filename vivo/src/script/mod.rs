//! The seam between the interpreter and a scripting language.
//!
//! The interpreter only ever sees opaque [`Handle`]s to invoke, a
//! [`ScriptFailure`] when one of them raises, and a [`ScriptEngine`] that
//! evaluates source text into the shared [`ScriptContext`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::interpreter::hooks::{HookPipeline, Phase};
use crate::interpreter::loader::LoadPath;
use crate::render::graphics::Graphics;

pub mod api;
pub mod rhai_engine;

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// An error raised by script code.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ScriptFailure {
    pub class_name: String,
    pub message: String,
    /// Innermost frame first.
    pub backtrace: Vec<String>,
}

impl ScriptFailure {
    pub fn new(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            message: message.into(),
            backtrace: Vec::new(),
        }
    }

    pub fn with_backtrace(mut self, backtrace: Vec<String>) -> Self {
        self.backtrace = backtrace;
        self
    }
}

impl fmt::Display for ScriptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ScriptFailure {}

pub trait Callable {
    fn invoke(&self, args: &[Value]) -> Result<Value, ScriptFailure>;

    fn name(&self) -> &str {
        "<anonymous>"
    }
}

pub type Handle = Rc<dyn Callable>;

/// A host-side callable backed by a closure.
pub struct NativeFn<F> {
    name: String,
    f: F,
}

impl<F> Callable for NativeFn<F>
where
    F: Fn(&[Value]) -> Result<Value, ScriptFailure>,
{
    fn invoke(&self, args: &[Value]) -> Result<Value, ScriptFailure> {
        (self.f)(args)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub fn native<F>(name: impl Into<String>, f: F) -> Handle
where
    F: Fn(&[Value]) -> Result<Value, ScriptFailure> + 'static,
{
    Rc::new(NativeFn {
        name: name.into(),
        f,
    })
}

/// The per-phase and per-event entry points a script may define. Any of
/// them may be absent, in which case the interpreter skips the call.
#[derive(Clone, Default)]
pub struct EntryPoints {
    pub setup: Option<Handle>,
    pub update: Option<Handle>,
    pub draw: Option<Handle>,
    pub exit: Option<Handle>,
    pub defaults: Option<Handle>,
    pub key_down: Option<Handle>,
    pub key_pressed: Option<Handle>,
    pub key_up: Option<Handle>,
    pub mouse_moved: Option<Handle>,
    pub mouse_dragged: Option<Handle>,
    pub mouse_down: Option<Handle>,
    pub mouse_pressed: Option<Handle>,
    pub mouse_up: Option<Handle>,
    pub window_resized: Option<Handle>,
}

impl EntryPoints {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn for_phase(&self, phase: Phase) -> Option<Handle> {
        match phase {
            Phase::Setup => self.setup.clone(),
            Phase::Update => self.update.clone(),
            Phase::Draw => self.draw.clone(),
            Phase::Exit => self.exit.clone(),
        }
    }

    pub fn defined(&self) -> Vec<&str> {
        [
            &self.setup,
            &self.update,
            &self.draw,
            &self.exit,
            &self.defaults,
            &self.key_down,
            &self.key_pressed,
            &self.key_up,
            &self.mouse_moved,
            &self.mouse_dragged,
            &self.mouse_down,
            &self.mouse_pressed,
            &self.mouse_up,
            &self.window_resized,
        ]
        .into_iter()
        .flatten()
        .map(|handle| handle.name())
        .collect()
    }
}

/// State the interpreter and the engine share across evaluations.
#[derive(Clone, Default)]
pub struct ScriptContext {
    pub hooks: HookPipeline,
    pub entry_points: EntryPoints,
    pub verbose: bool,
    pub data_path: Option<PathBuf>,
    pub load_path: LoadPath,
    dependencies: Vec<PathBuf>,
}

impl ScriptContext {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            ..Self::default()
        }
    }

    /// Drops everything the script defined. Paths survive.
    pub fn reset(&mut self) {
        self.hooks.clear();
        self.entry_points.clear();
    }

    /// Records a file the script pulled in so it can be watched.
    pub fn request_dependency(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.dependencies.contains(&path) {
            self.dependencies.push(path);
        }
    }

    pub fn take_dependencies(&mut self) -> Vec<PathBuf> {
        std::mem::take(&mut self.dependencies)
    }
}

/// Per-frame facts exposed to scripts.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameEnv {
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
    pub mouse_x: i32,
    pub mouse_y: i32,
    pub mouse_held: bool,
    pub key_held: bool,
}

pub trait ScriptEngine {
    /// Evaluates `source` into the session. With `reset` set, everything
    /// previously defined is discarded first.
    fn evaluate(
        &mut self,
        source: &str,
        origin: &Path,
        reset: bool,
        ctx: &mut ScriptContext,
    ) -> Result<(), ScriptFailure>;

    /// Re-evaluates a changed dependency in place.
    fn load_dependency(
        &mut self,
        path: &Path,
        ctx: &mut ScriptContext,
    ) -> Result<(), ScriptFailure>;

    /// Turns a failure into the text shown on the error overlay.
    fn process_error(
        &mut self,
        failure: &ScriptFailure,
    ) -> Result<String, ScriptFailure> {
        Ok(failure.to_string())
    }

    /// Called before any script code runs for a phase or event.
    fn sync(&mut self, _env: &FrameEnv, _ctx: &mut ScriptContext) {}

    /// Applies whatever the script queued for the graphics layer.
    fn flush(&mut self, _gfx: &mut dyn Graphics) {}
}
