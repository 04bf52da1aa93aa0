//! The lifecycle state machine that drives a live-coded script.
//!
//! The host calls [`Interpreter::setup`] once, then [`Interpreter::update`]
//! and [`Interpreter::draw`] every frame, and [`Interpreter::exit`] on
//! shutdown. Script failures never escape: they move the interpreter into
//! [`State::Error`], where an overlay is drawn over the last good frame until
//! a reload succeeds.

pub mod console;
pub mod hooks;
pub mod input;
pub mod loader;
pub mod recovery;
pub mod watcher;

use std::path::{Path, PathBuf};

use crate::config::RuntimeConfig;
use crate::core::fatal::FatalError;
use crate::core::logging::{debug, info};
use crate::render::graphics::{Graphics, Image};
use crate::script::{FrameEnv, ScriptContext, ScriptEngine, Value};

use self::console::{Console, STDOUT};
use self::hooks::{Phase, PhaseOutcome};
use self::input::PointerState;
use self::recovery::ErrorSnapshot;
use self::watcher::ScriptWatcher;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum State {
    #[default]
    NoSketch,
    Running,
    Error,
}

pub struct Interpreter<E: ScriptEngine> {
    state: State,
    engine: E,
    ctx: ScriptContext,
    console: Console,
    watcher: ScriptWatcher,
    script_path: Option<PathBuf>,
    frame_count: u64,
    initial_width: u32,
    initial_height: u32,
    key_held: bool,
    pointer: PointerState,
    setup_done: bool,
    last_good_frame: Option<Image>,
    error: Option<ErrorSnapshot>,
}

impl<E: ScriptEngine> Interpreter<E> {
    pub fn new(engine: E, console: Console, config: &RuntimeConfig) -> Self {
        console.set_verbose(config.verbose);
        Self {
            state: State::NoSketch,
            engine,
            ctx: ScriptContext::new(config.verbose),
            console,
            watcher: ScriptWatcher::new(config.watch_interval),
            script_path: None,
            frame_count: 0,
            initial_width: config.width,
            initial_height: config.height,
            key_held: false,
            pointer: PointerState::default(),
            setup_done: false,
            last_good_frame: None,
            error: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn script_path(&self) -> Option<&Path> {
        self.script_path.as_deref()
    }

    pub fn initial_size(&self) -> (u32, u32) {
        (self.initial_width, self.initial_height)
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn watcher(&self) -> &ScriptWatcher {
        &self.watcher
    }

    pub fn error(&self) -> Option<&ErrorSnapshot> {
        self.error.as_ref()
    }

    pub fn context(&self) -> &ScriptContext {
        &self.ctx
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn pointer(&self) -> PointerState {
        self.pointer
    }

    pub fn key_held(&self) -> bool {
        self.key_held
    }

    /// Moves a loaded sketch into `Running` and evaluates it. The host
    /// calls [`Self::setup`] afterwards.
    pub fn run(&mut self, gfx: &mut dyn Graphics) -> Result<(), FatalError> {
        if self.script_path.is_none() {
            debug!("run() without a loaded script");
            return Ok(());
        }
        if self.state == State::NoSketch {
            self.state = State::Running;
        }
        self.reload(false, gfx)
    }

    /// Runs the setup phase. A forced reload that later succeeds runs it
    /// again, since the script's state was reset.
    pub fn setup(&mut self, gfx: &mut dyn Graphics) {
        self.setup_done = true;
        if self.state != State::Running {
            return;
        }
        let outcome = self.run_phase(Phase::Setup, gfx);
        self.apply(outcome, gfx);
    }

    pub fn update(&mut self, gfx: &mut dyn Graphics) {
        if self.state != State::Running {
            return;
        }

        self.sync_engine(gfx);
        if let Some(defaults) = self.ctx.entry_points.defaults.clone() {
            if let Err(failure) = defaults.invoke(&[]) {
                self.fail(failure, gfx);
                return;
            }
        }

        let outcome = self.run_phase(Phase::Update, gfx);
        self.apply(outcome, gfx);
    }

    /// Renders one frame, then counts down towards the next watch poll.
    /// Only an unreadable watched file escapes as an error.
    pub fn draw(&mut self, gfx: &mut dyn Graphics) -> Result<(), FatalError> {
        match self.state {
            State::Error => self.draw_error(gfx),
            State::Running => self.draw_running(gfx),
            State::NoSketch => {}
        }

        if self.watcher.tick() {
            self.check_watched(gfx)?;
        }
        Ok(())
    }

    /// Runs exit prehooks and the exit entry point if the sketch is running;
    /// exit posthooks always run.
    pub fn exit(&mut self, gfx: &mut dyn Graphics) {
        self.sync_engine(gfx);
        let outcome = if self.state == State::Running {
            let entry = self.ctx.entry_points.for_phase(Phase::Exit);
            self.ctx.hooks.invoke_phase(Phase::Exit, entry.as_ref(), &[], || {})
        } else {
            self.ctx.hooks.invoke_posthooks(Phase::Exit)
        };
        self.engine.flush(gfx);
        self.apply(outcome, gfx);
    }

    fn draw_error(&mut self, gfx: &mut dyn Graphics) {
        if let Some(snapshot) = &self.error {
            recovery::draw_overlay(gfx, snapshot);
        }

        self.sync_engine(gfx);
        if let Some(defaults) = self.ctx.entry_points.defaults.clone() {
            if let Err(failure) = defaults.invoke(&[]) {
                debug!("defaults failed while in error: {}", failure);
            }
        }
        self.engine.flush(gfx);
    }

    fn draw_running(&mut self, gfx: &mut dyn Graphics) {
        self.sync_engine(gfx);
        let entry = self.ctx.entry_points.for_phase(Phase::Draw);
        let engine = &mut self.engine;
        // Prehook output lands before the frame is reset.
        let outcome =
            self.ctx
                .hooks
                .invoke_phase(Phase::Draw, entry.as_ref(), &[], || {
                    engine.flush(gfx);
                    gfx.reset_frame();
                });
        self.apply(outcome, gfx);
        self.engine.flush(gfx);
        self.frame_count = self.frame_count.wrapping_add(1);

        if self.state != State::Running {
            return;
        }
        if let Some((x, y, button)) = self.pointer.continued_press() {
            let entry = self.ctx.entry_points.mouse_pressed.clone();
            let args = [Value::from(x), Value::from(y), Value::from(button.name())];
            self.deliver(entry, &args, gfx);
        }
    }

    fn check_watched(&mut self, gfx: &mut dyn Graphics) -> Result<(), FatalError> {
        for change in self.watcher.poll()? {
            let path = change.path.display().to_string();
            info!("updating {} in place", path);
            self.console.log(STDOUT, format_args!("Updating {} in place...\n", path));

            if change.index > 0 {
                if let Err(failure) =
                    self.engine.load_dependency(&change.path, &mut self.ctx)
                {
                    self.fail(failure, gfx);
                }
            }
            self.reload(false, gfx)?;
        }
        Ok(())
    }

    fn run_phase(&mut self, phase: Phase, gfx: &mut dyn Graphics) -> PhaseOutcome {
        self.sync_engine(gfx);
        let entry = self.ctx.entry_points.for_phase(phase);
        let outcome = self.ctx.hooks.invoke_phase(phase, entry.as_ref(), &[], || {});
        self.engine.flush(gfx);
        outcome
    }

    fn apply(&mut self, outcome: PhaseOutcome, gfx: &mut dyn Graphics) {
        for failure in outcome.failures {
            self.fail(failure, gfx);
        }
    }

    pub(crate) fn sync_engine(&mut self, gfx: &dyn Graphics) {
        let env = FrameEnv {
            frame_count: self.frame_count,
            width: gfx.width(),
            height: gfx.height(),
            mouse_x: self.pointer.x,
            mouse_y: self.pointer.y,
            mouse_held: self.pointer.held,
            key_held: self.key_held,
        };
        self.engine.sync(&env, &mut self.ctx);
        self.console.set_verbose(self.ctx.verbose);
    }
}
