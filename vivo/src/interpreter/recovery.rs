use crate::core::logging::{debug, warn};
use crate::interpreter::console::{Console, STDERR};
use crate::interpreter::{Interpreter, State};
use crate::render::graphics::{Graphics, Image, Region, Rgba};
use crate::script::{ScriptEngine, ScriptFailure};

/// What the error overlay shows until the next successful reload.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorSnapshot {
    /// Last good frame, if one was ever rendered.
    pub backdrop: Option<Image>,
    pub message: String,
    pub failure: ScriptFailure,
}

/// Asks the engine (and through it, the script) to format the failure. A
/// formatter that itself fails falls back to the failure's own text.
pub fn describe_failure<E: ScriptEngine>(
    engine: &mut E,
    failure: &ScriptFailure,
) -> String {
    match engine.process_error(failure) {
        Ok(message) => message,
        Err(err) => {
            debug!("error formatter failed: {}", err);
            failure.to_string()
        }
    }
}

pub fn log_failure(console: &Console, failure: &ScriptFailure) {
    console.log(STDERR, format_args!("class   = {}\n", failure.class_name));
    console.log(STDERR, format_args!("message = {}\n", failure.message));
    console.log(STDERR, format_args!("backtrace =\n"));
    for frame in &failure.backtrace {
        console.log(STDERR, format_args!("\tfrom {}\n", frame));
    }
}

pub fn draw_overlay(gfx: &mut dyn Graphics, snapshot: &ErrorSnapshot) {
    let width = gfx.width();
    let height = gfx.height();
    let middle = height as i32 / 2;

    if let Some(backdrop) = &snapshot.backdrop {
        gfx.draw_image(backdrop, 0, 0);
    }
    gfx.fill_rect(Region::full(width, height), Rgba::WHITE.with_alpha(128));
    gfx.fill_rect(Region::new(0, middle - 25, width, 35), Rgba::WHITE);
    gfx.draw_text(&snapshot.message, 10, middle - 10, Rgba::BLACK);
}

impl<E: ScriptEngine> Interpreter<E> {
    /// Handles a failure raised by phase or event code: a running sketch
    /// freezes the frame on screen, one already in error keeps its backdrop.
    pub(crate) fn fail(&mut self, failure: ScriptFailure, gfx: &mut dyn Graphics) {
        let backdrop = match self.state {
            State::Running => {
                Some(gfx.capture(Region::full(gfx.width(), gfx.height())))
            }
            _ => None,
        };
        self.enter_error(failure, backdrop);
    }

    /// Moves to `Error` with a fresh snapshot. Without a new backdrop the
    /// previous snapshot's image is kept.
    pub(crate) fn enter_error(
        &mut self,
        failure: ScriptFailure,
        backdrop: Option<Image>,
    ) {
        let message = describe_failure(&mut self.engine, &failure);
        log_failure(&self.console, &failure);
        warn!("{}: {}", failure.class_name, message);

        let backdrop = backdrop.or_else(|| {
            self.error
                .take()
                .and_then(|snapshot| snapshot.backdrop)
                .or_else(|| self.last_good_frame.clone())
        });

        self.state = State::Error;
        self.error = Some(ErrorSnapshot {
            backdrop,
            message,
            failure,
        });
    }

    pub(crate) fn recover(&mut self) {
        self.state = State::Running;
        self.error = None;
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::render::canvas::Canvas;
    use crate::script::ScriptContext;

    struct Formatter {
        fails: bool,
    }

    impl ScriptEngine for Formatter {
        fn evaluate(
            &mut self,
            _: &str,
            _: &Path,
            _: bool,
            _: &mut ScriptContext,
        ) -> Result<(), ScriptFailure> {
            Ok(())
        }

        fn load_dependency(
            &mut self,
            _: &Path,
            _: &mut ScriptContext,
        ) -> Result<(), ScriptFailure> {
            Ok(())
        }

        fn process_error(
            &mut self,
            failure: &ScriptFailure,
        ) -> Result<String, ScriptFailure> {
            if self.fails {
                Err(ScriptFailure::new("RuntimeError", "formatter broke"))
            } else {
                Ok(format!("[{}] {}", failure.class_name, failure.message))
            }
        }
    }

    #[test]
    fn describe_uses_formatter_then_falls_back() {
        let failure = ScriptFailure::new("ZeroDivision", "divided by 0");

        let mut engine = Formatter { fails: false };
        assert_eq!(
            describe_failure(&mut engine, &failure),
            "[ZeroDivision] divided by 0"
        );

        let mut engine = Formatter { fails: true };
        assert_eq!(describe_failure(&mut engine, &failure), "divided by 0");
    }

    #[test]
    fn verbose_failure_log_lists_frames() {
        let console = Console::new();
        console.set_verbose(true);
        let failure = ScriptFailure::new("RuntimeError", "boom")
            .with_backtrace(vec!["sketch.rhai:3:5".into(), "draw".into()]);

        log_failure(&console, &failure);
        assert_eq!(
            console.read(STDERR, true),
            "class   = RuntimeError\nmessage = boom\nbacktrace =\n\
             \tfrom sketch.rhai:3:5\n\tfrom draw\n"
        );
    }

    #[test]
    fn overlay_dims_backdrop_and_draws_bar() {
        let mut canvas = Canvas::new(100, 100);
        let snapshot = ErrorSnapshot {
            backdrop: Some(Image::new(100, 100, Rgba::BLACK)),
            message: String::new(),
            failure: ScriptFailure::new("RuntimeError", ""),
        };

        draw_overlay(&mut canvas, &snapshot);

        assert_eq!(canvas.pixel(0, 0), Some(Rgba::opaque(128, 128, 128)));
        assert_eq!(canvas.pixel(50, 25), Some(Rgba::WHITE));
        assert_eq!(canvas.pixel(99, 59), Some(Rgba::WHITE));
        assert_eq!(canvas.pixel(50, 60), Some(Rgba::opaque(128, 128, 128)));
    }
}
