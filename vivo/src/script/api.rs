//! Functions exposed to rhai sketches.
//!
//! Drawing calls do not touch the graphics backend directly; they queue
//! [`DrawCommand`]s that the engine flushes once the phase is over.

use std::cell::RefCell;
use std::rc::Rc;

use rhai::{Dynamic, Engine, EvalAltResult, FnPtr, Position};

use crate::interpreter::console::{Console, STDOUT};
use crate::interpreter::hooks::Phase;
use crate::render::graphics::{Graphics, MAX_EXTENT, Region, Rgba};
use crate::script::FrameEnv;

type ApiResult<T> = Result<T, Box<EvalAltResult>>;

#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    Background(Rgba),
    Rect { region: Region, color: Rgba },
    Circle { x: i32, y: i32, radius: u32, color: Rgba },
    Line { from: (i32, i32), to: (i32, i32), color: Rgba },
    Text { text: String, x: i32, y: i32, color: Rgba },
    Translate(i32, i32),
    Resize(u32, u32),
    Title(String),
    Cursor(bool),
}

impl DrawCommand {
    pub fn apply(&self, gfx: &mut dyn Graphics) {
        match self {
            Self::Background(color) => gfx.clear(*color),
            Self::Rect { region, color } => gfx.fill_rect(*region, *color),
            Self::Circle {
                x,
                y,
                radius,
                color,
            } => gfx.fill_circle(*x, *y, *radius, *color),
            Self::Line { from, to, color } => gfx.draw_line(*from, *to, *color),
            Self::Text { text, x, y, color } => {
                gfx.draw_text(text, *x, *y, *color)
            }
            Self::Translate(dx, dy) => gfx.translate(*dx, *dy),
            Self::Resize(width, height) => gfx.resize(*width, *height),
            Self::Title(title) => gfx.set_title(title),
            Self::Cursor(true) => gfx.show_cursor(),
            Self::Cursor(false) => gfx.hide_cursor(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Style {
    pub fill: Rgba,
    pub stroke: Rgba,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            fill: Rgba::WHITE,
            stroke: Rgba::BLACK,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum HookKind {
    Pre,
    Post,
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct HookRequest {
    pub phase: Phase,
    pub kind: HookKind,
    pub name: String,
}

/// Registrations made by script code, applied by the engine once the code
/// returns.
#[derive(Clone, Debug, Default)]
pub struct Requests {
    pub hooks: Vec<HookRequest>,
    pub includes: Vec<String>,
    pub verbose: Option<bool>,
}

/// State shared between the registered functions and the engine.
#[derive(Debug, Default)]
pub struct ApiState {
    pub commands: Vec<DrawCommand>,
    pub style: Style,
    pub env: FrameEnv,
    pub requests: Requests,
    pub data_path: String,
    /// Set while top-level statements run; `include` is only valid then.
    pub loading: bool,
}

pub type SharedApi = Rc<RefCell<ApiState>>;

fn number(value: &Dynamic) -> ApiResult<f64> {
    if let Ok(float) = value.as_float() {
        return Ok(float);
    }
    if let Ok(int) = value.as_int() {
        return Ok(int as f64);
    }
    Err(format!("expected a number, got {}", value.type_name()).into())
}

fn coord(value: &Dynamic) -> ApiResult<i32> {
    Ok(number(value)?.round() as i32)
}

fn extent(value: &Dynamic) -> ApiResult<u32> {
    Ok(number(value)?.round().max(0.0) as u32)
}

fn window_extent(value: &Dynamic) -> ApiResult<u32> {
    let extent = extent(value)?;
    if extent > MAX_EXTENT {
        return Err(format!(
            "size() dimension {} exceeds the maximum of {}",
            extent, MAX_EXTENT
        )
        .into());
    }
    Ok(extent)
}

fn channel(value: &Dynamic) -> ApiResult<u8> {
    Ok(number(value)?.round().clamp(0.0, 255.0) as u8)
}

fn color(r: &Dynamic, g: &Dynamic, b: &Dynamic, a: u8) -> ApiResult<Rgba> {
    Ok(Rgba::new(channel(r)?, channel(g)?, channel(b)?, a))
}

fn callable_name(target: Dynamic) -> ApiResult<String> {
    if target.is_string() {
        return Ok(target.to_string());
    }
    match target.try_cast::<FnPtr>() {
        Some(pointer) => Ok(pointer.fn_name().to_string()),
        None => Err("hooks take a function name or Fn pointer".into()),
    }
}

fn hook_request(kind: HookKind, phase: &str, target: Dynamic) -> ApiResult<HookRequest> {
    let phase = phase.parse::<Phase>().map_err(Box::<EvalAltResult>::from)?;
    Ok(HookRequest {
        phase,
        kind,
        name: callable_name(target)?,
    })
}

pub fn register_api(engine: &mut Engine, api: &SharedApi, console: &Console) {
    register_output(engine, console);
    register_drawing(engine, api);
    register_window(engine, api);
    register_env(engine, api);
    register_session(engine, api);
}

fn register_output(engine: &mut Engine, console: &Console) {
    let out = console.clone();
    engine.on_print(move |text| out.write(STDOUT, &format!("{}\n", text)));

    let out = console.clone();
    engine.on_debug(move |text, source, position: Position| {
        let source = source.unwrap_or("script");
        out.write(STDOUT, &format!("[{} @ {}] {}\n", source, position, text));
    });
}

fn register_drawing(engine: &mut Engine, api: &SharedApi) {
    let state = api.clone();
    engine.register_fn(
        "background",
        move |r: Dynamic, g: Dynamic, b: Dynamic| -> ApiResult<()> {
            let color = color(&r, &g, &b, 255)?;
            state.borrow_mut().commands.push(DrawCommand::Background(color));
            Ok(())
        },
    );

    let state = api.clone();
    engine.register_fn(
        "fill",
        move |r: Dynamic, g: Dynamic, b: Dynamic| -> ApiResult<()> {
            state.borrow_mut().style.fill = color(&r, &g, &b, 255)?;
            Ok(())
        },
    );

    let state = api.clone();
    engine.register_fn(
        "fill",
        move |r: Dynamic, g: Dynamic, b: Dynamic, a: Dynamic| -> ApiResult<()> {
            state.borrow_mut().style.fill = color(&r, &g, &b, channel(&a)?)?;
            Ok(())
        },
    );

    let state = api.clone();
    engine.register_fn(
        "stroke",
        move |r: Dynamic, g: Dynamic, b: Dynamic| -> ApiResult<()> {
            state.borrow_mut().style.stroke = color(&r, &g, &b, 255)?;
            Ok(())
        },
    );

    let state = api.clone();
    engine.register_fn(
        "rect",
        move |x: Dynamic, y: Dynamic, w: Dynamic, h: Dynamic| -> ApiResult<()> {
            let region =
                Region::new(coord(&x)?, coord(&y)?, extent(&w)?, extent(&h)?);
            let mut state = state.borrow_mut();
            let color = state.style.fill;
            state.commands.push(DrawCommand::Rect { region, color });
            Ok(())
        },
    );

    let state = api.clone();
    engine.register_fn(
        "circle",
        move |x: Dynamic, y: Dynamic, radius: Dynamic| -> ApiResult<()> {
            let (x, y, radius) = (coord(&x)?, coord(&y)?, extent(&radius)?);
            let mut state = state.borrow_mut();
            let color = state.style.fill;
            state.commands.push(DrawCommand::Circle {
                x,
                y,
                radius,
                color,
            });
            Ok(())
        },
    );

    let state = api.clone();
    engine.register_fn(
        "line",
        move |x1: Dynamic, y1: Dynamic, x2: Dynamic, y2: Dynamic| -> ApiResult<()> {
            let from = (coord(&x1)?, coord(&y1)?);
            let to = (coord(&x2)?, coord(&y2)?);
            let mut state = state.borrow_mut();
            let color = state.style.stroke;
            state.commands.push(DrawCommand::Line { from, to, color });
            Ok(())
        },
    );

    let state = api.clone();
    engine.register_fn(
        "text",
        move |text: Dynamic, x: Dynamic, y: Dynamic| -> ApiResult<()> {
            let (x, y) = (coord(&x)?, coord(&y)?);
            let mut state = state.borrow_mut();
            let color = state.style.fill;
            state.commands.push(DrawCommand::Text {
                text: text.to_string(),
                x,
                y,
                color,
            });
            Ok(())
        },
    );

    let state = api.clone();
    engine.register_fn(
        "translate",
        move |dx: Dynamic, dy: Dynamic| -> ApiResult<()> {
            let command = DrawCommand::Translate(coord(&dx)?, coord(&dy)?);
            state.borrow_mut().commands.push(command);
            Ok(())
        },
    );
}

fn register_window(engine: &mut Engine, api: &SharedApi) {
    let state = api.clone();
    engine.register_fn(
        "size",
        move |width: Dynamic, height: Dynamic| -> ApiResult<()> {
            let command = DrawCommand::Resize(
                window_extent(&width)?,
                window_extent(&height)?,
            );
            state.borrow_mut().commands.push(command);
            Ok(())
        },
    );

    let state = api.clone();
    engine.register_fn("title", move |title: &str| {
        state
            .borrow_mut()
            .commands
            .push(DrawCommand::Title(title.to_string()));
    });

    let state = api.clone();
    engine.register_fn("cursor", move |visible: bool| {
        state.borrow_mut().commands.push(DrawCommand::Cursor(visible));
    });
}

fn register_env(engine: &mut Engine, api: &SharedApi) {
    let state = api.clone();
    engine.register_fn("width", move || state.borrow().env.width as i64);

    let state = api.clone();
    engine.register_fn("height", move || state.borrow().env.height as i64);

    let state = api.clone();
    engine.register_fn("frame", move || state.borrow().env.frame_count as i64);

    let state = api.clone();
    engine.register_fn("mouse_x", move || state.borrow().env.mouse_x as i64);

    let state = api.clone();
    engine.register_fn("mouse_y", move || state.borrow().env.mouse_y as i64);

    let state = api.clone();
    engine.register_fn("is_mouse_down", move || state.borrow().env.mouse_held);

    let state = api.clone();
    engine.register_fn("is_key_down", move || state.borrow().env.key_held);
}

fn register_session(engine: &mut Engine, api: &SharedApi) {
    let state = api.clone();
    engine.register_fn(
        "prehook",
        move |phase: &str, target: Dynamic| -> ApiResult<()> {
            let request = hook_request(HookKind::Pre, phase, target)?;
            state.borrow_mut().requests.hooks.push(request);
            Ok(())
        },
    );

    let state = api.clone();
    engine.register_fn(
        "posthook",
        move |phase: &str, target: Dynamic| -> ApiResult<()> {
            let request = hook_request(HookKind::Post, phase, target)?;
            state.borrow_mut().requests.hooks.push(request);
            Ok(())
        },
    );

    let state = api.clone();
    engine.register_fn("include", move |path: &str| -> ApiResult<()> {
        let mut state = state.borrow_mut();
        if !state.loading {
            return Err("include() is only allowed at the top level".into());
        }
        state.requests.includes.push(path.to_string());
        Ok(())
    });

    let state = api.clone();
    engine.register_fn("verbose", move |enabled: bool| {
        state.borrow_mut().requests.verbose = Some(enabled);
    });

    let state = api.clone();
    engine.register_fn("data_path", move || state.borrow().data_path.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::canvas::Canvas;

    fn engine_with_api() -> (Engine, SharedApi, Console) {
        let mut engine = Engine::new();
        let api = SharedApi::default();
        let console = Console::new();
        register_api(&mut engine, &api, &console);
        (engine, api, console)
    }

    #[test]
    fn drawing_calls_queue_commands_with_current_style() {
        let (engine, api, _) = engine_with_api();
        engine
            .run("background(0, 0, 0); fill(255, 0, 0, 128); rect(1, 2, 3.4, 4);")
            .expect("run");

        let state = api.borrow();
        assert_eq!(state.commands.len(), 2);
        assert_eq!(
            state.commands[1],
            DrawCommand::Rect {
                region: Region::new(1, 2, 3, 4),
                color: Rgba::new(255, 0, 0, 128),
            }
        );
    }

    #[test]
    fn non_numeric_arguments_raise() {
        let (engine, api, _) = engine_with_api();
        let err = engine.run(r#"rect("a", 0, 1, 1);"#).expect_err("should fail");
        assert!(err.to_string().contains("expected a number"));
        assert!(api.borrow().commands.is_empty());
    }

    #[test]
    fn size_rejects_dimensions_past_the_limit() {
        let (engine, api, _) = engine_with_api();
        engine.run("size(640, 480);").expect("run");
        let err = engine.run("size(70000, 70000);").expect_err("should fail");

        assert!(err.to_string().contains("exceeds the maximum"));
        assert_eq!(api.borrow().commands, vec![DrawCommand::Resize(640, 480)]);
    }

    #[test]
    fn env_reads_last_synced_frame() {
        let (engine, api, _) = engine_with_api();
        api.borrow_mut().env = FrameEnv {
            frame_count: 7,
            width: 320,
            ..FrameEnv::default()
        };
        assert_eq!(engine.eval::<i64>("frame() + width()").expect("eval"), 327);
    }

    #[test]
    fn hook_and_include_requests_are_recorded() {
        let (engine, api, _) = engine_with_api();
        api.borrow_mut().loading = true;
        engine
            .run(r#"prehook("draw", "tick"); posthook("update", Fn("tock")); include("lib.rhai");"#)
            .expect("run");

        let state = api.borrow();
        assert_eq!(
            state.requests.hooks,
            vec![
                HookRequest {
                    phase: Phase::Draw,
                    kind: HookKind::Pre,
                    name: "tick".into()
                },
                HookRequest {
                    phase: Phase::Update,
                    kind: HookKind::Post,
                    name: "tock".into()
                },
            ]
        );
        assert_eq!(state.requests.includes, vec!["lib.rhai"]);
    }

    #[test]
    fn include_outside_loading_raises() {
        let (engine, _, _) = engine_with_api();
        assert!(engine.run(r#"include("lib.rhai");"#).is_err());
        assert!(engine.run(r#"prehook("render", "x");"#).is_err());
    }

    #[test]
    fn print_goes_to_stdout_stream() {
        let (engine, _, console) = engine_with_api();
        engine.run(r#"print("hello");"#).expect("run");
        assert_eq!(console.read(STDOUT, true), "hello\n");
    }

    #[test]
    fn commands_apply_to_graphics() {
        let mut canvas = Canvas::new(4, 4);
        DrawCommand::Background(Rgba::opaque(0, 0, 255)).apply(&mut canvas);
        DrawCommand::Title("demo".into()).apply(&mut canvas);

        assert_eq!(canvas.pixel(3, 3), Some(Rgba::opaque(0, 0, 255)));
        assert_eq!(canvas.take_requests().title.as_deref(), Some("demo"));
    }
}
