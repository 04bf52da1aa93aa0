mod support;

use std::fs;
use std::time::Duration;

use vivo::State;
use vivo::interpreter::console::{STDERR, STDOUT};
use vivo::render::canvas::Canvas;
use vivo::render::graphics::{Graphics, Rgba};

use support::{edit_script, rhai_interpreter, write_script};

const OLD: Duration = Duration::from_secs(60);
const BUMP: Duration = Duration::from_secs(5);

#[test]
fn sketch_draws_into_canvas() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = write_script(
        dir.path(),
        "sketch.rhai",
        r#"
            fn setup() { title("red"); }
            fn draw() {
                background(200, 0, 0);
                fill(0, 0, 255);
                rect(0, 0, 4, 4);
            }
        "#,
        OLD,
    );
    let (mut interpreter, _) = rhai_interpreter(dir.path(), &script, 30);
    let mut gfx = Canvas::new(32, 32);

    interpreter.run(&mut gfx).expect("run");
    interpreter.setup(&mut gfx);
    interpreter.update(&mut gfx);
    interpreter.draw(&mut gfx).expect("draw");

    assert_eq!(interpreter.state(), State::Running);
    assert_eq!(gfx.pixel(1, 1), Some(Rgba::opaque(0, 0, 255)));
    assert_eq!(gfx.pixel(20, 20), Some(Rgba::opaque(200, 0, 0)));
    assert_eq!(gfx.take_requests().title.as_deref(), Some("red"));
}

#[test]
fn runtime_error_is_logged_and_fixed_by_edit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = write_script(
        dir.path(),
        "sketch.rhai",
        r#"
            verbose(true);
            fn setup() { this.ready = true; }
            fn update() { throw "broken update"; }
        "#,
        OLD,
    );
    let (mut interpreter, console) = rhai_interpreter(dir.path(), &script, 1);
    let mut gfx = Canvas::new(32, 32);

    interpreter.run(&mut gfx).expect("run");
    interpreter.setup(&mut gfx);
    interpreter.update(&mut gfx);

    assert_eq!(interpreter.state(), State::Error);
    assert!(interpreter.error().expect("snapshot").message.contains("broken update"));
    let stderr = console.read(STDERR, true);
    assert!(stderr.contains("class   = RuntimeError"));
    assert!(stderr.contains("\tfrom "));

    edit_script(
        &script,
        r#"
            verbose(true);
            fn setup() { this.count = 0; }
            fn update() { this.count += 1; }
        "#,
        BUMP,
    );
    interpreter.draw(&mut gfx).expect("draw");
    assert_eq!(interpreter.state(), State::Running);
    assert!(console.read(STDOUT, true).contains("in place"));

    // The forced reload dropped the old state and ran setup again.
    interpreter.update(&mut gfx);
    let state = interpreter.engine().sketch_state().cast::<rhai::Map>();
    assert!(!state.contains_key("ready"));
    assert_eq!(state["count"].as_int(), Ok(1));
}

#[test]
fn script_formats_its_own_errors() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = write_script(
        dir.path(),
        "sketch.rhai",
        r#"
            fn process_error(message) { "sketch says: " + message }
            fn draw() { throw "bad draw"; }
        "#,
        OLD,
    );
    let (mut interpreter, _) = rhai_interpreter(dir.path(), &script, 30);
    let mut gfx = Canvas::new(32, 32);

    interpreter.run(&mut gfx).expect("run");
    interpreter.draw(&mut gfx).expect("draw");

    let message = &interpreter.error().expect("snapshot").message;
    assert!(message.starts_with("sketch says: "));
    assert!(message.contains("bad draw"));
}

#[test]
fn parse_error_on_first_load_recovers_after_edit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = write_script(dir.path(), "sketch.rhai", "fn draw( {", OLD);
    let (mut interpreter, _) = rhai_interpreter(dir.path(), &script, 1);
    let mut gfx = Canvas::new(32, 32);

    interpreter.run(&mut gfx).expect("run");
    interpreter.setup(&mut gfx);
    assert_eq!(interpreter.state(), State::Error);
    let snapshot = interpreter.error().expect("snapshot");
    assert_eq!(snapshot.failure.class_name, "ParseError");

    edit_script(
        &script,
        "fn setup() { background(0, 90, 0); } fn draw() {}",
        BUMP,
    );
    interpreter.draw(&mut gfx).expect("draw");
    assert_eq!(interpreter.state(), State::Running);

    // Setup was skipped while broken, so recovery runs it.
    assert_eq!(gfx.pixel(0, 0), Some(Rgba::opaque(0, 90, 0)));
}

#[test]
fn included_library_is_watched_and_reloaded() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_script(dir.path(), "lib.rhai", "fn shade() { 10 }", OLD);
    let script = write_script(
        dir.path(),
        "sketch.rhai",
        r#"
            include("lib.rhai");
            fn draw() { background(shade(), 0, 0); }
        "#,
        OLD,
    );
    let (mut interpreter, _) = rhai_interpreter(dir.path(), &script, 1);
    let mut gfx = Canvas::new(8, 8);

    interpreter.run(&mut gfx).expect("run");
    let lib = fs::canonicalize(dir.path().join("lib.rhai")).expect("canonicalize");
    assert_eq!(interpreter.watcher().files()[1..], [lib.clone()]);

    interpreter.draw(&mut gfx).expect("draw");
    assert_eq!(gfx.pixel(0, 0), Some(Rgba::opaque(10, 0, 0)));

    edit_script(&lib, "fn shade() { 200 }", BUMP);
    interpreter.draw(&mut gfx).expect("draw");
    interpreter.draw(&mut gfx).expect("draw");

    assert_eq!(interpreter.state(), State::Running);
    assert_eq!(gfx.pixel(0, 0), Some(Rgba::opaque(200, 0, 0)));
}

#[test]
fn oversized_window_request_is_a_script_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = write_script(
        dir.path(),
        "sketch.rhai",
        "fn draw() { size(70000, 70000); }",
        OLD,
    );
    let (mut interpreter, _) = rhai_interpreter(dir.path(), &script, 30);
    let mut gfx = Canvas::new(32, 32);

    interpreter.run(&mut gfx).expect("run");
    interpreter.draw(&mut gfx).expect("draw");

    assert_eq!(interpreter.state(), State::Error);
    let snapshot = interpreter.error().expect("snapshot");
    assert!(snapshot.message.contains("exceeds the maximum"));
    assert_eq!((gfx.width(), gfx.height()), (32, 32));
    assert!(gfx.take_requests().size.is_none());
}

#[test]
fn draw_prehook_output_does_not_leak_into_the_frame() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = write_script(
        dir.path(),
        "sketch.rhai",
        r#"
            fn shift() { translate(10, 10); }
            fn draw() {
                fill(0, 0, 255);
                rect(0, 0, 2, 2);
            }
            prehook("draw", "shift");
        "#,
        OLD,
    );
    let (mut interpreter, _) = rhai_interpreter(dir.path(), &script, 30);
    let mut gfx = Canvas::new(32, 32);

    interpreter.run(&mut gfx).expect("run");
    interpreter.draw(&mut gfx).expect("draw");

    assert_eq!(interpreter.state(), State::Running);
    assert_eq!(gfx.pixel(0, 0), Some(Rgba::opaque(0, 0, 255)));
    assert_eq!(gfx.pixel(10, 10), Some(Rgba::BLACK));
}
