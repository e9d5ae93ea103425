// src/session/tests.rs

use super::*;
use crate::codec::mock::FakeCodec;
use crate::geometry::Geometry;
use crate::keys::{KeySymbol, MouseButton};
use crate::pipeline::Readiness;
use crate::platform::backends::mock::{InjectedFailure, RecordingSurface};

const SCREEN: Geometry = Geometry {
    width: 640,
    height: 480,
};

fn list(sources: &[&str]) -> ImageList {
    ImageList::new(sources.iter().map(|s| s.to_string()).collect()).unwrap()
}

fn allocated_surface() -> RecordingSurface {
    let mut surface = RecordingSurface::new(SCREEN);
    surface.allocate(SCREEN).unwrap();
    surface
}

fn key(c: char) -> SurfaceEvent {
    SurfaceEvent::Key(KeySymbol::Char(c))
}

#[test]
fn emit_current_writes_exactly_the_source_line() {
    let codec = FakeCodec::new()
        .with_image("/a.jpg", 10, 10)
        .with_image("/b.jpg", 10, 10);
    let mut surface = allocated_surface();
    let mut output = Vec::new();
    {
        let mut session = Session::new(
            list(&["/a.jpg", "/b.jpg"]),
            10,
            &codec,
            &mut surface,
            &mut output,
        );
        session.render().unwrap();
        session.handle_command(Command::Next).unwrap();
        assert_eq!(session.navigator().current(), 1);
        session.handle_command(Command::EmitCurrent).unwrap();
    }
    assert_eq!(String::from_utf8(output).unwrap(), "/b.jpg\n");
}

#[test_log::test]
fn failed_decode_leaves_previous_frame_on_screen() {
    let codec = FakeCodec::new().with_image("good.png", 320, 200);
    let mut surface = allocated_surface();
    surface.push_event(key('j'));
    let mut output = Vec::new();
    let index = {
        let mut session = Session::new(
            list(&["good.png", "missing.png"]),
            10,
            &codec,
            &mut surface,
            &mut output,
        );
        session.run().unwrap();
        assert_eq!(session.pipeline().readiness(), Readiness::empty());
        session.navigator().current()
    };

    assert_eq!(index, 1);
    assert_eq!(codec.decoded(), vec!["good.png", "missing.png"]);
    assert_eq!(surface.presented().len(), 1);
    assert_eq!(surface.on_screen().unwrap().source_id, "good.png");
    assert!(output.is_empty());
}

#[test]
fn navigation_stays_usable_after_a_decode_failure() {
    let codec = FakeCodec::new()
        .with_image("/a.png", 10, 10)
        .with_image("/c.png", 10, 10);
    let mut surface = allocated_surface();
    for c in ['j', 'j', 'k', 'k'] {
        surface.push_event(key(c));
    }
    let mut output = Vec::new();
    Session::new(
        list(&["/a.png", "/b.png", "/c.png"]),
        10,
        &codec,
        &mut surface,
        &mut output,
    )
    .run()
    .unwrap();

    let shown: Vec<&str> = surface
        .presented()
        .iter()
        .map(|f| f.source_id.as_str())
        .collect();
    assert_eq!(shown, vec!["/a.png", "/c.png", "/a.png"]);
    // Revisiting decodes again; nothing is cached across indices.
    assert_eq!(codec.decodes.get(), 5);
}

#[test]
fn boundary_navigation_does_not_rerender() {
    let codec = FakeCodec::new().with_image("/a.png", 10, 10);
    let mut surface = allocated_surface();
    for event in [
        key('k'),
        SurfaceEvent::Key(KeySymbol::Home),
        key(','),
        key('['),
        key(']'),
        key('.'),
        key('j'),
    ] {
        surface.push_event(event);
    }
    let mut output = Vec::new();
    Session::new(list(&["/a.png"]), 10, &codec, &mut surface, &mut output)
        .run()
        .unwrap();
    assert_eq!(codec.decodes.get(), 1);
    assert_eq!(surface.presented().len(), 1);
}

#[test]
fn jumps_move_by_the_configured_distance() {
    let sources: Vec<String> = (0..12).map(|i| format!("/{}.png", i)).collect();
    let codec = sources
        .iter()
        .fold(FakeCodec::new(), |codec, s| codec.with_image(s, 4, 4));
    let mut surface = allocated_surface();
    let mut output = Vec::new();
    let mut session = Session::new(
        ImageList::new(sources.clone()).unwrap(),
        5,
        &codec,
        &mut surface,
        &mut output,
    );
    session.render().unwrap();
    session.handle_command(Command::JumpForward).unwrap();
    assert_eq!(session.current_source(), "/5.png");
    session.handle_command(Command::JumpForward).unwrap();
    assert_eq!(session.current_source(), "/10.png");
    // 10 + 5 is past the end: no partial advance.
    session.handle_command(Command::JumpForward).unwrap();
    assert_eq!(session.current_source(), "/10.png");
    session.handle_command(Command::First).unwrap();
    session.handle_command(Command::Last).unwrap();
    assert_eq!(session.current_source(), "/11.png");
    session.handle_command(Command::JumpBackward).unwrap();
    assert_eq!(session.current_source(), "/6.png");
}

#[test]
fn resize_rescales_without_decoding_again() {
    let codec = FakeCodec::new().with_image("/wide.png", 1280, 480);
    let mut surface = allocated_surface();
    surface.push_event(SurfaceEvent::Resized(Geometry::new(320, 480)));
    let mut output = Vec::new();
    Session::new(list(&["/wide.png"]), 10, &codec, &mut surface, &mut output)
        .run()
        .unwrap();

    assert_eq!(codec.decodes.get(), 1);
    assert_eq!(codec.scales.get(), 2);
    assert_eq!(surface.resizes, vec![Geometry::new(320, 480)]);
    let frames = surface.presented();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].size, (640, 240));
    assert_eq!(frames[1].size, (320, 120));
    assert_eq!((frames[1].placement.x, frames[1].placement.y), (0, 180));
}

#[test_log::test]
fn resize_on_an_undecodable_image_keeps_the_previous_frame() {
    let codec = FakeCodec::new().with_image("good.png", 320, 200);
    let mut surface = allocated_surface();
    surface.push_event(key('j'));
    surface.push_event(SurfaceEvent::Resized(Geometry::new(1280, 960)));
    surface.push_event(SurfaceEvent::Exposed);
    let mut output = Vec::new();
    Session::new(
        list(&["good.png", "missing.png"]),
        10,
        &codec,
        &mut surface,
        &mut output,
    )
    .run()
    .unwrap();

    // The resize retries the failed index rather than reviving the old one.
    assert_eq!(codec.decoded(), vec!["good.png", "missing.png", "missing.png"]);
    assert_eq!(surface.resizes, vec![Geometry::new(1280, 960)]);
    assert_eq!(surface.presented().len(), 1);
    assert_eq!(surface.on_screen().unwrap().source_id, "good.png");
    assert_eq!(surface.repaints, 1);
}

#[test]
fn resize_leaves_the_bound_buffer_until_the_next_present() {
    let codec = FakeCodec::new().with_image("/a.png", 10, 10);
    let mut surface = allocated_surface();
    let mut output = Vec::new();
    {
        let mut session = Session::new(
            list(&["/a.png", "/b.png"]),
            10,
            &codec,
            &mut surface,
            &mut output,
        );
        session.render().unwrap();
        session.handle_command(Command::Next).unwrap();
        session
            .handle_event(SurfaceEvent::Resized(Geometry::new(1280, 960)))
            .unwrap();
    }

    assert_eq!(surface.geometry(), Geometry::new(1280, 960));
    assert_eq!(surface.bound(), Some(SCREEN));
}

#[test]
fn expose_repaints_without_running_the_pipeline() {
    let codec = FakeCodec::new().with_image("/a.png", 10, 10);
    let mut surface = allocated_surface();
    surface.push_event(SurfaceEvent::Exposed);
    surface.push_event(SurfaceEvent::Exposed);
    let mut output = Vec::new();
    Session::new(list(&["/a.png"]), 10, &codec, &mut surface, &mut output)
        .run()
        .unwrap();
    assert_eq!(surface.repaints, 2);
    assert_eq!(surface.presented().len(), 1);
    assert_eq!(codec.decodes.get(), 1);
}

#[test]
fn quit_stops_reading_events_and_releases() {
    let codec = FakeCodec::new()
        .with_image("/a.png", 10, 10)
        .with_image("/b.png", 10, 10);
    let mut surface = allocated_surface();
    surface.push_event(SurfaceEvent::Key(KeySymbol::Escape));
    surface.push_event(key('j'));
    let mut output = Vec::new();
    Session::new(list(&["/a.png", "/b.png"]), 10, &codec, &mut surface, &mut output)
        .run()
        .unwrap();
    assert_eq!(surface.presented().len(), 1);
    assert_eq!(surface.releases, 1);
    assert!(!surface.allocated);
}

#[test]
fn mouse_buttons_step_through_the_list() {
    let codec = FakeCodec::new()
        .with_image("/a.png", 10, 10)
        .with_image("/b.png", 10, 10);
    let mut surface = allocated_surface();
    surface.push_event(SurfaceEvent::Button(MouseButton::Left));
    surface.push_event(SurfaceEvent::Button(MouseButton::Middle));
    surface.push_event(SurfaceEvent::Button(MouseButton::Right));
    let mut output = Vec::new();
    Session::new(list(&["/a.png", "/b.png"]), 10, &codec, &mut surface, &mut output)
        .run()
        .unwrap();
    let shown: Vec<usize> = surface.presented().iter().map(|f| f.index).collect();
    assert_eq!(shown, vec![0, 1, 0]);
}

#[test]
fn fullscreen_toggle_reaches_the_surface() {
    let codec = FakeCodec::new().with_image("/a.png", 10, 10);
    let mut surface = allocated_surface();
    surface.push_event(key('f'));
    surface.push_event(SurfaceEvent::Key(KeySymbol::F11));
    let mut output = Vec::new();
    Session::new(list(&["/a.png"]), 10, &codec, &mut surface, &mut output)
        .run()
        .unwrap();
    assert_eq!(surface.fullscreen_toggles, 2);
}

#[test_log::test]
fn recoverable_present_failure_keeps_the_session_alive() {
    let codec = FakeCodec::new()
        .with_image("/a.png", 10, 10)
        .with_image("/b.png", 10, 10);
    let mut surface = allocated_surface();
    surface.fail_next_present(InjectedFailure::Recoverable);
    surface.push_event(key('j'));
    let mut output = Vec::new();
    Session::new(list(&["/a.png", "/b.png"]), 10, &codec, &mut surface, &mut output)
        .run()
        .unwrap();
    assert_eq!(surface.presented().len(), 1);
    assert_eq!(surface.on_screen().unwrap().source_id, "/b.png");
}

#[test_log::test]
fn fatal_present_failure_ends_the_session() {
    let codec = FakeCodec::new()
        .with_image("/a.png", 10, 10)
        .with_image("/b.png", 10, 10);
    let mut surface = allocated_surface();
    surface.fail_next_present(InjectedFailure::Fatal);
    surface.push_event(key('j'));
    let mut output = Vec::new();
    let err = Session::new(list(&["/a.png", "/b.png"]), 10, &codec, &mut surface, &mut output)
        .run()
        .unwrap_err();
    assert!(format!("{:#}", err).contains("injected fatal present failure"));
    assert!(surface.presented().is_empty());
    assert_eq!(surface.releases, 1);
    // The queued key was never read.
    assert_eq!(surface.wait_event().unwrap(), key('j'));
}
