//! End-to-end conformance checks through the public API: bytes in via
//! the parser, state out via the screen and render frames.

use squall::input::{Modifiers, MouseButton, MouseEvent, MouseEventKind};
use squall::terminal::selection::SelectionKind;
use squall::{InputEncoder, Parser, Screen, TermEvent};

fn feed(screen: &mut Screen, bytes: &[u8]) {
    let mut parser = Parser::new();
    parser.advance(screen, bytes);
}

#[test]
fn shell_like_session_round_trip() {
    let mut screen = Screen::new(24, 80);
    feed(&mut screen, b"$ echo hello\r\nhello\r\n$ ");
    assert_eq!(screen.page_text(), "$ echo hello\nhello\n$ ");
    assert_eq!(screen.cursor_position(), (2, 2));
}

#[test]
fn vim_like_alt_screen_session() {
    let mut screen = Screen::new(10, 40);
    feed(&mut screen, b"before vim\r\n");
    // Enter alt screen, draw a status line, leave.
    feed(&mut screen, b"\x1b[?1049h\x1b[2J\x1b[10;1H-- INSERT --");
    assert_eq!(screen.line_text(9), "-- INSERT --");
    feed(&mut screen, b"\x1b[?1049l");
    assert_eq!(screen.line_text(0), "before vim");
}

#[test]
fn chunked_delivery_equals_single_write() {
    let payload: &[u8] = b"\x1b[1;31mred\x1b[0m plain \x1b]2;title\x07\x1b[38:2::1:2:3mx";
    let mut whole = Screen::new(5, 40);
    feed(&mut whole, payload);

    let mut parser = Parser::new();
    let mut chunked = Screen::new(5, 40);
    for chunk in payload.chunks(3) {
        parser.advance(&mut chunked, chunk);
    }

    assert_eq!(whole.page_text(), chunked.page_text());
    assert_eq!(whole.title(), chunked.title());
    assert_eq!(whole.cursor_position(), chunked.cursor_position());
}

#[test]
fn mouse_reporting_follows_enabled_modes() {
    let mut screen = Screen::new(24, 80);
    feed(&mut screen, b"\x1b[?1003h\x1b[?1006h");

    let press = MouseEvent {
        kind: MouseEventKind::Press,
        button: MouseButton::Left,
        mods: Modifiers::empty(),
        column: 12,
        line: 4,
    };
    assert_eq!(
        InputEncoder::encode_mouse(&press, screen.modes()),
        b"\x1b[<0;12;4M".to_vec()
    );

    feed(&mut screen, b"\x1b[?1003l\x1b[?1006l");
    assert!(InputEncoder::encode_mouse(&press, screen.modes()).is_empty());
}

#[test]
fn bracketed_paste_follows_mode() {
    let mut screen = Screen::new(24, 80);
    assert_eq!(
        InputEncoder::encode_paste("hi", screen.modes()),
        b"hi".to_vec()
    );
    feed(&mut screen, b"\x1b[?2004h");
    assert_eq!(
        InputEncoder::encode_paste("hi", screen.modes()),
        b"\x1b[200~hi\x1b[201~".to_vec()
    );
}

#[test]
fn frames_carry_title_and_bell_events() {
    let mut screen = Screen::new(4, 20);
    screen.take_render_frame();
    feed(&mut screen, b"\x07\x1b]0;demo\x07");
    let frame = screen.take_render_frame().expect("frame");
    assert!(frame.events.iter().any(|e| matches!(e, TermEvent::Bell)));
    assert!(frame
        .events
        .iter()
        .any(|e| matches!(e, TermEvent::TitleChanged { title } if title == "demo")));
}

#[test]
fn selection_extraction_spans_wrapped_lines() {
    let mut screen = Screen::new(6, 5);
    feed(&mut screen, b"Hello, World");
    screen.start_selection(SelectionKind::Linear, 0, 0);
    screen.extend_selection(2, 1);
    // The wrapped run joins without a newline.
    assert_eq!(screen.selection_text().as_deref(), Some("Hello, World"));
}

#[test]
fn resize_reflow_is_reversible() {
    let mut screen = Screen::new(6, 12);
    feed(&mut screen, b"abcdefghij klmnop");
    let before = screen.page_text();
    screen.resize(6, 7, 0, 0);
    screen.resize(6, 30, 0, 0);
    screen.resize(6, 12, 0, 0);
    assert_eq!(screen.page_text(), before);
}
