//! End-to-end scenarios for the screen model
//!
//! Each test feeds a byte stream through the public API and checks the
//! resulting viewport, the way a shell or full-screen program would
//! exercise the emulator.

use gridterm::buffer::{Color, ScreenBuffer};

fn viewport(buf: &ScreenBuffer) -> Vec<String> {
    buf.viewport_text()
}

#[test]
fn prompt_and_command_output() {
    let mut buf = ScreenBuffer::new(40, 6);
    buf.stdout(b"$ ls\r\nfile_a  file_b\r\n$ ");
    let lines = viewport(&buf);
    assert_eq!(lines[0], "$ ls");
    assert_eq!(lines[1], "file_a  file_b");
    assert_eq!(lines[2], "$");
    assert_eq!(buf.cursor().x, 2);
}

#[test]
fn colored_ls_output_styles_cells() {
    let mut buf = ScreenBuffer::new(40, 6);
    buf.stdout(b"\x1b[01;34mdir\x1b[0m  plain");
    let row = buf.row(0).unwrap();
    let dir_cell = row.cells[0].as_ref().unwrap();
    assert!(dir_cell.style.bold);
    assert_eq!(dir_cell.fg, Color::BLUE);
    let plain_cell = row.cells[5].as_ref().unwrap();
    assert!(!plain_cell.style.bold);
    assert_eq!(plain_cell.fg, Color::Default);
}

#[test]
fn trailing_one_selects_bright_palette_half() {
    let mut buf = ScreenBuffer::new(40, 6);
    buf.stdout(b"\x1b[34;1mX");
    let cell = buf.row(0).unwrap().cells[0].as_ref().unwrap();
    assert_eq!(cell.fg, Color::Indexed(12));
}

#[test]
fn long_line_wraps_and_survives_resize_round_trip() {
    let mut buf = ScreenBuffer::new(20, 5);
    buf.stdout(b"abcdefghijklmnopqrstuvwxyz");
    assert_eq!(viewport(&buf)[0], "abcdefghijklmnopqrst");
    assert_eq!(viewport(&buf)[1], "uvwxyz");

    buf.resize(13, 5);
    assert_eq!(viewport(&buf)[0], "abcdefghijklm");
    assert_eq!(viewport(&buf)[1], "nopqrstuvwxyz");

    buf.resize(20, 5);
    assert_eq!(viewport(&buf)[0], "abcdefghijklmnopqrst");
    assert_eq!(viewport(&buf)[1], "uvwxyz");
    assert_eq!(buf.cursor().x, 6);
}

#[test]
fn scrollback_accumulates_and_viewport_follows() {
    let mut buf = ScreenBuffer::new(20, 4);
    for i in 0..20 {
        buf.stdout(format!("line {i}\r\n").as_bytes());
    }
    // 20 printed lines plus the row the cursor sits on.
    assert_eq!(buf.total_rows(), 21);
    let lines = viewport(&buf);
    assert_eq!(lines[0], "line 17");
    assert_eq!(lines[2], "line 19");

    buf.scroll_up(5);
    assert_eq!(viewport(&buf)[0], "line 12");
    buf.scroll_down(100);
    assert_eq!(viewport(&buf)[0], "line 17");
}

#[test]
fn fullscreen_app_alt_screen_round_trip() {
    let mut buf = ScreenBuffer::new(30, 5);
    buf.stdout(b"shell history\r\n$ vim\r\n");
    // vim-style entry: save cursor, switch, clear, draw a UI.
    buf.stdout(b"\x1b[?1049h\x1b[2J\x1b[H~ editor ~");
    assert!(buf.is_alt_screen());
    assert_eq!(viewport(&buf)[0], "~ editor ~");

    // Leaving restores the shell exactly.
    buf.stdout(b"\x1b[?1049l");
    assert!(!buf.is_alt_screen());
    let lines = viewport(&buf);
    assert_eq!(lines[0], "shell history");
    assert_eq!(lines[1], "$ vim");
}

#[test]
fn progress_bar_rewrites_in_place() {
    let mut buf = ScreenBuffer::new(30, 4);
    for pct in [10, 50, 99] {
        buf.stdout(format!("\rprogress: {pct}%").as_bytes());
    }
    let lines = viewport(&buf);
    assert_eq!(lines[0], "progress: 99%");
    assert_eq!(buf.total_rows(), 4);
}

#[test]
fn clear_screen_keeps_history() {
    let mut buf = ScreenBuffer::new(20, 4);
    for i in 0..8 {
        buf.stdout(format!("old {i}\r\n").as_bytes());
    }
    let before = buf.total_rows();
    buf.stdout(b"\x1b[H\x1b[2Jfresh");
    assert_eq!(viewport(&buf)[0], "fresh");
    assert_eq!(buf.total_rows(), before);
}

#[test]
fn cursor_report_answers_on_stdin() {
    use parking_lot::Mutex;
    use std::sync::Arc;

    let mut buf = ScreenBuffer::new(30, 5);
    let replies: Arc<Mutex<Vec<u8>>> = Default::default();
    let sink = replies.clone();
    buf.on_stdin(Box::new(move |bytes| sink.lock().extend_from_slice(bytes)));

    buf.stdout(b"\x1b[3;7H\x1b[6n");
    assert_eq!(replies.lock().as_slice(), b"\x1b[3;7R");
}

#[test]
fn title_change_reaches_callback() {
    use parking_lot::Mutex;
    use std::sync::Arc;

    let mut buf = ScreenBuffer::new(30, 5);
    let titles: Arc<Mutex<Vec<String>>> = Default::default();
    let sink = titles.clone();
    buf.on_title(Box::new(move |t| sink.lock().push(t.to_string())));

    buf.stdout(b"\x1b]2;build: ok\x07");
    buf.stdout(b"\x1b]0;done\x1b\\");
    assert_eq!(titles.lock().as_slice(), ["build: ok", "done"]);
}

#[test]
fn wide_glyphs_occupy_two_columns() {
    let mut buf = ScreenBuffer::new(10, 3);
    buf.stdout("日本語".as_bytes());
    assert_eq!(buf.cursor().x, 6);
    let row = buf.row(0).unwrap();
    assert_eq!(row.cells[0].as_ref().unwrap().glyph, "日");
    assert!(row.cells[1].as_ref().unwrap().is_placeholder());
    assert_eq!(buf.snapshot().to_text().trim_end(), "日本語");
}

#[test]
fn wide_glyph_survives_collapse_to_single_column() {
    let mut buf = ScreenBuffer::new(10, 3);
    buf.stdout("中".as_bytes());
    buf.resize(1, 4);
    assert_eq!(buf.total_rows(), 4);
    let text = (0..buf.total_rows())
        .filter_map(|y| buf.row(y).map(|r| r.text()))
        .collect::<Vec<_>>()
        .join("");
    assert_eq!(text, "中");

    // The buffer keeps working at the degenerate width.
    buf.stdout(b"ab");
    assert_eq!(buf.cursor().x, 0);
}

#[test]
fn interrupted_escape_sequence_recovers() {
    let mut buf = ScreenBuffer::new(20, 3);
    // A stray ESC followed by garbage must not eat later output.
    buf.stdout(b"\x1b[99Xvisible");
    assert_eq!(viewport(&buf)[0], "visible");
}

#[test]
fn snapshot_survives_a_trip_through_disk() {
    use gridterm::buffer::RenderSnapshot;
    use std::io::Write;

    let mut buf = ScreenBuffer::new(20, 4);
    buf.stdout(b"\x1b[1;31merror:\x1b[0m boom\r\n");
    let snap = buf.snapshot();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(snap.to_json().unwrap().as_bytes()).unwrap();
    let json = std::fs::read_to_string(file.path()).unwrap();
    assert_eq!(RenderSnapshot::from_json(&json).unwrap(), snap);
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// The cursor column never escapes the grid, whatever bytes arrive.
        #[test]
        fn cursor_stays_in_bounds(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let mut buf = ScreenBuffer::new(20, 6);
            buf.stdout(&bytes);
            prop_assert!(buf.cursor().x < 20);
            prop_assert!(buf.cursor().y < buf.total_rows());
            prop_assert!(buf.total_rows() >= 6);
        }

        /// Printing ASCII text then resizing back to the original width
        /// reproduces the original viewport.
        #[test]
        fn reflow_round_trip_preserves_text(
            words in proptest::collection::vec("[a-z]{1,12}", 1..20),
            narrow in 4usize..15,
        ) {
            let mut buf = ScreenBuffer::new(30, 8);
            buf.stdout(words.join(" ").as_bytes());
            let before = buf.snapshot().to_text();
            buf.resize(narrow, 8);
            buf.resize(30, 8);
            prop_assert_eq!(buf.snapshot().to_text(), before);
        }

        /// A run of printable characters induces exactly the expected
        /// number of soft wraps.
        #[test]
        fn wrap_count_matches_length(len in 1usize..200) {
            let cols = 20;
            let mut buf = ScreenBuffer::new(cols, 6);
            buf.stdout("x".repeat(len).as_bytes());
            let wraps = (0..buf.total_rows())
                .filter(|&y| buf.row(y).map_or(false, |r| r.wrapped))
                .count();
            prop_assert_eq!(wraps, (len - 1) / cols);
        }
    }
}
