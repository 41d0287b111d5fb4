//! Single-line text input with horizontal scrolling.
//!
//! The buffer is UTF-8 and the cursor is a byte offset that always sits on
//! a character boundary. Display positions are tracked separately because
//! wide characters take two columns and tabs expand to the next tab stop.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use parking_lot::Mutex;
use ratatui::backend::Backend;
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Style;
use unicode_width::UnicodeWidthChar;

use super::screen::Screen;
use crate::error::IotopError;
use crate::events::KeyEvents;

/// Columns between tab stops.
const TABSTOP: usize = 8;

/// Preferred distance between the cursor and a scrolled window edge.
pub const PREFERRED_THRESHOLD: usize = 5;

const LEFT_MARKER: &str = "←";
const RIGHT_MARKER: &str = "→";

/// What a key press did to the edit session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Continue,
    Submit,
    Cancel,
}

/// Display columns taken by `c` when it starts at column `col`.
fn advance(c: char, col: usize) -> usize {
    if c == '\t' {
        TABSTOP - col % TABSTOP
    } else {
        c.width().unwrap_or(0)
    }
}

/// An editable line.
#[derive(Debug, Clone)]
pub struct LineEditor {
    text: String,
    /// Byte offset of the cursor.
    cursor: usize,
    /// Display column of the cursor.
    cursor_voffset: usize,
    /// Characters before the cursor.
    cursor_coffset: usize,
    /// First display column shown.
    line_voffset: usize,
    threshold: usize,
}

impl Default for LineEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl LineEditor {
    pub fn new() -> Self {
        Self::with_threshold(PREFERRED_THRESHOLD)
    }

    pub fn with_threshold(threshold: usize) -> Self {
        Self {
            text: String::new(),
            cursor: 0,
            cursor_voffset: 0,
            cursor_coffset: 0,
            line_voffset: 0,
            threshold,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn cursor_voffset(&self) -> usize {
        self.cursor_voffset
    }

    pub fn cursor_coffset(&self) -> usize {
        self.cursor_coffset
    }

    pub fn line_voffset(&self) -> usize {
        self.line_voffset
    }

    /// Clear the buffer and scroll state.
    pub fn reset(&mut self) {
        self.text.clear();
        self.cursor = 0;
        self.cursor_voffset = 0;
        self.cursor_coffset = 0;
        self.line_voffset = 0;
    }

    /// Place the cursor at byte offset `pos` and recompute its offsets.
    fn move_cursor_to(&mut self, pos: usize) {
        let mut voffset = 0;
        let mut coffset = 0;
        for c in self.text[..pos].chars() {
            voffset += advance(c, voffset);
            coffset += 1;
        }
        self.cursor = pos;
        self.cursor_voffset = voffset;
        self.cursor_coffset = coffset;
    }

    fn char_before_cursor(&self) -> Option<char> {
        self.text[..self.cursor].chars().next_back()
    }

    fn char_at_cursor(&self) -> Option<char> {
        self.text[self.cursor..].chars().next()
    }

    pub fn insert_char(&mut self, c: char) {
        self.text.insert(self.cursor, c);
        self.move_cursor_to(self.cursor + c.len_utf8());
    }

    /// Delete the character before the cursor.
    pub fn delete_backward(&mut self) {
        if let Some(c) = self.char_before_cursor() {
            let start = self.cursor - c.len_utf8();
            self.text.replace_range(start..self.cursor, "");
            self.move_cursor_to(start);
        }
    }

    /// Delete the character under the cursor.
    pub fn delete_forward(&mut self) {
        if let Some(c) = self.char_at_cursor() {
            let end = self.cursor + c.len_utf8();
            self.text.replace_range(self.cursor..end, "");
            self.move_cursor_to(self.cursor);
        }
    }

    pub fn delete_to_end(&mut self) {
        self.text.truncate(self.cursor);
    }

    pub fn move_left(&mut self) {
        if let Some(c) = self.char_before_cursor() {
            self.move_cursor_to(self.cursor - c.len_utf8());
        }
    }

    pub fn move_right(&mut self) {
        if let Some(c) = self.char_at_cursor() {
            self.move_cursor_to(self.cursor + c.len_utf8());
        }
    }

    pub fn move_home(&mut self) {
        self.move_cursor_to(0);
    }

    pub fn move_end(&mut self) {
        self.move_cursor_to(self.text.len());
    }

    /// Scroll so the cursor stays within the threshold of a window edge.
    pub fn adjust_voffset(&mut self, width: usize) {
        if width == 0 {
            return;
        }
        let width = width as isize;
        let half = self.threshold.min((width as usize - 1) / 2) as isize;
        let cursor = self.cursor_voffset as isize;
        let mut offset = self.line_voffset as isize;

        let limit = if offset != 0 { width - half } else { width - 1 };
        if cursor - offset >= limit {
            offset = cursor + half + 1 - width;
        }
        if offset != 0 && cursor - offset < half {
            offset = (cursor - half).max(0);
        }
        self.line_voffset = offset.max(0) as usize;
    }

    /// Cursor column relative to the visible window.
    pub fn cursor_x(&self) -> u16 {
        self.cursor_voffset.saturating_sub(self.line_voffset) as u16
    }

    fn line_width(&self) -> usize {
        self.text.chars().fold(0, |col, c| col + advance(c, col))
    }

    /// Draw the visible slice of the line into `area`'s first row.
    pub fn render(&self, area: Rect, buf: &mut Buffer) {
        let width = area.width as usize;
        if width == 0 || area.height == 0 {
            return;
        }

        let clipped_left = self.line_voffset > 0;
        let clipped_right = self.line_width() > self.line_voffset + width;
        let first = usize::from(clipped_left);
        let limit = if clipped_right { width - 1 } else { width };

        let mut col = 0;
        for c in self.text.chars() {
            let step = advance(c, col);
            let start = col;
            col += step;
            if start < self.line_voffset {
                continue;
            }
            let x = start - self.line_voffset;
            if x + step > limit {
                break;
            }
            if x < first || c == '\t' || step == 0 {
                continue;
            }
            buf.set_string(area.x + x as u16, area.y, c.to_string(), Style::default());
        }

        if clipped_left {
            buf.set_string(area.x, area.y, LEFT_MARKER, Style::default());
        }
        if clipped_right {
            buf.set_string(area.x + width as u16 - 1, area.y, RIGHT_MARKER, Style::default());
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Edit {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Enter => return Edit::Submit,
            KeyCode::Esc => return Edit::Cancel,
            KeyCode::Left => self.move_left(),
            KeyCode::Right => self.move_right(),
            KeyCode::Backspace => self.delete_backward(),
            KeyCode::Delete => self.delete_forward(),
            KeyCode::Home => self.move_home(),
            KeyCode::End => self.move_end(),
            KeyCode::Tab => self.insert_char('\t'),
            KeyCode::Char(c) if ctrl => match c {
                'b' => self.move_left(),
                'f' => self.move_right(),
                'd' => self.delete_forward(),
                'k' => self.delete_to_end(),
                'a' => self.move_home(),
                'e' => self.move_end(),
                _ => {}
            },
            KeyCode::Char(c) => self.insert_char(c),
            _ => {}
        }
        Edit::Continue
    }

    /// Read a line after `prompt`, redrawing after every key.
    ///
    /// Enter returns the typed text and Escape returns an empty string. The
    /// editor is empty again afterwards.
    pub async fn start<B: Backend>(
        &mut self,
        prompt: &str,
        screen: &Mutex<Screen<B>>,
        keys: &mut KeyEvents,
    ) -> Result<String, IotopError> {
        self.reset();
        loop {
            screen.lock().draw_prompt(prompt, self)?;
            let key = match keys.next_key().await {
                Ok(key) => key,
                Err(e) => {
                    self.reset();
                    return Err(e);
                }
            };
            match self.handle_key(key) {
                Edit::Continue => {}
                Edit::Submit => {
                    let line = std::mem::take(&mut self.text);
                    self.reset();
                    return Ok(line);
                }
                Edit::Cancel => {
                    self.reset();
                    return Ok(String::new());
                }
            }
        }
    }
}
