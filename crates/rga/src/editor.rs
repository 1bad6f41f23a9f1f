//! The capability surface the reconciliation layer needs from a concrete
//! editor widget. The widget itself is explicitly out of scope (spec.md
//! §1) — this module only defines what it must expose, plus a minimal
//! terminal-buffer reference implementation good enough to exercise the
//! algorithm in tests and the CLI client.

use std::sync::{Arc, Mutex};

use crate::replica::RowCol;

pub type ChangeHandler = Arc<dyn Fn() + Send + Sync>;

/// What the reconciliation layer needs from an editor widget: read/write
/// its full text, make localized insert/remove mutations, measure a line,
/// and let the reconciler install (and later detach) a callback that
/// fires whenever the user changes the text.
pub trait EditorHandle: Send + Sync {
    fn value(&self) -> String;
    fn set_value(&self, value: &str);
    fn insert(&self, at: RowCol, text: &str);
    fn remove(&self, start: RowCol, end: RowCol);
    fn line_length(&self, row: usize) -> usize;
    fn set_change_handler(&self, handler: Option<ChangeHandler>);
}

/// Byte offset of the `col`-th character in `line` (clamped to `line`'s
/// length if `col` reaches or exceeds its character count). `RowCol::col`
/// is a character count, not a byte offset (spec.md §4.5 counts
/// non-removed atoms, each an arbitrary Unicode scalar value) — indexing
/// a `String` directly by `col` would land mid-codepoint for any line
/// containing a multi-byte character.
fn char_to_byte(line: &str, col: usize) -> usize {
    line.char_indices()
        .nth(col)
        .map(|(byte, _)| byte)
        .unwrap_or(line.len())
}

/// A line-buffer editor good enough to drive from a terminal and to
/// exercise [`crate::reconcile::Reconciler`] in tests. Not a general
/// purpose editor widget.
pub struct TerminalEditor {
    lines: Mutex<Vec<String>>,
    handler: Mutex<Option<ChangeHandler>>,
}

impl TerminalEditor {
    pub fn new() -> Arc<Self> {
        Arc::new(TerminalEditor {
            lines: Mutex::new(vec![String::new()]),
            handler: Mutex::new(None),
        })
    }

    /// Apply a user edit (as if typed), then notify the reconciler exactly
    /// as a real widget's change event would.
    pub fn type_text(&self, text: &str) {
        let mut current = self.value();
        current.push_str(text);
        self.set_value(&current);
        self.notify();
    }

    fn notify(&self) {
        if let Some(handler) = self.handler.lock().unwrap().clone() {
            handler();
        }
    }
}

impl EditorHandle for TerminalEditor {
    fn value(&self) -> String {
        self.lines.lock().unwrap().join("\n")
    }

    fn set_value(&self, value: &str) {
        let lines = if value.is_empty() {
            vec![String::new()]
        } else {
            value.split('\n').map(str::to_string).collect()
        };
        *self.lines.lock().unwrap() = lines;
    }

    fn insert(&self, at: RowCol, text: &str) {
        let mut lines = self.lines.lock().unwrap();
        while lines.len() <= at.row {
            lines.push(String::new());
        }
        let mut inserted: Vec<String> = text.split('\n').map(str::to_string).collect();
        let byte_at = char_to_byte(&lines[at.row], at.col);
        let tail = lines[at.row].split_off(byte_at);
        let first = inserted.remove(0);
        lines[at.row].push_str(&first);
        if inserted.is_empty() {
            lines[at.row].push_str(&tail);
        } else {
            let last_idx = inserted.len() - 1;
            inserted[last_idx].push_str(&tail);
            for (offset, line) in inserted.into_iter().enumerate() {
                lines.insert(at.row + 1 + offset, line);
            }
        }
    }

    fn remove(&self, start: RowCol, end: RowCol) {
        let mut lines = self.lines.lock().unwrap();
        if start.row == end.row {
            let line = &mut lines[start.row];
            let start_byte = char_to_byte(line, start.col);
            let end_byte = char_to_byte(line, end.col);
            line.replace_range(start_byte..end_byte, "");
            return;
        }
        let end_byte = char_to_byte(&lines[end.row], end.col);
        let tail = lines[end.row].split_off(end_byte);
        let start_byte = char_to_byte(&lines[start.row], start.col);
        lines[start.row].truncate(start_byte);
        lines[start.row].push_str(&tail);
        lines.drain(start.row + 1..=end.row);
    }

    fn line_length(&self, row: usize) -> usize {
        self.lines.lock().unwrap().get(row).map_or(0, |l| l.chars().count())
    }

    fn set_change_handler(&self, handler: Option<ChangeHandler>) {
        *self.handler.lock().unwrap() = handler;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_splits_a_line() {
        let editor = TerminalEditor::new();
        editor.set_value("hello world");
        editor.insert(RowCol { row: 0, col: 5 }, ",");
        assert_eq!(editor.value(), "hello, world");
    }

    #[test]
    fn insert_can_introduce_a_newline() {
        let editor = TerminalEditor::new();
        editor.set_value("ab");
        editor.insert(RowCol { row: 0, col: 1 }, "\n");
        assert_eq!(editor.value(), "a\nb");
    }

    #[test]
    fn remove_spans_lines() {
        let editor = TerminalEditor::new();
        editor.set_value("ab\ncd");
        editor.remove(RowCol { row: 0, col: 1 }, RowCol { row: 1, col: 1 });
        assert_eq!(editor.value(), "ad");
    }

    #[test]
    fn insert_after_a_multibyte_character_lands_on_a_char_boundary() {
        // "café" is 4 chars / 5 bytes ('é' is 2 bytes): col=4 names the
        // position right after 'é', which is byte index 5, not 4.
        let editor = TerminalEditor::new();
        editor.set_value("café");
        editor.insert(RowCol { row: 0, col: 4 }, "!");
        assert_eq!(editor.value(), "café!");
    }

    #[test]
    fn remove_spanning_a_multibyte_character_lands_on_char_boundaries() {
        let editor = TerminalEditor::new();
        editor.set_value("café au lait");
        // Remove "é au" (chars 3..7) from "café au lait".
        editor.remove(RowCol { row: 0, col: 3 }, RowCol { row: 0, col: 7 });
        assert_eq!(editor.value(), "caf lait");
    }

    #[test]
    fn line_length_counts_characters_not_bytes() {
        let editor = TerminalEditor::new();
        editor.set_value("café");
        assert_eq!(editor.line_length(0), 4);
    }
}
