//! Bounded per-job log history.
//!
//! Each job owns one `LogBuffer` shared with its output reader tasks.
//! Appends evict the oldest lines once the limit is reached, so memory
//! stays bounded however chatty the wrapped tool is.

use std::collections::VecDeque;

/// Ring buffer of log lines with an optional retention limit.
///
/// A limit of `None` retains everything (the descriptor's `-1`).
#[derive(Debug)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    limit: Option<usize>,
    changed: bool,
}

impl LogBuffer {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            lines: VecDeque::new(),
            limit,
            changed: false,
        }
    }

    /// Append one line, evicting from the front when over the limit.
    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push_back(line.into());
        if let Some(limit) = self.limit {
            while self.lines.len() > limit {
                self.lines.pop_front();
            }
        }
        self.changed = true;
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Take and clear the changed flag.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    /// A window of `limit` lines starting at `offset`, clamped to the
    /// retained history.
    pub fn window(&self, offset: usize, limit: usize) -> Vec<String> {
        self.lines
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.lines.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_keeps_everything() {
        let mut buf = LogBuffer::new(None);
        for i in 0..500 {
            buf.push(format!("line {i}"));
        }
        assert_eq!(buf.len(), 500);
    }

    #[test]
    fn eviction_keeps_last_lines() {
        let mut buf = LogBuffer::new(Some(3));
        for line in ["a", "b", "c", "d"] {
            buf.push(line);
        }
        let retained: Vec<_> = buf.iter().cloned().collect();
        assert_eq!(retained, vec!["b", "c", "d"]);
    }

    #[test]
    fn retained_length_is_min_of_appended_and_limit() {
        let mut buf = LogBuffer::new(Some(10));
        buf.push("only");
        assert_eq!(buf.len(), 1);
        for i in 0..100 {
            buf.push(format!("{i}"));
        }
        assert_eq!(buf.len(), 10);
        assert_eq!(buf.iter().last().map(String::as_str), Some("99"));
    }

    #[test]
    fn window_clamps_to_history() {
        let mut buf = LogBuffer::new(None);
        for i in 0..10 {
            buf.push(format!("{i}"));
        }
        assert_eq!(buf.window(8, 5), vec!["8", "9"]);
        assert!(buf.window(20, 5).is_empty());
    }

    #[test]
    fn changed_flag_is_taken_once() {
        let mut buf = LogBuffer::new(None);
        assert!(!buf.take_changed());
        buf.push("x");
        assert!(buf.take_changed());
        assert!(!buf.take_changed());
    }
}
