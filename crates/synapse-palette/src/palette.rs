//! Palette state: open flag, query, filtered results, selection.

use super::commands::{resolve, Command, BUILTIN_COMMANDS};

/// Command palette state machine.
///
/// Closed → Open on toggle; Open → Closed on dismiss or confirm. While
/// open, the selection index stays clamped to `[0, result_count - 1]`.
pub struct CommandPalette {
    commands: Vec<Command>,
    open: bool,
    query: String,
    results: Vec<usize>,
    selected: usize,
}

impl CommandPalette {
    pub fn new(commands: Vec<Command>) -> Self {
        Self {
            commands,
            open: false,
            query: String::new(),
            results: Vec::new(),
            selected: 0,
        }
    }

    /// Palette over the built-in command table.
    pub fn with_builtin() -> Self {
        Self::new(BUILTIN_COMMANDS.to_vec())
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// The global hotkey flips the palette open or closed.
    pub fn toggle(&mut self) {
        if self.open {
            self.dismiss();
        } else {
            self.open = true;
        }
    }

    /// Close and reset query and selection (Escape or explicit dismiss).
    pub fn dismiss(&mut self) {
        self.open = false;
        self.query.clear();
        self.results.clear();
        self.selected = 0;
    }

    /// Replace the query and re-filter.
    pub fn set_query(&mut self, query: &str) {
        self.query = query.to_string();
        self.filter();
    }

    /// Append a typed character to the query.
    pub fn append_char(&mut self, c: char) {
        self.query.push(c);
        self.filter();
    }

    /// Remove the last character from the query.
    pub fn backspace(&mut self) {
        self.query.pop();
        self.filter();
    }

    /// Move the selection down, clamped to the last result.
    pub fn select_next(&mut self) {
        if !self.results.is_empty() {
            self.selected = (self.selected + 1).min(self.results.len() - 1);
        }
    }

    /// Move the selection up, clamped to the first result.
    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    /// Activate the selected command (Enter). Returns the command and
    /// closes the palette; `None` when there is nothing to activate.
    pub fn confirm(&mut self) -> Option<Command> {
        let command = self
            .results
            .get(self.selected)
            .map(|&idx| self.commands[idx].clone());
        if command.is_some() {
            self.dismiss();
        }
        command
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    /// The commands currently matching the query, in table order.
    pub fn results(&self) -> Vec<&Command> {
        self.results.iter().map(|&idx| &self.commands[idx]).collect()
    }

    fn filter(&mut self) {
        let matches = resolve(&self.commands, &self.query);
        self.results = matches
            .into_iter()
            .map(|m| {
                self.commands
                    .iter()
                    .position(|c| c.id == m.id)
                    .unwrap_or_default()
            })
            .collect();
        self.selected = 0;
    }
}

impl Default for CommandPalette {
    fn default() -> Self {
        Self::with_builtin()
    }
}
