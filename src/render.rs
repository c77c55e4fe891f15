//! Rendering surfaces for the transcript.
//!
//! A surface is always handed whole values: the full turn list on redraw
//! and the full live text while a reply streams. Anything incremental is
//! the surface's own business.

use crate::assembler::LiveSink;
use crate::conversation::{Role, Turn};
use std::io::Write;

pub trait RenderSurface: LiveSink {
    fn redraw(&mut self, turns: &[Turn]);
}

/// Line-oriented surface for plain terminals.
///
/// Output is append-only, so the surface remembers how much it already
/// printed; repeating a redraw or a live value prints nothing new.
pub struct TerminalSurface<W: Write> {
    out: W,
    assistant_name: String,
    printed_turns: usize,
    /// Live text already on screen for the reply in progress.
    live_shown: String,
    reply_only: bool,
    echo_user: bool,
    primed: bool,
}

impl<W: Write> TerminalSurface<W> {
    pub fn new(out: W, assistant_name: impl Into<String>) -> Self {
        Self {
            out,
            assistant_name: assistant_name.into(),
            printed_turns: 0,
            live_shown: String::new(),
            reply_only: false,
            echo_user: true,
            primed: false,
        }
    }

    /// Skip every turn that already exists at the first redraw and print
    /// replies bare, without speaker labels.
    pub fn reply_only(mut self) -> Self {
        self.reply_only = true;
        self
    }

    /// Do not print user turns.
    pub fn without_user_echo(mut self) -> Self {
        self.echo_user = false;
        self
    }

    fn label(&self, role: Role) -> String {
        match role {
            Role::User => "you> ".to_string(),
            Role::Assistant => format!("{}> ", self.assistant_name.to_lowercase()),
        }
    }

    fn write_live_suffix(&mut self, text: &str) {
        if self.live_shown.is_empty() && !self.reply_only {
            let label = self.label(Role::Assistant);
            let _ = write!(self.out, "{label}");
        }
        match text.strip_prefix(self.live_shown.as_str()) {
            Some(rest) => {
                let _ = write!(self.out, "{rest}");
            }
            None => {
                // The text was replaced (an error notice); start a new line.
                let _ = write!(self.out, "\n{text}");
            }
        }
        let _ = self.out.flush();
        self.live_shown = text.to_string();
    }

    fn write_turn(&mut self, turn: &Turn) {
        if turn.role() == Role::User && !self.echo_user {
            return;
        }
        if turn.role() == Role::Assistant && !self.live_shown.is_empty() {
            let shown = std::mem::take(&mut self.live_shown);
            if turn.text() != shown {
                self.live_shown = shown;
                self.write_live_suffix(turn.text());
                self.live_shown.clear();
            }
            let _ = writeln!(self.out);
        } else if self.reply_only {
            let _ = writeln!(self.out, "{}", turn.text());
        } else {
            let label = self.label(turn.role());
            let _ = writeln!(self.out, "{label}{}", turn.text());
        }
        let _ = self.out.flush();
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> LiveSink for TerminalSurface<W> {
    fn publish(&mut self, text: &str) {
        if text == self.live_shown {
            return;
        }
        self.write_live_suffix(text);
    }
}

impl<W: Write> RenderSurface for TerminalSurface<W> {
    fn redraw(&mut self, turns: &[Turn]) {
        if self.reply_only && !self.primed {
            self.printed_turns = turns.len();
        }
        self.primed = true;

        if turns.len() <= self.printed_turns {
            return;
        }
        for turn in &turns[self.printed_turns..] {
            self.write_turn(turn);
        }
        self.printed_turns = turns.len();
    }
}
