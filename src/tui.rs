#![cfg(feature = "tui")]

use crate::assembler::LiveSink;
use crate::config::Config;
use crate::conversation::{Role, Turn};
use crate::render::RenderSurface;
use crate::session::ChatSession;
use anyhow::Context;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Terminal;
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Values pushed from a running reply to the UI loop.
#[derive(Debug, Clone)]
enum SurfaceMsg {
    Redraw(Vec<Turn>),
    Live(String),
    Status(String),
}

/// Forwards whole redraw/live values to the draw loop.
struct ChannelSurface {
    tx: mpsc::UnboundedSender<SurfaceMsg>,
}

impl LiveSink for ChannelSurface {
    fn publish(&mut self, text: &str) {
        let _ = self.tx.send(SurfaceMsg::Live(text.to_string()));
    }
}

impl RenderSurface for ChannelSurface {
    fn redraw(&mut self, turns: &[Turn]) {
        let _ = self.tx.send(SurfaceMsg::Redraw(turns.to_vec()));
    }
}

/// Everything the draw pass needs; replaced wholesale on each message.
struct View {
    turns: Vec<Turn>,
    live: Option<String>,
    status: Option<String>,
    input: String,
}

impl View {
    fn apply(&mut self, msg: SurfaceMsg) {
        match msg {
            SurfaceMsg::Redraw(turns) => {
                // A redraw that ends in an assistant turn commits the live text.
                if turns.last().map(Turn::role) == Some(Role::Assistant) {
                    self.live = None;
                }
                self.turns = turns;
            }
            SurfaceMsg::Live(text) => self.live = Some(text),
            SurfaceMsg::Status(text) => self.status = Some(text),
        }
    }
}

pub async fn run_tui(session: ChatSession, cfg: &Config) -> anyhow::Result<()> {
    let session = Arc::new(session);
    session.initialize();

    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("enter alt screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let (ev_tx, mut ev_rx) = mpsc::unbounded_channel::<Event>();
    std::thread::spawn(move || {
        while let Ok(ev) = crossterm::event::read() {
            if ev_tx.send(ev).is_err() {
                break;
            }
        }
    });

    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel::<SurfaceMsg>();

    let mut view = View {
        turns: session.turns(),
        live: None,
        status: Some(cfg.placeholder.clone()),
        input: String::new(),
    };
    let title = format!(
        "{} | model: {} via {}",
        cfg.assistant_name,
        session.settings().model,
        session.provider_name()
    );

    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(33));

    let res = loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = draw(&mut terminal, &title, &cfg.assistant_name, &view) {
                    break Err(e);
                }
            }
            Some(ev) = ev_rx.recv() => {
                if let Event::Key(key) = ev {
                    if handle_key(key, &mut view, &session, &ui_tx) {
                        break Ok(());
                    }
                }
            }
            Some(msg) = ui_rx.recv() => view.apply(msg),
        }
    };

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    res
}

/// Returns true when the UI should exit.
fn handle_key(
    key: KeyEvent,
    view: &mut View,
    session: &Arc<ChatSession>,
    ui_tx: &mpsc::UnboundedSender<SurfaceMsg>,
) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return true;
    }

    match key.code {
        KeyCode::Esc => return true,
        KeyCode::Char(c) => view.input.push(c),
        KeyCode::Backspace => {
            view.input.pop();
        }
        KeyCode::Enter => {
            let msg = std::mem::take(&mut view.input);
            if msg.trim() == "/quit" {
                return true;
            }
            view.status = None;

            let session = Arc::clone(session);
            let tx = ui_tx.clone();
            tokio::spawn(async move {
                let mut surface = ChannelSurface { tx: tx.clone() };
                if let Err(e) = session.submit(&msg, &mut surface).await {
                    let _ = tx.send(SurfaceMsg::Status(e.to_string()));
                }
            });
        }
        _ => {}
    }

    false
}

fn draw(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    title: &str,
    assistant_name: &str,
    view: &View,
) -> anyhow::Result<()> {
    terminal.draw(|f| {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(3)])
            .split(f.area());

        let mut text = Text::default();
        let mut push = |role: Role, body: &str| {
            let (label, style) = match role {
                Role::User => ("you".to_string(), Style::default().add_modifier(Modifier::BOLD)),
                Role::Assistant => (assistant_name.to_string(), Style::default()),
            };
            text.lines.push(Line::styled(format!("{label}: "), style));
            text.lines.extend(Text::from(body.to_string()).lines);
            text.lines.push(Line::from(""));
        };
        for t in &view.turns {
            push(t.role(), t.text());
        }
        if let Some(live) = &view.live {
            push(Role::Assistant, live);
        }

        let chat = Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL).title(title.to_string()))
            .wrap(Wrap { trim: false });

        let input_title = view.status.as_deref().unwrap_or("input");
        let input_w = Paragraph::new(view.input.clone())
            .block(Block::default().borders(Borders::ALL).title(input_title.to_string()));

        f.render_widget(chat, chunks[0]);
        f.render_widget(input_w, chunks[1]);

        let x = chunks[1].x + 1 + view.input.chars().count() as u16;
        let y = chunks[1].y + 1;
        f.set_cursor_position((x.min(chunks[1].x + chunks[1].width.saturating_sub(2)), y));
    })?;
    Ok(())
}
