#![cfg(feature = "tui")]

use crate::format::{self, Glyph};
use crate::render::RenderState;
use crate::store::{ConversationStore, SessionState};
use anyhow::Context;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph, Wrap};
use ratatui::Terminal;
use std::io;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const HELP: &str = "Type a message and press Enter. Commands: /new, /clear, /quit";

pub async fn run_tui(store: ConversationStore, model: &str) -> anyhow::Result<()> {
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

    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(33));
    let mut pending: Option<JoinHandle<()>> = None;

    let res = loop {
        tokio::select! {
            _ = ticker.tick() => {
                reap_finished(&mut pending).await;
                if let Err(e) = draw(&mut terminal, model, &store.snapshot()) {
                    break Err(e);
                }
            }
            Some(ev) = ev_rx.recv() => {
                if let Event::Key(key) = ev {
                    if handle_key(key, &store, &mut pending) {
                        break Ok(());
                    }
                }
            }
        }
    };

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    res
}

/// Returns `true` when the user asked to quit.
fn handle_key(key: KeyEvent, store: &ConversationStore, pending: &mut Option<JoinHandle<()>>) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('c') => return true,
            KeyCode::Char('n') => store.reset(),
            _ => {}
        }
        return false;
    }

    match key.code {
        KeyCode::Esc => return true,
        KeyCode::Char(c) => {
            let mut input = store.snapshot().input;
            input.push(c);
            store.set_input(input);
        }
        KeyCode::Backspace => {
            let mut input = store.snapshot().input;
            input.pop();
            store.set_input(input);
        }
        KeyCode::Enter => match store.snapshot().input.trim() {
            "/quit" => return true,
            "/new" => store.reset(),
            "/clear" => store.reset_input(),
            _ => {
                // A newer submission supersedes the old one; its task winds
                // down on its own.
                if let Some(handle) = store.submit(None) {
                    *pending = Some(handle);
                }
            }
        },
        _ => {}
    }

    false
}

/// Drop the submission handle once its task is done, logging a panic.
/// Returns `true` if a handle was reaped.
async fn reap_finished(pending: &mut Option<JoinHandle<()>>) -> bool {
    if !pending.as_ref().is_some_and(|h| h.is_finished()) {
        return false;
    }
    if let Some(handle) = pending.take() {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "submission task failed");
        }
    }
    true
}

/// Markup to styled lines. Breaks and newlines both start a new line.
///
/// While `revealing`, a half-revealed tag at the end is not shown.
fn answer_text(markup: &str, revealing: bool) -> Text<'static> {
    let emphasis = Style::default().add_modifier(Modifier::BOLD);
    let mut text = Text::default();
    let mut line: Vec<Span<'static>> = Vec::new();
    let mut run = String::new();
    let mut run_emphasized = false;

    let flush_run = |line: &mut Vec<Span<'static>>, run: &mut String, emphasized: bool| {
        if !run.is_empty() {
            let content = std::mem::take(run);
            line.push(if emphasized {
                Span::styled(content, emphasis)
            } else {
                Span::raw(content)
            });
        }
    };

    let glyphs = if revealing {
        format::read_partial_markup(markup)
    } else {
        format::read_markup(markup)
    };

    for glyph in glyphs {
        match glyph {
            Glyph::Char { ch: '\n', .. } | Glyph::LineBreak => {
                flush_run(&mut line, &mut run, run_emphasized);
                text.lines.push(Line::from(std::mem::take(&mut line)));
            }
            Glyph::Char { ch, emphasized } => {
                if emphasized != run_emphasized {
                    flush_run(&mut line, &mut run, run_emphasized);
                    run_emphasized = emphasized;
                }
                run.push(ch);
            }
        }
    }
    flush_run(&mut line, &mut run, run_emphasized);
    text.lines.push(Line::from(line));
    text
}

fn status(state: &SessionState) -> &'static str {
    match (state.busy, state.render) {
        (true, _) => "thinking…",
        (false, RenderState::Revealing) => "typing…",
        _ => "ready",
    }
}

fn draw(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    model: &str,
    state: &SessionState,
) -> anyhow::Result<()> {
    terminal.draw(|f| {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(28), Constraint::Min(1)])
            .split(f.area());
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(3)])
            .split(columns[1]);

        let recent: Vec<ListItem<'_>> = state
            .history
            .iter()
            .rev()
            .map(|p| ListItem::new(p.as_str().to_string()))
            .collect();
        let history = List::new(recent).block(Block::default().borders(Borders::ALL).title("recent"));

        let body = if state.result_ready || state.busy {
            let mut text = Text::default();
            if !state.recent_prompt.is_empty() {
                text.lines.push(Line::styled(
                    format!("> {}", state.recent_prompt),
                    Style::default().add_modifier(Modifier::BOLD),
                ));
                text.lines.push(Line::from(""));
            }
            let revealing = state.render == RenderState::Revealing;
            text.lines.extend(answer_text(&state.rendered_answer, revealing).lines);
            text
        } else {
            Text::from(HELP)
        };

        let chat = Paragraph::new(body)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("gemini-chat | model: {model} | {}", status(state))),
            )
            .wrap(Wrap { trim: false });

        let input_w = Paragraph::new(state.input.clone())
            .block(Block::default().borders(Borders::ALL).title("input"));

        f.render_widget(history, columns[0]);
        f.render_widget(chat, rows[0]);
        f.render_widget(input_w, rows[1]);

        f.set_cursor_position((cursor_x(rows[1], &state.input), rows[1].y.saturating_add(1)));
    })?;
    Ok(())
}

/// Cursor column inside a bordered input box, clamped to its last cell.
fn cursor_x(area: Rect, input: &str) -> u16 {
    let typed = u16::try_from(input.chars().count()).unwrap_or(u16::MAX);
    let x = area.x.saturating_add(1).saturating_add(typed);
    x.min(area.x.saturating_add(area.width.saturating_sub(2)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_text(line: &Line<'_>) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn answer_text_splits_lines_and_bolds_emphasis() {
        let text = answer_text("a<em>b</em>c<br/>d\ne", false);
        let lines: Vec<String> = text.lines.iter().map(line_text).collect();
        assert_eq!(lines, vec!["abc", "d", "e"]);

        let first = &text.lines[0];
        assert_eq!(first.spans.len(), 3);
        assert!(first.spans[1].style.add_modifier.contains(Modifier::BOLD));
        assert!(!first.spans[0].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn half_revealed_tags_stay_hidden_while_revealing() {
        let lines = |markup: &str, revealing: bool| -> Vec<String> {
            answer_text(markup, revealing).lines.iter().map(line_text).collect()
        };

        assert_eq!(lines("a<e", true), vec!["a"]);
        assert_eq!(lines("a<em>b</e", true), vec!["ab"]);
        assert_eq!(lines("a<br", true), vec!["a"]);
        assert_eq!(lines("a<e", false), vec!["a<e"]);
    }

    #[test]
    fn cursor_stays_inside_the_input_box() {
        let area = Rect::new(28, 20, 40, 3);
        assert_eq!(cursor_x(area, ""), 29);
        assert_eq!(cursor_x(area, "abc"), 32);
        assert_eq!(cursor_x(area, &"x".repeat(100_000)), 66);

        let edge = Rect::new(u16::MAX - 4, 0, 4, 3);
        assert_eq!(cursor_x(edge, &"x".repeat(70_000)), u16::MAX - 2);
    }

    #[tokio::test]
    async fn finished_submissions_are_reaped_and_running_ones_kept() {
        let mut pending = None;
        assert!(!reap_finished(&mut pending).await);

        let (release, wait) = tokio::sync::oneshot::channel::<()>();
        pending = Some(tokio::spawn(async move {
            let _ = wait.await;
        }));
        assert!(!reap_finished(&mut pending).await);
        assert!(pending.is_some());

        release.send(()).unwrap();
        while !pending.as_ref().unwrap().is_finished() {
            tokio::task::yield_now().await;
        }
        assert!(reap_finished(&mut pending).await);
        assert!(pending.is_none());

        pending = Some(tokio::spawn(async { panic!("submission blew up") }));
        while !pending.as_ref().unwrap().is_finished() {
            tokio::task::yield_now().await;
        }
        assert!(reap_finished(&mut pending).await);
        assert!(pending.is_none());
    }

    #[test]
    fn status_distinguishes_busy_and_revealing() {
        let mut state = SessionState {
            busy: true,
            ..Default::default()
        };
        assert_eq!(status(&state), "thinking…");
        state.busy = false;
        state.render = RenderState::Revealing;
        assert_eq!(status(&state), "typing…");
        state.render = RenderState::Complete;
        assert_eq!(status(&state), "ready");
    }
}
