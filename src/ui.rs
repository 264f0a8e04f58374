use crate::{
    client::{
        AppSnapshot,
        Page,
    },
    draw::DrawPhase,
    mint::MintPhase,
};
use alloy_primitives::Address;
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        self,
        Event,
        KeyCode,
        KeyEventKind,
        KeyModifiers,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use itertools::Itertools;
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::stdout;
use tokio::sync::mpsc;
use unicode_width::UnicodeWidthStr;

pub type InputEventReceiver = mpsc::UnboundedReceiver<std::io::Result<Event>>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UserEvent {
    Quit,
    Redraw,
    DismissAlert,
    NextPage,
    Connect,
    SwitchAccount,
    Mint,
    PickWinner,
    ResetWinner,
    RefreshDraw,
}

#[derive(Debug, Default)]
pub struct UiState {
    mode: Mode,
    page: Page,
    alert_open: bool,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum Mode {
    #[default]
    Normal,
    QuitModal,
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        crossterm::terminal::EnterAlternateScreen,
        crossterm::event::EnableMouseCapture
    )?;
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        crossterm::event::DisableMouseCapture,
        crossterm::terminal::LeaveAlternateScreen
    )?;
    Ok(())
}

/// Reads terminal events on a dedicated thread so the event loop can
/// `select!` over them.
pub fn input_event_stream() -> InputEventReceiver {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            let event = event::read();
            let failed = event.is_err();
            if tx.send(event).is_err() || failed {
                break;
            }
        }
    });
    rx
}

pub async fn next_raw_event(input_events: &mut InputEventReceiver) -> Result<Event> {
    let event = input_events
        .recv()
        .await
        .ok_or_else(|| eyre!("terminal input closed"))??;
    Ok(event)
}

pub fn draw(state: &mut UiState, snap: &AppSnapshot) -> Result<()> {
    state.page = snap.page;
    state.alert_open = snap.alert.is_some();
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, snap))?;
        state.terminal = Some(term);
    }
    Ok(())
}

pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    let k = match event {
        Event::Key(k) => k,
        Event::Resize(..) => return Some(UserEvent::Redraw),
        _ => return None,
    };
    if k.kind != KeyEventKind::Press {
        return None;
    }
    if k.code == KeyCode::Char('c') && k.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(UserEvent::Quit);
    }
    if state.alert_open {
        state.alert_open = false;
        return Some(UserEvent::DismissAlert);
    }
    if state.mode == Mode::QuitModal {
        return match k.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => Some(UserEvent::Quit),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            _ => None,
        };
    }
    match (state.page, k.code) {
        (_, KeyCode::Char('q')) | (_, KeyCode::Esc) => {
            state.mode = Mode::QuitModal;
            Some(UserEvent::Redraw)
        }
        (_, KeyCode::Tab) => Some(UserEvent::NextPage),
        (Page::Mint, KeyCode::Char('c')) => Some(UserEvent::Connect),
        (Page::Mint, KeyCode::Char('m')) => Some(UserEvent::Mint),
        (Page::Mint, KeyCode::Char('s')) => Some(UserEvent::SwitchAccount),
        (Page::AdminDraw, KeyCode::Char('p')) => Some(UserEvent::PickWinner),
        (Page::AdminDraw, KeyCode::Char('x')) => Some(UserEvent::ResetWinner),
        (Page::AdminDraw, KeyCode::Char('r')) => Some(UserEvent::RefreshDraw),
        _ => None,
    }
}

fn ui(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // nav
            Constraint::Min(8),    // page
            Constraint::Length(6), // status/errors
            Constraint::Length(3), // help
        ])
        .split(f.area());

    draw_nav(f, chunks[0], snap);
    match snap.page {
        Page::Mint => draw_mint_page(f, chunks[1], snap),
        Page::AdminDraw => draw_admin_page(f, chunks[1], snap),
    }
    draw_status(f, chunks[2], snap);
    draw_help(f, chunks[3], snap);
    draw_modals(f, state, snap);
}

fn draw_nav(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let mut spans: Vec<Span> = Vec::new();
    for (i, page) in snap.pages.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" | "));
        }
        let style = if *page == snap.page {
            Style::default().fg(Color::Black).bg(Color::Yellow)
        } else {
            Style::default().fg(Color::White).bg(Color::Blue)
        };
        spans.push(Span::styled(format!(" {} ", page.title()), style));
    }
    spans.push(Span::raw("   "));
    if snap.is_verified {
        spans.push(Span::styled(
            " 🟢 Verified ",
            Style::default().fg(Color::White).bg(Color::Green),
        ));
    } else {
        spans.push(Span::styled(
            " 🛡️ Not verified ",
            Style::default().fg(Color::Black).bg(Color::Yellow),
        ));
    }
    let nav = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title(snap.chain.as_str()));
    f.render_widget(nav, area);
}

fn draw_mint_page(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(3)])
        .split(area);

    let account = match (snap.provider_present, snap.account) {
        (false, _) => "No wallet detected".to_string(),
        (true, None) => "Not connected".to_string(),
        (true, Some(account)) => account.to_string(),
    };
    let contract = snap
        .contract_address
        .map(|a| a.to_string())
        .unwrap_or_else(|| "N/A".to_string());
    let mut lines = vec![
        Line::from(format!("Account: {account}")),
        Line::from(format!("Contract: {contract}")),
    ];
    if let Some(token_id) = snap.last_token_id {
        lines.push(Line::from(format!("Certificate token: #{token_id}")));
    }
    let wallet = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Wallet"));
    f.render_widget(wallet, rows[0]);

    let connect_label = match snap.account {
        Some(account) => format!("[c] ✅ {}", short_address(&account)),
        None => "[c] 🦊 Connect Wallet".to_string(),
    };
    let mint_label = if snap.mint_phase.in_flight() {
        "[m] ⌛ Minting...".to_string()
    } else {
        "[m] 🎓 Claim NFT Certificate".to_string()
    };
    let buttons = vec![
        button_line(connect_label, true),
        button_line(mint_label, snap.buttons.mint),
        button_line("[s] 🔄 Switch Account".to_string(), snap.buttons.switch_account),
    ];
    let panel = Paragraph::new(buttons)
        .block(Block::default().borders(Borders::ALL).title("Claim"));
    f.render_widget(panel, rows[1]);
}

fn draw_admin_page(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    let width = cols[0].width.saturating_sub(6) as usize;
    let items: Vec<ListItem> = if snap.minted_users.is_empty() {
        vec![ListItem::new("No certificates minted yet")]
    } else {
        snap.minted_users
            .iter()
            .enumerate()
            .map(|(i, user)| {
                let highlighted = snap.highlighted == Some(i);
                let is_winner = snap.winner == Some(*user);
                let marker = if highlighted {
                    "🎰"
                } else if is_winner {
                    "🏆"
                } else {
                    "  "
                };
                let text = truncate_to_width(&format!("{marker} {user}"), width);
                let style = if highlighted {
                    Style::default().fg(Color::Black).bg(Color::Yellow)
                } else if is_winner {
                    Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                ListItem::new(text).style(style)
            })
            .collect()
    };
    let title = format!("Minted ({})", snap.minted_users.len());
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(list, cols[0]);

    let pick_label = match snap.draw_phase {
        DrawPhase::WaitingForSignature => "[p] ✍️ Waiting for signature...",
        DrawPhase::Spinning => "[p] 🎰 Spinning...",
        DrawPhase::Idle | DrawPhase::Settled => "[p] 🎲 Pick Winner",
    };
    let winner = match snap.winner {
        Some(winner) => format!("🏆 Winner: {}", short_address(&winner)),
        None => "🏆 Winner: -".to_string(),
    };
    let mut lines = vec![
        Line::from(winner),
        Line::from(""),
        button_line(pick_label.to_string(), snap.buttons.pick_winner),
    ];
    if snap.buttons.reset_visible {
        lines.push(button_line(
            "[x] ♻️ Reset Winner".to_string(),
            snap.buttons.reset_winner,
        ));
    }
    lines.push(button_line("[r] 🔃 Refresh".to_string(), true));
    let panel = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Draw"));
    f.render_widget(panel, cols[1]);
}

fn draw_status(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let widget = if snap.errors.is_empty() {
        let status = if snap.status.trim().is_empty() {
            match snap.mint_phase {
                MintPhase::Idle => "Ready",
                phase => phase.status_message(),
            }
        } else {
            snap.status.as_str()
        };
        Paragraph::new(status.to_string())
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Status"))
            .style(Style::default().fg(Color::Green))
    } else {
        let mut lines = vec![Line::from(snap.status.clone())];
        lines.extend(snap.errors.iter().rev().map(|e| Line::from(e.clone())));
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Status / Errors"))
            .style(Style::default().fg(Color::Red))
    };
    f.render_widget(widget, area);
}

fn draw_help(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let mut keys = match snap.page {
        Page::Mint => vec!["c connect", "m claim", "s switch account"],
        Page::AdminDraw => vec!["p pick winner", "x reset", "r refresh"],
    };
    if snap.pages.len() > 1 {
        keys.push("Tab next page");
    }
    keys.push("q/Esc quit");
    let help = Paragraph::new(keys.iter().join(" | "))
        .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}

fn draw_modals(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    if let Some(alert) = &snap.alert {
        let area = centered_rect(50, 25, f.area());
        let block = Block::default().borders(Borders::ALL).title("Alert");
        let p = Paragraph::new(vec![
            Line::from(alert.clone()),
            Line::from(""),
            Line::from("Press any key to continue"),
        ])
        .wrap(Wrap { trim: false });
        f.render_widget(Clear, area);
        f.render_widget(block.clone(), area);
        f.render_widget(p, block.inner(area));
        return;
    }
    if state.mode == Mode::QuitModal {
        let area = centered_rect(40, 20, f.area());
        let block = Block::default().borders(Borders::ALL).title("Confirm Quit");
        let p = Paragraph::new("Quit? (Y/N)");
        f.render_widget(Clear, area);
        f.render_widget(block.clone(), area);
        f.render_widget(p, block.inner(area));
    }
}

fn button_line(label: String, enabled: bool) -> Line<'static> {
    let style = if enabled {
        Style::default().fg(Color::White).bg(Color::Blue)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Line::styled(label, style)
}

fn short_address(address: &Address) -> String {
    let full = address.to_string();
    format!("{}…{}", &full[..6], &full[full.len() - 4..])
}

fn truncate_to_width(text: &str, max: usize) -> String {
    if text.width() <= max {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w + 1 > max {
            break;
        }
        used += w;
        out.push(ch);
    }
    out.push('…');
    out
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1])[1]
}
