mod theme;

use crate::app::{
    AppModel, Focus, InputMode, LIST_COLUMN_PERCENT, NavigationState, OptionRow,
    SIDE_COLUMN_PERCENT, percent_of, question_prompt,
};
use crate::domain::CommandOption;
use ansi_to_tui::IntoText;
use ratatui::backend::TestBackend;
use ratatui::buffer::Buffer;
use ratatui::prelude::*;
use ratatui::widgets::*;
use std::io;
use unicode_width::UnicodeWidthStr;

const STATUS_SEPARATOR: &str = " | ";

pub fn render(frame: &mut Frame, model: &AppModel) {
    let full_area = frame.area();
    if full_area.width == 0 || full_area.height == 0 {
        return;
    }

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(full_area);

    render_title_bar(frame, rows[0], model);

    match model.navigation {
        NavigationState::SubcommandSelection => render_subcommand_layout(frame, rows[1], model),
        NavigationState::CommandOptions => render_options_layout(frame, rows[1], model),
        NavigationState::CommandList | NavigationState::Executing | NavigationState::Results => {
            render_list_layout(frame, rows[1], model)
        }
    }

    render_status_bar(frame, rows[2], model);

    if model.help_open {
        render_help_overlay(frame, rows[1]);
    }
}

/// Renders one frame into an off-screen buffer and returns it as plain text,
/// one line per terminal row with trailing spaces trimmed.
pub fn render_to_text(model: &AppModel, width: u16, height: u16) -> io::Result<String> {
    let mut terminal = Terminal::new(TestBackend::new(width, height))?;
    terminal.draw(|frame| render(frame, model))?;
    Ok(buffer_to_text(terminal.backend().buffer()))
}

fn buffer_to_text(buffer: &Buffer) -> String {
    let width = usize::from(buffer.area.width).max(1);
    let mut out = String::new();

    for row in buffer.content().chunks(width) {
        let mut line = String::new();
        let mut skip = 0usize;
        for cell in row {
            if skip > 0 {
                skip -= 1;
                continue;
            }
            let symbol = cell.symbol();
            line.push_str(symbol);
            skip = UnicodeWidthStr::width(symbol).saturating_sub(1);
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }

    out
}

fn screen_title(navigation: NavigationState) -> &'static str {
    match navigation {
        NavigationState::CommandList => "❄️ nixai: NixOS AI Assistant - Select Command",
        NavigationState::SubcommandSelection => "❄️ nixai: NixOS AI Assistant - Select Subcommand",
        NavigationState::CommandOptions => "❄️ nixai: Configure Options",
        NavigationState::Executing => "❄️ nixai: Executing Command...",
        NavigationState::Results => "❄️ nixai: Command Results (Tab to select new command)",
    }
}

fn render_title_bar(frame: &mut Frame, area: Rect, model: &AppModel) {
    let title = truncate_end(
        screen_title(model.navigation),
        usize::from(area.width).saturating_sub(2),
    );
    let line = Line::from(Span::styled(
        format!(" {title}"),
        Style::default()
            .fg(theme::ACCENT)
            .add_modifier(Modifier::BOLD),
    ));

    frame.render_widget(
        Paragraph::new(line).style(Style::default().bg(theme::BAR_BG)),
        area,
    );
}

fn panel_block(title: String, focused: bool) -> Block<'static> {
    let border_style = if focused {
        Style::default().fg(theme::ACCENT)
    } else {
        Style::default().fg(theme::BORDER)
    };
    let title_style = if focused {
        Style::default()
            .fg(theme::ACCENT)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(theme::MUTED)
    };

    Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .padding(Padding::horizontal(1))
        .title(Span::styled(title, title_style))
}

fn render_list_layout(frame: &mut Frame, area: Rect, model: &AppModel) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(percent_of(area.width, LIST_COLUMN_PERCENT)),
            Constraint::Min(0),
        ])
        .split(area);

    render_commands(frame, columns[0], model);
    render_output(frame, columns[1], model);
}

fn render_subcommand_layout(frame: &mut Frame, area: Rect, model: &AppModel) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(percent_of(area.width, SIDE_COLUMN_PERCENT)),
            Constraint::Length(percent_of(area.width, SIDE_COLUMN_PERCENT)),
            Constraint::Min(0),
        ])
        .split(area);

    render_commands(frame, columns[0], model);
    render_subcommands(frame, columns[1], model);
    render_output(frame, columns[2], model);
}

fn render_options_layout(frame: &mut Frame, area: Rect, model: &AppModel) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(percent_of(area.width, SIDE_COLUMN_PERCENT)),
            Constraint::Min(0),
        ])
        .split(area);

    // Options take the upper half; the output panel gets the rest.
    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(area.height / 2), Constraint::Min(0)])
        .split(columns[1]);

    render_commands(frame, columns[0], model);
    render_options(frame, right[0], model);
    render_output(frame, right[1], model);
}

fn selection_highlight() -> Style {
    Style::default()
        .fg(theme::HIGHLIGHT)
        .add_modifier(Modifier::BOLD)
}

fn render_commands(frame: &mut Frame, area: Rect, model: &AppModel) {
    let searching = matches!(model.input, InputMode::Searching(_));
    let title = match &model.input {
        InputMode::Searching(buffer) => format!("Search: {}█", buffer.as_str()),
        _ if !model.filter_query.is_empty() => {
            format!("Commands (filter: {})", model.filter_query)
        }
        _ => "Commands (Press / to search)".to_string(),
    };
    let block = panel_block(title, searching || model.focus == Focus::Commands);

    let commands = model.filtered_commands();
    if commands.is_empty() {
        let empty = Paragraph::new("No matching commands. Press Esc to clear the search.")
            .style(Style::default().fg(theme::MUTED))
            .wrap(Wrap { trim: false })
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let max_width = usize::from(area.width).saturating_sub(6);
    let items: Vec<ListItem> = commands
        .iter()
        .map(|command| {
            let marker = if command.needs_input { " [INPUT]" } else { "" };
            let mut lines = vec![Line::from(vec![
                Span::styled(
                    truncate_end(&command.name, max_width.saturating_sub(marker.len())),
                    Style::default().fg(theme::FG).add_modifier(Modifier::BOLD),
                ),
                Span::styled(marker, Style::default().fg(theme::ACCENT_STRONG)),
            ])];
            if !searching {
                lines.push(Line::from(Span::styled(
                    format!(
                        "  {}",
                        truncate_end(&command.description, max_width.saturating_sub(2))
                    ),
                    Style::default().fg(theme::MUTED),
                )));
            }
            ListItem::new(lines)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(selection_highlight())
        .highlight_symbol("▸ ");

    let mut state = ListState::default();
    state.select(Some(model.selected_command.min(commands.len() - 1)));
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_subcommands(frame: &mut Frame, area: Rect, model: &AppModel) {
    let focused = model.focus == Focus::Subcommands;
    let Some(command) = model.selected_command() else {
        frame.render_widget(panel_block("Subcommands".to_string(), focused), area);
        return;
    };

    let block = panel_block(format!("Subcommands: {}", command.name), focused);
    if command.subcommands.is_empty() {
        frame.render_widget(Paragraph::new("No subcommands.").block(block), area);
        return;
    }

    let max_width = usize::from(area.width).saturating_sub(6);
    let items: Vec<ListItem> = command
        .subcommands
        .iter()
        .map(|subcommand| {
            ListItem::new(vec![
                Line::from(Span::styled(
                    truncate_end(&subcommand.name, max_width),
                    Style::default().fg(theme::FG).add_modifier(Modifier::BOLD),
                )),
                Line::from(Span::styled(
                    format!(
                        "  {}",
                        truncate_end(&subcommand.description, max_width.saturating_sub(2))
                    ),
                    Style::default().fg(theme::MUTED),
                )),
            ])
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(selection_highlight())
        .highlight_symbol("▸ ");

    let mut state = ListState::default();
    state.select(Some(
        model
            .selected_subcommand
            .min(command.subcommands.len() - 1),
    ));
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_options(frame: &mut Frame, area: Rect, model: &AppModel) {
    let focused = matches!(model.focus, Focus::Options | Focus::Input);
    let block = panel_block(format!("Options: {}", model.target_label()), focused);

    match &model.input {
        InputMode::EnteringParameter { option, buffer } => {
            let (name, description) = model
                .target_options()
                .get(*option)
                .map(|option| (option.name.as_str(), option.description.as_str()))
                .unwrap_or_default();
            let prompt = format!("Enter value for '{name}':");
            render_prompt(frame, area, block, &prompt, description, buffer.as_str());
        }
        InputMode::EnteringQuestion(buffer) => {
            let name = model
                .target_command()
                .map(|command| command.name.as_str())
                .unwrap_or_default();
            render_prompt(
                frame,
                area,
                block,
                &question_prompt(name),
                "Sent after the configured options",
                buffer.as_str(),
            );
        }
        InputMode::None | InputMode::Searching(_) => {
            let max_width = usize::from(area.width).saturating_sub(6);
            let options = model.target_options();
            let rows = model.option_rows();
            let items: Vec<ListItem> = rows
                .iter()
                .map(|row| match row {
                    OptionRow::Option(index) => options
                        .get(*index)
                        .map(|option| {
                            let value = model.option_values.get(&option.flag).map(String::as_str);
                            option_item(option, value, max_width)
                        })
                        .unwrap_or_else(|| ListItem::new("")),
                    OptionRow::Execute => execute_item(),
                })
                .collect();

            let list = List::new(items)
                .block(block)
                .highlight_style(selection_highlight())
                .highlight_symbol("▸ ");

            let mut state = ListState::default();
            state.select(Some(model.selected_option.min(rows.len().saturating_sub(1))));
            frame.render_stateful_widget(list, area, &mut state);
        }
    }
}

fn option_item(option: &CommandOption, value: Option<&str>, max_width: usize) -> ListItem<'static> {
    let marker = if option.required {
        Span::styled("* ", Style::default().fg(theme::REQUIRED))
    } else {
        Span::raw("  ")
    };
    let value_span = match value.filter(|value| !value.is_empty()) {
        Some(value) => Span::styled(value.to_string(), Style::default().fg(theme::ACCENT)),
        None => Span::styled("<not set>", Style::default().fg(theme::DIM)),
    };

    ListItem::new(vec![
        Line::from(vec![
            marker,
            Span::styled(
                format!("{} (--{}, {}): ", option.name, option.flag, option.kind.label()),
                Style::default().fg(theme::FG),
            ),
            value_span,
        ]),
        Line::from(Span::styled(
            format!(
                "    {}",
                truncate_end(&option.description, max_width.saturating_sub(4))
            ),
            Style::default().fg(theme::MUTED),
        )),
    ])
}

fn execute_item() -> ListItem<'static> {
    ListItem::new(vec![
        Line::from(Span::styled(
            "▶ Execute Command",
            Style::default()
                .fg(theme::RUNNING)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            "    Run command with configured options",
            Style::default().fg(theme::MUTED),
        )),
    ])
}

fn render_prompt(
    frame: &mut Frame,
    area: Rect,
    block: Block<'static>,
    prompt: &str,
    description: &str,
    value: &str,
) {
    let text = vec![
        Line::from(Span::styled(
            prompt.to_string(),
            Style::default().fg(theme::FG).add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            description.to_string(),
            Style::default().fg(theme::MUTED),
        )),
        Line::from(""),
        Line::from(vec![
            Span::raw("Value: "),
            Span::styled(value.to_string(), Style::default().fg(theme::ACCENT)),
            Span::styled("█", Style::default().fg(theme::ACCENT_STRONG)),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            "Enter to confirm, Esc to cancel",
            Style::default().fg(theme::DIM),
        )),
    ];

    frame.render_widget(
        Paragraph::new(text).wrap(Wrap { trim: false }).block(block),
        area,
    );
}

fn output_title(model: &AppModel) -> &'static str {
    if model.is_streaming {
        "⚡ Executing command (real-time output)..."
    } else if model.is_executing() {
        "⏳ Executing command..."
    } else {
        "Output"
    }
}

/// Parses ANSI color codes in command output. Text that fails to parse is
/// shown as-is.
fn output_text(raw: &str) -> Text<'static> {
    raw.into_text()
        .unwrap_or_else(|_| Text::raw(raw.to_string()))
}

fn output_paragraph(raw: &str) -> Paragraph<'static> {
    Paragraph::new(output_text(raw))
        .style(Style::default().fg(theme::FG))
        .wrap(Wrap { trim: false })
}

/// Rows `raw` takes up in the output panel once wrapped to `width` columns.
pub fn output_rows(raw: &str, width: u16) -> usize {
    output_paragraph(raw).line_count(width)
}

fn render_output(frame: &mut Frame, area: Rect, model: &AppModel) {
    let block = panel_block(
        output_title(model).to_string(),
        model.focus == Focus::Output,
    );
    let inner = block.inner(area);

    let paragraph = output_paragraph(&model.output_text);
    let total = paragraph.line_count(inner.width);
    let max_offset = total.saturating_sub(usize::from(inner.height));
    let offset = if model.scroll.follow {
        max_offset
    } else {
        model.scroll.offset.min(max_offset)
    };
    let offset = u16::try_from(offset).unwrap_or(u16::MAX);

    frame.render_widget(paragraph.block(block).scroll((offset, 0)), area);
}

fn key_hints(model: &AppModel) -> &'static str {
    if model.input.is_text_entry() {
        return "Enter=confirm  Esc=cancel";
    }
    match model.navigation {
        NavigationState::CommandList => "↑↓=move  Enter=select  /=search  Tab=focus  ?=help  q=quit",
        NavigationState::SubcommandSelection => "↑↓=move  Enter=select  Esc=back  Tab=focus",
        NavigationState::CommandOptions => "↑↓=move  Enter=edit  Ctrl+R=run  Esc=back  Tab=focus",
        NavigationState::Executing => "PgUp/PgDn=scroll  Ctrl+C=quit",
        NavigationState::Results => "Tab/Enter/Esc=new command  PgUp/PgDn=scroll",
    }
}

fn status_items(model: &AppModel) -> Vec<String> {
    let mut items = vec![
        format!("State: {}", model.navigation.label()),
        format!("Focus: {}", model.focus.label()),
    ];

    // Ahead of the key hints so truncation never hides it.
    if let Some(notice) = model.notice.as_deref().filter(|notice| !notice.trim().is_empty()) {
        items.push(notice.to_string());
    }

    match &model.input {
        InputMode::None => {
            if !model.filter_query.is_empty() {
                items.push(format!("Filter: {}", model.filter_query));
            }
        }
        InputMode::Searching(_) => items.push("Searching".to_string()),
        InputMode::EnteringParameter { .. } => items.push("Input".to_string()),
        InputMode::EnteringQuestion(_) => items.push("Question".to_string()),
    }

    if model.is_executing() {
        if let Some(command) = &model.running_command {
            items.push(format!("Running: {command}"));
        }
    }

    items.push(key_hints(model).to_string());
    items
}

fn render_status_bar(frame: &mut Frame, area: Rect, model: &AppModel) {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut available = usize::from(area.width);

    if model.is_executing() {
        spans.push(Span::styled(
            "● ".to_string(),
            Style::default()
                .fg(theme::RUNNING)
                .add_modifier(Modifier::BOLD),
        ));
        available = available.saturating_sub(2);
    }
    spans.push(Span::raw(truncate_end(
        &status_items(model).join(STATUS_SEPARATOR),
        available,
    )));

    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().fg(theme::MUTED).bg(theme::BAR_BG)),
        area,
    );
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup = centered_rect(74, 80, area);
    frame.render_widget(Clear, popup);

    let text = vec![
        Line::from("Navigation"),
        Line::from("  - ↑/↓ or Ctrl+K/Ctrl+J: move within the focused panel"),
        Line::from("  - ←/→ or Ctrl+H/Ctrl+L: move focus between panels"),
        Line::from("  - Tab: cycle panels (returns to the list from results)"),
        Line::from("  - Enter: select / toggle / edit / execute"),
        Line::from("  - Esc: back, or clear the filter"),
        Line::from(""),
        Line::from("Commands"),
        Line::from("  - /: search commands by name or description"),
        Line::from("  - Ctrl+R: run the configured command"),
        Line::from(""),
        Line::from("Output"),
        Line::from("  - PgUp/PgDn, Home/End: scroll (End follows new output)"),
        Line::from(""),
        Line::from("Global"),
        Line::from("  - q: quit (outside text input)"),
        Line::from("  - Ctrl+C: quit"),
        Line::from("  - F1 or ?: toggle this help"),
    ];

    let paragraph = Paragraph::new(text).wrap(Wrap { trim: false }).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme::ACCENT))
            .padding(Padding::horizontal(1))
            .title("Keys (F1 or ? to close)"),
    );
    frame.render_widget(paragraph, popup);
}

fn truncate_end(text: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }
    if UnicodeWidthStr::width(text) <= max_width {
        return text.to_string();
    }
    let ellipsis = "…";
    let available = max_width.saturating_sub(UnicodeWidthStr::width(ellipsis));
    let mut out = String::new();
    let mut used = 0usize;
    for ch in text.chars() {
        let width = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + width > available {
            break;
        }
        used += width;
        out.push(ch);
    }
    out.push_str(ellipsis);
    out
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
