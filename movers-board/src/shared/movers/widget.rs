//! Ratatui widget for the MOVERS panel

use ratatui::{
    layout::{Constraint, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
    Frame,
};

use super::feed::FeedStatus;
use crate::shared::types::{DisplayRow, Polarity};

const C_BUY: Color = Color::Rgb(100, 220, 100);
const C_SELL: Color = Color::Rgb(220, 100, 100);
const C_NEUTRAL: Color = Color::Rgb(180, 180, 100);
const C_DIM: Color = Color::Rgb(120, 120, 120);
const C_BRIGHT: Color = Color::Rgb(220, 220, 220);
const C_ACCENT: Color = Color::Rgb(100, 180, 220);

/// Format a price with precision scaled to its magnitude
fn format_price(price: f64) -> String {
    if price <= 0.0 {
        "--".to_string()
    } else if price >= 1000.0 {
        format!("{:.0}", price)
    } else if price >= 1.0 {
        format!("{:.2}", price)
    } else {
        format!("{:.5}", price)
    }
}

fn change_color(value: f64) -> Color {
    if value > 0.0 {
        C_BUY
    } else if value < 0.0 {
        C_SELL
    } else {
        C_NEUTRAL
    }
}

/// Render the MOVERS panel from the last committed rows
pub fn render_movers_panel(
    f: &mut Frame,
    area: Rect,
    rows: &[DisplayRow],
    status: FeedStatus,
    polarity: Polarity,
) {
    let border_color = match status {
        FeedStatus::Connected => C_ACCENT,
        FeedStatus::Reconnecting => C_NEUTRAL,
        FeedStatus::Disconnected => C_SELL,
    };
    let title = match polarity {
        Polarity::Gainers => " TOP GAINERS ",
        Polarity::Losers => " TOP LOSERS ",
    };

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color));

    // The engine keeps the last list through gaps; only a cold start is empty
    if rows.is_empty() {
        let inner = block.inner(area);
        f.render_widget(block, area);
        let placeholder = vec![
            Line::from(Span::styled("Waiting for movers feed...", Style::default().fg(C_DIM))),
            Line::from(Span::styled(
                format!("status: {:?}", status),
                Style::default().fg(C_DIM),
            )),
        ];
        f.render_widget(Paragraph::new(placeholder), inner);
        return;
    }

    let header = Row::new(
        ["#", "SYMBOL", "PRICE", "CHG%", "EMA"]
            .into_iter()
            .map(|h| Cell::from(h).style(Style::default().fg(C_DIM).add_modifier(Modifier::BOLD))),
    )
    .height(1);

    let body = rows.iter().map(|row| {
        let raw = row.data.raw_score;
        let ema = polarity.orient(row.score);
        let symbol_style = if row.is_grace_entry {
            Style::default().fg(C_DIM).add_modifier(Modifier::ITALIC)
        } else {
            Style::default().fg(C_BRIGHT).add_modifier(Modifier::BOLD)
        };

        Row::new(vec![
            Cell::from(format!("{:>2}", row.position + 1)).style(Style::default().fg(C_DIM)),
            Cell::from(row.id.to_string()).style(symbol_style),
            Cell::from(format_price(row.data.price)).style(Style::default().fg(C_BRIGHT)),
            Cell::from(format!("{:+.2}", raw)).style(Style::default().fg(change_color(raw))),
            Cell::from(format!("{:+.2}", ema)).style(Style::default().fg(change_color(ema))),
        ])
        .height(1)
    });

    let table = Table::new(
        body,
        [
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(12),
            Constraint::Length(8),
            Constraint::Length(8),
        ],
    )
    .header(header)
    .block(block);

    f.render_widget(table, area);
}
