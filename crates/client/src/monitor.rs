//! Read-only monitor board.
//!
//! Same stream plumbing as the operator console, without selection,
//! mutation or session probing: a broken stream prints the error and stops.

use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, Color, Table};
use console::{style, Term};
use guidewatch_protocol::{MonitorEvent, MonitorSnapshot};
use tracing::info;

use crate::api::MONITOR_EVENTS_PATH;
use crate::config::Config;
use crate::reconcile::highlight_first;
use crate::stream::{StreamClient, StreamEvent};

#[derive(Debug, Default)]
pub struct MonitorBoard {
    pub events: Vec<MonitorEvent>,
    pub soft_error: Option<String>,
}

impl MonitorBoard {
    /// An error frame without data keeps the rows on screen.
    pub fn apply(&mut self, snapshot: MonitorSnapshot) {
        self.soft_error = if snapshot.message.trim().is_empty() {
            None
        } else {
            Some(format!(
                "{} (request {})",
                snapshot.message,
                snapshot.request_id.as_deref().unwrap_or("-")
            ))
        };
        if let Some(events) = snapshot.events {
            self.events = highlight_first(events, |e| e.highlight);
        }
    }

    pub fn render(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL_CONDENSED)
            .set_header(vec!["Guide", "Recipient", "Status"]);
        for event in &self.events {
            let mut status = Cell::new(&event.status);
            if event.highlight {
                status = status.fg(Color::Yellow);
            }
            table.add_row(vec![
                Cell::new(&event.guide_id),
                Cell::new(&event.recipient),
                status,
            ]);
        }
        table
    }
}

pub async fn run_monitor(config: &Config) -> anyhow::Result<()> {
    let client = StreamClient::new(config)?;
    let mut conn = client.open_stream::<MonitorSnapshot>(MONITOR_EVENTS_PATH);
    let term = Term::stdout();
    let mut board = MonitorBoard::default();

    info!(
        component = "monitor",
        event = "monitor.started",
        sse_url = %config.sse_url,
        "Monitor started"
    );

    loop {
        tokio::select! {
            event = conn.events.recv() => match event {
                Some(StreamEvent::Snapshot(snapshot)) => {
                    board.apply(snapshot);
                    term.clear_screen()?;
                    term.write_line(&board.render().to_string())?;
                    if let Some(soft) = &board.soft_error {
                        term.write_line(&style(soft).yellow().to_string())?;
                    }
                }
                Some(StreamEvent::DecodeFailed { .. }) => {}
                Some(StreamEvent::Broken { reason }) => {
                    term.write_line(&style(format!("Connection error: {reason}")).red().to_string())?;
                    break;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    conn.handle.close();
    info!(component = "monitor", event = "monitor.stopped", "Monitor stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, highlight: bool) -> MonitorEvent {
        MonitorEvent {
            guide_id: id.to_string(),
            recipient: format!("R {id}"),
            status: "Aguarde".to_string(),
            highlight,
        }
    }

    #[test]
    fn board_orders_highlighted_first_and_keeps_rows_on_error() {
        let mut board = MonitorBoard::default();
        board.apply(MonitorSnapshot {
            events: Some(vec![event("A", false), event("B", true), event("C", false)]),
            message: String::new(),
            request_id: None,
        });
        let ids: Vec<&str> = board.events.iter().map(|e| e.guide_id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A", "C"]);

        board.apply(MonitorSnapshot {
            events: None,
            message: "Sin datos".into(),
            request_id: Some("r-1".into()),
        });
        assert_eq!(board.events.len(), 3);
        assert_eq!(board.soft_error.as_deref(), Some("Sin datos (request r-1)"));
        assert!(board.render().to_string().contains("R B"));
    }
}
