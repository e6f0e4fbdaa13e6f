//! Interactive operator console.
//!
//! Redraws the published view on every change and reads one command per
//! stdin line.

use std::sync::Arc;

use anyhow::Context;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, Color, Table};
use console::{style, Term};
use guidewatch_protocol::{Guide, GuideId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::api::ApiClient;
use crate::config::Config;
use crate::operator_actor::{OperatorActorHandle, OperatorDeps};
use crate::redirect::LoginRedirect;
use crate::state::OperatorView;
use crate::stream::StreamClient;
use crate::workflow::{StreamPhase, WorkflowPhase};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Select(GuideId),
    Propose {
        status_id: String,
        via_guide_id: Option<String>,
    },
    Confirm,
    Cancel,
    Dismiss,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err("empty command".to_string());
    };
    let args: Vec<&str> = words.collect();

    match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("select" | "s", [id]) => Ok(ConsoleCommand::Select(GuideId::new(*id))),
        ("propose" | "p", [status]) => Ok(ConsoleCommand::Propose {
            status_id: status.to_string(),
            via_guide_id: None,
        }),
        ("propose" | "p", [status, via]) => Ok(ConsoleCommand::Propose {
            status_id: status.to_string(),
            via_guide_id: Some(via.to_string()),
        }),
        ("confirm" | "c", []) => Ok(ConsoleCommand::Confirm),
        ("cancel" | "x", []) => Ok(ConsoleCommand::Cancel),
        ("ok", []) => Ok(ConsoleCommand::Dismiss),
        ("help" | "?", []) => Ok(ConsoleCommand::Help),
        ("quit" | "q" | "exit", []) => Ok(ConsoleCommand::Quit),
        ("select" | "s", _) => Err("usage: select <guideId>".to_string()),
        ("propose" | "p", _) => Err("usage: propose <statusId> [viaGuideId]".to_string()),
        _ => Err(format!("unknown command: {verb}")),
    }
}

const HELP: &str = "commands: select <id> | propose <statusId> [viaGuideId] | confirm | cancel | ok | quit";

fn operator_label(guide: &Guide) -> String {
    match &guide.operator {
        Some(op) if op.id != 0 => {
            if op.name.is_empty() {
                format!("#{}", op.id)
            } else {
                op.name.clone()
            }
        }
        _ => "-".to_string(),
    }
}

pub fn render_guides(view: &OperatorView) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_header(vec![
            "", "Guide", "Via", "Recipient", "Status", "Operator", "Payment", "Last change",
        ]);

    let selected = view.selection.as_ref().map(|g| &g.guide_id);
    for guide in &view.collection {
        let marker = if Some(&guide.guide_id) == selected {
            ">"
        } else if guide.highlight {
            "*"
        } else {
            ""
        };
        let mut id_cell = Cell::new(guide.guide_id.as_str());
        if guide.highlight {
            id_cell = id_cell.fg(Color::Yellow);
        }
        if !guide.selectable {
            id_cell = id_cell.fg(Color::DarkGrey);
        }
        table.add_row(vec![
            Cell::new(marker),
            id_cell,
            Cell::new(&guide.via_guide_id),
            Cell::new(&guide.recipient),
            Cell::new(&guide.status),
            Cell::new(operator_label(guide)),
            Cell::new(&guide.payment),
            Cell::new(
                guide
                    .last_change
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default(),
            ),
        ]);
    }
    table
}

/// Everything below the table: selection, options, pending change and
/// indicators.
pub fn render_detail(view: &OperatorView) -> Vec<String> {
    let mut lines = Vec::new();

    lines.push(match view.stream {
        StreamPhase::Connecting => style("connecting...").dim().to_string(),
        StreamPhase::Live => style("live").green().to_string(),
        StreamPhase::Classifying => style("connection lost, checking session...").yellow().to_string(),
        StreamPhase::Redirecting => style("session expired, log in again").red().to_string(),
        StreamPhase::Idle => style("connection lost").red().to_string(),
        StreamPhase::Closed => style("closed").dim().to_string(),
    });
    if let Some(error) = &view.stream_error {
        lines.push(style(format!("stream error: {error}")).red().to_string());
    }
    if let Some(soft) = &view.soft_error {
        lines.push(
            style(format!(
                "server: {} (request {})",
                soft.message,
                soft.request_id.as_deref().unwrap_or("-")
            ))
            .yellow()
            .to_string(),
        );
    }

    match &view.selection {
        None => lines.push("no guide selected".to_string()),
        Some(guide) => {
            let mode = if view.read_only { " [read-only]" } else { "" };
            lines.push(format!(
                "selected {} ({}) status {}{mode}",
                style(guide.guide_id.as_str()).bold(),
                guide.recipient,
                guide.status
            ));
            if let Some(elapsed) = &view.elapsed_time {
                lines.push(format!("since last change: {elapsed}"));
            }
            if view.loading_status_options {
                lines.push(style("loading status options...").dim().to_string());
            } else if !view.status_options.is_empty() {
                let options: Vec<String> = view
                    .status_options
                    .iter()
                    .map(|o| format!("{} ({})", o.id, o.description))
                    .collect();
                let label = if view.can_propose() {
                    "options"
                } else {
                    "options (view only)"
                };
                lines.push(format!("{label}: {}", options.join(", ")));
            }
        }
    }

    if let Some(pending) = &view.pending_status_change {
        let state = if view.phase == WorkflowPhase::Committing {
            "committing"
        } else {
            "confirm?"
        };
        lines.push(
            style(format!(
                "pending: {} -> {} [{state}]",
                pending.guide_id, pending.status.id
            ))
            .cyan()
            .to_string(),
        );
    }
    if view.success {
        lines.push(style("status changed").green().to_string());
    }
    if let Some(notice) = &view.notice {
        lines.push(
            style(format!(
                "{} ({}, request {})",
                notice.message,
                notice.status,
                notice.request_id.as_deref().unwrap_or("-")
            ))
            .red()
            .to_string(),
        );
    }
    lines
}

fn redraw(term: &Term, view: &OperatorView, feedback: Option<&str>) -> std::io::Result<()> {
    term.clear_screen()?;
    term.write_line(&render_guides(view).to_string())?;
    for line in render_detail(view) {
        term.write_line(&line)?;
    }
    if let Some(feedback) = feedback {
        term.write_line(feedback)?;
    }
    term.write_line(&style(HELP).dim().to_string())
}

/// Apply one console command. The flag turns `false` once the console
/// should exit; the message is shown under the view.
async fn dispatch(
    handle: &OperatorActorHandle,
    view: &Arc<OperatorView>,
    command: ConsoleCommand,
) -> (bool, Option<String>) {
    match command {
        ConsoleCommand::Select(id) => handle.select(id).await,
        ConsoleCommand::Propose {
            status_id,
            via_guide_id,
        } => match view.find_status_option(&status_id) {
            Some(option) => handle.propose_status(option.clone(), via_guide_id).await,
            None => return (true, Some(format!("unknown status option: {status_id}"))),
        },
        ConsoleCommand::Confirm => handle.confirm_commit().await,
        ConsoleCommand::Cancel => handle.cancel().await,
        ConsoleCommand::Dismiss => {
            handle.dismiss_success().await;
            handle.dismiss_notice().await;
        }
        ConsoleCommand::Help => return (true, Some(HELP.to_string())),
        ConsoleCommand::Quit => return (false, None),
    }
    (true, None)
}

pub async fn run_operator(config: &Config) -> anyhow::Result<()> {
    let ctx = config.operator_context()?;
    let api = Arc::new(ApiClient::new(config).context("building API client")?);
    let feed = StreamClient::new(config).context("building stream client")?;
    let redirect = LoginRedirect::new(&config.api_url, &config.web_url, |url| {
        let _ = Term::stderr().write_line(&format!("Session expired. Log in at {url}"));
    });

    info!(
        component = "console",
        event = "console.operator.started",
        operator_id = ctx.operator_id,
        api_url = %config.api_url,
        "Operator console started"
    );

    let handle = OperatorActorHandle::spawn(
        OperatorDeps {
            api,
            feed,
            redirect,
            reconnect: config.reconnect.policy(),
        },
        ctx,
    );

    let term = Term::stdout();
    let mut changes = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut feedback: Option<String> = None;

    loop {
        let view = handle.view();
        redraw(&term, &view, feedback.as_deref())?;
        if view.stream == StreamPhase::Redirecting {
            break;
        }

        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let (keep_going, message) = match parse_command(&line) {
                    Ok(command) => dispatch(&handle, &view, command).await,
                    Err(message) => (true, Some(message)),
                };
                feedback = message;
                if !keep_going {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.teardown().await;
    info!(
        component = "console",
        event = "console.operator.stopped",
        "Operator console stopped"
    );
    Ok(())
}
