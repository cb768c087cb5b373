//! Line commands for the interactive shell.

use std::fmt::Write as _;

use anyhow::{anyhow, bail, Result};
use chrono::Utc;

use crate::gate::ReportError;
use crate::geo::GeoPoint;
use crate::models::{LotStatus, SignalSource, UNKNOWN_STATUS_COLOR};
use crate::AppState;

pub const HELP: &str = "\
commands:
  lots                          list every lot with its current consensus
  search <text>                 find lots by name or id
  show <lot_id>                 consensus and server status for one lot
  at <lat> <lng> | at <lot_id>  set the simulated device position
  report <lot_id> <status> [post|agree|update]
  pace                          flag a PACE sighting near your position
  quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Lots,
    Search(String),
    Show(String),
    MoveTo(GeoPoint),
    MoveToLot(String),
    Report {
        lot_id: String,
        status: LotStatus,
        source: SignalSource,
    },
    Pace,
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let Some(verb) = parts.next() else {
            return Ok(Command::Help);
        };
        let rest: Vec<&str> = parts.collect();

        match (verb.to_ascii_lowercase().as_str(), rest.as_slice()) {
            ("lots", []) => Ok(Command::Lots),
            ("search", words) if !words.is_empty() => Ok(Command::Search(words.join(" "))),
            ("show", [lot_id]) => Ok(Command::Show(lot_id.to_string())),
            ("at", [lot_id]) => Ok(Command::MoveToLot(lot_id.to_string())),
            ("at", [lat, lng]) => {
                let lat: f64 = lat.parse().map_err(|_| anyhow!("invalid latitude {lat}"))?;
                let lng: f64 = lng.parse().map_err(|_| anyhow!("invalid longitude {lng}"))?;
                Ok(Command::MoveTo(GeoPoint::new(lat, lng)))
            }
            ("report", [lot_id, status, source @ ..]) if source.len() <= 1 => {
                let status =
                    LotStatus::parse(status).ok_or_else(|| anyhow!("unknown status {status}"))?;
                let source = source
                    .first()
                    .map(|s| SignalSource::parse(s))
                    .unwrap_or(SignalSource::Post);
                Ok(Command::Report {
                    lot_id: lot_id.to_string(),
                    status,
                    source,
                })
            }
            ("pace", []) => Ok(Command::Pace),
            ("help", _) => Ok(Command::Help),
            ("quit" | "exit", []) => Ok(Command::Quit),
            _ => bail!("unrecognized command: {line}"),
        }
    }
}

/// Backend status with its colour; lots the server has not scored yet show grey.
fn server_label(status: Option<LotStatus>) -> String {
    match status {
        Some(status) => format!("{} {}", status.label(), status.color()),
        None => format!("Unknown {UNKNOWN_STATUS_COLOR}"),
    }
}

pub(crate) async fn execute(state: &AppState, command: Command) -> Result<String> {
    let now = Utc::now();
    match command {
        Command::Lots => {
            let mut out = String::new();
            for view in state.session.views(now).await {
                writeln!(
                    out,
                    "{:<8} {:<32} {:<8} {:>4.0}%  {}",
                    view.lot_id,
                    view.name,
                    view.label,
                    view.confidence * 100.0,
                    view.updated_label
                )?;
            }
            Ok(out)
        }
        Command::Search(query) => {
            let hits = state.session.catalog().search(&query);
            if hits.is_empty() {
                return Ok(format!("no lots match {query:?}"));
            }
            Ok(hits
                .iter()
                .map(|lot| format!("{}  {}", lot.id, lot.name))
                .collect::<Vec<_>>()
                .join("\n"))
        }
        Command::Show(lot_id) => {
            let view = state
                .session
                .views(now)
                .await
                .into_iter()
                .find(|view| view.lot_id == lot_id)
                .ok_or_else(|| anyhow!("unknown lot {lot_id}"))?;
            let mut out = format!(
                "{} ({})\n  status: {} {}\n  confidence: {:.2}{}\n  updated: {}",
                view.name,
                view.lot_id,
                view.label,
                view.color,
                view.confidence,
                if view.is_confident { "" } else { " (low)" },
                view.updated_label
            );
            if let Some(pending) = view.pending {
                write!(out, "\n  pending: {}", pending.label())?;
            }
            if let Some(server) = state.server_status(&lot_id).await {
                write!(out, "\n  server: {}", server_label(server.status))?;
            }
            Ok(out)
        }
        Command::MoveTo(point) => {
            state.location.move_to(point).await;
            Ok(format!("position set to {:.5}, {:.5}", point.lat, point.lng))
        }
        Command::MoveToLot(lot_id) => {
            let lot = state
                .session
                .catalog()
                .get(&lot_id)
                .ok_or_else(|| anyhow!("unknown lot {lot_id}"))?;
            state.location.move_to(lot.location()).await;
            Ok(format!("position set to {}", lot.name))
        }
        Command::Report {
            lot_id,
            status,
            source,
        } => match state.session.submit_report(&lot_id, status, source).await {
            Ok(receipt) => {
                let mut out = format!("Report received: {} is {}.", lot_id, status.label());
                if !receipt.persisted {
                    out.push_str(" (saved locally only)");
                }
                Ok(out)
            }
            Err(err) => Ok(err.user_message()),
        },
        Command::Pace => Ok(match state.session.report_pace_sighting().await {
            Ok(sighting) => format!(
                "PACE spotted near {}. Thanks! Your report will show to others shortly.",
                sighting.cell_id
            ),
            Err(ReportError::PermissionDenied) => {
                "Location needed. We need your location to flag nearby PACE sightings.".to_string()
            }
            Err(err) => format!("Failed to report. {}", err.user_message()),
        }),
        Command::Help => Ok(HELP.to_string()),
        Command::Quit => Ok(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_report_with_default_source() {
        assert_eq!(
            Command::parse("report lot_79 full").unwrap(),
            Command::Report {
                lot_id: "lot_79".into(),
                status: LotStatus::Full,
                source: SignalSource::Post,
            }
        );
        assert_eq!(
            Command::parse("REPORT ramp_1 tight agree").unwrap(),
            Command::Report {
                lot_id: "ramp_1".into(),
                status: LotStatus::Filling,
                source: SignalSource::Agree,
            }
        );
    }

    #[test]
    fn unscored_server_status_is_grey() {
        assert_eq!(server_label(None), "Unknown #9ca3af");
        assert_eq!(server_label(Some(LotStatus::Full)), "FULL #ef4444");
    }

    #[test]
    fn parses_positions() {
        assert_eq!(
            Command::parse("at 42.726 -84.487").unwrap(),
            Command::MoveTo(GeoPoint::new(42.726, -84.487))
        );
        assert_eq!(
            Command::parse("at lot_79").unwrap(),
            Command::MoveToLot("lot_79".into())
        );
        assert!(Command::parse("at north -84.4").is_err());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(Command::parse("report lot_79 jammed").is_err());
        assert!(Command::parse("report lot_79").is_err());
        assert!(Command::parse("launch").is_err());
        assert_eq!(Command::parse("   ").unwrap(), Command::Help);
        assert_eq!(Command::parse("PACE").unwrap(), Command::Pace);
        assert!(Command::parse("pace lot_79").is_err());
        assert_eq!(
            Command::parse("search spartan stadium").unwrap(),
            Command::Search("spartan stadium".into())
        );
    }
}
