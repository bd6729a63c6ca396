//! Line-oriented console front end.
//!
//! Each line becomes zero or more control events, for example
//! `press left`, `release left`, `up` (a single tap), `+`, `speed 40`,
//! `hold on`, `gimbal mast`, `quit`.

use crate::{error::InputError, session::ControlEvent, types::Direction};
use futures::stream::{self, Stream};
use std::str::FromStr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::warn;

fn direction(token: Option<&str>) -> Result<Direction, InputError> {
    let token = token.ok_or(InputError::MissingArgument("direction"))?;
    Direction::from_str(token).map_err(|_| InputError::UnknownDirection(token.to_string()))
}

/// Parse one console line.
pub fn parse_line(line: &str) -> Result<Vec<ControlEvent>, InputError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(Vec::new());
    }

    let mut tokens = line.split_whitespace();
    let head = tokens.next().unwrap_or_default().to_ascii_lowercase();
    let arg = tokens.next();

    let events = match head.as_str() {
        "press" => vec![ControlEvent::Press(direction(arg)?)],
        "release" => vec![ControlEvent::Release(direction(arg)?)],
        "stop" | "halt" => vec![ControlEvent::StopAll],
        "+" | "=" | "faster" => vec![ControlEvent::IncreaseSpeed],
        "-" | "slower" => vec![ControlEvent::DecreaseSpeed],
        "speed" => {
            let value = arg.ok_or(InputError::MissingArgument("speed"))?;
            let value = value
                .parse::<u8>()
                .map_err(|_| InputError::InvalidNumber(value.to_string()))?;
            vec![ControlEvent::SetSpeed(value)]
        }
        "hold" => match arg.map(str::to_ascii_lowercase).as_deref() {
            Some("on") => vec![ControlEvent::SetHoldMode(true)],
            Some("off") => vec![ControlEvent::SetHoldMode(false)],
            Some("toggle") | None => vec![ControlEvent::ToggleHoldMode],
            Some(other) => return Err(InputError::UnknownCommand(format!("hold {}", other))),
        },
        "gimbal" | "select" => {
            let name = arg.ok_or(InputError::MissingArgument("gimbal"))?;
            vec![ControlEvent::SelectGimbal(name.to_string())]
        }
        "quit" | "exit" => vec![ControlEvent::Quit],
        other => match Direction::from_str(other) {
            Ok(d) => vec![ControlEvent::Press(d), ControlEvent::Release(d)],
            Err(_) => return Err(InputError::UnknownCommand(other.to_string())),
        },
    };

    Ok(events)
}

/// Turn a line reader into a stream of control events. Bad lines are
/// logged and skipped; the stream ends with the input.
pub fn events<R>(reader: R) -> impl Stream<Item = ControlEvent>
where
    R: AsyncBufRead + Unpin,
{
    let lines = stream::unfold(reader.lines(), |mut lines| async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match parse_line(&line) {
                    Ok(events) => return Some((stream::iter(events), lines)),
                    Err(e) => warn!(error = %e, "ignoring input line"),
                },
                Ok(None) => return None,
                Err(e) => {
                    warn!(error = %e, "input closed");
                    return None;
                }
            }
        }
    });
    futures::StreamExt::flatten(lines)
}
