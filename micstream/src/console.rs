//! Line console for driving the head unit from a terminal.
//!
//! ```text
//! tap X Y                      tap at remote pixel (X, Y)
//! swipe X1 Y1 X2 Y2 [STEPS]    linear swipe
//! down|move|up|cancel NX NY    pointer event, normalized 0..1
//! home | back | up | down      shortcut buttons
//! audio start|stop|status      control the microphone stream
//! help | quit
//! ```

use micstream_core::{PointerPhase, RemoteAction, StreamError};

/// One parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Tap {
        x: i16,
        y: i16,
    },
    Swipe {
        from: (i16, i16),
        to: (i16, i16),
        steps: Option<u16>,
    },
    Pointer {
        phase: PointerPhase,
        nx: f32,
        ny: f32,
    },
    Action(RemoteAction),
    Audio(AudioCommand),
    Help,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCommand {
    Start,
    Stop,
    Status,
}

pub const HELP: &str = "\
commands:
  tap X Y                      tap at remote pixel (X, Y)
  swipe X1 Y1 X2 Y2 [STEPS]    linear swipe
  down|move|up|cancel NX NY    pointer event, normalized 0..1
  home | back | up | down      shortcut buttons
  audio start|stop|status      control the microphone stream
  help | quit";

/// Parse one line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, StreamError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();
    let head = head.to_ascii_lowercase();

    let cmd = match (head.as_str(), args.len()) {
        ("tap", 2) => ConsoleCommand::Tap {
            x: number(args[0])?,
            y: number(args[1])?,
        },
        ("swipe", 4 | 5) => ConsoleCommand::Swipe {
            from: (number(args[0])?, number(args[1])?),
            to: (number(args[2])?, number(args[3])?),
            steps: args.get(4).map(|s| number(s)).transpose()?,
        },
        ("down" | "move" | "up" | "cancel", 2) => ConsoleCommand::Pointer {
            phase: pointer_phase(&head)?,
            nx: number(args[0])?,
            ny: number(args[1])?,
        },
        ("audio", 1) => ConsoleCommand::Audio(match args[0] {
            "start" => AudioCommand::Start,
            "stop" => AudioCommand::Stop,
            "status" => AudioCommand::Status,
            other => return Err(format!("unknown audio command: {other}").into()),
        }),
        ("help" | "?", 0) => ConsoleCommand::Help,
        ("quit" | "exit", 0) => ConsoleCommand::Quit,
        (action, 0) => ConsoleCommand::Action(action.parse()?),
        (other, n) => return Err(format!("bad command: {other} with {n} argument(s)").into()),
    };
    Ok(Some(cmd))
}

fn pointer_phase(word: &str) -> Result<PointerPhase, StreamError> {
    match word {
        "down" => Ok(PointerPhase::Down),
        "move" => Ok(PointerPhase::Move),
        "up" => Ok(PointerPhase::Up),
        "cancel" => Ok(PointerPhase::Cancel),
        other => Err(format!("unknown pointer phase: {other}").into()),
    }
}

fn number<T: std::str::FromStr>(word: &str) -> Result<T, StreamError> {
    word.parse()
        .map_err(|_| StreamError::Other(format!("not a number: {word}")))
}

// ── Tests ────────────────────────────────────────────────────────
