//! Line-oriented learner console: parsing typed commands and rendering updates.

use proctor_core::model::{Question, TestPaper};
use proctor_core::violation::{ClipboardAction, KeyCombo, PlatformSignal, WindowMetrics};
use proctor_core::{SessionInput, SessionSnapshot};
use services::SessionUpdate;
use thiserror::Error;

/// What one typed line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleAction {
    Input(SessionInput),
    /// Simulated host event, typed with a leading `!`.
    Signal(PlatformSignal),
    Show,
    Help,
}

/// Why a typed line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("{what} number required")]
    MissingNumber { what: &'static str },

    #[error("invalid {what} number: {raw}")]
    InvalidNumber { what: &'static str, raw: String },

    #[error("invalid key combo: {0}")]
    InvalidKey(String),

    #[error("unknown modifier: {0}")]
    UnknownModifier(String),

    #[error("resize needs four numbers")]
    MissingSize,

    #[error("invalid size: {0}")]
    InvalidSize(String),

    #[error("unknown signal: !{0}")]
    UnknownSignal(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),
}

fn one_based(raw: Option<&str>, what: &'static str) -> Result<usize, ParseError> {
    let raw = raw.ok_or(ParseError::MissingNumber { what })?;
    match raw.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(ParseError::InvalidNumber {
            what,
            raw: raw.to_owned(),
        }),
    }
}

fn parse_key(raw: &str) -> Result<KeyCombo, ParseError> {
    let mut parts: Vec<&str> = raw.split('+').collect();
    let key = parts
        .pop()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ParseError::InvalidKey(raw.to_owned()))?;
    let mut combo = KeyCombo::key(key);
    for modifier in parts {
        combo = match modifier.to_ascii_lowercase().as_str() {
            "ctrl" => combo.ctrl(),
            "shift" => combo.shift(),
            "alt" => combo.alt(),
            "meta" | "cmd" => combo.meta(),
            other => return Err(ParseError::UnknownModifier(other.to_owned())),
        };
    }
    Ok(combo)
}

fn parse_u32(raw: Option<&str>) -> Result<u32, ParseError> {
    let raw = raw.ok_or(ParseError::MissingSize)?;
    raw.parse()
        .map_err(|_| ParseError::InvalidSize(raw.to_owned()))
}

fn parse_signal(word: &str, rest: &mut std::str::SplitWhitespace<'_>) -> Result<PlatformSignal, ParseError> {
    let signal = match word {
        "hide" => PlatformSignal::VisibilityHidden,
        "visible" => PlatformSignal::VisibilityVisible,
        "blur" => PlatformSignal::WindowBlur,
        "focus" => PlatformSignal::WindowFocus,
        "print" => PlatformSignal::BeforePrint,
        "copy" => PlatformSignal::Clipboard {
            action: ClipboardAction::Copy,
        },
        "cut" => PlatformSignal::Clipboard {
            action: ClipboardAction::Cut,
        },
        "paste" => PlatformSignal::Clipboard {
            action: ClipboardAction::Paste,
        },
        "menu" => PlatformSignal::ContextMenu,
        "key" => PlatformSignal::KeyDown {
            combo: parse_key(rest.next().unwrap_or_default())?,
        },
        "resize" => PlatformSignal::Resize {
            metrics: WindowMetrics {
                outer_width: parse_u32(rest.next())?,
                outer_height: parse_u32(rest.next())?,
                inner_width: parse_u32(rest.next())?,
                inner_height: parse_u32(rest.next())?,
                user_agent: rest.collect::<Vec<_>>().join(" "),
            },
        },
        other => return Err(ParseError::UnknownSignal(other.to_owned())),
    };
    Ok(signal)
}

/// Parse one typed line. Blank lines yield `Ok(None)`.
///
/// Question and option numbers are 1-based as shown on screen.
pub fn parse_line(line: &str) -> Result<Option<ConsoleAction>, ParseError> {
    let mut words = line.split_whitespace();
    let Some(first) = words.next() else {
        return Ok(None);
    };
    let first = first.to_ascii_lowercase();

    if let Some(signal) = first.strip_prefix('!') {
        return parse_signal(signal, &mut words).map(|s| Some(ConsoleAction::Signal(s)));
    }

    let action = match first.as_str() {
        "n" | "next" => ConsoleAction::Input(SessionInput::Next),
        "p" | "prev" | "previous" => ConsoleAction::Input(SessionInput::Previous),
        "j" | "jump" => ConsoleAction::Input(SessionInput::JumpTo {
            index: one_based(words.next(), "question")?,
        }),
        "s" | "select" => ConsoleAction::Input(SessionInput::SelectCurrent {
            option: one_based(words.next(), "option")?,
        }),
        "u" | "unselect" | "clear" => ConsoleAction::Input(SessionInput::UnselectCurrent),
        "submit" => ConsoleAction::Input(SessionInput::RequestSubmit),
        "confirm" | "yes" => ConsoleAction::Input(SessionInput::ConfirmSubmit),
        "cancel" | "no" => ConsoleAction::Input(SessionInput::CancelSubmit),
        "show" | "?" => ConsoleAction::Show,
        "help" | "h" => ConsoleAction::Help,
        digits if digits.chars().all(|c| c.is_ascii_digit()) => {
            ConsoleAction::Input(SessionInput::SelectCurrent {
                option: one_based(Some(digits), "option")?,
            })
        }
        other => return Err(ParseError::UnknownCommand(other.to_owned())),
    };
    Ok(Some(action))
}

pub const HELP: &str = "\
Commands:
  n | next              next question
  p | prev              previous question
  j | jump <N>          go to question N
  <N> | select <N>      choose option N for the current question
  u | clear             clear the current answer
  submit                ask to submit
  confirm | cancel      answer the submit prompt
  show                  redraw the current question
Simulated host events:
  !hide !visible !blur !focus !print !copy !cut !paste !menu
  !key <combo>          e.g. !key ctrl+shift+i
  !resize <ow> <oh> <iw> <ih> [user agent]";

#[must_use]
pub fn format_clock(secs: u32) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

fn render_question(paper: &TestPaper, question: &Question, snapshot: &SessionSnapshot) -> String {
    let mut out = String::new();
    if let (Some(group), Some(parent)) = (&snapshot.group, question.parent_id()) {
        if let Some(passage) = paper.passage_for(parent) {
            out.push_str(&format!(
                "[passage, part {} of {}]\n{passage}\n\n",
                group.position, group.size
            ));
        }
    }
    out.push_str(&format!(
        "Q{}/{} [{}] {}\n",
        snapshot.current_index + 1,
        snapshot.total,
        question.category(),
        question.title()
    ));
    for (index, option) in question.options().iter().enumerate() {
        let marker = if snapshot.current_selected == Some(index) {
            "(x)"
        } else {
            "( )"
        };
        out.push_str(&format!("  {marker} {}. {option}\n", index + 1));
    }
    out
}

/// Full screen for a snapshot: status line plus the current question.
#[must_use]
pub fn render_snapshot(paper: &TestPaper, questions: &[Question], snapshot: &SessionSnapshot) -> String {
    let mut out = format!(
        "-- {} | {} left | answered {}/{} | violations {} | {} --\n",
        paper.title(),
        format_clock(snapshot.remaining_secs),
        snapshot.answered,
        snapshot.total,
        snapshot.violation_count,
        snapshot.phase
    );
    if let Some(question) = questions.get(snapshot.current_index) {
        out.push_str(&render_question(paper, question, snapshot));
    }
    if let Some(error) = &snapshot.last_error {
        out.push_str(&format!("Submission failed: {error}. Type confirm to retry.\n"));
    }
    out
}

/// One-line text for updates that are not full redraws.
#[must_use]
pub fn render_update(update: &SessionUpdate) -> Option<String> {
    match update {
        SessionUpdate::Tick { remaining_secs } if remaining_secs % 60 == 0 || *remaining_secs <= 10 => {
            Some(format!("time left {}", format_clock(*remaining_secs)))
        }
        SessionUpdate::Tick { .. } | SessionUpdate::Changed(_) => None,
        SessionUpdate::Warning { message, count, .. } => {
            Some(format!("WARNING: {message} (violations: {count})"))
        }
        SessionUpdate::Prevented(kind) => Some(format!("blocked: {}", kind.message())),
        SessionUpdate::ConfirmRequested { unanswered } if *unanswered > 0 => Some(format!(
            "{unanswered} question(s) unanswered. Submit anyway? (confirm/cancel)"
        )),
        SessionUpdate::ConfirmRequested { .. } => Some("Submit now? (confirm/cancel)".into()),
        SessionUpdate::Expired => Some("Time is up. Submitting your answers.".into()),
        SessionUpdate::Submitting => Some("Submitting...".into()),
        SessionUpdate::SubmitFailed { message } => Some(format!("Submission failed: {message}")),
        SessionUpdate::Finished(outcome) => Some(format!("Session finished: {outcome:?}")),
    }
}
