//! Pass-through intents executed verbatim on the hub

use std::fmt::Write;
use std::sync::LazyLock;

use regex::Regex;

use crate::backend::Connection;
use crate::protocol::skill::{Intent, OutputSpeech};

static HUB_COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(set|get|attr)\s").expect("valid regex"));

static SSML: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^<speak>.*</speak>$").expect("valid regex"));

/// Who asked, as handed to the hub
#[derive(Debug, Clone, Default)]
pub struct Caller<'a> {
    pub echo_id: &'a str,
    pub echo_room: Option<&'a str>,
    pub skill_room: Option<&'a str>,
    pub application_id: Option<&'a str>,
    /// Tag the intent reading with the application id
    pub tag_application: bool,
}

impl Caller<'_> {
    fn room_reading(&self) -> &str {
        self.echo_room.unwrap_or("unknown")
    }

    fn application_tag(&self) -> String {
        match self.application_id {
            Some(id) if self.tag_application => format!(" :{id}"),
            _ => String::new(),
        }
    }
}

/// Result of a pass-through intent on one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The hub's answer is spoken as is
    Spoken {
        speech: OutputSpeech,
        keep_open: bool,
    },
    /// The intent was only recorded; further connections may match
    Recorded,
}

/// Run the expression configured for `intent` on `connection`
pub async fn run(connection: &Connection, expression: &str, intent: &Intent, caller: &Caller<'_>) -> Outcome {
    let device = connection.assistant_device.as_deref();
    let tag = caller.application_tag();
    let readings = device.map(|d| {
        format!(
            "setreading {d} fhemIntent {}{tag};setreading {d} echoId {};setreading {d} echoRoom {};",
            intent.name,
            caller.echo_id,
            caller.room_reading(),
        )
    });

    if HUB_COMMAND.is_match(expression) {
        let command = format!("{}{expression}", readings.unwrap_or_default());
        let answer = execute(connection, &command).await;
        return Outcome::Spoken {
            speech: OutputSpeech::plain(answer),
            keep_open: false,
        };
    }

    if expression.starts_with('{') && expression.ends_with('}') {
        let code = perl_wrapper(expression, device, intent, caller);
        let answer = execute(connection, &format!("{}{code}", readings.unwrap_or_default())).await;
        return spoken(&answer);
    }

    match device {
        Some(d) => {
            let command = format!(
                "setreading {d} echoId {};setreading {d} echoRoom {};setreading {d} fhemIntent {expression}{tag}",
                caller.echo_id,
                caller.room_reading(),
            );
            execute(connection, &command).await;
        }
        None => {
            tracing::warn!(connection = %connection.name(), intent = %intent.name, "pass-through intent needs an assistant device");
        }
    }
    Outcome::Recorded
}

async fn execute(connection: &Connection, command: &str) -> String {
    tracing::debug!(connection = %connection.name(), command, "pass-through");
    connection
        .backend()
        .execute(command)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(connection = %connection.name(), error = %e, "pass-through failed");
            String::new()
        })
}

/// Interpret a code answer: `&` keeps the conversation open, `<speak>` is SSML
fn spoken(answer: &str) -> Outcome {
    let (answer, keep_open) = match answer.strip_prefix('&') {
        Some(rest) => (rest, true),
        None => (answer, false),
    };
    let speech = if SSML.is_match(answer) {
        OutputSpeech::Ssml {
            ssml: answer.to_string(),
        }
    } else {
        OutputSpeech::plain(answer)
    };
    Outcome::Spoken { speech, keep_open }
}

/// Wrap hub code so slot values and caller details are available as `%…` specials
fn perl_wrapper(expression: &str, device: Option<&str>, intent: &Intent, caller: &Caller<'_>) -> String {
    let mut specials = String::new();
    let mut special = |key: &str, value: &str| {
        let _ = write!(specials, "\"%{key}\" => \"{}\",", escape_double(value));
    };

    if let Some(room) = caller.echo_room {
        special("Room", room);
    }
    if let Some(room) = caller.skill_room {
        special("Room", room);
    }
    if !intent.slots.is_empty() {
        let prefix = format!("{}_", intent.name);
        for (key, slot) in &intent.slots {
            let name = if slot.name.is_empty() { key } else { &slot.name };
            let name = name.strip_prefix(&prefix).unwrap_or(name);
            special(name, slot.value.as_deref().unwrap_or_default());
        }
        special("_echoId", caller.echo_id);
        if let Some(id) = caller.application_id {
            special("_applicationId", id);
        }
        if let Some(room) = caller.echo_room {
            special("_echoRoom", room);
        }
        if let Some(room) = caller.skill_room {
            special("_skillRoom", room);
        }
    }

    let client = device.map_or_else(|| "undef".to_string(), |d| format!("$defs{{\"{d}\"}}"));
    format!(
        "{{my %specials=({specials});; my $exec = EvalSpecials('{}', %specials);; return AnalyzePerlCommand({client}, $exec)}}",
        escape_single(expression)
    )
}

fn escape_double(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$' | '@') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn escape_single(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
