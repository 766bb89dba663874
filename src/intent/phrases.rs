//! Spoken answers (German)

use crate::backend::CONFIRMATION_FULL;

pub const GREETING: &str = "Hallo. Wie kann ich helfen?";
pub const GREETING_SHORT: &str = "Hallo.";
pub const REPROMPT: &str = "Noch jemand da?";
pub const SESSION_ENDED: &str = "Bye";
pub const GOODBYE: &str = "Bis bald.";
pub const OK: &str = "OK.";
pub const NOT_UNDERSTOOD: &str = "Das habe ich leider nicht verstanden.";
pub const NO_DEVICE: &str = "Ich habe kein Gerät gefunden.";
pub const HELP: &str = "Du kannst Geräte schalten, zum Beispiel: schalte die Lampe im Wohnzimmer an. \
                        Du kannst Werte setzen, zum Beispiel: stelle den Rolladen auf 50 Prozent. \
                        Du kannst nach dem Status fragen, zum Beispiel: wie ist der Status im Büro. \
                        Welche Geräte und Räume ich kenne, erfährst du mit: welche Geräte kennst du.";

/// Join the non-empty parts with single spaces
#[must_use]
pub fn sentence(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `a`, `a und b`, `a, b und c`
#[must_use]
pub fn enumerate<S: AsRef<str>>(items: &[S]) -> String {
    match items {
        [] => String::new(),
        [only] => only.as_ref().to_string(),
        [init @ .., last] => {
            let init: Vec<&str> = init.iter().map(AsRef::as_ref).collect();
            format!("{} und {}", init.join(", "), last.as_ref())
        }
    }
}

/// Spoken number with a decimal comma
#[must_use]
pub fn decimal_comma(raw: &str) -> String {
    raw.replacen('.', ",", 1)
}

/// `name` or `name im Raum room`
#[must_use]
pub fn in_room(name: &str, room: Option<&str>) -> String {
    match room {
        Some(room) => format!("{name} im Raum {room}"),
        None => name.to_string(),
    }
}

/// More than one device answers to `name`
#[must_use]
pub fn ambiguous(name: &str, room: Option<&str>) -> String {
    match room {
        Some(room) => format!("Ich habe mehr als ein Gerät mit Namen {name} im Raum {room} gefunden."),
        None => format!("Ich habe mehr als ein Gerät mit Namen {name} gefunden. In welchem Raum meinst du?"),
    }
}

/// No device answers to `name`
#[must_use]
pub fn not_found(name: &str, room: Option<&str>) -> String {
    format!("Ich habe kein Gerät mit Namen {} gefunden.", in_room(name, room))
}

/// Nothing matched a room or category filter
#[must_use]
pub fn nothing_in(room: Option<&str>, type_name: Option<&str>) -> String {
    let of_type = type_name.map(|t| format!("vom Typ {t}")).unwrap_or_default();
    match room {
        Some(room) => format!(
            "{}.",
            sentence(&["Ich habe keinen Raum", room, "mit Geräten", &of_type, "gefunden"])
        ),
        None => format!("Ich habe keine Geräte {of_type} gefunden."),
    }
}

/// Apply the confirmation level to a full confirmation
///
/// Level 0 is silent outside an open conversation, level 1 answers `OK.`.
#[must_use]
pub fn confirm(full: String, level: u8, in_session: bool) -> String {
    if !in_session && level < 1 {
        String::new()
    } else if level < CONFIRMATION_FULL {
        OK.to_string()
    } else {
        full
    }
}
