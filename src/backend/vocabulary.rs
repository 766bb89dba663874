//! Per-connection spoken vocabulary and text-format attribute parsers

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};

/// Spoken phrasing for one characteristic entry
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SpokenMapping {
    /// Characteristic name, e.g. `TargetPosition` or a custom one
    pub characteristic: String,
    #[serde(default)]
    pub verb: Option<String>,
    /// Articles, `;`-separated in configuration
    #[serde(default, deserialize_with = "semicolon_list")]
    pub articles: Vec<String>,
    #[serde(default)]
    pub value_prefix: Option<String>,
    #[serde(default)]
    pub value_suffix: Option<String>,
    /// Irregular past participle of the verb
    #[serde(default)]
    pub perfect: Option<String>,
    /// Spoken token → value
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    #[serde(default)]
    pub min_value: Option<f64>,
    #[serde(default)]
    pub max_value: Option<f64>,
}

fn semicolon_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect())
}

/// Derived lookup tables for confirmation phrasing
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    mappings: BTreeMap<String, Vec<SpokenMapping>>,
    verbs_of_intent: BTreeMap<String, Vec<String>>,
    characteristics_of_intent: BTreeMap<String, Vec<String>>,
    prefix_of_intent: BTreeMap<String, String>,
    suffix_of_intent: BTreeMap<String, String>,
    perfect_of_verb: BTreeMap<String, String>,
}

impl Vocabulary {
    /// Derive the intent tables from spoken mappings
    #[must_use]
    pub fn derive(spoken: &[SpokenMapping]) -> Self {
        let mut vocab = Self {
            perfect_of_verb: [
                ("stelle", "gestellt"),
                ("schalte", "geschaltet"),
                ("färbe", "gefärbt"),
                ("mach", "gemacht"),
            ]
            .into_iter()
            .map(|(v, p)| (v.to_string(), p.to_string()))
            .collect(),
            ..Self::default()
        };

        for mapping in spoken {
            vocab
                .mappings
                .entry(mapping.characteristic.clone())
                .or_default()
                .push(mapping.clone());
        }

        for (characteristic, entries) in &vocab.mappings {
            let mut index = 0_u8;
            for mapping in entries {
                let Some(verb) = &mapping.verb else {
                    continue;
                };

                let intent = match &mapping.value_suffix {
                    Some(suffix) => format!("{}Intent", lcfirst(suffix)),
                    None if index > 0 => format!("{characteristic}Intent{}", char::from(b'A' + index)),
                    None => format!("{characteristic}Intent"),
                };

                if let Some(perfect) = &mapping.perfect {
                    vocab.perfect_of_verb.insert(verb.clone(), perfect.clone());
                }
                push_unique(vocab.verbs_of_intent.entry(intent.clone()).or_default(), verb);
                push_unique(
                    vocab.characteristics_of_intent.entry(intent.clone()).or_default(),
                    characteristic,
                );
                set_or_clear(&mut vocab.prefix_of_intent, &intent, mapping.value_prefix.as_ref());
                set_or_clear(&mut vocab.suffix_of_intent, &intent, mapping.value_suffix.as_ref());
                index = index.saturating_add(1).min(25);
            }
        }

        tracing::debug!(
            intents = vocab.verbs_of_intent.len(),
            verbs = vocab.perfect_of_verb.len(),
            "derived spoken vocabulary"
        );
        vocab
    }

    /// Spoken mapping for a characteristic and intent variant
    #[must_use]
    pub fn spoken_for(&self, characteristic: &str, index: usize) -> Option<&SpokenMapping> {
        let entries = self.mappings.get(characteristic)?;
        entries
            .get(index)
            .or_else(|| entries.first().filter(|_| entries.len() == 1))
    }

    /// Characteristics an intent may act on when its literal one is unmapped
    #[must_use]
    pub fn characteristics_of(&self, intent: &str) -> &[String] {
        self.characteristics_of_intent
            .get(intent)
            .map_or(&[], Vec::as_slice)
    }

    /// First verb spoken for an intent
    #[must_use]
    pub fn verb_of(&self, intent: &str) -> Option<&str> {
        self.verbs_of_intent
            .get(intent)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    #[must_use]
    pub fn prefix_of(&self, intent: &str) -> Option<&str> {
        self.prefix_of_intent.get(intent).map(String::as_str)
    }

    #[must_use]
    pub fn suffix_of(&self, intent: &str) -> Option<&str> {
        self.suffix_of_intent.get(intent).map(String::as_str)
    }

    /// Past participle of a verb, if known
    #[must_use]
    pub fn perfect_of(&self, verb: &str) -> Option<&str> {
        self.perfect_of_verb.get(verb).map(String::as_str)
    }
}

fn lcfirst(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_lowercase().chain(chars).collect()
    })
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

fn set_or_clear(table: &mut BTreeMap<String, String>, intent: &str, value: Option<&String>) {
    match value {
        Some(v) => {
            table.insert(intent.to_string(), v.clone());
        }
        None => {
            table.remove(intent);
        }
    }
}

/// Split a `key:value` / `key=value` entry at the first separator
fn split_entry(entry: &str) -> Option<(&str, &str)> {
    let at = entry.find([':', '='])?;
    let (key, value) = (&entry[..at], &entry[at + 1..]);
    (!value.is_empty()).then_some((key, value))
}

/// Entries separated by whitespace or newlines, skipping `#` comments
fn entries(text: &str) -> impl Iterator<Item = &str> {
    text.split([' ', '\n'])
        .map(|e| e.trim_end_matches('\r'))
        .filter(|e| !e.is_empty() && !e.starts_with('#'))
}

/// Parse `type:alias1,alias2` (or `type=a;b`) entries
#[must_use]
pub fn parse_type_aliases(text: &str) -> BTreeMap<String, Vec<String>> {
    let mut types = BTreeMap::new();
    for entry in entries(text) {
        let Some((name, aliases)) = split_entry(entry) else {
            tracing::warn!(entry, "wrong syntax in type aliases");
            continue;
        };
        let aliases = aliases
            .split([',', ';'])
            .filter(|a| !a.is_empty())
            .map(str::to_lowercase)
            .collect();
        types.insert(name.to_string(), aliases);
    }
    types
}

/// Parse `echoId:room` entries; rooms are lower-cased
#[must_use]
pub fn parse_echo_rooms(text: &str) -> BTreeMap<String, String> {
    let mut rooms = BTreeMap::new();
    for entry in entries(text) {
        let Some((echo, room)) = split_entry(entry) else {
            tracing::warn!(entry, "wrong syntax in echo rooms");
            continue;
        };
        rooms.insert(echo.to_string(), room.to_lowercase());
    }
    rooms
}

/// Parse pass-through intents, one `expression:utterances` per line
///
/// Returns intent name → backend expression. `set`/`get`/`attr`
/// commands become `FHEM<verb>Intent`, `{…}` code becomes
/// `FHEMperlCodeIntent`, both numbered `B`, `C`… on repetition.
#[must_use]
pub fn parse_passthrough_intents(text: &str) -> BTreeMap<String, String> {
    let mut intents: BTreeMap<String, String> = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((expression, _utterances)) = split_entry(line) else {
            tracing::warn!(line, "wrong syntax in pass-through intents");
            continue;
        };

        let verb = ["set", "get", "attr"].into_iter().find(|verb| {
            expression
                .strip_prefix(verb)
                .is_some_and(|rest| rest.starts_with(char::is_whitespace))
        });

        let name = if let Some(verb) = verb {
            numbered(&intents, &format!("FHEM{verb}Intent"))
        } else if expression.starts_with('{') && expression.ends_with('}') {
            numbered(&intents, "FHEMperlCodeIntent")
        } else {
            format!("FHEM{expression}Intent")
        };

        intents.insert(name.replace(' ', ""), expression.to_string());
    }
    intents
}

/// First free name among `base`, `baseB`, `baseC`, …, `baseAA`, …
fn numbered(taken: &BTreeMap<String, String>, base: &str) -> String {
    let mut name = base.to_string();
    let mut i: u32 = 1;
    while taken.contains_key(&name) {
        name = if i < 26 {
            format!("{base}{}", letter(i))
        } else {
            format!("{base}{}{}", letter(i / 26 - 1), letter(i % 26))
        };
        i += 1;
    }
    name
}

fn letter(i: u32) -> char {
    char::from_u32(u32::from('A') + i % 26).unwrap_or('A')
}
