//! Spoken command assembled from an intent and its slots

use std::sync::LazyLock;

use regex::Regex;

use crate::protocol::skill::Intent;

static INTENT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)Intent([A-Z])?$").expect("valid regex"));

/// A partially or fully resolved command
///
/// Stored as the pending command of a session while waiting for a room
/// answer, then restored and completed by the answer's slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    /// Intent the command was spoken with
    pub intent: String,
    /// Characteristic named by the intent, e.g. `On` or `TargetPosition`
    pub characteristic: Option<String>,
    /// Variant of the intent, `A` = 0
    pub index: usize,
    pub value: Option<String>,
    pub article: Option<String>,
    /// Spoken device name; cleared when it turned out to be a category word
    pub device: Option<String>,
    pub preposition: Option<String>,
    pub room: Option<String>,
    /// Category word the device slot was resolved to
    pub type_name: Option<String>,
}

impl Command {
    /// Fresh command for `intent`
    #[must_use]
    pub fn new(intent: &str) -> Self {
        let (characteristic, index) = INTENT_NAME
            .captures(intent)
            .map_or((None, 0), |caps| {
                let index = caps
                    .get(2)
                    .and_then(|m| m.as_str().bytes().next())
                    .map_or(0, |b| usize::from(b - b'A'));
                (Some(caps[1].to_string()), index)
            });

        Self {
            intent: intent.to_string(),
            characteristic,
            index,
            ..Self::default()
        }
    }

    /// Merge the slots of `intent` into the command
    ///
    /// Slots that are missing or empty keep the current value, so a room
    /// answer only fills in the room.
    pub fn apply_slots(&mut self, intent: &Intent) {
        if self.characteristic.is_some()
            && let Some(value) = value_slot(&self.intent, intent)
        {
            self.value = Some(value.to_string());
        }

        let lower = |name: &str| intent.slot(name).map(str::to_lowercase);
        if let Some(article) = lower("article") {
            self.article = Some(article);
        }
        if let Some(device) = lower("Device") {
            self.device = Some(device);
        }
        if let Some(preposition) = lower("preposition") {
            self.preposition = Some(preposition);
        }
        if let Some(room) = lower("Room") {
            self.room = Some(room);
        }
    }

    /// Fill in the room from the skill's or the echo's default room
    pub fn default_room(&mut self, skill_room: Option<&str>, echo_room: Option<&str>) {
        if self.room.is_none() {
            self.room = skill_room.or(echo_room).map(ToString::to_string);
        }
    }

    /// Treat the device word as a category
    pub fn use_category(&mut self) {
        self.type_name = self.device.take();
        self.article = None;
    }
}

/// Value of the first slot named `<characteristic>[X]_…`
fn value_slot<'a>(intent_name: &str, intent: &'a Intent) -> Option<&'a str> {
    let stem = intent_name
        .rfind("Intent")
        .filter(|at| intent_name.len() - at <= "Intent".len() + 1)
        .map_or(intent_name, |at| &intent_name[..at]);

    intent
        .slots
        .keys()
        .filter(|name| {
            name.strip_prefix(stem).is_some_and(|rest| {
                rest.starts_with('_') || rest.chars().nth(1) == Some('_')
            })
        })
        .find_map(|name| intent.slot(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::skill::Slot;

    fn intent(name: &str, slots: &[(&str, &str)]) -> Intent {
        Intent {
            name: name.to_string(),
            slots: slots
                .iter()
                .map(|(n, v)| {
                    (
                        (*n).to_string(),
                        Slot {
                            name: (*n).to_string(),
                            value: Some((*v).to_string()),
                        },
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn parses_characteristic_and_variant() {
        let command = Command::new("OnIntent");
        assert_eq!(command.characteristic.as_deref(), Some("On"));
        assert_eq!(command.index, 0);

        let command = Command::new("TargetTemperatureIntentC");
        assert_eq!(command.characteristic.as_deref(), Some("TargetTemperature"));
        assert_eq!(command.index, 2);

        assert_eq!(Command::new("RoomAnswer").characteristic, None);
    }

    #[test]
    fn value_slot_is_prefixed_by_the_characteristic() {
        let spoken = intent(
            "TargetPositionIntentB",
            &[("Device", "Rollo"), ("TargetPositionB_Value", "50"), ("Room", "Büro")],
        );
        let mut command = Command::new(&spoken.name);
        command.apply_slots(&spoken);

        assert_eq!(command.value.as_deref(), Some("50"));
        assert_eq!(command.device.as_deref(), Some("rollo"));
        assert_eq!(command.room.as_deref(), Some("büro"));
        assert_eq!(command.article, None);
    }

    #[test]
    fn room_answer_only_fills_the_room() {
        let first = intent("OnIntent", &[("Device", "lamp"), ("On_Value", "an")]);
        let mut command = Command::new(&first.name);
        command.apply_slots(&first);

        command.apply_slots(&intent("RoomAnswerIntent", &[("Room", "Kitchen")]));
        assert_eq!(command.intent, "OnIntent");
        assert_eq!(command.device.as_deref(), Some("lamp"));
        assert_eq!(command.value.as_deref(), Some("an"));
        assert_eq!(command.room.as_deref(), Some("kitchen"));
    }

    #[test]
    fn default_room_prefers_the_skill_room() {
        let mut command = Command::new("OnIntent");
        command.default_room(Some("büro"), Some("küche"));
        assert_eq!(command.room.as_deref(), Some("büro"));

        let mut command = Command::new("OnIntent");
        command.default_room(None, Some("küche"));
        assert_eq!(command.room.as_deref(), Some("küche"));

        command.default_room(Some("büro"), None);
        assert_eq!(command.room.as_deref(), Some("küche"));
    }

    #[test]
    fn category_clears_device_and_article() {
        let mut command = Command::new("OnIntent");
        command.device = Some("licht".to_string());
        command.article = Some("das".to_string());
        command.use_category();

        assert_eq!(command.type_name.as_deref(), Some("licht"));
        assert_eq!(command.device, None);
        assert_eq!(command.article, None);
    }
}
