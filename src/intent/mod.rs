//! Conversational intent engine
//!
//! Turns one skill request into one spoken answer. A turn resolves the
//! spoken device (by id, name, room or category word), executes the
//! matching backend command and phrases a German confirmation. Sessions
//! keep the conversation open and remember a command that is waiting
//! for a room answer.

mod command;
mod passthrough;
mod phrases;
mod session;
mod status;

pub use command::Command;
pub use session::{DEFAULT_SESSION_IDLE, MemorySessionStore, Session, SessionStore};

use std::sync::Arc;

use passthrough::{Caller, Outcome};
use phrases::{
    GOODBYE, GREETING, GREETING_SHORT, HELP, NO_DEVICE, NOT_UNDERSTOOD, OK, REPROMPT, SESSION_ENDED,
    ambiguous, confirm, enumerate, in_room, not_found, nothing_in, sentence,
};

use crate::backend::{CONFIRMATION_FULL, Connection, Connections, SpokenMapping};
use crate::normalize::{Bounds, normalize};
use crate::protocol::skill::{Intent, SkillEnvelope, SkillRequest, SkillResponse};
use crate::registry::{
    Characteristic, CommandMapping, Device, DeviceRegistry, Resolution, SharedRegistry, builtin_category,
};
use crate::security::AllowList;

const ROOM_ANSWER_INTENT: &str = "RoomAnswerIntent";

/// Handles conversational skill turns
pub struct IntentEngine {
    registry: SharedRegistry,
    connections: Connections,
    sessions: Arc<dyn SessionStore>,
    application_ids: AllowList,
}

/// A device picked for this turn
#[derive(Debug, Clone)]
struct Pick {
    device: Device,
    /// Another device is displayed under the same name
    shared: bool,
}

impl Pick {
    fn from_registry(registry: &DeviceRegistry, device: &Device) -> Self {
        Self {
            device: device.clone(),
            shared: registry.index().is_name_shared(&device.primary_name),
        }
    }

    /// Spoken reference, naming the room when the name alone is ambiguous
    fn reference(&self, article: Option<&str>, with_room: bool) -> String {
        let label = self.device.room_label();
        let room = label.as_deref().filter(|_| with_room && self.shared);
        in_room(
            &sentence(&[article.unwrap_or_default(), &self.device.primary_name]),
            room,
        )
    }
}

/// What the spoken device slot turned out to be
enum Subject {
    Device(Pick),
    Category(String),
    /// No device slot; the room alone may select devices
    Unspecified,
}

enum Resolved {
    Found(Subject),
    Ambiguous(Option<String>),
    NotFound,
}

/// How a turn leaves the session
enum Reply {
    /// Regular end of turn: the session follows its `active` flag
    Settle(SkillResponse),
    /// Early answer: the session is stored as is, the response keeps its own flag
    Keep(SkillResponse),
}

/// Direction of a power command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Switch {
    On,
    Off,
    Toggle,
}

impl Switch {
    fn parse(word: &str) -> Option<Self> {
        match word.to_lowercase().as_str() {
            "an" | "ein" | "on" => Some(Self::On),
            "aus" | "off" => Some(Self::Off),
            "um" | "toggle" => Some(Self::Toggle),
            _ => None,
        }
    }

    /// Past participle; `now_on` resolves a toggle of a single device
    fn participle(self, word: &str, now_on: Option<bool>) -> &'static str {
        match (self, now_on) {
            (Self::Toggle, Some(true)) => "eingeschaltet",
            (Self::Toggle, Some(false)) | (Self::Off, _) => "ausgeschaltet",
            (Self::Toggle, None) => "umgeschaltet",
            (Self::On, _) if word.eq_ignore_ascii_case("ein") => "eingeschaltet",
            (Self::On, _) => "angeschaltet",
        }
    }
}

/// Per-turn context
struct Turn {
    /// `None` for requests without a conversation; nothing is persisted then
    session_id: Option<String>,
    echo_id: String,
    echo_room: Option<String>,
    skill_room: Option<String>,
    application_id: Option<String>,
    session: Session,
    /// Conversation state when the request arrived
    in_session: bool,
}

impl Turn {
    fn say(&self, text: impl Into<String>) -> SkillResponse {
        SkillResponse::say(text, !self.in_session)
    }
}

impl IntentEngine {
    #[must_use]
    pub fn new(
        registry: SharedRegistry,
        connections: Connections,
        sessions: Arc<dyn SessionStore>,
        application_ids: AllowList,
    ) -> Self {
        Self {
            registry,
            connections,
            sessions,
            application_ids,
        }
    }

    /// Answer one skill request
    pub async fn handle(&self, envelope: &SkillEnvelope) -> SkillResponse {
        let mut turn = self.turn(envelope);
        tracing::debug!(
            session = ?turn.session_id,
            request = envelope.request.kind(),
            echo = %turn.echo_id,
            in_session = turn.in_session,
            "skill turn"
        );

        if let Some(token) = envelope.consent_token() {
            self.connections.set_reading("consentToken", token).await;
        }

        let reply = match &envelope.request {
            SkillRequest::LaunchRequest => {
                turn.session.active = true;
                self.announce("LaunchRequest", &turn).await;
                let level = self
                    .connections
                    .first()
                    .map_or(CONFIRMATION_FULL, |c| c.confirmation_level);
                let greeting = if level < CONFIRMATION_FULL { GREETING_SHORT } else { GREETING };
                Reply::Settle(turn.say(greeting).with_reprompt(REPROMPT))
            }
            SkillRequest::SessionEndedRequest => {
                turn.session = Session::default();
                self.announce("SessionEndedRequest", &turn).await;
                Reply::Settle(turn.say(SESSION_ENDED))
            }
            SkillRequest::IntentRequest { intent } => self.intent(intent, &mut turn).await,
            SkillRequest::Other => Reply::Settle(turn.say(GREETING_SHORT)),
        };

        self.finish(turn, reply)
    }

    fn turn(&self, envelope: &SkillEnvelope) -> Turn {
        let session = envelope
            .session_id()
            .and_then(|id| self.sessions.get(id))
            .unwrap_or_default();
        let echo_id = envelope.echo_id().unwrap_or("unknown").to_string();
        let application_id = envelope.application_id().map(ToString::to_string);

        Turn {
            session_id: envelope.session_id().map(ToString::to_string),
            echo_room: self.connections.room_of_echo(&echo_id).map(ToString::to_string),
            skill_room: application_id
                .as_deref()
                .and_then(|id| self.application_ids.room_of(id))
                .map(ToString::to_string),
            echo_id,
            application_id,
            in_session: session.active,
            session,
        }
    }

    fn finish(&self, turn: Turn, reply: Reply) -> SkillResponse {
        let Turn {
            session_id, session, ..
        } = turn;

        let (response, kept) = match reply {
            Reply::Keep(response) => (response, (!session.is_idle()).then_some(session)),
            Reply::Settle(mut response) => {
                let active = session.active;
                response.response.should_end_session = !active;
                let kept = active.then(|| Session {
                    active,
                    pending: session.pending,
                });
                (response, kept)
            }
        };

        let Some(id) = session_id else {
            return response;
        };
        match kept {
            Some(session) => self.sessions.put(&id, session),
            None => self.sessions.delete(&id),
        }
        response
    }

    /// Record the request on the assistant devices
    async fn announce(&self, intent: &str, turn: &Turn) {
        self.connections.set_reading("intent", intent).await;
        self.connections.set_reading("echoId", &turn.echo_id).await;
        self.connections
            .set_reading("echoRoom", turn.echo_room.as_deref().unwrap_or("unknown"))
            .await;
    }

    async fn intent(&self, intent: &Intent, turn: &mut Turn) -> Reply {
        tracing::info!(intent = %intent.name, session = ?turn.session_id, "intent request");

        if let Some(reply) = self.passthrough(intent, turn).await {
            return reply;
        }

        let pending = turn.session.pending.take();
        let mut command = if intent.name == ROOM_ANSWER_INTENT {
            let Some(command) = pending else {
                tracing::debug!(session = ?turn.session_id, "room answer without a pending command");
                return Reply::Settle(turn.say(NOT_UNDERSTOOD));
            };
            command
        } else {
            Command::new(&intent.name)
        };

        self.announce(&format!("IntentRequest {}", command.intent), turn).await;
        command.apply_slots(intent);
        command.default_room(turn.skill_room.as_deref(), turn.echo_room.as_deref());

        let subject = match self.resolve(&mut command).await {
            Resolved::Found(subject) => subject,
            Resolved::Ambiguous(room) => {
                let name = command.device.clone().unwrap_or_default();
                tracing::info!(device = %name, room = ?room, "ambiguous device name, asking for the room");
                let mut response = turn.say(ambiguous(&name, room.as_deref()));
                response.response.should_end_session = false;
                turn.session.pending = Some(command);
                return Reply::Keep(response);
            }
            Resolved::NotFound => {
                let name = command.device.as_deref().unwrap_or_default();
                tracing::info!(device = %name, room = ?command.room, "no device found");
                return Reply::Keep(turn.say(not_found(name, command.room.as_deref())));
            }
        };

        let response = match intent.name.as_str() {
            "AMAZON.StopIntent" => {
                turn.session.active = false;
                self.announce(&intent.name, turn).await;
                turn.say(GOODBYE)
            }
            "AMAZON.CancelIntent" => {
                self.announce(&intent.name, turn).await;
                turn.say(OK)
            }
            "AMAZON.HelpIntent" => turn.say(HELP),
            _ if command.intent == "StatusIntent" => self.status(&command, subject, turn).await,
            _ if command.characteristic.as_deref() == Some("On") => self.switch(&command, subject, turn).await,
            _ if command.intent == "DeviceListIntent" => self.device_list(&command, turn).await,
            _ if command.intent == "RoomListIntent" => self.room_list(turn).await,
            _ if command.characteristic.is_some() => self.set_characteristic(&command, subject, turn).await,
            _ => turn.say(NOT_UNDERSTOOD),
        };
        Reply::Settle(response)
    }

    /// Run the configured pass-through expressions for `intent`
    ///
    /// Returns `None` when no connection defines the intent.
    async fn passthrough(&self, intent: &Intent, turn: &Turn) -> Option<Reply> {
        let caller = Caller {
            echo_id: &turn.echo_id,
            echo_room: turn.echo_room.as_deref(),
            skill_room: turn.skill_room.as_deref(),
            application_id: turn.application_id.as_deref(),
            tag_application: self.application_ids.len() > 1,
        };

        let mut matched = false;
        for connection in self.connections.iter() {
            let Some(expression) = connection.passthrough_intents.get(&intent.name) else {
                continue;
            };
            matched = true;
            tracing::info!(connection = %connection.name(), intent = %intent.name, "pass-through intent");

            if let Outcome::Spoken { speech, keep_open } =
                passthrough::run(connection, expression, intent, &caller).await
            {
                let mut response = turn.say("");
                response.response.output_speech = speech;
                if keep_open {
                    response.response.should_end_session = false;
                }
                return Some(Reply::Keep(response));
            }
        }

        matched.then(|| Reply::Keep(turn.say(OK)))
    }

    /// Resolve the device slot to a device, a category or nothing
    ///
    /// A unique match found without a room adopts the device's room.
    async fn resolve(&self, command: &mut Command) -> Resolved {
        let Some(name) = command.device.clone() else {
            return Resolved::Found(Subject::Unspecified);
        };

        {
            let registry = self.registry.read().await;
            match find_device(&registry, &name, command) {
                Ok(Some(pick)) => return Resolved::Found(Subject::Device(pick)),
                Ok(None) => {}
                Err(room) => return Resolved::Ambiguous(room),
            }
        }

        let category = self
            .connections
            .category_of(&name)
            .or_else(|| builtin_category(&name))
            .map(ToString::to_string);
        match category {
            Some(category) => {
                tracing::debug!(word = %name, category = %category, "device word is a category");
                command.use_category();
                Resolved::Found(Subject::Category(category))
            }
            None => Resolved::NotFound,
        }
    }

    /// Devices a command acts on
    async fn picks(&self, subject: &Subject, room: Option<&str>) -> Vec<Pick> {
        match subject {
            Subject::Device(pick) => vec![pick.clone()],
            Subject::Category(category) => {
                self.skill_devices(|d| d.is_of_type(category) && room.is_none_or(|r| d.is_in_room(r)))
                    .await
            }
            Subject::Unspecified => match room {
                Some(room) => self.skill_devices(|d| d.is_in_room(room)).await,
                None => Vec::new(),
            },
        }
    }

    async fn skill_devices(&self, keep: impl Fn(&Device) -> bool) -> Vec<Pick> {
        let registry = self.registry.read().await;
        registry
            .skill_devices()
            .filter(|d| keep(d))
            .map(|d| Pick::from_registry(&registry, d))
            .collect()
    }

    /// Lowest confirmation level among the connections of `devices`
    fn confirmation_level<'a>(&self, devices: impl IntoIterator<Item = &'a Device>) -> u8 {
        devices
            .into_iter()
            .filter_map(|d| self.connections.get(&d.connection))
            .map(|c| c.confirmation_level)
            .min()
            .unwrap_or(CONFIRMATION_FULL)
    }

    fn cached(&self, device: &Device, mapping: &CommandMapping) -> Option<String> {
        self.connections
            .get(&device.connection)
            .and_then(|c| c.backend().cached_value(&mapping.inform_id))
    }

    async fn status(&self, command: &Command, subject: Subject, turn: &Turn) -> SkillResponse {
        let room = command.room.as_deref();
        let describe = |pick: &Pick| {
            let state = status::describe(&pick.device, |m| self.cached(&pick.device, m));
            status::status_sentence(&pick.device, state, room, pick.shared)
        };

        match subject {
            Subject::Device(pick) => turn.say(describe(&pick)),
            Subject::Unspecified if room.is_none() => turn.say(NOT_UNDERSTOOD),
            subject => {
                let picks = self.picks(&subject, room).await;
                if picks.is_empty() {
                    return turn.say(nothing_in(room, command.type_name.as_deref()));
                }
                let statuses: Vec<String> = picks.iter().map(describe).collect();
                turn.say(statuses.join(", "))
                    .with_card(format!("{}status", room.unwrap_or_default()), statuses.join("\n"))
            }
        }
    }

    async fn switch(&self, command: &Command, subject: Subject, turn: &Turn) -> SkillResponse {
        let word = command.value.as_deref().unwrap_or_default();
        let room = command.room.as_deref();
        let article = command.article.as_deref();

        if let Subject::Device(pick) = &subject {
            let spoken_name = command.device.as_deref().unwrap_or(&pick.device.primary_name);
            return match self.switch_device(&pick.device, spoken_name, word).await {
                Ok((switch, now_on)) => {
                    let text = format!(
                        "{} {}.",
                        sentence(&[article.unwrap_or_default(), &in_room(spoken_name, room)]),
                        switch.participle(word, Some(now_on))
                    );
                    let level = self.confirmation_level([&pick.device]);
                    turn.say(confirm(format!("Ich habe {text}"), level, turn.in_session))
                        .with_card("On", text)
                }
                Err(refusal) => turn.say(refusal),
            };
        }
        if matches!(subject, Subject::Unspecified) && room.is_none() {
            return turn.say(NO_DEVICE);
        }

        let picks = self.picks(&subject, room).await;
        if picks.is_empty() {
            return turn.say(nothing_in(room, command.type_name.as_deref()));
        }

        let mut done = Vec::new();
        let mut switched = Vec::new();
        let mut refusals = Vec::new();
        let mut last = None;
        for pick in &picks {
            match self.switch_device(&pick.device, &pick.device.primary_name, word).await {
                Ok((switch, _)) => {
                    last = Some(switch);
                    done.push(pick.reference(article, room.is_none()));
                    switched.push(&pick.device);
                }
                Err(refusal) => refusals.push(refusal),
            }
        }
        let Some(switch) = last else {
            return turn.say(refusals.join(" "));
        };

        let text = format!("{} {}.", enumerate(&done), switch.participle(word, None));
        let level = self.confirmation_level(switched);
        turn.say(confirm(format!("Ich habe {text}"), level, turn.in_session))
            .with_card("On", text)
    }

    /// Switch one device; returns the direction and the resulting power state
    async fn switch_device(&self, device: &Device, spoken_name: &str, word: &str) -> Result<(Switch, bool), String> {
        let refusal = || format!("Ich kann das Gerät mit Namen {spoken_name} nicht {word}schalten.");

        let Some(mapping) = device.mapping(Characteristic::On) else {
            return Err(refusal());
        };
        let switch = Switch::parse(word).ok_or_else(refusal)?;
        let Some(connection) = self.connections.get(&device.connection) else {
            tracing::warn!(device = %device.id, connection = %device.connection, "device without connection");
            return Err(refusal());
        };

        let on = match switch {
            Switch::On => true,
            Switch::Off => false,
            Switch::Toggle => !connection
                .backend()
                .cached_value(&mapping.inform_id)
                .is_some_and(|raw| mapping.reads_as_on(&raw)),
        };
        execute(connection, device, &mapping.power_command(&device.name, on)).await;
        Ok((switch, on))
    }

    async fn device_list(&self, command: &Command, turn: &Turn) -> SkillResponse {
        let room = command.room.as_deref();
        let picks = self
            .skill_devices(|d| room.is_none_or(|r| d.is_in_room(r)))
            .await;
        if picks.is_empty() {
            return turn.say(nothing_in(room, None));
        }

        let names: Vec<String> = picks.iter().map(|p| p.reference(None, room.is_none())).collect();
        let text = match room {
            Some(room) => format!("Im Raum {room} kenne ich {}.", enumerate(&names)),
            None => format!("Ich kenne {}.", enumerate(&names)),
        };
        turn.say(text).with_card("Geräte", names.join("\n"))
    }

    async fn room_list(&self, turn: &Turn) -> SkillResponse {
        let rooms: Vec<String> = {
            let registry = self.registry.read().await;
            registry.index().rooms().map(ToString::to_string).collect()
        };
        if rooms.is_empty() {
            return turn.say("Ich kenne keine Räume.");
        }
        turn.say(format!("Ich kenne die Räume {}.", enumerate(&rooms)))
            .with_card("Räume", rooms.join("\n"))
    }

    async fn set_characteristic(&self, command: &Command, subject: Subject, turn: &Turn) -> SkillResponse {
        let room = command.room.as_deref();
        let Some(value) = command.value.as_deref() else {
            return turn.say(NOT_UNDERSTOOD);
        };
        if matches!(subject, Subject::Unspecified) && room.is_none() {
            return turn.say(NOT_UNDERSTOOD);
        }

        let picks = self.picks(&subject, room).await;
        if picks.is_empty() {
            return turn.say(nothing_in(room, command.type_name.as_deref()));
        }

        let mut article = command.article.clone();
        let mut done = Vec::new();
        let mut refusals = Vec::new();
        let mut phrasing: Option<Arc<Connection>> = None;
        for pick in &picks {
            match self.set_on_device(&pick.device, command, value, &mut article).await {
                Ok(connection) => {
                    phrasing.get_or_insert(connection);
                    done.push(pick);
                }
                Err(refusal) => refusals.push(refusal),
            }
        }
        let Some(connection) = phrasing else {
            return turn.say(refusals.join(" "));
        };

        let vocabulary = &connection.vocabulary;
        let intent = command.intent.as_str();
        let first_form = |s: &str| s.split(';').next().unwrap_or_default().to_string();
        let prefix = vocabulary.prefix_of(intent).map(first_form).unwrap_or_default();
        let suffix = vocabulary.suffix_of(intent).map(first_form).unwrap_or_default();
        let perfect = vocabulary
            .verb_of(intent)
            .and_then(|verb| vocabulary.perfect_of(verb))
            .unwrap_or("gestellt");

        let names: Vec<String> = done.iter().map(|p| p.reference(article.as_deref(), true)).collect();
        let text = format!(
            "{}.",
            sentence(&[&enumerate(&names), &prefix, value, &suffix, perfect])
        );
        let level = self.confirmation_level(done.iter().map(|p| &p.device));
        turn.say(confirm(format!("Ich habe {text}"), level, turn.in_session))
            .with_card(intent, text)
    }

    /// Write a spoken value to one device
    ///
    /// Fills in the spoken article of the characteristic when none was said.
    async fn set_on_device(
        &self,
        device: &Device,
        command: &Command,
        value: &str,
        article: &mut Option<String>,
    ) -> Result<Arc<Connection>, String> {
        let spoken_name = command.device.as_deref().unwrap_or(&device.primary_name);
        let refusal = || format!("Ich kann {spoken_name} nicht auf {value} stellen.");

        let connection = self.connections.get(&device.connection).cloned().ok_or_else(refusal)?;
        let wanted = command.characteristic.as_deref().unwrap_or_default();
        let (characteristic, mapping) = std::iter::once(wanted)
            .chain(
                connection
                    .vocabulary
                    .characteristics_of(&command.intent)
                    .iter()
                    .map(String::as_str),
            )
            .find_map(|c| device.mapping_named(c).map(|m| (c, m)))
            .ok_or_else(refusal)?;

        let spoken = connection.vocabulary.spoken_for(characteristic, command.index);
        if let Some(spoken) = spoken
            && command.type_name.is_none()
            && article.is_none()
        {
            *article = spoken.articles.first().cloned();
        }

        let translated = spoken
            .and_then(|s| s.values.get(value))
            .map_or(value, String::as_str);
        let normalized = normalize(Some(mapping), translated, spoken.and_then(spoken_bounds))
            .map_err(|_| refusal())?;

        tracing::debug!(device = %device.id, characteristic, value = %normalized.to_backend(), "setting characteristic");
        execute(&connection, device, &mapping.set_command(&device.name, &normalized.to_backend())).await;
        Ok(connection)
    }
}

/// Look a device up by id and by spoken name
///
/// `Err` carries the room of an ambiguous lookup.
fn find_device(registry: &DeviceRegistry, name: &str, command: &mut Command) -> Result<Option<Pick>, Option<String>> {
    let by_id = || {
        registry
            .get(name)
            .filter(|d| d.exposure.skill())
            .map(|d| Pick::from_registry(registry, d))
    };

    if command.room.is_none()
        && let Some(pick) = by_id()
    {
        return Ok(Some(pick));
    }

    if let Some(room) = command.room.as_deref() {
        match registry.resolve(name, Some(room)) {
            Resolution::Unique(device) => return Ok(Some(Pick::from_registry(registry, device))),
            Resolution::Ambiguous(_) => return Err(Some(room.to_string())),
            Resolution::NotFound => {}
        }
    }

    match registry.resolve(name, None) {
        Resolution::Unique(device) => {
            command.room = device.room_label();
            return Ok(Some(Pick::from_registry(registry, device)));
        }
        Resolution::Ambiguous(_) => return Err(None),
        Resolution::NotFound => {}
    }

    Ok(by_id())
}

/// Spoken value bounds, ignored when inverted
fn spoken_bounds(spoken: &SpokenMapping) -> Option<Bounds> {
    if spoken.min_value.is_none() && spoken.max_value.is_none() {
        return None;
    }
    let bounds = Bounds::new(
        spoken.min_value.unwrap_or(f64::MIN),
        spoken.max_value.unwrap_or(f64::MAX),
    );
    (bounds.min <= bounds.max).then_some(bounds)
}

async fn execute(connection: &Connection, device: &Device, command: &str) {
    tracing::info!(device = %device.id, connection = %connection.name(), command, "sending command");
    if let Err(e) = connection.backend().execute(command).await {
        tracing::error!(device = %device.id, error = %e, "command failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::RwLock;

    use crate::backend::{Backend, Vocabulary};
    use crate::protocol::skill::Card;

    #[derive(Default)]
    struct Hub {
        commands: Mutex<Vec<String>>,
        readings: Mutex<HashMap<String, String>>,
        answer: String,
    }

    impl Hub {
        fn commands(&self) -> Vec<String> {
            self.commands
                .lock()
                .unwrap()
                .iter()
                .filter(|c| !c.starts_with("setreading"))
                .cloned()
                .collect()
        }

        fn reading(&self, pointer: &str, value: &str) {
            self.readings
                .lock()
                .unwrap()
                .insert(pointer.to_string(), value.to_string());
        }
    }

    #[async_trait]
    impl Backend for Hub {
        fn cached_value(&self, pointer: &str) -> Option<String> {
            self.readings.lock().unwrap().get(pointer).cloned()
        }

        async fn execute(&self, command: &str) -> crate::error::Result<String> {
            self.commands.lock().unwrap().push(command.to_string());
            Ok(self.answer.clone())
        }
    }

    fn lamp(name: &str, spoken: &str, room: &str) -> Device {
        Device::new(name, "fhem")
            .with_spoken_names(spoken)
            .with_rooms(room)
            .with_type("light")
            .with_mapping(Characteristic::On, CommandMapping::new(name, "state"))
    }

    fn blind() -> Device {
        Device::new("rollo_buero", "fhem")
            .with_spoken_names("rollo")
            .with_rooms("büro")
            .with_type("blind")
            .with_mapping(
                Characteristic::TargetPosition,
                CommandMapping::new("rollo_buero", "pct").with_bounds(Some(0.0), Some(100.0)),
            )
    }

    fn engine_with(hub: &Arc<Hub>, configure: impl FnOnce(&mut Connection)) -> IntentEngine {
        let mut registry = DeviceRegistry::new();
        registry.register(lamp("wz_lampe", "lampe", "wohnzimmer"));
        registry.register(lamp("k_lampe", "lampe", "küche"));
        registry.register(lamp("stehlampe", "stehlampe", "wohnzimmer"));
        registry.register(blind());

        let mut connection = Connection::new("fhem", hub.clone());
        configure(&mut connection);
        IntentEngine::new(
            Arc::new(RwLock::new(registry)),
            Connections::new(vec![connection]),
            Arc::new(MemorySessionStore::default()),
            AllowList::default(),
        )
    }

    fn engine(hub: &Arc<Hub>) -> IntentEngine {
        engine_with(hub, |_| {})
    }

    fn intent(session: &str, name: &str, slots: &[(&str, &str)]) -> SkillEnvelope {
        let slots: serde_json::Map<String, serde_json::Value> = slots
            .iter()
            .map(|(n, v)| ((*n).to_string(), json!({ "name": n, "value": v })))
            .collect();
        serde_json::from_value(json!({
            "session": { "new": false, "sessionId": session },
            "request": { "type": "IntentRequest", "intent": { "name": name, "slots": slots } }
        }))
        .unwrap()
    }

    fn launch(session: &str) -> SkillEnvelope {
        serde_json::from_value(json!({
            "session": { "new": true, "sessionId": session },
            "request": { "type": "LaunchRequest" }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn switches_a_unique_device() {
        let hub = Arc::new(Hub::default());
        let engine = engine(&hub);

        let response = engine
            .handle(&intent("s1", "OnIntent", &[("Device", "Stehlampe"), ("On_Value", "an")]))
            .await;

        assert_eq!(hub.commands(), vec!["set stehlampe on"]);
        assert_eq!(response.speech(), "Ich habe stehlampe angeschaltet.");
        assert!(response.response.should_end_session);
    }

    #[tokio::test]
    async fn asks_for_the_room_and_completes_the_command() {
        let hub = Arc::new(Hub::default());
        let engine = engine(&hub);

        let response = engine
            .handle(&intent("s1", "OnIntent", &[("Device", "lampe"), ("On_Value", "aus")]))
            .await;
        assert_eq!(
            response.speech(),
            "Ich habe mehr als ein Gerät mit Namen lampe gefunden. In welchem Raum meinst du?"
        );
        assert!(!response.response.should_end_session);
        assert!(hub.commands().is_empty());

        let response = engine
            .handle(&intent("s1", "RoomAnswerIntent", &[("Room", "Küche")]))
            .await;
        assert_eq!(hub.commands(), vec!["set k_lampe off"]);
        assert_eq!(response.speech(), "Ich habe lampe im Raum küche ausgeschaltet.");

        let response = engine
            .handle(&intent("s1", "RoomAnswerIntent", &[("Room", "Küche")]))
            .await;
        assert_eq!(response.speech(), NOT_UNDERSTOOD);
    }

    #[tokio::test]
    async fn requests_without_session_share_no_state() {
        let hub = Arc::new(Hub::default());
        let engine = engine(&hub);
        let sessionless = |name: &str, slots: serde_json::Value| -> SkillEnvelope {
            serde_json::from_value(json!({
                "context": { "System": { "user": { "accessToken": "t" } } },
                "request": { "type": "IntentRequest", "intent": { "name": name, "slots": slots } }
            }))
            .unwrap()
        };

        let response = engine
            .handle(&sessionless(
                "OnIntent",
                json!({
                    "Device": { "name": "Device", "value": "lampe" },
                    "On_Value": { "name": "On_Value", "value": "an" }
                }),
            ))
            .await;
        assert!(!response.response.should_end_session);

        let response = engine
            .handle(&sessionless(
                "RoomAnswerIntent",
                json!({ "Room": { "name": "Room", "value": "küche" } }),
            ))
            .await;
        assert_eq!(response.speech(), NOT_UNDERSTOOD);
        assert!(hub.commands().is_empty());
    }

    #[tokio::test]
    async fn cancel_drops_the_pending_command() {
        let hub = Arc::new(Hub::default());
        let engine = engine(&hub);

        engine
            .handle(&intent("s1", "OnIntent", &[("Device", "lampe"), ("On_Value", "an")]))
            .await;
        let response = engine.handle(&intent("s1", "AMAZON.CancelIntent", &[])).await;
        assert_eq!(response.speech(), OK);

        let response = engine
            .handle(&intent("s1", "RoomAnswerIntent", &[("Room", "küche")]))
            .await;
        assert_eq!(response.speech(), NOT_UNDERSTOOD);
        assert!(hub.commands().is_empty());
    }

    #[tokio::test]
    async fn launch_opens_and_stop_closes_the_session() {
        let hub = Arc::new(Hub::default());
        let engine = engine(&hub);

        let response = engine.handle(&launch("s1")).await;
        assert_eq!(response.speech(), GREETING);
        assert!(!response.response.should_end_session);

        let response = engine
            .handle(&intent("s1", "OnIntent", &[("Device", "stehlampe"), ("On_Value", "aus")]))
            .await;
        assert!(!response.response.should_end_session);

        let response = engine.handle(&intent("s1", "AMAZON.StopIntent", &[])).await;
        assert_eq!(response.speech(), GOODBYE);
        assert!(response.response.should_end_session);

        let response = engine.handle(&intent("s1", "AMAZON.HelpIntent", &[])).await;
        assert!(response.response.should_end_session);
    }

    #[tokio::test]
    async fn category_word_switches_every_device_of_the_room() {
        let hub = Arc::new(Hub::default());
        let engine = engine(&hub);

        let response = engine
            .handle(&intent(
                "s1",
                "OnIntent",
                &[("Device", "Licht"), ("Room", "Wohnzimmer"), ("On_Value", "an")],
            ))
            .await;

        assert_eq!(hub.commands(), vec!["set stehlampe on", "set wz_lampe on"]);
        assert_eq!(response.speech(), "Ich habe stehlampe und lampe angeschaltet.");
    }

    #[tokio::test]
    async fn toggle_reports_the_resulting_state() {
        let hub = Arc::new(Hub::default());
        hub.reading("stehlampe-state", "on");
        let engine = engine(&hub);

        let response = engine
            .handle(&intent("s1", "OnIntent", &[("Device", "stehlampe"), ("On_Value", "um")]))
            .await;
        assert_eq!(hub.commands(), vec!["set stehlampe off"]);
        assert!(response.speech().ends_with("ausgeschaltet."));
    }

    #[tokio::test]
    async fn unknown_device_is_named_in_the_answer() {
        let hub = Arc::new(Hub::default());
        let engine = engine(&hub);

        let response = engine
            .handle(&intent("s1", "OnIntent", &[("Device", "toaster"), ("On_Value", "an")]))
            .await;
        assert_eq!(response.speech(), "Ich habe kein Gerät mit Namen toaster gefunden.");
        assert!(hub.commands().is_empty());
    }

    #[tokio::test]
    async fn confirmation_level_shortens_the_answer() {
        let hub = Arc::new(Hub::default());
        let engine = engine_with(&hub, |c| c.confirmation_level = 1);

        let response = engine
            .handle(&intent("s1", "OnIntent", &[("Device", "stehlampe"), ("On_Value", "an")]))
            .await;
        assert_eq!(response.speech(), OK);
        assert_eq!(engine.handle(&launch("s2")).await.speech(), GREETING_SHORT);
    }

    #[tokio::test]
    async fn spoken_vocabulary_phrases_a_generic_value() {
        let hub = Arc::new(Hub::default());
        let engine = engine_with(&hub, |c| {
            c.vocabulary = Vocabulary::derive(&[SpokenMapping {
                characteristic: "TargetPosition".to_string(),
                verb: Some("stelle".to_string()),
                articles: vec!["den".to_string()],
                value_prefix: Some("auf".to_string()),
                value_suffix: Some("Prozent".to_string()),
                max_value: Some(100.0),
                ..SpokenMapping::default()
            }]);
        });

        let response = engine
            .handle(&intent(
                "s1",
                "prozentIntent",
                &[("Device", "rollo"), ("prozent_Value", "150")],
            ))
            .await;

        assert_eq!(hub.commands(), vec!["set rollo_buero pct 100"]);
        assert_eq!(response.speech(), "Ich habe den rollo auf 150 Prozent gestellt.");
        assert!(matches!(
            response.response.card,
            Some(Card::Simple { ref title, .. }) if title == "prozentIntent"
        ));
    }

    #[tokio::test]
    async fn status_of_a_room() {
        let hub = Arc::new(Hub::default());
        hub.reading("stehlampe-state", "on");
        hub.reading("wz_lampe-state", "off");
        let engine = engine(&hub);

        let response = engine
            .handle(&intent("s1", "StatusIntent", &[("Room", "wohnzimmer")]))
            .await;
        assert_eq!(
            response.speech(),
            "stehlampe im Raum wohnzimmer ist an, lampe im Raum wohnzimmer ist aus"
        );
    }

    #[tokio::test]
    async fn room_list_names_every_room() {
        let hub = Arc::new(Hub::default());
        let engine = engine(&hub);

        let response = engine.handle(&intent("s1", "RoomListIntent", &[])).await;
        assert_eq!(response.speech(), "Ich kenne die Räume büro, küche und wohnzimmer.");
    }

    #[tokio::test]
    async fn passthrough_command_speaks_the_hub_answer() {
        let hub = Arc::new(Hub {
            answer: "22 Grad".to_string(),
            ..Hub::default()
        });
        let engine = engine_with(&hub, |c| {
            c.passthrough_intents
                .insert("TempIntent".to_string(), "get thermo reading temp".to_string());
        });

        let response = engine.handle(&intent("s1", "TempIntent", &[])).await;
        assert_eq!(response.speech(), "22 Grad");
        assert_eq!(hub.commands(), vec!["get thermo reading temp"]);
    }
}
