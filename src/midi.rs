use midir::{Ignore, MidiInput, MidiInputConnection, MidiInputPort};
use tracing::{debug, warn};

use crate::{
    config::MidiConfig,
    error::{Error, Result},
    session::SessionHandle,
};

const CLIENT_NAME: &str = "taptique";
const NOTE_ON: u8 = 0x90;

/// MIDI input port whose note-on messages are forwarded as taps.
///
/// The connection stays open for as long as this value lives.
pub struct MidiTapInput {
    _connection: MidiInputConnection<()>,
    port_name: String,
}

impl MidiTapInput {
    pub fn connect(config: &MidiConfig, session: SessionHandle) -> Result<Self> {
        let mut midi_in =
            MidiInput::new(CLIENT_NAME).map_err(|err| Error::MidiInit(err.to_string()))?;
        midi_in.ignore(Ignore::All);
        let target_port = find_port(&midi_in, &config.port)?;

        let port_name = midi_in
            .port_name(&target_port)
            .unwrap_or_else(|_| "<unknown>".into());

        let note = config.note;
        let connection = midi_in
            .connect(
                &target_port,
                "taptique-in",
                move |_stamp, message, _| {
                    if is_tap_message(message, note) {
                        debug!(?message, "midi tap");
                        if let Err(err) = session.tap() {
                            warn!("dropping midi tap: {err}");
                        }
                    }
                },
                (),
            )
            .map_err(|err| Error::Connection(err.to_string()))?;

        Ok(Self {
            _connection: connection,
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

/// First input port whose name contains `hint`, ignoring case. An empty hint
/// takes the first port.
fn find_port(midi_in: &MidiInput, hint: &str) -> Result<MidiInputPort> {
    let hint = hint.trim().to_lowercase();
    midi_in
        .ports()
        .into_iter()
        .find(|port| {
            hint.is_empty()
                || midi_in
                    .port_name(port)
                    .is_ok_and(|name| matches_hint(&name, &hint))
        })
        .ok_or_else(|| Error::PortNotFound(hint))
}

/// `hint` must already be trimmed and lowercased.
fn matches_hint(port_name: &str, hint: &str) -> bool {
    hint.is_empty() || port_name.to_lowercase().contains(hint)
}

/// Note-on with non-zero velocity, optionally restricted to one note.
fn is_tap_message(message: &[u8], note: Option<u8>) -> bool {
    match message {
        [status, key, velocity, ..] if status & 0xF0 == NOTE_ON && *velocity > 0 => {
            note.map_or(true, |wanted| wanted == *key)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{is_tap_message, matches_hint};

    #[test]
    fn port_hint_matches_substring_ignoring_case() {
        assert!(matches_hint("Traktor Kontrol X1 MIDI 1", "x1"));
        assert!(matches_hint("Any Port", ""));
        assert!(!matches_hint("IAC Driver Bus 1", "x1"));
    }

    #[test]
    fn note_on_is_a_tap() {
        assert!(is_tap_message(&[0x90, 36, 100], None));
        assert!(is_tap_message(&[0x9A, 36, 1], Some(36)));
    }

    #[test]
    fn ignores_other_messages() {
        // note-on with zero velocity is a note-off
        assert!(!is_tap_message(&[0x90, 36, 0], None));
        assert!(!is_tap_message(&[0x80, 36, 64], None));
        assert!(!is_tap_message(&[0xF8], None));
        assert!(!is_tap_message(&[0x90, 38, 100], Some(36)));
    }
}
