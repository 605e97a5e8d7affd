use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("tap session thread error: {0}")]
    Thread(String),
    #[error("tap session has stopped")]
    SessionClosed,
    #[cfg(feature = "midi")]
    #[error("failed to initialise MIDI input: {0}")]
    MidiInit(String),
    #[cfg(feature = "midi")]
    #[error("no MIDI input port matching \"{0}\" was found")]
    PortNotFound(String),
    #[cfg(feature = "midi")]
    #[error("failed to open MIDI connection: {0}")]
    Connection(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
