use std::{
    io::{self, BufRead},
    path::{Path, PathBuf},
    sync::mpsc,
    thread,
    time::Instant,
};

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use taptique::{
    input::InputCommand, AppConfig, Error, TapSession, TempoConfig, TempoEstimator, TempoEvent,
};

const DEFAULT_CONFIG: &str = "taptique.yml";
const ICON: &str = "♩";

fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = load_config(std::env::args_os().nth(1).map(PathBuf::from))?;

    let (event_tx, event_rx) = mpsc::channel::<TempoEvent>();
    match TapSession::spawn(config.tempo.clone(), Some(event_tx)) {
        Ok(session) => run_with_session(session, event_rx, &config),
        Err(Error::Thread(err)) => {
            error!("could not start tap session ({err}), inactivity reset only runs on input");
            run_inline(config.tempo)
        }
        Err(err) => Err(err.into()),
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn load_config(arg: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    let path = match arg {
        Some(path) => path,
        None if Path::new(DEFAULT_CONFIG).exists() => PathBuf::from(DEFAULT_CONFIG),
        None => {
            info!("no config file, using defaults");
            return Ok(AppConfig::default());
        }
    };

    let config = AppConfig::load(&path)
        .with_context(|| format!("loading config from {}", path.display()))?;
    info!("loaded config from {}", path.display());
    Ok(config)
}

fn run_with_session(
    session: TapSession,
    events: mpsc::Receiver<TempoEvent>,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let printer = thread::Builder::new()
        .name("taptique-display".into())
        .spawn(move || {
            for event in events {
                print_event(event);
            }
        })
        .context("spawning display thread")?;

    let midi = connect_midi(config, &session);

    println!("{ICON}  (enter = tap, r = reset, s = status, q = quit)");

    for line in io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        match InputCommand::parse(&line) {
            Some(InputCommand::Tap) => session.tap()?,
            Some(InputCommand::Reset) => session.reset()?,
            Some(InputCommand::Status) => println!("{}", status_line(session.current_bpm()?)),
            Some(InputCommand::Quit) => break,
            None => warn!("unknown command {:?}", line.trim()),
        }
    }

    drop(midi);
    drop(session);
    if printer.join().is_err() {
        error!("display thread panicked");
    }
    Ok(())
}

/// Drive the estimator on the input thread when no session worker is available.
fn run_inline(config: TempoConfig) -> anyhow::Result<()> {
    let mut tapper = TempoEstimator::new(config)?;

    println!("{ICON}  (enter = tap, r = reset, s = status, q = quit)");

    for line in io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        let now = Instant::now();
        if tapper.expire(now) {
            println!("{}", label(None));
        }

        match InputCommand::parse(&line) {
            Some(InputCommand::Tap) => println!("{}", label(tapper.tap(now).bpm)),
            Some(InputCommand::Reset) => {
                tapper.reset();
                println!("{}", label(None));
            }
            Some(InputCommand::Status) => println!("{}", status_line(tapper.current_bpm())),
            Some(InputCommand::Quit) => break,
            None => warn!("unknown command {:?}", line.trim()),
        }
    }

    Ok(())
}

#[cfg(feature = "midi")]
fn connect_midi(config: &AppConfig, session: &TapSession) -> Option<taptique::midi::MidiTapInput> {
    let midi = config.midi.as_ref()?;
    match taptique::midi::MidiTapInput::connect(midi, session.handle()) {
        Ok(input) => {
            info!("listening for taps on MIDI port {}", input.port_name());
            Some(input)
        }
        Err(err) => {
            error!("MIDI taps disabled: {err}");
            None
        }
    }
}

#[cfg(not(feature = "midi"))]
fn connect_midi(config: &AppConfig, _session: &TapSession) -> Option<()> {
    if config.midi.is_some() {
        warn!("ignoring midi config, built without the `midi` feature");
    }
    None
}

fn print_event(event: TempoEvent) {
    match event {
        TempoEvent::Updated { bpm, .. } => println!("{}", label(bpm)),
        TempoEvent::Reset { reason } => {
            info!(?reason, "tempo cleared");
            println!("{}", label(None));
        }
    }
}

fn label(bpm: Option<u32>) -> String {
    match bpm {
        Some(bpm) => format!("{ICON} {bpm}"),
        None => ICON.to_string(),
    }
}

fn status_line(bpm: Option<u32>) -> String {
    match bpm {
        Some(bpm) => format!("Current: {bpm} BPM"),
        None => "Current: -- BPM".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_shows_icon_and_bpm() {
        assert_eq!(label(None), "♩");
        assert_eq!(label(Some(120)), "♩ 120");
    }

    #[test]
    fn status_line_formats_bpm() {
        assert_eq!(status_line(Some(98)), "Current: 98 BPM");
        assert_eq!(status_line(None), "Current: -- BPM");
    }
}
