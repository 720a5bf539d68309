// src/main.rs

use crossterm::{
    cursor::MoveTo,
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType},
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use nsc_timer::engine::output::{setup_output_device, AudioOutput, GraphBus};
use nsc_timer::engine::{AudioClock, CpalMic, MicSource, NoMic};
use nsc_timer::session::store::{JsonFileStore, MemoryStore, Store};
use nsc_timer::{EngineConfig, Mode, PlaybackState, SessionManager};

struct Args {
    songs: Vec<PathBuf>,
    intro: Option<PathBuf>,
    mode: Mode,
    no_mic: bool,
    config: PathBuf,
    data_dir: PathBuf,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        songs: Vec::new(),
        intro: None,
        mode: Mode::Hybrid,
        no_mic: false,
        config: PathBuf::from("nsc-timer.json"),
        data_dir: PathBuf::from("nsc-data"),
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = |name: &str| {
            it.next()
                .ok_or_else(|| anyhow::anyhow!("{name} needs a value"))
        };
        match arg.as_str() {
            "--intro" => args.intro = Some(PathBuf::from(value("--intro")?)),
            "--mode" => args.mode = value("--mode")?.parse().map_err(anyhow::Error::msg)?,
            "--config" => args.config = PathBuf::from(value("--config")?),
            "--data-dir" => args.data_dir = PathBuf::from(value("--data-dir")?),
            "--no-mic" => args.no_mic = true,
            _ => args.songs.push(PathBuf::from(&arg)),
        }
    }
    Ok(args)
}

fn mime_for(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "m4a" | "mp4" | "aac" => "audio/mp4",
        _ => "application/octet-stream",
    }
    .to_string()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Keyboard front end over the three mode sessions.
struct Console {
    sessions: SessionManager,
    message: String,
}

impl Console {
    fn handle_key(&mut self, key: KeyCode) {
        let mode = self.sessions.active_mode();
        let app = self.sessions.active_mut();
        let result: anyhow::Result<Option<String>> = match key {
            KeyCode::Char('b') | KeyCode::Char('B') => app
                .build_track()
                .map(|buf| Some(format!("Built {:.1}s run track", buf.duration_secs())))
                .map_err(Into::into),
            KeyCode::Char('s') | KeyCode::Char('S') => {
                app.start_run().map(|_| None).map_err(Into::into)
            }
            KeyCode::Char('p') | KeyCode::Char('P') => {
                app.pause();
                Ok(None)
            }
            KeyCode::Char('r') | KeyCode::Char('R') => {
                app.resume();
                Ok(None)
            }
            KeyCode::Char('t') | KeyCode::Char('T') => {
                app.restart();
                Ok(None)
            }
            KeyCode::Char('x') | KeyCode::Char('X') => {
                app.stop();
                Ok(None)
            }
            KeyCode::Char('c') | KeyCode::Char('C') => app
                .toggle_coach()
                .map(|on| Some(format!("Coach {}", if on { "on" } else { "off" })))
                .map_err(Into::into),
            KeyCode::Char('e') | KeyCode::Char('E') => app
                .export_wav()
                .map_err(anyhow::Error::from)
                .and_then(|wav| {
                    std::fs::write(&wav.file_name, &wav.bytes)?;
                    Ok(Some(format!("Exported {}", wav.file_name)))
                }),
            KeyCode::Char('u') | KeyCode::Char('U') => app
                .export_bundle()
                .map_err(anyhow::Error::from)
                .and_then(|json| {
                    let path = bundle_path(mode);
                    std::fs::write(&path, json)?;
                    Ok(Some(format!("Saved setup to {}", path.display())))
                }),
            KeyCode::Char('i') | KeyCode::Char('I') => {
                let path = bundle_path(mode);
                std::fs::read_to_string(&path)
                    .map_err(anyhow::Error::from)
                    .and_then(|text| Ok(app.import_bundle(&text)?))
                    .map(|_| Some(format!("Loaded setup from {}", path.display())))
            }
            KeyCode::Char('1') => {
                self.sessions.switch_to(Mode::Hybrid);
                Ok(None)
            }
            KeyCode::Char('2') => {
                self.sessions.switch_to(Mode::Speed);
                Ok(None)
            }
            KeyCode::Char('3') => {
                self.sessions.switch_to(Mode::Burnout);
                Ok(None)
            }
            _ => Ok(None),
        };
        match result {
            Ok(Some(msg)) => self.message = msg,
            Ok(None) => {}
            Err(e) => {
                log::warn!("{e}");
                self.message = e.to_string();
            }
        }
    }

    fn should_quit(&self, key: KeyCode) -> bool {
        matches!(key, KeyCode::Char('q') | KeyCode::Char('Q'))
    }

    fn run_tick(&mut self) -> anyhow::Result<()> {
        self.sessions.tick();

        let app = self.sessions.active();
        let ctl = app.controller();
        let state = ctl.state();
        let status = match state {
            PlaybackState::Running | PlaybackState::Paused | PlaybackState::Ended => format!(
                "{:>6.1}s / {:.1}s",
                ctl.position(),
                ctl.run_duration()
            ),
            _ => String::new(),
        };
        let coach = if ctl.graph().is_coach_active() { " 🎤" } else { "" };
        let warning = app
            .storage_warning()
            .map(|w| format!(" ⚠ {w}"))
            .unwrap_or_default();

        let mut out = std::io::stdout();
        write!(
            out,
            "{}{}[{}] {:?} {}{} | {} song(s){} | {}",
            MoveTo(0, 0),
            Clear(ClearType::CurrentLine),
            app.mode(),
            state,
            status,
            coach,
            app.playlist().len(),
            warning,
            self.message
        )?;
        out.flush()?;
        Ok(())
    }
}

fn bundle_path(mode: Mode) -> PathBuf {
    PathBuf::from(format!("nsc-{}-setup.json", mode.as_str()))
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args()?;
    let mut config = EngineConfig::load_from_disk(&args.config)?;

    let output = setup_output_device()?;
    if output.output_sample_rate != config.sample_rate {
        log::info!(
            "running at device rate {} Hz instead of {} Hz",
            output.output_sample_rate,
            config.sample_rate
        );
        config.sample_rate = output.output_sample_rate;
    }

    let bus = GraphBus::new();
    let audio = AudioOutput::start(output, bus.clone())?;
    let clock: Arc<dyn AudioClock> = Arc::new(audio.clock.clone());

    let data_dir = args.data_dir.clone();
    let no_mic = args.no_mic;
    let mut sessions = SessionManager::new(
        &config,
        clock,
        |mode| {
            let path = data_dir.join(format!("{}.json", mode.as_str()));
            match JsonFileStore::open(&path) {
                Ok(store) => Box::new(store) as Box<dyn Store>,
                Err(e) => {
                    log::warn!("{mode}: {e}, keeping this session in memory only");
                    Box::new(MemoryStore::new())
                }
            }
        },
        |_| {
            if no_mic {
                Box::new(NoMic) as Box<dyn MicSource>
            } else {
                Box::new(CpalMic)
            }
        },
    );
    for graph in sessions.graphs() {
        bus.attach(graph);
    }
    sessions.switch_to(args.mode);

    let app = sessions.active_mut();
    for path in &args.songs {
        let raw = std::fs::read(path)?;
        app.add_song(file_name(path), mime_for(path), raw)?;
    }
    if let Some(path) = &args.intro {
        let raw = std::fs::read(path)?;
        app.set_intro(file_name(path), mime_for(path), raw)?;
    }

    println!(
        "[B] Build | [S] Start | [P] Pause | [R] Resume | [T] Restart | [X] Stop | [C] Coach | [E] Export WAV | [U]/[I] Save/Load setup | [1-3] Mode | [Q] Quit"
    );

    let mut console = Console {
        sessions,
        message: String::new(),
    };

    enable_raw_mode()?;
    let terminal = RestoreOnDrop(disable_raw_mode);
    let result = event_loop(&mut console);
    drop(terminal);

    console.sessions.active_mut().stop();
    println!("\n🛑 Exiting timer.");
    result
}

/// Runs its restore step on drop, so raw mode is left even when the loop bails
/// out with an error.
struct RestoreOnDrop<F: FnMut() -> std::io::Result<()>>(F);

impl<F: FnMut() -> std::io::Result<()>> Drop for RestoreOnDrop<F> {
    fn drop(&mut self) {
        if let Err(e) = (self.0)() {
            log::error!("could not restore the terminal: {e}");
        }
    }
}

fn event_loop(console: &mut Console) -> anyhow::Result<()> {
    let frame = Duration::from_millis(50);
    console.run_tick()?;

    loop {
        if event::poll(frame)? {
            if let Event::Key(ev) = event::read()? {
                if ev.kind == KeyEventKind::Press {
                    if ev.code == KeyCode::Char('c') && ev.modifiers.contains(KeyModifiers::CONTROL)
                    {
                        return Ok(());
                    }
                    if console.should_quit(ev.code) {
                        return Ok(());
                    }
                    console.handle_key(ev.code);
                }
            }
        }
        console.run_tick()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn terminal_is_restored_when_the_loop_fails() {
        let restored = Cell::new(0);
        let run = || -> anyhow::Result<()> {
            let _guard = RestoreOnDrop(|| {
                restored.set(restored.get() + 1);
                Ok(())
            });
            anyhow::bail!("poll failed")
        };
        assert!(run().is_err());
        assert_eq!(restored.get(), 1);
    }

    #[test]
    fn mime_type_follows_the_extension() {
        assert_eq!(mime_for(Path::new("a/Song.MP3")), "audio/mpeg");
        assert_eq!(mime_for(Path::new("intro.wav")), "audio/wav");
        assert_eq!(mime_for(Path::new("noext")), "application/octet-stream");
    }
}
