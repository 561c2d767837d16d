// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

use std::env;
use std::fs::File;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pedaltake::audio::{print_devices, AudioConfig, CpalDevices, MixGraph, MixHandle, MonitorOutput};
use pedaltake::config::{AppConfig, ConfigEvent, ConfigWatcher, DEFAULT_CONFIG_FILE};
use pedaltake::control::{ControlAction, GilrsGamepad, KeyboardController};
use pedaltake::library::{DirectoryLibrary, SessionLibrary, TargetRef};
use pedaltake::studio::Studio;
use pedaltake::timing::{SharedClock, SystemClock};
use pedaltake::ui::{App, UiState};

/// Redraw cadence; fast enough for the beat flash
const FRAME_INTERVAL: Duration = Duration::from_millis(33);

fn print_usage() {
    println!("pedaltake - metronome and foot-pedal take recorder");
    println!();
    println!("Usage: pedaltake [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --config <PATH>     Config file (default: {})", DEFAULT_CONFIG_FILE);
    println!("  --target <NAME>     File takes and tempo defaults under NAME");
    println!("  --log <PATH>        Write logs to PATH instead of stderr");
    println!("  --write-config      Write the current config to --config and exit");
    println!("  --list-devices      List audio input and output devices");
    println!("  --help              Show this help message");
}

struct Args {
    config: PathBuf,
    target: Option<String>,
    log: Option<PathBuf>,
    write_config: bool,
}

enum Command {
    Run(Args),
    ListDevices,
    Help,
}

fn parse_args() -> Result<Command> {
    let mut args = Args {
        config: PathBuf::from(DEFAULT_CONFIG_FILE),
        target: None,
        log: None,
        write_config: false,
    };
    let mut iter = env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                args.config = iter
                    .next()
                    .map(PathBuf::from)
                    .ok_or_else(|| anyhow!("--config requires a path"))?;
            }
            "--target" => {
                args.target = Some(iter.next().ok_or_else(|| anyhow!("--target requires a name"))?);
            }
            "--log" => {
                args.log = Some(
                    iter.next()
                        .map(PathBuf::from)
                        .ok_or_else(|| anyhow!("--log requires a path"))?,
                );
            }
            "--write-config" => args.write_config = true,
            "--list-devices" => return Ok(Command::ListDevices),
            "--help" | "-h" => return Ok(Command::Help),
            other => return Err(anyhow!("Unknown option: {}", other)),
        }
    }

    Ok(Command::Run(args))
}

fn init_logging(log: Option<&PathBuf>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pedaltake=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match log {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Failed to create log file: {:?}", path))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

/// Returns false when the app should quit
fn apply_control(studio: &mut Studio, ui: &mut UiState, action: ControlAction) -> bool {
    match action {
        ControlAction::ToggleMetronome => studio.toggle_metronome(),
        ControlAction::ToggleAccent => studio.toggle_accent(),
        ControlAction::CycleTimeSignature => studio.cycle_time_signature(),
        ControlAction::ToggleRecordClick => studio.toggle_record_into_take(),
        ControlAction::AdjustTempo(delta) => studio.adjust_tempo(delta),
        ControlAction::TapTempo => {
            if let Some(tempo) = studio.tap_tempo() {
                ui.set_status(format!("tap tempo {}", tempo));
            }
        }
        ControlAction::SaveTempoDefault => {
            let _ = studio.save_tempo_default();
            let settings = studio.settings();
            ui.set_status(format!("default: {} {}", settings.tempo, settings.time_signature));
        }
        ControlAction::AdjustVolume(delta) => studio.adjust_volume(delta),
        ControlAction::ToggleCaptureMode => studio.toggle_capture_mode(),
        ControlAction::ReleaseStream => studio.release(),
        ControlAction::ToggleHelp => ui.show_help = !ui.show_help,
        ControlAction::Quit => return false,
    }
    true
}

fn apply_reload(studio: &mut Studio, ui: &mut UiState, config: &AppConfig) {
    match config.pedal_binding() {
        Ok(binding) => studio.set_pedal_binding(binding),
        Err(e) => warn!("ignoring pedal keys: {:#}", e),
    }
    let m = &config.metronome;
    match studio.set_metronome(m.tempo, m.beats_per_measure, m.beat_unit, m.accent_first_beat, m.record_into_take) {
        Ok(()) => studio.set_volume(m.volume),
        Err(e) => warn!("ignoring metronome settings: {}", e),
    }
    info!("config reloaded");
    ui.set_status("config reloaded");
}

/// Forward terminal key presses to the async side
fn spawn_key_reader(tx: mpsc::UnboundedSender<KeyEvent>) {
    thread::spawn(move || loop {
        match event::poll(Duration::from_millis(100)) {
            Ok(true) => match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    if tx.send(key).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => break,
            },
            Ok(false) => {
                if tx.is_closed() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}

async fn run(args: Args) -> Result<()> {
    let config = AppConfig::load_or_default(&args.config)?;
    if args.write_config {
        config.save(&args.config)?;
        println!("Wrote {:?}", args.config);
        return Ok(());
    }
    let studio_config = config.studio_config()?;

    let audio = AudioConfig::for_default_device();
    let mix = MixHandle::new(MixGraph::new(audio.sample_rate));

    // Keep the output alive for the whole session
    let monitor = match MonitorOutput::start(audio, mix.clone()) {
        Ok(monitor) => {
            info!(
                device = monitor.device_name(),
                latency_ms = monitor.config().latency_ms(),
                "clicks follow the output clock"
            );
            Some(monitor)
        }
        Err(e) => {
            warn!("no monitor output, clicks will be silent: {}", e);
            None
        }
    };
    let clock: SharedClock = match &monitor {
        Some(m) => m.clock() as SharedClock,
        None => Arc::new(SystemClock::new()),
    };

    let library = Arc::new(DirectoryLibrary::new(&config.library.root));
    let target = args.target.map(TargetRef::new);
    let stored_default = library.tempo_default(target.as_ref()).unwrap_or_else(|e| {
        warn!("could not read tempo defaults: {:#}", e);
        None
    });

    let devices = Arc::new(CpalDevices::new(mix.clone(), Arc::clone(&clock)));
    let library_dyn: Arc<dyn SessionLibrary> = library;
    let (mut studio, mut events) = Studio::new(studio_config, clock, mix, devices, library_dyn);
    studio.set_target(target);

    match GilrsGamepad::open() {
        Ok(pad) => studio.attach_gamepad(Box::new(pad)),
        Err(e) => warn!("gamepad pedals disabled: {:#}", e),
    }

    if let Some((tempo, sig)) = stored_default {
        let accent = studio.settings().accent_first_beat;
        let record = studio.record_into_take();
        if let Err(e) = studio.set_metronome(tempo.bpm(), sig.beats_per_measure(), sig.beat_unit(), accent, record) {
            warn!("stored tempo default rejected: {}", e);
        }
    }

    let watcher = if args.config.exists() {
        match ConfigWatcher::new(&args.config, None) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!("config hot reload disabled: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    let keyboard = KeyboardController::with_defaults();
    let mut ui = UiState::default();
    ui.set_help(&keyboard);
    ui.set_status("Press h for help, q to quit");

    let mut app = App::new()?;
    let (key_tx, mut keys) = mpsc::unbounded_channel();
    spawn_key_reader(key_tx);

    let mut frame = tokio::time::interval(FRAME_INTERVAL);
    loop {
        tokio::select! {
            Some(key) = keys.recv() => {
                if studio.handle_key(key.code) {
                    continue;
                }
                if let Some(action) = keyboard.resolve(key.code, key.modifiers) {
                    if !apply_control(&mut studio, &mut ui, action) {
                        break;
                    }
                }
            }
            Some(event) = events.recv() => ui.on_event(&event),
            _ = frame.tick() => {
                for event in watcher.iter().flat_map(|w| w.recv_all()) {
                    match event {
                        ConfigEvent::Reloaded(config) => apply_reload(&mut studio, &mut ui, &config),
                        ConfigEvent::Error(e) => {
                            warn!("{}", e);
                            ui.set_status(e);
                        }
                        ConfigEvent::Removed(path) => warn!(?path, "config file removed"),
                    }
                }
                ui.clear_expired_status();
                ui.refresh(&studio);
                app.draw(&ui)?;
            }
        }
    }

    studio.shutdown();
    drop(app);
    drop(monitor);
    Ok(())
}

fn main() -> Result<()> {
    let args = match parse_args() {
        Ok(Command::Run(args)) => args,
        Ok(Command::ListDevices) => {
            print_devices();
            return Ok(());
        }
        Ok(Command::Help) => {
            print_usage();
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            std::process::exit(1);
        }
    };

    init_logging(args.log.as_ref())?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(args))
}
