use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use crossbeam::channel;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use beatkeeper::audio::{
    AudioClock, AudioStream, ClickBank, ManualClock, RecordingSource, enumerate_output_devices,
    export_wav, render_offline,
};
use beatkeeper::config::Settings;
use beatkeeper::metronome::{
    ManualTimer, MetronomeEvent, PlaybackController, Scheduler, ThreadTimer, clamp_tempo,
};
use beatkeeper::ui::{App, TerminalUI};

/// Sample rate for `simulate --wav`.
const SIMULATION_SAMPLE_RATE: u32 = 48_000;

#[derive(Parser, Debug)]
#[command(name = "beatkeeper")]
#[command(author, version, about = "Terminal metronome with per-beat accents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Settings file path (default: ~/.config/beatkeeper/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (to debug.log while the UI is running)
    #[arg(long, global = true)]
    debug: bool,

    /// Tempo in BPM (20-400)
    #[arg(short, long, global = true)]
    tempo: Option<f64>,

    /// Beats per bar
    #[arg(short, long, global = true)]
    beats: Option<usize>,

    /// Output device name (see `beatkeeper devices`)
    #[arg(short, long)]
    device: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available output devices
    Devices,
    /// Run the scheduler offline and print the beat schedule
    Simulate {
        /// Length of the run in seconds
        #[arg(short, long, default_value_t = 4.0)]
        seconds: f64,

        /// Also render the clicks to this WAV file
        #[arg(long)]
        wav: Option<PathBuf>,
    },
    /// Show the settings file path
    ConfigPath,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.command.is_none())?;

    let settings_path = match &cli.config {
        Some(path) => path.clone(),
        None => Settings::config_path()?,
    };

    match cli.command {
        Some(Commands::ConfigPath) => {
            println!("{}", settings_path.display());
            Ok(())
        }
        Some(Commands::Devices) => {
            let devices = enumerate_output_devices()?;
            if devices.is_empty() {
                println!("No output devices found");
            } else {
                println!("Available output devices:");
                for name in devices {
                    println!("  {}", name);
                }
            }
            Ok(())
        }
        Some(Commands::Simulate { seconds, ref wav }) => {
            let settings = load_settings(&settings_path, &cli)?;
            simulate(&settings, seconds, wav.as_deref())
        }
        None => {
            let mut settings = load_settings(&settings_path, &cli)?;
            if let Some(device) = cli.device.clone() {
                settings.audio.device = Some(device);
            }
            run_tui(settings, settings_path)
        }
    }
}

fn init_logging(debug: bool, tui: bool) -> Result<()> {
    if tui {
        // stderr belongs to the terminal UI; log to a file or not at all.
        if debug {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open("debug.log")?;
            env_logger::Builder::new()
                .filter_level(log::LevelFilter::Debug)
                .target(env_logger::Target::Pipe(Box::new(file)))
                .init();
        }
    } else {
        let default_level = if debug { "debug" } else { "info" };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .init();
    }
    Ok(())
}

/// Settings from disk with command-line overrides applied.
fn load_settings(path: &Path, cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load(path)?;
    if let Some(tempo) = cli.tempo {
        settings.metronome.tempo = clamp_tempo(tempo);
    }
    if let Some(beats) = cli.beats {
        settings.metronome.beats.resize(beats)?;
    }
    Ok(settings)
}

fn run_tui(settings: Settings, settings_path: PathBuf) -> Result<()> {
    let audio = AudioStream::new(settings.audio.device.as_deref())?;
    let bank = ClickBank::load(
        audio.sample_rate(),
        settings.audio.accented_sample.as_deref(),
        settings.audio.normal_sample.as_deref(),
        settings.audio.soft_sample.as_deref(),
    )?;

    let (audio_event_sender, audio_event_receiver) = channel::bounded(64);
    let (_stream, sound) = audio.start(
        Arc::new(bank),
        &settings.audio_config(),
        audio_event_sender,
    )?;

    let clock = Arc::new(audio.clock());
    let (event_sender, event_receiver) = channel::unbounded();
    let scheduler = Scheduler::new(
        settings.metronome.beats.clone(),
        settings.metronome.tempo,
        settings.scheduler_config(),
        clock.clone(),
        sound,
        Arc::new(ThreadTimer::new()),
        event_sender,
    );
    let controller = PlaybackController::new(scheduler, clock.clone(), event_receiver);
    let app = App::new(controller, settings, Some(settings_path))
        .with_audio_events(audio_event_receiver);

    let mut ui = TerminalUI::new(app, audio.device_name())
        .map_err(|e| anyhow!("UI creation failed: {}", e))?;
    ui.run().map_err(|e| anyhow!("UI run failed: {}", e))?;
    drop(ui);

    clock.suspend();
    log::info!("Beatkeeper stopped");
    Ok(())
}

fn simulate(settings: &Settings, seconds: f64, wav: Option<&Path>) -> Result<()> {
    let clock = Arc::new(ManualClock::new(0.0));
    let timer = Arc::new(ManualTimer::new(Arc::clone(&clock)));
    let sound = Arc::new(RecordingSource::new());
    let (event_sender, event_receiver) = channel::unbounded();

    let scheduler = Scheduler::new(
        settings.metronome.beats.clone(),
        settings.metronome.tempo,
        settings.scheduler_config(),
        clock.clone(),
        sound.clone(),
        timer.clone(),
        event_sender,
    );

    log::info!(
        "Simulating {}s at {} BPM, {} beats per bar",
        seconds,
        settings.metronome.tempo,
        settings.metronome.beats.len()
    );
    scheduler.start();
    timer.run_until(seconds);
    scheduler.stop();

    for event in event_receiver.try_iter() {
        match event {
            MetronomeEvent::Beat { index, kind, at } => {
                println!("{:>10.4}s  beat {:>2}  {}", at, index + 1, kind.label());
            }
            MetronomeEvent::Error(err) => log::warn!("{}", err),
            _ => {}
        }
    }

    let triggers = sound.audible();
    println!("{} clicks in {}s", triggers.len(), seconds);

    if let Some(path) = wav {
        let bank = ClickBank::load(
            SIMULATION_SAMPLE_RATE,
            settings.audio.accented_sample.as_deref(),
            settings.audio.normal_sample.as_deref(),
            settings.audio.soft_sample.as_deref(),
        )?;
        let samples = render_offline(
            Arc::new(bank),
            &triggers,
            SIMULATION_SAMPLE_RATE,
            seconds,
            settings.audio.volume,
        );
        export_wav(path, &samples, SIMULATION_SAMPLE_RATE)?;
        println!("Rendered to {}", path.display());
    }
    Ok(())
}
