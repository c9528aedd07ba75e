//! Velvet CLI Application

use clap::{Parser, Subcommand};
use velvet_core::domain::{
    ConfigWatcher, LoudnessMeter, MasteringProfile, MeteringSnapshot, PresetManager,
};
use velvet_infra::control::{hot_reload_loop, CommandDispatcher};
use velvet_infra::rt::MasteringEngine;

const SAMPLE_RATE: f32 = 48000.0;
const BLOCK_SIZE: usize = 512;

#[derive(Parser)]
#[command(name = "velvet")]
#[command(about = "A mastering signal chain and loudness meter", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a test tone through the mastering chain and report loudness
    Render {
        /// Tone duration in seconds
        #[arg(long, default_value_t = 5.0)]
        seconds: f32,

        /// Tone frequency in Hz
        #[arg(long, default_value_t = 440.0)]
        freq: f32,

        /// Tone amplitude, linear full scale
        #[arg(long, default_value_t = 0.5)]
        amplitude: f32,

        /// Mastering profile (streaming, club, broadcast, vinyl, audiophile)
        #[arg(long, default_value = "streaming")]
        profile: String,

        /// Print the loudness summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Meter a test tone without processing it
    Measure {
        #[arg(long, default_value_t = 5.0)]
        seconds: f32,

        #[arg(long, default_value_t = 440.0)]
        freq: f32,

        #[arg(long, default_value_t = 0.5)]
        amplitude: f32,

        #[arg(long)]
        json: bool,
    },

    /// Run a live tone through the chain, printing meters and hot-reloading
    /// presets as their files change
    Monitor {
        #[arg(long, default_value_t = 440.0)]
        freq: f32,

        #[arg(long, default_value_t = 0.25)]
        amplitude: f32,

        #[arg(long, default_value = "streaming")]
        profile: String,
    },

    /// Inspect and manage mastering presets
    Presets {
        #[command(subcommand)]
        command: PresetCommands,
    },
}

#[derive(Subcommand)]
enum PresetCommands {
    /// List presets in the preset directory
    List,
    /// Write the factory presets for every profile
    SaveDefault,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    match cli.command {
        Commands::Render {
            seconds,
            freq,
            amplitude,
            profile,
            json,
        } => {
            let profile = MasteringProfile::from_name(&profile)
                .ok_or_else(|| anyhow::anyhow!("unknown profile: {profile}"))?;
            let snapshot =
                tokio::task::spawn_blocking(move || render(seconds, freq, amplitude, profile))
                    .await??;
            print_summary(&snapshot, json);
        }
        Commands::Measure {
            seconds,
            freq,
            amplitude,
            json,
        } => {
            let snapshot =
                tokio::task::spawn_blocking(move || measure(seconds, freq, amplitude)).await?;
            print_summary(&snapshot, json);
        }
        Commands::Monitor {
            freq,
            amplitude,
            profile,
        } => {
            let profile = MasteringProfile::from_name(&profile)
                .ok_or_else(|| anyhow::anyhow!("unknown profile: {profile}"))?;
            monitor(freq, amplitude, profile).await?;
        }
        Commands::Presets { command } => {
            let manager = PresetManager::new(PresetManager::default_preset_dir()?);
            match command {
                PresetCommands::List => {
                    for name in manager.list_presets().await? {
                        println!("{name}");
                    }
                }
                PresetCommands::SaveDefault => {
                    manager.save_factory_presets().await?;
                    tracing::info!("factory presets written");
                }
            }
        }
    }

    Ok(())
}

/// Push a sine through the full chain, draining meter reports as a host would
fn render(
    seconds: f32,
    freq: f32,
    amplitude: f32,
    profile: MasteringProfile,
) -> anyhow::Result<MeteringSnapshot> {
    let (mut engine, _controller, reports) = MasteringEngine::new(SAMPLE_RATE, profile);
    tracing::info!(profile = profile.name(), seconds, freq, "rendering");

    let total_blocks = ((seconds * SAMPLE_RATE) as usize).div_ceil(BLOCK_SIZE);
    let mut last = MeteringSnapshot::silent();
    for block in 0..total_blocks {
        let offset = block * BLOCK_SIZE;
        let mut left = tone_block(freq, amplitude, offset);
        let mut right = tone_block(freq, amplitude, offset);
        engine
            .process_block(&mut [&mut left, &mut right])
            .map_err(|e| anyhow::anyhow!("processing failed: {e}"))?;
        while let Some(snapshot) = reports.pop() {
            last = snapshot;
        }
    }
    Ok(last)
}

/// Live render loop with preset hot-reload
///
/// The audio runs on its own thread paced to real time; this task prints
/// meter reports and re-applies presets when their files change. Ctrl-C
/// stops it.
async fn monitor(freq: f32, amplitude: f32, profile: MasteringProfile) -> anyhow::Result<()> {
    let (mut engine, controller, reports) = MasteringEngine::new(SAMPLE_RATE, profile);

    let preset_dir = PresetManager::default_preset_dir()?;
    let watcher = ConfigWatcher::new(preset_dir.clone()).await?;
    let dispatcher = CommandDispatcher::new(controller, PresetManager::new(preset_dir), profile);

    std::thread::spawn(move || {
        let pace = std::time::Duration::from_secs_f32(BLOCK_SIZE as f32 / SAMPLE_RATE);
        let mut offset = 0_usize;
        loop {
            let mut left = tone_block(freq, amplitude, offset);
            let mut right = tone_block(freq, amplitude, offset);
            if engine.process_block(&mut [&mut left, &mut right]).is_err() {
                break;
            }
            offset += BLOCK_SIZE;
            std::thread::sleep(pace);
        }
    });

    let printer = async {
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(100));
        loop {
            ticker.tick().await;
            if let Some(s) = reports.latest() {
                println!(
                    "momentary {:>7.2}  short-term {:>7.2}  integrated {:>7.2}  true peak {:>7.2}",
                    s.momentary_lufs, s.short_term_lufs, s.integrated_lufs, s.true_peak_db
                );
            }
        }
    };

    tracing::info!("monitoring; Ctrl-C to stop");
    tokio::select! {
        _ = hot_reload_loop(&watcher, &dispatcher) => {}
        _ = printer => {}
        _ = tokio::signal::ctrl_c() => {}
    }
    Ok(())
}

/// Meter-only pass over the same test tone
fn measure(seconds: f32, freq: f32, amplitude: f32) -> MeteringSnapshot {
    let mut meter = LoudnessMeter::new(SAMPLE_RATE);
    let total_blocks = ((seconds * SAMPLE_RATE) as usize).div_ceil(BLOCK_SIZE);
    for block in 0..total_blocks {
        let offset = block * BLOCK_SIZE;
        let samples = tone_block(freq, amplitude, offset);
        meter.measure_block(&[&samples, &samples]);
    }
    meter.snapshot()
}

fn tone_block(freq: f32, amplitude: f32, offset: usize) -> Vec<f32> {
    (0..BLOCK_SIZE)
        .map(|i| {
            let t = (offset + i) as f32 / SAMPLE_RATE;
            (2.0 * std::f32::consts::PI * freq * t).sin() * amplitude
        })
        .collect()
}

fn print_summary(snapshot: &MeteringSnapshot, json: bool) {
    if json {
        let value = serde_json::json!({
            "momentary_lufs": snapshot.momentary_lufs,
            "short_term_lufs": snapshot.short_term_lufs,
            "integrated_lufs": snapshot.integrated_lufs,
            "true_peak_db": snapshot.true_peak_db,
        });
        println!("{value}");
    } else {
        println!("momentary:  {:>8.2} LUFS", snapshot.momentary_lufs);
        println!("short-term: {:>8.2} LUFS", snapshot.short_term_lufs);
        println!("integrated: {:>8.2} LUFS", snapshot.integrated_lufs);
        println!("true peak:  {:>8.2} dBTP", snapshot.true_peak_db);
    }
}
