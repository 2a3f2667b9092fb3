use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use video2midi::{Config, VideoToMidi};

/// Video-to-MIDI percussion generator
#[derive(Parser)]
#[command(name = "video2midi")]
#[command(about = "Turn a video's colors and darkness into a five-track drum and bass MIDI file")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a video and write the MIDI file
    Generate {
        /// Input video file (anything ffmpeg can decode)
        input: PathBuf,

        /// Output MIDI file, replaced if it exists [default: output.mid]
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Custom configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Random seed for the bass line
        #[arg(long)]
        seed: Option<u64>,

        /// Leave out the bass line
        #[arg(long)]
        no_bass: bool,

        /// Leave out the snare drum
        #[arg(long)]
        no_snare: bool,

        /// Leave out the open hi-hat
        #[arg(long)]
        no_hi_hat: bool,

        /// Leave out the crash cymbal
        #[arg(long)]
        no_crash: bool,

        /// Leave out the toms
        #[arg(long)]
        no_toms: bool,

        /// Also write a JSON summary of the run
        #[arg(long)]
        report: Option<PathBuf>,

        /// Write a tempo meta event matching the configured BPM
        #[arg(long)]
        write_tempo: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,

        /// Quiet output
        #[arg(short, long)]
        quiet: bool,
    },
    /// Validate configuration file
    ValidateConfig {
        /// Configuration file to validate
        config: PathBuf,
    },
    /// Show default configuration
    ShowConfig,
}

fn init_logging(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            input,
            output,
            config,
            seed,
            no_bass,
            no_snare,
            no_hi_hat,
            no_crash,
            no_toms,
            report,
            write_tempo,
            verbose,
            quiet,
        } => {
            if verbose && quiet {
                anyhow::bail!("Cannot specify both --verbose and --quiet");
            }
            init_logging(verbose, quiet);

            let mut config = if let Some(config_path) = config {
                video2midi::config::load_config(config_path)?
            } else {
                Config::default()
            };

            config.tracks.bass &= !no_bass;
            config.tracks.snare &= !no_snare;
            config.tracks.hi_hat &= !no_hi_hat;
            config.tracks.crash &= !no_crash;
            config.tracks.toms &= !no_toms;
            config.export.write_tempo |= write_tempo;
            if report.is_some() {
                config.export.report_path = report;
            }
            let output = output.unwrap_or_else(|| config.export.output_path.clone());

            let mut processor = VideoToMidi::new(config);
            if let Some(seed) = seed {
                processor = processor.with_seed(seed);
            }

            if !quiet {
                println!("Generating MIDI from {}...", input.display());
            }

            let mut show_progress = |frames: usize| {
                if !quiet {
                    print!("\rFrames Processed: {}", frames);
                    let _ = std::io::stdout().flush();
                }
            };
            let report = processor.generate(&input, &output, &mut show_progress)?;

            if !quiet {
                println!();
                println!(
                    "MIDI file generated: {} ({} frames)",
                    output.display(),
                    report.frames_processed
                );
            }
        }
        Commands::ValidateConfig { config } => {
            let config = video2midi::config::load_config(config)?;
            println!("Configuration is valid");
            if let Ok(json) = serde_json::to_string_pretty(&config) {
                println!("{}", json);
            }
        }
        Commands::ShowConfig => {
            let config = Config::default();
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
    }

    Ok(())
}
