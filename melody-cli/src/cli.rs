use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use melody_core::StyleSpec;

#[derive(Parser, Debug)]
#[command(name = "melody", about = "Turn a sung melody into notes, key, tempo and a generation prompt")]
pub struct Cli {
    /// Pipeline config file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Include vocal characteristics (stability, vibrato, drift)
    #[arg(long, global = true)]
    pub vocal: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Record from the default microphone and analyze the take
    Listen {
        /// Recording length in seconds
        #[arg(short, long, default_value_t = 5.0)]
        seconds: f64,

        #[command(flatten)]
        tempo: TempoArgs,

        #[command(flatten)]
        style: StyleArgs,
    },
    /// Analyze a synthetic sine melody (no microphone needed)
    Demo {
        /// MIDI notes to synthesize, in order
        #[arg(long, value_delimiter = ',', default_values_t = vec![60u8, 64, 67])]
        midi: Vec<u8>,

        /// Length of each note in seconds
        #[arg(long, default_value_t = 1.0)]
        note_seconds: f64,

        /// Sample rate of the synthetic signal
        #[arg(long, default_value_t = 44100)]
        sample_rate: u32,

        #[command(flatten)]
        tempo: TempoArgs,

        #[command(flatten)]
        style: StyleArgs,
    },
    /// Answer newline-delimited JSON analysis requests on stdin
    Serve,
}

#[derive(Args, Debug, Clone, Copy)]
pub struct TempoArgs {
    /// Tempo the melody was sung at; replaces the estimated tempo
    #[arg(long)]
    pub bpm: Option<f64>,

    /// Quantize notes to this grid (16 = sixteenths); needs --bpm.
    /// Overrides `[segmenter] quantize_resolution`.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub quantize: Option<u32>,
}

#[derive(Args, Debug, Clone)]
pub struct StyleArgs {
    /// Genre for the generation prompt
    #[arg(long, default_value = "pop")]
    pub genre: String,

    /// Mood for the generation prompt
    #[arg(long, default_value = "upbeat")]
    pub mood: String,

    /// Instruments to feature (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub instruments: Vec<String>,

    /// Arrangement, e.g. "minimal" or "full band"
    #[arg(long)]
    pub arrangement: Option<String>,
}

impl From<StyleArgs> for StyleSpec {
    fn from(args: StyleArgs) -> Self {
        StyleSpec {
            genre: args.genre,
            mood: args.mood,
            instruments: args.instruments,
            arrangement: args.arrangement,
        }
    }
}
