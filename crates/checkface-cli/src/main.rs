use anyhow::Result;
use checkface_capture::{CheckType, Config, Step};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod capture;
mod checkin;
mod compare;
mod replay;
mod setup;

#[derive(Parser)]
#[command(name = "checkface", version, about = "Face capture and liveness for attendance check-in")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Put a verified ArcFace model into the model cache
    Setup {
        /// Target directory (default: per-user cache, or /var/lib when root)
        #[arg(long)]
        model_dir: Option<PathBuf>,
        /// Copy from this local bundle instead of downloading
        #[arg(long)]
        bundled_dir: Option<PathBuf>,
    },
    /// Run the liveness pipeline over a recorded session and print each frame state
    Replay {
        /// JSON-lines file of detections (`null` for frames without a face)
        detections: PathBuf,
        /// Print full frame states as JSON
        #[arg(long)]
        json: bool,
    },
    /// Drive the capture state machine over a recorded session
    Capture {
        detections: PathBuf,
        /// Image returned by every photo call
        #[arg(long)]
        photo: PathBuf,
        /// Enroll the first capture under this name, then recognize
        #[arg(long)]
        enroll: Option<String>,
    },
    /// Enroll still images and match a probe image against them
    Compare {
        /// Gallery entry as NAME=PATH (repeatable)
        #[arg(long = "enroll", value_parser = compare::parse_enrollment)]
        gallery: Vec<(String, PathBuf)>,
        probe: PathBuf,
    },
    /// Run a guided check-in and submit it to the attendance endpoint
    CheckIn {
        detections: PathBuf,
        #[arg(long)]
        photo: PathBuf,
        /// Submit a check-out instead of a check-in
        #[arg(long)]
        out: bool,
        /// Comma-separated steps: front, smile, blink, frame (default: front,blink)
        #[arg(long, value_delimiter = ',')]
        steps: Vec<Step>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Command::Setup {
            model_dir,
            bundled_dir,
        } => setup::run(model_dir, bundled_dir, &config.model_dir),
        Command::Replay { detections, json } => replay::run(&detections, &config, json),
        Command::Capture {
            detections,
            photo,
            enroll,
        } => capture::run(&detections, &photo, enroll, &config).await,
        Command::Compare { gallery, probe } => compare::run(&gallery, &probe, &config),
        Command::CheckIn {
            detections,
            photo,
            out,
            steps,
        } => {
            let check_type = if out {
                CheckType::CheckOut
            } else {
                CheckType::CheckIn
            };
            checkin::run(&detections, &photo, check_type, steps, &config).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_check_in_steps() {
        let cli = Cli::try_parse_from([
            "checkface",
            "check-in",
            "session.jsonl",
            "--photo",
            "face.jpg",
            "--steps",
            "front,smile",
        ])
        .unwrap();
        match cli.command {
            Command::CheckIn { steps, out, .. } => {
                assert_eq!(steps, vec![Step::Front, Step::Smile]);
                assert!(!out);
            }
            _ => panic!("expected check-in"),
        }
    }
}
