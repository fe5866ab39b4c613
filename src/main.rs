extern crate pretty_env_logger;
#[macro_use]
extern crate log;

use std::{path::PathBuf, process::exit, thread::available_parallelism, time::Duration};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use opencv::core::{get_num_threads, set_num_threads};
use stream_overlay::{
    img::{self, frame::Frame, matcher, OcrTuning, Template},
    overlay::{transport, OverlaySettings, RestartPolicy, TimerDirection},
    roi::StreamResolution,
};

/// Platform game stream overlay
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Config {
    #[clap(long, default_value_t = 0)]
    num_opencv_threads: i32,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Run the overlay against an event server
    Overlay(OverlayArgs),

    /// Print how much of two same-sized images match
    Similarity { first: PathBuf, second: PathBuf },

    /// Look for a template inside a frame
    FindTemplate {
        frame: PathBuf,
        template: PathBuf,

        #[clap(long, default_value_t = matcher::DEFAULT_MATCH_THRESHOLD)]
        threshold: f64,

        /// Width of the capture the template was cut from
        #[clap(long, default_value_t = 1920)]
        template_width: i32,

        /// Height of the capture the template was cut from
        #[clap(long, default_value_t = 1080)]
        template_height: i32,
    },

    /// Write the OCR-ready version of a frame
    Prepare {
        input: PathBuf,
        output: PathBuf,

        /// JSON file overriding the OCR tuning table
        #[clap(long)]
        tuning: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
struct OverlayArgs {
    /// WebSocket URL of the event server
    #[clap(short, long, default_value_t = transport::DEFAULT_URL.to_string())]
    connect: String,

    #[clap(long, default_value_t = transport::DEFAULT_RETRY.as_secs())]
    retry_secs: u64,

    /// JSON file with overlay settings; flags below override it
    #[clap(long)]
    settings: Option<PathBuf>,

    #[clap(long)]
    count_down: bool,

    #[clap(long)]
    warning_minutes: Option<u64>,

    /// Sound a warning when the timer reaches the warning time
    #[clap(long)]
    timer_warning: bool,

    #[clap(long)]
    hide_level_name: bool,

    #[clap(long)]
    hide_level_author: bool,

    /// Do not count a restart on an uncleared level as a death
    #[clap(long)]
    ignore_restarts: bool,
}

impl OverlayArgs {
    fn overlay_settings(&self) -> Result<OverlaySettings> {
        let mut settings = match &self.settings {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading settings {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing settings {}", path.display()))?
            }
            None => OverlaySettings::default(),
        };

        if self.count_down {
            settings.timer_direction = TimerDirection::CountDown;
        }
        if let Some(minutes) = self.warning_minutes {
            settings.timer_warning_minutes = minutes;
        }
        if self.timer_warning {
            settings.timer_warning = true;
        }
        if self.hide_level_name {
            settings.level_name_visible = false;
        }
        if self.hide_level_author {
            settings.level_author_visible = false;
        }
        if self.ignore_restarts {
            settings.restart_policy = RestartPolicy::Ignore;
        }

        Ok(settings)
    }
}

#[tokio::main]
async fn main() {
    pretty_env_logger::init_timed();

    let config = Config::parse();

    if let Err(error) = run(config).await {
        error!("{:#}", error);
        exit(1);
    }
}

async fn run(mut config: Config) -> Result<()> {
    if config.num_opencv_threads == 0 {
        config.num_opencv_threads = available_parallelism()
            .context("counting available cores")?
            .get() as i32
            / 2;
    }
    configure_opencv(config.num_opencv_threads).context("configuring opencv")?;

    match config.command {
        Command::Overlay(args) => {
            let settings = args.overlay_settings()?;
            debug!("overlay settings {:?}", settings);

            stream_overlay::start_overlay(
                settings,
                args.connect,
                Duration::from_secs(args.retry_secs),
            )
            .await;
        }
        Command::Similarity { first, second } => {
            let first = Frame::new(img::read_color(&first)?, 0);
            let second = Frame::new(img::read_color(&second)?, 1);
            let score = first
                .similarity(&second)
                .context("comparing frames")?;

            println!("{:.4}", score);
        }
        Command::FindTemplate {
            frame,
            template,
            threshold,
            template_width,
            template_height,
        } => {
            let frame = Frame::new(img::read_color(&frame)?, 0);
            let mut template = Template::load(&template)?;
            template.resolution = StreamResolution::new(template_width, template_height);
            let found = frame
                .find_template(&template, threshold)
                .with_context(|| format!("matching template {}", template.name))?;

            match found {
                Some(point) => println!("{} {}", point.x, point.y),
                None => {
                    println!("not found");
                    exit(2);
                }
            }
        }
        Command::Prepare {
            input,
            output,
            tuning,
        } => {
            let tuning = match tuning {
                Some(path) => OcrTuning::from_file(&path)?,
                None => OcrTuning::default(),
            };

            let frame = Frame::new(img::read_color(&input)?, 0);
            let prepared = frame
                .prepare_for_ocr(&tuning)
                .context("preparing frame for ocr")?;
            info!(
                "prepared {} -> {}",
                frame.resolution(),
                prepared.resolution()
            );

            img::write_image(&output, &prepared.mat)?;
        }
    }

    Ok(())
}

fn configure_opencv(threads: i32) -> Result<(), opencv::Error> {
    if !opencv::core::use_optimized()? {
        debug!("changing opencv to use optimized code");
        opencv::core::set_use_optimized(true)?;
    } else {
        debug!("opencv is using optimized code")
    }

    set_num_threads(threads)?;

    let opencv_threads = get_num_threads()?;
    debug!("opencv is using {} threads", opencv_threads);

    Ok(())
}
