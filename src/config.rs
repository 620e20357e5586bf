use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use gif_bus::{config::PipelineConfig, frame::Region};
use serde::Deserialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Synthetic moving pattern, no display needed
    Test,
    /// X11 display through FFmpeg (needs the `x11grab` feature)
    X11grab,
}

#[derive(Parser, Debug, Default)]
#[command(name = "lite-gif", about = "Record the screen to an animated GIF")]
pub struct Args {
    /// JSON session file; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    #[arg(long)]
    pub fps: Option<u32>,
    /// Seconds to record; 0 records until Ctrl-C
    #[arg(long)]
    pub duration: Option<f64>,
    /// WIDTHxHEIGHT+X+Y, whole screen when omitted
    #[arg(long)]
    pub region: Option<String>,
    #[arg(long, value_enum)]
    pub source: Option<SourceKind>,
    /// X11 display name
    #[arg(long)]
    pub display: Option<String>,
    /// Quantization workers, 2x logical cores by default
    #[arg(long)]
    pub workers: Option<usize>,
    /// Palette size per frame
    #[arg(long)]
    pub colors: Option<usize>,
    /// Quantizer sampling speed, 1 (best) to 30 (fastest)
    #[arg(long)]
    pub speed: Option<i32>,
    /// Display time of each frame in centiseconds
    #[arg(long)]
    pub delay: Option<u16>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub output: PathBuf,
    pub fps: u32,
    pub duration: f64,
    pub region: Option<String>,
    pub source: SourceKind,
    pub display: String,
    // size of the synthetic screen
    pub test_screen: String,
    pub workers: Option<usize>,
    pub colors: usize,
    pub speed: i32,
    pub delay: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("demo.gif"),
            fps: PipelineConfig::DEFAULT_FPS,
            duration: PipelineConfig::DEFAULT_DURATION.as_secs_f64(),
            region: None,
            source: SourceKind::Test,
            display: ":0.0".to_string(),
            test_screen: "640x480".to_string(),
            workers: None,
            colors: 64,
            speed: 10,
            delay: 0,
        }
    }
}

impl SessionConfig {
    pub fn load(args: &Args) -> anyhow::Result<Self> {
        let base = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(base.merge(args))
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading session file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing session file {}", path.display()))
    }

    fn merge(mut self, args: &Args) -> Self {
        if let Some(output) = &args.output {
            self.output = output.clone();
        }
        if let Some(fps) = args.fps {
            self.fps = fps;
        }
        if let Some(duration) = args.duration {
            self.duration = duration;
        }
        if let Some(region) = &args.region {
            self.region = Some(region.clone());
        }
        if let Some(source) = args.source {
            self.source = source;
        }
        if let Some(display) = &args.display {
            self.display = display.clone();
        }
        if let Some(workers) = args.workers {
            self.workers = Some(workers);
        }
        if let Some(colors) = args.colors {
            self.colors = colors;
        }
        if let Some(speed) = args.speed {
            self.speed = speed;
        }
        if let Some(delay) = args.delay {
            self.delay = delay;
        }
        self
    }

    pub fn test_screen(&self) -> anyhow::Result<Region> {
        self.test_screen
            .parse::<Region>()
            .context("invalid test_screen size")
    }

    pub fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        if !self.duration.is_finite() || self.duration < 0.0 {
            anyhow::bail!("duration must be a non-negative number of seconds");
        }

        let mut builder = PipelineConfig::builder()
            .fps(self.fps)
            .frame_delay(self.delay);
        builder = if self.duration == 0.0 {
            builder.until_cancelled()
        } else {
            let duration =
                Duration::try_from_secs_f64(self.duration).context("invalid duration")?;
            builder.duration(duration)
        };
        builder = match &self.region {
            Some(region) => builder.region(region.parse().context("invalid --region")?),
            None => builder.screen(),
        };
        if let Some(workers) = self.workers {
            builder = builder.workers(workers);
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }
}
