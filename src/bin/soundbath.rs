use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use soundbath_core::bed;
use soundbath_core::config::RenderConfig;
use soundbath_core::dsp::pcm::Narration;
use soundbath_core::error::Result;
use soundbath_core::script::MeditationScript;
use soundbath_core::session::{RenderRequest, RenderSession};
use soundbath_core::timeline::Timeline;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            narration,
            script,
            output,
            narration_rate,
            base64,
            background,
            background_url,
            config,
            wav,
        } => {
            let config = load_config(config.as_deref())?;
            let script = MeditationScript::from_json(&std::fs::read_to_string(&script)?)?;
            let rate = narration_rate.unwrap_or(config.narration_rate);
            let narration = load_narration(&narration, rate, base64, &config)?;
            let mut request = RenderRequest::new(narration, script.sections()?).with_title(script.title.clone());
            if let Some(path) = background {
                match std::fs::read(&path).map_err(Into::into).and_then(|b| bed::decode_clip(&b)) {
                    Ok(clip) => request = request.with_background(clip),
                    Err(e) => tracing::warn!(?path, error = %e, "background unreadable, using fallback bed"),
                }
            }
            run_render(request, config, background_url.as_deref(), output, wav).await
        }
        Commands::Plan {
            script,
            narration_seconds,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let script = MeditationScript::from_json(&std::fs::read_to_string(&script)?)?;
            let timeline = Timeline::plan(&script.sections()?, narration_seconds, &config)?;
            println!("{}", serde_json::to_string_pretty(&timeline)?);
            Ok(())
        }
        Commands::DefaultConfig => {
            println!("{}", serde_json::to_string_pretty(&RenderConfig::default())?);
            Ok(())
        }
    }
}

async fn run_render(
    request: RenderRequest,
    config: RenderConfig,
    background_url: Option<&str>,
    output: Option<PathBuf>,
    wav: bool,
) -> Result<()> {
    let mut session = RenderSession::new(config).with_progress(|stage, percent| {
        tracing::info!(?stage, percent, "progress");
    });
    if wav {
        session = session.without_encoder();
    }
    let asset = match background_url {
        Some(url) if request.background.is_none() => session.render_with_background_url(request, url).await?,
        _ => session.render(request)?,
    };
    let output = output.unwrap_or_else(|| PathBuf::from(&asset.file_name));
    std::fs::write(&output, &asset.bytes)?;
    tracing::info!(
        ?output,
        mime = %asset.mime_type,
        bed = ?asset.bed,
        duration = asset.duration,
        lufs = asset.loudness.measured_lufs + asset.loudness.applied_gain_db,
        "wrote meditation"
    );
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<RenderConfig> {
    match path {
        Some(path) => RenderConfig::from_json(&std::fs::read_to_string(path)?),
        None => Ok(RenderConfig::default()),
    }
}

fn load_narration(path: &Path, rate: u32, base64: bool, config: &RenderConfig) -> Result<Narration> {
    if base64 {
        let text = std::fs::read_to_string(path)?;
        return Narration::from_base64(&text, rate, config.sample_rate);
    }
    Narration::from_pcm16(&std::fs::read(path)?, rate, config.sample_rate)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Offline guided-meditation renderer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mix narration and a script into a mastered meditation.
    Render {
        /// Raw little-endian 16-bit mono narration.
        narration: PathBuf,
        /// Script JSON with a title and sections.
        script: PathBuf,
        /// Output file; defaults to a name derived from the title.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Sample rate of the narration PCM; defaults to the configured rate.
        #[arg(long)]
        narration_rate: Option<u32>,
        /// The narration file holds base64 text rather than raw bytes.
        #[arg(long)]
        base64: bool,
        /// Local background clip (WAV or MP3).
        #[arg(short, long, conflicts_with = "background_url")]
        background: Option<PathBuf>,
        /// Background clip to download (cached on disk).
        #[arg(long)]
        background_url: Option<String>,
        /// JSON overrides for the render configuration.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Write WAV without trying MP3 through ffmpeg.
        #[arg(long)]
        wav: bool,
    },
    /// Print the planned timeline and bed automation as JSON.
    Plan {
        script: PathBuf,
        /// Narration length in seconds.
        #[arg(long)]
        narration_seconds: f64,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the default configuration as JSON.
    DefaultConfig,
}
