use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use pipertray::audio::sink;
use pipertray::cli::{Cli, Commands, ConfigAction, VoiceArgs};
use pipertray::config::Config;
use pipertray::logging::init_logging;
use pipertray::pipeline::{PipelineController, SpeakOutcome};
use pipertray::synth::PiperBackend;
use pipertray::text::{Language, LanguageDetector, segment};
use std::io::{IsTerminal, Read};
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    match cli.command {
        Commands::Speak { text, voice } => {
            let config = load_voice_config(cli.config.as_deref(), &voice)?;
            let text = read_text(text)?;
            run_speak(&config, &text, cli.quiet).await?;
        }
        Commands::Export {
            text,
            output,
            voice,
        } => {
            let config = load_voice_config(cli.config.as_deref(), &voice)?;
            let text = read_text(text)?;
            run_export(&config, &text, &output, cli.quiet).await?;
        }
        Commands::Segment {
            text,
            languages,
            max_chunk_len,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let text = read_text(text)?;
            print_segments(&config, &text, languages, max_chunk_len);
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "pipertray",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/pipertray/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        // Load from custom path
        Config::load(path)?
    } else {
        // Try default path, fall back to defaults
        Config::load_or_default(&Config::default_path()?)?
    };

    // Apply environment variable overrides
    Ok(config.with_env_overrides())
}

/// Load configuration, apply command-line voice overrides and validate.
fn load_voice_config(custom_path: Option<&Path>, voice: &VoiceArgs) -> Result<Config> {
    let mut config = load_config(custom_path)?;
    voice.apply(&mut config);
    config.validate()?;
    if config.voice.model.as_os_str().is_empty() {
        bail!("No voice model configured. Pass --model or set voice.model in the config file");
    }
    Ok(config)
}

/// Text from the argument, or all of stdin when it is piped.
fn read_text(text: Option<String>) -> Result<String> {
    if let Some(text) = text {
        return Ok(text);
    }
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        bail!("No text given. Pass TEXT or pipe text on stdin");
    }
    let mut text = String::new();
    stdin
        .lock()
        .read_to_string(&mut text)
        .context("Failed to read text from stdin")?;
    Ok(text)
}

fn build_controller(config: &Config) -> PipelineController {
    PipelineController::new(
        Arc::new(PiperBackend::new(config.piper_config())),
        sink::shared(config.playback_sink()),
        config.pipeline_settings(),
    )
}

async fn run_speak(config: &Config, text: &str, quiet: bool) -> Result<()> {
    let controller = build_controller(config);

    tokio::select! {
        outcome = controller.speak(text) => {
            if outcome? == SpeakOutcome::Cancelled && !quiet {
                eprintln!("{}", "Stopped".dimmed());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            controller.stop().await?;
            if !quiet {
                eprintln!("{}", "Stopped".dimmed());
            }
        }
    }
    Ok(())
}

async fn run_export(config: &Config, text: &str, output: &Path, quiet: bool) -> Result<()> {
    let controller = build_controller(config);

    let audio = tokio::select! {
        audio = controller.export(text) => audio?,
        _ = tokio::signal::ctrl_c() => bail!("Export interrupted"),
    };

    std::fs::write(output, audio.as_bytes())
        .with_context(|| format!("Failed to write {}", output.display()))?;
    if !quiet {
        println!(
            "{} Wrote {:.1}s of audio to {}",
            "✓".green(),
            audio.duration().as_secs_f64(),
            output.display()
        );
    }
    Ok(())
}

fn print_segments(config: &Config, text: &str, languages: bool, max_chunk_len: Option<usize>) {
    let max_chunk_len = max_chunk_len.unwrap_or(config.synthesis.max_chunk_len);
    let detector = if config.languages.voices.is_empty() {
        LanguageDetector::new(Language::ALL.to_vec())
            .with_default_language(Some(config.languages.default_language))
            .with_weights(config.detection)
    } else {
        config.detector()
    };

    for chunk in segment(text, max_chunk_len) {
        let header = format!("[{}] {} bytes", chunk.index, chunk.len());
        if chunk.len() > max_chunk_len {
            println!("{} {}", header.dimmed(), "(no split point)".yellow());
        } else {
            println!("{}", header.dimmed());
        }

        if languages {
            for piece in detector.segment(&chunk.text) {
                let language = piece
                    .language
                    .map(|l| l.code().to_string())
                    .unwrap_or_else(|| "default".to_string());
                println!("  {} {}", format!("{}:", language).cyan(), piece.text);
            }
        } else {
            println!("{}", chunk.text);
        }
    }
}

fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    let config_path = match custom_path {
        Some(path) => path.to_path_buf(),
        None => Config::default_path()?,
    };

    match action {
        ConfigAction::Show => {
            let config = Config::load_or_default(&config_path)?.with_env_overrides();
            print!("{}", config.to_toml_string()?);
        }
        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    config_path.display()
                );
            }
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(&config_path, Config::default().to_toml_string()?)
                .with_context(|| format!("Failed to write {}", config_path.display()))?;
            println!("{} Wrote {}", "✓".green(), config_path.display());
        }
    }
    Ok(())
}
