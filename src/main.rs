//! Violation Monitor - Main Entry Point
//!
//! Watches a camera for smoking, littering and graffiti, alerts a Telegram
//! chat, and runs a bot that analyses photos sent to it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Input, Select};
use teloxide::Bot;
use teloxide::prelude::Requester;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use violation_monitor::commands::{PhotoAnalyzer, PhotoBot};
use violation_monitor::config::{BotToken, CameraConfig, DetectionConfig, EnvFile, MonitorSettings, TelegramConfig};
use violation_monitor::detection::{CommandDetector, Detector, FrameFeed, ViolationAnalyzer, ViolationType};
use violation_monitor::monitor::{CameraMonitor, EvidenceStore, MonitorMessage, supervise};
use violation_monitor::ontology::{FineContext, Ontology};
use violation_monitor::telegram::{DiscoveredChat, Notifier, TelegramNotifier, discover_chats};

/// Camera violation monitor with Telegram alerts.
#[derive(Parser, Debug)]
#[command(name = "violation_monitor")]
#[command(about = "Detect public-order violations on camera and report them to Telegram")]
#[command(version)]
struct Args {
    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env", global = true)]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Monitor the camera through the detector (default).
    Run {
        /// Replay a recorded NDJSON detector stream instead of starting the detector.
        #[arg(long)]
        replay: Option<PathBuf>,
    },

    /// Run the photo-analysis bot.
    Bot,

    /// Show fine calculations and send a sample alert.
    Demo,

    /// Interactively create or update the .env file.
    Setup,

    /// List chats that recently messaged the bot.
    ChatId,

    /// Print every detection and violation found on one image.
    Inspect {
        /// Image to analyse.
        image: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    match args.command.unwrap_or(Command::Run { replay: None }) {
        Command::Run { replay } => run_monitor(replay.as_deref()).await,
        Command::Bot => run_bot().await,
        Command::Demo => run_demo().await,
        Command::Setup => run_setup(&args.env_file).await,
        Command::ChatId => list_chats().await,
        Command::Inspect { image } => inspect_image(&image).await,
    }
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_settings() -> Result<MonitorSettings> {
    MonitorSettings::from_env().context("Failed to load monitor configuration from environment")
}

fn load_telegram() -> Result<TelegramConfig> {
    TelegramConfig::from_env().context("Failed to load Telegram configuration from environment")
}

fn load_ontology(path: &Path) -> Result<Arc<Ontology>> {
    let ontology = Ontology::load(path).context("Failed to load the violation knowledge base")?;
    if let Err(e) = ontology.validate() {
        warn!("Knowledge base is incomplete: {}", e);
    }
    Ok(Arc::new(ontology))
}

fn build_analyzer(detection: &DetectionConfig) -> ViolationAnalyzer {
    ViolationAnalyzer::new(
        detection.confidence_threshold,
        detection.custom_model().is_some(),
        detection.class_names.clone(),
    )
}

async fn run_monitor(replay: Option<&Path>) -> Result<()> {
    let settings = load_settings()?;
    let telegram = load_telegram()?;
    let ontology = load_ontology(&settings.ontology_path)?;

    let notifier: Option<Arc<dyn Notifier>> = match TelegramNotifier::from_config(&telegram) {
        Some(notifier) => Some(Arc::new(notifier)),
        None => {
            warn!("Telegram is not configured (TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID), alerts are disabled");
            None
        }
    };

    if let Some(notifier) = &notifier {
        info!("Sending test message to Telegram...");
        if let Err(e) = notifier.send_test_message().await {
            warn!("Failed to send test message: {}", e);
        }
    }

    let evidence = EvidenceStore::open(&settings.evidence_dir)
        .await
        .context("Failed to prepare the evidence directory")?;

    let analyzer = build_analyzer(&settings.detection);
    info!(
        "Detection: threshold {}, interval {}s, {}",
        settings.detection.confidence_threshold,
        settings.detection.interval_secs,
        if analyzer.is_custom_model() { "trained model" } else { "generic model heuristics" }
    );

    let mut monitor = CameraMonitor::new(
        analyzer,
        ontology,
        evidence,
        notifier,
        settings.location.clone(),
        settings.detection.interval(),
    );

    let (tx, rx) = mpsc::channel::<MonitorMessage>(8);

    let handle = if let Some(path) = replay {
        info!("Replaying detector output from {}", path.display());
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let mut feed = FrameFeed::new(BufReader::new(file));
        tokio::spawn(async move { monitor.run(&mut feed, rx).await })
    } else {
        let detector = CommandDetector::from_config(&settings.detection)
            .context("Invalid detector configuration")?;
        let mut stream = detector
            .spawn_stream(&settings.camera)
            .context("Failed to start the detector")?;
        describe_camera(&settings.camera);
        tokio::spawn(async move {
            let result = monitor.run(stream.feed(), rx).await;
            stream.shutdown().await;
            result
        })
    };

    info!("Monitor is running. Use Ctrl+C to stop.");
    let summary = supervise(handle, tx, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C");
    })
    .await?;

    println!("\nMonitoring finished: {summary}");
    Ok(())
}

fn describe_camera(camera: &CameraConfig) {
    info!(
        "Camera {} at {}x{}, {} fps",
        camera.source, camera.width, camera.height, camera.frame_rate
    );
}

async fn run_bot() -> Result<()> {
    let settings = load_settings()?;
    let telegram = load_telegram()?;
    let token = telegram
        .require_token()
        .context("The photo bot needs a bot token, run `violation_monitor setup`")?;

    let ontology = load_ontology(&settings.ontology_path)?;
    let detector = CommandDetector::from_config(&settings.detection)
        .context("Invalid detector configuration")?;
    let analyzer = PhotoAnalyzer::new(
        Arc::new(detector),
        build_analyzer(&settings.detection),
        ontology,
    );

    info!("Starting photo-analysis bot (bot {})", token.masked());
    PhotoBot::new(token, analyzer, settings.temp_dir.clone()).run().await
}

async fn run_demo() -> Result<()> {
    let settings = load_settings()?;
    let telegram = load_telegram()?;

    let ontology = match Ontology::load(&settings.ontology_path) {
        Ok(ontology) => ontology,
        Err(e) => {
            warn!("{}; using the built-in example knowledge base", e);
            Ontology::example()
        }
    };

    println!("{}", "=".repeat(60));
    println!("🧪 Violation monitor demo");
    println!("{}\n", "=".repeat(60));
    println!("📚 Fine calculation examples:\n");

    let cases = [
        (
            ViolationType::Smoking,
            FineContext {
                public_place: true,
                ..FineContext::default()
            },
        ),
        (ViolationType::Littering, FineContext::default()),
        (
            ViolationType::Graffiti,
            FineContext {
                historical_object: true,
                ..FineContext::default()
            },
        ),
        (
            ViolationType::Smoking,
            FineContext {
                is_repeat: true,
                ..FineContext::default()
            },
        ),
    ];

    for (kind, context) in &cases {
        let violation = ontology
            .classify(kind.as_str(), Some("Тестовая локация"), context)
            .with_context(|| format!("Failed to classify {kind}"))?;

        println!("Type:        {}", violation.violation_type);
        println!("Description: {}", violation.description);
        println!("Article:     {}", violation.article);
        println!("Fine:        {:.0} {}", violation.fine_amount, violation.fine_currency);
        println!("Category:    {}", violation.category);
        println!("Severity:    {}", violation.severity);
        println!("{}", "-".repeat(60));
    }

    println!("\n📱 Sending a sample alert to Telegram...");
    match TelegramNotifier::from_config(&telegram) {
        Some(notifier) => {
            let sample = ontology.classify(
                ViolationType::Smoking.as_str(),
                Some(&settings.location),
                &FineContext {
                    public_place: true,
                    ..FineContext::default()
                },
            )?;
            notifier
                .notify_violation(&sample, None)
                .await
                .context("Failed to send the sample alert")?;
            println!("✓ Sample alert sent");
        }
        None => println!("⚠ Telegram is not configured, skipping. Run `violation_monitor setup` first."),
    }

    println!("\n✅ Demo finished!");
    Ok(())
}

async fn list_chats() -> Result<()> {
    let telegram = load_telegram()?;
    let token = telegram
        .require_token()
        .context("Set TELEGRAM_BOT_TOKEN first, or run `violation_monitor setup`")?;

    let chats = discover_chats(&Bot::new(token.expose()))
        .await
        .context("getUpdates request failed")?;

    if chats.is_empty() {
        println!("No chats found. Send any message to the bot (or add it to a group) and try again.");
        return Ok(());
    }

    println!("Chats that recently messaged the bot:");
    for chat in &chats {
        println!("  {chat}");
    }
    println!("\nPut the id into .env as TELEGRAM_CHAT_ID.");
    Ok(())
}

async fn inspect_image(image: &Path) -> Result<()> {
    let settings = load_settings()?;
    let detector = CommandDetector::from_config(&settings.detection)
        .context("Invalid detector configuration")?;
    let mut analyzer = build_analyzer(&settings.detection);

    println!("Model: {} (custom: {})", detector.model(), detector.is_custom_model());
    let names = analyzer.class_names().table();
    if !names.is_empty() {
        debug!("Class names: {:?}", names);
    }

    let report = detector
        .detect_image(image)
        .await
        .with_context(|| format!("Detection failed for {}", image.display()))?;
    let analysis = analyzer.analyze(&report.detections);

    println!(
        "\n{} raw detections, {} above threshold {}:",
        report.detections.len(),
        analysis.detections.len(),
        settings.detection.confidence_threshold
    );
    for detection in &analysis.detections {
        println!(
            "  [{}] {:<14} {:.2} {}",
            detection.class_id, detection.class_name, detection.confidence, detection.bbox
        );
    }

    if analysis.candidates.is_empty() {
        println!("\nNo violations found.");
    } else {
        println!("\nViolations:");
        for candidate in &analysis.candidates {
            println!(
                "  {} ({}) {:.1}% at {}",
                candidate.kind,
                candidate.kind.label(),
                candidate.confidence * 100.0,
                candidate.bbox
            );
        }
    }
    Ok(())
}

async fn run_setup(env_path: &str) -> Result<()> {
    println!("Violation monitor setup\n");
    println!("1. Open @BotFather in Telegram and send /newbot");
    println!("2. Copy the token it gives you\n");

    let mut env = EnvFile::load(env_path).with_context(|| format!("Failed to read {env_path}"))?;

    let mut token_prompt = Input::<String>::new()
        .with_prompt("Bot token")
        .validate_with(|input: &String| -> Result<(), String> {
            BotToken::parse(input).map(|_| ()).map_err(|e| e.to_string())
        });
    if let Some(existing) = env.get("TELEGRAM_BOT_TOKEN").filter(|t| BotToken::parse(t).is_ok()) {
        token_prompt = token_prompt.default(existing.to_owned());
    }
    let token = BotToken::parse(&token_prompt.interact_text()?)?;

    let bot = Bot::new(token.expose());
    let me = bot
        .get_me()
        .await
        .context("Telegram rejected the token (getMe failed)")?;
    println!(
        "✓ Connected to @{}",
        me.user.username.as_deref().unwrap_or("unknown")
    );

    let chat_id = choose_chat(&bot).await?;

    let source: String = Input::new()
        .with_prompt("Camera source (device index or stream URL)")
        .default(env.get("CAMERA_SOURCE").unwrap_or("0").to_owned())
        .interact_text()?;

    if env.get("TELEGRAM_BOT_TOKEN").is_none() {
        env.push_comment("Telegram");
    }
    env.set("TELEGRAM_BOT_TOKEN", token.expose());
    env.set("TELEGRAM_CHAT_ID", chat_id.to_string());
    env.set("CAMERA_SOURCE", source);

    let camera = CameraConfig::default();
    let detection = DetectionConfig::default();
    env.set_default("FRAME_RATE", camera.frame_rate.to_string());
    env.set_default("RESOLUTION_WIDTH", camera.width.to_string());
    env.set_default("RESOLUTION_HEIGHT", camera.height.to_string());
    env.set_default("CONFIDENCE_THRESHOLD", detection.confidence_threshold.to_string());
    env.set_default("DETECTION_INTERVAL", detection.interval_secs.to_string());

    env.save(env_path)
        .with_context(|| format!("Failed to write {env_path}"))?;
    println!("✓ Configuration saved to {env_path}");

    if Confirm::new()
        .with_prompt("Send a test message now?")
        .default(true)
        .interact()?
    {
        TelegramNotifier::new(bot, chat_id, 0)
            .send_test_message()
            .await
            .context("Failed to send the test message")?;
        println!("✓ Test message sent, check the chat");
    }

    println!("\nNext steps:");
    println!("  violation_monitor demo   - check fines and alerts");
    println!("  violation_monitor run    - start monitoring the camera");
    println!("  violation_monitor bot    - start the photo-analysis bot");
    Ok(())
}

/// Picks a chat from `getUpdates`, falling back to manual entry.
async fn choose_chat(bot: &Bot) -> Result<i64> {
    println!("\nSend any message to your bot (or add it to a group and write there).");
    let _: String = Input::new()
        .with_prompt("Press Enter when done")
        .allow_empty(true)
        .interact_text()?;

    let chats: Vec<DiscoveredChat> = match discover_chats(bot).await {
        Ok(chats) => chats,
        Err(e) => {
            warn!("Chat discovery failed: {}", e);
            Vec::new()
        }
    };

    if !chats.is_empty() {
        let mut items: Vec<String> = chats.iter().map(ToString::to_string).collect();
        items.push("Enter chat id manually".to_owned());

        let selection = Select::new()
            .with_prompt("Which chat should receive alerts?")
            .items(&items)
            .default(0)
            .interact()?;

        if let Some(chat) = chats.get(selection) {
            return Ok(chat.id);
        }
    } else {
        println!("No chats found in recent updates.");
    }

    let raw: String = Input::new()
        .with_prompt("Chat id (negative for groups)")
        .validate_with(|input: &String| -> Result<(), &str> {
            input
                .trim()
                .parse::<i64>()
                .map(|_| ())
                .map_err(|_| "chat id must be an integer")
        })
        .interact_text()?;

    match raw.trim().parse() {
        Ok(id) => Ok(id),
        Err(_) => bail!("Invalid chat id: {raw}"),
    }
}
