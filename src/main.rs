use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use anyhow::{ensure, Context};
use clap::{Parser, Subcommand};

use arkpilot::clock::Clock;
use arkpilot::config::{load_config, AppConfig};
use arkpilot::executor::input::EnigoInput;
use arkpilot::perception::annotator::save_annotated;
use arkpilot::perception::screenshot::XcapFrameSource;
use arkpilot::perception::types::DetectionRecord;
use arkpilot::perception::yolo_detector::{load_class_names, YoloDetector};
use arkpilot::sequences::crafting::{CraftOrder, CraftReport};
use arkpilot::sequences::inventory::{DEFAULT_FOOD, VALID_TABS};
use arkpilot::sequences::taming::TamingMonitor;
use arkpilot::sequences::{GameProfile, SequenceOutcome};
use arkpilot::session::AutomationSession;

#[derive(Parser)]
#[command(name = "arkpilot", version, about = "Screen-driven UI automation for ARK: Survival Ascended")]
struct Cli {
    /// Path to arkpilot.toml (otherwise searched in the usual places)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to a file (arkpilot.log when no path is given)
    #[arg(long, global = true, num_args = 0..=1, default_missing_value = "arkpilot.log")]
    log_file: Option<PathBuf>,

    /// Override the detector confidence threshold
    #[arg(long, global = true)]
    confidence: Option<f32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture once and list every detected element
    Detect {
        #[arg(long)]
        json: bool,
    },
    /// Save annotated detection frames as PNG
    Visualize {
        #[arg(long, default_value = "detection_results")]
        out: PathBuf,
        #[arg(long, default_value_t = 1)]
        frames: u32,
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
    /// Open the inventory, move everything into the container, close it
    Inventory,
    /// Craft an item, learning its engram first if needed
    Craft {
        item: String,
        #[arg(long)]
        engram: Option<String>,
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        count: u32,
    },
    /// Craft several items in one inventory session (ITEM or ITEM=COUNT)
    CraftBatch {
        #[arg(required = true)]
        orders: Vec<CraftOrder>,
    },
    /// Double-click an item to equip it
    Equip { item: String },
    /// Drop an item from the inventory
    Drop { item: String },
    /// Eat a food item, then close the inventory
    Eat {
        #[arg(long, default_value = DEFAULT_FOOD)]
        food: String,
    },
    /// Feed the creature being tamed with its preferred food
    Feed { creature: String },
    /// Drag a narcotic onto the creature being tamed
    Narcotic,
    /// Keep a knocked-out creature fed and sedated for a while
    Tame {
        creature: String,
        #[arg(long, default_value_t = 3600)]
        seconds: u64,
    },
    /// Report HUD alerts and visible status bars
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Spend a pending level point on health
    LevelUp,
    /// Run the background poller and print what it sees
    Watch {
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },
    /// List the inventory tab names `switch_tab` accepts
    Tabs,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();
    let _log_guard = arkpilot::init_tracing(cli.log_file.as_deref());

    if let Command::Tabs = cli.command {
        for tab in VALID_TABS {
            println!("{tab}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(cli.config.as_deref()).context("loading configuration")?;
    let profile = config.game_profile().context("reading [keys] and [taming]")?;
    let session = build_session(&config, cli.confidence)?;
    let _span = session.span().clone().entered();

    let code = match cli.command {
        Command::Detect { json } => {
            let snapshot = session.refresh().context("detection failed")?;
            let elements: BTreeMap<&str, &[DetectionRecord]> = snapshot.iter().collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&elements)?);
            } else {
                for (name, records) in &elements {
                    for r in records.iter() {
                        let (x1, y1, x2, y2) = r.bounding_box.corners();
                        println!("{name:<32} {:.2}  ({x1}, {y1}) - ({x2}, {y2})", r.confidence);
                    }
                }
                println!("{} detections", snapshot.detection_count());
            }
            ExitCode::SUCCESS
        }
        Command::Visualize { out, frames, interval_ms } => {
            visualize(&session, &out, frames, Duration::from_millis(interval_ms))?;
            ExitCode::SUCCESS
        }
        Command::Inventory => {
            let steps = [profile.open_inventory(), profile.transfer_all(), profile.close_inventory()];
            let failed = steps.iter().map(|seq| session.run(seq)).find(|o| !o.succeeded());
            report(failed.unwrap_or(SequenceOutcome::Completed))
        }
        Command::Craft { item, engram, count } => {
            let order = CraftOrder { item, engram, count };
            report_crafts(&[profile.craft_many(&session, &order)])
        }
        Command::CraftBatch { orders } => report_crafts(&profile.craft_batch(&session, &orders)),
        Command::Equip { item } => report(session.run(&profile.equip_item(&item))),
        Command::Drop { item } => report(session.run(&profile.drop_item(&item))),
        Command::Eat { food } => report(session.run(&profile.eat_food(&food))),
        Command::Feed { creature } => report(session.run(&profile.feed_creature(&creature))),
        Command::Narcotic => report(session.run(&profile.apply_narcotic())),
        Command::Tame { creature, seconds } => {
            tame(&session, profile, &config, &creature, Duration::from_secs(seconds))?;
            ExitCode::SUCCESS
        }
        Command::LevelUp => report(session.run(&profile.level_up())),
        Command::Status { json } => {
            let status = session.player_status();
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                let bars: Vec<_> = status.visible_bars().collect();
                println!("warnings: {}", if status.is_ok() { "none".to_string() } else { status.warnings.join(", ") });
                println!("visible bars: {}", bars.join(", "));
            }
            if status.is_ok() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Command::Watch { seconds } => {
            watch(&session, Duration::from_secs(seconds))?;
            ExitCode::SUCCESS
        }
        Command::Tabs => ExitCode::SUCCESS,
    };

    session.shutdown().context("stopping background poller")?;
    Ok(code)
}

fn build_session(config: &AppConfig, confidence: Option<f32>) -> anyhow::Result<AutomationSession> {
    let mut settings = config.session_settings();
    if let Some(c) = confidence {
        ensure!((0.0..=1.0).contains(&c), "--confidence must be within [0, 1], got {c}");
        settings.confidence = c;
    }

    let d = &config.detector;
    let class_names = match &d.class_names_file {
        Some(path) => load_class_names(Path::new(path)).context("reading class names")?,
        None => Vec::new(),
    };
    let detector = YoloDetector::load(&d.model_path, d.input_size, d.iou_threshold, class_names)
        .with_context(|| format!("loading detector model {}", d.model_path))?;
    let input = EnigoInput::new().context("initialising OS input")?;
    let source = XcapFrameSource::new(config.capture.monitor);

    Ok(AutomationSession::builder(settings).build(Box::new(source), Box::new(detector), Box::new(input)))
}

fn report(outcome: SequenceOutcome) -> ExitCode {
    println!("{outcome}");
    if outcome.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn report_crafts(reports: &[CraftReport]) -> ExitCode {
    for r in reports {
        println!("{r}");
    }
    if reports.iter().all(CraftReport::complete) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn tame(
    session: &AutomationSession,
    profile: GameProfile,
    config: &AppConfig,
    creature: &str,
    duration: Duration,
) -> anyhow::Result<()> {
    let now = session.executor().clock().now();
    let monitor = TamingMonitor::new(profile, creature, config.taming_schedule(), now);
    let summary = thread::scope(|scope| -> anyhow::Result<_> {
        let handle = monitor.spawn(scope, session)?;
        thread::sleep(duration);
        Ok(handle.stop()?)
    })?;
    println!("{summary}");
    Ok(())
}

fn visualize(session: &AutomationSession, out: &Path, frames: u32, interval: Duration) -> anyhow::Result<()> {
    for i in 0..frames {
        if i > 0 {
            thread::sleep(interval);
        }
        let (frame, snapshot) = session.capture_and_detect().context("capture failed")?;
        let records = snapshot.iter().flat_map(|(_, records)| records.iter());
        let path = save_annotated(out, &frame, records)?;
        println!("{} ({} detections)", path.display(), snapshot.detection_count());
    }
    Ok(())
}

fn watch(session: &AutomationSession, duration: Duration) -> anyhow::Result<()> {
    session.start_poller()?;
    let tick = Duration::from_secs(1);
    let mut elapsed = Duration::ZERO;
    while elapsed < duration {
        thread::sleep(tick);
        elapsed += tick;
        let snapshot = session.cache().snapshot();
        let mut names: Vec<&str> = snapshot.element_names().collect();
        names.sort_unstable();
        println!("[gen {}] {}", snapshot.generation(), names.join(", "));
    }
    let stats = session.cache().stats();
    println!("{} refreshes, {} failures", stats.refreshes, stats.failures);
    session.stop_poller()?;
    Ok(())
}
