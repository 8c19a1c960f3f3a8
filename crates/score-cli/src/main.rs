use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use score_annotate::{ANONYMOUS_USER, Color, RasterSurface, SurfaceBox, Tool, flatten};
use score_cache::DocumentIdentity;
use score_runtime::{
    ReaderCommand, ReaderConfig, ReaderLogger, ReaderServices, ReaderUpdate, Score, worker_task,
};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "sheets", about = "Offline sheet music reader", version)]
struct Cli {
    /// Config file (defaults to the per-user config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Download every part of a catalog into the local cache
    Sync {
        /// JSON file holding the list of scores
        #[arg(short, long)]
        catalog: PathBuf,
    },

    /// Show which parts of a catalog are cached
    Status {
        /// JSON file holding the list of scores
        #[arg(short, long)]
        catalog: PathBuf,
    },

    /// Render a cached page to an image file
    Render {
        #[arg(long)]
        score: String,

        #[arg(long)]
        part: String,

        /// Page number, starting at 1
        #[arg(long, default_value = "1")]
        page: usize,

        /// Output image (format from the extension)
        #[arg(short, long)]
        output: PathBuf,

        /// Draw the page's annotations on top
        #[arg(long)]
        annotated: bool,
    },

    /// Inspect or edit the annotations of a page
    Annotate {
        #[arg(long)]
        score: String,

        #[arg(long)]
        part: String,

        /// Page number, starting at 1
        #[arg(long, default_value = "1")]
        page: usize,

        #[command(subcommand)]
        action: AnnotateAction,
    },

    /// Remove the annotations of every page of a part, for all users
    Purge {
        #[arg(long)]
        score: String,

        #[arg(long)]
        part: String,
    },

    /// Pin or unpin a score, or list pinned scores of a library
    Pin {
        #[arg(long)]
        library: String,

        /// Score to toggle; lists the pinned scores when omitted
        #[arg(long)]
        score: Option<String>,
    },

    /// Remove stores left behind by older versions
    Cleanup,

    /// Drop every cached document and preview
    ClearCache,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective config
    Show,
}

#[derive(Subcommand)]
enum AnnotateAction {
    /// Print the stored instructions as JSON
    Show,

    /// Add one stroke
    Draw {
        #[arg(long, value_enum, default_value = "pen")]
        tool: ToolArg,

        /// Color name or hex value
        #[arg(long, default_value = "black")]
        color: Color,

        /// Surface size the points are given in, as WIDTHxHEIGHT pixels
        #[arg(long, default_value = "1000x1000", value_parser = parse_surface)]
        surface: SurfaceBox,

        /// Also save the ink layer, redrawn live while the stroke is drawn
        #[arg(long)]
        preview: Option<PathBuf>,

        /// Stroke points as X,Y pixel pairs
        #[arg(required = true, value_parser = parse_point)]
        points: Vec<[f32; 2]>,
    },

    /// Remove the most recent stroke
    Undo,
}

#[derive(Clone, Copy, ValueEnum)]
enum ToolArg {
    Pen,
    Eraser,
}

impl From<ToolArg> for Tool {
    fn from(arg: ToolArg) -> Self {
        match arg {
            ToolArg::Pen => Self::Pen,
            ToolArg::Eraser => Self::Eraser,
        }
    }
}

fn parse_point(s: &str) -> std::result::Result<[f32; 2], String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y but got '{}'", s))?;
    let coord = |v: &str| v.trim().parse::<f32>().map_err(|e| format!("{}: {}", v, e));
    Ok([coord(x)?, coord(y)?])
}

fn parse_surface(s: &str) -> std::result::Result<SurfaceBox, String> {
    let (w, h) = s
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT but got '{}'", s))?;
    let extent = |v: &str| match v.trim().parse::<f32>() {
        Ok(n) if n > 0.0 => Ok(n),
        Ok(_) => Err(format!("{} must be positive", v)),
        Err(e) => Err(format!("{}: {}", v, e)),
    };
    Ok(SurfaceBox::new(extent(w)?, extent(h)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    ReaderLogger::new(500)
        .with_level(level)
        .with_echo(true)
        .init()
        .context("Failed to install logger")?;

    let config_path = cli.config.unwrap_or_else(ReaderConfig::default_path);

    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Init { force } => {
                if config_path.exists() && !force {
                    bail!(
                        "{} already exists, pass --force to overwrite",
                        config_path.display()
                    );
                }
                ReaderConfig::default().save(&config_path).await?;
                println!("Wrote default config → {}", config_path.display());
            }
            ConfigAction::Show => {
                let config = ReaderConfig::load_or_default(&config_path).await?;
                println!("# {}", config_path.display());
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        },

        Commands::Sync { catalog } => {
            let scores = load_catalog(&catalog).await?;
            if scores.is_empty() {
                println!("Catalog is empty, nothing to cache");
                return Ok(());
            }
            let services = open_services(&config_path).await?;
            sync(services, scores).await?;
        }

        Commands::Status { catalog } => {
            let scores = load_catalog(&catalog).await?;
            let services = open_services(&config_path).await?;
            let cached: std::collections::HashSet<String> =
                services.stores.media.keys().await?.into_iter().collect();

            for score in &scores {
                println!("{} ({})", score.title, score.key);
                for part in &score.parts {
                    let mark = if cached.contains(&part.cache_key()) {
                        "cached"
                    } else {
                        "missing"
                    };
                    println!("  {:<8} {} [{}]", mark, part.name, part.key);
                }
            }
        }

        Commands::Render {
            score,
            part,
            page,
            output,
            annotated,
        } => {
            let services = open_services(&config_path).await?;
            let session = &services.session;
            let snapshot = session
                .open(DocumentIdentity::new(score.as_str(), part.as_str()))
                .await?;
            println!("Opened {}/{} ({} pages)", score, part, snapshot.page_count);

            session.show_page(page).await?;
            let blob = session
                .page_blob(page)
                .context("Page was not rendered")?;
            let mut image = blob.decode()?;

            if annotated {
                let key = services.annotation_key(&score, &part, page);
                let instructions = services.annotations.load(&key).await?;
                println!("Applying {} annotations", instructions.len());
                image = flatten(&image, &instructions, services.config.display.density);
            }
            session.close();

            let (width, height) = image.dimensions();
            let path = output.clone();
            tokio::task::spawn_blocking(move || image.save(&path)).await??;
            println!(
                "Rendered page {} ({}x{}) → {}",
                page,
                width,
                height,
                output.display()
            );
        }

        Commands::Annotate {
            score,
            part,
            page,
            action,
        } => {
            let services = open_services(&config_path).await?;
            let key = services.annotation_key(&score, &part, page);
            let controller = services.annotation_controller();
            controller.open(key.clone()).await?;

            match action {
                AnnotateAction::Show => {
                    let instructions = controller.instructions();
                    println!("{}", serde_json::to_string_pretty(&instructions)?);
                }
                AnnotateAction::Draw {
                    tool,
                    color,
                    surface,
                    preview,
                    points,
                } => {
                    let Some((first, rest)) = points.split_first() else {
                        bail!("A stroke needs at least one point");
                    };
                    if !controller.pointer_down(tool.into(), color, *first, surface) {
                        bail!("Could not start a stroke on {}", key.storage_key());
                    }

                    let redraw = preview.is_some().then(|| {
                        let services = services.clone();
                        let controller = controller.clone();
                        let (width, height) = (surface.width as u32, surface.height as u32);
                        tokio::spawn(async move {
                            let mut ink = RasterSurface::new(width, height);
                            let frames = services.redraw_annotations(&controller, &mut ink).await;
                            (frames, ink)
                        })
                    });

                    for point in rest {
                        controller.pointer_move(*point);
                    }
                    controller.pointer_up().await?;

                    if let (Some(path), Some(redraw)) = (preview, redraw) {
                        let (frames, ink) = redraw.await?;
                        let image = ink.to_image();
                        let target = path.clone();
                        tokio::task::spawn_blocking(move || image.save(&target)).await??;
                        println!("Saved ink after {} frames → {}", frames, path.display());
                    }
                    println!(
                        "Added {} stroke, {} on page",
                        color,
                        controller.instructions().len()
                    );
                }
                AnnotateAction::Undo => {
                    if !controller.can_undo() {
                        println!("Nothing to undo");
                        return Ok(());
                    }
                    controller.undo().await?;
                    println!("Undone, {} left on page", controller.instructions().len());
                }
            }
        }

        Commands::Purge { score, part } => {
            let services = open_services(&config_path).await?;
            let removed = services.annotations.purge_part(&score, &part).await?;
            println!("Removed annotations of {} pages", removed);
        }

        Commands::Pin { library, score } => {
            let services = open_services(&config_path).await?;
            let uid = services
                .config
                .user_id
                .clone()
                .unwrap_or_else(|| ANONYMOUS_USER.to_string());

            match score {
                Some(score) => {
                    let pinned = services.pinned.toggle(&uid, &library, &score).await?;
                    let verb = if pinned { "Pinned" } else { "Unpinned" };
                    println!("{} {} in {}", verb, score, library);
                }
                None => {
                    for score in services.pinned.load(&uid, &library).await? {
                        println!("{}", score);
                    }
                }
            }
        }

        Commands::Cleanup => {
            let config = ReaderConfig::load_or_default(&config_path).await?;
            let removed =
                score_store::drop_stale_versions(&config.data_dir, &config.db_name).await?;
            for path in &removed {
                println!("Removed {}", path.display());
            }
            println!("{} outdated stores removed", removed.len());
        }

        Commands::ClearCache => {
            let services = open_services(&config_path).await?;
            let count = services.stores.media.keys().await?.len();
            services.stores.media.clear().await?;
            println!("Dropped {} cached entries", count);
        }
    }

    Ok(())
}

async fn open_services(config_path: &Path) -> Result<ReaderServices> {
    let config = ReaderConfig::load_or_default(config_path)
        .await
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    Ok(ReaderServices::open(config).await?)
}

async fn load_catalog(path: &Path) -> Result<Vec<Score>> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let scores = serde_json::from_str(&json)
        .with_context(|| format!("{} is not a list of scores", path.display()))?;
    Ok(scores)
}

/// Drive one caching pass through the worker, printing its progress
async fn sync(services: ReaderServices, scores: Vec<Score>) -> Result<()> {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (update_tx, mut update_rx) = mpsc::unbounded_channel();
    let worker = tokio::spawn(worker_task(command_rx, update_tx, services));

    command_tx.send(ReaderCommand::SetDocuments { scores })?;

    let mut outcome = Ok(());
    while let Some(update) = update_rx.recv().await {
        match update {
            ReaderUpdate::Progress {
                current,
                total,
                title,
                ..
            } => println!("[{}/{}] {}", current, total, title),
            ReaderUpdate::CacheState { score_key, state } => {
                log::debug!("{} is now {:?}", score_key, state);
            }
            ReaderUpdate::PassFinished { report } => {
                println!(
                    "Cached {} of {} scores ({} failed)",
                    report.succeeded, report.attempted, report.failed
                );
                if report.failed > 0 {
                    outcome = Err(anyhow::anyhow!("{} scores failed to cache", report.failed));
                }
                break;
            }
            ReaderUpdate::Error { message } => {
                outcome = Err(anyhow::anyhow!(message));
                break;
            }
            _ => {}
        }
    }

    drop(command_tx);
    worker.await?;
    outcome
}
