use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gnxapi::client::DEFAULT_PAGE_LIMIT;
use gnxapi::{ComicApi, ComicStatus, GnxClient};
use gnxconfig::get_config;
use gnxreader::{PacedOutput, ReadSession, ReadState, ReaderConfigExt, SessionPhase};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Lecteur en ligne de commande pour les BD narrées GNX
#[derive(Parser)]
#[command(name = "gnx")]
#[command(about = "Read GNX narrated comics from the terminal", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the comics known to the backend
    Comics {
        /// 1-based page of the listing
        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
        limit: u32,

        /// Only comics with this status (pending, completed, failed)
        #[arg(long)]
        status: Option<String>,
    },

    /// Read a section aloud, then the following ones until the end
    Read {
        comic_id: String,
        section_id: String,

        /// Start playing once the first page is ready; otherwise print the
        /// loaded state and exit
        #[arg(long)]
        autoplay: bool,
    },
}

fn init_logging(config: &gnxconfig::Config) -> Result<()> {
    if !config.get_log_enable_console()? {
        return Ok(());
    }

    let level = config.get_log_min_level()?.to_lowercase();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = get_config();
    init_logging(&config)?;

    let client = GnxClient::from_config(&config)
        .await
        .context("Failed to create the GNX client")?;
    info!(base_url = %client.base_url(), "GNX client ready");

    match cli.command {
        Commands::Comics {
            page,
            limit,
            status,
        } => list_comics(&client, page, limit, status.map(ComicStatus::from)).await,
        Commands::Read {
            comic_id,
            section_id,
            autoplay,
        } => read(Arc::new(client), &config, &comic_id, &section_id, autoplay).await,
    }
}

async fn list_comics(
    api: &dyn ComicApi,
    page: u32,
    limit: u32,
    status: Option<ComicStatus>,
) -> Result<()> {
    let list = api.list_comics(page, limit, status).await?;

    println!("{} comics (page {})", list.total, list.page.max(page));
    for comic in &list.comics {
        println!("  {:>6}  [{}] {}", comic.id, comic.status, comic.title);
    }
    Ok(())
}

async fn read(
    api: Arc<GnxClient>,
    config: &gnxconfig::Config,
    comic_id: &str,
    section_id: &str,
    autoplay: bool,
) -> Result<()> {
    let settings = config.get_reader_settings()?;
    let output = PacedOutput::new(config.get_playback_bitrate_kbps()?);
    let session = ReadSession::spawn(api, Arc::new(output), settings);
    let mut updates = session.subscribe();

    // ========== Chargement de la première page ==========
    tokio::select! {
        result = session.initialize(comic_id, section_id) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted while loading");
            session.dispose().await?;
            return Ok(());
        }
    }

    let state = session.state();
    println!(
        "{} / {} {} ({} pages)",
        state.comic_title, state.current_chapter_label, state.chapter_title, state.total_pages
    );

    if !autoplay {
        println!("{}", serde_json::to_string_pretty(&state)?);
        session.dispose().await?;
        return Ok(());
    }

    // ========== Lecture ==========
    session.play().await?;
    let mut last = ReadState::default();
    report(&session.state(), &mut last);

    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping playback");
                break Ok(());
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let state = updates.borrow_and_update().clone();
                report(&state, &mut last);

                match state.phase {
                    SessionPhase::Finished => {
                        println!("The end.");
                        break Ok(());
                    }
                    SessionPhase::Error => {
                        let reason = state.error.unwrap_or_default();
                        break Err(reason);
                    }
                    _ => {}
                }
            }
        }
    };

    session.dispose().await?;
    match outcome {
        Ok(()) => Ok(()),
        Err(reason) => bail!("Reading stopped: {}", reason),
    }
}

/// Print what changed since the previous snapshot
fn report(state: &ReadState, last: &mut ReadState) {
    if state.chapter_title != last.chapter_title
        || state.current_chapter_label != last.current_chapter_label
    {
        println!();
        println!("== {} {} ==", state.current_chapter_label, state.chapter_title);
    }

    if state.image_url != last.image_url {
        if let Some(url) = &state.image_url {
            println!(
                "-- page {}/{}: {}",
                state.current_page_number, state.total_pages, url
            );
        }
    }

    if state.phase == SessionPhase::Playing
        && (state.current_detail_text != last.current_detail_text
            || state.current_page_number != last.current_page_number
            || state.current_detail_index != last.current_detail_index)
    {
        if let Some(line) = &state.current_detail_text {
            println!("   {}", line);
        }
    }

    if state.is_loading && !last.is_loading {
        info!(page = state.current_page_number, "Waiting for page resources");
    }

    *last = state.clone();
}
