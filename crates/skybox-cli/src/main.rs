use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::net::IpAddr;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

use skybox_core::{
    channel_from_uri, fetch_catalog, fetch_channel_map, resolve_service, BrowseClient, Catalog,
    ChannelMap, PlayMonitor, SkyBrowse, SkyConfig, SoapClient, TransportEvent, SKY_BROWSE_URN,
    SKY_PLAY_URN,
};
use ssdp_core::{DiscoveredDevice, Discovery, DiscoveryConfig, ServiceSet};

#[derive(Parser, Debug)]
#[command(name = "skybox", version, about = "Sky set-top-box discovery and catalog tool")]
struct Cli {
    /// Set log level: error,warn,info,debug,trace
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Network interface to search from (default: all interfaces)
    #[arg(long, global = true)]
    interface: Option<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Find Sky boxes on the local network
    Discover {
        /// Stop after this many seconds (0 = keep searching)
        #[arg(long, default_value_t = 0)]
        timeout: u64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fetch the recording catalog from the first box found
    Catalog {
        /// Container to enumerate (defaults to the recordings folder)
        #[arg(long)]
        object_id: Option<String>,

        /// Items to request per page
        #[arg(long)]
        page_size: Option<u32>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report what the box is playing, as it changes
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    fmt()
        .with_env_filter(EnvFilter::new(&cli.log_level))
        .with_target(false)
        .init();

    let cfg = SkyConfig::default();
    let bind_addr = cli
        .interface
        .as_deref()
        .map(ssdp_core::net::interface_addr)
        .transpose()?;

    match cli.cmd {
        Commands::Discover { timeout, json } => discover_boxes(&cfg, bind_addr, timeout, json).await,
        Commands::Catalog {
            object_id,
            page_size,
            json,
        } => {
            let object_id = object_id.unwrap_or_else(|| cfg.recordings_object_id.clone());
            let page_size = page_size.unwrap_or(cfg.page_size);
            show_catalog(&cfg, bind_addr, &object_id, page_size, json).await
        }
        Commands::Watch => watch(&cfg, bind_addr).await,
    }
}

async fn start_discovery(cfg: &SkyConfig, bind_addr: Option<IpAddr>) -> Result<Discovery> {
    let required = ServiceSet::new(cfg.required_urns());
    let discovery_cfg = DiscoveryConfig {
        period: cfg.search_period(),
        mx: cfg.search_mx,
        bind_addr,
    };
    Discovery::start(required, discovery_cfg)
        .await
        .context("starting SSDP discovery")
}

/// Block until the first box fully resolves.
async fn first_box(cfg: &SkyConfig, bind_addr: Option<IpAddr>) -> Result<DiscoveredDevice> {
    println!("Searching for a Sky box...");
    let mut discovery = start_discovery(cfg, bind_addr).await?;
    let found = discovery
        .recv()
        .await
        .ok_or_else(|| anyhow!("discovery stopped unexpectedly"))?;
    println!("✓ Found Sky box at {}", found.address);
    Ok(found)
}

async fn discover_boxes(
    cfg: &SkyConfig,
    bind_addr: Option<IpAddr>,
    timeout: u64,
    json: bool,
) -> Result<()> {
    let mut discovery = start_discovery(cfg, bind_addr).await?;

    if !json {
        println!("Searching for Sky boxes (Ctrl+C to stop)...");
    }

    let stream = async {
        while let Some(found) = discovery.recv().await {
            print_device(&found, json);
        }
    };

    if timeout == 0 {
        stream.await;
    } else {
        // Searching never finishes on its own; the deadline is the caller's.
        let _ = tokio::time::timeout(Duration::from_secs(timeout), stream).await;
    }
    Ok(())
}

fn print_device(found: &DiscoveredDevice, json: bool) {
    if json {
        match serde_json::to_string_pretty(found) {
            Ok(s) => println!("{}", s),
            Err(e) => tracing::error!("serializing device: {}", e),
        }
    } else {
        println!("\n✓ Sky box at {}", found.address);
        for (urn, location) in &found.services {
            println!("    {} = {}", urn, location);
        }
    }
}

/// Discover, resolve the browse endpoint, and pull the whole catalog with a
/// progress bar fed by the pagination engine.
async fn retrieve_catalog(
    cfg: &SkyConfig,
    found: &DiscoveredDevice,
    http: &reqwest::Client,
    object_id: &str,
    page_size: u32,
) -> Result<Catalog> {
    let location = found
        .services
        .get(SKY_BROWSE_URN)
        .ok_or_else(|| anyhow!("discovered box is missing the browse service"))?;

    let endpoints = resolve_service(http, location, SKY_BROWSE_URN)
        .await
        .context("resolving browse control endpoint")?;
    tracing::debug!("browse control endpoint: {}", endpoints.control_url);

    let soap = SoapClient::new(http.clone(), cfg.user_agent.clone());
    let browser = SkyBrowse::new(soap, endpoints.control_url, SKY_BROWSE_URN);

    fetch_with_progress(&browser, object_id, page_size).await
}

async fn fetch_with_progress<C: BrowseClient>(
    browser: &C,
    object_id: &str,
    page_size: u32,
) -> Result<Catalog> {
    let mut bar: Option<ProgressBar> = None;
    let catalog = fetch_catalog(browser, object_id, page_size, |have, total| {
        let bar = bar.get_or_insert_with(|| {
            let b = ProgressBar::new(total as u64);
            b.set_style(
                ProgressStyle::default_bar()
                    .template("[{bar:40.cyan/blue}] {pos}/{len} recordings")
                    .unwrap()
                    .progress_chars("█▓▒░ "),
            );
            b
        });
        bar.set_length(total as u64);
        bar.set_position(have as u64);
    })
    .await
    .context("retrieving recording catalog")?;

    if let Some(bar) = bar {
        bar.finish();
    }
    Ok(catalog)
}

async fn show_catalog(
    cfg: &SkyConfig,
    bind_addr: Option<IpAddr>,
    object_id: &str,
    page_size: u32,
    json: bool,
) -> Result<()> {
    let found = first_box(cfg, bind_addr).await?;
    let http = reqwest::Client::new();
    let catalog = retrieve_catalog(cfg, &found, &http, object_id, page_size).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
    } else {
        println!("✓ {} recording(s)", catalog.len());
        for (resource, item) in &catalog {
            println!("\n  {}", item.title);
            println!("    {}", item.description);
            println!("    {}", resource);
        }
    }
    Ok(())
}

async fn watch(cfg: &SkyConfig, bind_addr: Option<IpAddr>) -> Result<()> {
    let found = first_box(cfg, bind_addr).await?;
    let http = reqwest::Client::new();

    // The catalog walk and the listings fetch are independent; run them
    // side by side and wait for both.
    let (catalog, channels) = tokio::try_join!(
        retrieve_catalog(
            cfg,
            &found,
            &http,
            &cfg.recordings_object_id,
            cfg.page_size
        ),
        async {
            fetch_channel_map(&http, &cfg.listings_url)
                .await
                .context("retrieving channel listings")
        },
    )?;
    println!(
        "✓ {} recording(s), {} channel(s)",
        catalog.len(),
        channels.len()
    );

    let play_location = found
        .services
        .get(SKY_PLAY_URN)
        .ok_or_else(|| anyhow!("discovered box is missing the play service"))?;
    let play = resolve_service(&http, play_location, SKY_PLAY_URN)
        .await
        .context("resolving play event endpoint")?;

    let (_monitor, mut events) =
        PlayMonitor::subscribe(http.clone(), play.event_url, &cfg.user_agent)
            .await
            .context("subscribing to playback events")?;
    println!("✓ Watching playback (Ctrl+C to stop)");

    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::StateChanged(state) => println!("Transport state: {}", state),
            TransportEvent::UriChanged(uri) => {
                println!("{}", describe_playback(&uri, &catalog, &channels))
            }
        }
    }
    Ok(())
}

fn describe_playback(uri: &str, catalog: &Catalog, channels: &ChannelMap) -> String {
    if let Some(id) = channel_from_uri(uri) {
        return match channels.get(&id) {
            Some(name) => format!("Live TV: {}", name),
            None => format!("Live TV: unlisted channel {:X}", id),
        };
    }
    if let Some(item) = catalog.get(uri) {
        return format!("Recording: {} ({})", item.title, item.description);
    }
    uri.to_string()
}
