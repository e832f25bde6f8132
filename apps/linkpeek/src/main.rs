use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use bridge_channel::LocalChannel;
use bridge_proto::{DocumentSnapshot, Node, NodeId};
use clap::Parser;
use remote_docs::{InMemoryDocumentSource, RemoteDocsClient, RemoteDocsError};
use tracing::{debug, warn};

use linkpeek::cli::{Cli, Command, PreviewArgs, RectanglesArgs};
use linkpeek::config::BridgeConfig;
use linkpeek::host::{CoreContext, InMemoryDocumentHost};
use linkpeek::surface::{parse_file_key, LoadOutcome, Resolution, SurfaceApp};
use linkpeek::telemetry::logging;

/// Both contexts wired together in this process.
struct Bridge {
    host: Arc<InMemoryDocumentHost>,
    app: Arc<SurfaceApp>,
    _core: CoreContext,
}

impl Bridge {
    fn connect(
        config: &BridgeConfig,
        host: Arc<InMemoryDocumentHost>,
        docs: Arc<InMemoryDocumentSource>,
    ) -> anyhow::Result<Self> {
        let (core_end, surface_end) = LocalChannel::pair();
        let core = CoreContext::attach(host.clone(), Arc::new(core_end), config.bounds)?;
        let app = SurfaceApp::attach(Arc::new(surface_end), docs, config)?;
        Ok(Self {
            host,
            app,
            _core: core,
        })
    }

    fn print_notifications(&self) {
        for message in self.host.notifications() {
            println!("notification: {message}");
        }
    }
}

async fn within<T, E, F>(wait: Duration, what: &str, fut: F) -> anyhow::Result<T>
where
    F: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let result = tokio::time::timeout(wait, fut)
        .await
        .with_context(|| format!("{what} timed out after {wait:?}"))?;
    Ok(result?)
}

fn read_snapshot(path: &Path) -> anyhow::Result<DocumentSnapshot> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("snapshot {} is not JSON", path.display()))?;
    Ok(DocumentSnapshot::from_json(value)?)
}

/// The snapshot behind `file_key`. Any remote failure yields `None`, which
/// the surface reports as a missing file.
async fn fetch_snapshot(
    cli: &Cli,
    args: &PreviewArgs,
    file_key: &str,
    wait: Duration,
) -> anyhow::Result<Option<DocumentSnapshot>> {
    if let Some(path) = &args.snapshot {
        return read_snapshot(path).map(Some);
    }
    let Some(token) = cli.token.as_deref() else {
        bail!("no access token; set FIGMA_TOKEN or pass --snapshot");
    };
    let client = RemoteDocsClient::new(&cli.api_base, token);
    match within(wait, "file fetch", client.get_file(file_key)).await {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(err) => {
            match err.downcast_ref::<RemoteDocsError>() {
                Some(RemoteDocsError::NotFound(_)) => {
                    warn!(file_key, "file not found on the metadata service")
                }
                _ => warn!(file_key, error = %err, "failed to fetch file"),
            }
            Ok(None)
        }
    }
}

fn describe(resolution: &Resolution) -> String {
    match resolution {
        Resolution::NoSelection => "nothing selected".to_string(),
        Resolution::SelectionWithNoLink => "selection has no link".to_string(),
        Resolution::ResolvedLink(link) if link.is_manual() => format!("{} (typed)", link.url),
        Resolution::ResolvedLink(link) if link.mixed => format!("{} (mixed)", link.url),
        Resolution::ResolvedLink(link) => link.url.clone(),
    }
}

async fn preview(cli: &Cli, config: &BridgeConfig, args: &PreviewArgs) -> anyhow::Result<()> {
    let wait = Duration::from_secs(cli.timeout_secs);
    let host = InMemoryDocumentHost::new("open");
    let docs = InMemoryDocumentSource::new();
    if let Some(file_key) = parse_file_key(&args.locator) {
        if let Some(snapshot) = fetch_snapshot(cli, args, &file_key, wait).await? {
            host.load_document(&snapshot);
            docs.insert(file_key, snapshot).await;
        }
    }

    let bridge = Bridge::connect(config, host, docs)?;
    let command = within(wait, "getCommand", bridge.app.core().command()).await?;
    debug!(%command, "plugin command");

    let outcome = within(wait, "load", bridge.app.submit_locator(&args.locator)).await?;
    let file_key = match outcome {
        LoadOutcome::Loaded { file_key, .. } => file_key,
        other => {
            bridge.print_notifications();
            bail!("nothing loaded ({other:?})");
        }
    };

    let view = bridge.app.view();
    println!("{file_key}: {} link(s)", view.links.len());
    for link in &view.links {
        let kind = if link.mixed { "mixed" } else { "whole" };
        println!("  {}\t{kind}\t{}", link.id, link.url);
    }

    if args.desktop {
        within(wait, "resize", bridge.app.toggle_desktop()).await?;
    }
    if let Some(path) = &args.place_svg {
        let svg = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        within(wait, "placeSvg", bridge.app.core().place_svg(&svg)).await?;
    }

    for id in &args.select {
        bridge.host.select([id.as_str()]);
        let pass = within(
            wait,
            "selection",
            bridge.app.on_selection_changed(vec![NodeId::from(id.as_str())]),
        )
        .await?;
        let resolution = match pass {
            Some(resolution) => resolution,
            None => tokio::time::timeout(wait, bridge.app.settled())
                .await
                .context("selection did not settle")?,
        };
        println!("select {id}: {}", describe(&resolution));
    }

    if let Some(url) = &args.manual_url {
        println!("typed: {}", describe(&bridge.app.enter_url(url)));
    }

    if let Some(size) = bridge.host.window_size() {
        println!("window: {}x{}", size.width, size.height);
    }
    bridge.print_notifications();
    Ok(())
}

async fn rectangles(cli: &Cli, config: &BridgeConfig, args: &RectanglesArgs) -> anyhow::Result<()> {
    let wait = Duration::from_secs(cli.timeout_secs);
    let host = InMemoryDocumentHost::new("rectangles");
    match &args.snapshot {
        Some(path) => host.load_document(&read_snapshot(path)?),
        None => host.add_page(Node::new("0:1").with_name("Page 1")),
    }

    let bridge = Bridge::connect(config, host, InMemoryDocumentSource::new())?;
    let ids = within(
        wait,
        "createRectangles",
        bridge.app.core().create_rectangles(args.count),
    )
    .await?;
    for id in &ids {
        if let Some(placement) = bridge.host.geometry(id) {
            println!("{id}\tx={}", placement.x);
        }
    }
    bridge.print_notifications();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before clap so its values act as env fallbacks.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    logging::init(&cli.logging.to_config())?;

    let mut config = BridgeConfig::from_env()?;
    config.api_base = cli.api_base.clone();
    config.token = cli.token.clone();

    match &cli.command {
        Command::Preview(args) => preview(&cli, &config, args).await,
        Command::Rectangles(args) => rectangles(&cli, &config, args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_service_reads_as_missing_file() {
        let cli = Cli::parse_from([
            "linkpeek",
            "--api-base",
            "http://127.0.0.1:9",
            "--token",
            "secret",
            "preview",
            "https://www.figma.com/file/ABC123/Landing",
        ]);
        let Command::Preview(args) = &cli.command else {
            panic!("expected preview");
        };
        let fetched = fetch_snapshot(&cli, args, "ABC123", Duration::from_secs(5))
            .await
            .expect("remote failures are not fatal");
        assert!(fetched.is_none());
    }
}
