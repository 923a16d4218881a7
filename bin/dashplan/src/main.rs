use std::{num::NonZeroUsize, str::FromStr, time::Duration};

use clap::Parser;
use fake_user_agent::get_chrome_rua;
use iori_offline::{
    HttpDataSource, Manifest, Segment, SegmentListBuilder, StreamKey, TokioExecutor,
};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use url::Url;

#[derive(Parser, Debug, Clone)]
#[clap(version, author)]
/// Lists every segment an offline download of a DASH manifest would fetch.
pub struct DashPlanArgs {
    /// Additional HTTP headers, in `Name: value` form
    #[clap(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// HTTP timeout, in seconds
    #[clap(short, long, default_value = "10")]
    pub timeout: u64,

    /// Index probes running at the same time
    #[clap(long, alias = "threads", default_value = "4")]
    pub concurrency: NonZeroUsize,

    /// Build the list used to delete a download: representations whose index cannot be
    /// loaded are skipped instead of failing
    #[clap(long)]
    pub remove: bool,

    /// Only list the selected representations, as `period.adaptation_set.representation`
    #[clap(short, long = "key")]
    pub keys: Vec<StreamKey>,

    /// Print the list as JSON
    #[clap(long)]
    pub json: bool,

    /// URL of the MPD manifest
    pub url: Url,
}

impl DashPlanArgs {
    fn headers(&self) -> anyhow::Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for header in &self.headers {
            let (key, value) = header
                .split_once(':')
                .ok_or_else(|| anyhow::anyhow!("Invalid header: {header}"))?;
            headers.insert(
                HeaderName::from_str(key.trim())?,
                HeaderValue::from_str(value.trim())?,
            );
        }
        Ok(headers)
    }

    fn client(&self) -> anyhow::Result<Client> {
        Ok(Client::builder()
            .default_headers(self.headers()?)
            .user_agent(get_chrome_rua())
            .timeout(Duration::from_secs(self.timeout))
            .build()?)
    }
}

#[derive(Serialize)]
struct PlannedSegment<'a> {
    start_time_us: i64,
    url: &'a str,
    range: Option<String>,
    cache_key: &'a str,
}

impl<'a> From<&'a Segment> for PlannedSegment<'a> {
    fn from(segment: &'a Segment) -> Self {
        Self {
            start_time_us: segment.start_time_us,
            url: segment.request.url.as_str(),
            range: segment
                .request
                .byte_range
                .and_then(|range| range.to_http_range()),
            cache_key: &segment.request.cache_key,
        }
    }
}

async fn load_manifest(client: &Client, url: &Url) -> anyhow::Result<Manifest> {
    let response = client
        .get(url.clone())
        .header("Accept", "application/dash+xml,video/vnd.mpeg.dash.mpd")
        .send()
        .await?
        .error_for_status()?;
    // Relative BaseURLs resolve against the location after redirects
    let manifest_url = response.url().clone();
    let text = response.text().await?;
    let mpd = dash_mpd::parse(&text)?;
    Ok(Manifest::from_mpd(&mpd, &manifest_url)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .try_from_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = DashPlanArgs::parse();
    let client = args.client()?;

    let manifest = load_manifest(&client, &args.url)
        .await?
        .copy_with_keys(&args.keys);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, stopping index probes...");
                cancel.cancel();
            }
        }
    });

    let segments = SegmentListBuilder::new(HttpDataSource::new(client))
        .with_executor(TokioExecutor::current()?)
        .with_concurrency(args.concurrency)
        .with_cancellation(cancel)
        .build_segment_list(&manifest, args.remove)
        .await?;

    let planned: Vec<PlannedSegment> = segments.iter().map(PlannedSegment::from).collect();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&planned)?);
    } else {
        for segment in planned {
            println!(
                "{}\t{}\t{}",
                segment.start_time_us,
                segment.url,
                segment.range.as_deref().unwrap_or("-")
            );
        }
    }

    Ok(())
}
