mod scrape;

use std::{io::Write, path::PathBuf};

use hcol::{
    db::{self, MongoStore},
    scrape::{LaunchConfig, Session},
};

#[derive(clap::Parser)]
#[command(about = "Replace the stored hackathon listings with a fresh Devpost scrape")]
struct Args {
    #[arg(long, env = "MONGO_USER", default_value = "", hide_env_values = true)]
    mongo_user: String,
    #[arg(long, env = "MONGO_PASS", default_value = "", hide_env_values = true)]
    mongo_pass: String,
    #[arg(long, env = "MONGO_HOST", default_value = db::constants::HOST)]
    mongo_host: String,
    #[arg(long, default_value = "https://devpost.com/hackathons")]
    url: String,
    #[arg(short = 'n', long, default_value_t = 100)]
    target_count: usize,
    #[arg(long, default_value_t = 30)]
    max_scrolls: usize,
    /// Chrome binary to launch instead of the detected one.
    #[arg(long, env = "CHROME_PATH", value_name = "file")]
    chrome: Option<PathBuf>,
    /// Show the browser window.
    #[arg(long)]
    headful: bool,
    /// Print the listings as JSON lines instead of storing them.
    #[arg(long)]
    dry_run: bool,
    /// Replace without a transaction (standalone servers).
    #[arg(long)]
    no_transaction: bool,
}

fn init_logger() {
    let mut builder = pretty_env_logger::formatted_timed_builder();
    builder
        .filter_level(log::LevelFilter::Info)
        .filter_module("headless_chrome", log::LevelFilter::Warn);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;

    init_logger();

    let args = Args::parse();

    let store = if args.dry_run {
        None
    } else {
        let uri = db::connection_uri(&args.mongo_user, &args.mongo_pass, &args.mongo_host);
        Some(MongoStore::connect(&uri, !args.no_transaction).await?)
    };

    let ctx = scrape::Context {
        target_count: args.target_count,
        max_scrolls: args.max_scrolls,
        pacing: scrape::Pacing::default(),
    };
    let launch = LaunchConfig {
        headless: !args.headful,
        path: args.chrome,
    };
    let url = args.url;

    let harvest = scrape::run(store.as_ref(), move || {
        let session = Session::launch(&launch)?;
        let board = session.open(&url, scrape::TILE)?;
        scrape::collect(&ctx, &board)
    })
    .await?;

    if args.dry_run {
        let mut out = std::io::stdout().lock();
        for record in &harvest.records {
            serde_json::to_writer(&mut out, record)?;
            writeln!(out)?;
        }
    }

    Ok(())
}
