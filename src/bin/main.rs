use clap::Parser;
use std::path::PathBuf;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

use eoka_harvest::{
    CancelToken, Collector, Config, CsvExporter, HarvestBrowser, SessionState, TracingProgress,
};

#[derive(Parser)]
#[command(name = "eoka-harvest")]
#[command(about = "Harvest search posts through an authenticated browser session")]
#[command(version)]
struct Cli {
    /// Config file to run
    config: PathBuf,

    /// Session file (overrides config)
    #[arg(long)]
    session: Option<PathBuf>,

    /// Hashtag or term to search (overrides config)
    #[arg(long)]
    tag: Option<String>,

    /// Start date, YYYY-MM-DD (overrides config)
    #[arg(long)]
    since: Option<String>,

    /// End date, YYYY-MM-DD (overrides config)
    #[arg(long)]
    until: Option<String>,

    /// Maximum records to collect (overrides config)
    #[arg(long)]
    limit: Option<usize>,

    /// CSV output path (overrides config)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Run in headless mode (overrides config)
    #[arg(long)]
    headless: bool,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Validate config and session without running
    #[arg(long)]
    check: bool,

    /// Quiet mode (only errors)
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(ref session) = self.session {
            config.session = session.clone();
        }
        if let Some(ref tag) = self.tag {
            config.search.tag = tag.clone();
        }
        if let Some(ref since) = self.since {
            config.search.since = since.clone();
        }
        if let Some(ref until) = self.until {
            config.search.until = until.clone();
        }
        if let Some(limit) = self.limit {
            config.search.limit = limit;
        }
        if let Some(ref output) = self.output {
            config.output.path = output.clone();
        }
        if self.headless {
            config.browser.headless = true;
        }
    }
}

#[tokio::main]
async fn main() -> eoka_harvest::Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let mut config = Config::load(&cli.config)?;
    cli.apply(&mut config);
    config.validate()?;
    let session = SessionState::load(&config.session)?;

    if cli.check {
        println!("Config valid: {}", config.name);
        println!("  Query: {}", eoka_harvest::search::raw_query(&config.search));
        println!("  Limit: {}", config.search.limit);
        println!("  Session: {} ({} cookies)", config.session.display(), session.cookies.len());
        println!("  Output: {}", config.output.path.display());
        return Ok(());
    }

    println!("Running: {}", config.name);

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping after the current page");
            on_interrupt.cancel();
        }
    });

    let browser = HarvestBrowser::open(&config, &session).await?;
    let outcome = Collector::new(browser.catalog(), browser.flags(), config.pacing.clone())
        .with_base_url(config.platform.base_url.clone())
        .with_cancel(cancel)
        .collect(&browser, &config.search, &TracingProgress)
        .await;

    let written =
        CsvExporter::new(config.output.bom).write_path(&config.output.path, &outcome.records);

    println!();
    if outcome.is_success() {
        println!("✓ Done ({:?})", outcome.stop);
    } else {
        println!("✗ Stopped early");
        if let Some(ref error) = outcome.error {
            println!("  Error: {}", error);
        }
    }
    println!("  Records: {}", outcome.records.len());
    println!("  Pages: {}", outcome.pages);
    println!("  Duration: {}ms", outcome.duration_ms);
    if outcome.retries > 0 {
        println!("  Retries: {}", outcome.retries);
    }
    println!("  Output: {}", describe_output(&written));

    let closed = browser.close().await;
    written?;
    closed?;

    if !outcome.is_success() && outcome.records.is_empty() {
        std::process::exit(1);
    }

    Ok(())
}

fn describe_output(written: &eoka_harvest::Result<Option<PathBuf>>) -> String {
    match written {
        Ok(Some(path)) => path.display().to_string(),
        Ok(None) => "nothing to write".to_string(),
        Err(e) => format!("write failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_output() {
        assert_eq!(
            describe_output(&Ok(Some(PathBuf::from("out/tweets.csv")))),
            "out/tweets.csv"
        );
        assert_eq!(describe_output(&Ok(None)), "nothing to write");
        let failed = Err(eoka_harvest::Error::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        )));
        assert_eq!(describe_output(&failed), "write failed: io error: denied");
    }

    #[test]
    fn test_overrides_applied() {
        let cli = Cli::parse_from([
            "eoka-harvest",
            "configs/example.yaml",
            "--tag",
            "#Rust",
            "--limit",
            "7",
            "--headless",
        ]);
        let mut config = Config::load(&cli.config).unwrap();
        cli.apply(&mut config);
        assert_eq!(config.search.tag, "#Rust");
        assert_eq!(config.search.limit, 7);
        assert!(config.browser.headless);
        config.validate().unwrap();
    }
}
