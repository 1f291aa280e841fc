use anyhow::{anyhow, Result};
use clap::Parser;
use restaurants::{config::Config, duck, report};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    // ─── 1) init logging (stderr; stdout carries the report) ─────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    // ─── 2) configuration ───────────────────────────────────────────
    let cfg = Config::parse();
    info!(csv = %cfg.csv.display(), table = %cfg.table, db_dir = %cfg.db_dir.display(), "startup");

    // ─── 3) load or reuse the table ─────────────────────────────────
    let (conn, outcome) = duck::load_table(&cfg.csv, &cfg.table, &cfg.db_dir)?;
    info!(?outcome, "table ready");

    // ─── 4) per-region report ───────────────────────────────────────
    let regions = report::report(&conn, &cfg.table, &cfg.columns(), cfg.limit, cfg.format)?;

    conn.close().map_err(|(_, e)| anyhow!(e).context("closing database"))?;
    info!(regions, "all done");
    Ok(())
}
