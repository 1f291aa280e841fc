use anyhow::{Context, Result};
use duckdb::{params, Connection};
use serde::Serialize;
use std::io::Write;
use tracing::{debug, info};

use crate::duck::ident::quote_ident;

/// Default number of cuisines shown per region.
pub const TOP_N: usize = 10;

const COUNT_HEADER: &str = "VIOLATION COUNT";
const NULL_LABEL: &str = "NULL";

/// Exact (case-sensitive) CSV header names the queries refer to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Columns {
    pub region: String,
    pub cuisine: String,
    pub violation: String,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            region: "BORO".to_string(),
            cuisine: "CUISINE DESCRIPTION".to_string(),
            violation: "VIOLATION DESCRIPTION".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CuisineCount {
    pub cuisine: Option<String>,
    pub violations: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionReport {
    pub region: Option<String>,
    pub top: Vec<CuisineCount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Format {
    /// Header line plus an aligned two-column table per region
    #[default]
    Table,
    /// One JSON object per region per line
    Json,
}

/// Distinct region values, in whatever order DuckDB hands them back.
/// A null region is returned as `None` and treated as its own group.
pub fn distinct_regions(
    conn: &Connection,
    table: &str,
    columns: &Columns,
) -> Result<Vec<Option<String>>> {
    let sql = format!(
        "SELECT DISTINCT CAST({region} AS VARCHAR) FROM {table};",
        region = quote_ident(&columns.region),
        table = quote_ident(table),
    );
    let mut stmt = conn
        .prepare(&sql)
        .with_context(|| format!("querying distinct {} in {}", columns.region, table))?;
    let regions = stmt
        .query_map([], |row| row.get::<_, Option<String>>(0))?
        .collect::<Result<Vec<_>, _>>()
        .context("reading region values")?;
    Ok(regions)
}

/// Cuisines in `region` ranked by number of non-null violations, highest first.
/// Equal counts are ordered by cuisine name.
pub fn top_cuisines(
    conn: &Connection,
    table: &str,
    columns: &Columns,
    region: Option<&str>,
    limit: usize,
) -> Result<Vec<CuisineCount>> {
    let sql = format!(
        "SELECT CAST({cuisine} AS VARCHAR) AS cuisine, COUNT({violation}) AS violation_count \
         FROM {table} \
         WHERE CAST({region} AS VARCHAR) IS NOT DISTINCT FROM ? \
         GROUP BY 1 \
         ORDER BY violation_count DESC, cuisine ASC NULLS LAST \
         LIMIT {limit};",
        cuisine = quote_ident(&columns.cuisine),
        violation = quote_ident(&columns.violation),
        table = quote_ident(table),
        region = quote_ident(&columns.region),
        limit = limit,
    );
    let label = region.unwrap_or(NULL_LABEL);
    let mut stmt = conn
        .prepare(&sql)
        .with_context(|| format!("preparing top cuisines query for {}", label))?;
    let rows = stmt
        .query_map(params![region], |row| {
            let violations: i64 = row.get(1)?;
            Ok(CuisineCount {
                cuisine: row.get(0)?,
                violations: violations as u64,
            })
        })
        .with_context(|| format!("querying top cuisines for {}", label))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("reading top cuisines for {}", label))?;
    debug!(region = label, groups = rows.len(), "ranked cuisines");
    Ok(rows)
}

/// Run the per-region ranking for every region and collect the results.
pub fn build_report(
    conn: &Connection,
    table: &str,
    columns: &Columns,
    limit: usize,
) -> Result<Vec<RegionReport>> {
    distinct_regions(conn, table, columns)?
        .into_iter()
        .map(|region| {
            let top = top_cuisines(conn, table, columns, region.as_deref(), limit)?;
            Ok(RegionReport { region, top })
        })
        .collect()
}

/// Query and write one region at a time. The first failing region aborts the pass;
/// regions already written stay written.
pub fn report_to<W: Write>(
    out: &mut W,
    conn: &Connection,
    table: &str,
    columns: &Columns,
    limit: usize,
    format: Format,
) -> Result<usize> {
    let regions = distinct_regions(conn, table, columns)?;
    info!(table, regions = regions.len(), "reporting top cuisines by region");
    for region in &regions {
        let report = RegionReport {
            region: region.clone(),
            top: top_cuisines(conn, table, columns, region.as_deref(), limit)?,
        };
        write_region(out, &report, columns, limit, format)?;
    }
    out.flush()?;
    Ok(regions.len())
}

/// Convenience wrapper writing to stdout.
pub fn report(
    conn: &Connection,
    table: &str,
    columns: &Columns,
    limit: usize,
    format: Format,
) -> Result<usize> {
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    report_to(&mut lock, conn, table, columns, limit, format)
}

/// Write already-built region reports in order.
pub fn write_report<W: Write>(
    out: &mut W,
    reports: &[RegionReport],
    columns: &Columns,
    limit: usize,
    format: Format,
) -> Result<()> {
    for report in reports {
        write_region(out, report, columns, limit, format)?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_region<W: Write>(
    out: &mut W,
    report: &RegionReport,
    columns: &Columns,
    limit: usize,
    format: Format,
) -> Result<()> {
    match format {
        Format::Table => {
            writeln!(
                out,
                "\nTop {} Cuisines with Most Violations in {}:",
                limit,
                report.region.as_deref().unwrap_or(NULL_LABEL)
            )?;
            out.write_all(render_table(&columns.cuisine, &report.top).as_bytes())?;
        }
        Format::Json => {
            serde_json::to_writer(&mut *out, report)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

/// Fixed-width two-column table: cuisine left-aligned, count right-aligned.
pub fn render_table(cuisine_header: &str, rows: &[CuisineCount]) -> String {
    let name_width = rows
        .iter()
        .map(|r| r.cuisine.as_deref().unwrap_or(NULL_LABEL).chars().count())
        .chain(std::iter::once(cuisine_header.chars().count()))
        .max()
        .unwrap_or(0);
    let count_width = rows
        .iter()
        .map(|r| r.violations.to_string().len())
        .chain(std::iter::once(COUNT_HEADER.len()))
        .max()
        .unwrap_or(0);

    let mut s = String::new();
    s.push_str(&format!(
        "{:<nw$} | {:>cw$}\n",
        cuisine_header,
        COUNT_HEADER,
        nw = name_width,
        cw = count_width
    ));
    s.push_str(&format!("{}-+-{}\n", "-".repeat(name_width), "-".repeat(count_width)));
    for r in rows {
        s.push_str(&format!(
            "{:<nw$} | {:>cw$}\n",
            r.cuisine.as_deref().unwrap_or(NULL_LABEL),
            r.violations,
            nw = name_width,
            cw = count_width
        ));
    }
    s
}
