use clap::Parser;
use std::path::PathBuf;

use crate::report::{Columns, Format, TOP_N};

/// Load NYC restaurant inspection results into DuckDB and print, per borough,
/// the cuisines with the most recorded violations.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about)]
pub struct Config {
    /// Inspection results CSV (must have a header row)
    #[arg(
        long,
        env = "RESTAURANTS_CSV",
        default_value = "data/DOHMH_New_York_City_Restaurant_Inspection_Results.csv"
    )]
    pub csv: PathBuf,

    /// Table name; also names the database file `<db-dir>/<table>.db`
    #[arg(long, env = "RESTAURANTS_TABLE", default_value = "restaurant_data")]
    pub table: String,

    /// Directory holding the database file, created if missing
    #[arg(long, env = "RESTAURANTS_DB_DIR", default_value = "db")]
    pub db_dir: PathBuf,

    #[arg(long, default_value = "BORO")]
    pub region_column: String,

    #[arg(long, default_value = "CUISINE DESCRIPTION")]
    pub cuisine_column: String,

    #[arg(long, default_value = "VIOLATION DESCRIPTION")]
    pub violation_column: String,

    /// Cuisines shown per region
    #[arg(long, default_value_t = TOP_N)]
    pub limit: usize,

    #[arg(long, value_enum, default_value_t = Format::Table)]
    pub format: Format,
}

impl Config {
    pub fn columns(&self) -> Columns {
        Columns {
            region: self.region_column.clone(),
            cuisine: self.cuisine_column.clone(),
            violation: self.violation_column.clone(),
        }
    }
}
