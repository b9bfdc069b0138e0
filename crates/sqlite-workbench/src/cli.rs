use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "sqlite-workbench")]
pub struct Args {
    /// Database file to open at startup. Use ":memory:" for a scratch
    /// database; omit to open later via the `open` command.
    pub database: Option<String>,

    /// Logging level (stderr). Also supports RUST_LOG.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Row cap appended as LIMIT to SELECTs that do not carry their own.
    /// Also clamps per-request limits.
    #[arg(long, default_value_t = 1000)]
    pub max_rows: usize,

    /// Rows fetched between progress reports and cancellation checks.
    #[arg(long, default_value_t = 200)]
    pub fetch_batch: usize,
}

impl Args {
    pub fn session_config(&self) -> crate::core::session::SessionConfig {
        crate::core::session::SessionConfig {
            max_rows: self.max_rows,
            fetch_batch: self.fetch_batch,
        }
    }
}
