use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "kline-cli")]
#[command(about = "Fetch historical 1-minute klines from the Binance spot API into Parquet files")]
#[command(version = "1.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, default_value = "kline_data")]
    pub output_dir: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run every job listed in the jobs CSV file
    Run {
        #[arg(short, long, default_value = "jobs.csv")]
        jobs: String,
    },

    /// Fetch a single symbol over one date range
    Fetch {
        /// Trading symbol (e.g. BTCUSDT)
        symbol: String,

        /// Range start date, YYYY-MM-DD (UTC midnight, inclusive)
        #[arg(short, long)]
        start: String,

        /// Range end date, YYYY-MM-DD (UTC midnight, exclusive)
        #[arg(short, long)]
        end: String,
    },
}
