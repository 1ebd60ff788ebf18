use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// hookline: drive workflow-engine webhooks from the command line
#[derive(Parser)]
#[command(name = "hookline", version, about)]
pub struct Cli {
    /// YAML configuration file (falls back to HOOKLINE_* environment variables)
    #[arg(short, long, env = "HOOKLINE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ping the health-check webhook and print the tracker snapshot
    Health,

    /// Call one operation directly (with retry) and print the result
    Invoke {
        /// emit-invoice, purchase-order, record-payment, stock-movement or health-check
        operation: String,
        /// JSON body, or @path to read it from a file
        #[arg(short, long, default_value = "{}")]
        payload: String,
    },

    /// Queue an operation, wait for the queue to drain, print the outcome
    Enqueue {
        /// invoice, purchase_order, payment or stock
        #[arg(value_name = "TYPE")]
        op_type: String,
        #[arg(short, long, default_value = "{}")]
        payload: String,
        #[arg(long, default_value = "medium")]
        priority: String,
    },

    /// Print the resolved endpoint registry
    Endpoints,

    /// Print configuration, health and metrics without calling anything
    Status,
}
