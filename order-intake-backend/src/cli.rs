//! Cli things
//!

use std::path::PathBuf;

use clap::Parser;

use crate::UPLOAD_LIMIT_BYTES;

pub fn db_path_default() -> String {
    shellexpand::tilde("~/.cache/order-intake.sqlite3").to_string()
}

#[derive(Parser, Debug)]
pub struct CliOpts {
    #[clap(long, help = "Path to the database file", env = "ORDER_INTAKE_DB_PATH")]
    pub db_path: Option<PathBuf>,

    #[clap(
        long,
        help = "Directory uploaded files are stored under",
        env = "ORDER_INTAKE_MEDIA_ROOT",
        default_value = "./media"
    )]
    pub media_root: PathBuf,

    #[clap(
        long,
        help = "Largest order form body accepted, in bytes",
        env = "ORDER_INTAKE_UPLOAD_LIMIT",
        default_value_t = UPLOAD_LIMIT_BYTES
    )]
    pub upload_limit: usize,

    #[clap(long, help = "Enable debug logging")]
    pub debug: bool,
}
