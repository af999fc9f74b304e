//! `-V`/`--` CLI surface (§6): `icecast-hls [-V] [--] <config.ini>`.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "icecast-hls", version, about = "Live audio transcoding and HLS segmenting pipeline")]
pub struct CliArgs {
    /// Print version and every registered plugin name, grouped by stage,
    /// then exit (§6).
    #[arg(short = 'V', long = "list-plugins")]
    pub list_plugins: bool,

    /// Path to the INI configuration file.
    pub config: Option<String>,
}
