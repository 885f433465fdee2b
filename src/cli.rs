use clap::Parser;
use std::path::PathBuf;

/// Command line options for the demo server binary.
#[derive(Parser)]
#[command(name = "webstrand")]
#[command(about = "Demo server for the webstrand request engine", long_about = None)]
pub struct Cli {
    /// Address to bind
    #[arg(short, long, default_value = "127.0.0.1:8070", env = "STRAND_ADDR")]
    pub addr: String,

    /// Directory of template sources, preloaded once at startup
    #[arg(short, long, default_value = "templates")]
    pub templates: PathBuf,

    /// File streamed in chunks on GET /media
    #[arg(short, long, default_value = "static/sample.mp3")]
    pub media: PathBuf,
}
