use std::path::PathBuf;

use clap::Parser;
use inode_fs_fuse::parse_size;

#[derive(Parser)]
pub struct Cli {
    /// Disk image file
    pub image: PathBuf,

    /// Format the image to SIZE bytes before reading commands (K/M/G suffixes accepted)
    #[arg(long, short, value_parser = parse_size)]
    pub format: Option<u64>,
}
