use clap::{Parser, Subcommand};
use typed_bytesize::ByteSizeIec;

/// 一行输入即一条命令，命令名是第一个词
#[derive(Debug, Parser)]
#[command(multicall = true)]
pub struct Line {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Create a fresh file system of SIZE bytes (K/M/G suffixes accepted)
    Format {
        #[arg(value_parser = parse_size)]
        size: u64,
    },
    /// Make a directory
    Mkdir { path: String },
    /// Remove an empty directory
    Rmdir { path: String },
    /// List directories and files
    Ls {
        #[arg(default_value = ".")]
        path: String,
    },
    /// Change the working directory
    Cd { path: String },
    /// Print the working directory
    Pwd,
    /// Show the inode behind PATH
    Info { path: String },
    /// Verify on-disk consistency
    Check,
    /// Print the superblock and free space
    Debug,
    /// Leave the shell
    Exit,
}

/// 字节数，可带二进制单位：`K`、`M`、`G`
pub fn parse_size(arg: &str) -> Result<u64, String> {
    let arg = arg.trim();
    let split = arg
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(arg.len());
    let (digits, unit) = arg.split_at(split);

    let n: u64 = digits
        .parse()
        .map_err(|_| format!("invalid size: {arg:?}"))?;
    let size = match unit.to_ascii_uppercase().as_str() {
        "" | "B" => n,
        "K" | "KB" | "KIB" => ByteSizeIec::kib(n).0,
        "M" | "MB" | "MIB" => ByteSizeIec::mib(n).0,
        "G" | "GB" | "GIB" => ByteSizeIec::gib(n).0,
        _ => return Err(format!("unknown size unit: {unit:?}")),
    };

    Ok(size)
}
