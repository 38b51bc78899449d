mod cli;

use std::io::{self, BufRead, Write};

use clap::Parser;
use cli::Cli;
use inode_fs_fuse::{Line, Reply, Session};

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let session = match cli.format {
        Some(size) => Session::create(&cli.image, size),
        None => Session::open(&cli.image),
    };
    let mut session = session.map_err(io::Error::other)?;
    if !session.is_formatted() {
        println!("{:?} is not formatted, use `format <SIZE>` first", cli.image);
    }

    let mut stdout = io::stdout();
    let mut lines = io::stdin().lock().lines();
    loop {
        write!(stdout, "{}> ", session.prompt())?;
        stdout.flush()?;

        let Some(line) = lines.next().transpose()? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match Line::try_parse_from(line.split_whitespace()) {
            Ok(line) => line.command,
            Err(err) => {
                err.print()?;
                continue;
            }
        };

        match session.execute(command) {
            Ok(Reply::Done) => println!("OK"),
            Ok(Reply::Output(text)) if text.is_empty() => {}
            Ok(Reply::Output(text)) => println!("{text}"),
            Ok(Reply::Exit) => break,
            Err(err) => println!("{err}"),
        }
    }

    Ok(())
}
