use std::fs;
use std::path::PathBuf;

use clap::Parser;
use inode_fs::Error;

use crate::{parse_size, Command, Line, Reply, Session};

/// 每个测试独占一个临时镜像文件
struct TempImage(PathBuf);

impl TempImage {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "inode-fs-{}-{name}.img",
            std::process::id()
        ));
        let _ = fs::remove_file(&path);
        Self(path)
    }
}

impl Drop for TempImage {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}

fn parse(line: &str) -> Command {
    Line::try_parse_from(line.split_whitespace())
        .unwrap()
        .command
}

fn run(session: &mut Session, line: &str) -> Reply {
    session.execute(parse(line)).unwrap()
}

#[test]
fn sizes() {
    assert_eq!(Ok(102_400), parse_size("102400"));
    assert_eq!(Ok(4096), parse_size("4K"));
    assert_eq!(Ok(8 << 20), parse_size("8M"));
    assert_eq!(Ok(1 << 30), parse_size("1g"));
    assert_eq!(Ok(2 << 20), parse_size("2MiB"));
    assert!(parse_size("").is_err());
    assert!(parse_size("M").is_err());
    assert!(parse_size("5X").is_err());
}

#[test]
fn command_lines() {
    assert_eq!(
        Command::Ls {
            path: String::from(".")
        },
        parse("ls")
    );
    assert_eq!(Command::Format { size: 8 << 20 }, parse("format 8M"));
    assert_eq!(
        Command::Mkdir {
            path: String::from("/a1/b1")
        },
        parse("mkdir /a1/b1")
    );
    assert!(Line::try_parse_from(["rmdir"]).is_err());
    assert!(Line::try_parse_from(["format", "big"]).is_err());
    assert!(Line::try_parse_from(["cat", "x"]).is_err());
}

#[test]
fn unformatted_session() {
    let image = TempImage::new("unformatted");
    let mut session = Session::open(&image.0).unwrap();
    assert!(!session.is_formatted());

    for line in ["mkdir a1", "ls", "pwd", "check", "debug"] {
        assert!(
            matches!(session.execute(parse(line)), Err(Error::NotFormatted)),
            "{line}"
        );
    }
    assert_eq!(Reply::Exit, run(&mut session, "exit"));

    // 非镜像文件同样视为未格式化
    fs::write(&image.0, b"not an image").unwrap();
    assert!(!Session::open(&image.0).unwrap().is_formatted());
}

#[test]
fn image_survives_reopen() {
    let image = TempImage::new("reopen");
    {
        let mut session = Session::open(&image.0).unwrap();
        assert_eq!(Reply::Done, run(&mut session, "format 1M"));
        assert_eq!(1 << 20, fs::metadata(&image.0).unwrap().len());

        run(&mut session, "mkdir a1");
        run(&mut session, "mkdir a1/b1");
        run(&mut session, "mkdir a2");
        run(&mut session, "rmdir a2");
        run(&mut session, "cd a1");
        assert_eq!("/a1", session.prompt());
    }

    let mut session = Session::open(&image.0).unwrap();
    assert!(session.is_formatted());
    assert_eq!("/", session.prompt());
    assert_eq!(Reply::Output(String::from("a1/")), run(&mut session, "ls /"));
    assert_eq!(Reply::Output(String::from("b1/")), run(&mut session, "ls a1"));
    assert_eq!(Reply::Done, run(&mut session, "check"));

    let Reply::Output(info) = run(&mut session, "info /a1/b1") else {
        panic!("info prints the inode");
    };
    assert!(info.contains("kind: DIR"));
}

#[test]
fn create_recovers_damaged_image() {
    let image = TempImage::new("damaged");
    {
        let mut session = Session::create(&image.0, 1 << 20).unwrap();
        run(&mut session, "mkdir a1");
    }

    // 签名完好，但簇总数与布局对不上
    let mut bytes = fs::read(&image.0).unwrap();
    bytes[20] ^= 0xff;
    fs::write(&image.0, &bytes).unwrap();
    assert!(matches!(
        Session::open(&image.0),
        Err(Error::Corruption(_))
    ));

    let mut session = Session::create(&image.0, 100 << 10).unwrap();
    assert!(session.is_formatted());
    assert_eq!(100 << 10, fs::metadata(&image.0).unwrap().len());
    assert_eq!(Reply::Output(String::new()), run(&mut session, "ls /"));
    assert_eq!(Reply::Done, run(&mut session, "check"));

    assert!(Session::open(&image.0).unwrap().is_formatted());
}

#[test]
fn errors_are_reported() {
    let image = TempImage::new("errors");
    let mut session = Session::open(&image.0).unwrap();
    assert!(matches!(
        session.execute(parse("format 1000")),
        Err(Error::InvalidSize(1000))
    ));
    assert!(!session.is_formatted());

    run(&mut session, "format 100K");
    run(&mut session, "mkdir a1");
    run(&mut session, "mkdir a1/b1");
    assert!(matches!(
        session.execute(parse("mkdir a1")),
        Err(Error::AlreadyExists(_))
    ));
    assert!(matches!(
        session.execute(parse("rmdir a1")),
        Err(Error::NotEmpty(_))
    ));
    assert!(matches!(
        session.execute(parse("cd nope")),
        Err(Error::PathNotFound(_))
    ));
}
