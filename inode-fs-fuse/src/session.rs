use std::path::{Path, PathBuf};
use std::sync::Arc;

use inode_fs::{Error, FileSystem, Result};
use log::info;

use crate::{BlockFile, Command};

/// 命令执行后交给前端的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Done,
    Output(String),
    Exit,
}

/// 一个镜像文件上的交互会话，镜像未格式化时文件系统为空
pub struct Session {
    image: PathBuf,
    fs: Option<FileSystem>,
}

impl Session {
    /// 镜像不存在或尚未格式化都不算错误
    pub fn open(image: impl AsRef<Path>) -> Result<Self> {
        let image = image.as_ref().to_path_buf();
        let fs = if image.exists() {
            match FileSystem::open(Arc::new(BlockFile::open(&image)?)) {
                Ok(fs) => Some(fs),
                Err(Error::NotFormatted) => None,
                Err(err) => return Err(err),
            }
        } else {
            None
        };

        info!("image {image:?}, formatted: {}", fs.is_some());
        Ok(Self { image, fs })
    }

    /// 不读取原有内容，直接把镜像格式化为 `size` 字节，损坏的镜像也能恢复
    pub fn create(image: impl AsRef<Path>, size: u64) -> Result<Self> {
        let mut session = Self {
            image: image.as_ref().to_path_buf(),
            fs: None,
        };
        session.execute(Command::Format { size })?;

        info!("image {:?} formatted to {size} bytes", session.image);
        Ok(session)
    }

    #[inline]
    pub fn is_formatted(&self) -> bool {
        self.fs.is_some()
    }

    /// 提示符中的当前目录
    pub fn prompt(&self) -> String {
        self.fs
            .as_ref()
            .and_then(|fs| fs.working_directory().ok())
            .unwrap_or_default()
    }

    pub fn execute(&mut self, command: Command) -> Result<Reply> {
        let reply = match command {
            Command::Format { size } => {
                let device = Arc::new(BlockFile::create(&self.image)?);
                self.fs = Some(FileSystem::format(device, size)?);
                Reply::Done
            }
            Command::Mkdir { path } => {
                self.fs_mut()?.make_directory(&path)?;
                Reply::Done
            }
            Command::Rmdir { path } => {
                self.fs_mut()?.remove_directory(&path)?;
                Reply::Done
            }
            Command::Ls { path } => {
                let listing = self.fs()?.list(&path)?;
                let lines: Vec<String> = listing
                    .directories
                    .into_iter()
                    .map(|name| name + "/")
                    .chain(listing.files)
                    .collect();
                Reply::Output(lines.join("\n"))
            }
            Command::Cd { path } => {
                self.fs_mut()?.change_directory(&path)?;
                Reply::Done
            }
            Command::Pwd => Reply::Output(self.fs()?.working_directory()?),
            Command::Info { path } => {
                let stat = self.fs()?.stat(&path)?;
                Reply::Output(format!(
                    "inode: {}\nkind: {:?}\nlinks: {}\nsize: {}\nblocks: {:?}\nindirect blocks: {:?}",
                    stat.inode, stat.kind, stat.links, stat.size, stat.blocks, stat.indirect_blocks
                ))
            }
            Command::Check => {
                self.fs()?.check()?;
                Reply::Done
            }
            Command::Debug => {
                let fs = self.fs()?;
                Reply::Output(format!(
                    "{:#?}\nfree clusters: {}\nfree inodes: {}",
                    fs.super_block(),
                    fs.free_clusters(),
                    fs.free_inodes()
                ))
            }
            Command::Exit => Reply::Exit,
        };

        Ok(reply)
    }

    fn fs(&self) -> Result<&FileSystem> {
        self.fs.as_ref().ok_or(Error::NotFormatted)
    }

    fn fs_mut(&mut self) -> Result<&mut FileSystem> {
        self.fs.as_mut().ok_or(Error::NotFormatted)
    }
}
