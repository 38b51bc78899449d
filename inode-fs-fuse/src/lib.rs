mod block_file;
mod command;
mod session;

#[cfg(test)]
mod tests;

pub use self::{
    block_file::BlockFile,
    command::{parse_size, Command, Line},
    session::{Reply, Session},
};
