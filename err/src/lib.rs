#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no valid anchor volume descriptor pointer found at LBA 256")]
    NoAnchor,
    #[error("partition map references unknown partition number {0}")]
    UnknownPartition(u16),
    #[error("bad descriptor: {0}")]
    BadDescriptor(&'static str),
    #[error("file entry does not fit File Entry or Extended File Entry layout")]
    BadFileEntry,
    #[error("seek past end of file")]
    SeekPastEnd,
}

pub type Result<T> = core::result::Result<T, Error>;
