use udf_err::{Error, Result};

/// A random-access byte source: a disk image, a file, a memory map.
///
/// `read_at` mirrors positional file reads (`pread`/`FileExt::read_at`): it
/// may return fewer bytes than requested, with `0` meaning end of stream.
/// Implementations must remain valid and safe to call concurrently for the
/// lifetime of any `Volume` built on top of them.
pub trait DataStorage {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;
}

/// Fills `buf` completely, looping over short reads, failing with `Error::Io`
/// on a premature end of stream.
pub fn read_exact_at<DS: DataStorage + ?Sized>(
    storage: &DS,
    mut offset: u64,
    mut buf: &mut [u8],
) -> Result<()> {
    while !buf.is_empty() {
        let read = storage.read_at(offset, buf)?;
        if read == 0 {
            return Err(Error::Io(std::io::Error::from(
                std::io::ErrorKind::UnexpectedEof,
            )));
        }
        offset += read as u64;
        buf = &mut buf[read..];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Mem(Vec<u8>);

    impl DataStorage for Mem {
        fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
            let offset = offset as usize;
            if offset >= self.0.len() {
                return Ok(0);
            }
            let n = buf.len().min(self.0.len() - offset);
            buf[..n].copy_from_slice(&self.0[offset..offset + n]);
            Ok(n)
        }
    }

    #[test]
    fn read_exact_at_fills_across_short_reads() {
        let storage = Mem((0u8..16).collect());
        let mut buf = [0u8; 10];
        read_exact_at(&storage, 3, &mut buf).unwrap();
        assert_eq!(buf, [3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn read_exact_at_errors_on_eof() {
        let storage = Mem(vec![0u8; 4]);
        let mut buf = [0u8; 10];
        assert!(read_exact_at(&storage, 0, &mut buf).is_err());
    }
}
