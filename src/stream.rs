//! The backing stream contract: anything seekable, readable, and (for
//! mutating operations) writable and flushable.
//! The engine owns whatever implements this; callers must not mutate
//! it behind the engine's back.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

pub trait BackingStream: Send {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<()>;
    fn write_at(&mut self, pos: u64, buf: &[u8]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
    fn len(&mut self) -> io::Result<u64>;
}

impl BackingStream for File {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<()> {
        self.seek(SeekFrom::Start(pos))?;
        self.read_exact(buf)
    }

    fn write_at(&mut self, pos: u64, buf: &[u8]) -> io::Result<()> {
        self.seek(SeekFrom::Start(pos))?;
        self.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Write::flush(self)?;
        self.sync_data()
    }

    fn len(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

impl BackingStream for Cursor<Vec<u8>> {
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<()> {
        self.seek(SeekFrom::Start(pos))?;
        self.read_exact(buf)
    }

    fn write_at(&mut self, pos: u64, buf: &[u8]) -> io::Result<()> {
        let end = pos + buf.len() as u64;
        if end > self.get_ref().len() as u64 {
            self.get_mut().resize(end as usize, 0);
        }
        self.seek(SeekFrom::Start(pos))?;
        self.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Write::flush(self)
    }

    fn len(&mut self) -> io::Result<u64> {
        Ok(self.get_ref().len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_backing_grows_on_write_past_end() {
        let mut stream = Cursor::new(Vec::new());
        stream.write_at(10, b"hi").unwrap();
        assert_eq!(stream.len().unwrap(), 12);
        let mut buf = [0u8; 2];
        stream.read_at(10, &mut buf).unwrap();
        assert_eq!(&buf, b"hi");
    }
}
