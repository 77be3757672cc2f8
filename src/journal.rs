use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Encode a single record as `[len][bincode][crc32]`.
fn encode_record(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Append-only reservation journal.
///
/// Format per record: `[u32: len][bincode: Event][u32: crc32]`, `len` being
/// the byte length of the payload (CRC excluded). A truncated last record
/// after a crash is discarded by the length-prefix + CRC check on replay.
pub struct Journal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Journal {
    /// Open (or create) the journal file at `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Append one record and fsync. Test convenience — production code
    /// buffers a batch with `append_buffered` and commits it with one
    /// `flush_sync` (group commit).
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer one record without flushing or syncing.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_record(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    /// Flush the buffer and fsync the file.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a compacted snapshot to a temp file and fsync it. The slow
    /// I/O phase — runs outside the writer's turn.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let tmp_path = path.with_extension("journal.tmp");
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        for event in events {
            encode_record(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Atomic swap: rename the temp file over the journal and reopen.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        let tmp_path = self.path.with_extension("journal.tmp");
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Both compaction phases in one call. Used by tests.
    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Replay the journal from disk, returning all valid records in order.
    /// Truncated or corrupt trailing records are silently discarded.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();

        loop {
            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
            let len = u32::from_le_bytes(len_buf) as usize;

            let mut payload = vec![0u8; len];
            match reader.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
                Err(e) => return Err(e),
            }

            let mut crc_buf = [0u8; 4];
            match reader.read_exact(&mut crc_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
                Err(e) => return Err(e),
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                // corrupt record — stop replaying
                break;
            }

            match bincode::deserialize::<Event>(&payload) {
                Ok(event) => events.push(event),
                Err(_) => break, // corrupt payload
            }
        }

        Ok(events)
    }
}
