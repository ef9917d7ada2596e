use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use rkyv::Deserialize;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::model::LogEntry;

/// Upper bound on one encoded entry. Larger length headers are corruption.
pub const MAX_FRAME_BYTES: usize = 1 << 20;

/// Append-only data file of length-prefixed `rkyv` entries:
/// `[Length u32 LE][Data (N bytes)]`.
#[derive(Debug)]
pub struct Segment {
    pub file_path: PathBuf,
    file: File,
    strict_durability: bool,
    current_offset: u64,
}

impl Segment {
    /// Opens (or creates) the data file. `strict` fsyncs after every append.
    pub fn open(path: &Path, strict: bool) -> io::Result<Self> {
        let file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)?;

        let current_offset = file.metadata()?.len();

        Ok(Self {
            file_path: path.to_path_buf(),
           file,
           strict_durability: strict,
           current_offset,
        })
    }

    pub fn len(&self) -> u64 {
        self.current_offset
    }

    pub fn is_empty(&self) -> bool {
        self.current_offset == 0
    }

    /// Writes one entry and returns the offset it starts at.
    pub fn append(&mut self, entry: &LogEntry) -> Result<u64, StoreError> {
        let bytes = encode(entry)?;
        if bytes.len() > MAX_FRAME_BYTES {
            return Err(StoreError::Encode(format!(
                "entry is {} bytes, limit is {}",
                bytes.len(),
                MAX_FRAME_BYTES
            )));
        }

        // Bytes past current_offset are left over from a failed append
        let start = self.current_offset;
        if self.file.metadata()?.len() != start {
            self.rollback(start)?;
        }

        // One write_all per entry so a crash leaves at most a torn tail
        let mut frame = Vec::with_capacity(4 + bytes.len());
        frame.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        frame.extend_from_slice(&bytes);

        if let Err(e) = self.write_frame(&frame) {
            if let Err(undo) = self.rollback(start) {
                warn!(error = %undo, offset = start, "could not cut back failed append");
            }
            return Err(e.into());
        }

        self.current_offset += frame.len() as u64;
        Ok(start)
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.file.write_all(frame)?;
        if self.strict_durability {
            self.file.sync_data()?;
        }
        Ok(())
    }

    fn rollback(&mut self, start: u64) -> io::Result<()> {
        warn!(path = %self.file_path.display(), offset = start, "discarding partial entry");
        self.file.set_len(start)?;
        if self.strict_durability {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Reads every entry from the start of the file. A torn final entry (from
    /// a crash mid-append) is dropped and the file truncated to the last
    /// complete entry.
    pub fn replay(&mut self) -> Result<Vec<(u64, LogEntry)>, StoreError> {
        let file = File::open(&self.file_path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        let mut offset = 0u64;

        loop {
            let mut len_buf = [0u8; 4];
            match read_full(&mut reader, &mut len_buf)? {
                0 => break,
                4 => {}
                _ => {
                    self.truncate_torn_tail(offset, file_len)?;
                    break;
                }
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_FRAME_BYTES {
                return Err(StoreError::Corrupt {
                    offset,
                    reason: format!("length header {} exceeds the {} byte frame limit", len, MAX_FRAME_BYTES),
                });
            }

            // A short frame is only a torn tail if it runs to the end of the file
            let remaining = file_len.saturating_sub(offset + 4);
            if len as u64 > remaining {
                self.truncate_torn_tail(offset, file_len)?;
                break;
            }

            let mut bytes = vec![0u8; len];
            if read_full(&mut reader, &mut bytes)? < len {
                return Err(StoreError::Corrupt { offset, reason: "file shrank during replay".into() });
            }

            entries.push((offset, decode(&bytes, offset)?));
            offset += 4 + len as u64;
        }

        debug!(entries = entries.len(), path = %self.file_path.display(), "replayed data file");
        Ok(entries)
    }

    /// Replaces the file contents with `entries`. The new file is fully
    /// written, synced and opened before it is renamed over the old one, so
    /// a failure at any step leaves this segment on the old file.
    pub fn rewrite<'a, I>(&mut self, entries: I) -> Result<(), StoreError>
    where I: IntoIterator<Item = &'a LogEntry> {
        let tmp_path = self.file_path.with_extension("compacting");
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            for entry in entries {
                let bytes = encode(entry)?;
                writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
                writer.write_all(&bytes)?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        let replacement = Segment::open(&tmp_path, self.strict_durability)?;
        fs::rename(&tmp_path, &self.file_path)?;
        self.file = replacement.file;
        self.current_offset = replacement.current_offset;
        Ok(())
    }

    fn truncate_torn_tail(&mut self, good_len: u64, file_len: u64) -> Result<(), StoreError> {
        warn!(
            path = %self.file_path.display(),
            kept_bytes = good_len,
            dropped_bytes = file_len.saturating_sub(good_len),
            "truncating torn entry at end of data file"
        );
        let file = OpenOptions::new().write(true).open(&self.file_path)?;
        file.set_len(good_len)?;
        file.sync_all()?;
        self.current_offset = good_len;
        Ok(())
    }
}

fn encode(entry: &LogEntry) -> Result<rkyv::AlignedVec, StoreError> {
    rkyv::to_bytes::<_, 256>(entry).map_err(|e| StoreError::Encode(e.to_string()))
}

fn decode(bytes: &[u8], offset: u64) -> Result<LogEntry, StoreError> {
    // Archived data must be aligned before validation
    let mut aligned = rkyv::AlignedVec::with_capacity(bytes.len());
    aligned.extend_from_slice(bytes);

    let archived = rkyv::check_archived_root::<LogEntry>(&aligned[..])
    .map_err(|e| StoreError::Corrupt { offset, reason: format!("{:?}", e) })?;
    let entry: LogEntry = archived
    .deserialize(&mut rkyv::Infallible)
    .map_err(|_| StoreError::Corrupt { offset, reason: "deserialize".into() })?;
    Ok(entry)
}

/// Like `read_exact`, but reports how many bytes were read before EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
