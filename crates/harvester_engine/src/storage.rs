use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use engine_logging::engine_warn;
use harvester_core::CanonicalRecord;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("record could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Destination of accepted records. Called in acceptance order.
pub trait RecordWriter: Send {
    fn write(&mut self, record: &CanonicalRecord) -> Result<(), StorageError>;
}

/// Appends one JSON object per line and flushes after every record.
#[derive(Debug)]
pub struct JsonLinesWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

/// Whether the last line of `file` lacks its newline, as after a crash mid-write.
fn ends_mid_line(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

impl JsonLinesWriter {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let io_err = |source| StorageError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        if ends_mid_line(&mut file).map_err(io_err)? {
            engine_warn!("{path:?} ends with a partial record; starting a new line");
            file.write_all(b"\n").map_err(io_err)?;
        }
        Ok(Self {
            out: BufWriter::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordWriter for JsonLinesWriter {
    fn write(&mut self, record: &CanonicalRecord) -> Result<(), StorageError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.out
            .write_all(&line)
            .and_then(|()| self.out.flush())
            .map_err(|source| StorageError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

#[derive(Deserialize)]
struct HashOnly {
    content_hash: String,
}

/// Content hashes of every record already stored at `path`, for seeding the
/// dedup seen-set on resume. A missing file yields none; a torn last line
/// (crash mid-write) is skipped.
pub fn load_content_hashes(path: &Path) -> Result<Vec<String>, StorageError> {
    read_lines(path, |line| {
        serde_json::from_str::<HashOnly>(line).map(|h| h.content_hash)
    })
}

/// Every record stored at `path`.
pub fn load_records(path: &Path) -> Result<Vec<CanonicalRecord>, StorageError> {
    read_lines(path, |line| serde_json::from_str(line))
}

fn read_lines<T>(
    path: &Path,
    parse: impl Fn(&str) -> Result<T, serde_json::Error>,
) -> Result<Vec<T>, StorageError> {
    let io_err = |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(io_err(err)),
    };

    let mut items = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(io_err)?;
        if line.trim().is_empty() {
            continue;
        }
        match parse(&line) {
            Ok(item) => items.push(item),
            Err(err) => engine_warn!(
                "{}:{}: skipping unreadable record: {err}",
                path.display(),
                number + 1
            ),
        }
    }
    Ok(items)
}
