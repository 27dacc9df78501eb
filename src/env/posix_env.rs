use std::{
    ffi::OsString,
    fs::{self, File, OpenOptions},
    io::{self, Read as _, Seek, SeekFrom, Write as _},
    os::unix::fs::FileExt,
    path::Path,
    sync::Mutex,
};

use super::{Env, FileLock, RandomAccessFile, SequentialFile, WritableFile};
use crate::error::{Result, StrataError};

/// An `Env` backed directly by `std::fs`. Single-node, single-process use
/// only — `lock_file` creates a marker file but does not take an OS-level
/// exclusive lock; callers on the same host are trusted not to open the
/// same database twice concurrently.
pub struct PosixEnv {}

impl PosixEnv {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for PosixEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Env for PosixEnv {
    fn new_sequential_file(&self, fname: &str) -> Result<Box<dyn SequentialFile>> {
        let file = File::open(fname).map_err(|e| to_db_error(fname, e))?;
        Ok(Box::new(PosixSequentialFile { file }))
    }

    fn new_random_access_file(&self, fname: &str) -> Result<Box<dyn RandomAccessFile>> {
        let file = File::open(fname).map_err(|e| to_db_error(fname, e))?;
        Ok(Box::new(PosixRandomAccessFile { file }))
    }

    fn new_writable_file(&self, fname: &str) -> Result<Box<dyn WritableFile>> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(fname)
            .map_err(|e| to_db_error(fname, e))?;
        Ok(Box::new(PosixWritableFile::new(file)))
    }

    fn new_appendable_file(&self, fname: &str) -> Result<Box<dyn WritableFile>> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(fname)
            .map_err(|e| to_db_error(fname, e))?;
        Ok(Box::new(PosixWritableFile::new(file)))
    }

    fn file_exists(&self, fname: &str) -> bool {
        Path::new(fname).exists()
    }

    fn get_children(&self, dname: &str) -> Result<Vec<OsString>> {
        match fs::read_dir(dname) {
            Ok(entries) => Ok(entries
                .filter_map(|entry| entry.map(|e| e.file_name()).ok())
                .collect()),
            Err(error) => Err(to_db_error(dname, error)),
        }
    }

    fn remove_file(&self, fname: &str) -> Result<()> {
        match fs::remove_file(fname) {
            Ok(()) => Ok(()),
            Err(error) => Err(to_db_error(fname, error)),
        }
    }

    fn create_dir(&self, dname: &str) -> Result<()> {
        match fs::create_dir(dname) {
            Ok(()) => Ok(()),
            Err(error) => Err(to_db_error(dname, error)),
        }
    }

    fn remove_dir(&self, dname: &str) -> Result<()> {
        match fs::remove_dir(dname) {
            Ok(()) => Ok(()),
            Err(error) => Err(to_db_error(dname, error)),
        }
    }

    fn get_file_size(&self, fname: &str) -> Result<u64> {
        match fs::metadata(fname) {
            Ok(data) => Ok(data.len()),
            Err(error) => Err(to_db_error(fname, error)),
        }
    }

    fn rename_file(&self, src: &str, target: &str) -> Result<()> {
        match fs::rename(src, target) {
            Ok(()) => Ok(()),
            Err(error) => Err(to_db_error(src, error)),
        }
    }

    fn lock_file(&self, fname: &str) -> Result<Box<dyn FileLock>> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(fname)
            .map_err(|e| to_db_error(fname, e))?;
        Ok(Box::new(PosixFileLock { file }))
    }

    fn unlock_file(&self, lock: Box<dyn FileLock>) -> Result<()> {
        drop(lock);
        Ok(())
    }
}

fn to_db_error(target: &str, error: io::Error) -> StrataError {
    match error.kind() {
        io::ErrorKind::NotFound => {
            StrataError::invalid_argument(format!("{target}: no such file or directory"))
        }
        _ => StrataError::Io(error),
    }
}

struct PosixSequentialFile {
    file: File,
}

impl SequentialFile for PosixSequentialFile {
    fn read(&mut self, dst: &mut [u8]) -> Result<usize> {
        self.file
            .read(dst)
            .map_err(|e| to_db_error("sequential read", e))
    }

    fn skip(&mut self, n: usize) -> Result<()> {
        self.file
            .seek(SeekFrom::Current(n as i64))
            .map_err(|e| to_db_error("sequential skip", e))?;
        Ok(())
    }
}

/// Positional reads via `pread`, so one file may be shared across the reader
/// threads an SST reader hands out without a shared seek cursor.
struct PosixRandomAccessFile {
    file: File,
}

impl RandomAccessFile for PosixRandomAccessFile {
    fn read(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        self.file
            .read_exact_at(dst, offset as u64)
            .map_err(|e| to_db_error("random access read", e))
    }
}

struct PosixWritableFile {
    file: Mutex<File>,
}

impl PosixWritableFile {
    fn new(file: File) -> Self {
        Self {
            file: Mutex::new(file),
        }
    }
}

impl WritableFile for PosixWritableFile {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.file
            .get_mut()
            .unwrap()
            .write_all(data)
            .map_err(|e| to_db_error("append", e))
    }

    fn close(&mut self) -> Result<()> {
        self.flush()
    }

    fn flush(&mut self) -> Result<()> {
        self.file
            .get_mut()
            .unwrap()
            .flush()
            .map_err(|e| to_db_error("flush", e))
    }

    fn sync(&mut self) -> Result<()> {
        self.file
            .get_mut()
            .unwrap()
            .sync_data()
            .map_err(|e| to_db_error("sync", e))
    }
}

struct PosixFileLock {
    #[allow(dead_code)]
    file: File,
}

impl FileLock for PosixFileLock {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn writable_file_roundtrips_through_sequential_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal-0001");
        let path = path.to_str().unwrap();

        let env = PosixEnv::new();
        {
            let mut w = env.new_writable_file(path).unwrap();
            w.append(b"hello ").unwrap();
            w.append(b"world").unwrap();
            w.sync().unwrap();
        }

        let mut r = env.new_sequential_file(path).unwrap();
        let mut buf = [0u8; 11];
        r.read(&mut buf).unwrap();
        assert_eq!(&buf, b"hello world");
    }

    #[test]
    fn random_access_file_reads_at_arbitrary_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table-0001.sst");
        let path = path.to_str().unwrap();

        let env = PosixEnv::new();
        {
            let mut w = env.new_writable_file(path).unwrap();
            w.append(b"0123456789").unwrap();
        }

        let r = env.new_random_access_file(path).unwrap();
        let mut buf = [0u8; 4];
        r.read(3, &mut buf).unwrap();
        assert_eq!(&buf, b"3456");
    }

    #[test]
    fn get_children_lists_directory_entries() {
        let dir = tempfile::tempdir().unwrap();
        let env = PosixEnv::new();
        env.new_writable_file(dir.path().join("a").to_str().unwrap())
            .unwrap();
        env.new_writable_file(dir.path().join("b").to_str().unwrap())
            .unwrap();

        let mut children: Vec<_> = env
            .get_children(dir.path().to_str().unwrap())
            .unwrap()
            .into_iter()
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        children.sort();
        assert_eq!(children, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn file_exists_reflects_filesystem_state() {
        let dir = tempfile::tempdir().unwrap();
        let env = PosixEnv::new();
        let path = dir.path().join("missing");
        assert!(!env.file_exists(path.to_str().unwrap()));
    }

    #[test]
    fn lock_file_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("LOCK");
        let env = PosixEnv::new();
        let lock = env.lock_file(path.to_str().unwrap()).unwrap();
        env.unlock_file(lock).unwrap();
    }
}
