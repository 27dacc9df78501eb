use crate::error::Result;
use std::ffi::OsString;

mod posix_env;

pub use posix_env::PosixEnv;

/// An Env is the interface the storage engine uses to reach the operating
/// system: filesystem access, file locking, and so on. Callers may supply a
/// custom Env when opening a database for fine-grained control, e.g. to fake
/// the filesystem in tests.
///
/// All Env implementations must be safe for concurrent access from multiple
/// threads without external synchronization.
pub trait Env: Send + Sync {
    /// The returned file will only be accessed by one thread at a time.
    fn new_sequential_file(&self, fname: &str) -> Result<Box<dyn SequentialFile>>;

    /// The returned file may be concurrently accessed by multiple threads.
    fn new_random_access_file(&self, fname: &str) -> Result<Box<dyn RandomAccessFile>>;

    /// The returned file will only be accessed by one thread at a time.
    fn new_writable_file(&self, fname: &str) -> Result<Box<dyn WritableFile>>;

    fn new_appendable_file(&self, fname: &str) -> Result<Box<dyn WritableFile>>;
    fn file_exists(&self, fname: &str) -> bool;
    fn get_children(&self, dname: &str) -> Result<Vec<OsString>>;
    fn remove_file(&self, fname: &str) -> Result<()>;
    fn create_dir(&self, dname: &str) -> Result<()>;
    fn remove_dir(&self, dname: &str) -> Result<()>;
    fn get_file_size(&self, fname: &str) -> Result<u64>;
    fn rename_file(&self, src: &str, target: &str) -> Result<()>;
    fn lock_file(&self, fname: &str) -> Result<Box<dyn FileLock>>;
    fn unlock_file(&self, lock: Box<dyn FileLock>) -> Result<()>;
    // todo: fn schedule(function: Box<dyn FnMut()>);
}

/// A file abstraction for reading sequentially through a file.
pub trait SequentialFile {
    /// Reads up to `dst.len()` bytes, returning how many were actually read
    /// (fewer than requested at EOF — never an error for a short read).
    fn read(&mut self, dst: &mut [u8]) -> Result<usize>;
    fn skip(&mut self, n: usize) -> Result<()>;
}

/// A file abstraction for randomly reading the contents of a file.
pub trait RandomAccessFile {
    fn read(&self, offset: usize, dst: &mut [u8]) -> Result<()>;
}

/// A file abstraction for sequential writing.  The implementation
/// must provide buffering since callers may append small fragments
/// at a time to the file.
pub trait WritableFile {
    fn append(&mut self, data: &[u8]) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
    fn sync(&mut self) -> Result<()>;
}

pub trait FileLock {}
