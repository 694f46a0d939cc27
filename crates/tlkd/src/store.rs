//! POSIX file store backing the host daemon
//!
//! Blobs live as flat files under `<storagedir>/tlk`. The daemon only ever
//! sees ciphertext; it stores and returns bytes verbatim.

use std::fs::{self, DirBuilder, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use ote_core::{FileRequest, ObjectId, RequestType, TE_STORAGE_OBJID_MAX_LEN};
use tracing::{debug, info, warn};

/// Subdirectory of the storage dir that holds every blob.
pub const STORAGE_SUBDIR: &str = "tlk";

#[derive(Debug, Clone)]
pub struct HostFileStore {
    root: PathBuf,
}

impl HostFileStore {
    pub fn new(storage_dir: impl AsRef<Path>) -> Self {
        Self {
            root: storage_dir.as_ref().join(STORAGE_SUBDIR),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Re-create the storage root (mode 0700) if it has gone missing.
    pub fn ensure_root(&self) -> io::Result<()> {
        if self.root.is_dir() {
            return Ok(());
        }
        DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(&self.root)?;
        info!(root = %self.root.display(), "storage directory created");
        Ok(())
    }

    /// Execute `req` against the store, filling in `result`, `error` and,
    /// for reads, `data`.
    pub fn handle(&self, req: &mut FileRequest) {
        let outcome = self.ensure_root().and_then(|()| self.execute(req));
        match outcome {
            Ok(result) => {
                req.result = result;
                req.error = 0;
                debug!(req = req.req_type.as_str(), object = %req.name, result, "request done");
            }
            Err(e) => {
                let errno = e.raw_os_error().unwrap_or(libc::EIO);
                match e.kind() {
                    io::ErrorKind::NotFound => {
                        debug!(req = req.req_type.as_str(), object = %req.name, "no such object")
                    }
                    _ => warn!(
                        req = req.req_type.as_str(),
                        object = %req.name,
                        errno,
                        "request failed: {e}"
                    ),
                }
                req.fail(errno);
            }
        }
    }

    fn execute(&self, req: &mut FileRequest) -> io::Result<u64> {
        let path = self.path_for(&req.name)?;
        match req.req_type {
            RequestType::Write => {
                if req.data.len() != req.data_len as usize {
                    return Err(io::Error::from_raw_os_error(libc::EINVAL));
                }
                // The previous blob stays intact until the rename.
                let staging = self.staging_path_for(&path);
                if let Err(e) = write_synced(&staging, &req.data) {
                    let _ = fs::remove_file(&staging);
                    return Err(e);
                }
                fs::rename(&staging, &path)?;
                req.data.clear();
                Ok(req.data_len as u64)
            }
            RequestType::Read => {
                let file = fs::File::open(&path)?;
                let mut data = Vec::new();
                file.take(req.data_len as u64).read_to_end(&mut data)?;
                let n = data.len() as u64;
                req.data = data;
                Ok(n)
            }
            RequestType::Size => Ok(fs::metadata(&path)?.len()),
            RequestType::Delete => {
                fs::remove_file(&path)?;
                Ok(0)
            }
        }
    }

    /// Staging file for a write to `path`. Its name is longer than any object
    /// name, so no request can address it.
    fn staging_path_for(&self, path: &Path) -> PathBuf {
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        self.root
            .join(format!(".{name:~<width$}.tmp", width = TE_STORAGE_OBJID_MAX_LEN))
    }

    /// Map an object name to its file. Names are re-validated here so a
    /// misbehaving peer cannot escape the storage root.
    fn path_for(&self, name: &str) -> io::Result<PathBuf> {
        let id = ObjectId::parse(name).map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?;
        Ok(self.root.join(id.as_str()))
    }
}

fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(data)?;
    file.sync_all()
}
