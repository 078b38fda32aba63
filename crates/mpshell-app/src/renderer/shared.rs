use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::error::SharedBufferError;

/// Directory holding shared segments when none is configured.
pub fn default_segment_dir() -> PathBuf {
    let shm = Path::new("/dev/shm");
    if cfg!(target_os = "linux") && shm.is_dir() {
        shm.to_path_buf()
    } else {
        std::env::temp_dir()
    }
}

/// Resolve a segment name (optionally with a leading `/`, POSIX style) to a file path.
pub fn segment_path(dir: &Path, name: &str) -> Result<PathBuf, SharedBufferError> {
    let trimmed = name.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.contains(['/', '\\']) || trimmed == ".." {
        return Err(SharedBufferError::InvalidName(name.to_string()));
    }
    Ok(dir.join(trimmed))
}

/// Read-only mapping of the decoder's frame segment.
pub struct SharedBuffer {
    path: PathBuf,
    map: Mmap,
    frame_len: usize,
}

impl SharedBuffer {
    /// Map `path`, requiring room for at least one frame of `frame_len` bytes.
    pub fn open(path: &Path, frame_len: usize) -> Result<Self, SharedBufferError> {
        let open_err = |source| SharedBufferError::Open {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(open_err)?;
        let actual = file.metadata().map_err(open_err)?.len();
        if actual < frame_len as u64 {
            return Err(SharedBufferError::TooSmall {
                path: path.to_path_buf(),
                required: frame_len,
                actual,
            });
        }

        // SAFETY: the mapping is read-only and only ever copied out of after the
        // decoder rings `render`; the decoder does not shrink the segment during a
        // session.
        let map = unsafe { Mmap::map(&file) }.map_err(open_err)?;

        Ok(Self {
            path: path.to_path_buf(),
            map,
            frame_len,
        })
    }

    /// The current frame as written by the decoder.
    pub fn frame(&self) -> &[u8] {
        &self.map[..self.frame_len]
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn names_resolve_inside_dir() {
        let dir = Path::new("/tmp/segments");
        assert_eq!(
            segment_path(dir, "/mpshell").unwrap(),
            dir.join("mpshell")
        );
        assert_eq!(segment_path(dir, "vo0").unwrap(), dir.join("vo0"));
    }

    #[test]
    fn names_cannot_escape_dir() {
        let dir = Path::new("/tmp/segments");
        for bad in ["", "/", "a/b", "..", "x\\y"] {
            assert!(segment_path(dir, bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn maps_existing_segment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[7u8; 64]).unwrap();
        file.flush().unwrap();

        let buffer = SharedBuffer::open(file.path(), 48).unwrap();
        assert_eq!(buffer.frame().len(), 48);
        assert!(buffer.frame().iter().all(|&b| b == 7));
        assert_eq!(buffer.path(), file.path());
    }

    #[test]
    fn sees_writes_made_after_mapping() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 16]).unwrap();
        file.flush().unwrap();
        let buffer = SharedBuffer::open(file.path(), 16).unwrap();

        std::fs::write(file.path(), [1u8; 16]).unwrap();
        assert!(buffer.frame().iter().all(|&b| b == 1));
    }

    #[test]
    fn rejects_short_segment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 10]).unwrap();
        file.flush().unwrap();

        let err = SharedBuffer::open(file.path(), 11).err().unwrap();
        assert!(matches!(
            err,
            SharedBufferError::TooSmall {
                required: 11,
                actual: 10,
                ..
            }
        ));
    }

    #[test]
    fn missing_segment_is_an_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SharedBuffer::open(&dir.path().join("absent"), 4).err().unwrap();
        assert!(matches!(err, SharedBufferError::Open { .. }));
    }
}
