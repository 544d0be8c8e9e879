use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;

use super::Storage;
use crate::error::{StorageError, StorageResult};
use crate::location::Location;

/// Local filesystem storage (rooted at the host filesystem).
#[derive(Debug, Clone, Default)]
pub struct FsStorage;

impl FsStorage {
    pub fn new() -> Self {
        Self
    }
}

fn local(loc: &Location) -> StorageResult<&Path> {
    match loc {
        Location::Local(p) => Ok(p.as_path()),
        other => Err(StorageError::WrongLocation {
            adapter: "FsStorage",
            location: other.to_string(),
        }),
    }
}

fn display(p: &Path) -> String {
    p.display().to_string()
}

impl Storage for FsStorage {
    fn read_all(&self, loc: &Location) -> StorageResult<Bytes> {
        let p = local(loc)?;
        let bytes = fs::read(p).map_err(|e| StorageError::io("read", display(p), e))?;
        Ok(Bytes::from(bytes))
    }

    fn read_range(&self, loc: &Location, offset: u64, len: usize) -> StorageResult<Bytes> {
        let p = local(loc)?;
        let mut f = File::open(p).map_err(|e| StorageError::io("open", display(p), e))?;
        f.seek(SeekFrom::Start(offset))
            .map_err(|e| StorageError::io("seek", display(p), e))?;
        let mut buf = Vec::with_capacity(len);
        f.take(len as u64)
            .read_to_end(&mut buf)
            .map_err(|e| StorageError::io("read", display(p), e))?;
        Ok(Bytes::from(buf))
    }

    fn write(&self, loc: &Location, bytes: Bytes) -> StorageResult<()> {
        let p = local(loc)?;
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::io("mkparent", display(parent), e))?;
        }
        let mut f = File::create(p).map_err(|e| StorageError::io("create", display(p), e))?;
        f.write_all(&bytes)
            .map_err(|e| StorageError::io("write", display(p), e))?;
        f.flush().map_err(|e| StorageError::io("flush", display(p), e))?;
        Ok(())
    }

    fn delete(&self, loc: &Location) -> StorageResult<()> {
        let p = local(loc)?;
        if p.exists() {
            fs::remove_file(p).map_err(|e| StorageError::io("delete", display(p), e))?;
        }
        Ok(())
    }

    fn list(&self, prefix: &Location) -> StorageResult<Vec<Location>> {
        let prefix_path = local(prefix)?;
        let mut results = Vec::new();

        if !prefix_path.exists() {
            return Ok(results);
        }

        if prefix_path.is_file() {
            results.push(prefix.clone());
            return Ok(results);
        }

        fn visit_dirs(dir: &Path, results: &mut Vec<PathBuf>) -> std::io::Result<()> {
            if dir.is_dir() {
                for entry in fs::read_dir(dir)? {
                    let path = entry?.path();
                    if path.is_dir() {
                        visit_dirs(&path, results)?;
                    } else {
                        results.push(path);
                    }
                }
            }
            Ok(())
        }

        let mut paths = Vec::new();
        visit_dirs(prefix_path, &mut paths)
            .map_err(|e| StorageError::io("list", display(prefix_path), e))?;
        paths.sort();
        results.extend(paths.into_iter().map(Location::Local));
        Ok(results)
    }

    fn size(&self, loc: &Location) -> StorageResult<u64> {
        let p = local(loc)?;
        let meta = fs::metadata(p).map_err(|e| StorageError::io("stat", display(p), e))?;
        Ok(meta.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_creates_parents_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let loc = Location::Local(dir.path().join("a/b/c.bin"));
        let storage = FsStorage::new();

        storage.write(&loc, Bytes::from_static(b"hello world")).unwrap();
        assert_eq!(&storage.read_all(&loc).unwrap()[..], b"hello world");
        assert_eq!(&storage.read_range(&loc, 6, 100).unwrap()[..], b"world");
        assert_eq!(storage.size(&loc).unwrap(), 11);
        assert!(storage.exists(&loc).unwrap());
    }

    #[test]
    fn list_is_recursive_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new();
        for rel in ["x=2/p.parquet", "x=1/p.parquet", "top.txt"] {
            storage
                .write(&Location::Local(dir.path().join(rel)), Bytes::from_static(b"1"))
                .unwrap();
        }
        let base = Location::Local(dir.path().to_path_buf());
        let rels: Vec<String> = storage
            .list(&base)
            .unwrap()
            .iter()
            .filter_map(|l| l.strip_prefix(&base))
            .collect();
        assert_eq!(rels, vec!["top.txt", "x=1/p.parquet", "x=2/p.parquet"]);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let loc = Location::Local(dir.path().join("nope"));
        let storage = FsStorage::new();
        assert!(storage.read_all(&loc).unwrap_err().is_not_found());
        assert!(!storage.exists(&loc).unwrap());
        storage.delete(&loc).unwrap();
    }
}
