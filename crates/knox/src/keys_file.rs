use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

/// The newline-separated list of registered key ids, plus its companion
/// lockfile. Every mutation happens lock → read → write-temp → rename →
/// unlock, so readers never observe a partial file and concurrent
/// writers serialize on the lock.
pub struct KeysFile {
    path: PathBuf,
    lock_path: PathBuf,
    lock: Option<File>,
}

impl KeysFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = path.with_extension("lock");
        KeysFile {
            path,
            lock_path,
            lock: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the exclusive advisory lock, blocking until it is free.
    pub fn lock(&mut self) -> std::io::Result<()> {
        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        file.lock_exclusive()?;
        self.lock = Some(file);
        Ok(())
    }

    pub fn unlock(&mut self) -> std::io::Result<()> {
        if let Some(file) = self.lock.take() {
            fs2::FileExt::unlock(&file)?;
        }
        Ok(())
    }

    /// Read the current set. A register file that does not exist yet is
    /// an empty set, not an error.
    pub fn get(&self) -> std::io::Result<Vec<String>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(text
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    /// Publish a new set atomically: write to a temp file in the same
    /// directory, then rename over the register file.
    pub fn overwrite(&self, keys: &[String]) -> std::io::Result<()> {
        let parent = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&parent)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
        for key in keys {
            writeln!(tmp, "{}", key)?;
        }
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Add keys, preserving existing order and skipping duplicates.
    pub fn add(&self, keys: &[String]) -> std::io::Result<()> {
        let mut current = self.get()?;
        for key in keys {
            if !current.contains(key) {
                current.push(key.clone());
            }
        }
        self.overwrite(&current)
    }

    /// Remove keys; absent entries are ignored.
    pub fn remove(&self, keys: &[String]) -> std::io::Result<()> {
        let current: Vec<String> = self
            .get()?
            .into_iter()
            .filter(|k| !keys.contains(k))
            .collect();
        self.overwrite(&current)
    }
}

impl Drop for KeysFile {
    fn drop(&mut self) {
        let _ = self.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_remove_overwrite_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut kf = KeysFile::new(dir.path().join("register"));
        kf.lock().unwrap();

        assert!(kf.get().unwrap().is_empty());

        kf.add(&["a1".to_string(), "a2".to_string()]).unwrap();
        kf.add(&["a2".to_string(), "a3".to_string()]).unwrap();
        assert_eq!(kf.get().unwrap(), vec!["a1", "a2", "a3"]);

        kf.remove(&["a2".to_string(), "ghost".to_string()]).unwrap();
        assert_eq!(kf.get().unwrap(), vec!["a1", "a3"]);

        kf.overwrite(&[]).unwrap();
        assert!(kf.get().unwrap().is_empty());

        kf.unlock().unwrap();
    }

    #[test]
    fn register_file_never_contains_partials() {
        let dir = tempfile::tempdir().unwrap();
        let kf = KeysFile::new(dir.path().join("register"));
        let many: Vec<String> = (0..500).map(|i| format!("key{}", i)).collect();
        kf.overwrite(&many).unwrap();

        // The published file is complete in one shot.
        let read = kf.get().unwrap();
        assert_eq!(read.len(), 500);
        assert_eq!(read[499], "key499");
    }

    #[test]
    fn lock_serializes_writers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("register");

        let mut first = KeysFile::new(path.clone());
        first.lock().unwrap();

        let path2 = path.clone();
        let contender = std::thread::spawn(move || {
            let mut second = KeysFile::new(path2);
            // Blocks until the first holder unlocks.
            second.lock().unwrap();
            second.add(&["from-second".to_string()]).unwrap();
            second.unlock().unwrap();
        });

        first.add(&["from-first".to_string()]).unwrap();
        first.unlock().unwrap();
        contender.join().unwrap();

        let kf = KeysFile::new(path);
        assert_eq!(kf.get().unwrap(), vec!["from-first", "from-second"]);
    }
}
