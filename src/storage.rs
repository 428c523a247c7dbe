//! File persistence for keystore containers.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use getrandom::fill;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::format::{self, Keystore};

/// A keystore JSON file on disk.
///
/// `Storage` reads and writes a single sealed container. It never sees plaintext.
#[derive(Debug, Clone)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    /// Creates a new Storage instance with the given path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Storage for the file `<id>.json` inside `dir`.
    pub fn for_keystore(dir: &Path, keystore: &Keystore) -> Self {
        Self::new(dir.join(format!("{}.json", keystore.id)))
    }

    /// Returns `true` if the keystore file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Reads and parses the keystore file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a well-formed keystore.
    pub fn load(&self) -> Result<Keystore> {
        let data = fs::read(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let keystore = format::from_json(&data)
            .with_context(|| format!("{} is not a valid keystore", self.path.display()))?;
        debug!(path = %self.path.display(), id = %keystore.id, "loaded keystore");
        Ok(keystore)
    }

    /// Writes the keystore as indented JSON using an atomic replace.
    ///
    /// Data goes to a randomly named temporary file in the same directory, which is
    /// synced and then renamed over the target. The parent directory is synced afterwards
    /// so the rename itself is durable. A crash leaves either the old or the new file.
    ///
    /// Creates parent directories if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, keystore: &Keystore) -> Result<()> {
        let data = format::to_json_pretty(keystore)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.random_tmp_path()?;

        let mut tmp_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .context("failed to create temporary file")?;

        tmp_file.write_all(&data)?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        if let Err(e) = self.atomic_replace(&tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        if let Some(parent) = self.path.parent() {
            let dir = File::open(parent)?;
            dir.sync_all()?;
        }

        debug!(path = %self.path.display(), id = %keystore.id, "saved keystore");
        Ok(())
    }

    /// Returns the path to the keystore file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Generates a unique temporary file path in the same directory.
    ///
    /// Format: `filename.tmp.<randomhex>`
    fn random_tmp_path(&self) -> Result<PathBuf> {
        let mut buf = [0u8; 8];
        fill(&mut buf)?;

        let file_name = self
            .path
            .file_name()
            .context("keystore path has no file name")?
            .to_string_lossy();

        let tmp_name = format!("{}.tmp.{}", file_name, hex::encode(buf));

        Ok(self.path.with_file_name(tmp_name))
    }

    /// Atomically replaces the target file with the temporary file.
    ///
    /// Uses Windows `ReplaceFileW` with `REPLACEFILE_WRITE_THROUGH` when the target
    /// exists, and a plain rename for the first write.
    #[cfg(target_os = "windows")]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<()> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{REPLACEFILE_WRITE_THROUGH, ReplaceFileW};

        if !self.path.exists() {
            fs::rename(tmp_path, &self.path)?;
            return Ok(());
        }

        fn to_wide(s: &OsStr) -> Vec<u16> {
            s.encode_wide().chain(std::iter::once(0)).collect()
        }

        let target_w = to_wide(self.path.as_os_str());
        let tmp_w = to_wide(tmp_path.as_os_str());

        // SAFETY:
        // - Strings are valid UTF-16 and null-terminated
        // - Pointers remain valid during the call
        // - Windows does not retain the pointers after return
        let result = unsafe {
            ReplaceFileW(
                target_w.as_ptr(),
                tmp_w.as_ptr(),
                std::ptr::null(),
                REPLACEFILE_WRITE_THROUGH,
                std::ptr::null(),
                std::ptr::null(),
            )
        };

        if result == 0 {
            let err = std::io::Error::last_os_error();
            return Err(err).context("atomic replace failed");
        }

        Ok(())
    }

    /// Atomically replaces the target file with the temporary file.
    ///
    /// On Unix, `rename()` is atomic when both paths are on the same filesystem.
    #[cfg(not(target_os = "windows"))]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<()> {
        fs::rename(tmp_path, &self.path)?;
        Ok(())
    }
}

/// Platform data directory used when no keystore directory is configured.
pub fn default_dir() -> Result<PathBuf> {
    let project_dirs =
        ProjectDirs::from("", "", "keyseal").context("could not determine platform directories")?;

    Ok(project_dirs.data_dir().join("keystores"))
}
