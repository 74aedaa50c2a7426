//! On-disk kernel artifact cache
//!
//! Compiled kernels are cached beside their source, keyed by a content hash
//! of the fully expanded source text. Cache writes publish atomically: the
//! artifact is written to a randomly named temp file in the same directory,
//! then renamed into place, so concurrent compiles of the same kernel never
//! observe a half-written artifact.

use std::fs;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::CompileMode;

lazy_static! {
    // Temp-name generator shared by all compiles in this process.
    static ref TEMP_NAME_RNG: Mutex<StdRng> = Mutex::new(StdRng::from_entropy());
}

/// Cache artifact path for a kernel: `<stem>_<hash>.il` beside the source,
/// with a `_d` suffix for debug-mode artifacts so the two never collide.
pub(crate) fn artifact_path(source: &Path, hash: u32, mode: CompileMode) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "kernel".to_string());
    let extension = match mode {
        CompileMode::Release => "il",
        CompileMode::Debug => "il_d",
    };
    let file_name = format!("{stem}_{hash:08x}.{extension}");
    match source.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}

/// Loads a cached artifact. An unreadable or empty file is a miss, never an
/// error; the caller falls back to a fresh compile.
pub(crate) fn load(path: &Path) -> Option<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) if !bytes.is_empty() => {
            log::debug!("[cache::load] hit: {}", path.display());
            Some(bytes)
        }
        Ok(_) => {
            log::warn!("[cache::load] ignoring empty artifact: {}", path.display());
            None
        }
        Err(_) => None,
    }
}

fn temp_name() -> String {
    let mut rng = TEMP_NAME_RNG.lock();
    (0..8)
        .map(|_| char::from(b'a' + rng.gen_range(0..24u8)))
        .collect()
}

/// Publishes an artifact atomically: write to a temp file in the same
/// directory, then rename over the final path.
///
/// When two compiles race, both write distinct temp files and both renames
/// install an equivalent artifact; the loser of a rename failure removes its
/// temp file and moves on. Cache write failures are logged, not propagated.
/// The compile already succeeded and its in-memory result is still good.
pub(crate) fn publish(path: &Path, bytes: &[u8]) {
    let temp_path = match path.parent() {
        Some(parent) => parent.join(temp_name()),
        None => PathBuf::from(temp_name()),
    };

    if let Err(e) = fs::write(&temp_path, bytes) {
        log::warn!(
            "[cache::publish] failed to write {}: {e}",
            temp_path.display()
        );
        return;
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        log::warn!(
            "[cache::publish] failed to install {}: {e}",
            path.display()
        );
        let _ = fs::remove_file(&temp_path);
        return;
    }

    log::debug!("[cache::publish] wrote {}", path.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_names_carry_hash_and_mode() {
        let source = Path::new("/tmp/kernels/bias_add.wgsl");
        assert_eq!(
            artifact_path(source, 0xdeadbeef, CompileMode::Release),
            Path::new("/tmp/kernels/bias_add_deadbeef.il")
        );
        assert_eq!(
            artifact_path(source, 0x0000_00ff, CompileMode::Debug),
            Path::new("/tmp/kernels/bias_add_000000ff.il_d")
        );
    }

    #[test]
    fn publish_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernel_01234567.il");

        publish(&path, &[1, 2, 3, 4]);
        assert_eq!(load(&path), Some(vec![1, 2, 3, 4]));

        // No temp files left behind.
        let residue: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(residue, vec![std::ffi::OsString::from("kernel_01234567.il")]);
    }

    #[test]
    fn empty_artifact_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernel_00000000.il");
        fs::write(&path, b"").unwrap();
        assert_eq!(load(&path), None);
    }

    #[test]
    fn missing_artifact_is_a_miss() {
        assert_eq!(load(Path::new("/nonexistent/kernel_00000000.il")), None);
    }

    #[test]
    fn concurrent_publishers_leave_one_valid_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernel_aabbccdd.il");
        let payload = vec![7u8; 512];

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let path = path.clone();
                let payload = payload.clone();
                std::thread::spawn(move || publish(&path, &payload))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(load(&path), Some(payload));
    }
}
