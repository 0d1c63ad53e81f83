// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! File utilities shared between the abupdate APIs

use std::{
    fs::{self, create_dir_all, File},
    io::{ErrorKind, Read, Write},
    os::fd::AsRawFd,
    path::{Path, PathBuf},
};

use crate::Error;

/// Case-insensitive path joining for FAT, respecting existing entries on the filesystem
/// Note, this discards errors, so will require read permissions
pub trait PathExt<P: AsRef<Path>> {
    fn join_insensitive(&self, path: P) -> PathBuf;
}

impl<P: AsRef<Path>> PathExt<P> for Path {
    fn join_insensitive(&self, path: P) -> PathBuf {
        let real_path: &Path = path.as_ref();
        if let Ok(dir) = fs::read_dir(self) {
            let entries = dir.filter_map(|e| e.ok()).filter_map(|p| {
                let n = p.file_name();
                n.into_string().ok()
            });
            for entry in entries {
                if entry.to_lowercase() == real_path.to_string_lossy().to_lowercase() {
                    return self.join(&entry);
                }
            }
        }
        self.join(path)
    }
}

/// Compare an existing file with blake3 to see if it already holds `contents`
fn file_matches(path: &Path, contents: &[u8]) -> Result<bool, Error> {
    let meta = fs::metadata(path)?;
    if !meta.is_file() || meta.len() != contents.len() as u64 {
        return Ok(false);
    }

    let mut hasher = blake3::Hasher::new();
    hasher.update_mmap_rayon(path)?;
    Ok(hasher.finalize() == blake3::hash(contents))
}

/// Write `contents` to `dest`, handling vfat oddities.
///
/// Long story short we always set a temporary file name up,
/// then delete the target file, and finally rename into place.
/// This is to prevent various block corruption issues with vfat.
///
/// Returns false when `dest` already held identical contents and
/// nothing was written.
pub fn write_atomic_vfat(dest: impl AsRef<Path>, contents: &[u8]) -> Result<bool, Error> {
    let dest = dest.as_ref();

    log::trace!("write_atomic_vfat: {}", dest.display());

    if file_matches(dest, contents).unwrap_or(false) {
        log::debug!("Unchanged: {}", dest.display());
        return Ok(false);
    }

    // Staging path
    let dest_temp = dest.with_extension("TmpWrite");
    let dest_exists = dest.exists();

    // Ensure leading path structure exists
    let dir_leading = dest.parent().ok_or_else(|| Error::NotWritable {
        path: dest.into(),
        source: std::io::ErrorKind::InvalidInput.into(),
    })?;
    if !dir_leading.exists() {
        create_dir_all(dir_leading)?;
    }

    let mut output = File::options()
        .truncate(true)
        .write(true)
        .create(true)
        .open(&dest_temp)?;

    let output_fd = output.as_raw_fd();

    output.write_all(contents)?;
    output.flush()?;
    nix::unistd::syncfs(output_fd)?;

    // Remove original destination file
    if dest_exists {
        fs::remove_file(dest)?;
        nix::unistd::syncfs(output_fd)?;
    }

    // Rename into final location
    fs::rename(dest_temp, dest)?;
    nix::unistd::syncfs(output_fd)?;

    log::info!("Updated file: {}", dest.display());

    Ok(true)
}

/// Read from `input` until `buffer` is full or the stream ends
///
/// Returns the number of bytes placed in `buffer`, short only at end of stream.
pub fn fill_buffer<R: Read + ?Sized>(buffer: &mut [u8], input: &mut R) -> Result<usize, std::io::Error> {
    let mut filled = 0;
    while filled < buffer.len() {
        match input.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{fill_buffer, write_atomic_vfat, PathExt};

    /// Hands out at most three bytes per read
    struct Trickle<'a>(&'a [u8]);

    impl std::io::Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(3).min(self.0.len());
            buf[..n].copy_from_slice(&self.0[..n]);
            self.0 = &self.0[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_fill_buffer() {
        let data = b"0123456789";
        let mut buf = [0u8; 8];
        assert_eq!(fill_buffer(&mut buf, &mut Trickle(data)).expect("fill"), 8);
        assert_eq!(&buf, b"01234567");

        let mut buf = [0u8; 16];
        assert_eq!(fill_buffer(&mut buf, &mut Trickle(data)).expect("fill"), 10);
        assert_eq!(&buf[..10], data);
    }

    #[test]
    fn test_write_atomic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dest = dir.path().join("nested").join("autoboot.txt");

        assert!(write_atomic_vfat(&dest, b"one\n").expect("first write"));
        assert_eq!(fs::read(&dest).expect("read"), b"one\n");

        // identical contents are left alone
        assert!(!write_atomic_vfat(&dest, b"one\n").expect("second write"));

        assert!(write_atomic_vfat(&dest, b"two\n").expect("third write"));
        assert_eq!(fs::read(&dest).expect("read"), b"two\n");
        assert!(!dest.with_extension("TmpWrite").exists());
    }

    #[test]
    fn test_join_insensitive() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("CMDLINE.TXT"), "root=/dev/sda2").expect("write");

        assert_eq!(dir.path().join_insensitive("cmdline.txt"), dir.path().join("CMDLINE.TXT"));
        assert_eq!(dir.path().join_insensitive("tryboot.txt"), dir.path().join("tryboot.txt"));
    }
}
