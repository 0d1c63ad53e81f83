// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Disk image sources
//!
//! A compressed image is a forward-only stream: reaching an offset means
//! decompressing (and discarding) everything before it, and every reader
//! starts again from the beginning of the file. Uncompressed images can
//! seek directly. Both are exposed through [`ImageSource`] so callers are
//! explicit about which capability they rely on.

use std::{
    fmt,
    fs::File,
    io::{self, BufReader, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use crate::Error;

/// Supported stream compression, detected by file suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Xz,
    Gzip,
    Zstd,
}

impl Compression {
    /// Determine the compression from the image suffix
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        match path.as_ref().extension()?.to_str()? {
            "xz" => Some(Compression::Xz),
            "gz" => Some(Compression::Gzip),
            "zst" => Some(Compression::Zstd),
            _ => None,
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::Xz => f.write_str("xz"),
            Compression::Gzip => f.write_str("gzip"),
            Compression::Zstd => f.write_str("zstd"),
        }
    }
}

/// A disk image that can be read from a byte offset
pub trait ImageSource: fmt::Debug {
    /// Image file on disk
    fn path(&self) -> &Path;

    /// True if [`ImageSource::open_at`] reaches its offset without reading the bytes before it
    fn is_seekable(&self) -> bool;

    /// Open a fresh reader positioned at `offset` bytes into the disk image
    fn open_at(&self, offset: u64) -> Result<Box<dyn Read + '_>, Error>;
}

/// Compressed image, decompressed from the start for every reader
#[derive(Debug)]
pub struct ForwardOnlySource {
    path: PathBuf,
    compression: Compression,
}

impl ForwardOnlySource {
    pub fn new(path: impl Into<PathBuf>, compression: Compression) -> Self {
        Self {
            path: path.into(),
            compression,
        }
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    fn decoder(&self) -> Result<Box<dyn Read>, Error> {
        let file = File::open(&self.path)?;
        let reader: Box<dyn Read> = match self.compression {
            Compression::Xz => Box::new(xz2::read::XzDecoder::new_multi_decoder(BufReader::new(file))),
            Compression::Gzip => Box::new(flate2::read::MultiGzDecoder::new(BufReader::new(file))),
            Compression::Zstd => Box::new(zstd::stream::read::Decoder::new(file)?),
        };
        Ok(reader)
    }
}

impl ImageSource for ForwardOnlySource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn is_seekable(&self) -> bool {
        false
    }

    fn open_at(&self, offset: u64) -> Result<Box<dyn Read + '_>, Error> {
        log::trace!("{}: decompressing ({}) from the start to reach byte {offset}", self.path.display(), self.compression);
        let mut reader = self.decoder()?;

        let skipped = io::copy(&mut reader.by_ref().take(offset), &mut io::sink())?;
        if skipped < offset {
            return Err(Error::ShortImage {
                offset,
                missing: offset - skipped,
            });
        }

        Ok(reader)
    }
}

/// Uncompressed image, readers seek straight to their offset
#[derive(Debug)]
pub struct SeekableSource {
    path: PathBuf,
}

impl SeekableSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ImageSource for SeekableSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn open_at(&self, offset: u64) -> Result<Box<dyn Read + '_>, Error> {
        let mut file = File::open(&self.path)?;
        let len = file.metadata()?.len();
        if offset > len {
            return Err(Error::ShortImage {
                offset,
                missing: offset - len,
            });
        }
        file.seek(SeekFrom::Start(offset))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Open the image at `path`, choosing the source by suffix
///
/// `.xz`, `.gz` and `.zst` images are forward-only, `.img` and `.raw`
/// images are seekable. Anything else is refused.
pub fn open(path: impl AsRef<Path>) -> Result<Box<dyn ImageSource>, Error> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::MissingImage(path.into()));
    }

    if let Some(compression) = Compression::from_path(path) {
        log::debug!("{}: {compression} compressed image", path.display());
        return Ok(Box::new(ForwardOnlySource::new(path, compression)));
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some("img") | Some("raw") => {
            log::debug!("{}: uncompressed image", path.display());
            Ok(Box::new(SeekableSource::new(path)))
        }
        _ => Err(Error::UnsupportedImage(path.into())),
    }
}
