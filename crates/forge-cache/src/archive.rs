//! Tar archiving for cached path sets.

use forge_core::Result;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Compression applied around the tar stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    None,
    Gzip,
    #[default]
    Zstd,
}

/// Pack paths (relative to `base_dir`) into a compressed tar stream.
pub fn pack<W: Write>(
    writer: W,
    paths: &[PathBuf],
    base_dir: &Path,
    compression: CompressionKind,
) -> Result<()> {
    match compression {
        CompressionKind::Zstd => {
            let mut encoder = zstd::stream::write::Encoder::new(writer, 3)?;
            {
                let mut builder = tar::Builder::new(&mut encoder);
                append_paths(&mut builder, paths, base_dir)?;
                builder.finish()?;
            }
            encoder.finish()?;
        }
        CompressionKind::Gzip => {
            let encoder = flate2::write::GzEncoder::new(writer, flate2::Compression::default());
            let mut builder = tar::Builder::new(encoder);
            append_paths(&mut builder, paths, base_dir)?;
            builder.into_inner()?.finish()?;
        }
        CompressionKind::None => {
            let mut builder = tar::Builder::new(writer);
            append_paths(&mut builder, paths, base_dir)?;
            builder.finish()?;
        }
    }
    Ok(())
}

/// Unpack a compressed tar stream into `dest`.
pub fn unpack<R: Read>(reader: R, dest: &Path, compression: CompressionKind) -> Result<()> {
    match compression {
        CompressionKind::Zstd => {
            let decoder = zstd::stream::read::Decoder::new(reader)?;
            tar::Archive::new(decoder).unpack(dest)?;
        }
        CompressionKind::Gzip => {
            let decoder = flate2::read::GzDecoder::new(reader);
            tar::Archive::new(decoder).unpack(dest)?;
        }
        CompressionKind::None => {
            tar::Archive::new(reader).unpack(dest)?;
        }
    }
    Ok(())
}

fn append_paths<W: Write>(
    builder: &mut tar::Builder<W>,
    paths: &[PathBuf],
    base_dir: &Path,
) -> Result<()> {
    for path in paths {
        let abs = if path.is_absolute() {
            path.clone()
        } else {
            base_dir.join(path)
        };
        if !abs.exists() {
            continue;
        }
        let name = if path.is_absolute() {
            path.strip_prefix(base_dir).unwrap_or(path)
        } else {
            path.as_path()
        };
        if abs.is_dir() {
            builder.append_dir_all(name, &abs)?;
        } else {
            builder.append_path_with_name(&abs, name)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack_preserves_contents() {
        let src = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("target")).unwrap();
        std::fs::write(src.path().join("target/lib.a"), b"object code").unwrap();

        let mut blob = Vec::new();
        pack(
            &mut blob,
            &[PathBuf::from("target")],
            src.path(),
            CompressionKind::Zstd,
        )
        .unwrap();

        let dest = tempfile::tempdir().unwrap();
        unpack(blob.as_slice(), dest.path(), CompressionKind::Zstd).unwrap();

        let restored = std::fs::read(dest.path().join("target/lib.a")).unwrap();
        assert_eq!(restored, b"object code");
    }

    #[test]
    fn test_missing_paths_are_skipped() {
        let src = tempfile::tempdir().unwrap();
        let mut blob = Vec::new();
        pack(
            &mut blob,
            &[PathBuf::from("does-not-exist")],
            src.path(),
            CompressionKind::None,
        )
        .unwrap();
        assert!(!blob.is_empty()); // valid empty tar
    }
}
