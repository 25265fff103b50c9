//! Per-platform packaging of artifact filesets.

use forge_core::ports::{ArtifactFile, PackagedAsset};
use forge_core::workflow::{ArchiveFormat, PlatformTarget};
use forge_core::{Error, Result};
use std::io::{Cursor, Write};

/// Package an artifact fileset for one platform target.
///
/// Applies the executable-permission fix-up where the target requires it,
/// then archives into the platform's format. An empty fileset counts as a
/// missing package.
pub fn package(platform: &PlatformTarget, files: &[ArtifactFile]) -> Result<PackagedAsset> {
    if files.is_empty() {
        return Err(Error::IncompleteRelease(platform.label.clone()));
    }

    let files: Vec<ArtifactFile> = files
        .iter()
        .cloned()
        .map(|mut file| {
            if platform.executable {
                file.mode = 0o755;
            }
            file
        })
        .collect();

    let data = match platform.archive {
        ArchiveFormat::TarGz => tar_gz(&files)?,
        ArchiveFormat::Zip => zip_archive(&files)?,
    };

    Ok(PackagedAsset {
        platform: platform.label.clone(),
        file_name: format!(
            "{}-{}.{}",
            platform.artifact,
            platform.label,
            platform.archive.extension()
        ),
        data,
    })
}

fn tar_gz(files: &[ArtifactFile]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    {
        let encoder = flate2::write::GzEncoder::new(&mut out, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for file in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(file.contents.len() as u64);
            header.set_mode(file.mode);
            // Fixed mtime keeps packages byte-identical across rebuilds.
            header.set_mtime(0);
            builder.append_data(&mut header, &file.path, file.contents.as_slice())?;
        }
        builder.into_inner()?.finish()?;
    }
    Ok(out)
}

fn zip_archive(files: &[ArtifactFile]) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        for file in files {
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated)
                .unix_permissions(file.mode);
            writer
                .start_file(file.path.to_string_lossy().to_string(), options)
                .map_err(|e| Error::Internal(format!("Failed to start zip entry: {}", e)))?;
            writer.write_all(&file.contents)?;
        }
        writer
            .finish()
            .map_err(|e| Error::Internal(format!("Failed to finish zip: {}", e)))?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform(label: &str, archive: ArchiveFormat, executable: bool) -> PlatformTarget {
        PlatformTarget {
            label: label.to_string(),
            artifact: "app".to_string(),
            archive,
            executable,
        }
    }

    fn fileset() -> Vec<ArtifactFile> {
        vec![ArtifactFile::new("bin/app", b"elf bits".to_vec())]
    }

    #[test]
    fn test_tar_gz_applies_executable_fixup() {
        let asset = package(&platform("linux", ArchiveFormat::TarGz, true), &fileset()).unwrap();
        assert_eq!(asset.file_name, "app-linux.tar.gz");

        let decoder = flate2::read::GzDecoder::new(asset.data.as_slice());
        let mut archive = tar::Archive::new(decoder);
        let entry = archive.entries().unwrap().next().unwrap().unwrap();
        assert_eq!(entry.header().mode().unwrap() & 0o777, 0o755);
        assert_eq!(entry.path().unwrap().to_string_lossy(), "bin/app");
    }

    #[test]
    fn test_non_executable_mode_is_preserved() {
        let asset = package(&platform("linux", ArchiveFormat::TarGz, false), &fileset()).unwrap();

        let decoder = flate2::read::GzDecoder::new(asset.data.as_slice());
        let mut archive = tar::Archive::new(decoder);
        let entry = archive.entries().unwrap().next().unwrap().unwrap();
        assert_eq!(entry.header().mode().unwrap() & 0o777, 0o644);
    }

    #[test]
    fn test_zip_package_for_windows() {
        let asset = package(&platform("windows", ArchiveFormat::Zip, false), &fileset()).unwrap();
        assert_eq!(asset.file_name, "app-windows.zip");

        let mut archive = zip::ZipArchive::new(Cursor::new(asset.data)).unwrap();
        assert_eq!(archive.len(), 1);
        let entry = archive.by_index(0).unwrap();
        assert_eq!(entry.name(), "bin/app");
    }

    #[test]
    fn test_empty_fileset_is_incomplete() {
        let err = package(&platform("macos", ArchiveFormat::TarGz, true), &[]).unwrap_err();
        assert!(matches!(err, Error::IncompleteRelease(label) if label == "macos"));
    }
}
