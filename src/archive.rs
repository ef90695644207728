//! Zip packing and unpacking of model file trees.
//!
//! Archives preserve the relative layout of the model root, files only;
//! directories materialize implicitly on extraction.

use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

/// All files below `root` as sorted root-relative paths.
///
/// Symlinked directories are not followed.
pub fn scan_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|err| Error::Archive(err.to_string()))?;
        if entry.file_type().is_file() {
            let relative = entry
                .path()
                .strip_prefix(root)
                .map_err(|err| Error::Archive(err.to_string()))?;
            files.push(relative.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Pack the given root-relative `files` under `root` into a zip archive at
/// `dst`.
pub fn create(root: &Path, files: &[PathBuf], dst: &Path) -> Result<()> {
    let mut writer = ZipWriter::new(File::create(dst)?);
    let options = FileOptions::default();
    for file in files {
        let name = zip_entry_name(file)?;
        writer
            .start_file(name, options)
            .map_err(|err| Error::Archive(err.to_string()))?;
        let mut reader = File::open(root.join(file))?;
        io::copy(&mut reader, &mut writer)?;
    }
    writer
        .finish()
        .map_err(|err| Error::Archive(err.to_string()))?;
    Ok(())
}

/// Extract a zip archive into `dst`.
pub fn extract(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    let mut archive =
        ZipArchive::new(File::open(src)?).map_err(|err| Error::Archive(err.to_string()))?;
    archive
        .extract(dst)
        .map_err(|err| Error::Archive(err.to_string()))?;
    Ok(())
}

// Zip entry names always use forward slashes.
fn zip_entry_name(path: &Path) -> Result<String> {
    let mut segments = Vec::new();
    for component in path.components() {
        match component {
            std::path::Component::Normal(segment) => {
                segments.push(segment.to_string_lossy().to_string());
            }
            other => {
                return Err(Error::Archive(format!(
                    "unexpected path component {other:?} in '{}'",
                    path.display()
                )))
            }
        }
    }
    Ok(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_tree(dir: &TempDir) -> PathBuf {
        let root = dir.path().join("model");
        fs::create_dir_all(root.join("extractor")).unwrap();
        fs::write(root.join("requirements.txt"), "numpy\n").unwrap();
        fs::write(root.join("extractor").join("weights.bin"), b"\x00\x01").unwrap();
        root
    }

    #[test]
    fn test_scan_files_sorted_relative() {
        let dir = TempDir::new().unwrap();
        let root = sample_tree(&dir);

        let files = scan_files(&root).unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("extractor/weights.bin"),
                PathBuf::from("requirements.txt"),
            ]
        );
    }

    #[test]
    fn test_pack_unpack_roundtrip() {
        let dir = TempDir::new().unwrap();
        let root = sample_tree(&dir);

        let archive = dir.path().join("model.zip");
        let files = scan_files(&root).unwrap();
        create(&root, &files, &archive).unwrap();

        let out = dir.path().join("out");
        extract(&archive, &out).unwrap();

        assert_eq!(scan_files(&out).unwrap(), files);
        assert_eq!(
            fs::read(out.join("extractor").join("weights.bin")).unwrap(),
            b"\x00\x01"
        );
    }

    #[test]
    fn test_empty_tree() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("empty");
        fs::create_dir_all(&root).unwrap();

        let files = scan_files(&root).unwrap();
        assert!(files.is_empty());

        let archive = dir.path().join("model.zip");
        create(&root, &files, &archive).unwrap();

        let out = dir.path().join("out");
        extract(&archive, &out).unwrap();
        assert!(scan_files(&out).unwrap().is_empty());
    }
}
