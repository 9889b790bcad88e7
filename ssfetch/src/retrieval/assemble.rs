//! Reassembly of decrypted parts into the final file.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::error::{RetrievalError, RetrievalResult};
use super::staging::StagingArea;
use crate::api::FileEntry;

/// Concatenates decrypted parts into files in an output directory.
#[derive(Debug, Clone)]
pub struct FileAssembler {
    staging: StagingArea,
    output_dir: PathBuf,
}

impl FileAssembler {
    pub fn new(staging: StagingArea, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging,
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Where `file_name` lands in the output directory.
    ///
    /// Only the final path component is used, so a manifest cannot place
    /// files outside the output directory.
    pub fn output_path(&self, file_name: &str) -> RetrievalResult<PathBuf> {
        let name = Path::new(file_name)
            .components()
            .next_back()
            .and_then(|c| match c {
                Component::Normal(name) => Some(name),
                _ => None,
            })
            .ok_or_else(|| RetrievalError::InvalidFileName(file_name.to_string()))?;
        Ok(self.output_dir.join(name))
    }

    /// Assemble `file` from its decrypted parts.
    ///
    /// Every part `1..=parts` must be present before anything is written.
    /// The output is built in a temporary file and renamed into place, so a
    /// failed assembly leaves no partial output.
    ///
    /// # Returns
    ///
    /// The path of the assembled file.
    pub fn assemble(&self, file: &FileEntry) -> RetrievalResult<PathBuf> {
        let dest = self.output_path(&file.file_name)?;

        let missing = self.staging.missing_decrypted(&file.file_id, file.parts);
        if !missing.is_empty() {
            return Err(RetrievalError::MissingParts {
                file_id: file.file_id.clone(),
                parts: file.parts,
                missing,
            });
        }

        fs::create_dir_all(&self.output_dir)
            .map_err(|e| RetrievalError::io(&self.output_dir, e))?;

        let temp = NamedTempFile::new_in(&self.output_dir)
            .map_err(|e| RetrievalError::io(&self.output_dir, e))?;
        let mut writer = BufWriter::new(temp);
        let mut total = 0u64;

        for part in 1..=file.parts {
            let path = self.staging.decrypted_path(&file.file_id, part);
            let source = File::open(&path).map_err(|e| RetrievalError::io(&path, e))?;
            let copied = io::copy(&mut BufReader::new(source), &mut writer)
                .map_err(|e| RetrievalError::io(&path, e))?;
            debug!(file_id = %file.file_id, part, bytes = copied, "Appended part");
            total += copied;
        }

        writer.flush().map_err(|e| RetrievalError::io(&dest, e))?;
        let temp = writer
            .into_inner()
            .map_err(|e| RetrievalError::io(&dest, e.into_error()))?;
        temp.persist(&dest)
            .map_err(|e| RetrievalError::io(&dest, e.error))?;

        info!(
            file_id = %file.file_id,
            path = %dest.display(),
            bytes = total,
            "Assembled file"
        );
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(file_id: &str, file_name: &str, parts: u32) -> FileEntry {
        FileEntry {
            file_id: file_id.to_string(),
            file_name: file_name.to_string(),
            parts,
        }
    }

    fn setup() -> (TempDir, StagingArea, FileAssembler) {
        let temp = TempDir::new().unwrap();
        let staging = StagingArea::new(temp.path().join("parts"));
        staging.ensure().unwrap();
        let assembler = FileAssembler::new(staging.clone(), temp.path().join("out"));
        (temp, staging, assembler)
    }

    #[test]
    fn test_assemble_concatenates_in_numeric_order() {
        let (_temp, staging, assembler) = setup();
        // Written out of order, and past 9 so lexical order would differ.
        for part in [10u32, 2, 1, 9, 3, 4, 5, 6, 7, 8, 11] {
            fs::write(
                staging.decrypted_path("f", part),
                format!("<{}>", part),
            )
            .unwrap();
        }

        let path = assembler.assemble(&entry("f", "report.bin", 11)).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "<1><2><3><4><5><6><7><8><9><10><11>"
        );
        assert_eq!(path.file_name().unwrap(), "report.bin");
    }

    #[test]
    fn test_assemble_is_byte_exact() {
        let (_temp, staging, assembler) = setup();
        let one: Vec<u8> = (0..=255).collect();
        let two = vec![0u8, 0, 0xff, b'\n', b'\r'];
        fs::write(staging.decrypted_path("f", 1), &one).unwrap();
        fs::write(staging.decrypted_path("f", 2), &two).unwrap();

        let path = assembler.assemble(&entry("f", "blob", 2)).unwrap();

        let mut expected = one;
        expected.extend_from_slice(&two);
        assert_eq!(fs::read(path).unwrap(), expected);
    }

    #[test]
    fn test_missing_part_produces_no_output() {
        let (_temp, staging, assembler) = setup();
        fs::write(staging.decrypted_path("f", 1), b"1").unwrap();
        fs::write(staging.decrypted_path("f", 3), b"3").unwrap();
        // An encrypted part does not count.
        fs::write(staging.encrypted_path("f", 2), b"enc").unwrap();

        let err = assembler.assemble(&entry("f", "out.txt", 3)).unwrap_err();

        match err {
            RetrievalError::MissingParts { missing, parts, .. } => {
                assert_eq!(missing, vec![2]);
                assert_eq!(parts, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!assembler.output_dir().join("out.txt").exists());
    }

    #[test]
    fn test_output_uses_final_component() {
        let (_temp, _staging, assembler) = setup();
        let out = assembler.output_dir().to_path_buf();

        assert_eq!(
            assembler.output_path("../../etc/passwd").unwrap(),
            out.join("passwd")
        );
        assert_eq!(
            assembler.output_path("logs/app.log").unwrap(),
            out.join("app.log")
        );
        assert_eq!(assembler.output_path("plain").unwrap(), out.join("plain"));
    }

    #[test]
    fn test_unusable_file_names() {
        let (_temp, _staging, assembler) = setup();
        for name in ["", "..", "/", "a/.."] {
            assert!(
                matches!(
                    assembler.output_path(name),
                    Err(RetrievalError::InvalidFileName(_))
                ),
                "{name:?}"
            );
        }
    }

    #[test]
    fn test_reassembly_replaces_existing_output() {
        let (_temp, staging, assembler) = setup();
        fs::create_dir_all(assembler.output_dir()).unwrap();
        fs::write(assembler.output_dir().join("f.txt"), b"old contents").unwrap();
        fs::write(staging.decrypted_path("f", 1), b"new").unwrap();

        let path = assembler.assemble(&entry("f", "f.txt", 1)).unwrap();
        assert_eq!(fs::read(path).unwrap(), b"new");
    }
}
