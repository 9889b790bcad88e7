//! `links` command: list package links found in text.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use ssfetch::extract_links;

use crate::error::CliError;

/// Read text from `path`, or stdin when `path` is `-`.
pub fn read_text(path: &Path) -> Result<String, CliError> {
    if path == Path::new("-") {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .map_err(|source| CliError::ReadInput {
                path: PathBuf::from("<stdin>"),
                source,
            })?;
        return Ok(text);
    }
    fs::read_to_string(path).map_err(|source| CliError::ReadInput {
        path: path.to_path_buf(),
        source,
    })
}

/// Print every distinct package link in `file`, one per line.
pub fn run(file: &Path) -> Result<(), CliError> {
    let links = extract_links(&read_text(file)?);
    if links.is_empty() {
        return Err(CliError::NoLinks);
    }
    for link in links {
        println!("{}", link);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_text_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("comments.txt");
        fs::write(&path, "hello").unwrap();
        assert_eq!(read_text(&path).unwrap(), "hello");
    }

    #[test]
    fn test_run_without_links() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("comments.txt");
        fs::write(&path, "no links here").unwrap();
        assert!(matches!(run(&path), Err(CliError::NoLinks)));
    }

    #[test]
    fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            read_text(&temp.path().join("nope")),
            Err(CliError::ReadInput { .. })
        ));
    }
}
