//! Frame source backed by JPEG files on disk

use std::path::{Path, PathBuf};

use screenstream_server::{Frame, StaticFrameSource};
use thiserror::Error;

/// JPEG start-of-image marker
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Could not read image directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not read image {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No JPEG images found in {0}")]
    Empty(PathBuf),
}

fn is_jpeg_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
        .unwrap_or(false)
}

/// Load every JPEG in `dir`, sorted by file name
///
/// Files with a JPEG extension but no JPEG header are skipped with a warning.
pub fn load_frames(dir: &Path) -> Result<Vec<Frame>, ImageError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ImageError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_jpeg_path(path))
        .collect();
    paths.sort();

    let mut frames = Vec::with_capacity(paths.len());
    for path in paths {
        let data = std::fs::read(&path).map_err(|source| ImageError::ReadFile {
            path: path.clone(),
            source,
        })?;

        if !data.starts_with(&JPEG_SOI) {
            tracing::warn!("Skipping {}: not a JPEG image", path.display());
            continue;
        }

        tracing::debug!("Loaded {} ({} bytes)", path.display(), data.len());
        frames.push(Frame::new(data));
    }

    if frames.is_empty() {
        return Err(ImageError::Empty(dir.to_path_buf()));
    }

    Ok(frames)
}

/// Endless source cycling through the JPEGs in `dir`
pub fn image_dir_source(dir: &Path) -> Result<StaticFrameSource, ImageError> {
    Ok(StaticFrameSource::looping(load_frames(dir)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use screenstream_server::{FrameSource, FrameStream};
    use tempfile::tempdir;

    fn jpeg(body: &[u8]) -> Vec<u8> {
        let mut data = JPEG_SOI.to_vec();
        data.extend_from_slice(body);
        data.extend_from_slice(&[0xFF, 0xD9]);
        data
    }

    #[test]
    fn test_loads_sorted_jpegs() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("b.jpg"), jpeg(b"second")).unwrap();
        std::fs::write(dir.path().join("a.JPEG"), jpeg(b"first")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let frames = load_frames(dir.path()).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data(), jpeg(b"first").as_slice());
        assert_eq!(frames[1].data(), jpeg(b"second").as_slice());
    }

    #[test]
    fn test_skips_files_without_jpeg_header() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("fake.jpg"), b"PNG?").unwrap();
        std::fs::write(dir.path().join("real.jpg"), jpeg(b"ok")).unwrap();

        let frames = load_frames(dir.path()).unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_empty_directory_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(load_frames(dir.path()), Err(ImageError::Empty(_))));
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(load_frames(&missing), Err(ImageError::ReadDir { .. })));
    }

    #[tokio::test]
    async fn test_source_loops() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("only.jpg"), jpeg(b"x")).unwrap();

        let source = image_dir_source(dir.path()).unwrap();
        let mut stream = source.open();
        for _ in 0..3 {
            let frame = stream.next_frame().await.unwrap().unwrap();
            assert_eq!(frame.data(), jpeg(b"x").as_slice());
        }
    }
}
