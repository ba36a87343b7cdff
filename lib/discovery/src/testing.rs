use std::path::{Path, PathBuf};

use rand::Rng;
use rand::distr::Alphanumeric;

/// A fresh, empty directory under the system temp dir.
pub fn temp_dir() -> PathBuf {
    let dir = rand::rng()
        .sample_iter(Alphanumeric)
        .take(8)
        .map(char::from)
        .collect::<String>();

    let path = std::env::temp_dir().join("discovery-tests").join(dir);
    std::fs::create_dir_all(&path).unwrap();

    path
}

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}
