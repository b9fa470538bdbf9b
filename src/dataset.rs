use std::path::{Path, PathBuf};

use log::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};

pub const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "bmp"];

pub fn is_image_file(path: &Path) -> bool
{
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Lists the image files directly inside `dir`, sorted by path.
/// The sort order is what pairs generated images with their prompts.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>>
{
    if !dir.is_dir() {
        return Err(Error::NotADirectory(dir.to_path_buf()));
    }

    let mut images = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1)
    {
        let entry = entry?;
        if entry.file_type().is_file() && is_image_file(entry.path()) {
            images.push(entry.into_path());
        }
    }
    images.sort();

    debug!("Found {} images in {:?}", images.len(), dir);
    Ok(images)
}

/// Reads prompts from a file: a JSON array of strings for `.json` files,
/// otherwise one prompt per non-empty line.
pub fn load_prompts(path: &Path) -> Result<Vec<String>>
{
    let contents = std::fs::read_to_string(path)?;
    let is_json = path.extension().map(|ext| ext.eq_ignore_ascii_case("json")).unwrap_or(false);

    let prompts: Vec<String> = if is_json {
        serde_json::from_str(&contents)?
    } else {
        contents.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    };

    if prompts.is_empty() {
        warn!("No prompts found in {:?}", path);
    }
    Ok(prompts)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_list_images_sorted_and_filtered()
    {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.JPG", "notes.txt", "c.jpeg"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let images = list_images(dir.path()).unwrap();
        let names: Vec<_> = images.iter().map(|p| p.file_name().unwrap().to_str().unwrap().to_string()).collect();
        assert_eq!(names, vec!["a.JPG", "b.png", "c.jpeg"]);
    }

    #[test]
    fn test_list_images_requires_directory()
    {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("image.png");
        std::fs::write(&file, b"").unwrap();
        assert!(matches!(list_images(&file), Err(Error::NotADirectory(_))));
    }

    #[test]
    fn test_load_prompts_text_and_json()
    {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("prompts.txt");
        std::fs::write(&text, "a red apple\n\n  a car on a road  \n").unwrap();
        assert_eq!(load_prompts(&text).unwrap(), vec!["a red apple", "a car on a road"]);

        let json = dir.path().join("prompts.json");
        std::fs::write(&json, r#"["a red apple", "a lighthouse"]"#).unwrap();
        assert_eq!(load_prompts(&json).unwrap(), vec!["a red apple", "a lighthouse"]);
    }
}
