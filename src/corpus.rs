//! Corpus discovery.
//!
//! Walks a corpus root laid out as `root/<course>/[<subfolder>/...]<file>`
//! and returns every recognized document as a [`SourceFile`]. The course
//! (collection) name is the first directory below the root. Files sitting
//! directly in the root have no course and are skipped with a warning.
//!
//! Results are sorted by relative path so indexing order is stable.

use std::path::{Component, Path};

use globset::{Glob, GlobSet, GlobSetBuilder};
use lectern_core::models::{FileType, SourceFile};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::IndexingConfig;

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("failed to walk corpus: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("invalid exclude glob: {0}")]
    Glob(#[from] globset::Error),
}

/// Find every `.pptx`, `.pdf`, and `.html` file under `root`.
pub fn discover(root: &Path, indexing: &IndexingConfig) -> Result<Vec<SourceFile>, CorpusError> {
    let mut excludes = vec!["**/.git/**".to_string(), "**/.*".to_string(), "**/.*/**".to_string()];
    excludes.extend(indexing.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .max_depth(indexing.max_depth)
        .follow_links(false)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Some(filetype) = FileType::from_path(path) else {
            continue;
        };

        let relative = path.strip_prefix(root).unwrap_or(path);
        let segments: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        let rel_str = segments.join("/");

        if exclude_set.is_match(&rel_str) {
            debug!(path = %rel_str, "excluded");
            continue;
        }

        let Some((filename, dirs)) = segments.split_last() else {
            continue;
        };
        let Some(course) = dirs.first() else {
            warn!(path = %rel_str, "file is not inside a course directory, skipping");
            continue;
        };

        files.push(SourceFile {
            path: path.to_path_buf(),
            filetype,
            course: course.clone(),
            directory: dirs.join("/"),
            filename: filename.clone(),
        });
    }

    files.sort_by(|a, b| (&a.directory, &a.filename).cmp(&(&b.directory, &b.filename)));

    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn discovers_courses_and_subfolders() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(root, "HMG6228/Week 4/Legal Issues.pptx");
        touch(root, "HMG6228/syllabus.pdf");
        touch(root, "FIN3400/Week 1/reading.html");
        touch(root, "FIN3400/Week 1/notes.txt");

        let files = discover(root, &IndexingConfig::default()).unwrap();
        let names: Vec<(&str, &str, &str)> = files
            .iter()
            .map(|f| (f.course.as_str(), f.directory.as_str(), f.filename.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("FIN3400", "FIN3400/Week 1", "reading.html"),
                ("HMG6228", "HMG6228", "syllabus.pdf"),
                ("HMG6228", "HMG6228/Week 4", "Legal Issues.pptx"),
            ]
        );
        assert_eq!(files[2].filetype, FileType::Pptx);
        assert!(files[2].path.is_absolute() || !root.is_absolute());
    }

    #[test]
    fn skips_root_level_hidden_and_excluded_files() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(root, "loose.pdf");
        touch(root, "C1/.hidden.pdf");
        touch(root, "C1/.git/objects/a.pdf");
        touch(root, "C1/drafts/wip.pdf");
        touch(root, "C1/final.pdf");

        let indexing = IndexingConfig {
            exclude_globs: vec!["**/drafts/**".to_string()],
            ..IndexingConfig::default()
        };
        let files = discover(root, &indexing).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "final.pdf");
    }

    #[test]
    fn respects_max_depth() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(root, "C1/a/b/too-deep.pdf");
        touch(root, "C1/a/ok.pdf");

        let files = discover(root, &IndexingConfig::default()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "ok.pdf");
    }

    #[test]
    fn same_filename_in_two_courses_are_distinct() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(root, "A/week1/intro.pptx");
        touch(root, "B/week1/intro.pptx");

        let files = discover(root, &IndexingConfig::default()).unwrap();
        assert_eq!(files.len(), 2);
        assert_ne!(files[0].directory, files[1].directory);
    }
}
