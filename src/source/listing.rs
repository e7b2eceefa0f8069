use ignore::WalkBuilder;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

use crate::core::{system_time_to_millis, FileDescriptor, SourceError, SourceResult};

/// 文件列举协作方
///
/// ## 契约（重要）
/// 对未变化的文件集合，重复列举必须给出相同顺序：签名按列举顺序折叠。
pub trait FileLister: Send + Sync {
    fn list(&self, roots: &[PathBuf]) -> SourceResult<Vec<FileDescriptor>>;
}

/// 本地文件系统列举器
///
/// - 每个 root 内按文件名排序遍历，保证顺序稳定
/// - 多个 root 并行遍历，结果仍按 root 顺序拼接
/// - 跳过 `.` 开头与 `_` 开头（含 `=` 的分区目录除外）的条目
#[derive(Clone, Debug, Default)]
pub struct FsFileLister;

impl FsFileLister {
    pub fn new() -> Self {
        Self
    }
}

impl FileLister for FsFileLister {
    fn list(&self, roots: &[PathBuf]) -> SourceResult<Vec<FileDescriptor>> {
        let per_root: Vec<SourceResult<Vec<FileDescriptor>>> =
            roots.par_iter().map(|r| list_root(r)).collect();

        let mut out = Vec::new();
        for files in per_root {
            out.extend(files?);
        }
        tracing::debug!("Listed {} files under {} roots", out.len(), roots.len());
        Ok(out)
    }
}

/// 元数据/临时文件过滤（如 `_SUCCESS`、`.crc`），分区目录 `_k=v` 保留
pub fn should_filter_out(name: &str) -> bool {
    (name.starts_with('_') && !name.contains('=')) || name.starts_with('.')
}

fn list_root(root: &Path) -> SourceResult<Vec<FileDescriptor>> {
    let md = std::fs::metadata(root).map_err(|e| SourceError::storage(root, e))?;
    if md.is_file() {
        return Ok(vec![descriptor(root, &md)]);
    }

    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(|e| {
            e.depth() == 0 || !should_filter_out(&e.file_name().to_string_lossy())
        })
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| SourceError::storage(root, e))?;
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let md = entry
            .metadata()
            .map_err(|e| SourceError::storage(entry.path(), e))?;
        files.push(descriptor(entry.path(), &md));
    }
    Ok(files)
}

fn descriptor(path: &Path, md: &std::fs::Metadata) -> FileDescriptor {
    let modified = md.modified().map(system_time_to_millis).unwrap_or(0);
    FileDescriptor::new(path, md.len(), modified)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_tmp_dir(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("fd-sources-listing-{}-{}", tag, nanos))
    }

    #[test]
    fn listing_is_sorted_and_filtered() {
        let root = unique_tmp_dir("sorted");
        std::fs::create_dir_all(root.join("k=1")).unwrap();
        std::fs::create_dir_all(root.join("_tmp")).unwrap();
        std::fs::write(root.join("b.csv"), b"b").unwrap();
        std::fs::write(root.join("a.csv"), b"aa").unwrap();
        std::fs::write(root.join("_SUCCESS"), b"").unwrap();
        std::fs::write(root.join(".a.csv.crc"), b"x").unwrap();
        std::fs::write(root.join("_tmp").join("c.csv"), b"c").unwrap();
        std::fs::write(root.join("k=1").join("d.csv"), b"d").unwrap();

        let files = FsFileLister::new().list(&[root.clone()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.path.strip_prefix(&root).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a.csv"),
                PathBuf::from("b.csv"),
                PathBuf::from("k=1/d.csv"),
            ]
        );
        assert_eq!(files[0].size, 2);
        assert!(files[0].modified_time > 0);
    }

    #[test]
    fn repeated_listing_is_stable() {
        let root = unique_tmp_dir("stable");
        std::fs::create_dir_all(&root).unwrap();
        for i in 0..20 {
            std::fs::write(root.join(format!("f{:02}.json", 19 - i)), b"{}").unwrap();
        }
        let lister = FsFileLister::new();
        let a = lister.list(&[root.clone()]).unwrap();
        let b = lister.list(&[root.clone()]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn roots_are_concatenated_in_order() {
        let r1 = unique_tmp_dir("r1");
        let r2 = unique_tmp_dir("r2");
        std::fs::create_dir_all(&r1).unwrap();
        std::fs::create_dir_all(&r2).unwrap();
        std::fs::write(r1.join("z.txt"), b"z").unwrap();
        std::fs::write(r2.join("a.txt"), b"a").unwrap();

        let files = FsFileLister::new().list(&[r1.clone(), r2.clone()]).unwrap();
        assert!(files[0].path.starts_with(&r1));
        assert!(files[1].path.starts_with(&r2));
    }

    #[test]
    fn file_root_lists_itself() {
        let root = unique_tmp_dir("single");
        std::fs::create_dir_all(&root).unwrap();
        let f = root.join("only.parquet");
        std::fs::write(&f, b"1234").unwrap();
        let files = FsFileLister::new().list(&[f.clone()]).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, f);
        assert_eq!(files[0].size, 4);
    }

    #[test]
    fn missing_root_is_storage_unavailable() {
        let root = unique_tmp_dir("missing");
        let err = FsFileLister::new().list(&[root]).unwrap_err();
        assert!(matches!(err, SourceError::StorageUnavailable { .. }));
    }
}
