use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::error::{SourceError, SourceResult};
use crate::core::fingerprint::FileDescriptor;
use crate::core::schema::{DataSchema, DataType, Field};

/// 一个分区目录（叶子文件的父目录）及其 key=value 取值
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionDir {
    pub path: PathBuf,
    pub values: Vec<(String, String)>,
}

/// 分区发现结果
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSpec {
    pub columns: Vec<String>,
    pub partitions: Vec<PartitionDir>,
}

impl PartitionSpec {
    pub fn is_partitioned(&self) -> bool {
        !self.columns.is_empty() && !self.partitions.is_empty()
    }

    /// 分区列 schema：发现阶段不做类型推断，统一按 string
    pub fn schema(&self) -> DataSchema {
        DataSchema::new(
            self.columns
                .iter()
                .map(|c| Field::new(c.clone(), DataType::String))
                .collect(),
        )
    }

    /// 从第一个分区目录向上走 `columns.len()` 层得到 base path
    pub fn base_path(&self) -> Option<PathBuf> {
        if !self.is_partitioned() {
            return None;
        }
        let mut path = self.partitions.first()?.path.as_path();
        for _ in &self.columns {
            path = path.parent()?;
        }
        Some(path.to_path_buf())
    }

    /// 从 root 与叶子文件推导分区结构。
    ///
    /// 从叶子目录向上收集连续的 `key=value` 段，遇到普通目录或 root 即停。
    /// 所有文件的分区列必须一致，否则视为目录结构冲突。
    pub fn discover(roots: &[PathBuf], files: &[FileDescriptor]) -> SourceResult<Self> {
        let mut spec: Option<PartitionSpec> = None;

        for file in files {
            let Some(dir) = file.path.parent() else { continue };
            let root = roots
                .iter()
                .filter(|r| dir.starts_with(r))
                .max_by_key(|r| r.components().count());
            let values = match root {
                Some(root) => partition_values(root, dir),
                None => Vec::new(),
            };
            let columns: Vec<String> = values.iter().map(|(k, _)| k.clone()).collect();

            let spec = spec.get_or_insert_with(|| PartitionSpec {
                columns: columns.clone(),
                partitions: Vec::new(),
            });
            if spec.columns != columns {
                return Err(SourceError::malformed(
                    "partition-discovery",
                    format!(
                        "conflicting directory structures: {:?} vs {:?} at {}",
                        spec.columns,
                        columns,
                        dir.display()
                    ),
                ));
            }
            if !values.is_empty() && !spec.partitions.iter().any(|p| p.path == dir) {
                spec.partitions.push(PartitionDir {
                    path: dir.to_path_buf(),
                    values,
                });
            }
        }

        let mut spec = spec.unwrap_or_default();
        if spec.partitions.is_empty() {
            spec.columns.clear();
        }
        Ok(spec)
    }
}

fn partition_values(root: &Path, dir: &Path) -> Vec<(String, String)> {
    let Ok(rel) = dir.strip_prefix(root) else {
        return Vec::new();
    };
    let mut values = Vec::new();
    for comp in rel.components().rev() {
        let seg = comp.as_os_str().to_string_lossy();
        match seg.split_once('=') {
            Some((k, v)) if !k.is_empty() => values.push((k.to_string(), v.to_string())),
            _ => break,
        }
    }
    values.reverse();
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(p: &str) -> FileDescriptor {
        FileDescriptor::new(p, 1, 1)
    }

    #[test]
    fn unpartitioned_layout() {
        let roots = vec![PathBuf::from("/t")];
        let spec = PartitionSpec::discover(&roots, &[f("/t/a.csv"), f("/t/sub/b.csv")]).unwrap();
        assert!(!spec.is_partitioned());
        assert_eq!(spec.base_path(), None);
        assert!(spec.schema().is_empty());
    }

    #[test]
    fn two_level_partitions() {
        let roots = vec![PathBuf::from("/t")];
        let files = [
            f("/t/year=2023/month=01/a.parquet"),
            f("/t/year=2023/month=01/b.parquet"),
            f("/t/year=2024/month=02/c.parquet"),
        ];
        let spec = PartitionSpec::discover(&roots, &files).unwrap();
        assert_eq!(spec.columns, vec!["year", "month"]);
        assert_eq!(spec.partitions.len(), 2);
        assert_eq!(
            spec.partitions[1].values,
            vec![("year".into(), "2024".into()), ("month".into(), "02".into())]
        );
        assert_eq!(spec.base_path(), Some(PathBuf::from("/t")));
        assert_eq!(spec.schema().field_names(), vec!["year", "month"]);
    }

    #[test]
    fn root_pointing_at_partition_dir() {
        let roots = vec![PathBuf::from("/t/year=2023")];
        let spec = PartitionSpec::discover(&roots, &[f("/t/year=2023/a.parquet")]).unwrap();
        assert!(!spec.is_partitioned());
    }

    #[test]
    fn conflicting_layout_is_malformed() {
        let roots = vec![PathBuf::from("/t")];
        let err =
            PartitionSpec::discover(&roots, &[f("/t/k=1/a.csv"), f("/t/b.csv")]).unwrap_err();
        assert!(matches!(err, SourceError::MalformedInput { .. }));
    }
}
