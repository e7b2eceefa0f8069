use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::core::{DataSchema, FileDescriptor, PartitionSpec};

/// 文件格式：已注册短名（csv/parquet/...）或无法识别的自定义实现
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileFormat {
    Registered(String),
    Unregistered(String),
}

impl FileFormat {
    pub fn registered(name: &str) -> Self {
        FileFormat::Registered(name.to_ascii_lowercase())
    }

    pub fn short_name(&self) -> Option<&str> {
        match self {
            FileFormat::Registered(n) => Some(n),
            FileFormat::Unregistered(_) => None,
        }
    }
}

/// 已列举、可感知分区的文件索引
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InMemoryFileIndex {
    pub root_paths: Vec<PathBuf>,
    pub files: Vec<FileDescriptor>,
    pub partition_spec: PartitionSpec,
}

/// 文件索引
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileIndex {
    InMemory(InMemoryFileIndex),
    /// 宿主引擎的自定义分区方案，核心不认识其结构
    Custom {
        name: String,
        root_paths: Vec<PathBuf>,
    },
}

impl FileIndex {
    pub fn root_paths(&self) -> &[PathBuf] {
        match self {
            FileIndex::InMemory(idx) => &idx.root_paths,
            FileIndex::Custom { root_paths, .. } => root_paths,
        }
    }
}

/// 基于文件的数据集（发现阶段或重建后的活句柄）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRelation {
    pub location: FileIndex,
    pub data_schema: DataSchema,
    pub format: FileFormat,
    pub options: BTreeMap<String, String>,
}

impl FileRelation {
    pub fn root_paths(&self) -> &[PathBuf] {
        self.location.root_paths()
    }

    /// 当前列举到的叶子文件（自定义索引无法列举，返回空）
    pub fn all_files(&self) -> &[FileDescriptor] {
        match &self.location {
            FileIndex::InMemory(idx) => &idx.files,
            FileIndex::Custom { .. } => &[],
        }
    }

    pub fn partition_spec(&self) -> Option<&PartitionSpec> {
        match &self.location {
            FileIndex::InMemory(idx) => Some(&idx.partition_spec),
            FileIndex::Custom { .. } => None,
        }
    }

    pub fn partition_schema(&self) -> DataSchema {
        self.partition_spec()
            .map(PartitionSpec::schema)
            .unwrap_or_default()
    }
}

/// 宿主引擎交给核心的数据集句柄
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatasetHandle {
    Files(FileRelation),
    /// 非文件数据集（内存表、外部连接等）
    Other { kind: String },
}

impl DatasetHandle {
    pub fn as_files(&self) -> Option<&FileRelation> {
        match self {
            DatasetHandle::Files(r) => Some(r),
            DatasetHandle::Other { .. } => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            DatasetHandle::Files(r) => {
                let fmt = match &r.format {
                    FileFormat::Registered(n) | FileFormat::Unregistered(n) => n.as_str(),
                };
                format!("{} files at {:?}", fmt, r.root_paths())
            }
            DatasetHandle::Other { kind } => format!("{} dataset", kind),
        }
    }
}
