use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::core::{DataSchema, PartitionSpec, SourceResult};
use crate::source::handle::{DatasetHandle, FileFormat, FileIndex, FileRelation, InMemoryFileIndex};
use crate::source::listing::FileLister;

/// 读请求：schema + format + options + root paths
#[derive(Clone, Debug)]
pub struct ReadRequest {
    pub root_paths: Vec<PathBuf>,
    pub schema: DataSchema,
    pub format: String,
    pub options: BTreeMap<String, String>,
}

/// 存储读取协作方：按给定元数据打开一个可查询的活句柄，失败即报错
pub trait StorageReader: Send + Sync {
    fn read(&self, request: ReadRequest) -> SourceResult<DatasetHandle>;
}

/// 本地文件系统读取：重新列举 + 分区发现，不复用任何缓存内容
pub struct FsStorageReader {
    lister: Arc<dyn FileLister>,
}

impl FsStorageReader {
    pub fn new(lister: Arc<dyn FileLister>) -> Self {
        Self { lister }
    }
}

impl StorageReader for FsStorageReader {
    fn read(&self, request: ReadRequest) -> SourceResult<DatasetHandle> {
        let files = self.lister.list(&request.root_paths)?;
        let partition_spec = PartitionSpec::discover(&request.root_paths, &files)?;

        tracing::debug!(
            "Opened {} dataset: {} files, partitioned={}",
            request.format,
            files.len(),
            partition_spec.is_partitioned()
        );

        Ok(DatasetHandle::Files(FileRelation {
            location: FileIndex::InMemory(InMemoryFileIndex {
                root_paths: request.root_paths,
                files,
                partition_spec,
            }),
            data_schema: request.schema,
            format: FileFormat::registered(&request.format),
            options: request.options,
        }))
    }
}
