use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// 叶子文件描述（由列举器产出，不单独落盘）
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub size: u64,
    /// 修改时间：Unix epoch 毫秒
    pub modified_time: i64,
}

impl FileDescriptor {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified_time: i64) -> Self {
        Self {
            path: path.into(),
            size,
            modified_time,
        }
    }

    pub fn path_string(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// 单文件指纹：size + mtime + path 直接拼接，无分隔符。
///
/// 拼接后恰好相同的两个不同文件无法区分，这是已接受的弱点。
pub fn fingerprint(file: &FileDescriptor) -> String {
    format!(
        "{}{}{}",
        file.size,
        file.modified_time,
        file.path.to_string_lossy()
    )
}

/// SystemTime -> epoch 毫秒（早于 epoch 的时间记为负值）
pub fn system_time_to_millis(ts: SystemTime) -> i64 {
    match ts.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}
