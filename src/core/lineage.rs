use parking_lot::Mutex;
use std::collections::HashMap;

use crate::core::fingerprint::FileDescriptor;
use crate::core::relation::FileInfo;

/// 文件身份：(path, size, mtime)。任一变化都视为新文件
type FileKey = (String, u64, i64);

/// 文件 ID 分配器（血缘列用）
///
/// - 同一 (path, size, mtime) 在同一 tracker 中总是拿到同一个 id。
/// - 从已有 Content 预热后，刷新时旧文件保持原 id，新文件从 `max_id + 1` 开始。
#[derive(Debug, Default)]
pub struct FileIdTracker {
    inner: Mutex<TrackerState>,
}

#[derive(Debug, Default)]
struct TrackerState {
    ids: HashMap<FileKey, u64>,
    next_id: u64,
}

impl FileIdTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用已落盘的文件信息预热（保持 id 稳定）
    pub fn add_file_infos<'a, I>(&self, infos: I)
    where
        I: IntoIterator<Item = &'a FileInfo>,
    {
        let mut st = self.inner.lock();
        for info in infos {
            let key = (info.name.clone(), info.size, info.modified_time);
            st.ids.insert(key, info.id);
            if info.id >= st.next_id {
                st.next_id = info.id + 1;
            }
        }
    }

    /// 返回文件 id；未见过则分配新 id
    pub fn add_file(&self, file: &FileDescriptor) -> u64 {
        let key = (file.path_string(), file.size, file.modified_time);
        let mut st = self.inner.lock();
        if let Some(id) = st.ids.get(&key) {
            return *id;
        }
        let id = st.next_id;
        st.next_id += 1;
        st.ids.insert(key, id);
        id
    }

    /// 当前最大 id；尚未分配时为 None
    pub fn max_file_id(&self) -> Option<u64> {
        let st = self.inner.lock();
        st.next_id.checked_sub(1).filter(|_| !st.ids.is_empty())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
