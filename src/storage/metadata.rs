use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::core::{system_time_to_millis, Relation};

const ENTRY_EXT: &str = "idx";
const TMP_EXT: &str = "idx.tmp";
/// 首行格式：`fd-index/<version> <md5(body)>`
const FORMAT_TAG: &str = "fd-index/1";

/// 一个索引的元数据记录：源数据 Relation + 构建时的签名
///
/// 签名不放进 Relation，由这里单独保存，供之后的新鲜度比对。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexLogEntry {
    pub name: String,
    pub relation: Relation,
    pub signature: String,
    pub created_at_ms: i64,
}

impl IndexLogEntry {
    pub fn new(name: impl Into<String>, relation: Relation, signature: String) -> Self {
        Self {
            name: name.into(),
            relation,
            signature,
            created_at_ms: system_time_to_millis(std::time::SystemTime::now()),
        }
    }
}

/// 索引元数据存储：每个索引一个 `<name>.idx` 文本文件
///
/// 文件由一行摘要头和 JSON body 组成，摘要是 body 的 MD5：
///
/// ```text
/// fd-index/1 9e107d9d372bb6826bd81d3542a419d6
/// {"name":"orders","relation":{...},"signature":"...","createdAtMs":...}
/// ```
///
/// 写入走 `.idx.tmp` + rename，读到的要么是旧版本要么是新版本；
/// 头不认识、摘要不符或 JSON 解不开的文件一律当作不存在。
pub struct MetadataStore {
    dir: PathBuf,
}

/// 索引名只允许 `[A-Za-z0-9._-]`，且不能以 `.` 开头（挡住 `..`、隐藏文件和路径分隔符）
fn check_name(name: &str) -> anyhow::Result<()> {
    let ok = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if ok {
        Ok(())
    } else {
        anyhow::bail!("invalid index name '{}': use letters, digits, '.', '_' or '-'", name)
    }
}

fn body_digest(body: &[u8]) -> String {
    format!("{:x}", md5::compute(body))
}

/// 拼出完整文件内容
fn encode(entry: &IndexLogEntry) -> anyhow::Result<Vec<u8>> {
    let body = serde_json::to_vec(entry)?;
    let mut out = format!("{} {}\n", FORMAT_TAG, body_digest(&body)).into_bytes();
    out.extend_from_slice(&body);
    Ok(out)
}

/// 校验并解析；失败时返回原因，由调用方记录
fn decode(data: &[u8]) -> Result<IndexLogEntry, String> {
    let split = data
        .iter()
        .position(|b| *b == b'\n')
        .ok_or("missing digest line")?;
    let (head, body) = (&data[..split], &data[split + 1..]);
    let head = std::str::from_utf8(head).map_err(|_| "digest line is not utf-8")?;

    let (tag, digest) = head.split_once(' ').ok_or("malformed digest line")?;
    if tag != FORMAT_TAG {
        return Err(format!("unknown format tag '{}'", tag));
    }
    let actual = body_digest(body);
    if digest != actual {
        return Err(format!("digest mismatch: {} != {}", digest, actual));
    }
    serde_json::from_slice(body).map_err(|e| format!("body decode failed: {}", e))
}

impl MetadataStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, name: &str) -> anyhow::Result<PathBuf> {
        check_name(name)?;
        Ok(self.dir.join(format!("{}.{}", name, ENTRY_EXT)))
    }

    /// 已保存的索引名（按名排序；残留的 `.idx.tmp` 不算）
    pub async fn list(&self) -> anyhow::Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        let mut rd = fs::read_dir(&self.dir).await?;
        while let Some(ent) = rd.next_entry().await? {
            let file_name = ent.file_name();
            let Some(stem) = file_name
                .to_str()
                .and_then(|n| n.strip_suffix(&format!(".{}", ENTRY_EXT)))
            else {
                continue;
            };
            if check_name(stem).is_ok() {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// 读取并校验；不存在或校验失败返回 None
    pub async fn load(&self, name: &str) -> anyhow::Result<Option<IndexLogEntry>> {
        let path = self.entry_path(name)?;
        let data = match fs::read(&path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match decode(&data) {
            Ok(entry) if entry.name == name => Ok(Some(entry)),
            Ok(entry) => {
                tracing::warn!(
                    "Index log {:?} holds entry '{}', expected '{}', ignoring",
                    path,
                    entry.name,
                    name
                );
                Ok(None)
            }
            Err(reason) => {
                tracing::warn!("Index log {:?} rejected: {}", path, reason);
                Ok(None)
            }
        }
    }

    /// 写临时文件并 fsync，再 rename 覆盖
    pub async fn save(&self, entry: &IndexLogEntry) -> anyhow::Result<()> {
        let path = self.entry_path(&entry.name)?;
        let tmp_path = self.dir.join(format!("{}.{}", entry.name, TMP_EXT));
        let bytes = encode(entry)?;

        fs::create_dir_all(&self.dir).await?;
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp_path, &path).await?;

        if let Ok(dir) = fs::File::open(&self.dir).await {
            let _ = dir.sync_all().await;
        }

        let (files, bytes_total) = entry
            .relation
            .content()
            .map(|c| (c.len(), c.total_size()))
            .unwrap_or((0, 0));
        tracing::info!(
            "Index log written: {} ({} source files, {} source bytes)",
            entry.name,
            files,
            bytes_total
        );
        Ok(())
    }

    pub async fn remove(&self, name: &str) -> anyhow::Result<bool> {
        let path = self.entry_path(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
