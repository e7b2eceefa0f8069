use crate::core::fingerprint::{fingerprint, FileDescriptor};

/// 签名计算器：按列举顺序做左折叠
///
/// `acc = md5_hex(acc + fingerprint(file))`，初始 `acc = ""`。
///
/// ## 契约（重要）
/// - 结果依赖文件顺序，不是交换律聚合。列举器必须对未变化的文件集合给出稳定顺序，
///   否则同一份数据会算出不同签名。
/// - 空集合返回初始累加器 `""`，而不是 `md5("")`。
#[derive(Clone, Debug, Default)]
pub struct SignatureComputer {
    acc: String,
}

impl SignatureComputer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 折叠一个文件（流式列举时逐个调用）
    pub fn push(&mut self, file: &FileDescriptor) {
        let mut buf = std::mem::take(&mut self.acc);
        buf.push_str(&fingerprint(file));
        self.acc = md5_hex(buf.as_bytes());
    }

    pub fn finish(self) -> String {
        self.acc
    }
}

/// 一次性计算整个列表的签名
pub fn signature<'a, I>(files: I) -> String
where
    I: IntoIterator<Item = &'a FileDescriptor>,
{
    let mut computer = SignatureComputer::new();
    for f in files {
        computer.push(f);
    }
    computer.finish()
}

fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}
