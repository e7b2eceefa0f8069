use serde::{Deserialize, Serialize};

use crate::core::error::{SourceError, SourceResult};

/// 字段类型（与宿主引擎的类型名一一对应，核心不解释其语义）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Integer,
    Long,
    Double,
    Boolean,
    Date,
    Timestamp,
    Binary,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }
}

/// 结构化 schema（Relation 中以 JSON 字符串形式保存）
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSchema {
    pub fields: Vec<Field>,
}

impl DataSchema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn to_json(&self) -> String {
        // 纯数据结构，序列化不会失败
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{\"fields\":[]}"))
    }

    pub fn from_json(json: &str) -> SourceResult<Self> {
        serde_json::from_str(json).map_err(SourceError::SchemaDecode)
    }
}
