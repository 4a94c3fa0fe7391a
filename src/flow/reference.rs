//! # 作业输出引用
//!
//! 作业之间通过 `OutputRef`（作业 uuid + JSON 路径）传递数据，
//! 运行时从 `OutputStore` 中解析。
//!
//! ## 依赖关系
//! - 被 `flow/job.rs`, `flow/graph.rs`, `flow/runner.rs`, `makers/` 使用
//! - 使用 `serde_json`, `uuid`

use crate::error::{PhonfitError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// JSON 路径中的一段
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathKey {
    Index(usize),
    Key(String),
}

/// 指向某个作业输出（或其中一部分）的引用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRef {
    pub uuid: Uuid,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathKey>,
}

impl OutputRef {
    pub fn new(uuid: Uuid) -> Self {
        OutputRef {
            uuid,
            path: Vec::new(),
        }
    }

    /// 追加字典键
    pub fn key(mut self, key: &str) -> Self {
        self.path.push(PathKey::Key(key.to_string()));
        self
    }

    /// 追加列表下标
    #[cfg(test)]
    pub fn index(mut self, index: usize) -> Self {
        self.path.push(PathKey::Index(index));
        self
    }

    fn path_string(&self) -> String {
        self.path
            .iter()
            .map(|p| match p {
                PathKey::Index(i) => format!("[{}]", i),
                PathKey::Key(k) => format!(".{}", k),
            })
            .collect()
    }

    /// 解析为 JSON 值
    pub fn resolve(&self, store: &OutputStore) -> Result<Value> {
        let unresolved = || PhonfitError::UnresolvedReference {
            uuid: self.uuid.to_string(),
            path: self.path_string(),
        };

        let mut current = store.get(&self.uuid).ok_or_else(unresolved)?;
        for key in &self.path {
            current = match key {
                PathKey::Index(i) => current.get(*i),
                PathKey::Key(k) => current.get(k.as_str()),
            }
            .ok_or_else(unresolved)?;
        }
        Ok(current.clone())
    }

    /// 解析并反序列化为具体类型
    pub fn resolve_as<T: DeserializeOwned>(&self, store: &OutputStore) -> Result<T> {
        Ok(serde_json::from_value(self.resolve(store)?)?)
    }
}

/// 字面值或输出引用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Input<T> {
    Value(T),
    Ref(OutputRef),
}

impl<T: Clone + DeserializeOwned> Input<T> {
    pub fn resolve(&self, store: &OutputStore) -> Result<T> {
        match self {
            Input::Value(v) => Ok(v.clone()),
            Input::Ref(r) => r.resolve_as(store),
        }
    }
}

impl<T> Input<T> {
    pub fn output_ref(&self) -> Option<&OutputRef> {
        match self {
            Input::Value(_) => None,
            Input::Ref(r) => Some(r),
        }
    }
}

impl<T> From<OutputRef> for Input<T> {
    fn from(r: OutputRef) -> Self {
        Input::Ref(r)
    }
}

/// 作业流输出描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSpec {
    Ref(OutputRef),
    Value(Value),
    List(Vec<OutputSpec>),
    Map(BTreeMap<String, OutputSpec>),
}

impl OutputSpec {
    pub fn resolve(&self, store: &OutputStore) -> Result<Value> {
        match self {
            OutputSpec::Ref(r) => r.resolve(store),
            OutputSpec::Value(v) => Ok(v.clone()),
            OutputSpec::List(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|s| s.resolve(store))
                    .collect::<Result<Vec<_>>>()?,
            )),
            OutputSpec::Map(map) => {
                let mut obj = serde_json::Map::new();
                for (k, s) in map {
                    obj.insert(k.clone(), s.resolve(store)?);
                }
                Ok(Value::Object(obj))
            }
        }
    }

    /// 第 `index` 个列表元素
    #[cfg(test)]
    pub fn item(&self, index: usize) -> Option<&OutputSpec> {
        match self {
            OutputSpec::List(items) => items.get(index),
            _ => None,
        }
    }

    /// 单一引用时返回该引用
    #[cfg(test)]
    pub fn as_ref_output(&self) -> Option<&OutputRef> {
        match self {
            OutputSpec::Ref(r) => Some(r),
            _ => None,
        }
    }
}

impl From<OutputRef> for OutputSpec {
    fn from(r: OutputRef) -> Self {
        OutputSpec::Ref(r)
    }
}

/// 每个作业的最新输出
#[derive(Debug, Default, Clone)]
pub struct OutputStore {
    outputs: HashMap<Uuid, Value>,
}

impl OutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, uuid: Uuid, output: Value) {
        self.outputs.insert(uuid, output);
    }

    pub fn get(&self, uuid: &Uuid) -> Option<&Value> {
        self.outputs.get(uuid)
    }

    pub fn contains(&self, uuid: &Uuid) -> bool {
        self.outputs.contains_key(uuid)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_with(uuid: Uuid, value: Value) -> OutputStore {
        let mut store = OutputStore::new();
        store.insert(uuid, value);
        store
    }

    #[test]
    fn test_resolve_nested_path() {
        let id = Uuid::new_v4();
        let store = store_with(id, json!({"dirs": ["a", "b"], "energy": -1.5}));

        let r = OutputRef::new(id).key("dirs").index(1);
        assert_eq!(r.resolve(&store).unwrap(), json!("b"));

        let e: f64 = OutputRef::new(id).key("energy").resolve_as(&store).unwrap();
        assert_eq!(e, -1.5);
    }

    #[test]
    fn test_unresolved_reference() {
        let id = Uuid::new_v4();
        let store = store_with(id, json!({"dirs": []}));

        let missing_job = OutputRef::new(Uuid::new_v4());
        assert!(matches!(
            missing_job.resolve(&store),
            Err(PhonfitError::UnresolvedReference { .. })
        ));

        let missing_key = OutputRef::new(id).key("documents");
        match missing_key.resolve(&store) {
            Err(PhonfitError::UnresolvedReference { path, .. }) => assert_eq!(path, ".documents"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_output_spec_resolution() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut store = store_with(a, json!(1.0));
        store.insert(b, json!({"x": [1, 2]}));

        let mut map = BTreeMap::new();
        map.insert("a".to_string(), OutputSpec::Ref(OutputRef::new(a)));
        map.insert(
            "b".to_string(),
            OutputSpec::List(vec![
                OutputSpec::Ref(OutputRef::new(b).key("x").index(0)),
                OutputSpec::Value(json!("lit")),
            ]),
        );
        let spec = OutputSpec::Map(map);

        assert_eq!(spec.resolve(&store).unwrap(), json!({"a": 1.0, "b": [1, "lit"]}));
    }

    #[test]
    fn test_input_serde_shape() {
        let id = Uuid::nil();
        let input: Input<f64> = Input::Ref(OutputRef::new(id).key("energy"));
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(
            json,
            json!({"ref": {"uuid": "00000000-0000-0000-0000-000000000000", "path": ["energy"]}})
        );
        let back: Input<f64> = serde_json::from_value(json).unwrap();
        assert_eq!(back, input);

        let lit: Input<f64> = serde_json::from_value(json!({"value": 2.5})).unwrap();
        assert_eq!(lit.resolve(&OutputStore::new()).unwrap(), 2.5);
    }
}
