//! # INCAR 计算参数模型
//!
//! VASP INCAR 风格的键值参数，以及用户覆盖（`None` 表示删除该键）。
//!
//! ## 依赖关系
//! - 被 `parsers/incar.rs`, `makers/calc.rs`, `flow/powerups.rs` 使用
//! - 无外部模块依赖

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// INCAR 参数值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IncarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    List(Vec<f64>),
    Text(String),
}

impl IncarValue {
    /// 从文本解析参数值
    pub fn parse(raw: &str) -> IncarValue {
        let raw = raw.trim();
        let lower = raw.to_lowercase();
        match lower.as_str() {
            ".true." | "true" | "t" | ".t." => return IncarValue::Bool(true),
            ".false." | "false" | "f" | ".f." => return IncarValue::Bool(false),
            _ => {}
        }

        if let Ok(v) = raw.parse::<i64>() {
            return IncarValue::Int(v);
        }
        if let Ok(v) = raw.parse::<f64>() {
            return IncarValue::Float(v);
        }

        let parts: Vec<&str> = raw.split_whitespace().collect();
        if parts.len() > 1 {
            let numbers: Vec<f64> = parts.iter().filter_map(|p| p.parse().ok()).collect();
            if numbers.len() == parts.len() {
                return IncarValue::List(numbers);
            }
        }

        IncarValue::Text(raw.to_string())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            IncarValue::Int(v) => Some(*v as f64),
            IncarValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for IncarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncarValue::Bool(true) => write!(f, ".TRUE."),
            IncarValue::Bool(false) => write!(f, ".FALSE."),
            IncarValue::Int(v) => write!(f, "{}", v),
            IncarValue::Float(v) => write!(f, "{}", v),
            IncarValue::List(values) => {
                let joined: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", joined.join(" "))
            }
            IncarValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for IncarValue {
    fn from(v: bool) -> Self {
        IncarValue::Bool(v)
    }
}

impl From<i64> for IncarValue {
    fn from(v: i64) -> Self {
        IncarValue::Int(v)
    }
}

impl From<i32> for IncarValue {
    fn from(v: i32) -> Self {
        IncarValue::Int(v as i64)
    }
}

impl From<f64> for IncarValue {
    fn from(v: f64) -> Self {
        IncarValue::Float(v)
    }
}

impl From<&str> for IncarValue {
    fn from(v: &str) -> Self {
        IncarValue::Text(v.to_string())
    }
}

/// INCAR 参数集合（键统一为大写）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncarSettings(BTreeMap<String, IncarValue>);

impl IncarSettings {
    pub fn new() -> Self {
        IncarSettings::default()
    }

    /// 链式设置参数
    pub fn with(mut self, key: &str, value: impl Into<IncarValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<IncarValue>) {
        self.0.insert(key.trim().to_uppercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&IncarValue> {
        self.0.get(&key.trim().to_uppercase())
    }

    pub fn remove(&mut self, key: &str) -> Option<IncarValue> {
        self.0.remove(&key.trim().to_uppercase())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &IncarValue)> {
        self.0.iter()
    }

    /// 应用用户覆盖
    pub fn apply(&mut self, updates: &IncarUpdates) {
        for (key, value) in updates.iter() {
            match value {
                Some(v) => self.set(key, v.clone()),
                None => {
                    self.remove(key);
                }
            }
        }
    }
}

/// 用户 INCAR 覆盖；值为 `None` 时删除对应键
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncarUpdates(BTreeMap<String, Option<IncarValue>>);

impl IncarUpdates {
    pub fn new() -> Self {
        IncarUpdates::default()
    }

    pub fn set(mut self, key: &str, value: impl Into<IncarValue>) -> Self {
        self.0.insert(key.trim().to_uppercase(), Some(value.into()));
        self
    }

    #[cfg(test)]
    pub fn unset(mut self, key: &str) -> Self {
        self.0.insert(key.trim().to_uppercase(), None);
        self
    }

    pub fn insert(&mut self, key: &str, value: Option<IncarValue>) {
        self.0.insert(key.trim().to_uppercase(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Option<IncarValue>)> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_values() {
        assert_eq!(IncarValue::parse(".TRUE."), IncarValue::Bool(true));
        assert_eq!(IncarValue::parse("False"), IncarValue::Bool(false));
        assert_eq!(IncarValue::parse("700"), IncarValue::Int(700));
        assert_eq!(IncarValue::parse("1E-04"), IncarValue::Float(1e-4));
        assert_eq!(IncarValue::parse("Normal"), IncarValue::Text("Normal".into()));
        assert_eq!(
            IncarValue::parse("2 2 -2"),
            IncarValue::List(vec![2.0, 2.0, -2.0])
        );
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let mut incar = IncarSettings::new().with("ismear", 0);
        assert_eq!(incar.get("ISMEAR"), Some(&IncarValue::Int(0)));
        incar.set("Ismear", -5);
        assert_eq!(incar.len(), 1);
        assert_eq!(incar.get("ismear"), Some(&IncarValue::Int(-5)));
    }

    #[test]
    fn test_apply_updates_with_removal() {
        let mut incar = IncarSettings::new()
            .with("ENCUT", 520)
            .with("ISPIN", 2)
            .with("LAECHG", true);
        let updates = IncarUpdates::new()
            .set("ENCUT", 200)
            .unset("ISPIN")
            .unset("NOT_PRESENT")
            .set("NELM", 50);
        incar.apply(&updates);

        assert_eq!(incar.get("ENCUT"), Some(&IncarValue::Int(200)));
        assert!(!incar.contains("ISPIN"));
        assert_eq!(incar.get("NELM"), Some(&IncarValue::Int(50)));
        assert!(incar.contains("LAECHG"));
    }

    #[test]
    fn test_updates_json_null_unsets() {
        let updates: IncarUpdates =
            serde_json::from_str(r#"{"ISMEAR": 0, "ISYM": null, "PREC": "Normal"}"#).unwrap();
        let mut incar = IncarSettings::new().with("ISYM", 0).with("ISMEAR", -5);
        incar.apply(&updates);
        assert_eq!(incar.get("ISMEAR"), Some(&IncarValue::Int(0)));
        assert!(!incar.contains("ISYM"));
        assert_eq!(incar.get("PREC"), Some(&IncarValue::Text("Normal".into())));
    }
}
