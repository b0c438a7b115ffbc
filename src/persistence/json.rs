use glam::{Vec3, Vec4};
use serde_json::{Map, Value};

use crate::error::ArchiveError;

use super::{ArchiveReader, ArchiveWriter};

/// Human-readable framing: every block is a JSON object keyed by field name.
#[derive(Debug, Default)]
pub struct JsonWriter {
    root: Map<String, Value>,
    open_blocks: Vec<(String, Map<String, Value>)>,
}

impl JsonWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> Result<Value, ArchiveError> {
        if !self.open_blocks.is_empty() {
            return Err(ArchiveError::Unbalanced);
        }
        Ok(Value::Object(self.root))
    }

    pub fn finish_pretty(self) -> Result<String, ArchiveError> {
        let value = self.finish()?;
        Ok(serde_json::to_string_pretty(&value)?)
    }

    fn current(&mut self) -> &mut Map<String, Value> {
        match self.open_blocks.last_mut() {
            Some((_, map)) => map,
            None => &mut self.root,
        }
    }

    fn insert(&mut self, key: &str, value: Value) {
        self.current().insert(key.to_string(), value);
    }
}

impl ArchiveWriter for JsonWriter {
    fn begin_block(&mut self, key: &str) {
        self.open_blocks.push((key.to_string(), Map::new()));
    }

    fn end_block(&mut self) {
        if let Some((key, map)) = self.open_blocks.pop() {
            self.insert(&key, Value::Object(map));
        }
    }

    fn write_bool(&mut self, key: &str, value: bool) {
        self.insert(key, Value::Bool(value));
    }

    fn write_u32(&mut self, key: &str, value: u32) {
        self.insert(key, Value::from(value));
    }

    fn write_f32(&mut self, key: &str, value: f32) {
        self.insert(key, Value::from(value));
    }

    fn write_vec3(&mut self, key: &str, value: Vec3) {
        self.insert(key, Value::from(value.to_array().to_vec()));
    }

    fn write_vec4(&mut self, key: &str, value: Vec4) {
        self.insert(key, Value::from(value.to_array().to_vec()));
    }

    fn write_str(&mut self, key: &str, value: &str) {
        self.insert(key, Value::String(value.to_string()));
    }

    fn write_names(&mut self, key: &str, names: &[String]) {
        self.insert(key, Value::from(names.to_vec()));
    }
}

/// Reader for [`JsonWriter`] output.
#[derive(Debug)]
pub struct JsonReader {
    root: Value,
    path: Vec<String>,
}

impl JsonReader {
    pub fn new(root: Value) -> Self {
        Self {
            root,
            path: Vec::new(),
        }
    }

    pub fn parse(text: &str) -> Result<Self, ArchiveError> {
        Ok(Self::new(serde_json::from_str(text)?))
    }

    fn current(&self) -> Result<&Map<String, Value>, ArchiveError> {
        let mut node = &self.root;
        for key in &self.path {
            node = node
                .get(key)
                .ok_or_else(|| ArchiveError::MissingField(key.clone()))?;
        }
        node.as_object().ok_or_else(|| ArchiveError::TypeMismatch {
            key: self.path.last().cloned().unwrap_or_default(),
            expected: "object",
        })
    }

    fn field(&self, key: &str) -> Result<&Value, ArchiveError> {
        self.current()?
            .get(key)
            .ok_or_else(|| ArchiveError::MissingField(key.to_string()))
    }

    fn number(&self, key: &str) -> Result<f64, ArchiveError> {
        self.field(key)?
            .as_f64()
            .ok_or_else(|| mismatch(key, "number"))
    }

    fn floats<const N: usize>(&self, key: &str) -> Result<[f32; N], ArchiveError> {
        let array = self
            .field(key)?
            .as_array()
            .ok_or_else(|| mismatch(key, "array"))?;
        if array.len() != N {
            return Err(mismatch(key, "vector"));
        }
        let mut out = [0.0; N];
        for (slot, value) in out.iter_mut().zip(array) {
            *slot = value.as_f64().ok_or_else(|| mismatch(key, "number"))? as f32;
        }
        Ok(out)
    }
}

fn mismatch(key: &str, expected: &'static str) -> ArchiveError {
    ArchiveError::TypeMismatch {
        key: key.to_string(),
        expected,
    }
}

impl ArchiveReader for JsonReader {
    fn begin_block(&mut self, key: &str) -> Result<(), ArchiveError> {
        if !self.field(key)?.is_object() {
            return Err(mismatch(key, "object"));
        }
        self.path.push(key.to_string());
        Ok(())
    }

    fn end_block(&mut self) -> Result<(), ArchiveError> {
        self.path.pop().map(|_| ()).ok_or(ArchiveError::Unbalanced)
    }

    fn depth(&self) -> usize {
        self.path.len()
    }

    fn read_bool(&mut self, key: &str) -> Result<bool, ArchiveError> {
        self.field(key)?
            .as_bool()
            .ok_or_else(|| mismatch(key, "boolean"))
    }

    fn read_u32(&mut self, key: &str) -> Result<u32, ArchiveError> {
        let value = self
            .field(key)?
            .as_u64()
            .ok_or_else(|| mismatch(key, "unsigned integer"))?;
        u32::try_from(value).map_err(|err| ArchiveError::InvalidValue {
            key: key.to_string(),
            message: err.to_string(),
        })
    }

    fn read_f32(&mut self, key: &str) -> Result<f32, ArchiveError> {
        Ok(self.number(key)? as f32)
    }

    fn read_vec3(&mut self, key: &str) -> Result<Vec3, ArchiveError> {
        Ok(Vec3::from_array(self.floats::<3>(key)?))
    }

    fn read_vec4(&mut self, key: &str) -> Result<Vec4, ArchiveError> {
        Ok(Vec4::from_array(self.floats::<4>(key)?))
    }

    fn read_str(&mut self, key: &str) -> Result<String, ArchiveError> {
        self.field(key)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch(key, "string"))
    }

    fn read_names(&mut self, key: &str) -> Result<Vec<String>, ArchiveError> {
        self.field(key)?
            .as_array()
            .ok_or_else(|| mismatch(key, "array"))?
            .iter()
            .map(|value| {
                value
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| mismatch(key, "string"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_blocks_become_objects() {
        let mut writer = JsonWriter::new();
        writer.write_names("children", &["A".to_string()]);
        writer.begin_block("child_0");
        writer.write_vec3("position", Vec3::new(1.0, 2.0, 3.0));
        writer.end_block();
        let value = writer.finish().unwrap();
        assert_eq!(value["children"][0], "A");
        assert_eq!(value["child_0"]["position"][2], 3.0);
    }

    #[test]
    fn type_mismatch_is_reported_with_key() {
        let mut reader = JsonReader::parse(r#"{"mass": "heavy"}"#).unwrap();
        match reader.read_f32("mass") {
            Err(ArchiveError::TypeMismatch { key, expected }) => {
                assert_eq!(key, "mass");
                assert_eq!(expected, "number");
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert!(matches!(
            reader.read_bool("missing"),
            Err(ArchiveError::MissingField(_))
        ));
    }
}
