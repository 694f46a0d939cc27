//! Typed operation parameters
//!
//! An operation carries a command id and four parameter slots. Each slot is
//! empty, an inline value, or a memory reference owned by the operation.

use ote_core::{ObjectId, OteError, OteResult, StorageCommand};

pub const PARAM_COUNT: usize = 4;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Param {
    #[default]
    None,
    Value(u32),
    MemRef(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub command: u32,
    pub params: [Param; PARAM_COUNT],
}

impl Operation {
    pub fn new(command: u32) -> Self {
        Self {
            command,
            params: Default::default(),
        }
    }

    pub fn with_param(mut self, index: usize, param: Param) -> Self {
        if let Some(slot) = self.params.get_mut(index) {
            *slot = param;
        }
        self
    }

    /// WRITE: name, data, out length.
    pub fn write(name: &ObjectId, data: &[u8]) -> Self {
        Self::new(StorageCommand::Write.id())
            .with_param(0, Param::MemRef(name_bytes(name)))
            .with_param(1, Param::MemRef(data.to_vec()))
            .with_param(2, Param::Value(0))
    }

    /// READ: name, buffer of `capacity` bytes, out length.
    pub fn read(name: &ObjectId, capacity: usize) -> Self {
        Self::new(StorageCommand::Read.id())
            .with_param(0, Param::MemRef(name_bytes(name)))
            .with_param(1, Param::MemRef(vec![0u8; capacity]))
            .with_param(2, Param::Value(0))
    }

    /// SIZE: name, out size.
    pub fn size(name: &ObjectId) -> Self {
        Self::new(StorageCommand::Size.id())
            .with_param(0, Param::MemRef(name_bytes(name)))
            .with_param(1, Param::Value(0))
    }

    /// DELETE: name.
    pub fn delete(name: &ObjectId) -> Self {
        Self::new(StorageCommand::Delete.id()).with_param(0, Param::MemRef(name_bytes(name)))
    }

    pub fn memref(&self, index: usize) -> OteResult<&[u8]> {
        match self.params.get(index) {
            Some(Param::MemRef(buf)) => Ok(buf),
            _ => Err(param_mismatch(index, "memory reference")),
        }
    }

    pub fn memref_mut(&mut self, index: usize) -> OteResult<&mut Vec<u8>> {
        match self.params.get_mut(index) {
            Some(Param::MemRef(buf)) => Ok(buf),
            _ => Err(param_mismatch(index, "memory reference")),
        }
    }

    pub fn value(&self, index: usize) -> OteResult<u32> {
        match self.params.get(index) {
            Some(Param::Value(v)) => Ok(*v),
            _ => Err(param_mismatch(index, "value")),
        }
    }

    /// Store an output value. An empty slot becomes a value slot.
    pub fn set_value(&mut self, index: usize, value: u32) -> OteResult<()> {
        match self.params.get_mut(index) {
            Some(slot @ (Param::None | Param::Value(_))) => {
                *slot = Param::Value(value);
                Ok(())
            }
            _ => Err(param_mismatch(index, "value")),
        }
    }
}

/// Names go over the boundary NUL-terminated, as C callers send them.
fn name_bytes(name: &ObjectId) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(name.as_str().len() + 1);
    bytes.extend_from_slice(name.as_str().as_bytes());
    bytes.push(0);
    bytes
}

fn param_mismatch(index: usize, expected: &str) -> OteError {
    OteError::BadParameters(format!("parameter {index} must be a {expected}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_layout() {
        let id = ObjectId::parse("TADemo.blob").unwrap();
        let op = Operation::write(&id, b"data");
        assert_eq!(op.command, 301);
        assert_eq!(op.memref(0).unwrap(), b"TADemo.blob\0");
        assert_eq!(op.memref(1).unwrap(), b"data");
        assert_eq!(op.value(2).unwrap(), 0);
        assert_eq!(op.params[3], Param::None);
    }

    #[test]
    fn test_type_mismatch_is_bad_parameters() {
        let id = ObjectId::parse("a").unwrap();
        let mut op = Operation::delete(&id);
        assert!(matches!(op.value(0), Err(OteError::BadParameters(_))));
        assert!(matches!(op.memref(1), Err(OteError::BadParameters(_))));
        assert!(matches!(op.set_value(0, 1), Err(OteError::BadParameters(_))));
        assert!(matches!(op.memref(9), Err(OteError::BadParameters(_))));
    }

    #[test]
    fn test_set_value_fills_empty_slot() {
        let mut op = Operation::new(303);
        op.set_value(1, 42).unwrap();
        assert_eq!(op.value(1).unwrap(), 42);
    }
}
