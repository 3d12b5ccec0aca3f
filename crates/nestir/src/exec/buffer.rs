use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::{GraphError, Result};
use crate::ir::{TensorSpec, TensorValue};

/// Shared, offset byte buffer: the host-side stand-in for accelerator-resident
/// storage. Cloning shares the underlying bytes; [`ArgBuf::view`] addresses a
/// slice of a larger buffer without copying, which is how scan storage hands
/// out per-iteration slots. Execution is single-threaded, so interior
/// mutability through `Rc<RefCell<..>>` is sufficient.
#[derive(Clone)]
pub struct ArgBuf {
    spec: TensorSpec,
    data: Rc<RefCell<Vec<u8>>>,
    offset: usize,
}

impl ArgBuf {
    /// Zero-initialized buffer sized for `spec`.
    pub fn alloc(spec: TensorSpec) -> Self {
        let len = spec.byte_len();
        Self {
            spec,
            data: Rc::new(RefCell::new(vec![0; len])),
            offset: 0,
        }
    }

    /// Fresh buffer holding a copy of `value`.
    pub fn from_value(value: &TensorValue) -> Self {
        Self {
            spec: value.spec().clone(),
            data: Rc::new(RefCell::new(value.to_bytes())),
            offset: 0,
        }
    }

    pub fn spec(&self) -> &TensorSpec {
        &self.spec
    }

    /// Re-addresses a slice of this buffer under a new spec, sharing storage.
    pub fn view(&self, spec: TensorSpec, offset: usize) -> Result<Self> {
        let end = self.offset + offset + spec.byte_len();
        if end > self.data.borrow().len() {
            return Err(GraphError::exec(format!(
                "view of {spec} at offset {offset} exceeds buffer bounds"
            )));
        }
        Ok(Self {
            offset: self.offset + offset,
            spec,
            data: Rc::clone(&self.data),
        })
    }

    /// Decodes the addressed bytes into a host value.
    pub fn read(&self) -> Result<TensorValue> {
        let data = self.data.borrow();
        let end = self.offset + self.spec.byte_len();
        TensorValue::from_bytes(self.spec.clone(), &data[self.offset..end])
    }

    /// Encodes `value` into the addressed bytes. The value must match the
    /// buffer's spec exactly.
    pub fn write(&self, value: &TensorValue) -> Result<()> {
        if value.spec() != &self.spec {
            return Err(GraphError::exec(format!(
                "buffer expects {}, got {}",
                self.spec,
                value.spec()
            )));
        }
        let bytes = value.to_bytes();
        let mut data = self.data.borrow_mut();
        let end = self.offset + bytes.len();
        data[self.offset..end].copy_from_slice(&bytes);
        Ok(())
    }

    pub fn read_scalar_bool(&self) -> Result<bool> {
        self.read()?.as_bool_scalar()
    }

    pub fn read_scalar_i64(&self) -> Result<i64> {
        self.read()?.as_i64_scalar()
    }
}

impl fmt::Debug for ArgBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArgBuf({} @ {})", self.spec, self.offset)
    }
}
