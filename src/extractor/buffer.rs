//! Reusable output slot for extracted values.
//!
//! The plugin host may not free what we return, so every value goes through a
//! single buffer allocated once per context. Publishing overwrites the
//! previous value; a [`BufferHandle`] borrows the buffer and therefore cannot
//! outlive the next publish on the Rust side. Across the C boundary the
//! generation counter tells which publish a raw address belongs to.

use crate::error::{JevtError, Result};
use std::ffi::CStr;
use std::os::raw::c_char;

#[derive(Debug)]
pub struct OutputBuffer {
    data: Box<[u8]>,
    /// Length of the current value, terminator excluded.
    len: usize,
    /// Bumped on every publish; 0 means nothing was published yet.
    generation: u64,
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Self {
        OutputBuffer {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
            generation: 0,
        }
    }

    /// Total bytes available, terminator included.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Address of the buffer. Stable for the lifetime of the context.
    pub fn as_ptr(&self) -> *const c_char {
        self.data.as_ptr() as *const c_char
    }

    /// The value of the most recent publish, without its terminator.
    pub fn current(&self) -> Option<&[u8]> {
        (self.generation > 0).then(|| &self.data[..self.len])
    }

    /// Whether a handle from publish number `generation` still describes the
    /// buffer contents.
    pub fn is_current(&self, generation: u64) -> bool {
        generation != 0 && generation == self.generation
    }

    /// Copy `text` plus a NUL terminator into the buffer.
    ///
    /// Fails without touching the buffer if the terminated text does not fit.
    pub fn try_publish(&mut self, text: &str) -> Result<BufferHandle<'_>> {
        let bytes = text.as_bytes();
        let needed = bytes.len() + 1;
        if needed > self.data.len() {
            return Err(JevtError::OutputTooLarge {
                length: needed,
                capacity: self.data.len(),
            });
        }

        self.data[..bytes.len()].copy_from_slice(bytes);
        self.data[bytes.len()] = 0;
        self.len = bytes.len();
        self.generation += 1;

        Ok(BufferHandle {
            bytes: &self.data[..needed],
            generation: self.generation,
        })
    }

    /// Copy `text` plus a NUL terminator into the buffer.
    ///
    /// # Panics
    ///
    /// Panics if the terminated text exceeds the buffer capacity. A value
    /// that does not fit means the buffer was configured too small; cutting
    /// it short would hand the host a wrong value that looks valid.
    pub fn publish(&mut self, text: &str) -> BufferHandle<'_> {
        match self.try_publish(text) {
            Ok(handle) => handle,
            Err(err) => panic!("cannot publish extracted value: {}", err),
        }
    }
}

/// View of one published value, valid until the next publish.
#[derive(Debug, Clone, Copy)]
pub struct BufferHandle<'a> {
    bytes: &'a [u8],
    generation: u64,
}

impl<'a> BufferHandle<'a> {
    pub fn as_ptr(&self) -> *const c_char {
        self.bytes.as_ptr() as *const c_char
    }

    /// The value without its terminator.
    pub fn as_bytes(&self) -> &'a [u8] {
        &self.bytes[..self.bytes.len() - 1]
    }

    pub fn as_bytes_with_nul(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn to_str(&self) -> Option<&'a str> {
        std::str::from_utf8(self.as_bytes()).ok()
    }

    /// The value as a C string. Stops at the first NUL, so a value with an
    /// embedded `\u0000` reads short on the C side as well.
    pub fn as_c_str(&self) -> Option<&'a CStr> {
        CStr::from_bytes_until_nul(self.bytes).ok()
    }

    pub fn len(&self) -> usize {
        self.bytes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
