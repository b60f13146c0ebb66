//! In-memory stand-ins for device resources used by unit tests

use std::cell::RefCell;

use splatcrate_core::Result;

use crate::buffer::DeviceMemory;

#[derive(Debug, Clone, PartialEq)]
pub struct MockBuffer {
    pub id: usize,
    pub label: String,
    pub usage: wgpu::BufferUsages,
    pub size: u64,
    pub host_visible: bool,
}

/// Records every allocation and copy; buffer contents live in host memory
pub struct MockMemory {
    max_buffer_size: u64,
    buffers: RefCell<Vec<(MockBuffer, Vec<u8>)>>,
    copies: RefCell<Vec<(usize, usize, u64)>>,
}

impl Default for MockMemory {
    fn default() -> Self {
        Self::with_max_buffer_size(u64::MAX)
    }
}

impl MockMemory {
    pub fn with_max_buffer_size(max_buffer_size: u64) -> Self {
        Self {
            max_buffer_size,
            buffers: RefCell::default(),
            copies: RefCell::default(),
        }
    }

    pub fn contents(&self, buffer: &MockBuffer) -> Vec<u8> {
        self.buffers.borrow()[buffer.id].1.clone()
    }

    /// `(src, dst, size)` for every copy so far
    pub fn copies(&self) -> Vec<(usize, usize, u64)> {
        self.copies.borrow().clone()
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.borrow().len()
    }

    fn push(&self, label: &str, usage: wgpu::BufferUsages, contents: Vec<u8>, host_visible: bool) -> MockBuffer {
        let mut buffers = self.buffers.borrow_mut();
        let buffer = MockBuffer {
            id: buffers.len(),
            label: label.to_string(),
            usage,
            size: contents.len() as u64,
            host_visible,
        };
        buffers.push((buffer.clone(), contents));
        buffer
    }
}

impl DeviceMemory for MockMemory {
    type Buffer = MockBuffer;

    fn max_buffer_size(&self) -> u64 {
        self.max_buffer_size
    }

    fn create_staging_buffer(&self, label: &str, contents: &[u8]) -> Result<MockBuffer> {
        Ok(self.push(label, wgpu::BufferUsages::COPY_SRC, contents.to_vec(), true))
    }

    fn create_device_buffer(&self, label: &str, size: u64, usage: wgpu::BufferUsages) -> Result<MockBuffer> {
        Ok(self.push(label, usage, vec![0; size as usize], false))
    }

    fn copy_buffer(&self, src: &MockBuffer, dst: &MockBuffer, size: u64) -> Result<()> {
        let mut buffers = self.buffers.borrow_mut();
        let data = buffers[src.id].1[..size as usize].to_vec();
        buffers[dst.id].1[..size as usize].copy_from_slice(&data);
        self.copies.borrow_mut().push((src.id, dst.id, size));
        Ok(())
    }
}
