// Copyright 2025 Dustin McAfee
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Incremental reader over buffered wire bytes.
//!
//! The transport delivers bytes in arbitrary chunks, so every protocol parse
//! must be able to stop cleanly when the data it needs has not arrived yet.
//! `WireReader` is a non-consuming cursor: getters return `None` when the
//! buffer runs short, and the caller abandons the whole attempt without
//! having consumed anything. Only after a parse completes does the caller
//! advance the real buffer by [`WireReader::consumed`] bytes.

/// A position-tracking cursor over a byte slice.
///
/// All multi-byte reads are big-endian unless the method name says otherwise;
/// raw pixel words on the wire are little-endian and use
/// [`WireReader::get_pixel_le`].
pub(crate) struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Number of bytes successfully read so far.
    pub(crate) fn consumed(&self) -> usize {
        self.pos
    }

    /// Number of bytes still available to read.
    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn get_u8(&mut self) -> Option<u8> {
        let b = *self.buf.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    pub(crate) fn get_u16_be(&mut self) -> Option<u16> {
        let bytes = self.get_bytes(2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn get_u32_be(&mut self) -> Option<u32> {
        let bytes = self.get_bytes(4)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn get_i32_be(&mut self) -> Option<i32> {
        self.get_u32_be().map(|v| v as i32)
    }

    pub(crate) fn get_u32_le(&mut self) -> Option<u32> {
        let bytes = self.get_bytes(4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a little-endian pixel word of 1, 2, 3 or 4 bytes.
    pub(crate) fn get_pixel_le(&mut self, bytes_per_pixel: usize) -> Option<u32> {
        let bytes = self.get_bytes(bytes_per_pixel)?;
        let mut word = 0u32;
        for (i, b) in bytes.iter().enumerate() {
            word |= u32::from(*b) << (8 * i);
        }
        Some(word)
    }

    pub(crate) fn get_bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.remaining() < n {
            return None;
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Some(slice)
    }

    pub(crate) fn skip(&mut self, n: usize) -> Option<()> {
        if self.remaining() < n {
            return None;
        }
        self.pos += n;
        Some(())
    }
}
