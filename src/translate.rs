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

//! Pixel translation from wire formats to 8-bit-per-channel ARGB.
//!
//! Every decoder funnels raw pixel words through one [`PixelTranslator`]
//! built from the session's current [`PixelFormat`]. The translator is
//! rebuilt whenever the format changes so the per-pixel path stays at three
//! shifts, three masks and three multiplies.

use crate::framebuffer::argb;
use crate::protocol::PixelFormat;

#[derive(Debug, Clone, Copy)]
struct Channel {
    shift: u8,
    max: u16,
}

impl Channel {
    fn extract(&self, word: u32) -> u8 {
        let value = (word >> self.shift) & u32::from(self.max);
        match self.max {
            // The common case: the mask already spans a full byte.
            255 => value as u8,
            0 => 0,
            max => (value * 255 / u32::from(max)) as u8,
        }
    }
}

/// Converts raw pixel words under a fixed [`PixelFormat`] into ARGB.
#[derive(Debug, Clone, Copy)]
pub struct PixelTranslator {
    red: Channel,
    green: Channel,
    blue: Channel,
}

impl PixelTranslator {
    pub fn new(format: &PixelFormat) -> Self {
        Self {
            red: Channel {
                shift: format.red_shift,
                max: format.red_max,
            },
            green: Channel {
                shift: format.green_shift,
                max: format.green_max,
            },
            blue: Channel {
                shift: format.blue_shift,
                max: format.blue_max,
            },
        }
    }

    /// Translates one raw pixel word into an opaque ARGB value.
    pub fn argb(&self, word: u32) -> u32 {
        argb(
            self.red.extract(word),
            self.green.extract(word),
            self.blue.extract(word),
        )
    }
}
