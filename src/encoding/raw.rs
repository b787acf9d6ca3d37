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

//! Raw encoding: uncompressed little-endian pixel words, row-major.

use log::warn;

use super::DecodeStatus;
use crate::framebuffer::Framebuffer;
use crate::protocol::{PixelFormat, Rectangle};
use crate::translate::PixelTranslator;
use crate::wire::WireReader;

/// Decodes a Raw rectangle. Only 32 bits per pixel is supported; other
/// widths consume the payload, log a warning and leave the image untouched.
pub(crate) fn decode(
    buf: &[u8],
    rect: &Rectangle,
    format: &PixelFormat,
    translate: &PixelTranslator,
    fb: &mut Framebuffer,
) -> DecodeStatus {
    let needed =
        usize::from(rect.width) * usize::from(rect.height) * format.bytes_per_pixel();
    if buf.len() < needed {
        return DecodeStatus::NeedMore;
    }

    if format.bits_per_pixel != 32 {
        warn!(
            "{} bits per pixel not supported in raw encoding, skipping rectangle",
            format.bits_per_pixel
        );
        return DecodeStatus::Done {
            consumed: needed,
            applied: false,
        };
    }

    let mut r = WireReader::new(&buf[..needed]);
    for dy in 0..u32::from(rect.height) {
        for dx in 0..u32::from(rect.width) {
            // Length was checked up front, so the reads cannot run short.
            let Some(word) = r.get_u32_le() else {
                return DecodeStatus::Failed {
                    consumed: needed,
                    reason: "raw payload shorter than advertised".into(),
                };
            };
            fb.set_pixel(
                u32::from(rect.x) + dx,
                u32::from(rect.y) + dy,
                translate.argb(word),
            );
        }
    }

    DecodeStatus::Done {
        consumed: needed,
        applied: true,
    }
}
