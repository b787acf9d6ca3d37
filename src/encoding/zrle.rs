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

//! ZRLE encoding: zlib-compressed 64x64 tiles.
//!
//! The rectangle payload is a u32 big-endian length followed by that many
//! bytes of zlib data. All ZRLE rectangles of a session flow through one
//! inflate context: only the first rectangle carries a zlib header, later
//! ones are continuation data, so the context must never be reset or fed
//! the same bytes twice. The decompressed stream holds 64x64 tiles in
//! row-major order (narrower and shorter at the right and bottom edges),
//! each starting with a subencoding byte.
//!
//! Pixels inside the stream are CPIXELs: 3 bytes instead of 4 when the
//! session format is 32bpp little-endian with all channels in the low three
//! bytes, the full pixel word otherwise.

use flate2::{Decompress, FlushDecompress, Status};
use log::warn;

use super::DecodeStatus;
use crate::framebuffer::Framebuffer;
use crate::protocol::{PixelFormat, Rectangle};
use crate::translate::PixelTranslator;
use crate::wire::WireReader;

const TILE_SIZE: u32 = 64;

/// ZRLE subencoding: raw CPIXELs, row-major.
const SUBENC_RAW: u8 = 0;
/// ZRLE subencoding: one CPIXEL fills the tile.
const SUBENC_SOLID: u8 = 1;
/// ZRLE subencoding: plain RLE (unimplemented).
const SUBENC_PLAIN_RLE: u8 = 128;

/// Decoder for ZRLE rectangles, owning the session's single inflate context.
pub(crate) struct ZrleDecoder {
    inflate: Decompress,
}

impl ZrleDecoder {
    pub(crate) fn new() -> Self {
        Self {
            inflate: Decompress::new(true),
        }
    }

    /// Decodes one ZRLE rectangle. Defers until the whole length-prefixed
    /// payload is buffered so the inflate context is fed exactly once.
    pub(crate) fn decode(
        &mut self,
        buf: &[u8],
        rect: &Rectangle,
        format: &PixelFormat,
        translate: &PixelTranslator,
        fb: &mut Framebuffer,
    ) -> DecodeStatus {
        let mut r = WireReader::new(buf);
        let Some(compressed_len) = r.get_u32_be() else {
            return DecodeStatus::NeedMore;
        };
        let Some(compressed) = r.get_bytes(compressed_len as usize) else {
            return DecodeStatus::NeedMore;
        };
        let consumed = r.consumed();

        if compressed.is_empty() {
            return DecodeStatus::Done {
                consumed,
                applied: true,
            };
        }

        let data = match self.inflate_all(compressed) {
            Ok(data) => data,
            Err(reason) => {
                return DecodeStatus::Failed { consumed, reason };
            }
        };

        decode_tiles(&data, rect, format, translate, fb);
        DecodeStatus::Done {
            consumed,
            applied: true,
        }
    }

    /// Feeds one rectangle's compressed bytes through the persistent inflate
    /// context, returning everything it produces.
    fn inflate_all(&mut self, input: &[u8]) -> Result<Vec<u8>, String> {
        let mut out = Vec::new();
        let mut chunk = vec![0u8; 64 * 1024];
        let mut pos = 0;

        while pos < input.len() {
            let before_in = self.inflate.total_in();
            let before_out = self.inflate.total_out();
            let status = self
                .inflate
                .decompress(&input[pos..], &mut chunk, FlushDecompress::Sync)
                .map_err(|e| format!("zlib inflate failed: {e}"))?;
            let consumed = (self.inflate.total_in() - before_in) as usize;
            let produced = (self.inflate.total_out() - before_out) as usize;
            pos += consumed;
            out.extend_from_slice(&chunk[..produced]);

            match status {
                Status::StreamEnd => break,
                Status::Ok | Status::BufError => {
                    if consumed == 0 && produced == 0 {
                        return Err("zlib inflate made no progress".into());
                    }
                }
            }
        }

        Ok(out)
    }
}

/// Walks the decompressed tile stream and paints the rectangle. Truncated or
/// unimplemented content abandons the remaining tiles with a warning; the
/// wire itself stays in sync because the payload was length-delimited.
fn decode_tiles(
    data: &[u8],
    rect: &Rectangle,
    format: &PixelFormat,
    translate: &PixelTranslator,
    fb: &mut Framebuffer,
) {
    let mut r = WireReader::new(data);
    let cpixel = format.cpixel_bytes();
    let width = u32::from(rect.width);
    let height = u32::from(rect.height);

    let mut ty = 0u32;
    while ty < height {
        let th = TILE_SIZE.min(height - ty);
        let mut tx = 0u32;
        while tx < width {
            let tw = TILE_SIZE.min(width - tx);
            let origin_x = u32::from(rect.x) + tx;
            let origin_y = u32::from(rect.y) + ty;

            let Some(subencoding) = r.get_u8() else {
                warn!("zrle data truncated at subencoding byte");
                return;
            };

            let ok = match subencoding {
                SUBENC_RAW => decode_raw_tile(
                    &mut r, origin_x, origin_y, tw, th, cpixel, translate, fb,
                ),
                SUBENC_SOLID => {
                    if let Some(word) = r.get_pixel_le(cpixel) {
                        fb.fill_rect(origin_x, origin_y, tw, th, translate.argb(word));
                        true
                    } else {
                        warn!("zrle data truncated in solid tile");
                        false
                    }
                }
                2..=16 => decode_packed_palette_tile(
                    &mut r,
                    origin_x,
                    origin_y,
                    tw,
                    th,
                    usize::from(subencoding),
                    cpixel,
                    translate,
                    fb,
                ),
                SUBENC_PLAIN_RLE => {
                    warn!("zrle plain RLE subencoding not implemented, abandoning rectangle");
                    false
                }
                130..=255 => {
                    warn!("zrle palette RLE subencoding not implemented, abandoning rectangle");
                    false
                }
                reserved => {
                    warn!("zrle reserved subencoding {reserved}, abandoning rectangle");
                    false
                }
            };
            if !ok {
                return;
            }
            tx += TILE_SIZE;
        }
        ty += TILE_SIZE;
    }
}

#[allow(clippy::too_many_arguments)]
fn decode_raw_tile(
    r: &mut WireReader<'_>,
    origin_x: u32,
    origin_y: u32,
    tw: u32,
    th: u32,
    cpixel: usize,
    translate: &PixelTranslator,
    fb: &mut Framebuffer,
) -> bool {
    for y in 0..th {
        for x in 0..tw {
            let Some(word) = r.get_pixel_le(cpixel) else {
                warn!("zrle data truncated in raw tile");
                return false;
            };
            fb.set_pixel(origin_x + x, origin_y + y, translate.argb(word));
        }
    }
    true
}

/// Packed palette tile: a palette of `palette_size` CPIXELs followed by
/// bit-packed indices, 1, 2 or 4 bits each, rows padded to a byte boundary,
/// most significant bits first.
#[allow(clippy::too_many_arguments)]
fn decode_packed_palette_tile(
    r: &mut WireReader<'_>,
    origin_x: u32,
    origin_y: u32,
    tw: u32,
    th: u32,
    palette_size: usize,
    cpixel: usize,
    translate: &PixelTranslator,
    fb: &mut Framebuffer,
) -> bool {
    let mut palette = Vec::with_capacity(palette_size);
    for _ in 0..palette_size {
        let Some(word) = r.get_pixel_le(cpixel) else {
            warn!("zrle data truncated in palette");
            return false;
        };
        palette.push(translate.argb(word));
    }

    let bits = if palette_size <= 2 {
        1
    } else if palette_size <= 4 {
        2
    } else {
        4
    };
    let mask = (1u8 << bits) - 1;
    let row_bytes = (tw as usize * bits + 7) / 8;

    for y in 0..th {
        let Some(row) = r.get_bytes(row_bytes) else {
            warn!("zrle data truncated in packed indices");
            return false;
        };
        let mut bit = 0usize;
        for x in 0..tw {
            let byte = row[bit / 8];
            let shift = 8 - bits - (bit % 8);
            let index = usize::from((byte >> shift) & mask);
            bit += bits;
            // Out-of-range indices are left unpainted.
            if let Some(&argb) = palette.get(index) {
                fb.set_pixel(origin_x + x, origin_y + y, argb);
            }
        }
    }
    true
}
