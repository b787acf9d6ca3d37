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

//! Hextile encoding: 16x16 tiles with per-tile subencodings.
//!
//! Each tile begins with a subencoding mask. A raw tile carries its pixels
//! verbatim; otherwise the tile is filled with the current background and
//! optionally overdrawn with nibble-packed subrectangles. The background and
//! foreground colours persist from tile to tile within one rectangle, which
//! is why a tile with subencoding 0 legitimately paints the previous tile's
//! background.

use super::DecodeStatus;
use crate::framebuffer::Framebuffer;
use crate::protocol::{
    PixelFormat, Rectangle, HEXTILE_ANY_SUBRECTS, HEXTILE_BACKGROUND_SPECIFIED,
    HEXTILE_FOREGROUND_SPECIFIED, HEXTILE_RAW, HEXTILE_SUBRECTS_COLOURED,
};
use crate::translate::PixelTranslator;
use crate::wire::WireReader;

const TILE_SIZE: u32 = 16;

/// Decodes a Hextile rectangle, deferring until the whole tile stream is
/// buffered. Because tile lengths depend on their content, an incomplete
/// payload is detected mid-parse; the pass is simply repeated from the start
/// of the rectangle once more data arrives, which rewrites the same pixels
/// with the same values.
pub(crate) fn decode(
    buf: &[u8],
    rect: &Rectangle,
    format: &PixelFormat,
    translate: &PixelTranslator,
    fb: &mut Framebuffer,
) -> DecodeStatus {
    match try_decode(buf, rect, format, translate, fb) {
        Some(consumed) => DecodeStatus::Done {
            consumed,
            applied: true,
        },
        None => DecodeStatus::NeedMore,
    }
}

fn try_decode(
    buf: &[u8],
    rect: &Rectangle,
    format: &PixelFormat,
    translate: &PixelTranslator,
    fb: &mut Framebuffer,
) -> Option<usize> {
    let mut r = WireReader::new(buf);
    let bpp = format.bytes_per_pixel();
    let width = u32::from(rect.width);
    let height = u32::from(rect.height);

    // Carried across tiles within this rectangle.
    let mut background = 0u32;
    let mut foreground = 0u32;

    let mut ty = 0u32;
    while ty < height {
        let th = TILE_SIZE.min(height - ty);
        let mut tx = 0u32;
        while tx < width {
            let tw = TILE_SIZE.min(width - tx);
            let subencoding = r.get_u8()?;

            if subencoding & HEXTILE_RAW != 0 {
                for y in 0..th {
                    for x in 0..tw {
                        let word = r.get_pixel_le(bpp)?;
                        fb.set_pixel(
                            u32::from(rect.x) + tx + x,
                            u32::from(rect.y) + ty + y,
                            translate.argb(word),
                        );
                    }
                }
                tx += TILE_SIZE;
                continue;
            }

            if subencoding & HEXTILE_BACKGROUND_SPECIFIED != 0 {
                background = r.get_pixel_le(bpp)?;
            }
            if subencoding & HEXTILE_FOREGROUND_SPECIFIED != 0 {
                foreground = r.get_pixel_le(bpp)?;
            }

            fb.fill_rect(
                u32::from(rect.x) + tx,
                u32::from(rect.y) + ty,
                tw,
                th,
                translate.argb(background),
            );

            if subencoding & HEXTILE_ANY_SUBRECTS != 0 {
                let count = r.get_u8()?;
                for _ in 0..count {
                    let colour = if subencoding & HEXTILE_SUBRECTS_COLOURED != 0 {
                        r.get_pixel_le(bpp)?
                    } else {
                        foreground
                    };
                    let xy = r.get_u8()?;
                    let wh = r.get_u8()?;
                    let sx = u32::from(xy >> 4);
                    let sy = u32::from(xy & 0x0F);
                    let sw = u32::from(wh >> 4) + 1;
                    let sh = u32::from(wh & 0x0F) + 1;

                    // Subrects are clipped to the tile.
                    let argb = translate.argb(colour);
                    for y in 0..sh {
                        if sy + y >= th {
                            break;
                        }
                        for x in 0..sw {
                            if sx + x >= tw {
                                break;
                            }
                            fb.set_pixel(
                                u32::from(rect.x) + tx + sx + x,
                                u32::from(rect.y) + ty + sy + y,
                                argb,
                            );
                        }
                    }
                }
            }
            tx += TILE_SIZE;
        }
        ty += TILE_SIZE;
    }

    Some(r.consumed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::argb;

    fn rgb888() -> PixelFormat {
        PixelFormat {
            bits_per_pixel: 32,
            depth: 24,
            big_endian_flag: 0,
            true_colour_flag: 1,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 16,
            green_shift: 8,
            blue_shift: 0,
        }
    }

    fn rect(x: u16, y: u16, w: u16, h: u16) -> Rectangle {
        Rectangle {
            x,
            y,
            width: w,
            height: h,
            encoding: crate::protocol::ENCODING_HEXTILE,
        }
    }

    #[test]
    fn background_only_tile_fills_16x16() {
        let format = rgb888();
        let translate = PixelTranslator::new(&format);
        let mut fb = Framebuffer::new(16, 16);
        // BackgroundSpecified, followed by one little-endian white pixel.
        let payload = [0x02, 0xFF, 0xFF, 0xFF, 0x00];

        match decode(&payload, &rect(0, 0, 16, 16), &format, &translate, &mut fb) {
            DecodeStatus::Done { consumed, applied } => {
                assert_eq!(consumed, 5);
                assert!(applied);
            }
            other => panic!("unexpected status: {other:?}"),
        }
        assert!(fb.pixels().iter().all(|&px| px == argb(255, 255, 255)));
    }

    #[test]
    fn empty_subencoding_inherits_previous_background() {
        let format = rgb888();
        let translate = PixelTranslator::new(&format);
        let mut fb = Framebuffer::new(32, 16);
        // First tile sets a red background; second tile has subencoding 0 and
        // must reuse it.
        let payload = [0x02, 0x00, 0x00, 0xFF, 0x00, 0x00];

        match decode(&payload, &rect(0, 0, 32, 16), &format, &translate, &mut fb) {
            DecodeStatus::Done { consumed, .. } => assert_eq!(consumed, 6),
            other => panic!("unexpected status: {other:?}"),
        }
        assert_eq!(fb.pixel(0, 0), Some(argb(255, 0, 0)));
        assert_eq!(fb.pixel(31, 15), Some(argb(255, 0, 0)));
    }

    #[test]
    fn coloured_subrects_draw_over_background() {
        let format = rgb888();
        let translate = PixelTranslator::new(&format);
        let mut fb = Framebuffer::new(8, 8);
        let mut payload = vec![
            HEXTILE_BACKGROUND_SPECIFIED | HEXTILE_ANY_SUBRECTS | HEXTILE_SUBRECTS_COLOURED,
        ];
        payload.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // black background
        payload.push(1); // one subrect
        payload.extend_from_slice(&[0x00, 0x00, 0xFF, 0x00]); // red subrect colour
        payload.push(0x21); // x=2, y=1
        payload.push(0x32); // w=4, h=3

        match decode(&payload, &rect(0, 0, 8, 8), &format, &translate, &mut fb) {
            DecodeStatus::Done { consumed, .. } => assert_eq!(consumed, payload.len()),
            other => panic!("unexpected status: {other:?}"),
        }
        assert_eq!(fb.pixel(1, 1), Some(argb(0, 0, 0)));
        assert_eq!(fb.pixel(2, 1), Some(argb(255, 0, 0)));
        assert_eq!(fb.pixel(5, 3), Some(argb(255, 0, 0)));
        assert_eq!(fb.pixel(6, 3), Some(argb(0, 0, 0)));
        assert_eq!(fb.pixel(2, 4), Some(argb(0, 0, 0)));
    }

    #[test]
    fn foreground_persists_across_tiles() {
        let format = rgb888();
        let translate = PixelTranslator::new(&format);
        let mut fb = Framebuffer::new(32, 1);
        let mut payload = vec![
            HEXTILE_BACKGROUND_SPECIFIED | HEXTILE_FOREGROUND_SPECIFIED | HEXTILE_ANY_SUBRECTS,
        ];
        payload.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // black background
        payload.extend_from_slice(&[0x00, 0xFF, 0x00, 0x00]); // green foreground
        payload.push(1);
        payload.push(0x00); // x=0, y=0
        payload.push(0x10); // w=2, h=1
        // Second tile: background only set previously, one uncoloured subrect
        // drawn with the inherited green foreground.
        payload.push(HEXTILE_ANY_SUBRECTS);
        payload.push(1);
        payload.push(0x00);
        payload.push(0x00); // w=1, h=1

        match decode(&payload, &rect(0, 0, 32, 1), &format, &translate, &mut fb) {
            DecodeStatus::Done { consumed, .. } => assert_eq!(consumed, payload.len()),
            other => panic!("unexpected status: {other:?}"),
        }
        assert_eq!(fb.pixel(0, 0), Some(argb(0, 255, 0)));
        assert_eq!(fb.pixel(1, 0), Some(argb(0, 255, 0)));
        assert_eq!(fb.pixel(2, 0), Some(argb(0, 0, 0)));
        assert_eq!(fb.pixel(16, 0), Some(argb(0, 255, 0)));
        assert_eq!(fb.pixel(17, 0), Some(argb(0, 0, 0)));
    }

    #[test]
    fn raw_tile_carries_pixels_verbatim() {
        let format = rgb888();
        let translate = PixelTranslator::new(&format);
        let mut fb = Framebuffer::new(2, 2);
        let mut payload = vec![HEXTILE_RAW];
        for word in [
            0x00FF_0000u32, // red
            0x0000_FF00,    // green
            0x0000_00FF,    // blue
            0x00FF_FFFF,    // white
        ] {
            payload.extend_from_slice(&word.to_le_bytes());
        }

        match decode(&payload, &rect(0, 0, 2, 2), &format, &translate, &mut fb) {
            DecodeStatus::Done { consumed, .. } => assert_eq!(consumed, 17),
            other => panic!("unexpected status: {other:?}"),
        }
        assert_eq!(fb.pixel(0, 0), Some(argb(255, 0, 0)));
        assert_eq!(fb.pixel(1, 0), Some(argb(0, 255, 0)));
        assert_eq!(fb.pixel(0, 1), Some(argb(0, 0, 255)));
        assert_eq!(fb.pixel(1, 1), Some(argb(255, 255, 255)));
    }

    #[test]
    fn truncated_tile_defers() {
        let format = rgb888();
        let translate = PixelTranslator::new(&format);
        let mut fb = Framebuffer::new(16, 16);
        let payload = [0x02, 0xFF, 0xFF]; // background pixel cut short
        assert!(matches!(
            decode(&payload, &rect(0, 0, 16, 16), &format, &translate, &mut fb),
            DecodeStatus::NeedMore
        ));
    }
}
