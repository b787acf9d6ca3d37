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

//! Tight encoding: zlib streams, solid fills and JPEG rectangles.
//!
//! Every rectangle starts with a compression control byte. Per RFC 6143
//! Tight encoding specification, bits 0-3 are reset flags for the four
//! persistent zlib streams, and the high nibble selects the subtype:
//! 8 = fill, 9 = JPEG, top bit clear = basic compression with the stream id
//! in bits 4-5 and an explicit-filter flag in bit 6.
//!
//! The four inflate streams keep their dictionaries across rectangles and
//! framebuffer updates; a stream is only dropped when its reset flag is set,
//! and recreated lazily on next use. Basic-compression payloads shorter than
//! [`TIGHT_MIN_BYTES_TO_COMPRESS`] travel uncompressed with no length field.
//!
//! Pixels are TPIXELs: red, green and blue bytes when the format is 32bpp
//! depth-24 with full-byte channels, the full pixel word otherwise.

use flate2::{Decompress, FlushDecompress, Status};
use log::{debug, warn};

use super::DecodeStatus;
use crate::framebuffer::{argb, Framebuffer};
use crate::protocol::{
    read_compact_length, PixelFormat, Rectangle, TIGHT_EXPLICIT_FILTER, TIGHT_FILL,
    TIGHT_FILTER_COPY, TIGHT_FILTER_GRADIENT, TIGHT_FILTER_PALETTE, TIGHT_JPEG,
    TIGHT_MIN_BYTES_TO_COMPRESS,
};
use crate::translate::PixelTranslator;
use crate::wire::WireReader;

/// Decoder for Tight rectangles, owning the four persistent inflate streams.
pub(crate) struct TightDecoder {
    streams: [Option<Decompress>; 4],
}

impl TightDecoder {
    pub(crate) fn new() -> Self {
        Self {
            streams: [None, None, None, None],
        }
    }

    /// Decodes one Tight rectangle, deferring until the whole payload is
    /// buffered. Stream resets are applied only once all structural bytes
    /// are present, and each zlib stream is fed a payload exactly once.
    pub(crate) fn decode(
        &mut self,
        buf: &[u8],
        rect: &Rectangle,
        format: &PixelFormat,
        translate: &PixelTranslator,
        fb: &mut Framebuffer,
    ) -> DecodeStatus {
        match self.try_decode(buf, rect, format, translate, fb) {
            Some(status) => status,
            None => DecodeStatus::NeedMore,
        }
    }

    fn try_decode(
        &mut self,
        buf: &[u8],
        rect: &Rectangle,
        format: &PixelFormat,
        translate: &PixelTranslator,
        fb: &mut Framebuffer,
    ) -> Option<DecodeStatus> {
        let mut r = WireReader::new(buf);
        let control = r.get_u8()?;
        let reset_mask = control & 0x0F;
        let subtype = control >> 4;

        if subtype == TIGHT_FILL {
            let colour = read_tpixel(&mut r, format, translate)?;
            self.reset_streams(reset_mask);
            fb.fill_rect(
                u32::from(rect.x),
                u32::from(rect.y),
                u32::from(rect.width),
                u32::from(rect.height),
                colour,
            );
            return Some(DecodeStatus::Done {
                consumed: r.consumed(),
                applied: true,
            });
        }

        if subtype == TIGHT_JPEG {
            let length = read_compact_length(&mut r)? as usize;
            let data = r.get_bytes(length)?;
            self.reset_streams(reset_mask);
            return Some(match decode_jpeg(data) {
                Ok((width, height, rgb)) => {
                    blit_rgb(fb, rect, width, height, &rgb);
                    DecodeStatus::Done {
                        consumed: r.consumed(),
                        applied: true,
                    }
                }
                Err(reason) => DecodeStatus::Failed {
                    consumed: r.consumed(),
                    reason,
                },
            });
        }

        if control & 0x80 != 0 {
            // Subtypes 0xA-0xF are undefined; the payload length is unknowable.
            return Some(DecodeStatus::Failed {
                consumed: r.consumed(),
                reason: format!("unknown tight subtype {subtype:#x}"),
            });
        }

        self.decode_basic(&mut r, control, rect, format, translate, fb)
    }

    /// Basic compression: optional filter byte, then the filtered data either
    /// verbatim (when short) or as a compact length plus zlib data through
    /// the stream selected by the control byte.
    #[allow(clippy::too_many_arguments)]
    fn decode_basic(
        &mut self,
        r: &mut WireReader<'_>,
        control: u8,
        rect: &Rectangle,
        format: &PixelFormat,
        translate: &PixelTranslator,
        fb: &mut Framebuffer,
    ) -> Option<DecodeStatus> {
        let stream_id = usize::from((control >> 4) & 0x03);
        let reset_mask = control & 0x0F;
        let filter = if control & TIGHT_EXPLICIT_FILTER != 0 {
            r.get_u8()?
        } else {
            TIGHT_FILTER_COPY
        };

        let tpixel = format.tpixel_bytes();
        let width = usize::from(rect.width);
        let height = usize::from(rect.height);

        // Length of the filtered (pre-zlib) data, by filter type.
        let data_len = match filter {
            TIGHT_FILTER_COPY | TIGHT_FILTER_GRADIENT => width * height * tpixel,
            TIGHT_FILTER_PALETTE => {
                let colours = usize::from(r.get_u8()?) + 1;
                r.skip(colours * tpixel)?;
                if colours <= 2 {
                    width.div_ceil(8) * height
                } else {
                    width * height
                }
            }
            unknown => {
                return Some(DecodeStatus::Failed {
                    consumed: r.consumed(),
                    reason: format!("unknown tight filter {unknown}"),
                });
            }
        };

        let filtered: Vec<u8> = if data_len < TIGHT_MIN_BYTES_TO_COMPRESS {
            let raw = r.get_bytes(data_len)?;
            self.reset_streams(reset_mask);
            raw.to_vec()
        } else {
            let compressed_len = read_compact_length(r)? as usize;
            let compressed = r.get_bytes(compressed_len)?;
            self.reset_streams(reset_mask);
            match self.inflate(stream_id, compressed, data_len) {
                Ok(data) => data,
                Err(reason) => {
                    return Some(DecodeStatus::Failed {
                        consumed: r.consumed(),
                        reason,
                    });
                }
            }
        };
        let consumed = r.consumed();

        match filter {
            TIGHT_FILTER_COPY => {
                let mut pixels = WireReader::new(&filtered);
                for dy in 0..u32::from(rect.height) {
                    for dx in 0..u32::from(rect.width) {
                        let Some(colour) = read_tpixel(&mut pixels, format, translate) else {
                            return Some(DecodeStatus::Failed {
                                consumed,
                                reason: "tight pixel data shorter than expected".into(),
                            });
                        };
                        fb.set_pixel(u32::from(rect.x) + dx, u32::from(rect.y) + dy, colour);
                    }
                }
                Some(DecodeStatus::Done {
                    consumed,
                    applied: true,
                })
            }
            TIGHT_FILTER_PALETTE => {
                warn!("tight palette filter not implemented, skipping rectangle");
                Some(DecodeStatus::Done {
                    consumed,
                    applied: false,
                })
            }
            TIGHT_FILTER_GRADIENT => {
                warn!("tight gradient filter not implemented, skipping rectangle");
                Some(DecodeStatus::Done {
                    consumed,
                    applied: false,
                })
            }
            _ => unreachable!("filter validated above"),
        }
    }

    /// Drops every stream whose reset flag is set; it is recreated lazily on
    /// next use, which is what ends and reinitializes the inflate context.
    fn reset_streams(&mut self, reset_mask: u8) {
        for (id, stream) in self.streams.iter_mut().enumerate() {
            if reset_mask & (1 << id) != 0 && stream.is_some() {
                debug!("resetting tight zlib stream {id}");
                *stream = None;
            }
        }
    }

    /// Feeds one rectangle's compressed bytes through the selected stream,
    /// expecting exactly `expected` bytes out. All input is consumed even
    /// after the output is complete so the stream position stays aligned
    /// with the server's compressor.
    fn inflate(
        &mut self,
        stream_id: usize,
        input: &[u8],
        expected: usize,
    ) -> Result<Vec<u8>, String> {
        let stream = self.streams[stream_id].get_or_insert_with(|| Decompress::new(true));
        let mut out = vec![0u8; expected];
        let mut scratch = [0u8; 64];
        let mut in_pos = 0;
        let mut out_pos = 0;

        while in_pos < input.len() {
            let before_in = stream.total_in();
            let before_out = stream.total_out();
            let status = if out_pos < expected {
                stream.decompress(&input[in_pos..], &mut out[out_pos..], FlushDecompress::Sync)
            } else {
                stream.decompress(&input[in_pos..], &mut scratch, FlushDecompress::Sync)
            }
            .map_err(|e| format!("zlib inflate failed on stream {stream_id}: {e}"))?;
            let consumed = (stream.total_in() - before_in) as usize;
            let produced = (stream.total_out() - before_out) as usize;
            if out_pos >= expected && produced > 0 {
                return Err(format!(
                    "tight payload inflated past the expected {expected} bytes"
                ));
            }
            in_pos += consumed;
            out_pos += produced;

            match status {
                Status::StreamEnd => break,
                Status::Ok | Status::BufError => {
                    if consumed == 0 && produced == 0 {
                        return Err("zlib inflate made no progress".into());
                    }
                }
            }
        }

        if out_pos < expected {
            return Err(format!(
                "tight payload inflated short: {out_pos} of {expected} bytes"
            ));
        }
        Ok(out)
    }
}

/// Reads one TPIXEL and translates it to ARGB.
fn read_tpixel(
    r: &mut WireReader<'_>,
    format: &PixelFormat,
    translate: &PixelTranslator,
) -> Option<u32> {
    if format.tight_compact_pixels() {
        let bytes = r.get_bytes(3)?;
        Some(argb(bytes[0], bytes[1], bytes[2]))
    } else {
        let word = r.get_pixel_le(format.bytes_per_pixel())?;
        Some(translate.argb(word))
    }
}

/// Decodes a JPEG blob into (width, height, packed RGB bytes).
fn decode_jpeg(data: &[u8]) -> Result<(u16, u16, Vec<u8>), String> {
    let mut decoder = jpeg_decoder::Decoder::new(std::io::Cursor::new(data));
    let pixels = decoder
        .decode()
        .map_err(|e| format!("jpeg decode failed: {e}"))?;
    let info = decoder
        .info()
        .ok_or_else(|| "jpeg image info missing".to_string())?;
    match info.pixel_format {
        jpeg_decoder::PixelFormat::RGB24 => Ok((info.width, info.height, pixels)),
        jpeg_decoder::PixelFormat::L8 => {
            let mut rgb = Vec::with_capacity(pixels.len() * 3);
            for luma in pixels {
                rgb.extend_from_slice(&[luma, luma, luma]);
            }
            Ok((info.width, info.height, rgb))
        }
        other => Err(format!("unsupported jpeg pixel format {other:?}")),
    }
}

/// Copies a decoded RGB image into the framebuffer at the rectangle origin.
fn blit_rgb(fb: &mut Framebuffer, rect: &Rectangle, width: u16, height: u16, rgb: &[u8]) {
    for y in 0..u32::from(height) {
        for x in 0..u32::from(width) {
            let idx = (y as usize * usize::from(width) + x as usize) * 3;
            if idx + 2 >= rgb.len() {
                return;
            }
            fb.set_pixel(
                u32::from(rect.x) + x,
                u32::from(rect.y) + y,
                argb(rgb[idx], rgb[idx + 1], rgb[idx + 2]),
            );
        }
    }
}
