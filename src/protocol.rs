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

//! VNC Remote Framebuffer (RFB) protocol constants and structures.
//!
//! This module provides the fundamental building blocks for VNC protocol
//! communication from the client side: protocol version negotiation, message
//! types, security handshakes, encodings, and pixel format definitions. It
//! implements the RFB protocol as specified in RFC 6143.
//!
//! # Protocol Overview
//!
//! The VNC RFB protocol operates in the following phases:
//! 1. **Protocol Version** - Server and client agree on protocol version
//! 2. **Security Handshake** - Authentication method selection and execution
//! 3. **Initialization** - Exchange of framebuffer parameters and capabilities
//! 4. **Normal Operation** - Ongoing message exchange for input events and screen updates

use bytes::{BufMut, BytesMut};

use crate::wire::WireReader;

/// The RFB protocol version string this client speaks.
///
/// The client always answers with protocol version 3.3, downgrading servers
/// that announce 3.7 or 3.8. The version string must be exactly 12 bytes
/// including the newline character as specified by the RFB protocol.
pub const PROTOCOL_VERSION: &[u8; 12] = b"RFB 003.003\n";

// Client-to-Server Message Types

/// Message type: Client requests to change the pixel format.
pub const CLIENT_MSG_SET_PIXEL_FORMAT: u8 = 0;

/// Message type: Client specifies supported encodings.
///
/// The client sends a list of encoding types it supports, ordered by
/// preference. The server will use the first mutually supported encoding.
pub const CLIENT_MSG_SET_ENCODINGS: u8 = 2;

/// Message type: Client requests a framebuffer update.
///
/// The client can request either an incremental update (changes only) or
/// a full refresh of a specified rectangular region.
pub const CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST: u8 = 3;

/// Message type: Client sends a keyboard event.
pub const CLIENT_MSG_KEY_EVENT: u8 = 4;

/// Message type: Client sends a pointer (mouse) event.
pub const CLIENT_MSG_POINTER_EVENT: u8 = 5;

// Server-to-Client Message Types

/// Message type: Server sends a framebuffer update.
///
/// Contains one or more rectangles of pixel data representing screen changes.
/// This is the only server message the client acts on; everything else is
/// logged and tolerated.
pub const SERVER_MSG_FRAMEBUFFER_UPDATE: u8 = 0;

// Encoding Types

/// Encoding type: Raw pixel data (no compression).
pub const ENCODING_RAW: i32 = 0;

/// Encoding type: Hextile (16x16 tiles with per-tile subencodings).
pub const ENCODING_HEXTILE: i32 = 5;

/// Encoding type: Tight (zlib streams, palette filters and JPEG).
pub const ENCODING_TIGHT: i32 = 7;

/// Encoding type: ZRLE (Zlib Run-Length Encoding, 64x64 tiles).
pub const ENCODING_ZRLE: i32 = 16;

/// The encodings advertised to the server, in order of preference.
pub const PREFERRED_ENCODINGS: [i32; 4] =
    [ENCODING_TIGHT, ENCODING_ZRLE, ENCODING_HEXTILE, ENCODING_RAW];

// Hextile subencoding mask bits

/// Hextile: the entire tile follows as raw pixels; other bits are ignored.
pub const HEXTILE_RAW: u8 = 0x01;
/// Hextile: one pixel follows setting the tile background colour.
pub const HEXTILE_BACKGROUND_SPECIFIED: u8 = 0x02;
/// Hextile: one pixel follows setting the tile foreground colour.
pub const HEXTILE_FOREGROUND_SPECIFIED: u8 = 0x04;
/// Hextile: a subrectangle count and that many subrectangles follow.
pub const HEXTILE_ANY_SUBRECTS: u8 = 0x08;
/// Hextile: each subrectangle is prefixed by its own colour.
pub const HEXTILE_SUBRECTS_COLOURED: u8 = 0x10;

// Tight compression control (canonical RFB layout)

/// Tight subtype (high nibble of the control byte): solid fill.
pub const TIGHT_FILL: u8 = 0x08;
/// Tight subtype (high nibble of the control byte): JPEG rectangle.
pub const TIGHT_JPEG: u8 = 0x09;
/// Tight control bit: an explicit filter id byte follows.
pub const TIGHT_EXPLICIT_FILTER: u8 = 0x40;
/// Tight filter: pixels travel unfiltered (the default).
pub const TIGHT_FILTER_COPY: u8 = 0;
/// Tight filter: indexed palette.
pub const TIGHT_FILTER_PALETTE: u8 = 1;
/// Tight filter: gradient prediction.
pub const TIGHT_FILTER_GRADIENT: u8 = 2;
/// Filtered data shorter than this travels uncompressed with no length field.
pub const TIGHT_MIN_BYTES_TO_COMPRESS: usize = 12;

// Security Types

/// Security type: Invalid. The server follows up with a reason string.
pub const SECURITY_TYPE_INVALID: u32 = 0;

/// Security type: None (no authentication).
///
/// No authentication is required. The connection proceeds directly to the
/// initialization phase. This is the only flavour the client honours.
pub const SECURITY_TYPE_NONE: u32 = 1;

/// Security type: VNC Authentication (DES challenge/response). Not supported.
pub const SECURITY_TYPE_VNC_AUTH: u32 = 2;

/// Negotiated RFB protocol version.
///
/// The wire form is exactly 12 ASCII bytes, `"RFB 003.0NN\n"`. The client
/// recognises 3.3, 3.7 and 3.8 but downgrades every offer to 3.3 semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    /// No version negotiated yet.
    Unknown,
    /// RFB 3.3: the server dictates the security type as a u32.
    V3_3,
    /// RFB 3.7: the server offers a security type list; no SecurityResult
    /// follows for type None.
    V3_7,
    /// RFB 3.8: like 3.7, but a SecurityResult always follows.
    V3_8,
}

impl ProtocolVersion {
    /// Parses the 12-byte version string announced by the server.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        match bytes {
            b"RFB 003.003\n" => Some(Self::V3_3),
            b"RFB 003.007\n" => Some(Self::V3_7),
            b"RFB 003.008\n" => Some(Self::V3_8),
            _ => None,
        }
    }
}

/// Security flavour selected during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityType {
    /// Not negotiated yet.
    Unknown,
    /// The server rejected the connection; a reason string follows.
    Invalid,
    /// No authentication.
    None,
    /// Classic DES challenge/response. Recognised but not honoured.
    VncAuth,
    /// Any other registered security type.
    Other(u32),
}

impl SecurityType {
    pub fn from_wire(value: u32) -> Self {
        match value {
            SECURITY_TYPE_INVALID => Self::Invalid,
            SECURITY_TYPE_NONE => Self::None,
            SECURITY_TYPE_VNC_AUTH => Self::VncAuth,
            other => Self::Other(other),
        }
    }
}

/// Describes how pixel values are laid out on the wire.
///
/// This struct follows the RFB protocol specification for pixel format
/// descriptors: 16 bytes covering bit depth, colour channel masks and shifts,
/// and endianness. The `*_max` values are bit masks; a channel value is
/// `(pixel >> shift) & max`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelFormat {
    /// Bits per pixel on the wire (8, 16 or 32 after ServerInit).
    pub bits_per_pixel: u8,
    /// Colour depth in bits.
    pub depth: u8,
    /// 1 if multi-byte pixels are big-endian, 0 if little-endian.
    pub big_endian_flag: u8,
    /// 1 if true colour, 0 if colour-map based.
    pub true_colour_flag: u8,
    /// Maximum red value (mask).
    pub red_max: u16,
    /// Maximum green value (mask).
    pub green_max: u16,
    /// Maximum blue value (mask).
    pub blue_max: u16,
    /// Right shift to extract the red channel.
    pub red_shift: u8,
    /// Right shift to extract the green channel.
    pub green_shift: u8,
    /// Right shift to extract the blue channel.
    pub blue_shift: u8,
}

impl PixelFormat {
    /// Parses the 16-byte wire form. Returns `None` if fewer than 16 bytes
    /// are buffered.
    pub(crate) fn read_from(r: &mut WireReader<'_>) -> Option<Self> {
        let bits_per_pixel = r.get_u8()?;
        let depth = r.get_u8()?;
        let big_endian_flag = r.get_u8()?;
        let true_colour_flag = r.get_u8()?;
        let red_max = r.get_u16_be()?;
        let green_max = r.get_u16_be()?;
        let blue_max = r.get_u16_be()?;
        let red_shift = r.get_u8()?;
        let green_shift = r.get_u8()?;
        let blue_shift = r.get_u8()?;
        r.skip(3)?; // padding
        Some(Self {
            bits_per_pixel,
            depth,
            big_endian_flag,
            true_colour_flag,
            red_max,
            green_max,
            blue_max,
            red_shift,
            green_shift,
            blue_shift,
        })
    }

    /// Serializes the 16-byte wire form.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.bits_per_pixel);
        buf.put_u8(self.depth);
        buf.put_u8(self.big_endian_flag);
        buf.put_u8(self.true_colour_flag);
        buf.put_u16(self.red_max);
        buf.put_u16(self.green_max);
        buf.put_u16(self.blue_max);
        buf.put_u8(self.red_shift);
        buf.put_u8(self.green_shift);
        buf.put_u8(self.blue_shift);
        buf.put_slice(&[0u8; 3]); // padding
    }

    /// A format this client can decode: true colour at 8, 16 or 32 bits.
    pub fn is_valid(&self) -> bool {
        matches!(self.bits_per_pixel, 8 | 16 | 32) && self.true_colour_flag != 0
    }

    pub fn bytes_per_pixel(&self) -> usize {
        usize::from(self.bits_per_pixel) / 8
    }

    /// The maximum pixel word under this format (all channels saturated).
    fn max_pixel_word(&self) -> u32 {
        (u32::from(self.red_max) << self.red_shift)
            | (u32::from(self.green_max) << self.green_shift)
            | (u32::from(self.blue_max) << self.blue_shift)
    }

    /// Whether ZRLE sends a compact 3-byte CPIXEL instead of the full word.
    ///
    /// Per RFB, a 32bpp little-endian format with depth 24 or less whose
    /// channels all fit inside the low three bytes is transmitted as the
    /// three least significant bytes only.
    pub fn zrle_compact_pixels(&self) -> bool {
        self.bits_per_pixel == 32
            && self.depth <= 24
            && self.big_endian_flag == 0
            && self.max_pixel_word() < (1 << 24)
    }

    /// Whether Tight sends a 3-byte TPIXEL (red, green, blue bytes).
    ///
    /// Per RFB, this applies when the format is 32bpp, depth 24, with all
    /// colour maxima at 255.
    pub fn tight_compact_pixels(&self) -> bool {
        self.bits_per_pixel == 32
            && self.depth == 24
            && self.red_max == 255
            && self.green_max == 255
            && self.blue_max == 255
    }

    /// Bytes per ZRLE CPIXEL under this format.
    pub fn cpixel_bytes(&self) -> usize {
        if self.zrle_compact_pixels() {
            3
        } else {
            self.bytes_per_pixel()
        }
    }

    /// Bytes per Tight TPIXEL under this format.
    pub fn tpixel_bytes(&self) -> usize {
        if self.tight_compact_pixels() {
            3
        } else {
            self.bytes_per_pixel()
        }
    }
}

/// A rectangle header in a framebuffer update message.
///
/// Each framebuffer update contains one or more rectangles, each with its own
/// encoding type. The 12-byte header specifies the position, dimensions, and
/// encoding of the pixel data that follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rectangle {
    /// X coordinate of the top-left corner.
    pub x: u16,
    /// Y coordinate of the top-left corner.
    pub y: u16,
    /// Width of the rectangle in pixels.
    pub width: u16,
    /// Height of the rectangle in pixels.
    pub height: u16,
    /// The encoding type used for this rectangle's pixel data.
    pub encoding: i32,
}

impl Rectangle {
    /// Parses the 12-byte header. Returns `None` until all 12 bytes are
    /// buffered.
    pub(crate) fn read_from(r: &mut WireReader<'_>) -> Option<Self> {
        Some(Self {
            x: r.get_u16_be()?,
            y: r.get_u16_be()?,
            width: r.get_u16_be()?,
            height: r.get_u16_be()?,
            encoding: r.get_i32_be()?,
        })
    }

    /// Writes the 12-byte header.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u16(self.x);
        buf.put_u16(self.y);
        buf.put_u16(self.width);
        buf.put_u16(self.height);
        buf.put_i32(self.encoding);
    }
}

/// The `ServerInit` message received at the end of the handshake.
///
/// Provides the framebuffer dimensions, the server's native pixel format and
/// the desktop name.
#[derive(Debug, Clone)]
pub struct ServerInit {
    /// The width of the framebuffer in pixels.
    pub framebuffer_width: u16,
    /// The height of the framebuffer in pixels.
    pub framebuffer_height: u16,
    /// The pixel format used by the framebuffer.
    pub pixel_format: PixelFormat,
    /// The name of the desktop.
    pub name: String,
}

impl ServerInit {
    /// Parses the full message including the variable-length name. Returns
    /// `None` until every byte of it is buffered, consuming nothing in that
    /// case.
    pub(crate) fn read_from(r: &mut WireReader<'_>) -> Option<Self> {
        let framebuffer_width = r.get_u16_be()?;
        let framebuffer_height = r.get_u16_be()?;
        let pixel_format = PixelFormat::read_from(r)?;
        let name_length = r.get_u32_be()? as usize;
        let name_bytes = r.get_bytes(name_length)?;
        Some(Self {
            framebuffer_width,
            framebuffer_height,
            pixel_format,
            name: String::from_utf8_lossy(name_bytes).into_owned(),
        })
    }
}

// Client message builders. Each writes one complete message; the session
// hands the buffer to the transport in submission order.

/// Writes a `SetPixelFormat` message echoing `format` back to the server.
pub fn set_pixel_format(buf: &mut BytesMut, format: &PixelFormat) {
    buf.put_u8(CLIENT_MSG_SET_PIXEL_FORMAT);
    buf.put_slice(&[0u8; 3]); // padding
    format.write_to(buf);
}

/// Writes a `SetEncodings` message advertising `encodings` in preference order.
#[allow(clippy::cast_possible_truncation)] // encoding list length bounded by protocol
pub fn set_encodings(buf: &mut BytesMut, encodings: &[i32]) {
    buf.put_u8(CLIENT_MSG_SET_ENCODINGS);
    buf.put_u8(0); // padding
    buf.put_u16(encodings.len() as u16);
    for encoding in encodings {
        buf.put_i32(*encoding);
    }
}

/// Writes a `FramebufferUpdateRequest` for the given region.
pub fn framebuffer_update_request(
    buf: &mut BytesMut,
    incremental: bool,
    x: u16,
    y: u16,
    width: u16,
    height: u16,
) {
    buf.put_u8(CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST);
    buf.put_u8(u8::from(incremental));
    buf.put_u16(x);
    buf.put_u16(y);
    buf.put_u16(width);
    buf.put_u16(height);
}

/// Writes a `KeyEvent` message for an X11 keysym.
pub fn key_event(buf: &mut BytesMut, down: bool, keysym: u32) {
    buf.put_u8(CLIENT_MSG_KEY_EVENT);
    buf.put_u8(u8::from(down));
    buf.put_slice(&[0u8; 2]); // padding
    buf.put_u32(keysym);
}

/// Writes a `PointerEvent` message.
///
/// `button_mask` bit 0 is the left button, bit 1 middle, bit 2 right.
pub fn pointer_event(buf: &mut BytesMut, button_mask: u8, x: u16, y: u16) {
    buf.put_u8(CLIENT_MSG_POINTER_EVENT);
    buf.put_u8(button_mask);
    buf.put_u16(x);
    buf.put_u16(y);
}

/// Writes a Tight compact length: 1-3 bytes, low seven bits first, with the
/// high bit flagging a continuation byte.
#[allow(clippy::cast_possible_truncation)] // each arm masks to seven or eight bits
pub fn write_compact_length(buf: &mut BytesMut, len: usize) {
    if len < 128 {
        buf.put_u8(len as u8);
    } else if len < 16384 {
        buf.put_u8(((len & 0x7F) | 0x80) as u8);
        buf.put_u8((len >> 7) as u8);
    } else {
        buf.put_u8(((len & 0x7F) | 0x80) as u8);
        buf.put_u8((((len >> 7) & 0x7F) | 0x80) as u8);
        buf.put_u8((len >> 14) as u8);
    }
}

/// Reads a Tight compact length (maximum 3 bytes, 22 bits).
pub(crate) fn read_compact_length(r: &mut WireReader<'_>) -> Option<u32> {
    let b0 = r.get_u8()?;
    let mut len = u32::from(b0 & 0x7F);
    if b0 & 0x80 != 0 {
        let b1 = r.get_u8()?;
        len |= u32::from(b1 & 0x7F) << 7;
        if b1 & 0x80 != 0 {
            let b2 = r.get_u8()?;
            len |= u32::from(b2) << 14;
        }
    }
    Some(len)
}
