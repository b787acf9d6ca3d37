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

//! Framebuffer encoding decoders.
//!
//! One module per supported wire encoding: Raw, Hextile, ZRLE and Tight.
//! Every decoder consumes a rectangle payload from the session's buffered
//! inbound bytes and writes translated pixels into the framebuffer. Raw and
//! Hextile are stateless; ZRLE and Tight own zlib inflate contexts whose
//! state deliberately survives across rectangles and framebuffer updates.

pub mod hextile;
pub mod raw;
pub mod tight;
pub mod zrle;

/// Result of attempting to decode one rectangle payload.
///
/// Decoders never block: until the whole payload is buffered they report
/// [`DecodeStatus::NeedMore`] without consuming a byte, touching a pixel or
/// feeding a zlib stream, so the session can simply retry on the next
/// data-ready notification.
#[derive(Debug)]
pub(crate) enum DecodeStatus {
    /// The full payload has not arrived yet; nothing was consumed.
    NeedMore,
    /// The payload was consumed. `applied` is false when the rectangle was
    /// structurally skipped (unsupported feature) and must not produce a
    /// region-changed notification.
    Done { consumed: usize, applied: bool },
    /// A codec rejected the payload. The bytes were still consumed so the
    /// wire stays in sync, and no pixel was written; the session logs the
    /// reason and solicits a fresh full update.
    Failed { consumed: usize, reason: String },
}
