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

//! Session events that can be observed by the application.

use crate::protocol::{ProtocolVersion, SecurityType};

/// Events emitted by the VNC session.
///
/// Events queue inside the session in the order they occur and are drained
/// with [`crate::VncSession::poll_event`]; the tokio driver forwards them
/// over a channel instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The transport connected (true) or disconnected / failed (false).
    ConnectionState(bool),

    /// The protocol version was negotiated.
    ProtocolVersion(ProtocolVersion),

    /// The security type was negotiated.
    SecurityType(SecurityType),

    /// The framebuffer dimensions became known. Emitted once per session,
    /// when the ServerInit message arrives.
    FramebufferSize {
        /// Width in pixels.
        width: u16,
        /// Height in pixels.
        height: u16,
    },

    /// A rectangle of the framebuffer was repainted by a decoder.
    RegionChanged {
        /// X coordinate of the top-left corner.
        x: u16,
        /// Y coordinate of the top-left corner.
        y: u16,
        /// Width of the repainted region.
        width: u16,
        /// Height of the repainted region.
        height: u16,
    },
}
