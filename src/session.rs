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

//! VNC client session handling and protocol state machine.
//!
//! This module drives one RFB session from version negotiation through
//! continuous framebuffer updates:
//! - RFB protocol handshake and security negotiation
//! - Server message dispatch and rectangle decoding
//! - Client messages (update requests, input events, encoding preferences)
//!
//! # Protocol Flow
//!
//! 1. **Handshake**: Protocol version exchange and security negotiation
//! 2. **Initialization**: ClientInit/ServerInit and framebuffer setup
//! 3. **Message Loop**: Decode framebuffer updates, solicit the next one
//!
//! The session is driven solely by notifications from the host: it never
//! blocks on I/O. Incoming bytes accumulate in an inbox and every parse is
//! transactional; when a handler needs more bytes than are buffered it
//! leaves the inbox untouched and waits for the next data-ready call, so
//! byte-at-a-time delivery reaches exactly the same state as one big read.

use std::collections::VecDeque;

use bytes::{Buf, BytesMut};
use log::{debug, error, info, warn};

use crate::encoding::{hextile, raw, tight::TightDecoder, zrle::ZrleDecoder, DecodeStatus};
use crate::events::SessionEvent;
use crate::framebuffer::Framebuffer;
use crate::input::{self, Key};
use crate::protocol::{
    self, PixelFormat, ProtocolVersion, Rectangle, SecurityType, ServerInit, ENCODING_HEXTILE,
    ENCODING_RAW, ENCODING_TIGHT, ENCODING_ZRLE, PREFERRED_ENCODINGS, PROTOCOL_VERSION,
    SECURITY_TYPE_NONE, SERVER_MSG_FRAMEBUFFER_UPDATE,
};
use crate::translate::PixelTranslator;
use crate::transport::Transport;
use crate::wire::WireReader;

/// Handshake and operating states of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the server's 12-byte protocol version string.
    ProtocolVersion,
    /// Waiting for the security type (3.3) or security type list (3.7/3.8).
    Security,
    /// Waiting for the u32 security result (3.8 only).
    SecurityResult,
    /// About to send the shared-session flag.
    ClientInit,
    /// Waiting for the ServerInit message.
    ServerInit,
    /// Normal operation: decoding framebuffer updates.
    Running,
    /// Terminal failure; incoming bytes are drained and ignored.
    Failed,
}

/// Progress through one FramebufferUpdate message, kept across deferrals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdatePhase {
    /// Waiting for the next server message header.
    Idle,
    /// Waiting for `remaining` more rectangles of the current update.
    Rects { remaining: u16 },
}

/// Everything that only exists once ServerInit has been parsed.
struct Screen {
    format: PixelFormat,
    translate: PixelTranslator,
    framebuffer: Framebuffer,
}

/// A VNC client protocol session.
///
/// The session owns the framebuffer, the pixel format, the handshake state
/// and the decoders' zlib contexts, and is bound to at most one transport at
/// a time. The host wires it up like this:
///
/// ```no_run
/// use rustvncclient::{BufferTransport, SessionEvent, VncSession};
///
/// let transport = BufferTransport::new();
/// let mut session = VncSession::new();
/// session.attach_transport(Box::new(transport.clone()));
/// session.transport_connected();
/// // ... on every data-ready moment:
/// session.data_ready();
/// while let Some(event) = session.poll_event() {
///     match event {
///         SessionEvent::RegionChanged { .. } => { /* repaint */ }
///         _ => {}
///     }
/// }
/// ```
pub struct VncSession {
    state: SessionState,
    protocol_version: ProtocolVersion,
    security_type: SecurityType,
    screen: Option<Screen>,
    inbox: BytesMut,
    phase: UpdatePhase,
    zrle: ZrleDecoder,
    tight: TightDecoder,
    events: VecDeque<SessionEvent>,
    transport: Option<Box<dyn Transport>>,
}

impl Default for VncSession {
    fn default() -> Self {
        Self::new()
    }
}

impl VncSession {
    /// Creates a session with no transport attached.
    pub fn new() -> Self {
        Self {
            state: SessionState::ProtocolVersion,
            protocol_version: ProtocolVersion::Unknown,
            security_type: SecurityType::Unknown,
            screen: None,
            inbox: BytesMut::with_capacity(4096),
            phase: UpdatePhase::Idle,
            zrle: ZrleDecoder::new(),
            tight: TightDecoder::new(),
            events: VecDeque::new(),
            transport: None,
        }
    }

    /// Binds the session to a transport. The handshake starts when the host
    /// reports the transport connected.
    pub fn attach_transport(&mut self, transport: Box<dyn Transport>) {
        self.transport = Some(transport);
    }

    /// Unbinds and returns the transport, aborting any in-flight rectangle.
    /// The framebuffer keeps its last consistent contents and the session
    /// can be attached again later.
    pub fn detach_transport(&mut self) -> Option<Box<dyn Transport>> {
        self.phase = UpdatePhase::Idle;
        self.inbox.clear();
        self.transport.take()
    }

    /// Tells the session its transport connected. Restarts the handshake
    /// with fresh protocol and zlib state.
    pub fn transport_connected(&mut self) {
        info!("connected to VNC server");
        self.events.push_back(SessionEvent::ConnectionState(true));
        self.state = SessionState::ProtocolVersion;
        self.protocol_version = ProtocolVersion::Unknown;
        self.security_type = SecurityType::Unknown;
        self.phase = UpdatePhase::Idle;
        self.inbox.clear();
        self.zrle = ZrleDecoder::new();
        self.tight = TightDecoder::new();
        self.process();
    }

    /// Tells the session its transport disconnected.
    pub fn transport_disconnected(&mut self) {
        info!("disconnected from VNC server");
        self.phase = UpdatePhase::Idle;
        self.inbox.clear();
        self.events.push_back(SessionEvent::ConnectionState(false));
    }

    /// Tells the session new bytes are readable on the transport. Drains
    /// them into the inbox and runs the dispatcher.
    pub fn data_ready(&mut self) {
        while let Some(transport) = self.transport.as_mut() {
            let readable = transport.readable();
            if readable == 0 {
                break;
            }
            let mut chunk = vec![0u8; readable.min(64 * 1024)];
            match transport.read(&mut chunk) {
                Ok(0) => break,
                Ok(count) => self.inbox.extend_from_slice(&chunk[..count]),
                Err(e) => {
                    error!("transport read failed: {e}");
                    self.fail("transport read failure");
                    return;
                }
            }
        }
        self.process();
    }

    /// Current state of the session.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The negotiated protocol version.
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    /// The negotiated security type.
    pub fn security_type(&self) -> SecurityType {
        self.security_type
    }

    /// Framebuffer dimensions, or (0, 0) before ServerInit.
    pub fn framebuffer_size(&self) -> (u16, u16) {
        self.screen
            .as_ref()
            .map_or((0, 0), |s| (s.framebuffer.width(), s.framebuffer.height()))
    }

    /// A cheap read-only view of the framebuffer.
    pub fn framebuffer(&self) -> Option<&Framebuffer> {
        self.screen.as_ref().map(|s| &s.framebuffer)
    }

    /// The pixel format the server advertised.
    pub fn pixel_format(&self) -> Option<&PixelFormat> {
        self.screen.as_ref().map(|s| &s.format)
    }

    /// A packed RGB copy of the framebuffer.
    pub fn snapshot_rgb(&self) -> Option<Vec<u8>> {
        self.screen.as_ref().map(|s| s.framebuffer.snapshot_rgb())
    }

    /// Takes the next queued session event.
    pub fn poll_event(&mut self) -> Option<SessionEvent> {
        self.events.pop_front()
    }

    /// Sends a key press or release to the server.
    pub fn send_key(&mut self, key: Key, down: bool) {
        let keysym = input::keysym(key);
        debug!("key event: {key:?} down={down} keysym={keysym:#06x}");
        let mut buf = BytesMut::with_capacity(8);
        protocol::key_event(&mut buf, down, keysym);
        self.send(&buf);
    }

    /// Sends a pointer position with the mask of currently held buttons
    /// (bit 0 left, bit 1 middle, bit 2 right). Called on every move and on
    /// every press or release.
    pub fn send_pointer(&mut self, x: u16, y: u16, button_mask: u8) {
        let mut buf = BytesMut::with_capacity(6);
        protocol::pointer_event(&mut buf, button_mask, x, y);
        self.send(&buf);
    }

    /// Main state machine dispatcher. Runs handlers until nothing makes
    /// progress anymore, which is how one data-ready call can carry a whole
    /// batch of messages.
    fn process(&mut self) {
        loop {
            let state = self.state;
            let phase = self.phase;
            let buffered = self.inbox.len();
            match state {
                SessionState::ProtocolVersion => self.parse_protocol_version(),
                SessionState::Security => self.parse_security(),
                SessionState::SecurityResult => self.parse_security_result(),
                SessionState::ClientInit => self.client_init(),
                SessionState::ServerInit => self.parse_server_init(),
                SessionState::Running => self.parse_server_messages(),
                SessionState::Failed => {
                    if !self.inbox.is_empty() {
                        debug!("discarding {} bytes in failed state", self.inbox.len());
                        self.inbox.clear();
                    }
                }
            }
            if self.state == state && self.phase == phase && self.inbox.len() == buffered {
                break;
            }
        }
    }

    fn parse_protocol_version(&mut self) {
        if self.inbox.len() < 12 {
            debug!(
                "waiting for protocol version ({} of 12 bytes)",
                self.inbox.len()
            );
            return;
        }
        let value = self.inbox.split_to(12);
        match ProtocolVersion::parse(&value) {
            Some(announced) => {
                info!("server announced {announced:?}, answering with RFB 003.003");
                // 3.7 and 3.8 are understood but not spoken: everything
                // downgrades to 3.3 semantics.
                self.set_protocol_version(ProtocolVersion::V3_3);
            }
            None => {
                warn!("unsupported protocol version: {:02x?}", &value[..]);
                self.fail("malformed protocol version");
            }
        }
    }

    fn set_protocol_version(&mut self, version: ProtocolVersion) {
        if self.protocol_version == version {
            return;
        }
        self.protocol_version = version;
        self.events.push_back(SessionEvent::ProtocolVersion(version));
        if version != ProtocolVersion::Unknown {
            self.send(PROTOCOL_VERSION);
            self.state = SessionState::Security;
        }
    }

    fn parse_security(&mut self) {
        match self.protocol_version {
            ProtocolVersion::V3_3 => self.parse_security_33(),
            ProtocolVersion::V3_7 | ProtocolVersion::V3_8 => self.parse_security_37(),
            ProtocolVersion::Unknown => {}
        }
    }

    /// RFB 3.3: the server dictates the security type as a u32.
    fn parse_security_33(&mut self) {
        let mut r = WireReader::new(&self.inbox);
        let Some(value) = r.get_u32_be() else {
            return;
        };
        let security = SecurityType::from_wire(value);
        if security == SecurityType::Invalid {
            // The rejection reason follows; take both in one transaction.
            let Some(reason) = read_reason_string(&mut r) else {
                return;
            };
            let consumed = r.consumed();
            self.inbox.advance(consumed);
            warn!("security failure reason: {reason}");
        } else {
            self.inbox.advance(4);
        }
        self.set_security_type(security);
    }

    /// RFB 3.7/3.8: the server offers a list and the client chooses.
    fn parse_security_37(&mut self) {
        let mut r = WireReader::new(&self.inbox);
        let Some(count) = r.get_u8() else {
            return;
        };
        if count == 0 {
            let Some(reason) = read_reason_string(&mut r) else {
                return;
            };
            let consumed = r.consumed();
            self.inbox.advance(consumed);
            warn!("no security types offered: {reason}");
            self.set_security_type(SecurityType::Invalid);
            return;
        }
        let Some(types) = r.get_bytes(usize::from(count)) else {
            return;
        };
        let chosen = if types.contains(&(SECURITY_TYPE_NONE as u8)) {
            SecurityType::None
        } else {
            SecurityType::Invalid
        };
        let consumed = r.consumed();
        self.inbox.advance(consumed);
        self.set_security_type(chosen);
    }

    fn set_security_type(&mut self, security: SecurityType) {
        if self.security_type != security {
            self.security_type = security;
            self.events.push_back(SessionEvent::SecurityType(security));
        }
        match security {
            SecurityType::None => match self.protocol_version {
                ProtocolVersion::V3_3 => {
                    self.state = SessionState::ClientInit;
                }
                ProtocolVersion::V3_7 => {
                    // No SecurityResult follows for type None in 3.7.
                    self.send(&[SECURITY_TYPE_NONE as u8]);
                    self.state = SessionState::ClientInit;
                }
                ProtocolVersion::V3_8 => {
                    self.send(&[SECURITY_TYPE_NONE as u8]);
                    self.state = SessionState::SecurityResult;
                }
                ProtocolVersion::Unknown => {}
            },
            SecurityType::Invalid => self.fail("security handshake rejected by server"),
            SecurityType::Unknown => {}
            other => {
                warn!("security type {other:?} not supported");
                self.fail("unsupported security type");
            }
        }
    }

    /// RFB 3.8 only: u32 status, nonzero followed by a reason string.
    fn parse_security_result(&mut self) {
        let mut r = WireReader::new(&self.inbox);
        let Some(status) = r.get_u32_be() else {
            return;
        };
        if status == 0 {
            self.inbox.advance(4);
            self.state = SessionState::ClientInit;
        } else {
            let Some(reason) = read_reason_string(&mut r) else {
                return;
            };
            let consumed = r.consumed();
            self.inbox.advance(consumed);
            warn!("security handshake failed: {reason}");
            self.fail("security handshake failed");
        }
    }

    fn client_init(&mut self) {
        let shared_flag = 1u8;
        self.send(&[shared_flag]);
        self.state = SessionState::ServerInit;
    }

    fn parse_server_init(&mut self) {
        let (init, consumed) = {
            let mut r = WireReader::new(&self.inbox);
            match ServerInit::read_from(&mut r) {
                Some(init) => (init, r.consumed()),
                None => {
                    debug!(
                        "waiting for server init ({} bytes buffered)",
                        self.inbox.len()
                    );
                    return;
                }
            }
        };
        self.inbox.advance(consumed);

        debug!(
            "framebuffer size: {}x{}",
            init.framebuffer_width, init.framebuffer_height
        );
        debug!(
            "pixel format: {}bpp depth={} bigEndian={} trueColour={} \
             R={}<<{} G={}<<{} B={}<<{}",
            init.pixel_format.bits_per_pixel,
            init.pixel_format.depth,
            init.pixel_format.big_endian_flag,
            init.pixel_format.true_colour_flag,
            init.pixel_format.red_max,
            init.pixel_format.red_shift,
            init.pixel_format.green_max,
            init.pixel_format.green_shift,
            init.pixel_format.blue_max,
            init.pixel_format.blue_shift,
        );
        debug!("server name: {:?}", init.name);

        if init.framebuffer_width == 0 || init.framebuffer_height == 0 {
            self.fail("server advertised an empty framebuffer");
            return;
        }
        if !init.pixel_format.is_valid() {
            warn!(
                "{} bits per pixel not supported",
                init.pixel_format.bits_per_pixel
            );
            self.fail("unsupported pixel format");
            return;
        }

        let width = init.framebuffer_width;
        let height = init.framebuffer_height;
        self.screen = Some(Screen {
            translate: PixelTranslator::new(&init.pixel_format),
            framebuffer: Framebuffer::new(width, height),
            format: init.pixel_format.clone(),
        });
        self.events
            .push_back(SessionEvent::FramebufferSize { width, height });
        self.state = SessionState::Running;

        // Echo the server's format, advertise encodings, ask for everything.
        let mut buf = BytesMut::new();
        protocol::set_pixel_format(&mut buf, &init.pixel_format);
        protocol::set_encodings(&mut buf, &PREFERRED_ENCODINGS);
        protocol::framebuffer_update_request(&mut buf, false, 0, 0, width, height);
        self.send(&buf);
    }

    /// Dispatches one server message or one rectangle per call; the process
    /// loop re-enters until nothing more is buffered.
    fn parse_server_messages(&mut self) {
        match self.phase {
            UpdatePhase::Idle => {
                let Some(&message_type) = self.inbox.first() else {
                    return;
                };
                if message_type != SERVER_MSG_FRAMEBUFFER_UPDATE {
                    warn!("unknown message type: {message_type}");
                    self.inbox.advance(1);
                    return;
                }
                let mut r = WireReader::new(&self.inbox);
                let Some(_) = r.skip(2) else { return }; // message type + padding
                let Some(count) = r.get_u16_be() else {
                    return;
                };
                let consumed = r.consumed();
                self.inbox.advance(consumed);
                debug!("framebuffer update with {count} rectangles");
                if count == 0 {
                    // A zero-rectangle update is legal; keep the poll going.
                    self.request_update(true);
                } else {
                    self.phase = UpdatePhase::Rects { remaining: count };
                }
            }
            UpdatePhase::Rects { remaining } => self.parse_rectangle(remaining),
        }
    }

    fn parse_rectangle(&mut self, remaining: u16) {
        let (rect, header_len) = {
            let mut r = WireReader::new(&self.inbox);
            match Rectangle::read_from(&mut r) {
                Some(rect) => (rect, r.consumed()),
                None => return,
            }
        };

        let status = match rect.encoding {
            ENCODING_RAW | ENCODING_HEXTILE | ENCODING_ZRLE | ENCODING_TIGHT => {
                let Some(screen) = self.screen.as_mut() else {
                    self.fail("rectangle received before server init");
                    return;
                };
                let payload = &self.inbox[header_len..];
                match rect.encoding {
                    ENCODING_RAW => raw::decode(
                        payload,
                        &rect,
                        &screen.format,
                        &screen.translate,
                        &mut screen.framebuffer,
                    ),
                    ENCODING_HEXTILE => hextile::decode(
                        payload,
                        &rect,
                        &screen.format,
                        &screen.translate,
                        &mut screen.framebuffer,
                    ),
                    ENCODING_ZRLE => self.zrle.decode(
                        payload,
                        &rect,
                        &screen.format,
                        &screen.translate,
                        &mut screen.framebuffer,
                    ),
                    ENCODING_TIGHT => self.tight.decode(
                        payload,
                        &rect,
                        &screen.format,
                        &screen.translate,
                        &mut screen.framebuffer,
                    ),
                    _ => unreachable!("encoding filtered above"),
                }
            }
            other => {
                // Skip this rectangle as we don't understand the encoding;
                // remaining rectangles are still processed.
                warn!("unsupported encoding: {other}");
                DecodeStatus::Done {
                    consumed: 0,
                    applied: false,
                }
            }
        };

        match status {
            DecodeStatus::NeedMore => {}
            DecodeStatus::Done { consumed, applied } => {
                self.inbox.advance(header_len + consumed);
                if applied {
                    self.events.push_back(SessionEvent::RegionChanged {
                        x: rect.x,
                        y: rect.y,
                        width: rect.width,
                        height: rect.height,
                    });
                }
                self.finish_rectangle(remaining);
            }
            DecodeStatus::Failed { consumed, reason } => {
                warn!(
                    "failed to decode {}x{} rectangle at ({}, {}): {reason}; requesting a fresh update",
                    rect.width, rect.height, rect.x, rect.y
                );
                self.inbox.advance(header_len + consumed);
                self.request_update(false);
                self.finish_rectangle(remaining);
            }
        }
    }

    fn finish_rectangle(&mut self, remaining: u16) {
        if remaining <= 1 {
            self.phase = UpdatePhase::Idle;
            // Poll-driven flow control: solicit the next update.
            self.request_update(true);
        } else {
            self.phase = UpdatePhase::Rects {
                remaining: remaining - 1,
            };
        }
    }

    fn request_update(&mut self, incremental: bool) {
        let (width, height) = self.framebuffer_size();
        let mut buf = BytesMut::with_capacity(10);
        protocol::framebuffer_update_request(&mut buf, incremental, 0, 0, width, height);
        self.send(&buf);
    }

    fn send(&mut self, bytes: &[u8]) {
        let Some(transport) = self.transport.as_mut() else {
            debug!("no transport attached, dropping {} bytes", bytes.len());
            return;
        };
        if let Err(e) = transport.write_all(bytes) {
            error!("transport write failed: {e}");
            self.fail("transport write failure");
        }
    }

    fn fail(&mut self, reason: &str) {
        error!("session failed: {reason}");
        if self.state != SessionState::Failed {
            self.state = SessionState::Failed;
            self.events.push_back(SessionEvent::ConnectionState(false));
        }
        self.phase = UpdatePhase::Idle;
        self.inbox.clear();
    }
}

/// Reads a u32-length-prefixed reason string, or `None` until it is fully
/// buffered.
fn read_reason_string(r: &mut WireReader<'_>) -> Option<String> {
    let length = r.get_u32_be()? as usize;
    let bytes = r.get_bytes(length)?;
    Some(String::from_utf8_lossy(bytes).into_owned())
}
