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

//! End-to-end session tests over deterministic byte scripts.
//!
//! Each test plays a scripted server against the session through an
//! in-memory transport and checks the pixels, events and client messages
//! that come out the other side.

use flate2::{Compress, Compression, FlushCompress};
use rustvncclient::framebuffer::argb;
use rustvncclient::{
    BufferTransport, Key, ProtocolVersion, SecurityType, SessionEvent, SessionState, VncSession,
};

/// Scripted ServerInit: 32bpp true colour, depth 24, little endian,
/// channel maxima 255 at shifts 16/8/0, desktop name "x".
fn server_init(width: u16, height: u16) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&width.to_be_bytes());
    out.extend_from_slice(&height.to_be_bytes());
    out.extend_from_slice(&[32, 24, 0, 1]);
    out.extend_from_slice(&255u16.to_be_bytes());
    out.extend_from_slice(&255u16.to_be_bytes());
    out.extend_from_slice(&255u16.to_be_bytes());
    out.extend_from_slice(&[16, 8, 0]);
    out.extend_from_slice(&[0, 0, 0]); // padding
    out.extend_from_slice(&1u32.to_be_bytes());
    out.extend_from_slice(b"x");
    out
}

/// The whole server side of a None-security handshake.
fn handshake_script(width: u16, height: u16) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"RFB 003.008\n");
    out.extend_from_slice(&1u32.to_be_bytes()); // security type None (3.3 style)
    out.extend_from_slice(&server_init(width, height));
    out
}

/// A FramebufferUpdate header for `count` rectangles.
fn update_header(count: u16) -> Vec<u8> {
    let mut out = vec![0u8, 0u8];
    out.extend_from_slice(&count.to_be_bytes());
    out
}

/// A rectangle header.
fn rect_header(x: u16, y: u16, w: u16, h: u16, encoding: i32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&x.to_be_bytes());
    out.extend_from_slice(&y.to_be_bytes());
    out.extend_from_slice(&w.to_be_bytes());
    out.extend_from_slice(&h.to_be_bytes());
    out.extend_from_slice(&encoding.to_be_bytes());
    out
}

/// The client's FramebufferUpdateRequest wire form.
fn update_request(incremental: bool, w: u16, h: u16) -> Vec<u8> {
    let mut out = vec![3u8, u8::from(incremental), 0, 0, 0, 0];
    out.extend_from_slice(&w.to_be_bytes());
    out.extend_from_slice(&h.to_be_bytes());
    out
}

/// Runs the handshake and drains its events and client messages, leaving a
/// session in the Running state.
fn running_session(width: u16, height: u16) -> (VncSession, BufferTransport) {
    let transport = BufferTransport::new();
    let mut session = VncSession::new();
    session.attach_transport(Box::new(transport.clone()));
    session.transport_connected();
    transport.push_incoming(&handshake_script(width, height));
    session.data_ready();
    assert_eq!(session.state(), SessionState::Running);
    while session.poll_event().is_some() {}
    transport.take_outgoing();
    (session, transport)
}

fn drain_events(session: &mut VncSession) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Some(event) = session.poll_event() {
        events.push(event);
    }
    events
}

/// Compresses chunks on one persistent zlib stream, the way a server shares
/// its ZRLE stream across rectangles.
struct StreamEncoder(Compress);

impl StreamEncoder {
    fn new() -> Self {
        Self(Compress::new(Compression::default(), true))
    }

    fn chunk(&mut self, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; data.len() + 256];
        let mut pos = 0;
        loop {
            let before_in = self.0.total_in();
            let before_out = self.0.total_out();
            self.0
                .compress(&data[pos..], &mut buf, FlushCompress::Sync)
                .unwrap();
            pos += (self.0.total_in() - before_in) as usize;
            out.extend_from_slice(&buf[..(self.0.total_out() - before_out) as usize]);
            if pos >= data.len() {
                break;
            }
        }
        out
    }

    /// A full ZRLE rectangle payload: u32 length plus compressed bytes.
    fn zrle_payload(&mut self, tile_data: &[u8]) -> Vec<u8> {
        let compressed = self.chunk(tile_data);
        let mut out = Vec::new();
        out.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
        out.extend_from_slice(&compressed);
        out
    }
}

// Scenario 1: version downgrade and full handshake.
#[test]
fn version_downgrade_handshake_reaches_running() {
    let transport = BufferTransport::new();
    let mut session = VncSession::new();
    session.attach_transport(Box::new(transport.clone()));
    session.transport_connected();

    transport.push_incoming(&handshake_script(4, 2));
    session.data_ready();

    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(session.protocol_version(), ProtocolVersion::V3_3);
    assert_eq!(session.security_type(), SecurityType::None);
    assert_eq!(session.framebuffer_size(), (4, 2));

    // Framebuffer starts out white.
    let fb = session.framebuffer().unwrap();
    assert!(fb.pixels().iter().all(|&px| px == argb(255, 255, 255)));

    // Exactly one size notification, in handshake order.
    let events = drain_events(&mut session);
    assert_eq!(
        events,
        vec![
            SessionEvent::ConnectionState(true),
            SessionEvent::ProtocolVersion(ProtocolVersion::V3_3),
            SessionEvent::SecurityType(SecurityType::None),
            SessionEvent::FramebufferSize {
                width: 4,
                height: 2
            },
        ]
    );

    // Client messages, byte for byte.
    let mut expected = Vec::new();
    expected.extend_from_slice(b"RFB 003.003\n");
    expected.push(0x01); // shared flag
    expected.extend_from_slice(&[0, 0, 0, 0]); // SetPixelFormat + padding
    expected.extend_from_slice(&[32, 24, 0, 1]);
    expected.extend_from_slice(&[0, 255, 0, 255, 0, 255]);
    expected.extend_from_slice(&[16, 8, 0, 0, 0, 0]);
    expected.extend_from_slice(&[2, 0, 0, 4]); // SetEncodings, 4 entries
    expected.extend_from_slice(&7i32.to_be_bytes());
    expected.extend_from_slice(&16i32.to_be_bytes());
    expected.extend_from_slice(&5i32.to_be_bytes());
    expected.extend_from_slice(&0i32.to_be_bytes());
    expected.extend_from_slice(&update_request(false, 4, 2));
    assert_eq!(transport.take_outgoing(), expected);
}

// Scenario 2: a single RAW rectangle.
#[test]
fn raw_rectangle_paints_pixels_and_notifies() {
    let (mut session, transport) = running_session(4, 2);

    let mut script = update_header(1);
    script.extend_from_slice(&rect_header(1, 0, 2, 1, 0));
    script.extend_from_slice(&[0x00, 0x00, 0xFF, 0x00]); // red, little endian
    script.extend_from_slice(&[0x00, 0xFF, 0x00, 0x00]); // green
    transport.push_incoming(&script);
    session.data_ready();

    let fb = session.framebuffer().unwrap();
    assert_eq!(fb.pixel(1, 0), Some(argb(255, 0, 0)));
    assert_eq!(fb.pixel(2, 0), Some(argb(0, 255, 0)));
    assert_eq!(fb.pixel(0, 0), Some(argb(255, 255, 255)));

    assert_eq!(
        drain_events(&mut session),
        vec![SessionEvent::RegionChanged {
            x: 1,
            y: 0,
            width: 2,
            height: 1
        }]
    );
    assert_eq!(transport.take_outgoing(), update_request(true, 4, 2));
}

// Scenario 3: hextile background-only tile.
#[test]
fn hextile_background_tile_fills_white() {
    let (mut session, transport) = running_session(16, 16);

    let mut script = update_header(1);
    script.extend_from_slice(&rect_header(0, 0, 16, 16, 5));
    script.extend_from_slice(&[0x02, 0xFF, 0xFF, 0xFF, 0x00]);
    transport.push_incoming(&script);
    session.data_ready();

    let fb = session.framebuffer().unwrap();
    assert_eq!(fb.pixels().len(), 256);
    assert!(fb.pixels().iter().all(|&px| px == argb(255, 255, 255)));
    assert_eq!(
        drain_events(&mut session),
        vec![SessionEvent::RegionChanged {
            x: 0,
            y: 0,
            width: 16,
            height: 16
        }]
    );
}

// Scenario 4: unsupported encoding skipped, the rest still decoded.
#[test]
fn unsupported_encoding_is_skipped() {
    let (mut session, transport) = running_session(4, 2);

    let mut script = update_header(2);
    script.extend_from_slice(&rect_header(0, 0, 1, 1, 999));
    script.extend_from_slice(&rect_header(0, 0, 1, 1, 0));
    script.extend_from_slice(&[0x00, 0x00, 0xFF, 0x00]);
    transport.push_incoming(&script);
    session.data_ready();

    assert_eq!(session.state(), SessionState::Running);
    let fb = session.framebuffer().unwrap();
    assert_eq!(fb.pixel(0, 0), Some(argb(255, 0, 0)));

    // Exactly one notification: the skipped rectangle emits nothing.
    assert_eq!(
        drain_events(&mut session),
        vec![SessionEvent::RegionChanged {
            x: 0,
            y: 0,
            width: 1,
            height: 1
        }]
    );
    assert_eq!(transport.take_outgoing(), update_request(true, 4, 2));
}

// Scenario 5: byte-at-a-time delivery matches one big read.
#[test]
fn byte_at_a_time_replay_is_equivalent() {
    let mut script = handshake_script(4, 2);
    script.extend_from_slice(&update_header(1));
    script.extend_from_slice(&rect_header(1, 0, 2, 1, 0));
    script.extend_from_slice(&[0x00, 0x00, 0xFF, 0x00]);
    script.extend_from_slice(&[0x00, 0xFF, 0x00, 0x00]);

    let run = |chunked: bool| -> (SessionState, Vec<u32>, Vec<SessionEvent>, Vec<u8>) {
        let transport = BufferTransport::new();
        let mut session = VncSession::new();
        session.attach_transport(Box::new(transport.clone()));
        session.transport_connected();
        if chunked {
            for byte in &script {
                transport.push_incoming(&[*byte]);
                session.data_ready();
            }
        } else {
            transport.push_incoming(&script);
            session.data_ready();
        }
        let pixels = session.framebuffer().unwrap().pixels().to_vec();
        let events = drain_events(&mut session);
        (session.state(), pixels, events, transport.take_outgoing())
    };

    let whole = run(false);
    let chunked = run(true);
    assert_eq!(whole.0, chunked.0);
    assert_eq!(whole.1, chunked.1);
    assert_eq!(whole.2, chunked.2);
    assert_eq!(whole.3, chunked.3);
    assert_eq!(whole.0, SessionState::Running);
    assert_eq!(whole.1[1], argb(255, 0, 0));
    assert_eq!(whole.1[2], argb(0, 255, 0));
}

// Scenario 6: KeyEvent wire image.
#[test]
fn key_event_bytes() {
    let (mut session, transport) = running_session(4, 2);
    session.send_key(Key::Return, true);
    assert_eq!(
        transport.take_outgoing(),
        vec![0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0xFF, 0x0D]
    );
    session.send_key(Key::Return, false);
    assert_eq!(
        transport.take_outgoing(),
        vec![0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF, 0x0D]
    );
}

#[test]
fn pointer_event_bytes() {
    let (mut session, transport) = running_session(4, 2);
    session.send_pointer(3, 1, 0b001);
    assert_eq!(
        transport.take_outgoing(),
        vec![0x05, 0x01, 0x00, 0x03, 0x00, 0x01]
    );
}

// A zero-rectangle update is legal and still elicits the next request.
#[test]
fn empty_update_elicits_next_request() {
    let (mut session, transport) = running_session(4, 2);
    transport.push_incoming(&update_header(0));
    session.data_ready();
    assert!(drain_events(&mut session).is_empty());
    assert_eq!(transport.take_outgoing(), update_request(true, 4, 2));
}

// The ZRLE inflate context spans rectangles: the second rectangle is a
// continuation of the first one's deflate stream.
#[test]
fn zrle_stream_continues_across_rectangles() {
    let (mut session, transport) = running_session(2, 1);
    let mut encoder = StreamEncoder::new();

    let first = encoder.zrle_payload(&[1, 0x00, 0x00, 0xFF]); // solid red
    let second = encoder.zrle_payload(&[1, 0xFF, 0x00, 0x00]); // solid blue

    let mut script = update_header(2);
    script.extend_from_slice(&rect_header(0, 0, 1, 1, 16));
    script.extend_from_slice(&first);
    script.extend_from_slice(&rect_header(1, 0, 1, 1, 16));
    script.extend_from_slice(&second);
    transport.push_incoming(&script);
    session.data_ready();

    let fb = session.framebuffer().unwrap();
    assert_eq!(fb.pixel(0, 0), Some(argb(255, 0, 0)));
    assert_eq!(fb.pixel(1, 0), Some(argb(0, 0, 255)));
    assert_eq!(drain_events(&mut session).len(), 2);
}

// Tight fill through the session.
#[test]
fn tight_fill_rectangle() {
    let (mut session, transport) = running_session(4, 2);

    let mut script = update_header(1);
    script.extend_from_slice(&rect_header(0, 0, 4, 2, 7));
    script.extend_from_slice(&[0x80, 0x12, 0x34, 0x56]);
    transport.push_incoming(&script);
    session.data_ready();

    let fb = session.framebuffer().unwrap();
    assert!(fb.pixels().iter().all(|&px| px == argb(0x12, 0x34, 0x56)));
    assert_eq!(drain_events(&mut session).len(), 1);
    assert_eq!(transport.take_outgoing(), update_request(true, 4, 2));
}

// A codec failure solicits a fresh full update and processing continues.
#[test]
fn codec_failure_requests_full_update_and_continues() {
    let (mut session, transport) = running_session(4, 2);

    let mut script = update_header(2);
    // Tight JPEG rectangle with garbage bytes.
    script.extend_from_slice(&rect_header(0, 0, 1, 1, 7));
    script.push(0x90);
    script.push(4); // compact length
    script.extend_from_slice(b"AAAA");
    // Followed by a valid RAW rectangle.
    script.extend_from_slice(&rect_header(3, 1, 1, 1, 0));
    script.extend_from_slice(&[0x00, 0x00, 0xFF, 0x00]);
    transport.push_incoming(&script);
    session.data_ready();

    assert_eq!(session.state(), SessionState::Running);
    let fb = session.framebuffer().unwrap();
    assert_eq!(fb.pixel(3, 1), Some(argb(255, 0, 0)));
    // Only the RAW rectangle notified.
    assert_eq!(
        drain_events(&mut session),
        vec![SessionEvent::RegionChanged {
            x: 3,
            y: 1,
            width: 1,
            height: 1
        }]
    );

    // The failure asked for a full refresh, then the update completed with
    // the usual incremental request.
    let mut expected = update_request(false, 4, 2);
    expected.extend_from_slice(&update_request(true, 4, 2));
    assert_eq!(transport.take_outgoing(), expected);
}

// Disconnecting mid-rectangle leaves the last consistent image and the
// session can be reattached for a fresh handshake.
#[test]
fn reattach_after_disconnect_restarts_handshake() {
    let (mut session, transport) = running_session(4, 2);

    // A truncated RAW rectangle sits in the inbox.
    let mut script = update_header(1);
    script.extend_from_slice(&rect_header(0, 0, 2, 1, 0));
    script.extend_from_slice(&[0x00, 0x00]); // half a pixel
    transport.push_incoming(&script);
    session.data_ready();
    session.transport_disconnected();
    assert_eq!(
        drain_events(&mut session),
        vec![SessionEvent::ConnectionState(false)]
    );

    // The image kept its last consistent contents.
    assert!(session
        .framebuffer()
        .unwrap()
        .pixels()
        .iter()
        .all(|&px| px == argb(255, 255, 255)));

    // Reconnect and handshake again on the same session.
    session.transport_connected();
    transport.take_outgoing();
    transport.push_incoming(&handshake_script(8, 8));
    session.data_ready();
    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(session.framebuffer_size(), (8, 8));
}
