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

//! Async pump between a session and any tokio byte stream.
//!
//! The protocol core is synchronous and event-driven; this module supplies
//! the I/O loop for hosts that live on tokio. It accepts any stream that
//! implements `AsyncRead + AsyncWrite + Unpin` - a `TcpStream`, a TLS
//! wrapper, a Unix socket - feeds received bytes to the session, flushes the
//! session's queued client messages, and forwards session events over an
//! unbounded channel.

use bytes::BytesMut;
use log::debug;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::events::SessionEvent;
use crate::input::Key;
use crate::session::VncSession;
use crate::transport::BufferTransport;

/// Input commands a host can inject while the driver owns the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputCommand {
    /// A key press or release.
    Key {
        /// The key identity.
        key: Key,
        /// True on press, false on release.
        down: bool,
    },
    /// A pointer move, press or release with the current button mask.
    Pointer {
        /// X coordinate in framebuffer space.
        x: u16,
        /// Y coordinate in framebuffer space.
        y: u16,
        /// Mask of currently held buttons.
        buttons: u8,
    },
}

/// Drives a session over an async stream until the peer closes it.
///
/// Returns the session so the host can inspect the final framebuffer or
/// reattach a fresh transport later.
///
/// # Errors
///
/// Returns any I/O error raised by the underlying stream.
pub async fn run_session<S>(
    mut session: VncSession,
    stream: S,
    events: mpsc::UnboundedSender<SessionEvent>,
    mut input: mpsc::UnboundedReceiver<InputCommand>,
) -> Result<VncSession, std::io::Error>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let transport = BufferTransport::new();
    session.attach_transport(Box::new(transport.clone()));
    session.transport_connected();

    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut buf = BytesMut::with_capacity(4096);
    let mut input_open = true;

    loop {
        // Forward whatever the last step produced before sleeping again.
        while let Some(event) = session.poll_event() {
            let _ = events.send(event);
        }
        let outgoing = transport.take_outgoing();
        if !outgoing.is_empty() {
            writer.write_all(&outgoing).await?;
            writer.flush().await?;
        }

        tokio::select! {
            result = reader.read_buf(&mut buf) => {
                let count = result?;
                if count == 0 {
                    debug!("server closed the connection");
                    session.transport_disconnected();
                    while let Some(event) = session.poll_event() {
                        let _ = events.send(event);
                    }
                    session.detach_transport();
                    return Ok(session);
                }
                transport.push_incoming(&buf);
                buf.clear();
                session.data_ready();
            }
            command = input.recv(), if input_open => {
                match command {
                    Some(InputCommand::Key { key, down }) => session.send_key(key, down),
                    Some(InputCommand::Pointer { x, y, buttons }) => {
                        session.send_pointer(x, y, buttons);
                    }
                    None => input_open = false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SecurityType;

    #[tokio::test]
    async fn drives_a_scripted_handshake_to_running() {
        let (client, mut server) = tokio::io::duplex(4096);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (_input_tx, input_rx) = mpsc::unbounded_channel();

        let driver = tokio::spawn(run_session(VncSession::new(), client, event_tx, input_rx));

        // Scripted server: version, security None, ServerInit 2x1, then EOF.
        let mut script = Vec::new();
        script.extend_from_slice(b"RFB 003.003\n");
        script.extend_from_slice(&1u32.to_be_bytes());
        script.extend_from_slice(&2u16.to_be_bytes());
        script.extend_from_slice(&1u16.to_be_bytes());
        script.extend_from_slice(&[32, 24, 0, 1]);
        script.extend_from_slice(&255u16.to_be_bytes());
        script.extend_from_slice(&255u16.to_be_bytes());
        script.extend_from_slice(&255u16.to_be_bytes());
        script.extend_from_slice(&[16, 8, 0, 0, 0, 0]);
        script.extend_from_slice(&1u32.to_be_bytes());
        script.extend_from_slice(b"x");

        server.write_all(&script).await.unwrap();

        // Drain the client's replies until the full-update request arrives.
        let mut replies = Vec::new();
        let mut chunk = [0u8; 256];
        while replies.len() < 12 + 1 + 20 + 20 + 10 {
            let n = server.read(&mut chunk).await.unwrap();
            replies.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(&replies[..12], b"RFB 003.003\n");

        drop(server); // EOF ends the driver
        let session = driver.await.unwrap().unwrap();
        assert_eq!(session.security_type(), SecurityType::None);
        assert_eq!(session.framebuffer_size(), (2, 1));

        let mut saw_size = false;
        while let Ok(event) = event_rx.try_recv() {
            if matches!(event, SessionEvent::FramebufferSize { width: 2, height: 1 }) {
                saw_size = true;
            }
        }
        assert!(saw_size);
    }
}
