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

//! # rustvncclient
//!
//! A pure Rust implementation of a VNC (Virtual Network Computing) client
//! protocol engine.
//!
//! This library drives an RFB (Remote Framebuffer) session from version
//! negotiation through continuous framebuffer updates, translating the
//! server's byte stream into a local pixel buffer and user input into RFB
//! client messages. It implements the protocol as specified in RFC 6143,
//! speaking version 3.3 (servers announcing 3.7 or 3.8 are downgraded).
//!
//! ## Features
//!
//! - **Four encodings**: Raw, Hextile, ZRLE and Tight (including JPEG
//!   rectangles and the four persistent zlib streams)
//! - **Event driven**: the core never blocks; partial reads are deferred
//!   and resumed, so any transport chunking behaves identically
//! - **Transport agnostic**: the session consumes a plain byte-stream
//!   trait; a tokio driver is included for socket hosts
//! - **Memory safe**: pure Rust with no unsafe code
//!
//! ## Quick Start
//!
//! ```no_run
//! use rustvncclient::{run_session, SessionEvent, VncSession};
//! use tokio::net::TcpStream;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stream = TcpStream::connect("127.0.0.1:5900").await?;
//!     let (event_tx, mut event_rx) = mpsc::unbounded_channel();
//!     let (_input_tx, input_rx) = mpsc::unbounded_channel();
//!
//!     tokio::spawn(async move {
//!         while let Some(event) = event_rx.recv().await {
//!             if let SessionEvent::RegionChanged { x, y, width, height } = event {
//!                 println!("repaint {width}x{height} at ({x}, {y})");
//!             }
//!         }
//!     });
//!
//!     let session = run_session(VncSession::new(), stream, event_tx, input_rx).await?;
//!     println!("final framebuffer: {:?}", session.framebuffer_size());
//!     Ok(())
//! }
//! ```

pub mod driver;
mod encoding;
pub mod events;
pub mod framebuffer;
pub mod input;
pub mod protocol;
pub mod session;
pub mod transport;
mod translate;
mod wire;

pub use driver::{run_session, InputCommand};
pub use events::SessionEvent;
pub use framebuffer::Framebuffer;
pub use input::{Key, PointerButton, PointerState};
pub use protocol::{PixelFormat, ProtocolVersion, Rectangle, SecurityType};
pub use session::{SessionState, VncSession};
pub use transport::{BufferTransport, Transport};
