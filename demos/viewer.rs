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

//! Headless VNC viewer demonstration.
//!
//! Connects to a VNC server, runs the protocol session, and reports what it
//! sees: the negotiated parameters, the framebuffer size and every repainted
//! region. Useful for checking a server end to end without a GUI shell.
//!
//! Usage:
//!   cargo run --example viewer [host:port]
//!
//! The address defaults to 127.0.0.1:5900.

use rustvncclient::{run_session, SessionEvent, VncSession};
use std::error::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize logging
    env_logger::init();

    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:5900".to_string());

    println!("VNC viewer demonstration");
    println!("========================");
    println!("Connecting to {address}...");

    let stream = TcpStream::connect(&address).await?;
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let (_input_tx, input_rx) = mpsc::unbounded_channel();

    // Report session events in the background
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                SessionEvent::ConnectionState(connected) => {
                    println!("[Event] Connection state: {connected}");
                }
                SessionEvent::ProtocolVersion(version) => {
                    println!("[Event] Protocol version: {version:?}");
                }
                SessionEvent::SecurityType(security) => {
                    println!("[Event] Security type: {security:?}");
                }
                SessionEvent::FramebufferSize { width, height } => {
                    println!("[Event] Framebuffer size: {width}x{height}");
                }
                SessionEvent::RegionChanged { x, y, width, height } => {
                    println!("[Event] Region changed: {width}x{height} at ({x}, {y})");
                }
            }
        }
    });

    let session = run_session(VncSession::new(), stream, event_tx, input_rx).await?;

    let (width, height) = session.framebuffer_size();
    println!("Session ended; final framebuffer {width}x{height}");
    Ok(())
}
