//! CDP Transport Layer
//!
//! Talks to Chrome over a minimal WebSocket client. Responses are routed back
//! to their callers by message id; events are not consumed.

use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::net::TcpStream;
use std::process::{Child, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{oneshot, Mutex};

use crate::error::{Error, Result};

/// A pending request waiting for a response
struct PendingRequest {
    /// Command name, for error reports
    method: String,
    tx: oneshot::Sender<Result<Value>>,
}

type PendingMap = Arc<Mutex<HashMap<u64, PendingRequest>>>;

/// WebSocket opcodes we care about
mod ws {
    pub const OPCODE_TEXT: u8 = 0x1;
    pub const OPCODE_CLOSE: u8 = 0x8;
    pub const OPCODE_PING: u8 = 0x9;
    pub const OPCODE_PONG: u8 = 0xA;
}

/// Encode a masked client frame
fn encode_ws_frame(opcode: u8, data: &[u8]) -> Vec<u8> {
    let len = data.len();
    let mut frame = Vec::with_capacity(14 + len);

    frame.push(0x80 | opcode);

    // Client frames are always masked
    if len < 126 {
        frame.push(0x80 | len as u8);
    } else if len < 65536 {
        frame.push(0x80 | 126);
        frame.push((len >> 8) as u8);
        frame.push(len as u8);
    } else {
        frame.push(0x80 | 127);
        for i in (0..8).rev() {
            frame.push((len >> (i * 8)) as u8);
        }
    }

    let mask: [u8; 4] = rand::random();
    frame.extend_from_slice(&mask);
    frame.extend(data.iter().enumerate().map(|(i, byte)| byte ^ mask[i % 4]));
    frame
}

fn write_ws_frame(stream: &mut TcpStream, opcode: u8, data: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    stream.write_all(&encode_ws_frame(opcode, data))?;
    stream.flush()
}

/// Read one frame, returns (fin, opcode, payload)
fn read_ws_frame(stream: &mut impl std::io::Read) -> std::io::Result<(bool, u8, Vec<u8>)> {
    let mut header = [0u8; 2];
    stream.read_exact(&mut header)?;

    let fin = (header[0] & 0x80) != 0;
    let opcode = header[0] & 0x0F;
    let masked = (header[1] & 0x80) != 0;
    let mut len = (header[1] & 0x7F) as usize;

    if len == 126 {
        let mut ext = [0u8; 2];
        stream.read_exact(&mut ext)?;
        len = u16::from_be_bytes(ext) as usize;
    } else if len == 127 {
        let mut ext = [0u8; 8];
        stream.read_exact(&mut ext)?;
        len = u64::from_be_bytes(ext) as usize;
    }

    let mask = if masked {
        let mut m = [0u8; 4];
        stream.read_exact(&mut m)?;
        Some(m)
    } else {
        None
    };

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload)?;

    if let Some(mask) = mask {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= mask[i % 4];
        }
    }

    Ok((fin, opcode, payload))
}

/// CDP Transport - sends commands and awaits their responses
pub struct Transport {
    /// The Chrome child process
    child: Mutex<Child>,
    /// WebSocket stream for writing
    writer: Mutex<TcpStream>,
    /// Next message ID
    next_id: AtomicU64,
    /// Pending requests waiting for responses
    pending: PendingMap,
}

impl Transport {
    /// Connect to Chrome's DevTools WebSocket
    pub fn new(child: Child, ws_url: &str) -> Result<Self> {
        let url = ws_url.trim_start_matches("ws://");
        let (host_port, path) = url.split_once('/').unwrap_or((url, ""));

        let mut stream = TcpStream::connect(host_port)
            .map_err(|e| Error::transport_io("Failed to connect to Chrome", e))?;

        let key = base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            rand::random::<[u8; 16]>(),
        );

        let handshake = format!(
            "GET /{} HTTP/1.1\r\n\
             Host: {}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {}\r\n\
             Sec-WebSocket-Version: 13\r\n\
             \r\n",
            path, host_port, key
        );

        use std::io::{Read, Write};
        stream
            .write_all(handshake.as_bytes())
            .map_err(|e| Error::transport_io("Handshake write failed", e))?;

        let mut response = [0u8; 1024];
        let n = stream
            .read(&mut response)
            .map_err(|e| Error::transport_io("Handshake read failed", e))?;
        let response_str = String::from_utf8_lossy(&response[..n]);

        if !response_str.contains("101") {
            return Err(Error::transport(format!(
                "WebSocket handshake failed: {}",
                response_str
            )));
        }

        tracing::debug!("WebSocket connected to {}", ws_url);

        let reader_stream = stream
            .try_clone()
            .map_err(|e| Error::transport_io("Failed to clone stream", e))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let pending_clone = Arc::clone(&pending);
        std::thread::spawn(move || {
            Self::reader_loop(reader_stream, pending_clone);
        });

        Ok(Self {
            child: Mutex::new(child),
            writer: Mutex::new(stream),
            next_id: AtomicU64::new(1),
            pending,
        })
    }

    /// Reader loop - runs on its own thread
    fn reader_loop(mut stream: TcpStream, pending: PendingMap) {
        // Large evaluate results arrive fragmented
        let mut message: Vec<u8> = Vec::new();

        loop {
            let (fin, opcode, payload) = match read_ws_frame(&mut stream) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::debug!("WebSocket read error: {}", e);
                    break;
                }
            };

            match opcode {
                ws::OPCODE_TEXT | 0x0 => {
                    message.extend_from_slice(&payload);
                    if !fin {
                        continue;
                    }
                    let data = std::mem::take(&mut message);
                    Self::dispatch(&data, &pending);
                }
                ws::OPCODE_PING => {
                    let _ = write_ws_frame(&mut stream, ws::OPCODE_PONG, &payload);
                }
                ws::OPCODE_CLOSE => {
                    tracing::debug!("WebSocket closed by server");
                    break;
                }
                _ => {}
            }
        }

        // Wake every caller still waiting; their senders drop here
        pending.blocking_lock().clear();
        tracing::debug!("CDP reader loop ended");
    }

    fn dispatch(data: &[u8], pending: &PendingMap) {
        let msg: Value = match serde_json::from_slice(data) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Failed to parse CDP message: {}", e);
                // The caller still gets an answer if the id is readable
                if let Some(id) = message_id(data) {
                    if let Some(request) = pending.blocking_lock().remove(&id) {
                        let _ = request.tx.send(Err(e.into()));
                    }
                }
                return;
            }
        };

        let Some(id) = msg.get("id").and_then(|v| v.as_u64()) else {
            if let Some(method) = msg.get("method").and_then(|m| m.as_str()) {
                tracing::trace!("Ignoring CDP event {}", method);
            }
            return;
        };

        let Some(request) = pending.blocking_lock().remove(&id) else {
            tracing::trace!("Response for unknown id: {}", id);
            return;
        };

        let result = match msg.get("error") {
            Some(error) => Err(Error::cdp(
                request.method,
                error.get("code").and_then(|c| c.as_i64()).unwrap_or(-1),
                error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown"),
            )),
            None => Ok(msg.get("result").cloned().unwrap_or(json!({}))),
        };

        let _ = request.tx.send(result);
    }

    /// Send a browser-level CDP command and wait for the response
    pub async fn send<C, R>(&self, method: &str, params: &C) -> Result<R>
    where
        C: Serialize,
        R: DeserializeOwned,
    {
        self.dispatch_command(None, method, params).await
    }

    /// Send a CDP command to a specific session
    pub async fn send_to_session<C, R>(
        &self,
        session_id: &str,
        method: &str,
        params: &C,
    ) -> Result<R>
    where
        C: Serialize,
        R: DeserializeOwned,
    {
        self.dispatch_command(Some(session_id), method, params)
            .await
    }

    async fn dispatch_command<C, R>(
        &self,
        session_id: Option<&str>,
        method: &str,
        params: &C,
    ) -> Result<R>
    where
        C: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(
            id,
            PendingRequest {
                method: method.to_string(),
                tx,
            },
        );

        let mut msg = json!({
            "id": id,
            "method": method,
            "params": serde_json::to_value(params)?
        });
        if let Some(session_id) = session_id {
            msg["sessionId"] = json!(session_id);
        }

        let data = serde_json::to_string(&msg)?;

        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = write_ws_frame(&mut writer, ws::OPCODE_TEXT, data.as_bytes()) {
                self.pending.lock().await.remove(&id);
                return Err(Error::transport_io("WebSocket write failed", e));
            }
        }

        tracing::trace!("Sent CDP command: {} (id={}, session={:?})", method, id, session_id);

        let result = rx
            .await
            .map_err(|_| Error::transport("Response channel closed"))??;

        Ok(serde_json::from_value(result)?)
    }

    /// Close the transport and kill Chrome
    pub async fn close(&self) -> Result<()> {
        {
            let mut writer = self.writer.lock().await;
            let _ = write_ws_frame(&mut writer, ws::OPCODE_CLOSE, &[]);
        }

        let mut child = self.child.lock().await;
        let _ = child.kill();
        child.wait()?;
        Ok(())
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if let Ok(mut child) = self.child.try_lock() {
            let _ = child.kill();
        }
    }
}

/// Read only the `id` of a message whose body does not parse.
///
/// Skipped fields are not decoded, so a lone surrogate escape in a string
/// value does not hide the id.
fn message_id(data: &[u8]) -> Option<u64> {
    #[derive(Deserialize)]
    struct IdOnly {
        id: Option<u64>,
    }

    serde_json::from_slice::<IdOnly>(data).ok()?.id
}

/// Launch Chrome and get the WebSocket debugging URL
pub fn launch_chrome(path: &std::path::Path, args: &[String]) -> Result<(Child, String)> {
    use std::process::Command;

    let mut child = Command::new(path)
        .args(args)
        .arg("--remote-debugging-port=0")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::Launch(format!("{}: {}", path.display(), e)))?;

    let stderr = child
        .stderr
        .take()
        .ok_or(Error::Launch("No stderr from Chrome".into()))?;

    // Chrome prints: DevTools listening on ws://127.0.0.1:PORT/devtools/browser/GUID
    let ws_url = BufReader::new(stderr)
        .lines()
        .map_while(|line| line.ok())
        .inspect(|line| tracing::trace!("Chrome stderr: {}", line))
        .find_map(|line| {
            if !line.contains("DevTools listening on") {
                return None;
            }
            line.find("ws://").map(|start| line[start..].trim().to_string())
        });

    let Some(ws_url) = ws_url else {
        let _ = child.kill();
        return Err(Error::Launch(
            "Failed to get DevTools WebSocket URL from Chrome".into(),
        ));
    };

    tracing::debug!("Chrome DevTools URL: {}", ws_url);

    Ok((child, ws_url))
}
