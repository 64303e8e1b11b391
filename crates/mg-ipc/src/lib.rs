//! Messages exchanged between the background coordinator and a page's
//! content script, with their binary framing.

use mg_core::MarginaliaError;
use mg_core::MarginaliaResult;
use std::sync::mpsc;
use std::time::Duration;

const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024 * 1024;
const HARD_MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;
const FRAME_PREFIX_BYTES: usize = 4;
const MESSAGE_TAG_CAPTURE_SELECTION: u8 = 1;
const MESSAGE_TAG_SELECTION_CAPTURED: u8 = 2;
const MESSAGE_TAG_RELOCATE_SELECTION: u8 = 3;
const MESSAGE_TAG_SELECTION_RELOCATED: u8 = 4;

/// Which side of a channel an endpoint sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRole {
    Background,
    ContentScript,
}

impl EndpointRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Background => "background",
            Self::ContentScript => "content-script",
        }
    }

    pub fn from_role_name(value: &str) -> Option<Self> {
        match value {
            "background" => Some(Self::Background),
            "content-script" => Some(Self::ContentScript),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpcMessage {
    /// Ask the page to describe its current selection.
    CaptureSelection { request_id: u64 },
    /// `record` is the selection record JSON, `None` when nothing was
    /// selected.
    SelectionCaptured {
        request_id: u64,
        record: Option<String>,
    },
    /// Ask the page to find and select a stored record. `origin_url` is the
    /// page the record was captured on.
    RelocateSelection {
        request_id: u64,
        origin_url: String,
        record: String,
    },
    /// `navigate_to` is set when the record belongs to another page.
    SelectionRelocated {
        request_id: u64,
        found: bool,
        navigate_to: Option<String>,
    },
}

impl IpcMessage {
    pub fn request_id(&self) -> u64 {
        match self {
            Self::CaptureSelection { request_id }
            | Self::SelectionCaptured { request_id, .. }
            | Self::RelocateSelection { request_id, .. }
            | Self::SelectionRelocated { request_id, .. } => *request_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub role: EndpointRole,
    pub max_message_bytes: usize,
}

impl ChannelConfig {
    pub fn hardened(role: EndpointRole) -> MarginaliaResult<Self> {
        let config = Self {
            role,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MarginaliaResult<()> {
        if self.max_message_bytes == 0 {
            return Err(MarginaliaError::new(
                "ipc.max_message_bytes_invalid",
                "channel max_message_bytes must be greater than zero",
            ));
        }

        if self.max_message_bytes > HARD_MAX_MESSAGE_BYTES {
            return Err(MarginaliaError::new(
                "ipc.max_message_bytes_too_large",
                "channel max_message_bytes exceeds hard limit (16 MiB)",
            ));
        }

        Ok(())
    }
}

/// In-memory endpoint that frames typed messages and enforces size limits.
pub struct LocalIpcEndpoint {
    tx: mpsc::Sender<Vec<u8>>,
    rx: mpsc::Receiver<Vec<u8>>,
    config: ChannelConfig,
}

impl LocalIpcEndpoint {
    pub fn role(&self) -> EndpointRole {
        self.config.role
    }

    pub fn send(&self, message: &IpcMessage) -> MarginaliaResult<()> {
        let frame = encode_message(message, self.config.max_message_bytes)?;
        self.tx.send(frame).map_err(|error| {
            MarginaliaError::new(
                "ipc.send_failed",
                format!(
                    "failed to send message from {} endpoint: {error}",
                    self.config.role.as_str()
                ),
            )
        })
    }

    pub fn recv_timeout(&self, timeout: Duration) -> MarginaliaResult<IpcMessage> {
        let frame = self.rx.recv_timeout(timeout).map_err(|error| {
            MarginaliaError::new(
                "ipc.recv_failed",
                format!(
                    "failed to receive message for {} endpoint: {error}",
                    self.config.role.as_str()
                ),
            )
        })?;
        decode_message(&frame, self.config.max_message_bytes)
    }

    /// Blocks for the next message. `Ok(None)` once the peer is gone.
    pub fn recv(&self) -> MarginaliaResult<Option<IpcMessage>> {
        match self.rx.recv() {
            Ok(frame) => decode_message(&frame, self.config.max_message_bytes).map(Some),
            Err(mpsc::RecvError) => Ok(None),
        }
    }
}

/// Creates paired in-memory endpoints.
pub fn local_channel_pair(
    left: ChannelConfig,
    right: ChannelConfig,
) -> MarginaliaResult<(LocalIpcEndpoint, LocalIpcEndpoint)> {
    left.validate()?;
    right.validate()?;

    let (left_to_right_tx, left_to_right_rx) = mpsc::channel();
    let (right_to_left_tx, right_to_left_rx) = mpsc::channel();

    Ok((
        LocalIpcEndpoint {
            tx: left_to_right_tx,
            rx: right_to_left_rx,
            config: left,
        },
        LocalIpcEndpoint {
            tx: right_to_left_tx,
            rx: left_to_right_rx,
            config: right,
        },
    ))
}

/// Encodes a payload as a length-prefixed frame.
pub fn encode_frame(payload: &[u8], max_message_bytes: usize) -> MarginaliaResult<Vec<u8>> {
    if payload.len() > max_message_bytes {
        return Err(MarginaliaError::new(
            "ipc.message_too_large",
            format!(
                "payload exceeds max_message_bytes ({} > {})",
                payload.len(),
                max_message_bytes
            ),
        ));
    }

    let len_u32 = u32::try_from(payload.len()).map_err(|_| {
        MarginaliaError::new(
            "ipc.message_too_large",
            "payload length does not fit in 32-bit frame prefix",
        )
    })?;

    let mut out = Vec::with_capacity(FRAME_PREFIX_BYTES + payload.len());
    out.extend_from_slice(&len_u32.to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Decodes a length-prefixed frame and validates payload size.
pub fn decode_frame(frame: &[u8], max_message_bytes: usize) -> MarginaliaResult<Vec<u8>> {
    if frame.len() < FRAME_PREFIX_BYTES {
        return Err(MarginaliaError::new(
            "ipc.frame_too_short",
            "frame is shorter than the 4-byte length prefix",
        ));
    }

    let mut len_bytes = [0_u8; FRAME_PREFIX_BYTES];
    len_bytes.copy_from_slice(&frame[..FRAME_PREFIX_BYTES]);
    let payload_len = u32::from_be_bytes(len_bytes) as usize;
    if payload_len > max_message_bytes {
        return Err(MarginaliaError::new(
            "ipc.message_too_large",
            format!(
                "decoded payload exceeds max_message_bytes ({} > {})",
                payload_len, max_message_bytes
            ),
        ));
    }

    let expected = FRAME_PREFIX_BYTES + payload_len;
    if frame.len() != expected {
        return Err(MarginaliaError::new(
            "ipc.frame_length_mismatch",
            format!(
                "frame length mismatch: expected {expected} bytes, got {}",
                frame.len()
            ),
        ));
    }

    Ok(frame[FRAME_PREFIX_BYTES..].to_vec())
}

pub fn encode_message(message: &IpcMessage, max_message_bytes: usize) -> MarginaliaResult<Vec<u8>> {
    let payload = encode_message_payload(message)?;
    encode_frame(&payload, max_message_bytes)
}

pub fn decode_message(frame: &[u8], max_message_bytes: usize) -> MarginaliaResult<IpcMessage> {
    let payload = decode_frame(frame, max_message_bytes)?;
    decode_message_payload(&payload)
}

fn encode_message_payload(message: &IpcMessage) -> MarginaliaResult<Vec<u8>> {
    let mut out = Vec::with_capacity(1 + 8);
    match message {
        IpcMessage::CaptureSelection { request_id } => {
            out.push(MESSAGE_TAG_CAPTURE_SELECTION);
            out.extend_from_slice(&request_id.to_be_bytes());
        }
        IpcMessage::SelectionCaptured { request_id, record } => {
            out.push(MESSAGE_TAG_SELECTION_CAPTURED);
            out.extend_from_slice(&request_id.to_be_bytes());
            write_optional_string(&mut out, record.as_deref(), "record")?;
        }
        IpcMessage::RelocateSelection {
            request_id,
            origin_url,
            record,
        } => {
            out.push(MESSAGE_TAG_RELOCATE_SELECTION);
            out.extend_from_slice(&request_id.to_be_bytes());
            write_string(&mut out, origin_url, "origin_url")?;
            write_string(&mut out, record, "record")?;
        }
        IpcMessage::SelectionRelocated {
            request_id,
            found,
            navigate_to,
        } => {
            out.push(MESSAGE_TAG_SELECTION_RELOCATED);
            out.extend_from_slice(&request_id.to_be_bytes());
            out.push(u8::from(*found));
            write_optional_string(&mut out, navigate_to.as_deref(), "navigate_to")?;
        }
    }
    Ok(out)
}

fn decode_message_payload(payload: &[u8]) -> MarginaliaResult<IpcMessage> {
    if payload.is_empty() {
        return Err(MarginaliaError::new(
            "ipc.message_empty",
            "typed IPC payload is empty",
        ));
    }

    let mut offset = 0_usize;
    let tag = read_u8(payload, &mut offset, "tag")?;
    let message = match tag {
        MESSAGE_TAG_CAPTURE_SELECTION => IpcMessage::CaptureSelection {
            request_id: read_u64(payload, &mut offset, "request_id")?,
        },
        MESSAGE_TAG_SELECTION_CAPTURED => IpcMessage::SelectionCaptured {
            request_id: read_u64(payload, &mut offset, "request_id")?,
            record: read_optional_string(payload, &mut offset, "record")?,
        },
        MESSAGE_TAG_RELOCATE_SELECTION => IpcMessage::RelocateSelection {
            request_id: read_u64(payload, &mut offset, "request_id")?,
            origin_url: read_string(payload, &mut offset, "origin_url")?,
            record: read_string(payload, &mut offset, "record")?,
        },
        MESSAGE_TAG_SELECTION_RELOCATED => IpcMessage::SelectionRelocated {
            request_id: read_u64(payload, &mut offset, "request_id")?,
            found: read_flag(payload, &mut offset, "found")?,
            navigate_to: read_optional_string(payload, &mut offset, "navigate_to")?,
        },
        other => {
            return Err(MarginaliaError::new(
                "ipc.message_tag_unknown",
                format!("unknown typed IPC message tag `{other}`"),
            ));
        }
    };

    if offset != payload.len() {
        return Err(MarginaliaError::new(
            "ipc.message_trailing_bytes",
            format!(
                "typed IPC payload has trailing bytes (decoded {offset} of {})",
                payload.len()
            ),
        ));
    }

    Ok(message)
}

fn write_string(out: &mut Vec<u8>, value: &str, field: &str) -> MarginaliaResult<()> {
    let len = u32::try_from(value.len()).map_err(|_| {
        MarginaliaError::new(
            "ipc.message_field_too_large",
            format!(
                "field `{field}` exceeds 32-bit size limit ({} bytes)",
                value.len()
            ),
        )
    })?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

fn write_optional_string(out: &mut Vec<u8>, value: Option<&str>, field: &str) -> MarginaliaResult<()> {
    match value {
        Some(value) => {
            out.push(1);
            write_string(out, value, field)
        }
        None => {
            out.push(0);
            Ok(())
        }
    }
}

fn read_u8(payload: &[u8], offset: &mut usize, field: &str) -> MarginaliaResult<u8> {
    if *offset >= payload.len() {
        return Err(MarginaliaError::new(
            "ipc.message_truncated",
            format!("missing `{field}` in typed IPC payload"),
        ));
    }

    let value = payload[*offset];
    *offset += 1;
    Ok(value)
}

fn read_flag(payload: &[u8], offset: &mut usize, field: &str) -> MarginaliaResult<bool> {
    match read_u8(payload, offset, field)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(MarginaliaError::new(
            "ipc.message_field_invalid",
            format!("invalid `{field}` flag `{other}`; expected 0 or 1"),
        )),
    }
}

fn read_u32(payload: &[u8], offset: &mut usize, field: &str) -> MarginaliaResult<u32> {
    let bytes = read_exact(payload, offset, 4, field)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_u64(payload: &[u8], offset: &mut usize, field: &str) -> MarginaliaResult<u64> {
    let bytes = read_exact(payload, offset, 8, field)?;
    Ok(u64::from_be_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]))
}

fn read_string(payload: &[u8], offset: &mut usize, field: &str) -> MarginaliaResult<String> {
    let len = read_u32(payload, offset, field)? as usize;
    let bytes = read_exact(payload, offset, len, field)?;
    String::from_utf8(bytes.to_vec()).map_err(|error| {
        MarginaliaError::new(
            "ipc.message_utf8_invalid",
            format!("typed IPC field `{field}` is not valid UTF-8: {error}"),
        )
    })
}

fn read_optional_string(
    payload: &[u8],
    offset: &mut usize,
    field: &str,
) -> MarginaliaResult<Option<String>> {
    if read_flag(payload, offset, field)? {
        read_string(payload, offset, field).map(Some)
    } else {
        Ok(None)
    }
}

fn read_exact<'a>(
    payload: &'a [u8],
    offset: &mut usize,
    len: usize,
    field: &str,
) -> MarginaliaResult<&'a [u8]> {
    let end = offset.saturating_add(len);
    if end > payload.len() {
        return Err(MarginaliaError::new(
            "ipc.message_truncated",
            format!("typed IPC payload ended while reading `{field}` (need {len} bytes)"),
        ));
    }

    let out = &payload[*offset..end];
    *offset = end;
    Ok(out)
}
