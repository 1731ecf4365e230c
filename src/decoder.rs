//! Classification of Modbus PDUs for the common function codes.
//!
//! The wire carries no direction bit, so request vs response is inferred
//! from the payload length. Malformed payloads never fail to decode; the
//! frame degrades to a raw-payload field with a diagnostic note.

use std::fmt;

use crate::frame::Frame;

/// Human-readable names for the function codes the sniffer understands.
pub fn function_name(function_code: u8) -> Option<&'static str> {
    match function_code {
        1 => Some("Read Coils"),
        2 => Some("Read Discrete Inputs"),
        3 => Some("Read Holding Registers"),
        4 => Some("Read Input Registers"),
        5 => Some("Write Single Coil"),
        6 => Some("Write Single Register"),
        15 => Some("Write Multiple Coils"),
        16 => Some("Write Multiple Registers"),
        _ => None,
    }
}

/// Standard Modbus exception code descriptions.
pub fn exception_name(code: u8) -> Option<&'static str> {
    match code {
        1 => Some("Illegal function"),
        2 => Some("Illegal data address"),
        3 => Some("Illegal data value"),
        4 => Some("Slave device failure"),
        5 => Some("Acknowledge"),
        6 => Some("Slave device busy"),
        8 => Some("Memory parity error"),
        10 => Some("Gateway path unavailable"),
        11 => Some("Gateway target device failed to respond"),
        _ => None,
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FrameKind {
    Request,
    Response,
    Exception,
    Unknown,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameKind::Request => write!(f, "request"),
            FrameKind::Response => write!(f, "response"),
            FrameKind::Exception => write!(f, "exception"),
            FrameKind::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldValue {
    Byte(u8),
    Word(u16),
    Raw(Vec<u8>),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Field {
    pub label: String,
    pub value: FieldValue,
}

impl Field {
    fn byte(label: impl Into<String>, value: u8) -> Self {
        Self {
            label: label.into(),
            value: FieldValue::Byte(value),
        }
    }

    fn word(label: impl Into<String>, value: u16) -> Self {
        Self {
            label: label.into(),
            value: FieldValue::Word(value),
        }
    }

    fn raw(label: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            label: label.into(),
            value: FieldValue::Raw(bytes.to_vec()),
        }
    }
}

/// Structured view of a decoded payload, consumed by the correlator and
/// the history extractor.
#[derive(Clone, Debug, PartialEq)]
pub enum Pdu {
    ReadRequest {
        start_address: u16,
        quantity: u16,
    },
    CoilResponse {
        coils: Vec<bool>,
    },
    RegisterResponse {
        values: Vec<u16>,
    },
    WriteSingle {
        address: u16,
        value: u16,
    },
    WriteCoilsRequest {
        start_address: u16,
        quantity: u16,
        coils: Vec<bool>,
    },
    WriteRegistersRequest {
        start_address: u16,
        quantity: u16,
        values: Vec<u16>,
    },
    WriteMultipleResponse {
        start_address: u16,
        quantity: u16,
    },
    Exception {
        code: u8,
    },
    Opaque,
}

#[derive(Clone, Debug)]
pub struct DecodedFrame {
    pub unit_id: u8,
    pub function_byte: u8,
    pub kind: FrameKind,
    pub pdu: Pdu,
    pub fields: Vec<Field>,
    pub notes: Vec<String>,
    pub summary: String,
}

impl DecodedFrame {
    pub fn function_code(&self) -> u8 {
        self.function_byte & 0x7F
    }

    pub fn is_exception(&self) -> bool {
        self.function_byte & 0x80 != 0
    }
}

fn function_label(function_code: u8) -> String {
    function_name(function_code)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Function 0x{function_code:02X}"))
}

fn word_at(payload: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([payload[offset], payload[offset + 1]])
}

/// Unpacks bit-addressed coil data, LSB of the first byte first.
fn unpack_coils(data: &[u8], quantity: Option<usize>) -> Vec<bool> {
    let mut coils = Vec::with_capacity(data.len() * 8);
    for &byte in data {
        for bit in 0..8 {
            coils.push(byte >> bit & 0x01 == 0x01);
            if let Some(limit) = quantity {
                if coils.len() >= limit {
                    return coils;
                }
            }
        }
    }
    coils
}

fn coil_preview(coils: &[bool], base: u16) -> String {
    let preview: Vec<String> = coils
        .iter()
        .take(16)
        .enumerate()
        .map(|(offset, &on)| {
            format!(
                "{}:{}",
                base.wrapping_add(offset as u16),
                if on { "ON" } else { "OFF" }
            )
        })
        .collect();
    let ellipsis = if coils.len() > 16 { "…" } else { "" };
    format!("{}{}", preview.join(", "), ellipsis)
}

/// Decodes a CRC-validated frame.
pub fn decode(frame: &Frame) -> DecodedFrame {
    decode_parts(frame.unit_id(), frame.function_byte(), frame.pdu())
}

/// Decodes a frame from its raw parts.
///
/// Exists separately so the history extractor can take a best-effort look
/// at log entries that never produced a CRC-valid frame.
pub fn decode_parts(unit_id: u8, function_byte: u8, payload: &[u8]) -> DecodedFrame {
    let function_code = function_byte & 0x7F;

    if function_byte & 0x80 != 0 {
        return decode_exception(unit_id, function_byte, payload);
    }

    let label = function_label(function_code);
    let mut fields = Vec::new();
    let mut notes = Vec::new();

    let (kind, pdu, summary) = match function_code {
        1..=4 => decode_read(function_code, payload, &label, &mut fields, &mut notes),
        5 | 6 => decode_write_single(function_code, payload, &label, &mut fields),
        15 | 16 => decode_write_multiple(function_code, payload, &label, &mut fields, &mut notes),
        _ => {
            if !payload.is_empty() {
                fields.push(Field::raw("Payload", payload));
            }
            (
                FrameKind::Unknown,
                Pdu::Opaque,
                format!("{label}: {} bytes", payload.len()),
            )
        }
    };

    DecodedFrame {
        unit_id,
        function_byte,
        kind,
        pdu,
        fields,
        notes,
        summary,
    }
}

fn decode_exception(unit_id: u8, function_byte: u8, payload: &[u8]) -> DecodedFrame {
    let function_code = function_byte & 0x7F;
    let label = function_label(function_code);
    let mut fields = Vec::new();
    let mut notes = Vec::new();

    let pdu = match payload.split_first() {
        Some((&code, extra)) => {
            fields.push(Field::byte("Exception Code", code));
            notes.push(
                exception_name(code)
                    .unwrap_or("Unknown exception code")
                    .to_string(),
            );
            if !extra.is_empty() {
                fields.push(Field::raw("Extra Data", extra));
            }
            Pdu::Exception { code }
        }
        None => {
            notes.push("No exception code present".to_string());
            Pdu::Opaque
        }
    };

    DecodedFrame {
        unit_id,
        function_byte,
        kind: FrameKind::Exception,
        pdu,
        fields,
        notes,
        summary: format!("{label} exception"),
    }
}

fn decode_read(
    function_code: u8,
    payload: &[u8],
    label: &str,
    fields: &mut Vec<Field>,
    notes: &mut Vec<String>,
) -> (FrameKind, Pdu, String) {
    if payload.len() == 4 {
        let start_address = word_at(payload, 0);
        let quantity = word_at(payload, 2);
        fields.push(Field::word("Start Address", start_address));
        fields.push(Field::word("Quantity", quantity));
        return (
            FrameKind::Request,
            Pdu::ReadRequest {
                start_address,
                quantity,
            },
            format!("{label} request: start {start_address}, qty {quantity}"),
        );
    }

    let Some((&byte_count, data)) = payload.split_first() else {
        return (FrameKind::Unknown, Pdu::Opaque, format!("{label}: empty payload"));
    };

    fields.push(Field::byte("Byte Count", byte_count));
    if byte_count as usize != data.len() {
        notes.push("Byte count disagrees with payload length".to_string());
    }
    let effective = (byte_count as usize).min(data.len());
    let (portion, extra) = data.split_at(effective);

    let pdu = if function_code == 3 || function_code == 4 {
        let mut values = Vec::with_capacity(portion.len() / 2);
        let mut chunks = portion.chunks_exact(2);
        for (index, chunk) in chunks.by_ref().enumerate() {
            let value = u16::from_be_bytes([chunk[0], chunk[1]]);
            values.push(value);
            fields.push(Field::word(format!("Register {}", index + 1), value));
        }
        if !chunks.remainder().is_empty() {
            fields.push(Field::raw("Truncated Register", chunks.remainder()));
        }
        if !values.is_empty() {
            notes.push(format!("{} registers read", values.len()));
        }
        Pdu::RegisterResponse { values }
    } else {
        let coils = unpack_coils(portion, None);
        if !portion.is_empty() {
            fields.push(Field::raw("Coil Data", portion));
            let on_count = coils.iter().filter(|&&on| on).count();
            notes.push(format!(
                "Coils on: {on_count}/{} — {}",
                coils.len(),
                coil_preview(&coils, 0)
            ));
        }
        Pdu::CoilResponse { coils }
    };

    if !extra.is_empty() {
        fields.push(Field::raw("Extra Data", extra));
    }

    (
        FrameKind::Response,
        pdu,
        format!("{label} response: {byte_count} data bytes"),
    )
}

fn decode_write_single(
    function_code: u8,
    payload: &[u8],
    label: &str,
    fields: &mut Vec<Field>,
) -> (FrameKind, Pdu, String) {
    if payload.len() < 4 {
        if !payload.is_empty() {
            fields.push(Field::raw("Payload", payload));
        }
        return (
            FrameKind::Unknown,
            Pdu::Opaque,
            format!("{label}: short payload ({} bytes)", payload.len()),
        );
    }

    let address = word_at(payload, 0);
    let value = word_at(payload, 2);
    fields.push(Field::word("Address", address));
    fields.push(Field::word("Value", value));

    let summary = if function_code == 5 {
        let status = match value {
            0xFF00 => "ON".to_string(),
            0x0000 => "OFF".to_string(),
            other => format!("value 0x{other:04X}"),
        };
        format!("{label}: coil {address} -> {status}")
    } else {
        format!("{label}: register {address} = {value}")
    };

    // Request and echoed response are byte-identical on the wire.
    (
        FrameKind::Request,
        Pdu::WriteSingle { address, value },
        summary,
    )
}

fn decode_write_multiple(
    function_code: u8,
    payload: &[u8],
    label: &str,
    fields: &mut Vec<Field>,
    notes: &mut Vec<String>,
) -> (FrameKind, Pdu, String) {
    if payload.len() == 4 {
        let start_address = word_at(payload, 0);
        let quantity = word_at(payload, 2);
        fields.push(Field::word("Start Address", start_address));
        fields.push(Field::word("Quantity", quantity));
        return (
            FrameKind::Response,
            Pdu::WriteMultipleResponse {
                start_address,
                quantity,
            },
            format!("{label} response: start {start_address}, qty {quantity}"),
        );
    }

    if payload.len() < 5 {
        if !payload.is_empty() {
            fields.push(Field::raw("Payload", payload));
        }
        return (
            FrameKind::Unknown,
            Pdu::Opaque,
            format!("{label}: short payload ({} bytes)", payload.len()),
        );
    }

    let start_address = word_at(payload, 0);
    let quantity = word_at(payload, 2);
    let byte_count = payload[4];
    fields.push(Field::word("Start Address", start_address));
    fields.push(Field::word("Quantity", quantity));
    fields.push(Field::byte("Byte Count", byte_count));

    let data = &payload[5..];
    let effective = (byte_count as usize).min(data.len());
    let (portion, extra) = data.split_at(effective);
    if portion.len() < byte_count as usize {
        notes.push("Byte count exceeds available data".to_string());
    }

    let pdu = if function_code == 16 {
        let mut values = Vec::with_capacity(portion.len() / 2);
        let mut chunks = portion.chunks_exact(2);
        for (index, chunk) in chunks.by_ref().enumerate() {
            let value = u16::from_be_bytes([chunk[0], chunk[1]]);
            values.push(value);
            fields.push(Field::word(format!("Register {index}"), value));
        }
        if !chunks.remainder().is_empty() {
            fields.push(Field::raw("Truncated Register", chunks.remainder()));
        }
        if quantity > 0 && (quantity as usize) < values.len() {
            values.truncate(quantity as usize);
        }
        Pdu::WriteRegistersRequest {
            start_address,
            quantity,
            values,
        }
    } else {
        let coils = unpack_coils(portion, Some(quantity as usize));
        if !portion.is_empty() {
            fields.push(Field::raw("Values", portion));
            notes.push(format!("Coil values: {}", coil_preview(&coils, start_address)));
        }
        Pdu::WriteCoilsRequest {
            start_address,
            quantity,
            coils,
        }
    };

    if !extra.is_empty() {
        fields.push(Field::raw("Extra Data", extra));
    }

    (
        FrameKind::Request,
        pdu,
        format!("{label} request: start {start_address}, qty {quantity}, {byte_count} bytes"),
    )
}
