//! Codec binario compatible con el formato protobuf del servidor de tracking.
//!
//! Sólo implementamos lo que necesitan las entidades de `Run`: varints,
//! `fixed64` (doubles) y campos length-delimited (strings y submensajes).
//! Los campos desconocidos se saltan al decodificar para tolerar versiones
//! más nuevas del servidor.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum WireError {
    #[error("message truncated")]
    Truncated,
    #[error("varint exceeds 64 bits")]
    VarintOverflow,
    #[error("invalid wire type {0}")]
    InvalidWireType(u8),
    #[error("invalid utf-8 in field {0}")]
    InvalidUtf8(u32),
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("invalid enum value {value} for '{field}'")]
    InvalidEnum { field: &'static str, value: u64 },
}

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LEN: u8 = 2;
const WIRE_FIXED32: u8 = 5;

/// Buffer de escritura de un mensaje.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn put_varint(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.buf.push((value as u8) | 0x80);
            value >>= 7;
        }
        self.buf.push(value as u8);
    }

    fn put_key(&mut self, field: u32, wire_type: u8) {
        self.put_varint(((field as u64) << 3) | wire_type as u64);
    }

    pub fn varint(&mut self, field: u32, value: u64) -> &mut Self {
        self.put_key(field, WIRE_VARINT);
        self.put_varint(value);
        self
    }

    /// `int64` de protobuf: negativos se codifican como complemento a dos
    /// sobre 10 bytes.
    pub fn int64(&mut self, field: u32, value: i64) -> &mut Self {
        self.varint(field, value as u64)
    }

    pub fn double(&mut self, field: u32, value: f64) -> &mut Self {
        self.put_key(field, WIRE_FIXED64);
        self.buf.extend_from_slice(&value.to_bits().to_le_bytes());
        self
    }

    pub fn bytes(&mut self, field: u32, value: &[u8]) -> &mut Self {
        self.put_key(field, WIRE_LEN);
        self.put_varint(value.len() as u64);
        self.buf.extend_from_slice(value);
        self
    }

    pub fn string(&mut self, field: u32, value: &str) -> &mut Self {
        self.bytes(field, value.as_bytes())
    }

    /// Escribe un submensaje construido por `build` en un buffer aparte.
    pub fn message<F>(&mut self, field: u32, build: F) -> &mut Self
        where F: FnOnce(&mut Encoder)
    {
        let mut inner = Encoder::new();
        build(&mut inner);
        self.bytes(field, &inner.buf)
    }
}

/// Valor crudo de un campo leído.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WireValue<'a> {
    Varint(u64),
    Fixed64(u64),
    Bytes(&'a [u8]),
    Fixed32(u32),
}

impl<'a> WireValue<'a> {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            WireValue::Varint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_u64().map(|v| v as i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            WireValue::Fixed64(bits) => Some(f64::from_bits(*bits)),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match self {
            WireValue::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

/// Lector secuencial de campos `(número, valor)`.
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take_varint(&mut self) -> Result<u64, WireError> {
        let mut result: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = *self.data.get(self.pos).ok_or(WireError::Truncated)?;
            self.pos += 1;
            if shift >= 64 || (shift == 63 && byte > 1) {
                return Err(WireError::VarintOverflow);
            }
            result |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        let end = self.pos.checked_add(n).ok_or(WireError::Truncated)?;
        let slice = self.data.get(self.pos..end).ok_or(WireError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    /// Devuelve el siguiente campo o `None` al final del buffer.
    pub fn next_field(&mut self) -> Result<Option<(u32, WireValue<'a>)>, WireError> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }
        let key = self.take_varint()?;
        let field = (key >> 3) as u32;
        let wire_type = (key & 0x7) as u8;
        let value = match wire_type {
            WIRE_VARINT => WireValue::Varint(self.take_varint()?),
            WIRE_FIXED64 => {
                let raw = self.take(8)?;
                let mut arr = [0u8; 8];
                arr.copy_from_slice(raw);
                WireValue::Fixed64(u64::from_le_bytes(arr))
            }
            WIRE_LEN => {
                let len = self.take_varint()? as usize;
                WireValue::Bytes(self.take(len)?)
            }
            WIRE_FIXED32 => {
                let raw = self.take(4)?;
                let mut arr = [0u8; 4];
                arr.copy_from_slice(raw);
                WireValue::Fixed32(u32::from_le_bytes(arr))
            }
            other => return Err(WireError::InvalidWireType(other)),
        };
        Ok(Some((field, value)))
    }
}

/// Decodifica un campo string validando UTF-8.
pub fn read_string(field: u32, value: &WireValue<'_>) -> Result<String, WireError> {
    let bytes = value.as_bytes().ok_or(WireError::InvalidWireType(WIRE_VARINT))?;
    String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8(field))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_matches_reference_encoding() {
        let mut enc = Encoder::new();
        enc.varint(1, 150);
        assert_eq!(enc.into_bytes(), vec![0x08, 0x96, 0x01]);
    }

    #[test]
    fn negative_int64_uses_ten_bytes() {
        let mut enc = Encoder::new();
        enc.int64(8, -1);
        let bytes = enc.into_bytes();
        assert_eq!(bytes.len(), 11);
        let mut dec = Decoder::new(&bytes);
        let (field, value) = dec.next_field().unwrap().unwrap();
        assert_eq!(field, 8);
        assert_eq!(value.as_i64(), Some(-1));
    }

    #[test]
    fn truncated_message_is_rejected() {
        let mut enc = Encoder::new();
        enc.string(1, "hello");
        let mut bytes = enc.into_bytes();
        bytes.truncate(4);
        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.next_field(), Err(WireError::Truncated));
    }

    #[test]
    fn unknown_wire_type_is_an_error() {
        let bytes = [0x0b_u8]; // field 1, wire type 3 (group start)
        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.next_field(), Err(WireError::InvalidWireType(3)));
    }
}
