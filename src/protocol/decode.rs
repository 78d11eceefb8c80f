//! Protocol message decoding

use super::constants::{auth, tags};
use super::message::{AuthenticationMessage, BackendMessage, ErrorFields, FieldDescription};
use bytes::Bytes;
use std::io;

/// Maximum message length (1 GB), matching PostgreSQL's own `PQ_LARGE_MESSAGE_LIMIT`.
///
/// Any message whose length field exceeds this value is rejected before allocation.
const MAX_MESSAGE_LENGTH: usize = 1_073_741_824;

/// Decode one backend message from the front of `data`
///
/// # Returns
/// * `Ok(Some((msg, consumed)))`: a full message; the caller advances its buffer by `consumed`
/// * `Ok(None)`: the buffer holds only part of a message, read more
/// * `Err(e)`: the bytes can never form a valid message
pub fn decode_message(data: &[u8]) -> io::Result<Option<(BackendMessage, usize)>> {
    if data.len() < 5 {
        return Ok(None);
    }

    let tag = data[0];
    let len = i32::from_be_bytes([data[1], data[2], data[3], data[4]]);

    if len < 4 {
        return Err(invalid(format!("message length {} is below the minimum of 4", len)));
    }
    let len = len as usize;
    if len > MAX_MESSAGE_LENGTH {
        return Err(invalid(format!(
            "message length {} exceeds maximum allowed {}",
            len, MAX_MESSAGE_LENGTH
        )));
    }

    if data.len() < len + 1 {
        return Ok(None);
    }

    let mut body = Reader::new(&data[5..len + 1]);

    let msg = match tag {
        tags::AUTHENTICATION => decode_authentication(&mut body)?,
        tags::BACKEND_KEY_DATA => BackendMessage::BackendKeyData {
            process_id: body.i32("process id")?,
            secret_key: body.i32("secret key")?,
        },
        tags::COMMAND_COMPLETE => BackendMessage::CommandComplete(body.cstr("command tag")?),
        tags::DATA_ROW => decode_data_row(&mut body)?,
        tags::EMPTY_QUERY_RESPONSE => BackendMessage::EmptyQueryResponse,
        tags::ERROR_RESPONSE => BackendMessage::ErrorResponse(decode_error_fields(&mut body)?),
        tags::NOTICE_RESPONSE => BackendMessage::NoticeResponse(decode_error_fields(&mut body)?),
        tags::PARAMETER_STATUS => BackendMessage::ParameterStatus {
            name: body.cstr("parameter name")?,
            value: body.cstr("parameter value")?,
        },
        tags::READY_FOR_QUERY => BackendMessage::ReadyForQuery {
            status: body.u8("status byte")?,
        },
        tags::ROW_DESCRIPTION => decode_row_description(&mut body)?,
        _ => return Err(invalid(format!("unknown message tag: {}", tag))),
    };

    Ok(Some((msg, len + 1)))
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// Bounds-checked cursor over a message body
struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn take(&mut self, n: usize, what: &str) -> io::Result<&'a [u8]> {
        if self.data.len() < n {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("truncated {}", what),
            ));
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    fn u8(&mut self, what: &str) -> io::Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn i16(&mut self, what: &str) -> io::Result<i16> {
        let b = self.take(2, what)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    fn i32(&mut self, what: &str) -> io::Result<i32> {
        let b = self.take(4, what)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn cstr(&mut self, what: &str) -> io::Result<String> {
        let end = self
            .data
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| invalid(format!("missing null terminator in {}", what)))?;
        let s = String::from_utf8_lossy(&self.data[..end]).into_owned();
        self.data = &self.data[end + 1..];
        Ok(s)
    }

    fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.data)
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn decode_authentication(body: &mut Reader<'_>) -> io::Result<BackendMessage> {
    let auth_type = body.i32("auth type")?;

    let auth_msg = match auth_type {
        auth::OK => AuthenticationMessage::Ok,
        auth::CLEARTEXT_PASSWORD => AuthenticationMessage::CleartextPassword,
        auth::MD5_PASSWORD => {
            body.take(4, "salt data")?;
            AuthenticationMessage::Md5Password
        }
        auth::SASL => {
            // Mechanism list: cstrings terminated by an empty one
            let mut mechanisms = Vec::new();
            while !body.is_empty() {
                let mechanism = body.cstr("SASL mechanism")?;
                if mechanism.is_empty() {
                    break;
                }
                mechanisms.push(mechanism);
            }
            AuthenticationMessage::Sasl { mechanisms }
        }
        auth::SASL_CONTINUE => AuthenticationMessage::SaslContinue {
            data: body.rest().to_vec(),
        },
        auth::SASL_FINAL => AuthenticationMessage::SaslFinal {
            data: body.rest().to_vec(),
        },
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("unsupported auth type: {}", auth_type),
            ))
        }
    };

    Ok(BackendMessage::Authentication(auth_msg))
}

fn decode_data_row(body: &mut Reader<'_>) -> io::Result<BackendMessage> {
    let field_count = body.i16("field count")?;
    if field_count < 0 {
        return Err(invalid("negative field count"));
    }

    let mut fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        let field_len = body.i32("field length")?;
        let field = match field_len {
            -1 => None,
            n if n < 0 => return Err(invalid(format!("invalid field length {}", n))),
            n => Some(Bytes::copy_from_slice(body.take(n as usize, "field data")?)),
        };
        fields.push(field);
    }

    Ok(BackendMessage::DataRow(fields))
}

fn decode_error_fields(body: &mut Reader<'_>) -> io::Result<ErrorFields> {
    let mut fields = ErrorFields::default();

    while !body.is_empty() {
        let field_type = body.u8("error field type")?;
        if field_type == 0 {
            break;
        }
        let value = body.cstr("error field")?;

        match field_type {
            b'S' => fields.severity = Some(value),
            b'C' => fields.code = Some(value),
            b'M' => fields.message = Some(value),
            b'D' => fields.detail = Some(value),
            b'H' => fields.hint = Some(value),
            _ => {} // Ignore unknown fields
        }
    }

    Ok(fields)
}

fn decode_row_description(body: &mut Reader<'_>) -> io::Result<BackendMessage> {
    let field_count = body.i16("field count")?;
    if field_count < 0 {
        return Err(invalid("negative field count"));
    }

    let mut fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        let name = body.cstr("field name")?;
        // table oid, column attribute
        body.take(6, "column origin")?;
        let type_oid = body.i32("type oid")? as u32;
        // type size, type modifier
        body.take(6, "type size")?;
        let format_code = body.i16("format code")?;
        fields.push(FieldDescription {
            name,
            type_oid,
            format_code,
        });
    }

    Ok(BackendMessage::RowDescription(fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        out.extend_from_slice(&((body.len() + 4) as i32).to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn test_decode_authentication_ok() {
        let data = frame(b'R', &[0, 0, 0, 0]);

        let (msg, consumed) = decode_message(&data).unwrap().unwrap();
        assert!(matches!(
            msg,
            BackendMessage::Authentication(AuthenticationMessage::Ok)
        ));
        assert_eq!(consumed, 9); // 1 tag + 4 len + 4 auth type
    }

    #[test]
    fn test_decode_incomplete_needs_more() {
        let data = frame(b'Z', b"I");
        assert!(decode_message(&data[..3]).unwrap().is_none());
        assert!(decode_message(&data[..5]).unwrap().is_none());
        assert!(decode_message(&data).unwrap().is_some());
    }

    #[test]
    fn test_decode_rejects_oversized_message() {
        let oversized_len = (MAX_MESSAGE_LENGTH as i32) + 1;
        let len_bytes = oversized_len.to_be_bytes();
        let data = [b'D', len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]];

        let err = decode_message(&data).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_decode_rejects_short_length() {
        let data = [b'Z', 0, 0, 0, 2];
        assert!(decode_message(&data).is_err());
    }

    #[test]
    fn test_decode_unknown_tag() {
        let data = frame(b'?', &[]);
        assert!(decode_message(&data).is_err());
    }

    #[test]
    fn test_decode_ready_for_query() {
        let data = frame(b'Z', b"I");

        let (msg, consumed) = decode_message(&data).unwrap().unwrap();
        match msg {
            BackendMessage::ReadyForQuery { status } => assert_eq!(status, b'I'),
            _ => panic!("expected ReadyForQuery"),
        }
        assert_eq!(consumed, 6);
    }

    #[test]
    fn test_decode_data_row_with_null() {
        let mut body = vec![0, 3];
        body.extend_from_slice(&4i32.to_be_bytes());
        body.extend_from_slice(b"UTF8");
        body.extend_from_slice(&(-1i32).to_be_bytes());
        body.extend_from_slice(&0i32.to_be_bytes());
        let data = frame(b'D', &body);

        let (msg, _) = decode_message(&data).unwrap().unwrap();
        match msg {
            BackendMessage::DataRow(fields) => {
                assert_eq!(fields.len(), 3);
                assert_eq!(fields[0].as_deref(), Some(&b"UTF8"[..]));
                assert!(fields[1].is_none());
                assert_eq!(fields[2].as_deref(), Some(&b""[..]));
            }
            _ => panic!("expected DataRow"),
        }
    }

    #[test]
    fn test_decode_data_row_truncated_field() {
        let mut body = vec![0, 1];
        body.extend_from_slice(&10i32.to_be_bytes());
        body.extend_from_slice(b"abc");
        let data = frame(b'D', &body);

        let err = decode_message(&data).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_decode_row_description() {
        let mut body = vec![0, 1];
        body.extend_from_slice(b"name\0");
        body.extend_from_slice(&0i32.to_be_bytes());
        body.extend_from_slice(&0i16.to_be_bytes());
        body.extend_from_slice(&25i32.to_be_bytes());
        body.extend_from_slice(&(-1i16).to_be_bytes());
        body.extend_from_slice(&(-1i32).to_be_bytes());
        body.extend_from_slice(&0i16.to_be_bytes());
        let data = frame(b'T', &body);

        let (msg, _) = decode_message(&data).unwrap().unwrap();
        match msg {
            BackendMessage::RowDescription(fields) => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].name, "name");
                assert_eq!(fields[0].type_oid, 25);
                assert_eq!(fields[0].format_code, 0);
            }
            _ => panic!("expected RowDescription"),
        }
    }

    #[test]
    fn test_decode_error_response() {
        let data = frame(b'E', b"SERROR\0C42704\0Munrecognized configuration parameter\0\0");

        let (msg, _) = decode_message(&data).unwrap().unwrap();
        match msg {
            BackendMessage::ErrorResponse(fields) => {
                assert_eq!(fields.severity.as_deref(), Some("ERROR"));
                assert_eq!(fields.code.as_deref(), Some("42704"));
                assert_eq!(
                    fields.message.as_deref(),
                    Some("unrecognized configuration parameter")
                );
            }
            _ => panic!("expected ErrorResponse"),
        }
    }

    #[test]
    fn test_decode_sasl_mechanisms() {
        let mut body = 10i32.to_be_bytes().to_vec();
        body.extend_from_slice(b"SCRAM-SHA-256-PLUS\0SCRAM-SHA-256\0\0");
        let data = frame(b'R', &body);

        let (msg, _) = decode_message(&data).unwrap().unwrap();
        match msg {
            BackendMessage::Authentication(AuthenticationMessage::Sasl { mechanisms }) => {
                assert_eq!(mechanisms, vec!["SCRAM-SHA-256-PLUS", "SCRAM-SHA-256"]);
            }
            _ => panic!("expected SASL"),
        }
    }
}
