//! Messages exchanged with the server

use bytes::Bytes;
use std::fmt;

/// Sent by the client
#[derive(Debug, Clone)]
pub enum FrontendMessage {
    /// First packet of a session; carries no type byte
    Startup {
        /// Protocol version, see [`super::constants::PROTOCOL_VERSION`]
        version: i32,
        /// `user`, `database` and runtime parameters, written in this order
        params: Vec<(String, String)>,
    },
    /// Cleartext password reply
    Password(String),
    /// Simple query (`Q`)
    Query(String),
    /// Graceful disconnect (`X`)
    Terminate,
    /// First SASL message, naming the chosen mechanism
    SaslInitialResponse {
        /// e.g. `SCRAM-SHA-256`
        mechanism: String,
        /// client-first-message
        data: Vec<u8>,
    },
    /// Later SASL message
    SaslResponse {
        /// client-final-message
        data: Vec<u8>,
    },
}

/// Sent by the server
#[derive(Debug, Clone)]
pub enum BackendMessage {
    /// `R`: authentication request or outcome
    Authentication(AuthenticationMessage),
    /// `K`: identifiers used to cancel a running query
    BackendKeyData {
        /// Backend process ID
        process_id: i32,
        /// Cancellation key
        secret_key: i32,
    },
    /// `C`: end of one statement, with its command tag
    CommandComplete(String),
    /// `D`: one row; `None` is SQL NULL
    DataRow(Vec<Option<Bytes>>),
    /// `I`: the query string was empty
    EmptyQueryResponse,
    /// `E`
    ErrorResponse(ErrorFields),
    /// `N`
    NoticeResponse(ErrorFields),
    /// `S`: a server parameter's current value
    ParameterStatus {
        /// Parameter name
        name: String,
        /// Value
        value: String,
    },
    /// `Z`: server waits for the next query
    ReadyForQuery {
        /// `I` idle, `T` in a transaction block, `E` in a failed one
        status: u8,
    },
    /// `T`: columns of the rows that follow
    RowDescription(Vec<FieldDescription>),
}

/// Body of an `R` message
#[derive(Debug, Clone)]
pub enum AuthenticationMessage {
    /// Authenticated
    Ok,
    /// Send the password in clear
    CleartextPassword,
    /// MD5 challenge (refused by this client)
    Md5Password,
    /// SASL mechanisms the server offers
    Sasl {
        /// Mechanism names
        mechanisms: Vec<String>,
    },
    /// server-first-message
    SaslContinue {
        /// Raw message
        data: Vec<u8>,
    },
    /// server-final-message
    SaslFinal {
        /// Raw message
        data: Vec<u8>,
    },
}

/// One column of a row description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescription {
    /// Column name
    pub name: String,
    /// Type OID
    pub type_oid: u32,
    /// 0 for text, 1 for binary
    pub format_code: i16,
}

/// Fields of an error or notice we care about
#[derive(Debug, Clone, Default)]
pub struct ErrorFields {
    /// `ERROR`, `FATAL`, `WARNING`, ...
    pub severity: Option<String>,
    /// SQLSTATE
    pub code: Option<String>,
    /// Primary message
    pub message: Option<String>,
    /// Detail
    pub detail: Option<String>,
    /// Hint
    pub hint: Option<String>,
}

impl fmt::Display for ErrorFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(severity) = &self.severity {
            write!(f, "{}: ", severity)?;
        }
        f.write_str(self.message.as_deref().unwrap_or("(no message)"))?;
        if let Some(code) = &self.code {
            write!(f, " (SQLSTATE {})", code)?;
        }
        Ok(())
    }
}
