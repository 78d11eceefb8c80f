//! Wire constants

/// Version 3.0, sent in the startup packet
pub const PROTOCOL_VERSION: i32 = 0x0003_0000;

/// Type bytes of server messages
pub mod tags {
    #![allow(missing_docs)]

    pub const AUTHENTICATION: u8 = b'R';
    pub const BACKEND_KEY_DATA: u8 = b'K';
    pub const COMMAND_COMPLETE: u8 = b'C';
    pub const DATA_ROW: u8 = b'D';
    pub const EMPTY_QUERY_RESPONSE: u8 = b'I';
    pub const ERROR_RESPONSE: u8 = b'E';
    pub const NOTICE_RESPONSE: u8 = b'N';
    pub const PARAMETER_STATUS: u8 = b'S';
    pub const READY_FOR_QUERY: u8 = b'Z';
    pub const ROW_DESCRIPTION: u8 = b'T';
}

/// Type bytes of client messages
pub mod frontend {
    /// Shared by password, SASLInitialResponse and SASLResponse
    pub const PASSWORD: u8 = b'p';
    /// Simple query
    pub const QUERY: u8 = b'Q';
    /// Terminate
    pub const TERMINATE: u8 = b'X';
}

/// Request codes carried by `R` messages
pub mod auth {
    #![allow(missing_docs)]

    pub const OK: i32 = 0;
    pub const CLEARTEXT_PASSWORD: i32 = 3;
    pub const MD5_PASSWORD: i32 = 5;
    pub const SASL: i32 = 10;
    pub const SASL_CONTINUE: i32 = 11;
    pub const SASL_FINAL: i32 = 12;
}

/// ReadyForQuery status byte
pub mod tx_status {
    /// Outside a transaction block
    pub const IDLE: u8 = b'I';
    /// Inside a transaction block
    pub const IN_TRANSACTION: u8 = b'T';
    /// Inside a failed transaction block
    pub const FAILED: u8 = b'E';
}
