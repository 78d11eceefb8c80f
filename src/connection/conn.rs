//! Core connection type

use super::state::ConnectionState;
use super::transport::Transport;
use crate::auth::{ScramClient, SCRAM_MECHANISM};
use crate::config::ConnectionConfig;
use crate::error::{WireError, WireResult};
use crate::metrics::labels;
use crate::protocol::constants::tx_status;
use crate::protocol::{
    decode_message, encode_message, AuthenticationMessage, BackendMessage, FieldDescription,
    FrontendMessage,
};
use bytes::{Buf, Bytes, BytesMut};
use std::collections::BTreeMap;
use tracing::Instrument;

/// A single Postgres session speaking the simple query protocol
#[derive(Debug)]
pub struct Connection {
    transport: Transport,
    state: ConnectionState,
    read_buf: BytesMut,
    process_id: Option<i32>,
    tx_status: u8,
    server_params: BTreeMap<String, String>,
}

impl Connection {
    /// Create connection from transport
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            state: ConnectionState::Initial,
            read_buf: BytesMut::with_capacity(8192),
            process_id: None,
            tx_status: tx_status::IDLE,
            server_params: BTreeMap::new(),
        }
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Backend process ID, once startup has completed
    pub fn process_id(&self) -> Option<i32> {
        self.process_id
    }

    /// Transaction status from the last ReadyForQuery
    pub fn transaction_status(&self) -> u8 {
        self.tx_status
    }

    /// True when idle and outside any transaction block
    pub fn is_reusable(&self) -> bool {
        self.state == ConnectionState::Idle && self.tx_status == tx_status::IDLE
    }

    /// Value the server reported for a parameter via ParameterStatus
    pub fn parameter_status(&self, name: &str) -> Option<&str> {
        self.server_params.get(name).map(String::as_str)
    }

    /// Perform startup and authentication
    pub async fn startup(&mut self, config: &ConnectionConfig) -> WireResult<()> {
        async {
            self.state.transition(ConnectionState::AwaitingAuth)?;

            let startup = FrontendMessage::Startup {
                version: crate::protocol::constants::PROTOCOL_VERSION,
                params: startup_params(config),
            };
            self.send_message(&startup).await?;

            self.state.transition(ConnectionState::Authenticating)?;
            self.authenticate(config).await?;

            self.state.transition(ConnectionState::Idle)?;
            tracing::debug!(process_id = ?self.process_id, "startup complete");
            Ok(())
        }
        .instrument(tracing::info_span!(
            "startup",
            user = %config.user,
            database = %config.database,
            address = %config.address
        ))
        .await
    }

    /// Handle authentication, then read until the first ReadyForQuery
    async fn authenticate(&mut self, config: &ConnectionConfig) -> WireResult<()> {
        let mut mechanism = labels::MECHANISM_NONE;
        let result = self.exchange_auth(config, &mut mechanism).await;
        if let Err(e) = &result {
            crate::metrics::counters::auth_failed(mechanism);
            tracing::debug!(mechanism, error = %e, "authentication failed");
        }
        result
    }

    async fn exchange_auth(
        &mut self,
        config: &ConnectionConfig,
        mechanism: &mut &'static str,
    ) -> WireResult<()> {
        loop {
            match self.receive_message().await? {
                BackendMessage::Authentication(auth) => match auth {
                    AuthenticationMessage::Ok => {
                        crate::metrics::counters::auth_successful(*mechanism);
                        tracing::debug!(mechanism = *mechanism, "authentication successful");
                        // Keep reading: parameter status and key data precede ReadyForQuery
                    }
                    AuthenticationMessage::CleartextPassword => {
                        *mechanism = labels::MECHANISM_CLEARTEXT;
                        crate::metrics::counters::auth_attempted(*mechanism);
                        let password = required_password(config)?;
                        self.send_message(&FrontendMessage::Password(password.to_string()))
                            .await?;
                    }
                    AuthenticationMessage::Md5Password => {
                        *mechanism = labels::MECHANISM_MD5;
                        crate::metrics::counters::auth_attempted(*mechanism);
                        return Err(WireError::Authentication(
                            "MD5 authentication not supported. Use SCRAM-SHA-256 or cleartext password"
                                .into(),
                        ));
                    }
                    AuthenticationMessage::Sasl { mechanisms } => {
                        *mechanism = labels::MECHANISM_SCRAM;
                        crate::metrics::counters::auth_attempted(*mechanism);
                        self.handle_sasl(&mechanisms, config).await?;
                    }
                    AuthenticationMessage::SaslContinue { .. }
                    | AuthenticationMessage::SaslFinal { .. } => {
                        return Err(WireError::Protocol(
                            "unexpected SASL message outside of SASL flow".into(),
                        ));
                    }
                },
                BackendMessage::BackendKeyData { process_id, .. } => {
                    self.process_id = Some(process_id);
                }
                BackendMessage::ParameterStatus { name, value } => {
                    tracing::trace!(%name, %value, "parameter status");
                    self.server_params.insert(name, value);
                }
                BackendMessage::NoticeResponse(notice) => {
                    tracing::debug!(%notice, "notice during startup");
                }
                BackendMessage::ReadyForQuery { status } => {
                    self.tx_status = status;
                    return Ok(());
                }
                BackendMessage::ErrorResponse(err) => {
                    return Err(WireError::Authentication(err.to_string()));
                }
                msg => {
                    return Err(WireError::Protocol(format!(
                        "unexpected message during auth: {:?}",
                        msg
                    )));
                }
            }
        }
    }

    /// SCRAM-SHA-256 exchange
    async fn handle_sasl(
        &mut self,
        mechanisms: &[String],
        config: &ConnectionConfig,
    ) -> WireResult<()> {
        if !mechanisms.iter().any(|m| m == SCRAM_MECHANISM) {
            return Err(WireError::Authentication(format!(
                "server does not support SCRAM-SHA-256. Available: {}",
                mechanisms.join(", ")
            )));
        }

        let scram = ScramClient::new(required_password(config)?);
        self.send_message(&FrontendMessage::SaslInitialResponse {
            mechanism: SCRAM_MECHANISM.to_string(),
            data: scram.client_first().into_bytes(),
        })
        .await?;

        let server_first = match self.receive_message().await? {
            BackendMessage::Authentication(AuthenticationMessage::SaslContinue { data }) => data,
            BackendMessage::ErrorResponse(err) => {
                return Err(WireError::Authentication(format!("SASL server error: {}", err)));
            }
            _ => {
                return Err(WireError::Protocol(
                    "expected SaslContinue message during SASL authentication".into(),
                ));
            }
        };
        let server_first = sasl_text(server_first)?;

        let (client_final, scram_state) = scram
            .client_final(&server_first)
            .map_err(|e| WireError::Authentication(format!("SCRAM error: {}", e)))?;
        self.send_message(&FrontendMessage::SaslResponse {
            data: client_final.into_bytes(),
        })
        .await?;

        let server_final = match self.receive_message().await? {
            BackendMessage::Authentication(AuthenticationMessage::SaslFinal { data }) => data,
            BackendMessage::ErrorResponse(err) => {
                return Err(WireError::Authentication(format!("SASL server error: {}", err)));
            }
            _ => {
                return Err(WireError::Protocol(
                    "expected SaslFinal message during SASL authentication".into(),
                ));
            }
        };

        scram
            .verify_server_final(&sasl_text(server_final)?, &scram_state)
            .map_err(|e| WireError::Authentication(format!("SCRAM verification failed: {}", e)))?;

        tracing::debug!("SCRAM-SHA-256 exchange verified");
        Ok(())
    }

    /// Send a simple query and read up to its first row description
    ///
    /// Returns the columns of the result set, or an empty list when the query
    /// produced none. Rows are then pulled with [`Connection::next_row`].
    pub async fn start_query(&mut self, query: &str) -> WireResult<Vec<FieldDescription>> {
        if self.state != ConnectionState::Idle {
            return Err(WireError::ConnectionBusy(format!(
                "connection in state: {}",
                self.state
            )));
        }

        self.state.transition(ConnectionState::QueryInProgress)?;
        self.send_message(&FrontendMessage::Query(query.to_string()))
            .await?;
        self.state.transition(ConnectionState::ReadingResults)?;

        loop {
            match self.receive_message().await? {
                BackendMessage::RowDescription(fields) => return Ok(fields),
                BackendMessage::CommandComplete(_) | BackendMessage::EmptyQueryResponse => {}
                BackendMessage::ReadyForQuery { status } => {
                    self.tx_status = status;
                    self.state.transition(ConnectionState::Idle)?;
                    return Ok(Vec::new());
                }
                BackendMessage::ErrorResponse(err) => {
                    tracing::debug!(%err, "query rejected");
                    self.drain_until_ready().await?;
                    return Err(WireError::Server(err.to_string()));
                }
                msg => self.handle_async_message(msg)?,
            }
        }
    }

    /// Next data row of the running query, or `None` once the server is ready again
    pub async fn next_row(&mut self) -> WireResult<Option<Vec<Option<Bytes>>>> {
        match self.state {
            ConnectionState::Idle => return Ok(None),
            ConnectionState::ReadingResults => {}
            other => {
                return Err(WireError::InvalidState {
                    expected: ConnectionState::ReadingResults.to_string(),
                    actual: other.to_string(),
                })
            }
        }

        loop {
            match self.receive_message().await? {
                BackendMessage::DataRow(values) => return Ok(Some(values)),
                BackendMessage::CommandComplete(tag) => {
                    tracing::trace!(%tag, "command complete");
                }
                // Later statements of a multi-statement query
                BackendMessage::RowDescription(_) | BackendMessage::EmptyQueryResponse => {}
                BackendMessage::ReadyForQuery { status } => {
                    self.tx_status = status;
                    self.state.transition(ConnectionState::Idle)?;
                    return Ok(None);
                }
                BackendMessage::ErrorResponse(err) => {
                    tracing::debug!(%err, "error while streaming rows");
                    self.drain_until_ready().await?;
                    return Err(WireError::Server(err.to_string()));
                }
                msg => self.handle_async_message(msg)?,
            }
        }
    }

    /// Notices and parameter changes may arrive at any time
    fn handle_async_message(&mut self, msg: BackendMessage) -> WireResult<()> {
        match msg {
            BackendMessage::NoticeResponse(notice) => {
                tracing::debug!(%notice, "server notice");
                Ok(())
            }
            BackendMessage::ParameterStatus { name, value } => {
                tracing::trace!(%name, %value, "parameter status");
                self.server_params.insert(name, value);
                Ok(())
            }
            msg => {
                self.state = ConnectionState::Closed;
                Err(WireError::Protocol(format!(
                    "unexpected message type in query response: {:?}",
                    msg
                )))
            }
        }
    }

    /// Discard messages up to ReadyForQuery after a server error
    async fn drain_until_ready(&mut self) -> WireResult<()> {
        loop {
            if let BackendMessage::ReadyForQuery { status } = self.receive_message().await? {
                self.tx_status = status;
                self.state.transition(ConnectionState::Idle)?;
                return Ok(());
            }
        }
    }

    /// Send a frontend message
    async fn send_message(&mut self, msg: &FrontendMessage) -> WireResult<()> {
        let buf = encode_message(msg);
        let result = self.transport.send(&buf).await;
        if result.is_err() {
            self.state = ConnectionState::Closed;
        }
        result
    }

    /// Receive a backend message
    async fn receive_message(&mut self) -> WireResult<BackendMessage> {
        loop {
            match decode_message(&self.read_buf) {
                Ok(Some((msg, consumed))) => {
                    self.read_buf.advance(consumed);
                    tracing::trace!(?msg, "backend message");
                    return Ok(msg);
                }
                Ok(None) => {}
                Err(e) => {
                    self.state = ConnectionState::Closed;
                    return Err(WireError::Protocol(e.to_string()));
                }
            }

            let n = match self.transport.read_buf(&mut self.read_buf).await {
                Ok(n) => n,
                Err(e) => {
                    self.state = ConnectionState::Closed;
                    return Err(e);
                }
            };
            if n == 0 {
                self.state = ConnectionState::Closed;
                return Err(WireError::ConnectionClosed);
            }
        }
    }

    /// Close the connection
    pub async fn close(mut self) -> WireResult<()> {
        if self.state != ConnectionState::Closed {
            let _ = self.send_message(&FrontendMessage::Terminate).await;
            self.state.transition(ConnectionState::Closed)?;
        }
        self.transport.shutdown().await
    }
}

fn required_password(config: &ConnectionConfig) -> WireResult<&str> {
    config
        .password
        .as_deref()
        .ok_or_else(|| WireError::Authentication("password required".into()))
}

fn sasl_text(data: Vec<u8>) -> WireResult<String> {
    String::from_utf8(data)
        .map_err(|e| WireError::Authentication(format!("invalid UTF-8 in SASL message: {}", e)))
}

/// user, database, then the session runtime parameters in key order
fn startup_params(config: &ConnectionConfig) -> Vec<(String, String)> {
    let mut params = Vec::with_capacity(config.runtime_params.len() + 2);
    params.push(("user".to_string(), config.user.clone()));
    params.push(("database".to_string(), config.database.clone()));
    params.extend(
        config
            .runtime_params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    params
}
