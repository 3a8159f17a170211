//! MySQL protocol implementation
//!
//! Serves the MySQL client/server protocol over a local stream (the
//! listener hands in Unix socket connections). Text protocol only.

pub mod auth;
pub mod command;
pub mod error;
pub mod handshake;
pub mod packet;
pub mod resultset;
pub mod types;

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tracing::{debug, info, warn};

use crate::executor::error::{codes, states};
use crate::executor::{Engine, EngineError, QueryResult, Session};
use crate::sql::Parser;

use self::auth::HandshakeResponse41;
use self::command::{parse_command, ParsedCommand};
use self::error::{ProtocolError, ProtocolResult};
use self::handshake::{capabilities, encode_auth_switch, Greeting, AUTH_PLUGIN_NAME};
use self::packet::{PacketReader, PacketWriter};
use self::resultset::{
    encode_column_count, encode_eof_packet, encode_err_packet, encode_ok_packet,
    encode_text_row, server_status, ColumnDefinition41,
};

/// MySQL connection handler
pub struct MySqlConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    reader: PacketReader<ReadHalf<S>>,
    writer: PacketWriter<WriteHalf<S>>,
    connection_id: u32,
    /// Scramble from handshake
    scramble: [u8; 20],
    client_capabilities: u32,
    session: Session,
    engine: Arc<Engine>,
}

impl<S> MySqlConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, connection_id: u32, engine: Arc<Engine>) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);

        MySqlConnection {
            reader: PacketReader::new(read_half),
            writer: PacketWriter::new(write_half),
            connection_id,
            scramble: [0u8; 20],
            client_capabilities: 0,
            session: Session::new(connection_id),
            engine,
        }
    }

    /// Perform the MySQL handshake and authenticate the client
    pub async fn handshake(&mut self) -> ProtocolResult<()> {
        debug!(connection_id = self.connection_id, "Starting MySQL handshake");

        let greeting = Greeting::new(self.connection_id, self.engine.server_version());
        self.scramble = greeting.scramble;
        self.writer.write_packet(&greeting.encode()).await?;
        self.writer.flush().await?;

        self.reader.set_sequence(1);
        let response_packet = self.reader.read_packet().await?;
        let response = HandshakeResponse41::parse(&response_packet)?;
        self.client_capabilities = response.capability_flags;

        // Clients that default to another plugin get switched over
        let plugin = response
            .auth_plugin_name
            .as_deref()
            .unwrap_or(AUTH_PLUGIN_NAME);
        let auth_response = if plugin == AUTH_PLUGIN_NAME {
            self.writer.set_sequence(2);
            response.auth_response.clone()
        } else {
            debug!(plugin, "Switching client to mysql_native_password");
            self.writer.set_sequence(2);
            self.writer.write_packet(&encode_auth_switch(&self.scramble)).await?;
            self.writer.flush().await?;

            self.reader.set_sequence(3);
            let switched = self.reader.read_packet().await?;
            self.writer.set_sequence(4);
            switched
        };

        if let Err(e) = self.engine.authenticate(
            &mut self.session,
            &response.username,
            &self.scramble,
            &auth_response,
        ) {
            warn!(
                connection_id = self.connection_id,
                username = %response.username,
                "Authentication failed"
            );
            return self.reject(e).await;
        }

        self.session.found_rows = response.has_capability(capabilities::CLIENT_FOUND_ROWS);

        if let Some(db) = &response.database {
            if let Err(e) = self.engine.use_database(&mut self.session, db) {
                return self.reject(e).await;
            }
        }

        self.write_ok(0, 0, server_status(false)).await?;
        self.writer.flush().await?;

        info!(
            connection_id = self.connection_id,
            username = %response.username,
            database = ?self.session.database,
            "Handshake completed"
        );
        Ok(())
    }

    /// Send the handshake failure to the client and end the connection
    async fn reject(&mut self, e: EngineError) -> ProtocolResult<()> {
        self.write_engine_error(&e).await?;
        self.writer.flush().await?;
        Err(ProtocolError::AuthFailed(e.message))
    }

    /// Run the command loop until the client quits or disconnects
    pub async fn run(&mut self) -> ProtocolResult<()> {
        loop {
            self.reader.reset_sequence();

            let packet = match self.reader.read_packet().await {
                Ok(p) => p,
                Err(ProtocolError::ConnectionClosed) => {
                    debug!(connection_id = self.connection_id, "Client disconnected");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            // Replies continue the command's sequence
            self.writer.set_sequence(1);

            if !self.handle_command(parse_command(&packet)?).await? {
                return Ok(());
            }
            self.writer.flush().await?;
        }
    }

    /// Handle a single command, returns false if client quit
    async fn handle_command(&mut self, cmd: ParsedCommand) -> ProtocolResult<bool> {
        match cmd {
            ParsedCommand::Quit => {
                debug!(connection_id = self.connection_id, "COM_QUIT");
                return Ok(false);
            }

            ParsedCommand::Ping => {
                self.write_ok(0, 0, server_status(false)).await?;
            }

            ParsedCommand::InitDb(db) => {
                debug!(connection_id = self.connection_id, database = %db, "COM_INIT_DB");
                match self.engine.use_database(&mut self.session, &db) {
                    Ok(()) => self.write_ok(0, 0, server_status(false)).await?,
                    Err(e) => self.write_engine_error(&e).await?,
                }
            }

            ParsedCommand::Query(sql) => {
                debug!(connection_id = self.connection_id, sql = %sql, "COM_QUERY");
                self.handle_query(&sql).await?;
            }

            ParsedCommand::StmtPrepare => {
                self.write_err(
                    codes::ER_UNSUPPORTED_PS,
                    states::GENERAL_ERROR,
                    "This command is not supported in the prepared statement protocol yet",
                )
                .await?;
            }

            ParsedCommand::StmtClose => {}

            ParsedCommand::ResetConnection => {
                debug!(connection_id = self.connection_id, "COM_RESET_CONNECTION");
                self.engine.reset_session(&mut self.session);
                self.write_ok(0, 0, server_status(false)).await?;
            }

            ParsedCommand::Unsupported(code) => {
                warn!(connection_id = self.connection_id, command = code, "Unknown command");
                self.write_err(codes::ER_UNKNOWN_COM_ERROR, "08S01", "Unknown command")
                    .await?;
            }
        }
        Ok(true)
    }

    /// Execute a COM_QUERY, one result per statement. The first failing
    /// statement ends the batch with an ERR packet.
    async fn handle_query(&mut self, sql: &str) -> ProtocolResult<()> {
        let statements = match Parser::parse_script(sql) {
            Ok(s) => s,
            Err(e) => return self.write_engine_error(&EngineError::from(e)).await,
        };

        if statements.is_empty() {
            return self
                .write_err(codes::ER_EMPTY_QUERY, states::SYNTAX_ERROR, "Query was empty")
                .await;
        }

        if statements.len() > 1 {
            if self.client_capabilities & capabilities::CLIENT_MULTI_STATEMENTS == 0 {
                return self
                    .write_engine_error(&EngineError::syntax(
                        "multiple statements in one query",
                    ))
                    .await;
            }
            if !self.engine.multi_statement_enabled(&self.session) {
                return self
                    .write_err(
                        codes::ER_MULTI_STATEMENT_DISABLED,
                        states::GENERAL_ERROR,
                        "client has multi-statement capability disabled. Run SET GLOBAL multi_statement_mode='ON' after you understand the security risk",
                    )
                    .await;
            }
        }

        let total = statements.len();
        for (i, stmt) in statements.into_iter().enumerate() {
            let more = i + 1 < total;
            match self.engine.execute(&mut self.session, stmt) {
                Ok(result) => self.write_result(result, more).await?,
                Err(e) => {
                    debug!(connection_id = self.connection_id, code = e.code, error = %e.message, "Statement failed");
                    return self.write_engine_error(&e).await;
                }
            }
        }
        Ok(())
    }

    async fn write_result(&mut self, result: QueryResult, more: bool) -> ProtocolResult<()> {
        let status = server_status(more);
        match result {
            QueryResult::Affected {
                affected_rows,
                last_insert_id,
            } => self.write_ok(affected_rows, last_insert_id, status).await,
            QueryResult::Rows { columns, rows } => {
                self.writer
                    .write_packet(&encode_column_count(columns.len() as u64))
                    .await?;

                let schema = self.session.database.clone().unwrap_or_default();
                for col in &columns {
                    let def = ColumnDefinition41::from_output_column(col, &schema);
                    self.writer.write_packet(&def.encode()).await?;
                }
                self.writer.write_packet(&encode_eof_packet(0, status)).await?;

                for row in &rows {
                    self.writer
                        .write_packet(&encode_text_row(row, &columns))
                        .await?;
                }
                self.writer.write_packet(&encode_eof_packet(0, status)).await
            }
        }
    }

    async fn write_ok(
        &mut self,
        affected_rows: u64,
        last_insert_id: u64,
        status: u16,
    ) -> ProtocolResult<()> {
        let packet = encode_ok_packet(affected_rows, last_insert_id, status, 0);
        self.writer.write_packet(&packet).await
    }

    async fn write_err(&mut self, code: u16, state: &str, message: &str) -> ProtocolResult<()> {
        let packet = encode_err_packet(code, state, message);
        self.writer.write_packet(&packet).await
    }

    async fn write_engine_error(&mut self, e: &EngineError) -> ProtocolResult<()> {
        self.write_err(e.code, e.state, &e.message).await
    }
}
