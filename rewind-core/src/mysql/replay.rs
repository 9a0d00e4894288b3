//! The MySQL replayer: terminates the client leg and synthesizes server
//! responses from the mock store. There is no upstream.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::mock::{Clock, Mock, MockKind, WireMessage};
use crate::mysql::context::{DecodeContext, Mode, PreparedStatement};
use crate::mysql::matcher::{
    databases_compatible, match_command, plugins_compatible, MatchOutcome,
};
use crate::mysql::protocol::connect::HandshakeResponse;
use crate::mysql::protocol::response::OkPacket;
use crate::mysql::protocol::statement::{
    ComStmtClose, ComStmtExecute, ComStmtPrepare, ComStmtReset, ComStmtSendLongData,
};
use crate::mysql::protocol::text::ComQuery;
use crate::mysql::protocol::{
    read_packet, write_packet, Command, Decode, Encode, Message, Packet,
};
use crate::net::{write_all, ByteStream, Shutdown, StreamId};
use crate::options::SessionOptions;
use crate::store::MockStore;

/// Replay one MySQL connection from the store until the client quits.
pub async fn mock_outgoing(
    mut client: Box<dyn ByteStream>,
    store: Arc<dyn MockStore>,
    mut shutdown: Shutdown,
    opts: SessionOptions,
    _clock: &dyn Clock,
) -> Result<()> {
    let mut ctx = DecodeContext::new(Mode::Replay);
    let mut client_id = StreamId::next();

    let config = store
        .get_unfiltered_mocks()
        .into_iter()
        .find(|mock| mock.kind == MockKind::MySql && mock.is_config())
        .ok_or_else(|| Error::NoMockMatched("no recorded MySQL handshake".into()))?;

    client = replay_handshake(client, &config, &mut ctx, &mut client_id, &mut shutdown, &opts)
        .await?;

    loop {
        let packet = match read_packet(&mut client, &mut shutdown).await {
            Ok(packet) => packet,
            Err(Error::Closed) => break,
            Err(err) if err.is_eof() => break,
            Err(err) => return Err(err),
        };

        let Some(command_byte) = packet.first_byte() else {
            return Err(err_protocol!("empty command packet"));
        };

        let command = Command::try_from_u8(command_byte)?;
        let message = decode_command(command, &packet, &ctx)?;

        // every decoded client packet resets the op in replay
        ctx.reset_last_op(client_id);

        // bookkeeping that happens whether or not anything matches
        if let Message::StmtClose(close) = &message {
            ctx.remove_statement(close.statement_id);
        }

        let candidates = store.get_unfiltered_mocks();
        match match_command(&message, &packet.header, &candidates) {
            MatchOutcome::Matched(mock) => {
                store.update_unfiltered_mock(&mock, (*mock).clone());

                let mut seq = packet.header.seq.wrapping_add(1);
                let mut out = Vec::new();

                for response in &mock.responses {
                    let message = match &response.bundle.message {
                        WireMessage::MySql(message) => message,
                        #[allow(unreachable_patterns)]
                        _ => continue,
                    };

                    encode_response(message, &ctx, &mut seq, &mut out)?;

                    if let Message::StmtPrepareOk(prepare) = message {
                        ctx.store_statement(PreparedStatement {
                            statement_id: prepare.ok.statement_id,
                            num_params: prepare.ok.num_params,
                            num_columns: prepare.ok.num_columns,
                            param_defs: prepare.param_defs.clone(),
                            column_defs: prepare.column_defs.clone(),
                        });
                    }
                }

                if !out.is_empty() {
                    write_all(&mut client, &out, &mut shutdown).await?;
                }

                if matches!(message, Message::Quit) {
                    break;
                }
            }

            MatchOutcome::Miss => match &message {
                // a clean EOF for an unmocked quit
                Message::Quit => break,

                // fire-and-forget commands need nothing written back
                Message::StmtClose(_) | Message::StmtSendLongData(_) => {}

                Message::Query(query) if is_control_statement(&query.query) => {
                    debug!(query = &*query.query, "synthesizing OK for unmocked control statement");

                    let mut payload = Vec::new();
                    OkPacket::synthetic().encode_with(&mut payload, ctx.client_capabilities);

                    let mut out = Vec::new();
                    write_packet(&mut out, packet.header.seq.wrapping_add(1), &payload);
                    write_all(&mut client, &out, &mut shutdown).await?;
                }

                _ => {
                    warn!(
                        operation = message.type_tag(),
                        "no mock matched; closing the connection"
                    );
                    break;
                }
            },
        }
    }

    debug!(id = client_id.as_u64(), "replay finished");

    Ok(())
}

/// Drive the recorded connection phase against the live client: greeting
/// first, then whatever auth sub-states the config mock captured.
async fn replay_handshake(
    mut client: Box<dyn ByteStream>,
    config: &Arc<Mock>,
    ctx: &mut DecodeContext,
    client_id: &mut StreamId,
    shutdown: &mut Shutdown,
    opts: &SessionOptions,
) -> Result<Box<dyn ByteStream>> {
    let mut responses = config.responses.iter().filter_map(|response| {
        match &response.bundle.message {
            WireMessage::MySql(message) => Some(message),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    });

    let Some(Message::Handshake(greeting)) = responses.next() else {
        return Err(err_protocol!(
            "config mock does not open with a server greeting"
        ));
    };

    ctx.cache_greeting(*client_id, greeting.clone());
    ctx.plugin_name = greeting.auth_plugin_name.clone();

    let mut payload = Vec::new();
    greeting.encode_with(&mut payload, ctx.client_capabilities);

    let mut out = Vec::new();
    write_packet(&mut out, 0, &payload);
    write_all(&mut client, &out, shutdown).await?;

    let mut packet = read_packet(&mut client, shutdown).await?;

    if HandshakeResponse::is_ssl_request(&packet.payload) {
        let tls = opts
            .get_tls()
            .ok_or_else(|| Error::UnsupportedFeature("SSL upgrade without a TLS provider".into()))?;

        client = tls.upgrade_accept(client, opts.get_backdate()).await?;

        let upgraded = StreamId::next();
        ctx.rekey(*client_id, upgraded);
        ctx.use_ssl = true;
        *client_id = upgraded;

        packet = read_packet(&mut client, shutdown).await?;
    }

    let live = HandshakeResponse::decode(&packet.payload)?;
    ctx.client_capabilities = live.capabilities;
    if let Some(plugin) = &live.auth_plugin_name {
        ctx.plugin_name = Some(plugin.clone());
    }

    // sanity-compare against what was recorded; stray bytes in legacy
    // captures make these comparisons deliberately lossy
    if let Some(WireMessage::MySql(Message::HandshakeResponse(recorded))) = config
        .requests
        .iter()
        .map(|request| &request.bundle.message)
        .find(|message| matches!(message, WireMessage::MySql(Message::HandshakeResponse(_))))
    {
        if live.username != recorded.username {
            warn!(
                live = &*live.username,
                recorded = &*recorded.username,
                "username differs from the recording"
            );
        }

        if !databases_compatible(
            live.database.as_deref().unwrap_or(""),
            recorded.database.as_deref().unwrap_or(""),
        ) {
            warn!("database differs from the recording");
        }

        if !plugins_compatible(
            live.auth_plugin_name.as_deref().unwrap_or(""),
            recorded.auth_plugin_name.as_deref().unwrap_or(""),
        ) {
            warn!("auth plugin differs from the recording");
        }
    }

    let mut seq = packet.header.seq.wrapping_add(1);

    // walk the recorded auth exchange, reading a client packet wherever the
    // state machine says the client speaks
    for message in responses {
        let mut payload = Vec::new();

        match message {
            Message::Ok(ok) => {
                ok.encode_with(&mut payload, ctx.client_capabilities);
                let mut out = Vec::new();
                write_packet(&mut out, seq, &payload);
                write_all(&mut client, &out, shutdown).await?;
                break;
            }

            Message::Err(err) => {
                err.encode_with(&mut payload, ctx.client_capabilities);
                let mut out = Vec::new();
                write_packet(&mut out, seq, &payload);
                write_all(&mut client, &out, shutdown).await?;
                return Err(Error::NoMockMatched(
                    "recorded authentication ended in ERR".into(),
                ));
            }

            Message::AuthSwitchRequest(switch) => {
                ctx.plugin_name = Some(switch.plugin_name.clone());
                switch.encode_with(&mut payload, ctx.client_capabilities);

                let mut out = Vec::new();
                write_packet(&mut out, seq, &payload);
                write_all(&mut client, &out, shutdown).await?;

                let reply = read_packet(&mut client, shutdown).await?;
                seq = reply.header.seq.wrapping_add(1);
            }

            Message::AuthMoreData(more) => {
                more.encode_with(&mut payload, ctx.client_capabilities);

                let mut out = Vec::new();
                write_packet(&mut out, seq, &payload);
                write_all(&mut client, &out, shutdown).await?;

                if more.is_fast_auth_success() {
                    // the recorded OK follows immediately
                    seq = seq.wrapping_add(1);
                } else {
                    // full authentication: the client sends its password, a
                    // public-key request, or the encrypted password next
                    let reply = read_packet(&mut client, shutdown).await?;
                    seq = reply.header.seq.wrapping_add(1);
                }
            }

            other => {
                return Err(err_protocol!(
                    "unexpected {} in recorded connection phase",
                    other.type_tag()
                ));
            }
        }
    }

    Ok(client)
}

fn decode_command(command: Command, packet: &Packet, ctx: &DecodeContext) -> Result<Message> {
    let capabilities = ctx.client_capabilities;

    Ok(match command {
        Command::Quit => Message::Quit,
        Command::Ping => Message::Ping,
        Command::Statistics => Message::Statistics,
        Command::Debug => Message::Debug,
        Command::ResetConnection => Message::ResetConnection,

        Command::InitDb => {
            use crate::io::Buf;
            let mut buf = &packet.payload[1..];
            Message::InitDb {
                schema: buf.get_str(buf.len())?.into(),
            }
        }

        Command::Query => Message::Query(ComQuery::decode_with(&packet.payload, capabilities)?),

        Command::StmtPrepare => {
            Message::StmtPrepare(ComStmtPrepare::decode_with(&packet.payload, capabilities)?)
        }

        Command::StmtExecute => {
            use byteorder::{ByteOrder, LittleEndian};

            if packet.payload.len() < 5 {
                return Err(err_protocol!("COM_STMT_EXECUTE shorter than its header"));
            }

            let statement_id = LittleEndian::read_u32(&packet.payload[1..5]);
            let num_params = ctx
                .statement(statement_id)
                .map(|stmt| stmt.num_params)
                .unwrap_or(0);

            Message::StmtExecute(ComStmtExecute::decode_with_params(
                &packet.payload,
                num_params,
                capabilities,
            )?)
        }

        Command::StmtClose => {
            Message::StmtClose(ComStmtClose::decode_with(&packet.payload, capabilities)?)
        }

        Command::StmtReset => {
            Message::StmtReset(ComStmtReset::decode_with(&packet.payload, capabilities)?)
        }

        Command::StmtSendLongData => Message::StmtSendLongData(ComStmtSendLongData::decode_with(
            &packet.payload,
            capabilities,
        )?),

        Command::SetOption => Message::Raw(packet.payload.clone()),

        Command::ChangeUser => {
            return Err(Error::UnsupportedFeature("COM_CHANGE_USER".into()));
        }

        Command::StmtFetch => {
            return Err(Error::UnsupportedFeature("COM_STMT_FETCH cursors".into()));
        }
    })
}

/// Frame one stored response message, continuing the sequence ids.
fn encode_response(
    message: &Message,
    ctx: &DecodeContext,
    seq: &mut u8,
    out: &mut Vec<u8>,
) -> Result<()> {
    let capabilities = ctx.client_capabilities;

    match message {
        Message::Ok(ok) => {
            let mut payload = Vec::new();
            ok.encode_with(&mut payload, capabilities);
            write_packet(out, *seq, &payload);
            *seq = seq.wrapping_add(1);
        }

        Message::Err(err) => {
            let mut payload = Vec::new();
            err.encode_with(&mut payload, capabilities);
            write_packet(out, *seq, &payload);
            *seq = seq.wrapping_add(1);
        }

        Message::Eof(eof) => {
            let mut payload = Vec::new();
            eof.encode_with(&mut payload, capabilities);
            write_packet(out, *seq, &payload);
            *seq = seq.wrapping_add(1);
        }

        Message::StmtPrepareOk(prepare) => {
            prepare.encode_packets(seq, capabilities, out);
        }

        Message::TextResultSet(set) | Message::BinaryResultSet(set) => {
            set.encode_packets(seq, capabilities, out);
        }

        Message::Raw(bytes) => {
            write_packet(out, *seq, bytes);
            *seq = seq.wrapping_add(1);
        }

        other => {
            return Err(err_protocol!(
                "{} is not a command-phase response",
                other.type_tag()
            ));
        }
    }

    Ok(())
}

/// Control and DDL statements that are safe to acknowledge with a synthetic
/// OK when no mock matches.
fn is_control_statement(query: &str) -> bool {
    const PREFIXES: &[&str] = &[
        "BEGIN",
        "START TRANSACTION",
        "COMMIT",
        "ROLLBACK",
        "SET ",
        "ALTER ",
        "CREATE ",
        "DROP ",
        "TRUNCATE ",
        "RENAME ",
        "LOCK TABLES",
        "UNLOCK TABLES",
        "SAVEPOINT ",
        "RELEASE SAVEPOINT ",
        "USE ",
    ];

    let trimmed = query.trim().to_uppercase();

    PREFIXES.iter().any(|prefix| trimmed.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::is_control_statement;

    #[test]
    fn control_statements_are_recognized() {
        assert!(is_control_statement("BEGIN"));
        assert!(is_control_statement("  begin"));
        assert!(is_control_statement("start transaction"));
        assert!(is_control_statement("SET autocommit=0"));
        assert!(is_control_statement("USE shop"));
        assert!(is_control_statement("create table t (id int)"));

        assert!(!is_control_statement("SELECT 1"));
        assert!(!is_control_statement("INSERT INTO t VALUES (1)"));
        assert!(!is_control_statement("SETTLEMENT"));
    }
}
