//! The MySQL recorder: one task per client connection, pumping bytes both
//! ways unchanged while decoding them, and emitting one mock per semantic
//! exchange.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::mock::{build_mock, Clock, MockKind, Request, Response};
use crate::mysql::connection::run_handshake;
use crate::mysql::context::{DecodeContext, Mode, PreparedStatement};
use crate::mysql::protocol::response::{EofPacket, ErrPacket, OkPacket};
use crate::mysql::protocol::statement::{
    ComStmtClose, ComStmtExecute, ComStmtPrepare, ComStmtReset, ComStmtSendLongData,
};
use crate::mysql::protocol::text::ComQuery;
use crate::mysql::protocol::{
    classify_first_response, read_packet, read_prepare_response, read_result_set, Command, Decode,
    FirstResponse, Message, Packet,
};
use crate::mysql::{forward, mysql_request, mysql_response};
use crate::net::{ByteStream, Shutdown, StreamId};
use crate::options::SessionOptions;
use crate::store::MockSink;

/// Record one MySQL connection until either side closes or the shutdown
/// token fires.
pub async fn record_outgoing(
    client: Box<dyn ByteStream>,
    upstream: Box<dyn ByteStream>,
    sink: MockSink,
    mut shutdown: Shutdown,
    opts: SessionOptions,
    clock: &dyn Clock,
) -> Result<()> {
    let mut ctx = DecodeContext::new(Mode::Record);

    let phase = run_handshake(client, upstream, &mut ctx, &mut shutdown, &opts, clock).await?;

    let mut client = phase.client;
    let mut upstream = phase.upstream;
    let client_id = phase.client_id;

    emit(&sink, true, phase.requests, phase.responses, clock).await?;

    if phase.failed {
        // the server refused the login; nothing more will arrive
        return Ok(());
    }

    loop {
        let packet = match read_packet(&mut client, &mut shutdown).await {
            Ok(packet) => packet,
            Err(Error::Closed) => break,
            Err(err) if err.is_eof() => break,
            Err(err) => return Err(err),
        };

        forward(&mut upstream, &packet, &mut shutdown).await?;

        let Some(command_byte) = packet.first_byte() else {
            return Err(err_protocol!("empty command packet"));
        };
        ctx.set_last_op(client_id, command_byte);

        let command = Command::try_from_u8(command_byte)?;
        match record_command(
            command,
            packet,
            &mut client,
            &mut upstream,
            &mut ctx,
            &mut shutdown,
            client_id,
            clock,
            &sink,
        )
        .await
        {
            Ok(ConnectionState::Open) => {}
            Ok(ConnectionState::Closed) => break,
            Err(Error::Closed) => break,
            Err(err) if err.is_eof() => {
                // upstream went away mid-exchange; the partial exchange is
                // dropped, everything already emitted stands
                warn!(error = %err, "upstream closed during a response");
                break;
            }
            Err(err) => return Err(err),
        }
    }

    debug!(id = client_id.as_u64(), "recording finished");

    Ok(())
}

enum ConnectionState {
    Open,
    Closed,
}

#[allow(clippy::too_many_arguments)]
async fn record_command(
    command: Command,
    packet: Packet,
    client: &mut Box<dyn ByteStream>,
    upstream: &mut Box<dyn ByteStream>,
    ctx: &mut DecodeContext,
    shutdown: &mut Shutdown,
    client_id: StreamId,
    clock: &dyn Clock,
    sink: &MockSink,
) -> Result<ConnectionState> {
    let capabilities = ctx.client_capabilities;
    let header = packet.header;

    let request_message = match command {
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
            let statement_id = peek_statement_id(&packet)?;
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
            let close = ComStmtClose::decode_with(&packet.payload, capabilities)?;
            ctx.remove_statement(close.statement_id);
            Message::StmtClose(close)
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
    };

    let request = mysql_request(header, request_message, client_id, clock);

    if matches!(command, Command::Quit) {
        // no response follows; the connection is done
        emit(sink, false, vec![request], vec![], clock).await?;
        return Ok(ConnectionState::Closed);
    }

    let responses = read_responses(client, upstream, ctx, shutdown, client_id, clock).await?;

    emit(sink, false, vec![request], responses, clock).await?;

    Ok(ConnectionState::Open)
}

/// Read and decode the upstream response(s) for the exchange in flight.
///
/// The response shape is dictated by the connection's last decoded
/// request-side opcode, not by anything on the response wire itself: a 0x00
/// packet after `COM_STMT_PREPARE` is a prepare-OK with definition packets
/// behind it, after `COM_QUERY` it is a plain OK.
async fn read_responses(
    client: &mut Box<dyn ByteStream>,
    upstream: &mut Box<dyn ByteStream>,
    ctx: &mut DecodeContext,
    shutdown: &mut Shutdown,
    client_id: StreamId,
    clock: &dyn Clock,
) -> Result<Vec<Response>> {
    let last_op = ctx
        .last_op(client_id)
        .ok_or_else(|| err_protocol!("no request opcode on record for this connection"))?;

    let capabilities = ctx.client_capabilities;

    Ok(match Command::try_from_u8(last_op)? {
        // nothing comes back at all
        Command::Quit | Command::StmtClose | Command::StmtSendLongData => Vec::new(),

        // exactly one packet
        Command::InitDb
        | Command::Ping
        | Command::Statistics
        | Command::Debug
        | Command::ResetConnection
        | Command::StmtReset
        | Command::SetOption => {
            let packet = read_packet(upstream, shutdown).await?;
            forward(client, &packet, shutdown).await?;

            vec![mysql_response(
                packet.header,
                decode_single_response(&packet, ctx)?,
                client_id,
                clock,
            )]
        }

        Command::Query => {
            let first = read_packet(upstream, shutdown).await?;

            match classify_first_response(&first)? {
                FirstResponse::Ok => {
                    forward(client, &first, shutdown).await?;
                    let ok = OkPacket::decode_with(&first.payload, capabilities)?;
                    vec![mysql_response(first.header, Message::Ok(ok), client_id, clock)]
                }

                FirstResponse::Err => {
                    forward(client, &first, shutdown).await?;
                    let err = ErrPacket::decode_with(&first.payload, capabilities)?;
                    vec![mysql_response(first.header, Message::Err(err), client_id, clock)]
                }

                FirstResponse::ResultSet => {
                    let first_header = first.header;
                    let (set, packets) =
                        read_result_set(first, upstream, shutdown, capabilities, false).await?;
                    forward_all(client, &packets, shutdown).await?;

                    vec![mysql_response(
                        first_header,
                        Message::TextResultSet(set),
                        client_id,
                        clock,
                    )]
                }
            }
        }

        Command::StmtPrepare => {
            let first = read_packet(upstream, shutdown).await?;

            if first.is_err_packet() {
                forward(client, &first, shutdown).await?;
                let err = ErrPacket::decode_with(&first.payload, capabilities)?;
                vec![mysql_response(first.header, Message::Err(err), client_id, clock)]
            } else {
                let first_header = first.header;
                let (response, packets) =
                    read_prepare_response(first, upstream, shutdown, capabilities).await?;
                forward_all(client, &packets, shutdown).await?;

                ctx.store_statement(PreparedStatement {
                    statement_id: response.ok.statement_id,
                    num_params: response.ok.num_params,
                    num_columns: response.ok.num_columns,
                    param_defs: response.param_defs.clone(),
                    column_defs: response.column_defs.clone(),
                });

                vec![mysql_response(
                    first_header,
                    Message::StmtPrepareOk(response),
                    client_id,
                    clock,
                )]
            }
        }

        Command::StmtExecute => {
            let first = read_packet(upstream, shutdown).await?;

            match classify_first_response(&first)? {
                FirstResponse::Ok => {
                    forward(client, &first, shutdown).await?;
                    let ok = OkPacket::decode_with(&first.payload, capabilities)?;
                    vec![mysql_response(first.header, Message::Ok(ok), client_id, clock)]
                }

                FirstResponse::Err => {
                    forward(client, &first, shutdown).await?;
                    let err = ErrPacket::decode_with(&first.payload, capabilities)?;
                    vec![mysql_response(first.header, Message::Err(err), client_id, clock)]
                }

                FirstResponse::ResultSet => {
                    let first_header = first.header;
                    let (set, packets) =
                        read_result_set(first, upstream, shutdown, capabilities, true).await?;
                    forward_all(client, &packets, shutdown).await?;

                    vec![mysql_response(
                        first_header,
                        Message::BinaryResultSet(set),
                        client_id,
                        clock,
                    )]
                }
            }
        }

        Command::ChangeUser | Command::StmtFetch => {
            return Err(err_protocol!(
                "no response shape defined for opcode 0x{:02X}",
                last_op
            ));
        }
    })
}

fn decode_single_response(packet: &Packet, ctx: &DecodeContext) -> Result<Message> {
    let capabilities = ctx.client_capabilities;

    Ok(match packet.first_byte() {
        Some(0x00) => Message::Ok(OkPacket::decode_with(&packet.payload, capabilities)?),
        Some(0xFF) => Message::Err(ErrPacket::decode_with(&packet.payload, capabilities)?),
        Some(0xFE) if packet.is_eof_packet() => {
            Message::Eof(EofPacket::decode_with(&packet.payload, capabilities)?)
        }

        // COM_STATISTICS answers with a bare human-readable string
        _ => Message::Raw(packet.payload.clone()),
    })
}

fn peek_statement_id(packet: &Packet) -> Result<u32> {
    use byteorder::{ByteOrder, LittleEndian};

    if packet.payload.len() < 5 {
        return Err(err_protocol!("COM_STMT_EXECUTE shorter than its header"));
    }

    Ok(LittleEndian::read_u32(&packet.payload[1..5]))
}

async fn forward_all(
    client: &mut Box<dyn ByteStream>,
    packets: &[Packet],
    shutdown: &mut Shutdown,
) -> Result<()> {
    for packet in packets {
        forward(client, packet, shutdown).await?;
    }

    Ok(())
}

pub(crate) async fn emit(
    sink: &MockSink,
    config: bool,
    requests: Vec<Request>,
    responses: Vec<Response>,
    clock: &dyn Clock,
) -> Result<()> {
    let mock = build_mock(MockKind::MySql, config, requests, responses, clock);

    sink.send(mock).await.map_err(|_| Error::Closed)
}
