use tokio::io::AsyncRead;

use crate::error::{Error, Result};
use crate::mysql::io::{BufExt, BufMutExt};
use crate::mysql::protocol::response::{EofPacket, OkPacket};
use crate::mysql::protocol::statement::{BinaryRow, ComStmtPrepareOk, StmtPrepareResponse};
use crate::mysql::protocol::text::TextRow;
use crate::mysql::protocol::{
    read_packet, write_packet, Capabilities, ColumnDefinition, Decode, Encode, Packet,
};
use crate::net::Shutdown;

/// Whatever closed the result set on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    /// Legacy EOF packet.
    Eof(EofPacket),

    /// OK packet wearing the 0xFE header (`CLIENT_DEPRECATE_EOF`).
    OkEof(OkPacket),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultSetRow {
    Text(TextRow),
    Binary(BinaryRow),
}

/// An aggregated text or binary result set: column count, `N` column
/// definitions, the optional legacy EOF separator, rows, and the terminator.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    pub column_count: u64,
    pub columns: Vec<ColumnDefinition>,
    pub eof_after_columns: Option<EofPacket>,
    pub rows: Vec<ResultSetRow>,
    pub terminator: Terminator,
}

/// Read the remainder of a result set whose column-count packet is
/// `first`, collecting every wire packet for pass-through forwarding.
pub async fn read_result_set<S>(
    first: Packet,
    stream: &mut S,
    shutdown: &mut Shutdown,
    capabilities: Capabilities,
    binary: bool,
) -> Result<(ResultSet, Vec<Packet>)>
where
    S: AsyncRead + Unpin + Send,
{
    let mut packets = vec![first.clone()];

    let mut buf = &first.payload[..];
    let column_count = buf
        .get_uint_lenenc()?
        .ok_or_else(|| err_protocol!("expected result set column count"))?;

    let mut columns = Vec::with_capacity(column_count as usize);
    for _ in 0..column_count {
        let packet = read_packet(stream, shutdown).await?;
        columns.push(ColumnDefinition::decode_with(&packet.payload, capabilities)?);
        packets.push(packet);
    }

    let deprecate_eof = capabilities.contains(Capabilities::DEPRECATE_EOF);

    let mut eof_after_columns = None;
    if !deprecate_eof {
        let packet = read_packet(stream, shutdown).await?;
        eof_after_columns = Some(EofPacket::decode_with(&packet.payload, capabilities)?);
        packets.push(packet);
    }

    let mut rows = Vec::new();
    let terminator = loop {
        let packet = read_packet(stream, shutdown).await?;

        if !deprecate_eof && packet.is_eof_packet() {
            let eof = EofPacket::decode_with(&packet.payload, capabilities)?;
            packets.push(packet);
            break Terminator::Eof(eof);
        }

        if deprecate_eof && packet.is_ok_eof_packet() {
            let ok = OkPacket::decode_with(&packet.payload, capabilities)?;
            packets.push(packet);
            break Terminator::OkEof(ok);
        }

        rows.push(if binary {
            ResultSetRow::Binary(BinaryRow::decode(&packet.payload, &columns)?)
        } else {
            ResultSetRow::Text(TextRow::decode(&packet.payload, columns.len())?)
        });
        packets.push(packet);
    };

    Ok((
        ResultSet {
            column_count,
            columns,
            eof_after_columns,
            rows,
            terminator,
        },
        packets,
    ))
}

/// Read the remainder of a successful `COM_STMT_PREPARE` response whose
/// prepare-OK packet is `first`.
///
/// Expects `ok.num_params` parameter definitions, then `ok.num_columns`
/// column definitions, separated by EOFs only on pre-`DEPRECATE_EOF`
/// connections. Servers that skip the separator between the two definition
/// lists are tolerated by peeking the next packet's first byte.
pub async fn read_prepare_response<S>(
    first: Packet,
    stream: &mut S,
    shutdown: &mut Shutdown,
    capabilities: Capabilities,
) -> Result<(StmtPrepareResponse, Vec<Packet>)>
where
    S: AsyncRead + Unpin + Send,
{
    let ok = ComStmtPrepareOk::decode_with(&first.payload, capabilities)?;
    let mut packets = vec![first];

    let deprecate_eof = capabilities.contains(Capabilities::DEPRECATE_EOF);

    let mut param_defs = Vec::with_capacity(ok.num_params as usize);
    let mut eof_after_params = None;
    let mut column_defs = Vec::with_capacity(ok.num_columns as usize);
    let mut eof_after_columns = None;

    for _ in 0..ok.num_params {
        let packet = read_packet(stream, shutdown).await?;
        param_defs.push(ColumnDefinition::decode_with(&packet.payload, capabilities)?);
        packets.push(packet);
    }

    // pending holds one packet of lookahead while we settle whether the
    // server sent the separator EOF
    let mut pending: Option<Packet> = None;

    if ok.num_params > 0 && !deprecate_eof {
        let packet = read_packet(stream, shutdown).await?;
        if packet.is_eof_packet() {
            eof_after_params = Some(EofPacket::decode_with(&packet.payload, capabilities)?);
            packets.push(packet);
        } else {
            pending = Some(packet);
        }
    }

    for _ in 0..ok.num_columns {
        let packet = match pending.take() {
            Some(packet) => packet,
            None => read_packet(stream, shutdown).await?,
        };

        column_defs.push(ColumnDefinition::decode_with(&packet.payload, capabilities)?);
        packets.push(packet);
    }

    if let Some(stray) = pending {
        return Err(err_protocol!(
            "unexpected packet 0x{:02X?} inside prepare response",
            stray.first_byte()
        ));
    }

    if ok.num_columns > 0 && !deprecate_eof {
        let packet = read_packet(stream, shutdown).await?;
        eof_after_columns = Some(EofPacket::decode_with(&packet.payload, capabilities)?);
        packets.push(packet);
    }

    Ok((
        StmtPrepareResponse {
            ok,
            param_defs,
            eof_after_params,
            column_defs,
            eof_after_columns,
        },
        packets,
    ))
}

impl ResultSet {
    /// Frame the whole set back onto the wire, continuing from `seq`.
    pub fn encode_packets(&self, seq: &mut u8, capabilities: Capabilities, out: &mut Vec<u8>) {
        let mut payload = Vec::new();
        payload.put_uint_lenenc(self.column_count);
        push_frame(out, seq, &payload);

        for column in &self.columns {
            let mut payload = Vec::new();
            column.encode_with(&mut payload, capabilities);
            push_frame(out, seq, &payload);
        }

        if let Some(eof) = &self.eof_after_columns {
            let mut payload = Vec::new();
            eof.encode_with(&mut payload, capabilities);
            push_frame(out, seq, &payload);
        }

        for row in &self.rows {
            let mut payload = Vec::new();
            match row {
                ResultSetRow::Text(row) => row.encode_with(&mut payload, capabilities),
                ResultSetRow::Binary(row) => row.encode_with(&mut payload, capabilities),
            }
            push_frame(out, seq, &payload);
        }

        match &self.terminator {
            Terminator::Eof(eof) => {
                let mut payload = Vec::new();
                eof.encode_with(&mut payload, capabilities);
                push_frame(out, seq, &payload);
            }

            Terminator::OkEof(ok) => {
                let mut payload = Vec::new();
                ok.encode_with(&mut payload, capabilities);
                // the terminator keeps the 0xFE header it arrived with
                payload[0] = 0xFE;
                push_frame(out, seq, &payload);
            }
        }
    }
}

impl StmtPrepareResponse {
    pub fn encode_packets(&self, seq: &mut u8, capabilities: Capabilities, out: &mut Vec<u8>) {
        let mut payload = Vec::new();
        self.ok.encode_with(&mut payload, capabilities);
        push_frame(out, seq, &payload);

        for def in &self.param_defs {
            let mut payload = Vec::new();
            def.encode_with(&mut payload, capabilities);
            push_frame(out, seq, &payload);
        }

        if let Some(eof) = &self.eof_after_params {
            let mut payload = Vec::new();
            eof.encode_with(&mut payload, capabilities);
            push_frame(out, seq, &payload);
        }

        for def in &self.column_defs {
            let mut payload = Vec::new();
            def.encode_with(&mut payload, capabilities);
            push_frame(out, seq, &payload);
        }

        if let Some(eof) = &self.eof_after_columns {
            let mut payload = Vec::new();
            eof.encode_with(&mut payload, capabilities);
            push_frame(out, seq, &payload);
        }
    }
}

fn push_frame(out: &mut Vec<u8>, seq: &mut u8, payload: &[u8]) {
    write_packet(out, *seq, payload);
    *seq = seq.wrapping_add(1);
}

/// Distinguishes the first packet of a `COM_QUERY`/`COM_STMT_EXECUTE`
/// response. 0xFB opens a LOCAL INFILE request, which the engine does not
/// support.
pub fn classify_first_response(packet: &Packet) -> Result<FirstResponse> {
    Ok(match packet.first_byte() {
        Some(0x00) => FirstResponse::Ok,
        Some(0xFF) => FirstResponse::Err,
        Some(0xFB) => {
            return Err(Error::UnsupportedFeature(
                "LOCAL INFILE data transfer".into(),
            ));
        }
        Some(_) => FirstResponse::ResultSet,
        None => return Err(err_protocol!("empty response packet")),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstResponse {
    Ok,
    Err,
    ResultSet,
}
