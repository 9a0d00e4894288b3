//! The MySQL connection phase, driven from the middle: every packet is
//! forwarded unchanged while the machine tracks which side speaks next and
//! what shape its packet must have.

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::mock::{Clock, Request, Response};
use crate::mysql::context::{DecodeContext, LAST_OP_HANDSHAKE};
use crate::mysql::protocol::connect::{
    AuthMoreData, AuthSwitchRequest, Handshake, HandshakeResponse, SslRequest,
};
use crate::mysql::protocol::response::{ErrPacket, OkPacket};
use crate::mysql::protocol::{read_packet, Decode, Message};
use crate::mysql::{forward, mysql_request, mysql_response, MySql};
use crate::net::{ByteStream, Shutdown, StreamId};
use crate::options::SessionOptions;

/// What the handshake left behind: the (possibly TLS-upgraded) streams, the
/// surviving connection id, and the packets of the exchange in wire order.
pub(crate) struct ConnectionPhase {
    pub client: Box<dyn ByteStream>,
    pub upstream: Box<dyn ByteStream>,
    pub client_id: StreamId,
    pub requests: Vec<Request>,
    pub responses: Vec<Response>,

    /// Authentication ended in an ERR packet. The exchange is still recorded.
    pub failed: bool,
}

pub(crate) async fn run_handshake(
    mut client: Box<dyn ByteStream>,
    mut upstream: Box<dyn ByteStream>,
    ctx: &mut DecodeContext,
    shutdown: &mut Shutdown,
    opts: &SessionOptions,
    clock: &dyn Clock,
) -> Result<ConnectionPhase> {
    let mut client_id = StreamId::next();
    let mut requests = Vec::new();
    let mut responses = Vec::new();

    // the server speaks first; its reassembled frame must satisfy MatchType
    // before anything is interpreted
    let packet = read_packet(&mut upstream, shutdown).await?;
    if !MySql::match_type(&packet.to_bytes()) {
        return Err(err_protocol!(
            "initial upstream packet is not a MySQL frame"
        ));
    }
    forward(&mut client, &packet, shutdown).await?;

    let greeting = Handshake::decode(&packet.payload)?;
    trace!(version = %greeting.server_version, "server greeting");

    ctx.cache_greeting(client_id, greeting.clone());
    ctx.set_last_op(client_id, LAST_OP_HANDSHAKE);
    ctx.plugin_name = greeting.auth_plugin_name.clone();

    responses.push(mysql_response(
        packet.header,
        Message::Handshake(greeting),
        client_id,
        clock,
    ));

    // client answers with HandshakeResponse41, or SSLRequest first
    let mut packet = read_packet(&mut client, shutdown).await?;

    if HandshakeResponse::is_ssl_request(&packet.payload) {
        let ssl = SslRequest::decode(&packet.payload)?;
        forward(&mut upstream, &packet, shutdown).await?;
        requests.push(mysql_request(
            packet.header,
            Message::SslRequest(ssl),
            client_id,
            clock,
        ));

        let tls = opts
            .get_tls()
            .ok_or_else(|| Error::UnsupportedFeature("SSL upgrade without a TLS provider".into()))?;

        let sni = opts.get_dst().map(|dst| dst.host.clone()).unwrap_or_default();
        client = tls.upgrade_accept(client, opts.get_backdate()).await?;
        upstream = tls.upgrade_connect(upstream, &sni).await?;

        // both streams were replaced: move the cached greeting and last-op
        // onto a fresh connection identity
        let upgraded = StreamId::next();
        ctx.rekey(client_id, upgraded);
        ctx.set_last_op(upgraded, LAST_OP_HANDSHAKE);
        ctx.use_ssl = true;
        client_id = upgraded;

        debug!(id = client_id.as_u64(), "connection upgraded to TLS");

        packet = read_packet(&mut client, shutdown).await?;
    }

    forward(&mut upstream, &packet, shutdown).await?;

    let response = HandshakeResponse::decode(&packet.payload)?;
    ctx.client_capabilities = response.capabilities;
    if let Some(plugin) = &response.auth_plugin_name {
        ctx.plugin_name = Some(plugin.clone());
    }

    requests.push(mysql_request(
        packet.header,
        Message::HandshakeResponse(response),
        client_id,
        clock,
    ));

    // the server now drives authentication to OK or ERR
    let failed = loop {
        let packet = read_packet(&mut upstream, shutdown).await?;
        forward(&mut client, &packet, shutdown).await?;

        match packet.first_byte() {
            Some(0x00) => {
                let ok = OkPacket::decode_with(&packet.payload, ctx.client_capabilities)?;
                responses.push(mysql_response(packet.header, Message::Ok(ok), client_id, clock));
                break false;
            }

            Some(0xFF) => {
                let err = ErrPacket::decode_with(&packet.payload, ctx.client_capabilities)?;
                debug!(code = err.error_code, "authentication failed");
                responses.push(mysql_response(
                    packet.header,
                    Message::Err(err),
                    client_id,
                    clock,
                ));
                break true;
            }

            Some(0xFE) => {
                let switch = AuthSwitchRequest::decode(&packet.payload)?;
                ctx.plugin_name = Some(switch.plugin_name.clone());
                responses.push(mysql_response(
                    packet.header,
                    Message::AuthSwitchRequest(switch),
                    client_id,
                    clock,
                ));

                // opaque client reply, shaped by the new plugin
                let reply = read_packet(&mut client, shutdown).await?;
                forward(&mut upstream, &reply, shutdown).await?;
                requests.push(mysql_request(
                    reply.header,
                    Message::AuthSwitchResponse(reply.payload.clone()),
                    client_id,
                    clock,
                ));
            }

            Some(0x01) => {
                let more = AuthMoreData::decode(&packet.payload)?;
                let fast = more.is_fast_auth_success();
                responses.push(mysql_response(
                    packet.header,
                    Message::AuthMoreData(more),
                    client_id,
                    clock,
                ));

                match ctx.plugin_name.as_deref() {
                    Some("caching_sha2_password") => {
                        if fast {
                            // server's OK follows with no client packet between
                            continue;
                        }

                        // full authentication (0x04), or the PEM public key
                        // that follows it: either way the client speaks next
                        // (password over TLS, 0x02 key request, or the
                        // RSA-encrypted password)
                        let reply = read_packet(&mut client, shutdown).await?;
                        forward(&mut upstream, &reply, shutdown).await?;
                        requests.push(mysql_request(
                            reply.header,
                            Message::AuthData(reply.payload.clone()),
                            client_id,
                            clock,
                        ));
                    }

                    Some(plugin @ ("mysql_native_password" | "sha256_password")) => {
                        return Err(Error::UnsupportedFeature(
                            format!("AuthMoreData for {plugin}").into(),
                        ));
                    }

                    plugin => {
                        return Err(Error::UnsupportedFeature(
                            format!("AuthMoreData for plugin {plugin:?}").into(),
                        ));
                    }
                }
            }

            Some(0x02) => {
                return Err(Error::UnsupportedFeature(
                    "multi-factor authentication (AuthNextFactor)".into(),
                ));
            }

            byte => {
                return Err(err_protocol!(
                    "unexpected packet 0x{:02X?} during authentication",
                    byte
                ));
            }
        }
    };

    Ok(ConnectionPhase {
        client,
        upstream,
        client_id,
        requests,
        responses,
        failed,
    })
}
