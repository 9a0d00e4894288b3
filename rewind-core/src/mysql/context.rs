use std::collections::HashMap;

use parking_lot::RwLock;

use crate::mysql::protocol::connect::Handshake;
use crate::mysql::protocol::{Capabilities, ColumnDefinition};
use crate::net::StreamId;

/// Whether traffic is being recorded against a live upstream or replayed
/// from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Record,
    Replay,
}

/// `last_op` value for the server greeting (the HandshakeV10 protocol
/// version byte) and the replay-side reset sentinel.
pub const LAST_OP_HANDSHAKE: u8 = 0x0A;
pub const LAST_OP_RESET: u8 = 0x8D;

/// Bookkeeping captured from a successful `COM_STMT_PREPARE`, required to
/// decode later `COM_STMT_EXECUTE` packets on the same connection.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedStatement {
    pub statement_id: u32,
    pub num_params: u16,
    pub num_columns: u16,
    pub param_defs: Vec<ColumnDefinition>,
    pub column_defs: Vec<ColumnDefinition>,
}

/// Ambient state a MySQL decoder needs, owned by the task pair of exactly
/// one client connection.
///
/// The maps are keyed by [`StreamId`] rather than the stream object so an
/// SSL upgrade (which replaces the streams) re-keys entries with
/// [`DecodeContext::rekey`]. Response decoding depends on `last_op`: an OK
/// packet is a `COM_STMT_PREPARE_OK` iff the previous request was
/// `COM_STMT_PREPARE`.
pub struct DecodeContext {
    pub mode: Mode,

    /// Capabilities announced by the client's `HandshakeResponse41`; gate
    /// every capability-dependent packet shape from then on.
    pub client_capabilities: Capabilities,

    /// Auth plugin currently in play (updated by `AuthSwitchRequest`).
    pub plugin_name: Option<Box<str>>,

    pub use_ssl: bool,

    last_op: RwLock<HashMap<StreamId, u8>>,
    server_greetings: RwLock<HashMap<StreamId, Handshake>>,
    prepared_statements: RwLock<HashMap<u32, PreparedStatement>>,
}

impl DecodeContext {
    pub fn new(mode: Mode) -> Self {
        DecodeContext {
            mode,
            client_capabilities: Capabilities::empty(),
            plugin_name: None,
            use_ssl: false,
            last_op: RwLock::new(HashMap::new()),
            server_greetings: RwLock::new(HashMap::new()),
            prepared_statements: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_last_op(&self, conn: StreamId, op: u8) {
        self.last_op.write().insert(conn, op);
    }

    pub fn last_op(&self, conn: StreamId) -> Option<u8> {
        self.last_op.read().get(&conn).copied()
    }

    /// Replay resets the op after every decoded client packet.
    pub fn reset_last_op(&self, conn: StreamId) {
        self.set_last_op(conn, LAST_OP_RESET);
    }

    pub fn cache_greeting(&self, conn: StreamId, greeting: Handshake) {
        self.server_greetings.write().insert(conn, greeting);
    }

    pub fn greeting(&self, conn: StreamId) -> Option<Handshake> {
        self.server_greetings.read().get(&conn).cloned()
    }

    /// Move per-connection entries onto a fresh id after an SSL upgrade.
    pub fn rekey(&self, old: StreamId, new: StreamId) {
        {
            let mut last_op = self.last_op.write();
            if let Some(op) = last_op.remove(&old) {
                last_op.insert(new, op);
            }
        }

        let mut greetings = self.server_greetings.write();
        if let Some(greeting) = greetings.remove(&old) {
            greetings.insert(new, greeting);
        }
    }

    pub fn store_statement(&self, statement: PreparedStatement) {
        self.prepared_statements
            .write()
            .insert(statement.statement_id, statement);
    }

    pub fn statement(&self, statement_id: u32) -> Option<PreparedStatement> {
        self.prepared_statements.read().get(&statement_id).cloned()
    }

    /// Entries are created only by a prepare-OK and destroyed only here, by
    /// the matching `COM_STMT_CLOSE`.
    pub fn remove_statement(&self, statement_id: u32) -> Option<PreparedStatement> {
        self.prepared_statements.write().remove(&statement_id)
    }

    pub fn statement_count(&self) -> usize {
        self.prepared_statements.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::{DecodeContext, Mode, PreparedStatement, LAST_OP_RESET};
    use crate::net::StreamId;

    #[test]
    fn last_op_follows_rekeying() {
        let ctx = DecodeContext::new(Mode::Record);
        let old = StreamId::next();
        let new = StreamId::next();

        ctx.set_last_op(old, 0x16);
        ctx.rekey(old, new);

        assert_eq!(ctx.last_op(old), None);
        assert_eq!(ctx.last_op(new), Some(0x16));
    }

    #[test]
    fn statements_live_from_prepare_to_close() {
        let ctx = DecodeContext::new(Mode::Replay);

        ctx.store_statement(PreparedStatement {
            statement_id: 1,
            num_params: 1,
            num_columns: 2,
            param_defs: vec![],
            column_defs: vec![],
        });

        assert_eq!(ctx.statement_count(), 1);
        assert_eq!(ctx.statement(1).unwrap().num_params, 1);

        assert!(ctx.remove_statement(1).is_some());
        assert!(ctx.remove_statement(1).is_none());
        assert_eq!(ctx.statement_count(), 0);
    }

    #[test]
    fn replay_reset_sentinel_is_visible() {
        let ctx = DecodeContext::new(Mode::Replay);
        let conn = StreamId::next();

        ctx.set_last_op(conn, 0x03);
        ctx.reset_last_op(conn);

        assert_eq!(ctx.last_op(conn), Some(LAST_OP_RESET));
    }
}
