//! Replay-side matching: a live client command is scored against every data
//! mock in the store; the highest score wins, insertion order breaks ties,
//! and a handful of comparisons can declare the match exact and return
//! early.

use std::sync::Arc;

use tracing::trace;

use crate::mock::{Mock, MockKind, WireHeader, WireMessage};
use crate::mysql::protocol::{Message, PacketHeader};
use crate::sql;

#[derive(Debug, Clone)]
pub enum MatchOutcome {
    /// Candidate chosen by score (or declared exact).
    Matched(Arc<Mock>),
    Miss,
}

/// Scan `mocks` (insertion order, config mocks excluded) for the best
/// candidate for one command-phase request.
pub fn match_command(
    live: &Message,
    live_header: &PacketHeader,
    mocks: &[Arc<Mock>],
) -> MatchOutcome {
    let mut best: Option<(u32, &Arc<Mock>)> = None;

    for mock in mocks {
        if mock.kind != MockKind::MySql || mock.is_config() {
            continue;
        }

        let Some(request) = mock.requests.first() else {
            continue;
        };

        let recorded_header = match &request.bundle.header {
            WireHeader::MySql(header) => header,
            #[allow(unreachable_patterns)]
            _ => continue,
        };
        let recorded = match &request.bundle.message {
            WireMessage::MySql(message) => message,
            #[allow(unreachable_patterns)]
            _ => continue,
        };

        let Some((score, exact)) = score(live, live_header, recorded, recorded_header) else {
            continue;
        };

        if exact {
            trace!(mock = %mock.name, "exact match");
            return MatchOutcome::Matched(Arc::clone(mock));
        }

        // strict comparison keeps the earliest mock on equal scores
        if score > 0 && best.map_or(true, |(top, _)| score > top) {
            best = Some((score, mock));
        }
    }

    match best {
        Some((score, mock)) => {
            trace!(mock = %mock.name, score, "scored match");
            MatchOutcome::Matched(Arc::clone(mock))
        }
        None => MatchOutcome::Miss,
    }
}

/// Integer score for one candidate; `None` rejects it outright. The `bool`
/// marks an exact match.
fn score(
    live: &Message,
    live_header: &PacketHeader,
    recorded: &Message,
    recorded_header: &PacketHeader,
) -> Option<(u32, bool)> {
    if live.type_tag() != recorded.type_tag() {
        return None;
    }

    let mut score = 0;

    // header match: payload length and sequence id
    if live_header.length == recorded_header.length && live_header.seq == recorded_header.seq {
        score += 2;
    }

    match (live, recorded) {
        (Message::Query(live), Message::Query(recorded)) => {
            match score_query_text(&live.query, &recorded.query, live_header, recorded_header) {
                QueryScore::Exact => return Some((score, true)),
                QueryScore::Rejected => return None,
                QueryScore::Partial(extra) => score += extra,
            }
        }

        (Message::StmtPrepare(live), Message::StmtPrepare(recorded)) => {
            match score_query_text(&live.query, &recorded.query, live_header, recorded_header) {
                QueryScore::Exact => return Some((score, true)),
                QueryScore::Rejected => return None,
                QueryScore::Partial(extra) => score += extra,
            }
        }

        (Message::StmtExecute(live), Message::StmtExecute(recorded)) => {
            // the status byte is shared by construction
            score += 1;

            if live.statement_id == recorded.statement_id {
                score += 1;
            }
            if live.flags == recorded.flags {
                score += 1;
            }
            if live.iteration_count == recorded.iteration_count {
                score += 1;
            }
            if live.parameter_count == recorded.parameter_count {
                score += 1;
            }
            if live.new_params_bind_flag == recorded.new_params_bind_flag {
                score += 1;
            }

            for (a, b) in live.parameters.iter().zip(&recorded.parameters) {
                if a.type_id == b.type_id
                    && a.name == b.name
                    && a.unsigned == b.unsigned
                    && a.value.loosely_equals(&b.value)
                {
                    score += 1;
                }
            }
        }

        (Message::StmtClose(live), Message::StmtClose(recorded)) => {
            if live.statement_id == recorded.statement_id {
                score += 1;
            }
        }

        (Message::StmtReset(live), Message::StmtReset(recorded)) => {
            if live.statement_id == recorded.statement_id {
                score += 1;
            }
        }

        (Message::InitDb { schema: live }, Message::InitDb { schema: recorded }) => {
            if live == recorded {
                score += 1;
            }
        }

        // bodyless commands match on their tag alone
        (Message::Ping, Message::Ping)
        | (Message::Quit, Message::Quit)
        | (Message::Statistics, Message::Statistics)
        | (Message::Debug, Message::Debug)
        | (Message::ResetConnection, Message::ResetConnection) => {
            score += 1;
        }

        _ => {}
    }

    Some((score, false))
}

enum QueryScore {
    Exact,
    Rejected,
    Partial(u32),
}

fn score_query_text(
    live: &str,
    recorded: &str,
    live_header: &PacketHeader,
    recorded_header: &PacketHeader,
) -> QueryScore {
    let mut extra = 0;

    if live_header.length == recorded_header.length {
        extra += 1;
    }

    if live == recorded {
        return QueryScore::Exact;
    }

    match (sql::parse(live), sql::parse(recorded)) {
        (Some(live), Some(recorded)) => {
            if live.is_dml != recorded.is_dml {
                // one side modifies state, the other does not; never a match
                return QueryScore::Rejected;
            }

            if live.is_dml && live.signature == recorded.signature {
                return QueryScore::Exact;
            }

            QueryScore::Partial(extra)
        }

        // either text failed to parse: fall back to text equality, which
        // already failed above
        _ => QueryScore::Partial(extra),
    }
}

/// Lossy comparisons for fields that legacy captures polluted with stray
/// bytes. Both sides are stripped of non-printable bytes and surrounding
/// whitespace first.
pub(crate) fn databases_compatible(a: &str, b: &str) -> bool {
    let a = scrub(a);
    let b = scrub(b);

    a.is_empty() || b.is_empty() || a == b || a.ends_with(&b) || b.ends_with(&a)
}

const KNOWN_PLUGINS: &[&str] = &[
    "caching_sha2_password",
    "mysql_native_password",
    "mysql_clear_password",
];

pub(crate) fn plugins_compatible(a: &str, b: &str) -> bool {
    let a = scrub(a);
    let b = scrub(b);

    if !KNOWN_PLUGINS.contains(&a.as_str()) || !KNOWN_PLUGINS.contains(&b.as_str()) {
        return true;
    }

    a == b
}

fn scrub(field: &str) -> String {
    field
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_owned()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::SystemTime;

    use super::{databases_compatible, match_command, plugins_compatible, MatchOutcome};
    use crate::mock::{Mock, MockKind};
    use crate::mysql::protocol::statement::{BinaryValue, ComStmtExecute, StmtParameter};
    use crate::mysql::protocol::text::ComQuery;
    use crate::mysql::protocol::{Message, PacketHeader, TypeId};
    use crate::mysql::{mysql_request, mysql_response};
    use crate::net::StreamId;

    struct Epoch;

    impl crate::mock::Clock for Epoch {
        fn now(&self) -> SystemTime {
            SystemTime::UNIX_EPOCH
        }
    }

    fn query(text: &str) -> Message {
        Message::Query(ComQuery {
            query: text.into(),
            attributes: vec![],
        })
    }

    fn header(len: u32) -> PacketHeader {
        PacketHeader { length: len, seq: 0 }
    }

    fn mock_for(message: Message, name: &str) -> Arc<Mock> {
        let len = 1;
        let mut mock = Mock::new(MockKind::MySql, name.into(), SystemTime::UNIX_EPOCH);
        mock.set_kind_meta(false);
        mock.requests = vec![mysql_request(header(len), message, StreamId::next(), &Epoch)];
        mock.responses = vec![mysql_response(
            header(7),
            Message::Ok(crate::mysql::protocol::response::OkPacket::synthetic()),
            StreamId::next(),
            &Epoch,
        )];

        Arc::new(mock)
    }

    #[test]
    fn identical_query_text_is_exact() {
        let mocks = vec![
            mock_for(query("SELECT 2"), "mock-a"),
            mock_for(query("SELECT 1"), "mock-b"),
        ];

        match match_command(&query("SELECT 1"), &header(9), &mocks) {
            MatchOutcome::Matched(mock) => assert_eq!(mock.name, "mock-b"),
            MatchOutcome::Miss => panic!("expected a match"),
        }
    }

    #[test]
    fn ddl_signature_match_is_exact() {
        let mocks = vec![mock_for(
            query("CREATE TABLE users (id INT, name TEXT)"),
            "mock-ddl",
        )];

        let live = query("CREATE TABLE orders (id INT, total INT)");
        match match_command(&live, &header(40), &mocks) {
            MatchOutcome::Matched(mock) => assert_eq!(mock.name, "mock-ddl"),
            MatchOutcome::Miss => panic!("expected a signature match"),
        }
    }

    #[test]
    fn dml_against_non_dml_is_rejected() {
        let mocks = vec![mock_for(query("SELECT * FROM users WHERE id=1"), "mock-q")];

        let live = query("INSERT INTO users VALUES(1)");
        assert!(matches!(
            match_command(&live, &header(28), &mocks),
            MatchOutcome::Miss
        ));
    }

    #[test]
    fn ties_resolve_to_insertion_order() {
        let mocks = vec![
            mock_for(Message::Ping, "mock-first"),
            mock_for(Message::Ping, "mock-second"),
        ];

        match match_command(&Message::Ping, &header(1), &mocks) {
            MatchOutcome::Matched(mock) => assert_eq!(mock.name, "mock-first"),
            MatchOutcome::Miss => panic!("expected a match"),
        }
    }

    #[test]
    fn execute_parameters_score_by_value_across_widths() {
        let recorded = Message::StmtExecute(ComStmtExecute {
            statement_id: 1,
            flags: 0,
            iteration_count: 1,
            parameter_count: 1,
            new_params_bind_flag: 1,
            parameters: vec![StmtParameter {
                type_id: TypeId::INT,
                unsigned: false,
                name: "".into(),
                value: BinaryValue::Long(7),
            }],
        });

        let mocks = vec![
            mock_for(
                Message::StmtExecute(ComStmtExecute {
                    statement_id: 9,
                    flags: 0,
                    iteration_count: 1,
                    parameter_count: 1,
                    new_params_bind_flag: 1,
                    parameters: vec![StmtParameter {
                        type_id: TypeId::INT,
                        unsigned: false,
                        name: "".into(),
                        value: BinaryValue::Long(8),
                    }],
                }),
                "mock-wrong-value",
            ),
            mock_for(recorded.clone(), "mock-right"),
        ];

        let live = Message::StmtExecute(ComStmtExecute {
            statement_id: 1,
            flags: 0,
            iteration_count: 1,
            parameter_count: 1,
            new_params_bind_flag: 1,
            parameters: vec![StmtParameter {
                type_id: TypeId::INT,
                unsigned: false,
                name: "".into(),
                // same value, different width than recorded
                value: BinaryValue::LongLong(7),
            }],
        });

        match match_command(&live, &header(23), &mocks) {
            MatchOutcome::Matched(mock) => assert_eq!(mock.name, "mock-right"),
            MatchOutcome::Miss => panic!("expected a match"),
        }
    }

    #[test]
    fn command_kind_mismatch_never_matches() {
        let mocks = vec![mock_for(Message::Ping, "mock-ping")];

        assert!(matches!(
            match_command(&query("SELECT 1"), &header(9), &mocks),
            MatchOutcome::Miss
        ));
    }

    #[test]
    fn legacy_field_comparisons_are_lossy() {
        assert!(databases_compatible("", "shop"));
        assert!(databases_compatible("shop", "shop"));
        assert!(databases_compatible("x\u{1}shop", "shop"));
        assert!(!databases_compatible("shop", "crm"));

        assert!(plugins_compatible("caching_sha2_password", "caching_sha2_password"));
        assert!(!plugins_compatible("caching_sha2_password", "mysql_native_password"));
        // unknown plugin names are treated as equal
        assert!(plugins_compatible("auth_gssapi_client", "mysql_native_password"));
    }
}
