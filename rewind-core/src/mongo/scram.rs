//! SCRAM-SHA regeneration for replay.
//!
//! An authentication transcript cannot be replayed verbatim: the client
//! picks a fresh nonce every connection, so the recorded server-first no
//! longer binds the live conversation and the recorded server proof no
//! longer verifies. Two packets are regenerated instead: the server-first
//! (live client nonce substituted, salt and iteration count preserved) and
//! the server-final (a fresh `v=<ServerSignature>` computed from the
//! configured password).

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};

use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

pub const SCRAM_SHA_1: &str = "SCRAM-SHA-1";
pub const SCRAM_SHA_256: &str = "SCRAM-SHA-256";

/// State carried from a rewritten `saslStart` to its `saslContinue`.
#[derive(Debug, Clone)]
struct Conversation {
    mechanism: String,
    auth_message: String,
}

static NEXT_CONVERSATION_ID: AtomicI32 = AtomicI32::new(1);

static CONVERSATIONS: Lazy<RwLock<HashMap<i32, Conversation>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Result of rewriting one recorded server-first message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerFirst {
    pub payload: String,
    pub conversation_id: i32,
}

fn check_mechanism(mechanism: &str) -> Result<()> {
    match mechanism {
        SCRAM_SHA_1 | SCRAM_SHA_256 => Ok(()),
        other => Err(Error::UnsupportedFeature(
            format!("SASL mechanism {other}").into(),
        )),
    }
}

/// `attr(s, 'r')` pulls the value of the `r=` field out of a SCRAM message.
fn attr<'a>(message: &'a str, key: char) -> Option<&'a str> {
    message.split(',').find_map(|field| {
        let mut chars = field.chars();
        (chars.next() == Some(key) && chars.next() == Some('=')).then(|| &field[2..])
    })
}

/// Drop the `n,,` GS2 header from a client-first message, if present.
fn bare(client_first: &str) -> &str {
    client_first
        .find("n=")
        .map(|idx| &client_first[idx..])
        .unwrap_or(client_first)
}

/// Regenerate a recorded server-first for a live conversation: the combined
/// nonce is re-prefixed with the live client nonce while `s=` and `i=` pass
/// through untouched, and a fresh conversation id is minted. The auth
/// message for the follow-up proof is stored under that id.
pub fn rewrite_server_first(
    live_client_first: &str,
    recorded_client_first: &str,
    recorded_server_first: &str,
    mechanism: &str,
) -> Result<ServerFirst> {
    check_mechanism(mechanism)?;

    let live_nonce = attr(bare(live_client_first), 'r')
        .ok_or_else(|| err_protocol!("client-first without a nonce"))?;
    let recorded_nonce = attr(bare(recorded_client_first), 'r')
        .ok_or_else(|| err_protocol!("recorded client-first without a nonce"))?;
    let combined = attr(recorded_server_first, 'r')
        .ok_or_else(|| err_protocol!("recorded server-first without a nonce"))?;

    // the server extension is whatever the recorded server appended to the
    // recorded client nonce
    let extension = combined.strip_prefix(recorded_nonce).unwrap_or(combined);

    let payload = recorded_server_first
        .split(',')
        .map(|field| {
            if field.starts_with("r=") {
                format!("r={live_nonce}{extension}")
            } else {
                field.to_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(",");

    let conversation_id = NEXT_CONVERSATION_ID.fetch_add(1, Ordering::Relaxed);

    let auth_message = format!("{live_client_first},{payload},auth={mechanism}");
    CONVERSATIONS.write().insert(
        conversation_id,
        Conversation {
            mechanism: mechanism.to_owned(),
            auth_message,
        },
    );

    Ok(ServerFirst {
        payload,
        conversation_id,
    })
}

/// Regenerate a recorded server-final: recover the stored auth message by
/// conversation id, re-derive the server signature from the configured
/// password and the salt/iteration-count inside the auth message, and
/// substitute the fresh `v=` proof.
pub fn rewrite_server_final(
    conversation_id: i32,
    password: &str,
    recorded_server_final: &str,
) -> Result<String> {
    let conversation = CONVERSATIONS
        .read()
        .get(&conversation_id)
        .cloned()
        .ok_or_else(|| err_protocol!("unknown SASL conversation {}", conversation_id))?;

    let salt = attr(&conversation.auth_message, 's')
        .ok_or_else(|| err_protocol!("auth message without a salt"))?;
    let iterations: u32 = attr(&conversation.auth_message, 'i')
        .ok_or_else(|| err_protocol!("auth message without an iteration count"))?
        .parse()
        .map_err(|_| err_protocol!("iteration count is not a number"))?;

    let salt = base64::decode(salt).map_err(|err| err_protocol!("salt is not base64: {}", err))?;

    let signature = match conversation.mechanism.as_str() {
        SCRAM_SHA_1 => {
            let salted = hi_sha1(password, &salt, iterations)?;
            let server_key = hmac_sha1(&salted, b"Server Key")?;
            hmac_sha1(&server_key, conversation.auth_message.as_bytes())?
        }

        SCRAM_SHA_256 => {
            let salted = hi_sha256(password, &salt, iterations)?;
            let server_key = hmac_sha256(&salted, b"Server Key")?;
            hmac_sha256(&server_key, conversation.auth_message.as_bytes())?
        }

        other => {
            return Err(Error::UnsupportedFeature(
                format!("SASL mechanism {other}").into(),
            ));
        }
    };

    let proof = base64::encode(signature);

    Ok(recorded_server_final
        .split(',')
        .map(|field| {
            if field.starts_with("v=") {
                format!("v={proof}")
            } else {
                field.to_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(","))
}

/// Entries are dropped when their connection closes.
pub fn drop_conversations(ids: &[i32]) {
    let mut conversations = CONVERSATIONS.write();
    for id in ids {
        conversations.remove(id);
    }
}

#[cfg(test)]
pub(crate) fn auth_message(conversation_id: i32) -> Option<String> {
    CONVERSATIONS
        .read()
        .get(&conversation_id)
        .map(|conversation| conversation.auth_message.clone())
}

fn hmac_sha1(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha1>::new_from_slice(key)
        .map_err(|_| err_protocol!("HMAC accepts keys of any size"))?;
    mac.update(data);

    Ok(mac.finalize().into_bytes().to_vec())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|_| err_protocol!("HMAC accepts keys of any size"))?;
    mac.update(data);

    Ok(mac.finalize().into_bytes().to_vec())
}

// SaltedPassword := Hi(password, salt, i), per RFC 5802
fn hi_sha1(password: &str, salt: &[u8], iterations: u32) -> Result<Vec<u8>> {
    let mut block = salt.to_vec();
    block.extend_from_slice(&1u32.to_be_bytes());

    let mut round = hmac_sha1(password.as_bytes(), &block)?;
    let mut out = round.clone();

    for _ in 1..iterations {
        round = hmac_sha1(password.as_bytes(), &round)?;
        for (acc, byte) in out.iter_mut().zip(&round) {
            *acc ^= byte;
        }
    }

    Ok(out)
}

fn hi_sha256(password: &str, salt: &[u8], iterations: u32) -> Result<Vec<u8>> {
    let mut block = salt.to_vec();
    block.extend_from_slice(&1u32.to_be_bytes());

    let mut round = hmac_sha256(password.as_bytes(), &block)?;
    let mut out = round.clone();

    for _ in 1..iterations {
        round = hmac_sha256(password.as_bytes(), &round)?;
        for (acc, byte) in out.iter_mut().zip(&round) {
            *acc ^= byte;
        }
    }

    Ok(out)
}

/// SHA-256 digest, exposed for cache-key use by the replayer.
pub(crate) fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::{
        attr, bare, drop_conversations, rewrite_server_final, rewrite_server_first, SCRAM_SHA_256,
    };

    const RECORDED_CLIENT_FIRST: &str = "n,,n=admin,r=oldnonce";
    const RECORDED_SERVER_FIRST: &str = "r=oldnonceSERVEREXT,s=c2FsdHNhbHQ=,i=4096";
    const RECORDED_SERVER_FINAL: &str = "v=b2xkcHJvb2Y=";

    #[test]
    fn attrs_are_extracted_by_key() {
        assert_eq!(attr(RECORDED_SERVER_FIRST, 'r'), Some("oldnonceSERVEREXT"));
        assert_eq!(attr(RECORDED_SERVER_FIRST, 'i'), Some("4096"));
        assert_eq!(attr(RECORDED_SERVER_FIRST, 'v'), None);
        assert_eq!(bare("n,,n=admin,r=x"), "n=admin,r=x");
    }

    #[test]
    fn server_first_keeps_salt_and_iterations_under_a_new_nonce() {
        let live = "n,,n=admin,r=ABCD";

        let rewritten = rewrite_server_first(
            live,
            RECORDED_CLIENT_FIRST,
            RECORDED_SERVER_FIRST,
            SCRAM_SHA_256,
        )
        .unwrap();

        assert_eq!(attr(&rewritten.payload, 'r'), Some("ABCDSERVEREXT"));
        assert_eq!(attr(&rewritten.payload, 's'), Some("c2FsdHNhbHQ="));
        assert_eq!(attr(&rewritten.payload, 'i'), Some("4096"));

        let again = rewrite_server_first(
            live,
            RECORDED_CLIENT_FIRST,
            RECORDED_SERVER_FIRST,
            SCRAM_SHA_256,
        )
        .unwrap();

        // every saslStart mints a distinct conversation id
        assert_ne!(rewritten.conversation_id, again.conversation_id);

        drop_conversations(&[rewritten.conversation_id, again.conversation_id]);
    }

    #[test]
    fn server_final_carries_a_fresh_proof() {
        let rewritten = rewrite_server_first(
            "n,,n=admin,r=LIVE",
            RECORDED_CLIENT_FIRST,
            RECORDED_SERVER_FIRST,
            SCRAM_SHA_256,
        )
        .unwrap();

        let final_1 =
            rewrite_server_final(rewritten.conversation_id, "hunter2", RECORDED_SERVER_FINAL)
                .unwrap();
        let final_2 =
            rewrite_server_final(rewritten.conversation_id, "hunter2", RECORDED_SERVER_FINAL)
                .unwrap();

        assert!(final_1.starts_with("v="));
        assert_ne!(final_1, RECORDED_SERVER_FINAL);
        // deterministic for a fixed conversation and password
        assert_eq!(final_1, final_2);

        // proof depends on the password
        let other =
            rewrite_server_final(rewritten.conversation_id, "wrong", RECORDED_SERVER_FINAL)
                .unwrap();
        assert_ne!(final_1, other);

        drop_conversations(&[rewritten.conversation_id]);
        assert!(
            rewrite_server_final(rewritten.conversation_id, "hunter2", RECORDED_SERVER_FINAL)
                .is_err()
        );
    }

    #[test]
    fn unknown_mechanisms_are_fatal() {
        assert!(rewrite_server_first("n,,r=a", "n,,r=b", "r=bc,s=ZA==,i=1", "PLAIN").is_err());
    }
}
