// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! String-in / string-out entry points for foreign drivers.
//!
//! Every function takes a JSON object and returns one; on failure the
//! returned object carries an `error` string in place of the success
//! fields. Handlers travel inside the JSON as base64 of their serialized
//! state, so a driver can hold them opaquely between rounds. Serialized
//! handlers contain secrets and must be treated as confidential.

use crate::{
    config::Config,
    errors::Result,
    handler::Handler,
    party::PartyId,
    protocol::{Message, ProtocolResult},
};
use base64::Engine;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tracing::error;

const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

#[derive(Deserialize)]
struct KeygenOptions {
    participants: Vec<String>,
    #[serde(rename = "self")]
    self_id: String,
    threshold: usize,
    /// Base64-encoded session seed.
    session_id: Option<String>,
}

#[derive(Deserialize)]
struct ContinueParams {
    handler: String,
    #[serde(default)]
    msgs: Vec<Message>,
}

#[derive(Serialize, Default)]
struct KeygenResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    handler: Option<String>,
    msgs: Vec<Message>,
    all_received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<Box<Config>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Deserialize)]
struct SignOptions {
    signers: Vec<String>,
    config: Box<Config>,
    /// Base64-encoded 32-byte message digest.
    hash_to_sign: String,
    session_id: Option<String>,
}

#[derive(Serialize, Default)]
struct SignResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    handler: Option<String>,
    msgs: Vec<Message>,
    all_received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    sig: Option<crate::Signature>,
    /// Hex encoding of the 65-byte compact form.
    #[serde(skip_serializing_if = "Option::is_none")]
    sig_compact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Deserialize)]
struct DeriveParams {
    config: Box<Config>,
    path: String,
}

#[derive(Serialize, Default)]
struct DeriveResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<Box<Config>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|e| format!("{{\"error\":\"failed to serialize result: {e}\"}}"))
}

fn error_json(message: impl std::fmt::Display) -> String {
    to_json(&serde_json::json!({ "error": message.to_string() }))
}

fn decode_session_id(encoded: &Option<String>) -> Result<Option<Vec<u8>>> {
    match encoded {
        None => Ok(None),
        Some(encoded) => Ok(Some(BASE64.decode(encoded).map_err(|_| {
            error!("Session id is not valid base64");
            crate::errors::CallerError::DeserializationFailed
        })?)),
    }
}

fn encode_handler(handler: &Handler) -> Result<String> {
    Ok(BASE64.encode(handler.to_bytes()?))
}

fn decode_handler(encoded: &str) -> Result<Handler> {
    let bytes = BASE64.decode(encoded).map_err(|_| {
        error!("Handler blob is not valid base64");
        crate::errors::CallerError::DeserializationFailed
    })?;
    Handler::from_bytes(&bytes)
}

/// Feed messages to a handler and advance it as far as it will go.
fn advance(handler: &mut Handler, msgs: Vec<Message>) -> (Vec<Message>, bool) {
    let mut out = Vec::new();
    if msgs.is_empty() {
        out = handler.process_round(&mut OsRng);
    } else {
        for msg in msgs {
            handler.accept(msg);
        }
        if handler.received_all() {
            out = handler.process_round(&mut OsRng);
        }
    }
    let all_received = handler.result().is_some() || handler.received_all();
    (out, all_received)
}

fn keygen_result(mut handler: Handler, msgs: Vec<Message>) -> KeygenResult {
    let (out, all_received) = advance(&mut handler, msgs);
    let config = match handler.result() {
        Some(ProtocolResult::Keygen(config)) => Some(config.clone()),
        _ => None,
    };
    let error = handler.error().map(|e| e.message.clone());
    match encode_handler(&handler) {
        Ok(encoded) => KeygenResult {
            handler: Some(encoded),
            msgs: out,
            all_received,
            config,
            error,
        },
        Err(e) => KeygenResult {
            error: Some(e.to_string()),
            ..Default::default()
        },
    }
}

/// Start a key generation execution. Expects
/// `{participants, self, threshold, session_id}`; returns
/// `{handler, msgs, all_received, config?, error?}`.
pub fn start_keygen(opts_json: &str) -> String {
    let opts: KeygenOptions = match serde_json::from_str(opts_json) {
        Ok(opts) => opts,
        Err(e) => return error_json(e),
    };
    let session_id = match decode_session_id(&opts.session_id) {
        Ok(session_id) => session_id,
        Err(e) => return error_json(e),
    };
    let participants: Vec<PartyId> = opts.participants.iter().map(|s| PartyId::from(s.as_str())).collect();
    let self_id = PartyId::new(opts.self_id);

    let handler = match Handler::new_keygen(
        &participants,
        &self_id,
        opts.threshold,
        session_id.as_deref(),
        &mut OsRng,
    ) {
        Ok(handler) => handler,
        Err(e) => return error_json(e),
    };
    to_json(&keygen_result(handler, Vec::new()))
}

/// Continue a key generation execution with newly received messages.
/// Expects `{handler, msgs}`.
pub fn continue_keygen(params_json: &str) -> String {
    let params: ContinueParams = match serde_json::from_str(params_json) {
        Ok(params) => params,
        Err(e) => return error_json(e),
    };
    let handler = match decode_handler(&params.handler) {
        Ok(handler) => handler,
        Err(e) => return error_json(e),
    };
    to_json(&keygen_result(handler, params.msgs))
}

fn sign_result(mut handler: Handler, msgs: Vec<Message>) -> SignResult {
    let (out, all_received) = advance(&mut handler, msgs);
    let sig = match handler.result() {
        Some(ProtocolResult::Sign(sig)) => Some(*sig),
        _ => None,
    };
    let sig_compact = sig.map(|sig| hex::encode(sig.to_compact()));
    let error = handler.error().map(|e| e.message.clone());
    match encode_handler(&handler) {
        Ok(encoded) => SignResult {
            handler: Some(encoded),
            msgs: out,
            all_received,
            sig,
            sig_compact,
            error,
        },
        Err(e) => SignResult {
            error: Some(e.to_string()),
            ..Default::default()
        },
    }
}

/// Start a signing execution. Expects
/// `{signers, config, hash_to_sign, session_id}`; returns
/// `{handler, msgs, all_received, sig?, sig_compact?, error?}`.
pub fn start_sign(opts_json: &str) -> String {
    let opts: SignOptions = match serde_json::from_str(opts_json) {
        Ok(opts) => opts,
        Err(e) => return error_json(e),
    };
    let session_id = match decode_session_id(&opts.session_id) {
        Ok(session_id) => session_id,
        Err(e) => return error_json(e),
    };
    let digest_bytes = match BASE64.decode(&opts.hash_to_sign) {
        Ok(bytes) => bytes,
        Err(e) => return error_json(e),
    };
    let digest: [u8; 32] = match digest_bytes.as_slice().try_into() {
        Ok(digest) => digest,
        Err(_) => return error_json("hash_to_sign must be exactly 32 bytes"),
    };
    let signers: Vec<PartyId> = opts.signers.iter().map(|s| PartyId::from(s.as_str())).collect();

    let handler = match Handler::new_sign(&opts.config, &signers, digest, session_id.as_deref()) {
        Ok(handler) => handler,
        Err(e) => return error_json(e),
    };
    to_json(&sign_result(handler, Vec::new()))
}

/// Continue a signing execution with newly received messages. Expects
/// `{handler, msgs}`.
pub fn continue_sign(params_json: &str) -> String {
    let params: ContinueParams = match serde_json::from_str(params_json) {
        Ok(params) => params,
        Err(e) => return error_json(e),
    };
    let handler = match decode_handler(&params.handler) {
        Ok(handler) => handler,
        Err(e) => return error_json(e),
    };
    to_json(&sign_result(handler, params.msgs))
}

/// Derive a child config along an unhardened three-level BIP32 path.
/// Expects `{config, path}`; returns `{config}` or `{error}`.
pub fn derive(params_json: &str) -> String {
    let params: DeriveParams = match serde_json::from_str(params_json) {
        Ok(params) => params,
        Err(e) => return error_json(e),
    };
    match params.config.derive_path(&params.path) {
        Ok(config) => to_json(&DeriveResult {
            config: Some(Box::new(config)),
            error: None,
        }),
        Err(e) => error_json(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn parse(json: &str) -> Value {
        serde_json::from_str(json).expect("entry points must return valid JSON")
    }

    #[test]
    fn start_keygen_rejects_malformed_options() {
        let result = parse(&start_keygen("{not json"));
        assert!(result["error"].is_string());

        // Self not in the participant list.
        let result = parse(&start_keygen(
            r#"{"participants":["alice","bob"],"self":"mallory","threshold":1}"#,
        ));
        assert!(result["error"].is_string());

        // Threshold out of bounds.
        let result = parse(&start_keygen(
            r#"{"participants":["alice","bob"],"self":"alice","threshold":2}"#,
        ));
        assert!(result["error"].is_string());
    }

    #[test]
    fn continue_keygen_rejects_garbage_handlers() {
        let result = parse(&continue_keygen(r#"{"handler":"bm90IGEgaGFuZGxlcg==","msgs":[]}"#));
        assert!(result["error"].is_string());
    }

    #[test]
    fn derive_rejects_bad_paths_at_parse_time() {
        let result = parse(&derive(r#"{"config":{},"path":"m/0/0/0"}"#));
        // The config itself fails to decode, which surfaces as an error.
        assert!(result["error"].is_string());
    }

    #[test]
    fn api_keygen_two_parties_completes() {
        let session = BASE64.encode(b"api-keygen-session");
        let start = |name: &str| {
            parse(&start_keygen(&format!(
                r#"{{"participants":["alice","bob"],"self":"{name}","threshold":1,"session_id":"{session}"}}"#
            )))
        };
        let mut states = vec![start("alice"), start("bob")];
        assert!(states.iter().all(|s| s["error"].is_null()));

        for _ in 0..8 {
            if states.iter().all(|s| s["config"].is_object()) {
                break;
            }
            // Route each party's outbound messages to the other.
            let outs: Vec<Value> = states.iter().map(|s| s["msgs"].clone()).collect();
            let mut next = Vec::with_capacity(states.len());
            for (i, state) in states.iter().enumerate() {
                let inbound: Vec<Value> = outs
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .flat_map(|(_, msgs)| msgs.as_array().cloned().unwrap_or_default())
                    .collect();
                let params = serde_json::json!({
                    "handler": state["handler"],
                    "msgs": inbound,
                });
                let result = parse(&continue_keygen(&params.to_string()));
                assert!(
                    result["error"].is_null(),
                    "keygen step failed: {}",
                    result["error"]
                );
                next.push(result);
            }
            states = next;
        }

        for state in &states {
            assert!(state["config"].is_object(), "keygen did not complete");
        }
    }
}
