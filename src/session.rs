// client sessions and the text-in / text-out front of the engine

use crate::config::EngineConfig;
use crate::error::{QsimError, QsimResult};
use crate::qasm::message::QasmMessage;
use crate::qasm::{MessageId, FIELD_SEP, TAG_CLIENT_ID, TAG_CLIENT_TOKEN};
use crate::qcpu::QCpu;
use log::{debug, info, warn};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

// token -> client id
#[derive(Debug)]
pub struct ClientRegistry {
    tokens: HashMap<String, String>,
    rng: StdRng,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        ClientRegistry::new(None)
    }
}

impl ClientRegistry {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        ClientRegistry {
            tokens: HashMap::new(),
            rng,
        }
    }

    // a client registering again loses its previous token
    pub fn register(&mut self, client_id: &str) -> String {
        let before = self.tokens.len();
        self.tokens.retain(|_, id| id != client_id);
        if self.tokens.len() != before {
            debug!("client [{}] re-registered, old token revoked", client_id);
        }
        let token = loop {
            let candidate = format!("{:016x}", self.rng.gen::<u64>());
            if !self.tokens.contains_key(&candidate) {
                break candidate;
            }
        };
        self.tokens.insert(token.clone(), client_id.to_string());
        info!("client [{}] registered", client_id);
        token
    }

    pub fn unregister(&mut self, token: &str) -> bool {
        match self.tokens.remove(token) {
            Some(id) => {
                info!("client [{}] unregistered", id);
                true
            }
            None => false,
        }
    }

    pub fn client_id(&self, token: &str) -> Option<&str> {
        self.tokens.get(token).map(String::as_str)
    }

    pub fn is_registered(&self, token: &str) -> bool {
        self.tokens.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

// decodes wire text, answers control messages, checks tokens and hands
// instructions to the dispatcher
pub struct Gateway {
    qcpu: Mutex<QCpu>,
    clients: Mutex<ClientRegistry>,
    require_token: bool,
}

impl Gateway {
    pub fn new(config: EngineConfig) -> Self {
        let require_token = config.require_token;
        let clients = ClientRegistry::new(config.rng_seed);
        Gateway {
            qcpu: Mutex::new(QCpu::new(config)),
            clients: Mutex::new(clients),
            require_token,
        }
    }

    pub fn with_qcpu<R>(&self, f: impl FnOnce(&mut QCpu) -> R) -> R {
        f(&mut self.qcpu.lock())
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn handle_text(&self, text: &str) -> String {
        let response = match QasmMessage::decode(text) {
            Ok(msg) => self.handle(&msg),
            Err(e) => {
                warn!("dropping malformed message: {}", e);
                QasmMessage::error_response(leading_counter(text), &e)
            }
        };
        response.encode()
    }

    pub fn handle(&self, msg: &QasmMessage) -> QasmMessage {
        match self.dispatch(msg) {
            Ok(resp) => resp,
            Err(e) => {
                warn!("message #{} rejected: {}", msg.counter, e);
                QasmMessage::error_response(msg.counter, &e)
            }
        }
    }

    fn dispatch(&self, msg: &QasmMessage) -> QsimResult<QasmMessage> {
        msg.check_syntax()?;
        match msg.id {
            MessageId::Nope => Ok(QasmMessage::ok_response(msg.counter)),
            MessageId::Register => {
                let client_id: String = msg.param_as(TAG_CLIENT_ID)?;
                let token = self.clients.lock().register(&client_id);
                Ok(QasmMessage::ok_response(msg.counter).with_param(TAG_CLIENT_TOKEN, token))
            }
            MessageId::Unregister => {
                let token: String = msg.param_as(TAG_CLIENT_TOKEN)?;
                if self.clients.lock().unregister(&token) {
                    Ok(QasmMessage::ok_response(msg.counter))
                } else {
                    Err(QsimError::Token)
                }
            }
            MessageId::Response => Err(QsimError::Syntax("response messages are not accepted".to_string())),
            _ => {
                if self.require_token {
                    let known = msg
                        .param(TAG_CLIENT_TOKEN)
                        .is_some_and(|t| self.clients.lock().is_registered(t));
                    if !known {
                        return Err(QsimError::Token);
                    }
                }
                Ok(self.qcpu.lock().execute(msg))
            }
        }
    }
}

// best effort counter of a message that failed to decode
fn leading_counter(text: &str) -> i32 {
    text.split(FIELD_SEP)
        .next()
        .and_then(|c| c.trim().parse().ok())
        .unwrap_or(0)
}
