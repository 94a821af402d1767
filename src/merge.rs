//! Merge several session logs into one linear conversation
//!
//! The output is a single chain: every message's `parent_id` is the id of the
//! message before it, and the first message has none. Parent links from the
//! original files are discarded. A system boundary message marks each switch
//! to another session.

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::session::{parse_log, Message, MessageKind, ParseWarning, Session};

/// How messages from different sessions are ordered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeOrder {
    /// Sessions back to back, in the order given
    #[default]
    DiscoveryOrder,
    /// All messages sorted by timestamp, regrouped into per-session runs
    TimestampGrouped,
}

/// Skipped lines and unreadable files for one session
#[derive(Debug, Clone)]
pub struct SessionWarning {
    pub session_id: String,
    pub detail: String,
}

#[derive(Debug, Default)]
pub struct Merged {
    pub messages: Vec<Message>,
    pub warnings: Vec<SessionWarning>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MessageStats {
    pub total: usize,
    pub user: usize,
    pub assistant: usize,
    pub system: usize,
}

pub fn message_stats(messages: &[Message]) -> MessageStats {
    let mut stats = MessageStats {
        total: messages.len(),
        ..Default::default()
    };
    for m in messages {
        match m.kind {
            MessageKind::User => stats.user += 1,
            MessageKind::Assistant => stats.assistant += 1,
            MessageKind::System => stats.system += 1,
            MessageKind::Other(_) => {}
        }
    }
    stats
}

/// Merge `sessions` into one conversation, setting each session's
/// `message_count` along the way.
pub fn merge(sessions: &mut [Session], order: MergeOrder) -> Merged {
    let mut warnings = vec![];
    let mut per_session: Vec<Vec<Message>> = Vec::with_capacity(sessions.len());

    for session in sessions.iter_mut() {
        let messages = match parse_log(&session.path) {
            Ok(parsed) => {
                warnings.extend(parsed.warnings.into_iter().map(|w: ParseWarning| {
                    SessionWarning {
                        session_id: session.session_id.clone(),
                        detail: format!("line {}: {}", w.line, w.error),
                    }
                }));
                parsed.messages
            }
            Err(e) => {
                tracing::warn!("Treating session {} as empty: {:#}", session.session_id, e);
                warnings.push(SessionWarning {
                    session_id: session.session_id.clone(),
                    detail: format!("{:#}", e),
                });
                vec![]
            }
        };
        session.message_count = messages.len();
        per_session.push(messages);
    }

    let messages = match order {
        MergeOrder::DiscoveryOrder => merge_in_order(sessions, per_session),
        MergeOrder::TimestampGrouped => merge_by_timestamp(sessions, per_session),
    };

    Merged { messages, warnings }
}

fn boundary(session_id: &str, id: String, timestamp: String) -> Message {
    Message {
        kind: MessageKind::System,
        content: format!("--- USER STARTED NEW SESSION ({}) ---", session_id),
        timestamp,
        id,
        parent_id: None,
    }
}

fn mtime_stamp(session: &Session) -> String {
    session
        .modified_time
        .to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Appends messages while rewriting parent links into one chain
#[derive(Default)]
struct Chain {
    out: Vec<Message>,
}

impl Chain {
    fn push(&mut self, mut msg: Message) {
        msg.parent_id = self.out.last().map(|prev| prev.id.clone());
        self.out.push(msg);
    }
}

fn merge_in_order(sessions: &[Session], per_session: Vec<Vec<Message>>) -> Vec<Message> {
    let mut chain = Chain::default();

    for (idx, (session, messages)) in sessions.iter().zip(per_session).enumerate() {
        if idx > 0 {
            let ts = messages
                .first()
                .map(|m| m.timestamp.clone())
                .unwrap_or_else(|| mtime_stamp(session));
            chain.push(boundary(
                &session.session_id,
                format!("boundary-{}", session.session_id),
                ts,
            ));
        }
        for msg in messages {
            chain.push(msg);
        }
    }

    chain.out
}

fn merge_by_timestamp(sessions: &[Session], per_session: Vec<Vec<Message>>) -> Vec<Message> {
    let mut tagged: Vec<(usize, Message)> = per_session
        .into_iter()
        .enumerate()
        .flat_map(|(idx, msgs)| msgs.into_iter().map(move |m| (idx, m)))
        .collect();
    // Stable: ties keep discovery order, then file order.
    tagged.sort_by(|a, b| a.1.timestamp.cmp(&b.1.timestamp));

    let mut chain = Chain::default();
    let mut runs: HashMap<usize, usize> = HashMap::new();
    let mut current: Option<usize> = None;

    for (idx, msg) in tagged {
        if current != Some(idx) {
            let run = runs.entry(idx).or_insert(0);
            *run += 1;
            if current.is_some() {
                let session_id = &sessions[idx].session_id;
                let id = if *run == 1 {
                    format!("boundary-{}", session_id)
                } else {
                    format!("boundary-{}-{}", session_id, run)
                };
                chain.push(boundary(session_id, id, msg.timestamp.clone()));
            }
            current = Some(idx);
        }
        chain.push(msg);
    }

    chain.out
}
