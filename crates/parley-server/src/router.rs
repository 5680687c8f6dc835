//! Message router: validates inbound envelopes and fans messages out.
//!
//! The router runs on the inbound task of the sending connection. Nothing
//! here may fail the pipeline: every downstream failure becomes at most one
//! error envelope for the sender.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use parley_shared::{
    ChatKind, Command, ErrorCode, GroupId, InboundEnvelope, MessageBody, OutboundEnvelope,
    ReplyMeta, UserId,
};
use parley_store::{MessageDraft, MessageStore, MessageTarget};

use crate::config::{HubConfig, OverflowPolicy};
use crate::connection::{CatchUpWindow, ConnectionHandle, EnqueueOutcome};
use crate::names::NameResolver;
use crate::registry::ConnectionRegistry;
use crate::roster::{GroupRoster, RosterError};
use crate::stats::DeliveryStats;
use crate::translate::Translator;

#[derive(Clone)]
pub struct MessageRouter {
    registry: ConnectionRegistry,
    roster: GroupRoster,
    messages: Arc<dyn MessageStore>,
    translator: Translator,
    names: NameResolver,
    stats: Arc<DeliveryStats>,
    enqueue_timeout: Duration,
    overflow_policy: OverflowPolicy,
}

impl MessageRouter {
    pub fn new(
        registry: ConnectionRegistry,
        roster: GroupRoster,
        messages: Arc<dyn MessageStore>,
        translator: Translator,
        names: NameResolver,
        stats: Arc<DeliveryStats>,
        config: &HubConfig,
    ) -> Self {
        Self {
            registry,
            roster,
            messages,
            translator,
            names,
            stats,
            enqueue_timeout: config.enqueue_timeout,
            overflow_policy: config.overflow_policy,
        }
    }

    /// Route one raw text frame from `sender`.
    pub async fn handle_frame(&self, sender: &Arc<ConnectionHandle>, raw: &str) {
        let command = match InboundEnvelope::parse(raw).and_then(InboundEnvelope::into_command) {
            Ok(command) => command,
            Err(e) => {
                debug!(user = %sender.user_id(), error = %e, "Rejected inbound envelope");
                self.reply_error(sender, e.code()).await;
                return;
            }
        };
        self.dispatch(sender, command).await;
    }

    pub async fn dispatch(&self, sender: &Arc<ConnectionHandle>, command: Command) {
        match command {
            Command::SendDirect {
                to_user,
                conversation_id,
                body,
            } => {
                debug!(
                    from = %sender.user_id(),
                    to = %to_user,
                    conversation = %conversation_id,
                    "Routing direct message"
                );
                self.send_direct(sender, &to_user, body).await;
            }
            Command::SendGroup { group_id, body } => {
                if let Err(code) = self.send_to_group(sender, &group_id, body).await {
                    self.reply_error(sender, code).await;
                }
            }
            Command::CreateGroup { name, members } => {
                match self.roster.create(&name, sender.user_id(), &members).await {
                    Ok(group_id) => {
                        let ack = OutboundEnvelope::group_created(group_id, sender.lang());
                        self.deliver(sender, ack).await;
                    }
                    Err(e) => {
                        error!(user = %sender.user_id(), error = %e, "Failed to create group");
                        self.reply_error(sender, ErrorCode::DbErrorCreatingGroup).await;
                    }
                }
            }
            Command::JoinGroup { group_id } => {
                match self.roster.add_member(&group_id, sender.user_id()).await {
                    Ok(()) => {
                        let ack = OutboundEnvelope::joined_group(group_id, sender.lang());
                        self.deliver(sender, ack).await;
                    }
                    Err(RosterError::GroupNotFound(_)) => {
                        self.reply_error(sender, ErrorCode::GroupNotFound).await;
                    }
                    Err(e) => {
                        error!(user = %sender.user_id(), group = %group_id, error = %e, "Failed to join group");
                        self.reply_error(sender, ErrorCode::DbErrorJoinGroup).await;
                    }
                }
            }
        }
    }

    /// Persist a DM and deliver it live if the recipient is online.
    /// Returns whether it was queued for the recipient.
    pub async fn send_direct(
        &self,
        sender: &ConnectionHandle,
        to_user: &UserId,
        body: MessageBody,
    ) -> bool {
        let source_lang = body.source_lang_or(sender.lang()).to_string();
        let reply = self.present_reply(&body.reply).await;

        let draft = draft(
            sender.user_id(),
            MessageTarget::Direct(to_user.to_string()),
            &body,
            &reply,
            &source_lang,
        );
        // A lost record only costs offline replay; live delivery still runs.
        if let Err(e) = self.messages.insert_message(draft).await {
            error!(from = %sender.user_id(), to = %to_user, error = %e, "Failed to persist direct message");
        }

        let Some(recipient) = self.registry.lookup(to_user).await else {
            debug!(to = %to_user, "Recipient offline, message left for catch-up");
            return false;
        };

        let text = self
            .translator
            .translate(&body.text, &source_lang, recipient.lang())
            .await;
        let envelope =
            OutboundEnvelope::message(ChatKind::Dm, sender.user_id().clone(), text, recipient.lang())
                .with_files(body.files)
                .with_reply(reply);

        self.deliver(&recipient, envelope).await == EnqueueOutcome::Queued
    }

    /// Persist a group message once and fan it out to every online member
    /// except the sender. Returns the number of envelopes queued.
    pub async fn send_to_group(
        &self,
        sender: &ConnectionHandle,
        group_id: &GroupId,
        body: MessageBody,
    ) -> Result<usize, ErrorCode> {
        if !self.roster.contains(group_id).await {
            return Err(ErrorCode::GroupNotFound);
        }

        let source_lang = body.source_lang_or(sender.lang()).to_string();
        let reply = self.present_reply(&body.reply).await;
        let draft = draft(
            sender.user_id(),
            MessageTarget::Group(group_id.to_string()),
            &body,
            &reply,
            &source_lang,
        );
        if let Err(e) = self.messages.insert_message(draft).await {
            error!(from = %sender.user_id(), group = %group_id, error = %e, "Failed to persist group message");
            return Err(ErrorCode::DbErrorGroupMessage);
        }

        let members = self.roster.members_of(group_id).await.unwrap_or_default();

        let mut queued = 0;
        for member in members.iter().filter(|m| *m != sender.user_id()) {
            // No handle, no delivery: group messages are never replayed.
            let Some(recipient) = self.registry.lookup(member).await else {
                continue;
            };
            let text = self
                .translator
                .translate(&body.text, &source_lang, recipient.lang())
                .await;
            let envelope = OutboundEnvelope::message(
                ChatKind::Group,
                sender.user_id().clone(),
                text,
                recipient.lang(),
            )
            .with_group(group_id.clone())
            .with_files(body.files.clone())
            .with_reply(reply.clone());

            if self.deliver(&recipient, envelope).await == EnqueueOutcome::Queued {
                queued += 1;
            }
        }

        debug!(
            from = %sender.user_id(),
            group = %group_id,
            members = members.len(),
            queued,
            "Group message fanned out"
        );
        Ok(queued)
    }

    /// Replay every undelivered DM for the window's connection, then flag
    /// the whole batch delivered. Returns the number of messages replayed.
    pub async fn catch_up(&self, window: &CatchUpWindow) -> usize {
        let handle = window.handle();
        let pending = match self.messages.undelivered_for(handle.user_id().as_str()).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(user = %handle.user_id(), error = %e, "Failed to read undelivered messages");
                return 0;
            }
        };
        if pending.is_empty() {
            return 0;
        }

        let mut ids = Vec::with_capacity(pending.len());
        let mut closed = false;
        for message in pending {
            // The rest of the batch is still marked once the connection is gone.
            ids.push(message.id);
            if closed {
                continue;
            }

            let reply = self
                .present_reply(&ReplyMeta {
                    reply_to: message.reply_to,
                    reply_text: message.reply_text,
                    reply_sender: message.reply_sender,
                })
                .await;
            let text = self
                .translator
                .translate(&message.content, &message.content_lang, handle.lang())
                .await;
            let envelope = OutboundEnvelope::message(
                ChatKind::Dm,
                UserId(message.sender_id),
                text,
                handle.lang(),
            )
            .with_files(message.files)
            .with_reply(reply);

            match window.push(envelope, self.enqueue_timeout).await {
                EnqueueOutcome::Queued => self.stats.record_enqueued(),
                EnqueueOutcome::Dropped => {
                    self.stats.record_dropped();
                    warn!(user = %handle.user_id(), message = %message.id, "Catch-up envelope dropped");
                }
                EnqueueOutcome::Closed => {
                    debug!(user = %handle.user_id(), "Connection closed during catch-up");
                    closed = true;
                }
            }
        }

        let count = ids.len();
        match self.messages.mark_delivered(ids, Utc::now()).await {
            Ok(marked) => {
                info!(user = %handle.user_id(), replayed = count, marked, "Offline catch-up complete");
            }
            Err(e) => {
                warn!(user = %handle.user_id(), error = %e, "Failed to mark catch-up delivered");
            }
        }
        self.stats.record_replayed(count as u64);
        count
    }

    async fn present_reply(&self, reply: &ReplyMeta) -> ReplyMeta {
        ReplyMeta {
            reply_to: reply.reply_to.clone(),
            reply_text: reply.reply_text.clone(),
            reply_sender: self.names.resolve_opt(reply.reply_sender.as_deref()).await,
        }
    }

    async fn reply_error(&self, sender: &ConnectionHandle, code: ErrorCode) {
        self.deliver(sender, OutboundEnvelope::error(code, sender.lang()))
            .await;
    }

    /// Bounded enqueue with the configured overflow policy applied.
    async fn deliver(
        &self,
        recipient: &ConnectionHandle,
        envelope: OutboundEnvelope,
    ) -> EnqueueOutcome {
        let outcome = recipient.enqueue(envelope, self.enqueue_timeout).await;
        match outcome {
            EnqueueOutcome::Queued => self.stats.record_enqueued(),
            EnqueueOutcome::Dropped => {
                self.stats.record_dropped();
                warn!(
                    user = %recipient.user_id(),
                    dropped = recipient.dropped(),
                    "Outbound queue full, envelope dropped"
                );
                if self.overflow_policy == OverflowPolicy::Disconnect && recipient.close() {
                    self.stats.record_forced_disconnect();
                    warn!(user = %recipient.user_id(), "Disconnecting slow consumer");
                }
            }
            EnqueueOutcome::Closed => {
                debug!(user = %recipient.user_id(), "Recipient closed, envelope discarded");
            }
        }
        outcome
    }
}

fn draft(
    sender: &UserId,
    target: MessageTarget,
    body: &MessageBody,
    reply: &ReplyMeta,
    source_lang: &str,
) -> MessageDraft {
    MessageDraft {
        sender_id: sender.to_string(),
        target,
        content: body.text.clone(),
        content_lang: source_lang.to_string(),
        reply_to: reply.reply_to.clone(),
        reply_text: reply.reply_text.clone(),
        reply_sender: reply.reply_sender.clone(),
        files: body.files.clone(),
    }
}
