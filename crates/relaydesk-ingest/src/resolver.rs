// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity and thread resolution for inbound messages.
//!
//! Maps a canonical message to its tenant, customer and open conversation.
//! The provider's chat-lid is the fast path; the customer's phone is the
//! fallback and always converges on the single open conversation of that
//! customer, including one opened by an outbound campaign.

use std::sync::Arc;

use relaydesk_core::types::{CanonicalMessage, ChatLidMapping, Conversation, Customer};
use relaydesk_core::{RelaydeskError, StorageAdapter};
use tracing::{debug, error, info};

/// Where an inbound message belongs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedThread {
    pub company_id: String,
    pub customer: Customer,
    pub conversation: Conversation,
    /// Found through an existing chat-lid mapping.
    pub via_chat_lid: bool,
    /// The phone path opened a new conversation.
    pub created_conversation: bool,
}

/// Result of resolving one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(Box<ResolvedThread>),
    /// The customer is blocked by the tenant.
    Blocked { company_id: String, customer_id: String },
    /// No tenant or customer could be determined.
    Unroutable(String),
}

/// State of the chat-lid lookup, deciding what the bind step does.
enum LidState {
    /// No chat-lid on the message.
    Absent,
    /// Chat-lid present but not mapped yet.
    Unmapped,
    /// Mapped to a closed or missing conversation of the same company.
    Stale,
    /// Mapped to another company; left untouched.
    Foreign,
}

/// Resolves tenants, customers and conversations.
#[derive(Clone)]
pub struct Resolver {
    storage: Arc<dyn StorageAdapter>,
}

impl Resolver {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    /// The company owning the instance that sent or received `msg`.
    ///
    /// Looks up `(provider, instance_id)` first, then the instance whose
    /// registered phone is the business side of the message.
    pub async fn resolve_company(
        &self,
        msg: &CanonicalMessage,
    ) -> Result<Option<String>, RelaydeskError> {
        if let Some(instance_id) = msg.instance_id.as_deref()
            && let Some(instance) = self.storage.find_instance(&msg.provider, instance_id).await?
        {
            return Ok(Some(instance.company_id));
        }
        let business_phone = msg.business_phone();
        if business_phone.is_empty() {
            return Ok(None);
        }
        Ok(self
            .storage
            .find_instance_by_phone(&msg.provider, business_phone)
            .await?
            .map(|i| i.company_id))
    }

    /// Resolves `msg` to a thread, creating the customer and conversation
    /// on first contact and recording the chat-lid binding.
    pub async fn resolve(&self, msg: &CanonicalMessage) -> Result<Resolution, RelaydeskError> {
        let Some(company_id) = self.resolve_company(msg).await? else {
            return Ok(Resolution::Unroutable(format!(
                "no {} instance for instance_id={} phone={}",
                msg.provider,
                msg.instance_id.as_deref().unwrap_or("-"),
                msg.business_phone(),
            )));
        };

        let mut lid_state = LidState::Absent;
        if let Some(chat_lid) = msg.chat_lid.as_deref() {
            lid_state = LidState::Unmapped;
            if let Some(mapping) = self.storage.find_chat_lid(chat_lid).await? {
                match self.fast_path(&company_id, &mapping).await? {
                    FastPath::Hit(resolution) => return Ok(resolution),
                    FastPath::Stale => lid_state = LidState::Stale,
                    FastPath::Foreign => {
                        error!(
                            chat_lid,
                            mapped_company = %mapping.company_id,
                            company = %company_id,
                            "chat-lid is mapped to another company; resolving by phone"
                        );
                        lid_state = LidState::Foreign;
                    }
                }
            }
        }

        let phone = msg.customer_phone();
        if phone.is_empty() {
            return Ok(Resolution::Unroutable(format!(
                "no customer phone on {} message {}",
                msg.provider, msg.provider_message_id
            )));
        }

        // The sender name on a from-me message is the agent, not the customer.
        let name = if msg.from_me {
            None
        } else {
            msg.sender_name.as_deref()
        };
        let customer = self
            .storage
            .get_or_create_customer(&company_id, phone, name)
            .await?;
        if customer.blocked {
            return Ok(Resolution::Blocked {
                company_id,
                customer_id: customer.id,
            });
        }

        let (conversation, created) = self
            .storage
            .get_or_create_open_conversation(&company_id, &customer.id, &msg.provider, None)
            .await?;
        if created {
            info!(
                company = %company_id,
                customer = %customer.id,
                conversation = %conversation.id,
                "opened conversation"
            );
        }

        let customer = match msg.chat_lid.as_deref() {
            Some(chat_lid) => {
                self.bind(chat_lid, &company_id, &conversation, lid_state)
                    .await?;
                self.fill_channel_id(customer, chat_lid).await?
            }
            None => customer,
        };

        Ok(Resolution::Resolved(Box::new(ResolvedThread {
            company_id,
            customer,
            conversation,
            via_chat_lid: false,
            created_conversation: created,
        })))
    }

    async fn fast_path(
        &self,
        company_id: &str,
        mapping: &ChatLidMapping,
    ) -> Result<FastPath, RelaydeskError> {
        if mapping.company_id != company_id {
            return Ok(FastPath::Foreign);
        }
        let Some(conversation) = self
            .storage
            .get_conversation(company_id, &mapping.conversation_id)
            .await?
            .filter(|c| c.status.is_open())
        else {
            return Ok(FastPath::Stale);
        };
        let Some(customer) = self
            .storage
            .get_customer(company_id, &conversation.customer_id)
            .await?
        else {
            return Ok(FastPath::Stale);
        };
        if customer.blocked {
            return Ok(FastPath::Hit(Resolution::Blocked {
                company_id: company_id.to_string(),
                customer_id: customer.id,
            }));
        }
        debug!(
            chat_lid = %mapping.chat_lid,
            conversation = %conversation.id,
            "resolved by chat-lid"
        );
        Ok(FastPath::Hit(Resolution::Resolved(Box::new(ResolvedThread {
            company_id: company_id.to_string(),
            customer,
            conversation,
            via_chat_lid: true,
            created_conversation: false,
        }))))
    }

    async fn bind(
        &self,
        chat_lid: &str,
        company_id: &str,
        conversation: &Conversation,
        state: LidState,
    ) -> Result<(), RelaydeskError> {
        let from_campaign = conversation.campaign_id.is_some();
        match state {
            LidState::Absent | LidState::Foreign => {}
            LidState::Unmapped => {
                let stored = self
                    .storage
                    .bind_chat_lid(&ChatLidMapping {
                        chat_lid: chat_lid.to_string(),
                        conversation_id: conversation.id.clone(),
                        company_id: company_id.to_string(),
                        from_campaign,
                        campaign_id: conversation.campaign_id.clone(),
                        created_at: String::new(),
                        updated_at: String::new(),
                    })
                    .await?;
                if stored.conversation_id != conversation.id {
                    debug!(
                        chat_lid,
                        winner = %stored.conversation_id,
                        "chat-lid was bound concurrently"
                    );
                } else if stored.chat_lid != chat_lid {
                    debug!(
                        chat_lid,
                        bound = %stored.chat_lid,
                        conversation = %conversation.id,
                        "conversation already has a chat-lid"
                    );
                } else {
                    debug!(chat_lid, conversation = %conversation.id, from_campaign, "bound chat-lid");
                }
            }
            LidState::Stale => {
                let rebound = self
                    .storage
                    .rebind_chat_lid(
                        chat_lid,
                        &conversation.id,
                        from_campaign,
                        conversation.campaign_id.as_deref(),
                    )
                    .await?;
                if rebound {
                    info!(chat_lid, conversation = %conversation.id, "rebound stale chat-lid");
                } else {
                    info!(
                        chat_lid,
                        conversation = %conversation.id,
                        "dropped stale chat-lid; conversation already mapped"
                    );
                }
            }
        }
        Ok(())
    }

    async fn fill_channel_id(
        &self,
        mut customer: Customer,
        chat_lid: &str,
    ) -> Result<Customer, RelaydeskError> {
        if customer.channel_id.is_none() {
            self.storage
                .set_customer_channel_id(&customer.company_id, &customer.id, chat_lid)
                .await?;
            customer.channel_id = Some(chat_lid.to_string());
        }
        Ok(customer)
    }
}

enum FastPath {
    Hit(Resolution),
    Stale,
    Foreign,
}
