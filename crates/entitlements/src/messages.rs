use std::sync::Arc;

use atrium_core::{Subscription, UserId};
use atrium_persistence::{Collection, Filter, PersistenceGateway};
use chrono::{DateTime, NaiveTime, Utc};
use tracing::instrument;

use crate::clock::Clock;
use crate::error::EntitlementError;
use crate::evaluator::{EntitlementEvaluator, MessageAllowance};
use crate::profile::timestamp;

/// Role of chat messages written by the user (as opposed to the assistant).
pub const USER_ROLE: &str = "user";

/// Counts today's chat messages and applies the plan's daily limit.
pub struct MessageAllowanceChecker {
    persistence: Arc<dyn PersistenceGateway>,
    evaluator: Arc<EntitlementEvaluator>,
    clock: Arc<dyn Clock>,
}

/// Midnight UTC of the day containing `now`.
pub fn start_of_utc_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

impl MessageAllowanceChecker {
    pub fn new(
        persistence: Arc<dyn PersistenceGateway>,
        evaluator: Arc<EntitlementEvaluator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            persistence,
            evaluator,
            clock,
        }
    }

    /// Number of messages the user sent since midnight UTC.
    pub async fn messages_sent_today(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<u32, EntitlementError> {
        let filters = [
            Filter::eq("userId", user_id.as_str()),
            Filter::eq("role", USER_ROLE),
            Filter::gte("createdAt", timestamp(start_of_utc_day(now))),
        ];
        let records = self
            .persistence
            .query(Collection::ChatMessages, &filters, None, None)
            .await?;
        Ok(u32::try_from(records.len()).unwrap_or(u32::MAX))
    }

    /// Whether the user may send another message now.
    #[instrument(name = "messages.check", skip_all, fields(user_id = %user_id))]
    pub async fn check(
        &self,
        user_id: &UserId,
        sub: Option<&Subscription>,
    ) -> Result<MessageAllowance, EntitlementError> {
        if self.evaluator.max_messages_per_day(sub).is_none() {
            return Ok(MessageAllowance::Allowed { remaining: None });
        }
        let sent = self.messages_sent_today(user_id, self.clock.now()).await?;
        Ok(self.evaluator.check_message_allowance(sub, sent))
    }
}
