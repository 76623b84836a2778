use chrono::{Duration, Utc};
use poise::serenity_prelude as serenity;
use serenity::{ChannelId, Http, MessageId};
use tracing::info;

use crate::error::Result;

/// Bulk deletion only covers messages younger than 14 days; stay a day
/// clear of the boundary to avoid arguing with it.
const BULK_DELETE_HORIZON_DAYS: i64 = 13;

/// Delete messages older than `reap_after` in a channel, leaving pinned
/// messages alone. Recent enough messages are removed in bulk; anything
/// past the bulk-deletion horizon goes one by one.
pub async fn reap_channel_messages(
    http: &Http,
    channel: ChannelId,
    reap_after: Duration,
) -> Result<()> {
    let limit = Utc::now() - reap_after;
    let bulk_cutoff = (Utc::now() - Duration::days(BULK_DELETE_HORIZON_DAYS)).timestamp();

    let reason = format!(
        "Reaping messages in channel {} before {}",
        channel,
        limit.to_rfc2822()
    );

    // Newest first from the API; walk oldest first so we can stop at the
    // first message inside the retention window
    let channel_messages = channel
        .messages(http, serenity::GetMessages::new().limit(100))
        .await?;

    let mut batch: Vec<MessageId> = Vec::new();
    let mut reaped = 0usize;
    for message in channel_messages.iter().rev() {
        if message.timestamp.unix_timestamp() >= limit.timestamp() {
            // Everything from here on is recent enough to keep
            break;
        }
        if message.pinned {
            continue;
        }
        reaped += 1;
        if message.timestamp.unix_timestamp() > bulk_cutoff {
            batch.push(message.id);
        } else {
            http.delete_message(channel, message.id, Some(&reason)).await?;
        }
    }

    match batch.len() {
        0 => {}
        // The bulk endpoint wants at least two messages
        1 => http.delete_message(channel, batch[0], Some(&reason)).await?,
        _ => {
            for chunk in batch.chunks(100) {
                let map = serde_json::json!({ "messages": chunk });
                http.delete_messages(channel, &map, Some(&reason)).await?;
            }
        }
    }

    info!("Reaped {} messages from channel {}", reaped, channel);
    Ok(())
}
